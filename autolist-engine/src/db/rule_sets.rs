//! Rule set persistence
//!
//! The whole collection lives under one key and is replaced atomically on
//! every upsert, so a crash leaves either the old list or the new one.
//! Upserts within a process are serialized; storage order is insertion order.

use autolist_common::events::{EngineEvent, EventBus};
use autolist_common::kv::{read_or_default, write_json, KvStore};
use autolist_common::{Error, Result};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::models::RuleSet;
use crate::rules::validate_rule_set;

/// Key holding the rule set collection
pub const RULE_SETS_KEY: &str = "rule_sets";

pub struct RuleSetStore {
    kv: Arc<dyn KvStore>,
    events: EventBus,
    write_lock: Mutex<()>,
}

impl RuleSetStore {
    pub fn new(kv: Arc<dyn KvStore>, events: EventBus) -> Self {
        Self {
            kv,
            events,
            write_lock: Mutex::new(()),
        }
    }

    /// All readable rule sets in storage order
    ///
    /// A corrupt collection reads as empty; individual malformed entries are skipped.
    pub async fn list(&self) -> Result<Vec<RuleSet>> {
        let raw: Vec<Value> = read_or_default(self.kv.as_ref(), RULE_SETS_KEY, Vec::new()).await?;
        let mut rule_sets = Vec::with_capacity(raw.len());
        for (index, value) in raw.into_iter().enumerate() {
            match serde_json::from_value::<RuleSet>(value) {
                Ok(rule_set) => rule_sets.push(rule_set),
                Err(e) => warn!(index, error = %e, "Skipping malformed rule set"),
            }
        }
        Ok(rule_sets)
    }

    pub async fn get(&self, id: &str) -> Result<RuleSet> {
        self.list()
            .await?
            .into_iter()
            .find(|rule_set| rule_set.id == id)
            .ok_or_else(|| Error::NotFound(format!("rule set {id}")))
    }

    /// Replace the rule set with the same id in place, or append it
    ///
    /// Rejects rule sets with structural errors; warnings do not block.
    pub async fn upsert(&self, rule_set: RuleSet) -> Result<RuleSet> {
        validate_rule_set(&rule_set).into_result()?;

        let _guard = self.write_lock.lock().await;
        let mut rule_sets = self.list().await?;
        let replaced = match rule_sets.iter_mut().find(|existing| existing.id == rule_set.id) {
            Some(existing) => {
                *existing = rule_set.clone();
                true
            }
            None => {
                rule_sets.push(rule_set.clone());
                false
            }
        };
        write_json(self.kv.as_ref(), RULE_SETS_KEY, &rule_sets).await?;

        info!(rule_id = %rule_set.id, replaced, total = rule_sets.len(), "Rule set upserted");
        self.events.emit_lossy(EngineEvent::RuleSetUpserted {
            rule_id: rule_set.id.clone(),
            replaced,
            timestamp: Utc::now(),
        });
        Ok(rule_set)
    }
}
