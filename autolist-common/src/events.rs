//! Event types for the autolist event system
//!
//! Job stores and rule stores emit an [`EngineEvent`] after each durable
//! write. Subscribers (progress displays, tests) receive them through the
//! broadcast [`EventBus`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Autolist event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// Job persisted in its initial state
    JobCreated {
        job_id: String,
        step: String,
        timestamp: DateTime<Utc>,
    },

    /// Job moved along its state machine
    JobStatusChanged {
        job_id: String,
        step: String,
        /// Status before the transition (lowercase wire name)
        old_status: String,
        /// Status after the transition (lowercase wire name)
        new_status: String,
        timestamp: DateTime<Utc>,
    },

    /// Running job reported progress
    JobProgress {
        job_id: String,
        progress: f64,
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Rule set created or replaced
    RuleSetUpserted {
        rule_id: String,
        /// True when an existing rule set with the same id was overwritten
        replaced: bool,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for [`EngineEvent`]
///
/// Events emitted before a receiver subscribes are not delivered to it.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before slow receivers
    /// start lagging.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: EngineEvent,
    ) -> Result<usize, broadcast::error::SendError<EngineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No subscribers for engine event");
        }
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
