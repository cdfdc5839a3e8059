//! Enrichment merger
//!
//! Flattens a track's ordered enrichment entries into a single
//! field → value view. Later entries overwrite earlier keys; entries whose
//! `categories` is not a JSON object contribute nothing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::models::EnrichmentEntry;

/// Typed result of looking a field up in an [`EnrichmentView`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    /// Field not present in the view (distinct from an explicit null)
    Missing,
    Null,
    Bool(bool),
    Number(f64),
    Text(&'a str),
    List(&'a [Value]),
    Object(&'a Map<String, Value>),
}

impl<'a> FieldValue<'a> {
    pub fn from_value(value: &'a Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            // as_f64 is None only for arbitrary-precision numbers
            Value::Number(n) => n.as_f64().map_or(FieldValue::Null, FieldValue::Number),
            Value::String(s) => FieldValue::Text(s),
            Value::Array(items) => FieldValue::List(items),
            Value::Object(map) => FieldValue::Object(map),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Structural equality; numbers compare by value, `Missing` equals nothing
    pub fn structurally_eq(&self, other: &FieldValue<'_>) -> bool {
        match (self, other) {
            (FieldValue::Missing, _) | (_, FieldValue::Missing) => false,
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::Number(a), FieldValue::Number(b)) => a == b,
            (FieldValue::Text(a), FieldValue::Text(b)) => a == b,
            (FieldValue::List(a), FieldValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
            }
            (FieldValue::Object(a), FieldValue::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
            }
            _ => false,
        }
    }
}

/// Structural equality between two JSON values (numbers by value)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    FieldValue::from_value(a).structurally_eq(&FieldValue::from_value(b))
}

/// Flattened field → value mapping for one track
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrichmentView {
    fields: BTreeMap<String, Value>,
}

impl EnrichmentView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed lookup; absent keys yield [`FieldValue::Missing`]
    pub fn lookup(&self, field: &str) -> FieldValue<'_> {
        self.fields
            .get(field)
            .map_or(FieldValue::Missing, FieldValue::from_value)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.fields
    }
}

impl From<BTreeMap<String, Value>> for EnrichmentView {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl From<Map<String, Value>> for EnrichmentView {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            fields: map.into_iter().collect(),
        }
    }
}

impl FromIterator<(String, Value)> for EnrichmentView {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// A track id paired with its precomputed enrichment view
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackView {
    pub track_id: String,
    #[serde(default)]
    pub enrichment_view: EnrichmentView,
}

impl TrackView {
    pub fn new(track_id: impl Into<String>, enrichment_view: EnrichmentView) -> Self {
        Self {
            track_id: track_id.into(),
            enrichment_view,
        }
    }
}

/// Merge entries in the given order into one view
pub fn build_view(entries: &[EnrichmentEntry]) -> EnrichmentView {
    let mut view = EnrichmentView::new();
    for entry in entries {
        if let Value::Object(categories) = &entry.categories {
            for (key, value) in categories {
                view.insert(key.clone(), value.clone());
            }
        }
    }
    view
}
