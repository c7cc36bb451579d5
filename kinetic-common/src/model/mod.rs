//! Data model: muscles, motions and delta tables
//!
//! Records arrive from the table store as loose JSON objects. Everything in
//! this module converts them into typed values, dropping malformed pieces
//! instead of failing: a non-numeric score is skipped, a non-object score map
//! parses to an empty map, a record without an id is ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

mod delta;

pub use delta::{CellState, DeltaRow, DeltaTableKey, DeltaValue};

/// One raw row as returned by the table store
pub type Record = Map<String, Value>;

/// Flat muscle-score map (muscle id → score)
///
/// Ordered so that iteration, tie-breaking and serialization are deterministic.
pub type ScoreMap = BTreeMap<String, f64>;

/// Table holding the muscle catalog
pub const MUSCLES_TABLE: &str = "muscles";

/// Table holding motions
pub const MOTIONS_TABLE: &str = "motions";

/// Anatomical muscle in the catalog hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Muscle {
    pub id: String,
    pub label: String,
    /// Declared parents; the first one is the primary parent
    #[serde(default)]
    pub parent_ids: Vec<String>,
}

impl Muscle {
    pub fn new(id: impl Into<String>, label: impl Into<String>, parent_ids: &[&str]) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            parent_ids: parent_ids.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Primary parent (`parent_ids[0]`), used for grouping and the edit tree
    pub fn primary_parent(&self) -> Option<&str> {
        self.parent_ids.first().map(String::as_str)
    }

    /// Parse a store record; `None` when the record has no usable id
    pub fn from_record(record: &Record) -> Option<Self> {
        let id = string_field(record, "id")?;
        let label = string_field(record, "label").unwrap_or_else(|| id.clone());

        let parent_ids = match record.get("parent_ids") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::String(single)) if !single.is_empty() => vec![single.clone()],
            _ => Vec::new(),
        };

        Some(Self { id, label, parent_ids })
    }
}

/// Exercise movement with its own muscle-score map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Motion {
    pub id: String,
    pub label: String,
    /// Base motion this one is a variant of
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub muscle_targets: ScoreMap,
    /// Explicit grouping override
    #[serde(default)]
    pub muscle_grouping_id: Option<String>,
}

impl Motion {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            parent_id: None,
            muscle_targets: ScoreMap::new(),
            muscle_grouping_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_targets(mut self, targets: &[(&str, f64)]) -> Self {
        self.muscle_targets = targets.iter().map(|(id, s)| (id.to_string(), *s)).collect();
        self
    }

    pub fn with_grouping(mut self, muscle_id: impl Into<String>) -> Self {
        self.muscle_grouping_id = Some(muscle_id.into());
        self
    }

    /// Parse a store record; `None` when the record has no usable id
    pub fn from_record(record: &Record) -> Option<Self> {
        let id = string_field(record, "id")?;
        let label = string_field(record, "label").unwrap_or_else(|| id.clone());

        Some(Self {
            id,
            label,
            parent_id: string_field(record, "parent_id"),
            muscle_targets: record
                .get("muscle_targets")
                .map(as_flat_muscle_targets)
                .unwrap_or_default(),
            muscle_grouping_id: string_field(record, "muscle_grouping_id"),
        })
    }
}

/// Keep only the numeric entries of a JSON object
///
/// `null`, arrays and scalars all yield an empty map.
pub fn as_flat_muscle_targets(value: &Value) -> ScoreMap {
    match value {
        Value::Object(entries) => entries
            .iter()
            .filter_map(|(id, v)| v.as_f64().map(|score| (id.clone(), score)))
            .collect(),
        _ => ScoreMap::new(),
    }
}

/// Convert a score map back to a JSON object
pub fn score_map_to_json(scores: &ScoreMap) -> Value {
    Value::Object(
        scores
            .iter()
            .map(|(id, score)| (id.clone(), Value::from(*score)))
            .collect(),
    )
}

/// Parse every muscle record, skipping unusable ones
pub fn muscles_from_records(records: &[Record]) -> Vec<Muscle> {
    records.iter().filter_map(Muscle::from_record).collect()
}

/// Parse every motion record, skipping unusable ones
pub fn motions_from_records(records: &[Record]) -> Vec<Motion> {
    records.iter().filter_map(Motion::from_record).collect()
}

/// Non-empty string field of a record
pub(crate) fn string_field(record: &Record, key: &str) -> Option<String> {
    match record.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn test_flat_targets_drop_non_numeric() {
        let parsed = as_flat_muscle_targets(&json!({
            "BICEP": 0.8,
            "TRICEP": "high",
            "DELT": null,
            "LAT": [1, 2],
            "QUAD": 2
        }));

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["BICEP"], 0.8);
        assert_eq!(parsed["QUAD"], 2.0);
    }

    #[test]
    fn test_flat_targets_non_object_is_empty() {
        assert!(as_flat_muscle_targets(&Value::Null).is_empty());
        assert!(as_flat_muscle_targets(&json!([1, 2, 3])).is_empty());
        assert!(as_flat_muscle_targets(&json!("BICEP")).is_empty());
        assert!(as_flat_muscle_targets(&json!(4)).is_empty());
    }

    #[test]
    fn test_muscle_from_record() {
        let muscle = Muscle::from_record(&record(json!({
            "id": "BICEP",
            "label": "Biceps",
            "parent_ids": ["ARM", 7, "", "FOREARM"]
        })))
        .unwrap();

        assert_eq!(muscle.parent_ids, vec!["ARM", "FOREARM"]);
        assert_eq!(muscle.primary_parent(), Some("ARM"));
    }

    #[test]
    fn test_muscle_without_id_is_skipped() {
        assert!(Muscle::from_record(&record(json!({ "label": "Nameless" }))).is_none());
        assert!(Muscle::from_record(&record(json!({ "id": "" }))).is_none());
    }

    #[test]
    fn test_motion_from_record_treats_empty_strings_as_absent() {
        let motion = Motion::from_record(&record(json!({
            "id": "CURL",
            "label": "Curl",
            "parent_id": "",
            "muscle_grouping_id": "",
            "muscle_targets": { "BICEP": 0.9, "bad": "x" }
        })))
        .unwrap();

        assert_eq!(motion.parent_id, None);
        assert_eq!(motion.muscle_grouping_id, None);
        assert_eq!(motion.muscle_targets.len(), 1);
    }
}
