//! Delta tables, delta rows and delta values

use super::{as_flat_muscle_targets, score_map_to_json, string_field, Record, ScoreMap};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Attribute dimension whose rows carry per-motion delta rules
///
/// Declaration order is the catalog order; `MotionPaths` comes first and the
/// derived `Ord` follows it, so ordered maps keyed by table list motion paths
/// before everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeltaTableKey {
    MotionPaths,
    TorsoAngles,
    TorsoOrientations,
    ResistanceOrigin,
    Grips,
    GripWidths,
    ElbowRelationship,
    ExecutionStyles,
    FootPositions,
    StanceWidths,
    StanceTypes,
    LoadPlacement,
    SupportStructures,
    LoadingAids,
    RangeOfMotion,
    Equipment,
}

impl DeltaTableKey {
    /// All tables in catalog order
    pub fn all_variants() -> &'static [DeltaTableKey] {
        &[
            DeltaTableKey::MotionPaths,
            DeltaTableKey::TorsoAngles,
            DeltaTableKey::TorsoOrientations,
            DeltaTableKey::ResistanceOrigin,
            DeltaTableKey::Grips,
            DeltaTableKey::GripWidths,
            DeltaTableKey::ElbowRelationship,
            DeltaTableKey::ExecutionStyles,
            DeltaTableKey::FootPositions,
            DeltaTableKey::StanceWidths,
            DeltaTableKey::StanceTypes,
            DeltaTableKey::LoadPlacement,
            DeltaTableKey::SupportStructures,
            DeltaTableKey::LoadingAids,
            DeltaTableKey::RangeOfMotion,
            DeltaTableKey::Equipment,
        ]
    }

    /// Table name used by the store and as exchange column header
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaTableKey::MotionPaths => "motionPaths",
            DeltaTableKey::TorsoAngles => "torsoAngles",
            DeltaTableKey::TorsoOrientations => "torsoOrientations",
            DeltaTableKey::ResistanceOrigin => "resistanceOrigin",
            DeltaTableKey::Grips => "grips",
            DeltaTableKey::GripWidths => "gripWidths",
            DeltaTableKey::ElbowRelationship => "elbowRelationship",
            DeltaTableKey::ExecutionStyles => "executionStyles",
            DeltaTableKey::FootPositions => "footPositions",
            DeltaTableKey::StanceWidths => "stanceWidths",
            DeltaTableKey::StanceTypes => "stanceTypes",
            DeltaTableKey::LoadPlacement => "loadPlacement",
            DeltaTableKey::SupportStructures => "supportStructures",
            DeltaTableKey::LoadingAids => "loadingAids",
            DeltaTableKey::RangeOfMotion => "rangeOfMotion",
            DeltaTableKey::Equipment => "equipment",
        }
    }

    /// Parse a table key (exact match, as it appears in headers and URLs)
    pub fn parse(s: &str) -> Option<Self> {
        Self::all_variants()
            .iter()
            .copied()
            .find(|key| key.as_str() == s.trim())
    }

    /// Human-readable table name
    pub fn label(&self) -> &'static str {
        match self {
            DeltaTableKey::MotionPaths => "Motion Paths",
            DeltaTableKey::TorsoAngles => "Torso Angles",
            DeltaTableKey::TorsoOrientations => "Torso Orientations",
            DeltaTableKey::ResistanceOrigin => "Resistance Origin",
            DeltaTableKey::Grips => "Grips",
            DeltaTableKey::GripWidths => "Grip Widths",
            DeltaTableKey::ElbowRelationship => "Elbow Relationship",
            DeltaTableKey::ExecutionStyles => "Execution Styles",
            DeltaTableKey::FootPositions => "Foot Positions",
            DeltaTableKey::StanceWidths => "Stance Widths",
            DeltaTableKey::StanceTypes => "Stance Types",
            DeltaTableKey::LoadPlacement => "Load Placement",
            DeltaTableKey::SupportStructures => "Support Structures",
            DeltaTableKey::LoadingAids => "Loading Aids",
            DeltaTableKey::RangeOfMotion => "Range of Motion",
            DeltaTableKey::Equipment => "Equipment",
        }
    }
}

impl fmt::Display for DeltaTableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule one delta row holds for one motion
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaValue {
    /// Use the parent motion's rule for this row
    Inherit,
    /// Explicit modifier (possibly empty)
    ScoreMap(ScoreMap),
    /// No relationship between the row and the motion
    Absent,
}

impl DeltaValue {
    /// Literal stored for [`DeltaValue::Inherit`]
    pub const INHERIT_MARKER: &'static str = "inherit";

    /// Empty configured modifier
    pub fn empty() -> Self {
        DeltaValue::ScoreMap(ScoreMap::new())
    }

    /// Interpret a stored value
    ///
    /// Missing or `null` is `Absent`, the inherit marker is `Inherit`, every
    /// other shape is sanitized into a score map.
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => DeltaValue::Absent,
            Some(Value::String(s)) if s == Self::INHERIT_MARKER => DeltaValue::Inherit,
            Some(other) => DeltaValue::ScoreMap(as_flat_muscle_targets(other)),
        }
    }

    /// Strict reading of an imported value
    ///
    /// Only an object, the inherit marker or `null` is accepted; anything
    /// else is `None` rather than being coerced into an empty map.
    pub fn from_import(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(DeltaValue::Absent),
            Value::String(s) if s == Self::INHERIT_MARKER => Some(DeltaValue::Inherit),
            Value::Object(_) => Some(DeltaValue::ScoreMap(as_flat_muscle_targets(value))),
            _ => None,
        }
    }

    /// Stored representation; `None` for `Absent`
    pub fn to_json(&self) -> Option<Value> {
        match self {
            DeltaValue::Inherit => Some(Value::String(Self::INHERIT_MARKER.to_string())),
            DeltaValue::ScoreMap(scores) => Some(score_map_to_json(scores)),
            DeltaValue::Absent => None,
        }
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, DeltaValue::Absent)
    }

    pub fn state(&self) -> CellState {
        match self {
            DeltaValue::Absent => CellState::NoRelationship,
            DeltaValue::Inherit => CellState::Inherit,
            DeltaValue::ScoreMap(scores) if scores.is_empty() => CellState::ConfiguredEmpty,
            DeltaValue::ScoreMap(_) => CellState::ConfiguredNonEmpty,
        }
    }

    /// Score map when configured
    pub fn scores(&self) -> Option<&ScoreMap> {
        match self {
            DeltaValue::ScoreMap(scores) => Some(scores),
            _ => None,
        }
    }
}

impl Serialize for DeltaValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DeltaValue::Inherit => serializer.serialize_str(Self::INHERIT_MARKER),
            DeltaValue::ScoreMap(scores) => scores.serialize(serializer),
            DeltaValue::Absent => serializer.serialize_none(),
        }
    }
}

/// Relationship state of one motion × row cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    NoRelationship,
    Inherit,
    ConfiguredEmpty,
    ConfiguredNonEmpty,
}

/// One row of a delta table
///
/// `delta_rules` is kept as the raw stored object so writes can replace a
/// single motion key and leave every other key untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaRow {
    pub id: String,
    pub label: String,
    pub delta_rules: Map<String, Value>,
}

impl DeltaRow {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            delta_rules: Map::new(),
        }
    }

    /// Builder used by fixtures: set one motion's rule
    pub fn with_rule(mut self, motion_id: &str, value: DeltaValue) -> Self {
        self.delta_rules = self.merged_rules(motion_id, &value);
        self
    }

    /// Parse a store record; `None` when the record has no usable id
    pub fn from_record(record: &Record) -> Option<Self> {
        let id = string_field(record, "id")?;
        let label = string_field(record, "label").unwrap_or_else(|| id.clone());
        let delta_rules = match record.get("delta_rules") {
            Some(Value::Object(rules)) => rules.clone(),
            _ => Map::new(),
        };

        Some(Self { id, label, delta_rules })
    }

    /// Whether the motion has a key in this row
    pub fn references(&self, motion_id: &str) -> bool {
        self.rule_for(motion_id).is_present()
    }

    pub fn rule_for(&self, motion_id: &str) -> DeltaValue {
        DeltaValue::from_json(self.delta_rules.get(motion_id))
    }

    /// Copy of `delta_rules` with one motion key replaced (or removed for `Absent`)
    pub fn merged_rules(&self, motion_id: &str, value: &DeltaValue) -> Map<String, Value> {
        let mut rules = self.delta_rules.clone();
        match value.to_json() {
            Some(json) => {
                rules.insert(motion_id.to_string(), json);
            }
            None => {
                rules.remove(motion_id);
            }
        }
        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_key_round_trip() {
        for key in DeltaTableKey::all_variants() {
            assert_eq!(DeltaTableKey::parse(key.as_str()), Some(*key));
        }
        assert_eq!(DeltaTableKey::parse("motion_paths"), None);
    }

    #[test]
    fn test_table_key_serializes_as_str() {
        for key in DeltaTableKey::all_variants() {
            assert_eq!(serde_json::to_value(key).unwrap(), json!(key.as_str()));
        }
    }

    #[test]
    fn test_motion_paths_sort_first() {
        let mut keys = DeltaTableKey::all_variants().to_vec();
        keys.reverse();
        keys.sort();
        assert_eq!(keys[0], DeltaTableKey::MotionPaths);
    }

    #[test]
    fn test_delta_value_parsing() {
        assert_eq!(DeltaValue::from_json(None), DeltaValue::Absent);
        assert_eq!(DeltaValue::from_json(Some(&Value::Null)), DeltaValue::Absent);
        assert_eq!(DeltaValue::from_json(Some(&json!("inherit"))), DeltaValue::Inherit);
        assert_eq!(DeltaValue::from_json(Some(&json!("other"))), DeltaValue::empty());
        assert_eq!(DeltaValue::from_json(Some(&json!(12))), DeltaValue::empty());

        let parsed = DeltaValue::from_json(Some(&json!({ "BICEP": 5, "bad": true })));
        assert_eq!(parsed.scores().map(|s| s.len()), Some(1));
    }

    #[test]
    fn test_import_values_are_strict() {
        assert_eq!(DeltaValue::from_import(&Value::Null), Some(DeltaValue::Absent));
        assert_eq!(DeltaValue::from_import(&json!("inherit")), Some(DeltaValue::Inherit));
        assert_eq!(DeltaValue::from_import(&json!({})), Some(DeltaValue::empty()));
        assert_eq!(DeltaValue::from_import(&json!("inherti")), None);
        assert_eq!(DeltaValue::from_import(&json!(3)), None);
        assert_eq!(DeltaValue::from_import(&json!([1])), None);
    }

    #[test]
    fn test_cell_states() {
        assert_eq!(DeltaValue::Absent.state(), CellState::NoRelationship);
        assert_eq!(DeltaValue::Inherit.state(), CellState::Inherit);
        assert_eq!(DeltaValue::empty().state(), CellState::ConfiguredEmpty);

        let configured = DeltaValue::ScoreMap([("BICEP".to_string(), 1.0)].into_iter().collect());
        assert_eq!(configured.state(), CellState::ConfiguredNonEmpty);
    }

    #[test]
    fn test_merged_rules_touch_one_key() {
        let row = DeltaRow::new("MID_MID", "Mid to Mid")
            .with_rule("CURL", DeltaValue::Inherit)
            .with_rule("ROW", DeltaValue::empty());

        let merged = row.merged_rules("CURL", &DeltaValue::Absent);
        assert!(!merged.contains_key("CURL"));
        assert_eq!(merged.get("ROW"), Some(&json!({})));

        let merged = row.merged_rules("PRESS", &DeltaValue::Inherit);
        assert_eq!(merged.len(), 3);
    }
}
