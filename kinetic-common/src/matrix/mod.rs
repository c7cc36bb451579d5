//! Delta rule matrix
//!
//! Cross-references motions against every delta table. The matrix is a
//! snapshot of the tables as last read from the store; edits go through
//! [`DeltaDraft`] (buffered) or [`quick_set`] (immediate) and update the
//! snapshot only after the store accepted the write.

use crate::model::{DeltaRow, DeltaTableKey, DeltaValue, Motion, Record, ScoreMap};
use crate::store::TableStore;
use crate::Result;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, warn};

mod draft;
mod family;
mod tree;

pub use draft::{commit, CellEdit, CellKey, CommitError, CommitOutcome, DeltaDraft};
pub use family::{reassign_motion_path, FamilyMember, FamilyPlane, FamilyRow, ReassignOutcome};
pub use tree::{build_display_tree, DisplayNode, EditNode, EditTree};

/// One row referencing a motion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    pub row_id: String,
    pub row_label: String,
    pub value: DeltaValue,
}

/// Rows of one table referencing a motion, split by value kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelationshipCounts {
    pub total: usize,
    pub inherit: usize,
    pub empty: usize,
    pub configured: usize,
}

/// Snapshot of every delta table
#[derive(Debug, Clone, Default)]
pub struct DeltaMatrix {
    tables: BTreeMap<DeltaTableKey, Vec<DeltaRow>>,
}

impl DeltaMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder used by fixtures and tests
    pub fn with_table(mut self, key: DeltaTableKey, rows: Vec<DeltaRow>) -> Self {
        self.tables.insert(key, rows);
        self
    }

    /// Read every delta table from the store
    ///
    /// A table the store cannot provide becomes an empty table.
    pub async fn load<S: TableStore + ?Sized>(store: &S) -> Self {
        let mut tables = BTreeMap::new();

        for key in DeltaTableKey::all_variants() {
            let rows = match store.fetch_table(key.as_str()).await {
                Ok(records) => records.iter().filter_map(DeltaRow::from_record).collect(),
                Err(e) => {
                    warn!("Delta table {} unavailable, treating as empty: {}", key, e);
                    Vec::new()
                }
            };
            tables.insert(*key, rows);
        }

        debug!(
            "Loaded delta matrix: {} rows across {} tables",
            tables.values().map(Vec::len).sum::<usize>(),
            tables.len()
        );
        Self { tables }
    }

    /// Loaded table keys (motion paths first, then catalog order)
    pub fn table_keys(&self) -> impl Iterator<Item = DeltaTableKey> + '_ {
        self.tables.keys().copied()
    }

    pub fn table(&self, key: DeltaTableKey) -> &[DeltaRow] {
        self.tables.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn row(&self, key: DeltaTableKey, row_id: &str) -> Option<&DeltaRow> {
        self.table(key).iter().find(|r| r.id == row_id)
    }

    /// Replace a row's rules after a successful write
    pub(crate) fn replace_rules(&mut self, key: DeltaTableKey, row_id: &str, rules: Map<String, Value>) {
        if let Some(row) = self
            .tables
            .get_mut(&key)
            .and_then(|rows| rows.iter_mut().find(|r| r.id == row_id))
        {
            row.delta_rules = rules;
        }
    }

    /// Every row referencing the motion, per loaded table, sorted by row label
    pub fn relationships_for(&self, motion_id: &str) -> BTreeMap<DeltaTableKey, Vec<Relationship>> {
        self.tables
            .iter()
            .map(|(key, rows)| {
                let mut related: Vec<Relationship> = rows
                    .iter()
                    .filter(|row| row.references(motion_id))
                    .map(|row| Relationship {
                        row_id: row.id.clone(),
                        row_label: row.label.clone(),
                        value: row.rule_for(motion_id),
                    })
                    .collect();
                sort_relationships(&mut related);
                (*key, related)
            })
            .collect()
    }

    pub fn counts_for(&self, motion_id: &str, key: DeltaTableKey) -> RelationshipCounts {
        let mut counts = RelationshipCounts::default();
        for row in self.table(key) {
            match row.rule_for(motion_id) {
                DeltaValue::Absent => continue,
                DeltaValue::Inherit => counts.inherit += 1,
                DeltaValue::ScoreMap(scores) if scores.is_empty() => counts.empty += 1,
                DeltaValue::ScoreMap(_) => counts.configured += 1,
            }
            counts.total += 1;
        }
        counts
    }

    /// Rule a motion effectively uses for one row
    ///
    /// `Inherit` is followed through `parent_id` links until a concrete value
    /// turns up. Inheriting without a parent (or around a cycle) resolves to
    /// `Absent`.
    pub fn resolve_rule(&self, key: DeltaTableKey, row_id: &str, motion_id: &str, motions: &[Motion]) -> DeltaValue {
        let Some(row) = self.row(key, row_id) else {
            return DeltaValue::Absent;
        };

        let mut current = motion_id.to_string();
        let mut visited = HashSet::new();
        loop {
            if !visited.insert(current.clone()) {
                return DeltaValue::Absent;
            }
            match row.rule_for(&current) {
                DeltaValue::Inherit => {
                    let parent = motions
                        .iter()
                        .find(|m| m.id == current)
                        .and_then(|m| m.parent_id.clone());
                    match parent {
                        Some(parent) => current = parent,
                        None => return DeltaValue::Absent,
                    }
                }
                other => return other,
            }
        }
    }

    /// Resolved rules of a motion, as cached by derived-config sync
    ///
    /// Shape: `{ "motion_id": ..., "rules": { table: { row: value } } }`, only
    /// rows the motion references and whose rule resolves to a value.
    pub fn derived_config(&self, motion_id: &str, motions: &[Motion]) -> Value {
        let mut rules = Map::new();

        for (key, rows) in &self.tables {
            let mut resolved = Map::new();
            for row in rows.iter().filter(|r| r.references(motion_id)) {
                if let Some(value) = self.resolve_rule(*key, &row.id, motion_id, motions).to_json() {
                    resolved.insert(row.id.clone(), value);
                }
            }
            if !resolved.is_empty() {
                rules.insert(key.as_str().to_string(), Value::Object(resolved));
            }
        }

        json!({ "motion_id": motion_id, "rules": rules })
    }
}

pub(crate) fn sort_relationships(related: &mut [Relationship]) {
    related.sort_by(|a, b| {
        a.row_label
            .to_lowercase()
            .cmp(&b.row_label.to_lowercase())
            .then_with(|| a.row_id.cmp(&b.row_id))
    });
}

/// Write one cell immediately
///
/// On failure the error is returned and the snapshot is left as it was; the
/// caller should reload before trusting it again.
pub async fn quick_set<S: TableStore + ?Sized>(
    store: &S,
    matrix: &mut DeltaMatrix,
    key: DeltaTableKey,
    row_id: &str,
    motion_id: &str,
    value: DeltaValue,
) -> Result<()> {
    let row = matrix
        .row(key, row_id)
        .ok_or_else(|| crate::Error::NotFound(format!("{}::{}", key, row_id)))?;
    let rules = row.merged_rules(motion_id, &value);

    store.update_row(key.as_str(), row_id, delta_rules_fields(&rules)).await?;
    matrix.replace_rules(key, row_id, rules);
    debug!("Quick-set {}::{} for {}", key, row_id, motion_id);
    Ok(())
}

/// `{ "delta_rules": rules }` partial record
pub(crate) fn delta_rules_fields(rules: &Map<String, Value>) -> Record {
    let mut fields = Record::new();
    fields.insert("delta_rules".to_string(), Value::Object(rules.clone()));
    fields
}

/// Motion ids to sync after a motion's rules changed: itself, then its parent
pub fn sync_targets(motion_id: &str, motions: &[Motion]) -> Vec<String> {
    let mut targets = vec![motion_id.to_string()];
    if let Some(parent) = motions
        .iter()
        .find(|m| m.id == motion_id)
        .and_then(|m| m.parent_id.as_ref())
    {
        if parent != motion_id {
            targets.push(parent.clone());
        }
    }
    targets
}

/// Sync each motion once, in order; failures only warn
///
/// Returns `(synced, warnings)`.
pub async fn sync_motions<S: TableStore + ?Sized>(store: &S, motion_ids: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut seen = BTreeSet::new();
    let mut synced = Vec::new();
    let mut warnings = Vec::new();

    for motion_id in motion_ids {
        if !seen.insert(motion_id.clone()) {
            continue;
        }
        match store.sync_derived_config(&motion_id).await {
            Ok(()) => synced.push(motion_id),
            Err(e) => {
                warn!("Derived config sync failed for {}: {}", motion_id, e);
                warnings.push(format!("sync {}: {}", motion_id, e));
            }
        }
    }

    (synced, warnings)
}

/// Score map held by a value, or an empty one
pub(crate) fn scores_or_empty(value: &DeltaValue) -> ScoreMap {
    value.scores().cloned().unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::{to_record, MemoryStore};
    use async_trait::async_trait;

    pub(crate) fn scores(entries: &[(&str, f64)]) -> ScoreMap {
        entries.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    /// MID_MID: CURL configured, HAMMER_CURL inherits; LOW_HIGH: CURL empty;
    /// grips NEUTRAL: CURL inherits
    pub(crate) fn sample_matrix() -> DeltaMatrix {
        DeltaMatrix::new()
            .with_table(
                DeltaTableKey::MotionPaths,
                vec![
                    DeltaRow::new("MID_MID", "Mid to Mid")
                        .with_rule("CURL", DeltaValue::ScoreMap(scores(&[("BICEPS", 5.0)])))
                        .with_rule("HAMMER_CURL", DeltaValue::Inherit),
                    DeltaRow::new("LOW_HIGH", "Low to High").with_rule("CURL", DeltaValue::empty()),
                    DeltaRow::new("HIGH_LOW", "High to Low"),
                ],
            )
            .with_table(
                DeltaTableKey::Grips,
                vec![DeltaRow::new("NEUTRAL", "Neutral").with_rule("CURL", DeltaValue::Inherit)],
            )
    }

    pub(crate) fn sample_motions() -> Vec<Motion> {
        vec![
            Motion::new("CURL", "Curl").with_targets(&[("BICEP", 0.9)]),
            Motion::new("HAMMER_CURL", "Hammer Curl").with_parent("CURL"),
        ]
    }

    /// Memory store seeded with the sample matrix and motions
    pub(crate) async fn sample_store() -> MemoryStore {
        let store = MemoryStore::new();
        let matrix = sample_matrix();
        for key in matrix.table_keys() {
            let records = matrix.table(key).iter().map(|r| to_record(r).unwrap()).collect();
            store.insert_table(key.as_str(), records).await;
        }
        let motions = sample_motions().iter().map(|m| to_record(m).unwrap()).collect();
        store.insert_table(crate::model::MOTIONS_TABLE, motions).await;
        store
    }

    /// Store whose writes fail for the listed row ids
    pub(crate) struct FailingStore {
        pub(crate) inner: MemoryStore,
        pub(crate) failing_rows: Vec<String>,
        pub(crate) failing_sync: bool,
    }

    #[async_trait]
    impl TableStore for FailingStore {
        async fn fetch_table(&self, table: &str) -> Result<Vec<Record>> {
            self.inner.fetch_table(table).await
        }

        async fn update_row(&self, table: &str, row_id: &str, fields: Record) -> Result<()> {
            if self.failing_rows.iter().any(|r| r == row_id) {
                return Err(crate::Error::Store(format!("write rejected for {}", row_id)));
            }
            self.inner.update_row(table, row_id, fields).await
        }

        async fn sync_derived_config(&self, motion_id: &str) -> Result<()> {
            if self.failing_sync {
                return Err(crate::Error::Store("sync unavailable".to_string()));
            }
            self.inner.sync_derived_config(motion_id).await
        }
    }

    #[test]
    fn test_relationships_for_curl() {
        let matrix = sample_matrix();
        let related = matrix.relationships_for("CURL");

        let paths = &related[&DeltaTableKey::MotionPaths];
        assert_eq!(paths.len(), 2);
        // Sorted by label: "Low to High" before "Mid to Mid"
        assert_eq!(paths[0].row_id, "LOW_HIGH");
        assert_eq!(paths[1].row_id, "MID_MID");
        assert_eq!(paths[1].value, DeltaValue::ScoreMap(scores(&[("BICEPS", 5.0)])));

        assert_eq!(related[&DeltaTableKey::Grips][0].value, DeltaValue::Inherit);
    }

    #[test]
    fn test_counts_for_curl() {
        let matrix = sample_matrix();
        let counts = matrix.counts_for("CURL", DeltaTableKey::MotionPaths);
        assert_eq!(
            counts,
            RelationshipCounts {
                total: 2,
                inherit: 0,
                empty: 1,
                configured: 1
            }
        );

        let hammer = matrix.counts_for("HAMMER_CURL", DeltaTableKey::MotionPaths);
        assert_eq!(hammer.total, 1);
        assert_eq!(hammer.inherit, 1);

        assert_eq!(matrix.counts_for("CURL", DeltaTableKey::Equipment), RelationshipCounts::default());
    }

    #[test]
    fn test_resolve_rule_follows_inherit() {
        let matrix = sample_matrix();
        let motions = sample_motions();

        let resolved = matrix.resolve_rule(DeltaTableKey::MotionPaths, "MID_MID", "HAMMER_CURL", &motions);
        assert_eq!(resolved, DeltaValue::ScoreMap(scores(&[("BICEPS", 5.0)])));

        // CURL has no parent to inherit from
        let orphan = matrix.resolve_rule(DeltaTableKey::Grips, "NEUTRAL", "CURL", &motions);
        assert_eq!(orphan, DeltaValue::Absent);
    }

    #[tokio::test]
    async fn test_load_treats_failed_table_as_empty() {
        struct BrokenStore;

        #[async_trait]
        impl TableStore for BrokenStore {
            async fn fetch_table(&self, _table: &str) -> Result<Vec<Record>> {
                Err(crate::Error::Store("offline".to_string()))
            }

            async fn update_row(&self, _table: &str, _row_id: &str, _fields: Record) -> Result<()> {
                unimplemented!()
            }

            async fn sync_derived_config(&self, _motion_id: &str) -> Result<()> {
                unimplemented!()
            }
        }

        let matrix = DeltaMatrix::load(&BrokenStore).await;
        assert_eq!(matrix.table_keys().count(), DeltaTableKey::all_variants().len());
        assert!(matrix.table(DeltaTableKey::MotionPaths).is_empty());
    }

    #[tokio::test]
    async fn test_quick_set_writes_and_updates_snapshot() {
        let store = sample_store().await;
        let mut matrix = DeltaMatrix::load(&store).await;

        quick_set(&store, &mut matrix, DeltaTableKey::MotionPaths, "HIGH_LOW", "CURL", DeltaValue::Inherit)
            .await
            .unwrap();

        assert_eq!(
            matrix.row(DeltaTableKey::MotionPaths, "HIGH_LOW").unwrap().rule_for("CURL"),
            DeltaValue::Inherit
        );
        let stored = store.row("motionPaths", "HIGH_LOW").await.unwrap();
        assert_eq!(stored["delta_rules"]["CURL"], json!("inherit"));
    }

    #[tokio::test]
    async fn test_quick_set_failure_leaves_snapshot() {
        let store = FailingStore {
            inner: sample_store().await,
            failing_rows: vec!["MID_MID".to_string()],
            failing_sync: false,
        };
        let mut matrix = DeltaMatrix::load(&store).await;

        let result = quick_set(&store, &mut matrix, DeltaTableKey::MotionPaths, "MID_MID", "CURL", DeltaValue::Absent).await;

        assert!(result.is_err());
        assert!(matrix.row(DeltaTableKey::MotionPaths, "MID_MID").unwrap().references("CURL"));
    }

    #[test]
    fn test_sync_targets_one_level() {
        let mut motions = sample_motions();
        motions.push(Motion::new("CROSS_HAMMER", "Cross Hammer").with_parent("HAMMER_CURL"));

        assert_eq!(sync_targets("CROSS_HAMMER", &motions), vec!["CROSS_HAMMER", "HAMMER_CURL"]);
        assert_eq!(sync_targets("CURL", &motions), vec!["CURL"]);
    }
}
