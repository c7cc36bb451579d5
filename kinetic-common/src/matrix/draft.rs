//! Buffered editing of one motion's relationships
//!
//! Edits never reach the store one by one. They collect in a [`DeltaDraft`]
//! keyed by `table::rowId` and are written together by [`commit`]. A commit
//! either writes every buffered row and clears the draft, or keeps the whole
//! draft so the user can retry; re-applying an override is idempotent because
//! each write only replaces this motion's key.

use super::{
    delta_rules_fields, scores_or_empty, sort_relationships, sync_motions, sync_targets, DeltaMatrix,
    Relationship,
};
use crate::model::{DeltaTableKey, DeltaValue, Motion};
use crate::store::TableStore;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Address of one cell in the matrix for the draft's motion
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub table: DeltaTableKey,
    pub row_id: String,
}

impl CellKey {
    pub fn new(table: DeltaTableKey, row_id: impl Into<String>) -> Self {
        Self {
            table,
            row_id: row_id.into(),
        }
    }

    /// Parse `table::rowId`
    pub fn parse(s: &str) -> Option<Self> {
        let (table, row_id) = s.split_once("::")?;
        if row_id.is_empty() {
            return None;
        }
        Some(Self::new(DeltaTableKey::parse(table)?, row_id))
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.table, self.row_id)
    }
}

/// Buffered change to one cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellEdit {
    Set(DeltaValue),
    Remove,
}

impl CellEdit {
    fn as_value(&self) -> DeltaValue {
        match self {
            CellEdit::Set(value) => value.clone(),
            CellEdit::Remove => DeltaValue::Absent,
        }
    }
}

/// Pending edits for one motion
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaDraft {
    motion_id: String,
    overrides: BTreeMap<CellKey, CellEdit>,
    added: Vec<CellKey>,
}

impl DeltaDraft {
    pub fn new(motion_id: impl Into<String>) -> Self {
        Self {
            motion_id: motion_id.into(),
            overrides: BTreeMap::new(),
            added: Vec::new(),
        }
    }

    pub fn motion_id(&self) -> &str {
        &self.motion_id
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    pub fn overrides(&self) -> &BTreeMap<CellKey, CellEdit> {
        &self.overrides
    }

    /// Rows added in this draft, in the order they were added
    pub fn added(&self) -> &[CellKey] {
        &self.added
    }

    /// Relate a row to the motion with an empty modifier
    ///
    /// A row the snapshot already relates keeps its rule; adding it back
    /// after a buffered removal only cancels that removal.
    pub fn add_row(&mut self, matrix: &DeltaMatrix, table: DeltaTableKey, row_id: &str) {
        let key = CellKey::new(table, row_id);
        let in_snapshot = matrix
            .row(table, row_id)
            .is_some_and(|row| row.references(&self.motion_id));

        if in_snapshot {
            if self.overrides.get(&key) == Some(&CellEdit::Remove) {
                self.overrides.remove(&key);
            }
        } else if !self.added.contains(&key) {
            self.added.push(key.clone());
            self.overrides.insert(key, CellEdit::Set(DeltaValue::empty()));
        }
    }

    /// Drop the relationship; a row added in this draft simply disappears
    pub fn remove_row(&mut self, table: DeltaTableKey, row_id: &str) {
        let key = CellKey::new(table, row_id);
        if let Some(position) = self.added.iter().position(|k| *k == key) {
            self.added.remove(position);
            self.overrides.remove(&key);
        } else {
            self.overrides.insert(key, CellEdit::Remove);
        }
    }

    /// Replace a cell's value (`Absent` removes it)
    pub fn set_value(&mut self, table: DeltaTableKey, row_id: &str, value: DeltaValue) {
        match value {
            DeltaValue::Absent => self.remove_row(table, row_id),
            value => {
                self.overrides
                    .insert(CellKey::new(table, row_id), CellEdit::Set(value));
            }
        }
    }

    /// Edit one muscle score inside a cell, turning inherit/absent into a map
    pub fn set_score(&mut self, matrix: &DeltaMatrix, table: DeltaTableKey, row_id: &str, muscle_id: &str, score: f64) {
        let mut scores = scores_or_empty(&self.value(matrix, table, row_id));
        scores.insert(muscle_id.to_string(), score);
        self.set_value(table, row_id, DeltaValue::ScoreMap(scores));
    }

    /// Switch a cell between inherit and an empty modifier
    pub fn toggle_inherit(&mut self, matrix: &DeltaMatrix, table: DeltaTableKey, row_id: &str) {
        let next = match self.value(matrix, table, row_id) {
            DeltaValue::Inherit => DeltaValue::empty(),
            _ => DeltaValue::Inherit,
        };
        self.set_value(table, row_id, next);
    }

    /// Current value of a cell with the draft applied
    pub fn value(&self, matrix: &DeltaMatrix, table: DeltaTableKey, row_id: &str) -> DeltaValue {
        match self.overrides.get(&CellKey::new(table, row_id)) {
            Some(edit) => edit.as_value(),
            None => matrix
                .row(table, row_id)
                .map(|row| row.rule_for(&self.motion_id))
                .unwrap_or(DeltaValue::Absent),
        }
    }

    /// Relationships as they will look after commit
    pub fn view(&self, matrix: &DeltaMatrix) -> BTreeMap<DeltaTableKey, Vec<Relationship>> {
        let mut view = matrix.relationships_for(&self.motion_id);

        for (key, edit) in &self.overrides {
            let related = view.entry(key.table).or_default();
            related.retain(|r| r.row_id != key.row_id);

            if let CellEdit::Set(value) = edit {
                let row_label = matrix
                    .row(key.table, &key.row_id)
                    .map(|row| row.label.clone())
                    .unwrap_or_else(|| key.row_id.clone());
                related.push(Relationship {
                    row_id: key.row_id.clone(),
                    row_label,
                    value: value.clone(),
                });
            }
        }

        for related in view.values_mut() {
            sort_relationships(related);
        }
        view
    }

    /// Throw every buffered edit away
    pub fn discard(&mut self) {
        self.overrides.clear();
        self.added.clear();
    }
}

/// Result of a successful commit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitOutcome {
    pub rows_written: usize,
    pub synced: Vec<String>,
    pub sync_warnings: Vec<String>,
}

/// Commit that could not write every buffered row; the draft is kept
#[derive(Debug, Error)]
#[error("commit for {motion_id} incomplete: {} row(s) failed, {rows_written} written", failures.len())]
pub struct CommitError {
    pub motion_id: String,
    pub rows_written: usize,
    pub failures: Vec<String>,
}

/// Write every buffered edit, then sync the motion and its parent
///
/// Rows are written one at a time in key order, each by merging this
/// motion's key into the row's current rules. Rows that were written update
/// the snapshot even when others fail, but any failure keeps the draft intact
/// and skips syncing.
pub async fn commit<S: TableStore + ?Sized>(
    draft: &mut DeltaDraft,
    matrix: &mut DeltaMatrix,
    store: &S,
    motions: &[Motion],
) -> Result<CommitOutcome, CommitError> {
    let motion_id = draft.motion_id.clone();
    let mut rows_written = 0;
    let mut failures = Vec::new();

    for (key, edit) in &draft.overrides {
        let Some(row) = matrix.row(key.table, &key.row_id) else {
            failures.push(format!("{}: row not found", key));
            continue;
        };

        let rules = row.merged_rules(&motion_id, &edit.as_value());
        match store
            .update_row(key.table.as_str(), &key.row_id, delta_rules_fields(&rules))
            .await
        {
            Ok(()) => {
                debug!("Committed {} for {}", key, motion_id);
                matrix.replace_rules(key.table, &key.row_id, rules);
                rows_written += 1;
            }
            Err(e) => {
                warn!("Commit write failed for {}: {}", key, e);
                failures.push(format!("{}: {}", key, e));
            }
        }
    }

    if !failures.is_empty() {
        return Err(CommitError {
            motion_id,
            rows_written,
            failures,
        });
    }

    draft.discard();
    let (synced, sync_warnings) = sync_motions(store, sync_targets(&motion_id, motions)).await;

    info!("Committed {} row(s) for motion {}", rows_written, motion_id);
    Ok(CommitOutcome {
        rows_written,
        synced,
        sync_warnings,
    })
}
