//! Exchange codec: delta rules as delimited text
//!
//! One line per motion. The leading columns describe the motion; every
//! further column is a delta table whose cell holds `{ rowId: value }` for the
//! rows referencing that motion.
//!
//! Import is best-effort: bad cells and unknown motions are reported per row,
//! each touched delta row is written once, and a failed write does not stop
//! the others.

mod delimited;

pub use delimited::{read_records, write_records, DelimitedDocument, DelimitedRow, Delimiter};

use crate::matrix::{delta_rules_fields, sync_motions, sync_targets, DeltaMatrix};
use crate::model::{motions_from_records, score_map_to_json, DeltaTableKey, DeltaValue, Motion, MOTIONS_TABLE};
use crate::store::TableStore;
use crate::Error;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error as ThisError;
use tracing::{debug, info, warn};

pub const MOTION_ID_COLUMN: &str = "motion_id";
pub const MOTION_LABEL_COLUMN: &str = "motion_label";
pub const PARENT_ID_COLUMN: &str = "parent_id";
pub const MUSCLE_TARGETS_COLUMN: &str = "muscle_targets";

/// Parsed cell values: table → row → motion → value
pub type ChangeSet = BTreeMap<DeltaTableKey, BTreeMap<String, BTreeMap<String, DeltaValue>>>;

/// Problems that reject a whole import
#[derive(Debug, ThisError, PartialEq)]
pub enum ImportError {
    #[error("Import text is empty")]
    Empty,

    #[error("Header row has no motion_id column")]
    MissingMotionIdColumn,

    #[error("Unreadable import text: {0}")]
    Unreadable(String),
}

impl From<ImportError> for Error {
    fn from(err: ImportError) -> Self {
        Error::InvalidInput(err.to_string())
    }
}

/// Header row of an export
pub fn export_headers() -> Vec<String> {
    let mut headers: Vec<String> = [MOTION_ID_COLUMN, MOTION_LABEL_COLUMN, PARENT_ID_COLUMN, MUSCLE_TARGETS_COLUMN]
        .iter()
        .map(|h| h.to_string())
        .collect();
    headers.extend(DeltaTableKey::all_variants().iter().map(|k| k.as_str().to_string()));
    headers
}

/// Serialize every motion's delta rules
pub fn export_matrix(motions: &[Motion], matrix: &DeltaMatrix, delimiter: Delimiter) -> crate::Result<String> {
    let mut lines = vec![export_headers()];

    for motion in motions {
        let mut line = vec![
            motion.id.clone(),
            motion.label.clone(),
            motion.parent_id.clone().unwrap_or_default(),
            score_map_to_json(&motion.muscle_targets).to_string(),
        ];

        for key in DeltaTableKey::all_variants() {
            let cell: Map<String, Value> = matrix
                .table(*key)
                .iter()
                .filter_map(|row| row.rule_for(&motion.id).to_json().map(|v| (row.id.clone(), v)))
                .collect();
            line.push(if cell.is_empty() {
                String::new()
            } else {
                Value::Object(cell).to_string()
            });
        }

        lines.push(line);
    }

    debug!("Exported {} motions ({})", motions.len(), delimiter);
    write_records(&lines, delimiter)
}

/// Result of parsing an import document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedImport {
    pub changes: ChangeSet,
    /// Non-empty table cells accepted
    pub cells_parsed: usize,
    /// Per-row problems (unknown motion, bad JSON)
    pub errors: Vec<String>,
}

/// Parse import text against the known motions
///
/// Only header or emptiness problems are fatal.
pub fn parse_import(text: &str, motions: &[Motion]) -> Result<ParsedImport, ImportError> {
    if text.trim().is_empty() {
        return Err(ImportError::Empty);
    }

    let delimiter = Delimiter::detect(text);
    let document = read_records(text, delimiter).map_err(|e| ImportError::Unreadable(e.to_string()))?;

    let id_column = document
        .headers
        .iter()
        .position(|h| h == MOTION_ID_COLUMN)
        .ok_or(ImportError::MissingMotionIdColumn)?;

    let table_columns: Vec<(usize, DeltaTableKey)> = document
        .headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| DeltaTableKey::parse(h).map(|key| (i, key)))
        .collect();

    let known: HashSet<&str> = motions.iter().map(|m| m.id.as_str()).collect();
    let mut parsed = ParsedImport {
        errors: document.errors,
        ..Default::default()
    };

    for row in &document.rows {
        let motion_id = row.fields.get(id_column).map(|s| s.trim()).unwrap_or("");
        if motion_id.is_empty() {
            continue;
        }
        if !known.contains(motion_id) {
            parsed.errors.push(format!("line {}: unknown motion {}", row.line, motion_id));
            continue;
        }

        for (column, key) in &table_columns {
            let cell = row.fields.get(*column).map(|s| s.trim()).unwrap_or("");
            if cell.is_empty() {
                continue;
            }

            let entries = match serde_json::from_str::<Value>(cell) {
                Ok(Value::Object(entries)) => entries,
                Ok(_) => {
                    parsed
                        .errors
                        .push(format!("line {}: {} for {} is not a JSON object", row.line, key, motion_id));
                    continue;
                }
                Err(e) => {
                    parsed
                        .errors
                        .push(format!("line {}: {} for {} has invalid JSON: {}", row.line, key, motion_id, e));
                    continue;
                }
            };

            let table = parsed.changes.entry(*key).or_default();
            for (row_id, value) in entries {
                let Some(value) = DeltaValue::from_import(&value) else {
                    parsed.errors.push(format!(
                        "line {}: {} row {} for {} is not a delta value",
                        row.line, key, row_id, motion_id
                    ));
                    continue;
                };
                table.entry(row_id).or_default().insert(motion_id.to_string(), value);
            }
            parsed.cells_parsed += 1;
        }
    }

    Ok(parsed)
}

/// Outcome of applying an import
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub rows_updated: usize,
    pub cells_parsed: usize,
    /// Parse problems and failed writes
    pub errors: Vec<String>,
    /// `table::row` pairs not present in the snapshot
    pub skipped: Vec<String>,
    pub synced: Vec<String>,
    pub sync_warnings: Vec<String>,
}

/// Merge parsed changes into the snapshot rows and write each row once
pub async fn apply_import<S: TableStore + ?Sized>(
    store: &S,
    matrix: &mut DeltaMatrix,
    motions: &[Motion],
    parsed: ParsedImport,
) -> ImportReport {
    let mut report = ImportReport {
        cells_parsed: parsed.cells_parsed,
        errors: parsed.errors,
        ..Default::default()
    };
    let mut touched = BTreeSet::new();

    for (key, rows) in parsed.changes {
        for (row_id, edits) in rows {
            let Some(row) = matrix.row(key, &row_id) else {
                warn!("Import skipped unknown row {}::{}", key, row_id);
                report.skipped.push(format!("{}::{}", key, row_id));
                continue;
            };

            let mut rules = row.delta_rules.clone();
            for (motion_id, value) in &edits {
                match value.to_json() {
                    Some(json) => {
                        rules.insert(motion_id.clone(), json);
                    }
                    None => {
                        rules.remove(motion_id);
                    }
                }
            }

            match store.update_row(key.as_str(), &row_id, delta_rules_fields(&rules)).await {
                Ok(()) => {
                    matrix.replace_rules(key, &row_id, rules);
                    report.rows_updated += 1;
                    touched.extend(edits.into_keys());
                }
                Err(e) => {
                    warn!("Import write failed for {}::{}: {}", key, row_id, e);
                    report.errors.push(format!("{}::{}: {}", key, row_id, e));
                }
            }
        }
    }

    let targets: Vec<String> = touched
        .iter()
        .flat_map(|motion_id| sync_targets(motion_id, motions))
        .collect();
    let (synced, sync_warnings) = sync_motions(store, targets).await;
    report.synced = synced;
    report.sync_warnings = sync_warnings;

    info!(
        "Import applied: {} rows updated, {} skipped, {} errors",
        report.rows_updated,
        report.skipped.len(),
        report.errors.len()
    );
    report
}

/// Load motions and the matrix from the store and export them
pub async fn export_store<S: TableStore + ?Sized>(store: &S, delimiter: Delimiter) -> crate::Result<String> {
    let motions = motions_from_records(&store.fetch_table(MOTIONS_TABLE).await?);
    let matrix = DeltaMatrix::load(store).await;
    export_matrix(&motions, &matrix, delimiter)
}

/// Parse and apply import text against the store's current state
pub async fn import_text<S: TableStore + ?Sized>(store: &S, text: &str) -> crate::Result<ImportReport> {
    let motions = motions_from_records(&store.fetch_table(MOTIONS_TABLE).await?);
    let parsed = parse_import(text, &motions)?;
    let mut matrix = DeltaMatrix::load(store).await;
    Ok(apply_import(store, &mut matrix, &motions, parsed).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::tests::{sample_matrix, sample_motions, sample_store, scores, FailingStore};
    use crate::model::DeltaRow;

    fn column<'a>(text: &'a str, line: usize, name: &str) -> &'a str {
        let lines: Vec<&str> = text.lines().collect();
        let index = lines[0].split('\t').position(|h| h == name).unwrap();
        lines[line].split('\t').nth(index).unwrap()
    }

    #[test]
    fn test_export_columns() {
        let text = export_matrix(&sample_motions(), &sample_matrix(), Delimiter::Tab).unwrap();
        let header: Vec<&str> = text.lines().next().unwrap().split('\t').collect();

        assert_eq!(&header[..5], &["motion_id", "motion_label", "parent_id", "muscle_targets", "motionPaths"]);
        assert_eq!(header.len(), 4 + DeltaTableKey::all_variants().len());
        assert_eq!(column(&text, 2, "parent_id"), "CURL");
        assert_eq!(column(&text, 1, "grips"), "\"{\"\"NEUTRAL\"\":\"\"inherit\"\"}\"");
        assert_eq!(column(&text, 2, "grips"), "");
    }

    #[test]
    fn test_round_trip_reproduces_rules() {
        let matrix = sample_matrix();
        let motions = sample_motions();
        let text = export_matrix(&motions, &matrix, Delimiter::Comma).unwrap();

        let parsed = parse_import(&text, &motions).unwrap();
        assert!(parsed.errors.is_empty());

        for key in matrix.table_keys() {
            for row in matrix.table(key) {
                for motion in &motions {
                    let imported = parsed
                        .changes
                        .get(&key)
                        .and_then(|rows| rows.get(&row.id))
                        .and_then(|m| m.get(&motion.id))
                        .cloned()
                        .unwrap_or(DeltaValue::Absent);
                    assert_eq!(imported, row.rule_for(&motion.id), "{}::{} {}", key, row.id, motion.id);
                }
            }
        }
    }

    #[test]
    fn test_fatal_header_problems() {
        assert_eq!(parse_import("  \n", &[]), Err(ImportError::Empty));
        assert_eq!(
            parse_import("id\tgrips\nCURL\t{}\n", &sample_motions()),
            Err(ImportError::MissingMotionIdColumn)
        );
    }

    #[test]
    fn test_bad_cells_and_unknown_motions_are_row_errors() {
        let text = "motion_id\tgrips\tnotes\tequipment\n\
                    CURL\t[1,2]\tfree text\t{\"BARBELL\":{\"BICEP\":1}}\n\
                    GHOST\t{\"NEUTRAL\":\"inherit\"}\t\t\n\
                    HAMMER_CURL\t{oops\t\t\n";
        let parsed = parse_import(text, &sample_motions()).unwrap();

        assert_eq!(parsed.errors.len(), 3);
        assert!(parsed.errors[1].contains("unknown motion GHOST"));
        assert_eq!(parsed.cells_parsed, 1);
        assert_eq!(
            parsed.changes[&DeltaTableKey::Equipment]["BARBELL"]["CURL"],
            DeltaValue::ScoreMap(scores(&[("BICEP", 1.0)]))
        );
        assert!(!parsed.changes.contains_key(&DeltaTableKey::Grips));
    }

    #[tokio::test]
    async fn test_apply_merges_removes_and_skips() {
        let store = sample_store().await;
        let mut matrix = DeltaMatrix::load(&store).await;
        let motions = sample_motions();

        let text = "motion_id\tmotionPaths\n\
                    HAMMER_CURL\t{\"MID_MID\":null,\"HIGH_LOW\":{\"BICEP\":2},\"NOWHERE\":{}}\n";
        let parsed = parse_import(text, &motions).unwrap();
        let report = apply_import(&store, &mut matrix, &motions, parsed).await;

        assert_eq!(report.rows_updated, 2);
        assert_eq!(report.skipped, vec!["motionPaths::NOWHERE"]);
        assert!(report.errors.is_empty());
        assert_eq!(report.synced, vec!["HAMMER_CURL", "CURL"]);

        let mid = DeltaRow::from_record(&store.row("motionPaths", "MID_MID").await.unwrap()).unwrap();
        assert_eq!(mid.rule_for("HAMMER_CURL"), DeltaValue::Absent);
        assert_eq!(mid.rule_for("CURL"), DeltaValue::ScoreMap(scores(&[("BICEPS", 5.0)])));

        let high = matrix.row(DeltaTableKey::MotionPaths, "HIGH_LOW").unwrap();
        assert_eq!(high.rule_for("HAMMER_CURL"), DeltaValue::ScoreMap(scores(&[("BICEP", 2.0)])));
    }

    #[tokio::test]
    async fn test_malformed_value_keeps_existing_rule() {
        let store = sample_store().await;
        let text = "motion_id\tmotionPaths\n\
                    CURL\t{\"MID_MID\":\"inherti\",\"HIGH_LOW\":7}\n";
        let report = import_text(&store, text).await.unwrap();

        assert_eq!(report.errors.len(), 2);
        for row_id in ["HIGH_LOW", "MID_MID"] {
            let expected = format!("row {} for CURL is not a delta value", row_id);
            assert!(report.errors.iter().any(|e| e.contains(&expected)), "{:?}", report.errors);
        }
        assert_eq!(report.rows_updated, 0);
        assert!(report.synced.is_empty());

        let mid = DeltaRow::from_record(&store.row("motionPaths", "MID_MID").await.unwrap()).unwrap();
        assert_eq!(mid.rule_for("CURL"), DeltaValue::ScoreMap(scores(&[("BICEPS", 5.0)])));
    }

    #[tokio::test]
    async fn test_write_failures_accumulate() {
        let store = FailingStore {
            inner: sample_store().await,
            failing_rows: vec!["LOW_HIGH".to_string()],
            failing_sync: false,
        };

        let text = "motion_id\tmotionPaths\n\
                    CURL\t{\"LOW_HIGH\":\"inherit\",\"HIGH_LOW\":{}}\n";
        let report = import_text(&store, text).await.unwrap();

        assert_eq!(report.rows_updated, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("motionPaths::LOW_HIGH"));
        assert_eq!(report.synced, vec!["CURL"]);
    }
}
