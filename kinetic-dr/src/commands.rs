//! Command-line operations against the data folder's database

use anyhow::{bail, Context, Result};
use kinetic_common::codec::{export_store, import_text, Delimiter, ImportReport};
use kinetic_common::config::TomlConfig;
use kinetic_common::grouping::resolve_grouping_id;
use kinetic_common::model::{motions_from_records, muscles_from_records, MOTIONS_TABLE, MUSCLES_TABLE};
use kinetic_common::store::{init_database, SqliteStore};
use kinetic_common::{DeltaMatrix, MuscleCatalog, Record, TableStore};
use serde_json::Value;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

pub async fn open_store(db_path: &Path) -> Result<SqliteStore> {
    let pool = init_database(db_path)
        .await
        .with_context(|| format!("opening database {}", db_path.display()))?;
    Ok(SqliteStore::new(pool))
}

/// Seed one table from a JSON array of objects
pub async fn load_table(store: &SqliteStore, table: &str, file: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let value: Value = serde_json::from_str(&content).with_context(|| format!("parsing {}", file.display()))?;

    let Value::Array(items) = value else {
        bail!("{} must contain a JSON array of records", file.display());
    };
    let records: Vec<Record> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(record) => Some(record),
            _ => None,
        })
        .collect();

    let stored = store.insert_records(table, &records).await?;
    info!("Loaded {} records into {}", stored, table);
    Ok(stored)
}

pub async fn export(store: &SqliteStore, delimiter: Delimiter) -> Result<String> {
    Ok(export_store(store, delimiter).await?)
}

pub async fn import(store: &SqliteStore, file: &Path) -> Result<ImportReport> {
    let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    Ok(import_text(store, &text).await?)
}

/// Plain-text summary of one motion: grouping and per-table relationships
pub async fn report(store: &SqliteStore, config: &TomlConfig, motion_id: &str) -> Result<String> {
    let motions = motions_from_records(&store.fetch_table(MOTIONS_TABLE).await?);
    let Some(motion) = motions.iter().find(|m| m.id == motion_id) else {
        bail!("unknown motion {}", motion_id);
    };
    let catalog = MuscleCatalog::new(muscles_from_records(&store.fetch_table(MUSCLES_TABLE).await?));
    let matrix = DeltaMatrix::load(store).await;

    let mut out = String::new();
    writeln!(out, "{} ({})", motion.label, motion.id)?;
    if let Some(parent) = &motion.parent_id {
        writeln!(out, "  variant of {}", parent)?;
    }
    let grouping = resolve_grouping_id(motion, &catalog, config.engine.grouping_threshold)
        .map(|id| format!("{} ({})", catalog.label_of(&id), id))
        .unwrap_or_else(|| "none".to_string());
    writeln!(out, "  grouping: {}", grouping)?;

    for (table, rows) in matrix.relationships_for(motion_id) {
        if rows.is_empty() {
            continue;
        }
        let counts = matrix.counts_for(motion_id, table);
        writeln!(
            out,
            "  {}: {} rows ({} inherit, {} empty, {} configured)",
            table.label(),
            counts.total,
            counts.inherit,
            counts.empty,
            counts.configured
        )?;
        for row in rows {
            let value = row
                .value
                .to_json()
                .map(|v| v.to_string())
                .unwrap_or_default();
            writeln!(out, "    {} [{}] {}", row.row_label, row.row_id, value)?;
        }
    }

    Ok(out)
}
