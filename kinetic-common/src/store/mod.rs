//! Table store collaborator
//!
//! The engine never performs I/O on its own; everything it reads or writes
//! goes through [`TableStore`]. Two implementations ship with the crate:
//! [`MemoryStore`] for tests and seeding, and `SqliteStore` (feature `sqlx`)
//! for the delta-rules service.
//!
//! Callers must not run two commits against the same row at once: stores are
//! last-write-wins and one side's edit would be lost.

use crate::model::Record;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

#[cfg(feature = "sqlx")]
pub mod sqlite;

#[cfg(feature = "sqlx")]
pub use sqlite::{init_database, SqliteStore};

/// Persistence collaborator consumed by the matrix and the exchange codec
#[async_trait]
pub trait TableStore: Send + Sync {
    /// All rows of a named table, in stored order
    ///
    /// Unknown tables yield an empty vector.
    async fn fetch_table(&self, table: &str) -> Result<Vec<Record>>;

    /// Shallow-merge `fields` into one existing row
    async fn update_row(&self, table: &str, row_id: &str, fields: Record) -> Result<()>;

    /// Recompute cached configuration derived from a motion's delta rules
    async fn sync_derived_config(&self, motion_id: &str) -> Result<()>;
}

/// In-memory table store
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
    synced: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a whole table
    pub async fn insert_table(&self, table: &str, records: Vec<Record>) {
        self.tables.write().await.insert(table.to_string(), records);
    }

    /// Find one row by id
    pub async fn row(&self, table: &str, row_id: &str) -> Option<Record> {
        self.tables
            .read()
            .await
            .get(table)
            .and_then(|rows| rows.iter().find(|r| record_id(r) == Some(row_id)).cloned())
    }

    /// Motion ids passed to `sync_derived_config`, in call order
    pub async fn synced_motions(&self) -> Vec<String> {
        self.synced.lock().await.clone()
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn fetch_table(&self, table: &str) -> Result<Vec<Record>> {
        Ok(self.tables.read().await.get(table).cloned().unwrap_or_default())
    }

    async fn update_row(&self, table: &str, row_id: &str, fields: Record) -> Result<()> {
        let mut tables = self.tables.write().await;
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| record_id(r) == Some(row_id)))
            .ok_or_else(|| Error::NotFound(format!("{}::{}", table, row_id)))?;

        debug!("Updating {}::{} ({} fields)", table, row_id, fields.len());
        merge_fields(row, fields);
        Ok(())
    }

    async fn sync_derived_config(&self, motion_id: &str) -> Result<()> {
        self.synced.lock().await.push(motion_id.to_string());
        Ok(())
    }
}

/// `id` field of a record
pub fn record_id(record: &Record) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

/// Shallow merge: every given field replaces the stored one
pub fn merge_fields(row: &mut Record, fields: Record) {
    for (key, value) in fields {
        row.insert(key, value);
    }
}

/// Serialize a model value into a store record
pub fn to_record<T: serde::Serialize>(value: &T) -> Result<Record> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidInput(format!(
            "expected a JSON object record, got {}",
            other
        ))),
    }
}
