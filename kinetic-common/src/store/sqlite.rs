//! SQLite-backed table store
//!
//! Every logical table lives in one `records` table as JSON documents keyed by
//! `(table_name, id)`, with a `position` column preserving insertion order.
//! Derived motion configuration is cached in `motion_derived_config`.

use super::{merge_fields, record_id, TableStore};
use crate::matrix::DeltaMatrix;
use crate::model::{motions_from_records, Record, MOTIONS_TABLE};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{debug, info, warn};

/// Open (creating if needed) the database file and its schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create tables if missing (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            table_name TEXT NOT NULL,
            id TEXT NOT NULL,
            position INTEGER NOT NULL,
            data TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (table_name, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS motion_derived_config (
            motion_id TEXT PRIMARY KEY,
            config TEXT NOT NULL,
            synced_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Table store over a SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// In-memory database with the schema applied
    pub async fn in_memory() -> Result<Self> {
        // Single connection: each new connection would open a fresh empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        create_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace records of one table, appending new ids at the end
    ///
    /// Records without an `id` are skipped. Returns the number stored.
    pub async fn insert_records(&self, table: &str, records: &[Record]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        let mut next_position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM records WHERE table_name = ?",
        )
        .bind(table)
        .fetch_one(&mut *tx)
        .await?;

        let mut stored = 0;
        for record in records {
            let Some(id) = record_id(record) else {
                warn!("Skipping {} record without id", table);
                continue;
            };

            sqlx::query(
                r#"
                INSERT INTO records (table_name, id, position, data, updated_at)
                VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
                ON CONFLICT(table_name, id) DO UPDATE SET
                    data = excluded.data,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(table)
            .bind(id)
            .bind(next_position)
            .bind(serde_json::to_string(record)?)
            .execute(&mut *tx)
            .await?;

            next_position += 1;
            stored += 1;
        }

        tx.commit().await?;
        debug!("Stored {} records in {}", stored, table);
        Ok(stored)
    }

    /// Cached derived configuration of a motion, if synced
    pub async fn derived_config(&self, motion_id: &str) -> Result<Option<Value>> {
        let config: Option<String> =
            sqlx::query_scalar("SELECT config FROM motion_derived_config WHERE motion_id = ?")
                .bind(motion_id)
                .fetch_optional(&self.pool)
                .await?;

        config
            .map(|c| serde_json::from_str(&c).map_err(Error::from))
            .transpose()
    }
}

#[async_trait]
impl TableStore for SqliteStore {
    async fn fetch_table(&self, table: &str) -> Result<Vec<Record>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, data FROM records WHERE table_name = ? ORDER BY position ASC",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for (id, data) in rows {
            match serde_json::from_str::<Value>(&data) {
                Ok(Value::Object(record)) => records.push(record),
                Ok(_) | Err(_) => warn!("Skipping unreadable record {}::{}", table, id),
            }
        }

        Ok(records)
    }

    async fn update_row(&self, table: &str, row_id: &str, fields: Record) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let data: Option<String> =
            sqlx::query_scalar("SELECT data FROM records WHERE table_name = ? AND id = ?")
                .bind(table)
                .bind(row_id)
                .fetch_optional(&mut *tx)
                .await?;

        let data = data.ok_or_else(|| Error::NotFound(format!("{}::{}", table, row_id)))?;
        let mut record = match serde_json::from_str::<Value>(&data)? {
            Value::Object(record) => record,
            _ => return Err(Error::Store(format!("{}::{} is not a JSON object", table, row_id))),
        };
        merge_fields(&mut record, fields);

        sqlx::query(
            "UPDATE records SET data = ?, updated_at = CURRENT_TIMESTAMP WHERE table_name = ? AND id = ?",
        )
        .bind(serde_json::to_string(&record)?)
        .bind(table)
        .bind(row_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Updated {}::{}", table, row_id);
        Ok(())
    }

    async fn sync_derived_config(&self, motion_id: &str) -> Result<()> {
        let motions = motions_from_records(&self.fetch_table(MOTIONS_TABLE).await?);
        if !motions.iter().any(|m| m.id == motion_id) {
            return Err(Error::NotFound(format!("motion {}", motion_id)));
        }

        let matrix = DeltaMatrix::load(self).await;
        let config = matrix.derived_config(motion_id, &motions);

        sqlx::query(
            r#"
            INSERT INTO motion_derived_config (motion_id, config, synced_at)
            VALUES (?, ?, ?)
            ON CONFLICT(motion_id) DO UPDATE SET
                config = excluded.config,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(motion_id)
        .bind(serde_json::to_string(&config)?)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!("Synced derived config for {}", motion_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeltaRow, DeltaTableKey, DeltaValue, Motion};
    use crate::store::to_record;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_and_fetch_preserve_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        let records = vec![
            to_record(&Motion::new("ROW", "Row")).unwrap(),
            to_record(&Motion::new("CURL", "Curl")).unwrap(),
        ];
        assert_eq!(store.insert_records(MOTIONS_TABLE, &records).await.unwrap(), 2);

        let fetched = store.fetch_table(MOTIONS_TABLE).await.unwrap();
        let ids: Vec<&str> = fetched.iter().filter_map(record_id).collect();
        assert_eq!(ids, vec!["ROW", "CURL"]);
    }

    #[tokio::test]
    async fn test_update_row_merges_into_document() {
        let store = SqliteStore::in_memory().await.unwrap();
        let row = DeltaRow::new("MID_MID", "Mid to Mid").with_rule("ROW", DeltaValue::Inherit);
        store
            .insert_records("motionPaths", &[to_record(&row).unwrap()])
            .await
            .unwrap();

        let mut fields = Record::new();
        fields.insert("delta_rules".to_string(), json!({ "ROW": "inherit", "CURL": { "BICEP": 5 } }));
        store.update_row("motionPaths", "MID_MID", fields).await.unwrap();

        let fetched = store.fetch_table("motionPaths").await.unwrap();
        assert_eq!(fetched[0]["label"], json!("Mid to Mid"));
        assert_eq!(fetched[0]["delta_rules"]["CURL"]["BICEP"], json!(5));
    }

    #[tokio::test]
    async fn test_update_unknown_row_is_not_found() {
        let store = SqliteStore::in_memory().await.unwrap();
        let result = store.update_row("grips", "NEUTRAL", Record::new()).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sync_stores_resolved_rules() {
        let store = SqliteStore::in_memory().await.unwrap();
        let motions = vec![
            to_record(&Motion::new("CURL", "Curl")).unwrap(),
            to_record(&Motion::new("HAMMER_CURL", "Hammer Curl").with_parent("CURL")).unwrap(),
        ];
        store.insert_records(MOTIONS_TABLE, &motions).await.unwrap();

        let row = DeltaRow::new("MID_MID", "Mid to Mid")
            .with_rule("CURL", DeltaValue::ScoreMap([("BICEP".to_string(), 5.0)].into_iter().collect()))
            .with_rule("HAMMER_CURL", DeltaValue::Inherit);
        store
            .insert_records(DeltaTableKey::MotionPaths.as_str(), &[to_record(&row).unwrap()])
            .await
            .unwrap();

        store.sync_derived_config("HAMMER_CURL").await.unwrap();

        let config = store.derived_config("HAMMER_CURL").await.unwrap().unwrap();
        assert_eq!(config["motion_id"], json!("HAMMER_CURL"));
        assert_eq!(config["rules"]["motionPaths"]["MID_MID"]["BICEP"], json!(5.0));
    }

    #[tokio::test]
    async fn test_sync_unknown_motion_fails() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.sync_derived_config("GHOST").await.is_err());
    }
}
