//! HTTP API handlers for kinetic-dr

pub mod exchange;
pub mod health;
pub mod motions;

pub use exchange::{export_rules, import_rules};
pub use health::health_routes;
pub use motions::{grouped_motions, motion_grouping, motion_relationships, save_motion_grouping, set_cell};

use crate::error::{ApiError, ApiResult};
use kinetic_common::model::{motions_from_records, muscles_from_records, MOTIONS_TABLE, MUSCLES_TABLE};
use kinetic_common::{Motion, MuscleCatalog, TableStore};

pub(crate) async fn load_motions<S: TableStore + ?Sized>(store: &S) -> ApiResult<Vec<Motion>> {
    Ok(motions_from_records(&store.fetch_table(MOTIONS_TABLE).await?))
}

pub(crate) async fn load_catalog<S: TableStore + ?Sized>(store: &S) -> ApiResult<MuscleCatalog> {
    Ok(MuscleCatalog::new(muscles_from_records(&store.fetch_table(MUSCLES_TABLE).await?)))
}

pub(crate) fn find_motion<'a>(motions: &'a [Motion], motion_id: &str) -> ApiResult<&'a Motion> {
    motions
        .iter()
        .find(|m| m.id == motion_id)
        .ok_or_else(|| ApiError::NotFound(format!("motion {}", motion_id)))
}
