//! Motion endpoints: relationships, grouping and single-cell edits

use axum::{
    extract::{Path, State},
    Json,
};
use kinetic_common::grouping::{group_motions_at, resolve_grouping_id, save_grouping, GroupedEntry};
use kinetic_common::matrix::{quick_set, sync_motions, sync_targets, Relationship, RelationshipCounts};
use kinetic_common::model::CellState;
use kinetic_common::selectable::{option_groups, selectable_ids, OptionGroup};
use kinetic_common::{DeltaMatrix, DeltaTableKey, DeltaValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{find_motion, load_catalog, load_motions};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TableRelationships {
    pub table: DeltaTableKey,
    pub label: &'static str,
    pub counts: RelationshipCounts,
    pub rows: Vec<Relationship>,
}

#[derive(Debug, Serialize)]
pub struct RelationshipsResponse {
    pub motion_id: String,
    pub motion_label: String,
    pub tables: Vec<TableRelationships>,
}

/// GET /api/motions/:id/relationships
///
/// Every delta table with the rows referencing the motion, sorted by label.
pub async fn motion_relationships(
    State(state): State<AppState>,
    Path(motion_id): Path<String>,
) -> ApiResult<Json<RelationshipsResponse>> {
    let store = state.store.as_ref();
    let motions = load_motions(store).await?;
    let motion = find_motion(&motions, &motion_id)?;
    let matrix = DeltaMatrix::load(store).await;

    let tables = matrix
        .relationships_for(&motion_id)
        .into_iter()
        .map(|(table, rows)| TableRelationships {
            table,
            label: table.label(),
            counts: matrix.counts_for(&motion_id, table),
            rows,
        })
        .collect();

    Ok(Json(RelationshipsResponse {
        motion_id: motion.id.clone(),
        motion_label: motion.label.clone(),
        tables,
    }))
}

#[derive(Debug, Serialize)]
pub struct GroupingResponse {
    pub motion_id: String,
    /// Stored override, if any
    pub stored: Option<String>,
    pub effective: Option<String>,
    pub effective_label: Option<String>,
    pub options: Vec<OptionGroup>,
}

async fn grouping_response(state: &AppState, motion_id: &str) -> ApiResult<GroupingResponse> {
    let store = state.store.as_ref();
    let engine = &state.config.engine;
    let motions = load_motions(store).await?;
    let motion = find_motion(&motions, motion_id)?;
    let catalog = load_catalog(store).await?;

    let effective = resolve_grouping_id(motion, &catalog, engine.grouping_threshold);
    let selectable = selectable_ids(&motion.muscle_targets, &catalog, engine.selectable_threshold);

    Ok(GroupingResponse {
        motion_id: motion.id.clone(),
        stored: motion.muscle_grouping_id.clone(),
        effective_label: effective.as_deref().map(|id| catalog.label_of(id).to_string()),
        effective,
        options: option_groups(&selectable, &catalog, &engine.path_separator),
    })
}

/// GET /api/motions/:id/grouping
pub async fn motion_grouping(
    State(state): State<AppState>,
    Path(motion_id): Path<String>,
) -> ApiResult<Json<GroupingResponse>> {
    Ok(Json(grouping_response(&state, &motion_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct GroupingRequest {
    /// `null` clears the override
    pub muscle_grouping_id: Option<String>,
}

/// PUT /api/motions/:id/grouping
pub async fn save_motion_grouping(
    State(state): State<AppState>,
    Path(motion_id): Path<String>,
    Json(request): Json<GroupingRequest>,
) -> ApiResult<Json<GroupingResponse>> {
    let store = state.store.as_ref();
    find_motion(&load_motions(store).await?, &motion_id)?;

    let muscle_id = request.muscle_grouping_id.as_deref().filter(|id| !id.is_empty());
    if let Some(id) = muscle_id {
        if !load_catalog(store).await?.contains(id) {
            return Err(ApiError::BadRequest(format!("unknown muscle {}", id)));
        }
    }

    save_grouping(store, &motion_id, muscle_id).await?;
    info!("Grouping of {} set to {:?}", motion_id, muscle_id);
    Ok(Json(grouping_response(&state, &motion_id).await?))
}

/// GET /api/motions/grouped
pub async fn grouped_motions(State(state): State<AppState>) -> ApiResult<Json<Vec<GroupedEntry>>> {
    let store = state.store.as_ref();
    let motions = load_motions(store).await?;
    let catalog = load_catalog(store).await?;
    Ok(Json(group_motions_at(&motions, &catalog, state.config.engine.grouping_threshold)))
}

#[derive(Debug, Serialize)]
pub struct CellResponse {
    pub table: DeltaTableKey,
    pub row_id: String,
    pub motion_id: String,
    pub state: CellState,
    pub value: DeltaValue,
    /// Motions whose derived config was refreshed
    pub synced: Vec<String>,
}

/// PUT /api/tables/:table/rows/:row_id/motions/:motion_id
///
/// Body is the new stored value: `"inherit"`, a score-map object, or `null`
/// to remove the relationship.
pub async fn set_cell(
    State(state): State<AppState>,
    Path((table, row_id, motion_id)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> ApiResult<Json<CellResponse>> {
    let store = state.store.as_ref();
    let key = DeltaTableKey::parse(&table).ok_or_else(|| ApiError::NotFound(format!("table {}", table)))?;
    let motions = load_motions(store).await?;
    find_motion(&motions, &motion_id)?;

    let value = DeltaValue::from_import(&body).ok_or_else(|| {
        ApiError::BadRequest("value must be \"inherit\", a score-map object or null".to_string())
    })?;
    let mut matrix = DeltaMatrix::load(store).await;
    quick_set(store, &mut matrix, key, &row_id, &motion_id, value).await?;

    let (synced, sync_warnings) = sync_motions(store, sync_targets(&motion_id, &motions)).await;
    if !sync_warnings.is_empty() {
        warn!("Cell {}::{} saved with {} sync warning(s)", key, row_id, sync_warnings.len());
    }

    let stored = matrix
        .row(key, &row_id)
        .map(|row| row.rule_for(&motion_id))
        .unwrap_or(DeltaValue::Absent);
    Ok(Json(CellResponse {
        table: key,
        row_id,
        motion_id,
        state: stored.state(),
        value: stored,
        synced,
    }))
}
