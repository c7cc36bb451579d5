//! Exchange endpoints: delimited export and import

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use kinetic_common::codec::{apply_import, export_matrix, parse_import, Delimiter, ImportReport};
use kinetic_common::DeltaMatrix;
use serde::Deserialize;

use super::load_motions;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// `tab` or `comma`; the configured delimiter when omitted
    pub delimiter: Option<String>,
}

/// GET /api/export
pub async fn export_rules(State(state): State<AppState>, Query(query): Query<ExportQuery>) -> ApiResult<Response> {
    let delimiter = match query.delimiter.as_deref() {
        Some(name) => Delimiter::parse(name).ok_or_else(|| ApiError::BadRequest(format!("unknown delimiter {}", name)))?,
        None => state.config.exchange.delimiter,
    };

    let store = state.store.as_ref();
    let motions = load_motions(store).await?;
    let matrix = DeltaMatrix::load(store).await;
    let text = export_matrix(&motions, &matrix, delimiter)?;

    let content_type = match delimiter {
        Delimiter::Tab => "text/tab-separated-values; charset=utf-8",
        Delimiter::Comma => "text/csv; charset=utf-8",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], text).into_response())
}

/// POST /api/import
///
/// Body is the delimited document. Header problems reject the request; every
/// other problem is listed in the report.
pub async fn import_rules(State(state): State<AppState>, body: String) -> ApiResult<Json<ImportReport>> {
    let store = state.store.as_ref();
    let motions = load_motions(store).await?;
    let parsed = parse_import(&body, &motions)?;

    let mut matrix = DeltaMatrix::load(store).await;
    Ok(Json(apply_import(store, &mut matrix, &motions, parsed).await))
}
