//! kinetic-dr library - Delta Rules service
//!
//! HTTP API and command implementations over the shared Kinetic engine.

use axum::Router;
use kinetic_common::config::TomlConfig;
use kinetic_common::store::SqliteStore;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod commands;
pub mod error;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub config: Arc<TomlConfig>,
}

impl AppState {
    pub fn new(store: SqliteStore, config: TomlConfig) -> Self {
        Self {
            store: Arc::new(store),
            config: Arc::new(config),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post, put};

    let api = Router::new()
        .route("/api/motions/grouped", get(api::grouped_motions))
        .route("/api/motions/:id/relationships", get(api::motion_relationships))
        .route(
            "/api/motions/:id/grouping",
            get(api::motion_grouping).put(api::save_motion_grouping),
        )
        .route("/api/tables/:table/rows/:row_id/motions/:motion_id", put(api::set_cell))
        .route("/api/export", get(api::export_rules))
        .route("/api/import", post(api::import_rules));

    Router::new()
        .merge(api)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
