//! repscore-server library - HTTP front end and service wiring

use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use repscore_common::service::ScoreService;
use repscore_common::store::ScoreStore;

pub mod api;
pub mod app;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Cached score lookups
    pub service: ScoreService,
    /// Direct store access for reports
    pub store: Arc<dyn ScoreStore>,
    /// Hosts the unknown websites report leaves out
    pub known_websites: Arc<[String]>,
}

impl AppState {
    pub fn new(
        service: ScoreService,
        store: Arc<dyn ScoreStore>,
        known_websites: Vec<String>,
    ) -> Self {
        Self {
            service,
            store,
            known_websites: known_websites.into(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::score_routes())
        .merge(api::report_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
