// Presentation layer - Local HTTP bridge for chart components
pub mod app_state;
pub mod chart;
pub mod handlers;

use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    connection_status, health_check, projection, projection_stream, start_preset, stop_preset, unit_chart, update_session,
};
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/connection", get(connection_status))
        .route("/projection", get(projection))
        .route("/projection/stream", get(projection_stream))
        .route("/session", put(update_session))
        .route("/units/:id/chart", get(unit_chart))
        .route("/units/:id/preset", post(start_preset).delete(stop_preset))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
