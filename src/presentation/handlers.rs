// HTTP request handlers
use crate::application::connection::ConnectionStatus;
use crate::application::projection::ProjectionSnapshot;
use crate::application::unit_control::ControlError;
use crate::domain::session::SessionConfig;
use crate::presentation::app_state::AppState;
use crate::presentation::chart::{build_chart, ChartSeries};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::Stream;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct ChartQuery {
    pub metrics: String,
}

#[derive(Deserialize)]
pub struct StartPresetBody {
    pub preset_id: i64,
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = match self {
            ControlError::UnknownUnit(_) => StatusCode::NOT_FOUND,
            ControlError::Rejected(_) => StatusCode::BAD_GATEWAY,
        };
        (status, self.to_string()).into_response()
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Current connection state and retry count
pub async fn connection_status(State(state): State<Arc<AppState>>) -> Json<ConnectionStatus> {
    Json(state.connection.status())
}

/// Latest emitted projection
pub async fn projection(State(state): State<Arc<AppState>>) -> Json<ProjectionSnapshot> {
    Json(state.projection.current().as_ref().clone())
}

/// Server-sent events: the current projection, then every emission after it
pub async fn projection_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let mut rx = state.projection.subscribe();
    let stream = async_stream::stream! {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            yield Event::default().event("projection").json_data(snapshot.as_ref());
            if rx.changed().await.is_err() {
                break;
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Downsampled chart series for one unit
pub async fn unit_chart(
    Path(unit_id): Path<i64>,
    Query(query): Query<ChartQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ChartSeries>>, StatusCode> {
    let metrics: Vec<&str> = query
        .metrics
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .collect();
    if metrics.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let snapshot = state.projection.current();
    let view = snapshot.unit(unit_id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(build_chart(view, &metrics, snapshot.window, &state.point_budgets)))
}

/// Replace the active session (mode, unit, window, limit)
///
/// A change of window alone keeps the current data on screen until the new history lands.
pub async fn update_session(
    State(state): State<Arc<AppState>>,
    Json(config): Json<SessionConfig>,
) -> impl IntoResponse {
    let window_only = state
        .connection
        .current_config()
        .await
        .is_some_and(|active| active.differs_only_in_window(&config));

    let result = if window_only {
        state.connection.set_window(config.window).await
    } else {
        state.connection.connect(config).await
    };

    match result {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            tracing::warn!("Rejected session change: {:#}", e);
            (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response()
        }
    }
}

pub async fn start_preset(
    Path(unit_id): Path<i64>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartPresetBody>,
) -> Result<StatusCode, ControlError> {
    state.control.set_active_preset(unit_id, body.preset_id).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn stop_preset(
    Path(unit_id): Path<i64>,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ControlError> {
    state.control.clear_active_preset(unit_id).await?;
    Ok(StatusCode::ACCEPTED)
}
