// HTTP request handlers
use crate::application::error::MonitorError;
use crate::domain::machine::MachineId;
use crate::infrastructure::ndjson_stream::stream_from_receiver;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// Error body the dashboard client understands
pub struct ApiError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0.downcast_ref::<MonitorError>() {
            Some(MonitorError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
            }
            _ => {
                tracing::error!("Request failed: {:#}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": self.0.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Latest reading of every machine, in configured order
pub async fn list_machines(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.machine_service.list_machines())
}

/// Dashboard cards with alarm flags
pub async fn dashboard(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.machine_service.dashboard())
}

/// Latest reading of one machine
pub async fn machine_live(
    Path(id): Path<u32>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.machine_service.get_machine(MachineId(id))?))
}

/// Live monitoring session; the session ends when the client disconnects
pub async fn monitor_machine(
    Path(id): Path<u32>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let rx = state.monitor_service.open_session(MachineId(id)).await?;
    Ok(stream_from_receiver(rx))
}

/// Alarms found in the logged backlog of one machine
pub async fn machine_alarms(
    Path(id): Path<u32>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.machine_service.alarm_backlog(MachineId(id)).await?))
}

/// Lots logged for one machine
pub async fn list_lots(
    Path(id): Path<u32>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.machine_service.lots(MachineId(id)).await?))
}

/// Logged rows of one lot
pub async fn export_lot(
    Path((id, lot)): Path<(u32, String)>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.machine_service.export(MachineId(id), &lot).await?))
}
