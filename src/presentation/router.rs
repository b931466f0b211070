// Route table
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    dashboard, export_lot, health_check, list_lots, list_machines, machine_alarms, machine_live,
    monitor_machine,
};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/api/machines", get(list_machines))
        .route("/api/dashboard", get(dashboard))
        .route("/api/machines/:id/live", get(machine_live))
        .route("/api/machines/:id/monitor", get(monitor_machine))
        .route("/api/machines/:id/alarms", get(machine_alarms))
        .route("/api/lots/:id", get(list_lots))
        .route("/api/export/:id/:lot", get(export_lot))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
