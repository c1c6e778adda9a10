use axum::{Json, extract::State};
use sems_core::StationConfig;
use sems_engine::Engine;
use std::sync::Arc;

/// Get current station configuration. Immutable after construction (spec §3).
pub async fn get_station_config(State(engine): State<Arc<Engine>>) -> Json<StationConfig> {
    Json(engine.config().clone())
}

/// Get station status: config summary, active sessions, and allocations.
pub async fn get_station_status(State(engine): State<Arc<Engine>>) -> Json<sems_engine::StationStatus> {
    tracing::debug!("getting station status");
    Json(engine.station_status())
}

/// Get current BESS status, if a battery is configured.
pub async fn get_battery_status(State(engine): State<Arc<Engine>>) -> Json<Option<sems_core::BessStatus>> {
    Json(engine.battery_status())
}

/// Get load summary: utilization and Jain's fairness index.
pub async fn get_load_summary(State(engine): State<Arc<Engine>>) -> Json<sems_engine::LoadSummary> {
    Json(engine.load_summary())
}

/// Force an immediate recomputation.
pub async fn force_recompute(
    State(engine): State<Arc<Engine>>,
) -> Json<std::collections::HashMap<uuid::Uuid, f64>> {
    tracing::info!("forcing recompute");
    Json(engine.recompute())
}
