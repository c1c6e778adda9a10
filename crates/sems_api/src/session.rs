use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sems_engine::{Engine, StartStatus, StopStatus, UpdateStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub charger_id: String,
    pub connector_id: u8,
    pub vehicle_max_power: f64,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerUpdateRequest {
    pub consumed_power: f64,
    pub vehicle_max_power: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
}

/// Start a new charging session on a connector.
pub async fn create_session(
    State(engine): State<Arc<Engine>>,
    Json(payload): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let response = engine.start_session(
        &payload.charger_id,
        payload.connector_id,
        payload.vehicle_max_power,
    );
    let status = match response.status {
        StartStatus::SessionStarted => StatusCode::OK,
        StartStatus::InvalidChargerOrConnector => StatusCode::NOT_FOUND,
        StartStatus::ConnectorOccupied => StatusCode::CONFLICT,
        StartStatus::SessionStartFailed => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(response))
}

/// Report consumed power for an existing session.
pub async fn power_update(
    State(engine): State<Arc<Engine>>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<PowerUpdateRequest>,
) -> impl IntoResponse {
    let response = engine.update_power(
        session_id,
        payload.consumed_power,
        payload.vehicle_max_power,
    );
    let status = match response.status {
        UpdateStatus::PowerUpdated => StatusCode::OK,
        UpdateStatus::SessionNotFound => StatusCode::NOT_FOUND,
        UpdateStatus::InvalidConsumedPower => StatusCode::BAD_REQUEST,
    };
    (status, Json(response))
}

/// Stop an existing charging session.
pub async fn stop_session(
    State(engine): State<Arc<Engine>>,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    let response = engine.stop_session(session_id);
    let status = match response.status {
        StopStatus::Ok => StatusCode::OK,
        StopStatus::SessionNotFound => StatusCode::NOT_FOUND,
    };
    (status, Json(response))
}

/// Get a single session by id.
pub async fn get_session(
    State(engine): State<Arc<Engine>>,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    match engine.get_session(session_id) {
        Some(session) => (StatusCode::OK, Json(session)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("session {session_id} not found"),
            }),
        )
            .into_response(),
    }
}

/// List all active sessions.
pub async fn list_sessions(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    Json(engine.list_sessions())
}
