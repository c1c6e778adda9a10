//! SEMS API Library
//!
//! HTTP surface for the Station Energy Management System. Translates the
//! in-process façade (`sems_engine::Engine`) into routes, DTOs, and status
//! codes; holds no state of its own.

mod session;
mod station;

use axum::{
    Router,
    routing::{get, post},
};
use sems_engine::Engine;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Health check endpoint.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Create the application router with all endpoints over a shared `Engine`.
pub fn create_app(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/station/config", get(station::get_station_config))
        .route("/station/status", get(station::get_station_status))
        .route("/station/battery", get(station::get_battery_status))
        .route("/station/load-summary", get(station::get_load_summary))
        .route("/station/recompute", post(station::force_recompute))
        .route(
            "/sessions",
            post(session::create_session).get(session::list_sessions),
        )
        .route("/sessions/{session_id}", get(session::get_session))
        .route("/sessions/{session_id}/stop", post(session::stop_session))
        .route(
            "/sessions/{session_id}/power-update",
            post(session::power_update),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use sems_core::{ChargerConfig, StationConfig};
    use tower::util::ServiceExt;

    fn test_station_config() -> StationConfig {
        StationConfig {
            station_id: "TEST_STATION".into(),
            grid_capacity: 400.0,
            chargers: vec![ChargerConfig {
                id: "CP001".into(),
                max_power: 200.0,
                connectors: 2,
            }],
            battery: None,
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let engine = Engine::new(test_station_config());
        let app = create_app(engine);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_integration_create_update_and_stop_session() {
        let engine = Engine::new(test_station_config());
        let app = create_app(engine);

        let create_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/sessions")
                    .method("POST")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"chargerId":"CP001","connectorId":1,"vehicleMaxPower":150}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(create_response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(create_response.into_body(), usize::MAX)
            .await
            .unwrap();
        let start_response: sems_engine::StartSessionResponse =
            serde_json::from_slice(&body).unwrap();
        let session_id = start_response.session_id.unwrap();

        let update_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{session_id}/power-update"))
                    .method("POST")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"consumedPower":100,"vehicleMaxPower":150}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(update_response.status(), StatusCode::OK);

        let stop_response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{session_id}/stop"))
                    .method("POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(stop_response.status(), StatusCode::OK);
    }
}
