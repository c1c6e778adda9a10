//! In-process façade over `sems_core`: the external interface described in
//! the core's spec §6. Each mutating call performs a registry mutation
//! followed by a synchronous recompute, so callers always observe
//! post-recompute allocations.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sems_core::{
    Allocator, BessController, BessStatus, SessionError, SessionRegistry, StationConfig,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StartStatus {
    SessionStarted,
    InvalidChargerOrConnector,
    ConnectorOccupied,
    SessionStartFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateStatus {
    PowerUpdated,
    SessionNotFound,
    InvalidConsumedPower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopStatus {
    Ok,
    SessionNotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionResponse {
    pub session_id: Option<uuid::Uuid>,
    pub allocated_power: f64,
    pub total_energy: f64,
    pub status: StartStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePowerResponse {
    pub new_allocated_power: f64,
    pub total_energy: f64,
    pub status: UpdateStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopSessionResponse {
    pub charger_id: Option<String>,
    pub connector_id: Option<u8>,
    pub final_allocated_power: Option<f64>,
    pub last_consumed_power: Option<f64>,
    pub stop_time: Option<DateTime<Utc>>,
    pub status: StopStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationStatus {
    pub station_id: String,
    pub grid_capacity: f64,
    pub active_sessions: usize,
    pub total_allocated: f64,
    pub total_consumed: f64,
    pub allocations: HashMap<uuid::Uuid, f64>,
    pub battery: Option<BessStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSummary {
    pub total_allocated: f64,
    pub total_consumed: f64,
    pub grid_utilization: f64,
    pub fairness_index: f64,
    pub battery: Option<BessStatus>,
}

/// Wires a `SessionRegistry` and an optional `BessController` together and
/// drives `Allocator::recompute` on every lifecycle event. Safe to share
/// behind a bare `Arc` — every inner component already synchronizes its own
/// state, so no outer lock is required (spec §5: "no global lock is
/// required across the allocator").
pub struct Engine {
    config: StationConfig,
    registry: SessionRegistry,
    bess: Option<BessController>,
}

impl Engine {
    pub fn new(config: StationConfig) -> Arc<Self> {
        let bess = config.battery.map(BessController::new);
        let registry = SessionRegistry::new(config.clone());
        Arc::new(Engine {
            config,
            registry,
            bess,
        })
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn start_session(
        &self,
        charger_id: &str,
        connector_id: u8,
        vehicle_max_power: f64,
    ) -> StartSessionResponse {
        match self.registry.start(charger_id, connector_id, vehicle_max_power) {
            Ok(session) => {
                self.recompute();
                let session = self
                    .registry
                    .get_session(session.session_id)
                    .unwrap_or(session);
                StartSessionResponse {
                    session_id: Some(session.session_id),
                    allocated_power: session.allocated_power,
                    total_energy: session.total_energy,
                    status: StartStatus::SessionStarted,
                }
            }
            Err(SessionError::UnknownCharger(_)) | Err(SessionError::InvalidConnector { .. }) => {
                StartSessionResponse {
                    session_id: None,
                    allocated_power: 0.0,
                    total_energy: 0.0,
                    status: StartStatus::InvalidChargerOrConnector,
                }
            }
            Err(SessionError::ConnectorOccupied(_)) => StartSessionResponse {
                session_id: None,
                allocated_power: 0.0,
                total_energy: 0.0,
                status: StartStatus::ConnectorOccupied,
            },
            Err(_) => StartSessionResponse {
                session_id: None,
                allocated_power: 0.0,
                total_energy: 0.0,
                status: StartStatus::SessionStartFailed,
            },
        }
    }

    pub fn update_power(
        &self,
        session_id: uuid::Uuid,
        consumed_power: f64,
        vehicle_max_power: f64,
    ) -> UpdatePowerResponse {
        match self
            .registry
            .update_power(session_id, consumed_power, vehicle_max_power)
        {
            Ok(_) => {
                self.recompute();
                let session = self
                    .registry
                    .get_session(session_id)
                    .expect("session present immediately after a successful update");
                UpdatePowerResponse {
                    new_allocated_power: session.allocated_power,
                    total_energy: session.total_energy,
                    status: UpdateStatus::PowerUpdated,
                }
            }
            Err(SessionError::SessionNotFound(_)) => {
                UpdatePowerResponse {
                    new_allocated_power: 0.0,
                    total_energy: 0.0,
                    status: UpdateStatus::SessionNotFound,
                }
            }
            Err(_) => {
                // leave session state unchanged; caller resynchronizes from
                // the current allocated power
                let current = self
                    .registry
                    .get_session(session_id)
                    .map(|s| (s.allocated_power, s.total_energy))
                    .unwrap_or((0.0, 0.0));
                UpdatePowerResponse {
                    new_allocated_power: current.0,
                    total_energy: current.1,
                    status: UpdateStatus::InvalidConsumedPower,
                }
            }
        }
    }

    pub fn stop_session(&self, session_id: uuid::Uuid) -> StopSessionResponse {
        match self.registry.stop(session_id) {
            Ok(session) => {
                self.recompute();
                StopSessionResponse {
                    charger_id: Some(session.charger_id().to_string()),
                    connector_id: Some(session.connector_id.idx),
                    final_allocated_power: Some(session.allocated_power),
                    last_consumed_power: Some(session.consumed_power),
                    stop_time: Some(session.last_update),
                    status: StopStatus::Ok,
                }
            }
            Err(_) => StopSessionResponse {
                charger_id: None,
                connector_id: None,
                final_allocated_power: None,
                last_consumed_power: None,
                stop_time: None,
                status: StopStatus::SessionNotFound,
            },
        }
    }

    pub fn get_session(&self, session_id: uuid::Uuid) -> Option<sems_core::Session> {
        self.registry.get_session(session_id)
    }

    pub fn list_sessions(&self) -> Vec<sems_core::Session> {
        self.registry.list_sessions()
    }

    pub fn station_status(&self) -> StationStatus {
        let sessions = self.registry.list_sessions();
        StationStatus {
            station_id: self.config.station_id.clone(),
            grid_capacity: self.config.grid_capacity,
            active_sessions: sessions.len(),
            total_allocated: sessions.iter().map(|s| s.allocated_power).sum(),
            total_consumed: sessions.iter().map(|s| s.consumed_power).sum(),
            allocations: sessions
                .iter()
                .map(|s| (s.session_id, s.allocated_power))
                .collect(),
            battery: self.bess.as_ref().map(|b| b.status()),
        }
    }

    pub fn battery_status(&self) -> Option<BessStatus> {
        self.bess.as_ref().map(|b| b.status())
    }

    pub fn load_summary(&self) -> LoadSummary {
        let sessions = self.registry.list_sessions();
        let total_allocated: f64 = sessions.iter().map(|s| s.allocated_power).sum();
        let total_consumed: f64 = sessions.iter().map(|s| s.consumed_power).sum();
        let grid_utilization = if self.config.grid_capacity > 0.0 {
            total_allocated / self.config.grid_capacity
        } else {
            0.0
        };
        let fairness_index = jains_fairness_index(
            &sessions.iter().map(|s| s.allocated_power).collect::<Vec<_>>(),
        );
        LoadSummary {
            total_allocated,
            total_consumed,
            grid_utilization,
            fairness_index,
            battery: self.bess.as_ref().map(|b| b.status()),
        }
    }

    /// Forces a recomputation and returns the new allocation map.
    pub fn recompute(&self) -> HashMap<uuid::Uuid, f64> {
        let snapshot = self.registry.snapshot();
        let allocations = Allocator::recompute(
            &snapshot,
            self.registry.chargers(),
            self.config.grid_capacity,
            self.bess.as_ref(),
        );
        for (session_id, power) in &allocations {
            self.registry.set_allocated(*session_id, *power);
        }
        allocations
    }
}

/// `(Σx)² / (n · Σx²)`, with the convention that an empty set or an
/// all-zero set returns 1.0 (perfectly "fair" by vacuous equality).
fn jains_fairness_index(values: &[f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 1.0;
    }
    let sum: f64 = values.iter().sum();
    let sum_sq: f64 = values.iter().map(|v| v * v).sum();
    if sum_sq == 0.0 {
        return 1.0;
    }
    (sum * sum) / (n as f64 * sum_sq)
}
