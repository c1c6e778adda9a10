use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Station-wide configuration, immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationConfig {
    pub station_id: String,
    /// Grid import limit, in kW.
    pub grid_capacity: f64,
    pub chargers: Vec<ChargerConfig>,
    pub battery: Option<BatteryConfig>,
}

/// A physical charger with one or more connectors sharing `max_power`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargerConfig {
    pub id: String,
    /// Maximum power in kW, shared across all connectors of this charger.
    pub max_power: f64,
    /// Number of connectors, 1-based ids in `[1, connectors]`.
    pub connectors: u8,
}

/// Stationary battery configuration, immutable after construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryConfig {
    /// Total energy capacity, in kWh.
    pub capacity: f64,
    /// Symmetric max charge/discharge power, in kW.
    pub power: f64,
}

/// Composite key identifying a physical connector slot.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorId {
    pub charger_id: String,
    pub idx: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Starting,
    Active,
    Stopping,
    Completed,
}

/// One active charging engagement of a vehicle on a specific connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: uuid::Uuid,
    pub connector_id: ConnectorId,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub vehicle_max_power: f64,
    pub allocated_power: f64,
    pub consumed_power: f64,
    pub total_energy: f64,
    pub state: SessionState,
}

impl Session {
    pub(crate) fn new(connector_id: ConnectorId, vehicle_max_power: f64) -> Self {
        let now = Utc::now();
        Session {
            session_id: uuid::Uuid::new_v4(),
            connector_id,
            start_time: now,
            last_update: now,
            vehicle_max_power,
            allocated_power: 0.0,
            consumed_power: 0.0,
            total_energy: 0.0,
            state: SessionState::Active,
        }
    }

    pub fn charger_id(&self) -> &str {
        &self.connector_id.charger_id
    }
}

/// A read-only view of the fields the allocator needs, taken at a single
/// instant. Later mutations to the session do not affect a snapshot already
/// taken.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: uuid::Uuid,
    pub charger_id: String,
    pub vehicle_max_power: f64,
}
