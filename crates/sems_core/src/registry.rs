use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::SessionError;
use crate::models::{ChargerConfig, ConnectorId, Session, SessionSnapshot, SessionState, StationConfig};

/// Owns session identity and connector exclusivity for one station.
///
/// Per-session field mutations ([`Self::update_power`], [`Self::set_allocated`])
/// take only that session's own lock. Structural mutations that touch both the
/// session map and the connector index ([`Self::start`], [`Self::stop`]) are
/// additionally serialized behind `structural_lock` so no observer ever sees a
/// connector bound to a session the session map doesn't (yet, or any longer)
/// contain.
pub struct SessionRegistry {
    config: StationConfig,
    chargers: HashMap<String, ChargerConfig>,
    sessions: DashMap<uuid::Uuid, Arc<Mutex<Session>>>,
    connectors: DashMap<(String, u8), uuid::Uuid>,
    structural_lock: Mutex<()>,
}

impl SessionRegistry {
    pub fn new(config: StationConfig) -> Self {
        let chargers = config
            .chargers
            .iter()
            .map(|c| (c.id.clone(), c.clone()))
            .collect();
        SessionRegistry {
            config,
            chargers,
            sessions: DashMap::new(),
            connectors: DashMap::new(),
            structural_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn chargers(&self) -> &HashMap<String, ChargerConfig> {
        &self.chargers
    }

    pub fn is_connector_available(&self, charger_id: &str, idx: u8) -> bool {
        !self
            .connectors
            .contains_key(&(charger_id.to_string(), idx))
    }

    /// Start a new session on `(charger_id, idx)`. Validates the connector
    /// against the station config, then commits both indexes atomically: a
    /// concurrent winner that claims the connector first causes this call to
    /// roll back and return `ConnectorOccupied`.
    pub fn start(
        &self,
        charger_id: &str,
        idx: u8,
        vehicle_max_power: f64,
    ) -> Result<Session, SessionError> {
        let charger = self
            .chargers
            .get(charger_id)
            .ok_or_else(|| SessionError::UnknownCharger(charger_id.to_string()))?;
        if idx == 0 || idx > charger.connectors {
            return Err(SessionError::InvalidConnector {
                charger_id: charger_id.to_string(),
                idx,
            });
        }

        let connector_id = ConnectorId {
            charger_id: charger_id.to_string(),
            idx,
        };

        let _guard = self.structural_lock.lock().unwrap();

        let key = (charger_id.to_string(), idx);
        let slot = match self.connectors.entry(key.clone()) {
            Entry::Occupied(_) => return Err(SessionError::ConnectorOccupied(connector_id)),
            Entry::Vacant(v) => v,
        };

        let candidate = Session::new(connector_id, vehicle_max_power);
        match self.sessions.entry(candidate.session_id) {
            Entry::Occupied(_) => {
                // vanishingly unlikely uuid v4 collision; fail rather than overwrite
                return Err(SessionError::InternalError(format!(
                    "session id collision on {}",
                    candidate.session_id
                )));
            }
            Entry::Vacant(v) => {
                v.insert(Arc::new(Mutex::new(candidate.clone())));
            }
        }

        slot.insert(candidate.session_id);
        Ok(candidate)
    }

    /// Remove a session from both indexes and mark it `STOPPING`. Returns the
    /// final session state as observed at removal time.
    pub fn stop(&self, session_id: uuid::Uuid) -> Result<Session, SessionError> {
        let _guard = self.structural_lock.lock().unwrap();

        let (_, cell) = self
            .sessions
            .remove(&session_id)
            .ok_or(SessionError::SessionNotFound(session_id))?;

        let mut session = cell.lock().unwrap();
        session.state = SessionState::Stopping;
        let connector_key = (session.charger_id().to_string(), session.connector_id.idx);
        self.connectors.remove(&connector_key);
        Ok(session.clone())
    }

    /// Report newly consumed power and integrate it into `total_energy`
    /// based on wall-clock elapsed time since the session's last update.
    pub fn update_power(
        &self,
        session_id: uuid::Uuid,
        consumed_power: f64,
        vehicle_max_power: f64,
    ) -> Result<Session, SessionError> {
        if consumed_power < 0.0 || vehicle_max_power < 0.0 {
            return Err(SessionError::InvalidInput(
                "consumedPower and vehicleMaxPower must be non-negative".into(),
            ));
        }
        if consumed_power > vehicle_max_power {
            return Err(SessionError::InvalidInput(
                "consumedPower cannot exceed vehicleMaxPower".into(),
            ));
        }

        let cell = self
            .sessions
            .get(&session_id)
            .ok_or(SessionError::SessionNotFound(session_id))?
            .clone();
        let mut session = cell.lock().unwrap();

        let now = Utc::now();
        let elapsed_hours = (now - session.last_update)
            .num_milliseconds()
            .max(0) as f64
            / 3_600_000.0;
        session.total_energy += consumed_power * elapsed_hours;
        session.consumed_power = consumed_power;
        session.vehicle_max_power = vehicle_max_power;
        session.last_update = now;
        Ok(session.clone())
    }

    /// Invoked by the allocator to write back a computed allocation. Clamps
    /// negatives to zero; a no-op if the session has meanwhile stopped.
    pub fn set_allocated(&self, session_id: uuid::Uuid, power: f64) {
        if let Some(cell) = self.sessions.get(&session_id) {
            let mut session = cell.lock().unwrap();
            session.allocated_power = power.max(0.0);
            session.last_update = Utc::now();
        }
    }

    pub fn get_session(&self, session_id: uuid::Uuid) -> Option<Session> {
        self.sessions.get(&session_id).map(|c| c.lock().unwrap().clone())
    }

    pub fn list_sessions(&self) -> Vec<Session> {
        self.sessions
            .iter()
            .map(|e| e.value().lock().unwrap().clone())
            .collect()
    }

    /// Snapshot of the fields the allocator needs, taken without holding any
    /// lock across the whole iteration.
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .iter()
            .map(|e| {
                let s = e.value().lock().unwrap();
                SessionSnapshot {
                    session_id: s.session_id,
                    charger_id: s.charger_id().to_string(),
                    vehicle_max_power: s.vehicle_max_power,
                }
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn total_allocated(&self) -> f64 {
        self.list_sessions().iter().map(|s| s.allocated_power).sum()
    }

    pub fn total_consumed(&self) -> f64 {
        self.list_sessions().iter().map(|s| s.consumed_power).sum()
    }

    pub fn total_energy(&self) -> f64 {
        self.list_sessions().iter().map(|s| s.total_energy).sum()
    }

    pub fn group_by_charger(&self) -> HashMap<String, Vec<Session>> {
        let mut grouped: HashMap<String, Vec<Session>> = HashMap::new();
        for session in self.list_sessions() {
            grouped
                .entry(session.charger_id().to_string())
                .or_default()
                .push(session);
        }
        grouped
    }
}
