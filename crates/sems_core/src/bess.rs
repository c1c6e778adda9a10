use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::BatteryConfig;

/// Minimum state of charge kept at rest, as a fraction of capacity.
const MIN_SOC_FRACTION: f64 = 0.10;
/// Maximum state of charge kept at rest, as a fraction of capacity.
const MAX_SOC_FRACTION: f64 = 0.95;
/// Hard emergency floor; `discharge`/`charge` never cross it.
const EMERGENCY_FRACTION: f64 = 0.05;
/// Discharge/charge power is capped so it can be sustained over this many
/// hours given remaining/headroom energy.
const SUSTAINABILITY_WINDOW_HOURS: f64 = 0.25;

struct BessInner {
    soc: f64,
    current_power: f64,
    last_update: DateTime<Utc>,
}

/// Models a single stationary battery: state of charge, safety envelope, and
/// a peak-shave/valley-fill policy. Has no knowledge of charging sessions.
pub struct BessController {
    config: BatteryConfig,
    inner: Mutex<BessInner>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BessStatus {
    pub soc: f64,
    pub soc_percentage: f64,
    pub capacity: f64,
    pub max_power: f64,
    pub current_power: f64,
    pub available_discharge: f64,
    pub available_charge: f64,
    pub emergency_state: bool,
    pub last_update: DateTime<Utc>,
}

impl BessController {
    /// Created once at startup, fully charged.
    pub fn new(config: BatteryConfig) -> Self {
        BessController {
            config,
            inner: Mutex::new(BessInner {
                soc: config.capacity,
                current_power: 0.0,
                last_update: Utc::now(),
            }),
        }
    }

    pub fn is_available(&self) -> bool {
        self.config.capacity > 0.0 && self.config.power > 0.0
    }

    fn soc(&self) -> f64 {
        self.inner.lock().unwrap().soc
    }

    pub fn available_discharge(&self) -> f64 {
        if !self.is_available() {
            return 0.0;
        }
        let soc = self.soc();
        let floor = MIN_SOC_FRACTION * self.config.capacity;
        if soc <= floor {
            return 0.0;
        }
        self.config
            .power
            .min((soc - floor) / SUSTAINABILITY_WINDOW_HOURS)
            .max(0.0)
    }

    pub fn available_charge(&self) -> f64 {
        if !self.is_available() {
            return 0.0;
        }
        let soc = self.soc();
        let ceiling = MAX_SOC_FRACTION * self.config.capacity;
        if soc >= ceiling {
            return 0.0;
        }
        self.config
            .power
            .min((ceiling - soc) / SUSTAINABILITY_WINDOW_HOURS)
            .max(0.0)
    }

    /// Discharge at `requested_kw` for `duration_sec`. Returns the power
    /// actually applied, which may be less than requested.
    pub fn discharge(&self, requested_kw: f64, duration_sec: f64) -> f64 {
        if requested_kw <= 0.0 || duration_sec <= 0.0 {
            return 0.0;
        }
        let mut inner = self.inner.lock().unwrap();
        let floor = MIN_SOC_FRACTION * self.config.capacity;
        let available = if !self.is_available() || inner.soc <= floor {
            0.0
        } else {
            self.config
                .power
                .min((inner.soc - floor) / SUSTAINABILITY_WINDOW_HOURS)
                .max(0.0)
        };
        let actual = requested_kw.min(available).max(0.0);
        inner.soc = (inner.soc - actual * duration_sec / 3600.0).max(floor);
        inner.current_power = actual;
        inner.last_update = Utc::now();
        actual
    }

    /// Charge at `requested_kw` for `duration_sec`. Returns the power
    /// actually applied, which may be less than requested.
    pub fn charge(&self, requested_kw: f64, duration_sec: f64) -> f64 {
        if requested_kw <= 0.0 || duration_sec <= 0.0 {
            return 0.0;
        }
        let mut inner = self.inner.lock().unwrap();
        let ceiling = MAX_SOC_FRACTION * self.config.capacity;
        let available = if !self.is_available() || inner.soc >= ceiling {
            0.0
        } else {
            self.config
                .power
                .min((ceiling - inner.soc) / SUSTAINABILITY_WINDOW_HOURS)
                .max(0.0)
        };
        let actual = requested_kw.min(available).max(0.0);
        inner.soc = (inner.soc + actual * duration_sec / 3600.0).min(ceiling);
        inner.current_power = -actual;
        inner.last_update = Utc::now();
        actual
    }

    pub fn set_idle(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.current_power = 0.0;
        inner.last_update = Utc::now();
    }

    pub fn is_emergency_state(&self) -> bool {
        self.is_available() && self.soc() <= EMERGENCY_FRACTION * self.config.capacity
    }

    /// Suggests a discharge (positive), charge (negative), or idle (zero)
    /// power to keep grid draw near `effective_cap = grid_capacity -
    /// safety_margin`.
    pub fn calculate_optimal_power(&self, grid_load: f64, grid_capacity: f64, safety_margin: f64) -> f64 {
        let effective_cap = grid_capacity - safety_margin;
        if grid_load > effective_cap {
            (grid_load - effective_cap).min(self.available_discharge())
        } else if effective_cap - grid_load > 10.0 {
            -((effective_cap - grid_load) * 0.5).min(self.available_charge())
        } else {
            0.0
        }
    }

    pub fn status(&self) -> BessStatus {
        let inner = self.inner.lock().unwrap();
        BessStatus {
            soc: inner.soc,
            soc_percentage: if self.config.capacity > 0.0 {
                inner.soc / self.config.capacity * 100.0
            } else {
                0.0
            },
            capacity: self.config.capacity,
            max_power: self.config.power,
            current_power: inner.current_power,
            available_discharge: self.available_discharge(),
            available_charge: self.available_charge(),
            emergency_state: self.is_emergency_state(),
            last_update: inner.last_update,
        }
    }
}
