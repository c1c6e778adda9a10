//! Core allocation engine for an EV charging station: the proportional-fair
//! multi-level constrained allocator, the BESS peak-shave/valley-fill
//! controller, and the thread-safe session registry that drives
//! recomputation on every lifecycle event.

mod allocator;
mod bess;
mod error;
mod models;
mod registry;

pub use allocator::Allocator;
pub use bess::{BessController, BessStatus};
pub use error::SessionError;
pub use models::{
    BatteryConfig, ChargerConfig, ConnectorId, Session, SessionSnapshot, SessionState,
    StationConfig,
};
pub use registry::SessionRegistry;
