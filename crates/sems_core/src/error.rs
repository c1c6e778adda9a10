use crate::ConnectorId;

/// Domain errors surfaced by the [`crate::SessionRegistry`]. These are
/// returned as status codes at the façade/HTTP boundary, never thrown
/// through the allocator or BESS controller (see spec §7).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("charger {0} not found")]
    UnknownCharger(String),

    #[error("connector {idx} out of range for charger {charger_id}")]
    InvalidConnector { charger_id: String, idx: u8 },

    #[error("connector {}:{} is already in use", .0.charger_id, .0.idx)]
    ConnectorOccupied(ConnectorId),

    #[error("session {0} not found")]
    SessionNotFound(uuid::Uuid),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    InternalError(String),
}
