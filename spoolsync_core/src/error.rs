use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// `begin` was called for a key that already has an active request.
    /// Recoverable: the caller retries after the existing request resolves,
    /// or cancels it first.
    #[error("assignment already active for {serial} unit {unit_id} slot {slot_index}")]
    ConflictingAssignment {
        serial: String,
        unit_id: u8,
        slot_index: u8,
    },
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
