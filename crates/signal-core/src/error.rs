use thiserror::Error;

/// Failure taxonomy for the signal core. None of these are fatal to the
/// pipeline: every variant has a documented degradation path (last-known
/// value, neutral default, or fallback table).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Insufficient history: {0}")]
    InsufficientHistory(String),

    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),
}
