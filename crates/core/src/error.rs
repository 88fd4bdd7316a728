use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown phase: {0}")]
    UnknownPhase(i64),

    #[error("Invalid analysis status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Validation error: {0}")]
    Validation(String),
}
