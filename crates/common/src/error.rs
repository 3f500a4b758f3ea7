//! Error types for runwatch

use thiserror::Error;

/// Result type alias using the runwatch common Error
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown phase: {0}")]
    UnknownPhase(String),

    #[error("Unknown test outcome: {0}")]
    UnknownOutcome(String),
}
