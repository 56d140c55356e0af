//! Error types and result aliases shared across Servo crates.

/// The result type used throughout servo-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by shared primitives.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
