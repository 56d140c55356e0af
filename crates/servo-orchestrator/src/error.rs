//! Error types for the reconciliation domain.

use servo_core::{ExecutionId, JobId};

/// The result type used throughout servo-orchestrator.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reconciling node messages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The payload kind disagrees with the type declared in the metadata.
    #[error("expected payload of type {expected}, got {actual}")]
    UnexpectedPayloadType {
        /// Payload kind implied by the message type metadata.
        expected: String,
        /// Payload kind actually carried by the message.
        actual: String,
    },

    /// The message type is not one this handler knows how to process.
    #[error("unsupported message type: {message_type}")]
    UnsupportedMessageType {
        /// The message type found in the metadata (empty when absent).
        message_type: String,
    },

    /// A job was not found in the store.
    #[error("job not found: {job_id}")]
    JobNotFound {
        /// The job ID that was not found.
        job_id: JobId,
    },

    /// An execution was not found in the store.
    #[error("execution not found: {execution_id}")]
    ExecutionNotFound {
        /// The execution ID that was not found.
        execution_id: ExecutionId,
    },

    /// The precondition attached to an execution update did not hold.
    #[error("update condition not met for execution {execution_id}: {reason}")]
    ConditionNotMet {
        /// The execution the update targeted.
        execution_id: ExecutionId,
        /// Which part of the condition failed.
        reason: String,
    },

    /// The transaction was already committed or rolled back.
    #[error("transaction is no longer active")]
    TransactionClosed,

    /// A storage operation failed.
    #[error("{message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A store operation exceeded its deadline.
    #[error("store operation {operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// The store operation that timed out.
        operation: &'static str,
        /// The configured deadline.
        timeout_ms: u64,
    },

    /// The ambient cancellation signal fired while a store operation was pending.
    #[error("store operation {operation} cancelled")]
    Cancelled {
        /// The store operation that was interrupted.
        operation: &'static str,
    },

    /// A configuration value was missing or invalid.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// An error from servo-core.
    #[error("core error: {0}")]
    Core(#[from] servo_core::Error),
}

impl Error {
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a payload mismatch error.
    #[must_use]
    pub fn unexpected_payload_type(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::UnexpectedPayloadType {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Returns true if a store precondition rejected the update.
    ///
    /// Looks through storage wrappers so that a rejection stays visible after
    /// context has been added.
    #[must_use]
    pub fn is_condition_not_met(&self) -> bool {
        match self {
            Self::ConditionNotMet { .. } => true,
            Self::Storage {
                source: Some(source),
                ..
            } => source
                .downcast_ref::<Self>()
                .is_some_and(Self::is_condition_not_met),
            _ => false,
        }
    }

    /// Returns true if the failure is transient and a redelivery could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Cancelled { .. } => true,
            Self::Storage { source, .. } => source
                .as_ref()
                .and_then(|s| s.downcast_ref::<Self>())
                .is_none_or(Self::is_retryable),
            _ => false,
        }
    }
}
