//! Message envelope delivered by the transport layer.
//!
//! An envelope pairs string-keyed metadata with a typed payload. The metadata
//! key [`KEY_MESSAGE_TYPE`] declares which payload kind the sender intended;
//! handlers check that declaration against the payload before touching the
//! store.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::messages::{BidResult, ComputeError, RunResult};

/// Metadata key carrying the message type discriminator.
pub const KEY_MESSAGE_TYPE: &str = "Servo-Type";

/// Outcome message types handled by the reconciliation core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Bid request outcome.
    BidResult,
    /// Execution completed.
    RunResult,
    /// Execution failed.
    ComputeError,
}

impl MessageType {
    /// All outcome message types.
    pub const ALL: [Self; 3] = [Self::BidResult, Self::RunResult, Self::ComputeError];

    /// Returns the metadata value for this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BidResult => "BidResult",
            Self::RunResult => "RunResult",
            Self::ComputeError => "ComputeError",
        }
    }

    /// Parses a metadata value; returns `None` for anything unrecognized.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// String-keyed message metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `key`, or an empty string when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map_or("", String::as_str)
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder form of [`Metadata::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Iterates over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns a copy of all entries.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.0.clone()
    }

    /// Returns the declared message type value (empty when absent).
    #[must_use]
    pub fn message_type(&self) -> &str {
        self.get(KEY_MESSAGE_TYPE)
    }
}

/// Renders as a JSON object so every key and value survives in log output.
impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Message payload: a closed set of outcome kinds plus anything else the
/// transport may deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Bid request outcome.
    BidResult(BidResult),
    /// Execution completed.
    RunResult(RunResult),
    /// Execution failed.
    ComputeError(ComputeError),
    /// A payload kind the reconciliation core does not handle.
    Other {
        /// Name of the payload kind.
        kind: String,
        /// Raw payload body.
        body: serde_json::Value,
    },
}

impl Payload {
    /// Name of the concrete payload kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::BidResult(_) => MessageType::BidResult.as_str(),
            Self::RunResult(_) => MessageType::RunResult.as_str(),
            Self::ComputeError(_) => MessageType::ComputeError.as_str(),
            Self::Other { kind, .. } => kind,
        }
    }
}

/// A delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message metadata.
    pub metadata: Metadata,
    /// Message payload.
    pub payload: Payload,
}

impl Message {
    /// Creates a message from explicit metadata and payload.
    #[must_use]
    pub fn new(metadata: Metadata, payload: Payload) -> Self {
        Self { metadata, payload }
    }

    /// Wraps a bid result, declaring its type in the metadata.
    #[must_use]
    pub fn bid_result(result: BidResult) -> Self {
        Self::typed(MessageType::BidResult, Payload::BidResult(result))
    }

    /// Wraps a run result, declaring its type in the metadata.
    #[must_use]
    pub fn run_result(result: RunResult) -> Self {
        Self::typed(MessageType::RunResult, Payload::RunResult(result))
    }

    /// Wraps a compute error, declaring its type in the metadata.
    #[must_use]
    pub fn compute_error(error: ComputeError) -> Self {
        Self::typed(MessageType::ComputeError, Payload::ComputeError(error))
    }

    fn typed(message_type: MessageType, payload: Payload) -> Self {
        Self {
            metadata: Metadata::new().with(KEY_MESSAGE_TYPE, message_type.as_str()),
            payload,
        }
    }

    /// Returns the declared message type value (empty when absent).
    #[must_use]
    pub fn message_type(&self) -> &str {
        self.metadata.message_type()
    }

    /// Returns the payload as a bid result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedPayloadType`] for any other payload kind.
    pub fn as_bid_result(&self) -> Result<&BidResult> {
        match &self.payload {
            Payload::BidResult(result) => Ok(result),
            other => Err(Error::unexpected_payload_type(
                MessageType::BidResult.as_str(),
                other.kind(),
            )),
        }
    }

    /// Returns the payload as a run result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedPayloadType`] for any other payload kind.
    pub fn as_run_result(&self) -> Result<&RunResult> {
        match &self.payload {
            Payload::RunResult(result) => Ok(result),
            other => Err(Error::unexpected_payload_type(
                MessageType::RunResult.as_str(),
                other.kind(),
            )),
        }
    }

    /// Returns the payload as a compute error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedPayloadType`] for any other payload kind.
    pub fn as_compute_error(&self) -> Result<&ComputeError> {
        match &self.payload {
            Payload::ComputeError(error) => Ok(error),
            other => Err(Error::unexpected_payload_type(
                MessageType::ComputeError.as_str(),
                other.kind(),
            )),
        }
    }
}
