//! Events reported by compute nodes alongside outcome messages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single entry in an execution's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Human-readable description.
    pub message: String,
    /// Coarse grouping for the event (e.g. `Exec`, `Bidding`).
    pub topic: String,
    /// When the event happened on the reporting node.
    pub timestamp: DateTime<Utc>,
    /// Free-form structured details.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl Event {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            topic: topic.into(),
            timestamp: Utc::now(),
            details: BTreeMap::new(),
        }
    }

    /// Adds a detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}
