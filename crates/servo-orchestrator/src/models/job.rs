//! Job records as seen by the reconciliation core.
//!
//! Jobs are created by the submission path and are read-only here; the only
//! property the message handler consults is the job category.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use servo_core::JobId;

use crate::error::{Error, Result};

/// Category of a job.
///
/// Batch and ops jobs run to completion on their own. Service and daemon
/// jobs are expected to run until they are explicitly stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    /// Runs once on a subset of nodes and terminates.
    Batch,
    /// Runs once on every matching node and terminates.
    Ops,
    /// Long-running job placed on a subset of nodes.
    Service,
    /// Long-running job placed on every matching node.
    Daemon,
}

impl JobType {
    /// Returns true if jobs of this type are not expected to self-terminate.
    #[must_use]
    pub const fn is_long_running(&self) -> bool {
        matches!(self, Self::Service | Self::Daemon)
    }

    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Ops => "ops",
            Self::Service => "service",
            Self::Daemon => "daemon",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

impl FromStr for JobType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "batch" => Ok(Self::Batch),
            "ops" => Ok(Self::Ops),
            "service" => Ok(Self::Service),
            "daemon" => Ok(Self::Daemon),
            other => Err(Error::Core(servo_core::Error::InvalidInput(format!(
                "unknown job type '{other}'"
            )))),
        }
    }
}

/// A submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Job identifier.
    pub id: JobId,
    /// Human-readable job name.
    pub name: String,
    /// Namespace the job was submitted to.
    pub namespace: String,
    /// Job category.
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Submission time.
    pub create_time: DateTime<Utc>,
}

impl Job {
    /// Creates a job in the default namespace.
    #[must_use]
    pub fn new(id: impl Into<JobId>, name: impl Into<String>, job_type: JobType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            namespace: "default".to_string(),
            job_type,
            create_time: Utc::now(),
        }
    }

    /// Returns true if the job should run until explicitly stopped.
    #[must_use]
    pub const fn is_long_running(&self) -> bool {
        self.job_type.is_long_running()
    }
}
