//! Strongly-typed identifiers for Servo entities.
//!
//! Job and execution identifiers are assigned outside the control plane
//! (by submission and by compute nodes) and arrive as opaque strings.
//! Evaluation identifiers are minted here and use ULIDs, so they sort by
//! creation time and need no coordination to stay unique.
//!
//! # Example
//!
//! ```rust
//! use servo_core::id::{EvaluationId, JobId};
//!
//! let job = JobId::new("job-1");
//! let eval = EvaluationId::generate();
//!
//! // IDs are different types - this won't compile:
//! // let wrong: JobId = eval;
//! # let _ = (job, eval);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::{Error, Result};

/// Identifier of a job as assigned at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wraps an externally assigned job identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(Error::InvalidId {
                message: "job ID must not be empty".to_string(),
            });
        }
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of a single placement attempt of a job on a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Wraps an externally assigned execution identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ExecutionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(Error::InvalidId {
                message: "execution ID must not be empty".to_string(),
            });
        }
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for ExecutionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A unique identifier for an evaluation (a scheduler reconciliation trigger).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationId(Ulid);

impl EvaluationId {
    /// Generates a new unique evaluation ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EvaluationId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| Error::InvalidId {
                message: format!("invalid evaluation ID '{s}': {e}"),
            })
    }
}
