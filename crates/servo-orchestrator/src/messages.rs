//! Outcome payloads sent by compute nodes.
//!
//! | Message type   | Sent when                                       |
//! |----------------|-------------------------------------------------|
//! | `BidResult`    | Node accepted or rejected a bid request          |
//! | `RunResult`    | Node finished running an execution               |
//! | `ComputeError` | Node failed to bid on or run an execution        |

use serde::{Deserialize, Serialize};

use servo_core::{ExecutionId, JobId};

use crate::models::{Event, JobType, PublishedResult, RunCommandResult};

/// Fields shared by every outcome payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeHeader {
    /// Execution the outcome refers to.
    pub execution_id: ExecutionId,
    /// Job the execution belongs to.
    pub job_id: JobId,
    /// Category of the job.
    pub job_type: JobType,
    /// Events to append to the execution history.
    #[serde(default)]
    pub events: Vec<Event>,
}

impl OutcomeHeader {
    /// Creates a header with no events.
    #[must_use]
    pub fn new(
        execution_id: impl Into<ExecutionId>,
        job_id: impl Into<JobId>,
        job_type: JobType,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            job_id: job_id.into(),
            job_type,
            events: Vec::new(),
        }
    }

    /// Attaches events.
    #[must_use]
    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.events = events;
        self
    }
}

/// Node response to a bid request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidResult {
    /// Shared outcome fields.
    #[serde(flatten)]
    pub header: OutcomeHeader,
    /// Whether the node accepted the bid request.
    pub accepted: bool,
    /// Node-provided explanation.
    #[serde(default)]
    pub message: String,
}

/// Node report that an execution finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Shared outcome fields.
    #[serde(flatten)]
    pub header: OutcomeHeader,
    /// Where the results were published.
    pub publish_result: PublishedResult,
    /// Captured command output.
    pub run_command_result: RunCommandResult,
}

/// Node report that an execution failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeError {
    /// Shared outcome fields.
    #[serde(flatten)]
    pub header: OutcomeHeader,
    /// Description of the failure.
    pub error: String,
}
