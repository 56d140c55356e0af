//! Execution records and their two state machines.
//!
//! Every execution carries two independent states:
//!
//! - **Compute state** ([`ExecutionStateType`]): what the compute node has
//!   actually reported (bid accepted, completed, failed, ...).
//! - **Desired state** ([`DesiredStateType`]): what the orchestrator intends
//!   for the execution (keep it pending, keep it running, stop it).
//!
//! The two move independently, but when one message implies both must
//! change they are written in the same conditional update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use servo_core::{ExecutionId, JobId};

use super::event::Event;

/// Observed compute progress of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExecutionStateType {
    /// No state recorded yet.
    #[default]
    Undefined,
    /// Execution created, nothing sent to the node yet.
    New,
    /// Bid request sent to the node.
    AskForBid,
    /// Node accepted the bid request.
    AskForBidAccepted,
    /// Node rejected the bid request.
    AskForBidRejected,
    /// Orchestrator accepted the node's bid.
    BidAccepted,
    /// Orchestrator rejected the node's bid.
    BidRejected,
    /// Node reported successful completion.
    Completed,
    /// Execution failed.
    Failed,
    /// Execution was cancelled.
    Cancelled,
}

impl std::fmt::Display for ExecutionStateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Undefined => "Undefined",
            Self::New => "New",
            Self::AskForBid => "AskForBid",
            Self::AskForBidAccepted => "AskForBidAccepted",
            Self::AskForBidRejected => "AskForBidRejected",
            Self::BidAccepted => "BidAccepted",
            Self::BidRejected => "BidRejected",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Orchestrator intent for an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DesiredStateType {
    /// Waiting for placement to be confirmed.
    #[default]
    Pending,
    /// Should be running on its node.
    Running,
    /// Should not run; terminal for placement intent.
    Stopped,
}

impl DesiredStateType {
    /// States in which the orchestrator still wants the execution to run.
    pub const ACTIVE: [Self; 2] = [Self::Pending, Self::Running];
}

impl std::fmt::Display for DesiredStateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

/// A state value paired with a human-readable explanation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct State<T> {
    /// The state itself.
    pub state_type: T,
    /// Why the state was entered (may be empty).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl<T> State<T> {
    /// Creates a state with an empty message.
    #[must_use]
    pub fn new(state_type: T) -> Self {
        Self {
            state_type,
            message: String::new(),
        }
    }

    /// Attaches a message to the state.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Where and how an execution's results were published.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublishedResult {
    /// Publisher kind (e.g. `s3`, `ipfs`, `local`).
    #[serde(rename = "type")]
    pub publisher_type: String,
    /// Publisher-specific location parameters.
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Captured output of the command run by an execution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunCommandResult {
    /// Captured standard output.
    #[serde(default)]
    pub stdout: String,
    /// Whether stdout was truncated.
    #[serde(default)]
    pub stdout_truncated: bool,
    /// Captured standard error.
    #[serde(default)]
    pub stderr: String,
    /// Whether stderr was truncated.
    #[serde(default)]
    pub stderr_truncated: bool,
    /// Process exit code.
    #[serde(default)]
    pub exit_code: i32,
    /// Error raised by the executor itself, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_msg: String,
}

/// One placement attempt of a job on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Execution identifier.
    pub id: ExecutionId,
    /// Job this execution belongs to.
    pub job_id: JobId,
    /// Node the execution was placed on.
    pub node_id: String,
    /// Observed compute progress.
    pub compute_state: State<ExecutionStateType>,
    /// Orchestrator intent.
    pub desired_state: State<DesiredStateType>,
    /// Published result location, once known.
    pub published_result: Option<PublishedResult>,
    /// Run output, once known.
    pub run_output: Option<RunCommandResult>,
    /// Append-only history of events reported for this execution.
    pub events: Vec<Event>,
    /// Incremented on every successful update.
    pub revision: u64,
    /// Creation time.
    pub create_time: DateTime<Utc>,
    /// Time of the last successful update.
    pub modify_time: DateTime<Utc>,
}

impl Execution {
    /// Creates a new execution in compute state `New`, desired state `Pending`.
    #[must_use]
    pub fn new(
        id: impl Into<ExecutionId>,
        job_id: impl Into<JobId>,
        node_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            job_id: job_id.into(),
            node_id: node_id.into(),
            compute_state: State::new(ExecutionStateType::New),
            desired_state: State::new(DesiredStateType::Pending),
            published_result: None,
            run_output: None,
            events: Vec::new(),
            revision: 1,
            create_time: now,
            modify_time: now,
        }
    }

    /// Sets the compute state.
    #[must_use]
    pub fn with_compute_state(mut self, state_type: ExecutionStateType) -> Self {
        self.compute_state = State::new(state_type);
        self
    }

    /// Sets the desired state.
    #[must_use]
    pub fn with_desired_state(mut self, state_type: DesiredStateType) -> Self {
        self.desired_state = State::new(state_type);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_execution_starts_pending() {
        let exec = Execution::new("exec-1", "job-1", "node-a");
        assert_eq!(exec.compute_state.state_type, ExecutionStateType::New);
        assert_eq!(exec.desired_state.state_type, DesiredStateType::Pending);
        assert!(DesiredStateType::ACTIVE.contains(&exec.desired_state.state_type));
        assert_eq!(exec.revision, 1);
    }

    #[test]
    fn stopped_is_never_active() {
        let exec =
            Execution::new("exec-1", "job-1", "node-a").with_desired_state(DesiredStateType::Stopped);
        assert!(!DesiredStateType::ACTIVE.contains(&exec.desired_state.state_type));
    }

    #[test]
    fn state_message_builder() {
        let state = State::new(DesiredStateType::Stopped).with_message("bid rejected");
        assert_eq!(state.state_type, DesiredStateType::Stopped);
        assert_eq!(state.message, "bid rejected");
    }

    #[test]
    fn display_matches_variant_names() {
        assert_eq!(ExecutionStateType::AskForBidAccepted.to_string(), "AskForBidAccepted");
        assert_eq!(DesiredStateType::Stopped.to_string(), "Stopped");
    }
}
