//! Evaluations: durable triggers that ask the scheduler to re-examine a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use servo_core::{EvaluationId, JobId};

use super::job::JobType;

/// Why an evaluation was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvalTrigger {
    /// An execution of the job changed state.
    #[serde(rename = "exec-update")]
    ExecutionUpdated,
}

impl EvalTrigger {
    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ExecutionUpdated => "exec-update",
        }
    }
}

impl std::fmt::Display for EvalTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of an evaluation.
///
/// Evaluations are only ever created here; the scheduler owns every later
/// status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalStatus {
    /// Waiting for the scheduler.
    #[default]
    Pending,
}

/// A reconciliation trigger consumed by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Unique identifier.
    pub id: EvaluationId,
    /// Job to re-examine.
    pub job_id: JobId,
    /// Why it was created.
    pub triggered_by: EvalTrigger,
    /// Category of the job, used to route to the right scheduler.
    #[serde(rename = "type")]
    pub job_type: JobType,
    /// Processing status.
    pub status: EvalStatus,
    /// Creation time.
    pub create_time: DateTime<Utc>,
    /// Last modification time; equals `create_time` on creation.
    pub modify_time: DateTime<Utc>,
}

impl Evaluation {
    /// Creates a pending evaluation with a fresh ID, stamped with the current time.
    #[must_use]
    pub fn pending(job_id: JobId, job_type: JobType, triggered_by: EvalTrigger) -> Self {
        let now = Utc::now();
        Self {
            id: EvaluationId::generate(),
            job_id,
            triggered_by,
            job_type,
            status: EvalStatus::Pending,
            create_time: now,
            modify_time: now,
        }
    }
}
