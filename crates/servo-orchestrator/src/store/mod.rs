//! Transactional job store contract.
//!
//! The [`JobStore`] trait is the persistence layer for jobs, executions, and
//! evaluations. The reconciliation core only ever:
//!
//! - opens a transaction,
//! - reads a job,
//! - applies a *conditional* execution update,
//! - creates an evaluation,
//! - commits (or rolls back).
//!
//! ## Design Principles
//!
//! - **Conditional updates**: Executions are never blind-written; every update
//!   names the prior state it expects and the store checks and applies it
//!   atomically
//! - **One transaction per message**: Either the execution update and the
//!   evaluation both land, or neither does
//! - **Testability**: In-memory implementation for tests, the production
//!   engine lives behind the same trait

pub mod memory;

use async_trait::async_trait;

use servo_core::{ExecutionId, JobId};

use crate::error::Result;
use crate::models::{
    DesiredStateType, Evaluation, Event, Execution, ExecutionStateType, Job, PublishedResult,
    RunCommandResult, State,
};

/// An open store transaction.
///
/// Both methods are idempotent: rolling back after a successful commit is a
/// no-op, so callers may roll back unconditionally once the work is done.
#[async_trait]
pub trait Transaction: Send {
    /// Makes all writes in the transaction visible atomically.
    async fn commit(&mut self) -> Result<()>;

    /// Discards all writes in the transaction.
    async fn rollback(&mut self) -> Result<()>;
}

/// Storage abstraction for reconciliation state.
///
/// ## Thread Safety
///
/// All methods are `Send + Sync`; implementations must serialize conflicting
/// conditional updates issued from concurrent transactions.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Transaction handle type.
    type Tx: Transaction;

    /// Opens a transaction.
    async fn begin_tx(&self) -> Result<Self::Tx>;

    /// Reads a job within the transaction.
    ///
    /// Fails with [`crate::error::Error::JobNotFound`] if the job is unknown.
    async fn get_job(&self, tx: &mut Self::Tx, job_id: &JobId) -> Result<Job>;

    /// Applies a conditional update to an execution.
    ///
    /// Fails with [`crate::error::Error::ConditionNotMet`] when the current
    /// execution does not satisfy `request.condition`, and with
    /// [`crate::error::Error::ExecutionNotFound`] when it does not exist.
    async fn update_execution(
        &self,
        tx: &mut Self::Tx,
        request: UpdateExecutionRequest,
    ) -> Result<()>;

    /// Persists a new evaluation.
    async fn create_evaluation(&self, tx: &mut Self::Tx, evaluation: Evaluation) -> Result<()>;
}

/// Precondition attached to an execution update.
///
/// Empty lists and `None` mean "no constraint". All non-empty parts must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateExecutionCondition {
    /// Allow-list: the current desired state must be one of these.
    pub expected_desired_states: Vec<DesiredStateType>,
    /// Allow-list: the current compute state must be one of these.
    pub expected_states: Vec<ExecutionStateType>,
    /// Deny-list: the current compute state must not be any of these.
    pub unexpected_states: Vec<ExecutionStateType>,
    /// The current revision must equal this value.
    pub expected_revision: Option<u64>,
}

impl UpdateExecutionCondition {
    /// Condition accepting only the given prior desired states.
    #[must_use]
    pub fn desired_in(states: impl Into<Vec<DesiredStateType>>) -> Self {
        Self {
            expected_desired_states: states.into(),
            ..Self::default()
        }
    }

    /// Condition rejecting the given current compute states.
    #[must_use]
    pub fn compute_not_in(states: impl Into<Vec<ExecutionStateType>>) -> Self {
        Self {
            unexpected_states: states.into(),
            ..Self::default()
        }
    }

    /// Checks the condition against the current execution.
    ///
    /// # Errors
    ///
    /// Returns a description of the first part of the condition that does
    /// not hold.
    pub fn check(&self, current: &Execution) -> std::result::Result<(), String> {
        let desired = current.desired_state.state_type;
        if !self.expected_desired_states.is_empty()
            && !self.expected_desired_states.contains(&desired)
        {
            return Err(format!(
                "desired state {desired} not in {:?}",
                self.expected_desired_states
            ));
        }

        let compute = current.compute_state.state_type;
        if !self.expected_states.is_empty() && !self.expected_states.contains(&compute) {
            return Err(format!(
                "compute state {compute} not in {:?}",
                self.expected_states
            ));
        }
        if self.unexpected_states.contains(&compute) {
            return Err(format!("compute state {compute} is not allowed"));
        }

        if let Some(expected) = self.expected_revision {
            if current.revision != expected {
                return Err(format!(
                    "revision {} does not match expected {expected}",
                    current.revision
                ));
            }
        }
        Ok(())
    }
}

/// Partial execution values written by an update. `None` leaves a field
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionUpdate {
    /// New compute state.
    pub compute_state: Option<State<ExecutionStateType>>,
    /// New desired state.
    pub desired_state: Option<State<DesiredStateType>>,
    /// Published result location.
    pub published_result: Option<PublishedResult>,
    /// Command output.
    pub run_output: Option<RunCommandResult>,
}

impl ExecutionUpdate {
    /// Writes the present fields onto `execution`.
    pub fn apply_to(&self, execution: &mut Execution) {
        if let Some(state) = &self.compute_state {
            execution.compute_state = state.clone();
        }
        if let Some(state) = &self.desired_state {
            execution.desired_state = state.clone();
        }
        if let Some(result) = &self.published_result {
            execution.published_result = Some(result.clone());
        }
        if let Some(output) = &self.run_output {
            execution.run_output = Some(output.clone());
        }
    }
}

/// A conditional execution update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateExecutionRequest {
    /// Execution to update.
    pub execution_id: ExecutionId,
    /// Precondition checked atomically with the write.
    pub condition: UpdateExecutionCondition,
    /// Values to write.
    pub new_values: ExecutionUpdate,
    /// Events appended to the execution history.
    pub events: Vec<Event>,
}
