//! Pre-built test fixtures for common reconciliation scenarios.
//!
//! Provides factory functions to create test data with sensible defaults.

use std::sync::Arc;

use servo_core::{ExecutionId, JobId};
use servo_orchestrator::config::HandlerConfig;
use servo_orchestrator::envelope::Message;
use servo_orchestrator::handler::MessageHandler;
use servo_orchestrator::messages::{BidResult, ComputeError, OutcomeHeader, RunResult};
use servo_orchestrator::models::{
    DesiredStateType, Execution, ExecutionStateType, Job, JobType, PublishedResult,
    RunCommandResult,
};
use servo_orchestrator::store::memory::InMemoryJobStore;

use crate::telemetry::RecordingTelemetry;

/// Node ID used for seeded executions.
pub const TEST_NODE_ID: &str = "node-test-0";

/// Test context with a shared store and a recording telemetry sink.
pub struct TestContext {
    /// Shared in-memory store.
    pub store: Arc<InMemoryJobStore>,
    /// Telemetry sink wired into every handler built from this context.
    pub telemetry: Arc<RecordingTelemetry>,
}

impl TestContext {
    /// Creates a context over an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(InMemoryJobStore::new())
    }

    /// Creates a context over an explicit store (e.g. one with latency).
    #[must_use]
    pub fn with_store(store: InMemoryJobStore) -> Self {
        Self {
            store: Arc::new(store),
            telemetry: Arc::new(RecordingTelemetry::new()),
        }
    }

    /// Builds a handler with default configuration.
    pub fn handler(&self) -> MessageHandler<InMemoryJobStore> {
        self.handler_with_config(HandlerConfig::default())
    }

    /// Builds a handler with explicit configuration.
    pub fn handler_with_config(&self, config: HandlerConfig) -> MessageHandler<InMemoryJobStore> {
        MessageHandler::with_config(Arc::clone(&self.store), config)
            .with_telemetry(Arc::clone(&self.telemetry) as _)
    }

    /// Inserts a job of the given type.
    pub async fn seed_job(&self, job_id: &str, job_type: JobType) -> Job {
        let job = Job::new(job_id, format!("{job_id}-name"), job_type);
        self.store.insert_job(job.clone()).await;
        job
    }

    /// Inserts an execution with explicit compute and desired states.
    pub async fn seed_execution(
        &self,
        execution_id: &str,
        job_id: &str,
        compute: ExecutionStateType,
        desired: DesiredStateType,
    ) -> Execution {
        let execution = Execution::new(execution_id, job_id, TEST_NODE_ID)
            .with_compute_state(compute)
            .with_desired_state(desired);
        self.store.insert_execution(execution.clone()).await;
        execution
    }

    /// Returns the committed execution, panicking if it is missing.
    pub async fn execution(&self, execution_id: &str) -> Execution {
        self.store
            .get_execution(&ExecutionId::new(execution_id))
            .await
            .expect("execution should exist")
    }

    /// Returns the number of committed evaluations for a job.
    pub async fn evaluation_count(&self, job_id: &str) -> usize {
        self.store
            .evaluations_for_job(&JobId::new(job_id))
            .await
            .len()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a `BidResult` message.
pub fn bid_result_message(
    execution_id: &str,
    job_id: &str,
    job_type: JobType,
    accepted: bool,
    node_message: &str,
) -> Message {
    Message::bid_result(BidResult {
        header: OutcomeHeader::new(execution_id, job_id, job_type),
        accepted,
        message: node_message.to_string(),
    })
}

/// Builds a `RunResult` message with a small published result and output.
pub fn run_result_message(execution_id: &str, job_id: &str, job_type: JobType) -> Message {
    let mut publish_result = PublishedResult {
        publisher_type: "s3".to_string(),
        ..PublishedResult::default()
    };
    publish_result
        .params
        .insert("bucket".to_string(), "results".into());

    Message::run_result(RunResult {
        header: OutcomeHeader::new(execution_id, job_id, job_type),
        publish_result,
        run_command_result: RunCommandResult {
            stdout: "done\n".to_string(),
            exit_code: 0,
            ..RunCommandResult::default()
        },
    })
}

/// Builds a `ComputeError` message.
pub fn compute_error_message(
    execution_id: &str,
    job_id: &str,
    job_type: JobType,
    error: &str,
) -> Message {
    Message::compute_error(ComputeError {
        header: OutcomeHeader::new(execution_id, job_id, job_type),
        error: error.to_string(),
    })
}
