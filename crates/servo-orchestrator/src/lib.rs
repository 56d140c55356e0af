//! # servo-orchestrator
//!
//! Execution-outcome reconciliation for the Servo job orchestrator.
//!
//! Compute nodes report what happened to the work they were assigned. This
//! crate turns those reports into durable state:
//!
//! - **Conditional updates**: Each outcome moves an execution to a new state
//!   only if its current state is compatible
//! - **Evaluation enqueue**: Every accepted outcome schedules a pending
//!   evaluation so the scheduler can react
//! - **Atomicity**: The update and the evaluation share one transaction
//! - **Observability**: Every message is counted and timed, and every failure
//!   is logged with the full message metadata
//!
//! ## Core Concepts
//!
//! - **Job**: A user-submitted unit of work; batch and ops jobs finish, service
//!   and daemon jobs run until stopped
//! - **Execution**: One attempt to run a job on one node, with a compute state
//!   (what the node reports) and a desired state (what the orchestrator wants)
//! - **Evaluation**: A request for the scheduler to re-examine a job
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use servo_orchestrator::envelope::Message;
//! use servo_orchestrator::handler::MessageHandler;
//! use servo_orchestrator::messages::{ComputeError, OutcomeHeader};
//! use servo_orchestrator::models::JobType;
//! use servo_orchestrator::store::memory::InMemoryJobStore;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> servo_orchestrator::error::Result<()> {
//! let handler = MessageHandler::new(Arc::new(InMemoryJobStore::new()));
//! let message = Message::compute_error(ComputeError {
//!     header: OutcomeHeader::new("exec-1", "job-1", JobType::Batch),
//!     error: "container exited with code 137".into(),
//! });
//!
//! if handler.should_process(&message) {
//!     handler.handle_message(&CancellationToken::new(), &message).await?;
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod messages;
pub mod metrics;
pub mod models;
pub mod policy;
pub mod store;
pub mod transition;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::HandlerConfig;
    pub use crate::envelope::{KEY_MESSAGE_TYPE, Message, MessageType, Metadata, Payload};
    pub use crate::error::{Error, Result};
    pub use crate::handler::MessageHandler;
    pub use crate::messages::{BidResult, ComputeError, OutcomeHeader, RunResult};
    pub use crate::metrics::{MetricsFacadeSink, StorePart, TelemetryNames, TelemetrySink};
    pub use crate::models::{
        DesiredStateType, EvalStatus, EvalTrigger, Evaluation, Event, Execution,
        ExecutionStateType, Job, JobType,
    };
    pub use crate::policy::ErrorPolicy;
    pub use crate::store::memory::InMemoryJobStore;
    pub use crate::store::{JobStore, Transaction};
}
