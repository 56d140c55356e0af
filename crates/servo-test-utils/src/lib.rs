//! Shared test utilities for Servo integration tests.
//!
//! This crate provides:
//! - [`TestContext`]: A seeded in-memory job store
//! - [`RecordingTelemetry`]: A telemetry sink that keeps every observation
//! - [`LogCapture`]: Structured log capture for asserting on emitted events
//! - Builders for outcome messages
//! - Custom assertion helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use servo_orchestrator::models::{DesiredStateType, ExecutionStateType, JobType};
//! use servo_test_utils::{TestContext, bid_result_message};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let ctx = TestContext::new();
//!     ctx.seed_job("job-1", JobType::Batch).await;
//!     ctx.seed_execution("exec-1", "job-1", ExecutionStateType::AskForBid, DesiredStateType::Pending)
//!         .await;
//!
//!     let message = bid_result_message("exec-1", "job-1", JobType::Batch, true, "");
//!     ctx.handler()
//!         .handle_message(&CancellationToken::new(), &message)
//!         .await
//!         .unwrap();
//!     assert_eq!(ctx.evaluation_count("job-1").await, 1);
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod fixtures;
pub mod logging;
pub mod telemetry;

pub use assertions::*;
pub use fixtures::*;
pub use logging::*;
pub use telemetry::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("servo_orchestrator=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
