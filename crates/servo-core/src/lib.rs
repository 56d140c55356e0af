//! # servo-core
//!
//! Core abstractions shared by the Servo orchestration crates.
//!
//! This crate provides:
//!
//! - **Identifiers**: Strongly-typed IDs for jobs, executions, and evaluations
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization
//!
//! ## Example
//!
//! ```rust
//! use servo_core::prelude::*;
//!
//! let job = JobId::new("job-7f3a");
//! let eval = EvaluationId::generate();
//! assert_ne!(job.as_str(), eval.to_string());
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod observability;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::id::{EvaluationId, ExecutionId, JobId};
    pub use crate::observability::{LogFormat, init_logging};
}

pub use error::{Error, Result};
pub use id::{EvaluationId, ExecutionId, JobId};
pub use observability::{LogFormat, init_logging};
