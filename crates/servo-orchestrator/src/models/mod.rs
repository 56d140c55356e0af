//! Domain records owned by the job store.

pub mod evaluation;
pub mod event;
pub mod execution;
pub mod job;

pub use evaluation::{EvalStatus, EvalTrigger, Evaluation};
pub use event::Event;
pub use execution::{
    DesiredStateType, Execution, ExecutionStateType, PublishedResult, RunCommandResult, State,
};
pub use job::{Job, JobType};
