//! Execution transition rules for node outcome messages.
//!
//! Each rule is a pure `(condition, new values)` pair. The message handler
//! turns a rule into an [`UpdateExecutionRequest`] and lets the store check
//! the condition atomically with the write.
//!
//! | Outcome              | Condition                        | Compute state         | Desired state |
//! |----------------------|----------------------------------|-----------------------|---------------|
//! | bid accepted         | desired ∈ {Pending, Running}     | `AskForBidAccepted`   | unchanged     |
//! | bid rejected         | desired ∈ {Pending, Running}     | `AskForBidRejected`   | `Stopped`     |
//! | run completed        | desired = Running                | `Completed`           | `Stopped`     |
//! | run completed (long) | desired = Running                | `Failed`              | `Stopped`     |
//! | compute failed       | compute ∉ {Completed, Cancelled} | `Failed`              | `Stopped`     |

use servo_core::ExecutionId;

use crate::messages::RunResult;
use crate::models::{DesiredStateType, Event, ExecutionStateType, State};
use crate::store::{ExecutionUpdate, UpdateExecutionCondition, UpdateExecutionRequest};

/// Desired-state message when a node rejects a bid request.
pub const REASON_BID_REJECTED: &str = "bid rejected";
/// Desired-state message when an execution completes normally.
pub const REASON_EXECUTION_COMPLETED: &str = "execution completed";
/// Message used when a long-running job reports completion.
pub const REASON_COMPLETED_UNEXPECTEDLY: &str = "execution completed unexpectedly";
/// Desired-state message when an execution fails.
pub const REASON_EXECUTION_FAILED: &str = "execution failed";

/// A conditional execution transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRule {
    /// Precondition on the current execution.
    pub condition: UpdateExecutionCondition,
    /// Values written when the precondition holds.
    pub new_values: ExecutionUpdate,
}

impl TransitionRule {
    /// Builds the store request for one execution.
    #[must_use]
    pub fn into_request(self, execution_id: ExecutionId, events: Vec<Event>) -> UpdateExecutionRequest {
        UpdateExecutionRequest {
            execution_id,
            condition: self.condition,
            new_values: self.new_values,
            events,
        }
    }
}

/// Transition for a node's answer to a bid request.
///
/// A rejected bid also withdraws the intent to run, so the scheduler can
/// tell a retry-worthy rejection apart from an unrelated failure.
#[must_use]
pub fn bid_outcome(accepted: bool, node_message: &str) -> TransitionRule {
    let condition = UpdateExecutionCondition::desired_in(DesiredStateType::ACTIVE);

    let new_values = if accepted {
        ExecutionUpdate {
            compute_state: Some(
                State::new(ExecutionStateType::AskForBidAccepted).with_message(node_message),
            ),
            ..ExecutionUpdate::default()
        }
    } else {
        ExecutionUpdate {
            compute_state: Some(
                State::new(ExecutionStateType::AskForBidRejected).with_message(node_message),
            ),
            desired_state: Some(
                State::new(DesiredStateType::Stopped).with_message(REASON_BID_REJECTED),
            ),
            ..ExecutionUpdate::default()
        }
    };

    TransitionRule {
        condition,
        new_values,
    }
}

/// Transition for a node reporting that an execution finished.
///
/// Long-running jobs are not expected to finish on their own, so their
/// completion is recorded as a failure. The published result and output are
/// still stored as reported.
#[must_use]
pub fn run_completed(job_is_long_running: bool, result: &RunResult) -> TransitionRule {
    let (compute_state, desired_state) = if job_is_long_running {
        (
            State::new(ExecutionStateType::Failed).with_message(REASON_COMPLETED_UNEXPECTEDLY),
            State::new(DesiredStateType::Stopped).with_message(REASON_COMPLETED_UNEXPECTEDLY),
        )
    } else {
        (
            State::new(ExecutionStateType::Completed),
            State::new(DesiredStateType::Stopped).with_message(REASON_EXECUTION_COMPLETED),
        )
    };

    TransitionRule {
        condition: UpdateExecutionCondition::desired_in([DesiredStateType::Running]),
        new_values: ExecutionUpdate {
            compute_state: Some(compute_state),
            desired_state: Some(desired_state),
            published_result: Some(result.publish_result.clone()),
            run_output: Some(result.run_command_result.clone()),
        },
    }
}

/// Transition for a node reporting that an execution failed.
///
/// Uses a deny-list so a late failure cannot overwrite a terminal outcome.
#[must_use]
pub fn compute_failed(error: &str) -> TransitionRule {
    TransitionRule {
        condition: UpdateExecutionCondition::compute_not_in([
            ExecutionStateType::Completed,
            ExecutionStateType::Cancelled,
        ]),
        new_values: ExecutionUpdate {
            compute_state: Some(State::new(ExecutionStateType::Failed).with_message(error)),
            desired_state: Some(
                State::new(DesiredStateType::Stopped).with_message(REASON_EXECUTION_FAILED),
            ),
            ..ExecutionUpdate::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::OutcomeHeader;
    use crate::models::{JobType, PublishedResult, RunCommandResult};

    fn run_result() -> RunResult {
        RunResult {
            header: OutcomeHeader::new("exec-1", "job-1", JobType::Batch),
            publish_result: PublishedResult {
                publisher_type: "s3".into(),
                ..PublishedResult::default()
            },
            run_command_result: RunCommandResult {
                stdout: "ok".into(),
                ..RunCommandResult::default()
            },
        }
    }

    #[test]
    fn accepted_bid_leaves_desired_state_alone() {
        let rule = bid_outcome(true, "capacity available");
        let compute = rule.new_values.compute_state.unwrap();
        assert_eq!(compute.state_type, ExecutionStateType::AskForBidAccepted);
        assert_eq!(compute.message, "capacity available");
        assert!(rule.new_values.desired_state.is_none());
        assert_eq!(
            rule.condition.expected_desired_states,
            vec![DesiredStateType::Pending, DesiredStateType::Running]
        );
    }

    #[test]
    fn rejected_bid_stops_execution() {
        let rule = bid_outcome(false, "no gpu");
        assert_eq!(
            rule.new_values.compute_state.unwrap().state_type,
            ExecutionStateType::AskForBidRejected
        );
        let desired = rule.new_values.desired_state.unwrap();
        assert_eq!(desired.state_type, DesiredStateType::Stopped);
        assert_eq!(desired.message, REASON_BID_REJECTED);
    }

    #[test]
    fn batch_completion_is_success() {
        let rule = run_completed(false, &run_result());
        assert_eq!(
            rule.new_values.compute_state.unwrap().state_type,
            ExecutionStateType::Completed
        );
        assert_eq!(
            rule.new_values.desired_state.unwrap().message,
            REASON_EXECUTION_COMPLETED
        );
        assert_eq!(
            rule.condition.expected_desired_states,
            vec![DesiredStateType::Running]
        );
        assert_eq!(rule.new_values.run_output.unwrap().stdout, "ok");
    }

    #[test]
    fn long_running_completion_is_failure() {
        let rule = run_completed(true, &run_result());
        let compute = rule.new_values.compute_state.unwrap();
        assert_eq!(compute.state_type, ExecutionStateType::Failed);
        assert_eq!(compute.message, REASON_COMPLETED_UNEXPECTEDLY);
        assert_eq!(
            rule.new_values.desired_state.unwrap().state_type,
            DesiredStateType::Stopped
        );
        assert_eq!(
            rule.new_values.published_result.unwrap().publisher_type,
            "s3"
        );
    }

    #[test]
    fn compute_failure_uses_deny_list() {
        let rule = compute_failed("out of memory");
        assert!(rule.condition.expected_desired_states.is_empty());
        assert_eq!(
            rule.condition.unexpected_states,
            vec![ExecutionStateType::Completed, ExecutionStateType::Cancelled]
        );
        assert_eq!(rule.new_values.compute_state.unwrap().message, "out of memory");
    }

    #[test]
    fn into_request_carries_events() {
        let events = vec![Event::new("Exec", "failed")];
        let request =
            compute_failed("boom").into_request(ExecutionId::new("exec-9"), events.clone());
        assert_eq!(request.execution_id.as_str(), "exec-9");
        assert_eq!(request.events, events);
    }
}
