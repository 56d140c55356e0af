//! Custom assertion helpers for integration tests.

use servo_orchestrator::models::{DesiredStateType, Execution, ExecutionStateType};
use servo_orchestrator::store::memory::StoreOp;

use crate::telemetry::{Observation, RecordingTelemetry};

/// Asserts the compute and desired states of an execution.
///
/// # Panics
///
/// Panics if either state differs.
pub fn assert_execution_states(
    execution: &Execution,
    compute: ExecutionStateType,
    desired: DesiredStateType,
) {
    assert_eq!(
        execution.compute_state.state_type, compute,
        "Expected compute state {compute:?} for {}, got {:?}",
        execution.id, execution.compute_state.state_type
    );
    assert_eq!(
        execution.desired_state.state_type, desired,
        "Expected desired state {desired:?} for {}, got {:?}",
        execution.id, execution.desired_state.state_type
    );
}

/// Asserts that no store operation ran.
///
/// # Panics
///
/// Panics if any operation was recorded.
pub fn assert_store_untouched(ops: &[StoreOp]) {
    assert!(ops.is_empty(), "Expected no store access, got {ops:?}");
}

/// Asserts that exactly one message was counted, with the given outcome.
///
/// # Panics
///
/// Panics if the counter was incremented zero or several times, or with a
/// different outcome or message type.
pub fn assert_single_outcome(
    telemetry: &RecordingTelemetry,
    counter: &str,
    message_type: &str,
    outcome: &str,
) {
    let counts: Vec<Observation> = telemetry.counters(counter);
    assert_eq!(
        counts.len(),
        1,
        "Expected exactly one {counter} increment, got {counts:?}"
    );
    assert_eq!(counts[0].label("message_type"), Some(message_type));
    assert_eq!(counts[0].label("outcome"), Some(outcome));
}
