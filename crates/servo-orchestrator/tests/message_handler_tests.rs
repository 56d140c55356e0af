//! Integration tests for message reconciliation against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use servo_core::JobId;
use servo_orchestrator::config::HandlerConfig;
use servo_orchestrator::envelope::{KEY_MESSAGE_TYPE, Message, Metadata, Payload};
use servo_orchestrator::error::Error;
use servo_orchestrator::messages::{BidResult, OutcomeHeader};
use servo_orchestrator::metrics::TelemetryNames;
use servo_orchestrator::models::{
    DesiredStateType, EvalStatus, EvalTrigger, Event, ExecutionStateType, JobType,
};
use servo_orchestrator::policy::ErrorPolicy;
use servo_orchestrator::store::memory::{InMemoryJobStore, StoreOp};
use servo_orchestrator::transition::{
    REASON_BID_REJECTED, REASON_COMPLETED_UNEXPECTEDLY, REASON_EXECUTION_COMPLETED,
    REASON_EXECUTION_FAILED,
};
use servo_test_utils::{
    LogCapture, TestContext, assert_execution_states, assert_single_outcome,
    assert_store_untouched, bid_result_message, compute_error_message, event_field,
    init_test_logging, run_result_message,
};

fn names() -> TelemetryNames {
    TelemetryNames::default()
}

fn propagate() -> HandlerConfig {
    HandlerConfig {
        error_policy: ErrorPolicy::Propagate,
        ..HandlerConfig::default()
    }
}

/// Accepted bid on a pending execution: compute state moves, desired state stays.
#[tokio::test]
async fn accepted_bid_records_acceptance_and_enqueues_evaluation() {
    init_test_logging();
    let ctx = TestContext::new();
    ctx.seed_job("J1", JobType::Batch).await;
    ctx.seed_execution("E1", "J1", ExecutionStateType::AskForBid, DesiredStateType::Pending)
        .await;

    let message = bid_result_message("E1", "J1", JobType::Batch, true, "capacity available");
    let handler = ctx.handler();
    assert!(handler.should_process(&message));
    handler
        .handle_message(&CancellationToken::new(), &message)
        .await
        .expect("handler should succeed");

    let exec = ctx.execution("E1").await;
    assert_execution_states(
        &exec,
        ExecutionStateType::AskForBidAccepted,
        DesiredStateType::Pending,
    );
    assert_eq!(exec.compute_state.message, "capacity available");
    assert_eq!(exec.revision, 2);

    let evals = ctx.store.evaluations_for_job(&JobId::new("J1")).await;
    assert_eq!(evals.len(), 1);
    assert_eq!(evals[0].status, EvalStatus::Pending);
    assert_eq!(evals[0].triggered_by, EvalTrigger::ExecutionUpdated);
    assert_eq!(evals[0].job_type, JobType::Batch);
    assert_eq!(evals[0].create_time, evals[0].modify_time);

    assert_single_outcome(&ctx.telemetry, &names().process_count, "BidResult", "success");
    assert_eq!(
        ctx.telemetry.parts(&names().process_part_duration),
        vec!["begin_tx", "update_execution", "create_evaluation", "commit_tx"]
    );
    for part in ctx.telemetry.durations(&names().process_part_duration) {
        assert_eq!(part.label("outcome"), Some("success"));
        assert_eq!(part.label("message_type"), Some("BidResult"));
    }
}

/// Rejected bid also withdraws intent to run.
#[tokio::test]
async fn rejected_bid_stops_execution() {
    let ctx = TestContext::new();
    ctx.seed_job("J1", JobType::Batch).await;
    ctx.seed_execution("E1", "J1", ExecutionStateType::AskForBid, DesiredStateType::Pending)
        .await;

    let message = bid_result_message("E1", "J1", JobType::Batch, false, "no gpu");
    ctx.handler()
        .handle_message(&CancellationToken::new(), &message)
        .await
        .expect("handler should succeed");

    let exec = ctx.execution("E1").await;
    assert_execution_states(
        &exec,
        ExecutionStateType::AskForBidRejected,
        DesiredStateType::Stopped,
    );
    assert_eq!(exec.compute_state.message, "no gpu");
    assert_eq!(exec.desired_state.message, REASON_BID_REJECTED);
    assert_eq!(ctx.evaluation_count("J1").await, 1);
}

/// Bid on an already-stopped execution is rejected by the precondition.
#[tokio::test]
async fn bid_on_stopped_execution_is_rejected_and_absorbed() {
    let ctx = TestContext::new();
    ctx.seed_job("J1", JobType::Batch).await;
    ctx.seed_execution("E1", "J1", ExecutionStateType::Cancelled, DesiredStateType::Stopped)
        .await;

    let message = bid_result_message("E1", "J1", JobType::Batch, true, "");
    ctx.handler()
        .handle_message(&CancellationToken::new(), &message)
        .await
        .expect("errors are absorbed");

    let exec = ctx.execution("E1").await;
    assert_execution_states(&exec, ExecutionStateType::Cancelled, DesiredStateType::Stopped);
    assert_eq!(exec.revision, 1);
    assert_eq!(ctx.evaluation_count("J1").await, 0);
    assert_single_outcome(&ctx.telemetry, &names().process_count, "BidResult", "failure");
}

/// Batch completion: result and output are stored verbatim.
#[tokio::test]
async fn batch_run_result_completes_execution() {
    let ctx = TestContext::new();
    ctx.seed_job("J2", JobType::Batch).await;
    ctx.seed_execution("E1", "J2", ExecutionStateType::BidAccepted, DesiredStateType::Running)
        .await;

    let message = run_result_message("E1", "J2", JobType::Batch);
    let expected = message.as_run_result().unwrap().clone();
    ctx.handler()
        .handle_message(&CancellationToken::new(), &message)
        .await
        .expect("handler should succeed");

    let exec = ctx.execution("E1").await;
    assert_execution_states(&exec, ExecutionStateType::Completed, DesiredStateType::Stopped);
    assert_eq!(exec.desired_state.message, REASON_EXECUTION_COMPLETED);
    assert_eq!(exec.published_result, Some(expected.publish_result));
    assert_eq!(exec.run_output, Some(expected.run_command_result));
    assert_eq!(ctx.evaluation_count("J2").await, 1);

    assert_eq!(
        ctx.telemetry.parts(&names().process_part_duration),
        vec![
            "begin_tx",
            "get_job",
            "update_execution",
            "create_evaluation",
            "commit_tx"
        ]
    );
    assert_eq!(
        ctx.store.operations().unwrap(),
        vec![
            StoreOp::BeginTx,
            StoreOp::GetJob,
            StoreOp::UpdateExecution,
            StoreOp::CreateEvaluation,
            StoreOp::Commit,
            StoreOp::Rollback,
        ]
    );
}

/// Long-running jobs are not expected to finish; completion is a failure.
#[tokio::test]
async fn long_running_completion_is_recorded_as_failure() {
    for job_type in [JobType::Service, JobType::Daemon] {
        let ctx = TestContext::new();
        ctx.seed_job("J2", job_type).await;
        ctx.seed_execution("E1", "J2", ExecutionStateType::BidAccepted, DesiredStateType::Running)
            .await;

        let message = run_result_message("E1", "J2", job_type);
        let expected = message.as_run_result().unwrap().clone();
        ctx.handler()
            .handle_message(&CancellationToken::new(), &message)
            .await
            .expect("handler should succeed");

        let exec = ctx.execution("E1").await;
        assert_execution_states(&exec, ExecutionStateType::Failed, DesiredStateType::Stopped);
        assert_eq!(exec.compute_state.message, REASON_COMPLETED_UNEXPECTEDLY);
        assert_eq!(exec.published_result, Some(expected.publish_result));
        assert_eq!(ctx.evaluation_count("J2").await, 1);
        // the store work itself succeeded
        assert_single_outcome(&ctx.telemetry, &names().process_count, "RunResult", "success");
    }
}

/// Completion requires the execution to still be intended to run.
#[tokio::test]
async fn run_result_on_pending_execution_is_rejected() {
    let ctx = TestContext::new();
    ctx.seed_job("J2", JobType::Batch).await;
    ctx.seed_execution("E1", "J2", ExecutionStateType::AskForBid, DesiredStateType::Pending)
        .await;

    let err = ctx
        .handler_with_config(propagate())
        .handle_message(
            &CancellationToken::new(),
            &run_result_message("E1", "J2", JobType::Batch),
        )
        .await
        .unwrap_err();

    assert!(err.is_condition_not_met(), "unexpected error: {err}");
    assert!(!err.is_retryable());
    assert!(ctx.execution("E1").await.published_result.is_none());
    assert_eq!(ctx.evaluation_count("J2").await, 0);
}

/// Missing job on completion fails before any write.
#[tokio::test]
async fn run_result_for_unknown_job_fails() {
    let ctx = TestContext::new();
    ctx.seed_execution("E1", "J-missing", ExecutionStateType::BidAccepted, DesiredStateType::Running)
        .await;

    let err = ctx
        .handler_with_config(propagate())
        .handle_message(
            &CancellationToken::new(),
            &run_result_message("E1", "J-missing", JobType::Batch),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::JobNotFound { .. }), "unexpected error: {err}");
    assert_eq!(ctx.execution("E1").await.revision, 1);
    assert!(ctx.store.evaluations().await.is_empty());
    assert!(!ctx.store.operations().unwrap().contains(&StoreOp::UpdateExecution));
}

/// Failure on a running execution stops it.
#[tokio::test]
async fn compute_error_fails_execution() {
    let ctx = TestContext::new();
    ctx.seed_job("J1", JobType::Ops).await;
    ctx.seed_execution("E1", "J1", ExecutionStateType::BidAccepted, DesiredStateType::Running)
        .await;

    let message = compute_error_message("E1", "J1", JobType::Ops, "container exited with 137");
    ctx.handler()
        .handle_message(&CancellationToken::new(), &message)
        .await
        .expect("handler should succeed");

    let exec = ctx.execution("E1").await;
    assert_execution_states(&exec, ExecutionStateType::Failed, DesiredStateType::Stopped);
    assert_eq!(exec.compute_state.message, "container exited with 137");
    assert_eq!(exec.desired_state.message, REASON_EXECUTION_FAILED);
    assert_eq!(ctx.evaluation_count("J1").await, 1);
}

/// A late failure never overwrites a terminal outcome.
#[tokio::test]
async fn compute_error_after_terminal_state_is_absorbed() {
    for terminal in [ExecutionStateType::Completed, ExecutionStateType::Cancelled] {
        let ctx = TestContext::new();
        ctx.seed_job("J1", JobType::Batch).await;
        ctx.seed_execution("E1", "J1", terminal, DesiredStateType::Stopped)
            .await;

        let result = ctx
            .handler()
            .handle_message(
                &CancellationToken::new(),
                &compute_error_message("E1", "J1", JobType::Batch, "late failure"),
            )
            .await;

        assert!(result.is_ok(), "errors should be absorbed");
        let exec = ctx.execution("E1").await;
        assert_eq!(exec.compute_state.state_type, terminal);
        assert_eq!(exec.revision, 1);
        assert_eq!(ctx.evaluation_count("J1").await, 0);
        assert_single_outcome(
            &ctx.telemetry,
            &names().process_count,
            "ComputeError",
            "failure",
        );
    }
}

/// Events carried by the message are appended to the execution history.
#[tokio::test]
async fn message_events_are_appended() {
    let ctx = TestContext::new();
    ctx.seed_job("J1", JobType::Batch).await;
    ctx.seed_execution("E1", "J1", ExecutionStateType::AskForBid, DesiredStateType::Running)
        .await;

    let events = vec![
        Event::new("Bidding", "bid received").with_detail("node", "node-a"),
        Event::new("Bidding", "bid accepted"),
    ];
    let message = Message::bid_result(BidResult {
        header: OutcomeHeader::new("E1", "J1", JobType::Batch).with_events(events.clone()),
        accepted: true,
        message: String::new(),
    });
    ctx.handler()
        .handle_message(&CancellationToken::new(), &message)
        .await
        .expect("handler should succeed");

    assert_eq!(ctx.execution("E1").await.events, events);
}

/// Declared type and payload kind disagree: nothing reaches the store.
#[tokio::test]
async fn payload_mismatch_never_touches_store() {
    let ctx = TestContext::new();
    ctx.seed_job("J1", JobType::Batch).await;
    ctx.seed_execution("E1", "J1", ExecutionStateType::BidAccepted, DesiredStateType::Running)
        .await;

    let run = run_result_message("E1", "J1", JobType::Batch);
    let message = Message::new(
        Metadata::new()
            .with(KEY_MESSAGE_TYPE, "BidResult")
            .with("Servo-Source", "node-a"),
        run.payload,
    );

    let err = ctx
        .handler_with_config(propagate())
        .handle_message(&CancellationToken::new(), &message)
        .await
        .unwrap_err();

    match err {
        Error::UnexpectedPayloadType { expected, actual } => {
            assert_eq!(expected, "BidResult");
            assert_eq!(actual, "RunResult");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_store_untouched(&ctx.store.operations().unwrap());
    assert_eq!(ctx.execution("E1").await.revision, 1);
    assert_single_outcome(&ctx.telemetry, &names().process_count, "BidResult", "failure");
}

/// Messages outside the handled set are filtered out, and fail if forced through.
#[tokio::test]
async fn unknown_message_type_is_not_processed() {
    let ctx = TestContext::new();
    let message = Message::new(
        Metadata::new().with(KEY_MESSAGE_TYPE, "AskBidRequest"),
        Payload::Other {
            kind: "AskBidRequest".to_string(),
            body: serde_json::json!({"jobId": "J1"}),
        },
    );
    let untyped = Message::new(Metadata::new(), message.payload.clone());

    let handler = ctx.handler();
    assert!(!handler.should_process(&message));
    assert!(!handler.should_process(&untyped));

    assert!(
        handler
            .handle_message(&CancellationToken::new(), &message)
            .await
            .is_ok()
    );
    assert_store_untouched(&ctx.store.operations().unwrap());
    assert_single_outcome(&ctx.telemetry, &names().process_count, "AskBidRequest", "failure");

    let err = ctx
        .handler_with_config(propagate())
        .handle_message(&CancellationToken::new(), &untyped)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedMessageType { .. }));
}

/// Evaluation write failure rolls back the execution update.
#[tokio::test]
async fn evaluation_failure_rolls_back_update() {
    let ctx = TestContext::new();
    ctx.seed_job("J1", JobType::Batch).await;
    ctx.seed_execution("E1", "J1", ExecutionStateType::AskForBid, DesiredStateType::Pending)
        .await;
    ctx.store.inject_failure(StoreOp::CreateEvaluation).unwrap();

    let err = ctx
        .handler_with_config(propagate())
        .handle_message(
            &CancellationToken::new(),
            &bid_result_message("E1", "J1", JobType::Batch, false, "busy"),
        )
        .await
        .unwrap_err();

    assert!(
        err.to_string()
            .contains("failed to create/save evaluation for job J1"),
        "unexpected error: {err}"
    );
    let exec = ctx.execution("E1").await;
    assert_execution_states(&exec, ExecutionStateType::AskForBid, DesiredStateType::Pending);
    assert_eq!(exec.revision, 1);
    assert_eq!(ctx.evaluation_count("J1").await, 0);
    assert_eq!(
        ctx.store.operations().unwrap().last(),
        Some(&StoreOp::Rollback)
    );
}

/// Commit failure leaves neither write visible.
#[tokio::test]
async fn commit_failure_leaves_store_unchanged() {
    let ctx = TestContext::new();
    ctx.seed_job("J1", JobType::Batch).await;
    ctx.seed_execution("E1", "J1", ExecutionStateType::BidAccepted, DesiredStateType::Running)
        .await;
    ctx.store.inject_failure(StoreOp::Commit).unwrap();

    let result = ctx
        .handler()
        .handle_message(
            &CancellationToken::new(),
            &compute_error_message("E1", "J1", JobType::Batch, "oom"),
        )
        .await;
    assert!(result.is_ok());

    let exec = ctx.execution("E1").await;
    assert_execution_states(&exec, ExecutionStateType::BidAccepted, DesiredStateType::Running);
    assert_eq!(ctx.evaluation_count("J1").await, 0);
    assert_single_outcome(
        &ctx.telemetry,
        &names().process_count,
        "ComputeError",
        "failure",
    );

    // the store lock was released; later messages still go through
    ctx.store.clear_failures().unwrap();
    ctx.handler()
        .handle_message(
            &CancellationToken::new(),
            &compute_error_message("E1", "J1", JobType::Batch, "oom"),
        )
        .await
        .unwrap();
    assert_eq!(ctx.evaluation_count("J1").await, 1);
}

/// Transaction start failure is wrapped with context.
#[tokio::test]
async fn begin_failure_is_wrapped() {
    let ctx = TestContext::new();
    ctx.store.inject_failure(StoreOp::BeginTx).unwrap();

    let err = ctx
        .handler_with_config(propagate())
        .handle_message(
            &CancellationToken::new(),
            &compute_error_message("E1", "J1", JobType::Batch, "oom"),
        )
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "failed to begin transaction");
    assert!(std::error::Error::source(&err).is_some());
    assert_eq!(
        ctx.telemetry.parts(&names().process_part_duration),
        vec!["begin_tx"]
    );
}

/// Slow store calls hit the per-operation deadline.
#[tokio::test]
async fn slow_store_times_out() {
    let ctx = TestContext::with_store(InMemoryJobStore::with_latency(Duration::from_millis(500)));
    let config = HandlerConfig {
        store_op_timeout: Duration::from_millis(20),
        ..propagate()
    };

    let err = ctx
        .handler_with_config(config)
        .handle_message(
            &CancellationToken::new(),
            &compute_error_message("E1", "J1", JobType::Batch, "oom"),
        )
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    let source = std::error::Error::source(&err).expect("timeout source");
    assert!(source.to_string().contains("timed out"), "unexpected source: {source}");
}

/// A fired cancellation signal aborts before the store is reached.
#[tokio::test]
async fn cancelled_token_aborts_handling() {
    let ctx = TestContext::new();
    ctx.seed_job("J1", JobType::Batch).await;
    ctx.seed_execution("E1", "J1", ExecutionStateType::BidAccepted, DesiredStateType::Running)
        .await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = ctx
        .handler_with_config(propagate())
        .handle_message(
            &cancel,
            &compute_error_message("E1", "J1", JobType::Batch, "oom"),
        )
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert_store_untouched(&ctx.store.operations().unwrap());
    assert_eq!(ctx.execution("E1").await.revision, 1);
}

/// Configured prefix flows through to every metric name.
#[tokio::test]
async fn metric_names_follow_configuration() {
    let ctx = TestContext::new();
    let config = HandlerConfig::from_env_with(|key| {
        (key == "SERVO_ORCH_METRIC_PREFIX").then(|| "acme".to_string())
    })
    .unwrap();

    ctx.handler_with_config(config)
        .handle_message(
            &CancellationToken::new(),
            &compute_error_message("E1", "J1", JobType::Batch, "oom"),
        )
        .await
        .unwrap();

    assert_single_outcome(
        &ctx.telemetry,
        "acme_message_handler_process_total",
        "ComputeError",
        "failure",
    );
    assert!(ctx.telemetry.counters(&names().process_count).is_empty());
}

/// Duplicate failure reports may race; updates serialize in the store.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_messages_for_one_execution_serialize() {
    let ctx = TestContext::new();
    ctx.seed_job("J1", JobType::Batch).await;
    ctx.seed_execution("E1", "J1", ExecutionStateType::AskForBid, DesiredStateType::Running)
        .await;

    let handler = Arc::new(ctx.handler());
    let messages = [
        compute_error_message("E1", "J1", JobType::Batch, "node lost"),
        compute_error_message("E1", "J1", JobType::Batch, "heartbeat timeout"),
    ];

    let tasks: Vec<_> = messages
        .into_iter()
        .map(|message| {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                handler
                    .handle_message(&CancellationToken::new(), &message)
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.expect("task should not panic").unwrap();
    }

    // a failed execution may fail again, so both land in either order
    let exec = ctx.execution("E1").await;
    assert_execution_states(&exec, ExecutionStateType::Failed, DesiredStateType::Stopped);
    assert_eq!(exec.revision, 3);
    assert_eq!(ctx.evaluation_count("J1").await, 2);
    assert_eq!(ctx.telemetry.counters(&names().process_count).len(), 2);
}

const HANDLER_ERROR: &str = "error handling message";

/// A failed message is logged once at error level with its metadata and cause.
#[tokio::test]
async fn failure_is_logged_once_with_metadata_and_cause() {
    let ctx = TestContext::new();
    ctx.seed_job("J1", JobType::Batch).await;
    ctx.seed_execution("E1", "J1", ExecutionStateType::Completed, DesiredStateType::Stopped)
        .await;

    let mut message = compute_error_message("E1", "J1", JobType::Batch, "late failure");
    message.metadata.insert("Servo-Source", "node a=1");

    let logs = LogCapture::new();
    {
        let _guard = logs.install();
        ctx.handler()
            .handle_message(&CancellationToken::new(), &message)
            .await
            .expect("errors are absorbed");
    }

    let errors = logs.errors_with_message(HANDLER_ERROR);
    assert_eq!(errors.len(), 1, "events: {:?}", logs.events());

    let metadata = event_field(&errors[0], "metadata").expect("metadata field");
    let logged: std::collections::BTreeMap<String, String> =
        serde_json::from_str(metadata).expect("metadata is a JSON object");
    assert_eq!(logged, message.metadata.to_map());
    assert_eq!(logged.get(KEY_MESSAGE_TYPE).map(String::as_str), Some("ComputeError"));

    let cause = event_field(&errors[0], "error").expect("error field");
    assert!(
        cause.contains("condition not met for execution E1"),
        "error field: {cause}"
    );
}

/// Each failing message produces its own error event.
#[tokio::test]
async fn payload_failure_is_logged_with_declared_type() {
    let ctx = TestContext::new();
    let run = run_result_message("E1", "J1", JobType::Batch);
    let message = Message::new(Metadata::new().with(KEY_MESSAGE_TYPE, "BidResult"), run.payload);

    let logs = LogCapture::new();
    {
        let _guard = logs.install();
        let handler = ctx.handler();
        for _ in 0..2 {
            handler
                .handle_message(&CancellationToken::new(), &message)
                .await
                .expect("errors are absorbed");
        }
    }

    let errors = logs.errors_with_message(HANDLER_ERROR);
    assert_eq!(errors.len(), 2);
    for event in &errors {
        let metadata = event_field(event, "metadata").expect("metadata field");
        assert!(metadata.contains(r#""Servo-Type":"BidResult""#), "metadata: {metadata}");
        let cause = event_field(event, "error").expect("error field");
        assert!(cause.contains("RunResult"), "error field: {cause}");
    }
}

/// Successful handling emits no error event.
#[tokio::test]
async fn success_is_not_logged_as_error() {
    let ctx = TestContext::new();
    ctx.seed_job("J1", JobType::Batch).await;
    ctx.seed_execution("E1", "J1", ExecutionStateType::BidAccepted, DesiredStateType::Running)
        .await;

    let logs = LogCapture::new();
    {
        let _guard = logs.install();
        ctx.handler()
            .handle_message(
                &CancellationToken::new(),
                &run_result_message("E1", "J1", JobType::Batch),
            )
            .await
            .expect("handler should succeed");
    }

    assert!(logs.errors_with_message(HANDLER_ERROR).is_empty());
    let enqueued: Vec<_> = logs
        .events()
        .into_iter()
        .filter(|event| event_field(event, "message") == Some("evaluation enqueued"))
        .collect();
    assert_eq!(enqueued.len(), 1, "events: {:?}", logs.events());
    assert_eq!(event_field(&enqueued[0], "job_id"), Some("J1"));
    assert_eq!(event_field(&enqueued[0], "trigger"), Some("exec-update"));
}
