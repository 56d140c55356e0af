//! Reconciles node outcome messages against the job store.
//!
//! For every relevant message the handler opens one transaction, applies a
//! conditional execution update, enqueues a pending evaluation for the job,
//! and commits. Either both writes land or neither does.
//!
//! ## Ordering
//!
//! Messages are not sequenced. A `ComputeError` may be handled before,
//! after, or concurrently with a `BidResult` for the same execution. The
//! only protection is the precondition on each update, which makes the store
//! reject a message that arrives against an incompatible prior state.
//! Reordering itself is not repaired.
//!
//! ## Failures
//!
//! Every failure is counted, logged with the full message metadata, and then
//! handed to the configured [`ErrorPolicy`]. Under the default policy the
//! delivery layer always sees success and the message is not redelivered.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use servo_core::JobId;

use crate::config::HandlerConfig;
use crate::envelope::{Message, MessageType};
use crate::error::{Error, Result};
use crate::messages::OutcomeHeader;
use crate::metrics::{
    MessageMetrics, MetricsFacadeSink, StorePart, TelemetryNames, TelemetrySink,
};
use crate::models::{EvalTrigger, Evaluation, JobType};
use crate::policy::ErrorPolicy;
use crate::store::{JobStore, Transaction, UpdateExecutionRequest};
use crate::transition;

/// Handles `BidResult`, `RunResult`, and `ComputeError` messages.
///
/// Safe to share across tasks; holds no per-message state.
pub struct MessageHandler<S: JobStore> {
    store: Arc<S>,
    telemetry: Arc<dyn TelemetrySink>,
    names: TelemetryNames,
    error_policy: ErrorPolicy,
    store_op_timeout: std::time::Duration,
}

impl<S: JobStore> MessageHandler<S> {
    /// Creates a handler with default configuration.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, HandlerConfig::default())
    }

    /// Creates a handler from explicit configuration.
    #[must_use]
    pub fn with_config(store: Arc<S>, config: HandlerConfig) -> Self {
        Self {
            store,
            telemetry: Arc::new(MetricsFacadeSink),
            names: config.telemetry_names,
            error_policy: config.error_policy,
            store_op_timeout: config.store_op_timeout,
        }
    }

    /// Replaces the telemetry sink.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Replaces the error policy.
    #[must_use]
    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }

    /// Returns true if this handler should receive `message`.
    ///
    /// Pure: inspects only the message type metadata.
    #[must_use]
    pub fn should_process(&self, message: &Message) -> bool {
        MessageType::parse(message.message_type()).is_some()
    }

    /// Handles one message.
    ///
    /// Every store call is bounded by the configured timeout and aborted
    /// when `cancel` fires; both surface as ordinary handler failures.
    ///
    /// # Errors
    ///
    /// Never under [`ErrorPolicy::Absorb`]. Under
    /// [`ErrorPolicy::Propagate`], returns the handler failure.
    #[tracing::instrument(
        skip_all,
        fields(
            message_type = %message.message_type(),
            execution_id = tracing::field::Empty,
            job_id = tracing::field::Empty,
        )
    )]
    pub async fn handle_message(
        &self,
        cancel: &CancellationToken,
        message: &Message,
    ) -> Result<()> {
        let mut metrics =
            MessageMetrics::new(self.telemetry.as_ref(), &self.names, message.message_type());

        let result = match MessageType::parse(message.message_type()) {
            Some(MessageType::BidResult) => self.on_bid_complete(cancel, &mut metrics, message).await,
            Some(MessageType::RunResult) => self.on_run_complete(cancel, &mut metrics, message).await,
            Some(MessageType::ComputeError) => {
                self.on_compute_failure(cancel, &mut metrics, message).await
            }
            None => Err(Error::UnsupportedMessageType {
                message_type: message.message_type().to_string(),
            }),
        };

        self.handle_error(&mut metrics, message, result)
    }

    fn handle_error(
        &self,
        metrics: &mut MessageMetrics<'_>,
        message: &Message,
        result: Result<()>,
    ) -> Result<()> {
        let Err(err) = result else {
            return Ok(());
        };

        metrics.mark_failure();
        tracing::error!(
            metadata = %message.metadata,
            condition_not_met = err.is_condition_not_met(),
            retryable = err.is_retryable(),
            error = &err as &(dyn std::error::Error + 'static),
            "error handling message"
        );
        self.error_policy.resolve(err)
    }

    async fn on_bid_complete(
        &self,
        cancel: &CancellationToken,
        metrics: &mut MessageMetrics<'_>,
        message: &Message,
    ) -> Result<()> {
        let result = message.as_bid_result()?;
        record_ids(&result.header);

        let request = transition::bid_outcome(result.accepted, &result.message).into_request(
            result.header.execution_id.clone(),
            result.header.events.clone(),
        );

        let mut tx = self.begin_tx(cancel, metrics).await?;
        // enqueue evaluation to allow the scheduler to either accept the bid, or find a new node
        let outcome = self
            .apply(cancel, metrics, &mut tx, request, &result.header)
            .await;
        self.release(&mut tx).await;
        outcome
    }

    async fn on_run_complete(
        &self,
        cancel: &CancellationToken,
        metrics: &mut MessageMetrics<'_>,
        message: &Message,
    ) -> Result<()> {
        let result = message.as_run_result()?;
        record_ids(&result.header);

        let mut tx = self.begin_tx(cancel, metrics).await?;
        let outcome = async {
            let job = self
                .guarded("get_job", cancel, self.store.get_job(&mut tx, &result.header.job_id))
                .await?;
            metrics.latency(StorePart::GetJob);

            if job.is_long_running() {
                tracing::error!(
                    job_id = %result.header.job_id,
                    job_type = %job.job_type,
                    "long-running job reported completion; marking the execution as failed instead"
                );
            }

            let request = transition::run_completed(job.is_long_running(), result).into_request(
                result.header.execution_id.clone(),
                result.header.events.clone(),
            );
            // the scheduler marks the job completed once all its executions are
            self.apply(cancel, metrics, &mut tx, request, &result.header)
                .await
        }
        .await;
        self.release(&mut tx).await;
        outcome
    }

    async fn on_compute_failure(
        &self,
        cancel: &CancellationToken,
        metrics: &mut MessageMetrics<'_>,
        message: &Message,
    ) -> Result<()> {
        let failure = message.as_compute_error()?;
        record_ids(&failure.header);

        let request = transition::compute_failed(&failure.error).into_request(
            failure.header.execution_id.clone(),
            failure.header.events.clone(),
        );

        let mut tx = self.begin_tx(cancel, metrics).await?;
        // the scheduler either finds another node or marks the job failed
        let outcome = self
            .apply(cancel, metrics, &mut tx, request, &failure.header)
            .await;
        self.release(&mut tx).await;
        outcome
    }

    async fn begin_tx(
        &self,
        cancel: &CancellationToken,
        metrics: &mut MessageMetrics<'_>,
    ) -> Result<S::Tx> {
        let tx = self
            .guarded("begin_tx", cancel, self.store.begin_tx())
            .await
            .map_err(|e| Error::storage_with_source("failed to begin transaction", e));
        metrics.latency(StorePart::BeginTx);
        tx
    }

    /// Conditional update, evaluation, commit.
    async fn apply(
        &self,
        cancel: &CancellationToken,
        metrics: &mut MessageMetrics<'_>,
        tx: &mut S::Tx,
        request: UpdateExecutionRequest,
        header: &OutcomeHeader,
    ) -> Result<()> {
        self.guarded(
            "update_execution",
            cancel,
            self.store.update_execution(tx, request),
        )
        .await?;
        metrics.latency(StorePart::UpdateExecution);

        self.enqueue_evaluation(cancel, tx, &header.job_id, header.job_type)
            .await?;
        metrics.latency(StorePart::CreateEvaluation);

        let committed = self.guarded("commit_tx", cancel, tx.commit()).await;
        metrics.latency(StorePart::CommitTx);
        committed
    }

    /// Persists a pending evaluation for the job inside `tx`.
    async fn enqueue_evaluation(
        &self,
        cancel: &CancellationToken,
        tx: &mut S::Tx,
        job_id: &JobId,
        job_type: JobType,
    ) -> Result<()> {
        let trigger = EvalTrigger::ExecutionUpdated;
        let evaluation = Evaluation::pending(job_id.clone(), job_type, trigger);
        let evaluation_id = evaluation.id;

        self.guarded(
            "create_evaluation",
            cancel,
            self.store.create_evaluation(tx, evaluation),
        )
        .await
        .map_err(|e| {
            Error::storage_with_source(
                format!("failed to create/save evaluation for job {job_id}"),
                e,
            )
        })?;

        tracing::debug!(%job_id, %evaluation_id, %trigger, "evaluation enqueued");
        Ok(())
    }

    /// Rolls back unconditionally; a no-op after a successful commit.
    async fn release(&self, tx: &mut S::Tx) {
        if let Err(err) = tx.rollback().await {
            tracing::warn!(error = %err, "failed to roll back transaction");
        }
    }

    /// Bounds a store call by the operation timeout and the cancellation signal.
    async fn guarded<T, F>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled { operation }),
            outcome = tokio::time::timeout(self.store_op_timeout, fut) => {
                outcome.map_err(|_| Error::Timeout {
                    operation,
                    timeout_ms: u64::try_from(self.store_op_timeout.as_millis()).unwrap_or(u64::MAX),
                })?
            }
        }
    }
}

fn record_ids(header: &OutcomeHeader) {
    let span = tracing::Span::current();
    span.record("execution_id", tracing::field::display(&header.execution_id));
    span.record("job_id", tracing::field::display(&header.job_id));
}
