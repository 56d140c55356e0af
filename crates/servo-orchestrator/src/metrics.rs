//! Observability metrics for message handling.
//!
//! Telemetry is a side channel: nothing recorded here influences control
//! flow or the handler's return value.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `{prefix}_message_handler_process_total` | Counter | `message_type`, `outcome` | Handled messages |
//! | `{prefix}_message_handler_process_duration_seconds` | Histogram | `message_type`, `outcome` | End-to-end handling time |
//! | `{prefix}_message_handler_process_part_duration_seconds` | Histogram | `message_type`, `outcome`, `part` | Time spent in each store step |
//!
//! ## Integration
//!
//! The default sink writes through the `metrics` crate facade. To export to
//! Prometheus, install a recorder at startup:
//!
//! ```rust,ignore
//! use metrics_exporter_prometheus::PrometheusBuilder;
//!
//! PrometheusBuilder::new()
//!     .with_http_listener(([0, 0, 0, 0], 9090))
//!     .install()
//!     .expect("failed to install Prometheus recorder");
//! ```

use std::time::{Duration, Instant};

use metrics::{Label, counter, histogram};

/// Default metric name prefix.
pub const DEFAULT_PREFIX: &str = "servo_orch";

/// Metric and attribute names used by the message handler.
///
/// Supplied at construction so deployments can namespace their metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryNames {
    /// Counter: handled messages.
    pub process_count: String,
    /// Histogram: end-to-end handling duration in seconds.
    pub process_duration: String,
    /// Histogram: per-store-step duration in seconds.
    pub process_part_duration: String,
    /// Attribute key for the message type.
    pub attr_message_type: &'static str,
    /// Attribute key for the handling outcome.
    pub attr_outcome: &'static str,
    /// Attribute key for the store step.
    pub attr_part: &'static str,
    /// Outcome value for successfully handled messages.
    pub outcome_success: &'static str,
    /// Outcome value for messages whose handling failed.
    pub outcome_failure: &'static str,
}

impl TelemetryNames {
    /// Builds names under the given prefix.
    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            process_count: format!("{prefix}_message_handler_process_total"),
            process_duration: format!("{prefix}_message_handler_process_duration_seconds"),
            process_part_duration: format!(
                "{prefix}_message_handler_process_part_duration_seconds"
            ),
            attr_message_type: "message_type",
            attr_outcome: "outcome",
            attr_part: "part",
            outcome_success: "success",
            outcome_failure: "failure",
        }
    }
}

impl Default for TelemetryNames {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }
}

/// Store steps timed while handling a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorePart {
    /// Opening the transaction.
    BeginTx,
    /// Reading the job.
    GetJob,
    /// Conditional execution update.
    UpdateExecution,
    /// Creating the evaluation.
    CreateEvaluation,
    /// Committing the transaction.
    CommitTx,
}

impl StorePart {
    /// Returns the attribute value for this step.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::BeginTx => "begin_tx",
            Self::GetJob => "get_job",
            Self::UpdateExecution => "update_execution",
            Self::CreateEvaluation => "create_evaluation",
            Self::CommitTx => "commit_tx",
        }
    }
}

/// Destination for handler telemetry.
pub trait TelemetrySink: Send + Sync {
    /// Increments a counter by one.
    fn increment_counter(&self, name: &str, labels: &[Label]);

    /// Records a duration observation.
    fn record_duration(&self, name: &str, duration: Duration, labels: &[Label]);
}

/// Sink that forwards to the globally installed `metrics` recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsFacadeSink;

impl TelemetrySink for MetricsFacadeSink {
    fn increment_counter(&self, name: &str, labels: &[Label]) {
        counter!(name.to_string(), labels.to_vec()).increment(1);
    }

    fn record_duration(&self, name: &str, duration: Duration, labels: &[Label]) {
        histogram!(name.to_string(), labels.to_vec()).record(duration.as_secs_f64());
    }
}

/// Per-message recorder.
///
/// Times each store step since the previous one, and emits the message
/// counter and total duration exactly once when dropped, whatever the
/// outcome.
pub struct MessageMetrics<'a> {
    sink: &'a dyn TelemetrySink,
    names: &'a TelemetryNames,
    message_type: String,
    start: Instant,
    last_mark: Instant,
    failed: bool,
}

impl<'a> MessageMetrics<'a> {
    /// Starts recording for one message.
    #[must_use]
    pub fn new(
        sink: &'a dyn TelemetrySink,
        names: &'a TelemetryNames,
        message_type: impl Into<String>,
    ) -> Self {
        let now = Instant::now();
        Self {
            sink,
            names,
            message_type: message_type.into(),
            start: now,
            last_mark: now,
            failed: false,
        }
    }

    /// Records the time spent in `part` since the previous mark.
    ///
    /// Carries the outcome as it stands at the mark, so steps reached before
    /// a failure are labelled as successes.
    pub fn latency(&mut self, part: StorePart) {
        let now = Instant::now();
        let labels = [
            Label::new(self.names.attr_message_type, self.message_type.clone()),
            Label::new(self.names.attr_outcome, self.outcome()),
            Label::new(self.names.attr_part, part.as_label()),
        ];
        self.sink.record_duration(
            &self.names.process_part_duration,
            now.duration_since(self.last_mark),
            &labels,
        );
        self.last_mark = now;
    }

    /// Switches the outcome attribute to failure.
    pub fn mark_failure(&mut self) {
        self.failed = true;
    }

    fn outcome(&self) -> &'static str {
        if self.failed {
            self.names.outcome_failure
        } else {
            self.names.outcome_success
        }
    }
}

impl Drop for MessageMetrics<'_> {
    fn drop(&mut self) {
        let labels = [
            Label::new(self.names.attr_message_type, self.message_type.clone()),
            Label::new(self.names.attr_outcome, self.outcome()),
        ];
        self.sink
            .increment_counter(&self.names.process_count, &labels);
        self.sink.record_duration(
            &self.names.process_duration,
            self.start.elapsed(),
            &labels,
        );
    }
}
