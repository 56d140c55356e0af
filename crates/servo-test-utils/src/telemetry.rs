//! Telemetry sink that records observations for test assertions.

use std::sync::Mutex;
use std::time::Duration;

use metrics::Label;
use servo_orchestrator::metrics::TelemetrySink;

/// Record of a telemetry call.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Counter increment.
    Counter {
        /// Metric name.
        name: String,
        /// Attributes as `(key, value)` pairs.
        labels: Vec<(String, String)>,
    },
    /// Duration observation.
    Duration {
        /// Metric name.
        name: String,
        /// Observed duration.
        value: Duration,
        /// Attributes as `(key, value)` pairs.
        labels: Vec<(String, String)>,
    },
}

impl Observation {
    /// Metric name of the observation.
    pub fn name(&self) -> &str {
        match self {
            Self::Counter { name, .. } | Self::Duration { name, .. } => name,
        }
    }

    /// Returns the value of one attribute, if present.
    pub fn label(&self, key: &str) -> Option<&str> {
        let labels = match self {
            Self::Counter { labels, .. } | Self::Duration { labels, .. } => labels,
        };
        labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// In-memory telemetry sink.
///
/// Records every call for later assertion in tests.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    observations: Mutex<Vec<Observation>>,
}

impl RecordingTelemetry {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded observations.
    #[must_use]
    pub fn observations(&self) -> Vec<Observation> {
        self.observations.lock().expect("lock").clone()
    }

    /// Clears recorded observations.
    pub fn clear(&self) {
        self.observations.lock().expect("lock").clear();
    }

    /// Returns counter increments for `name`.
    #[must_use]
    pub fn counters(&self, name: &str) -> Vec<Observation> {
        self.observations()
            .into_iter()
            .filter(|o| matches!(o, Observation::Counter { .. }) && o.name() == name)
            .collect()
    }

    /// Returns duration observations for `name`.
    #[must_use]
    pub fn durations(&self, name: &str) -> Vec<Observation> {
        self.observations()
            .into_iter()
            .filter(|o| matches!(o, Observation::Duration { .. }) && o.name() == name)
            .collect()
    }

    /// Returns the `part` attribute of every per-step duration, in order.
    #[must_use]
    pub fn parts(&self, name: &str) -> Vec<String> {
        self.durations(name)
            .iter()
            .filter_map(|o| o.label("part").map(str::to_string))
            .collect()
    }

    fn record(&self, observation: Observation) {
        self.observations.lock().expect("lock").push(observation);
    }
}

fn to_pairs(labels: &[Label]) -> Vec<(String, String)> {
    labels
        .iter()
        .map(|l| (l.key().to_string(), l.value().to_string()))
        .collect()
}

impl TelemetrySink for RecordingTelemetry {
    fn increment_counter(&self, name: &str, labels: &[Label]) {
        self.record(Observation::Counter {
            name: name.to_string(),
            labels: to_pairs(labels),
        });
    }

    fn record_duration(&self, name: &str, duration: Duration, labels: &[Label]) {
        self.record(Observation::Duration {
            name: name.to_string(),
            value: duration,
            labels: to_pairs(labels),
        });
    }
}
