//! Runtime configuration for the message handler.
//!
//! Values come from the process environment with strict validation, so a
//! typo fails at startup instead of silently falling back.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::metrics::{DEFAULT_PREFIX, TelemetryNames};
use crate::policy::ErrorPolicy;

const ENV_STORE_OP_TIMEOUT_MS: &str = "SERVO_ORCH_STORE_OP_TIMEOUT_MS";
const ENV_METRIC_PREFIX: &str = "SERVO_ORCH_METRIC_PREFIX";
const ENV_ERROR_POLICY: &str = "SERVO_ORCH_ERROR_POLICY";

const DEFAULT_STORE_OP_TIMEOUT_MS: u64 = 30_000;

/// Message handler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    /// Deadline applied to each individual store call.
    pub store_op_timeout: Duration,
    /// Metric and attribute names.
    pub telemetry_names: TelemetryNames,
    /// What to return to the delivery layer after a failure.
    pub error_policy: ErrorPolicy,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            store_op_timeout: Duration::from_millis(DEFAULT_STORE_OP_TIMEOUT_MS),
            telemetry_names: TelemetryNames::default(),
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl HandlerConfig {
    /// Loads config from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value is present but invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads config with a custom environment source.
    ///
    /// This entry point is test-friendly and accepts a key lookup function.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value is present but invalid.
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let timeout_ms =
            parse_positive_u64_env(&get_env, ENV_STORE_OP_TIMEOUT_MS, DEFAULT_STORE_OP_TIMEOUT_MS)?;

        let prefix = match get_env(ENV_METRIC_PREFIX) {
            None => DEFAULT_PREFIX.to_string(),
            Some(raw) => validate_prefix(&raw)?,
        };

        let error_policy = match get_env(ENV_ERROR_POLICY) {
            None => ErrorPolicy::default(),
            Some(raw) => raw
                .parse::<ErrorPolicy>()
                .map_err(|e| Error::configuration(format!("{ENV_ERROR_POLICY}: {e}")))?,
        };

        Ok(Self {
            store_op_timeout: Duration::from_millis(timeout_ms),
            telemetry_names: TelemetryNames::with_prefix(&prefix),
            error_policy,
        })
    }
}

fn validate_prefix(raw: &str) -> Result<String> {
    let valid = !raw.is_empty()
        && raw.starts_with(|c: char| c.is_ascii_alphabetic())
        && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(raw.to_string())
    } else {
        Err(Error::configuration(format!(
            "{ENV_METRIC_PREFIX} must start with a letter and contain only [A-Za-z0-9_], got '{raw}'"
        )))
    }
}

fn parse_positive_u64_env<F>(get_env: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get_env(key) else {
        return Ok(default);
    };

    let parsed = raw.parse::<u64>().map_err(|_| {
        Error::configuration(format!("{key} must be a positive integer, got '{raw}'"))
    })?;
    if parsed == 0 {
        return Err(Error::configuration(format!(
            "{key} must be a positive integer, got '{raw}'"
        )));
    }
    Ok(parsed)
}
