//! What the message handler returns to the delivery layer after a failure.
//!
//! Failures are always counted and logged before the policy is consulted;
//! the policy only decides whether the delivery layer sees the error.

use std::str::FromStr;

use crate::error::{Error, Result};

/// Error disposition chosen when the handler is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Swallow the error; the message is considered handled and is not
    /// redelivered. Operators detect these failures through logs and metrics.
    #[default]
    Absorb,
    /// Return the error so the delivery layer can redeliver or dead-letter.
    Propagate,
}

impl ErrorPolicy {
    /// Resolves a handler failure into the value returned to the caller.
    ///
    /// # Errors
    ///
    /// Returns `err` unchanged under [`ErrorPolicy::Propagate`].
    pub fn resolve(self, err: Error) -> Result<()> {
        match self {
            Self::Absorb => Ok(()),
            Self::Propagate => Err(err),
        }
    }
}

impl FromStr for ErrorPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "absorb" => Ok(Self::Absorb),
            "propagate" => Ok(Self::Propagate),
            other => Err(Error::configuration(format!(
                "unknown error policy '{other}', expected 'absorb' or 'propagate'"
            ))),
        }
    }
}
