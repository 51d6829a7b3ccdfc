//! Error types for the simulation engine.
//!
//! A single [`SimError`] enum covers every failure mode of the engine.
//! Errors are raised at the call site and propagate up the recursive
//! lifecycle calls with `?`; nothing is retried inside the engine, and the
//! next `init` rebuilds a failed run.

use thiserror::Error;

/// Convenience alias used by every fallible engine operation.
pub type SimResult<T> = Result<T, SimError>;

/// Categorised simulation errors.
///
/// # Variants
/// - `NotConfigured`: lifecycle entered with a required dependency or
///   parameter unset
/// - `InvalidSchedule`: fix times not strictly increasing, or a malformed
///   cashflow schedule
/// - `InvalidState`: an agent was read or driven in an order its contract
///   forbids
/// - `InvalidArgument`: a parameter outside its admissible range
/// - `Unsupported`: a combination the engine deliberately refuses
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// A required dependency or parameter was never supplied.
    #[error("{what} is not configured: {detail}")]
    NotConfigured {
        /// Component that was entered unconfigured.
        what: &'static str,
        /// What exactly is missing.
        detail: String,
    },

    /// Fix times or cashflow dates violate their ordering contract.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// An operation was invoked in a state its contract forbids.
    #[error("invalid state in {what}: {detail}")]
    InvalidState {
        /// Component reporting the violation.
        what: &'static str,
        /// Description of the violated precondition.
        detail: String,
    },

    /// A parameter is outside its admissible range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested combination is deliberately not supported.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl SimError {
    /// Shorthand for a [`SimError::NotConfigured`] with owned detail text.
    pub fn not_configured(what: &'static str, detail: impl Into<String>) -> Self {
        SimError::NotConfigured {
            what,
            detail: detail.into(),
        }
    }

    /// Shorthand for a [`SimError::InvalidState`] with owned detail text.
    pub fn invalid_state(what: &'static str, detail: impl Into<String>) -> Self {
        SimError::InvalidState {
            what,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_not_configured() {
        let err = SimError::not_configured("gearbox", "missing source agent");
        assert_eq!(
            format!("{}", err),
            "gearbox is not configured: missing source agent"
        );
    }

    #[test]
    fn display_invalid_schedule() {
        let err = SimError::InvalidSchedule("fix 10 after fix 20".to_string());
        assert_eq!(format!("{}", err), "invalid schedule: fix 10 after fix 20");
    }

    #[test]
    fn error_trait_object() {
        let err = SimError::InvalidArgument("order 3 histogram".to_string());
        let _: &dyn std::error::Error = &err;
    }

    #[test]
    fn clone_and_equality() {
        let err = SimError::Unsupported("additive shift discount".to_string());
        assert_eq!(err.clone(), err);
    }
}
