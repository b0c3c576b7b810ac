//! Error types for conformance runs.
//!
//! Only orchestration failures live here. Anything the plugin does wrong
//! is recorded as a failing outcome inside the result instead.

use thiserror::Error;

/// Failure to construct the in-process harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// No Tokio runtime is driving the caller.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// The runtime cannot execute plugin calls in parallel.
    #[error("harness requires a multi-thread tokio runtime, found {0}")]
    SingleThreadedRuntime(String),
}

/// Result type for harness construction.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Fatal errors that prevent a conformance run from producing a result.
#[derive(Debug, Error)]
pub enum SuiteError {
    /// Suite configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The harness could not be built.
    #[error("harness setup failed: {0}")]
    Harness(#[from] HarnessError),

    /// Report encoding or decoding failed.
    #[error("report serialization failed: {0}")]
    Report(#[from] serde_json::Error),

    /// The orchestrator reached an impossible state.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience result type for suite operations.
pub type SuiteResult<T> = Result<T, SuiteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_configuration_display() {
        let err = SuiteError::InvalidConfiguration("sample_iterations must be > 0".into());
        assert!(err.to_string().contains("sample_iterations"));
    }

    #[test]
    fn test_harness_error_converts() {
        let err: SuiteError = HarnessError::SingleThreadedRuntime("CurrentThread".into()).into();
        assert!(matches!(err, SuiteError::Harness(_)));
        assert!(err.to_string().contains("multi-thread"));
    }

    #[test]
    fn test_serialization_error_converts() {
        let parse = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: SuiteError = parse.into();
        assert!(err.to_string().starts_with("report serialization failed"));
    }
}
