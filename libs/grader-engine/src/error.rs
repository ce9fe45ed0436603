use grader_common::types::ExecutionResult;
use thiserror::Error;

use crate::fixture::FixtureError;

/// Everything that can go wrong while grading a submission.
///
/// `Grader::run_one` and `Grader::grade_all` classify each one into an
/// [`ExecutionResult`] or a batch result; only the `try_*` variants hand
/// them back as errors.
#[derive(Debug, Error)]
pub enum GradeError {
    #[error("Security validation failed: {0}")]
    ValidationRejected(String),

    #[error("Syntax error in submission: {0}")]
    HarnessSyntaxError(String),

    #[error("{kind}: {message}")]
    RuntimeFault {
        kind: String,
        message: String,
        trace: Option<String>,
    },

    #[error("Possible infinite loop: execution exceeded {} seconds", display_seconds(.threshold_ms))]
    Timeout { threshold_ms: u64 },

    #[error("Failed to parse result: {0}")]
    DecodeFailure(String),

    #[error("Problem not found: {0}")]
    ProblemNotFound(String),

    #[error(transparent)]
    Fixture(#[from] FixtureError),

    #[error("Source code exceeds maximum size of {limit} bytes ({size} bytes)")]
    SourceTooLarge { size: usize, limit: usize },

    #[error("Execution error: {0}")]
    Io(#[from] std::io::Error),
}

/// Milliseconds as seconds without truncation: 2000 is `2`, 2500 is `2.5`
pub fn display_seconds(ms: &u64) -> String {
    (*ms as f64 / 1000.0).to_string()
}

impl GradeError {
    /// Classify the error into a structured single-case result
    pub fn into_result(self, duration_ms: u64) -> ExecutionResult {
        match self {
            GradeError::Timeout { .. } => ExecutionResult::timeout(self.to_string(), duration_ms),
            GradeError::HarnessSyntaxError(message) => ExecutionResult::error(
                Some("SyntaxError".to_string()),
                message,
                None,
                duration_ms,
            ),
            GradeError::RuntimeFault {
                kind,
                message,
                trace,
            } => ExecutionResult::error(Some(kind), message, trace, duration_ms),
            other => ExecutionResult::error(None, other.to_string(), None, duration_ms),
        }
    }

    /// Whether the caller supplied something unusable (as opposed to an
    /// engine-side failure)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GradeError::ValidationRejected(_)
                | GradeError::ProblemNotFound(_)
                | GradeError::SourceTooLarge { .. }
                | GradeError::Fixture(FixtureError::OutOfRange { .. })
        )
    }
}
