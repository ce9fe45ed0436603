use serde::{Deserialize, Serialize};
use std::fmt;

/// A user submission bound to one problem
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub problem_slug: String,
    pub source: String,
}

impl Submission {
    pub fn new(problem_slug: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            problem_slug: problem_slug.into(),
            source: source.into(),
        }
    }
}

/// First policy violation found in a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub reason: String,
    /// Offending module or identifier, when the violation names one
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub allowed: bool,
    pub violation: Option<Violation>,
}

impl ValidationVerdict {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            violation: None,
        }
    }

    pub fn rejected(reason: impl Into<String>, symbol: Option<String>) -> Self {
        Self {
            allowed: false,
            violation: Some(Violation {
                reason: reason.into(),
                symbol,
            }),
        }
    }

    /// Human readable rejection reason, if any
    pub fn reason(&self) -> Option<&str> {
        self.violation.as_ref().map(|v| v.reason.as_str())
    }
}

/// Status tag of a single-case execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Error,
    Timeout,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a single-case run.
///
/// Success and failure carry outputs only; error and timeout carry
/// diagnostics only. The split is structural so no result can mix them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    #[serde(rename_all = "camelCase")]
    Success {
        actual_output: Option<String>,
        expected_output: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        actual_output: Option<String>,
        expected_output: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        error_type: Option<String>,
        error_message: String,
        traceback: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Timeout { error_message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn success(actual: Option<String>, expected: Option<String>, duration_ms: u64) -> Self {
        Self {
            outcome: Outcome::Success {
                actual_output: actual,
                expected_output: expected,
            },
            duration_ms,
        }
    }

    pub fn failed(actual: Option<String>, expected: Option<String>, duration_ms: u64) -> Self {
        Self {
            outcome: Outcome::Failed {
                actual_output: actual,
                expected_output: expected,
            },
            duration_ms,
        }
    }

    pub fn error(
        error_type: Option<String>,
        message: impl Into<String>,
        traceback: Option<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            outcome: Outcome::Error {
                error_type,
                error_message: message.into(),
                traceback,
            },
            duration_ms,
        }
    }

    pub fn timeout(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            outcome: Outcome::Timeout {
                error_message: message.into(),
            },
            duration_ms,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        match self.outcome {
            Outcome::Success { .. } => ExecutionStatus::Success,
            Outcome::Failed { .. } => ExecutionStatus::Failed,
            Outcome::Error { .. } => ExecutionStatus::Error,
            Outcome::Timeout { .. } => ExecutionStatus::Timeout,
        }
    }

    pub fn actual_output(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { actual_output, .. } | Outcome::Failed { actual_output, .. } => {
                actual_output.as_deref()
            }
            _ => None,
        }
    }

    pub fn expected_output(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { expected_output, .. } | Outcome::Failed { expected_output, .. } => {
                expected_output.as_deref()
            }
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Error { error_message, .. } | Outcome::Timeout { error_message } => {
                Some(error_message)
            }
            _ => None,
        }
    }

    pub fn error_type(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Error { error_type, .. } => error_type.as_deref(),
            _ => None,
        }
    }

    pub fn traceback(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Error { traceback, .. } => traceback.as_deref(),
            _ => None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Aggregate status of a full-suite run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    AllPassed,
    SomeFailed,
    AllFailed,
    Error,
    Timeout,
}

impl BatchStatus {
    /// Status is a pure function of the pass/fail counts.
    pub fn from_counts(passed: usize, failed: usize) -> Self {
        match (passed, failed) {
            (0, 0) => BatchStatus::Error,
            (_, 0) => BatchStatus::AllPassed,
            (0, _) => BatchStatus::AllFailed,
            _ => BatchStatus::SomeFailed,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchStatus::AllPassed => "all_passed",
            BatchStatus::SomeFailed => "some_failed",
            BatchStatus::AllFailed => "all_failed",
            BatchStatus::Error => "error",
            BatchStatus::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// One test case of a full-suite run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseReport {
    pub test_name: Option<String>,
    /// Parametrize id, e.g. `nums0-9-expected0`
    pub case_id: Option<String>,
    pub input: Option<String>,
    pub expected_output: Option<String>,
    pub actual_output: Option<String>,
    pub passed: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub status: BatchStatus,
    #[serde(rename = "testCases")]
    pub cases: Vec<CaseReport>,
    pub total_count: usize,
    pub passed_count: usize,
    pub failed_count: usize,
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

impl BatchResult {
    /// Build a result from per-case reports; counts and status are derived.
    pub fn from_cases(cases: Vec<CaseReport>, duration_ms: u64) -> Self {
        let passed_count = cases.iter().filter(|c| c.passed).count();
        let failed_count = cases.len() - passed_count;
        Self {
            status: BatchStatus::from_counts(passed_count, failed_count),
            total_count: cases.len(),
            passed_count,
            failed_count,
            cases,
            error_message: None,
            duration_ms,
        }
    }

    pub fn error(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            status: BatchStatus::Error,
            cases: Vec::new(),
            total_count: 0,
            passed_count: 0,
            failed_count: 0,
            error_message: Some(message.into()),
            duration_ms,
        }
    }

    pub fn timeout(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            status: BatchStatus::Timeout,
            ..Self::error(message, duration_ms)
        }
    }
}
