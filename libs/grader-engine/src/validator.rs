//! Static policy check on submitted source.
//!
//! The denylist scan is a speed bump, not a security boundary: attribute
//! access, `getattr` chains and serialization gadgets all get around it.
//! Anything the scan misses still runs inside the sandbox limits.

use async_trait::async_trait;
use grader_common::config::GraderConfig;
use grader_common::types::ValidationVerdict;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::literal::Literal;
use crate::sandbox::{ProgramFile, RunRequest, Sandbox};

const CHECKER_FILE: &str = "checker.py";
const SUBMISSION_FILE: &str = "submission.py";

#[async_trait]
pub trait SourceValidator: Send + Sync {
    /// Never fails: anything short of a clean verdict is a rejection
    async fn validate(&self, source: &str) -> ValidationVerdict;
}

const CHECKER: &str = r#"import ast
import json
import sys

DENIED_MODULES = set(json.loads(__MODULES__))
DENIED_CALLS = set(json.loads(__CALLS__))


def verdict(allowed, reason=None, symbol=None):
    violation = None if allowed else {"reason": reason, "symbol": symbol}
    print(json.dumps({"allowed": allowed, "violation": violation}))
    sys.exit(0)


def main():
    with open(__SOURCE__, encoding="utf-8") as handle:
        source = handle.read()
    try:
        tree = ast.parse(source)
    except SyntaxError as exc:
        verdict(False, "Syntax error: %s (line %s)" % (exc.msg, exc.lineno))
    except ValueError as exc:
        verdict(False, "Invalid source: %s" % exc)

    for node in ast.walk(tree):
        if isinstance(node, ast.Import):
            for alias in node.names:
                module = alias.name.split(".")[0]
                if module in DENIED_MODULES:
                    verdict(False, 'Security violation: Import of "%s" is not allowed' % module, module)
        elif isinstance(node, ast.ImportFrom):
            module = (node.module or "").split(".")[0]
            if module in DENIED_MODULES:
                verdict(False, 'Security violation: Import from "%s" is not allowed' % module, module)
        elif isinstance(node, ast.Call) and isinstance(node.func, ast.Name):
            if node.func.id in DENIED_CALLS:
                verdict(False, 'Security violation: Use of "%s" is not allowed' % node.func.id, node.func.id)

    verdict(True)


main()
"#;

/// Validates by running an `ast` walk in the target interpreter
pub struct PythonAstValidator {
    sandbox: Arc<dyn Sandbox>,
    interpreter: PathBuf,
    scratch_root: PathBuf,
    deadline: Duration,
    max_source_bytes: usize,
    checker: String,
}

impl PythonAstValidator {
    pub fn new(sandbox: Arc<dyn Sandbox>, interpreter: PathBuf, config: &GraderConfig) -> Self {
        Self {
            sandbox,
            interpreter,
            scratch_root: std::env::temp_dir(),
            deadline: config.run_timeout(),
            max_source_bytes: config.max_source_bytes,
            checker: checker_script(&config.denied_modules, &config.denied_calls),
        }
    }

    pub fn with_scratch_root(mut self, root: impl AsRef<Path>) -> Self {
        self.scratch_root = root.as_ref().to_path_buf();
        self
    }
}

/// Render the checker with the policy embedded as string literals
fn checker_script(denied_modules: &[String], denied_calls: &[String]) -> String {
    let embed = |names: &[String]| {
        let json = serde_json::to_string(names).unwrap_or_else(|_| "[]".to_string());
        Literal::Str(json).to_python()
    };
    CHECKER
        .replace("__MODULES__", &embed(denied_modules))
        .replace("__CALLS__", &embed(denied_calls))
        .replace("__SOURCE__", &Literal::Str(SUBMISSION_FILE.to_string()).to_python())
}

/// Scratch directory removed on drop
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    async fn create(root: &Path) -> std::io::Result<Self> {
        let path = root.join(format!("grader-validate-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path })
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove scratch directory");
        }
    }
}

#[derive(Deserialize)]
struct CheckerVerdict {
    allowed: bool,
    violation: Option<CheckerViolation>,
}

#[derive(Deserialize)]
struct CheckerViolation {
    reason: Option<String>,
    symbol: Option<String>,
}

#[async_trait]
impl SourceValidator for PythonAstValidator {
    #[tracing::instrument(skip(self, source), fields(source_bytes = source.len()))]
    async fn validate(&self, source: &str) -> ValidationVerdict {
        if source.len() > self.max_source_bytes {
            return ValidationVerdict::rejected(
                format!(
                    "Source code exceeds maximum size of {} bytes",
                    self.max_source_bytes
                ),
                None,
            );
        }

        let scratch = match ScratchDir::create(&self.scratch_root).await {
            Ok(scratch) => scratch,
            Err(e) => {
                warn!(error = %e, "Could not create validation scratch directory");
                return ValidationVerdict::rejected(format!("Validation error: {}", e), None);
            }
        };

        let request = RunRequest {
            work_dir: scratch.path.clone(),
            files: vec![
                ProgramFile::new(SUBMISSION_FILE, source),
                ProgramFile::new(CHECKER_FILE, self.checker.as_str()),
            ],
            program: self.interpreter.clone(),
            args: vec![CHECKER_FILE.to_string()],
            env: Vec::new(),
            deadline: self.deadline,
        };

        let output = match self.sandbox.run(request).await {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "Validator could not run");
                return ValidationVerdict::rejected(format!("Validation error: {}", e), None);
            }
        };
        drop(scratch);

        if output.timed_out {
            return ValidationVerdict::rejected("Validation error: checker timed out", None);
        }

        let verdict = output
            .stdout
            .lines()
            .rev()
            .find_map(|line| serde_json::from_str::<CheckerVerdict>(line.trim()).ok());

        match verdict {
            Some(CheckerVerdict { allowed: true, .. }) if output.exit_code == Some(0) => {
                ValidationVerdict::allowed()
            }
            Some(CheckerVerdict {
                allowed: false,
                violation,
            }) => {
                let (reason, symbol) = violation
                    .map(|v| (v.reason, v.symbol))
                    .unwrap_or((None, None));
                let reason = reason.unwrap_or_else(|| "Security violation".to_string());
                debug!(reason = %reason, "Submission rejected");
                ValidationVerdict::rejected(reason, symbol)
            }
            _ => {
                let detail = output.stderr.trim();
                warn!(exit_code = ?output.exit_code, stderr = %detail, "Checker produced no verdict");
                ValidationVerdict::rejected(
                    if detail.is_empty() {
                        "Validation error: no verdict".to_string()
                    } else {
                        format!("Validation error: {}", detail)
                    },
                    None,
                )
            }
        }
    }
}
