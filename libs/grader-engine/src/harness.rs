//! Harness synthesis: binds a submission and one test case into a runnable
//! program that reports through the sentinel protocol.

use std::fmt::Write;

use crate::decoder::{RESULT_END, RESULT_START};
use crate::fixture::TestCase;
use crate::literal::Literal;

/// Module name the submission is written under
pub const SUBMISSION_MODULE: &str = "user_solution";
pub const SUBMISSION_FILE: &str = "user_solution.py";
pub const HARNESS_FILE: &str = "execute_test.py";
pub const HELPERS_FILE: &str = "helpers.py";

/// Shown as the expected output when a case declares no expectation
pub const NO_EXPECTATION: &str = "N/A";

/// Environment variable carrying the run's marker nonce into the harness.
/// The harness removes it before the submission is imported.
pub const RESULT_NONCE_ENV: &str = "GRADER_RESULT_NONCE";

/// Names of the helper functions that drive a problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoints {
    pub run: String,
    pub assert: String,
}

impl EntryPoints {
    /// First `def run_*` and first `def assert_*` in the helpers source; each
    /// falls back to the problem slug.
    pub fn discover(helpers: &str, slug: &str) -> Self {
        let mut run = None;
        let mut assert = None;

        for line in helpers.lines() {
            let Some(signature) = line.trim().strip_prefix("def ") else {
                continue;
            };
            let Some(name) = signature.split('(').next().map(str::trim) else {
                continue;
            };
            if run.is_none() && name.starts_with("run_") {
                run = Some(name.to_string());
            } else if assert.is_none() && name.starts_with("assert_") {
                assert = Some(name.to_string());
            }
            if run.is_some() && assert.is_some() {
                break;
            }
        }

        Self {
            run: run.unwrap_or_else(|| slug.to_string()),
            assert: assert.unwrap_or_else(|| slug.to_string()),
        }
    }
}

const PRELUDE: &str = r#"import json
import os
import sys
import traceback

try:
    from leetcode_py import ListNode, TreeNode

    _NODE_TYPES = (ListNode, TreeNode)
except Exception:
    _NODE_TYPES = ()


# bound before the submission is imported, which may rebind module attributes
def _emit(
    record,
    code,
    _tag=os.environ.pop("__NONCE_ENV__", ""),
    _dumps=json.dumps,
    _out=sys.stdout,
    _exit=os._exit,
):
    suffix = " " + _tag if _tag else ""
    _out.write("\n__START__" + suffix + "\n" + _dumps(record) + "\n__END__" + suffix + "\n")
    _out.flush()
    sys.stderr.flush()
    # skip atexit hooks registered by the submission
    _exit(code)


def _render(value):
    if _NODE_TYPES and isinstance(value, _NODE_TYPES):
        return str(value.to_list())
    return str(value)


def _fault(exc, error_type=None):
    return {
        "status": "error",
        "actualOutput": None,
        "expectedOutput": None,
        "errorType": error_type or type(exc).__name__,
        "errorMessage": str(exc),
        "traceback": traceback.format_exc(),
    }

"#;

/// Build the harness program for one test case
pub fn synthesize(entry_points: &EntryPoints, case: &TestCase) -> String {
    let mut program = PRELUDE
        .replace("__START__", RESULT_START)
        .replace("__END__", RESULT_END)
        .replace("__NONCE_ENV__", RESULT_NONCE_ENV);

    program.push_str("\ndef main():\n    try:\n");
    // imported inside the guard so a broken submission still reports
    let _ = writeln!(program, "        from {} import Solution", SUBMISSION_MODULE);
    program.push_str("        import helpers as _helpers\n\n");

    program.push_str("        _params = {\n");
    for (name, value) in case.params() {
        let _ = writeln!(
            program,
            "            {}: {},",
            Literal::Str(name.clone()).to_python(),
            value.to_python()
        );
    }
    program.push_str("        }\n");

    let mut call = format!("_helpers.{}(Solution", entry_points.run);
    for (name, _) in case.inputs() {
        let _ = write!(call, ", _params[{}]", Literal::Str(name.to_string()).to_python());
    }
    call.push(')');
    let _ = writeln!(program, "        result = {}", call);
    program.push_str("        actual_output = _render(result)\n");

    match case.expected() {
        Some((name, _)) => {
            let _ = writeln!(
                program,
                "        expected = _params[{}]",
                Literal::Str(name.to_string()).to_python()
            );
            program.push_str("        try:\n");
            let _ = writeln!(program, "            _helpers.{}(result, expected)", entry_points.assert);
            program.push_str("            status = \"success\"\n");
            program.push_str("        except AssertionError:\n");
            program.push_str("            status = \"failed\"\n");
            program.push_str("        expected_output = _render(expected)\n");
        }
        None => {
            program.push_str("        status = \"success\"\n");
            let _ = writeln!(program, "        expected_output = {:?}", NO_EXPECTATION);
        }
    }

    program.push_str(
        r#"    except SyntaxError as exc:
        _emit(_fault(exc, "SyntaxError"), 1)
    except BaseException as exc:
        _emit(_fault(exc), 1)

    _emit({"status": status, "actualOutput": actual_output, "expectedOutput": expected_output}, 0)


if __name__ == "__main__":
    main()
"#,
    );
    program
}
