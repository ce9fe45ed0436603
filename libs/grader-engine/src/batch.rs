/// Batch Grader - Full Fixture Suite via pytest
///
/// **Flow:**
/// 1. Swap the submission in as `solution.py` (original kept as a backup)
/// 2. Run pytest with a report plugin under the batch deadline
/// 3. Decode one structured record per test case from the plugin
/// 4. Cross-check the record count against what pytest collected
/// 5. Fall back to scraping the verbose summary only when the plugin never loaded
/// 6. Restore the original `solution.py` on every exit path
///
/// Every plugin frame carries a per-run nonce handed over in
/// `GRADER_REPORT_NONCE`. The plugin takes it out of the environment when it
/// is imported, before pytest collects the fixture and with it the
/// submission, so frames printed by the submission (and echoed by pytest
/// under "Captured stdout") do not match.
use grader_common::types::{BatchResult, CaseReport};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::decoder::marker;
use crate::error::display_seconds;
use crate::fixture::{is_expected_name, FIXTURE_FILE};
use crate::problems::{BACKUP_FILE, TEMPLATE_FILE};
use crate::sandbox::{ProgramFile, RunOutput, RunRequest, Sandbox};
use crate::scrape::scrape_summary;

pub const PLUGIN_MODULE: &str = "_grader_report";
pub const PLUGIN_FILE: &str = "_grader_report.py";
pub const REPORT_NONCE_ENV: &str = "GRADER_REPORT_NONCE";
pub const CASE_RESULT_READY: &str = "CASE_RESULT_READY";
pub const CASE_RESULT_COUNT: &str = "CASE_RESULT_COUNT";
pub const CASE_RESULT_START: &str = "CASE_RESULT_START";
pub const CASE_RESULT_END: &str = "CASE_RESULT_END";

/// Tail of the console output kept when nothing else explains a failure
const DETAIL_LIMIT: usize = 4000;

const REPORT_PLUGIN: &str = r#"import json
import os

import pytest


def _install(tag):
    suffix = " " + tag if tag else ""
    frames = {
        "ready": "__READY__" + suffix,
        "count": "__COUNT__" + suffix,
        "start": "__START__" + suffix,
        "end": "__END__" + suffix,
    }
    records = {}
    collected = []

    def safe_repr(value):
        try:
            text = repr(value)
        except Exception:
            text = "<unrepresentable>"
        return text if len(text) <= 1000 else text[:1000] + "..."

    def crash(report):
        found = getattr(report.longrepr, "reprcrash", None)
        if found is not None:
            return found.message
        return str(report.longrepr)[-2000:]

    def pytest_sessionstart(session):
        reporter = session.config.pluginmanager.get_plugin("terminalreporter")
        if reporter is not None:
            reporter.write_line(frames["ready"])

    def pytest_collection_finish(session):
        collected.append(len(session.items))

    @pytest.hookimpl(hookwrapper=True)
    def pytest_runtest_makereport(item, call):
        outcome = yield
        report = outcome.get_result()
        callspec = getattr(item, "callspec", None)
        record = records.setdefault(
            item.nodeid,
            {
                "nodeid": item.nodeid,
                "testName": getattr(item, "originalname", None) or item.name,
                "caseId": callspec.id if callspec else None,
                "params": [[k, safe_repr(v)] for k, v in callspec.params.items()] if callspec else [],
                "outcome": "passed",
                "message": None,
            },
        )
        if report.when == "call":
            if report.failed:
                record["outcome"] = "failed"
                record["message"] = crash(report)
            elif report.skipped:
                record["outcome"] = "skipped"
        elif report.failed:
            record["outcome"] = "errored"
            record["message"] = crash(report)
        elif report.skipped and report.when == "setup":
            record["outcome"] = "skipped"

    def pytest_terminal_summary(terminalreporter):
        terminalreporter.write_line(frames["count"] + " " + str(sum(collected)))
        for record in records.values():
            terminalreporter.write_line(frames["start"])
            terminalreporter.write_line(json.dumps(record))
            terminalreporter.write_line(frames["end"])

    return pytest_sessionstart, pytest_collection_finish, pytest_runtest_makereport, pytest_terminal_summary


(
    pytest_sessionstart,
    pytest_collection_finish,
    pytest_runtest_makereport,
    pytest_terminal_summary,
) = _install(os.environ.pop("__NONCE_ENV__", ""))
del _install
"#;

fn report_plugin() -> String {
    REPORT_PLUGIN
        .replace("__NONCE_ENV__", REPORT_NONCE_ENV)
        .replace("__READY__", CASE_RESULT_READY)
        .replace("__COUNT__", CASE_RESULT_COUNT)
        .replace("__START__", CASE_RESULT_START)
        .replace("__END__", CASE_RESULT_END)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum CaseOutcome {
    Passed,
    Failed,
    Errored,
    Skipped,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaseRecord {
    #[serde(default)]
    nodeid: Option<String>,
    test_name: Option<String>,
    case_id: Option<String>,
    #[serde(default)]
    params: Vec<(String, String)>,
    outcome: CaseOutcome,
    message: Option<String>,
}

impl CaseRecord {
    /// None for skipped cases, which count neither way
    fn into_report(self) -> Option<CaseReport> {
        let passed = match self.outcome {
            CaseOutcome::Passed => true,
            CaseOutcome::Failed | CaseOutcome::Errored => false,
            CaseOutcome::Skipped => return None,
        };

        let inputs: Vec<&str> = self
            .params
            .iter()
            .filter(|(name, _)| !is_expected_name(name))
            .map(|(_, value)| value.as_str())
            .collect();
        let input = (!self.params.is_empty()).then(|| format!("({})", inputs.join(", ")));
        let expected_output = self
            .params
            .iter()
            .rev()
            .find(|(name, _)| is_expected_name(name))
            .map(|(_, value)| value.clone());

        Some(CaseReport {
            test_name: self.test_name,
            case_id: self.case_id,
            input,
            expected_output,
            actual_output: None,
            passed,
            error_message: if self.outcome == CaseOutcome::Errored {
                self.message.map(|m| format!("Error: {}", m))
            } else {
                self.message
            },
        })
    }
}

/// What the report plugin said about one pytest run
#[derive(Debug, Default)]
pub struct CaseRecords {
    /// The plugin loaded and announced itself with this run's nonce
    pub announced: bool,
    /// Items pytest collected, from the plugin's count frame
    pub collected: Option<usize>,
    /// Distinct records decoded, skipped cases included
    pub reported: usize,
    pub cases: Vec<CaseReport>,
}

impl CaseRecords {
    /// Every collected item has exactly one record
    pub fn is_complete(&self) -> bool {
        self.announced && self.collected == Some(self.reported)
    }
}

/// Decode the plugin frames carrying `nonce` from `stdout`.
///
/// Frames with another nonce are ignored, malformed records are skipped and
/// a node id seen twice keeps its first record.
pub fn decode_case_records(stdout: &str, nonce: &str) -> CaseRecords {
    let ready = marker(CASE_RESULT_READY, nonce);
    let count = marker(CASE_RESULT_COUNT, nonce);
    let (start, end) = (marker(CASE_RESULT_START, nonce), marker(CASE_RESULT_END, nonce));

    let mut records = CaseRecords::default();
    let mut seen = HashSet::new();
    let mut lines = stdout.lines();

    while let Some(line) = lines.next() {
        let line = line.trim();
        if line == ready {
            records.announced = true;
            continue;
        }
        if let Some(total) = line.strip_prefix(count.as_str()) {
            if let Ok(total) = total.trim().parse() {
                records.collected = Some(total);
            }
            continue;
        }
        if line != start {
            continue;
        }

        let body: Vec<&str> = lines.by_ref().take_while(|line| line.trim() != end).collect();
        let record = match serde_json::from_str::<CaseRecord>(&body.join("\n")) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Skipping malformed case record");
                continue;
            }
        };
        if let Some(nodeid) = &record.nodeid {
            if !seen.insert(nodeid.clone()) {
                warn!(nodeid = %nodeid, "Skipping duplicate case record");
                continue;
            }
        }
        records.reported += 1;
        records.cases.extend(record.into_report());
    }
    records
}

/// Replaces `solution.py` with the submission for the lifetime of the guard
struct SolutionSwap {
    solution: PathBuf,
    backup: Option<PathBuf>,
}

impl SolutionSwap {
    fn install(dir: &Path, source: &str) -> io::Result<Self> {
        let solution = dir.join(TEMPLATE_FILE);
        let backup_path = dir.join(BACKUP_FILE);

        // a leftover backup is the real original from an interrupted run
        if backup_path.exists() {
            warn!(path = %backup_path.display(), "Restoring leftover solution backup");
            fs::rename(&backup_path, &solution)?;
        }

        let backup = if solution.exists() {
            fs::copy(&solution, &backup_path)?;
            Some(backup_path)
        } else {
            None
        };

        let swap = Self { solution, backup };
        fs::write(&swap.solution, source)?;
        Ok(swap)
    }
}

impl Drop for SolutionSwap {
    fn drop(&mut self) {
        let restored = match &self.backup {
            Some(backup) => fs::rename(backup, &self.solution),
            None => fs::remove_file(&self.solution),
        };
        if let Err(e) = restored {
            warn!(path = %self.solution.display(), error = %e, "Failed to restore solution file");
        }
    }
}

/// Runs a problem's full suite against a submission
pub struct BatchGrader {
    sandbox: Arc<dyn Sandbox>,
    interpreter: PathBuf,
    deadline: Duration,
}

impl BatchGrader {
    pub fn new(sandbox: Arc<dyn Sandbox>, interpreter: PathBuf, deadline: Duration) -> Self {
        Self {
            sandbox,
            interpreter,
            deadline,
        }
    }

    /// Grade `source` against every case in `problem_dir`. The caller must
    /// hold the problem's lock.
    pub async fn grade_all(&self, problem_dir: &Path, source: &str, param_names: &[String]) -> BatchResult {
        let start = Instant::now();
        let elapsed_ms = || start.elapsed().as_millis() as u64;

        let swap = match SolutionSwap::install(problem_dir, source) {
            Ok(swap) => swap,
            Err(e) => return BatchResult::error(format!("Execution error: {}", e), elapsed_ms()),
        };

        let nonce = Uuid::new_v4().simple().to_string();
        let request = RunRequest {
            work_dir: problem_dir.to_path_buf(),
            files: vec![ProgramFile::new(PLUGIN_FILE, report_plugin())],
            program: self.interpreter.clone(),
            args: [
                "-m",
                "pytest",
                FIXTURE_FILE,
                "-v",
                "--tb=short",
                "-p",
                "no:cacheprovider",
                "-p",
                PLUGIN_MODULE,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            env: vec![(REPORT_NONCE_ENV.to_string(), nonce.clone())],
            deadline: self.deadline,
        };

        let run = self.sandbox.run(request).await;
        drop(swap);

        let output = match run {
            Ok(output) => output,
            Err(e) => return BatchResult::error(e.to_string(), elapsed_ms()),
        };

        if output.timed_out {
            let threshold_ms = self.deadline.as_millis() as u64;
            warn!(deadline_ms = threshold_ms, "Test suite timed out");
            return BatchResult::timeout(
                format!("Test execution exceeded {} seconds", display_seconds(&threshold_ms)),
                elapsed_ms(),
            );
        }

        let records = decode_case_records(&output.stdout, &nonce);
        let cases = if records.is_complete() {
            records.cases
        } else if records.announced {
            warn!(
                collected = ?records.collected,
                reported = records.reported,
                exit_code = ?output.exit_code,
                "Case report does not cover the collected tests"
            );
            let message = match records.collected {
                Some(collected) => format!(
                    "Incomplete test report: {} of {} cases reported",
                    records.reported, collected
                ),
                None => "Test run ended before the case report was written".to_string(),
            };
            return BatchResult::error(message, elapsed_ms());
        } else {
            debug!("Report plugin never announced itself, scraping verbose summary");
            scrape_summary(&output.stdout, param_names)
        };

        if cases.is_empty() {
            return BatchResult::error(failure_detail(&output), elapsed_ms());
        }

        let result = BatchResult::from_cases(cases, elapsed_ms());
        info!(
            status = %result.status,
            passed = result.passed_count,
            failed = result.failed_count,
            "Test suite finished"
        );
        result
    }
}

fn failure_detail(output: &RunOutput) -> String {
    let stderr = output.stderr.trim();
    let text = if stderr.is_empty() { output.stdout.trim() } else { stderr };
    if text.is_empty() {
        return "No test results produced".to_string();
    }

    let mut cut = text.len().saturating_sub(DETAIL_LIMIT);
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    text[cut..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GradeError;
    use async_trait::async_trait;
    use grader_common::types::BatchStatus;

    const NONCE: &str = "@NONCE@";

    fn record(outcome: &str, id: &str, nums: &str, expected: &str) -> String {
        format!(
            "{}\n{{\"nodeid\": \"test_solution.py::test_two_sum[{}]\", \"testName\": \"test_two_sum\", \"caseId\": \"{}\", \"params\": [[\"nums\", \"{}\"], [\"target\", \"6\"], [\"expected\", \"{}\"]], \"outcome\": \"{}\", \"message\": null}}\n{}\n",
            marker(CASE_RESULT_START, NONCE),
            id,
            id,
            nums,
            expected,
            outcome,
            marker(CASE_RESULT_END, NONCE)
        )
    }

    fn ready() -> String {
        format!("{}\n", marker(CASE_RESULT_READY, NONCE))
    }

    fn count(total: usize) -> String {
        format!("{} {}\n", marker(CASE_RESULT_COUNT, NONCE), total)
    }

    fn three_case_stdout() -> String {
        format!(
            "{}collected 3 items\n{}{}{}{}=== 1 failed, 2 passed ===\n",
            ready(),
            count(3),
            record("passed", "nums0-6-expected0", "[3, 3]", "[0, 1]"),
            record("failed", "nums1-6-expected1", "[3, 2, 4]", "[1, 2]"),
            record("passed", "nums2-6-expected2", "[1, 5]", "[0, 1]"),
        )
    }

    #[test]
    fn test_three_cases_two_pass_one_fail() {
        let records = decode_case_records(&three_case_stdout(), NONCE);
        assert!(records.is_complete());

        let result = BatchResult::from_cases(records.cases, 10);
        assert_eq!(result.status, BatchStatus::SomeFailed);
        assert_eq!(result.total_count, 3);
        assert_eq!(result.passed_count, 2);
        assert_eq!(result.failed_count, 1);
    }

    #[test]
    fn test_record_fields() {
        let cases = decode_case_records(&three_case_stdout(), NONCE).cases;
        let failed = &cases[1];

        assert_eq!(failed.test_name.as_deref(), Some("test_two_sum"));
        assert_eq!(failed.case_id.as_deref(), Some("nums1-6-expected1"));
        assert_eq!(failed.input.as_deref(), Some("([3, 2, 4], 6)"));
        assert_eq!(failed.expected_output.as_deref(), Some("[1, 2]"));
        assert!(!failed.passed);
    }

    #[test]
    fn test_skipped_and_malformed_records_are_dropped() {
        let stdout = format!(
            "{}{}\nnot json\n{}\n",
            record("skipped", "a", "[]", "[]"),
            marker(CASE_RESULT_START, NONCE),
            marker(CASE_RESULT_END, NONCE)
        );
        let records = decode_case_records(&stdout, NONCE);

        assert!(records.cases.is_empty());
        assert_eq!(records.reported, 1);
    }

    #[test]
    fn test_errored_record_is_a_failure() {
        let stdout = format!(
            "{}\n{{\"testName\": \"test_x\", \"outcome\": \"errored\", \"message\": \"fixture 'db' not found\"}}\n{}\n",
            marker(CASE_RESULT_START, NONCE),
            marker(CASE_RESULT_END, NONCE)
        );
        let cases = decode_case_records(&stdout, NONCE).cases;

        assert_eq!(cases.len(), 1);
        assert!(!cases[0].passed);
        assert_eq!(cases[0].input, None);
        assert_eq!(cases[0].error_message.as_deref(), Some("Error: fixture 'db' not found"));
    }

    #[test]
    fn test_frames_without_the_run_nonce_are_ignored() {
        let forged = three_case_stdout().replace(NONCE, "0000");
        let records = decode_case_records(&forged, NONCE);

        assert!(!records.announced);
        assert_eq!(records.collected, None);
        assert_eq!(records.reported, 0);
        assert!(records.cases.is_empty());
    }

    #[test]
    fn test_duplicate_node_keeps_first_record() {
        let stdout = format!(
            "{}{}{}{}",
            ready(),
            count(1),
            record("failed", "nums0-6-expected0", "[3, 3]", "[0, 1]"),
            record("passed", "nums0-6-expected0", "[3, 3]", "[0, 1]"),
        );
        let records = decode_case_records(&stdout, NONCE);

        assert!(records.is_complete());
        assert_eq!(records.cases.len(), 1);
        assert!(!records.cases[0].passed);
    }

    #[test]
    fn test_plugin_frames_records() {
        let plugin = report_plugin();
        assert!(plugin.contains("os.environ.pop(\"GRADER_REPORT_NONCE\", \"\")"));
        assert!(plugin.contains("\"ready\": \"CASE_RESULT_READY\" + suffix"));
        assert!(plugin.contains("\"count\": \"CASE_RESULT_COUNT\" + suffix"));
        assert!(plugin.contains("\"start\": \"CASE_RESULT_START\" + suffix"));
        assert!(plugin.contains("\"end\": \"CASE_RESULT_END\" + suffix"));
        assert!(plugin.contains("del _install"));
    }

    fn temp_problem(solution: Option<&str>) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("grader-batch-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        if let Some(text) = solution {
            fs::write(dir.join(TEMPLATE_FILE), text).unwrap();
        }
        dir
    }

    #[test]
    fn test_solution_swap_restores_original() {
        let dir = temp_problem(Some("reference"));
        {
            let _swap = SolutionSwap::install(&dir, "submission").unwrap();
            assert_eq!(fs::read_to_string(dir.join(TEMPLATE_FILE)).unwrap(), "submission");
            assert_eq!(fs::read_to_string(dir.join(BACKUP_FILE)).unwrap(), "reference");
        }
        assert_eq!(fs::read_to_string(dir.join(TEMPLATE_FILE)).unwrap(), "reference");
        assert!(!dir.join(BACKUP_FILE).exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_solution_swap_without_original_removes_submission() {
        let dir = temp_problem(None);
        {
            let _swap = SolutionSwap::install(&dir, "submission").unwrap();
            assert!(dir.join(TEMPLATE_FILE).exists());
        }
        assert!(!dir.join(TEMPLATE_FILE).exists());
        assert!(!dir.join(BACKUP_FILE).exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_leftover_backup_is_treated_as_original() {
        let dir = temp_problem(Some("stale submission"));
        fs::write(dir.join(BACKUP_FILE), "reference").unwrap();
        {
            let _swap = SolutionSwap::install(&dir, "submission").unwrap();
        }
        assert_eq!(fs::read_to_string(dir.join(TEMPLATE_FILE)).unwrap(), "reference");
        fs::remove_dir_all(&dir).unwrap();
    }

    struct CannedSandbox {
        output: RunOutput,
    }

    #[async_trait]
    impl Sandbox for CannedSandbox {
        async fn run(&self, request: RunRequest) -> Result<RunOutput, GradeError> {
            // the submission is in place while the suite runs
            let current = fs::read_to_string(request.work_dir.join(TEMPLATE_FILE))?;
            assert_eq!(current, "submission");
            let nonce = request
                .env
                .iter()
                .find(|(key, _)| key == REPORT_NONCE_ENV)
                .map(|(_, value)| value.clone())
                .unwrap_or_default();
            assert!(!nonce.is_empty());
            let mut output = self.output.clone();
            output.stdout = output.stdout.replace(NONCE, &nonce);
            Ok(output)
        }
    }

    fn grader(output: RunOutput) -> BatchGrader {
        grader_with_deadline(output, Duration::from_secs(20))
    }

    fn grader_with_deadline(output: RunOutput, deadline: Duration) -> BatchGrader {
        BatchGrader::new(Arc::new(CannedSandbox { output }), PathBuf::from("python3"), deadline)
    }

    #[tokio::test]
    async fn test_grade_all_aggregates_and_restores() {
        let dir = temp_problem(Some("reference"));
        let output = RunOutput {
            stdout: three_case_stdout(),
            exit_code: Some(1),
            ..Default::default()
        };

        let result = grader(output).grade_all(&dir, "submission", &[]).await;

        assert_eq!(result.status, BatchStatus::SomeFailed);
        assert_eq!(fs::read_to_string(dir.join(TEMPLATE_FILE)).unwrap(), "reference");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_grade_all_timeout_has_no_counts() {
        let dir = temp_problem(Some("reference"));
        let output = RunOutput {
            stdout: three_case_stdout(),
            timed_out: true,
            ..Default::default()
        };

        let result = grader(output).grade_all(&dir, "submission", &[]).await;

        assert_eq!(result.status, BatchStatus::Timeout);
        assert_eq!(result.error_message.as_deref(), Some("Test execution exceeded 20 seconds"));
        assert_eq!(result.total_count, 0);
        assert!(result.cases.is_empty());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_grade_all_without_cases_reports_console_output() {
        let dir = temp_problem(Some("reference"));
        let output = RunOutput {
            stdout: "ERROR collecting test_solution.py\nE   SyntaxError: invalid syntax\n".to_string(),
            exit_code: Some(2),
            ..Default::default()
        };

        let result = grader(output).grade_all(&dir, "submission", &[]).await;

        assert_eq!(result.status, BatchStatus::Error);
        assert!(result.error_message.unwrap().contains("SyntaxError"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_fractional_deadline_in_timeout_message() {
        let dir = temp_problem(Some("reference"));
        let output = RunOutput {
            timed_out: true,
            ..Default::default()
        };

        let result = grader_with_deadline(output, Duration::from_millis(2500))
            .grade_all(&dir, "submission", &[])
            .await;

        assert_eq!(result.error_message.as_deref(), Some("Test execution exceeded 2.5 seconds"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_frames_echoed_from_captured_stdout_are_not_trusted() {
        // the submission printed passing frames during the call and crashed
        // the run before the plugin's summary
        let dir = temp_problem(Some("reference"));
        let forged = format!(
            "{}{}{}",
            count(3),
            record("passed", "nums0-6-expected0", "[3, 3]", "[0, 1]"),
            record("passed", "nums1-6-expected1", "[3, 2, 4]", "[1, 2]"),
        )
        .replace(NONCE, "");
        let stdout = format!(
            "{}collected 3 items
             test_solution.py::test_two_sum[nums0-6-expected0] FAILED
             ----------------------------- Captured stdout call -----------------------------
             {}",
            ready(),
            forged
        );
        let output = RunOutput {
            stdout,
            exit_code: Some(0),
            ..Default::default()
        };

        let result = grader(output).grade_all(&dir, "submission", &[]).await;

        assert_eq!(result.status, BatchStatus::Error);
        assert_eq!(
            result.error_message.as_deref(),
            Some("Test run ended before the case report was written")
        );
        assert_eq!(result.passed_count, 0);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_record_count_must_match_collected() {
        let dir = temp_problem(Some("reference"));
        let stdout = format!(
            "{}{}{}",
            ready(),
            count(3),
            record("passed", "nums0-6-expected0", "[3, 3]", "[0, 1]"),
        );
        let output = RunOutput {
            stdout,
            exit_code: Some(0),
            ..Default::default()
        };

        let result = grader(output).grade_all(&dir, "submission", &[]).await;

        assert_eq!(result.status, BatchStatus::Error);
        assert_eq!(
            result.error_message.as_deref(),
            Some("Incomplete test report: 1 of 3 cases reported")
        );
        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_unannounced_run_falls_back_to_summary() {
        let dir = temp_problem(Some("reference"));
        let output = RunOutput {
            stdout: "test_solution.py::TestTwoSum::test_two_sum[a] PASSED
".to_string(),
            exit_code: Some(0),
            ..Default::default()
        };

        let result = grader(output).grade_all(&dir, "submission", &[]).await;

        assert_eq!(result.status, BatchStatus::AllPassed);
        assert_eq!(result.total_count, 1);
        fs::remove_dir_all(&dir).unwrap();
    }
}
