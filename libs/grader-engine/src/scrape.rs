//! Best-effort recovery of per-case results from pytest's verbose console
//! output. Only used when the report plugin produced no records, e.g. when
//! it failed to load. The console format is not a contract; expect gaps.

use grader_common::types::CaseReport;
use regex::Regex;
use std::sync::OnceLock;

use crate::fixture::is_expected_name;

/// Scan window after a failure header
const BLOCK_LIMIT: usize = 2000;

fn summary_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<node>\S*::[^\[\s]+)(?:\[(?P<id>.*)\])?\s+(?P<outcome>PASSED|FAILED|ERROR)(?:\s|$)")
            .expect("static regex")
    })
}

fn tuple_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([^)]{1,500})\)").expect("static regex"))
}

/// Recover case reports from `pytest -v` output.
///
/// `param_names` come from the fixture declaration and drive the
/// `<name> = <value>` recovery inside failure blocks.
pub fn scrape_summary(stdout: &str, param_names: &[String]) -> Vec<CaseReport> {
    let mut cases = Vec::new();

    for line in stdout.lines() {
        let Some(caps) = summary_regex().captures(line.trim_end()) else {
            continue;
        };
        let node = &caps["node"];
        if !node.contains("::test_") && !node.contains("::Test") {
            continue;
        }

        let passed = &caps["outcome"] == "PASSED";
        let case_id = caps.name("id").map(|m| m.as_str().to_string());
        let test_name = node.rsplit("::").next().map(str::to_string);

        let mut case = CaseReport {
            test_name,
            case_id: case_id.clone(),
            input: case_id.clone(),
            passed,
            ..Default::default()
        };

        if !passed {
            if let Some(id) = &case_id {
                if let Some(block) = failure_block(stdout, node, id) {
                    recover_values(&mut case, block, param_names);
                }
            }
        }
        cases.push(case);
    }
    cases
}

/// Text following the `Class.test[id]` section header, up to the next header
fn failure_block<'a>(stdout: &'a str, node: &str, id: &str) -> Option<&'a str> {
    // headers drop the file part and join the rest with dots
    let qualified = node.split("::").skip(1).collect::<Vec<_>>().join(".");
    let header = format!("{}[{}]", qualified, id);

    let start = stdout
        .lines()
        .filter(|line| line.starts_with('_') && line.contains(&header))
        .find_map(|line| stdout.find(line))
        .or_else(|| stdout.find(&header))?;

    let rest = &stdout[start..];
    let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
    let body = &rest[body_start..];
    let end = body
        .lines()
        .skip(1)
        .find(|line| line.starts_with("___") || line.starts_with("==="))
        .and_then(|line| body.find(line))
        .unwrap_or(body.len());

    let mut limit = end.min(BLOCK_LIMIT);
    while !body.is_char_boundary(limit) {
        limit -= 1;
    }
    Some(&body[..limit])
}

fn recover_values(case: &mut CaseReport, block: &str, param_names: &[String]) {
    let found: Vec<Option<String>> = param_names
        .iter()
        .map(|name| {
            Regex::new(&format!(r"\b{}\s*=\s*([^\n\r]+)", regex::escape(name)))
                .ok()
                .and_then(|re| re.captures(block))
                .map(|caps| caps[1].trim().to_string())
        })
        .collect();

    if found.iter().any(Option::is_some) {
        let values: Vec<&str> = found
            .iter()
            .map(|v| v.as_deref().unwrap_or("None"))
            .collect();
        case.input = Some(format!("({})", values.join(", ")));
        case.expected_output = param_names
            .iter()
            .zip(&found)
            .filter(|(name, value)| is_expected_name(name) && value.is_some())
            .last()
            .and_then(|(_, value)| value.clone());
    } else if let Some(caps) = tuple_regex().captures(block) {
        let inside = caps[1].trim();
        case.input = Some(format!("({})", inside));
        case.expected_output = inside.rsplit(',').next().map(|e| e.trim().to_string());
    }

    case.error_message = block
        .lines()
        .find(|line| line.starts_with("E "))
        .map(|line| line[2..].trim().to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use grader_common::types::{BatchResult, BatchStatus};

    const VERBOSE_RUN: &str = "\
============================= test session starts ==============================
collected 3 items

test_solution.py::TestTwoSum::test_two_sum[nums0-9-expected0] PASSED     [ 33%]
test_solution.py::TestTwoSum::test_two_sum[nums1-6-expected1] FAILED     [ 66%]
test_solution.py::TestTwoSum::test_two_sum[nums2-6-expected2] PASSED     [100%]

=================================== FAILURES ===================================
_________________ TestTwoSum.test_two_sum[nums1-6-expected1] __________________
test_solution.py:18: in test_two_sum
    assert_two_sum(result, expected)
helpers.py:9: in assert_two_sum
    assert result == expected
E   assert [2, 1] == [1, 2]
nums = [3, 2, 4]
target = 6
expected = [1, 2]
=========================== short test summary info ============================
FAILED test_solution.py::TestTwoSum::test_two_sum[nums1-6-expected1] - assert [2, 1] == [1, 2]
========================= 1 failed, 2 passed in 0.03s ==========================
";

    fn names() -> Vec<String> {
        ["nums", "target", "expected"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_three_cases_two_pass_one_fail() {
        let cases = scrape_summary(VERBOSE_RUN, &names());
        let result = BatchResult::from_cases(cases, 30);

        assert_eq!(result.status, BatchStatus::SomeFailed);
        assert_eq!(result.total_count, 3);
        assert_eq!(result.passed_count, 2);
        assert_eq!(result.failed_count, 1);
    }

    #[test]
    fn test_summary_line_fields() {
        let cases = scrape_summary(VERBOSE_RUN, &names());

        assert_eq!(cases[0].test_name.as_deref(), Some("test_two_sum"));
        assert_eq!(cases[0].case_id.as_deref(), Some("nums0-9-expected0"));
        assert_eq!(cases[0].input.as_deref(), Some("nums0-9-expected0"));
        assert!(cases[0].passed);
    }

    #[test]
    fn test_failure_block_assignments() {
        let cases = scrape_summary(VERBOSE_RUN, &names());
        let failed = &cases[1];

        assert!(!failed.passed);
        assert_eq!(failed.input.as_deref(), Some("([3, 2, 4], 6, [1, 2])"));
        assert_eq!(failed.expected_output.as_deref(), Some("[1, 2]"));
        assert_eq!(failed.error_message.as_deref(), Some("assert [2, 1] == [1, 2]"));
    }

    #[test]
    fn test_parenthesised_fallback() {
        let stdout = "\
test_solution.py::TestX::test_x[case0] FAILED
=================================== FAILURES ===================================
______________________________ TestX.test_x[case0] _____________________________
    run_x(Solution, 1, 2)
E   AssertionError
";
        let cases = scrape_summary(stdout, &[]);

        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].input.as_deref(), Some("(Solution, 1, 2)"));
        assert_eq!(cases[0].expected_output.as_deref(), Some("2"));
    }

    #[test]
    fn test_short_summary_lines_are_not_counted() {
        let stdout = "FAILED test_solution.py::TestX::test_x[case0] - assert 1 == 2\n";
        assert!(scrape_summary(stdout, &[]).is_empty());
    }

    #[test]
    fn test_error_outcome_counts_as_failure() {
        let stdout = "test_solution.py::test_fixture_broken ERROR\n";
        let cases = scrape_summary(stdout, &[]);

        assert_eq!(cases.len(), 1);
        assert!(!cases[0].passed);
        assert_eq!(cases[0].case_id, None);
    }
}
