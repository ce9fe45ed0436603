//! Result decoder for the harness sentinel protocol.
//!
//! The harness prints one flat record between a `RESULT_START <nonce>` line
//! and a `RESULT_END <nonce>` line, where the nonce is generated per run and
//! never shown to the submission. Everything outside that pair is noise.
//! Decoding never fails: malformed output degrades to an `error` result.

use grader_common::types::{ExecutionResult, Outcome};
use std::collections::HashMap;
use tracing::debug;

use crate::error::GradeError;

pub const RESULT_START: &str = "RESULT_START";
pub const RESULT_END: &str = "RESULT_END";

pub const UNKNOWN_ERROR: &str = "Unknown execution error";

/// Marker line for `base` tagged with `nonce`; an empty nonce leaves it bare
pub fn marker(base: &str, nonce: &str) -> String {
    if nonce.is_empty() {
        base.to_string()
    } else {
        format!("{} {}", base, nonce)
    }
}

/// Decode harness output into a single-case result
pub fn decode(stdout: &str, stderr: &str, nonce: &str, duration_ms: u64) -> ExecutionResult {
    let Some(record) = extract_record(stdout, nonce) else {
        let stderr = stderr.trim_end();
        let message = if stderr.trim().is_empty() {
            UNKNOWN_ERROR.to_string()
        } else {
            format!("Runtime error:\n{}", stderr)
        };
        return ExecutionResult::error(None, message, None, duration_ms);
    };

    match decode_record(&record).and_then(into_outcome) {
        Ok(outcome) => ExecutionResult {
            outcome,
            duration_ms,
        },
        Err(e) => {
            debug!(error = %e, "Undecodable result record");
            e.into_result(duration_ms)
        }
    }
}

/// Text between the last complete sentinel pair carrying `nonce`, if any
pub fn extract_record(stdout: &str, nonce: &str) -> Option<String> {
    let (start_marker, end_marker) = (marker(RESULT_START, nonce), marker(RESULT_END, nonce));
    let lines: Vec<&str> = stdout.lines().collect();
    let start = lines.iter().rposition(|line| line.trim() == start_marker)?;
    let end = lines[start + 1..]
        .iter()
        .position(|line| line.trim() == end_marker)?;
    Some(lines[start + 1..start + 1 + end].join("\n"))
}

/// The harness leaves with exit code 0 only after reporting a verdict, so a
/// success or failed record from any other exit did not come from it.
pub fn confirm_exit(result: ExecutionResult, exit_code: Option<i32>) -> ExecutionResult {
    let verdict = matches!(
        result.outcome,
        Outcome::Success { .. } | Outcome::Failed { .. }
    );
    if !verdict || exit_code == Some(0) {
        return result;
    }
    let code = exit_code.map_or_else(|| "a signal".to_string(), |c| format!("code {}", c));
    debug!(exit = %code, status = %result.status(), "Verdict contradicted by exit status");
    GradeError::DecodeFailure(format!(
        "{} record with process exit by {}",
        result.status(),
        code
    ))
    .into_result(result.duration_ms)
}

/// Split a flat `{key: value, ...}` record into fields.
///
/// Null tokens (`None`, `null`) are dropped so they read back as absent.
pub fn decode_record(record: &str) -> Result<HashMap<String, String>, GradeError> {
    let body = record.trim();
    let inner = body
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .ok_or_else(|| GradeError::DecodeFailure(truncate(body)))?;

    let mut fields = HashMap::new();
    for entry in split_top_level(inner, ',')? {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = split_once_top_level(entry, ':')
            .ok_or_else(|| GradeError::DecodeFailure(truncate(entry)))?;

        let key = unquote(key.trim()).unwrap_or_else(|| key.trim().to_string());
        let value = value.trim();
        if value == "None" || value == "null" {
            continue;
        }
        let value = unquote(value).unwrap_or_else(|| value.to_string());
        fields.insert(key, value);
    }
    Ok(fields)
}

fn into_outcome(mut fields: HashMap<String, String>) -> Result<Outcome, GradeError> {
    let status = fields
        .remove("status")
        .ok_or_else(|| GradeError::DecodeFailure("missing status".to_string()))?;

    let outcome = match status.as_str() {
        "success" => Outcome::Success {
            actual_output: fields.remove("actualOutput"),
            expected_output: fields.remove("expectedOutput"),
        },
        "failed" => Outcome::Failed {
            actual_output: fields.remove("actualOutput"),
            expected_output: fields.remove("expectedOutput"),
        },
        "error" => Outcome::Error {
            error_type: fields.remove("errorType"),
            error_message: fields
                .remove("errorMessage")
                .unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
            traceback: fields.remove("traceback"),
        },
        "timeout" => Outcome::Timeout {
            error_message: fields
                .remove("errorMessage")
                .unwrap_or_else(|| "Execution timed out".to_string()),
        },
        other => {
            return Err(GradeError::DecodeFailure(format!("unknown status {:?}", other)));
        }
    };
    Ok(outcome)
}

/// Split at `sep` only where bracket depth is zero and no quote is open
fn split_top_level(text: &str, sep: char) -> Result<Vec<&str>, GradeError> {
    let mut parts = Vec::new();
    let mut scanner = Scanner::default();
    let mut last = 0;

    for (i, c) in text.char_indices() {
        if scanner.at_top_level() && c == sep {
            parts.push(&text[last..i]);
            last = i + c.len_utf8();
            continue;
        }
        scanner.step(c)?;
    }
    if !scanner.at_top_level() {
        return Err(GradeError::DecodeFailure(format!(
            "unbalanced record: {}",
            truncate(text)
        )));
    }
    parts.push(&text[last..]);
    Ok(parts)
}

fn split_once_top_level(text: &str, sep: char) -> Option<(&str, &str)> {
    let mut scanner = Scanner::default();
    for (i, c) in text.char_indices() {
        if scanner.at_top_level() && c == sep {
            return Some((&text[..i], &text[i + c.len_utf8()..]));
        }
        scanner.step(c).ok()?;
    }
    None
}

#[derive(Default)]
struct Scanner {
    depth: usize,
    quote: Option<char>,
    escaped: bool,
}

impl Scanner {
    fn at_top_level(&self) -> bool {
        self.depth == 0 && self.quote.is_none()
    }

    fn step(&mut self, c: char) -> Result<(), GradeError> {
        if let Some(q) = self.quote {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == q {
                self.quote = None;
            }
            return Ok(());
        }
        match c {
            '"' | '\'' => self.quote = Some(c),
            '[' | '{' | '(' => self.depth += 1,
            ']' | '}' | ')' => {
                self.depth = self
                    .depth
                    .checked_sub(1)
                    .ok_or_else(|| GradeError::DecodeFailure("unbalanced brackets".to_string()))?;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Strip matching quotes and resolve escapes; `None` if not a quoted string
fn unquote(text: &str) -> Option<String> {
    let quote = text.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let inner = text.strip_prefix(quote)?.strip_suffix(quote)?;
    Some(unescape(inner))
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16) {
                    Ok(high @ 0xD800..=0xDBFF) => {
                        // surrogate pair: expect a trailing \uDC00-\uDFFF
                        let mut lookahead = chars.clone();
                        let low = (lookahead.next() == Some('\\') && lookahead.next() == Some('u'))
                            .then(|| lookahead.by_ref().take(4).collect::<String>())
                            .and_then(|h| u32::from_str_radix(&h, 16).ok())
                            .filter(|low| (0xDC00..=0xDFFF).contains(low));
                        match low {
                            Some(low) => {
                                chars = lookahead;
                                let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                                out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                            }
                            None => out.push('\u{FFFD}'),
                        }
                    }
                    Ok(code) => out.push(char::from_u32(code).unwrap_or('\u{FFFD}')),
                    Err(_) => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 200;
    match text.char_indices().nth(LIMIT) {
        Some((i, _)) => format!("{}...", &text[..i]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grader_common::types::ExecutionStatus;

    fn framed(record: &str) -> String {
        format!("some user print\n{}\n{}\n{}\ntrailing noise\n", RESULT_START, record, RESULT_END)
    }

    fn framed_with(nonce: &str, record: &str) -> String {
        format!(
            "{}\n{}\n{}\n",
            marker(RESULT_START, nonce),
            record,
            marker(RESULT_END, nonce)
        )
    }

    #[test]
    fn test_nested_list_survives_decoding() {
        let stdout = framed(
            r#"{"status": "success", "actualOutput": "[0, 1]", "expectedOutput": "[0, 1]", "errorType": null, "errorMessage": null, "traceback": null}"#,
        );
        let result = decode(&stdout, "", "", 42);

        assert_eq!(result.status(), ExecutionStatus::Success);
        assert_eq!(result.actual_output(), Some("[0, 1]"));
        assert_eq!(result.expected_output(), Some("[0, 1]"));
        assert_eq!(result.error_type(), None);
        assert_eq!(result.duration_ms, 42);
    }

    #[test]
    fn test_unquoted_nested_values_are_kept_verbatim() {
        let stdout = framed("{status: failed, actualOutput: [[1, 2], {'a': (3, 4)}], expectedOutput: [0, 1]}");
        let result = decode(&stdout, "", "", 1);

        assert_eq!(result.status(), ExecutionStatus::Failed);
        assert_eq!(result.actual_output(), Some("[[1, 2], {'a': (3, 4)}]"));
        assert_eq!(result.expected_output(), Some("[0, 1]"));
    }

    #[test]
    fn test_error_record_with_escapes() {
        let stdout = framed(
            r#"{"status": "error", "actualOutput": null, "expectedOutput": null, "errorType": "ZeroDivisionError", "errorMessage": "division by zero", "traceback": "Traceback:\n  File \"h.py\", line 3\n café"}"#,
        );
        let result = decode(&stdout, "", "", 5);

        assert_eq!(result.status(), ExecutionStatus::Error);
        assert_eq!(result.error_type(), Some("ZeroDivisionError"));
        assert_eq!(result.error_message(), Some("division by zero"));
        assert_eq!(
            result.traceback(),
            Some("Traceback:\n  File \"h.py\", line 3\n café")
        );
    }

    #[test]
    fn test_error_record_never_carries_actual_output() {
        let stdout = framed(r#"{"status": "error", "actualOutput": "[1]", "errorMessage": "boom"}"#);
        let result = decode(&stdout, "", "", 5);

        assert_eq!(result.status(), ExecutionStatus::Error);
        assert_eq!(result.actual_output(), None);
    }

    #[test]
    fn test_surrogate_pair_escape() {
        let stdout = framed(r#"{"status": "success", "actualOutput": "\ud83d\ude00"}"#);
        assert_eq!(decode(&stdout, "", "", 0).actual_output(), Some("😀"));
    }

    #[test]
    fn test_missing_markers_uses_stderr() {
        let result = decode("partial output", "Traceback...\nNameError: x\n", "", 9);

        assert_eq!(result.status(), ExecutionStatus::Error);
        assert_eq!(result.error_message(), Some("Runtime error:\nTraceback...\nNameError: x"));
    }

    #[test]
    fn test_missing_markers_without_stderr() {
        let result = decode("", "   \n", "", 9);
        assert_eq!(result.error_message(), Some(UNKNOWN_ERROR));
    }

    #[test]
    fn test_start_without_end_is_absent() {
        let result = decode("RESULT_START\n{\"status\": \"success\"}\n", "", "", 0);
        assert_eq!(result.status(), ExecutionStatus::Error);
        assert_eq!(result.error_message(), Some(UNKNOWN_ERROR));
    }

    #[test]
    fn test_last_record_wins_over_spoofed_one() {
        let stdout = format!(
            "{s}\n{{\"status\": \"success\"}}\n{e}\n{s}\n{{\"status\": \"failed\", \"actualOutput\": \"1\"}}\n{e}\n",
            s = RESULT_START,
            e = RESULT_END
        );
        assert_eq!(decode(&stdout, "", "", 0).status(), ExecutionStatus::Failed);
    }

    #[test]
    fn test_unknown_status_is_decode_failure() {
        let result = decode(&framed(r#"{"status": "maybe"}"#), "", "", 0);

        assert_eq!(result.status(), ExecutionStatus::Error);
        assert!(result
            .error_message()
            .unwrap()
            .starts_with("Failed to parse result:"));
    }

    #[test]
    fn test_garbage_record_is_decode_failure() {
        let result = decode(&framed("not a record"), "", "", 0);
        assert!(result
            .error_message()
            .unwrap()
            .starts_with("Failed to parse result:"));

        let result = decode(&framed(r#"{"status": "success", "actualOutput": "[0, 1"#), "", "", 0);
        assert_eq!(result.status(), ExecutionStatus::Error);
    }

    #[test]
    fn test_unknown_keys_ignored_and_missing_keys_absent() {
        let result = decode(&framed(r#"{"status": "success", "extra": [1, 2]}"#), "", "", 0);

        assert_eq!(result.status(), ExecutionStatus::Success);
        assert_eq!(result.actual_output(), None);
        assert_eq!(result.expected_output(), None);
    }

    #[test]
    fn test_split_top_level_respects_quotes() {
        let parts = split_top_level(r#""a": "x, y", "b": [1, (2, 3)]"#, ',').unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].trim(), r#""b": [1, (2, 3)]"#);
    }

    #[test]
    fn test_frames_without_the_run_nonce_are_ignored() {
        let spoofed = framed_with("", r#"{"status": "success", "actualOutput": "[0, 1]"}"#);
        let guessed = framed_with("0000", r#"{"status": "success", "actualOutput": "[0, 1]"}"#);
        let genuine = framed_with("c0ffee", r#"{"status": "failed", "actualOutput": "[]"}"#);

        let stdout = format!("{}{}{}", genuine, spoofed, guessed);
        let result = decode(&stdout, "", "c0ffee", 3);
        assert_eq!(result.status(), ExecutionStatus::Failed);
        assert_eq!(result.actual_output(), Some("[]"));

        let result = decode(&format!("{}{}", spoofed, guessed), "", "c0ffee", 3);
        assert_eq!(result.status(), ExecutionStatus::Error);
        assert_eq!(result.error_message(), Some(UNKNOWN_ERROR));
    }

    #[test]
    fn test_verdict_requires_clean_exit() {
        let success = decode(&framed(r#"{"status": "success", "actualOutput": "1"}"#), "", "", 8);

        assert_eq!(confirm_exit(success.clone(), Some(0)).status(), ExecutionStatus::Success);

        let killed = confirm_exit(success.clone(), None);
        assert_eq!(killed.status(), ExecutionStatus::Error);
        assert_eq!(killed.actual_output(), None);
        assert_eq!(killed.duration_ms, 8);
        assert!(killed
            .error_message()
            .unwrap()
            .starts_with("Failed to parse result: success record"));

        assert_eq!(confirm_exit(success, Some(130)).status(), ExecutionStatus::Error);
    }

    #[test]
    fn test_error_record_keeps_nonzero_exit() {
        let error = decode(&framed(r#"{"status": "error", "errorMessage": "boom"}"#), "", "", 0);
        let confirmed = confirm_exit(error, Some(1));
        assert_eq!(confirmed.error_message(), Some("boom"));
    }
}
