//! Test case repository: reads a problem's parametrize declaration and hands
//! out one named test case at a time.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

use crate::error::GradeError;
use crate::literal::{Literal, LiteralError, LiteralParser};
use crate::problems::problem_dir;

pub const FIXTURE_FILE: &str = "test_solution.py";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FixtureError {
    #[error("No parametrize declaration found")]
    MissingDeclaration,

    #[error("Invalid parameter names: {0}")]
    InvalidNames(String),

    #[error("Unsupported fixture literal: {0}")]
    UnsupportedLiteral(#[from] LiteralError),

    #[error("Test case {row} has {found} values but {expected} parameters are declared")]
    ArityMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Test case index {index} out of range (total: {count})")]
    OutOfRange { index: usize, count: usize },
}

/// One test case: parameters in declared order, plus the designated
/// expected-value parameter if there is one.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    params: Vec<(String, Literal)>,
    expected: Option<usize>,
}

impl TestCase {
    pub fn new(params: Vec<(String, Literal)>) -> Self {
        let expected = params.iter().rposition(|(name, _)| is_expected_name(name));
        Self { params, expected }
    }

    pub fn params(&self) -> &[(String, Literal)] {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&Literal> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// The designated expected parameter
    pub fn expected(&self) -> Option<(&str, &Literal)> {
        self.expected
            .map(|i| &self.params[i])
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Parameters passed to the run entry point, in declared order
    pub fn inputs(&self) -> impl Iterator<Item = (&str, &Literal)> {
        self.params
            .iter()
            .filter(|(name, _)| !is_expected_name(name))
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Tuple-like rendering of every parameter, e.g. `([2, 7], 9, [0, 1])`
    pub fn display_tuple(&self) -> String {
        let values: Vec<String> = self.params.iter().map(|(_, v)| v.to_python()).collect();
        format!("({})", values.join(", "))
    }
}

/// Any parameter whose name mentions `expected` is an expectation, not an input
pub fn is_expected_name(name: &str) -> bool {
    name.contains("expected")
}

/// A parsed parametrize declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    names: Vec<String>,
    rows: Vec<Vec<Literal>>,
}

fn declaration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // decorator lines only, so mentions in comments and docstrings are skipped
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*@(?:[\w.]*\.)?parametrize\s*\(").expect("static regex"))
}

impl Fixture {
    /// Parse the first `@...parametrize(names, [rows...])` decorator in `source`
    pub fn parse(source: &str) -> Result<Self, FixtureError> {
        let found = declaration_regex()
            .find(source)
            .ok_or(FixtureError::MissingDeclaration)?;

        // the parser works on char offsets
        let start = source[..found.end()].chars().count();
        let mut parser = LiteralParser::new(source, start);

        let names = match parser.parse_value()? {
            Literal::Str(s) => s
                .split(',')
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect::<Vec<_>>(),
            Literal::List(items) | Literal::Tuple(items) => items
                .into_iter()
                .map(|item| match item {
                    Literal::Str(s) => Ok(s.trim().to_string()),
                    other => Err(FixtureError::InvalidNames(other.to_python())),
                })
                .collect::<Result<Vec<_>, _>>()?,
            other => return Err(FixtureError::InvalidNames(other.to_python())),
        };
        if names.is_empty() {
            return Err(FixtureError::InvalidNames("empty parameter list".to_string()));
        }

        parser.expect(',')?;

        let values = match parser.parse_value()? {
            Literal::List(items) | Literal::Tuple(items) => items,
            other => {
                return Err(FixtureError::UnsupportedLiteral(LiteralError {
                    offset: parser.position(),
                    message: format!("argvalues must be a list, found {}", other.to_python()),
                }))
            }
        };

        let mut rows = Vec::with_capacity(values.len());
        for (row, value) in values.into_iter().enumerate() {
            let row_values = if names.len() == 1 {
                vec![value]
            } else {
                match value {
                    Literal::Tuple(items) | Literal::List(items) => items,
                    _ => vec![value],
                }
            };
            if row_values.len() != names.len() {
                return Err(FixtureError::ArityMismatch {
                    row,
                    expected: names.len(),
                    found: row_values.len(),
                });
            }
            rows.push(row_values);
        }

        debug!(params = ?names, cases = rows.len(), "Parsed fixture declaration");
        Ok(Self { names, rows })
    }

    pub fn param_names(&self) -> &[String] {
        &self.names
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    /// Bind row `index` to the parameter names; out of range is an error,
    /// never a clamped or default case
    pub fn extract_case(&self, index: usize) -> Result<TestCase, FixtureError> {
        let row = self.rows.get(index).ok_or(FixtureError::OutOfRange {
            index,
            count: self.rows.len(),
        })?;
        let params = self
            .names
            .iter()
            .cloned()
            .zip(row.iter().cloned())
            .collect();
        Ok(TestCase::new(params))
    }
}

/// Loads fixtures from `<problems_root>/<slug>/test_solution.py`
#[derive(Debug, Clone)]
pub struct FixtureRepository {
    problems_root: PathBuf,
}

impl FixtureRepository {
    pub fn new(problems_root: impl AsRef<Path>) -> Self {
        Self {
            problems_root: problems_root.as_ref().to_path_buf(),
        }
    }

    pub async fn load(&self, slug: &str) -> Result<Fixture, GradeError> {
        let path = problem_dir(&self.problems_root, slug)?.join(FIXTURE_FILE);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GradeError::ProblemNotFound(slug.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Fixture::parse(&text)?)
    }

    pub async fn count(&self, slug: &str) -> Result<usize, GradeError> {
        Ok(self.load(slug).await?.count())
    }

    pub async fn extract_case(&self, slug: &str, index: usize) -> Result<TestCase, GradeError> {
        Ok(self.load(slug).await?.extract_case(index)?)
    }
}
