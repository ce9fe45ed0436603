/// Grader - High-Level Orchestration
///
/// **Responsibility:**
/// Gate a submission through validation, then drive either the single-case
/// flow (fixture → harness → sandbox → decoder) or the full-suite flow.
///
/// **Concurrency:**
/// Both flows write into the problem's own directory, so every flow for a
/// slug holds that slug's lock from the first write until cleanup. Different
/// slugs run in parallel.
///
/// This module is the glue layer - it knows nothing about:
/// - How processes are run (sandbox's job)
/// - How output is decoded (decoder's and batch grader's job)
use grader_common::config::GraderConfig;
use grader_common::types::{BatchResult, ExecutionResult, Submission, ValidationVerdict};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::batch::BatchGrader;
use crate::decoder;
use crate::error::GradeError;
use crate::fixture::FixtureRepository;
use crate::harness::{
    self, EntryPoints, HARNESS_FILE, HELPERS_FILE, RESULT_NONCE_ENV, SUBMISSION_FILE,
};
use crate::problems::existing_problem_dir;
use crate::sandbox::{resolve_interpreter, ProcessSandbox, ProgramFile, RunRequest, Sandbox};
use crate::validator::{PythonAstValidator, SourceValidator};

/// One async mutex per problem slug
#[derive(Default)]
pub struct SlugLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SlugLocks {
    pub async fn acquire(&self, slug: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(slug.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct Grader {
    config: GraderConfig,
    interpreter: PathBuf,
    sandbox: Arc<dyn Sandbox>,
    validator: Arc<dyn SourceValidator>,
    fixtures: FixtureRepository,
    batch: BatchGrader,
    locks: SlugLocks,
}

impl Grader {
    /// Production wiring: local process sandbox and the `ast` based validator
    pub fn new(config: GraderConfig) -> Self {
        let interpreter = resolve_interpreter(&config);
        let sandbox: Arc<dyn Sandbox> = Arc::new(ProcessSandbox::from_config(&config));
        let validator = Arc::new(PythonAstValidator::new(
            sandbox.clone(),
            interpreter.clone(),
            &config,
        ));
        info!(
            interpreter = %interpreter.display(),
            problems_root = %config.problems_root.display(),
            "Grader initialized"
        );
        Self::with_parts(config, interpreter, sandbox, validator)
    }

    pub fn with_parts(
        config: GraderConfig,
        interpreter: PathBuf,
        sandbox: Arc<dyn Sandbox>,
        validator: Arc<dyn SourceValidator>,
    ) -> Self {
        Self {
            fixtures: FixtureRepository::new(&config.problems_root),
            batch: BatchGrader::new(sandbox.clone(), interpreter.clone(), config.batch_timeout()),
            locks: SlugLocks::default(),
            config,
            interpreter,
            sandbox,
            validator,
        }
    }

    pub fn config(&self) -> &GraderConfig {
        &self.config
    }

    pub async fn validate(&self, source: &str) -> ValidationVerdict {
        self.validator.validate(source).await
    }

    pub async fn case_count(&self, slug: &str) -> Result<usize, GradeError> {
        self.fixtures.count(slug).await
    }

    /// Run one test case. Always yields a result.
    pub async fn run_one(&self, submission: &Submission, case_index: usize) -> ExecutionResult {
        let start = Instant::now();
        match self.try_run_one(submission, case_index).await {
            Ok(result) => result,
            Err(e) => e.into_result(start.elapsed().as_millis() as u64),
        }
    }

    /// Like [`Grader::run_one`] but hands back the error class, so callers
    /// can tell caller mistakes from engine failures.
    #[tracing::instrument(skip(self, submission), fields(slug = %submission.problem_slug))]
    pub async fn try_run_one(
        &self,
        submission: &Submission,
        case_index: usize,
    ) -> Result<ExecutionResult, GradeError> {
        let slug = submission.problem_slug.as_str();
        self.check_size(&submission.source)?;
        let problem_dir = existing_problem_dir(&self.config.problems_root, slug).await?;
        let case = self.fixtures.extract_case(slug, case_index).await?;
        self.gate(&submission.source).await?;

        let helpers = match tokio::fs::read_to_string(problem_dir.join(HELPERS_FILE)).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No helpers file, entry points fall back to the slug");
                String::new()
            }
            Err(e) => return Err(e.into()),
        };
        let entry_points = EntryPoints::discover(&helpers, slug);
        let program = harness::synthesize(&entry_points, &case);
        let nonce = Uuid::new_v4().simple().to_string();

        let request = RunRequest {
            work_dir: problem_dir,
            files: vec![
                ProgramFile::new(SUBMISSION_FILE, submission.source.as_str()),
                ProgramFile::new(HARNESS_FILE, program),
            ],
            program: self.interpreter.clone(),
            args: vec![HARNESS_FILE.to_string()],
            env: vec![(RESULT_NONCE_ENV.to_string(), nonce.clone())],
            deadline: self.config.run_timeout(),
        };

        let output = {
            let _guard = self.locks.acquire(slug).await;
            self.sandbox.run(request).await?
        };

        if output.timed_out {
            warn!(elapsed_ms = output.elapsed_ms(), "Submission timed out");
            let threshold_ms = self.config.run_timeout_ms;
            return Ok(GradeError::Timeout { threshold_ms }.into_result(output.elapsed_ms()));
        }
        if output.output_truncated {
            warn!("Submission output exceeded the capture limit");
        }

        let decoded = decoder::decode(&output.stdout, &output.stderr, &nonce, output.elapsed_ms());
        let result = decoder::confirm_exit(decoded, output.exit_code);
        info!(
            status = %result.status(),
            duration_ms = result.duration_ms,
            "Test case finished"
        );
        Ok(result)
    }

    /// Run the full suite. Always yields a result.
    pub async fn grade_all(&self, submission: &Submission) -> BatchResult {
        let start = Instant::now();
        match self.try_grade_all(submission).await {
            Ok(result) => result,
            Err(e) => BatchResult::error(e.to_string(), start.elapsed().as_millis() as u64),
        }
    }

    #[tracing::instrument(skip(self, submission), fields(slug = %submission.problem_slug))]
    pub async fn try_grade_all(&self, submission: &Submission) -> Result<BatchResult, GradeError> {
        let slug = submission.problem_slug.as_str();
        self.check_size(&submission.source)?;
        let problem_dir = existing_problem_dir(&self.config.problems_root, slug).await?;
        self.gate(&submission.source).await?;

        // names only feed the scraping fallback
        let param_names = match self.fixtures.load(slug).await {
            Ok(fixture) => fixture.param_names().to_vec(),
            Err(e) => {
                debug!(error = %e, "Fixture declaration unavailable");
                Vec::new()
            }
        };

        let _guard = self.locks.acquire(slug).await;
        Ok(self
            .batch
            .grade_all(&problem_dir, &submission.source, &param_names)
            .await)
    }

    fn check_size(&self, source: &str) -> Result<(), GradeError> {
        if source.len() > self.config.max_source_bytes {
            return Err(GradeError::SourceTooLarge {
                size: source.len(),
                limit: self.config.max_source_bytes,
            });
        }
        Ok(())
    }

    /// A rejected submission never reaches the sandbox
    async fn gate(&self, source: &str) -> Result<(), GradeError> {
        let verdict = self.validator.validate(source).await;
        if verdict.allowed {
            return Ok(());
        }
        let reason = verdict.reason().unwrap_or("Security violation").to_string();
        warn!(reason = %reason, "Submission rejected by validator");
        Err(GradeError::ValidationRejected(reason))
    }
}
