// CLI commands for grading submissions without the HTTP server
use anyhow::{Context, Result};
use grader_common::config::GraderConfig;
use grader_common::types::{BatchStatus, ExecutionStatus, Submission};
use grader_engine::problems::{FsProblemRepository, ProblemRepository};
use grader_engine::Grader;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Explicit path first, then the usual lookup
pub fn load_config(path: Option<&Path>) -> Result<GraderConfig> {
    let config = match path {
        Some(path) => {
            info!(path = %path.display(), "Loading grader config");
            GraderConfig::load(path)?
        }
        None => GraderConfig::load_default()?,
    };
    debug!(
        problems_root = %config.problems_root.display(),
        run_timeout_ms = config.run_timeout_ms,
        batch_timeout_ms = config.batch_timeout_ms,
        "Loaded grader config"
    );
    Ok(config)
}

fn read_source(file: &Path) -> Result<String> {
    fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{}", json);
    Ok(())
}

pub async fn validate(config: GraderConfig, file: &Path) -> Result<bool> {
    let source = read_source(file)?;
    let verdict = Grader::new(config).validate(&source).await;

    print_json(&verdict)?;
    if verdict.allowed {
        eprintln!("✅ {} passed validation", file.display());
    } else {
        eprintln!("❌ {}", verdict.reason().unwrap_or("Security violation"));
    }
    Ok(verdict.allowed)
}

pub async fn list_problems(config: &GraderConfig) -> Result<bool> {
    let slugs = FsProblemRepository::new(&config.problems_root)
        .list_slugs()
        .await
        .with_context(|| format!("Failed to list {}", config.problems_root.display()))?;

    for slug in &slugs {
        println!("{}", slug);
    }
    Ok(true)
}

pub async fn case_count(config: GraderConfig, slug: &str) -> Result<bool> {
    let count = Grader::new(config).case_count(slug).await?;
    println!("{}", count);
    Ok(true)
}

pub async fn template(config: &GraderConfig, slug: &str) -> Result<bool> {
    let text = FsProblemRepository::new(&config.problems_root)
        .template(slug)
        .await?;
    print!("{}", text);
    Ok(true)
}

pub async fn run(config: GraderConfig, slug: &str, file: &Path, case: usize) -> Result<bool> {
    let submission = Submission::new(slug, read_source(file)?);
    debug!(slug, case, file = %file.display(), "Running submission");
    eprintln!("🚀 Running {} case {}...", slug, case);

    let result = Grader::new(config).run_one(&submission, case).await;

    print_json(&result)?;
    eprintln!("{} ({} ms)", result.status(), result.duration_ms);
    Ok(result.status() == ExecutionStatus::Success)
}

pub async fn submit(config: GraderConfig, slug: &str, file: &Path) -> Result<bool> {
    let submission = Submission::new(slug, read_source(file)?);
    debug!(slug, file = %file.display(), "Grading submission");
    eprintln!("🚀 Grading {} against the full suite...", slug);

    let result = Grader::new(config).grade_all(&submission).await;

    print_json(&result)?;
    eprintln!(
        "{}: {}/{} passed ({} ms)",
        result.status, result.passed_count, result.total_count, result.duration_ms
    );
    Ok(result.status == BatchStatus::AllPassed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn scratch() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("grader-cli-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_source_names_the_file() {
        let err = read_source(Path::new("/nonexistent/solution.py")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/solution.py"));
    }

    #[test]
    fn test_explicit_config_path_is_used() {
        let dir = scratch();
        let path = dir.join("grader.json");
        fs::write(&path, r#"{ "run_timeout_ms": 3000, "batch_timeout_ms": 30000 }"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.run_timeout_ms, 3000);
        assert_eq!(config.ambient_python, "python3");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_config_source_is_logged() {
        let dir = scratch();
        let path = dir.join("grader.json");
        fs::write(&path, r#"{ "problems_root": "/srv/problems" }"#).unwrap();

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(subscriber, || load_config(Some(&path))).unwrap();

        let text = logs.text();
        assert!(text.contains("Loading grader config"));
        assert!(text.contains(&path.display().to_string()));
        assert!(text.contains("Loaded grader config"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/grader.json"))).is_err());
    }

    #[tokio::test]
    async fn test_run_out_of_range_reports_failure() {
        let root = scratch();
        let problem = root.join("two_sum");
        fs::create_dir_all(&problem).unwrap();
        fs::write(
            problem.join("test_solution.py"),
            "@pytest.mark.parametrize(\"nums, expected\", [([1], 1)])\n",
        )
        .unwrap();
        let source = root.join("solution.py");
        fs::write(&source, "class Solution:\n    pass\n").unwrap();

        let config = GraderConfig {
            problems_root: root.clone(),
            ..Default::default()
        };
        let passed = run(config, "two_sum", &source, 4).await.unwrap();
        assert!(!passed);

        fs::remove_dir_all(&root).unwrap();
    }
}
