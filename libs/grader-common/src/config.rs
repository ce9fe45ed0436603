// Grader configuration: paths, deadlines, output caps and the import/call denylist
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/grader.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraderConfig {
    /// Directory holding one sub-directory per problem slug
    pub problems_root: PathBuf,
    /// Embedded virtualenv; its interpreter is preferred over the ambient one
    pub venv_dir: PathBuf,
    /// Interpreter looked up on PATH when the venv is absent
    pub ambient_python: String,
    pub run_timeout_ms: u64,
    pub batch_timeout_ms: u64,
    /// How long a killed process gets to be reaped and flush its pipes
    pub kill_grace_ms: u64,
    pub max_output_bytes: usize,
    pub max_source_bytes: usize,
    pub denied_modules: Vec<String>,
    pub denied_calls: Vec<String>,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            problems_root: PathBuf::from("lcpy/problems"),
            venv_dir: PathBuf::from("lcpy/venv"),
            ambient_python: "python3".to_string(),
            run_timeout_ms: 2_000,
            batch_timeout_ms: 20_000,
            kill_grace_ms: 1_000,
            max_output_bytes: 1024 * 1024,
            max_source_bytes: 1024 * 1024,
            denied_modules: [
                "os", "subprocess", "sys", "pathlib", "shutil", "socket", "urllib", "ctypes",
                "importlib", "multiprocessing", "threading", "signal", "pickle", "marshal",
                "builtins", "io", "http", "requests",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            denied_calls: ["eval", "exec", "__import__", "open", "compile", "breakpoint"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl GraderConfig {
    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Grader config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: GraderConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.apply_env().validate()
    }

    /// Load from `GRADER_CONFIG` or config/grader.json, falling back to defaults
    /// when the default file does not exist
    pub fn load_default() -> Result<Self> {
        if let Ok(path) = std::env::var("GRADER_CONFIG") {
            return Self::load(Path::new(&path));
        }

        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            Self::load(default_path)
        } else {
            tracing::debug!("{} not found, using built-in defaults", DEFAULT_CONFIG_PATH);
            Self::default().apply_env().validate()
        }
    }

    fn apply_env(mut self) -> Self {
        if let Ok(root) = std::env::var("PROBLEMS_ROOT") {
            self.problems_root = PathBuf::from(root);
        }
        if let Ok(python) = std::env::var("GRADER_PYTHON") {
            self.ambient_python = python;
        }
        self
    }

    pub fn validate(self) -> Result<Self> {
        if self.run_timeout_ms == 0 || self.batch_timeout_ms == 0 {
            bail!("Timeouts must be greater than zero");
        }
        if self.batch_timeout_ms <= self.run_timeout_ms {
            bail!(
                "batch_timeout_ms ({}) must be larger than run_timeout_ms ({})",
                self.batch_timeout_ms,
                self.run_timeout_ms
            );
        }
        if self.ambient_python.trim().is_empty() {
            bail!("ambient_python must not be empty");
        }
        Ok(self)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}
