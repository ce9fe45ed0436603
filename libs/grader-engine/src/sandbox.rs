/// Sandboxed Runner - Process Execution Under a Deadline
///
/// **Core Responsibility:**
/// Write a synthesized program next to its problem files, run it in one
/// child process, and return the raw output.
///
/// **Guarantees:**
/// - stdout and stderr are drained concurrently on their own tasks, so a full
///   pipe on one side can never stall the child while we wait on the other
/// - Hard deadline: on expiry the whole process group is killed, reaped
///   within a bounded grace period, and the pipes are drained
/// - Every written artifact is removed on every exit path (drop guard)
/// - The runner never judges correctness; decoding is the decoder's job
use async_trait::async_trait;
use grader_common::config::GraderConfig;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::GradeError;

/// A file written into the working directory for the duration of one run
#[derive(Debug, Clone)]
pub struct ProgramFile {
    pub name: String,
    pub contents: String,
}

impl ProgramFile {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub work_dir: PathBuf,
    pub files: Vec<ProgramFile>,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra environment for the child, on top of the inherited one
    pub env: Vec<(String, String)>,
    pub deadline: Duration,
}

/// Raw result of one process run
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    /// None when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub output_truncated: bool,
    pub elapsed: Duration,
}

impl RunOutput {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn run(&self, request: RunRequest) -> Result<RunOutput, GradeError>;
}

/// Resolve the interpreter: the embedded venv wins, otherwise the ambient
/// interpreter name is left for PATH lookup
pub fn resolve_interpreter(config: &GraderConfig) -> PathBuf {
    let embedded = if cfg!(windows) {
        config.venv_dir.join("Scripts").join("python.exe")
    } else {
        config.venv_dir.join("bin").join("python")
    };

    if embedded.is_file() {
        // children run with a different cwd, so the path must be absolute
        match fs::canonicalize(&embedded) {
            Ok(path) => return path,
            Err(e) => warn!(path = %embedded.display(), error = %e, "Could not resolve embedded interpreter"),
        }
    }
    PathBuf::from(&config.ambient_python)
}

/// Artifact cleanup guard - removes every file it wrote when dropped,
/// including on early return, panic or task cancellation
struct ArtifactGuard {
    paths: Vec<PathBuf>,
}

impl ArtifactGuard {
    /// Write all files. A file that already exists is a leftover of a run
    /// that never reached its cleanup; the caller holds the problem lock, so
    /// it is replaced.
    fn write(dir: &Path, files: &[ProgramFile]) -> io::Result<Self> {
        let mut guard = Self { paths: Vec::new() };
        for file in files {
            if file.name.is_empty() || file.name.contains(['/', '\\']) || file.name.starts_with('.') {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Invalid artifact name: {}", file.name),
                ));
            }
            let path = dir.join(&file.name);
            if path.exists() {
                warn!(path = %path.display(), "Replacing stale artifact");
            }
            let mut handle = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?;
            guard.paths.push(path);
            handle.write_all(file.contents.as_bytes())?;
        }
        Ok(guard)
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove artifact");
                }
            }
        }
    }
}

/// Local process runner
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    kill_grace: Duration,
    max_output_bytes: usize,
}

impl ProcessSandbox {
    pub fn new(kill_grace: Duration, max_output_bytes: usize) -> Self {
        Self {
            kill_grace,
            max_output_bytes,
        }
    }

    pub fn from_config(config: &GraderConfig) -> Self {
        Self::new(config.kill_grace(), config.max_output_bytes)
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    #[tracing::instrument(skip(self, request), fields(program = %request.program.display(), deadline_ms = request.deadline.as_millis() as u64))]
    async fn run(&self, request: RunRequest) -> Result<RunOutput, GradeError> {
        // CRITICAL: guard exists before the child does, so files go away on every path
        let _artifacts = ArtifactGuard::write(&request.work_dir, &request.files)?;

        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .current_dir(&request.work_dir)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PYTHONUNBUFFERED", "1")
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let start = Instant::now();
        let mut child = command.spawn()?;
        let pid = child.id();
        debug!(pid = ?pid, "Spawned child process");

        let stdout_task = tokio::spawn(drain(child.stdout.take(), self.max_output_bytes));
        let stderr_task = tokio::spawn(drain(child.stderr.take(), self.max_output_bytes));

        let (exit_code, timed_out) = match tokio::time::timeout(request.deadline, child.wait()).await {
            Ok(Ok(status)) => (status.code(), false),
            Ok(Err(e)) => {
                kill_tree(&mut child, pid);
                stdout_task.abort();
                stderr_task.abort();
                return Err(e.into());
            }
            Err(_) => {
                warn!(
                    pid = ?pid,
                    deadline_ms = request.deadline.as_millis() as u64,
                    "Execution timed out - killing process group"
                );
                kill_tree(&mut child, pid);
                let reaped = tokio::time::timeout(self.kill_grace, child.wait()).await;
                let code = match reaped {
                    Ok(Ok(status)) => status.code(),
                    _ => {
                        warn!(pid = ?pid, "Killed process was not reaped within grace period");
                        None
                    }
                };
                (code, true)
            }
        };
        let elapsed = start.elapsed();

        let stdout = self.join_reader(stdout_task, pid).await;
        let stderr = self.join_reader(stderr_task, pid).await;

        debug!(
            exit_code = ?exit_code,
            timed_out,
            elapsed_ms = elapsed.as_millis() as u64,
            stdout_bytes = stdout.bytes.len(),
            stderr_bytes = stderr.bytes.len(),
            "Child process finished"
        );

        Ok(RunOutput {
            stdout: String::from_utf8_lossy(&stdout.bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr.bytes).into_owned(),
            exit_code,
            timed_out,
            output_truncated: stdout.truncated || stderr.truncated,
            elapsed,
        })
    }
}

impl ProcessSandbox {
    /// Wait for a reader within the grace period. A reader still blocked
    /// after that means a descendant kept the pipe open: kill the group and
    /// give it one more grace period before giving up on the rest.
    async fn join_reader(&self, mut task: JoinHandle<Drained>, pid: Option<u32>) -> Drained {
        match tokio::time::timeout(self.kill_grace, &mut task).await {
            Ok(Ok(drained)) => return drained,
            Ok(Err(e)) => {
                warn!(error = %e, "Output reader task failed");
                return Drained::default();
            }
            Err(_) => {
                debug!(pid = ?pid, "Pipe still open after exit - killing leftover processes");
                kill_group(pid);
            }
        }
        match tokio::time::timeout(self.kill_grace, &mut task).await {
            Ok(Ok(drained)) => drained,
            _ => {
                task.abort();
                warn!(pid = ?pid, "Abandoned output reader after grace period");
                Drained::default()
            }
        }
    }
}

#[derive(Debug, Default)]
struct Drained {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Read a pipe to EOF, keeping at most `limit` bytes. The rest is still
/// consumed so the writer never blocks on a full pipe.
async fn drain<R: AsyncRead + Unpin>(reader: Option<R>, limit: usize) -> Drained {
    let mut drained = Drained::default();
    let Some(mut reader) = reader else {
        return drained;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(drained.bytes.len());
                if n > room {
                    drained.truncated = true;
                }
                drained.bytes.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) => {
                debug!(error = %e, "Pipe read failed");
                break;
            }
        }
    }
    drained
}

fn kill_tree(child: &mut Child, pid: Option<u32>) {
    kill_group(pid);
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "start_kill failed (process already gone?)");
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!(pid, error = %e, "killpg failed (group already gone?)");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}
