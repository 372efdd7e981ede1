//! # sheetwise-sandbox
//!
//! Runs oracle-authored transformation programs in a separate process.
//!
//! Each execution gets a fresh scratch directory holding the candidate
//! source, a launcher for the configured interpreter and the result file.
//! Failures of the candidate (syntax errors, exceptions, a missing entry
//! point, non-table return values, timeouts, memory exhaustion) come back as
//! [`ExecutionOutcome::Failed`]; only faults of the host itself are
//! [`SandboxError`]s.

mod cancel;
mod runtime;

pub use cancel::CancelToken;

use async_trait::async_trait;
use runtime::{Runtime, EXIT_MISSING_ENTRY, EXIT_NOT_A_TABLE, EXIT_SYNTAX};
use serde::{Deserialize, Serialize};
use sheetwise_core::{CandidateProgram, SandboxConfig, Table};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Characters of stderr kept in failure messages.
const STDERR_TAIL_CHARS: usize = 4000;

/// Host-side failures. Candidate failures are never reported this way.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Unsupported sandbox runtime for extension '{0}'")]
    UnsupportedRuntime(String),

    #[error("Failed to prepare scratch directory: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("Failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Execution cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;

/// Why a candidate program failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionErrorKind {
    SyntaxError,
    RuntimeError,
    ContractViolation,
}

impl std::fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExecutionErrorKind::SyntaxError => "SyntaxError",
            ExecutionErrorKind::RuntimeError => "RuntimeError",
            ExecutionErrorKind::ContractViolation => "ContractViolation",
        };
        f.write_str(name)
    }
}

/// Result of running one candidate program.
///
/// Anything the program wrote to the output path is untrusted unless the
/// outcome is `Ok`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Ok {
        table: Table,
    },
    Failed {
        kind: ExecutionErrorKind,
        message: String,
    },
}

impl ExecutionOutcome {
    fn failed(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        ExecutionOutcome::Failed {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, ExecutionOutcome::Ok { .. })
    }
}

/// Runs candidate programs.
///
/// [`Sandbox`] is the production implementation; the correction loop only
/// depends on this trait.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run `program` against the workbook at `source`, handing it `output`
    /// as its output destination.
    async fn execute(
        &self,
        program: &CandidateProgram,
        source: &Path,
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<ExecutionOutcome>;
}

/// Outcome of the compile-only pre-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxCheck {
    pub valid: bool,
    pub message: String,
}

/// Process-isolated executor for candidate programs.
#[derive(Debug, Clone)]
pub struct Sandbox {
    config: SandboxConfig,
    runtime: Runtime,
}

struct Scratch {
    dir: tempfile::TempDir,
    candidate: PathBuf,
}

impl Sandbox {
    /// # Errors
    ///
    /// Returns `SandboxError::UnsupportedRuntime` for an unknown extension.
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let runtime = Runtime::from_extension(&config.extension)?;
        Ok(Self { config, runtime })
    }

    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Compile the candidate without running it.
    ///
    /// # Errors
    ///
    /// Returns an error if the interpreter cannot be launched.
    pub async fn validate_syntax(&self, program: &CandidateProgram) -> Result<SyntaxCheck> {
        let scratch = self.prepare(program).await?;
        self.check_syntax_in(&scratch).await
    }

    async fn check_syntax_in(&self, scratch: &Scratch) -> Result<SyntaxCheck> {
        let args = self
            .runtime
            .syntax_check_args(&scratch.candidate.to_string_lossy());
        let mut command = self.command(&args, scratch.dir.path());
        let mut child = command.spawn().map_err(|source| self.spawn_error(source))?;
        let captured = tokio::time::timeout(
            self.timeout(),
            collect(&mut child, self.config.max_output_bytes),
        )
        .await
        .map_err(|_| {
            SandboxError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "syntax check timed out",
            ))
        })??;
        let output = captured.output;

        if output.status.success() {
            Ok(SyntaxCheck {
                valid: true,
                message: String::new(),
            })
        } else {
            Ok(SyntaxCheck {
                valid: false,
                message: stderr_tail(&output),
            })
        }
    }

    /// Run `program` in a fresh scratch directory.
    ///
    /// # Errors
    ///
    /// Host faults only: the scratch directory cannot be created, the
    /// interpreter cannot be spawned, or `cancel` fired.
    pub async fn run(
        &self,
        program: &CandidateProgram,
        source: &Path,
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<ExecutionOutcome> {
        if cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }
        let started = Instant::now();
        let scratch = self.prepare(program).await?;

        if self.config.syntax_check {
            let check = self.check_syntax_in(&scratch).await?;
            if !check.valid {
                info!(generation = program.generation(), "Candidate failed syntax check");
                return Ok(ExecutionOutcome::failed(
                    ExecutionErrorKind::SyntaxError,
                    check.message,
                ));
            }
        }

        let (launcher_name, launcher_source) = self.runtime.launcher();
        let launcher = scratch.dir.path().join(launcher_name);
        tokio::fs::write(&launcher, launcher_source)
            .await
            .map_err(SandboxError::Scratch)?;
        let result_path = scratch.dir.path().join("result.json");

        let args = vec![
            launcher.to_string_lossy().into_owned(),
            scratch.candidate.to_string_lossy().into_owned(),
            self.config.entry_point.clone(),
            result_path.to_string_lossy().into_owned(),
            absolute(source)?.to_string_lossy().into_owned(),
            absolute(output)?.to_string_lossy().into_owned(),
        ];

        let mut command = self.command(&args, scratch.dir.path());
        let mut child = command.spawn().map_err(|source| self.spawn_error(source))?;
        let limit = self.config.max_output_bytes;

        // The child is killed when it is dropped on any early return.
        let waited = tokio::select! {
            waited = tokio::time::timeout(self.timeout(), collect(&mut child, limit)) => waited,
            () = cancel.cancelled() => {
                warn!(generation = program.generation(), "Execution cancelled, child killed");
                return Err(SandboxError::Cancelled);
            }
        };

        let outcome = match waited {
            Err(_) => ExecutionOutcome::failed(
                ExecutionErrorKind::RuntimeError,
                format!(
                    "execution timed out after {}s",
                    self.config.timeout_secs
                ),
            ),
            Ok(result) => {
                let captured = result?;
                if captured.overflowed {
                    ExecutionOutcome::failed(
                        ExecutionErrorKind::RuntimeError,
                        format!(
                            "program wrote more than {limit} bytes to stdout or stderr: {}",
                            stderr_tail(&captured.output)
                        ),
                    )
                } else {
                    self.interpret(&captured.output, &result_path).await?
                }
            }
        };

        match &outcome {
            ExecutionOutcome::Ok { table } => info!(
                generation = program.generation(),
                rows = table.row_count(),
                columns = table.col_count(),
                elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Candidate executed"
            ),
            ExecutionOutcome::Failed { kind, message } => {
                info!(generation = program.generation(), kind = %kind, "Candidate failed");
                debug!(message = %message, "Candidate failure detail");
            }
        }
        Ok(outcome)
    }

    async fn prepare(&self, program: &CandidateProgram) -> Result<Scratch> {
        let dir = tempfile::Builder::new()
            .prefix("sheetwise-sandbox-")
            .tempdir()
            .map_err(SandboxError::Scratch)?;
        let candidate = dir
            .path()
            .join(format!("candidate.{}", self.config.extension));
        tokio::fs::write(&candidate, program.source())
            .await
            .map_err(SandboxError::Scratch)?;
        Ok(Scratch { dir, candidate })
    }

    fn command(&self, args: &[String], workdir: &Path) -> Command {
        let mut command = match self.config.memory_limit_mb {
            Some(limit_mb) => {
                let mut wrapper = Command::new("sh");
                wrapper
                    .arg("-c")
                    .arg(format!("ulimit -v {} && exec \"$@\"", limit_mb * 1024))
                    .arg("sheetwise-sandbox")
                    .arg(&self.config.command);
                wrapper
            }
            None => Command::new(&self.config.command),
        };
        command
            .args(args)
            .current_dir(workdir)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn spawn_error(&self, source: std::io::Error) -> SandboxError {
        SandboxError::Spawn {
            command: self.config.command.clone(),
            source,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    async fn interpret(&self, output: &Output, result_path: &Path) -> Result<ExecutionOutcome> {
        let Some(code) = output.status.code() else {
            return Ok(ExecutionOutcome::failed(
                ExecutionErrorKind::RuntimeError,
                format!(
                    "process terminated by signal ({}): {}",
                    output.status,
                    stderr_tail(output)
                ),
            ));
        };

        match code {
            0 => {}
            EXIT_SYNTAX => {
                return Ok(ExecutionOutcome::failed(
                    ExecutionErrorKind::SyntaxError,
                    stderr_tail(output),
                ))
            }
            EXIT_MISSING_ENTRY | EXIT_NOT_A_TABLE => {
                return Ok(ExecutionOutcome::failed(
                    ExecutionErrorKind::ContractViolation,
                    stderr_tail(output),
                ))
            }
            other => {
                return Ok(ExecutionOutcome::failed(
                    ExecutionErrorKind::RuntimeError,
                    format!("exit code {other}: {}", stderr_tail(output)),
                ))
            }
        }

        let size = match tokio::fs::metadata(result_path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ExecutionOutcome::failed(
                    ExecutionErrorKind::ContractViolation,
                    "entry point produced no table",
                ))
            }
            Err(e) => return Err(e.into()),
        };
        if size > self.config.max_output_bytes {
            return Ok(ExecutionOutcome::failed(
                ExecutionErrorKind::RuntimeError,
                format!(
                    "result is {size} bytes, over the {} byte limit",
                    self.config.max_output_bytes
                ),
            ));
        }

        let bytes = tokio::fs::read(result_path).await?;
        let parsed = serde_json::from_slice::<serde_json::Value>(&bytes)
            .map_err(|e| e.to_string())
            .and_then(|value| Table::from_json(&value).map_err(|e| e.to_string()));

        Ok(match parsed {
            Ok(table) => ExecutionOutcome::Ok { table },
            Err(reason) => ExecutionOutcome::failed(
                ExecutionErrorKind::ContractViolation,
                format!("entry point did not return a table: {reason}"),
            ),
        })
    }
}

#[async_trait]
impl Executor for Sandbox {
    async fn execute(
        &self,
        program: &CandidateProgram,
        source: &Path,
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<ExecutionOutcome> {
        self.run(program, source, output, cancel).await
    }
}

/// Child output held by the host. Each stream keeps at most `limit` bytes.
struct Captured {
    output: Output,
    overflowed: bool,
}

async fn collect(child: &mut Child, limit: u64) -> std::io::Result<Captured> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (status, (stdout, stdout_over), (stderr, stderr_over)) = tokio::try_join!(
        child.wait(),
        read_capped(stdout, limit),
        read_capped(stderr, limit),
    )?;
    Ok(Captured {
        output: Output {
            status,
            stdout,
            stderr,
        },
        overflowed: stdout_over || stderr_over,
    })
}

/// Keep the first `limit` bytes and drain the rest so the child never
/// blocks on a full pipe.
async fn read_capped<R>(stream: Option<R>, limit: u64) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let Some(mut stream) = stream else {
        return Ok((Vec::new(), false));
    };
    let mut kept = Vec::new();
    (&mut stream).take(limit).read_to_end(&mut kept).await?;
    let dropped = tokio::io::copy(&mut stream, &mut tokio::io::sink()).await?;
    Ok((kept, dropped > 0))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

fn stderr_tail(output: &Output) -> String {
    let text = String::from_utf8_lossy(&output.stderr);
    let text = text.trim();
    let count = text.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - STDERR_TAIL_CHARS).collect();
    format!("...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_extension_rejected() {
        let config = SandboxConfig {
            extension: "rb".to_string(),
            ..SandboxConfig::default()
        };
        assert!(matches!(
            Sandbox::new(config),
            Err(SandboxError::UnsupportedRuntime(_))
        ));
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = ExecutionOutcome::failed(ExecutionErrorKind::ContractViolation, "nope");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "ContractViolation");
        assert!(!outcome.is_ok());
    }

    #[tokio::test]
    async fn test_read_capped_keeps_prefix_and_flags_overflow() {
        let data: &[u8] = b"0123456789";
        let (kept, over) = read_capped(Some(data), 4).await.unwrap();
        assert_eq!(kept, b"0123");
        assert!(over);

        let (kept, over) = read_capped(Some(data), 64).await.unwrap();
        assert_eq!(kept, data);
        assert!(!over);
    }
}
