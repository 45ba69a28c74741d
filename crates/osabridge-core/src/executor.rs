//! OSA interpreter execution with timeout and output limits

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::guard::{self, GuardError};
use crate::script::ScriptProgram;

pub const TRUNCATION_MARKER: &str = "... (truncated)";

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("script blocked by policy: {0}")]
    Blocked(#[from] GuardError),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("script execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("script failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Interpreter binary, looked up on PATH
    pub interpreter: String,
    pub default_timeout: Duration,
    /// Locate / click / focus operations
    pub element_timeout: Duration,
    /// Ceiling for caller-requested timeouts
    pub max_timeout: Duration,
    pub max_stdout_chars: usize,
    pub max_stderr_chars: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            interpreter: "osascript".to_string(),
            default_timeout: Duration::from_secs(10),
            element_timeout: Duration::from_secs(5),
            max_timeout: Duration::from_secs(30),
            max_stdout_chars: 5000,
            max_stderr_chars: 1000,
        }
    }
}

/// Raw result of a finished process
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Process-spawn capability. Arguments are passed as a vector, never through a shell.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `program` to completion. Expiry of `timeout` kills the child and
    /// yields [`ExecError::Timeout`].
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<ProcessOutput, ExecError>;
}

/// [`ProcessRunner`] backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("Failed to read child pipe: {}", e);
        }
    }
    buf
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<ProcessOutput, ExecError> {
        let spawn_err = |source: std::io::Error| ExecError::Spawn {
            program: program.to_string(),
            source,
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        let mut stdout = tokio::spawn(read_pipe(child.stdout.take()));
        let mut stderr = tokio::spawn(read_pipe(child.stderr.take()));

        // pipes stay open while any descendant holds them, so they share the deadline
        let finished = tokio::time::timeout(timeout, async {
            let status = child.wait().await?;
            let out = (&mut stdout).await.unwrap_or_default();
            let err = (&mut stderr).await.unwrap_or_default();
            Ok::<_, std::io::Error>((status, out, err))
        })
        .await;

        match finished {
            Ok(Ok((status, stdout, stderr))) => Ok(ProcessOutput {
                success: status.success(),
                code: status.code(),
                stdout,
                stderr,
            }),
            Ok(Err(e)) => Err(spawn_err(e)),
            Err(_) => {
                // kill() also reaps the child
                if !matches!(child.try_wait(), Ok(Some(_)))
                    && let Err(e) = child.kill().await
                {
                    warn!("Failed to kill timed out {}: {}", program, e);
                }
                stdout.abort();
                stderr.abort();
                Err(ExecError::Timeout(timeout))
            }
        }
    }
}

/// Result of one interpreter run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub succeeded: bool,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    /// Limit the run was held to
    pub timeout: Duration,
}

impl ExecutionOutcome {
    /// Trimmed stdout on success, otherwise the matching error.
    pub fn into_output(self) -> Result<String, ExecError> {
        if self.timed_out {
            Err(ExecError::Timeout(self.timeout))
        } else if self.succeeded {
            Ok(self.stdout)
        } else {
            Err(ExecError::Failed(self.stderr))
        }
    }
}

/// Cut `text` to `max_chars` characters, appending [`TRUNCATION_MARKER`] when shortened.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}{}", &text[..idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

pub struct ScriptExecutor {
    config: ExecutorConfig,
    runner: Arc<dyn ProcessRunner>,
}

impl ScriptExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self::with_runner(config, Arc::new(TokioProcessRunner))
    }

    pub fn with_runner(config: ExecutorConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn runner(&self) -> &Arc<dyn ProcessRunner> {
        &self.runner
    }

    /// Run `program` under `timeout` (capped at the configured ceiling).
    ///
    /// Programs containing a shell invocation are refused before anything is spawned.
    pub async fn run(&self, program: &ScriptProgram, timeout: Duration) -> Result<ExecutionOutcome, ExecError> {
        guard::check_no_shell(program.source())?;

        let timeout = timeout.min(self.config.max_timeout);
        let mut args: Vec<String> = program
            .dialect()
            .interpreter_args()
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push("-e".to_string());
        args.push(program.source().to_string());

        debug!(
            "Running {} program ({} bytes, timeout {:?})",
            program.dialect(),
            program.len(),
            timeout
        );

        match self.runner.run(&self.config.interpreter, &args, timeout).await {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !output.success {
                    debug!("{} program exited with {:?}", program.dialect(), output.code);
                }
                Ok(ExecutionOutcome {
                    succeeded: output.success,
                    stdout: truncate(stdout.trim(), self.config.max_stdout_chars),
                    stderr: truncate(stderr.trim(), self.config.max_stderr_chars),
                    timed_out: false,
                    timeout,
                })
            }
            Err(ExecError::Timeout(limit)) => {
                warn!("{} program timed out after {:?}", program.dialect(), limit);
                Ok(ExecutionOutcome {
                    succeeded: false,
                    stdout: String::new(),
                    stderr: String::new(),
                    timed_out: true,
                    timeout: limit,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn run_default(&self, program: &ScriptProgram) -> Result<ExecutionOutcome, ExecError> {
        self.run(program, self.config.default_timeout).await
    }

    pub async fn run_element(&self, program: &ScriptProgram) -> Result<ExecutionOutcome, ExecError> {
        self.run(program, self.config.element_timeout).await
    }
}
