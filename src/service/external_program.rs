use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::AppError;

/// Outcome of an external process that has exited, whatever the exit code.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Handle to a launched external process. The receiver is fulfilled exactly
/// once, from a background task, when the process exits.
#[derive(Debug)]
pub struct Execution {
    pub pid: u32,
    pub done: oneshot::Receiver<ExecutionResult>,
}

/// Launches external programs without blocking the caller beyond spawn
/// confirmation. Injected as a trait so tests can complete synchronously.
#[async_trait::async_trait]
pub trait ExternalProgramService: Send + Sync {
    /// Spawn `cmd` (program followed by its arguments). Returns as soon as
    /// the OS confirms process creation; a spawn failure is reported
    /// synchronously as [`AppError::Launch`] and the receiver is never used.
    async fn start(&self, cmd: &[String]) -> Result<Execution, AppError>;
}

#[derive(Debug, Default)]
pub struct TokioProcessRunner;

#[async_trait::async_trait]
impl ExternalProgramService for TokioProcessRunner {
    async fn start(&self, cmd: &[String]) -> Result<Execution, AppError> {
        let (program, args) = cmd
            .split_first()
            .ok_or_else(|| AppError::Launch("empty command line".to_string()))?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AppError::Launch(format!("{program}: {e}")))?;

        let pid = child
            .id()
            .ok_or_else(|| AppError::Launch(format!("{program}: exited before pid was read")))?;

        let (tx, rx) = oneshot::channel();
        let program = program.clone();
        tokio::spawn(async move {
            let result = match child.wait_with_output().await {
                Ok(output) => ExecutionResult {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                },
                Err(e) => ExecutionResult {
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: e.to_string(),
                },
            };
            debug!(%program, pid, exit_code = result.exit_code, "external process exited");
            // The receiver may be gone if nobody cares about the outcome.
            let _ = tx.send(result);
        });

        Ok(Execution { pid, done: rx })
    }
}
