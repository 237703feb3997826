//! Running the external CLI.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{program} not found; install and configure it")]
    NotFound { program: String },
    #[error("{program} timed out after {}s", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput, RunError>;
}

/// Spawns real processes. The child is killed if the timeout fires.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput, RunError> {
        tracing::debug!(program, args = args.len(), timeout_secs = timeout.as_secs(), "running command");
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => RunError::NotFound { program: program.to_string() },
                _ => RunError::Io { program: program.to_string(), source },
            })?;
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(out)) => Ok(CommandOutput {
                status: out.status.code(),
                stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            }),
            Ok(Err(source)) => Err(RunError::Io { program: program.to_string(), source }),
            Err(_) => Err(RunError::TimedOut { program: program.to_string(), timeout }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_not_found() {
        let err = ProcessRunner
            .run("scanledger-no-such-binary", &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::NotFound { .. }));
    }

    #[test]
    fn only_zero_exit_is_success() {
        assert!(CommandOutput { status: Some(0), ..Default::default() }.success());
        assert!(!CommandOutput { status: Some(1), ..Default::default() }.success());
        assert!(!CommandOutput { status: None, ..Default::default() }.success());
    }
}
