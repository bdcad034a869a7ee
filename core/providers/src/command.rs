//! Subprocess runner for CLI-backed providers.

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use skm_common::{Error, Result, SecretValue};

/// Default time budget for a single CLI invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Trimmed stdout as a secret, if the command succeeded and printed
    /// anything.
    pub fn secret(&self) -> Option<SecretValue> {
        let trimmed = self.stdout.trim();
        (self.success && !trimmed.is_empty()).then(|| SecretValue::new(trimmed))
    }
}

/// Runs external programs with a timeout, capturing output.
///
/// The child is killed if the timeout elapses or the future is dropped.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check whether `program` can be found on `PATH`.
    pub fn is_installed(program: &str) -> bool {
        which::which(program).is_ok()
    }

    /// Run `program` with `args`.
    ///
    /// # Errors
    /// - Program could not be spawned (e.g. not installed)
    /// - Timeout elapsed
    ///
    /// A non-zero exit status is not an error; inspect `CommandOutput::success`.
    pub async fn run<I, S>(&self, program: &str, args: I) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| Error::Command(format!("failed to start '{}': {}", program, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "'{}' did not finish within {:?}",
                    program, self.timeout
                ))
            })?
            .map_err(|e| Error::Command(format!("'{}' failed: {}", program, e)))?;

        let result = CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(program, code = ?result.code, "Command finished");
        Ok(result)
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout() {
        let output = CommandRunner::default()
            .run("sh", ["-c", "echo '  secret-value  '"])
            .await
            .unwrap();
        assert!(output.success);
        assert_eq!(output.secret().unwrap().expose(), "secret-value");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_not_a_secret() {
        let output = CommandRunner::default()
            .run("sh", ["-c", "echo value; exit 3"])
            .await
            .unwrap();
        assert!(!output.success);
        assert_eq!(output.code, Some(3));
        assert!(output.secret().is_none());
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let result = CommandRunner::default()
            .run("skm-definitely-not-installed", ["--version"])
            .await;
        assert!(matches!(result, Err(Error::Command(_))));
    }

    #[tokio::test]
    async fn test_timeout() {
        let runner = CommandRunner::new(Duration::from_millis(50));
        let result = runner.run("sh", ["-c", "sleep 5"]).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }
}
