//! External command execution
//!
//! The compressor and the uploader are external programs. Both run through
//! [`CommandRunner`] so tests can script their results without spawning
//! processes.

pub mod compressor;
pub mod uploader;

use crate::domain::{CourierError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub use compressor::ArchiveCompressor;
pub use uploader::FileSenderUploader;

/// Exit code conventionally returned by `timeout(1)`
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Placeholder written in place of sensitive arguments
const REDACTED: &str = "***";

/// A program invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    /// Substrings masked when the command line is rendered for logs
    pub sensitive: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
            sensitive: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Mark a value that must never appear in logs
    pub fn sensitive(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.sensitive.push(value);
        }
        self
    }

    /// Command line with sensitive values masked
    pub fn display_line(&self) -> String {
        let mut line = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        for secret in &self.sensitive {
            line = line.replace(secret.as_str(), REDACTED);
        }
        line
    }
}

/// Result of one finished (or killed) invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Set when the runner killed the process after `timeout`
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Killed by the runner, or exited with the `timeout(1)` code
    pub fn is_timeout(&self) -> bool {
        self.timed_out || self.exit_code == Some(TIMEOUT_EXIT_CODE)
    }

    /// First `n` lines of stdout followed by stderr
    pub fn head(&self, n: usize) -> String {
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .take(n)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs external programs
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion or until `spec.timeout` elapses.
    ///
    /// Errors only when the program cannot be started.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// [`CommandRunner`] backed by `tokio::process`
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CourierError::Io(format!("Failed to execute {}: {e}", spec.program))
            })?;

        match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                timed_out: false,
            }),
            Ok(Err(e)) => Err(CourierError::Io(format!(
                "Failed to collect output of {}: {e}",
                spec.program
            ))),
            // dropping the future kills the child
            Err(_) => {
                tracing::warn!(
                    command = %spec.display_line(),
                    timeout_secs = spec.timeout.as_secs(),
                    "Command timed out and was killed"
                );
                Ok(CommandOutput {
                    exit_code: None,
                    timed_out: true,
                    ..CommandOutput::default()
                })
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_line_masks_sensitive_values() {
        let spec = CommandSpec::new("7z", Duration::from_secs(5))
            .args(["a", "-psecret42", "out.zip"])
            .sensitive("secret42");
        assert_eq!(spec.display_line(), "7z a -p*** out.zip");
    }

    #[test]
    fn test_output_classification() {
        let ok = CommandOutput {
            exit_code: Some(0),
            ..Default::default()
        };
        assert!(ok.success());
        assert!(!ok.is_timeout());

        let wrapped_timeout = CommandOutput {
            exit_code: Some(TIMEOUT_EXIT_CODE),
            ..Default::default()
        };
        assert!(!wrapped_timeout.success());
        assert!(wrapped_timeout.is_timeout());

        let killed = CommandOutput {
            timed_out: true,
            ..Default::default()
        };
        assert!(killed.is_timeout());
    }

    #[test]
    fn test_head_limits_lines() {
        let output = CommandOutput {
            exit_code: Some(1),
            stdout: (1..=30).map(|i| format!("line {i}\n")).collect(),
            stderr: "boom".to_string(),
            timed_out: false,
        };
        let head = output.head(20);
        assert_eq!(head.lines().count(), 20);
        assert!(head.starts_with("line 1\n"));
        assert!(!head.contains("boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_captures_exit_code() {
        let spec = CommandSpec::new("sh", Duration::from_secs(5))
            .args(["-c", "echo hello; exit 3"]);
        let output = ProcessRunner.run(&spec).await.unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "hello");
        assert!(!output.timed_out);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_kills_on_timeout() {
        let spec = CommandSpec::new("sh", Duration::from_millis(100)).args(["-c", "sleep 5"]);
        let output = ProcessRunner.run(&spec).await.unwrap();
        assert!(output.timed_out);
        assert!(output.is_timeout());
    }

    #[tokio::test]
    async fn test_process_runner_missing_program() {
        let spec = CommandSpec::new("/nonexistent/courier-test-binary", Duration::from_secs(1));
        assert!(ProcessRunner.run(&spec).await.is_err());
    }
}
