//! External file-sharing uploader invocation

use super::{CommandRunner, CommandSpec};
use crate::config::UploaderConfig;
use crate::domain::{PipelineError, Result};
use secrecy::ExposeSecret;
use std::path::Path;
use std::sync::Arc;

/// Lines of uploader output kept in failure logs
const OUTPUT_HEAD_LINES: usize = 20;

/// Hands one artifact to the file-sharing service for a set of recipients
///
/// The command line is
/// `<program> <args..> <file> --recipients <a,b> [-u <user>] [-a <key>]`.
pub struct FileSenderUploader {
    config: UploaderConfig,
    runner: Arc<dyn CommandRunner>,
}

impl FileSenderUploader {
    pub fn new(config: UploaderConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Account the uploader authenticates as
    pub fn username(&self) -> Option<&str> {
        self.config.username.as_deref()
    }

    pub fn command(&self, file: &Path, recipients: &[String]) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.config.program, self.config.timeout())
            .args(self.config.args.iter().cloned())
            .arg(file.to_string_lossy())
            .arg("--recipients")
            .arg(recipients.join(","));

        if let Some(username) = &self.config.username {
            spec = spec.arg("-u").arg(username.as_str());
        }
        if let Some(api_key) = &self.config.api_key {
            let key = api_key.expose_secret().as_str();
            spec = spec.arg("-a").arg(key).sensitive(key);
        }
        spec
    }

    /// Upload `file` for `recipients`; success only on exit code 0
    pub async fn upload(&self, file: &Path, recipients: &[String]) -> Result<()> {
        let spec = self.command(file, recipients);
        tracing::info!(
            file = %file.display(),
            recipients = recipients.len(),
            "Starting upload"
        );

        let output = self.runner.run(&spec).await.map_err(|e| {
            PipelineError::UploadFailed(format!("cannot start {}: {e}", self.config.program))
        })?;

        if output.success() {
            tracing::info!(file = %file.display(), "Upload completed");
            return Ok(());
        }

        if output.is_timeout() {
            tracing::error!(
                file = %file.display(),
                timeout_secs = self.config.timeout_seconds,
                "Upload timed out"
            );
            return Err(PipelineError::UploadFailed(format!(
                "timed out after {}s",
                self.config.timeout_seconds
            ))
            .into());
        }

        let mut head = output.head(OUTPUT_HEAD_LINES);
        for secret in &spec.sensitive {
            head = head.replace(secret.as_str(), "***");
        }
        tracing::error!(
            file = %file.display(),
            exit_code = ?output.exit_code,
            output = %head,
            "Upload failed"
        );
        Err(PipelineError::UploadFailed(format!("exit code {:?}", output.exit_code)).into())
    }
}
