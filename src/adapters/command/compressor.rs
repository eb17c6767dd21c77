//! Password-protected zip creation through a 7-Zip compatible program

use super::{CommandRunner, CommandSpec};
use crate::domain::{PipelineError, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for one compression run
const COMPRESS_TIMEOUT: Duration = Duration::from_secs(600);

/// Produces legacy ZipCrypto archives readable by stock unzip tools
pub struct ArchiveCompressor {
    program: String,
    runner: Arc<dyn CommandRunner>,
}

impl ArchiveCompressor {
    pub fn new(program: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    /// Invocation that writes `source` into a new encrypted zip at `dest`
    pub fn command(&self, source: &Path, dest: &Path, passphrase: &str) -> CommandSpec {
        CommandSpec::new(&self.program, COMPRESS_TIMEOUT)
            .args(["a", "-tzip", "-mem=ZipCrypto", "-y"])
            .arg(format!("-p{passphrase}"))
            .arg(dest.to_string_lossy())
            .arg(source.to_string_lossy())
            .sensitive(passphrase)
    }

    /// Compress and encrypt `source` into `dest`.
    ///
    /// `dest` must not exist; the tool would otherwise update it in place.
    pub async fn compress(&self, source: &Path, dest: &Path, passphrase: &str) -> Result<()> {
        let spec = self.command(source, dest, passphrase);
        tracing::debug!(command = %spec.display_line(), "Running compressor");

        let output = self.runner.run(&spec).await.map_err(|e| {
            PipelineError::EncryptionFailed(format!("cannot start {}: {e}", self.program))
        })?;

        if output.success() {
            return Ok(());
        }

        let detail = output.head(20).replace(passphrase, "***");
        if output.is_timeout() {
            return Err(PipelineError::EncryptionFailed(format!(
                "{} timed out after {}s",
                self.program,
                COMPRESS_TIMEOUT.as_secs()
            ))
            .into());
        }
        Err(PipelineError::EncryptionFailed(format!(
            "{} exited with {:?}: {detail}",
            self.program, output.exit_code
        ))
        .into())
    }
}
