use std::path::Path;
use std::process::Stdio;

use encoding_rs::GBK;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::error::{IngestError, Result};

use super::parser::{ArchiveEntry, parse_bare_listing};

/// Decoded output of one tool invocation.
#[derive(Debug)]
pub(crate) struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Wrapper over a 7z-compatible CLI binary.
#[derive(Debug, Clone)]
pub struct SevenZip {
    binary: String,
}

impl SevenZip {
    /// Resolve the binary: a configured absolute path wins when it exists,
    /// otherwise fall back to `7z` on PATH. Missing binaries surface as an
    /// error on first invocation, not here.
    pub fn new(configured: &str) -> Self {
        let binary = if configured != "7z" && Path::new(configured).exists() {
            configured.to_string()
        } else {
            "7z".to_string()
        };
        Self { binary }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    async fn run(&self, args: &[String]) -> Result<ToolOutput> {
        debug!(binary = %self.binary, ?args, "invoking archive tool");

        let output = Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| {
                IngestError::ArchiveTool(format!(
                    "failed to launch {}: {err}",
                    self.binary
                ))
            })?;

        // Some tool builds emit code-page 936 for non-ASCII names.
        let (stdout, _, _) = GBK.decode(&output.stdout);
        let (stderr, _, _) = GBK.decode(&output.stderr);

        if !output.status.success() {
            error!(
                binary = %self.binary,
                code = output.status.code().unwrap_or(-1),
                stderr = %stderr.chars().take(200).collect::<String>(),
                "archive tool exited non-zero"
            );
        }

        Ok(ToolOutput {
            success: output.status.success(),
            stdout: stdout.into_owned(),
            stderr: stderr.into_owned(),
        })
    }

    fn password_arg(password: &str) -> String {
        // `-p` with no value means "empty password"; never prompt.
        format!("-p{password}")
    }

    /// Bare listing of the archive under a candidate password.
    ///
    /// `None` means the listing failed (wrong password, damaged archive);
    /// the caller cycles to the next candidate.
    pub async fn list(&self, archive: &Path, password: &str) -> Result<Option<Vec<ArchiveEntry>>> {
        let args = vec![
            "l".to_string(),
            "-ba".to_string(),
            archive.to_string_lossy().to_string(),
            Self::password_arg(password),
        ];

        let output = self.run(&args).await?;
        if !output.success {
            return Ok(None);
        }
        Ok(Some(parse_bare_listing(&output.stdout)))
    }

    /// Full listing used for type detection; returns the raw decoded text.
    pub async fn list_verbose(&self, archive: &Path) -> Result<Option<String>> {
        let args = vec![
            "l".to_string(),
            archive.to_string_lossy().to_string(),
            Self::password_arg(""),
        ];
        let output = self.run(&args).await?;
        if !output.success {
            return Ok(None);
        }
        Ok(Some(output.stdout))
    }

    /// Extract with auto-confirm into `output_dir`. Returns whether the
    /// tool succeeded under this password.
    pub async fn extract(&self, archive: &Path, output_dir: &Path, password: &str) -> Result<bool> {
        let args = vec![
            "x".to_string(),
            "-y".to_string(),
            format!("-o{}", output_dir.to_string_lossy()),
            archive.to_string_lossy().to_string(),
            Self::password_arg(password),
        ];

        let output = self.run(&args).await?;
        if output.success {
            info!(archive = %archive.display(), "extraction succeeded");
        }
        Ok(output.success)
    }
}
