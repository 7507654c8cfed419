//! `dccproc` subprocess transport.
//!
//! The message is written to a temporary file which becomes the child's
//! stdin; the child's stdout carries the header. Nothing is ever written to
//! a pipe connected to the live child.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::{decode_line, RawResponse, Transport, TransportError, TransportKind};
use crate::check::CheckRequest;

/// `dccproc` flag that prints only the `X-DCC` header.
pub const HEADER_ONLY_FLAG: &str = "-H";

/// Error type for backend launch failures.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The executable was not found.
    #[error("Backend executable not found")]
    NotFound,
    /// Permission denied when spawning.
    #[error("Permission denied")]
    PermissionDenied,
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(err),
        }
    }
}

/// Runs `dccproc` once per query.
#[derive(Debug, Clone)]
pub struct ProcessTransport {
    executable: PathBuf,
    options: String,
}

impl ProcessTransport {
    /// Create a transport for `executable` with an already validated option
    /// string.
    #[must_use]
    pub fn new<P: AsRef<Path>>(executable: P, options: impl Into<String>) -> Self {
        Self {
            executable: executable.as_ref().to_path_buf(),
            options: options.into(),
        }
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    #[must_use]
    pub fn options(&self) -> &str {
        &self.options
    }

    /// Build the command-line arguments.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = self
            .options
            .split_whitespace()
            .map(str::to_string)
            .collect();
        args.push(HEADER_ONLY_FLAG.to_string());
        args
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Process
    }

    async fn query(&self, request: &CheckRequest) -> Result<RawResponse, TransportError> {
        // Removed from disk when dropped, on every exit path.
        let artifact = tempfile::Builder::new()
            .prefix("dcc-check-")
            .tempfile()
            .map_err(TransportError::Artifact)?;
        tokio::fs::write(artifact.path(), request.message())
            .await
            .map_err(TransportError::Artifact)?;
        let input = artifact.reopen().map_err(TransportError::Artifact)?;

        let mut child = Command::new(&self.executable)
            .args(self.build_args())
            .stdin(Stdio::from(input))
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(SpawnError::from_io)?;

        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Read(std::io::Error::other("child stdout not captured"))
        })?;
        let mut reader = BufReader::new(stdout);
        let mut lines = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(TransportError::Read)?;
            if n == 0 {
                break;
            }
            lines.push(decode_line(&buf));
        }

        let status = child.wait().await.map_err(TransportError::Read)?;
        tracing::trace!(
            executable = %self.executable.display(),
            status = %status,
            lines = lines.len(),
            "dccproc finished"
        );

        if lines.is_empty() {
            return Err(TransportError::EmptyOutput);
        }
        Ok(lines)
    }
}
