//! Transports that carry a check request to the DCC backend.
//!
//! Two transports speak to the same logical backend:
//!
//! - [`SocketTransport`] talks to the `dccifd` daemon over a Unix domain socket.
//! - [`ProcessTransport`] runs the `dccproc` program once per message.
//!
//! Both return the raw response lines that follow any protocol preamble; the
//! caller hands those to the response parser.

mod process;
mod socket;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::check::CheckRequest;

pub use process::{ProcessTransport, SpawnError, HEADER_ONLY_FLAG};
pub use socket::{SocketTransport, HEADER_MODE};

/// Response lines as produced by the backend, terminators stripped.
pub type RawResponse = Vec<String>;

/// Which transport a client uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// The `dccifd` socket.
    Socket,
    /// A spawned `dccproc`.
    Process,
    /// Checks are switched off in configuration.
    Disabled,
    /// Neither a socket nor an executable is usable.
    Unavailable,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Socket => "socket",
            Self::Process => "process",
            Self::Disabled => "disabled",
            Self::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// Errors from a single transport call, short of a timeout.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to backend: {0}")]
    Connect(#[source] std::io::Error),

    #[error("Failed to write request: {0}")]
    Write(#[source] std::io::Error),

    #[error("Failed to shut down write half: {0}")]
    Shutdown(#[source] std::io::Error),

    #[error("Failed to read response: {0}")]
    Read(#[source] std::io::Error),

    /// The backend closed the connection without sending a header.
    #[error("No header in backend response")]
    NoHeader,

    #[error("Failed to launch backend: {0}")]
    Spawn(#[from] SpawnError),

    #[error("Failed to prepare input file: {0}")]
    Artifact(#[source] std::io::Error),

    /// The backend program ran but printed nothing.
    #[error("Backend produced no output")]
    EmptyOutput,
}

/// A way of asking the backend about one message.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The kind of this transport, for logging.
    fn kind(&self) -> TransportKind;

    /// Send the request and collect the response lines.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] on any I/O failure or an empty response.
    async fn query(&self, request: &CheckRequest) -> Result<RawResponse, TransportError>;
}

/// Strip a trailing `\n` or `\r\n` and decode lossily.
pub(crate) fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
