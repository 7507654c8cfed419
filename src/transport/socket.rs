//! `dccifd` Unix socket transport.
//!
//! # Protocol
//!
//! The client writes, in order:
//!
//! ```text
//! header\n                 options: report headers only, never mutate
//! <client ip>\n
//! <helo>\n
//! <envelope sender>\n
//! <recipient>\r\n ...      or a single "unknown\r\n"
//! \n                       end of recipients
//! <raw message bytes>
//! ```
//!
//! then shuts down its write half. The daemon answers with a status line, a
//! per-recipient status line, and the `X-DCC-*-Metrics` header.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use super::{decode_line, RawResponse, Transport, TransportError, TransportKind};
use crate::check::{CheckRequest, UNKNOWN_RECIPIENT};

/// Option line selecting header-only, non-mutating mode.
pub const HEADER_MODE: &str = "header";

/// Lines the daemon sends before the header (status and multi-status).
const PREAMBLE_LINES: usize = 2;

/// Talks to `dccifd` over a Unix domain socket.
#[derive(Debug, Clone)]
pub struct SocketTransport {
    path: PathBuf,
}

impl SocketTransport {
    #[must_use]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the socket path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encode everything the client sends before the message bytes.
    #[must_use]
    pub fn encode_envelope(request: &CheckRequest) -> Vec<u8> {
        let mut out = String::new();
        for line in [
            HEADER_MODE,
            request.get_client_ip(),
            request.get_helo(),
            request.get_envelope_sender(),
        ] {
            out.push_str(line);
            out.push('\n');
        }
        if request.get_recipients().is_empty() {
            out.push_str(UNKNOWN_RECIPIENT);
            out.push_str("\r\n");
        } else {
            for rcpt in request.get_recipients() {
                out.push_str(rcpt);
                out.push_str("\r\n");
            }
        }
        out.push('\n');
        out.into_bytes()
    }
}

#[async_trait]
impl Transport for SocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    async fn query(&self, request: &CheckRequest) -> Result<RawResponse, TransportError> {
        let stream = UnixStream::connect(&self.path)
            .await
            .map_err(TransportError::Connect)?;
        let (reader, mut writer) = stream.into_split();

        writer
            .write_all(&Self::encode_envelope(request))
            .await
            .map_err(TransportError::Write)?;
        writer
            .write_all(request.message())
            .await
            .map_err(TransportError::Write)?;
        writer.shutdown().await.map_err(TransportError::Shutdown)?;

        let response = read_response(reader).await?;
        tracing::trace!(
            path = %self.path.display(),
            lines = response.len(),
            "dccifd response received"
        );
        Ok(response)
    }
}

/// Skip the preamble and collect the remaining lines until EOF.
async fn read_response<R: AsyncRead + Unpin>(reader: R) -> Result<RawResponse, TransportError> {
    let mut reader = BufReader::new(reader);
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

    if lines.len() <= PREAMBLE_LINES {
        return Err(TransportError::NoHeader);
    }
    Ok(lines.split_off(PREAMBLE_LINES))
}
