//! Per-message check request.

/// Client address reported when the connecting host is unknown.
pub const UNKNOWN_CLIENT_IP: &str = "0.0.0.0";

/// Recipient line sent to the backend when no envelope recipients are known.
pub const UNKNOWN_RECIPIENT: &str = "unknown";

/// Immutable input for a single reputation check.
///
/// A request is built fresh for every message and never mutated once built;
/// the builder-style setters consume and return `self`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    message: Vec<u8>,
    client_ip: String,
    helo: String,
    envelope_sender: String,
    recipients: Vec<String>,
}

impl CheckRequest {
    /// Create a request for the given raw message bytes.
    #[must_use]
    pub fn new(message: impl Into<Vec<u8>>) -> Self {
        Self {
            message: message.into(),
            client_ip: UNKNOWN_CLIENT_IP.to_string(),
            helo: String::new(),
            envelope_sender: String::new(),
            recipients: Vec::new(),
        }
    }

    /// Set the connecting client's IP address.
    ///
    /// An empty value falls back to [`UNKNOWN_CLIENT_IP`].
    #[must_use]
    pub fn client_ip(mut self, ip: impl Into<String>) -> Self {
        let ip = ip.into();
        self.client_ip = if ip.is_empty() {
            UNKNOWN_CLIENT_IP.to_string()
        } else {
            ip
        };
        self
    }

    /// Set the HELO/EHLO value announced by the client.
    #[must_use]
    pub fn helo(mut self, helo: impl Into<String>) -> Self {
        self.helo = helo.into();
        self
    }

    /// Set the envelope sender (`MAIL FROM`).
    #[must_use]
    pub fn envelope_sender(mut self, sender: impl Into<String>) -> Self {
        self.envelope_sender = sender.into();
        self
    }

    /// Append an envelope recipient.
    #[must_use]
    pub fn recipient(mut self, rcpt: impl Into<String>) -> Self {
        self.recipients.push(rcpt.into());
        self
    }

    /// Replace the envelope recipients.
    #[must_use]
    pub fn recipients<I, S>(mut self, rcpts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipients = rcpts.into_iter().map(Into::into).collect();
        self
    }

    /// Raw message bytes, headers and body.
    #[must_use]
    pub fn message(&self) -> &[u8] {
        &self.message
    }

    #[must_use]
    pub fn get_client_ip(&self) -> &str {
        &self.client_ip
    }

    #[must_use]
    pub fn get_helo(&self) -> &str {
        &self.helo
    }

    #[must_use]
    pub fn get_envelope_sender(&self) -> &str {
        &self.envelope_sender
    }

    #[must_use]
    pub fn get_recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Returns true when there is no message to check.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.message.is_empty()
    }

    /// The header section of the message, up to the first blank line.
    ///
    /// Lines are decoded lossily and returned without their terminators.
    #[must_use]
    pub fn header_lines(&self) -> Vec<String> {
        self.message
            .split(|&b| b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .take_while(|line| !line.is_empty())
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }
}
