//! Check orchestration: transport selection, deadline, parsing, thresholds.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use super::deadline::{run_with_deadline, Deadline, DeadlineError};
use super::marker::find_bulk_marker;
use super::parser;
use super::{CheckOutcome, CheckRequest, IndeterminateReason, Thresholds};
use crate::config::DccConfig;
use crate::transport::{ProcessTransport, SocketTransport, Transport, TransportKind};

/// Client for bounded-time DCC checks.
///
/// The transport is resolved lazily on the first check and cached until
/// [`CheckClient::reconfigure`] is called. Concurrent first callers serialise
/// on the resolution.
pub struct CheckClient {
    config: DccConfig,
    timeout: Duration,
    kind: OnceLock<TransportKind>,
    transport: Option<Arc<dyn Transport>>,
}

impl CheckClient {
    /// Creates a client from configuration. The config should already be
    /// validated.
    #[must_use]
    pub fn new(config: DccConfig) -> Self {
        Self {
            timeout: config.timeout(),
            config,
            kind: OnceLock::new(),
            transport: None,
        }
    }

    /// Sets the deadline for each backend call.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Uses `transport` instead of probing the configured paths.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self.kind = OnceLock::new();
        self
    }

    #[must_use]
    pub fn config(&self) -> &DccConfig {
        &self.config
    }

    /// Returns the deadline for each backend call.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Replace the configuration and forget the resolved transport.
    pub fn reconfigure(&mut self, config: DccConfig) {
        self.timeout = config.timeout();
        self.config = config;
        self.kind = OnceLock::new();
    }

    /// The transport kind, resolving it on first use.
    pub fn transport_kind(&self) -> TransportKind {
        *self.kind.get_or_init(|| {
            let kind = self.resolve_kind();
            tracing::debug!(kind = %kind, "Resolved DCC transport");
            kind
        })
    }

    fn resolve_kind(&self) -> TransportKind {
        if !self.config.enabled {
            return TransportKind::Disabled;
        }
        if let Some(transport) = &self.transport {
            return transport.kind();
        }
        if is_usable_socket(&self.config.socket_path()) {
            TransportKind::Socket
        } else if is_usable_executable(&self.config.executable_path()) {
            TransportKind::Process
        } else {
            TransportKind::Unavailable
        }
    }

    fn build_transport(&self, kind: TransportKind) -> Option<Arc<dyn Transport>> {
        if matches!(kind, TransportKind::Disabled | TransportKind::Unavailable) {
            return None;
        }
        if let Some(transport) = &self.transport {
            return Some(Arc::clone(transport));
        }
        match kind {
            TransportKind::Socket => Some(Arc::new(SocketTransport::new(
                self.config.socket_path(),
            ))),
            TransportKind::Process => Some(Arc::new(ProcessTransport::new(
                self.config.executable_path(),
                self.config.dccproc_options.clone(),
            ))),
            TransportKind::Disabled | TransportKind::Unavailable => None,
        }
    }

    /// Check one message against the backend.
    ///
    /// Never fails: every error becomes [`CheckOutcome::Indeterminate`].
    pub async fn check(&self, request: &CheckRequest, thresholds: &Thresholds) -> CheckOutcome {
        if request.is_empty() {
            tracing::debug!("Empty message, skipping DCC check");
            return CheckOutcome::Indeterminate(IndeterminateReason::EmptyInput);
        }

        if let Some(verdict) = find_bulk_marker(&request.header_lines()) {
            tracing::debug!(metrics = %verdict.raw_metrics, "Upstream DCC bulk header");
            return CheckOutcome::Hit(verdict);
        }

        let kind = self.transport_kind();
        let Some(transport) = self.build_transport(kind) else {
            tracing::debug!(kind = %kind, "No DCC transport");
            return CheckOutcome::Indeterminate(IndeterminateReason::TransportUnavailable);
        };

        tracing::debug!(kind = %kind, timeout_ms = self.timeout.as_millis(), "Querying DCC");
        let lines = match run_with_deadline(self.timeout, transport.query(request)).await {
            Deadline::Completed(lines) => lines,
            Deadline::TimedOut => {
                tracing::warn!(
                    kind = %kind,
                    timeout_ms = self.timeout.as_millis(),
                    "DCC check timed out"
                );
                return CheckOutcome::Indeterminate(IndeterminateReason::Timeout);
            }
            Deadline::Failed(DeadlineError::Operation(e)) => {
                tracing::warn!(kind = %kind, error = %e, "DCC transport failed");
                return CheckOutcome::Indeterminate(IndeterminateReason::TransportUnavailable);
            }
            Deadline::Failed(e) => {
                tracing::warn!(error = %e, "DCC deadline could not be applied");
                return CheckOutcome::Indeterminate(IndeterminateReason::TransportUnavailable);
            }
        };

        let verdict = match parser::parse(&lines) {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "Malformed DCC response");
                return CheckOutcome::Indeterminate(IndeterminateReason::MalformedResponse);
            }
        };

        let hit = thresholds.is_hit(&verdict);
        tracing::info!(
            label = %verdict.backend_label,
            body = verdict.body_count,
            fuz1 = verdict.fuzzy1_count,
            fuz2 = verdict.fuzzy2_count,
            hit,
            "DCC verdict"
        );
        if hit {
            CheckOutcome::Hit(verdict)
        } else {
            CheckOutcome::Miss(verdict)
        }
    }
}

impl fmt::Debug for CheckClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckClient")
            .field("config", &self.config)
            .field("timeout", &self.timeout)
            .field("kind", &self.kind.get())
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

fn is_usable_socket(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;

    std::fs::metadata(path).is_ok_and(|m| m.file_type().is_socket())
}

fn is_usable_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::transport::{RawResponse, TransportError};

    /// Transport that replays a canned response and counts calls.
    struct FakeTransport {
        response: Result<Vec<&'static str>, ()>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FakeTransport {
        fn replying(lines: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(lines.to_vec()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                response: Err(()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn stalling() -> Arc<Self> {
            Arc::new(Self {
                response: Ok(vec!["X-DCC-home-Metrics: Body=1"]),
                delay: Duration::from_secs(30),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Socket
        }

        async fn query(&self, _request: &CheckRequest) -> Result<RawResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match &self.response {
                Ok(lines) => Ok(lines.iter().map(|l| (*l).to_string()).collect()),
                Err(()) => Err(TransportError::NoHeader),
            }
        }
    }

    fn client_with(transport: Arc<FakeTransport>) -> CheckClient {
        CheckClient::new(DccConfig::default()).with_transport(transport)
    }

    fn message() -> CheckRequest {
        CheckRequest::new("From: a@example.com\nSubject: hi\n\nhello\n")
    }

    #[test]
    fn test_client_new_uses_config_timeout() {
        let config = DccConfig {
            timeout_secs: 3,
            ..Default::default()
        };
        let client = CheckClient::new(config);
        assert_eq!(client.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_client_with_timeout_sets_timeout() {
        let client = CheckClient::new(DccConfig::default()).with_timeout(Duration::from_millis(5));
        assert_eq!(client.timeout(), Duration::from_millis(5));
    }

    #[test]
    fn test_disabled_config_resolves_disabled() {
        let config = DccConfig {
            enabled: false,
            ..Default::default()
        };
        let client = CheckClient::new(config).with_transport(FakeTransport::failing());
        assert_eq!(client.transport_kind(), TransportKind::Disabled);
    }

    #[test]
    fn test_missing_paths_resolve_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = DccConfig {
            home: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert_eq!(
            CheckClient::new(config).transport_kind(),
            TransportKind::Unavailable
        );
    }

    #[test]
    fn test_non_executable_file_is_not_usable() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("dccproc");
        std::fs::write(&exe, "#!/bin/sh\n").unwrap();
        assert!(!is_usable_executable(&exe));
        assert!(!is_usable_socket(&exe));
    }

    #[test]
    fn test_reconfigure_clears_cached_kind() {
        let dir = tempfile::tempdir().unwrap();
        let config = DccConfig {
            home: dir.path().to_path_buf(),
            ..Default::default()
        };
        let mut client = CheckClient::new(config.clone());
        assert_eq!(client.transport_kind(), TransportKind::Unavailable);

        client.reconfigure(DccConfig {
            enabled: false,
            ..config
        });
        assert_eq!(client.transport_kind(), TransportKind::Disabled);
    }

    #[tokio::test]
    async fn test_empty_input_never_contacts_backend() {
        let transport = FakeTransport::replying(&["X-DCC-home-Metrics: Body=1"]);
        let client = client_with(Arc::clone(&transport));
        let outcome = client
            .check(&CheckRequest::new(Vec::new()), &Thresholds::default())
            .await;
        assert_eq!(
            outcome,
            CheckOutcome::Indeterminate(IndeterminateReason::EmptyInput)
        );
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_upstream_bulk_marker_short_circuits() {
        let transport = FakeTransport::failing();
        let client = client_with(Arc::clone(&transport));
        let request = CheckRequest::new(
            "X-DCC-relay-Metrics: mx 1201; bulk Body=many Fuz1=many\nSubject: x\n\nbody\n",
        );
        let outcome = client.check(&request, &Thresholds::default()).await;
        let CheckOutcome::Hit(verdict) = outcome else {
            panic!("expected hit, got {outcome:?}");
        };
        assert_eq!(verdict.backend_label, "relay");
        assert_eq!(verdict.raw_metrics, "mx 1201; bulk Body=many Fuz1=many");
        assert_eq!(verdict.body_count, 999_999);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_non_metrics_dcc_header_reaches_backend() {
        let transport = FakeTransport::replying(&["X-DCC-home-Metrics: Body=1000000 Fuz1=2 Fuz2=1"]);
        let client = client_with(Arc::clone(&transport));
        let request = CheckRequest::new("X-DCC-Note: bulk mail list\nSubject: x\n\nbody\n");
        let outcome = client.check(&request, &Thresholds::default()).await;
        let CheckOutcome::Hit(verdict) = outcome else {
            panic!("expected hit, got {outcome:?}");
        };
        assert_eq!(verdict.backend_label, "home");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_lowercase_marker_reaches_backend() {
        let transport = FakeTransport::replying(&["X-DCC-home-Metrics: Body=3"]);
        let client = client_with(Arc::clone(&transport));
        let request =
            CheckRequest::new("x-dcc-relay-metrics: mx 1; bulk Body=many\n\nbody\n");
        let outcome = client.check(&request, &Thresholds::default()).await;
        let CheckOutcome::Miss(verdict) = outcome else {
            panic!("expected miss, got {outcome:?}");
        };
        assert_eq!(verdict.backend_label, "home");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_marker_in_body_is_ignored() {
        let transport = FakeTransport::replying(&["X-DCC-home-Metrics: Body=1"]);
        let client = client_with(Arc::clone(&transport));
        let request = CheckRequest::new("Subject: x\n\nX-DCC-relay-Metrics: bulk\n");
        let outcome = client.check(&request, &Thresholds::default()).await;
        assert!(matches!(outcome, CheckOutcome::Miss(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_counts_over_threshold_are_hit() {
        let transport = FakeTransport::replying(&["X-DCC-home-Metrics: Body=1000000 Fuz1=2 Fuz2=1"]);
        let outcome = client_with(transport)
            .check(&message(), &Thresholds::default())
            .await;
        let tags = outcome.tags().unwrap();
        assert!(outcome.is_hit());
        assert_eq!(tags.label, "home");
        assert_eq!(tags.metrics, "Body=1000000 Fuz1=2 Fuz2=1");
    }

    #[tokio::test]
    async fn test_counts_under_threshold_are_miss() {
        let transport = FakeTransport::replying(&["X-DCC-home-Metrics: Body=10 Fuz1=2 Fuz2=1"]);
        let outcome = client_with(transport)
            .check(&message(), &Thresholds::default())
            .await;
        assert!(matches!(outcome, CheckOutcome::Miss(_)));
        assert!(outcome.tags().is_some());
    }

    #[tokio::test]
    async fn test_malformed_response_is_indeterminate() {
        let transport = FakeTransport::replying(&["550 go away"]);
        let outcome = client_with(transport)
            .check(&message(), &Thresholds::default())
            .await;
        assert_eq!(
            outcome,
            CheckOutcome::Indeterminate(IndeterminateReason::MalformedResponse)
        );
        assert!(outcome.tags().is_none());
    }

    #[tokio::test]
    async fn test_transport_error_is_unavailable() {
        let outcome = client_with(FakeTransport::failing())
            .check(&message(), &Thresholds::default())
            .await;
        assert_eq!(
            outcome,
            CheckOutcome::Indeterminate(IndeterminateReason::TransportUnavailable)
        );
    }

    #[tokio::test]
    async fn test_slow_transport_times_out() {
        let client = client_with(FakeTransport::stalling()).with_timeout(Duration::from_millis(50));
        let start = std::time::Instant::now();
        let outcome = client.check(&message(), &Thresholds::default()).await;
        assert_eq!(
            outcome,
            CheckOutcome::Indeterminate(IndeterminateReason::Timeout)
        );
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_disabled_client_is_unavailable() {
        let transport = FakeTransport::replying(&["X-DCC-home-Metrics: Body=1"]);
        let config = DccConfig {
            enabled: false,
            ..Default::default()
        };
        let client = CheckClient::new(config).with_transport(Arc::clone(&transport) as Arc<dyn Transport>);
        let outcome = client.check(&message(), &Thresholds::default()).await;
        assert_eq!(
            outcome,
            CheckOutcome::Indeterminate(IndeterminateReason::TransportUnavailable)
        );
        assert_eq!(transport.calls(), 0);
    }
}
