//! Verdict types returned to callers.

use serde::{Deserialize, Serialize};

/// Count the backend reports for fully confirmed bulk content ("many").
pub const MANY: u64 = 999_999;

/// Default value for every threshold.
pub const DEFAULT_THRESHOLD: u64 = MANY;

/// Counters extracted from one backend response header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedVerdict {
    /// Label between `X-DCC-` and `-Metrics`, empty when absent.
    pub backend_label: String,
    /// Unfolded header value as the backend sent it.
    pub raw_metrics: String,
    pub body_count: u64,
    pub fuzzy1_count: u64,
    pub fuzzy2_count: u64,
}

/// Per-checksum hit thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub body_max: u64,
    pub fuzzy1_max: u64,
    pub fuzzy2_max: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            body_max: DEFAULT_THRESHOLD,
            fuzzy1_max: DEFAULT_THRESHOLD,
            fuzzy2_max: DEFAULT_THRESHOLD,
        }
    }
}

impl Thresholds {
    /// Returns true if any counter meets or exceeds its threshold.
    #[must_use]
    pub fn is_hit(&self, verdict: &ParsedVerdict) -> bool {
        verdict.body_count >= self.body_max
            || verdict.fuzzy1_count >= self.fuzzy1_max
            || verdict.fuzzy2_count >= self.fuzzy2_max
    }
}

/// Why a check produced no verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndeterminateReason {
    Timeout,
    TransportUnavailable,
    MalformedResponse,
    EmptyInput,
    AlreadyTaggedUpstream,
}

impl std::fmt::Display for IndeterminateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::TransportUnavailable => "transport unavailable",
            Self::MalformedResponse => "malformed response",
            Self::EmptyInput => "empty input",
            Self::AlreadyTaggedUpstream => "already tagged upstream",
        };
        f.write_str(s)
    }
}

/// Result of one reputation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// At least one counter reached its threshold.
    Hit(ParsedVerdict),
    /// The backend answered but no counter reached its threshold.
    Miss(ParsedVerdict),
    /// No verdict could be obtained.
    Indeterminate(IndeterminateReason),
}

impl CheckOutcome {
    #[must_use]
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    /// The parsed verdict, if the backend (or an upstream marker) produced one.
    #[must_use]
    pub fn verdict(&self) -> Option<&ParsedVerdict> {
        match self {
            Self::Hit(v) | Self::Miss(v) => Some(v),
            Self::Indeterminate(_) => None,
        }
    }

    /// Diagnostic tags for report headers. Unset on indeterminate outcomes.
    #[must_use]
    pub fn tags(&self) -> Option<ReportTags> {
        self.verdict().map(|v| ReportTags {
            label: v.backend_label.clone(),
            metrics: v.raw_metrics.clone(),
        })
    }
}

/// Backend label and raw metrics, as attached to report headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTags {
    pub label: String,
    pub metrics: String,
}

impl ReportTags {
    /// Name of the conventional report header.
    #[must_use]
    pub fn header_name(&self) -> String {
        if self.label.is_empty() {
            "X-DCC-Metrics".to_string()
        } else {
            format!("X-DCC-{}-Metrics", self.label)
        }
    }

    /// Full report header line, without terminator.
    #[must_use]
    pub fn header_line(&self) -> String {
        format!("{}: {}", self.header_name(), self.metrics)
    }
}
