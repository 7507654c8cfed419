//! Configuration types.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::check::Thresholds;

use super::ConfigError;

static OPTIONS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z -]+$").expect("dccproc options regex"));

/// Configuration for DCC checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DccConfig {
    /// Run checks at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Deadline for one backend call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// DCC home directory; other paths default relative to it.
    #[serde(default = "default_home")]
    pub home: PathBuf,
    /// `dccifd` socket path. Defaults to `<home>/dccifd`.
    #[serde(default)]
    pub dccifd_path: Option<PathBuf>,
    /// `dccproc` executable path. Defaults to `<home>/bin/dccproc`.
    #[serde(default)]
    pub dccproc_path: Option<PathBuf>,
    /// Extra `dccproc` options. Only capital letters, spaces and hyphens.
    #[serde(default = "default_dccproc_options")]
    pub dccproc_options: String,
    #[serde(default)]
    pub thresholds: Thresholds,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_home() -> PathBuf {
    PathBuf::from("/var/dcc")
}

fn default_dccproc_options() -> String {
    "-R".to_string()
}

impl Default for DccConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            timeout_secs: default_timeout_secs(),
            home: default_home(),
            dccifd_path: None,
            dccproc_path: None,
            dccproc_options: default_dccproc_options(),
            thresholds: Thresholds::default(),
        }
    }
}

impl DccConfig {
    /// Effective `dccifd` socket path.
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.dccifd_path
            .clone()
            .unwrap_or_else(|| self.home.join("dccifd"))
    }

    /// Effective `dccproc` executable path.
    #[must_use]
    pub fn executable_path(&self) -> PathBuf {
        self.dccproc_path
            .clone()
            .unwrap_or_else(|| self.home.join("bin").join("dccproc"))
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reject values the check path cannot use.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !OPTIONS_RE.is_match(&self.dccproc_options) {
            return Err(ConfigError::Invalid(format!(
                "dccproc_options must match [A-Z -]+, got {:?}",
                self.dccproc_options
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".to_string()));
        }
        let t = &self.thresholds;
        for (name, value) in [
            ("body_max", t.body_max),
            ("fuzzy1_max", t.fuzzy1_max),
            ("fuzzy2_max", t.fuzzy2_max),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!(
                    "thresholds.{name} must be positive"
                )));
            }
        }
        Ok(())
    }
}
