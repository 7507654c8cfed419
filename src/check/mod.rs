//! DCC reputation checks.
//!
//! A check asks the DCC backend whether a message's fuzzy checksums have been
//! reported by enough other senders to count as bulk:
//!
//! 1. Empty messages are skipped.
//! 2. A `bulk` `X-DCC` header added by an upstream relay is trusted as a hit.
//! 3. The transport is resolved (socket first, then process) and cached.
//! 4. The transport runs under a hard deadline.
//! 5. The response header is parsed and compared against the thresholds.
//!
//! Every failure degrades to [`CheckOutcome::Indeterminate`].
//!
//! # Example
//!
//! ```no_run
//! use dcc_check::check::{CheckClient, CheckRequest};
//! use dcc_check::config::DccConfig;
//!
//! # async fn example() {
//! let config = DccConfig::default();
//! let client = CheckClient::new(config.clone());
//! let request = CheckRequest::new(std::fs::read("message.eml").unwrap_or_default())
//!     .client_ip("192.0.2.1")
//!     .recipient("postmaster@example.com");
//!
//! let outcome = client.check(&request, &config.thresholds).await;
//! if let Some(tags) = outcome.tags() {
//!     println!("{}", tags.header_line());
//! }
//! # }
//! ```

mod client;
pub mod deadline;
mod marker;
pub mod parser;
mod request;
mod verdict;

pub use client::CheckClient;
pub use deadline::{run_with_deadline, Deadline, DeadlineError};
pub use parser::{parse, ParseError};
pub use request::{CheckRequest, UNKNOWN_CLIENT_IP, UNKNOWN_RECIPIENT};
pub use verdict::{
    CheckOutcome, IndeterminateReason, ParsedVerdict, ReportTags, Thresholds, DEFAULT_THRESHOLD,
    MANY,
};
