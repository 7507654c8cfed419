//! Parser for the backend's `X-DCC-*-Metrics` response header.
//!
//! The backend answers with a single, possibly folded, header of the form
//!
//! ```text
//! X-DCC-<label>-Metrics: <host> <id>; Body=<n> Fuz1=<n> Fuz2=<n>
//! ```
//!
//! where each count may also be `many` (confirmed bulk) or `ok`/`ok2`
//! (whitelisted, not counted). Parsing is pure: the same lines always produce
//! the same [`ParsedVerdict`].

use std::sync::LazyLock;

use regex::Regex;

use super::verdict::{ParsedVerdict, MANY};

/// Literal every valid response header starts with.
pub const HEADER_PREFIX: &str = "X-DCC";

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^X-DCC(?:-([^:]*?))?-Metrics:[ \t]*(.*?)\s*$").expect("metrics header regex")
});
static MANY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)many").expect("many token regex"));
static OK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)ok\d?").expect("ok token regex"));
static BODY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Body=(\d+)").expect("body regex"));
static FUZ1_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Fuz1=(\d+)").expect("fuz1 regex"));
static FUZ2_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Fuz2=(\d+)").expect("fuz2 regex"));

/// Errors that make a response unusable.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No lines at all.
    #[error("Empty response")]
    Empty,

    /// The first line is not an `X-DCC` header.
    #[error("Response does not start with X-DCC: {0}")]
    MissingPrefix(String),

    /// The header starts with `X-DCC` but is not a metrics header.
    #[error("Unrecognized X-DCC header: {0}")]
    UnrecognizedHeader(String),
}

/// Parse a response into a verdict, ignoring any lines after the header.
///
/// # Errors
///
/// Returns a [`ParseError`] if the first line is not a metrics header.
pub fn parse<S: AsRef<str>>(lines: &[S]) -> Result<ParsedVerdict, ParseError> {
    parse_header(lines).map(|(verdict, _rest)| verdict)
}

/// Parse the leading (possibly folded) header and hand back the unconsumed
/// lines.
///
/// Folding stops at the first line that does not begin with whitespace; that
/// line and everything after it is returned untouched.
///
/// # Errors
///
/// Returns a [`ParseError`] if the first line is not a metrics header.
pub fn parse_header<S: AsRef<str>>(lines: &[S]) -> Result<(ParsedVerdict, &[S]), ParseError> {
    let (first, rest) = lines.split_first().ok_or(ParseError::Empty)?;
    let first = strip_terminator(first.as_ref());
    if !first.starts_with(HEADER_PREFIX) {
        return Err(ParseError::MissingPrefix(first.to_string()));
    }

    let mut header = first.to_string();
    let folded = rest
        .iter()
        .take_while(|line| line.as_ref().starts_with([' ', '\t']))
        .count();
    for line in &rest[..folded] {
        header.push(' ');
        header.push_str(strip_terminator(line.as_ref()).trim_start());
    }

    let caps = HEADER_RE
        .captures(&header)
        .ok_or_else(|| ParseError::UnrecognizedHeader(header.clone()))?;
    let backend_label = caps.get(1).map_or("", |m| m.as_str()).to_string();
    let raw_metrics = caps.get(2).map_or("", |m| m.as_str()).to_string();

    let normalized = MANY_RE.replace_all(&raw_metrics, MANY.to_string().as_str());
    let normalized = OK_RE.replace_all(&normalized, "0");

    let verdict = ParsedVerdict {
        body_count: extract_count(&BODY_RE, &normalized),
        fuzzy1_count: extract_count(&FUZ1_RE, &normalized),
        fuzzy2_count: extract_count(&FUZ2_RE, &normalized),
        backend_label,
        raw_metrics,
    };
    Ok((verdict, &rest[folded..]))
}

fn strip_terminator(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

/// Missing fields count as zero; values too large for `u64` saturate.
fn extract_count(re: &Regex, text: &str) -> u64 {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(0, |m| m.as_str().parse().unwrap_or(u64::MAX))
}
