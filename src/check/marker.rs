//! Detection of an `X-DCC` bulk header added by an upstream relay.

use std::sync::LazyLock;

use regex::Regex;

use super::parser;
use super::verdict::ParsedVerdict;

static BULK_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^X-DCC(?:-[^:]{1,80})?-Metrics:.*bulk").expect("bulk marker regex")
});

/// Verdict from the first upstream `X-DCC-*-Metrics` header that says `bulk`.
///
/// Only the metrics header form counts, matched case-sensitively on the
/// unfolded header. Any other header is left for the backend to judge.
pub(crate) fn find_bulk_marker(headers: &[String]) -> Option<ParsedVerdict> {
    let mut i = 0;
    while i < headers.len() {
        let folded = headers[i + 1..]
            .iter()
            .take_while(|l| l.starts_with([' ', '\t']))
            .count();
        let block = &headers[i..=i + folded];
        if BULK_MARKER_RE.is_match(&unfold(block)) {
            if let Ok(verdict) = parser::parse(block) {
                return Some(verdict);
            }
        }
        i += folded + 1;
    }
    None
}

fn unfold(block: &[String]) -> String {
    let mut header = block[0].clone();
    for line in &block[1..] {
        header.push(' ');
        header.push_str(line.trim_start());
    }
    header
}
