//! Link extraction.
//!
//! Pulls `href` values out of anchor tags with an attribute pattern (no HTML
//! parsing), drops targets that can never be navigated to, and classifies the
//! rest as internal or external.

mod hosts;

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

pub(crate) use hosts::scheme_of;
pub use hosts::SiteHosts;

const ANCHOR_HREF_PATTERN: &str = r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#;

/// Helper function to compile a static regex pattern, panicking with a detailed
/// error message if compilation fails. Only used for compile-time constants.
fn compile_regex_unsafe(pattern: &str, context: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| {
        panic!(
            "Failed to compile regex pattern '{}' in {}: {}. This is a programming error.",
            pattern, context, e
        )
    })
}

static ANCHOR_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_regex_unsafe(ANCHOR_HREF_PATTERN, "ANCHOR_HREF_RE"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkScope {
    Internal,
    External,
}

/// One distinct link target found in a document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLink {
    /// The attribute value exactly as written in the markup.
    pub raw: String,
    /// `raw` with HTML entities decoded; what gets resolved.
    pub url: String,
    pub scope: LinkScope,
}

/// Extracts de-duplicated candidate links from `body`, in document order.
///
/// Skipped: empty values, pure fragments (`#...`), non-http(s) schemes and
/// reserved admin paths.
pub fn extract_candidate_links(body: &str, hosts: &SiteHosts) -> Vec<CandidateLink> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for caps in ANCHOR_HREF_RE.captures_iter(body) {
        let Some(value) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let raw = value.as_str().trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }
        if !seen.insert(raw.to_string()) {
            continue;
        }

        let url = html_escape::decode_html_entities(raw).trim().to_string();
        if url.is_empty() || url.starts_with('#') {
            continue;
        }
        if let Some(scheme) = scheme_of(&url) {
            if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
                continue;
            }
        }
        if hosts.is_reserved_path(&url) {
            continue;
        }

        let scope = if hosts.is_internal(&url) {
            LinkScope::Internal
        } else {
            LinkScope::External
        };
        links.push(CandidateLink {
            raw: raw.to_string(),
            url,
            scope,
        });
    }

    links
}
