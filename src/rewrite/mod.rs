//! Content rewriting.
//!
//! Swaps one `href` value for another inside markup and persists the new body
//! through the document store's lightweight commit path.

use regex::{Captures, Regex};

use crate::documents::{Document, DocumentStore};
use crate::error_handling::StoreError;

/// Result of rewriting one link in one stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// The document is gone or has no body.
    Missing,
    /// The link was not found; nothing was written.
    Unchanged,
    Rewritten,
}

fn encode_for_quote(value: &str, quote: char) -> String {
    if quote == '\'' {
        html_escape::encode_single_quoted_attribute(value).into_owned()
    } else {
        html_escape::encode_double_quoted_attribute(value).into_owned()
    }
}

/// Replaces every `href` whose value is `original` with `replacement`.
///
/// `original` matches as written, entity-decoded and re-encoded, in either
/// quote style. The attribute keeps its quote style and spacing; the new value
/// is entity-encoded for that quote. Returns `body` unchanged when nothing
/// matches.
pub fn replace_href(body: &str, original: &str, replacement: &str) -> String {
    if body.is_empty() || original.is_empty() {
        return body.to_string();
    }
    let decoded = html_escape::decode_html_entities(original).into_owned();
    let replacement = html_escape::decode_html_entities(replacement).into_owned();
    if decoded == replacement {
        return body.to_string();
    }

    let mut variants: Vec<String> = Vec::with_capacity(4);
    for candidate in [
        original.to_string(),
        decoded.clone(),
        encode_for_quote(&decoded, '"'),
        encode_for_quote(&decoded, '\''),
    ] {
        if !candidate.is_empty() && !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }

    let mut content = body.to_string();
    for value in &variants {
        let quoted = regex::escape(value);
        let pattern = format!(r#"(?i)(\bhref\s*=\s*)(?:"{quoted}"|'{quoted}')"#);
        let Ok(re) = Regex::new(&pattern) else {
            log::warn!("Could not build href pattern for {:?}", value);
            continue;
        };
        content = re
            .replace_all(&content, |caps: &Captures| {
                let prefix = &caps[1];
                let quote = caps
                    .get(0)
                    .and_then(|m| m.as_str()[prefix.len()..].chars().next())
                    .unwrap_or('"');
                format!(
                    "{prefix}{quote}{}{quote}",
                    encode_for_quote(&replacement, quote)
                )
            })
            .into_owned();
    }
    content
}

/// Persists `new_body` when it differs from what `document` holds.
/// Returns whether a write happened.
pub async fn commit_body(
    store: &dyn DocumentStore,
    document: &Document,
    new_body: &str,
) -> Result<bool, StoreError> {
    if document.body == new_body {
        return Ok(false);
    }
    store.commit_body(document.id, new_body).await?;
    Ok(true)
}

/// Loads a document, swaps `original` for `replacement` and commits the result.
pub async fn rewrite_document(
    store: &dyn DocumentStore,
    document_id: i64,
    original: &str,
    replacement: &str,
) -> Result<RewriteOutcome, StoreError> {
    let Some(document) = store.get_document(document_id).await? else {
        return Ok(RewriteOutcome::Missing);
    };
    if document.body.is_empty() {
        return Ok(RewriteOutcome::Missing);
    }
    let updated = replace_href(&document.body, original, replacement);
    if commit_body(store, &document, &updated).await? {
        Ok(RewriteOutcome::Rewritten)
    } else {
        Ok(RewriteOutcome::Unchanged)
    }
}
