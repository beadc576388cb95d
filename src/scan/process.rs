//! Per-document link processing.

use crate::config::BROKEN_STATUS_THRESHOLD;
use crate::documents::DocumentStore;
use crate::error_handling::{LinkOutcome, ResolveError, ScanStats, ServiceError};
use crate::ledger::{Ledger, NewIssue, ResolutionStatus};
use crate::locate::{extract_candidate_links, CandidateLink, LinkScope, SiteHosts};
use crate::resolve::{Origin, RedirectResolution, ResolveSession};
use crate::rewrite::{commit_body, replace_href};

pub const AUTO_FIXED_PERMANENT: &str = "Auto-fixed (Permanent Redirect)";
pub const AUTO_FIXED_CANONICAL: &str = "Auto-fixed (Canonicalized)";
pub const PERMANENT_REDIRECT: &str = "Permanent Redirect";
pub const TEMPORARY_REDIRECT: &str = "Temporary Redirect";

/// What one document needs from its surroundings.
pub struct DocumentContext<'a> {
    pub hosts: &'a SiteHosts,
    pub documents: &'a dyn DocumentStore,
    pub ledger: &'a Ledger,
    pub auto_resolve: bool,
    pub follow_external: bool,
    pub stats: &'a ScanStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentReport {
    pub links: usize,
    pub rewritten: bool,
}

/// Change to apply to the body, and the resolved entry it earns once committed.
struct Fix {
    raw: String,
    final_url: String,
    issue: NewIssue,
}

enum Decision {
    Skip(LinkOutcome),
    Log(NewIssue, LinkOutcome),
    Fix(Fix, LinkOutcome),
}

fn issue(
    document_id: i64,
    link: &CandidateLink,
    final_url: &str,
    http_status: u16,
    message: &str,
    resolution_status: ResolutionStatus,
) -> NewIssue {
    NewIssue {
        document_id,
        original_url: link.raw.clone(),
        final_url: final_url.to_string(),
        http_status: i64::from(http_status),
        status_message: message.to_string(),
        resolution_status,
        resolved_by: 0,
    }
}

fn decide(
    document_id: i64,
    link: &CandidateLink,
    resolution: &RedirectResolution,
    auto_resolve: bool,
) -> Decision {
    if resolution.origin == Origin::ExternalSkipped {
        return Decision::Skip(LinkOutcome::ExternalSkipped);
    }

    let status = resolution.status_code;
    if status >= BROKEN_STATUS_THRESHOLD {
        return Decision::Log(
            issue(
                document_id,
                link,
                "",
                status,
                &resolution.status_message,
                ResolutionStatus::Pending,
            ),
            LinkOutcome::Broken,
        );
    }

    if resolution.final_url == link.url || resolution.final_url.is_empty() {
        return Decision::Skip(LinkOutcome::Healthy);
    }

    let fix = |http_status: u16, message: &str| Fix {
        raw: link.raw.clone(),
        final_url: resolution.final_url.clone(),
        issue: issue(
            document_id,
            link,
            &resolution.final_url,
            http_status,
            message,
            ResolutionStatus::Resolved,
        ),
    };

    if resolution.origin == Origin::Http && resolution.is_redirect() {
        let first_hop = resolution.first_hop_code.unwrap_or_default();
        if resolution.is_permanent && auto_resolve && (200..400).contains(&status) {
            return Decision::Fix(fix(first_hop, AUTO_FIXED_PERMANENT), LinkOutcome::AutoFixed);
        }
        let message = if resolution.is_permanent {
            PERMANENT_REDIRECT
        } else {
            TEMPORARY_REDIRECT
        };
        return Decision::Log(
            issue(
                document_id,
                link,
                &resolution.final_url,
                first_hop,
                message,
                ResolutionStatus::Pending,
            ),
            LinkOutcome::PendingRedirect,
        );
    }

    // Canonicalization, or any other non-redirect difference
    if auto_resolve {
        Decision::Fix(fix(200, AUTO_FIXED_CANONICAL), LinkOutcome::Canonicalized)
    } else {
        Decision::Skip(LinkOutcome::Healthy)
    }
}

/// Scans one document: resolves each link, logs findings and applies
/// authorized fixes with a single commit.
///
/// Resolver failures skip the link. Resolved entries for applied fixes are
/// written only after the new body is committed.
///
/// # Errors
///
/// Returns `PersistenceFailure` when the document cannot be read or committed.
/// Ledger write failures for single links are logged and skipped.
pub async fn process_document(
    ctx: &DocumentContext<'_>,
    session: &mut ResolveSession<'_>,
    document_id: i64,
) -> Result<DocumentReport, ServiceError> {
    let Some(document) = ctx.documents.get_document(document_id).await? else {
        log::debug!("Document {} vanished before processing", document_id);
        return Ok(DocumentReport::default());
    };
    if document.body.is_empty() {
        return Ok(DocumentReport::default());
    }

    let links: Vec<CandidateLink> = extract_candidate_links(&document.body, ctx.hosts)
        .into_iter()
        .filter(|link| link.scope == LinkScope::Internal || ctx.follow_external)
        .collect();

    let mut body = document.body.clone();
    let mut deferred: Vec<(NewIssue, LinkOutcome)> = Vec::new();

    for link in &links {
        let resolution = match session.resolve(&link.url).await {
            Ok(resolution) => resolution,
            Err(e) => {
                if let ResolveError::Upstream { kind, .. } = &e {
                    ctx.stats.increment_upstream(*kind);
                }
                ctx.stats.increment(LinkOutcome::ResolveFailed);
                log::debug!("Skipping {} in document {}: {}", link.url, document_id, e);
                continue;
            }
        };

        match decide(document_id, link, &resolution, ctx.auto_resolve) {
            Decision::Skip(outcome) => ctx.stats.increment(outcome),
            Decision::Log(new_issue, outcome) => match ctx.ledger.record_issue(&new_issue).await {
                Ok(true) => ctx.stats.increment(outcome),
                Ok(false) => ctx.stats.increment(LinkOutcome::Duplicate),
                Err(e) => log::warn!(
                    "Failed to log {} for document {}: {}",
                    link.raw,
                    document_id,
                    e
                ),
            },
            Decision::Fix(fix, outcome) => {
                body = replace_href(&body, &fix.raw, &fix.final_url);
                deferred.push((fix.issue, outcome));
            }
        }
    }

    let rewritten = commit_body(ctx.documents, &document, &body).await?;
    if rewritten {
        log::info!(
            "Rewrote {} link(s) in document {}",
            deferred.len(),
            document_id
        );
    }

    for (new_issue, outcome) in deferred {
        match ctx.ledger.record_issue(&new_issue).await {
            Ok(true) => ctx.stats.increment(outcome),
            Ok(false) => ctx.stats.increment(LinkOutcome::Duplicate),
            Err(e) => log::warn!(
                "Failed to log fix of {} in document {}: {}",
                new_issue.original_url,
                document_id,
                e
            ),
        }
    }

    Ok(DocumentReport {
        links: links.len(),
        rewritten,
    })
}
