//! Operations exposed to the admin surface.
//!
//! [`LinkSentinel`] gates every call through the [`Gatekeeper`], loads the
//! current runtime [`Settings`] and delegates to the scan orchestrator, the
//! bulk resolver or the ledger.

mod context;
mod gatekeeper;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::bulk::{Attribution, BulkResolver, ResolveAllRequest, ResolveAllResponse, ResolveAllStepper};
use crate::config::{keys, Settings, BROKEN_STATUS_THRESHOLD};
use crate::error_handling::ServiceError;
use crate::ledger::{IssueView, LinkIssue, Page, Resolution, ResolvedScope, SortOrder};
use crate::resolve::ResolverOptions;
use crate::rewrite::{rewrite_document, RewriteOutcome};
use crate::scan::{
    ScanOrchestrator, ScanStartResponse, ScanStatusResponse, ScanStepResponse,
    PERMANENT_REDIRECT, TEMPORARY_REDIRECT,
};
use crate::storage::options;

pub use context::SentinelContext;
pub use gatekeeper::{Actor, Gatekeeper, INVALID_REQUEST, PERMISSION_DENIED};

pub const MANUALLY_RESOLVED: &str = "Manually Resolved";
pub const MANUALLY_UPDATED: &str = "Manually Updated";

/// Outcome of a single-entry action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResponse {
    pub message: String,
}

impl ActionResponse {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClearedResponse {
    pub message: String,
    pub removed: u64,
}

/// Which ledger tab to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueListing {
    #[default]
    Pending,
    Broken,
    Resolved,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IssueQuery {
    #[serde(default)]
    pub view: IssueListing,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub scope: ResolvedScope,
    #[serde(default)]
    pub order: SortOrder,
}

pub struct LinkSentinel {
    ctx: SentinelContext,
    gatekeeper: Gatekeeper,
    scans: ScanOrchestrator,
    bulk: BulkResolver,
}

impl LinkSentinel {
    pub fn new(ctx: SentinelContext, gatekeeper: Gatekeeper) -> Self {
        let scans = ScanOrchestrator::new(
            ctx.documents.clone(),
            ctx.resolver.clone(),
            ctx.ledger.clone(),
            ctx.leases.clone(),
            ctx.scan_state.clone(),
            ctx.options.clone(),
            ctx.clock.clone(),
        );
        let bulk = BulkResolver::new(
            ctx.documents.clone(),
            ctx.ledger.clone(),
            ctx.leases.clone(),
            ctx.clock.clone(),
        );
        Self {
            ctx,
            gatekeeper,
            scans,
            bulk,
        }
    }

    pub fn context(&self) -> &SentinelContext {
        &self.ctx
    }

    async fn settings(&self) -> Result<Settings, ServiceError> {
        Ok(Settings::load(self.ctx.settings.as_ref()).await?)
    }

    pub async fn start_scan(
        &self,
        actor: &Actor,
        nonce: Option<&str>,
    ) -> Result<ScanStartResponse, ServiceError> {
        self.gatekeeper.check(actor, nonce)?;
        let settings = self.settings().await?;
        self.scans.start(&settings).await
    }

    pub async fn step_scan(
        &self,
        actor: &Actor,
        nonce: Option<&str>,
        token: &str,
    ) -> Result<ScanStepResponse, ServiceError> {
        self.gatekeeper.check(actor, nonce)?;
        let settings = self.settings().await?;
        self.scans.step(token, &settings).await
    }

    pub async fn scan_status(&self, actor: &Actor) -> Result<ScanStatusResponse, ServiceError> {
        self.gatekeeper.authorize(actor)?;
        let settings = self.settings().await?;
        self.scans.status(&settings).await
    }

    pub async fn reset_scan(
        &self,
        actor: &Actor,
        nonce: Option<&str>,
    ) -> Result<ActionResponse, ServiceError> {
        self.gatekeeper.check(actor, nonce)?;
        self.scans.reset().await?;
        Ok(ActionResponse::new("Scan reset."))
    }

    /// Applies the detected fix of one pending entry.
    pub async fn resolve_one(
        &self,
        actor: &Actor,
        nonce: Option<&str>,
        issue_id: i64,
    ) -> Result<ActionResponse, ServiceError> {
        self.gatekeeper.check(actor, nonce)?;
        if issue_id <= 0 {
            return Err(ServiceError::ValidationError(INVALID_REQUEST.to_string()));
        }

        let not_found = || ServiceError::NotFound("Record not found or already resolved.".to_string());
        let record = self.ctx.ledger.find_pending(issue_id).await?.ok_or_else(not_found)?;
        if record.final_url.is_empty() {
            return Err(ServiceError::ValidationError(
                "This link does not have a detected URL to resolve to.".to_string(),
            ));
        }

        self.rewrite(&record, &record.final_url).await?;
        let resolution = Resolution {
            final_url: None,
            status_override: None,
            message: actor.attribution(MANUALLY_RESOLVED),
            actor_id: actor.id,
        };
        if !self.ctx.ledger.mark_resolved(issue_id, &resolution).await? {
            return Err(not_found());
        }

        log::info!("Entry {} resolved by actor {}", issue_id, actor.id);
        Ok(ActionResponse::new("Link resolved successfully."))
    }

    pub async fn resolve_all_step(
        &self,
        actor: &Actor,
        nonce: Option<&str>,
        request: &ResolveAllRequest,
    ) -> Result<ResolveAllResponse, ServiceError> {
        self.gatekeeper.check(actor, nonce)?;
        let settings = self.settings().await?;
        let attribution = Attribution {
            actor_id: actor.id,
            message: actor.attribution(MANUALLY_RESOLVED),
        };
        self.bulk.step(request, &attribution, &settings).await
    }

    /// In-process stepper for [`crate::bulk::BulkResolveDriver`].
    pub fn stepper(self: &Arc<Self>, actor: Actor, nonce: Option<String>) -> ServiceStepper {
        ServiceStepper {
            service: self.clone(),
            actor,
            nonce,
        }
    }

    /// Replaces the target of a broken entry with a caller-supplied URL.
    ///
    /// The new URL is probed first: a redirecting URL keeps the entry pending
    /// with the new candidate, an error status rejects it, anything else
    /// rewrites the document and resolves the entry.
    pub async fn change_link(
        &self,
        actor: &Actor,
        nonce: Option<&str>,
        issue_id: i64,
        new_url: &str,
    ) -> Result<ActionResponse, ServiceError> {
        self.gatekeeper.authorize(actor)?;
        let new_url = new_url.trim();
        let has_nonce = nonce.is_some_and(|n| !n.trim().is_empty());
        if issue_id <= 0 || !has_nonce || new_url.is_empty() {
            return Err(ServiceError::ValidationError("Missing data.".to_string()));
        }
        if !self.gatekeeper.verify_nonce(nonce) {
            return Err(ServiceError::ValidationError("Invalid nonce.".to_string()));
        }

        let (absolute, stored) = self.validate_new_url(new_url).ok_or_else(|| {
            ServiceError::ValidationError("Please provide a valid URL or slug.".to_string())
        })?;

        let record = self.ctx.ledger.find_broken(issue_id).await?.ok_or_else(|| {
            ServiceError::NotFound("Record not found or not eligible for change.".to_string())
        })?;

        let settings = self.settings().await?;
        let mut session = self.ctx.resolver.session(ResolverOptions::from(&settings));
        let resolution = session.resolve(absolute.as_str()).await.map_err(|e| {
            log::warn!("Probe of replacement {} failed: {}", absolute, e);
            ServiceError::UpstreamFailure(
                "Unable to fetch the provided URL. Please try a different link.".to_string(),
            )
        })?;

        if resolution.is_redirect() {
            let first_hop = resolution.first_hop_code.map(i64::from).unwrap_or_default();
            let message = if resolution.is_permanent {
                PERMANENT_REDIRECT
            } else {
                TEMPORARY_REDIRECT
            };
            self.ctx
                .ledger
                .flag_pending_redirect(issue_id, &stored, first_hop, message)
                .await?;
            log::info!("Replacement for entry {} redirects ({}); left pending", issue_id, first_hop);
            return Ok(ActionResponse::new(
                "The new URL redirects.  It has been flagged for review as a pending redirect.",
            ));
        }

        if resolution.status_code >= BROKEN_STATUS_THRESHOLD {
            return Err(ServiceError::ValidationError(format!(
                "The provided URL returned a {} status and cannot be used.  Please choose a valid link.",
                resolution.status_code
            )));
        }

        self.rewrite(&record, &stored).await?;
        let resolved = Resolution {
            final_url: Some(stored),
            status_override: Some(200),
            message: actor.attribution(MANUALLY_UPDATED),
            actor_id: actor.id,
        };
        if !self.ctx.ledger.mark_resolved(issue_id, &resolved).await? {
            return Err(ServiceError::NotFound(
                "Record not found or not eligible for change.".to_string(),
            ));
        }

        log::info!("Entry {} updated by actor {}", issue_id, actor.id);
        Ok(ActionResponse::new("Link updated successfully."))
    }

    /// Absolute form to probe and the form to store. Site-relative input is
    /// stored as given.
    fn validate_new_url(&self, new_url: &str) -> Option<(Url, String)> {
        if new_url.starts_with('/') && !new_url.starts_with("//") {
            let absolute = self.ctx.hosts.absolutize(new_url)?;
            return Some((absolute, new_url.to_string()));
        }
        let parsed = Url::parse(new_url).ok()?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return None;
        }
        let stored = parsed.to_string();
        Some((parsed, stored))
    }

    async fn rewrite(&self, record: &LinkIssue, replacement: &str) -> Result<(), ServiceError> {
        if record.document_id <= 0 {
            return Ok(());
        }
        let outcome = rewrite_document(
            self.ctx.documents.as_ref(),
            record.document_id,
            &record.original_url,
            replacement,
        )
        .await?;
        if outcome == RewriteOutcome::Missing {
            log::debug!(
                "Document {} for entry {} is gone; resolving the entry only",
                record.document_id,
                record.id
            );
        }
        Ok(())
    }

    pub async fn list_issues(
        &self,
        actor: &Actor,
        query: &IssueQuery,
    ) -> Result<Page<LinkIssue>, ServiceError> {
        self.gatekeeper.authorize(actor)?;
        let page = query.page.unwrap_or(1).max(1);
        let view = match query.view {
            IssueListing::Pending => IssueView::PendingRedirect,
            IssueListing::Broken => IssueView::Broken,
            IssueListing::Resolved => IssueView::Resolved(query.scope),
        };
        let last_started = match view {
            IssueView::Resolved(ResolvedScope::All) | IssueView::PendingRedirect | IssueView::Broken => None,
            IssueView::Resolved(_) => self.ctx.options.get_ms(options::LAST_STARTED).await?,
        };
        Ok(self
            .ctx
            .ledger
            .page(view, page, query.order, last_started)
            .await?)
    }

    pub async fn clear_resolved(
        &self,
        actor: &Actor,
        nonce: Option<&str>,
    ) -> Result<ClearedResponse, ServiceError> {
        self.gatekeeper.check(actor, nonce)?;
        let removed = self.ctx.ledger.clear_resolved().await?;
        log::info!("Cleared {} resolved entries", removed);
        Ok(ClearedResponse {
            message: "Resolved links cleared.".to_string(),
            removed,
        })
    }

    pub async fn get_settings(&self, actor: &Actor) -> Result<Settings, ServiceError> {
        self.gatekeeper.authorize(actor)?;
        self.settings().await
    }

    /// Stores raw values and returns the settings as they now parse.
    pub async fn put_settings(
        &self,
        actor: &Actor,
        nonce: Option<&str>,
        values: &HashMap<String, String>,
    ) -> Result<Settings, ServiceError> {
        self.gatekeeper.check(actor, nonce)?;
        if let Some(unknown) = values.keys().find(|k| !keys::ALL.contains(&k.as_str())) {
            return Err(ServiceError::ValidationError(format!(
                "Unknown setting: {unknown}"
            )));
        }
        for (key, value) in values {
            self.ctx.settings.set(key, value).await?;
        }
        self.settings().await
    }
}

/// Drives [`LinkSentinel::resolve_all_step`] as one fixed actor.
pub struct ServiceStepper {
    service: Arc<LinkSentinel>,
    actor: Actor,
    nonce: Option<String>,
}

#[async_trait]
impl ResolveAllStepper for ServiceStepper {
    async fn resolve_all_step(
        &self,
        request: ResolveAllRequest,
    ) -> Result<ResolveAllResponse, ServiceError> {
        self.service
            .resolve_all_step(&self.actor, self.nonce.as_deref(), &request)
            .await
    }
}
