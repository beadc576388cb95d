//! Destination resolution.
//!
//! Answers "where does this link really go?" for one URL at a time:
//!
//! 1. the per-operation memo, then the durable [`ResolutionCache`]
//! 2. external links with redirect following disabled short-circuit to
//!    [`Origin::ExternalSkipped`] without any request
//! 3. internal links the document store maps to a different URL are answered
//!    from the store ([`Origin::Canonical`])
//! 4. everything else, including links whose canonical form is themselves, is a
//!    bounded HEAD walk ([`Origin::Http`])
//!
//! Failures are never memoized or cached.

mod cache;
mod models;
mod probe;
mod walk;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::config::{
    Settings, CANONICAL_FIRST_HOP_CODE, EXTERNAL_MAX_HOPS_CAP, INTERNAL_MAX_HOPS,
    MIN_REQUEST_TIMEOUT, PERMANENT_REDIRECT_CODES,
};
use crate::documents::DocumentStore;
use crate::error_handling::ResolveError;
use crate::ledger::fingerprint;
use crate::locate::{scheme_of, SiteHosts};

pub use cache::{MemoryResolutionCache, ResolutionCache};
pub use models::{Origin, RedirectResolution};
pub use probe::{HeadProbe, ProbeResponse, ReqwestProbe};
pub use walk::{walk_redirects, WalkOutcome};

#[cfg(test)]
pub(crate) use probe::scripted;

/// Knobs read from runtime settings for one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverOptions {
    pub follow_external: bool,
    pub external_max_hops: usize,
    pub internal_timeout: Duration,
    pub external_timeout: Duration,
    /// Zero disables durable caching.
    pub cache_ttl: Duration,
}

impl From<&Settings> for ResolverOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            follow_external: settings.follow_external_redirects,
            external_max_hops: settings.external_max_hops,
            internal_timeout: settings.internal_timeout,
            external_timeout: settings.external_timeout,
            cache_ttl: settings.resolve_cache_ttl,
        }
    }
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

/// Shared resolver collaborators. Cheap to share behind an `Arc`; per-operation
/// state lives in [`ResolveSession`].
pub struct Resolver {
    hosts: Arc<SiteHosts>,
    documents: Arc<dyn DocumentStore>,
    probe: Arc<dyn HeadProbe>,
    cache: Arc<dyn ResolutionCache>,
}

impl Resolver {
    pub fn new(
        hosts: Arc<SiteHosts>,
        documents: Arc<dyn DocumentStore>,
        probe: Arc<dyn HeadProbe>,
        cache: Arc<dyn ResolutionCache>,
    ) -> Self {
        Self {
            hosts,
            documents,
            probe,
            cache,
        }
    }

    pub fn hosts(&self) -> &SiteHosts {
        &self.hosts
    }

    pub fn probe(&self) -> &dyn HeadProbe {
        self.probe.as_ref()
    }

    /// Starts an operation-scoped session with its own memo.
    pub fn session(&self, options: ResolverOptions) -> ResolveSession<'_> {
        ResolveSession {
            resolver: self,
            options,
            memo: HashMap::new(),
        }
    }
}

/// One operation's view of the resolver (a scan step, a manual fix).
pub struct ResolveSession<'a> {
    resolver: &'a Resolver,
    options: ResolverOptions,
    memo: HashMap<String, RedirectResolution>,
}

impl ResolveSession<'_> {
    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub async fn resolve(&mut self, url: &str) -> Result<RedirectResolution, ResolveError> {
        let key = fingerprint(url);
        if let Some(hit) = self.memo.get(&key) {
            return Ok(hit.clone());
        }

        match self.resolver.cache.get(&key).await {
            Ok(Some(hit)) => {
                self.memo.insert(key, hit.clone());
                return Ok(hit);
            }
            Ok(None) => {}
            Err(e) => log::warn!("Resolution cache read failed for {}: {}", url, e),
        }

        let hosts = self.resolver.hosts.as_ref();
        let is_internal = hosts.is_internal(url);

        if !is_internal && !self.options.follow_external {
            let skipped = RedirectResolution {
                final_url: url.to_string(),
                status_code: 0,
                status_message: "External skipped".to_string(),
                first_hop_code: None,
                is_permanent: false,
                origin: Origin::ExternalSkipped,
            };
            self.memo.insert(key, skipped.clone());
            return Ok(skipped);
        }

        let absolute = absolute_http_url(hosts, url)?;

        let resolution = match self.canonical(url, &absolute, is_internal).await {
            Some(canonical) => canonical,
            None => self.walk(url, &absolute, is_internal).await?,
        };

        self.memo.insert(key.clone(), resolution.clone());
        if !self.options.cache_ttl.is_zero() {
            if let Err(e) = self
                .resolver
                .cache
                .put(&key, url, &resolution, self.options.cache_ttl)
                .await
            {
                log::warn!("Resolution cache write failed for {}: {}", url, e);
            }
        }
        Ok(resolution)
    }

    async fn canonical(
        &self,
        url: &str,
        absolute: &Url,
        is_internal: bool,
    ) -> Option<RedirectResolution> {
        if !is_internal {
            return None;
        }
        let canonical = match self
            .resolver
            .documents
            .resolve_to_canonical_url(absolute)
            .await
        {
            Ok(found) => found?,
            Err(e) => {
                log::warn!("Canonical lookup failed for {}: {}", url, e);
                return None;
            }
        };

        // An unchanged URL still needs the walk to see how it answers over HTTP
        if canonical == *absolute {
            return None;
        }
        Some(RedirectResolution {
            final_url: self.resolver.hosts.relativize(&canonical),
            status_code: 200,
            status_message: "Canonical".to_string(),
            first_hop_code: Some(CANONICAL_FIRST_HOP_CODE),
            is_permanent: true,
            origin: Origin::Canonical,
        })
    }

    async fn walk(
        &self,
        url: &str,
        absolute: &Url,
        is_internal: bool,
    ) -> Result<RedirectResolution, ResolveError> {
        let (max_hops, timeout) = if is_internal {
            (INTERNAL_MAX_HOPS, self.options.internal_timeout)
        } else {
            (
                self.options.external_max_hops.min(EXTERNAL_MAX_HOPS_CAP),
                self.options.external_timeout,
            )
        };
        let timeout = timeout.max(MIN_REQUEST_TIMEOUT);

        let outcome =
            walk_redirects(self.resolver.probe.as_ref(), absolute, max_hops, timeout).await?;

        let final_url = if outcome.final_url == *absolute {
            url.to_string()
        } else if is_internal {
            self.resolver.hosts.relativize(&outcome.final_url)
        } else {
            outcome.final_url.to_string()
        };
        let is_permanent = outcome
            .first_hop_code
            .is_some_and(|code| PERMANENT_REDIRECT_CODES.contains(&code));

        Ok(RedirectResolution {
            final_url,
            status_code: outcome.status_code,
            status_message: outcome.status_message,
            first_hop_code: outcome.first_hop_code,
            is_permanent,
            origin: Origin::Http,
        })
    }
}

/// Absolute http(s) form of `url`, relative references resolved on the site.
pub fn absolute_http_url(hosts: &SiteHosts, url: &str) -> Result<Url, ResolveError> {
    if let Some(scheme) = scheme_of(url.trim()) {
        if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
            return Err(ResolveError::InvalidUrl(url.to_string()));
        }
    }
    let absolute = hosts
        .absolutize(url)
        .ok_or_else(|| ResolveError::InvalidUrl(url.to_string()))?;
    if absolute.host_str().is_none() {
        return Err(ResolveError::InvalidUrl(url.to_string()));
    }
    Ok(absolute)
}
