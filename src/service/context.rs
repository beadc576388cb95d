//! Shared collaborators for every operation.

use std::sync::Arc;

use anyhow::Context;
use sqlx::SqlitePool;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::config::SettingsStore;
use crate::documents::{DocumentStore, SqliteDocumentStore};
use crate::initialization::init_probe_client;
use crate::ledger::Ledger;
use crate::locate::SiteHosts;
use crate::resolve::{HeadProbe, ReqwestProbe, ResolutionCache, Resolver};
use crate::storage::{
    init_db_pool_with_path, LeaseStore, OptionsStore, ScanStateStore, SqliteResolutionCache,
    SqliteSettings,
};

/// Everything the operations share, wired over one SQLite pool.
#[derive(Clone)]
pub struct SentinelContext {
    pub pool: Arc<SqlitePool>,
    pub clock: Arc<dyn Clock>,
    pub hosts: Arc<SiteHosts>,
    pub documents: Arc<dyn DocumentStore>,
    pub resolver: Arc<Resolver>,
    pub cache: Arc<dyn ResolutionCache>,
    pub ledger: Arc<Ledger>,
    pub leases: Arc<LeaseStore>,
    pub scan_state: Arc<ScanStateStore>,
    pub options: Arc<OptionsStore>,
    pub settings: Arc<dyn SettingsStore>,
}

impl SentinelContext {
    /// Wires the bundled SQLite document store.
    pub fn new(
        pool: Arc<SqlitePool>,
        hosts: SiteHosts,
        probe: Arc<dyn HeadProbe>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let documents: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(
            pool.clone(),
            hosts.base().clone(),
        ));
        Self::with_documents(pool, hosts, documents, probe, clock)
    }

    /// Wires an external document store; bookkeeping still lives in `pool`.
    pub fn with_documents(
        pool: Arc<SqlitePool>,
        hosts: SiteHosts,
        documents: Arc<dyn DocumentStore>,
        probe: Arc<dyn HeadProbe>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let hosts = Arc::new(hosts);
        let cache: Arc<dyn ResolutionCache> =
            Arc::new(SqliteResolutionCache::new(pool.clone(), clock.clone()));
        let resolver = Arc::new(Resolver::new(
            hosts.clone(),
            documents.clone(),
            probe,
            cache.clone(),
        ));
        Self {
            ledger: Arc::new(Ledger::new(pool.clone(), clock.clone())),
            leases: Arc::new(LeaseStore::new(pool.clone(), clock.clone())),
            scan_state: Arc::new(ScanStateStore::new(pool.clone())),
            options: Arc::new(OptionsStore::new(pool.clone())),
            settings: Arc::new(SqliteSettings::new(pool.clone())),
            pool,
            clock,
            hosts,
            documents,
            resolver,
            cache,
        }
    }

    /// Opens the database and probe client named by `config`.
    ///
    /// # Errors
    ///
    /// Fails when the site URL is invalid, the database cannot be opened or
    /// migrated, or the HTTP client cannot be built.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let hosts = SiteHosts::new(
            &config.site_url,
            &config.internal_hosts,
            &config.reserved_prefixes,
        )
        .context("Failed to parse site URL")?;
        let pool = init_db_pool_with_path(&config.db_path)
            .await
            .context("Failed to open database")?;
        let client =
            init_probe_client(&config.user_agent).context("Failed to build HTTP client")?;

        Ok(Self::new(
            pool,
            hosts,
            Arc::new(ReqwestProbe::new(client)),
            Arc::new(SystemClock),
        ))
    }
}
