//! Resumable corpus scan.
//!
//! A scan is a persisted session (`scan_state`) guarded by a time-boxed lease.
//! Each [`ScanOrchestrator::step`] processes up to one batch of documents
//! after the cursor within a wall-clock budget, so a caller can drive an
//! arbitrarily large corpus through many short requests.
//!
//! ```text
//! idle --start--> active --step*--> idle (complete)
//!                   |
//!                   +-- lease expired while flagged active --> idle (stale reset)
//! ```

mod process;

use std::sync::Arc;

use serde::Serialize;

use crate::clock::Clock;
use crate::config::{Settings, MAX_SCAN_BATCH_SIZE, MIN_SCAN_BATCH_SIZE, SCAN_LEASE_NAME, SCAN_LEASE_TTL};
use crate::documents::DocumentStore;
use crate::error_handling::{ScanStats, ServiceError};
use crate::ledger::Ledger;
use crate::resolve::{Resolver, ResolverOptions};
use crate::storage::{new_token, options, LeaseStore, OptionsStore, ScanState, ScanStateStore};

pub use process::{
    process_document, DocumentContext, DocumentReport, AUTO_FIXED_CANONICAL,
    AUTO_FIXED_PERMANENT, PERMANENT_REDIRECT, TEMPORARY_REDIRECT,
};

pub const SCAN_TYPE_MANUAL: &str = "manual";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanStartResponse {
    pub message: String,
    pub resume: bool,
    pub token: String,
    pub total: i64,
    pub processed: i64,
    pub batch: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanStepResponse {
    pub message: String,
    pub done: bool,
    pub token: String,
    pub processed: i64,
    pub total: i64,
    pub batch: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_doc_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanStatusResponse {
    pub running: bool,
    pub total: i64,
    pub processed: i64,
    pub remaining: i64,
    pub in_progress: i64,
    pub token: String,
    pub batch: usize,
    pub message: String,
}

pub struct ScanOrchestrator {
    documents: Arc<dyn DocumentStore>,
    resolver: Arc<Resolver>,
    ledger: Arc<Ledger>,
    leases: Arc<LeaseStore>,
    state: Arc<ScanStateStore>,
    options: Arc<OptionsStore>,
    clock: Arc<dyn Clock>,
}

impl ScanOrchestrator {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        resolver: Arc<Resolver>,
        ledger: Arc<Ledger>,
        leases: Arc<LeaseStore>,
        state: Arc<ScanStateStore>,
        options: Arc<OptionsStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            documents,
            resolver,
            ledger,
            leases,
            state,
            options,
            clock,
        }
    }

    /// Starts a scan, or hands back the running one.
    ///
    /// A session flagged active whose lease has expired is stale and gets
    /// reset first.
    pub async fn start(&self, settings: &Settings) -> Result<ScanStartResponse, ServiceError> {
        let state = self.state.load().await?;
        if state.active {
            if self.leases.live(SCAN_LEASE_NAME).await?.is_some() {
                return Ok(ScanStartResponse {
                    message: "Resuming existing scan.".to_string(),
                    resume: true,
                    token: state.token,
                    total: state.total,
                    processed: state.processed,
                    batch: state.batch_size,
                });
            }
            log::warn!("Scan session {} lost its lease; resetting", state.token);
            self.state.reset().await?;
        }

        let batch_size = settings
            .scan_batch_size
            .clamp(MIN_SCAN_BATCH_SIZE, MAX_SCAN_BATCH_SIZE);
        let total = self.documents.count_eligible(&settings.eligible_types).await?;
        if total == 0 {
            return Ok(ScanStartResponse {
                message: "No content found to scan based on your settings.".to_string(),
                resume: false,
                token: String::new(),
                total: 0,
                processed: 0,
                batch: batch_size,
            });
        }

        let token = new_token();
        if !self
            .leases
            .try_acquire(SCAN_LEASE_NAME, &token, SCAN_LEASE_TTL)
            .await?
        {
            return Err(ServiceError::AlreadyRunning(
                "Another scan is already running. Please wait for it to finish.".to_string(),
            ));
        }

        let now = self.clock.now_ms();
        let state = ScanState {
            active: true,
            total,
            processed: 0,
            cursor_id: 0,
            batch_size,
            progress_interval: settings.scan_progress_interval.clamp(1, batch_size),
            token: token.clone(),
            started_at_ms: Some(now),
        };
        self.state.save(&state).await?;
        self.options.set_ms(options::LAST_STARTED, now).await?;
        self.options
            .set(options::LAST_TYPE, SCAN_TYPE_MANUAL)
            .await?;

        log::info!("Scan {} started over {} document(s)", token, total);
        Ok(ScanStartResponse {
            message: "Scan initialized.".to_string(),
            resume: false,
            token,
            total,
            processed: 0,
            batch: batch_size,
        })
    }

    /// Processes the next slice of the scan identified by `token`.
    pub async fn step(
        &self,
        token: &str,
        settings: &Settings,
    ) -> Result<ScanStepResponse, ServiceError> {
        let state = self.state.load().await?;
        if !state.active {
            return Ok(ScanStepResponse {
                message: "No active scan.".to_string(),
                done: true,
                token: String::new(),
                processed: state.processed,
                total: state.total,
                batch: state.batch_size,
                last_doc_id: None,
            });
        }
        if state.token.is_empty() || token != state.token {
            return Err(ServiceError::InvalidToken("Invalid scan token.".to_string()));
        }

        self.leases
            .refresh(SCAN_LEASE_NAME, &state.token, SCAN_LEASE_TTL)
            .await?;

        let batch_size = state.batch_size;
        let min_batch = settings.scan_min_batch.clamp(1, batch_size);
        let budget = settings.scan_step_budget;
        let started_ms = self.clock.now_ms();

        let ids = self
            .documents
            .list_eligible_ids(&settings.eligible_types, state.cursor_id, batch_size)
            .await?;
        if ids.is_empty() {
            self.complete(state.total).await?;
            return Ok(Self::completed(&state, state.cursor_id));
        }

        let stats = ScanStats::new();
        let ctx = DocumentContext {
            hosts: self.resolver.hosts(),
            documents: self.documents.as_ref(),
            ledger: self.ledger.as_ref(),
            auto_resolve: settings.auto_resolve_permanent,
            follow_external: settings.follow_external_redirects,
            stats: &stats,
        };
        let mut session = self.resolver.session(ResolverOptions::from(settings));

        let mut processed_step: i64 = 0;
        let mut last_id = state.cursor_id;
        for &id in &ids {
            if let Err(e) = process_document(&ctx, &mut session, id).await {
                log::warn!("Skipping document {} after error: {}", id, e);
            }
            last_id = id;
            processed_step += 1;

            if processed_step as usize % state.progress_interval == 0 {
                let processed = (state.processed + processed_step).min(state.total);
                self.state.save_progress(processed, last_id).await?;
            }
            if processed_step as usize >= min_batch && self.clock.elapsed_since(started_ms) >= budget {
                log::debug!("Scan step hit its {:?} budget after {} document(s)", budget, processed_step);
                break;
            }
        }

        let processed_total = (state.processed + processed_step).min(state.total);
        self.state.save_progress(processed_total, last_id).await?;
        log::info!(
            "Scan step processed {} document(s) ({}/{}): {}",
            processed_step,
            processed_total,
            state.total,
            stats.summary()
        );

        let short_page = ids.len() < batch_size && processed_step as usize == ids.len();
        if processed_total >= state.total || short_page {
            self.complete(state.total).await?;
            return Ok(Self::completed(&state, last_id));
        }

        Ok(ScanStepResponse {
            message: "Batch processed.".to_string(),
            done: false,
            token: state.token,
            processed: processed_total,
            total: state.total,
            batch: batch_size,
            last_doc_id: Some(last_id),
        })
    }

    /// Progress of the current scan, if any.
    pub async fn status(&self, settings: &Settings) -> Result<ScanStatusResponse, ServiceError> {
        let state = self.state.load().await?;
        let running = state.active;
        let mut total = state.total;
        if running && total == 0 {
            total = self.documents.count_eligible(&settings.eligible_types).await?;
            self.state.set_total(total).await?;
        }

        let processed = if total > 0 {
            state.processed.min(total)
        } else {
            state.processed
        };
        let remaining = if total > 0 { (total - processed).max(0) } else { 0 };
        let message = if running {
            format!("Scanning... {} of {} processed", processed, total)
        } else {
            "No active scans.".to_string()
        };

        Ok(ScanStatusResponse {
            running,
            total,
            processed,
            remaining,
            in_progress: if running {
                remaining.min(state.batch_size as i64)
            } else {
                0
            },
            token: if running { state.token } else { String::new() },
            batch: state.batch_size,
            message,
        })
    }

    /// Abandons any session and frees the lease.
    pub async fn reset(&self) -> Result<(), ServiceError> {
        self.state.reset().await?;
        self.leases.release(SCAN_LEASE_NAME).await?;
        log::info!("Scan state reset");
        Ok(())
    }

    async fn complete(&self, total: i64) -> Result<(), ServiceError> {
        self.leases.release(SCAN_LEASE_NAME).await?;
        self.state.complete(total).await?;
        self.options
            .set_ms(options::LAST_FINISHED, self.clock.now_ms())
            .await?;
        log::info!("Scan complete: {} document(s)", total);
        Ok(())
    }

    fn completed(state: &ScanState, last_id: i64) -> ScanStepResponse {
        ScanStepResponse {
            message: "Scan complete.".to_string(),
            done: true,
            token: String::new(),
            processed: state.total,
            total: state.total,
            batch: state.batch_size,
            last_doc_id: Some(last_id),
        }
    }
}
