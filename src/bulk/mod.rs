//! Bulk resolution of pending redirects.
//!
//! The session state lives with the caller: every [`BulkResolver::step`]
//! receives the token, cursor and counters from the previous response and
//! returns the next ones. The server side only keeps a lease so two sessions
//! never interleave.

mod adaptive;
mod driver;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::{
    Settings, MAX_RESOLVE_ALL_BATCH_SIZE, MIN_RESOLVE_ALL_BATCH_SIZE, RESOLVE_ALL_LEASE_NAME,
    RESOLVE_ALL_LEASE_TTL,
};
use crate::documents::DocumentStore;
use crate::error_handling::ServiceError;
use crate::ledger::{Ledger, Resolution};
use crate::rewrite::{rewrite_document, RewriteOutcome};
use crate::storage::{new_token, LeaseStore};

pub use adaptive::{backoff, next_batch_hint};
pub use driver::{BulkResolveDriver, BulkResolveState, ResolveAllStepper};

/// Caller-carried session state for one step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveAllRequest {
    /// Absent (or empty) to start a new session.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub cursor: i64,
    #[serde(default)]
    pub batch: Option<usize>,
    #[serde(default)]
    pub processed: i64,
    /// Zero until the first step has counted the work.
    #[serde(default)]
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveAllResponse {
    pub message: String,
    pub done: bool,
    pub token: String,
    pub cursor: i64,
    pub processed_step: i64,
    pub processed: i64,
    pub total: i64,
    pub last_step_seconds: f64,
    pub step_budget_secs: f64,
    /// Batch size for the next step, when it should change.
    pub next_batch: Option<usize>,
}

/// Who is resolving, for the ledger attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub actor_id: i64,
    pub message: String,
}

pub struct BulkResolver {
    documents: Arc<dyn DocumentStore>,
    ledger: Arc<Ledger>,
    leases: Arc<LeaseStore>,
    clock: Arc<dyn Clock>,
}

fn round_millis(d: Duration) -> f64 {
    (d.as_secs_f64() * 1000.0).round() / 1000.0
}

impl BulkResolver {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        ledger: Arc<Ledger>,
        leases: Arc<LeaseStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            documents,
            ledger,
            leases,
            clock,
        }
    }

    /// Resolves the next slice of pending redirects.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` when starting while another session holds the lease
    /// - `SessionExpired` when the token no longer matches the live lease
    pub async fn step(
        &self,
        request: &ResolveAllRequest,
        attribution: &Attribution,
        settings: &Settings,
    ) -> Result<ResolveAllResponse, ServiceError> {
        let started_ms = self.clock.now_ms();
        let budget = settings.resolve_all_step_budget;
        let batch = request
            .batch
            .unwrap_or(settings.resolve_all_batch_size)
            .clamp(MIN_RESOLVE_ALL_BATCH_SIZE, MAX_RESOLVE_ALL_BATCH_SIZE);

        let token = match request.token.as_deref().filter(|t| !t.is_empty()) {
            None => {
                let token = new_token();
                if !self
                    .leases
                    .try_acquire(RESOLVE_ALL_LEASE_NAME, &token, RESOLVE_ALL_LEASE_TTL)
                    .await?
                {
                    return Err(ServiceError::AlreadyRunning(
                        "Another bulk resolve is already running. Please wait for it to finish."
                            .to_string(),
                    ));
                }
                log::info!("Bulk resolve session {} started", token);
                token
            }
            Some(token) => {
                let live = self.leases.live(RESOLVE_ALL_LEASE_NAME).await?;
                if live.as_deref() != Some(token) {
                    return Err(ServiceError::SessionExpired(
                        "Bulk resolve session has expired. Please try again.".to_string(),
                    ));
                }
                self.leases
                    .refresh(RESOLVE_ALL_LEASE_NAME, token, RESOLVE_ALL_LEASE_TTL)
                    .await?;
                token.to_string()
            }
        };

        let finished = |message: &str, total: i64| ResolveAllResponse {
            message: message.to_string(),
            done: true,
            token: String::new(),
            cursor: request.cursor,
            processed_step: 0,
            processed: request.processed,
            total,
            last_step_seconds: round_millis(self.clock.elapsed_since(started_ms)),
            step_budget_secs: budget.as_secs_f64(),
            next_batch: None,
        };

        let mut total = request.total;
        if total <= 0 {
            total = self.ledger.count_resolvable().await?;
            if total == 0 {
                self.leases.release(RESOLVE_ALL_LEASE_NAME).await?;
                return Ok(finished("No pending redirects to resolve.", 0));
            }
        }

        let records = self.ledger.resolvable_after(request.cursor, batch).await?;
        if records.is_empty() {
            self.leases.release(RESOLVE_ALL_LEASE_NAME).await?;
            return Ok(finished("All pending redirects have been resolved.", total));
        }

        let resolution = Resolution {
            final_url: None,
            status_override: None,
            message: attribution.message.clone(),
            actor_id: attribution.actor_id,
        };

        let mut processed_step: i64 = 0;
        let mut cursor = request.cursor;
        let mut hit_budget = false;
        for record in &records {
            cursor = record.id;
            if record.document_id > 0 {
                match rewrite_document(
                    self.documents.as_ref(),
                    record.document_id,
                    &record.original_url,
                    &record.final_url,
                )
                .await
                {
                    Ok(RewriteOutcome::Missing) => log::debug!(
                        "Document {} missing; resolving entry {} anyway",
                        record.document_id,
                        record.id
                    ),
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!(
                            "Could not rewrite document {} for entry {}: {}",
                            record.document_id,
                            record.id,
                            e
                        );
                        continue;
                    }
                }
            }
            match self.ledger.mark_resolved(record.id, &resolution).await {
                Ok(true) => processed_step += 1,
                Ok(false) => log::debug!("Entry {} was resolved concurrently", record.id),
                Err(e) => log::warn!("Could not mark entry {} resolved: {}", record.id, e),
            }

            if self.clock.elapsed_since(started_ms) >= budget {
                hit_budget = true;
                break;
            }
        }

        let processed = (request.processed + processed_step).min(total);
        let last_step = self.clock.elapsed_since(started_ms);
        let done = processed >= total || (!hit_budget && records.len() < batch);

        if done {
            self.leases.release(RESOLVE_ALL_LEASE_NAME).await?;
            log::info!("Bulk resolve session {} finished: {}/{}", token, processed, total);
        } else {
            log::info!(
                "Bulk resolve step: {} resolved in {:.3}s ({}/{})",
                processed_step,
                last_step.as_secs_f64(),
                processed,
                total
            );
        }

        Ok(ResolveAllResponse {
            message: if done {
                "All pending redirects have been resolved.".to_string()
            } else {
                "Resolving pending redirects...".to_string()
            },
            done,
            token: if done { String::new() } else { token },
            cursor,
            processed_step,
            processed,
            total,
            last_step_seconds: round_millis(last_step),
            step_budget_secs: budget.as_secs_f64(),
            next_batch: if done {
                None
            } else {
                next_batch_hint(batch, last_step, budget)
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::documents::{Document, NewDocument, SqliteDocumentStore};
    use crate::error_handling::StoreError;
    use crate::ledger::{NewIssue, ResolutionStatus};
    use crate::storage::test_helpers::create_test_pool;
    use async_trait::async_trait;
    use url::Url;

    /// Store whose every document read costs `tick` of clock time.
    struct SlowDocuments {
        inner: Arc<SqliteDocumentStore>,
        clock: Arc<ManualClock>,
        tick: Duration,
    }

    #[async_trait]
    impl DocumentStore for SlowDocuments {
        async fn list_eligible_ids(
            &self,
            types: &[String],
            after_id: i64,
            limit: usize,
        ) -> Result<Vec<i64>, StoreError> {
            self.inner.list_eligible_ids(types, after_id, limit).await
        }

        async fn count_eligible(&self, types: &[String]) -> Result<i64, StoreError> {
            self.inner.count_eligible(types).await
        }

        async fn get_document(&self, id: i64) -> Result<Option<Document>, StoreError> {
            self.clock.advance(self.tick);
            self.inner.get_document(id).await
        }

        async fn commit_body(&self, id: i64, body: &str) -> Result<(), StoreError> {
            self.inner.commit_body(id, body).await
        }

        async fn resolve_to_canonical_url(
            &self,
            absolute_url: &Url,
        ) -> Result<Option<Url>, StoreError> {
            self.inner.resolve_to_canonical_url(absolute_url).await
        }
    }

    struct Fixture {
        bulk: BulkResolver,
        ledger: Arc<Ledger>,
        documents: Arc<SqliteDocumentStore>,
        clock: Arc<ManualClock>,
    }

    async fn fixture() -> Fixture {
        fixture_with_read_cost(Duration::ZERO).await
    }

    async fn fixture_with_read_cost(tick: Duration) -> Fixture {
        let pool = Arc::new(create_test_pool().await);
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let documents = Arc::new(SqliteDocumentStore::new(
            pool.clone(),
            Url::parse("https://example.org/").unwrap(),
        ));
        let slow = Arc::new(SlowDocuments {
            inner: documents.clone(),
            clock: clock.clone(),
            tick,
        });
        let ledger = Arc::new(Ledger::new(pool.clone(), clock.clone()));
        let leases = Arc::new(LeaseStore::new(pool, clock.clone()));
        Fixture {
            bulk: BulkResolver::new(slow, ledger.clone(), leases, clock.clone()),
            ledger,
            documents,
            clock,
        }
    }

    fn who() -> Attribution {
        Attribution {
            actor_id: 3,
            message: "Manually Resolved by Grace".to_string(),
        }
    }

    async fn seed(f: &Fixture, n: usize) -> i64 {
        let body: String = (0..n)
            .map(|i| format!(r#"<a href="/old-{i}/">{i}</a>"#))
            .collect();
        let doc = f
            .documents
            .insert_document(&NewDocument::published("post", "/p/", &body))
            .await
            .unwrap();
        for i in 0..n {
            f.ledger
                .record_issue(&NewIssue {
                    document_id: doc,
                    original_url: format!("/old-{i}/"),
                    final_url: format!("/new-{i}/"),
                    http_status: 302,
                    status_message: "Temporary Redirect".into(),
                    resolution_status: ResolutionStatus::Pending,
                    resolved_by: 0,
                })
                .await
                .unwrap();
        }
        doc
    }

    #[tokio::test]
    async fn test_nothing_to_resolve() {
        let f = fixture().await;
        let response = f
            .bulk
            .step(&ResolveAllRequest::default(), &who(), &Settings::default())
            .await
            .unwrap();
        assert!(response.done);
        assert_eq!(response.total, 0);
        assert_eq!(response.message, "No pending redirects to resolve.");
        // Lease was released: a new session can start
        assert!(f
            .bulk
            .step(&ResolveAllRequest::default(), &who(), &Settings::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_session_walks_cursor_to_completion() {
        let f = fixture().await;
        let doc = seed(&f, 5).await;
        let settings = Settings::default();

        let first = f
            .bulk
            .step(
                &ResolveAllRequest {
                    batch: Some(2),
                    ..Default::default()
                },
                &who(),
                &settings,
            )
            .await
            .unwrap();
        assert!(!first.done);
        assert_eq!(first.total, 5);
        assert_eq!(first.processed_step, 2);
        assert_eq!(first.processed, 2);
        assert!(!first.token.is_empty());

        let mut request = ResolveAllRequest {
            token: Some(first.token.clone()),
            cursor: first.cursor,
            batch: Some(2),
            processed: first.processed,
            total: first.total,
        };
        let second = f.bulk.step(&request, &who(), &settings).await.unwrap();
        assert!(!second.done);
        request.cursor = second.cursor;
        request.processed = second.processed;
        let third = f.bulk.step(&request, &who(), &settings).await.unwrap();
        assert!(third.done);
        assert_eq!(third.processed, 5);
        assert!(third.token.is_empty());

        assert_eq!(f.ledger.count_resolvable().await.unwrap(), 0);
        let body = f.documents.get_document(doc).await.unwrap().unwrap().body;
        assert!(!body.contains("/old-"));
        assert!(body.contains(r#"href="/new-4/""#));

        let resolved = f
            .ledger
            .page_resolved(Default::default(), 1, Default::default(), None)
            .await
            .unwrap();
        assert!(resolved
            .items
            .iter()
            .all(|i| i.resolved_by == 3 && i.status_message == "Manually Resolved by Grace"));
    }

    #[tokio::test]
    async fn test_second_session_is_rejected_and_stale_token_expires() {
        let f = fixture().await;
        seed(&f, 4).await;
        let settings = Settings::default();
        let request = ResolveAllRequest {
            batch: Some(1),
            ..Default::default()
        };
        let first = f.bulk.step(&request, &who(), &settings).await.unwrap();
        assert!(!first.done);

        let err = f.bulk.step(&request, &who(), &settings).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyRunning(_)));

        let wrong = ResolveAllRequest {
            token: Some("not-the-token".into()),
            ..request.clone()
        };
        let err = f.bulk.step(&wrong, &who(), &settings).await.unwrap_err();
        assert!(matches!(err, ServiceError::SessionExpired(_)));

        // Lease lapses after its TTL
        f.clock.advance(RESOLVE_ALL_LEASE_TTL + Duration::from_secs(1));
        let expired = ResolveAllRequest {
            token: Some(first.token),
            cursor: first.cursor,
            processed: first.processed,
            total: first.total,
            batch: Some(1),
        };
        let err = f.bulk.step(&expired, &who(), &settings).await.unwrap_err();
        assert!(matches!(err, ServiceError::SessionExpired(_)));
    }

    #[tokio::test]
    async fn test_missing_document_is_skipped_but_resolved() {
        let f = fixture().await;
        f.ledger
            .record_issue(&NewIssue {
                document_id: 999,
                original_url: "/gone/".into(),
                final_url: "/here/".into(),
                http_status: 301,
                status_message: "Permanent Redirect".into(),
                resolution_status: ResolutionStatus::Pending,
                resolved_by: 0,
            })
            .await
            .unwrap();
        let response = f
            .bulk
            .step(&ResolveAllRequest::default(), &who(), &Settings::default())
            .await
            .unwrap();
        assert!(response.done);
        assert_eq!(response.processed, 1);
    }

    #[tokio::test]
    async fn test_budget_stop_keeps_short_page_session_open() {
        // Default budget is 12s; each record's document read costs 6s
        let f = fixture_with_read_cost(Duration::from_secs(6)).await;
        seed(&f, 3).await;
        let settings = Settings::default();

        let first = f
            .bulk
            .step(
                &ResolveAllRequest {
                    batch: Some(5),
                    ..Default::default()
                },
                &who(),
                &settings,
            )
            .await
            .unwrap();
        // Page of 3 is shorter than the batch, but the budget cut it off
        assert!(!first.done);
        assert_eq!(first.processed_step, 2);
        assert_eq!(first.processed, 2);
        assert_eq!(first.last_step_seconds, 12.0);
        assert_eq!(first.next_batch, Some(2));
        assert_eq!(f.ledger.count_resolvable().await.unwrap(), 1);

        let second = f
            .bulk
            .step(
                &ResolveAllRequest {
                    token: Some(first.token),
                    cursor: first.cursor,
                    batch: first.next_batch,
                    processed: first.processed,
                    total: first.total,
                },
                &who(),
                &settings,
            )
            .await
            .unwrap();
        assert!(second.done);
        assert_eq!(second.processed, 3);
        assert_eq!(f.ledger.count_resolvable().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_slow_steps_shrink_batch_down_to_one() {
        // Every record alone blows the 12s budget
        let f = fixture_with_read_cost(Duration::from_secs(12)).await;
        seed(&f, 10).await;
        let settings = Settings::default();

        let mut request = ResolveAllRequest {
            batch: Some(8),
            ..Default::default()
        };
        let mut batches = vec![8];
        for _ in 0..5 {
            let response = f.bulk.step(&request, &who(), &settings).await.unwrap();
            assert!(!response.done);
            assert_eq!(response.processed_step, 1);
            if let Some(next) = response.next_batch {
                batches.push(next);
            }
            request = ResolveAllRequest {
                token: Some(response.token),
                cursor: response.cursor,
                batch: response.next_batch.or(request.batch),
                processed: response.processed,
                total: response.total,
            };
        }
        assert_eq!(batches, vec![8, 4, 2, 1]);
        assert_eq!(request.batch, Some(1));
    }
}
