// Shared test helpers: an in-memory service wired to a wiremock "site".
//
// Relative links in seeded documents resolve against the mock server, so a
// mounted HEAD response decides what each link does.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use link_sentinel::clock::ManualClock;
use link_sentinel::config::SettingsStore;
use link_sentinel::documents::{Document, DocumentStore, NewDocument, SqliteDocumentStore};
use link_sentinel::error_handling::StoreError;
use link_sentinel::initialization::init_probe_client;
use link_sentinel::ledger::{LinkIssue, ResolutionStatus};
use link_sentinel::locate::SiteHosts;
use link_sentinel::resolve::ReqwestProbe;
use link_sentinel::scan::ScanStepResponse;
use link_sentinel::storage::run_migrations;
use link_sentinel::{Actor, Gatekeeper, LinkSentinel, SentinelContext};

#[allow(dead_code)]
pub const NONCE: &str = "test-nonce";

/// Creates a single-connection in-memory pool with migrations applied.
#[allow(dead_code)]
pub async fn create_test_pool() -> Arc<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    Arc::new(pool)
}

#[allow(dead_code)]
pub fn admin() -> Actor {
    Actor::manager(1, "Ada")
}

/// Document store whose every read costs `tick` of clock time, so step
/// budgets trip deterministically.
pub struct SlowDocuments {
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

#[allow(dead_code)]
pub struct Site {
    pub server: MockServer,
    pub pool: Arc<SqlitePool>,
    pub clock: Arc<ManualClock>,
    pub documents: Arc<SqliteDocumentStore>,
    pub sentinel: Arc<LinkSentinel>,
    read_cost: Duration,
}

#[allow(dead_code)]
impl Site {
    pub async fn start() -> Self {
        Self::start_with_read_cost(Duration::ZERO).await
    }

    /// Like [`Site::start`], but every document read by the service advances
    /// the clock by `tick`.
    pub async fn start_with_read_cost(tick: Duration) -> Self {
        let server = MockServer::start().await;
        let pool = create_test_pool().await;
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        Self::over(server, pool, clock, tick)
    }

    /// A fresh service over existing state, as after a process restart.
    pub fn over(
        server: MockServer,
        pool: Arc<SqlitePool>,
        clock: Arc<ManualClock>,
        read_cost: Duration,
    ) -> Self {
        let hosts = SiteHosts::new(&server.uri(), &[], &[]).expect("site URL should parse");
        let documents = Arc::new(SqliteDocumentStore::new(pool.clone(), hosts.base().clone()));
        let service_documents: Arc<dyn DocumentStore> = if read_cost.is_zero() {
            documents.clone()
        } else {
            Arc::new(SlowDocuments {
                inner: documents.clone(),
                clock: clock.clone(),
                tick: read_cost,
            })
        };
        let client = init_probe_client("LinkSentinel/test").expect("client should build");
        let ctx = SentinelContext::with_documents(
            pool.clone(),
            hosts,
            service_documents,
            Arc::new(ReqwestProbe::new(client)),
            clock.clone(),
        );
        let sentinel = Arc::new(LinkSentinel::new(ctx, Gatekeeper::new(None)));
        Self {
            server,
            pool,
            clock,
            documents,
            sentinel,
            read_cost,
        }
    }

    pub fn restart(self) -> Self {
        Self::over(self.server, self.pool, self.clock, self.read_cost)
    }

    pub async fn seed(&self, permalink: &str, body: &str) -> i64 {
        self.documents
            .insert_document(&NewDocument::published("post", permalink, body))
            .await
            .expect("document should insert")
    }

    pub async fn body(&self, id: i64) -> String {
        self.documents
            .get_document(id)
            .await
            .expect("document should load")
            .expect("document should exist")
            .body
    }

    /// Answers `HEAD <route>` with `status` (and a `Location` when given).
    pub async fn head(&self, route: &str, status: u16, location: Option<&str>) {
        let mut response = ResponseTemplate::new(status);
        if let Some(location) = location {
            response = response.insert_header("location", location);
        }
        Mock::given(method("HEAD"))
            .and(path(route))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    pub async fn set(&self, key: &str, value: &str) {
        self.sentinel
            .context()
            .settings
            .set(key, value)
            .await
            .expect("setting should store");
    }

    /// HEAD requests the site has seen for `route`.
    pub async fn hits(&self, route: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == "HEAD" && r.url.path() == route)
            .count()
    }

    /// Starts a scan and steps it to completion.
    pub async fn scan(&self) -> ScanStepResponse {
        let start = self
            .sentinel
            .start_scan(&admin(), Some(NONCE))
            .await
            .expect("scan should start");
        let mut token = start.token;
        for _ in 0..100 {
            let step = self
                .sentinel
                .step_scan(&admin(), Some(NONCE), &token)
                .await
                .expect("scan step should succeed");
            if step.done {
                return step;
            }
            token = step.token;
        }
        panic!("scan did not finish");
    }

    pub async fn issues(&self) -> Vec<LinkIssue> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM link_issues ORDER BY id")
            .fetch_all(self.pool.as_ref())
            .await
            .expect("ids should load");
        let ledger = &self.sentinel.context().ledger;
        let mut out = Vec::new();
        for id in ids {
            out.push(ledger.get(id).await.expect("issue should load").expect("issue exists"));
        }
        out
    }

    pub async fn issues_with(&self, status: ResolutionStatus) -> Vec<LinkIssue> {
        self.issues()
            .await
            .into_iter()
            .filter(|i| i.resolution_status == status)
            .collect()
    }
}
