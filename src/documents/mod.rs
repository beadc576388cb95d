//! Document store interface.
//!
//! The scanner never owns content: it lists, reads and rewrites documents
//! through [`DocumentStore`]. [`SqliteDocumentStore`] is the bundled
//! implementation over the `documents` and `terms` tables.

mod sqlite;

use async_trait::async_trait;
use url::Url;

use crate::error_handling::StoreError;

pub use sqlite::{NewDocument, SqliteDocumentStore};

/// Status a document must have to be scanned or used as a canonical target.
pub const PUBLISHED: &str = "publish";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: i64,
    pub doc_type: String,
    pub status: String,
    pub slug: String,
    /// Site-relative permalink, e.g. `/hello-world/`.
    pub permalink: String,
    pub body: String,
    pub modified_at_ms: i64,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// IDs of published documents of the given types with `id > after_id`, ascending.
    async fn list_eligible_ids(
        &self,
        types: &[String],
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<i64>, StoreError>;

    async fn count_eligible(&self, types: &[String]) -> Result<i64, StoreError>;

    async fn get_document(&self, id: i64) -> Result<Option<Document>, StoreError>;

    /// Replaces the body. Must leave every other field (notably the
    /// modification timestamp) untouched and drop any cached copy.
    async fn commit_body(&self, id: i64, body: &str) -> Result<(), StoreError>;

    /// Authoritative absolute URL for an internal URL, or `None` when the
    /// store knows nothing about it.
    async fn resolve_to_canonical_url(&self, absolute_url: &Url)
        -> Result<Option<Url>, StoreError>;
}
