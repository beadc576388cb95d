//! SQLite-backed document store.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use url::Url;

use super::{Document, DocumentStore, PUBLISHED};
use crate::config::DOCUMENT_CACHE_CAPACITY;
use crate::error_handling::StoreError;

const ATTACHMENT_TYPE: &str = "attachment";

/// Fields for inserting a document (tests, seeding, imports).
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: Option<i64>,
    pub doc_type: String,
    pub status: String,
    pub slug: String,
    pub permalink: String,
    pub body: String,
    pub modified_at_ms: i64,
}

impl NewDocument {
    /// A published document of `doc_type` at `permalink`; slug is the last path segment.
    pub fn published(doc_type: &str, permalink: &str, body: &str) -> Self {
        let slug = permalink
            .trim_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            id: None,
            doc_type: doc_type.to_string(),
            status: PUBLISHED.to_string(),
            slug,
            permalink: permalink.to_string(),
            body: body.to_string(),
            modified_at_ms: 0,
        }
    }
}

pub struct SqliteDocumentStore {
    pool: Arc<SqlitePool>,
    base: Url,
    cache: Mutex<LruCache<i64, Document>>,
    taxonomies: Mutex<Option<Vec<String>>>,
    term_memo: Mutex<HashMap<(String, String), Option<String>>>,
}

impl SqliteDocumentStore {
    /// `base` is the site URL permalinks are joined onto.
    pub fn new(pool: Arc<SqlitePool>, base: Url) -> Self {
        let capacity = NonZeroUsize::new(DOCUMENT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            pool,
            base,
            cache: Mutex::new(LruCache::new(capacity)),
            taxonomies: Mutex::new(None),
            term_memo: Mutex::new(HashMap::new()),
        }
    }

    pub async fn insert_document(&self, doc: &NewDocument) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO documents (id, doc_type, status, slug, permalink, body, modified_at_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(doc.id)
        .bind(&doc.doc_type)
        .bind(&doc.status)
        .bind(&doc.slug)
        .bind(&doc.permalink)
        .bind(&doc.body)
        .bind(doc.modified_at_ms)
        .fetch_one(self.pool.as_ref())
        .await?;
        Ok(id)
    }

    pub async fn insert_term(
        &self,
        taxonomy: &str,
        slug: &str,
        permalink: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO terms (taxonomy, slug, permalink) VALUES (?, ?, ?)
             ON CONFLICT(taxonomy, slug) DO UPDATE SET permalink = excluded.permalink",
        )
        .bind(taxonomy)
        .bind(slug)
        .bind(permalink)
        .execute(self.pool.as_ref())
        .await?;
        *self.taxonomies.lock().await = None;
        self.term_memo.lock().await.clear();
        Ok(())
    }

    fn absolute(&self, permalink: &str) -> Result<Url, StoreError> {
        self.base
            .join(permalink)
            .map_err(|e| StoreError::Backend(format!("bad permalink {permalink:?}: {e}")))
    }

    async fn published_permalink_by_id(&self, id: i64) -> Result<Option<String>, StoreError> {
        let permalink: Option<String> = sqlx::query_scalar(
            "SELECT permalink FROM documents WHERE id = ? AND status = ? AND doc_type <> ?",
        )
        .bind(id)
        .bind(PUBLISHED)
        .bind(ATTACHMENT_TYPE)
        .fetch_optional(self.pool.as_ref())
        .await?;
        Ok(permalink)
    }

    async fn published_permalink_by_path(&self, trimmed: &str) -> Result<Option<String>, StoreError> {
        let slug = trimmed.rsplit('/').next().unwrap_or(trimmed);
        let permalink: Option<String> = sqlx::query_scalar(
            "SELECT permalink FROM documents
             WHERE status = ? AND doc_type <> ?
               AND (permalink = ? OR permalink = ? OR slug = ?)
             ORDER BY CASE WHEN slug = ? THEN 1 ELSE 0 END, id
             LIMIT 1",
        )
        .bind(PUBLISHED)
        .bind(ATTACHMENT_TYPE)
        .bind(format!("/{trimmed}/"))
        .bind(format!("/{trimmed}"))
        .bind(slug)
        .bind(slug)
        .fetch_optional(self.pool.as_ref())
        .await?;
        Ok(permalink)
    }

    async fn attachment_permalink(&self, slug: &str) -> Result<Option<String>, StoreError> {
        let permalink: Option<String> = sqlx::query_scalar(
            "SELECT permalink FROM documents WHERE doc_type = ? AND slug = ? ORDER BY id LIMIT 1",
        )
        .bind(ATTACHMENT_TYPE)
        .bind(slug)
        .fetch_optional(self.pool.as_ref())
        .await?;
        Ok(permalink)
    }

    async fn term_permalink(&self, slug: &str) -> Result<Option<String>, StoreError> {
        let taxonomies = {
            let mut guard = self.taxonomies.lock().await;
            match guard.as_ref() {
                Some(list) => list.clone(),
                None => {
                    let list: Vec<String> =
                        sqlx::query_scalar("SELECT DISTINCT taxonomy FROM terms ORDER BY taxonomy")
                            .fetch_all(self.pool.as_ref())
                            .await?;
                    *guard = Some(list.clone());
                    list
                }
            }
        };

        for taxonomy in taxonomies {
            let key = (taxonomy.clone(), slug.to_string());
            if let Some(hit) = self.term_memo.lock().await.get(&key) {
                match hit {
                    Some(permalink) => return Ok(Some(permalink.clone())),
                    None => continue,
                }
            }
            let permalink: Option<String> =
                sqlx::query_scalar("SELECT permalink FROM terms WHERE taxonomy = ? AND slug = ?")
                    .bind(&taxonomy)
                    .bind(slug)
                    .fetch_optional(self.pool.as_ref())
                    .await?;
            self.term_memo.lock().await.insert(key, permalink.clone());
            if permalink.is_some() {
                return Ok(permalink);
            }
        }
        Ok(None)
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        doc_type: row.get("doc_type"),
        status: row.get("status"),
        slug: row.get("slug"),
        permalink: row.get("permalink"),
        body: row.get("body"),
        modified_at_ms: row.get("modified_at_ms"),
    }
}

/// Carries the query (optionally) and fragment of `from` over to `to`.
fn carry_suffix(mut to: Url, from: &Url, keep_query: bool) -> Url {
    if keep_query && to.query().is_none() {
        to.set_query(from.query());
    }
    if to.fragment().is_none() {
        to.set_fragment(from.fragment());
    }
    to
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn list_eligible_ids(
        &self,
        types: &[String],
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<i64>, StoreError> {
        if types.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; types.len()].join(", ");
        let sql = format!(
            "SELECT id FROM documents WHERE status = ? AND doc_type IN ({placeholders}) AND id > ? ORDER BY id ASC LIMIT ?"
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(PUBLISHED);
        for t in types {
            query = query.bind(t);
        }
        let ids = query
            .bind(after_id)
            .bind(limit as i64)
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(ids)
    }

    async fn count_eligible(&self, types: &[String]) -> Result<i64, StoreError> {
        if types.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; types.len()].join(", ");
        let sql = format!(
            "SELECT COUNT(1) FROM documents WHERE status = ? AND doc_type IN ({placeholders})"
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(PUBLISHED);
        for t in types {
            query = query.bind(t);
        }
        Ok(query.fetch_one(self.pool.as_ref()).await?)
    }

    async fn get_document(&self, id: i64) -> Result<Option<Document>, StoreError> {
        if let Some(doc) = self.cache.lock().await.get(&id) {
            return Ok(Some(doc.clone()));
        }
        let row = sqlx::query(
            "SELECT id, doc_type, status, slug, permalink, body, modified_at_ms FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        let doc = row.as_ref().map(row_to_document);
        if let Some(doc) = &doc {
            self.cache.lock().await.put(id, doc.clone());
        }
        Ok(doc)
    }

    async fn commit_body(&self, id: i64, body: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE documents SET body = ? WHERE id = ?")
            .bind(body)
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;
        self.cache.lock().await.pop(&id);
        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!("document {id} not found")));
        }
        log::debug!("Committed new body for document {id}");
        Ok(())
    }

    async fn resolve_to_canonical_url(
        &self,
        absolute_url: &Url,
    ) -> Result<Option<Url>, StoreError> {
        let same_site = absolute_url.host_str() == self.base.host_str()
            && absolute_url.port_or_known_default() == self.base.port_or_known_default();
        if !same_site {
            return Ok(None);
        }

        // ID-based: ?p=<id> / ?page_id=<id>, then permalink or slug
        for (key, value) in absolute_url.query_pairs() {
            if key == "p" || key == "page_id" {
                if let Ok(id) = value.parse::<i64>() {
                    if let Some(permalink) = self.published_permalink_by_id(id).await? {
                        return Ok(Some(carry_suffix(
                            self.absolute(&permalink)?,
                            absolute_url,
                            false,
                        )));
                    }
                }
            }
        }

        let trimmed = absolute_url.path().trim_matches('/');
        if trimmed.is_empty() {
            return Ok(None);
        }
        if let Some(permalink) = self.published_permalink_by_path(trimmed).await? {
            return Ok(Some(carry_suffix(
                self.absolute(&permalink)?,
                absolute_url,
                true,
            )));
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        if let [ATTACHMENT_TYPE, slug] = segments.as_slice() {
            if let Some(permalink) = self.attachment_permalink(slug).await? {
                return Ok(Some(carry_suffix(
                    self.absolute(&permalink)?,
                    absolute_url,
                    true,
                )));
            }
        }

        if let Some(slug) = segments.last() {
            if let Some(permalink) = self.term_permalink(slug).await? {
                return Ok(Some(carry_suffix(
                    self.absolute(&permalink)?,
                    absolute_url,
                    true,
                )));
            }
        }

        Ok(None)
    }
}
