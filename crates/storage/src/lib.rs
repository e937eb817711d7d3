//! Persistence Gateway (spec §4.3): upsert-by-`url`, invalidate stale
//! outbound edges for a re-fetched parent, and query the parents of
//! previously-broken links for seeding (spec §4.5 step 2).
//!
//! Deployment target is SQLite rather than the teacher's Postgres pool —
//! a single-site auditing tool's natural home is one file next to the
//! crawl, not a pool sized for hundreds of dark-web workers (see
//! DESIGN.md). Connection lifecycle still follows the teacher's
//! `Storage::new` + `run_migrations` + `Arc`-shared-handle pattern.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use sitecrawl_core::types::{FetchResult, LinkRow};

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open (creating if absent) the SQLite database at `path` with up to
    /// `max_connections` pooled connections (spec §4.3: "a connection whose
    /// lifecycle is bracketed by the caller").
    pub async fn new(path: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        info!(path, max_connections, "opened sqlite database");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await?;
        info!("migrations complete");
        Ok(())
    }

    /// `upsert(result, start_url)` — spec §4.3: insert or update in place by
    /// `url`, stamping `date` to now.
    pub async fn upsert(&self, result: &FetchResult, start_url: &str) -> Result<()> {
        let row = LinkRow::from_result(result, start_url);
        sqlx::query(
            r#"INSERT INTO link (url, start_url, parent, duration_ms, size, content_type, response_code, response_reason, date)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
               ON CONFLICT (url) DO UPDATE SET
                   start_url = excluded.start_url,
                   parent = excluded.parent,
                   duration_ms = excluded.duration_ms,
                   size = excluded.size,
                   content_type = excluded.content_type,
                   response_code = excluded.response_code,
                   response_reason = excluded.response_reason,
                   date = excluded.date"#,
        )
        .bind(&row.url)
        .bind(&row.start_url)
        .bind(&row.parent)
        .bind(row.duration_ms)
        .bind(row.size)
        .bind(&row.content_type)
        .bind(row.response_code)
        .bind(&row.response_reason)
        .bind(row.date.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `invalidate_children(parent_url, start_url)` — spec §4.3: delete
    /// every row whose `parent` equals `parent_url` under `start_url`, run
    /// immediately after `upsert` of the parent so stale edges from a past
    /// crawl never linger alongside the fresh edge set (spec §3 invariant 4,
    /// §9 edge-invalidation-ordering note).
    pub async fn invalidate_children(&self, parent_url: &str, start_url: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM link WHERE parent = ?1 AND start_url = ?2")
            .bind(parent_url)
            .bind(start_url)
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected();
        if deleted > 0 {
            debug!(parent_url, deleted, "invalidated stale child edges");
        }
        Ok(deleted)
    }

    /// `select_broken_parents(start_url)` — spec §4.3: the distinct set of
    /// `parent` URLs referenced by rows whose `response_code != 200` under
    /// `start_url`. Used only for seeding (spec §4.5 step 2).
    pub async fn select_broken_parents(&self, start_url: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT parent FROM link WHERE response_code != 200 AND start_url = ?1 AND parent != ''",
        )
        .bind(start_url)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(parent,)| parent).collect())
    }

    /// Look up the stored `parent` of `url` itself, i.e. the page on which
    /// `url` was discovered. Used by the two-hop seeding lookup (spec §4.5
    /// step 2: "look up the row for `p`, take its `parent`").
    pub async fn parent_of(&self, url: &str, start_url: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT parent FROM link WHERE url = ?1 AND start_url = ?2")
                .bind(url)
                .bind(start_url)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(parent,)| parent))
    }

    /// Total pages crawled under `start_url` (for the `report` command).
    pub async fn page_count(&self, start_url: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM link WHERE start_url = ?1")
            .bind(start_url)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Total rows whose `response_code != 200` under `start_url` (broken
    /// links, for the `report` command).
    pub async fn broken_count(&self, start_url: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM link WHERE start_url = ?1 AND response_code != 200",
        )
        .bind(start_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn result(url: &str, parent: &str, code: i32) -> FetchResult {
        FetchResult {
            url: url.to_string(),
            parent_url: parent.to_string(),
            duration: 0.1,
            response_code: code,
            response_reason: "OK".to_string(),
            response_size: 100,
            response_content_type: "text/html".to_string(),
            links: BTreeSet::new(),
            process_name: "test".to_string(),
        }
    }

    async fn memory_storage() -> Storage {
        let storage = Storage::new(":memory:", 1).await.unwrap();
        storage.run_migrations().await.unwrap();
        storage
    }

    #[tokio::test]
    async fn upsert_then_read_back() {
        let storage = memory_storage().await;
        storage
            .upsert(&result("http://x.test/", "", 200), "http://x.test/")
            .await
            .unwrap();
        assert_eq!(storage.page_count("http://x.test/").await.unwrap(), 1);
        assert_eq!(storage.broken_count("http://x.test/").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_url() {
        let storage = memory_storage().await;
        storage
            .upsert(&result("http://x.test/a", "http://x.test/", 200), "http://x.test/")
            .await
            .unwrap();
        storage
            .upsert(&result("http://x.test/a", "http://x.test/", 500), "http://x.test/")
            .await
            .unwrap();
        assert_eq!(storage.page_count("http://x.test/").await.unwrap(), 1);
        assert_eq!(storage.broken_count("http://x.test/").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn invalidate_children_removes_only_that_parents_rows() {
        let storage = memory_storage().await;
        storage
            .upsert(&result("http://x.test/a", "http://x.test/", 200), "http://x.test/")
            .await
            .unwrap();
        storage
            .upsert(&result("http://x.test/b", "http://x.test/other", 200), "http://x.test/")
            .await
            .unwrap();
        let deleted = storage
            .invalidate_children("http://x.test/", "http://x.test/")
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(storage.page_count("http://x.test/").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn select_broken_parents_is_distinct() {
        let storage = memory_storage().await;
        storage
            .upsert(&result("http://x.test/dead1", "http://x.test/p", 500), "http://x.test/")
            .await
            .unwrap();
        storage
            .upsert(&result("http://x.test/dead2", "http://x.test/p", 404), "http://x.test/")
            .await
            .unwrap();
        storage
            .upsert(&result("http://x.test/ok", "http://x.test/p", 200), "http://x.test/")
            .await
            .unwrap();
        let parents = storage.select_broken_parents("http://x.test/").await.unwrap();
        assert_eq!(parents, vec!["http://x.test/p".to_string()]);
    }

    #[tokio::test]
    async fn parent_of_resolves_two_hop_seed_lookup() {
        let storage = memory_storage().await;
        storage
            .upsert(&result("http://x.test/p", "http://x.test/", 200), "http://x.test/")
            .await
            .unwrap();
        let parent = storage.parent_of("http://x.test/p", "http://x.test/").await.unwrap();
        assert_eq!(parent, Some("http://x.test/".to_string()));
    }
}
