use std::collections::HashSet;
use std::path::Path;

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::warn;

use super::models::{CacheEntry, CacheRow, SourceRow};
use crate::core::feed::types::{FeedItem, SourceKind, SourceRef};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One handle over the three durable stores: subscriptions, watched items,
/// and the per-source feed cache.
#[derive(Debug, Clone)]
pub struct FeedRepository {
    pool: SqlitePool,
}

pub fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}?mode=rwc", path.to_string_lossy())
}

impl FeedRepository {
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    // -- subscription store --------------------------------------------------

    pub async fn add_source(&self, source: &SourceRef) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO sources (id, kind, display_name)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
              kind = excluded.kind,
              display_name = excluded.display_name,
              updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&source.id)
        .bind(source.kind.as_str())
        .bind(&source.display_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_source(&self, source_id: &str) -> Result<u64, StorageError> {
        let affected = sqlx::query("DELETE FROM sources WHERE id = ?1")
            .bind(source_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected)
    }

    pub async fn list_sources(&self) -> Result<Vec<SourceRef>, StorageError> {
        let rows = sqlx::query_as::<_, SourceRow>(
            r#"
            SELECT id, kind, display_name
            FROM sources
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut sources = Vec::with_capacity(rows.len());
        for row in rows {
            match SourceKind::parse(&row.kind) {
                Some(kind) => sources.push(SourceRef {
                    id: row.id,
                    kind,
                    display_name: row.display_name,
                }),
                None => warn!(source_id = %row.id, kind = %row.kind, "skipping source with unknown kind"),
            }
        }
        Ok(sources)
    }

    // -- watched store -------------------------------------------------------

    /// Monotonic: marking twice is a no-op, entries are never pruned.
    pub async fn mark_watched(&self, item_id: &str) -> Result<(), StorageError> {
        sqlx::query("INSERT OR IGNORE INTO watched_items (item_id) VALUES (?1)")
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn is_watched(&self, item_id: &str) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT item_id FROM watched_items WHERE item_id = ?1")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn watched_ids(&self) -> Result<HashSet<String>, StorageError> {
        let rows = sqlx::query_as::<_, (String,)>("SELECT item_id FROM watched_items")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(item_id,)| item_id).collect())
    }

    // -- cache store ---------------------------------------------------------

    /// An unreadable payload is a cold start for that source, never an error.
    pub async fn get_cache_entry(
        &self,
        source_id: &str,
    ) -> Result<Option<CacheEntry>, StorageError> {
        let row = sqlx::query_as::<_, CacheRow>(
            r#"
            SELECT source_id, payload, etag, last_modified, fetched_at, ttl_seconds
            FROM feed_cache
            WHERE source_id = ?1
            "#,
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        match serde_json::from_str::<Vec<FeedItem>>(&row.payload) {
            Ok(items) => Ok(Some(CacheEntry {
                source_id: row.source_id,
                items,
                etag: row.etag,
                last_modified: row.last_modified,
                fetched_at: row.fetched_at,
                ttl_seconds: row.ttl_seconds,
            })),
            Err(error) => {
                warn!(source_id, %error, "corrupt cache payload, treating as empty");
                Ok(None)
            }
        }
    }

    /// Atomic full replacement of the entry; merging never happens here.
    pub async fn put_cache_entry(&self, entry: &CacheEntry) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&entry.items)?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO feed_cache
              (source_id, payload, etag, last_modified, fetched_at, ttl_seconds)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&entry.source_id)
        .bind(payload)
        .bind(&entry.etag)
        .bind(&entry.last_modified)
        .bind(entry.fetched_at)
        .bind(entry.ttl_seconds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Revalidated-but-unchanged entries keep their items and get a fresh
    /// `fetched_at`.
    pub async fn touch_cache_entry(
        &self,
        source_id: &str,
        fetched_at: i64,
    ) -> Result<u64, StorageError> {
        let affected = sqlx::query("UPDATE feed_cache SET fetched_at = ?1 WHERE source_id = ?2")
            .bind(fetched_at)
            .bind(source_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected)
    }
}
