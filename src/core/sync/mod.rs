use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::feed::types::{FeedItem, SourceKind, SourceRef};
use crate::core::feed::{FetchOutcome, FetchRequest, SourceAdapter, SourceError};
use crate::core::storage::models::CacheEntry;
use crate::core::storage::repository::{FeedRepository, StorageError};

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub ttl_seconds: i64,
    pub max_items_per_source: usize,
    /// Upper bound on in-flight fetches within one pass.
    pub concurrency: usize,
    /// Overall deadline for one pass; fetches still pending afterwards count
    /// as failures for their source only.
    pub refresh_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 1800,
            max_items_per_source: 15,
            concurrency: 4,
            refresh_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// The fetch failed but a stale snapshot was served instead.
    ServedStale,
    /// The fetch failed and nothing was cached; the source contributed no
    /// items this pass.
    NoData,
}

#[derive(Debug, Clone)]
pub struct SourceWarning {
    pub source_id: String,
    pub kind: WarningKind,
    pub detail: String,
}

#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    pub items: Vec<FeedItem>,
    pub warnings: Vec<SourceWarning>,
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("all {failed} sources failed with no cached data")]
    AllSourcesFailed {
        failed: usize,
        warnings: Vec<SourceWarning>,
    },
}

enum Plan {
    Fresh(CacheEntry),
    Pending {
        cached: Option<CacheEntry>,
        task: JoinHandle<Result<FetchOutcome, SourceError>>,
    },
}

/// Orchestrates adapters, cache, and watched store into one merged feed.
/// Owns no durable state of its own.
pub struct Aggregator {
    repository: FeedRepository,
    api: Arc<dyn SourceAdapter>,
    feed: Arc<dyn SourceAdapter>,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(
        repository: FeedRepository,
        api: Arc<dyn SourceAdapter>,
        feed: Arc<dyn SourceAdapter>,
    ) -> Self {
        Self {
            repository,
            api,
            feed,
            config: AggregatorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AggregatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn repository(&self) -> &FeedRepository {
        &self.repository
    }

    /// Refresh the full subscription set.
    pub async fn refresh_all(&self) -> Result<FeedSnapshot, RefreshError> {
        let sources = self.repository.list_sources().await?;
        self.refresh(&sources).await
    }

    /// Produce the merged, deduplicated, time-ordered feed for `sources`.
    ///
    /// Per source: a fresh cache entry is served as-is; a stale or missing
    /// entry triggers a bounded-concurrency fetch. Fetch failures fall back
    /// to the stale snapshot when one exists and are reported as warnings,
    /// so one broken source never suppresses the others.
    pub async fn refresh(&self, sources: &[SourceRef]) -> Result<FeedSnapshot, RefreshError> {
        if sources.is_empty() {
            return Ok(FeedSnapshot::default());
        }

        let now = Utc::now().timestamp();
        self.api.begin_pass();
        self.feed.begin_pass();
        let deadline = tokio::time::Instant::now() + self.config.refresh_timeout;
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));

        let mut plans: Vec<Plan> = Vec::with_capacity(sources.len());
        for source in sources {
            let cached = match self.repository.get_cache_entry(&source.id).await {
                Ok(cached) => cached,
                Err(storage_error) => {
                    warn!(source_id = %source.id, error = %storage_error, "cache read failed, cold start for source");
                    None
                }
            };
            match cached {
                Some(entry) if !entry.is_stale(now) => plans.push(Plan::Fresh(entry)),
                cached => {
                    let task = self.spawn_fetch(source, &cached, Arc::clone(&semaphore), deadline);
                    plans.push(Plan::Pending { cached, task });
                }
            }
        }

        let mut per_source: Vec<Vec<FeedItem>> = Vec::with_capacity(sources.len());
        let mut warnings: Vec<SourceWarning> = Vec::new();
        let mut hard_failures = 0_usize;

        for (source, plan) in sources.iter().zip(plans) {
            match plan {
                Plan::Fresh(entry) => per_source.push(entry.items),
                Plan::Pending { cached, task } => {
                    let fetched = match task.await {
                        Ok(result) => result,
                        Err(join_error) => Err(SourceError::Unavailable(format!(
                            "fetch task failed: {join_error}"
                        ))),
                    };
                    match fetched {
                        Ok(FetchOutcome::Updated {
                            items,
                            etag,
                            last_modified,
                        }) => {
                            let entry = CacheEntry {
                                source_id: source.id.clone(),
                                items: items.clone(),
                                etag,
                                last_modified,
                                fetched_at: now,
                                ttl_seconds: self.config.ttl_seconds,
                            };
                            if let Err(storage_error) =
                                self.repository.put_cache_entry(&entry).await
                            {
                                warn!(source_id = %source.id, error = %storage_error, "cache write failed, serving uncached items");
                            }
                            per_source.push(items);
                        }
                        Ok(FetchOutcome::NotModified) => match cached {
                            Some(entry) => {
                                if let Err(storage_error) =
                                    self.repository.touch_cache_entry(&source.id, now).await
                                {
                                    warn!(source_id = %source.id, error = %storage_error, "cache touch failed");
                                }
                                per_source.push(entry.items);
                            }
                            None => {
                                hard_failures += 1;
                                warnings.push(SourceWarning {
                                    source_id: source.id.clone(),
                                    kind: WarningKind::NoData,
                                    detail: "origin reported not-modified but nothing is cached"
                                        .to_string(),
                                });
                                per_source.push(Vec::new());
                            }
                        },
                        Err(source_error) => match cached {
                            Some(entry) => {
                                warn!(source_id = %source.id, error = %source_error, "fetch failed, serving stale snapshot");
                                warnings.push(SourceWarning {
                                    source_id: source.id.clone(),
                                    kind: WarningKind::ServedStale,
                                    detail: source_error.to_string(),
                                });
                                per_source.push(entry.items);
                            }
                            None => {
                                warn!(source_id = %source.id, error = %source_error, "fetch failed with no cached fallback");
                                hard_failures += 1;
                                warnings.push(SourceWarning {
                                    source_id: source.id.clone(),
                                    kind: WarningKind::NoData,
                                    detail: source_error.to_string(),
                                });
                                per_source.push(Vec::new());
                            }
                        },
                    }
                }
            }
        }

        if hard_failures == sources.len() {
            return Err(RefreshError::AllSourcesFailed {
                failed: hard_failures,
                warnings,
            });
        }

        let mut items = merge_items(per_source);
        let watched = match self.repository.watched_ids().await {
            Ok(watched) => watched,
            Err(storage_error) => {
                error!(error = %storage_error, "watched store unavailable, reporting items unwatched");
                HashSet::new()
            }
        };
        annotate_watched(&mut items, &watched);

        info!(
            sources = sources.len(),
            items = items.len(),
            warnings = warnings.len(),
            "aggregation pass complete"
        );
        Ok(FeedSnapshot { items, warnings })
    }

    fn spawn_fetch(
        &self,
        source: &SourceRef,
        cached: &Option<CacheEntry>,
        semaphore: Arc<Semaphore>,
        deadline: tokio::time::Instant,
    ) -> JoinHandle<Result<FetchOutcome, SourceError>> {
        let adapter = match source.kind {
            SourceKind::ApiChannel => Arc::clone(&self.api),
            SourceKind::FeedChannel => Arc::clone(&self.feed),
        };
        let request = FetchRequest {
            source: source.clone(),
            etag: cached.as_ref().and_then(|entry| entry.etag.clone()),
            last_modified: cached.as_ref().and_then(|entry| entry.last_modified.clone()),
            max_items: self.config.max_items_per_source,
        };
        tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| SourceError::Unavailable("fetch pool closed".to_string()))?;
            match tokio::time::timeout_at(deadline, adapter.fetch(request)).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Unavailable(
                    "refresh deadline exceeded".to_string(),
                )),
            }
        })
    }
}

/// Concatenation-order dedup (first occurrence wins) followed by a
/// deterministic sort: `published_at` descending, ties broken by `source_id`
/// then item id ascending.
pub fn merge_items(per_source: Vec<Vec<FeedItem>>) -> Vec<FeedItem> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged: Vec<FeedItem> = Vec::new();
    for items in per_source {
        for item in items {
            if seen.insert(item.id.clone()) {
                merged.push(item);
            }
        }
    }
    merged.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.source_id.cmp(&b.source_id))
            .then_with(|| a.id.cmp(&b.id))
    });
    merged
}

/// Read-only membership test; never mutates the watched store.
pub fn annotate_watched(items: &mut [FeedItem], watched: &HashSet<String>) {
    for item in items {
        item.watched = watched.contains(&item.id);
    }
}
