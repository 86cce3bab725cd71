//! In-process TTL cache for localized reference data
//!
//! Provides:
//! - Entries keyed by language tag with a fixed time-to-live
//! - One shared load per key when concurrent callers miss
//! - Failed loads are never cached
//!
//! The cache is owned by the composition root and handed to consumers by
//! reference; there is no process-wide instance.

use crate::errors::{AppError, Result};
use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Only a handful of language keys ever exist
const MAX_ENTRIES: u64 = 16;

/// Value returned by [`ReferenceCache::get_or_load`]
pub struct Loaded<T> {
    pub value: Arc<T>,
    /// True when this call ran the load rather than reusing an entry
    pub fresh: bool,
}

/// Per-language snapshot cache
pub struct ReferenceCache<T> {
    ttl: Duration,
    entries: Cache<String, Arc<T>>,
}

impl<T: Send + Sync + 'static> ReferenceCache<T> {
    /// Create an empty cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh entry for `key`, if any
    pub async fn get(&self, key: &str) -> Option<Arc<T>> {
        self.entries.get(key).await
    }

    /// Entry for `key`, running `load` on a miss.
    ///
    /// Concurrent misses on the same key wait for a single `load`; misses on
    /// different keys load independently. An error is returned to every
    /// waiter and leaves the key empty.
    pub async fn get_or_load<F>(&self, key: &str, load: F) -> Result<Loaded<T>>
    where
        F: Future<Output = Result<T>>,
    {
        let entry = self
            .entries
            .entry_by_ref(key)
            .or_try_insert_with(async { load.await.map(Arc::new) })
            .await
            .map_err(unshare)?;

        if entry.is_fresh() {
            debug!(key, "Reference cache loaded");
        }

        Ok(Loaded {
            fresh: entry.is_fresh(),
            value: entry.into_value(),
        })
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.invalidate(key).await;
    }
}

/// Waiters on a failed load share one error
fn unshare(err: Arc<AppError>) -> AppError {
    Arc::try_unwrap(err).unwrap_or_else(|shared| match shared.as_ref() {
        AppError::Cancelled => AppError::Cancelled,
        other => AppError::QueryFailed {
            cause: other.to_string(),
        },
    })
}
