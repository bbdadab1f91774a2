//! Bounded cache of query embeddings.
//!
//! Keys are normalized query strings (trimmed, lowercased). Eviction is FIFO:
//! entries are only ever read with [`LruCache::peek`], which leaves recency
//! untouched, so the entry dropped when full is always the one inserted first.

use lru::LruCache;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use tracing::trace;

pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 100;

/// Cache key for a query: surrounding whitespace removed, lowercased
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// One key's vector, filled by whichever caller gets to encode it first
type Slot = Arc<OnceCell<Arc<[f32]>>>;

/// FIFO-evicting map from normalized query to embedding.
///
/// Safe to share across tasks. A capacity of zero disables caching.
#[derive(Debug)]
pub struct QueryEmbeddingCache {
    capacity: usize,
    entries: Option<Mutex<LruCache<String, Slot>>>,
}

impl Default for QueryEmbeddingCache {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_CACHE_CAPACITY)
    }
}

impl QueryEmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of keys held, including ones still being encoded
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| lock(entries).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when a finished vector is cached for `query`
    pub fn contains(&self, query: &str) -> bool {
        self.entries.as_ref().is_some_and(|entries| {
            lock(entries)
                .peek(&normalize_query(query))
                .is_some_and(|slot| slot.initialized())
        })
    }

    /// Return the cached vector for `query`, or compute it with `encode` and
    /// cache the result.
    ///
    /// `encode` receives the normalized query, so every spelling that maps to
    /// the same key yields the same vector. Concurrent misses on one key
    /// share a single encode: the first caller reserves the key under the
    /// lock and the rest wait for its result. A failed encode is not cached.
    pub async fn get_or_compute<F, Fut, E>(&self, query: &str, encode: F) -> Result<Arc<[f32]>, E>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Vec<f32>, E>>,
    {
        let key = normalize_query(query);
        let Some(entries) = &self.entries else {
            return encode(key).await.map(Arc::from);
        };

        let slot = {
            let mut entries = lock(entries);
            match entries.peek(&key) {
                Some(slot) => Arc::clone(slot),
                None => {
                    let slot = Slot::default();
                    if let Some((evicted, _)) = entries.push(key.clone(), Arc::clone(&slot)) {
                        trace!("Evicting cached query embedding for '{evicted}'");
                    }
                    slot
                }
            }
        };

        if let Some(vector) = slot.get() {
            trace!("Query embedding cache hit");
            return Ok(Arc::clone(vector));
        }

        let encoded = slot
            .get_or_try_init(|| {
                let key = key.clone();
                async move { encode(key).await.map(Arc::<[f32]>::from) }
            })
            .await;

        match encoded {
            Ok(vector) => Ok(Arc::clone(vector)),
            Err(e) => {
                let mut entries = lock(entries);
                if entries
                    .peek(&key)
                    .is_some_and(|current| Arc::ptr_eq(current, &slot) && !current.initialized())
                {
                    entries.pop(&key);
                }
                Err(e)
            }
        }
    }
}

fn lock<T>(entries: &Mutex<T>) -> MutexGuard<'_, T> {
    // Entries stay consistent even if a holder panicked mid-call
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}
