//! Process-wide search result cache
//!
//! Bounded LRU-style cache keyed by `(query, language)`, shared across
//! requests. Entries never expire; only successful searches are stored.
//! Concurrent misses for the same key are coalesced into one fetch.

use crate::services::{PlaceCandidate, SearchError};
use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;

/// Default number of cached queries
pub const DEFAULT_CAPACITY: u64 = 128;

pub type CachedCandidates = Arc<Vec<PlaceCandidate>>;

#[derive(Clone)]
pub struct QueryCache {
    entries: Cache<(String, String), CachedCandidates>,
}

impl QueryCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            entries: Cache::new(capacity),
        }
    }

    /// Cached candidates for `(query, language)`, fetching on a miss
    ///
    /// A failed fetch is returned to the caller and nothing is stored.
    pub async fn get_or_fetch<F>(
        &self,
        query: &str,
        language: &str,
        fetch: F,
    ) -> Result<CachedCandidates, SearchError>
    where
        F: Future<Output = Result<Vec<PlaceCandidate>, SearchError>>,
    {
        self.entries
            .try_get_with((query.to_string(), language.to_string()), async {
                fetch.await.map(Arc::new)
            })
            .await
            .map_err(|e| (*e).clone())
    }

    pub async fn contains(&self, query: &str, language: &str) -> bool {
        self.entries
            .get(&(query.to_string(), language.to_string()))
            .await
            .is_some()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
