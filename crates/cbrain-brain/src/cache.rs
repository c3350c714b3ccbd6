//! Size-bounded, time-limited cache of text embeddings.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sha2::{Digest, Sha256};

/// Embeddings keyed by a SHA-256 of the embedded text.
///
/// Entries expire `ttl` after insertion. Past `capacity` entries, moka's
/// size-based eviction decides what to drop.
#[derive(Clone)]
pub struct EmbeddingCache {
    capacity: u64,
    entries: Cache<String, Arc<[f32]>>,
}

fn cache_key(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

impl EmbeddingCache {
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = u64::try_from(capacity).unwrap_or(u64::MAX);
        Self {
            capacity,
            entries: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(capacity)
                .build(),
        }
    }

    pub async fn get(&self, text: &str) -> Option<Vec<f32>> {
        self.entries
            .get(&cache_key(text))
            .await
            .map(|vector| vector.to_vec())
    }

    pub async fn insert(&self, text: &str, vector: Vec<f32>) {
        if self.capacity == 0 {
            return;
        }
        self.entries
            .insert(cache_key(text), Arc::from(vector))
            .await;
    }

    /// Live entries after pending evictions have been applied.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
    }
}

impl fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("capacity", &self.capacity)
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}
