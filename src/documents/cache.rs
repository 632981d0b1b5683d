//! Per-conversation cache of extracted documents.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

use super::types::ExtractionResult;
use crate::error::{ExtractionError, ExtractionOutcome};

/// Identifies one document inside one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageCacheKey {
    pub conversation_id: String,
    pub document_hash: String,
}

impl PageCacheKey {
    pub fn new(conversation_id: impl Into<String>, document_hash: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            document_hash: document_hash.into(),
        }
    }

    /// Key a raw buffer by its content hash, so re-uploads of the same bytes hit.
    pub fn for_bytes(conversation_id: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(conversation_id, blake3::hash(bytes).to_hex().to_string())
    }
}

pub type SharedPageCache = Arc<PageCache>;

/// TTL-bounded cache of extraction results.
///
/// Concurrent requests for the same key share a single in-flight extraction.
pub struct PageCache {
    cache: Cache<PageCacheKey, Arc<ExtractionResult>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PageCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();

        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn get(&self, key: &PageCacheKey) -> Option<Arc<ExtractionResult>> {
        match self.cache.get(key).await {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn insert(&self, key: PageCacheKey, value: ExtractionResult) {
        self.cache.insert(key, Arc::new(value)).await;
    }

    /// Return the cached result, or run `extract` once for all concurrent callers.
    pub async fn get_or_extract<F>(
        &self,
        key: PageCacheKey,
        extract: F,
    ) -> ExtractionOutcome<Arc<ExtractionResult>>
    where
        F: Future<Output = ExtractionOutcome<ExtractionResult>>,
    {
        if let Some(hit) = self.get(&key).await {
            return Ok(hit);
        }

        self.cache
            .try_get_with(key, async move { extract.await.map(Arc::new) })
            .await
            .map_err(|err: Arc<ExtractionError>| (*err).clone())
    }

    pub async fn invalidate(&self, key: &PageCacheKey) {
        self.cache.invalidate(key).await;
    }

    /// Drop every cached document for a conversation ("document cleared").
    pub fn invalidate_conversation(&self, conversation_id: &str) {
        let target = conversation_id.to_string();
        match self
            .cache
            .invalidate_entries_if(move |key, _| key.conversation_id == target)
        {
            Ok(_) => debug!(conversation_id, "Invalidated cached documents"),
            Err(err) => debug!(%err, "Cache predicate invalidation unavailable"),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
}
