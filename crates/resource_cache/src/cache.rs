use std::sync::Arc;

use sync_protocol::{collection_prefix, ResourceKey, ResourceSource, Timestamp};

use crate::entry::{classify_content, CacheEntry};
use crate::error::CacheError;
use crate::store::{KvStore, MemoryKvStore};

/// Key prefix of the content record (`CacheEntry` JSON).
pub const CONTENT_PREFIX: &str = "content";
/// Key prefix of the last-modified record used for cheap staleness checks.
pub const LAST_MODIFIED_PREFIX: &str = "lm";

/// Result of [`ResourceCache::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub entry: CacheEntry,
    pub from_cache: bool,
}

/// Staleness-aware resource cache keyed by `(collection, path)`.
///
/// Each resource keeps two records: the content entry and its last-modified
/// stamp. Entries are only evicted by [`ResourceCache::invalidate_collection`].
#[derive(Clone)]
pub struct ResourceCache {
    store: Arc<dyn KvStore>,
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache").finish_non_exhaustive()
    }
}

impl ResourceCache {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    pub fn get(&self, key: &ResourceKey) -> Result<Option<CacheEntry>, CacheError> {
        let storage_key = key.storage_key(CONTENT_PREFIX);
        let Some(bytes) = self.store.get(&storage_key)? else {
            return Ok(None);
        };
        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(error) => {
                tracing::warn!(resource = %key, error = %error, "discarding corrupt cache entry");
                Ok(None)
            }
        }
    }

    /// Replaces both records of the entry's resource.
    pub fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let content_key = entry.resource_key.storage_key(CONTENT_PREFIX);
        let stamp_key = entry.resource_key.storage_key(LAST_MODIFIED_PREFIX);
        let content = serde_json::to_vec(entry)
            .map_err(|source| CacheError::serialize(content_key.clone(), source))?;
        let stamp = serde_json::to_vec(&entry.cached_last_modified)
            .map_err(|source| CacheError::serialize(stamp_key.clone(), source))?;

        self.store.put(&content_key, &content)?;
        self.store.put(&stamp_key, &stamp)
    }

    pub fn cached_last_modified(&self, key: &ResourceKey) -> Result<Option<Timestamp>, CacheError> {
        let Some(bytes) = self.store.get(&key.storage_key(LAST_MODIFIED_PREFIX))? else {
            return Ok(None);
        };
        match serde_json::from_slice::<Timestamp>(&bytes) {
            Ok(stamp) => Ok(Some(stamp)),
            Err(error) => {
                tracing::warn!(resource = %key, error = %error, "discarding corrupt cache stamp");
                Ok(None)
            }
        }
    }

    /// True when nothing is cached or the cached stamp differs from `known`.
    pub fn is_stale(&self, key: &ResourceKey, known: Timestamp) -> Result<bool, CacheError> {
        Ok(self.cached_last_modified(key)? != Some(known))
    }

    /// Returns the cached entry when it matches `known_last_modified`, otherwise
    /// fetches the full content and replaces the entry.
    ///
    /// A failed fetch leaves the cache untouched.
    pub async fn fetch<S>(
        &self,
        source: &S,
        key: &ResourceKey,
        known_last_modified: Timestamp,
    ) -> Result<FetchOutcome, CacheError>
    where
        S: ResourceSource + ?Sized,
    {
        if let Some(entry) = self.get(key)? {
            if entry.cached_last_modified == known_last_modified {
                tracing::debug!(resource = %key, "cache hit");
                return Ok(FetchOutcome {
                    entry,
                    from_cache: true,
                });
            }
        }

        tracing::debug!(resource = %key, last_modified = %known_last_modified, "fetching content");
        let fetched = source.fetch_content(key).await?;
        let mime_type = fetched.mime_type();
        let entry = CacheEntry {
            resource_key: key.clone(),
            content: classify_content(fetched.bytes),
            mime_type,
            cached_last_modified: known_last_modified,
        };
        self.put(&entry)?;

        Ok(FetchOutcome {
            entry,
            from_cache: false,
        })
    }

    /// Paths with a cached content record in `collection_id`.
    pub fn cached_paths(&self, collection_id: &str) -> Result<Vec<String>, CacheError> {
        let prefix = collection_prefix(CONTENT_PREFIX, collection_id);
        Ok(self
            .store
            .keys_with_prefix(&prefix)?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(ToString::to_string))
            .collect())
    }

    /// Drops every record of `collection_id`. Returns the number of records removed.
    pub fn invalidate_collection(&self, collection_id: &str) -> Result<usize, CacheError> {
        let mut removed = 0;
        for prefix in [CONTENT_PREFIX, LAST_MODIFIED_PREFIX] {
            for key in self
                .store
                .keys_with_prefix(&collection_prefix(prefix, collection_id))?
            {
                self.store.remove(&key)?;
                removed += 1;
            }
        }
        tracing::info!(collection = %collection_id, removed, "invalidated cached collection");
        Ok(removed)
    }
}
