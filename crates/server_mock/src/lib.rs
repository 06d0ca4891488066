//! Deterministic in-memory stand-ins for the server of record.
//!
//! This crate contains no transport logic and is intended for local
//! development and contract-level testing of the cache, reconciler and
//! conversation layers.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use sync_protocol::{
    CredentialError, CredentialProvider, FetchedContent, Message, ResourceKey, ResourceMetadata,
    ResourceSource, SourceError, Timestamp,
};

#[derive(Debug, Clone)]
struct StoredResource {
    metadata: ResourceMetadata,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct ServerState {
    collections: HashMap<String, BTreeMap<String, StoredResource>>,
    failing_paths: HashMap<ResourceKey, SourceError>,
    failing_listings: HashMap<String, SourceError>,
    content_fetches: HashMap<ResourceKey, usize>,
    listings: HashMap<String, usize>,
}

/// In-memory [`ResourceSource`] with call counters and failure injection.
#[derive(Debug, Default)]
pub struct MockResourceServer {
    state: Mutex<ServerState>,
}

impl MockResourceServer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a resource, deriving size from the body.
    pub fn upsert(
        &self,
        collection_id: &str,
        path: &str,
        bytes: impl Into<Vec<u8>>,
        mime_type: Option<&str>,
        last_modified: Timestamp,
    ) {
        let bytes = bytes.into();
        let metadata = ResourceMetadata {
            path: path.to_string(),
            mime_type: mime_type.map(ToString::to_string),
            size_bytes: bytes.len() as u64,
            last_modified,
        };
        lock_unpoisoned(&self.state)
            .collections
            .entry(collection_id.to_string())
            .or_default()
            .insert(path.to_string(), StoredResource { metadata, bytes });
    }

    pub fn remove(&self, collection_id: &str, path: &str) {
        if let Some(collection) = lock_unpoisoned(&self.state).collections.get_mut(collection_id) {
            collection.remove(path);
        }
    }

    /// Makes content fetches for `key` fail until [`MockResourceServer::clear_failures`].
    pub fn fail_path(&self, key: ResourceKey, error: SourceError) {
        lock_unpoisoned(&self.state).failing_paths.insert(key, error);
    }

    /// Makes metadata listings for `collection_id` fail.
    pub fn fail_listing(&self, collection_id: &str, error: SourceError) {
        lock_unpoisoned(&self.state)
            .failing_listings
            .insert(collection_id.to_string(), error);
    }

    pub fn clear_failures(&self) {
        let mut state = lock_unpoisoned(&self.state);
        state.failing_paths.clear();
        state.failing_listings.clear();
    }

    #[must_use]
    pub fn content_fetches(&self, key: &ResourceKey) -> usize {
        lock_unpoisoned(&self.state)
            .content_fetches
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn total_content_fetches(&self) -> usize {
        lock_unpoisoned(&self.state).content_fetches.values().sum()
    }

    #[must_use]
    pub fn listings(&self, collection_id: &str) -> usize {
        lock_unpoisoned(&self.state)
            .listings
            .get(collection_id)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn metadata(&self, key: &ResourceKey) -> Option<ResourceMetadata> {
        lock_unpoisoned(&self.state)
            .collections
            .get(&key.collection_id)
            .and_then(|collection| collection.get(&key.path))
            .map(|resource| resource.metadata.clone())
    }
}

#[async_trait]
impl ResourceSource for MockResourceServer {
    async fn list_metadata(
        &self,
        collection_id: &str,
    ) -> Result<Vec<ResourceMetadata>, SourceError> {
        let mut state = lock_unpoisoned(&self.state);
        *state.listings.entry(collection_id.to_string()).or_default() += 1;
        if let Some(error) = state.failing_listings.get(collection_id) {
            return Err(error.clone());
        }
        Ok(state
            .collections
            .get(collection_id)
            .map(|collection| {
                collection
                    .values()
                    .map(|resource| resource.metadata.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_content(&self, key: &ResourceKey) -> Result<FetchedContent, SourceError> {
        let mut state = lock_unpoisoned(&self.state);
        *state.content_fetches.entry(key.clone()).or_default() += 1;
        if let Some(error) = state.failing_paths.get(key) {
            return Err(error.clone());
        }
        let resource = state
            .collections
            .get(&key.collection_id)
            .and_then(|collection| collection.get(&key.path))
            .ok_or_else(|| {
                SourceError::new(
                    sync_protocol::SourceErrorKind::Status(404),
                    format!("no resource at {key}"),
                )
            })?;
        Ok(FetchedContent::new(
            resource.bytes.clone(),
            resource.metadata.mime_type.as_deref(),
        ))
    }
}

/// Credential provider returning a fixed token and counting requests.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    token: Mutex<Option<String>>,
    requests: AtomicUsize,
}

impl StaticCredentials {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
            requests: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Swaps the token, as a refresh would.
    pub fn set_token(&self, token: Option<String>) {
        *lock_unpoisoned(&self.token) = token;
    }

    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn bearer_token(&self) -> Result<Option<String>, CredentialError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(lock_unpoisoned(&self.token).clone())
    }
}

/// Encodes one named server-sent frame.
#[must_use]
pub fn sse_frame(event: &str, data: &Value) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

#[must_use]
pub fn initial_frame(history: &[Message]) -> String {
    sse_frame("initial", &serde_json::json!({ "history": history }))
}

#[must_use]
pub fn message_frame(message: &Message) -> String {
    sse_frame("message", &serde_json::json!({ "message": message }))
}

#[must_use]
pub fn heartbeat_frame() -> String {
    sse_frame("heartbeat", &serde_json::json!({}))
}

#[must_use]
pub fn error_frame(error: &str) -> String {
    sse_frame("error", &serde_json::json!({ "error": error }))
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
