//! Background reconciliation of resource metadata against the cache.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use resource_cache::ResourceCache;
use sync_protocol::{ResourceKey, ResourceMetadata, ResourceSource, SourceError, Timestamp};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Metadata listing of one collection as last seen by the reconciler.
pub type Snapshot = Arc<[ResourceMetadata]>;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to list collection '{collection}': {source}")]
    Listing {
        collection: String,
        #[source]
        source: SourceError,
    },
}

impl ReconcileError {
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Listing { source, .. } => source.is_auth(),
        }
    }
}

/// Differences between two consecutive snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
    pub count_changed: bool,
    /// Failure of the targeted refetch of the active resource, if one ran.
    pub refetch_error: Option<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        !self.count_changed
            && self.added.is_empty()
            && self.removed.is_empty()
            && self.modified.is_empty()
    }

    pub fn touches(&self, path: &str) -> bool {
        self.added.iter().any(|added| added == path)
            || self.modified.iter().any(|modified| modified == path)
    }
}

/// Compares two listings: count first, then path membership, then
/// `last_modified` and size for paths present in both. Output paths are sorted.
pub fn diff_snapshots(previous: &[ResourceMetadata], next: &[ResourceMetadata]) -> ChangeSet {
    let before: BTreeMap<&str, &ResourceMetadata> = previous
        .iter()
        .map(|metadata| (metadata.path.as_str(), metadata))
        .collect();
    let after: BTreeMap<&str, &ResourceMetadata> = next
        .iter()
        .map(|metadata| (metadata.path.as_str(), metadata))
        .collect();

    let mut changes = ChangeSet {
        count_changed: previous.len() != next.len(),
        ..ChangeSet::default()
    };
    for (path, new) in &after {
        match before.get(path) {
            None => changes.added.push((*path).to_string()),
            Some(old)
                if old.last_modified != new.last_modified || old.size_bytes != new.size_bytes =>
            {
                changes.modified.push((*path).to_string());
            }
            Some(_) => {}
        }
    }
    changes.removed = before
        .keys()
        .filter(|path| !after.contains_key(*path))
        .map(|path| (*path).to_string())
        .collect();
    changes
}

#[derive(Debug)]
struct CollectionState {
    snapshot: Option<Snapshot>,
    running: bool,
    generation: u64,
    notifier: watch::Sender<Snapshot>,
}

impl CollectionState {
    fn new() -> Self {
        let (notifier, _) = watch::channel(Snapshot::from(Vec::new()));
        Self {
            snapshot: None,
            running: false,
            generation: 0,
            notifier,
        }
    }
}

#[derive(Debug, Default)]
struct ReconcilerState {
    collections: HashMap<String, CollectionState>,
    active: Option<ResourceKey>,
}

/// Polls collection metadata, notifies subscribers on change and refreshes
/// the active resource through the cache.
///
/// Passes for one collection never overlap: a pass requested while another
/// is running is skipped, not queued.
pub struct Reconciler<S: ResourceSource + ?Sized> {
    source: Arc<S>,
    cache: ResourceCache,
    state: Mutex<ReconcilerState>,
}

impl<S: ResourceSource + ?Sized> std::fmt::Debug for Reconciler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Clears the running flag when a pass ends, unless the collection was
/// forgotten in the meantime.
struct PassGuard<'a> {
    state: &'a Mutex<ReconcilerState>,
    collection: &'a str,
    generation: u64,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock_unpoisoned(self.state);
        if let Some(collection) = state.collections.get_mut(self.collection) {
            if collection.generation == self.generation {
                collection.running = false;
            }
        }
    }
}

impl<S: ResourceSource + ?Sized> Reconciler<S> {
    pub fn new(source: Arc<S>, cache: ResourceCache) -> Self {
        Self {
            source,
            cache,
            state: Mutex::new(ReconcilerState::default()),
        }
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Marks the resource shown by the open view. Only it is refetched.
    pub fn set_active(&self, key: Option<ResourceKey>) {
        lock_unpoisoned(&self.state).active = key;
    }

    pub fn active(&self) -> Option<ResourceKey> {
        lock_unpoisoned(&self.state).active.clone()
    }

    /// Latest snapshot of `collection_id`, if a pass has completed.
    pub fn snapshot(&self, collection_id: &str) -> Option<Snapshot> {
        lock_unpoisoned(&self.state)
            .collections
            .get(collection_id)
            .and_then(|collection| collection.snapshot.clone())
    }

    /// Receives the snapshot each time a pass finds a difference.
    pub fn subscribe(&self, collection_id: &str) -> watch::Receiver<Snapshot> {
        lock_unpoisoned(&self.state)
            .collections
            .entry(collection_id.to_string())
            .or_insert_with(CollectionState::new)
            .notifier
            .subscribe()
    }

    /// Drops the held snapshot. A pass still in flight for `collection_id`
    /// completes but its result is discarded.
    pub fn forget(&self, collection_id: &str) {
        let mut state = lock_unpoisoned(&self.state);
        if let Some(collection) = state.collections.get_mut(collection_id) {
            collection.generation += 1;
            collection.snapshot = None;
            collection.running = false;
            tracing::debug!(collection = %collection_id, "forgot collection snapshot");
        }
    }

    /// Runs one pass. `Ok(None)` means the pass was skipped because another
    /// was running, or its result was discarded by [`Reconciler::forget`].
    pub async fn reconcile(&self, collection_id: &str) -> Result<Option<ChangeSet>, ReconcileError> {
        let generation = {
            let mut state = lock_unpoisoned(&self.state);
            let collection = state
                .collections
                .entry(collection_id.to_string())
                .or_insert_with(CollectionState::new);
            if collection.running {
                tracing::debug!(collection = %collection_id, "skipping pass; previous pass still running");
                return Ok(None);
            }
            collection.running = true;
            collection.generation
        };
        let _guard = PassGuard {
            state: &self.state,
            collection: collection_id,
            generation,
        };

        let listing = self
            .source
            .list_metadata(collection_id)
            .await
            .map_err(|source| ReconcileError::Listing {
                collection: collection_id.to_string(),
                source,
            })?;

        let (mut changes, refetch) = {
            let mut state = lock_unpoisoned(&self.state);
            let active = state.active.clone();
            let Some(collection) = state
                .collections
                .get_mut(collection_id)
                .filter(|collection| collection.generation == generation)
            else {
                tracing::debug!(collection = %collection_id, "discarding result of forgotten pass");
                return Ok(None);
            };

            let previous = collection.snapshot.clone().unwrap_or_else(|| Snapshot::from(Vec::new()));
            let changes = diff_snapshots(&previous, &listing);
            if changes.is_empty() && collection.snapshot.is_some() {
                return Ok(Some(changes));
            }

            let next = Snapshot::from(listing);
            collection.snapshot = Some(Arc::clone(&next));
            collection.notifier.send_replace(Arc::clone(&next));
            let refetch = active
                .filter(|key| key.collection_id == collection_id && changes.touches(&key.path))
                .and_then(|key| known_last_modified(&next, &key.path).map(|known| (key, known)));
            (changes, refetch)
        };

        tracing::info!(
            collection = %collection_id,
            added = changes.added.len(),
            removed = changes.removed.len(),
            modified = changes.modified.len(),
            "collection changed"
        );

        if let Some((key, known)) = refetch {
            match self.cache.fetch(&*self.source, &key, known).await {
                Ok(outcome) => {
                    tracing::debug!(resource = %key, from_cache = outcome.from_cache, "refreshed active resource");
                }
                Err(error) => {
                    tracing::warn!(resource = %key, error = %error, "active resource refetch failed");
                    changes.refetch_error = Some(error.to_string());
                }
            }
        }

        Ok(Some(changes))
    }

    /// Reconciles `collection_id` every `period` until `shutdown` turns true
    /// or its sender is dropped. Missed ticks are skipped.
    pub async fn run_periodic(
        &self,
        collection_id: &str,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.reconcile(collection_id).await {
                        tracing::warn!(collection = %collection_id, error = %error, "reconciliation pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!(collection = %collection_id, "stopping periodic reconciliation");
                        break;
                    }
                }
            }
        }
    }
}

fn known_last_modified(snapshot: &[ResourceMetadata], path: &str) -> Option<Timestamp> {
    snapshot
        .iter()
        .find(|metadata| metadata.path == path)
        .map(|metadata| metadata.last_modified)
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
