use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use resource_cache::{Content, ResourceCache};
use server_mock::MockResourceServer;
use sync_protocol::{
    FetchedContent, ResourceKey, ResourceMetadata, ResourceSource, SourceError, SourceErrorKind,
    Timestamp,
};
use tokio::sync::{watch, Notify, Semaphore};
use workbench_sync::{ReconcileError, Reconciler};

fn stamp(millis: i64) -> Timestamp {
    Timestamp::from_unix_millis(millis).expect("valid timestamp")
}

fn seeded_server() -> Arc<MockResourceServer> {
    let server = Arc::new(MockResourceServer::new());
    server.upsert("c1", "a.txt", "alpha", Some("text/plain"), stamp(1_000));
    server.upsert("c1", "b.txt", "beta", Some("text/plain"), stamp(1_000));
    server
}

/// Holds every listing until the test releases it.
struct GatedSource {
    inner: MockResourceServer,
    entered: Notify,
    gate: Semaphore,
}

impl GatedSource {
    fn new(inner: MockResourceServer) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }
}

#[async_trait]
impl ResourceSource for GatedSource {
    async fn list_metadata(
        &self,
        collection_id: &str,
    ) -> Result<Vec<ResourceMetadata>, SourceError> {
        self.entered.notify_one();
        self.gate
            .acquire()
            .await
            .map_err(|_| SourceError::network("gate closed"))?
            .forget();
        self.inner.list_metadata(collection_id).await
    }

    async fn fetch_content(&self, key: &ResourceKey) -> Result<FetchedContent, SourceError> {
        self.inner.fetch_content(key).await
    }
}

#[tokio::test]
async fn identical_passes_stay_silent_and_skip_refetch() {
    let server = seeded_server();
    let active = ResourceKey::new("c1", "a.txt");
    let reconciler = Reconciler::new(Arc::clone(&server), ResourceCache::in_memory());
    reconciler.set_active(Some(active.clone()));
    let mut rx = reconciler.subscribe("c1");

    let first = reconciler
        .reconcile("c1")
        .await
        .expect("first pass")
        .expect("pass ran");
    assert_eq!(first.added, vec!["a.txt".to_string(), "b.txt".to_string()]);
    assert!(rx.has_changed().expect("notifier alive"));
    assert_eq!(rx.borrow_and_update().len(), 2);
    assert_eq!(server.content_fetches(&active), 1);

    let second = reconciler
        .reconcile("c1")
        .await
        .expect("second pass")
        .expect("pass ran");
    assert!(second.is_empty());
    assert!(!rx.has_changed().expect("notifier alive"));
    assert_eq!(server.content_fetches(&active), 1);
    assert_eq!(server.listings("c1"), 2);
}

#[tokio::test]
async fn modified_active_resource_is_refetched_into_the_cache() {
    let server = seeded_server();
    let active = ResourceKey::new("c1", "a.txt");
    let other = ResourceKey::new("c1", "b.txt");
    let reconciler = Reconciler::new(Arc::clone(&server), ResourceCache::in_memory());
    reconciler.set_active(Some(active.clone()));
    reconciler.reconcile("c1").await.expect("first pass");

    server.upsert("c1", "a.txt", "alpha v2", Some("text/plain"), stamp(2_000));
    server.upsert("c1", "b.txt", "beta v2", Some("text/plain"), stamp(2_000));
    let changes = reconciler
        .reconcile("c1")
        .await
        .expect("second pass")
        .expect("pass ran");

    assert_eq!(changes.modified, vec!["a.txt".to_string(), "b.txt".to_string()]);
    assert_eq!(changes.refetch_error, None);
    assert_eq!(server.content_fetches(&active), 2);
    assert_eq!(server.content_fetches(&other), 0);

    let entry = reconciler
        .cache()
        .get(&active)
        .expect("cache read")
        .expect("entry cached");
    assert_eq!(entry.cached_last_modified, stamp(2_000));
    assert_eq!(entry.content, Content::Text("alpha v2".to_string()));
}

#[tokio::test]
async fn refetch_failure_is_reported_without_failing_the_pass() {
    let server = seeded_server();
    let active = ResourceKey::new("c1", "a.txt");
    let reconciler = Reconciler::new(Arc::clone(&server), ResourceCache::in_memory());
    reconciler.set_active(Some(active.clone()));
    reconciler.reconcile("c1").await.expect("first pass");

    server.upsert("c1", "a.txt", "alpha v3", None, stamp(3_000));
    server.fail_path(
        active.clone(),
        SourceError::new(SourceErrorKind::Status(503), "unavailable"),
    );
    let changes = reconciler
        .reconcile("c1")
        .await
        .expect("listing succeeded")
        .expect("pass ran");

    assert_eq!(changes.modified, vec!["a.txt".to_string()]);
    assert!(changes.refetch_error.is_some());
    let snapshot = reconciler.snapshot("c1").expect("snapshot stored");
    assert!(snapshot
        .iter()
        .any(|metadata| metadata.path == "a.txt" && metadata.last_modified == stamp(3_000)));
    let entry = reconciler
        .cache()
        .get(&active)
        .expect("cache read")
        .expect("old entry kept");
    assert_eq!(entry.cached_last_modified, stamp(1_000));
}

#[tokio::test]
async fn listing_failure_surfaces_and_does_not_block_later_passes() {
    let server = seeded_server();
    let reconciler = Reconciler::new(Arc::clone(&server), ResourceCache::in_memory());
    server.fail_listing("c1", SourceError::new(SourceErrorKind::Auth, "expired"));

    let error = reconciler.reconcile("c1").await.expect_err("listing fails");
    assert!(matches!(error, ReconcileError::Listing { ref collection, .. } if collection == "c1"));
    assert!(error.is_auth());
    assert!(reconciler.snapshot("c1").is_none());

    server.clear_failures();
    let changes = reconciler
        .reconcile("c1")
        .await
        .expect("recovered")
        .expect("pass ran");
    assert_eq!(changes.added.len(), 2);
}

#[tokio::test]
async fn overlapping_pass_is_skipped() {
    let source = Arc::new(GatedSource::new(MockResourceServer::new()));
    source
        .inner
        .upsert("c1", "a.txt", "alpha", None, stamp(1_000));
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&source),
        ResourceCache::in_memory(),
    ));

    let first = tokio::spawn({
        let reconciler = Arc::clone(&reconciler);
        async move { reconciler.reconcile("c1").await }
    });
    source.entered.notified().await;

    let skipped = reconciler.reconcile("c1").await.expect("skip is not an error");
    assert!(skipped.is_none());

    source.gate.add_permits(1);
    let changes = first
        .await
        .expect("pass task")
        .expect("first pass")
        .expect("first pass ran");
    assert_eq!(changes.added, vec!["a.txt".to_string()]);
    assert_eq!(source.inner.listings("c1"), 1);
}

#[tokio::test]
async fn forgetting_a_collection_discards_the_pass_in_flight() {
    let source = Arc::new(GatedSource::new(MockResourceServer::new()));
    source
        .inner
        .upsert("c1", "a.txt", "alpha", None, stamp(1_000));
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&source),
        ResourceCache::in_memory(),
    ));
    let mut rx = reconciler.subscribe("c1");

    let in_flight = tokio::spawn({
        let reconciler = Arc::clone(&reconciler);
        async move { reconciler.reconcile("c1").await }
    });
    source.entered.notified().await;
    reconciler.forget("c1");
    source.gate.add_permits(1);

    let discarded = in_flight.await.expect("pass task").expect("pass");
    assert!(discarded.is_none());
    assert!(reconciler.snapshot("c1").is_none());
    assert!(!rx.has_changed().expect("notifier alive"));

    source.gate.add_permits(1);
    let fresh = reconciler
        .reconcile("c1")
        .await
        .expect("fresh pass")
        .expect("fresh pass ran");
    assert_eq!(fresh.added, vec!["a.txt".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn periodic_reconciliation_runs_until_shutdown() {
    let server = seeded_server();
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&server),
        ResourceCache::in_memory(),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn({
        let reconciler = Arc::clone(&reconciler);
        async move {
            reconciler
                .run_periodic("c1", Duration::from_secs(5), shutdown_rx)
                .await;
        }
    });

    tokio::time::sleep(Duration::from_secs(11)).await;
    shutdown_tx.send(true).expect("loop still listening");
    task.await.expect("loop exits");

    assert_eq!(server.listings("c1"), 3);
    assert_eq!(reconciler.snapshot("c1").map(|snapshot| snapshot.len()), Some(2));
}
