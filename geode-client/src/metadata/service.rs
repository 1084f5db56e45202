//! Per-region metadata snapshots and their background refresh.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::instrument;

use geode_core::{GeodeError, PdxTypeRegistry, Result, Value};

use super::{
    bucket_for_key, BucketLocationsUpdate, BucketServerLocation, ClientMetadata, MetadataState,
    PartitionResolver, ServerLocation, ServerRoute,
};
use crate::config::CacheConfig;

/// Fixed partition as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedPartitionInfo {
    /// Partition name.
    pub name: String,
    /// First bucket.
    pub start_bucket: u32,
    /// Number of buckets.
    pub num_buckets: u32,
}

/// Everything the server reports about a partitioned region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionMetadata {
    /// Number of buckets of the region.
    pub total_num_buckets: u32,
    /// Region this one is colocated with.
    pub colocated_with: Option<String>,
    /// Fixed partitions, empty unless fixed partitioning is used.
    pub fixed_partitions: Vec<FixedPartitionInfo>,
    /// Hosts of every bucket, each tagged with its bucket id.
    pub buckets: Vec<BucketServerLocation>,
}

/// Fetches region metadata from the servers.
#[async_trait]
pub trait MetadataFetcher: Send + Sync + 'static {
    /// Asks a server for the current metadata of `region`.
    async fn fetch_region_metadata(&self, region: &str) -> Result<RegionMetadata>;
}

type RegionMap = HashMap<String, Arc<ClientMetadata>>;

struct Shared {
    config: CacheConfig,
    fetcher: Arc<dyn MetadataFetcher>,
    current: ArcSwap<RegionMap>,
    previous: ArcSwap<RegionMap>,
    pending: Mutex<HashSet<String>>,
    refreshed: Notify,
}

impl Shared {
    #[instrument(
        name = "metadata_service.refresh",
        skip(self),
        fields(region = %region)
    )]
    async fn refresh_region(&self, region: &str) -> Result<Arc<ClientMetadata>> {
        let old = self.current.load().get(region).cloned();
        if let Some(old) = &old {
            old.set_state(MetadataState::Refreshing);
        }

        let refresh_timeout = self.config.metadata_refresh_timeout();
        let fetched = timeout(refresh_timeout, self.fetcher.fetch_region_metadata(region)).await;
        let fetched = match fetched {
            Ok(Ok(fetched)) => fetched,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "metadata fetch failed, keeping previous snapshot");
                Self::reactivate(old.as_deref());
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(timeout = ?refresh_timeout, "metadata refresh timed out, keeping previous snapshot");
                Self::reactivate(old.as_deref());
                return Err(GeodeError::Timeout(format!(
                    "metadata refresh of region {} timed out after {:?}",
                    region, refresh_timeout
                )));
            }
        };

        let snapshot = Arc::new(build_snapshot(region, fetched));
        snapshot.set_state(MetadataState::Active);

        self.current.rcu(|map| {
            let mut map = RegionMap::clone(map);
            map.insert(region.to_string(), Arc::clone(&snapshot));
            map
        });
        if let Some(old) = old {
            old.set_state(MetadataState::Retired);
            self.previous.rcu(|map| {
                let mut map = RegionMap::clone(map);
                map.insert(region.to_string(), Arc::clone(&old));
                map
            });
        }

        tracing::debug!(
            buckets = snapshot.total_num_buckets(),
            known = snapshot.known_bucket_count(),
            "installed metadata snapshot"
        );
        self.refreshed.notify_waiters();
        Ok(snapshot)
    }

    fn reactivate(old: Option<&ClientMetadata>) {
        if let Some(old) = old {
            old.set_state(MetadataState::Active);
        }
    }

    fn finish_pending(&self, region: &str) {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(region);
    }
}

fn build_snapshot(region: &str, fetched: RegionMetadata) -> ClientMetadata {
    let mut snapshot = ClientMetadata::new(region, fetched.total_num_buckets);
    if let Some(parent) = fetched.colocated_with {
        snapshot = snapshot.with_colocated_with(parent);
    }
    for fp in fetched.fixed_partitions {
        snapshot = snapshot.with_fixed_partition(fp.name, fp.start_bucket, fp.num_buckets);
    }

    let mut by_bucket: HashMap<u32, Vec<BucketServerLocation>> = HashMap::new();
    for location in fetched.buckets {
        by_bucket
            .entry(location.bucket_id())
            .or_default()
            .push(location);
    }
    for (bucket_id, locations) in by_bucket {
        if snapshot
            .update_bucket_server_locations(bucket_id, locations)
            .is_err()
        {
            tracing::warn!(bucket_id, "server reported a bucket outside the region, ignored");
        }
    }
    snapshot
}

/// Keeps the bucket tables of all partitioned regions a cache talks to.
///
/// Lookups read an immutable snapshot and never wait for a refresh.
/// Refreshes run one at a time on a background task fed by a bounded queue;
/// a region already queued is not queued twice. A failed or timed-out refresh
/// leaves the last good snapshot in place.
///
/// PDX keys are hashed through the registry given to
/// [`with_pdx_registry`](Self::with_pdx_registry); without one the service
/// uses an empty registry of its own and cannot route PDX keys.
///
/// Must be created inside a Tokio runtime.
pub struct ClientMetadataService {
    shared: Arc<Shared>,
    registry: Arc<PdxTypeRegistry>,
    queue: mpsc::Sender<String>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientMetadataService {
    /// Creates the service and starts its refresh task.
    pub fn new(config: CacheConfig, fetcher: Arc<dyn MetadataFetcher>) -> Self {
        let (queue, rx) = mpsc::channel(config.refresh_queue_capacity());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            config,
            fetcher,
            current: ArcSwap::from_pointee(HashMap::new()),
            previous: ArcSwap::from_pointee(HashMap::new()),
            pending: Mutex::new(HashSet::new()),
            refreshed: Notify::new(),
        });
        let task = Self::spawn_refresh_task(Arc::clone(&shared), rx, shutdown_rx);
        Self {
            shared,
            registry: Arc::new(PdxTypeRegistry::new()),
            queue,
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }

    fn spawn_refresh_task(
        shared: Arc<Shared>,
        mut rx: mpsc::Receiver<String>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    region = rx.recv() => {
                        let Some(region) = region else { break };
                        // Errors are logged inside; the old snapshot stays active.
                        let _ = shared.refresh_region(&region).await;
                        shared.finish_pending(&region);
                    }
                    result = shutdown_rx.changed() => {
                        if result.is_err() || *shutdown_rx.borrow() {
                            tracing::debug!("metadata refresh task shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Resolves PDX keys through `registry`.
    pub fn with_pdx_registry(mut self, registry: Arc<PdxTypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    /// Returns the active snapshot of `region`.
    pub fn metadata(&self, region: &str) -> Option<Arc<ClientMetadata>> {
        self.shared.current.load().get(region).cloned()
    }

    /// Returns the snapshot the active one replaced.
    pub fn previous_metadata(&self, region: &str) -> Option<Arc<ClientMetadata>> {
        self.shared.previous.load().get(region).cloned()
    }

    /// Returns the names of regions with an active snapshot.
    pub fn regions(&self) -> Vec<String> {
        self.shared.current.load().keys().cloned().collect()
    }

    /// Refreshes `region` on the caller's task, bypassing the queue.
    pub async fn refresh_now(&self, region: &str) -> Result<Arc<ClientMetadata>> {
        self.shared.refresh_region(region).await
    }

    /// Queues a background refresh of `region`.
    ///
    /// Returns false if the region is already queued, the queue is full, or
    /// the service is closed.
    pub fn enqueue_refresh(&self, region: &str) -> bool {
        {
            let mut pending = self
                .shared
                .pending
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !pending.insert(region.to_string()) {
                return false;
            }
        }
        match self.queue.try_send(region.to_string()) {
            Ok(()) => {
                tracing::trace!(region = %region, "queued metadata refresh");
                true
            }
            Err(e) => {
                tracing::debug!(region = %region, error = %e, "metadata refresh not queued");
                self.shared.finish_pending(region);
                false
            }
        }
    }

    /// Applies a pushed bucket update to the active snapshot.
    ///
    /// An update for a region without a snapshot queues a full refresh instead.
    pub fn apply_update(&self, update: BucketLocationsUpdate) -> Result<()> {
        match self.metadata(&update.region) {
            Some(metadata) => {
                metadata.update_bucket_server_locations(update.bucket_id, update.locations)
            }
            None => {
                tracing::debug!(
                    region = %update.region,
                    bucket_id = update.bucket_id,
                    "bucket update for unknown region, refreshing"
                );
                self.enqueue_refresh(&update.region);
                Ok(())
            }
        }
    }

    /// Decodes and applies a pushed bucket update.
    pub fn apply_update_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.apply_update(BucketLocationsUpdate::decode(bytes)?)
    }

    /// Drops `location` from every region's bucket lists.
    pub fn remove_server(&self, location: &ServerLocation) {
        for metadata in self.shared.current.load().values() {
            metadata.remove_bucket_server_location(location);
        }
    }

    /// Announces a partitioned region before the servers have described it.
    ///
    /// Installs an empty snapshot with `total_num_buckets` buckets so keys
    /// hash to buckets right away, and queues a refresh to learn the hosts.
    /// A region that already has a snapshot keeps it. Returns true if the
    /// placeholder was installed.
    pub fn register_region(&self, region: &str, total_num_buckets: u32) -> bool {
        let placeholder = Arc::new(ClientMetadata::new(region, total_num_buckets));
        let mut installed = false;
        self.shared.current.rcu(|map| {
            installed = !map.contains_key(region);
            let mut map = RegionMap::clone(map);
            map.entry(region.to_string())
                .or_insert_with(|| Arc::clone(&placeholder));
            map
        });
        if installed {
            tracing::debug!(region = %region, total_num_buckets, "registered region");
            self.enqueue_refresh(region);
        }
        installed
    }

    /// Returns the bucket of `key` in `region`, queueing a refresh if the
    /// region is unknown.
    pub fn bucket_for_key(
        &self,
        region: &str,
        key: &Value,
        resolver: Option<&dyn PartitionResolver>,
    ) -> Result<Option<u32>> {
        match self.metadata(region) {
            Some(metadata) => bucket_for_key(&metadata, key, resolver, &self.registry),
            None => {
                self.enqueue_refresh(region);
                Ok(None)
            }
        }
    }

    /// Chooses the server for an operation on `key`.
    ///
    /// Missing metadata yields [`ServerRoute::AnyServer`] and queues a refresh.
    pub fn server_for_key(
        &self,
        region: &str,
        key: &Value,
        resolver: Option<&dyn PartitionResolver>,
        try_primary: bool,
    ) -> Result<ServerRoute> {
        let Some(metadata) = self.metadata(region) else {
            self.enqueue_refresh(region);
            return Ok(ServerRoute::AnyServer);
        };
        let Some(bucket_id) = bucket_for_key(&metadata, key, resolver, &self.registry)? else {
            return Ok(ServerRoute::AnyServer);
        };
        let route = metadata.get_server_location(bucket_id, try_primary)?;
        if route.is_any_server() {
            tracing::trace!(region = %region, bucket_id, "no known server for bucket");
            self.enqueue_refresh(region);
        }
        Ok(route)
    }

    /// Like [`server_for_key`](Self::server_for_key), but when no server is
    /// known waits up to the configured bucket wait timeout for a refresh and
    /// tries once more.
    pub async fn server_for_key_wait(
        &self,
        region: &str,
        key: &Value,
        resolver: Option<&dyn PartitionResolver>,
        try_primary: bool,
    ) -> Result<ServerRoute> {
        let wait = self.shared.config.bucket_wait_timeout();
        let refreshed = self.shared.refreshed.notified();
        let route = self.server_for_key(region, key, resolver, try_primary)?;
        if !route.is_any_server() || wait == Duration::ZERO {
            return Ok(route);
        }
        if timeout(wait, refreshed).await.is_err() {
            tracing::debug!(region = %region, wait = ?wait, "no metadata within bucket wait timeout");
            return Ok(ServerRoute::AnyServer);
        }
        self.server_for_key(region, key, resolver, try_primary)
    }

    /// Stops the refresh task and waits for it to finish.
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for ClientMetadataService {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

impl std::fmt::Debug for ClientMetadataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientMetadataService")
            .field("regions", &self.shared.current.load().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockFetcher {
        regions: Mutex<HashMap<String, RegionMetadata>>,
        delay: Mutex<Option<Duration>>,
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    impl MockFetcher {
        fn with_region(self, name: &str, md: RegionMetadata) -> Self {
            self.regions.lock().unwrap().insert(name.to_string(), md);
            self
        }
    }

    #[async_trait]
    impl MetadataFetcher for MockFetcher {
        async fn fetch_region_metadata(&self, region: &str) -> Result<RegionMetadata> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(GeodeError::Protocol("server unavailable".into()));
            }
            self.regions
                .lock()
                .unwrap()
                .get(region)
                .cloned()
                .ok_or_else(|| GeodeError::IllegalState(format!("no region {}", region)))
        }
    }

    fn region_md(buckets: u32, primary_host: &str) -> RegionMetadata {
        RegionMetadata {
            total_num_buckets: buckets,
            colocated_with: None,
            fixed_partitions: vec![],
            buckets: (0..buckets)
                .map(|b| {
                    BucketServerLocation::new(ServerLocation::new(primary_host, 40404), b, true, 1)
                })
                .collect(),
        }
    }

    fn config(wait: Duration, refresh: Duration) -> CacheConfig {
        CacheConfig::builder()
            .bucket_wait_timeout(wait)
            .metadata_refresh_timeout(refresh)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_refresh_now_installs_snapshot() {
        let fetcher = Arc::new(MockFetcher::default().with_region("orders", region_md(7, "a")));
        let service = ClientMetadataService::new(CacheConfig::builder().build().unwrap(), fetcher);

        let md = service.refresh_now("orders").await.unwrap();
        assert_eq!(md.total_num_buckets(), 7);
        assert_eq!(md.state(), MetadataState::Active);

        let route = service
            .server_for_key("orders", &Value::Int(3), None, true)
            .unwrap();
        assert_eq!(route.location().unwrap().host(), "a");
        assert_eq!(service.regions(), vec!["orders".to_string()]);
        service.close().await;
    }

    #[tokio::test]
    async fn test_unknown_region_falls_back_and_refreshes() {
        let fetcher = Arc::new(MockFetcher::default().with_region("orders", region_md(5, "a")));
        let service = ClientMetadataService::new(
            config(Duration::from_secs(2), Duration::from_secs(1)),
            Arc::clone(&fetcher) as Arc<dyn MetadataFetcher>,
        );

        let route = service
            .server_for_key("orders", &Value::Int(1), None, true)
            .unwrap();
        assert!(route.is_any_server());

        let route = service
            .server_for_key_wait("orders", &Value::Int(1), None, true)
            .await
            .unwrap();
        assert_eq!(route.location().unwrap().host(), "a");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        service.close().await;
    }

    #[tokio::test]
    async fn test_no_wait_returns_any_server() {
        let fetcher = Arc::new(MockFetcher::default());
        let service = ClientMetadataService::new(CacheConfig::builder().build().unwrap(), fetcher);
        let route = service
            .server_for_key_wait("missing", &Value::Int(1), None, false)
            .await
            .unwrap();
        assert!(route.is_any_server());
        service.close().await;
    }

    #[tokio::test]
    async fn test_timeout_keeps_previous_snapshot() {
        let fetcher = Arc::new(MockFetcher::default().with_region("orders", region_md(3, "a")));
        let service = ClientMetadataService::new(
            config(Duration::ZERO, Duration::from_millis(50)),
            Arc::clone(&fetcher) as Arc<dyn MetadataFetcher>,
        );
        service.refresh_now("orders").await.unwrap();

        *fetcher.delay.lock().unwrap() = Some(Duration::from_millis(500));
        let err = service.refresh_now("orders").await.unwrap_err();
        assert!(err.is_retryable());

        let md = service.metadata("orders").unwrap();
        assert_eq!(md.state(), MetadataState::Active);
        assert!(service.previous_metadata("orders").is_none());
        service.close().await;
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_snapshot() {
        let fetcher = Arc::new(MockFetcher::default().with_region("orders", region_md(3, "a")));
        let service = ClientMetadataService::new(
            CacheConfig::builder().build().unwrap(),
            Arc::clone(&fetcher) as Arc<dyn MetadataFetcher>,
        );
        service.refresh_now("orders").await.unwrap();
        fetcher.fail.store(true, Ordering::SeqCst);
        assert!(service.refresh_now("orders").await.is_err());
        assert_eq!(service.metadata("orders").unwrap().known_bucket_count(), 3);
        service.close().await;
    }

    #[tokio::test]
    async fn test_refresh_retires_previous() {
        let fetcher = Arc::new(MockFetcher::default().with_region("orders", region_md(3, "a")));
        let service = ClientMetadataService::new(
            CacheConfig::builder().build().unwrap(),
            Arc::clone(&fetcher) as Arc<dyn MetadataFetcher>,
        );
        let first = service.refresh_now("orders").await.unwrap();
        fetcher
            .regions
            .lock()
            .unwrap()
            .insert("orders".into(), region_md(3, "b"));
        let second = service.refresh_now("orders").await.unwrap();

        assert_eq!(first.state(), MetadataState::Retired);
        assert_eq!(second.state(), MetadataState::Active);
        assert!(Arc::ptr_eq(&service.previous_metadata("orders").unwrap(), &first));
        let route = service.server_for_key("orders", &Value::Int(0), None, true).unwrap();
        assert_eq!(route.location().unwrap().host(), "b");
        service.close().await;
    }

    #[tokio::test]
    async fn test_apply_pushed_update() {
        let fetcher = Arc::new(MockFetcher::default().with_region("orders", region_md(4, "a")));
        let service = ClientMetadataService::new(CacheConfig::builder().build().unwrap(), fetcher);
        service.refresh_now("orders").await.unwrap();

        let update = BucketLocationsUpdate {
            region: "orders".into(),
            bucket_id: 2,
            locations: vec![BucketServerLocation::new(
                ServerLocation::new("c", 40405),
                2,
                true,
                3,
            )],
        };
        service.apply_update_bytes(&update.encode().unwrap()).unwrap();

        let route = service.server_for_key("orders", &Value::Int(2), None, true).unwrap();
        assert_eq!(
            route,
            ServerRoute::Target {
                location: ServerLocation::new("c", 40405),
                version: 3,
            }
        );

        let out_of_range = BucketLocationsUpdate {
            bucket_id: 9,
            ..update
        };
        assert!(matches!(
            service.apply_update(out_of_range),
            Err(GeodeError::IllegalState(_))
        ));
        service.close().await;
    }

    #[tokio::test]
    async fn test_remove_server() {
        let fetcher = Arc::new(MockFetcher::default().with_region("orders", region_md(2, "a")));
        let service = ClientMetadataService::new(CacheConfig::builder().build().unwrap(), fetcher);
        service.refresh_now("orders").await.unwrap();
        service.remove_server(&ServerLocation::new("a", 40404));
        let route = service.server_for_key("orders", &Value::Int(0), None, true).unwrap();
        assert!(route.is_any_server());
        service.close().await;
    }

    #[tokio::test]
    async fn test_registered_region_hashes_before_refresh() {
        let fetcher = Arc::new(MockFetcher::default().with_region("orders", region_md(7, "a")));
        fetcher.fail.store(true, Ordering::SeqCst);
        let service = ClientMetadataService::new(
            CacheConfig::builder().build().unwrap(),
            Arc::clone(&fetcher) as Arc<dyn MetadataFetcher>,
        );

        assert!(service.register_region("orders", 13));
        assert!(!service.register_region("orders", 99));
        let md = service.metadata("orders").unwrap();
        assert_eq!(md.total_num_buckets(), 13);

        let bucket = service
            .bucket_for_key("orders", &Value::Int(20), None)
            .unwrap()
            .unwrap();
        assert!(bucket < 13);
        let route = service.server_for_key("orders", &Value::Int(20), None, true).unwrap();
        assert!(route.is_any_server());

        // The servers' description replaces the placeholder.
        fetcher.fail.store(false, Ordering::SeqCst);
        service.refresh_now("orders").await.unwrap();
        assert_eq!(service.metadata("orders").unwrap().total_num_buckets(), 7);
        service.close().await;
    }

    #[tokio::test]
    async fn test_enqueue_deduplicates() {
        let fetcher = Arc::new(MockFetcher::default().with_region("orders", region_md(2, "a")));
        *fetcher.delay.lock().unwrap() = Some(Duration::from_millis(100));
        let service = ClientMetadataService::new(
            CacheConfig::builder().build().unwrap(),
            Arc::clone(&fetcher) as Arc<dyn MetadataFetcher>,
        );
        assert!(service.enqueue_refresh("orders"));
        assert!(!service.enqueue_refresh("orders"));
        service.close().await;
    }

    #[tokio::test]
    async fn test_closed_service_rejects_refresh() {
        let fetcher = Arc::new(MockFetcher::default());
        let service = ClientMetadataService::new(CacheConfig::builder().build().unwrap(), fetcher);
        service.close().await;
        assert!(!service.enqueue_refresh("orders"));
    }
}
