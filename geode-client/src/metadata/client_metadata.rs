//! Bucket-to-server table of one partitioned region.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use rand::seq::SliceRandom;

use geode_core::{GeodeError, Result};

use super::{BucketServerLocation, ServerLocation};

/// Lifecycle of a metadata snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MetadataState {
    /// Created, no bucket information applied yet.
    Uninitialized = 0,
    /// Serving lookups.
    Active = 1,
    /// Serving lookups while a replacement is being fetched.
    Refreshing = 2,
    /// Replaced by a newer snapshot; kept only as a fallback.
    Retired = 3,
}

impl MetadataState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Uninitialized,
            1 => Self::Active,
            2 => Self::Refreshing,
            _ => Self::Retired,
        }
    }
}

/// Where an operation on a bucket should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerRoute {
    /// Send to this server, tagging the request with `version`.
    Target {
        /// Chosen server.
        location: ServerLocation,
        /// Metadata version byte of the chosen location.
        version: i8,
    },
    /// No location is known; any server may take the request.
    AnyServer,
}

impl ServerRoute {
    /// Returns the targeted server, if any.
    pub fn location(&self) -> Option<&ServerLocation> {
        match self {
            Self::Target { location, .. } => Some(location),
            Self::AnyServer => None,
        }
    }

    /// Returns true for the any-server fallback.
    pub fn is_any_server(&self) -> bool {
        matches!(self, Self::AnyServer)
    }
}

/// Buckets owned by a named fixed partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPartition {
    /// First bucket of the partition.
    pub start_bucket: u32,
    /// Number of consecutive buckets.
    pub num_buckets: u32,
}

type BucketList = Vec<Arc<BucketServerLocation>>;

/// Maps bucket ids to the servers hosting them.
///
/// Each bucket's list is replaced as a whole, so a reader sees either the old
/// or the new list of a bucket and is never blocked by updates to other buckets.
pub struct ClientMetadata {
    region: String,
    buckets: Vec<ArcSwap<BucketList>>,
    colocated_with: Option<String>,
    fixed_partitions: HashMap<String, FixedPartition>,
    state: AtomicU8,
}

impl ClientMetadata {
    /// Creates an empty table with `total_num_buckets` buckets.
    pub fn new(region: impl Into<String>, total_num_buckets: u32) -> Self {
        Self {
            region: region.into(),
            buckets: (0..total_num_buckets)
                .map(|_| ArcSwap::from_pointee(Vec::new()))
                .collect(),
            colocated_with: None,
            fixed_partitions: HashMap::new(),
            state: AtomicU8::new(MetadataState::Uninitialized as u8),
        }
    }

    /// Sets the region this one is colocated with.
    pub fn with_colocated_with(mut self, region: impl Into<String>) -> Self {
        self.colocated_with = Some(region.into());
        self
    }

    /// Adds a fixed partition.
    pub fn with_fixed_partition(
        mut self,
        name: impl Into<String>,
        start_bucket: u32,
        num_buckets: u32,
    ) -> Self {
        self.fixed_partitions.insert(
            name.into(),
            FixedPartition {
                start_bucket,
                num_buckets,
            },
        );
        self
    }

    /// Creates a snapshot with the same shape and bucket lists as `other`.
    pub fn copy_of(other: &ClientMetadata) -> Self {
        Self {
            region: other.region.clone(),
            buckets: other
                .buckets
                .iter()
                .map(|b| ArcSwap::new(b.load_full()))
                .collect(),
            colocated_with: other.colocated_with.clone(),
            fixed_partitions: other.fixed_partitions.clone(),
            state: AtomicU8::new(MetadataState::Uninitialized as u8),
        }
    }

    /// Returns the region name.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Returns the number of buckets.
    pub fn total_num_buckets(&self) -> u32 {
        self.buckets.len() as u32
    }

    /// Returns the region this one is colocated with.
    pub fn colocated_with(&self) -> Option<&str> {
        self.colocated_with.as_deref()
    }

    /// Returns the fixed partitions by name.
    pub fn fixed_partitions(&self) -> &HashMap<String, FixedPartition> {
        &self.fixed_partitions
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> MetadataState {
        MetadataState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves the snapshot to `state`.
    pub fn set_state(&self, state: MetadataState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn bucket(&self, bucket_id: u32) -> Result<&ArcSwap<BucketList>> {
        self.buckets.get(bucket_id as usize).ok_or_else(|| {
            tracing::error!(
                region = %self.region,
                bucket_id,
                total = self.buckets.len(),
                "bucket id out of range"
            );
            GeodeError::IllegalState(format!(
                "bucket id {} out of range for region {} with {} buckets",
                bucket_id,
                self.region,
                self.buckets.len()
            ))
        })
    }

    /// Chooses a server for `bucket_id`.
    ///
    /// With `try_primary` the primary is returned when known, otherwise the
    /// first listed server. Without it any listed server may be chosen. An
    /// empty bucket yields [`ServerRoute::AnyServer`].
    pub fn get_server_location(&self, bucket_id: u32, try_primary: bool) -> Result<ServerRoute> {
        let locations = self.bucket(bucket_id)?.load();
        let chosen = if try_primary {
            locations
                .iter()
                .find(|l| l.is_primary())
                .or_else(|| locations.first())
        } else {
            locations.choose(&mut rand::thread_rng())
        };
        Ok(match chosen {
            Some(l) => ServerRoute::Target {
                location: l.location().clone(),
                version: l.version(),
            },
            None => ServerRoute::AnyServer,
        })
    }

    /// Replaces the server list of one bucket.
    ///
    /// Primaries are placed first, secondaries after them in random order so
    /// that non-primary reads spread across servers.
    pub fn update_bucket_server_locations(
        &self,
        bucket_id: u32,
        locations: Vec<BucketServerLocation>,
    ) -> Result<()> {
        let slot = self.bucket(bucket_id)?;
        let (mut ordered, mut secondaries): (BucketList, BucketList) = locations
            .into_iter()
            .map(Arc::new)
            .partition(|l| l.is_primary());
        secondaries.shuffle(&mut rand::thread_rng());
        ordered.extend(secondaries);

        tracing::debug!(
            region = %self.region,
            bucket_id,
            servers = ordered.len(),
            "updated bucket server locations"
        );
        slot.store(Arc::new(ordered));
        Ok(())
    }

    /// Installs a server list exactly as given, without reordering.
    pub fn populate_dummy_servers(
        &self,
        bucket_id: u32,
        locations: Vec<BucketServerLocation>,
    ) -> Result<()> {
        let slot = self.bucket(bucket_id)?;
        slot.store(Arc::new(locations.into_iter().map(Arc::new).collect()));
        Ok(())
    }

    /// Removes a server from every bucket it hosts.
    ///
    /// Each bucket is rewritten with compare-and-swap, so a list installed
    /// concurrently by an update is filtered rather than overwritten.
    pub fn remove_bucket_server_location(&self, location: &ServerLocation) {
        let mut removed = 0usize;
        for slot in &self.buckets {
            if !slot.load().iter().any(|l| l.location() == location) {
                continue;
            }
            let replaced = slot.rcu(|current| {
                current
                    .iter()
                    .filter(|l| l.location() != location)
                    .cloned()
                    .collect::<BucketList>()
            });
            if replaced.iter().any(|l| l.location() == location) {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(
                region = %self.region,
                server = %location,
                buckets = removed,
                "removed server from bucket metadata"
            );
        }
    }

    /// Returns every server listed for a bucket, primaries first.
    pub fn advise_server_locations(&self, bucket_id: u32) -> Result<Vec<Arc<BucketServerLocation>>> {
        Ok(self.bucket(bucket_id)?.load().as_ref().clone())
    }

    /// Returns the primary server of a bucket, if known.
    pub fn advise_primary_server_location(
        &self,
        bucket_id: u32,
    ) -> Result<Option<Arc<BucketServerLocation>>> {
        Ok(self
            .bucket(bucket_id)?
            .load()
            .iter()
            .find(|l| l.is_primary())
            .cloned())
    }

    /// Picks one of the servers known for any bucket, uniformly.
    ///
    /// A server hosting many buckets is no more likely to be chosen than one
    /// hosting a single bucket.
    pub fn advise_random_server_location(&self) -> Option<Arc<BucketServerLocation>> {
        let mut seen = HashSet::new();
        let mut servers: Vec<Arc<BucketServerLocation>> = Vec::new();
        for slot in &self.buckets {
            for location in slot.load().iter() {
                if seen.insert(location.location().clone()) {
                    servers.push(Arc::clone(location));
                }
            }
        }
        servers.choose(&mut rand::thread_rng()).cloned()
    }

    /// Maps a key's hash code onto the buckets of a fixed partition.
    ///
    /// Returns `None` if the partition is unknown.
    pub fn assign_fixed_bucket_id(&self, partition_name: &str, hashcode: i32) -> Option<u32> {
        let partition = self.fixed_partitions.get(partition_name)?;
        if partition.num_buckets == 0 {
            return None;
        }
        let offset = (i64::from(hashcode) % i64::from(partition.num_buckets)).unsigned_abs() as u32;
        Some(partition.start_bucket + offset)
    }

    /// Returns the number of buckets with at least one known server.
    pub fn known_bucket_count(&self) -> usize {
        self.buckets.iter().filter(|b| !b.load().is_empty()).count()
    }
}

impl std::fmt::Debug for ClientMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientMetadata")
            .field("region", &self.region)
            .field("total_num_buckets", &self.buckets.len())
            .field("known_buckets", &self.known_bucket_count())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(host: &str, bucket: u32, primary: bool) -> BucketServerLocation {
        BucketServerLocation::new(ServerLocation::new(host, 40404), bucket, primary, 1)
    }

    #[test]
    fn test_out_of_range_bucket() {
        let md = ClientMetadata::new("r", 4);
        let err = md.get_server_location(4, true).unwrap_err();
        assert!(matches!(err, GeodeError::IllegalState(_)));
        assert!(md.update_bucket_server_locations(9, vec![]).is_err());
    }

    #[test]
    fn test_empty_bucket_routes_anywhere() {
        let md = ClientMetadata::new("r", 4);
        assert_eq!(md.get_server_location(0, true).unwrap(), ServerRoute::AnyServer);
        assert_eq!(md.get_server_location(0, false).unwrap(), ServerRoute::AnyServer);
    }

    #[test]
    fn test_primary_preferred() {
        let md = ClientMetadata::new("r", 4);
        md.update_bucket_server_locations(
            1,
            vec![loc("s1", 1, false), loc("p", 1, true), loc("s2", 1, false)],
        )
        .unwrap();
        for _ in 0..20 {
            let route = md.get_server_location(1, true).unwrap();
            assert_eq!(route.location().unwrap().host(), "p");
        }
        let listed = md.advise_server_locations(1).unwrap();
        assert!(listed[0].is_primary());
        assert_eq!(listed.len(), 3);
        assert_eq!(
            md.advise_primary_server_location(1).unwrap().unwrap().location().host(),
            "p"
        );
    }

    #[test]
    fn test_no_primary_uses_first() {
        let md = ClientMetadata::new("r", 2);
        md.populate_dummy_servers(0, vec![loc("a", 0, false), loc("b", 0, false)])
            .unwrap();
        let route = md.get_server_location(0, true).unwrap();
        assert_eq!(route.location().unwrap().host(), "a");
        assert!(md.advise_primary_server_location(0).unwrap().is_none());
    }

    #[test]
    fn test_non_primary_picks_listed_server() {
        let md = ClientMetadata::new("r", 2);
        md.update_bucket_server_locations(0, vec![loc("a", 0, true), loc("b", 0, false)])
            .unwrap();
        for _ in 0..20 {
            let host = md.get_server_location(0, false).unwrap().location().unwrap().host().to_string();
            assert!(host == "a" || host == "b");
        }
    }

    #[test]
    fn test_remove_server_everywhere() {
        let md = ClientMetadata::new("r", 3);
        md.update_bucket_server_locations(0, vec![loc("a", 0, true), loc("b", 0, false)])
            .unwrap();
        md.update_bucket_server_locations(2, vec![loc("a", 2, false)]).unwrap();
        md.remove_bucket_server_location(&ServerLocation::new("a", 40404));
        assert_eq!(md.advise_server_locations(0).unwrap().len(), 1);
        assert!(md.advise_server_locations(2).unwrap().is_empty());
        assert_eq!(md.known_bucket_count(), 1);
    }

    #[test]
    fn test_random_server_location() {
        let md = ClientMetadata::new("r", 3);
        assert!(md.advise_random_server_location().is_none());
        md.update_bucket_server_locations(2, vec![loc("only", 2, true)]).unwrap();
        assert_eq!(
            md.advise_random_server_location().unwrap().location().host(),
            "only"
        );
    }

    #[test]
    fn test_random_server_location_is_per_server() {
        let md = ClientMetadata::new("r", 100);
        for bucket in 0..99 {
            md.update_bucket_server_locations(bucket, vec![loc("busy", bucket, true)])
                .unwrap();
        }
        md.update_bucket_server_locations(99, vec![loc("idle", 99, true)]).unwrap();

        let idle = (0..2000)
            .filter(|_| md.advise_random_server_location().unwrap().location().host() == "idle")
            .count();
        // Expected 1000 for a uniform pick; 20 when weighted by bucket count.
        assert!(idle > 800, "idle picked {} of 2000 times", idle);
    }

    #[test]
    fn test_fixed_bucket_assignment() {
        let md = ClientMetadata::new("r", 20).with_fixed_partition("Q1", 10, 4);
        assert_eq!(md.assign_fixed_bucket_id("Q1", 7), Some(13));
        assert_eq!(md.assign_fixed_bucket_id("Q1", -7), Some(13));
        assert_eq!(md.assign_fixed_bucket_id("Q2", 7), None);
    }

    #[test]
    fn test_copy_keeps_buckets() {
        let md = ClientMetadata::new("r", 2).with_colocated_with("parent");
        md.update_bucket_server_locations(1, vec![loc("a", 1, true)]).unwrap();
        md.set_state(MetadataState::Active);
        let copy = ClientMetadata::copy_of(&md);
        assert_eq!(copy.colocated_with(), Some("parent"));
        assert_eq!(copy.state(), MetadataState::Uninitialized);
        assert_eq!(copy.advise_server_locations(1).unwrap().len(), 1);
        // Updating the copy leaves the original alone.
        copy.update_bucket_server_locations(1, vec![]).unwrap();
        assert_eq!(md.advise_server_locations(1).unwrap().len(), 1);
    }

    #[test]
    fn test_state_transitions() {
        let md = ClientMetadata::new("r", 1);
        assert_eq!(md.state(), MetadataState::Uninitialized);
        md.set_state(MetadataState::Refreshing);
        assert_eq!(md.state(), MetadataState::Refreshing);
        md.set_state(MetadataState::Retired);
        assert_eq!(md.state(), MetadataState::Retired);
    }

    #[test]
    fn test_client_metadata_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ClientMetadata>();
    }
}
