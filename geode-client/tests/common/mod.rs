//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use geode_client::{
    BucketServerLocation, ClientMetadata, LocalRegion, MetadataFetcher, RegionAttributes,
    RegionMetadata, ServerLocation,
};
use geode_core::{GeodeError, PdxInstance, PdxType, PdxTypeRegistry, Result};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Installs a log subscriber honouring `RUST_LOG`; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn unique_name(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", prefix, std::process::id(), id)
}

pub fn bounded_region(limit: u32) -> LocalRegion<i32, String> {
    let attrs = RegionAttributes::builder()
        .lru_entries_limit(limit)
        .build()
        .expect("failed to build region attributes");
    LocalRegion::new(unique_name("region"), &attrs)
}

pub fn server(host: &str) -> ServerLocation {
    ServerLocation::new(host, 40404)
}

pub fn bucket_location(host: &str, bucket_id: u32, primary: bool) -> BucketServerLocation {
    BucketServerLocation::new(server(host), bucket_id, primary, 1)
}

/// Metadata where bucket `b` has primary `p{b % servers}` and one secondary.
pub fn populated_metadata(total_num_buckets: u32, servers: u32) -> ClientMetadata {
    let metadata = ClientMetadata::new(unique_name("partitioned"), total_num_buckets);
    for bucket in 0..total_num_buckets {
        let primary = format!("p{}", bucket % servers);
        let secondary = format!("p{}", (bucket + 1) % servers);
        metadata
            .update_bucket_server_locations(
                bucket,
                vec![
                    bucket_location(&secondary, bucket, false),
                    bucket_location(&primary, bucket, true),
                ],
            )
            .expect("bucket in range");
    }
    metadata
}

/// Re-tags data written through `writer` with `type_id`, as if a server had
/// assigned the id, and returns the instance with its type definition.
pub fn as_server_type(
    writer: &PdxTypeRegistry,
    instance: &PdxInstance,
    type_id: i32,
) -> (PdxInstance, PdxType) {
    let written = writer
        .resolve(instance.type_id())
        .expect("writer registry knows its own type");
    let pdx_type = PdxType::clone(&written).with_type_id(type_id);
    (PdxInstance::new(type_id, instance.body().to_vec()), pdx_type)
}

/// Serves fixed region metadata.
#[derive(Default)]
pub struct StaticFetcher {
    regions: Mutex<HashMap<String, RegionMetadata>>,
}

impl StaticFetcher {
    pub fn insert(&self, region: &str, metadata: RegionMetadata) {
        self.regions
            .lock()
            .unwrap()
            .insert(region.to_string(), metadata);
    }
}

#[async_trait]
impl MetadataFetcher for StaticFetcher {
    async fn fetch_region_metadata(&self, region: &str) -> Result<RegionMetadata> {
        self.regions
            .lock()
            .unwrap()
            .get(region)
            .cloned()
            .ok_or_else(|| GeodeError::Protocol(format!("region {} is not partitioned", region)))
    }
}

pub fn region_metadata(total_num_buckets: u32, host: &str) -> RegionMetadata {
    RegionMetadata {
        total_num_buckets,
        buckets: (0..total_num_buckets)
            .map(|b| bucket_location(host, b, true))
            .collect(),
        ..RegionMetadata::default()
    }
}
