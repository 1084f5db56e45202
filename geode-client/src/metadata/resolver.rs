//! Key to bucket mapping.

use geode_core::{PdxTypeRegistry, Result, Value};

use super::ClientMetadata;

/// Maps application keys onto routing objects and fixed partitions.
///
/// Without a resolver the key itself is the routing object.
pub trait PartitionResolver: Send + Sync {
    /// Resolver name, for logging.
    fn name(&self) -> &str;

    /// Returns the object whose hash code selects the bucket.
    fn routing_object(&self, key: &Value) -> Value;

    /// Returns the fixed partition owning `key`, if the region uses fixed
    /// partitioning.
    fn partition_name(&self, _key: &Value) -> Option<String> {
        None
    }
}

/// Returns `|hashcode % total_num_buckets|`.
///
/// `total_num_buckets` must be non-zero.
pub fn bucket_for_hash(hashcode: i32, total_num_buckets: u32) -> u32 {
    (i64::from(hashcode) % i64::from(total_num_buckets)).unsigned_abs() as u32
}

/// Computes the bucket of `key` in a region described by `metadata`.
///
/// A resolver that names a known fixed partition takes precedence over
/// hashing. PDX keys hash their identity fields through `registry`.
/// Returns `None` only for a region with zero buckets.
pub fn bucket_for_key(
    metadata: &ClientMetadata,
    key: &Value,
    resolver: Option<&dyn PartitionResolver>,
    registry: &PdxTypeRegistry,
) -> Result<Option<u32>> {
    let total = metadata.total_num_buckets();
    if total == 0 {
        return Ok(None);
    }
    let Some(resolver) = resolver else {
        return Ok(Some(bucket_for_hash(key.key_hashcode(registry)?, total)));
    };

    let routing = resolver.routing_object(key);
    let hash = routing.key_hashcode(registry)?;
    if let Some(partition) = resolver.partition_name(key) {
        match metadata.assign_fixed_bucket_id(&partition, hash) {
            Some(bucket) => return Ok(Some(bucket)),
            None => tracing::debug!(
                resolver = resolver.name(),
                partition = %partition,
                "unknown fixed partition, falling back to hashing"
            ),
        }
    }
    Ok(Some(bucket_for_hash(hash, total)))
}
