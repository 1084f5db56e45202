//! Partition routing.
//!
//! A partitioned region splits its keys over a fixed number of buckets, each
//! hosted by one or more servers. [`ClientMetadata`] holds the bucket table of
//! one region, [`PartitionResolver`] and [`bucket_for_key`] map keys to
//! buckets, and [`ClientMetadataService`] keeps the tables of all regions
//! current.

mod client_metadata;
mod location;
mod resolver;
mod service;

pub use client_metadata::{ClientMetadata, FixedPartition, MetadataState, ServerRoute};
pub use location::{BucketLocationsUpdate, BucketServerLocation, ServerLocation};
pub use resolver::{bucket_for_hash, bucket_for_key, PartitionResolver};
pub use service::{
    ClientMetadataService, FixedPartitionInfo, MetadataFetcher, RegionMetadata,
};
