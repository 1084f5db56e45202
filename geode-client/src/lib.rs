//! Client-side core of a [Geode](https://geode.apache.org/) cache client.
//!
//! This crate sits above the wire codec and PDX engine of `geode-core` and
//! provides the state a client keeps between requests:
//!
//! - **Partition routing**: per-region bucket tables ([`ClientMetadata`]),
//!   key to bucket mapping ([`PartitionResolver`]) and a background service
//!   keeping the tables current ([`ClientMetadataService`]).
//! - **Local regions**: a client-side entry store with a recently-used-bit
//!   LRU policy and lazy expiration ([`LocalRegion`]).
//! - **Configuration**: cache and region settings, from builders or from
//!   JSON, YAML or TOML files.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use geode_client::{CacheConfig, ClientCache, RegionAttributes};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = ClientCache::new(CacheConfig::builder().build()?);
//!
//! let attrs = RegionAttributes::builder().lru_entries_limit(10).build()?;
//! let region = cache.create_region::<i32, String>("orders", &attrs);
//! for i in 0..20 {
//!     region.put(i, format!("order-{}", i));
//! }
//! assert_eq!(region.len(), 10);
//! # Ok(())
//! # }
//! ```
//!
//! # PDX
//!
//! ```rust,ignore
//! use geode_client::PdxSerializable;
//!
//! #[derive(PdxSerializable)]
//! #[pdx(class_name = "com.example.Order")]
//! struct Order {
//!     #[pdx(identity)]
//!     id: i64,
//!     customer: String,
//!     notes: Option<String>,
//! }
//!
//! let bytes = cache.serializer().serialize(&order)?;
//! let back: Order = cache.serializer().deserialize(&bytes)?;
//! ```
//!
//! # Feature Flags
//!
//! | Flag | Purpose |
//! |------|---------|
//! | `config-file` | YAML and TOML configuration files |

#![warn(missing_docs)]

mod client;
pub mod config;
mod config_file;
pub mod metadata;
pub mod region;

pub use client::ClientCache;
pub use config::{
    CacheConfig, CacheConfigBuilder, ConfigError, EvictionAction, ExpirationAction,
    RegionAttributes, RegionAttributesBuilder, DEFAULT_TOTAL_NUM_BUCKETS,
};
pub use config_file::{load_config, FileConfig, FileRegionConfig};
pub use metadata::{
    bucket_for_key, BucketLocationsUpdate, BucketServerLocation, ClientMetadata,
    ClientMetadataService, MetadataFetcher, MetadataState, PartitionResolver, RegionMetadata,
    ServerLocation, ServerRoute,
};
pub use region::{LocalRegion, RegionStats};

pub use geode_core::{
    GeodeError, PdxInstance, PdxReader, PdxReaderExt, PdxSerializer, PdxTypeRegistry, PdxWriter,
    PdxWriterExt, Result, Value,
};

pub use geode_core::PdxSerializable;
pub use geode_derive::PdxSerializable;
