//! Client cache entry point.

use std::hash::Hash;
use std::sync::Arc;

use geode_core::pdx::TypeDefinitionSource;
use geode_core::{PdxSerializer, PdxTypeRegistry};

use crate::config::{CacheConfig, RegionAttributes};
use crate::metadata::{ClientMetadataService, MetadataFetcher};
use crate::region::LocalRegion;

/// Owns the state a client shares across regions: the PDX type registry,
/// the serializer built on it, and the partition metadata service.
///
/// # Example
///
/// ```ignore
/// use geode_client::{CacheConfig, ClientCache, RegionAttributes};
///
/// let cache = ClientCache::new(CacheConfig::builder().build()?);
/// let attrs = RegionAttributes::builder().lru_entries_limit(1000).build()?;
/// let region = cache.create_region::<String, Vec<u8>>("orders", &attrs);
/// region.put("k".to_string(), vec![1, 2, 3]);
/// ```
pub struct ClientCache {
    config: CacheConfig,
    registry: Arc<PdxTypeRegistry>,
    serializer: PdxSerializer,
    metadata: Option<ClientMetadataService>,
}

impl ClientCache {
    /// Creates a cache with an empty type registry and no metadata service.
    pub fn new(config: CacheConfig) -> Self {
        let registry = Arc::new(PdxTypeRegistry::new());
        let serializer = PdxSerializer::new(Arc::clone(&registry));
        Self {
            config,
            registry,
            serializer,
            metadata: None,
        }
    }

    /// Fetches unknown PDX types from `source`.
    pub fn with_type_source(mut self, source: Arc<dyn TypeDefinitionSource>) -> Self {
        self.serializer = PdxSerializer::new(Arc::clone(&self.registry)).with_type_source(source);
        self
    }

    /// Starts a metadata service backed by `fetcher`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn with_metadata_fetcher(mut self, fetcher: Arc<dyn MetadataFetcher>) -> Self {
        let service = ClientMetadataService::new(self.config.clone(), fetcher)
            .with_pdx_registry(Arc::clone(&self.registry));
        self.metadata = Some(service);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the PDX type registry.
    pub fn pdx_registry(&self) -> &Arc<PdxTypeRegistry> {
        &self.registry
    }

    /// Returns the PDX serializer.
    pub fn serializer(&self) -> &PdxSerializer {
        &self.serializer
    }

    /// Returns the metadata service, if one was started.
    pub fn metadata_service(&self) -> Option<&ClientMetadataService> {
        self.metadata.as_ref()
    }

    /// Creates a local region.
    ///
    /// With a metadata service running, the region's bucket count is
    /// registered so keys hash to buckets before the first refresh.
    pub fn create_region<K, V>(&self, name: &str, attributes: &RegionAttributes) -> LocalRegion<K, V>
    where
        K: Hash + Eq + Clone,
        V: Clone,
    {
        if let Some(metadata) = &self.metadata {
            metadata.register_region(name, attributes.total_num_buckets());
        }
        tracing::debug!(
            region = %name,
            lru_entries_limit = attributes.lru_entries_limit(),
            total_num_buckets = attributes.total_num_buckets(),
            "created region"
        );
        LocalRegion::new(name, attributes)
    }

    /// Called when the client has lost every server connection.
    ///
    /// Drops all known PDX types if the cache is configured to, since a
    /// restarted cluster may have reassigned type ids.
    pub fn on_all_servers_disconnected(&self) {
        if self.config.on_client_disconnect_clear_pdx_type_ids() {
            let dropped = self.registry.type_count();
            self.registry.clear();
            tracing::info!(dropped, "cleared PDX types after losing all servers");
        }
    }

    /// Stops background tasks.
    pub async fn close(&self) {
        if let Some(metadata) = &self.metadata {
            metadata.close().await;
        }
    }
}

impl std::fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache")
            .field("config", &self.config)
            .field("pdx_types", &self.registry.type_count())
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geode_core::pdx::PdxField;
    use geode_core::PdxFieldType;

    fn register_one(cache: &ClientCache) {
        cache.pdx_registry().register_local(
            "example.Thing",
            vec![PdxField::new("a", PdxFieldType::Int)],
        );
    }

    #[test]
    fn test_disconnect_clears_types_when_configured() {
        let config = CacheConfig::builder()
            .on_client_disconnect_clear_pdx_type_ids(true)
            .build()
            .unwrap();
        let cache = ClientCache::new(config);
        register_one(&cache);
        assert_eq!(cache.pdx_registry().type_count(), 1);
        cache.on_all_servers_disconnected();
        assert_eq!(cache.pdx_registry().type_count(), 0);
    }

    #[test]
    fn test_disconnect_keeps_types_by_default() {
        let cache = ClientCache::new(CacheConfig::builder().build().unwrap());
        register_one(&cache);
        cache.on_all_servers_disconnected();
        assert_eq!(cache.pdx_registry().type_count(), 1);
    }

    #[test]
    fn test_create_region_uses_attributes() {
        let cache = ClientCache::new(CacheConfig::builder().build().unwrap());
        let attrs = RegionAttributes::builder().lru_entries_limit(2).build().unwrap();
        let region = cache.create_region::<i32, i32>("r", &attrs);
        for i in 0..5 {
            region.put(i, i);
        }
        assert_eq!(region.len(), 2);
        assert_eq!(region.name(), "r");
    }
}
