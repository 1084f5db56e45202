//! Declarative configuration loading from JSON, YAML, TOML and environment variables.
//!
//! File structs mirror [`CacheConfig`](crate::config::CacheConfig) and
//! [`RegionAttributes`](crate::config::RegionAttributes) with serde-friendly
//! types and are converted through the builders, so the same validation
//! applies. Durations are given in milliseconds.
//!
//! # Supported Formats
//!
//! - **JSON** (always available): `CacheConfig::from_json_str(..)`
//! - **YAML** (requires `config-file` feature): `CacheConfig::from_yaml("geode.yaml")`
//! - **TOML** (requires `config-file` feature): `CacheConfig::from_toml("geode.toml")`
//! - **Environment Variables** (always available): `CacheConfig::from_env()`
//!
//! # Example YAML
//!
//! ```yaml
//! on-client-disconnect-clear-pdxType-Ids: true
//! bucket-wait-timeout: 0
//! metadata-refresh-timeout: 5000
//! regions:
//!   orders:
//!     lru-entries-limit: 1000
//!     entry-idle-timeout: 60000
//!     expiration-action: local-destroy
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{
    CacheConfig, CacheConfigBuilder, ConfigError, RegionAttributes, RegionAttributesBuilder,
};

/// Top-level file-based configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileConfig {
    /// Clear PDX types when every server connection is lost.
    #[serde(rename = "on-client-disconnect-clear-pdxType-Ids")]
    pub on_client_disconnect_clear_pdx_type_ids: Option<bool>,
    /// Bucket wait timeout in milliseconds.
    pub bucket_wait_timeout: Option<u64>,
    /// Metadata refresh timeout in milliseconds.
    pub metadata_refresh_timeout: Option<u64>,
    /// Metadata refresh queue capacity.
    pub refresh_queue_capacity: Option<usize>,
    /// Region attributes by region name.
    pub regions: Option<HashMap<String, FileRegionConfig>>,
}

/// File-based region attributes.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileRegionConfig {
    /// LRU entry limit; 0 disables eviction.
    pub lru_entries_limit: Option<u32>,
    /// Entry time-to-live in milliseconds.
    pub entry_time_to_live: Option<u64>,
    /// Entry idle timeout in milliseconds.
    pub entry_idle_timeout: Option<u64>,
    /// `local-invalidate` or `local-destroy`.
    pub expiration_action: Option<String>,
    /// Reject stale versioned puts.
    pub concurrency_checks_enabled: Option<bool>,
    /// Number of buckets.
    pub total_num_buckets: Option<u32>,
}

impl TryFrom<FileConfig> for CacheConfig {
    type Error = ConfigError;

    fn try_from(file: FileConfig) -> Result<Self, Self::Error> {
        let mut builder = CacheConfigBuilder::new();

        if let Some(clear) = file.on_client_disconnect_clear_pdx_type_ids {
            builder = builder.on_client_disconnect_clear_pdx_type_ids(clear);
        }
        if let Some(ms) = file.bucket_wait_timeout {
            builder = builder.bucket_wait_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = file.metadata_refresh_timeout {
            builder = builder.metadata_refresh_timeout(Duration::from_millis(ms));
        }
        if let Some(capacity) = file.refresh_queue_capacity {
            builder = builder.refresh_queue_capacity(capacity);
        }

        builder.build()
    }
}

impl TryFrom<FileRegionConfig> for RegionAttributes {
    type Error = ConfigError;

    fn try_from(file: FileRegionConfig) -> Result<Self, Self::Error> {
        let mut builder = RegionAttributesBuilder::new();

        if let Some(limit) = file.lru_entries_limit {
            builder = builder.lru_entries_limit(limit);
        }
        if let Some(ms) = file.entry_time_to_live {
            builder = builder.entry_time_to_live(Duration::from_millis(ms));
        }
        if let Some(ms) = file.entry_idle_timeout {
            builder = builder.entry_idle_timeout(Duration::from_millis(ms));
        }
        if let Some(action) = file.expiration_action {
            builder = builder.expiration_action(action.parse()?);
        }
        if let Some(enabled) = file.concurrency_checks_enabled {
            builder = builder.concurrency_checks_enabled(enabled);
        }
        if let Some(buckets) = file.total_num_buckets {
            builder = builder.total_num_buckets(buckets);
        }

        builder.build()
    }
}

impl FileConfig {
    /// Converts the region sections into validated attributes.
    pub fn region_attributes(&self) -> Result<HashMap<String, RegionAttributes>, ConfigError> {
        self.regions
            .iter()
            .flatten()
            .map(|(name, region)| {
                RegionAttributes::try_from(region.clone())
                    .map(|attrs| (name.clone(), attrs))
                    .map_err(|e| ConfigError::new(format!("region {}: {}", name, e.message())))
            })
            .collect()
    }
}

impl CacheConfig {
    /// Parses configuration from a JSON document.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let file_config: FileConfig = serde_json::from_str(content)
            .map_err(|e| ConfigError::new(format!("failed to parse JSON config: {e}")))?;
        file_config.try_into()
    }

    /// Loads configuration from a JSON file.
    pub fn from_json<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("failed to read JSON config file: {e}")))?;
        Self::from_json_str(&content)
    }

    /// Loads configuration from a YAML file.
    ///
    /// Requires the `config-file` feature.
    #[cfg(feature = "config-file")]
    pub fn from_yaml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("failed to read YAML config file: {e}")))?;
        let file_config: FileConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("failed to parse YAML config: {e}")))?;
        file_config.try_into()
    }

    /// Loads configuration from a TOML file.
    ///
    /// Requires the `config-file` feature.
    #[cfg(feature = "config-file")]
    pub fn from_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("failed to read TOML config file: {e}")))?;
        let file_config: FileConfig = toml_crate::from_str(&content)
            .map_err(|e| ConfigError::new(format!("failed to parse TOML config: {e}")))?;
        file_config.try_into()
    }

    /// Loads configuration from environment variables.
    ///
    /// | Variable | Maps to |
    /// |----------|---------|
    /// | `GEODE_CLEAR_PDX_TYPES_ON_DISCONNECT` | `"true"` or `"false"` |
    /// | `GEODE_BUCKET_WAIT_TIMEOUT_MS` | bucket wait timeout |
    /// | `GEODE_METADATA_REFRESH_TIMEOUT_MS` | metadata refresh timeout |
    /// | `GEODE_REFRESH_QUEUE_CAPACITY` | metadata refresh queue capacity |
    ///
    /// Values that do not parse are ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
        }

        let file_config = FileConfig {
            on_client_disconnect_clear_pdx_type_ids: std::env::var(
                "GEODE_CLEAR_PDX_TYPES_ON_DISCONNECT",
            )
            .ok()
            .map(|v| v.eq_ignore_ascii_case("true")),
            bucket_wait_timeout: parsed("GEODE_BUCKET_WAIT_TIMEOUT_MS"),
            metadata_refresh_timeout: parsed("GEODE_METADATA_REFRESH_TIMEOUT_MS"),
            refresh_queue_capacity: parsed("GEODE_REFRESH_QUEUE_CAPACITY"),
            ..Default::default()
        };

        file_config.try_into()
    }
}

/// Loads a configuration file, picking the format from its extension.
///
/// `.json` is always supported; `.yaml`, `.yml` and `.toml` require the
/// `config-file` feature.
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> Result<CacheConfig, ConfigError> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => CacheConfig::from_json(path),
        #[cfg(feature = "config-file")]
        Some("yaml" | "yml") => CacheConfig::from_yaml(path),
        #[cfg(feature = "config-file")]
        Some("toml") => CacheConfig::from_toml(path),
        Some(ext) => Err(ConfigError::new(format!(
            "unsupported config file extension: .{ext}"
        ))),
        None => Err(ConfigError::new("config file has no extension")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExpirationAction;

    #[test]
    fn test_file_config_defaults_produce_valid_cache_config() {
        let config: CacheConfig = FileConfig::default().try_into().unwrap();
        assert_eq!(config.metadata_refresh_timeout(), Duration::from_secs(5));
        assert_eq!(config.refresh_queue_capacity(), 64);
    }

    #[test]
    fn test_json_property_names() {
        let json = r#"{
            "on-client-disconnect-clear-pdxType-Ids": true,
            "bucket-wait-timeout": 1500,
            "metadata-refresh-timeout": 2000,
            "refresh-queue-capacity": 16
        }"#;
        let config = CacheConfig::from_json_str(json).unwrap();
        assert!(config.on_client_disconnect_clear_pdx_type_ids());
        assert_eq!(config.bucket_wait_timeout(), Duration::from_millis(1500));
        assert_eq!(config.metadata_refresh_timeout(), Duration::from_secs(2));
        assert_eq!(config.refresh_queue_capacity(), 16);
    }

    #[test]
    fn test_json_validation_applies() {
        assert!(CacheConfig::from_json_str(r#"{"refresh-queue-capacity": 0}"#).is_err());
        assert!(CacheConfig::from_json_str(r#"{"metadata-refresh-timeout": 0}"#).is_err());
        assert!(CacheConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_region_sections() {
        let json = r#"{
            "regions": {
                "orders": {
                    "lru-entries-limit": 1000,
                    "entry-idle-timeout": 60000,
                    "expiration-action": "local-destroy"
                }
            }
        }"#;
        let file: FileConfig = serde_json::from_str(json).unwrap();
        let regions = file.region_attributes().unwrap();
        let orders = &regions["orders"];
        assert_eq!(orders.lru_entries_limit(), 1000);
        assert_eq!(orders.entry_idle_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(orders.expiration_action(), ExpirationAction::LocalDestroy);
    }

    #[test]
    fn test_region_section_error_names_region() {
        let file = FileConfig {
            regions: Some(HashMap::from([(
                "bad".to_string(),
                FileRegionConfig {
                    expiration_action: Some("explode".to_string()),
                    ..Default::default()
                },
            )])),
            ..Default::default()
        };
        let err = file.region_attributes().unwrap_err();
        assert!(err.message().starts_with("region bad"));
    }

    #[test]
    fn test_from_env_refresh_timeout() {
        std::env::set_var("GEODE_METADATA_REFRESH_TIMEOUT_MS", "1234");
        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.metadata_refresh_timeout(), Duration::from_millis(1234));
        std::env::remove_var("GEODE_METADATA_REFRESH_TIMEOUT_MS");
    }

    #[test]
    fn test_load_config_unknown_extension() {
        assert!(load_config("geode.ini").is_err());
        assert!(load_config("geode").is_err());
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn test_yaml_round_trip() {
        let file_config = FileConfig {
            refresh_queue_capacity: Some(64),
            on_client_disconnect_clear_pdx_type_ids: Some(true),
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&file_config).unwrap();
        assert!(yaml.contains("on-client-disconnect-clear-pdxType-Ids"));
        let parsed: FileConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.refresh_queue_capacity, Some(64));
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn test_toml_round_trip() {
        let file_config = FileConfig {
            bucket_wait_timeout: Some(3000),
            ..Default::default()
        };
        let toml_str = toml_crate::to_string(&file_config).unwrap();
        let parsed: FileConfig = toml_crate::from_str(&toml_str).unwrap();
        assert_eq!(parsed.bucket_wait_timeout, Some(3000));
    }
}
