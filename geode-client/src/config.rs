//! Cache and region configuration types and builders.

use std::time::Duration;

use geode_core::GeodeError;

/// Default time to wait for a bucket's metadata (0 = no wait).
const DEFAULT_BUCKET_WAIT_TIMEOUT: Duration = Duration::ZERO;
/// Default timeout for one metadata refresh round trip.
const DEFAULT_METADATA_REFRESH_TIMEOUT: Duration = Duration::from_secs(5);
/// Default capacity of the metadata refresh queue.
const DEFAULT_REFRESH_QUEUE_CAPACITY: usize = 64;
/// Default number of buckets of a partitioned region.
pub const DEFAULT_TOTAL_NUM_BUCKETS: u32 = 113;

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("configuration error: {message}")]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the validation message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ConfigError> for GeodeError {
    fn from(err: ConfigError) -> Self {
        GeodeError::Configuration(err.message)
    }
}

/// Cache-wide settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    on_client_disconnect_clear_pdx_type_ids: bool,
    bucket_wait_timeout: Duration,
    metadata_refresh_timeout: Duration,
    refresh_queue_capacity: usize,
}

impl CacheConfig {
    /// Creates a new cache configuration builder.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::new()
    }

    /// Returns whether PDX types are forgotten when all servers are lost.
    pub fn on_client_disconnect_clear_pdx_type_ids(&self) -> bool {
        self.on_client_disconnect_clear_pdx_type_ids
    }

    /// Returns how long a routing lookup waits for a bucket's metadata.
    pub fn bucket_wait_timeout(&self) -> Duration {
        self.bucket_wait_timeout
    }

    /// Returns the timeout applied to each metadata refresh.
    pub fn metadata_refresh_timeout(&self) -> Duration {
        self.metadata_refresh_timeout
    }

    /// Returns the capacity of the metadata refresh queue.
    pub fn refresh_queue_capacity(&self) -> usize {
        self.refresh_queue_capacity
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            on_client_disconnect_clear_pdx_type_ids: false,
            bucket_wait_timeout: DEFAULT_BUCKET_WAIT_TIMEOUT,
            metadata_refresh_timeout: DEFAULT_METADATA_REFRESH_TIMEOUT,
            refresh_queue_capacity: DEFAULT_REFRESH_QUEUE_CAPACITY,
        }
    }
}

/// Builder for `CacheConfig`.
#[derive(Debug, Clone, Default)]
pub struct CacheConfigBuilder {
    on_client_disconnect_clear_pdx_type_ids: Option<bool>,
    bucket_wait_timeout: Option<Duration>,
    metadata_refresh_timeout: Option<Duration>,
    refresh_queue_capacity: Option<usize>,
}

impl CacheConfigBuilder {
    /// Creates a new cache configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether PDX types are cleared when the client loses every server.
    pub fn on_client_disconnect_clear_pdx_type_ids(mut self, clear: bool) -> Self {
        self.on_client_disconnect_clear_pdx_type_ids = Some(clear);
        self
    }

    /// Sets how long a routing lookup waits for a bucket's metadata.
    pub fn bucket_wait_timeout(mut self, timeout: Duration) -> Self {
        self.bucket_wait_timeout = Some(timeout);
        self
    }

    /// Sets the timeout applied to each metadata refresh.
    pub fn metadata_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_refresh_timeout = Some(timeout);
        self
    }

    /// Sets the capacity of the metadata refresh queue.
    pub fn refresh_queue_capacity(mut self, capacity: usize) -> Self {
        self.refresh_queue_capacity = Some(capacity);
        self
    }

    /// Builds the cache configuration.
    pub fn build(self) -> Result<CacheConfig, ConfigError> {
        let metadata_refresh_timeout = self
            .metadata_refresh_timeout
            .unwrap_or(DEFAULT_METADATA_REFRESH_TIMEOUT);
        if metadata_refresh_timeout.is_zero() {
            return Err(ConfigError::new(
                "metadata refresh timeout must be greater than zero",
            ));
        }

        let refresh_queue_capacity = self
            .refresh_queue_capacity
            .unwrap_or(DEFAULT_REFRESH_QUEUE_CAPACITY);
        if refresh_queue_capacity == 0 {
            return Err(ConfigError::new(
                "refresh queue capacity must be greater than zero",
            ));
        }

        Ok(CacheConfig {
            on_client_disconnect_clear_pdx_type_ids: self
                .on_client_disconnect_clear_pdx_type_ids
                .unwrap_or(false),
            bucket_wait_timeout: self
                .bucket_wait_timeout
                .unwrap_or(DEFAULT_BUCKET_WAIT_TIMEOUT),
            metadata_refresh_timeout,
            refresh_queue_capacity,
        })
    }
}

/// What happens to an entry chosen by the LRU policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionAction {
    /// Remove the entry from the local region only.
    #[default]
    LocalDestroy,
}

/// What happens to an entry whose time-to-live or idle timeout elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpirationAction {
    /// Keep the key but drop the value.
    #[default]
    LocalInvalidate,
    /// Remove the entry.
    LocalDestroy,
}

impl std::str::FromStr for ExpirationAction {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "local-invalidate" => Ok(Self::LocalInvalidate),
            "local-destroy" => Ok(Self::LocalDestroy),
            other => Err(ConfigError::new(format!(
                "unknown expiration action: {}",
                other
            ))),
        }
    }
}

/// Per-region settings.
#[derive(Debug, Clone)]
pub struct RegionAttributes {
    lru_entries_limit: u32,
    eviction_action: EvictionAction,
    entry_time_to_live: Option<Duration>,
    entry_idle_timeout: Option<Duration>,
    expiration_action: ExpirationAction,
    concurrency_checks_enabled: bool,
    total_num_buckets: u32,
}

impl RegionAttributes {
    /// Creates a new region attributes builder.
    pub fn builder() -> RegionAttributesBuilder {
        RegionAttributesBuilder::new()
    }

    /// Returns the entry limit of the LRU policy; 0 disables eviction.
    pub fn lru_entries_limit(&self) -> u32 {
        self.lru_entries_limit
    }

    /// Returns the action taken on evicted entries.
    pub fn eviction_action(&self) -> EvictionAction {
        self.eviction_action
    }

    /// Returns how long an entry lives after its last update.
    pub fn entry_time_to_live(&self) -> Option<Duration> {
        self.entry_time_to_live
    }

    /// Returns how long an entry lives after its last access.
    pub fn entry_idle_timeout(&self) -> Option<Duration> {
        self.entry_idle_timeout
    }

    /// Returns the action taken on expired entries.
    pub fn expiration_action(&self) -> ExpirationAction {
        self.expiration_action
    }

    /// Returns whether versioned puts are checked against the stored version.
    pub fn concurrency_checks_enabled(&self) -> bool {
        self.concurrency_checks_enabled
    }

    /// Returns the number of buckets the region's keys are spread over.
    pub fn total_num_buckets(&self) -> u32 {
        self.total_num_buckets
    }
}

impl Default for RegionAttributes {
    fn default() -> Self {
        Self {
            lru_entries_limit: 0,
            eviction_action: EvictionAction::default(),
            entry_time_to_live: None,
            entry_idle_timeout: None,
            expiration_action: ExpirationAction::default(),
            concurrency_checks_enabled: true,
            total_num_buckets: DEFAULT_TOTAL_NUM_BUCKETS,
        }
    }
}

/// Builder for `RegionAttributes`.
#[derive(Debug, Clone, Default)]
pub struct RegionAttributesBuilder {
    lru_entries_limit: Option<u32>,
    eviction_action: Option<EvictionAction>,
    entry_time_to_live: Option<Duration>,
    entry_idle_timeout: Option<Duration>,
    expiration_action: Option<ExpirationAction>,
    concurrency_checks_enabled: Option<bool>,
    total_num_buckets: Option<u32>,
}

impl RegionAttributesBuilder {
    /// Creates a new region attributes builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the LRU entry limit; 0 disables eviction.
    pub fn lru_entries_limit(mut self, limit: u32) -> Self {
        self.lru_entries_limit = Some(limit);
        self
    }

    /// Sets the action taken on evicted entries.
    pub fn eviction_action(mut self, action: EvictionAction) -> Self {
        self.eviction_action = Some(action);
        self
    }

    /// Sets the entry time-to-live.
    pub fn entry_time_to_live(mut self, ttl: Duration) -> Self {
        self.entry_time_to_live = Some(ttl);
        self
    }

    /// Sets the entry idle timeout.
    pub fn entry_idle_timeout(mut self, idle: Duration) -> Self {
        self.entry_idle_timeout = Some(idle);
        self
    }

    /// Sets the action taken on expired entries.
    pub fn expiration_action(mut self, action: ExpirationAction) -> Self {
        self.expiration_action = Some(action);
        self
    }

    /// Enables or disables version checks on versioned puts.
    pub fn concurrency_checks_enabled(mut self, enabled: bool) -> Self {
        self.concurrency_checks_enabled = Some(enabled);
        self
    }

    /// Sets the number of buckets.
    pub fn total_num_buckets(mut self, buckets: u32) -> Self {
        self.total_num_buckets = Some(buckets);
        self
    }

    /// Builds the region attributes.
    pub fn build(self) -> Result<RegionAttributes, ConfigError> {
        let total_num_buckets = self.total_num_buckets.unwrap_or(DEFAULT_TOTAL_NUM_BUCKETS);
        if total_num_buckets == 0 {
            return Err(ConfigError::new("total number of buckets must be at least 1"));
        }
        let non_zero = |d: Option<Duration>, what: &str| match d {
            Some(d) if d.is_zero() => Err(ConfigError::new(format!(
                "{} must be greater than zero when set",
                what
            ))),
            other => Ok(other),
        };

        Ok(RegionAttributes {
            lru_entries_limit: self.lru_entries_limit.unwrap_or(0),
            eviction_action: self.eviction_action.unwrap_or_default(),
            entry_time_to_live: non_zero(self.entry_time_to_live, "entry time-to-live")?,
            entry_idle_timeout: non_zero(self.entry_idle_timeout, "entry idle timeout")?,
            expiration_action: self.expiration_action.unwrap_or_default(),
            concurrency_checks_enabled: self.concurrency_checks_enabled.unwrap_or(true),
            total_num_buckets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_defaults() {
        let config = CacheConfig::builder().build().unwrap();
        assert!(!config.on_client_disconnect_clear_pdx_type_ids());
        assert_eq!(config.bucket_wait_timeout(), Duration::ZERO);
        assert_eq!(config.metadata_refresh_timeout(), Duration::from_secs(5));
        assert_eq!(config.refresh_queue_capacity(), 64);
    }

    #[test]
    fn test_cache_config_builder() {
        let config = CacheConfig::builder()
            .on_client_disconnect_clear_pdx_type_ids(true)
            .bucket_wait_timeout(Duration::from_millis(250))
            .metadata_refresh_timeout(Duration::from_secs(1))
            .refresh_queue_capacity(8)
            .build()
            .unwrap();
        assert!(config.on_client_disconnect_clear_pdx_type_ids());
        assert_eq!(config.bucket_wait_timeout(), Duration::from_millis(250));
        assert_eq!(config.metadata_refresh_timeout(), Duration::from_secs(1));
        assert_eq!(config.refresh_queue_capacity(), 8);
    }

    #[test]
    fn test_cache_config_rejects_zero_refresh_timeout() {
        assert!(CacheConfig::builder()
            .metadata_refresh_timeout(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_cache_config_rejects_zero_queue() {
        assert!(CacheConfig::builder()
            .refresh_queue_capacity(0)
            .build()
            .is_err());
    }

    #[test]
    fn test_region_attributes_defaults() {
        let attrs = RegionAttributes::builder().build().unwrap();
        assert_eq!(attrs.lru_entries_limit(), 0);
        assert_eq!(attrs.eviction_action(), EvictionAction::LocalDestroy);
        assert_eq!(attrs.entry_time_to_live(), None);
        assert_eq!(attrs.expiration_action(), ExpirationAction::LocalInvalidate);
        assert!(attrs.concurrency_checks_enabled());
        assert_eq!(attrs.total_num_buckets(), 113);
    }

    #[test]
    fn test_region_attributes_validation() {
        assert!(RegionAttributes::builder()
            .total_num_buckets(0)
            .build()
            .is_err());
        assert!(RegionAttributes::builder()
            .entry_idle_timeout(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_expiration_action_from_str() {
        assert_eq!(
            "local-destroy".parse::<ExpirationAction>().unwrap(),
            ExpirationAction::LocalDestroy
        );
        assert_eq!(
            "LOCAL_INVALIDATE".parse::<ExpirationAction>().unwrap(),
            ExpirationAction::LocalInvalidate
        );
        assert!("destroy".parse::<ExpirationAction>().is_err());
    }

    #[test]
    fn test_config_error_converts() {
        let err: GeodeError = ConfigError::new("bad").into();
        assert_eq!(err.to_string(), "configuration error: bad");
    }
}
