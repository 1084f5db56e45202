//! Local region entry cache.

mod local_region;

pub use local_region::LocalRegion;

/// Counters of one region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionStats {
    pub(crate) hits: u64,
    pub(crate) misses: u64,
    pub(crate) evictions: u64,
    pub(crate) expirations: u64,
    pub(crate) puts: u64,
    pub(crate) destroys: u64,
}

impl RegionStats {
    /// Returns the number of gets that found a value.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Returns the number of gets that found nothing.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Returns the number of entries removed by the LRU policy.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Returns the number of entries expired by time to live or idle timeout.
    pub fn expirations(&self) -> u64 {
        self.expirations
    }

    /// Returns the number of puts, updates included.
    pub fn puts(&self) -> u64 {
        self.puts
    }

    /// Returns the number of explicit destroys.
    pub fn destroys(&self) -> u64 {
        self.destroys
    }

    /// Returns hits / (hits + misses), or `0.0` before the first get.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        let mut stats = RegionStats::default();
        assert_eq!(stats.hit_ratio(), 0.0);
        stats.hits = 3;
        stats.misses = 1;
        assert!((stats.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }
}
