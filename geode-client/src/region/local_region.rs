//! Client-side entry store of one region.

use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use linked_hash_map::LinkedHashMap;

use super::RegionStats;
use crate::config::{EvictionAction, ExpirationAction, RegionAttributes};

struct RegionEntry<V> {
    value: Option<V>,
    recently_used: bool,
    updated_at: Instant,
    accessed_at: Instant,
    version: Option<u64>,
}

impl<V> RegionEntry<V> {
    fn new(value: V, version: Option<u64>, now: Instant) -> Self {
        Self {
            value: Some(value),
            recently_used: true,
            updated_at: now,
            accessed_at: now,
            version,
        }
    }
}

struct Inner<K, V> {
    // Front is the oldest entry; touched entries move to the back.
    store: LinkedHashMap<K, RegionEntry<V>>,
    stats: RegionStats,
    lru_entries_limit: usize,
    eviction_action: EvictionAction,
    entry_time_to_live: Option<Duration>,
    entry_idle_timeout: Option<Duration>,
    expiration_action: ExpirationAction,
    concurrency_checks_enabled: bool,
}

impl<K: Hash + Eq + Clone, V> Inner<K, V> {
    fn is_expired(&self, entry: &RegionEntry<V>, now: Instant) -> bool {
        if entry.value.is_none() {
            return false;
        }
        if let Some(ttl) = self.entry_time_to_live {
            if now.duration_since(entry.updated_at) >= ttl {
                return true;
            }
        }
        if let Some(idle) = self.entry_idle_timeout {
            if now.duration_since(entry.accessed_at) >= idle {
                return true;
            }
        }
        false
    }

    /// Applies the expiration action to `key` if it has expired. Returns true
    /// if the entry was expired.
    fn expire_if_due(&mut self, key: &K, now: Instant) -> bool {
        let expired = match self.store.get(key) {
            Some(entry) => self.is_expired(entry, now),
            None => false,
        };
        if !expired {
            return false;
        }
        self.stats.expirations += 1;
        match self.expiration_action {
            ExpirationAction::LocalInvalidate => {
                if let Some(entry) = self.store.get_mut(key) {
                    entry.value = None;
                }
            }
            ExpirationAction::LocalDestroy => {
                self.store.remove(key);
            }
        }
        true
    }

    /// Evicts one entry using the recently-used bit.
    ///
    /// The oldest entry whose bit is clear goes first. When every bit is set,
    /// all bits are cleared and the oldest entry goes.
    fn evict_one(&mut self) -> bool {
        let victim = self
            .store
            .iter()
            .find(|(_, entry)| !entry.recently_used)
            .map(|(key, _)| key.clone());

        let victim = victim.or_else(|| {
            for (_, entry) in self.store.iter_mut() {
                entry.recently_used = false;
            }
            self.store.front().map(|(key, _)| key.clone())
        });
        let evicted = match (victim, self.eviction_action) {
            (Some(key), EvictionAction::LocalDestroy) => self.store.remove(&key).is_some(),
            (None, _) => false,
        };
        if evicted {
            self.stats.evictions += 1;
        }
        evicted
    }

    /// Evicts until there is room for `incoming` more entries.
    fn make_room(&mut self, incoming: usize) -> usize {
        if self.lru_entries_limit == 0 {
            return 0;
        }
        let mut evicted = 0;
        while self.store.len() + incoming > self.lru_entries_limit && self.evict_one() {
            evicted += 1;
        }
        evicted
    }
}

/// Entry store of one region with LRU eviction and lazy expiration.
///
/// All operations take `&self`; the check-then-evict step of a put runs under
/// the same lock as the insert, so concurrent puts never push the entry count
/// past the limit.
pub struct LocalRegion<K, V> {
    name: String,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> LocalRegion<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates an empty region.
    pub fn new(name: impl Into<String>, attributes: &RegionAttributes) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                store: LinkedHashMap::new(),
                stats: RegionStats::default(),
                lru_entries_limit: attributes.lru_entries_limit() as usize,
                eviction_action: attributes.eviction_action(),
                entry_time_to_live: attributes.entry_time_to_live(),
                entry_idle_timeout: attributes.entry_idle_timeout(),
                expiration_action: attributes.expiration_action(),
                concurrency_checks_enabled: attributes.concurrency_checks_enabled(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the region name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts or replaces the value of `key`.
    pub fn put(&self, key: K, value: V) {
        let mut inner = self.lock();
        self.store_value(&mut inner, key, value, None);
    }

    /// Inserts or replaces the value of `key` carrying a version stamp.
    ///
    /// With concurrency checks enabled, a version not newer than the stored
    /// one is rejected and false is returned.
    pub fn put_versioned(&self, key: K, value: V, version: u64) -> bool {
        let mut inner = self.lock();
        if inner.concurrency_checks_enabled {
            let current = inner.store.get(&key).and_then(|entry| entry.version);
            if let Some(current) = current {
                if version <= current {
                    tracing::debug!(
                        region = %self.name,
                        version,
                        current,
                        "rejected stale versioned put"
                    );
                    return false;
                }
            }
        }
        self.store_value(&mut inner, key, value, Some(version));
        true
    }

    fn store_value(&self, inner: &mut Inner<K, V>, key: K, value: V, version: Option<u64>) {
        let now = Instant::now();
        inner.stats.puts += 1;
        if let Some(entry) = inner.store.get_refresh(&key) {
            entry.value = Some(value);
            entry.recently_used = true;
            entry.updated_at = now;
            entry.accessed_at = now;
            if version.is_some() {
                entry.version = version;
            }
            return;
        }

        let evicted = inner.make_room(1);
        if evicted > 0 {
            tracing::debug!(
                region = %self.name,
                evicted,
                limit = inner.lru_entries_limit,
                action = ?inner.eviction_action,
                "evicted entries to admit new key"
            );
        }
        inner.store.insert(key, RegionEntry::new(value, version, now));
    }

    /// Returns the value of `key`, marking the entry recently used.
    ///
    /// Invalidated and expired entries count as misses.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();
        let now = Instant::now();
        inner.expire_if_due(key, now);

        let found = match inner.store.get_refresh(key) {
            Some(entry) => {
                entry.recently_used = true;
                entry.accessed_at = now;
                entry.value.clone()
            }
            None => None,
        };
        match found {
            Some(_) => inner.stats.hits += 1,
            None => inner.stats.misses += 1,
        }
        found
    }

    /// Returns true if `key` has an entry, invalidated or not.
    pub fn contains_key(&self, key: &K) -> bool {
        let mut inner = self.lock();
        inner.expire_if_due(key, Instant::now());
        inner.store.contains_key(key)
    }

    /// Returns true if `key` has an entry with a value.
    pub fn contains_value_for_key(&self, key: &K) -> bool {
        let mut inner = self.lock();
        inner.expire_if_due(key, Instant::now());
        inner
            .store
            .get(key)
            .map_or(false, |entry| entry.value.is_some())
    }

    /// Removes the entry of `key`, returning its value.
    pub fn destroy(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();
        let entry = inner.store.remove(key)?;
        inner.stats.destroys += 1;
        entry.value
    }

    /// Drops the value of `key` but keeps the entry. Returns false if there
    /// was no entry.
    pub fn invalidate(&self, key: &K) -> bool {
        let mut inner = self.lock();
        match inner.store.get_mut(key) {
            Some(entry) => {
                entry.value = None;
                true
            }
            None => false,
        }
    }

    /// Returns the stored version of `key`.
    pub fn version(&self, key: &K) -> Option<u64> {
        self.lock().store.get(key).and_then(|entry| entry.version)
    }

    /// Returns the number of entries, invalidated ones included.
    pub fn len(&self) -> usize {
        self.lock().store.len()
    }

    /// Returns true if the region holds no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().store.is_empty()
    }

    /// Returns all keys, least recently touched first.
    pub fn keys(&self) -> Vec<K> {
        self.lock().store.keys().cloned().collect()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let removed = inner.store.len();
        inner.store.clear();
        tracing::debug!(region = %self.name, removed, "cleared region");
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> RegionStats {
        self.lock().stats.clone()
    }

    /// Returns the LRU entry limit; 0 means unlimited.
    pub fn lru_entries_limit(&self) -> usize {
        self.lock().lru_entries_limit
    }

    /// Returns what the LRU policy does to the entries it picks.
    pub fn eviction_action(&self) -> EvictionAction {
        self.lock().eviction_action
    }

    /// Changes the LRU entry limit, evicting down to a lowered limit.
    pub fn set_lru_entries_limit(&self, limit: usize) {
        let mut inner = self.lock();
        inner.lru_entries_limit = limit;
        let evicted = inner.make_room(0);
        if evicted > 0 {
            tracing::debug!(region = %self.name, evicted, limit, "evicted entries after limit change");
        }
    }

    /// Sets how long entries live after their last update.
    pub fn set_entry_time_to_live(&self, ttl: Option<Duration>) {
        self.lock().entry_time_to_live = ttl;
    }

    /// Sets how long entries live after their last access.
    pub fn set_entry_idle_timeout(&self, idle: Option<Duration>) {
        self.lock().entry_idle_timeout = idle;
    }

    /// Applies expiration to every entry now, returning how many expired.
    pub fn expire_entries(&self) -> usize {
        let mut inner = self.lock();
        let now = Instant::now();
        let keys: Vec<K> = inner.store.keys().cloned().collect();
        keys.iter()
            .filter(|key| inner.expire_if_due(key, now))
            .count()
    }
}

impl<K: Hash + Eq, V> std::fmt::Debug for LocalRegion<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f.debug_struct("LocalRegion")
            .field("name", &self.name)
            .field("entries", &inner.store.len())
            .field("lru_entries_limit", &inner.lru_entries_limit)
            .field("stats", &inner.stats)
            .finish()
    }
}
