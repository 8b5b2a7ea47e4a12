//! Weak Identity Store
//!
//! String-keyed cache holding `Weak` handles to values owned elsewhere.
//!
//! # Ownership
//!
//! The store never holds an `Arc`. A value lives exactly as long as its
//! consumers keep it alive; once the last `Arc` is dropped every key pointing
//! at it reads as a miss, even though the entry may still sit in the map.
//!
//! # Liveness
//!
//! Liveness is checked on demand at call time:
//!
//! - `get` upgrades the handle; a dead handle is removed lazily
//! - `has` inspects the strong count without upgrading
//! - `get_keys` skips dead handles
//! - `sweep` physically drops dead handles, and runs automatically once the
//!   writes since the last sweep reach `max(sweep_threshold, len after it)`,
//!   so a full scan is paid for by at least as many writes as it visits
//!
//! No user value is ever dropped while a shard lock is held.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde::Serialize;
use tracing::{debug, instrument, trace};

use super::config::WeakCacheConfig;
use super::key::KeyCodec;
use super::metrics::{CacheMetrics, MetricsSnapshot};
use super::shard::ShardedMap;
use super::SHARD_COUNT;
use crate::error::Result;

/// Weak-reference-backed identity store
pub struct WeakStore<T: ?Sized> {
    /// Canonical key -> weak handle
    map: ShardedMap<Weak<T>, SHARD_COUNT>,
    /// Prefix codec
    codec: KeyCodec,
    /// Configuration
    config: WeakCacheConfig,
    /// Metrics collector
    metrics: CacheMetrics,
    /// Writes since the last sweep
    pending_writes: AtomicU64,
    /// Physical entries left by the last sweep
    swept_len: AtomicU64,
}

/// Store statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Physical entries, dead handles included
    pub entries: usize,
    /// Entries whose value is still alive
    pub live_entries: usize,
    /// Shard-level read count
    pub total_reads: u64,
    /// Shard-level write count
    pub total_writes: u64,
    /// Usage counters
    pub metrics: MetricsSnapshot,
}

impl<T: ?Sized> WeakStore<T> {
    /// Create a new store with default configuration
    pub fn new() -> Self {
        Self::with_config(WeakCacheConfig::default())
    }

    /// Create a new store with custom configuration
    pub fn with_config(config: WeakCacheConfig) -> Self {
        Self {
            map: ShardedMap::new(),
            codec: KeyCodec::new(config.prefix.clone()),
            config,
            metrics: CacheMetrics::new(),
            pending_writes: AtomicU64::new(0),
            swept_len: AtomicU64::new(0),
        }
    }

    /// Create a new store after validating the configuration
    pub fn try_with_config(config: WeakCacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    /// Get the key prefix
    pub fn prefix(&self) -> &str {
        self.codec.prefix()
    }

    /// Get the key codec
    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Get the configuration
    pub fn config(&self) -> &WeakCacheConfig {
        &self.config
    }

    /// Register `value` under `key`, replacing any prior entry
    pub fn set(&self, key: &str, value: &Arc<T>) {
        let canonical = self.codec.encode(key);
        trace!(key = %canonical, "weak cache set");
        self.map.insert(canonical, Arc::downgrade(value));
        self.after_write();
    }

    /// Get the live value under `key`
    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        let canonical = self.codec.encode(key);
        match self.map.read_with(&canonical, Weak::upgrade) {
            Some(Some(value)) => {
                self.metrics.record_hit();
                Some(value)
            }
            Some(None) => {
                // Re-checked under the write lock: a concurrent set may have
                // replaced the dead handle with a live one.
                if self.map.remove_if(&canonical, |w| w.strong_count() == 0) {
                    trace!(key = %canonical, "reclaimed dead handle");
                    self.metrics.record_reclaimed(1);
                }
                self.metrics.record_miss();
                None
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Check whether a live value exists under `key`
    pub fn has(&self, key: &str) -> bool {
        let canonical = self.codec.encode(key);
        self.map
            .read_with(&canonical, |w| w.strong_count() > 0)
            .unwrap_or(false)
    }

    /// Remove the entry under `key`, returning whether one existed (dead or alive)
    pub fn delete(&self, key: &str) -> bool {
        let canonical = self.codec.encode(key);
        let existed = self.map.remove(&canonical).is_some();
        if existed {
            self.metrics.record_delete();
            debug!(key = %canonical, "weak cache delete");
        }
        existed
    }

    /// Remove every entry
    pub fn clear(&self) -> bool {
        let removed = self.map.clear_all();
        self.metrics.record_clear();
        debug!(removed, prefix = %self.prefix(), "weak cache cleared");
        true
    }

    /// Enumerate canonical keys with live values, sorted
    ///
    /// With a filter, only keys containing it as a substring are returned.
    pub fn get_keys(&self, filter: Option<&str>) -> Vec<String> {
        let mut keys = self.map.collect_all(|key, handle| {
            let wanted = filter.map_or(true, |f| key.contains(f));
            (wanted && handle.strong_count() > 0).then(|| key.to_string())
        });
        keys.sort_unstable();
        keys
    }

    /// Register `value` unless a live value already occupies `key`
    ///
    /// Returns whichever instance is canonical afterwards.
    pub fn insert_if_vacant(&self, key: &str, value: Arc<T>) -> Arc<T> {
        let canonical = self.codec.encode(key);
        let existing = self.map.write_with(&canonical, |map| {
            if let Some(live) = map.get(&canonical).and_then(Weak::upgrade) {
                return Some(live);
            }
            map.insert(canonical.clone(), Arc::downgrade(&value));
            None
        });

        match existing {
            Some(live) => {
                self.metrics.record_hit();
                live
            }
            None => {
                trace!(key = %canonical, "weak cache insert");
                self.after_write();
                value
            }
        }
    }

    /// Get the live value under `key`, building and registering one on a miss
    ///
    /// `f` runs without any lock held, so it may use the store itself.
    pub fn get_or_insert_with<F>(&self, key: &str, f: F) -> Arc<T>
    where
        F: FnOnce() -> Arc<T>,
    {
        if let Some(value) = self.get(key) {
            return value;
        }
        self.insert_if_vacant(key, f())
    }

    /// Look up several keys, in input order
    pub fn get_multiple<I, K>(&self, keys: I) -> Vec<Option<Arc<T>>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter().map(|k| self.get(k.as_ref())).collect()
    }

    /// Register several values
    pub fn set_multiple<'a, I, K>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, &'a Arc<T>)>,
        K: AsRef<str>,
        T: 'a,
    {
        for (key, value) in entries {
            self.set(key.as_ref(), value);
        }
    }

    /// Delete several keys, returning how many entries existed
    pub fn delete_multiple<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter().filter(|k| self.delete(k.as_ref())).count()
    }

    /// Physically remove dead handles, returning how many were reclaimed
    #[instrument(skip(self), fields(prefix = %self.codec.prefix()))]
    pub fn sweep(&self) -> usize {
        let reclaimed = self.map.retain(|_, handle| handle.strong_count() > 0);
        self.pending_writes.store(0, Ordering::Relaxed);
        self.swept_len.store(self.map.len() as u64, Ordering::Relaxed);
        self.metrics.record_sweep();
        if reclaimed > 0 {
            self.metrics.record_reclaimed(reclaimed as u64);
            debug!(reclaimed, "swept dead handles");
        }
        reclaimed
    }

    /// Number of physical entries, dead handles included
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if there are no physical entries
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of entries whose value is alive
    pub fn live_len(&self) -> usize {
        self.map
            .collect_all(|_, handle| (handle.strong_count() > 0).then_some(()))
            .len()
    }

    /// Get snapshot of usage counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Zero the usage counters
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Get store statistics
    pub fn stats(&self) -> StoreStats {
        let map_stats = self.map.stats();
        StoreStats {
            entries: map_stats.total_entries,
            live_entries: self.live_len(),
            total_reads: map_stats.total_reads,
            total_writes: map_stats.total_writes,
            metrics: self.metrics.snapshot(),
        }
    }

    fn after_write(&self) {
        self.metrics.record_write();
        let threshold = self.config.sweep_threshold;
        if threshold == 0 {
            return;
        }

        let pending = self.pending_writes.fetch_add(1, Ordering::Relaxed) + 1;
        let due = threshold.max(self.swept_len.load(Ordering::Relaxed));
        // Only the writer that resets the counter sweeps
        if pending >= due
            && self
                .pending_writes
                .compare_exchange(pending, 0, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        {
            self.sweep();
        }
    }
}

impl<T: ?Sized> Default for WeakStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for WeakStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakStore")
            .field("prefix", &self.codec.prefix())
            .field("entries", &self.map.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
