//! Sharded Map Implementation
//!
//! Concurrent string-keyed hashmap split into `N` shards.
//!
//! # Design
//!
//! - Each shard has its own RwLock, so single-key operations on different
//!   shards never contend
//! - Power-of-2 shard count enables fast modulo via bitwise AND
//! - Whole-map operations (`clear_all`, `collect_all`) hold every shard lock at
//!   once, always acquired in index order, so they observe and mutate a single
//!   consistent mapping

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Single shard containing a hashmap and access counters
#[repr(C, align(64))]
pub struct Shard<V> {
    /// The hashmap for this shard
    map: RwLock<HashMap<String, V>>,
    /// Number of reads
    reads: AtomicU64,
    /// Number of writes
    writes: AtomicU64,
}

impl<V> Default for Shard<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Shard<V> {
    /// Create a new empty shard
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Get the number of entries in this shard
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Check if the shard is empty
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Get read count
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Get write count
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Run `f` against the value under `key` while holding the read lock
    pub fn read_with<R>(&self, key: &str, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let guard = self.map.read();
        guard.get(key).map(f)
    }

    /// Insert a value, returning the old value if present
    pub fn insert(&self, key: String, value: V) -> Option<V> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.map.write().insert(key, value)
    }

    /// Remove a value, returning it if present
    pub fn remove(&self, key: &str) -> Option<V> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.map.write().remove(key)
    }

    /// Remove the value under `key` only if `pred` still holds under the write lock
    pub fn remove_if(&self, key: &str, pred: impl FnOnce(&V) -> bool) -> bool {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.map.write();
        match guard.get(key) {
            Some(v) if pred(v) => {
                guard.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Run `f` against the whole shard map while holding the write lock
    pub fn write_with<R>(&self, f: impl FnOnce(&mut HashMap<String, V>) -> R) -> R {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.map.write();
        f(&mut guard)
    }

    /// Keep only the entries matching `keep`, returning how many were dropped
    pub fn retain(&self, mut keep: impl FnMut(&str, &V) -> bool) -> usize {
        let mut guard = self.map.write();
        let before = guard.len();
        guard.retain(|k, v| keep(k, v));
        before - guard.len()
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, HashMap<String, V>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.map.read()
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, HashMap<String, V>> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.map.write()
    }
}

/// Sharded map with configurable shard count
pub struct ShardedMap<V, const N: usize = 16> {
    /// Shards
    shards: Box<[Shard<V>]>,
}

impl<V, const N: usize> Default for ShardedMap<V, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, const N: usize> ShardedMap<V, N> {
    /// Create a new sharded map
    pub fn new() -> Self {
        assert!(N.is_power_of_two(), "shard count must be a power of two");
        let shards: Vec<Shard<V>> = (0..N).map(|_| Shard::new()).collect();
        Self {
            shards: shards.into_boxed_slice(),
        }
    }

    /// Get the shard count
    #[inline]
    pub const fn shard_count(&self) -> usize {
        N
    }

    /// Get total number of entries across all shards
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.len()).sum()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.is_empty())
    }

    /// Get total read count
    pub fn total_reads(&self) -> u64 {
        self.shards.iter().map(|s| s.read_count()).sum()
    }

    /// Get total write count
    pub fn total_writes(&self) -> u64 {
        self.shards.iter().map(|s| s.write_count()).sum()
    }

    /// Compute shard index for a key
    #[inline]
    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) & (N - 1)
    }

    /// Get the shard owning `key`
    #[inline]
    pub fn shard_for(&self, key: &str) -> &Shard<V> {
        &self.shards[self.shard_index(key)]
    }

    /// Run `f` against the value under `key` while holding its shard's read lock
    pub fn read_with<R>(&self, key: &str, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.shard_for(key).read_with(key, f)
    }

    /// Insert a value
    pub fn insert(&self, key: String, value: V) -> Option<V> {
        self.shard_for(&key).insert(key, value)
    }

    /// Remove a value
    pub fn remove(&self, key: &str) -> Option<V> {
        self.shard_for(key).remove(key)
    }

    /// Remove a value if `pred` holds under the shard's write lock
    pub fn remove_if(&self, key: &str, pred: impl FnOnce(&V) -> bool) -> bool {
        self.shard_for(key).remove_if(key, pred)
    }

    /// Run `f` against the map of the shard owning `key` under its write lock
    pub fn write_with<R>(&self, key: &str, f: impl FnOnce(&mut HashMap<String, V>) -> R) -> R {
        self.shard_for(key).write_with(f)
    }

    /// Keep only matching entries across all shards, returning the number dropped
    ///
    /// Shards are visited one at a time; this is not atomic across shards.
    pub fn retain(&self, mut keep: impl FnMut(&str, &V) -> bool) -> usize {
        self.shards.iter().map(|s| s.retain(&mut keep)).sum()
    }

    /// Clear all shards atomically, returning the number of entries removed
    pub fn clear_all(&self) -> usize {
        let guards: Vec<_> = self.shards.iter().map(|s| s.write_guard()).collect();
        let mut removed = 0;
        for mut guard in guards {
            removed += guard.len();
            guard.clear();
        }
        removed
    }

    /// Collect `f(key, value)` over one consistent view of every shard
    pub fn collect_all<R>(&self, mut f: impl FnMut(&str, &V) -> Option<R>) -> Vec<R> {
        let guards: Vec<_> = self.shards.iter().map(|s| s.read_guard()).collect();
        let mut out = Vec::new();
        for guard in &guards {
            for (k, v) in guard.iter() {
                if let Some(r) = f(k, v) {
                    out.push(r);
                }
            }
        }
        out
    }
}

/// Statistics for a sharded map
#[derive(Debug, Clone)]
pub struct ShardedMapStats {
    /// Total entries
    pub total_entries: usize,
    /// Total reads
    pub total_reads: u64,
    /// Total writes
    pub total_writes: u64,
    /// Per-shard entry counts
    pub shard_entry_counts: Vec<usize>,
}

impl<V, const N: usize> ShardedMap<V, N> {
    /// Get detailed statistics
    pub fn stats(&self) -> ShardedMapStats {
        let shard_entry_counts: Vec<usize> = self.shards.iter().map(|s| s.len()).collect();

        ShardedMapStats {
            total_entries: shard_entry_counts.iter().sum(),
            total_reads: self.total_reads(),
            total_writes: self.total_writes(),
            shard_entry_counts,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
