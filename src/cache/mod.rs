//! Weak-Reference Identity Cache
//!
//! In-memory cache whose entries never own their values.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          FirstLevelCache                             │
//! │        (kind, source, schema, pk) ──KeyCodec──▶ identity key         │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                            WeakStore                                 │
//! │  ┌───────────────┐ ┌───────────────┐        ┌───────────────┐        │
//! │  │ Shard 0       │ │ Shard 1       │  ...   │ Shard 15      │        │
//! │  │ key → Weak<T> │ │ key → Weak<T> │        │ key → Weak<T> │        │
//! │  └───────────────┘ └───────────────┘        └───────────────┘        │
//! └──────────────────────────────────────────────────────────────────────┘
//!                 ▲ liveness decided by consumers' Arc<T> ▲
//! ```
//!
//! # Design Principles
//!
//! - The store holds `Weak` handles only; consumers own value lifetimes
//! - Liveness is observed at call time, never cached
//! - Whole-store operations lock every shard in index order

mod config;
mod flc;
mod key;
mod metrics;
#[cfg(test)]
mod proptest;
mod shard;
mod store;

pub use config::{FirstLevelCacheConfig, WeakCacheConfig};
pub use flc::{AnyValue, Entity, FirstLevelCache};
pub use key::{
    decode, encode, EntityIdentity, KeyCodec, KeyValue, COMPOSITE_DELIMITER, IDENTITY_SEPARATOR,
};
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use shard::{Shard, ShardedMap, ShardedMapStats};
pub use store::{StoreStats, WeakStore};

/// Number of shards per store
pub const SHARD_COUNT: usize = 16;

/// Default prefix for [`WeakStore`] keys
pub const DEFAULT_PREFIX: &str = "ph-weakcache-";

/// Default prefix for [`FirstLevelCache`] keys
pub const DEFAULT_FLC_PREFIX: &str = "ph-flc-";

/// Default minimum number of writes between automatic sweeps
pub const DEFAULT_SWEEP_THRESHOLD: u64 = 1024;

// =============================================================================
// Tests
// =============================================================================
