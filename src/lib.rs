//! Weak-Reference Identity Cache
//!
//! An in-memory identity map for ORM-style hosts. Values are registered under
//! canonical string keys but never owned by the cache: once the last consumer
//! drops its `Arc`, the entry reads as absent.
//!
//! # Architecture
//!
//! ```text
//! Consumer → FirstLevelCache → KeyCodec → WeakStore
//! ```
//!
//! - [`KeyCodec`] derives canonical keys from raw keys or row identities
//! - [`WeakStore`] holds `Weak` handles with on-demand liveness checks
//! - [`FirstLevelCache`] guarantees one shared instance per persisted row
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use weakcache::WeakStore;
//!
//! let store = WeakStore::new();
//! let value = Arc::new(42u32);
//! store.set("answer", &value);
//! assert!(Arc::ptr_eq(&store.get("answer").unwrap(), &value));
//!
//! drop(value);
//! assert!(store.get("answer").is_none());
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Key codec, weak store and first-level cache
//! - [`error`] - Error types
//! - [`logging`] - Optional `tracing` subscriber setup

pub mod cache;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use cache::{
    Entity, EntityIdentity, FirstLevelCache, FirstLevelCacheConfig, KeyCodec, KeyValue,
    WeakCacheConfig, WeakStore,
};
pub use error::{Error, Result};
pub use logging::{init_logging, LogConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
