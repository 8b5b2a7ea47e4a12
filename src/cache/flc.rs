//! First-Level Cache
//!
//! Identity map for persisted rows, layered over a [`WeakStore`] of
//! type-erased values. Every lookup of the same (kind, source, schema,
//! primary key) yields the same shared instance for as long as any consumer
//! holds it.
//!
//! ```text
//! consumer ─find─▶ FirstLevelCache ─identity key─▶ WeakStore
//!     ▲                                               │
//!     └──────────── hit: shared Arc ◀─────────────────┘
//!     miss: consumer loads the row and registers it via store/find_or_load
//! ```
//!
//! Relation traversal must go through the same cache instance so that a row
//! reached through a foreign key and the same row fetched directly are one
//! object.

use std::any::{type_name, Any};
use std::sync::Arc;

use tracing::{debug, trace};

use super::config::FirstLevelCacheConfig;
use super::key::{EntityIdentity, KeyCodec, KeyValue, IDENTITY_SEPARATOR};
use super::metrics::MetricsSnapshot;
use super::store::WeakStore;
use crate::error::{Error, Result};

/// Type-erased cached value
pub type AnyValue = dyn Any + Send + Sync;

/// A persisted row type that can live in the first-level cache
pub trait Entity: Any + Send + Sync {
    /// Entity kind tag, lowercased in the identity key
    const KIND: &'static str;
    /// Source table
    const SOURCE: &'static str;
    /// Schema, empty for the default schema
    const SCHEMA: &'static str = "";

    /// Primary key values in declaration order
    fn primary_key(&self) -> Vec<KeyValue>;

    /// Identity of a row of this kind
    fn identity_of(primary_key: &[KeyValue]) -> EntityIdentity
    where
        Self: Sized,
    {
        EntityIdentity::new(Self::KIND, Self::SOURCE, Self::SCHEMA, primary_key.to_vec())
    }
}

/// Identity map keyed by entity identity
#[derive(Debug)]
pub struct FirstLevelCache {
    store: WeakStore<AnyValue>,
}

impl FirstLevelCache {
    /// Create a new cache with default configuration
    pub fn new() -> Self {
        Self {
            store: WeakStore::with_config(FirstLevelCacheConfig::default().store_config()),
        }
    }

    /// Create a new cache after validating the configuration
    pub fn with_config(config: FirstLevelCacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: WeakStore::with_config(config.store_config()),
        })
    }

    /// Get the underlying store
    pub fn store_handle(&self) -> &WeakStore<AnyValue> {
        &self.store
    }

    /// Look up a row by its raw identity parts
    pub fn find(
        &self,
        kind: &str,
        source: &str,
        schema: &str,
        primary_key: &[KeyValue],
    ) -> Result<Option<Arc<AnyValue>>> {
        let key = KeyCodec::identity_key(kind, source, schema, primary_key)?;
        Ok(self.store.get(&key))
    }

    /// Register a row under its raw identity parts
    pub fn store<V>(
        &self,
        kind: &str,
        source: &str,
        schema: &str,
        primary_key: &[KeyValue],
        value: &Arc<V>,
    ) -> Result<()>
    where
        V: Any + Send + Sync,
    {
        let key = KeyCodec::identity_key(kind, source, schema, primary_key)?;
        let erased: Arc<AnyValue> = value.clone();
        self.store.set(&key, &erased);
        Ok(())
    }

    /// Look up a typed entity by primary key
    pub fn find_entity<T: Entity>(&self, primary_key: &[KeyValue]) -> Result<Option<Arc<T>>> {
        let key = entity_key::<T>(primary_key)?;
        self.store
            .get(&key)
            .map(|value| downcast::<T>(value, &key))
            .transpose()
    }

    /// Register a typed entity under the identity derived from its primary key
    pub fn store_entity<T: Entity>(&self, value: &Arc<T>) -> Result<()> {
        let key = entity_key::<T>(&value.primary_key())?;
        let erased: Arc<AnyValue> = value.clone();
        self.store.set(&key, &erased);
        Ok(())
    }

    /// Return the cached instance, or load, register and return it on a miss
    ///
    /// `load` runs without any lock held and may itself resolve relations
    /// through this cache. `Ok(None)` from the loader means the row does not
    /// exist. When two loaders race, both callers receive the same instance.
    pub fn find_or_load<T, E, F>(
        &self,
        primary_key: &[KeyValue],
        load: F,
    ) -> std::result::Result<Option<Arc<T>>, E>
    where
        T: Entity,
        E: From<Error>,
        F: FnOnce() -> std::result::Result<Option<T>, E>,
    {
        if let Some(found) = self.find_entity::<T>(primary_key)? {
            return Ok(Some(found));
        }

        let key = entity_key::<T>(primary_key)?;
        let row = match load()? {
            Some(row) => row,
            None => return Ok(None),
        };
        trace!(key = %key, "first-level cache loaded row");

        let loaded: Arc<AnyValue> = Arc::new(row);
        let canonical = self.store.insert_if_vacant(&key, loaded);
        Ok(Some(downcast::<T>(canonical, &key)?))
    }

    /// Drop one identity from the cache
    pub fn evict(&self, identity: &EntityIdentity) -> Result<bool> {
        let key = identity.to_key()?;
        let existed = self.store.delete(&key);
        debug!(key = %key, existed, "first-level cache evict");
        Ok(existed)
    }

    /// Drop one typed entity from the cache
    pub fn evict_entity<T: Entity>(&self, primary_key: &[KeyValue]) -> Result<bool> {
        self.evict(&T::identity_of(primary_key))
    }

    /// Drop every identity
    pub fn clear(&self) -> bool {
        self.store.clear()
    }

    /// Canonical keys of all live identities, sorted
    pub fn keys(&self) -> Vec<String> {
        self.store.get_keys(None)
    }

    /// Canonical keys of the live identities of one entity type, sorted
    pub fn keys_for<T: Entity>(&self) -> Vec<String> {
        let stem = self.store.codec().encode(&format!(
            "{}-{}{}{}",
            T::KIND.to_lowercase(),
            T::SOURCE,
            T::SCHEMA,
            IDENTITY_SEPARATOR
        ));
        self.store
            .get_keys(Some(&stem))
            .into_iter()
            .filter(|key| key.starts_with(&stem))
            .collect()
    }

    /// Physically remove dead handles
    pub fn sweep(&self) -> usize {
        self.store.sweep()
    }

    /// Get snapshot of usage counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.store.metrics()
    }
}

impl Default for FirstLevelCache {
    fn default() -> Self {
        Self::new()
    }
}

fn entity_key<T: Entity>(primary_key: &[KeyValue]) -> Result<String> {
    KeyCodec::identity_key(T::KIND, T::SOURCE, T::SCHEMA, primary_key)
}

fn downcast<T: Entity>(value: Arc<AnyValue>, key: &str) -> Result<Arc<T>> {
    value.downcast::<T>().map_err(|_| Error::KindMismatch {
        key: key.to_string(),
        expected: type_name::<T>(),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::cell::Cell;

    #[derive(Debug, PartialEq)]
    struct Customer {
        id: i64,
        name: String,
    }

    impl Entity for Customer {
        const KIND: &'static str = "Customers";
        const SOURCE: &'static str = "co_customers";

        fn primary_key(&self) -> Vec<KeyValue> {
            vec![self.id.into()]
        }
    }

    /// Shares the identity space of `Customer`
    #[derive(Debug)]
    struct CustomerView {
        id: i64,
    }

    impl Entity for CustomerView {
        const KIND: &'static str = "Customers";
        const SOURCE: &'static str = "co_customers";

        fn primary_key(&self) -> Vec<KeyValue> {
            vec![self.id.into()]
        }
    }

    #[derive(Debug)]
    struct LineItem {
        invoice: i64,
        line: i64,
    }

    impl Entity for LineItem {
        const KIND: &'static str = "LineItems";
        const SOURCE: &'static str = "co_line_items";
        const SCHEMA: &'static str = "billing";

        fn primary_key(&self) -> Vec<KeyValue> {
            vec![self.invoice.into(), self.line.into()]
        }
    }

    #[derive(Debug)]
    enum DbError {
        Cache(Error),
        Unavailable,
    }

    impl From<Error> for DbError {
        fn from(e: Error) -> Self {
            DbError::Cache(e)
        }
    }

    fn customer(id: i64) -> Customer {
        Customer {
            id,
            name: format!("customer-{}", id),
        }
    }

    #[test]
    fn test_store_and_find_entity() {
        let flc = FirstLevelCache::new();
        let c = Arc::new(customer(1));

        flc.store_entity(&c).unwrap();

        let found = flc.find_entity::<Customer>(&[1.into()]).unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &c));
        assert!(flc.find_entity::<Customer>(&[2.into()]).unwrap().is_none());
        assert_eq!(flc.keys(), vec!["ph-flc-customers-co_customers::1"]);
    }

    #[test]
    fn test_untyped_find_and_store() {
        let flc = FirstLevelCache::new();
        let c = Arc::new(customer(4));

        flc.store("Customers", "co_customers", "", &[4.into()], &c).unwrap();

        let found = flc
            .find("Customers", "co_customers", "", &[4.into()])
            .unwrap()
            .unwrap();
        let found = found.downcast::<Customer>().ok().unwrap();
        assert!(Arc::ptr_eq(&found, &c));

        // The typed API resolves to the same slot
        let typed = flc.find_entity::<Customer>(&[4.into()]).unwrap().unwrap();
        assert!(Arc::ptr_eq(&typed, &c));
    }

    #[test]
    fn test_entries_expire_with_last_reference() {
        let flc = FirstLevelCache::new();
        let c = Arc::new(customer(1));
        flc.store_entity(&c).unwrap();

        drop(c);

        assert!(flc.find_entity::<Customer>(&[1.into()]).unwrap().is_none());
        assert!(flc.keys().is_empty());
    }

    #[test]
    fn test_find_or_load_loads_once() {
        let flc = FirstLevelCache::new();
        let loads = Cell::new(0);
        let load = || -> std::result::Result<Option<Customer>, DbError> {
            loads.set(loads.get() + 1);
            Ok(Some(customer(3)))
        };

        let first = flc.find_or_load(&[3.into()], load).unwrap().unwrap();
        let second = flc.find_or_load(&[3.into()], load).unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.get(), 1);
        assert_eq!(second.name, "customer-3");
    }

    #[test]
    fn test_find_or_load_missing_row() {
        let flc = FirstLevelCache::new();
        let result = flc
            .find_or_load::<Customer, DbError, _>(&[9.into()], || Ok(None))
            .unwrap();
        assert!(result.is_none());
        assert!(flc.keys().is_empty());
    }

    #[test]
    fn test_find_or_load_propagates_loader_error() {
        let flc = FirstLevelCache::new();
        let result =
            flc.find_or_load::<Customer, DbError, _>(&[9.into()], || Err(DbError::Unavailable));
        assert_matches!(result, Err(DbError::Unavailable));
    }

    #[test]
    fn test_find_or_load_rejects_empty_key() {
        let flc = FirstLevelCache::new();
        let result = flc.find_or_load::<Customer, DbError, _>(&[], || Ok(Some(customer(1))));
        assert_matches!(result, Err(DbError::Cache(Error::InvalidIdentity(_))));
    }

    #[test]
    fn test_kind_mismatch() {
        let flc = FirstLevelCache::new();
        let c = Arc::new(customer(1));
        flc.store_entity(&c).unwrap();

        let result = flc.find_entity::<CustomerView>(&[1.into()]);
        assert_matches!(result, Err(Error::KindMismatch { .. }));
    }

    #[test]
    fn test_composite_key_with_schema() {
        let flc = FirstLevelCache::new();
        let item = Arc::new(LineItem {
            invoice: 77,
            line: 2,
        });
        flc.store_entity(&item).unwrap();

        assert_eq!(
            flc.keys(),
            vec!["ph-flc-lineitems-co_line_itemsbilling::77/2"]
        );
        let found = flc
            .find_entity::<LineItem>(&[77.into(), 2.into()])
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&found, &item));
        assert!(flc
            .find_entity::<LineItem>(&[2.into(), 77.into()])
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_keys_for_and_evict() {
        let flc = FirstLevelCache::new();
        let customers: Vec<_> = (1..=3).map(|i| Arc::new(customer(i))).collect();
        for c in &customers {
            flc.store_entity(c).unwrap();
        }
        let item = Arc::new(LineItem { invoice: 1, line: 1 });
        flc.store_entity(&item).unwrap();

        assert_eq!(flc.keys_for::<Customer>().len(), 3);
        assert_eq!(flc.keys_for::<LineItem>().len(), 1);

        assert!(flc.evict_entity::<Customer>(&[2.into()]).unwrap());
        assert!(!flc.evict_entity::<Customer>(&[2.into()]).unwrap());
        assert_eq!(
            flc.keys_for::<Customer>(),
            vec![
                "ph-flc-customers-co_customers::1",
                "ph-flc-customers-co_customers::3"
            ]
        );

        assert!(flc.clear());
        assert!(flc.keys().is_empty());
    }

    #[test]
    fn test_with_config() {
        let flc = FirstLevelCache::with_config(FirstLevelCacheConfig {
            prefix: "orm-".to_string(),
            sweep_threshold: 0,
        })
        .unwrap();
        let c = Arc::new(customer(1));
        flc.store_entity(&c).unwrap();
        assert_eq!(flc.keys(), vec!["orm-customers-co_customers::1"]);

        let invalid = FirstLevelCache::with_config(FirstLevelCacheConfig {
            prefix: String::new(),
            sweep_threshold: 0,
        });
        assert_matches!(invalid, Err(Error::Config(_)));
    }

    #[test]
    fn test_sweep_and_metrics() {
        let flc = FirstLevelCache::new();
        flc.store_entity(&Arc::new(customer(1))).unwrap();
        flc.store_entity(&Arc::new(customer(2))).unwrap();

        assert_eq!(flc.sweep(), 2);
        assert_eq!(flc.metrics().reclaimed, 2);
        assert!(flc.store_handle().is_empty());
    }
}
