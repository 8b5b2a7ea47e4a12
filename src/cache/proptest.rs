//! Property-Based Tests for the Weak Cache
//!
//! # Test Properties
//!
//! 1. **Determinism**: the same identity always yields the same key
//! 2. **Injectivity**: distinct primary keys never share a key
//! 3. **Codec Inverse**: decode(encode(raw)) = raw
//! 4. **Liveness**: exactly the keys of held values are enumerated

#![cfg(test)]

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use super::key::{KeyCodec, KeyValue};
use super::store::WeakStore;

// =============================================================================
// Property Strategies
// =============================================================================

/// Strategy for scalar key values that are valid in a composite key.
fn key_value_strategy() -> impl Strategy<Value = KeyValue> {
    prop_oneof![
        any::<i64>().prop_map(KeyValue::Int),
        "[a-z0-9_-]{0,12}".prop_map(KeyValue::Text),
    ]
}

/// Strategy for primary keys of 1-3 values.
fn primary_key_strategy() -> impl Strategy<Value = Vec<KeyValue>> {
    prop::collection::vec(key_value_strategy(), 1..=3)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: identity keys are a pure function of their inputs.
    #[test]
    fn prop_identity_key_deterministic(pk in primary_key_strategy()) {
        let a = KeyCodec::identity_key("Invoices", "co_invoices", "", &pk)?;
        let b = KeyCodec::identity_key("Invoices", "co_invoices", "", &pk.clone())?;
        prop_assert_eq!(a, b);
    }

    /// Property: distinct integer primary keys of equal arity map to distinct keys.
    #[test]
    fn prop_identity_key_injective(
        a in prop::collection::vec(any::<i64>(), 1..=3),
        b in prop::collection::vec(any::<i64>(), 1..=3),
    ) {
        prop_assume!(a.len() == b.len() && a != b);
        let pk_a: Vec<KeyValue> = a.into_iter().map(KeyValue::Int).collect();
        let pk_b: Vec<KeyValue> = b.into_iter().map(KeyValue::Int).collect();

        let key_a = KeyCodec::identity_key("Customers", "co_customers", "", &pk_a)?;
        let key_b = KeyCodec::identity_key("Customers", "co_customers", "", &pk_b)?;
        prop_assert_ne!(key_a, key_b);
    }

    /// Property: stripping the prefix recovers the raw key.
    #[test]
    fn prop_codec_inverse(prefix in "[a-z-]{1,16}", raw in ".{0,32}") {
        let codec = KeyCodec::new(prefix);
        let encoded = codec.encode(&raw);
        prop_assert_eq!(codec.decode(&encoded), Some(raw.as_str()));
    }

    /// Property: enumeration lists exactly the keys whose values are still held.
    #[test]
    fn prop_live_keys_match_held_values(held in prop::collection::vec(any::<bool>(), 1..40)) {
        let store = WeakStore::new();
        let mut kept = Vec::new();
        let mut expected = HashSet::new();

        for (i, keep) in held.iter().enumerate() {
            let value = Arc::new(i);
            let key = format!("key-{}", i);
            store.set(&key, &value);
            if *keep {
                expected.insert(store.codec().encode(&key));
                kept.push(value);
            }
        }

        let live: HashSet<String> = store.get_keys(None).into_iter().collect();
        prop_assert_eq!(live, expected);
        prop_assert_eq!(store.live_len(), kept.len());
    }
}
