//! Key Codec
//!
//! Deterministic mapping from logical identities to canonical cache keys.
//!
//! # Key Forms
//!
//! ```text
//! canonical key:  <prefix><raw key>                      ph-weakcache-key-1
//! identity key:   <kind>-<source><schema>::<pk>[/<pk>]   invoices-co_invoices::77
//! ```
//!
//! Composite primary keys are joined in declaration order with
//! [`COMPOSITE_DELIMITER`]. Text key values may not contain the delimiter,
//! otherwise `("a/b")` and `("a", "b")` would share a slot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator between the values of a composite primary key
pub const COMPOSITE_DELIMITER: char = '/';

/// Separator between the table part and the primary key part
pub const IDENTITY_SEPARATOR: &str = "::";

/// Terminates the lowercased kind in an identity key
const KIND_TERMINATOR: char = '-';

/// A single scalar primary key value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    /// Signed integer key
    Int(i64),
    /// Unsigned integer key
    UInt(u64),
    /// Textual key (must not contain the composite delimiter)
    Text(String),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::UInt(v) => write!(f, "{}", v),
            KeyValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<i32> for KeyValue {
    fn from(v: i32) -> Self {
        KeyValue::Int(v as i64)
    }
}

impl From<u64> for KeyValue {
    fn from(v: u64) -> Self {
        KeyValue::UInt(v)
    }
}

impl From<u32> for KeyValue {
    fn from(v: u32) -> Self {
        KeyValue::UInt(v as u64)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Text(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::Text(v)
    }
}

/// Logical identity of one persisted row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityIdentity {
    /// Entity kind tag (lowercased when encoded)
    pub kind: String,
    /// Source table
    pub source: String,
    /// Schema, empty for the default schema
    pub schema: String,
    /// Primary key values in declaration order
    pub primary_key: Vec<KeyValue>,
}

impl EntityIdentity {
    /// Create a new identity
    pub fn new(
        kind: impl Into<String>,
        source: impl Into<String>,
        schema: impl Into<String>,
        primary_key: Vec<KeyValue>,
    ) -> Self {
        Self {
            kind: kind.into(),
            source: source.into(),
            schema: schema.into(),
            primary_key,
        }
    }

    /// Build the identity key for this row
    pub fn to_key(&self) -> Result<String> {
        KeyCodec::identity_key(&self.kind, &self.source, &self.schema, &self.primary_key)
    }
}

/// Prefix codec for canonical cache keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    prefix: String,
}

impl KeyCodec {
    /// Create a codec for the given prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Get the prefix
    #[inline]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prepend the prefix to a raw key
    #[inline]
    pub fn encode(&self, raw: &str) -> String {
        encode(&self.prefix, raw)
    }

    /// Strip the prefix from a canonical key
    #[inline]
    pub fn decode<'a>(&self, key: &'a str) -> Option<&'a str> {
        decode(&self.prefix, key)
    }

    /// Build the identity key for a row
    ///
    /// Fails when the primary key is empty, the kind is empty or contains
    /// `-`, the source or schema contains [`IDENTITY_SEPARATOR`], or a text
    /// value contains [`COMPOSITE_DELIMITER`] or [`IDENTITY_SEPARATOR`].
    /// Each of these would let two distinct rows share one key.
    pub fn identity_key(
        kind: &str,
        source: &str,
        schema: &str,
        primary_key: &[KeyValue],
    ) -> Result<String> {
        if kind.is_empty() {
            return Err(Error::InvalidIdentity("entity kind is empty".to_string()));
        }
        if kind.contains(KIND_TERMINATOR) {
            return Err(Error::InvalidIdentity(format!(
                "entity kind {:?} contains reserved '{}'",
                kind, KIND_TERMINATOR
            )));
        }
        for (part, value) in [("source", source), ("schema", schema)] {
            if value.contains(IDENTITY_SEPARATOR) {
                return Err(Error::InvalidIdentity(format!(
                    "{} {:?} of {} contains reserved separator '{}'",
                    part, value, kind, IDENTITY_SEPARATOR
                )));
            }
        }
        if primary_key.is_empty() {
            return Err(Error::InvalidIdentity(format!(
                "primary key for {} is empty",
                kind
            )));
        }

        let mut key = String::with_capacity(
            kind.len() + source.len() + schema.len() + IDENTITY_SEPARATOR.len() + 16,
        );
        key.push_str(&kind.to_lowercase());
        key.push(KIND_TERMINATOR);
        key.push_str(source);
        key.push_str(schema);
        key.push_str(IDENTITY_SEPARATOR);

        for (i, value) in primary_key.iter().enumerate() {
            if let KeyValue::Text(text) = value {
                if text.contains(COMPOSITE_DELIMITER) {
                    return Err(Error::InvalidIdentity(format!(
                        "primary key value {:?} contains reserved delimiter '{}'",
                        text, COMPOSITE_DELIMITER
                    )));
                }
                if text.contains(IDENTITY_SEPARATOR) {
                    return Err(Error::InvalidIdentity(format!(
                        "primary key value {:?} contains reserved separator '{}'",
                        text, IDENTITY_SEPARATOR
                    )));
                }
            }
            if i > 0 {
                key.push(COMPOSITE_DELIMITER);
            }
            key.push_str(&value.to_string());
        }

        Ok(key)
    }
}

/// Concatenate prefix and raw key verbatim
#[inline]
pub fn encode(prefix: &str, raw: &str) -> String {
    let mut key = String::with_capacity(prefix.len() + raw.len());
    key.push_str(prefix);
    key.push_str(raw);
    key
}

/// Strip `prefix` from `key`, or `None` if the key does not carry it
#[inline]
pub fn decode<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(prefix)
}

// =============================================================================
// Tests
// =============================================================================
