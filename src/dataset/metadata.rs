//! Tagged representation of arbitrary per-node metadata.
//!
//! Dataset metadata blobs are schemaless JSON; their shape is not knowable
//! from the dataset alone, so values are decoded on demand into an explicit
//! tagged union rather than threaded through as raw strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, Result};

/// One decoded metadata value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// JSON null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer; JSON numbers without a fractional part decode here.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Homogeneous or mixed list.
    List(Vec<MetaValue>),
    /// Nested object with string keys.
    Map(BTreeMap<String, MetaValue>),
}

impl MetaValue {
    /// Decodes a raw JSON blob into a tagged value.
    pub fn decode(raw: &str) -> Result<MetaValue> {
        serde_json::from_str(raw)
            .map_err(|e| LayoutError::LoadError(format!("metadata blob: {e}")))
    }

    /// Looks up `key` when the value is a map.
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        match self {
            MetaValue::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Top-level keys when the value is a map.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        static EMPTY: BTreeMap<String, MetaValue> = BTreeMap::new();
        let map = match self {
            MetaValue::Map(map) => map,
            _ => &EMPTY,
        };
        map.keys().map(String::as_str)
    }
}
