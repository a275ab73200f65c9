//! Serde adapters for byte-string keys in CBOR.
//!
//! `Vec<u8>` serializes as a CBOR array of integers by default; keys must be
//! CBOR byte strings (major type 2) to compare and hash stably. These
//! modules bridge `BTreeMap<Vec<u8>, V>` to the two wire shapes node layouts
//! use: a map keyed by byte strings, and a sequence of `[key, value]` pairs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `BTreeMap<Vec<u8>, V>` as a CBOR map with byte-string keys.
pub(crate) mod byte_map {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S, V>(map: &BTreeMap<Vec<u8>, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        serializer.collect_map(map.iter().map(|(k, v)| (serde_bytes::Bytes::new(k), v)))
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<BTreeMap<Vec<u8>, V>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        let raw: BTreeMap<serde_bytes::ByteBuf, V> = BTreeMap::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|(k, v)| (k.into_vec(), v)).collect())
    }
}

/// `BTreeMap<Vec<u8>, V>` as a CBOR sequence of `[key, value]` pairs in
/// ascending key order.
pub(crate) mod byte_pairs {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S, V>(map: &BTreeMap<Vec<u8>, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        serializer.collect_seq(map.iter().map(|(k, v)| (serde_bytes::Bytes::new(k), v)))
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<BTreeMap<Vec<u8>, V>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        let raw: Vec<(serde_bytes::ByteBuf, V)> = Vec::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|(k, v)| (k.into_vec(), v)).collect())
    }
}
