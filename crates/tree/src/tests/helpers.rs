use std::collections::BTreeMap;
use std::sync::Arc;

use config::TableParams;
use lexicoder::{Lexicoder, Value};
use store::MemoryBlockStore;

use crate::{Key, NodeStore, Record};

/// A node store over a fresh in-memory block store, returning both handles
/// so tests can count blocks behind the cache's back.
pub fn store_pair() -> (Arc<MemoryBlockStore>, NodeStore) {
    let blocks = Arc::new(MemoryBlockStore::new());
    (blocks.clone(), NodeStore::new(blocks))
}

pub fn node_store() -> NodeStore {
    store_pair().1
}

/// Tiny limits so a handful of records exercises splits and merges.
pub fn small_params() -> TableParams {
    TableParams::new("id", Lexicoder::Integer)
        .with_fan_out(4)
        .with_partition_limit(3)
        .with_patch_limit(2)
}

/// Integer key encoded the way the table layer would.
pub fn ikey(i: i64) -> Key {
    Lexicoder::Integer.encode(&Value::Int(i)).unwrap()
}

pub fn rec(fields: &[(&str, Value)]) -> Record {
    fields
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// A stored record for id `i` (primary-key field already stripped).
pub fn stored(i: i64) -> Record {
    rec(&[("a", Value::Int(i * 10))])
}

/// Sorted `(key, record)` entries for ids in `ids`.
pub fn entries(ids: impl IntoIterator<Item = i64>) -> Vec<(Key, Record)> {
    ids.into_iter().map(|i| (ikey(i), stored(i))).collect()
}

pub fn entry_map(ids: impl IntoIterator<Item = i64>) -> BTreeMap<Key, Record> {
    entries(ids).into_iter().collect()
}
