use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use config::TableParams;
use lexicoder::{Lexicoder, Value};
use store::MemoryBlockStore;
use tree::{NodeStore, Record};

use crate::Table;

/// A node store over a fresh in-memory block store, returning both handles
/// so tests can count written blocks.
pub fn store_pair() -> (Arc<MemoryBlockStore>, NodeStore) {
    let blocks = Arc::new(MemoryBlockStore::new());
    (blocks.clone(), NodeStore::new(blocks))
}

/// Small limits: fan-out 4, partition-limit 3, patch-limit 2.
pub fn small_params() -> TableParams {
    TableParams::new("id", Lexicoder::Integer)
        .with_fan_out(4)
        .with_partition_limit(3)
        .with_patch_limit(2)
}

pub fn small_table() -> Table {
    Table::create(store_pair().1, small_params()).unwrap()
}

pub fn int(i: i64) -> Value {
    Value::Int(i)
}

pub fn rec(fields: &[(&str, Value)]) -> Record {
    fields
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// A row `{id: i, a: i * 10}`.
pub fn row(i: i64) -> Record {
    rec(&[("id", int(i)), ("a", int(i * 10))])
}

pub fn rows(ids: impl IntoIterator<Item = i64>) -> Vec<Record> {
    ids.into_iter().map(row).collect()
}

/// The `id` fields of scanned records, in order.
pub fn ids(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .map(|r| r.get("id").and_then(Value::as_int).expect("id field"))
        .collect()
}

pub fn families(pairs: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
    pairs
        .iter()
        .map(|(name, fields)| {
            (
                name.to_string(),
                fields.iter().map(|f| f.to_string()).collect(),
            )
        })
        .collect()
}

/// Partition nodes reachable from the table's data link, in key order.
pub fn partitions_of(table: &Table) -> Vec<tree::Partition> {
    let Some(root) = table.data_link() else {
        return Vec::new();
    };
    tree::index::find_partition_links(table.node_store(), root, None, None)
        .unwrap()
        .into_iter()
        .map(|link| {
            table
                .node_store()
                .get_node(&link.hash)
                .unwrap()
                .as_partition()
                .unwrap()
                .clone()
        })
        .collect()
}
