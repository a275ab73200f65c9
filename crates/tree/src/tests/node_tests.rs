use std::collections::BTreeMap;
use std::sync::Arc;

use super::helpers::*;
use crate::{
    DatabaseRoot, Node, NodeStore, Partition, Patch, TableRoot, Tablet, TreeError,
};
use chrono::Utc;
use store::{decode_block, encode_block, BlockStore, MemoryBlockStore};

fn tablet_node() -> Node {
    Node::Tablet(Tablet::from_records(entry_map(1..=2)))
}

// -------------------- Tagged encoding --------------------

#[test]
fn nodes_carry_their_type_tag() {
    let block = encode_block(&tablet_node()).unwrap();
    // decode the payload generically and check the tag attribute
    let raw: ciborium::value::Value =
        ciborium::de::from_reader(&block[store::BLOCK_HEADER_BYTES..]).unwrap();
    let map = raw.as_map().expect("node payload is a map");
    let tag = map
        .iter()
        .find(|(k, _)| k.as_text() == Some("type"))
        .map(|(_, v)| v.as_text().map(str::to_string))
        .flatten();
    assert_eq!(tag.as_deref(), Some("tablet"));
}

#[test]
fn node_roundtrips_every_variant() {
    let store = node_store();
    let params = small_params();
    let partition = Partition::build(&store, &params, &entries(1..=2)).unwrap();

    let table = TableRoot {
        data: None,
        patch: None,
        params: params.clone(),
        record_count: 0,
        size: 0,
        metadata: BTreeMap::new(),
    };
    let database = DatabaseRoot {
        tables: BTreeMap::new(),
        updated_at: Utc::now(),
        metadata: BTreeMap::new(),
    };
    let patch = Patch::from_changes(
        [(ikey(1), Some(stored(1))), (ikey(2), None)]
            .into_iter()
            .collect(),
    );

    let nodes = vec![
        tablet_node(),
        Node::Partition(partition),
        Node::Patch(patch),
        Node::Table(table),
        Node::Database(database),
    ];
    for node in nodes {
        let block = encode_block(&node).unwrap();
        let decoded: Node = decode_block(&block).unwrap();
        assert_eq!(decoded, node, "round-trip of a {} node", node.kind());
    }
}

#[test]
fn index_nodes_roundtrip_through_the_store() {
    let store = node_store();
    let params = small_params();
    let parts = Partition::build_chunked(&store, &params, entries(1..=6)).unwrap();
    let root = crate::index::build(&store, &params, parts).unwrap().unwrap();

    let link = store.put_node(Node::from(root.clone())).unwrap();
    let loaded = store.get_data(&link).unwrap();
    assert_eq!(loaded, root);
}

#[test]
fn accessors_reject_wrong_kinds() {
    let node = tablet_node();
    assert!(node.as_tablet().is_ok());
    assert!(matches!(node.as_partition(), Err(TreeError::Corrupt(_))));
    assert!(matches!(node.as_index(), Err(TreeError::Corrupt(_))));
    assert!(matches!(
        node.clone().into_data(),
        Err(TreeError::Corrupt(_))
    ));
}

// -------------------- Node store cache --------------------

#[test]
fn get_node_reads_through_and_caches() {
    let blocks = Arc::new(MemoryBlockStore::new());
    let store = NodeStore::new(blocks.clone());

    let link = store.put_node(tablet_node()).unwrap();
    assert_eq!(store.cached_nodes().unwrap(), 1);

    let first = store.get_node(&link.hash).unwrap();
    let second = store.get_node(&link.hash).unwrap();
    assert!(Arc::ptr_eq(&first, &second), "second read served from cache");
}

#[test]
fn put_node_reports_encoded_size() {
    let store = node_store();
    let link = store.put_node(tablet_node()).unwrap();
    let bytes = store.blocks().get(&link.hash).unwrap();
    assert_eq!(link.reachable_size, Some(bytes.len() as u64));
}

#[test]
fn cache_eviction_respects_byte_budget() {
    let blocks = Arc::new(MemoryBlockStore::new());
    // a budget that fits only a couple of tablet nodes
    let link = NodeStore::new(blocks.clone())
        .put_node(tablet_node())
        .unwrap();
    let node_bytes = blocks.get(&link.hash).unwrap().len();

    let store = NodeStore::with_cache_budget(blocks, node_bytes * 2);
    for i in 0..10i64 {
        store
            .put_node(Node::Tablet(Tablet::from_records(entry_map([i, i + 100]))))
            .unwrap();
    }
    let cached = store.cached_nodes().unwrap();
    assert!(cached <= 3, "cache held {} nodes over budget", cached);

    // evicted nodes are still readable through the block store
    let reread = store.get_node(&link.hash).unwrap();
    assert!(reread.as_tablet().is_ok());
}
