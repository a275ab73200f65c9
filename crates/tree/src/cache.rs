//! The typed node store: a read-through LRU cache over a block store.
//!
//! Every node fetch goes hash → cache → block store → CBOR decode, and every
//! persist goes encode → block store → cache. The cache is keyed by
//! multihash, shared process-wide through cheap clones, and bounded by a
//! byte budget rather than an entry count (node sizes vary by orders of
//! magnitude between an index node and a full tablet).

use std::sync::{Arc, Mutex, MutexGuard};

use lru::LruCache;
use store::{decode_block, encode_block, BlockStore, Hash, Link};
use tracing::trace;

use crate::index::DataNode;
use crate::node::Node;
use crate::{Result, TreeError};

/// Default cache byte budget: 64 MiB.
pub const DEFAULT_CACHE_BUDGET: usize = 64 * 1024 * 1024;

struct CacheEntry {
    node: Arc<Node>,
    /// Encoded block size, counted against the byte budget.
    bytes: usize,
}

struct NodeCache {
    lru: LruCache<Hash, CacheEntry>,
    budget: usize,
    used: usize,
}

impl NodeCache {
    fn insert(&mut self, hash: Hash, node: Arc<Node>, bytes: usize) {
        if bytes > self.budget {
            // A single oversized node would immediately evict everything.
            return;
        }
        if self.lru.put(hash, CacheEntry { node, bytes }).is_none() {
            self.used += bytes;
        }
        while self.used > self.budget {
            match self.lru.pop_lru() {
                Some((_, evicted)) => self.used -= evicted.bytes,
                None => break,
            }
        }
    }

    fn get(&mut self, hash: &Hash) -> Option<Arc<Node>> {
        self.lru.get(hash).map(|entry| entry.node.clone())
    }
}

struct Inner {
    blocks: Arc<dyn BlockStore>,
    cache: Mutex<NodeCache>,
}

/// A handle to typed node storage. Clones share the same cache and block
/// store, so one `NodeStore` per process (or per test) is the norm.
#[derive(Clone)]
pub struct NodeStore {
    inner: Arc<Inner>,
}

impl NodeStore {
    /// Wraps a block store with the default cache budget.
    pub fn new(blocks: Arc<dyn BlockStore>) -> Self {
        Self::with_cache_budget(blocks, DEFAULT_CACHE_BUDGET)
    }

    /// Wraps a block store with an explicit cache byte budget.
    pub fn with_cache_budget(blocks: Arc<dyn BlockStore>, budget: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                blocks,
                cache: Mutex::new(NodeCache {
                    // Entry count is unconstrained; the byte budget governs.
                    lru: LruCache::unbounded(),
                    budget,
                    used: 0,
                }),
            }),
        }
    }

    /// The underlying block store.
    pub fn blocks(&self) -> &Arc<dyn BlockStore> {
        &self.inner.blocks
    }

    /// Locks the cache, surfacing a poisoned lock as an error so one
    /// panicked writer does not take every other caller down with it.
    fn cache(&self) -> Result<MutexGuard<'_, NodeCache>> {
        self.inner
            .cache
            .lock()
            .map_err(|e| TreeError::Corrupt(format!("node cache lock poisoned: {}", e)))
    }

    /// Encodes and stores a node, returning a link with the encoded size as
    /// its reachable-size advisory.
    pub fn put_node(&self, node: Node) -> Result<Link> {
        let bytes = encode_block(&node)?;
        let hash = self.inner.blocks.put(&bytes)?;
        trace!(kind = node.kind(), %hash, bytes = bytes.len(), "put node");
        self.cache()?.insert(hash, Arc::new(node), bytes.len());
        Ok(Link::sized(hash, bytes.len() as u64))
    }

    /// Fetches and decodes the node at `hash`, serving repeats from cache.
    pub fn get_node(&self, hash: &Hash) -> Result<Arc<Node>> {
        if let Some(node) = self.cache()?.get(hash) {
            return Ok(node);
        }

        let bytes = self.inner.blocks.get(hash)?;
        let node: Node = decode_block(&bytes)?;
        trace!(kind = node.kind(), %hash, bytes = bytes.len(), "miss, decoded node");
        let node = Arc::new(node);
        self.cache()?.insert(*hash, node.clone(), bytes.len());
        Ok(node)
    }

    /// Fetches a data-tree node (index or partition) as an owned value,
    /// ready for copy-on-write editing.
    pub fn get_data(&self, link: &Link) -> Result<DataNode> {
        let node = self.get_node(&link.hash)?;
        node.as_ref().clone().into_data()
    }

    /// Number of nodes currently cached (test hook).
    pub fn cached_nodes(&self) -> Result<usize> {
        Ok(self.cache()?.lru.len())
    }
}

impl std::fmt::Debug for NodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.cache.lock() {
            Ok(cache) => f
                .debug_struct("NodeStore")
                .field("cached_nodes", &cache.lru.len())
                .field("cached_bytes", &cache.used)
                .field("budget", &cache.budget)
                .finish(),
            Err(_) => f
                .debug_struct("NodeStore")
                .field("cache", &"<poisoned>")
                .finish(),
        }
    }
}
