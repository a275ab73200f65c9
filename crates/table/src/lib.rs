//! # Table - the MerkleDB public engine
//!
//! Ties the data tree, the patch buffer, and an in-memory staging map into
//! the versioned table the caller works with.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌──────────────────────────────────────────────┐
//! │                    TABLE                     │
//! │                                              │
//! │ write.rs → insert/delete → pending (memory)  │
//! │               |                              │
//! │             flush()                          │
//! │               |   count <= patch-limit       │
//! │               ├────────────► PATCH block     │
//! │               |   count  > patch-limit       │
//! │               └────────────► tree update     │
//! │                              (split/merge)   │
//! │                                              │
//! │ read.rs → pending → patch → partitions       │
//! │             (newest layer wins, field-wise)  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot semantics
//!
//! A `Table` value is a snapshot: the tree and patch it links to are
//! immutable blocks, and `pending` is owned by this one value. `Clone`
//! therefore yields an independent snapshot sharing every stored block.
//! Readers holding an old value keep seeing exactly the state they loaded;
//! durability means persisting the root ([`Table::save`]) and swinging a
//! named ref to the returned hash ([`Table::commit_to`]).
//!
//! ## Patch lifecycle
//!
//! ```text
//! EMPTY ──insert/delete──► STAGED ──flush (small)──► BUFFERED
//!                            │                          │
//!                            └──────flush (over limit)──┴──► FLUSHED-TO-TREE
//! ```

mod db;
mod read;
mod write;

use std::collections::BTreeMap;

use config::{ConfigError, TableParams};
use lexicoder::LexicoderError;
use store::{Hash, Link, RefTracker, RefVersion, StoreError};
use thiserror::Error;
use tree::{Change, Key, Node, NodeStore, Record, TableRoot, TreeError};

pub use db::Database;

/// Errors from table operations.
#[derive(Debug, Error)]
pub enum TableError {
    /// A data-tree invariant failed or a block held the wrong node kind.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// The block store or ref tracker failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A primary-key value was not encodable.
    #[error(transparent)]
    Key(#[from] LexicoderError),

    /// The table parameters are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias for table operations.
pub type Result<T> = std::result::Result<T, TableError>;

/// Where a table stands in the patch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    /// No data anywhere.
    Empty,
    /// Staged changes sit in the in-memory pending map.
    Staged,
    /// A persisted patch buffers changes below the patch limit.
    Buffered,
    /// All changes live in the partition tree; no patch, nothing pending.
    Flushed,
}

/// A versioned, immutable table of records keyed by a typed primary key.
#[derive(Clone)]
pub struct Table {
    pub(crate) store: NodeStore,
    pub(crate) params: TableParams,
    /// The data tree root: an index node or a lone partition.
    pub(crate) data: Option<Link>,
    /// The persisted patch, when changes are buffered.
    pub(crate) patch: Option<Link>,
    /// Records in the data tree (patch and pending not counted).
    pub(crate) record_count: u64,
    /// Bytes reachable through `data`.
    pub(crate) size: u64,
    /// Free-form metadata carried on the root.
    pub(crate) metadata: Record,
    /// Staged, not-yet-flushed changes. The only mutable state.
    pub(crate) pending: BTreeMap<Key, Change>,
}

impl Table {
    /// Creates an empty table with the given parameters.
    ///
    /// # Errors
    ///
    /// Fails when the parameters are structurally invalid.
    pub fn create(store: NodeStore, params: TableParams) -> Result<Table> {
        params.validate()?;
        Ok(Table {
            store,
            params,
            data: None,
            patch: None,
            record_count: 0,
            size: 0,
            metadata: Record::new(),
            pending: BTreeMap::new(),
        })
    }

    /// Opens the table rooted at `hash`.
    pub fn open(store: NodeStore, hash: &Hash) -> Result<Table> {
        let node = store.get_node(hash)?;
        let root = node.as_table()?;
        root.params.validate()?;
        Ok(Table {
            store: store.clone(),
            params: root.params.clone(),
            data: root.data,
            patch: root.patch,
            record_count: root.record_count,
            size: root.size,
            metadata: root.metadata.clone(),
            pending: BTreeMap::new(),
        })
    }

    /// Flushes staged changes and persists the root node, returning its
    /// link. Everything below the root is already durable by the time the
    /// link exists, so handing this hash to a ref tracker can never expose
    /// a partially written tree.
    pub fn save(&mut self) -> Result<Link> {
        self.flush()?;
        let root = TableRoot {
            data: self.data,
            patch: self.patch,
            params: self.params.clone(),
            record_count: self.record_count,
            size: self.size,
            metadata: self.metadata.clone(),
        };
        Ok(self.store.put_node(Node::Table(root))?)
    }

    /// Saves the table and swings the named ref to the new root.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError::RefConflict`] untouched when another writer
    /// moved the ref first; the caller re-opens the winner's root, reapplies
    /// its changes, and retries.
    pub fn commit_to(
        &mut self,
        refs: &dyn RefTracker,
        name: &str,
        expected_version: u64,
    ) -> Result<RefVersion> {
        let link = self.save()?;
        Ok(refs.set_ref(name, expected_version, link.hash)?)
    }

    /// The table parameters.
    pub fn params(&self) -> &TableParams {
        &self.params
    }

    /// Records in the data tree. Staged and buffered changes are not
    /// counted until they are applied.
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Bytes reachable through the data tree.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The data-tree root link, when the tree is non-empty.
    pub fn data_link(&self) -> Option<&Link> {
        self.data.as_ref()
    }

    /// The persisted patch link, when changes are buffered.
    pub fn patch_link(&self) -> Option<&Link> {
        self.patch.as_ref()
    }

    /// Number of staged (unflushed) changes.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// The table's position in the patch lifecycle.
    pub fn state(&self) -> TableState {
        if !self.pending.is_empty() {
            TableState::Staged
        } else if self.patch.is_some() {
            TableState::Buffered
        } else if self.data.is_some() {
            TableState::Flushed
        } else {
            TableState::Empty
        }
    }

    /// The node store this table reads and writes through.
    pub fn node_store(&self) -> &NodeStore {
        &self.store
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("state", &self.state())
            .field("record_count", &self.record_count)
            .field("size", &self.size)
            .field("pending", &self.pending.len())
            .field("has_patch", &self.patch.is_some())
            .field("has_data", &self.data.is_some())
            .field("fan_out", &self.params.fan_out)
            .field("partition_limit", &self.params.partition_limit)
            .field("patch_limit", &self.params.patch_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests;
