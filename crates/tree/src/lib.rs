//! # Tree - the MerkleDB data tree
//!
//! The immutable, content-addressed structures a table's records live in,
//! and the algorithms that rebuild them copy-on-write.
//!
//! ## Architecture
//!
//! ```text
//!                      table root (in `table` crate)
//!                        |               |
//!                        v               v
//! ┌──────────────────────────────┐  ┌─────────┐
//! │ INDEX  (B+-tree, fan-out N)  │  │ PATCH   │  buffered changes
//! │   index ── index ── ...      │  └─────────┘
//! │     |        |               │
//! │     v        v               │
//! │ partition  partition  ...    │  leaf grouping, bloom-gated
//! │   |    |                     │
//! │   v    v                     │
//! │ tablet tablet (families)     │  sorted key -> record maps
//! └──────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module        | Purpose                                                |
//! |---------------|--------------------------------------------------------|
//! | [`record`]    | record maps, primary-key codec, family splitting       |
//! | [`tablet`]    | sorted key→record leaf blocks                          |
//! | [`patch`]     | sorted change overlays and the overlay merge           |
//! | [`partition`] | base + family tablets, bloom filter, build/read/update |
//! | [`index`]     | B+-tree build / range search / copy-on-write update    |
//! | [`node`]      | the closed node sum type stored in blocks              |
//! | [`cache`]     | typed read-through LRU node store over a block store   |
//!
//! Every node is immutable once hashed: updates produce new nodes that share
//! every untouched subtree with the previous version. Only blocks on the
//! changed path are written, so a single-record update costs O(log n) new
//! blocks.

mod cache;
pub mod index;
mod node;
mod partition;
mod patch;
mod record;
mod tablet;
mod wire;

use thiserror::Error;

pub use cache::NodeStore;
pub use index::{ChildRef, DataNode, IndexNode};
pub use node::{DatabaseRoot, Node, TableRoot};
pub use partition::{Partition, PartitionUpdate, BLOOM_FPR};
pub use patch::{apply_changes, Patch};
pub use record::{
    apply_change, decode_entry, encode_entry, extract_key, merge_change, merge_fields,
    project, split_families, Change, Key, Record,
};
pub use tablet::Tablet;

/// Errors from tree operations.
#[derive(Debug, Error)]
pub enum TreeError {
    /// A structural invariant (ordering, heights, fan-out bounds, family
    /// layout) does not hold. Fatal for the current operation; nothing
    /// partial is persisted.
    #[error("tree corrupt: {0}")]
    Corrupt(String),

    /// A record has no value for a primary-key field.
    #[error("record is missing primary-key field {0:?}")]
    MissingKeyField(String),

    /// The underlying block store failed.
    #[error(transparent)]
    Store(#[from] store::StoreError),

    /// A key failed to encode or decode.
    #[error(transparent)]
    Key(#[from] lexicoder::LexicoderError),
}

/// Result alias for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;

#[cfg(test)]
mod tests;
