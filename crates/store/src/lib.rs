//! # Store — content-addressed blocks and named refs
//!
//! The durability layer under the MerkleDB data tree. Two collaborating
//! abstractions live here:
//!
//! - [`BlockStore`]: an immutable byte-block store keyed by [`Hash`]
//!   (a self-describing multihash). Blocks never change once written, so
//!   `put` is idempotent and `get` is verifiable by re-hashing.
//! - [`RefTracker`]: the only mutable state in the system — named pointers
//!   to root hashes, updated by compare-and-set with full version history.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ RefTracker      "my-table" ──► v7: hash H   │   mutable (CAS)
//! ├─────────────────────────────────────────────┤
//! │ BlockStore      H ──► [codec|ver|payload]   │   immutable
//! │                 H' ──► ...                  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Both come in a memory flavor (tests, ephemeral work) and a file flavor
//! (blocks as files named by their hash; refs as an atomically rewritten
//! text file).
//!
//! ## Block framing
//!
//! Every block starts with a two-byte multicodec header — payload codec
//! (`0x71`, dag-cbor) and format version — followed by the CBOR payload.
//! See [`codec`].

mod block;
mod codec;
mod hash;
mod refs;

use std::io;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

pub use block::{BlockStore, FileBlockStore, MemoryBlockStore};
pub use codec::{decode_block, encode_block, BLOCK_CODEC_CBOR, BLOCK_FORMAT_V1, BLOCK_HEADER_BYTES};
pub use hash::{Hash, Link};
pub use refs::{FileRefTracker, MemoryRefTracker, RefTracker, RefVersion};

/// Errors from block-store and ref-tracker operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested block hash is unknown to the store.
    #[error("block {0} not found in store")]
    NotFound(Hash),

    /// Block bytes do not parse under the declared codec, or the content
    /// does not match its address.
    #[error("block does not decode: {0}")]
    Decode(String),

    /// A value could not be serialized into a block payload.
    #[error("value does not encode: {0}")]
    Encode(String),

    /// Transient I/O failure; the caller may retry.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] io::Error),

    /// A compare-and-set on a ref observed a different current version.
    #[error("ref {name:?} conflict: expected version {expected}, found {actual}")]
    RefConflict {
        /// The contested ref name.
        name: String,
        /// The version the caller expected to replace.
        expected: u64,
        /// The version actually current.
        actual: u64,
    },

    /// The named ref does not exist (or has been dropped).
    #[error("unknown ref {0:?}")]
    UnknownRef(String),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Locks `mutex`, surfacing a poisoned lock as a store failure.
///
/// A writer that panicked mid-update poisons the lock; subsequent callers
/// get a retryable error rather than a cascading panic.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|e| {
        StoreError::Unavailable(io::Error::new(
            io::ErrorKind::Other,
            format!("lock poisoned: {}", e),
        ))
    })
}
