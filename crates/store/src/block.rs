//! Block stores: immutable byte blocks keyed by their own hash.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::{Hash, Result, StoreError};

/// A content-addressed store of immutable byte blocks.
///
/// `put` is idempotent — storing the same bytes twice yields the same hash
/// and leaves one block. Implementations must be safe to share across
/// threads; no locks are held across calls by users of this trait.
pub trait BlockStore: Send + Sync {
    /// Stores `bytes` and returns their content address.
    fn put(&self, bytes: &[u8]) -> Result<Hash>;

    /// Fetches the block with the given address.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no such block exists.
    fn get(&self, hash: &Hash) -> Result<Vec<u8>>;

    /// Returns whether a block with the given address exists.
    fn has(&self, hash: &Hash) -> Result<bool>;

    /// Returns the stored size of the block in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no such block exists.
    fn size(&self, hash: &Hash) -> Result<u64>;
}

/// An in-memory block store for tests and ephemeral work.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: Mutex<HashMap<Hash, Arc<[u8]>>>,
}

impl MemoryBlockStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blocks held.
    pub fn len(&self) -> Result<usize> {
        Ok(crate::lock(&self.blocks)?.len())
    }

    /// Returns whether the store holds no blocks.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl BlockStore for MemoryBlockStore {
    fn put(&self, bytes: &[u8]) -> Result<Hash> {
        let hash = Hash::of(bytes);
        crate::lock(&self.blocks)?
            .entry(hash)
            .or_insert_with(|| Arc::from(bytes));
        Ok(hash)
    }

    fn get(&self, hash: &Hash) -> Result<Vec<u8>> {
        crate::lock(&self.blocks)?
            .get(hash)
            .map(|b| b.to_vec())
            .ok_or(StoreError::NotFound(*hash))
    }

    fn has(&self, hash: &Hash) -> Result<bool> {
        Ok(crate::lock(&self.blocks)?.contains_key(hash))
    }

    fn size(&self, hash: &Hash) -> Result<u64> {
        crate::lock(&self.blocks)?
            .get(hash)
            .map(|b| b.len() as u64)
            .ok_or(StoreError::NotFound(*hash))
    }
}

/// A block store keeping each block as a file named by its hex hash.
///
/// Writes are crash-safe: bytes land in a `.tmp` file, are fsynced, and are
/// then atomically renamed into place. A crash mid-write leaves only a
/// `.tmp` file, which never shadows a real block.
///
/// Reads verify the content against its address and fail with
/// [`StoreError::Decode`] on a digest mismatch, catching silent on-disk
/// corruption at the earliest point.
pub struct FileBlockStore {
    dir: PathBuf,
}

impl FileBlockStore {
    /// Opens (creating if needed) a block directory.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn block_path(&self, hash: &Hash) -> PathBuf {
        self.dir.join(hash.to_hex())
    }
}

impl BlockStore for FileBlockStore {
    fn put(&self, bytes: &[u8]) -> Result<Hash> {
        let hash = Hash::of(bytes);
        let path = self.block_path(&hash);
        if path.exists() {
            // Content addressing: an existing block with this name is
            // byte-identical, so the put is already done.
            return Ok(hash);
        }

        let tmp_path = path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, &path)?;
        Ok(hash)
    }

    fn get(&self, hash: &Hash) -> Result<Vec<u8>> {
        let bytes = match fs::read(self.block_path(hash)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(*hash))
            }
            Err(e) => return Err(e.into()),
        };
        if Hash::of(&bytes) != *hash {
            return Err(StoreError::Decode(format!(
                "block {} content does not match its address",
                hash
            )));
        }
        Ok(bytes)
    }

    fn has(&self, hash: &Hash) -> Result<bool> {
        Ok(self.block_path(hash).exists())
    }

    fn size(&self, hash: &Hash) -> Result<u64> {
        match fs::metadata(self.block_path(hash)) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(*hash)),
            Err(e) => Err(e.into()),
        }
    }
}

impl<S: BlockStore + ?Sized> BlockStore for Arc<S> {
    fn put(&self, bytes: &[u8]) -> Result<Hash> {
        (**self).put(bytes)
    }

    fn get(&self, hash: &Hash) -> Result<Vec<u8>> {
        (**self).get(hash)
    }

    fn has(&self, hash: &Hash) -> Result<bool> {
        (**self).has(hash)
    }

    fn size(&self, hash: &Hash) -> Result<u64> {
        (**self).size(hash)
    }
}
