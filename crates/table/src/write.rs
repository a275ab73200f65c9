//! Write path: `insert()`, `delete()`, `flush()`, `optimize()`, and
//! `alter_families()`.
//!
//! All mutations stage into the in-memory pending map first. `flush()`
//! crystallizes pending into a patch block; once the combined patch
//! outgrows the patch limit it is applied to the partition tree in a single
//! ordered pass. Nothing observable changes until a new root is saved, so a
//! failure anywhere leaves at most unreachable blocks.

use std::collections::{BTreeMap, BTreeSet};

use config::validate_families;
use tracing::debug;
use tree::{
    encode_entry, index, merge_change, Change, Key, Node, Partition, Record,
};

use crate::{Result, Table};

impl Table {
    /// Stages records for insertion, keyed by their primary key.
    ///
    /// A record staged for a key that already has a staged record merges
    /// into it field-wise; staging over a staged tombstone replaces it.
    ///
    /// # Errors
    ///
    /// Fails when a record lacks a primary-key field or its key value does
    /// not fit the table's lexicoder. Nothing is staged on failure.
    pub fn insert<I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = Record>,
    {
        // Encode everything before touching pending: an invalid record in
        // the middle of a batch must not leave half the batch staged.
        let mut staged: Vec<(Key, Record)> = Vec::new();
        for record in records {
            staged.push(encode_entry(
                &self.params.primary_key,
                &self.params.lexicoder,
                &record,
            )?);
        }
        for (key, stored) in staged {
            let change = merge_change(self.pending.get(&key), &Some(stored));
            self.pending.insert(key, change);
        }
        Ok(())
    }

    /// Stages tombstones for the given primary-key values.
    pub fn delete<I>(&mut self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = lexicoder::Value>,
    {
        let mut encoded: Vec<Key> = Vec::new();
        for key in keys {
            encoded.push(self.params.lexicoder.encode(&key)?);
        }
        for key in encoded {
            self.pending.insert(key, None);
        }
        Ok(())
    }

    /// Crystallizes pending changes.
    ///
    /// Pending merges into the buffered patch; if the combined change count
    /// stays within the patch limit the result is persisted as a patch
    /// block, otherwise the whole batch is applied to the partition tree
    /// and the patch link clears.
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut combined = self.patch_changes()?;
        for (key, change) in &self.pending {
            let merged = merge_change(combined.get(key), change);
            combined.insert(key.clone(), merged);
        }

        // Pending is only dropped once its replacement is durable, so a
        // store failure leaves the staged changes where they were.
        if combined.len() <= self.params.patch_limit {
            debug!(changes = combined.len(), "buffering patch");
            let patch = tree::Patch::from_changes(combined);
            self.patch = Some(self.store.put_node(Node::Patch(patch))?);
        } else {
            debug!(changes = combined.len(), "patch over limit, updating tree");
            self.apply_to_tree(combined)?;
            self.patch = None;
        }
        self.pending.clear();
        Ok(())
    }

    /// Forces a full flush and repacks the tree for tight partitions,
    /// regardless of the patch limit.
    pub fn optimize(&mut self) -> Result<()> {
        // Apply everything buffered anywhere.
        let mut combined = self.patch_changes()?;
        for (key, change) in &self.pending {
            let merged = merge_change(combined.get(key), change);
            combined.insert(key.clone(), merged);
        }
        if !combined.is_empty() {
            self.apply_to_tree(combined)?;
            self.patch = None;
        }
        self.pending.clear();

        // Rebuild from a clean record stream: minimal partition count,
        // near-equal fill.
        let Some(root) = self.data else {
            return Ok(());
        };
        let mut records: Vec<(Key, Record)> = Vec::new();
        for link in index::find_partition_links(&self.store, &root, None, None)? {
            let node = self.store.get_node(&link.hash)?;
            let partition = node.as_partition()?;
            records.extend(partition.read_all(&self.store, &self.params, None)?);
        }
        debug!(records = records.len(), "repacking partition tree");
        let partitions = Partition::build_chunked(&self.store, &self.params, records)?;
        self.set_root(index::build(&self.store, &self.params, partitions)?)?;
        Ok(())
    }

    /// Reshapes the field→family assignment, rewriting every partition
    /// under the new layout.
    ///
    /// Tablets whose contents are unchanged by the reshape re-encode to the
    /// same hash, so they cost no new blocks. Values are moved verbatim;
    /// nothing coerces a field's type when it changes family.
    pub fn alter_families(
        &mut self,
        families: BTreeMap<String, BTreeSet<String>>,
    ) -> Result<()> {
        validate_families(&families)?;
        self.params.families = families;

        let Some(root) = self.data else {
            return Ok(());
        };
        let links = index::find_partition_links(&self.store, &root, None, None)?;
        debug!(partitions = links.len(), "rewriting partitions for new families");
        let mut partitions = Vec::with_capacity(links.len());
        for link in links {
            let node = self.store.get_node(&link.hash)?;
            let partition = node.as_partition()?;
            // Full records regardless of layout: a read with no projection
            // loads every tablet the old partition had.
            let records = partition.read_all(&self.store, &self.params, None)?;
            partitions.push(Partition::build(&self.store, &self.params, &records)?);
        }
        self.set_root(index::build(&self.store, &self.params, partitions)?)?;
        Ok(())
    }

    /// Loads the buffered patch's changes, or an empty map.
    pub(crate) fn patch_changes(&self) -> Result<BTreeMap<Key, Change>> {
        match &self.patch {
            Some(link) => {
                let node = self.store.get_node(&link.hash)?;
                Ok(node.as_patch()?.clone().into_changes())
            }
            None => Ok(BTreeMap::new()),
        }
    }

    /// Applies sorted changes to the partition tree and re-links the root.
    fn apply_to_tree(&mut self, changes: BTreeMap<Key, Change>) -> Result<()> {
        let changes: Vec<(Key, Change)> = changes.into_iter().collect();
        let new_root = match &self.data {
            Some(link) => index::update_tree(&self.store, &self.params, link, &changes)?,
            None => {
                // No tree yet: tombstones have nothing to erase, records
                // seed the first partitions.
                let records: Vec<(Key, Record)> = changes
                    .into_iter()
                    .filter_map(|(key, change)| change.map(|record| (key, record)))
                    .collect();
                let partitions =
                    Partition::build_chunked(&self.store, &self.params, records)?;
                index::build(&self.store, &self.params, partitions)?
            }
        };
        self.set_root(new_root)
    }

    /// Persists a new data root (or clears it) and refreshes the aggregate
    /// statistics.
    fn set_root(&mut self, root: Option<tree::DataNode>) -> Result<()> {
        match root {
            Some(node) => {
                self.record_count = node.record_count();
                self.size = node.size();
                self.data = Some(self.store.put_node(Node::from(node))?);
            }
            None => {
                self.record_count = 0;
                self.size = 0;
                self.data = None;
            }
        }
        Ok(())
    }
}
