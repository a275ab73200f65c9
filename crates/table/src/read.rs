//! Read path: `read_batch()`, `scan()`, and `keys()`.
//!
//! Every read resolves three layers, newest first: the pending map, the
//! buffered patch, then the partition tree. Layers merge field-wise per
//! key and tombstones in an upper layer hide everything beneath them.
//! Point reads are bloom-gated per partition; scans stream partitions in
//! key order and stop as soon as `offset + limit` rows exist.

use std::collections::{BTreeMap, BTreeSet};

use config::{ReadOptions, ScanOptions};
use lexicoder::Value;
use tree::{
    apply_change, apply_changes, decode_entry, index, merge_change, project, Change, Key,
    Record,
};

use crate::{Result, Table};

impl Table {
    /// Reads the records for the given primary-key values, in key order.
    /// Absent keys are simply missing from the result.
    pub fn read_batch(&self, keys: &[Value], opts: &ReadOptions) -> Result<Vec<Record>> {
        let mut encoded: Vec<Key> = Vec::with_capacity(keys.len());
        for key in keys {
            encoded.push(self.params.lexicoder.encode(key)?);
        }
        encoded.sort_unstable();
        encoded.dedup();
        if encoded.is_empty() {
            return Ok(Vec::new());
        }

        // Tree layer: batch per intersecting partition, bloom-gated inside.
        let mut base: BTreeMap<Key, Record> = BTreeMap::new();
        if let Some(root) = &self.data {
            let min = encoded.first().map(Vec::as_slice);
            let max = encoded.last().map(Vec::as_slice);
            for link in index::find_partition_links(&self.store, root, min, max)? {
                let node = self.store.get_node(&link.hash)?;
                let partition = node.as_partition()?;
                for (key, record) in partition.read_batch(
                    &self.store,
                    &self.params,
                    &encoded,
                    opts.fields.as_ref(),
                )? {
                    base.insert(key, record);
                }
            }
        }

        // Patch and pending layers.
        let patch = self.patch_node()?;
        let mut out = Vec::new();
        for key in encoded {
            let mut current = base.remove(&key);
            if let Some(patch) = &patch {
                if let Some(change) = patch.get(&key) {
                    current = apply_change(current, change);
                }
            }
            if let Some(change) = self.pending.get(&key) {
                current = apply_change(current, change);
            }
            if let Some(record) = current {
                out.push(self.finish_record(&key, record, opts.fields.as_ref())?);
            }
        }
        Ok(out)
    }

    /// Scans records in key order, honoring bounds, projection, offset,
    /// limit, and direction.
    pub fn scan(&self, opts: &ScanOptions) -> Result<Vec<Record>> {
        let rows = self.scan_raw(opts)?;
        rows.into_iter()
            .map(|(key, record)| self.finish_record(&key, record, opts.fields.as_ref()))
            .collect()
    }

    /// Scans only the primary-key values in key order. Loads base tablets
    /// exclusively — family tablets never enter the picture.
    pub fn keys(&self, opts: &ScanOptions) -> Result<Vec<Value>> {
        // An empty projection selects no family tablets.
        let mut key_opts = opts.clone();
        key_opts.fields = Some(BTreeSet::new());
        let rows = self.scan_raw(&key_opts)?;
        rows.into_iter()
            .map(|(key, _)| Ok(self.params.lexicoder.decode(&key)?))
            .collect()
    }

    /// The merged `(key, stored-record)` rows of a scan, offset/limit
    /// applied, primary-key fields not yet attached.
    fn scan_raw(&self, opts: &ScanOptions) -> Result<Vec<(Key, Record)>> {
        let min = match &opts.min_key {
            Some(v) => Some(self.params.lexicoder.encode(v)?),
            None => None,
        };
        let max = match &opts.max_key {
            Some(v) => Some(self.params.lexicoder.encode(v)?),
            None => None,
        };
        let min = min.as_deref();
        let max = max.as_deref();
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Ok(Vec::new());
            }
        }

        // Overlay: patch changes with pending merged over them, clipped to
        // the scan bounds, ordered in scan direction.
        let mut overlay: BTreeMap<Key, Change> = BTreeMap::new();
        if let Some(patch) = self.patch_node()? {
            for (key, change) in patch.changes_in_range(min, max) {
                overlay.insert(key.clone(), change.clone());
            }
        }
        for (key, change) in pending_range(&self.pending, min, max) {
            let merged = merge_change(overlay.get(key), change);
            overlay.insert(key.clone(), merged);
        }
        let mut overlay: Vec<(Key, Change)> = if opts.reverse {
            overlay.into_iter().rev().collect()
        } else {
            overlay.into_iter().collect()
        };
        overlay.reverse(); // consume from the back via pop()

        // Partition stream, in scan direction.
        let mut links = match &self.data {
            Some(root) => index::find_partition_links(&self.store, root, min, max)?,
            None => Vec::new(),
        };
        if opts.reverse {
            links.reverse();
        }

        let target = opts.limit.map(|limit| opts.offset.saturating_add(limit));
        let mut rows: Vec<(Key, Record)> = Vec::new();

        for link in links {
            if target.is_some_and(|t| rows.len() >= t) {
                break;
            }
            let node = self.store.get_node(&link.hash)?;
            let partition = node.as_partition()?;

            // Overlay-only keys that sort before this partition: inserts
            // landing in the gaps between partitions.
            let edge: &[u8] = if opts.reverse {
                &partition.last_key
            } else {
                &partition.first_key
            };
            while overlay
                .last()
                .is_some_and(|(k, _)| before(k, edge, opts.reverse))
            {
                let (key, change) = overlay.pop().expect("checked non-empty");
                if let Some(record) = change {
                    rows.push((key, record));
                }
            }

            // Changes inside the partition's range merge with its records.
            let far_edge: &[u8] = if opts.reverse {
                &partition.first_key
            } else {
                &partition.last_key
            };
            let mut in_range: Vec<(Key, Change)> = Vec::new();
            while overlay
                .last()
                .is_some_and(|(k, _)| !before(far_edge, k, opts.reverse))
            {
                in_range.push(overlay.pop().expect("checked non-empty"));
            }

            let mut records =
                partition.read_range(&self.store, &self.params, min, max, opts.fields.as_ref())?;
            if opts.reverse {
                records.reverse();
            }
            rows.extend(apply_changes(records, in_range, opts.reverse));
        }

        // Whatever overlay remains sorts after every partition.
        if !target.is_some_and(|t| rows.len() >= t) {
            while let Some((key, change)) = overlay.pop() {
                if let Some(record) = change {
                    rows.push((key, record));
                }
                if target.is_some_and(|t| rows.len() >= t) {
                    break;
                }
            }
        }

        // Offset and limit.
        let rows: Vec<(Key, Record)> = rows
            .into_iter()
            .skip(opts.offset)
            .take(opts.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(rows)
    }

    /// Attaches the primary-key fields and applies the projection.
    fn finish_record(
        &self,
        key: &[u8],
        stored: Record,
        fields: Option<&BTreeSet<String>>,
    ) -> Result<Record> {
        let full = decode_entry(
            &self.params.primary_key,
            &self.params.lexicoder,
            key,
            &stored,
        )?;
        Ok(match fields {
            Some(wanted) => {
                // Primary-key fields always come along.
                let mut wanted = wanted.clone();
                for field in self.params.primary_key.fields() {
                    wanted.insert(field.to_string());
                }
                project(&full, &wanted)
            }
            None => full,
        })
    }

    /// Loads the buffered patch node, if any.
    fn patch_node(&self) -> Result<Option<tree::Patch>> {
        match &self.patch {
            Some(link) => {
                let node = self.store.get_node(&link.hash)?;
                Ok(Some(node.as_patch()?.clone()))
            }
            None => Ok(None),
        }
    }
}

/// `a` sorts strictly before `b` in the scan direction.
fn before(a: &[u8], b: &[u8], reverse: bool) -> bool {
    if reverse {
        a > b
    } else {
        a < b
    }
}

/// The pending entries with keys inside `[min, max]`.
fn pending_range<'a>(
    pending: &'a BTreeMap<Key, Change>,
    min: Option<&'a [u8]>,
    max: Option<&'a [u8]>,
) -> impl Iterator<Item = (&'a Key, &'a Change)> + 'a {
    pending.iter().filter(move |(key, _)| {
        min.map_or(true, |min| key.as_slice() >= min)
            && max.map_or(true, |max| key.as_slice() <= max)
    })
}
