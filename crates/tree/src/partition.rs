//! Partitions: the data-tree leaves.
//!
//! A partition groups the tablets for one contiguous key range: a base
//! tablet holding every record key, plus one tablet per column family that
//! has data in the range. It carries enough metadata — key bounds, counts,
//! a bloom filter — for readers to skip it without loading a single tablet,
//! and for the index above it to route updates exactly.
//!
//! Partitions are the unit of splitting and merging. An update that grows a
//! partition past the record limit splits it into balanced halves; one that
//! shrinks it below half the limit signals underflow so the index can fold
//! the survivors into a sibling.

use std::collections::{BTreeMap, BTreeSet};

use bloom::BloomFilter;
use config::{TableParams, BASE_FAMILY};
use serde::{Deserialize, Serialize};
use store::Link;
use tracing::debug;

use crate::cache::NodeStore;
use crate::node::Node;
use crate::patch::apply_changes;
use crate::record::{merge_fields, project, split_families, Change, Key, Record};
use crate::tablet::Tablet;
use crate::{Result, TreeError};

/// Target false-positive rate for partition bloom filters.
pub const BLOOM_FPR: f64 = 0.01;

/// A data-tree leaf: key bounds, counts, a membership filter, and links to
/// the base and family tablets covering one key range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Partition {
    /// Smallest key present.
    #[serde(with = "serde_bytes")]
    pub first_key: Vec<u8>,
    /// Largest key present.
    #[serde(with = "serde_bytes")]
    pub last_key: Vec<u8>,
    /// Number of records.
    pub record_count: u64,
    /// Total encoded size of the tablets, in bytes.
    pub size: u64,
    /// Membership filter over every record key.
    pub bloom: BloomFilter,
    /// Tablet links by family name (always includes `base`).
    pub tablets: BTreeMap<String, Link>,
    /// Number of keys inserted into the bloom filter.
    pub membership_count: u64,
}

/// The result of applying changes to one partition.
#[derive(Debug)]
pub enum PartitionUpdate {
    /// One or more balanced partitions carrying the merged records.
    Partitions(Vec<Partition>),
    /// Too few records remain to stand alone; the caller should fold them
    /// into a sibling. Carries the full merged record sequence.
    Underflow(Vec<(Key, Record)>),
    /// Every record was deleted.
    Empty,
}

impl Partition {
    /// Builds and persists a partition from a sorted record sequence.
    ///
    /// Records are split into family fragments, each family's tablet is
    /// stored as its own block, and the bloom filter is sized for the
    /// partition limit so it keeps its false-positive target across
    /// later growth.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Corrupt`] when `records` is empty, unsorted, or
    /// longer than the partition limit.
    pub fn build(
        store: &NodeStore,
        params: &TableParams,
        records: &[(Key, Record)],
    ) -> Result<Partition> {
        if records.is_empty() {
            return Err(TreeError::Corrupt(
                "cannot build a partition from zero records".to_string(),
            ));
        }
        if records.len() > params.partition_limit {
            return Err(TreeError::Corrupt(format!(
                "{} records exceed the partition limit {}",
                records.len(),
                params.partition_limit
            )));
        }
        for pair in records.windows(2) {
            if pair[0].0 >= pair[1].0 {
                return Err(TreeError::Corrupt(
                    "partition records must be strictly ascending by key".to_string(),
                ));
            }
        }

        let expected = params.partition_limit.max(records.len());
        let mut bloom = BloomFilter::new(expected, BLOOM_FPR);

        // Gather per-family tablet contents. The base map gets every key,
        // even when all of a record's fields live in families.
        let mut family_maps: BTreeMap<String, BTreeMap<Key, Record>> = BTreeMap::new();
        for (key, record) in records {
            bloom.insert(key);
            let mut fragments = split_families(record, &params.families);
            let base = fragments.remove(BASE_FAMILY).unwrap_or_default();
            family_maps
                .entry(BASE_FAMILY.to_string())
                .or_default()
                .insert(key.clone(), base);
            for (family, fragment) in fragments {
                family_maps
                    .entry(family)
                    .or_default()
                    .insert(key.clone(), fragment);
            }
        }

        let mut tablets = BTreeMap::new();
        let mut size = 0u64;
        for (family, map) in family_maps {
            let link = store.put_node(Node::Tablet(Tablet::from_records(map)))?;
            size += link.reachable_size.unwrap_or(0);
            tablets.insert(family, link);
        }

        Ok(Partition {
            first_key: records[0].0.clone(),
            last_key: records[records.len() - 1].0.clone(),
            record_count: records.len() as u64,
            size,
            bloom,
            tablets,
            membership_count: records.len() as u64,
        })
    }

    /// Builds as many balanced partitions as the record count requires.
    ///
    /// `records` may exceed the partition limit; they are chunked into
    /// `ceil(n / limit)` contiguous groups with earlier groups taking any
    /// remainder, so sizes never differ by more than one.
    pub fn build_chunked(
        store: &NodeStore,
        params: &TableParams,
        records: Vec<(Key, Record)>,
    ) -> Result<Vec<Partition>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let mut partitions = Vec::new();
        for chunk in balanced_chunks(&records, params.partition_limit) {
            partitions.push(Partition::build(store, params, chunk)?);
        }
        Ok(partitions)
    }

    /// Whether this partition's key range intersects `[min, max]`.
    pub fn intersects(&self, min: Option<&[u8]>, max: Option<&[u8]>) -> bool {
        let above_min = match min {
            Some(min) => self.last_key.as_slice() >= min,
            None => true,
        };
        let below_max = match max {
            Some(max) => self.first_key.as_slice() <= max,
            None => true,
        };
        above_min && below_max
    }

    /// Reads every record, optionally projected to `fields`.
    ///
    /// With a projection, only the base tablet and the family tablets whose
    /// declared fields intersect the request are loaded.
    pub fn read_all(
        &self,
        store: &NodeStore,
        params: &TableParams,
        fields: Option<&BTreeSet<String>>,
    ) -> Result<Vec<(Key, Record)>> {
        self.read_range(store, params, None, None, fields)
    }

    /// Reads the requested keys in ascending order, skipping keys the bloom
    /// filter rules out before any tablet is loaded.
    pub fn read_batch(
        &self,
        store: &NodeStore,
        params: &TableParams,
        keys: &[Key],
        fields: Option<&BTreeSet<String>>,
    ) -> Result<Vec<(Key, Record)>> {
        let candidates: Vec<&[u8]> = keys
            .iter()
            .map(Vec::as_slice)
            .filter(|k| {
                *k >= self.first_key.as_slice()
                    && *k <= self.last_key.as_slice()
                    && self.bloom.may_contain(k)
            })
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut merged: BTreeMap<Key, Record> = BTreeMap::new();
        for (_, link) in self.selected_tablets(params, fields) {
            let node = store.get_node(&link.hash)?;
            let tablet = node.as_tablet()?;
            for (key, fragment) in tablet.read_batch(candidates.iter().copied()) {
                match merged.get_mut(&key) {
                    // families are disjoint, so merge order does not matter
                    Some(record) => *record = merge_fields(record, &fragment),
                    None => {
                        merged.insert(key, fragment);
                    }
                }
            }
        }

        Ok(finish_records(merged, fields))
    }

    /// Reads the records with keys in `[min, max]`, optionally projected.
    pub fn read_range(
        &self,
        store: &NodeStore,
        params: &TableParams,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
        fields: Option<&BTreeSet<String>>,
    ) -> Result<Vec<(Key, Record)>> {
        if !self.intersects(min, max) {
            return Ok(Vec::new());
        }

        let mut merged: BTreeMap<Key, Record> = BTreeMap::new();
        for (_, link) in self.selected_tablets(params, fields) {
            let node = store.get_node(&link.hash)?;
            let tablet = node.as_tablet()?;
            for (key, fragment) in tablet.read_range(min, max) {
                match merged.get_mut(key) {
                    Some(record) => *record = merge_fields(record, fragment),
                    None => {
                        merged.insert(key.clone(), fragment.clone());
                    }
                }
            }
        }

        Ok(finish_records(merged, fields))
    }

    /// Applies sorted changes, rebuilding this partition into its successors.
    ///
    /// The merged record count decides the shape of the result: zero records
    /// yield [`PartitionUpdate::Empty`], fewer than half the partition limit
    /// yield [`PartitionUpdate::Underflow`] with the records for the caller
    /// to re-home, and anything else yields one or more balanced partitions
    /// (splitting when the limit is exceeded, left halves taking the extra
    /// record on odd counts).
    pub fn update(
        &self,
        store: &NodeStore,
        params: &TableParams,
        changes: &[(Key, Change)],
    ) -> Result<PartitionUpdate> {
        let base = self.read_all(store, params, None)?;
        let merged = apply_changes(
            base,
            changes.iter().map(|(k, c)| (k.clone(), c.clone())),
            false,
        );

        if merged.is_empty() {
            debug!(
                first = ?self.first_key,
                "partition emptied by update"
            );
            return Ok(PartitionUpdate::Empty);
        }
        if merged.len() < params.partition_underflow() {
            debug!(
                remaining = merged.len(),
                limit = params.partition_limit,
                "partition under-full after update"
            );
            return Ok(PartitionUpdate::Underflow(merged));
        }

        let partitions = Partition::build_chunked(store, params, merged)?;
        if partitions.len() > 1 {
            debug!(parts = partitions.len(), "partition split after update");
        }
        Ok(PartitionUpdate::Partitions(partitions))
    }

    /// The tablets a read touching `fields` must load: the base tablet plus
    /// every present family whose declared fields intersect the request.
    fn selected_tablets<'a>(
        &'a self,
        params: &TableParams,
        fields: Option<&BTreeSet<String>>,
    ) -> Vec<(&'a str, &'a Link)> {
        self.tablets
            .iter()
            .filter(|(family, _)| match (fields, family.as_str()) {
                (_, BASE_FAMILY) => true,
                (None, _) => true,
                (Some(wanted), family) => params
                    .families
                    .get(family)
                    .map(|members| members.intersection(wanted).next().is_some())
                    .unwrap_or(false),
            })
            .map(|(family, link)| (family.as_str(), link))
            .collect()
    }
}

/// Applies the optional projection and flattens the merge map.
fn finish_records(
    merged: BTreeMap<Key, Record>,
    fields: Option<&BTreeSet<String>>,
) -> Vec<(Key, Record)> {
    merged
        .into_iter()
        .map(|(key, record)| match fields {
            Some(wanted) => (key, project(&record, wanted)),
            None => (key, record),
        })
        .collect()
}

/// Splits `records` into `ceil(n / limit)` contiguous chunks whose sizes
/// differ by at most one, earlier chunks taking the extra.
fn balanced_chunks<'a>(
    records: &'a [(Key, Record)],
    limit: usize,
) -> impl Iterator<Item = &'a [(Key, Record)]> {
    let n = records.len();
    let parts = n.div_ceil(limit).max(1);
    let base = n / parts;
    let extra = n % parts;
    let mut offset = 0;
    (0..parts).map(move |i| {
        let len = if i < extra { base + 1 } else { base };
        let chunk = &records[offset..offset + len];
        offset += len;
        chunk
    })
}
