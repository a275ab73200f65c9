//! Tablets: the sorted leaf blocks records live in.
//!
//! A tablet is an ordered map from key to record — nothing more. Partitions
//! stack one base tablet (every key) with optional family tablets (field
//! subsets); tablets themselves know nothing about families or blooms.
//!
//! All mutating operations are pure: they return a new tablet and leave the
//! receiver untouched, matching the copy-on-write lifecycle of every block.
//! Operations that can empty a tablet return `Option<Tablet>`; an absent
//! tablet is the caller's signal to drop the block entirely.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::record::{merge_fields, Key, Record};
use crate::{Result, TreeError};

/// An immutable ordered mapping of keys to records.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Tablet {
    #[serde(with = "crate::wire::byte_map")]
    records: BTreeMap<Key, Record>,
}

/// Builds inclusive range bounds from optional endpoints. An inverted pair
/// (`min > max`) yields a canonical empty window rather than a panicking
/// `BTreeMap` range.
fn bounds(min: Option<&[u8]>, max: Option<&[u8]>) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return (Bound::Included(min.to_vec()), Bound::Excluded(min.to_vec()));
        }
    }
    let lower = match min {
        Some(k) => Bound::Included(k.to_vec()),
        None => Bound::Unbounded,
    };
    let upper = match max {
        Some(k) => Bound::Included(k.to_vec()),
        None => Bound::Unbounded,
    };
    (lower, upper)
}

impl Tablet {
    /// Builds a tablet from a key→record map.
    pub fn from_records(records: BTreeMap<Key, Record>) -> Self {
        Self { records }
    }

    /// Number of keys present.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the tablet holds no keys.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The smallest key present.
    pub fn first_key(&self) -> Option<&[u8]> {
        self.records.keys().next().map(Vec::as_slice)
    }

    /// The largest key present.
    pub fn last_key(&self) -> Option<&[u8]> {
        self.records.keys().next_back().map(Vec::as_slice)
    }

    /// The `i`-th key in ascending order.
    pub fn nth_key(&self, i: usize) -> Option<&[u8]> {
        self.records.keys().nth(i).map(Vec::as_slice)
    }

    /// All entries in ascending key order.
    pub fn read_all(&self) -> impl DoubleEndedIterator<Item = (&Key, &Record)> {
        self.records.iter()
    }

    /// The entries for the requested keys, in ascending key order.
    pub fn read_batch<'a, I>(&self, keys: I) -> Vec<(Key, Record)>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut wanted: Vec<&[u8]> = keys.into_iter().collect();
        wanted.sort_unstable();
        wanted.dedup();
        wanted
            .into_iter()
            .filter_map(|k| self.records.get_key_value(k))
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect()
    }

    /// The entries within `[min, max]` (inclusive; `None` = unbounded), in
    /// ascending key order.
    pub fn read_range(
        &self,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
    ) -> impl DoubleEndedIterator<Item = (&Key, &Record)> {
        self.records.range(bounds(min, max))
    }

    /// Returns a tablet with `updates` merged in. New field values override
    /// old ones for coinciding keys; fields absent from the update survive.
    pub fn insert_records(&self, updates: BTreeMap<Key, Record>) -> Tablet {
        let mut records = self.records.clone();
        for (key, update) in updates {
            match records.get_mut(&key) {
                Some(existing) => *existing = merge_fields(existing, &update),
                None => {
                    records.insert(key, update);
                }
            }
        }
        Tablet { records }
    }

    /// Returns a tablet without the given keys, or `None` when nothing
    /// remains.
    pub fn remove_batch<'a, I>(&self, keys: I) -> Option<Tablet>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let doomed: BTreeSet<&[u8]> = keys.into_iter().collect();
        let records: BTreeMap<Key, Record> = self
            .records
            .iter()
            .filter(|(k, _)| !doomed.contains(k.as_slice()))
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect();
        if records.is_empty() {
            None
        } else {
            Some(Tablet { records })
        }
    }

    /// Returns a tablet without the keys in `[min, max]`, or `None` when
    /// nothing remains.
    pub fn remove_range(&self, min: Option<&[u8]>, max: Option<&[u8]>) -> Option<Tablet> {
        let range = bounds(min, max);
        let records: BTreeMap<Key, Record> = self
            .records
            .iter()
            .filter(|(k, _)| !range_contains(&range, k.as_slice()))
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect();
        if records.is_empty() {
            None
        } else {
            Some(Tablet { records })
        }
    }

    /// Drops keys whose record holds no fields, or `None` when nothing
    /// remains. Family tablets use this after updates clear their fields.
    pub fn prune(&self) -> Option<Tablet> {
        let records: BTreeMap<Key, Record> = self
            .records
            .iter()
            .filter(|(_, r)| !r.is_empty())
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect();
        if records.is_empty() {
            None
        } else {
            Some(Tablet { records })
        }
    }

    /// Every field name appearing in any record.
    pub fn fields_present(&self) -> BTreeSet<String> {
        self.records
            .values()
            .flat_map(|r| r.keys().cloned())
            .collect()
    }

    /// Splits at `key`: the left tablet takes keys strictly below it, the
    /// right takes keys at or above it.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Corrupt`] when `key` equals an existing key or
    /// falls outside the tablet's key range — either would produce an
    /// empty side.
    pub fn split(&self, key: &[u8]) -> Result<(Tablet, Tablet)> {
        if self.records.contains_key(key) {
            return Err(TreeError::Corrupt(format!(
                "tablet split key {:?} matches an existing key",
                key
            )));
        }
        match (self.first_key(), self.last_key()) {
            (Some(first), Some(last)) if key > first && key < last => {}
            _ => {
                return Err(TreeError::Corrupt(format!(
                    "tablet split key {:?} outside key range",
                    key
                )))
            }
        }

        let left: BTreeMap<Key, Record> = self
            .records
            .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key)))
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect();
        let right: BTreeMap<Key, Record> = self
            .records
            .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect();
        Ok((Tablet { records: left }, Tablet { records: right }))
    }

    /// Joins two tablets whose key ranges do not interleave.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Corrupt`] unless every key of `left` is below
    /// every key of `right`.
    pub fn join(left: &Tablet, right: &Tablet) -> Result<Tablet> {
        match (left.last_key(), right.first_key()) {
            (Some(l), Some(r)) if l < r => {}
            (None, _) | (_, None) => {
                return Ok(if left.is_empty() {
                    right.clone()
                } else {
                    left.clone()
                })
            }
            _ => {
                return Err(TreeError::Corrupt(
                    "tablet join requires left keys below right keys".to_string(),
                ))
            }
        }
        let mut records = left.records.clone();
        records.extend(right.records.iter().map(|(k, r)| (k.clone(), r.clone())));
        Ok(Tablet { records })
    }
}

fn range_contains(range: &(Bound<Vec<u8>>, Bound<Vec<u8>>), key: &[u8]) -> bool {
    let lower_ok = match &range.0 {
        Bound::Included(min) => key >= min.as_slice(),
        Bound::Excluded(min) => key > min.as_slice(),
        Bound::Unbounded => true,
    };
    let upper_ok = match &range.1 {
        Bound::Included(max) => key <= max.as_slice(),
        Bound::Excluded(max) => key < max.as_slice(),
        Bound::Unbounded => true,
    };
    lower_ok && upper_ok
}
