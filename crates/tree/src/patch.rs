//! Patches: sorted change overlays buffered at the table root.
//!
//! A patch is a small, sorted set of pending changes — full records or
//! tombstones — persisted as one block so that small writes don't rewrite
//! the partition tree. Reads overlay the patch on the tree stream; once the
//! patch outgrows its limit the table applies it to the tree in one pass.

use std::collections::BTreeMap;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::record::{apply_change, Change, Key, Record};

/// An immutable sorted sequence of `(key, change)` entries.
///
/// Each key appears at most once; a tombstone entry erases any value for
/// that key in the layers beneath it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Patch {
    #[serde(with = "crate::wire::byte_pairs")]
    changes: BTreeMap<Key, Change>,
}

impl Patch {
    /// Builds a patch from staged changes.
    pub fn from_changes(changes: BTreeMap<Key, Change>) -> Self {
        Self { changes }
    }

    /// Number of buffered changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether the patch holds no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// The change staged for `key`, if any.
    pub fn get(&self, key: &[u8]) -> Option<&Change> {
        self.changes.get(key)
    }

    /// The changes with keys in `[min, max]` (inclusive; `None` =
    /// unbounded), in ascending key order.
    pub fn changes_in_range(
        &self,
        min: Option<&[u8]>,
        max: Option<&[u8]>,
    ) -> impl DoubleEndedIterator<Item = (&Key, &Change)> {
        let (lower, upper) = match (min, max) {
            // canonical empty window for inverted bounds
            (Some(min), Some(max)) if min > max => (
                Bound::Included(min.to_vec()),
                Bound::Excluded(min.to_vec()),
            ),
            _ => (
                match min {
                    Some(k) => Bound::Included(k.to_vec()),
                    None => Bound::Unbounded,
                },
                match max {
                    Some(k) => Bound::Included(k.to_vec()),
                    None => Bound::Unbounded,
                },
            ),
        };
        self.changes.range((lower, upper))
    }

    /// All changes in ascending key order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&Key, &Change)> {
        self.changes.iter()
    }

    /// Consumes the patch into its change map.
    pub fn into_changes(self) -> BTreeMap<Key, Change> {
        self.changes
    }
}

/// Overlays sorted `changes` onto a sorted `base` record stream.
///
/// Both inputs must be ascending by key (descending when `descending` is
/// set), and the output preserves that order. For coinciding keys a
/// tombstone drops the base record and a record change merges field-wise
/// over it; change-only keys surface as inserts (tombstones for absent keys
/// are no-ops).
pub fn apply_changes<B, C>(base: B, changes: C, descending: bool) -> Vec<(Key, Record)>
where
    B: IntoIterator<Item = (Key, Record)>,
    C: IntoIterator<Item = (Key, Change)>,
{
    let mut base = base.into_iter().peekable();
    let mut changes = changes.into_iter().peekable();
    let mut merged = Vec::new();

    // true when `a` is emitted before `b` in the requested direction
    let before = |a: &[u8], b: &[u8]| if descending { a > b } else { a < b };

    loop {
        let take_base = match (base.peek(), changes.peek()) {
            (None, None) => break,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some((bk, _)), Some((ck, _))) => before(bk, ck),
        };

        if take_base {
            let (key, record) = base.next().expect("peeked base entry");
            merged.push((key, record));
            continue;
        }

        let (key, change) = changes.next().expect("peeked change entry");
        let coincides = base.peek().map_or(false, |(bk, _)| *bk == key);
        let current = if coincides {
            base.next().map(|(_, record)| record)
        } else {
            None
        };
        if let Some(record) = apply_change(current, &change) {
            merged.push((key, record));
        }
    }

    merged
}
