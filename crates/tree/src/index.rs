//! The B+-tree over partitions: build, range search, copy-on-write update.
//!
//! Index nodes route by key range. Each child reference carries the child's
//! key bounds, record count, and size, so routing, rank arithmetic, and
//! range pruning never load a child block.
//!
//! ## Update algorithm
//!
//! [`update_tree`] walks the tree in key order, routing each sorted change
//! to the child whose range contains its key (keys falling between two
//! children go left, so inserts extend the left sibling's range). Children
//! with no changes keep their existing blocks — that is where structural
//! sharing comes from. Updated children come back as zero or more
//! replacement subtrees and are spliced into the child list:
//!
//! - a partition that outgrew the limit returns balanced splits;
//! - an emptied subtree disappears;
//! - an under-full partition returns its raw records, which fold into the
//!   next sibling (or the previous one, at the right edge);
//! - an under-full index node is merged with an adjacent sibling's
//!   children, re-splitting if the combined list overflows.
//!
//! A node ending up beyond the fan-out splits; the root collapses while it
//! has exactly one child. Counts and sizes are recomputed exactly at every
//! rebuilt node on the way up.

use config::TableParams;
use serde::{Deserialize, Serialize};
use store::Link;
use tracing::debug;

use crate::cache::NodeStore;
use crate::node::Node;
use crate::partition::{Partition, PartitionUpdate};
use crate::record::{merge_change, Change, Key, Record};
use crate::{Result, TreeError};

/// A parent's view of one child subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChildRef {
    /// Smallest key in the child subtree.
    #[serde(with = "serde_bytes")]
    pub first_key: Vec<u8>,
    /// Largest key in the child subtree.
    #[serde(with = "serde_bytes")]
    pub last_key: Vec<u8>,
    /// Records in the child subtree.
    pub record_count: u64,
    /// Bytes reachable through the child subtree.
    pub size: u64,
    /// The child block.
    pub link: Link,
}

/// A B+-tree branch node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IndexNode {
    /// Distance to the partitions below: height 1 children are partitions.
    pub height: u32,
    /// Sum of the children's record counts.
    pub record_count: u64,
    /// Sum of the children's sizes.
    pub size: u64,
    /// Smallest key in the subtree (= first child's first key).
    #[serde(with = "serde_bytes")]
    pub first_key: Vec<u8>,
    /// Largest key in the subtree (= last child's last key).
    #[serde(with = "serde_bytes")]
    pub last_key: Vec<u8>,
    /// Ordered, non-overlapping children.
    pub children: Vec<ChildRef>,
}

impl IndexNode {
    /// Assembles a node of the given height from ordered children,
    /// recomputing every aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Corrupt`] when `children` is empty or the child
    /// ranges are out of order or overlapping.
    pub fn from_children(height: u32, children: Vec<ChildRef>) -> Result<IndexNode> {
        let (first, last) = match (children.first(), children.last()) {
            (Some(first), Some(last)) => (first.first_key.clone(), last.last_key.clone()),
            _ => {
                return Err(TreeError::Corrupt(
                    "index node needs at least one child".to_string(),
                ))
            }
        };
        for pair in children.windows(2) {
            if pair[0].last_key >= pair[1].first_key {
                return Err(TreeError::Corrupt(
                    "index children overlap or are out of order".to_string(),
                ));
            }
        }
        Ok(IndexNode {
            height,
            record_count: children.iter().map(|c| c.record_count).sum(),
            size: children.iter().map(|c| c.size).sum(),
            first_key: first,
            last_key: last,
            children,
        })
    }

    /// Checks the invariants a loaded index node must satisfy.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Corrupt`] on any violation; the enclosing
    /// operation aborts without persisting anything.
    pub fn validate(&self) -> Result<()> {
        if self.height == 0 {
            return Err(TreeError::Corrupt("index node has height 0".to_string()));
        }
        if self.children.is_empty() {
            return Err(TreeError::Corrupt("index node has no children".to_string()));
        }
        for pair in self.children.windows(2) {
            if pair[0].last_key >= pair[1].first_key {
                return Err(TreeError::Corrupt(
                    "index children overlap or are out of order".to_string(),
                ));
            }
        }
        let count: u64 = self.children.iter().map(|c| c.record_count).sum();
        if count != self.record_count {
            return Err(TreeError::Corrupt(format!(
                "index record count {} disagrees with child sum {}",
                self.record_count, count
            )));
        }
        if self.first_key != self.children[0].first_key
            || self.last_key != self.children[self.children.len() - 1].last_key
        {
            return Err(TreeError::Corrupt(
                "index key bounds disagree with child bounds".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether this node's key range intersects `[min, max]`.
    fn intersects(&self, min: Option<&[u8]>, max: Option<&[u8]>) -> bool {
        range_intersects(&self.first_key, &self.last_key, min, max)
    }
}

fn range_intersects(
    first: &[u8],
    last: &[u8],
    min: Option<&[u8]>,
    max: Option<&[u8]>,
) -> bool {
    min.map_or(true, |min| last >= min) && max.map_or(true, |max| first <= max)
}

/// A node of the data tree: a partition at the leaves, an index node above.
#[derive(Debug, Clone, PartialEq)]
pub enum DataNode {
    /// A leaf: height 0.
    Partition(Partition),
    /// A branch: height >= 1.
    Index(IndexNode),
}

impl DataNode {
    /// Height above the partition level.
    pub fn height(&self) -> u32 {
        match self {
            DataNode::Partition(_) => 0,
            DataNode::Index(n) => n.height,
        }
    }

    /// Records in this subtree.
    pub fn record_count(&self) -> u64 {
        match self {
            DataNode::Partition(p) => p.record_count,
            DataNode::Index(n) => n.record_count,
        }
    }

    /// Bytes reachable through this subtree.
    pub fn size(&self) -> u64 {
        match self {
            DataNode::Partition(p) => p.size,
            DataNode::Index(n) => n.size,
        }
    }

    /// Smallest key in this subtree.
    pub fn first_key(&self) -> &[u8] {
        match self {
            DataNode::Partition(p) => &p.first_key,
            DataNode::Index(n) => &n.first_key,
        }
    }

    /// Largest key in this subtree.
    pub fn last_key(&self) -> &[u8] {
        match self {
            DataNode::Partition(p) => &p.last_key,
            DataNode::Index(n) => &n.last_key,
        }
    }
}

/// Builds a balanced tree over a flat ordered partition sequence.
///
/// Returns `None` for zero partitions and the bare partition for one (no
/// index node is created until there is something to route between).
pub fn build(
    store: &NodeStore,
    params: &TableParams,
    partitions: Vec<Partition>,
) -> Result<Option<DataNode>> {
    if partitions.is_empty() {
        return Ok(None);
    }
    let nodes = partitions.into_iter().map(DataNode::Partition).collect();
    Ok(Some(group_into_root(store, params, nodes)?))
}

/// Collects the links of every partition whose key range intersects
/// `[min, max]`, in key order. Only index nodes are loaded on the way.
pub fn find_partition_links(
    store: &NodeStore,
    root: &Link,
    min: Option<&[u8]>,
    max: Option<&[u8]>,
) -> Result<Vec<Link>> {
    let node = store.get_node(&root.hash)?;
    match &*node {
        Node::Partition(p) => Ok(if p.intersects(min, max) {
            vec![*root]
        } else {
            Vec::new()
        }),
        Node::Index(idx) => {
            idx.validate()?;
            let mut links = Vec::new();
            collect_links(store, idx, min, max, &mut links)?;
            Ok(links)
        }
        other => Err(TreeError::Corrupt(format!(
            "data link points at a {} node",
            other.kind()
        ))),
    }
}

fn collect_links(
    store: &NodeStore,
    idx: &IndexNode,
    min: Option<&[u8]>,
    max: Option<&[u8]>,
    links: &mut Vec<Link>,
) -> Result<()> {
    if !idx.intersects(min, max) {
        return Ok(());
    }
    for child in &idx.children {
        if !range_intersects(&child.first_key, &child.last_key, min, max) {
            continue;
        }
        if idx.height == 1 {
            links.push(child.link);
        } else {
            let node = store.get_node(&child.link.hash)?;
            let sub = node.as_index()?;
            sub.validate()?;
            collect_links(store, sub, min, max, links)?;
        }
    }
    Ok(())
}

/// Applies sorted changes to the tree rooted at `root`, returning the new
/// root (or `None` when every record is gone).
///
/// Untouched subtrees are reused by reference; everything rebuilt is
/// persisted except the returned root itself, which the caller links in.
pub fn update_tree(
    store: &NodeStore,
    params: &TableParams,
    root: &Link,
    changes: &[(Key, Change)],
) -> Result<Option<DataNode>> {
    let node = store.get_data(root)?;
    if changes.is_empty() {
        return Ok(Some(node));
    }

    match update_subtree(store, params, node, changes)? {
        UpdateOutcome::Gone => Ok(None),
        UpdateOutcome::Remnant(records) => {
            // The whole tree shrank below a partition's underflow bound;
            // a single (legitimately small) root partition remains.
            Ok(Some(DataNode::Partition(Partition::build(
                store, params, &records,
            )?)))
        }
        UpdateOutcome::Replaced(mut nodes) => {
            let mut new_root = if nodes.len() == 1 {
                nodes.remove(0)
            } else {
                debug!(roots = nodes.len(), "root split, growing a level");
                group_into_root(store, params, nodes)?
            };

            // Collapse while the root routes to a single child.
            loop {
                let lone_child = match &new_root {
                    DataNode::Index(idx) if idx.children.len() == 1 => {
                        debug!(height = idx.height, "collapsing single-child root");
                        idx.children[0].link
                    }
                    _ => break,
                };
                new_root = store.get_data(&lone_child)?;
            }
            Ok(Some(new_root))
        }
    }
}

/// The possible shapes an updated subtree comes back in.
enum UpdateOutcome {
    /// Same-height replacements (splits included), in key order.
    Replaced(Vec<DataNode>),
    /// Too few records to stand alone; the parent folds them into a sibling.
    Remnant(Vec<(Key, Record)>),
    /// The subtree emptied out.
    Gone,
}

/// One position in a parent's rebuilt child list.
enum Slot {
    /// An untouched child, kept by reference.
    Keep(ChildRef),
    /// A rebuilt child awaiting persistence.
    New(DataNode),
}

fn update_subtree(
    store: &NodeStore,
    params: &TableParams,
    node: DataNode,
    changes: &[(Key, Change)],
) -> Result<UpdateOutcome> {
    match node {
        DataNode::Partition(p) => Ok(match p.update(store, params, changes)? {
            PartitionUpdate::Partitions(parts) => {
                UpdateOutcome::Replaced(parts.into_iter().map(DataNode::Partition).collect())
            }
            PartitionUpdate::Underflow(records) => UpdateOutcome::Remnant(records),
            PartitionUpdate::Empty => UpdateOutcome::Gone,
        }),
        DataNode::Index(idx) => update_index(store, params, idx, changes),
    }
}

fn update_index(
    store: &NodeStore,
    params: &TableParams,
    idx: IndexNode,
    changes: &[(Key, Change)],
) -> Result<UpdateOutcome> {
    // Every entry point funnels through here, so this is where loaded
    // branch nodes get their invariants checked before anything recurses.
    idx.validate()?;

    let routed = route_changes(&idx.children, changes);
    let last = idx.children.len() - 1;

    let mut slots: Vec<Slot> = Vec::new();
    // Remnant records waiting to fold into the next sibling's changes.
    let mut carry: Vec<(Key, Record)> = Vec::new();

    for (i, (child, mut child_changes)) in idx.children.iter().zip(routed).enumerate() {
        if !carry.is_empty() {
            let inserts = carry
                .drain(..)
                .map(|(k, r)| (k, Some(r)))
                .collect::<Vec<_>>();
            child_changes = merge_sorted_changes(inserts, child_changes);
        }
        if child_changes.is_empty() {
            slots.push(Slot::Keep(child.clone()));
            continue;
        }

        let child_node = store.get_data(&child.link)?;
        if child_node.height() + 1 != idx.height {
            return Err(TreeError::Corrupt(format!(
                "child height {} under index of height {}",
                child_node.height(),
                idx.height
            )));
        }

        match update_subtree(store, params, child_node, &child_changes)? {
            UpdateOutcome::Replaced(nodes) => slots.extend(nodes.into_iter().map(Slot::New)),
            UpdateOutcome::Gone => {}
            UpdateOutcome::Remnant(records) => {
                if i < last {
                    carry = records;
                } else if let Some(leftover) =
                    fold_remnant_left(store, params, &mut slots, records)?
                {
                    return Ok(UpdateOutcome::Remnant(leftover));
                }
            }
        }
    }
    // `carry` only survives an iteration when a later child exists, so it is
    // always drained by the time the loop ends.

    if idx.height >= 2 {
        repair_thin(store, params, &mut slots)?;
    }

    let refs = resolve_children(store, slots)?;
    if refs.is_empty() {
        return Ok(UpdateOutcome::Gone);
    }
    if refs.len() > params.fan_out {
        debug!(
            children = refs.len(),
            fan_out = params.fan_out,
            "index node overflow, splitting"
        );
        let mut nodes = Vec::new();
        for chunk in balanced_ref_chunks(refs, params.fan_out) {
            nodes.push(DataNode::Index(IndexNode::from_children(idx.height, chunk)?));
        }
        return Ok(UpdateOutcome::Replaced(nodes));
    }
    Ok(UpdateOutcome::Replaced(vec![DataNode::Index(
        IndexNode::from_children(idx.height, refs)?,
    )]))
}

/// Routes each change to the child claiming its key: the last child whose
/// first key is at or below it, or the first child for keys below the whole
/// range. Keys falling in the gap between two children therefore go left.
fn route_changes(
    children: &[ChildRef],
    changes: &[(Key, Change)],
) -> Vec<Vec<(Key, Change)>> {
    let mut routed: Vec<Vec<(Key, Change)>> = children.iter().map(|_| Vec::new()).collect();
    for (key, change) in changes {
        let at = children
            .partition_point(|c| c.first_key.as_slice() <= key.as_slice())
            .saturating_sub(1);
        routed[at].push((key.clone(), change.clone()));
    }
    routed
}

/// Merges two sorted change lists; where a key appears in both, the second
/// list's change applies over the first's.
fn merge_sorted_changes(
    a: Vec<(Key, Change)>,
    b: Vec<(Key, Change)>,
) -> Vec<(Key, Change)> {
    enum Take {
        A,
        B,
        Both,
    }

    let mut a = a.into_iter().peekable();
    let mut b = b.into_iter().peekable();
    let mut merged = Vec::new();
    loop {
        let take = match (a.peek(), b.peek()) {
            (None, None) => break,
            (Some(_), None) => Take::A,
            (None, Some(_)) => Take::B,
            (Some((ak, _)), Some((bk, _))) => {
                if ak < bk {
                    Take::A
                } else if bk < ak {
                    Take::B
                } else {
                    Take::Both
                }
            }
        };
        match take {
            Take::A => merged.push(a.next().expect("peeked")),
            Take::B => merged.push(b.next().expect("peeked")),
            Take::Both => {
                let (key, earlier) = a.next().expect("peeked");
                let (_, later) = b.next().expect("peeked");
                merged.push((key, merge_change(Some(&earlier), &later)));
            }
        }
    }
    merged
}

/// Folds remnant records into the rightmost slot able to absorb them.
///
/// Returns leftover records when every slot has been consumed without
/// producing a viable subtree — the whole node is then under-full and the
/// remnant propagates up a level.
fn fold_remnant_left(
    store: &NodeStore,
    params: &TableParams,
    slots: &mut Vec<Slot>,
    records: Vec<(Key, Record)>,
) -> Result<Option<Vec<(Key, Record)>>> {
    let mut records = records;
    while let Some(slot) = slots.pop() {
        let node = match slot {
            Slot::Keep(ref child) => store.get_data(&child.link)?,
            Slot::New(node) => node,
        };
        let inserts: Vec<(Key, Change)> = records
            .iter()
            .map(|(k, r)| (k.clone(), Some(r.clone())))
            .collect();
        match update_subtree(store, params, node, &inserts)? {
            UpdateOutcome::Replaced(nodes) => {
                debug!(absorbed = records.len(), "folded remnant into left sibling");
                slots.extend(nodes.into_iter().map(Slot::New));
                return Ok(None);
            }
            UpdateOutcome::Remnant(merged) => records = merged,
            UpdateOutcome::Gone => {
                return Err(TreeError::Corrupt(
                    "insert-only update emptied a subtree".to_string(),
                ))
            }
        }
    }
    Ok(Some(records))
}

/// Merges under-full index-node slots into an adjacent sibling until every
/// slot satisfies the minimum fill (or only one slot remains).
fn repair_thin(store: &NodeStore, params: &TableParams, slots: &mut Vec<Slot>) -> Result<()> {
    let min = params.min_children();
    let mut i = 0;
    while i < slots.len() {
        let is_thin =
            matches!(&slots[i], Slot::New(DataNode::Index(n)) if n.children.len() < min);
        if !is_thin {
            i += 1;
            continue;
        }
        if slots.len() == 1 {
            // A lone thin node: nothing to merge with. The parent repairs
            // it, or the root collapse swallows it.
            break;
        }

        // Prefer the left neighbor; at the left edge, take the right one.
        let at = if i > 0 { i - 1 } else { i };
        let right = slots.remove(at + 1);
        let left = slots.remove(at);
        let left_node = into_index(store, left)?;
        let right_node = into_index(store, right)?;
        if left_node.height != right_node.height {
            return Err(TreeError::Corrupt(
                "sibling index nodes differ in height".to_string(),
            ));
        }
        let height = left_node.height;
        let mut combined = left_node.children;
        combined.extend(right_node.children);

        if combined.len() <= params.fan_out {
            debug!(children = combined.len(), "merged thin index siblings");
            slots.insert(
                at,
                Slot::New(DataNode::Index(IndexNode::from_children(height, combined)?)),
            );
        } else {
            // Redistribute into two near-equal halves, left taking the extra.
            let right_children = combined.split_off(combined.len().div_ceil(2));
            debug!(
                left = combined.len(),
                right = right_children.len(),
                "rebalanced thin index sibling pair"
            );
            slots.insert(
                at,
                Slot::New(DataNode::Index(IndexNode::from_children(
                    height,
                    right_children,
                )?)),
            );
            slots.insert(
                at,
                Slot::New(DataNode::Index(IndexNode::from_children(height, combined)?)),
            );
        }
        // Re-examine from the merge point: the merged slot can still be
        // thin when both inputs were.
        i = at;
    }
    Ok(())
}

/// Materializes a slot as an index node, loading kept children on demand.
fn into_index(store: &NodeStore, slot: Slot) -> Result<IndexNode> {
    let node = match slot {
        Slot::Keep(child) => store.get_data(&child.link)?,
        Slot::New(node) => node,
    };
    match node {
        DataNode::Index(idx) => Ok(idx),
        DataNode::Partition(_) => Err(TreeError::Corrupt(
            "expected an index node beside an index node".to_string(),
        )),
    }
}

/// Persists rebuilt slots and returns the final child reference list.
fn resolve_children(store: &NodeStore, slots: Vec<Slot>) -> Result<Vec<ChildRef>> {
    slots
        .into_iter()
        .map(|slot| match slot {
            Slot::Keep(child) => Ok(child),
            Slot::New(node) => child_ref(store, node),
        })
        .collect()
}

/// Persists a data node and summarizes it as a child reference.
fn child_ref(store: &NodeStore, node: DataNode) -> Result<ChildRef> {
    let first_key = node.first_key().to_vec();
    let last_key = node.last_key().to_vec();
    let record_count = node.record_count();
    let size = node.size();
    let link = store.put_node(node.into())?;
    Ok(ChildRef {
        first_key,
        last_key,
        record_count,
        size,
        link,
    })
}

/// Reduces same-height nodes to a single root, adding index levels as
/// needed. Every level is grouped into `ceil(n / fan_out)` nodes of
/// near-equal size, so non-root nodes always satisfy the minimum fill.
fn group_into_root(
    store: &NodeStore,
    params: &TableParams,
    nodes: Vec<DataNode>,
) -> Result<DataNode> {
    let mut level = nodes;
    while level.len() > 1 {
        let height = level[0].height() + 1;
        let refs: Vec<ChildRef> = level
            .into_iter()
            .map(|node| child_ref(store, node))
            .collect::<Result<_>>()?;
        let mut next = Vec::new();
        for chunk in balanced_ref_chunks(refs, params.fan_out) {
            next.push(DataNode::Index(IndexNode::from_children(height, chunk)?));
        }
        level = next;
    }
    level
        .pop()
        .ok_or_else(|| TreeError::Corrupt("grouping zero nodes".to_string()))
}

/// Splits `refs` into `ceil(n / limit)` contiguous groups whose sizes differ
/// by at most one, earlier groups taking the extra.
fn balanced_ref_chunks(refs: Vec<ChildRef>, limit: usize) -> Vec<Vec<ChildRef>> {
    let n = refs.len();
    let parts = n.div_ceil(limit).max(1);
    let base = n / parts;
    let extra = n % parts;
    let mut chunks = Vec::with_capacity(parts);
    let mut iter = refs.into_iter();
    for i in 0..parts {
        let len = if i < extra { base + 1 } else { base };
        chunks.push(iter.by_ref().take(len).collect());
    }
    chunks
}
