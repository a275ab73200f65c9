//! The closed set of node types stored in blocks.
//!
//! Every block in a MerkleDB DAG decodes to exactly one [`Node`] variant,
//! dispatched on the `type` attribute of the CBOR map. The set is closed by
//! design: adding a variant is a breaking codec change shipped via the block
//! format version.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use config::TableParams;
use serde::{Deserialize, Serialize};
use store::Link;

use crate::index::{DataNode, IndexNode};
use crate::partition::Partition;
use crate::patch::Patch;
use crate::record::Record;
use crate::tablet::Tablet;
use crate::{Result, TreeError};

/// A decoded block: one of the six node layouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Node {
    /// A database root naming its tables.
    Database(DatabaseRoot),
    /// A table root: parameters plus data/patch links.
    Table(TableRoot),
    /// A B+-tree branch node.
    Index(IndexNode),
    /// A data-tree leaf grouping tablets.
    Partition(Partition),
    /// A sorted key→record block.
    Tablet(Tablet),
    /// A buffered change overlay.
    Patch(Patch),
}

impl Node {
    /// The `type` tag this node serializes under.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Database(_) => "database",
            Node::Table(_) => "table",
            Node::Index(_) => "index",
            Node::Partition(_) => "partition",
            Node::Tablet(_) => "tablet",
            Node::Patch(_) => "patch",
        }
    }

    /// Borrows the tablet payload.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Corrupt`] when the node is of another kind —
    /// a link pointed at the wrong type of block.
    pub fn as_tablet(&self) -> Result<&Tablet> {
        match self {
            Node::Tablet(t) => Ok(t),
            other => Err(wrong_kind("tablet", other)),
        }
    }

    /// Borrows the partition payload.
    pub fn as_partition(&self) -> Result<&Partition> {
        match self {
            Node::Partition(p) => Ok(p),
            other => Err(wrong_kind("partition", other)),
        }
    }

    /// Borrows the index payload.
    pub fn as_index(&self) -> Result<&IndexNode> {
        match self {
            Node::Index(n) => Ok(n),
            other => Err(wrong_kind("index", other)),
        }
    }

    /// Borrows the patch payload.
    pub fn as_patch(&self) -> Result<&Patch> {
        match self {
            Node::Patch(p) => Ok(p),
            other => Err(wrong_kind("patch", other)),
        }
    }

    /// Borrows the table-root payload.
    pub fn as_table(&self) -> Result<&TableRoot> {
        match self {
            Node::Table(t) => Ok(t),
            other => Err(wrong_kind("table", other)),
        }
    }

    /// Borrows the database-root payload.
    pub fn as_database(&self) -> Result<&DatabaseRoot> {
        match self {
            Node::Database(d) => Ok(d),
            other => Err(wrong_kind("database", other)),
        }
    }

    /// Converts a data-tree node (index or partition) into a [`DataNode`].
    pub fn into_data(self) -> Result<DataNode> {
        match self {
            Node::Index(n) => Ok(DataNode::Index(n)),
            Node::Partition(p) => Ok(DataNode::Partition(p)),
            other => Err(wrong_kind("index or partition", &other)),
        }
    }
}

fn wrong_kind(expected: &str, found: &Node) -> TreeError {
    TreeError::Corrupt(format!(
        "expected a {} node, found {}",
        expected,
        found.kind()
    ))
}

impl From<DataNode> for Node {
    fn from(data: DataNode) -> Self {
        match data {
            DataNode::Index(n) => Node::Index(n),
            DataNode::Partition(p) => Node::Partition(p),
        }
    }
}

/// The root node of a table: parameters, the data-tree link, the patch
/// link, and aggregate statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableRoot {
    /// Link to the data tree — an index node, or a lone partition, or
    /// nothing for an empty table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Link>,
    /// Link to the buffered patch, when one is persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<Link>,
    /// The table parameters, embedded verbatim.
    #[serde(flatten)]
    pub params: TableParams,
    /// Total records in the data tree (the patch is not counted).
    pub record_count: u64,
    /// Total bytes reachable through `data`.
    pub size: u64,
    /// Free-form table metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Record,
}

/// The root node of a database: a name→table mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatabaseRoot {
    /// Table roots by name.
    pub tables: BTreeMap<String, Link>,
    /// When this version of the database was produced.
    pub updated_at: DateTime<Utc>,
    /// Free-form database metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Record,
}
