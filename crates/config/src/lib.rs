//! # Config - Table Parameters & Read Options
//!
//! Tuning knobs for a MerkleDB table. [`TableParams`] is embedded verbatim in
//! the persisted table root node, so every open of the table sees the exact
//! parameters it was written with. [`ScanOptions`] and [`ReadOptions`] are
//! per-call and never persisted.
//!
//! ## Defaults
//!
//! | Parameter         | Default | Meaning                                  |
//! |-------------------|---------|------------------------------------------|
//! | `fan-out`         | 256     | max children per index node              |
//! | `partition-limit` | 1000    | max records per partition                |
//! | `patch-limit`     | 100     | max buffered changes before a tree apply |

use std::collections::{BTreeMap, BTreeSet};

use lexicoder::{Lexicoder, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum number of children per index node.
pub const DEFAULT_FAN_OUT: usize = 256;

/// Default maximum number of records per partition.
pub const DEFAULT_PARTITION_LIMIT: usize = 1000;

/// Default maximum number of buffered patch changes before the patch is
/// applied to the partition tree.
pub const DEFAULT_PATCH_LIMIT: usize = 100;

/// The reserved family name for the tablet holding every record key.
pub const BASE_FAMILY: &str = "base";

/// Errors from validating table parameters.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field was assigned to more than one family.
    #[error("field {0:?} is assigned to more than one family")]
    OverlappingFamilies(String),

    /// A family used the reserved base name.
    #[error("family name {0:?} is reserved")]
    ReservedFamily(String),

    /// A family declared no fields.
    #[error("family {0:?} declares no fields")]
    EmptyFamily(String),

    /// A limit parameter is too small to be workable.
    #[error("{param} must be at least {min}, got {got}")]
    LimitTooSmall {
        /// Name of the offending parameter.
        param: &'static str,
        /// Smallest accepted value.
        min: usize,
        /// The rejected value.
        got: usize,
    },
}

/// The primary key of a table: a single field, or an ordered tuple of fields
/// encoded together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    /// One field holds the key value.
    Field(String),
    /// Several fields combine into a tuple key, in the given order.
    Composite(Vec<String>),
}

impl PrimaryKey {
    /// The field names making up the key, in encoding order.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            PrimaryKey::Field(f) => vec![f.as_str()],
            PrimaryKey::Composite(fs) => fs.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for PrimaryKey {
    fn from(field: &str) -> Self {
        PrimaryKey::Field(field.to_string())
    }
}

/// Immutable parameters of a table, persisted inside its root node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableParams {
    /// Which record field(s) form the primary key.
    pub primary_key: PrimaryKey,
    /// The coder mapping primary-key values to sortable byte keys.
    pub lexicoder: Lexicoder,
    /// Maximum children per index node.
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,
    /// Maximum records per partition.
    #[serde(default = "default_partition_limit")]
    pub partition_limit: usize,
    /// Maximum buffered patch changes before a tree apply.
    #[serde(default = "default_patch_limit")]
    pub patch_limit: usize,
    /// Column families: family name to the set of fields stored in that
    /// family's tablet. Fields not listed anywhere live in the base tablet.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub families: BTreeMap<String, BTreeSet<String>>,
}

fn default_fan_out() -> usize {
    DEFAULT_FAN_OUT
}

fn default_partition_limit() -> usize {
    DEFAULT_PARTITION_LIMIT
}

fn default_patch_limit() -> usize {
    DEFAULT_PATCH_LIMIT
}

impl TableParams {
    /// Creates parameters with the given key spec and all defaults.
    pub fn new(primary_key: impl Into<PrimaryKey>, lexicoder: Lexicoder) -> Self {
        Self {
            primary_key: primary_key.into(),
            lexicoder,
            fan_out: DEFAULT_FAN_OUT,
            partition_limit: DEFAULT_PARTITION_LIMIT,
            patch_limit: DEFAULT_PATCH_LIMIT,
            families: BTreeMap::new(),
        }
    }

    /// Sets the index fan-out.
    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Sets the partition record limit.
    pub fn with_partition_limit(mut self, limit: usize) -> Self {
        self.partition_limit = limit;
        self
    }

    /// Sets the patch change limit.
    pub fn with_patch_limit(mut self, limit: usize) -> Self {
        self.patch_limit = limit;
        self
    }

    /// Sets the column families.
    pub fn with_families(mut self, families: BTreeMap<String, BTreeSet<String>>) -> Self {
        self.families = families;
        self
    }

    /// Checks the structural invariants of the parameters.
    ///
    /// # Errors
    ///
    /// Fails when a limit is degenerate, a family reuses the reserved base
    /// name, declares no fields, or two families claim the same field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fan_out < 4 {
            return Err(ConfigError::LimitTooSmall {
                param: "fan-out",
                min: 4,
                got: self.fan_out,
            });
        }
        if self.partition_limit < 2 {
            return Err(ConfigError::LimitTooSmall {
                param: "partition-limit",
                min: 2,
                got: self.partition_limit,
            });
        }
        if self.patch_limit < 1 {
            return Err(ConfigError::LimitTooSmall {
                param: "patch-limit",
                min: 1,
                got: self.patch_limit,
            });
        }
        validate_families(&self.families)?;
        Ok(())
    }

    /// Returns the family owning `field`, or `None` for base-tablet fields.
    pub fn family_of(&self, field: &str) -> Option<&str> {
        self.families
            .iter()
            .find(|(_, fields)| fields.contains(field))
            .map(|(name, _)| name.as_str())
    }

    /// Minimum number of children a non-root index node may have.
    pub fn min_children(&self) -> usize {
        self.fan_out.div_ceil(2)
    }

    /// Record count below which a partition is considered under-full.
    pub fn partition_underflow(&self) -> usize {
        self.partition_limit / 2
    }
}

/// Checks that a family map is well-formed (usable on its own for
/// `alter-families` arguments before they are applied).
pub fn validate_families(
    families: &BTreeMap<String, BTreeSet<String>>,
) -> Result<(), ConfigError> {
    let mut claimed: BTreeSet<&str> = BTreeSet::new();
    for (name, fields) in families {
        if name == BASE_FAMILY {
            return Err(ConfigError::ReservedFamily(name.clone()));
        }
        if fields.is_empty() {
            return Err(ConfigError::EmptyFamily(name.clone()));
        }
        for field in fields {
            if !claimed.insert(field.as_str()) {
                return Err(ConfigError::OverlappingFamilies(field.clone()));
            }
        }
    }
    Ok(())
}

/// Options for range scans.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Restrict returned records to these fields (primary-key fields are
    /// always included). `None` returns full records.
    pub fields: Option<BTreeSet<String>>,
    /// Inclusive lower bound on the primary key.
    pub min_key: Option<Value>,
    /// Inclusive upper bound on the primary key.
    pub max_key: Option<Value>,
    /// Number of leading records to skip.
    pub offset: usize,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
    /// Walk the range in descending key order.
    pub reverse: bool,
}

impl ScanOptions {
    /// Full-table scan with no projection.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts the scan to the given fields.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the inclusive lower key bound.
    pub fn with_min_key(mut self, key: Value) -> Self {
        self.min_key = Some(key);
        self
    }

    /// Sets the inclusive upper key bound.
    pub fn with_max_key(mut self, key: Value) -> Self {
        self.max_key = Some(key);
        self
    }

    /// Skips the first `offset` records.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Caps the number of returned records.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Walks the range newest-key-first.
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// Options for point reads.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Restrict returned records to these fields (primary-key fields are
    /// always included). `None` returns full records.
    pub fields: Option<BTreeSet<String>>,
}

impl ReadOptions {
    /// Read full records.
    pub fn full() -> Self {
        Self::default()
    }

    /// Restricts reads to the given fields.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}
