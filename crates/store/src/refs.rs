//! Ref tracking: named, versioned pointers to root hashes.
//!
//! Refs are the single mutable construct in MerkleDB. Every update is a
//! compare-and-set against the version the caller last observed; a losing
//! writer gets [`StoreError::RefConflict`] and must rebase. All versions are
//! retained, so any historical root remains reachable by name + version.
//!
//! ## File format
//!
//! [`FileRefTracker`] keeps one tab-separated line per version:
//!
//! ```text
//! # version <TAB> committed-at <TAB> hash-or-dash <TAB> name
//! 1	2024-03-01T10:15:00+00:00	1220ab...	accounts
//! 2	2024-03-01T10:20:41+00:00	1220cd...	accounts
//! 3	2024-03-02T08:00:12+00:00	-	scratch
//! ```
//!
//! A `-` in the hash column is a tombstone (the ref was dropped at that
//! version). Lines starting with `#` are comments. The file is rewritten
//! atomically on every change (temp file + fsync + rename), so it is never
//! observed half-written. A text format was chosen over binary for
//! debuggability — operators can inspect the refs with any text editor.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Hash, Result, StoreError};

/// One version of a named ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RefVersion {
    /// The ref name.
    pub name: String,
    /// Monotonic version number, starting at 1.
    pub version: u64,
    /// The root hash this version points at; `None` is a drop tombstone.
    pub hash: Option<Hash>,
    /// When this version was committed.
    pub committed_at: DateTime<Utc>,
}

impl RefVersion {
    /// Whether this version is a drop tombstone.
    pub fn is_tombstone(&self) -> bool {
        self.hash.is_none()
    }
}

/// A store of named pointers to root hashes with compare-and-set updates
/// and full history.
pub trait RefTracker: Send + Sync {
    /// Names of all refs whose current version is live (not a tombstone).
    fn list_refs(&self) -> Result<Vec<String>>;

    /// Returns the version of `name` numbered `at`, or the current version
    /// when `at` is `None`. The returned version may be a tombstone.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownRef`] when the ref has no versions, or
    /// no version numbered `at`.
    fn get_ref(&self, name: &str, at: Option<u64>) -> Result<RefVersion>;

    /// Points `name` at `hash`, expecting the current version to be
    /// `expected_version` (0 when creating a new ref).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RefConflict`] when the current version is not
    /// the expected one; the caller must re-read and rebase.
    fn set_ref(&self, name: &str, expected_version: u64, hash: Hash) -> Result<RefVersion>;

    /// Writes a tombstone version for `name`, with the same CAS contract as
    /// [`set_ref`](RefTracker::set_ref).
    fn drop_ref(&self, name: &str, expected_version: u64) -> Result<RefVersion>;

    /// All versions of `name` in ascending version order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownRef`] when the ref has no versions.
    fn history(&self, name: &str) -> Result<Vec<RefVersion>>;
}

/// Shared CAS logic over an in-memory version table.
fn append_version(
    table: &mut BTreeMap<String, Vec<RefVersion>>,
    name: &str,
    expected_version: u64,
    hash: Option<Hash>,
) -> Result<RefVersion> {
    let versions = table.entry(name.to_string()).or_default();
    let current = versions.last().map(|v| v.version).unwrap_or(0);
    if current != expected_version {
        return Err(StoreError::RefConflict {
            name: name.to_string(),
            expected: expected_version,
            actual: current,
        });
    }
    let next = RefVersion {
        name: name.to_string(),
        version: current + 1,
        hash,
        committed_at: Utc::now(),
    };
    versions.push(next.clone());
    Ok(next)
}

fn lookup(
    table: &BTreeMap<String, Vec<RefVersion>>,
    name: &str,
    at: Option<u64>,
) -> Result<RefVersion> {
    let versions = table
        .get(name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| StoreError::UnknownRef(name.to_string()))?;
    match at {
        None => versions
            .last()
            .cloned()
            .ok_or_else(|| StoreError::UnknownRef(name.to_string())),
        Some(v) => versions
            .iter()
            .find(|rv| rv.version == v)
            .cloned()
            .ok_or_else(|| StoreError::UnknownRef(format!("{}@{}", name, v))),
    }
}

fn live_names(table: &BTreeMap<String, Vec<RefVersion>>) -> Vec<String> {
    table
        .iter()
        .filter(|(_, versions)| matches!(versions.last(), Some(v) if !v.is_tombstone()))
        .map(|(name, _)| name.clone())
        .collect()
}

/// An in-memory ref tracker for tests and ephemeral use.
#[derive(Default)]
pub struct MemoryRefTracker {
    table: Mutex<BTreeMap<String, Vec<RefVersion>>>,
}

impl MemoryRefTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RefTracker for MemoryRefTracker {
    fn list_refs(&self) -> Result<Vec<String>> {
        let table = crate::lock(&self.table)?;
        Ok(live_names(&table))
    }

    fn get_ref(&self, name: &str, at: Option<u64>) -> Result<RefVersion> {
        let table = crate::lock(&self.table)?;
        lookup(&table, name, at)
    }

    fn set_ref(&self, name: &str, expected_version: u64, hash: Hash) -> Result<RefVersion> {
        let mut table = crate::lock(&self.table)?;
        append_version(&mut table, name, expected_version, Some(hash))
    }

    fn drop_ref(&self, name: &str, expected_version: u64) -> Result<RefVersion> {
        let mut table = crate::lock(&self.table)?;
        append_version(&mut table, name, expected_version, None)
    }

    fn history(&self, name: &str) -> Result<Vec<RefVersion>> {
        let table = crate::lock(&self.table)?;
        table
            .get(name)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| StoreError::UnknownRef(name.to_string()))
    }
}

/// Name of the refs file within its directory.
pub const REFS_FILENAME: &str = "REFS";

/// Temporary file used during atomic refs rewrites.
const REFS_TMP_FILENAME: &str = "REFS.tmp";

/// Placeholder for a tombstone in the hash column.
const TOMBSTONE_MARK: &str = "-";

/// A ref tracker persisted as a tab-separated text file.
pub struct FileRefTracker {
    path: PathBuf,
    table: Mutex<BTreeMap<String, Vec<RefVersion>>>,
}

impl FileRefTracker {
    /// Loads an existing refs file from `dir/REFS`, or starts empty if the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be parsed.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let path = dir.join(REFS_FILENAME);

        let mut table: BTreeMap<String, Vec<RefVersion>> = BTreeMap::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for (line_num, line) in reader.lines().enumerate() {
                let line = line?;
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                let version = parse_line(trimmed).ok_or_else(|| {
                    StoreError::Decode(format!(
                        "refs file line {}: invalid format: {}",
                        line_num + 1,
                        trimmed
                    ))
                })?;
                table.entry(version.name.clone()).or_default().push(version);
            }
            // Versions must be contiguous per ref; file order is not trusted.
            for versions in table.values_mut() {
                versions.sort_by_key(|v| v.version);
            }
        }

        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    /// Rewrites the refs file from the in-memory table, atomically.
    fn persist(&self, table: &BTreeMap<String, Vec<RefVersion>>) -> Result<()> {
        let tmp_path = self
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(REFS_TMP_FILENAME);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        writeln!(file, "# version\tcommitted-at\thash\tname")?;
        for versions in table.values() {
            for v in versions {
                writeln!(
                    file,
                    "{}\t{}\t{}\t{}",
                    v.version,
                    v.committed_at.to_rfc3339(),
                    v.hash.map(|h| h.to_hex()).unwrap_or_else(|| TOMBSTONE_MARK.to_string()),
                    v.name
                )?;
            }
        }
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Parses one `version \t committed-at \t hash \t name` line.
fn parse_line(line: &str) -> Option<RefVersion> {
    let mut parts = line.splitn(4, '\t');
    let version: u64 = parts.next()?.parse().ok()?;
    let committed_at = DateTime::parse_from_rfc3339(parts.next()?)
        .ok()?
        .with_timezone(&Utc);
    let hash_field = parts.next()?;
    let hash = if hash_field == TOMBSTONE_MARK {
        None
    } else {
        Some(Hash::from_hex(hash_field).ok()?)
    };
    let name = parts.next()?.to_string();
    Some(RefVersion {
        name,
        version,
        hash,
        committed_at,
    })
}

impl RefTracker for FileRefTracker {
    fn list_refs(&self) -> Result<Vec<String>> {
        let table = crate::lock(&self.table)?;
        Ok(live_names(&table))
    }

    fn get_ref(&self, name: &str, at: Option<u64>) -> Result<RefVersion> {
        let table = crate::lock(&self.table)?;
        lookup(&table, name, at)
    }

    fn set_ref(&self, name: &str, expected_version: u64, hash: Hash) -> Result<RefVersion> {
        let mut table = crate::lock(&self.table)?;
        let version = append_version(&mut table, name, expected_version, Some(hash))?;
        if let Err(e) = self.persist(&table) {
            // Keep memory and disk in agreement: an unpersisted version
            // must not be observable.
            table.get_mut(name).map(Vec::pop);
            return Err(e);
        }
        Ok(version)
    }

    fn drop_ref(&self, name: &str, expected_version: u64) -> Result<RefVersion> {
        let mut table = crate::lock(&self.table)?;
        let version = append_version(&mut table, name, expected_version, None)?;
        if let Err(e) = self.persist(&table) {
            table.get_mut(name).map(Vec::pop);
            return Err(e);
        }
        Ok(version)
    }

    fn history(&self, name: &str) -> Result<Vec<RefVersion>> {
        let table = crate::lock(&self.table)?;
        table
            .get(name)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| StoreError::UnknownRef(name.to_string()))
    }
}
