//! Record maps and the entry codec.
//!
//! A record is a map from field name to [`Value`]. Primary-key fields never
//! live inside stored records: [`encode_entry`] strips them into the sortable
//! byte key, and [`decode_entry`] reattaches them from the key on the way
//! out. Everything else here is pure map shuffling — projection, family
//! splitting, and the field-wise merge used by every overlay layer.

use std::collections::{BTreeMap, BTreeSet};

use config::{PrimaryKey, BASE_FAMILY};
use lexicoder::{Lexicoder, Value};

use crate::{Result, TreeError};

/// A sortable byte-string key produced by a lexicoder.
pub type Key = Vec<u8>;

/// A record: field name to value.
pub type Record = BTreeMap<String, Value>;

/// A staged change: a record to merge in, or `None` for a tombstone.
pub type Change = Option<Record>;

/// Encodes the primary key of `record` without altering it.
///
/// # Errors
///
/// Returns [`TreeError::MissingKeyField`] when the record lacks a key field,
/// or a lexicoder error when a key value is not encodable.
pub fn extract_key(
    primary_key: &PrimaryKey,
    lexicoder: &Lexicoder,
    record: &Record,
) -> Result<Key> {
    let key_value = match primary_key {
        PrimaryKey::Field(field) => field_value(record, field)?,
        PrimaryKey::Composite(fields) => {
            let mut items = Vec::with_capacity(fields.len());
            for field in fields {
                items.push(field_value(record, field)?);
            }
            Value::List(items)
        }
    };
    Ok(lexicoder.encode(&key_value)?)
}

fn field_value(record: &Record, field: &str) -> Result<Value> {
    record
        .get(field)
        .cloned()
        .ok_or_else(|| TreeError::MissingKeyField(field.to_string()))
}

/// Splits `record` into its storage entry: the encoded key and the record
/// with the primary-key fields removed.
pub fn encode_entry(
    primary_key: &PrimaryKey,
    lexicoder: &Lexicoder,
    record: &Record,
) -> Result<(Key, Record)> {
    let key = extract_key(primary_key, lexicoder, record)?;
    let mut stored = record.clone();
    for field in primary_key.fields() {
        stored.remove(field);
    }
    Ok((key, stored))
}

/// Rebuilds a full record from a stored entry, reattaching the primary-key
/// fields decoded from `key`.
///
/// # Errors
///
/// Returns [`TreeError::Corrupt`] when the decoded key shape does not match
/// the primary-key spec (a composite key must decode to a list of the same
/// arity).
pub fn decode_entry(
    primary_key: &PrimaryKey,
    lexicoder: &Lexicoder,
    key: &[u8],
    stored: &Record,
) -> Result<Record> {
    let key_value = lexicoder.decode(key)?;
    let mut record = stored.clone();
    match primary_key {
        PrimaryKey::Field(field) => {
            record.insert(field.clone(), key_value);
        }
        PrimaryKey::Composite(fields) => match key_value {
            Value::List(items) if items.len() == fields.len() => {
                for (field, item) in fields.iter().zip(items) {
                    record.insert(field.clone(), item);
                }
            }
            other => {
                return Err(TreeError::Corrupt(format!(
                    "composite key decoded to {} instead of a {}-tuple",
                    other.type_name(),
                    fields.len()
                )))
            }
        },
    }
    Ok(record)
}

/// Retains only the requested fields of `record`.
pub fn project(record: &Record, fields: &BTreeSet<String>) -> Record {
    record
        .iter()
        .filter(|(name, _)| fields.contains(*name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Splits a stored record into per-family fragments.
///
/// The result always contains a `base` entry — possibly an empty record —
/// because the base tablet carries every key. Family entries appear only
/// when the record has at least one field in that family.
pub fn split_families(
    record: &Record,
    families: &BTreeMap<String, BTreeSet<String>>,
) -> BTreeMap<String, Record> {
    let mut fragments: BTreeMap<String, Record> = BTreeMap::new();
    let mut base = Record::new();

    'fields: for (name, value) in record {
        for (family, members) in families {
            if members.contains(name) {
                fragments
                    .entry(family.clone())
                    .or_default()
                    .insert(name.clone(), value.clone());
                continue 'fields;
            }
        }
        base.insert(name.clone(), value.clone());
    }

    fragments.insert(BASE_FAMILY.to_string(), base);
    fragments
}

/// Merges `overlay` over `base` field-wise: overlay values win for shared
/// fields, absent fields survive.
pub fn merge_fields(base: &Record, overlay: &Record) -> Record {
    let mut merged = base.clone();
    for (name, value) in overlay {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

/// Applies a change to the current value of a key.
///
/// A tombstone removes the record; a record change merges field-wise into
/// whatever is there (or stands alone when nothing is).
pub fn apply_change(current: Option<Record>, change: &Change) -> Option<Record> {
    match change {
        None => None,
        Some(overlay) => match current {
            Some(base) => Some(merge_fields(&base, overlay)),
            None => Some(overlay.clone()),
        },
    }
}

/// Combines a newly staged change with one already staged for the same key.
///
/// Tombstones replace outright; a record staged over a record merges
/// field-wise; a record staged over a tombstone replaces it (the tombstone
/// already severed any older value).
pub fn merge_change(existing: Option<&Change>, incoming: &Change) -> Change {
    match (existing, incoming) {
        (_, None) => None,
        (Some(Some(old)), Some(new)) => Some(merge_fields(old, new)),
        (_, Some(new)) => Some(new.clone()),
    }
}
