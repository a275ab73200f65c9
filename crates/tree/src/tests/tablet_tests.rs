use super::helpers::*;
use crate::{Tablet, TreeError};
use lexicoder::Value;

// -------------------- Reads --------------------

#[test]
fn read_all_is_key_ordered() {
    let tablet = Tablet::from_records(entry_map([3, 1, 2]));
    let keys: Vec<_> = tablet.read_all().map(|(k, _)| k.clone()).collect();
    assert_eq!(keys, vec![ikey(1), ikey(2), ikey(3)]);
    assert_eq!(tablet.len(), 3);
}

#[test]
fn read_batch_filters_and_sorts() {
    let tablet = Tablet::from_records(entry_map(1..=5));
    let k4 = ikey(4);
    let k2 = ikey(2);
    let k9 = ikey(9);
    let hits = tablet.read_batch([k4.as_slice(), k2.as_slice(), k9.as_slice(), k2.as_slice()]);
    let keys: Vec<_> = hits.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(keys, vec![ikey(2), ikey(4)], "missing keys skipped, order ascending");
}

#[test]
fn read_range_is_inclusive_both_ends() {
    let tablet = Tablet::from_records(entry_map(1..=5));
    let min = ikey(2);
    let max = ikey(4);
    let keys: Vec<_> = tablet
        .read_range(Some(&min), Some(&max))
        .map(|(k, _)| k.clone())
        .collect();
    assert_eq!(keys, vec![ikey(2), ikey(3), ikey(4)]);
}

#[test]
fn read_range_unbounded_returns_all() {
    let tablet = Tablet::from_records(entry_map(1..=3));
    assert_eq!(tablet.read_range(None, None).count(), 3);
}

#[test]
fn empty_tablet_reads_empty() {
    let tablet = Tablet::default();
    assert!(tablet.is_empty());
    assert_eq!(tablet.read_all().count(), 0);
    assert_eq!(tablet.first_key(), None);
    assert_eq!(tablet.last_key(), None);
}

#[test]
fn key_accessors() {
    let tablet = Tablet::from_records(entry_map(1..=4));
    assert_eq!(tablet.first_key(), Some(ikey(1).as_slice()));
    assert_eq!(tablet.last_key(), Some(ikey(4).as_slice()));
    assert_eq!(tablet.nth_key(2), Some(ikey(3).as_slice()));
    assert_eq!(tablet.nth_key(9), None);
}

#[test]
fn fields_present_unions_all_records() {
    let mut map = entry_map([1]);
    map.insert(ikey(2), rec(&[("b", Value::Int(1)), ("c", Value::Null)]));
    let tablet = Tablet::from_records(map);
    let fields = tablet.fields_present();
    assert!(fields.contains("a") && fields.contains("b") && fields.contains("c"));
}

// -------------------- Inserts --------------------

#[test]
fn insert_merges_fields_per_key() {
    let tablet = Tablet::from_records(entry_map([1]));
    let updated = tablet.insert_records(
        [(ikey(1), rec(&[("b", Value::Int(99))]))].into_iter().collect(),
    );

    let (_, record) = updated.read_all().next().unwrap();
    assert_eq!(record.get("a"), Some(&Value::Int(10)), "absent field survives");
    assert_eq!(record.get("b"), Some(&Value::Int(99)), "new field lands");

    // the original tablet is untouched
    let (_, original) = tablet.read_all().next().unwrap();
    assert_eq!(original.get("b"), None);
}

#[test]
fn insert_overrides_coinciding_fields() {
    let tablet = Tablet::from_records(entry_map([1]));
    let updated = tablet.insert_records(
        [(ikey(1), rec(&[("a", Value::Int(-1))]))].into_iter().collect(),
    );
    let (_, record) = updated.read_all().next().unwrap();
    assert_eq!(record.get("a"), Some(&Value::Int(-1)));
}

// -------------------- Removals --------------------

#[test]
fn remove_batch_keeps_rest() {
    let tablet = Tablet::from_records(entry_map(1..=3));
    let k2 = ikey(2);
    let remaining = tablet.remove_batch([k2.as_slice()]).unwrap();
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining.first_key(), Some(ikey(1).as_slice()));
}

#[test]
fn remove_batch_emptying_returns_none() {
    let tablet = Tablet::from_records(entry_map([1]));
    let k1 = ikey(1);
    assert!(tablet.remove_batch([k1.as_slice()]).is_none());
}

#[test]
fn remove_range_drops_inclusive_span() {
    let tablet = Tablet::from_records(entry_map(1..=5));
    let min = ikey(2);
    let max = ikey(4);
    let remaining = tablet.remove_range(Some(&min), Some(&max)).unwrap();
    let keys: Vec<_> = remaining.read_all().map(|(k, _)| k.clone()).collect();
    assert_eq!(keys, vec![ikey(1), ikey(5)]);
}

#[test]
fn prune_drops_empty_records() {
    let mut map = entry_map([1]);
    map.insert(ikey(2), rec(&[]));
    let tablet = Tablet::from_records(map);
    let pruned = tablet.prune().unwrap();
    assert_eq!(pruned.len(), 1);

    let all_empty = Tablet::from_records([(ikey(1), rec(&[]))].into_iter().collect());
    assert!(all_empty.prune().is_none());
}

// -------------------- Split / Join --------------------

#[test]
fn split_partitions_below_and_at_key() {
    let tablet = Tablet::from_records(entry_map([1, 2, 4, 5]));
    // key 3 exists in no record, and lies strictly inside the range
    let (left, right) = tablet.split(&ikey(3)).unwrap();
    assert_eq!(left.len(), 2);
    assert_eq!(right.len(), 2);
    assert_eq!(left.last_key(), Some(ikey(2).as_slice()));
    assert_eq!(right.first_key(), Some(ikey(4).as_slice()));
}

#[test]
fn split_rejects_existing_key() {
    let tablet = Tablet::from_records(entry_map(1..=3));
    assert!(matches!(
        tablet.split(&ikey(2)).unwrap_err(),
        TreeError::Corrupt(_)
    ));
}

#[test]
fn split_rejects_out_of_range_key() {
    let tablet = Tablet::from_records(entry_map(2..=4));
    assert!(matches!(tablet.split(&ikey(9)).unwrap_err(), TreeError::Corrupt(_)));
    assert!(matches!(tablet.split(&ikey(0)).unwrap_err(), TreeError::Corrupt(_)));
}

#[test]
fn join_concatenates_disjoint_ranges() {
    let left = Tablet::from_records(entry_map(1..=2));
    let right = Tablet::from_records(entry_map(3..=4));
    let joined = Tablet::join(&left, &right).unwrap();
    assert_eq!(joined.len(), 4);
    assert_eq!(joined.first_key(), Some(ikey(1).as_slice()));
    assert_eq!(joined.last_key(), Some(ikey(4).as_slice()));
}

#[test]
fn join_rejects_interleaved_ranges() {
    let left = Tablet::from_records(entry_map([1, 3]));
    let right = Tablet::from_records(entry_map([2, 4]));
    assert!(matches!(
        Tablet::join(&left, &right).unwrap_err(),
        TreeError::Corrupt(_)
    ));
}

#[test]
fn join_with_empty_side_returns_other() {
    let left = Tablet::from_records(entry_map(1..=2));
    let joined = Tablet::join(&left, &Tablet::default()).unwrap();
    assert_eq!(joined.len(), 2);
}
