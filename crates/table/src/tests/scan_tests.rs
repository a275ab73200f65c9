use super::helpers::*;
use crate::Table;
use anyhow::Result;
use config::ScanOptions;
use lexicoder::Value;

fn seeded(n: i64) -> Table {
    let mut table = small_table();
    table.insert(rows(1..=n)).unwrap();
    table.flush().unwrap();
    table
}

// --------------------- Bounds ---------------------

#[test]
fn scan_bounds_are_inclusive() -> Result<()> {
    let table = seeded(6);
    let records = table.scan(
        &ScanOptions::all()
            .with_min_key(int(2))
            .with_max_key(int(4)),
    )?;
    assert_eq!(ids(&records), vec![2, 3, 4]);
    Ok(())
}

#[test]
fn scan_open_ended_bounds() -> Result<()> {
    let table = seeded(6);
    assert_eq!(
        ids(&table.scan(&ScanOptions::all().with_min_key(int(5)))?),
        vec![5, 6]
    );
    assert_eq!(
        ids(&table.scan(&ScanOptions::all().with_max_key(int(2)))?),
        vec![1, 2]
    );
    Ok(())
}

#[test]
fn scan_outside_range_is_empty() -> Result<()> {
    let table = seeded(6);
    assert!(table
        .scan(&ScanOptions::all().with_min_key(int(100)))?
        .is_empty());
    Ok(())
}

// --------------------- Offset / limit ---------------------

#[test]
fn scan_offset_and_limit_page_through() -> Result<()> {
    let table = seeded(9);
    let page = table.scan(&ScanOptions::all().with_offset(2).with_limit(3))?;
    assert_eq!(ids(&page), vec![3, 4, 5]);

    let tail = table.scan(&ScanOptions::all().with_offset(8).with_limit(10))?;
    assert_eq!(ids(&tail), vec![9]);
    Ok(())
}

#[test]
fn scan_limit_zero_returns_nothing() -> Result<()> {
    let table = seeded(3);
    assert!(table.scan(&ScanOptions::all().with_limit(0))?.is_empty());
    Ok(())
}

// --------------------- Reverse ---------------------

#[test]
fn reverse_scan_descends() -> Result<()> {
    let table = seeded(9);
    let records = table.scan(&ScanOptions::all().reversed().with_limit(3))?;
    assert_eq!(ids(&records), vec![9, 8, 7]);
    Ok(())
}

#[test]
fn reverse_scan_sees_unflushed_overlays() -> Result<()> {
    let mut table = seeded(4);
    table.insert(vec![row(9)])?;
    table.delete(vec![int(4)])?;

    let records = table.scan(&ScanOptions::all().reversed())?;
    assert_eq!(ids(&records), vec![9, 3, 2, 1]);
    Ok(())
}

#[test]
fn reverse_scan_respects_bounds() -> Result<()> {
    let table = seeded(9);
    let records = table.scan(
        &ScanOptions::all()
            .reversed()
            .with_min_key(int(3))
            .with_max_key(int(6)),
    )?;
    assert_eq!(ids(&records), vec![6, 5, 4, 3]);
    Ok(())
}

// --------------------- Overlay interplay ---------------------

#[test]
fn scan_merges_gap_inserts_in_order() -> Result<()> {
    let mut table = small_table();
    // two partitions with a hole between them
    table.insert(rows([1, 2, 3, 7, 8, 9]))?;
    table.flush()?;

    // staged inserts land in the gap, before, and after the tree's range
    table.insert(vec![row(0), row(5), row(12)])?;

    let records = table.scan(&ScanOptions::all())?;
    assert_eq!(ids(&records), vec![0, 1, 2, 3, 5, 7, 8, 9, 12]);
    Ok(())
}

#[test]
fn scan_with_buffered_patch_and_pending() -> Result<()> {
    let mut table = seeded(4);
    table.insert(vec![rec(&[("id", int(2)), ("b", int(1))])])?;
    table.flush()?; // buffered in the patch
    table.delete(vec![int(3)])?; // still pending

    let records = table.scan(&ScanOptions::all())?;
    assert_eq!(ids(&records), vec![1, 2, 4]);
    assert_eq!(records[1].get("b"), Some(&int(1)));
    Ok(())
}

#[test]
fn scan_empty_table_is_empty() -> Result<()> {
    let table = small_table();
    assert!(table.scan(&ScanOptions::all())?.is_empty());
    assert!(table.keys(&ScanOptions::all())?.is_empty());
    Ok(())
}

// --------------------- Keys ---------------------

#[test]
fn keys_returns_decoded_primary_keys() -> Result<()> {
    let mut table = seeded(3);
    table.insert(vec![row(10)])?;

    let keys = table.keys(&ScanOptions::all())?;
    assert_eq!(keys, vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(10)]);
    Ok(())
}

#[test]
fn keys_respects_bounds_and_limit() -> Result<()> {
    let table = seeded(9);
    let keys = table.keys(&ScanOptions::all().with_min_key(int(4)).with_limit(2))?;
    assert_eq!(keys, vec![Value::Int(4), Value::Int(5)]);
    Ok(())
}
