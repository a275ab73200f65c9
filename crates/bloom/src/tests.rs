use super::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

// -------------------- Construction --------------------

#[test]
fn new_creates_valid_filter() {
    let bf = BloomFilter::new(100, 0.01);
    assert!(bf.num_bits() > 0);
    assert!(bf.num_hashes() > 0);
    assert_eq!(bf.seed(), 0);
}

#[test]
#[should_panic(expected = "expected_items must be > 0")]
fn new_panics_on_zero_items() {
    BloomFilter::new(0, 0.01);
}

#[test]
#[should_panic(expected = "false_positive_rate must be in (0, 1)")]
fn new_panics_on_zero_fpr() {
    BloomFilter::new(100, 0.0);
}

#[test]
#[should_panic(expected = "false_positive_rate must be in (0, 1)")]
fn new_panics_on_one_fpr() {
    BloomFilter::new(100, 1.0);
}

#[test]
fn seed_changes_probed_bits() {
    let mut a = BloomFilter::with_seed(100, 0.01, 1);
    let mut b = BloomFilter::with_seed(100, 0.01, 2);
    a.insert(b"key");
    b.insert(b"key");
    assert_ne!(
        serde_payload(&a),
        serde_payload(&b),
        "different seeds should set different bits"
    );
}

// -------------------- Insert / Contains --------------------

#[test]
fn inserted_key_is_found() {
    let mut bf = BloomFilter::new(100, 0.01);
    bf.insert(b"hello");
    assert!(bf.may_contain(b"hello"));
}

#[test]
fn missing_key_is_not_found() {
    let bf = BloomFilter::new(100, 0.01);
    assert!(!bf.may_contain(b"hello"));
}

#[test]
fn many_keys_all_found() {
    let mut bf = BloomFilter::new(1000, 0.01);
    for i in 0..1000u64 {
        bf.insert(&i.to_le_bytes());
    }
    for i in 0..1000u64 {
        assert!(bf.may_contain(&i.to_le_bytes()), "key {} should be found", i);
    }
}

#[test]
fn false_positive_rate_within_tolerance() {
    // Sized for 1000 at 1% FPR, loaded with 1000 items, sampled with
    // 10_000 uncontained items; observed FPR must stay <= 2%.
    let mut bf = BloomFilter::new(1000, 0.01);
    for i in 0..1000u64 {
        bf.insert(&i.to_le_bytes());
    }

    let mut rng = StdRng::seed_from_u64(42);
    let mut false_positives = 0u32;
    let samples = 10_000;
    for _ in 0..samples {
        // uniform draws well outside the inserted range
        let probe: u64 = rng.gen_range(1_000_000..u64::MAX);
        if bf.may_contain(&probe.to_le_bytes()) {
            false_positives += 1;
        }
    }

    let fpr = false_positives as f64 / samples as f64;
    assert!(fpr <= 0.02, "observed FPR {} exceeds 2%", fpr);
}

// -------------------- Union --------------------

#[test]
fn union_contains_both_sides() {
    let mut a = BloomFilter::with_seed(100, 0.01, 7);
    let mut b = BloomFilter::with_seed(100, 0.01, 7);
    a.insert(b"left");
    b.insert(b"right");

    a.union(&b).unwrap();
    assert!(a.may_contain(b"left"));
    assert!(a.may_contain(b"right"));
}

#[test]
fn union_rejects_mismatched_sizing() {
    let mut a = BloomFilter::new(100, 0.01);
    let b = BloomFilter::new(10_000, 0.01);
    assert!(a.union(&b).is_err());
}

#[test]
fn union_rejects_mismatched_seed() {
    let mut a = BloomFilter::with_seed(100, 0.01, 1);
    let b = BloomFilter::with_seed(100, 0.01, 2);
    assert!(a.union(&b).is_err());
}

// -------------------- Serialization --------------------

/// Serializes a filter through its wire triple and back.
fn serde_payload(bf: &BloomFilter) -> Vec<u8> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(bf, &mut buf).unwrap();
    buf
}

#[test]
fn serde_roundtrip_preserves_membership() {
    let mut bf = BloomFilter::with_seed(500, 0.01, 99);
    for i in 0..500u64 {
        bf.insert(&i.to_le_bytes());
    }

    let buf = serde_payload(&bf);
    let restored: BloomFilter = ciborium::de::from_reader(buf.as_slice()).unwrap();

    assert_eq!(restored, bf);
    for i in 0..500u64 {
        assert!(restored.may_contain(&i.to_le_bytes()));
    }
}

#[test]
fn serde_rejects_empty_bits() {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(&(serde_bytes::ByteBuf::new(), 3u32, 0u64), &mut buf).unwrap();
    let result: Result<BloomFilter, _> = ciborium::de::from_reader(buf.as_slice());
    assert!(result.is_err());
}

#[test]
fn serde_rejects_zero_hashes() {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(
        &(serde_bytes::ByteBuf::from(vec![0u8; 8]), 0u32, 0u64),
        &mut buf,
    )
    .unwrap();
    let result: Result<BloomFilter, _> = ciborium::de::from_reader(buf.as_slice());
    assert!(result.is_err());
}
