//! # Bloom Filter
//!
//! A space-efficient probabilistic data structure for set membership testing.
//!
//! A bloom filter can tell you with certainty that a key is **not** in the set
//! (no false negatives), but may occasionally report that a key **is** in the
//! set when it isn't (false positives). The false positive rate depends on the
//! number of bits and hash functions used.
//!
//! ## Usage in MerkleDB
//!
//! Each partition carries a bloom filter built from its record keys. Point
//! lookups check the filter before loading any tablet block -- if it says
//! "not present", the partition is skipped entirely, avoiding block fetches
//! and CBOR decoding.
//!
//! Filters are part of the persisted partition node, so the serialized form
//! is a stable `(bits, k, seed)` triple that hashes identically across
//! processes.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bloom::BloomFilter;
//!
//! let mut bf = BloomFilter::new(1000, 0.01);
//! bf.insert(b"hello");
//! assert!(bf.may_contain(b"hello"));
//! ```

use serde::{Deserialize, Serialize};

/// A bloom filter backed by a bit vector with `k` independent hash functions.
///
/// Uses Kirsch-Mitzenmacher double hashing: `h(i) = h1 + i * h2` where `h1`
/// and `h2` are 32-bit FNV-1a hashes with distinct, seed-mixed bases. The
/// `seed` travels with the filter so two filters only probe the same bits
/// when they were built compatibly (a precondition for
/// [`union`](BloomFilter::union)).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "BloomWire", try_from = "BloomWire")]
pub struct BloomFilter {
    /// The bit vector storing the filter state. The bit count is always
    /// `bits.len() * 8`.
    bits: Vec<u8>,
    /// Number of hash functions (k).
    num_hashes: u32,
    /// Seed mixed into both hash bases.
    seed: u64,
}

/// Serialized form: the `(bits, k, seed)` triple stored in partition nodes.
#[derive(Serialize, Deserialize)]
struct BloomWire(#[serde(with = "serde_bytes")] Vec<u8>, u32, u64);

impl From<BloomFilter> for BloomWire {
    fn from(bf: BloomFilter) -> Self {
        BloomWire(bf.bits, bf.num_hashes, bf.seed)
    }
}

impl TryFrom<BloomWire> for BloomFilter {
    type Error = String;

    fn try_from(wire: BloomWire) -> Result<Self, String> {
        let BloomWire(bits, num_hashes, seed) = wire;
        if bits.is_empty() {
            return Err("bloom filter has no bits".to_string());
        }
        if num_hashes == 0 {
            return Err("bloom filter has zero hash functions".to_string());
        }
        Ok(Self {
            bits,
            num_hashes,
            seed,
        })
    }
}

impl BloomFilter {
    /// Creates a new bloom filter sized for `expected_items` with the given
    /// target `false_positive_rate`, using seed 0.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items` is 0 or `false_positive_rate` is not in `(0, 1)`.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        Self::with_seed(expected_items, false_positive_rate, 0)
    }

    /// Creates a new bloom filter with an explicit hash seed.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items` is 0 or `false_positive_rate` is not in `(0, 1)`.
    pub fn with_seed(expected_items: usize, false_positive_rate: f64, seed: u64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        // Optimal number of bits: m = -n * ln(p) / (ln(2)^2)
        let n = expected_items as f64;
        let m = (-n * false_positive_rate.ln() / (std::f64::consts::LN_2.powi(2))).ceil() as u64;
        let m = m.max(8);

        // Optimal number of hashes: k = (m/n) * ln(2)
        let k = ((m as f64 / n) * std::f64::consts::LN_2).ceil() as u32;
        let k = k.max(1);

        // Round up to whole bytes; the bit count is exactly bits.len() * 8.
        let byte_len = ((m + 7) / 8) as usize;

        Self {
            bits: vec![0u8; byte_len],
            num_hashes: k,
            seed,
        }
    }

    /// Inserts a key into the bloom filter.
    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = self.hash_pair(key);
        for i in 0..self.num_hashes {
            let bit_idx = self.bit_index(h1, h2, i);
            self.set_bit(bit_idx);
        }
    }

    /// Returns `true` if the key **might** be in the set, `false` if it is
    /// **definitely not** in the set.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = self.hash_pair(key);
        for i in 0..self.num_hashes {
            let bit_idx = self.bit_index(h1, h2, i);
            if !self.get_bit(bit_idx) {
                return false;
            }
        }
        true
    }

    /// Bit-ORs `other` into this filter, producing a filter that may-contain
    /// everything either input may-contain.
    ///
    /// # Errors
    ///
    /// Fails unless both filters have the same bit count, hash count, and
    /// seed -- otherwise the probed bit positions would not line up.
    pub fn union(&mut self, other: &BloomFilter) -> Result<(), String> {
        if self.bits.len() != other.bits.len()
            || self.num_hashes != other.num_hashes
            || self.seed != other.seed
        {
            return Err(format!(
                "cannot union incompatible bloom filters ({}b/k{}/s{} vs {}b/k{}/s{})",
                self.num_bits(),
                self.num_hashes,
                self.seed,
                other.num_bits(),
                other.num_hashes,
                other.seed
            ));
        }
        for (byte, other_byte) in self.bits.iter_mut().zip(&other.bits) {
            *byte |= other_byte;
        }
        Ok(())
    }

    /// Returns the number of bits in the filter.
    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.bits.len() as u64 * 8
    }

    /// Returns the number of hash functions.
    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Returns the hash seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the bit-vector payload size in bytes (excluding CBOR framing).
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.bits.len()
    }

    // ---- Internal helpers ----

    /// Computes two independent 32-bit FNV-1a hashes with seed-mixed bases.
    fn hash_pair(&self, key: &[u8]) -> (u32, u32) {
        let lo = self.seed as u32;
        let hi = (self.seed >> 32) as u32;
        let h1 = fnv1a_32(key, 0x811c_9dc5 ^ lo);
        let h2 = fnv1a_32(key, 0x9747_b28c ^ hi);
        (h1, h2)
    }

    /// Double hashing: h(i) = (h1 + i * h2) mod num_bits.
    fn bit_index(&self, h1: u32, h2: u32, i: u32) -> u64 {
        (h1 as u64).wrapping_add((i as u64).wrapping_mul(h2 as u64)) % self.num_bits()
    }

    fn set_bit(&mut self, idx: u64) {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        self.bits[byte_idx] |= 1 << bit_offset;
    }

    fn get_bit(&self, idx: u64) -> bool {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        (self.bits[byte_idx] >> bit_offset) & 1 == 1
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits())
            .field("num_hashes", &self.num_hashes)
            .field("seed", &self.seed)
            .finish()
    }
}

/// FNV-1a 32-bit hash with a configurable starting basis.
fn fnv1a_32(data: &[u8], basis: u32) -> u32 {
    const FNV_PRIME: u32 = 0x0100_0193;
    let mut hash = basis;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests;
