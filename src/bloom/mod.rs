// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The "full filter" bloom implementation: one filter covering an entire
//! table, built with double hashing instead of `k` independent hash
//! functions (spec §4.4 "Full filter").
//!
//! See <https://fjall-rs.github.io/post/bloom-filter-hash-sharing> for the
//! double-hashing scheme this reuses unchanged from the teacher.

mod bit_array;

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use bit_array::BitArray;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// On-disk magic identifying an encoded [`BloomFilter`].
const MAGIC_BYTES: [u8; 4] = *b"BLM1";

/// Two hashes that are used for double hashing.
pub type CompositeHash = (u64, u64);

/// A standard bloom filter.
///
/// Allows buffering the key hashes before actual filter construction,
/// which is needed to properly calculate the filter size, as the amount of
/// items are unknown while the filter is being built.
#[derive(Debug, Eq, PartialEq)]
pub struct BloomFilter {
    /// Raw bytes exposed as bit array.
    inner: BitArray,

    /// Bit count.
    m: usize,

    /// Number of hash functions.
    k: usize,
}

impl Encode for BloomFilter {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_all(&MAGIC_BYTES)?;

        // NOTE: filter type, reserved for future filter variants
        writer.write_u8(0)?;
        // NOTE: hash type, reserved
        writer.write_u8(0)?;

        writer.write_u64::<BigEndian>(self.m as u64)?;
        writer.write_u64::<BigEndian>(self.k as u64)?;
        writer.write_all(self.inner.bytes())?;

        Ok(())
    }
}

impl Decode for BloomFilter {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut magic = [0u8; MAGIC_BYTES.len()];
        reader.read_exact(&mut magic)?;

        if magic != MAGIC_BYTES {
            return Err(DecodeError::InvalidTag("BloomFilter magic", magic[0]));
        }

        let filter_type = reader.read_u8()?;
        if filter_type != 0 {
            return Err(DecodeError::InvalidTag("BloomFilter type", filter_type));
        }

        let hash_type = reader.read_u8()?;
        if hash_type != 0 {
            return Err(DecodeError::InvalidTag("BloomFilter hash type", hash_type));
        }

        let m = reader.read_u64::<BigEndian>()? as usize;
        let k = reader.read_u64::<BigEndian>()? as usize;

        let mut bytes = vec![0; m / 8];
        reader.read_exact(&mut bytes)?;

        Ok(Self::from_raw(m, k, bytes.into_boxed_slice()))
    }
}

#[allow(clippy::len_without_is_empty)]
impl BloomFilter {
    /// Returns the size of the bloom filter in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.bytes().len()
    }

    /// Returns the amount of hashes used per lookup.
    #[must_use]
    pub fn hash_fn_count(&self) -> usize {
        self.k
    }

    fn from_raw(m: usize, k: usize, bytes: Box<[u8]>) -> Self {
        Self {
            inner: BitArray::from_bytes(bytes),
            m,
            k,
        }
    }

    /// Constructs a bloom filter that can hold `n` items while maintaining
    /// a target false positive rate `fpr` (spec §4.4 filter construction).
    #[must_use]
    pub fn with_fp_rate(n: usize, fpr: f32) -> Self {
        use std::f32::consts::LN_2;

        assert!(n > 0);

        let fpr = fpr.max(0.000_001);

        let m = Self::calculate_m(n, fpr);
        let bpk = m / n;
        let k = (((bpk as f32) * LN_2) as usize).max(1);

        Self {
            inner: BitArray::with_capacity(m / 8),
            m,
            k,
        }
    }

    /// Constructs a bloom filter that can hold `n` items with `bpk` bits
    /// per key. 10 bits per key is a sensible default.
    #[must_use]
    pub fn with_bpk(n: usize, bpk: u8) -> Self {
        use std::f32::consts::LN_2;

        assert!(bpk > 0);
        assert!(n > 0);

        let bpk = bpk as usize;
        let m = n * bpk;
        let k = (((bpk as f32) * LN_2) as usize).max(1);

        let bytes = (m as f32 / 8.0).ceil() as usize;

        Self {
            inner: BitArray::with_capacity(bytes),
            m: bytes * 8,
            k,
        }
    }

    fn calculate_m(n: usize, fp_rate: f32) -> usize {
        use std::f32::consts::LN_2;

        let n = n as f32;
        let ln2_squared = LN_2.powi(2);

        let numerator = n * fp_rate.ln();
        let m = -(numerator / ln2_squared);

        ((m / 8.0).ceil() * 8.0) as usize
    }

    /// Returns `true` if the hash may be contained. Never false-negative
    /// (spec §4.4 "MayContain").
    #[must_use]
    pub fn contains_hash(&self, (mut h1, mut h2): CompositeHash) -> bool {
        for i in 0..(self.k as u64) {
            let idx = h1 % (self.m as u64);

            if !self.has_bit(idx as usize) {
                return false;
            }

            h1 = h1.wrapping_add(h2);
            h2 = h2.wrapping_add(i);
        }

        true
    }

    /// Returns `true` if the key may be contained. Never false-negative.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.contains_hash(Self::get_hash(key))
    }

    /// Adds the key to the filter.
    pub fn set_with_hash(&mut self, (mut h1, mut h2): CompositeHash) {
        for i in 0..(self.k as u64) {
            let idx = h1 % (self.m as u64);

            self.enable_bit(idx as usize);

            h1 = h1.wrapping_add(h2);
            h2 = h2.wrapping_add(i);
        }
    }

    fn has_bit(&self, idx: usize) -> bool {
        self.inner.get(idx)
    }

    fn enable_bit(&mut self, idx: usize) {
        self.inner.set(idx, true);
    }

    /// Computes the double-hash pair used to probe the filter for `key`.
    #[must_use]
    pub fn get_hash(key: &[u8]) -> CompositeHash {
        let h0 = xxhash_rust::xxh3::xxh3_128(key);
        let h1 = (h0 >> 64) as u64;
        let h2 = h0 as u64;
        (h1, h2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bloom_serde_round_trip() {
        let mut filter = BloomFilter::with_fp_rate(10, 0.0001);

        let keys: &[&[u8]] = &[
            b"item0", b"item1", b"item2", b"item3", b"item4", b"item5", b"item6", b"item7",
            b"item8", b"item9",
        ];

        for key in keys {
            filter.set_with_hash(BloomFilter::get_hash(key));
        }
        for key in keys {
            assert!(filter.contains(key));
        }
        assert!(!filter.contains(b"asdasads"));

        let bytes = filter.encode_into_vec();
        let decoded = BloomFilter::decode_from(&mut std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(filter, decoded);
        for key in keys {
            assert!(decoded.contains(key));
        }
    }

    #[test]
    fn bloom_calculate_m() {
        assert_eq!(9_592, BloomFilter::calculate_m(1_000, 0.01));
        assert_eq!(4_800, BloomFilter::calculate_m(1_000, 0.1));
    }

    #[test]
    fn bloom_basic() {
        let mut filter = BloomFilter::with_fp_rate(10, 0.0001);

        for key in [
            b"item0", b"item1", b"item2", b"item3", b"item4", b"item5", b"item6", b"item7",
            b"item8", b"item9",
        ] {
            assert!(!filter.contains(key));
            filter.set_with_hash(BloomFilter::get_hash(key));
            assert!(filter.contains(key));
        }
        assert!(!filter.contains(b"asdasdasdasdasdasdasd"));
    }

    #[test]
    fn bloom_bpk_false_positive_rate_is_bounded() {
        let item_count = 1_000;
        let mut filter = BloomFilter::with_bpk(item_count, 5);

        let members: Vec<String> = (0..item_count).map(|i| format!("member-{i}")).collect();
        for key in &members {
            filter.set_with_hash(BloomFilter::get_hash(key.as_bytes()));
            assert!(filter.contains(key.as_bytes()));
        }

        let mut false_positives = 0;
        for i in 0..item_count {
            let key = format!("absent-{i}");
            if filter.contains(key.as_bytes()) {
                false_positives += 1;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let fpr = false_positives as f32 / item_count as f32;
        assert!(fpr < 0.2);
    }
}
