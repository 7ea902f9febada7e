// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The full filter: one bloom filter covering the whole table (spec §4.5
//! "Full").

use crate::bloom::BloomFilter;

/// A single table-wide bloom filter.
pub struct FullFilterReader {
    filter: BloomFilter,
}

impl FullFilterReader {
    #[must_use]
    pub fn new(filter: BloomFilter) -> Self {
        Self { filter }
    }

    /// Never false-negative. The `block_offset` parameter other filter
    /// kinds take is irrelevant here (spec §4.5 "offset parameter
    /// ignored").
    #[must_use]
    pub fn key_may_match(&self, key: &[u8]) -> bool {
        self.filter.contains(key)
    }

    #[must_use]
    pub fn prefix_may_match(&self, prefix: &[u8]) -> bool {
        self.filter.contains(prefix)
    }

    #[must_use]
    pub fn approximate_memory_usage(&self) -> usize {
        self.filter.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_filter_never_false_negative() {
        let mut filter = BloomFilter::with_fp_rate(4, 0.01);
        for key in [b"aaa".as_slice(), b"bbb", b"ccc"] {
            filter.set_with_hash(BloomFilter::get_hash(key));
        }
        let reader = FullFilterReader::new(filter);
        assert!(reader.key_may_match(b"aaa"));
        assert!(reader.key_may_match(b"bbb"));
        assert!(reader.key_may_match(b"ccc"));
    }
}
