// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The fixed-size filter: an on-disk filter index (always binary-search,
//! spec §4.6 step 6) mapping a transformed key to the filter block that
//! covers it, plus the filter blocks themselves (spec §4.5 "Fixed-size").

use crate::block::iter::BlockIter;
use crate::block::{Block, BlockHandle};
use crate::bloom::BloomFilter;
use crate::comparator::Comparator;
use std::sync::Arc;

/// Fetches the bloom filter living at `handle`, through whatever cache and
/// file-reading machinery the table owns. Supplied by the caller at each
/// probe so this module stays free of the table's generic file-reader and
/// cache types.
pub type FilterFetcher<'a> = dyn Fn(BlockHandle) -> crate::Result<Arc<BloomFilter>> + 'a;

/// Binary-search index over a table's fixed-size filter blocks.
pub struct FixedSizeFilterReader<C> {
    index: Arc<Block>,
    comparator: Arc<C>,
}

impl<C: Comparator> FixedSizeFilterReader<C> {
    #[must_use]
    pub fn new(index: Arc<Block>, comparator: Arc<C>) -> Self {
        Self { index, comparator }
    }

    /// Looks up the filter block covering `transformed_key` and probes it.
    ///
    /// If `transformed_key` sorts past the last indexed range, returns the
    /// "not-matching" sentinel (`false`) with zero I/O, since the filter
    /// index is already resident (spec §8 "a key whose transformed form
    /// sorts past the last filter-index entry returns the not-matching
    /// sentinel").
    ///
    /// # Errors
    ///
    /// Propagates `fetch`'s errors, or `Corruption` if an index entry's
    /// value is not a valid block handle.
    pub fn key_may_match(
        &self,
        transformed_key: &[u8],
        fetch: &FilterFetcher<'_>,
    ) -> crate::Result<bool> {
        let mut it = BlockIter::new(Arc::clone(&self.index), Arc::clone(&self.comparator));
        it.seek(transformed_key);
        if !it.valid() {
            it.status()?;
            return Ok(false);
        }

        use crate::coding::Decode;
        let handle = BlockHandle::decode_from(&mut std::io::Cursor::new(it.value()))
            .map_err(|_| crate::Error::Corruption("undecodable fixed-size filter index entry"))?;

        let filter = fetch(handle)?;
        Ok(filter.contains(transformed_key))
    }

    #[must_use]
    pub fn approximate_memory_usage(&self) -> usize {
        self.index.size_in_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::{Decode, Encode};
    use crate::comparator::BytewiseComparator;
    use varint_rs::VarintWriter;

    fn build_filter_index(entries: &[(&[u8], BlockHandle)]) -> Arc<Block> {
        let mut data = Vec::new();
        let mut restarts = Vec::new();
        for (key, handle) in entries {
            restarts.push(data.len() as u32);
            let mut value = Vec::new();
            handle.encode_into(&mut value).unwrap();
            data.write_u32_varint(0).unwrap();
            #[allow(clippy::cast_possible_truncation)]
            data.write_u32_varint(key.len() as u32).unwrap();
            #[allow(clippy::cast_possible_truncation)]
            data.write_u32_varint(value.len() as u32).unwrap();
            data.extend_from_slice(key);
            data.extend_from_slice(&value);
        }
        for r in &restarts {
            data.extend_from_slice(&r.to_le_bytes());
        }
        #[allow(clippy::cast_possible_truncation)]
        data.extend_from_slice(&(restarts.len() as u32).to_le_bytes());
        Arc::new(Block::parse(crate::Slice::from(data)).unwrap())
    }

    fn filter_with(keys: &[&[u8]]) -> BloomFilter {
        let mut filter = BloomFilter::with_fp_rate(keys.len().max(1), 0.01);
        for key in keys {
            filter.set_with_hash(BloomFilter::get_hash(key));
        }
        filter
    }

    #[test]
    fn finds_covering_filter_block() {
        // Two filter-index ranges, keyed by their inclusive upper bound.
        let index = build_filter_index(&[
            (b"ggg", BlockHandle::new(0, 10)),
            (b"zzz", BlockHandle::new(10, 10)),
        ]);
        let reader = FixedSizeFilterReader::new(index, Arc::new(BytewiseComparator));

        let filters = [
            (BlockHandle::new(0, 10), filter_with(&[b"aaa", b"bbb"])),
            (BlockHandle::new(10, 10), filter_with(&[b"www"])),
        ];
        let fetch = |h: BlockHandle| -> crate::Result<Arc<BloomFilter>> {
            filters
                .iter()
                .find(|(handle, _)| *handle == h)
                .map(|(_, f)| Arc::new(BloomFilter::decode_from(&mut std::io::Cursor::new(f.encode_into_vec())).unwrap()))
                .ok_or(crate::Error::Corruption("no such filter in test fixture"))
        };

        assert!(reader.key_may_match(b"aaa", &fetch).unwrap());
        assert!(!reader.key_may_match(b"ccc", &fetch).unwrap());
        assert!(reader.key_may_match(b"www", &fetch).unwrap());
    }

    #[test]
    fn past_last_range_is_not_matching_sentinel() {
        let index = build_filter_index(&[(b"mmm", BlockHandle::new(0, 10))]);
        let reader = FixedSizeFilterReader::new(index, Arc::new(BytewiseComparator));
        let fetch = |_: BlockHandle| -> crate::Result<Arc<BloomFilter>> {
            panic!("must not fetch past the last covered range")
        };
        assert!(!reader.key_may_match(b"zzz", &fetch).unwrap());
    }
}
