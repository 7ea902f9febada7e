// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The block-based filter: one bloom filter per data block, addressed by
//! the data block's file offset (spec §4.5 "Block-based").

use crate::bloom::BloomFilter;
use crate::coding::{Decode, Encode};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// `(data_block_offset, filter_start, filter_len)`, sorted ascending by
/// `data_block_offset` so lookups binary-search.
type IndexEntry = (u64, u32, u32);

/// A per-data-block bloom filter collection.
pub struct BlockBasedFilterReader {
    data: Vec<u8>,
    index: Vec<IndexEntry>,
}

impl BlockBasedFilterReader {
    /// Builds a reader from `(data_block_offset, filter)` pairs, which must
    /// already be sorted ascending by offset (the writer emits them in file
    /// order, which is already ascending).
    #[cfg(any(test, feature = "test-util"))]
    pub(crate) fn build(filters: &[(u64, BloomFilter)]) -> Self {
        let mut data = Vec::new();
        let mut index = Vec::with_capacity(filters.len());
        for (offset, filter) in filters {
            let start = data.len();
            filter.encode_into(&mut data).expect("writing into a Vec cannot fail");
            #[allow(clippy::cast_possible_truncation)]
            index.push((*offset, start as u32, (data.len() - start) as u32));
        }
        Self { data, index }
    }

    #[cfg(any(test, feature = "test-util"))]
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut buf = self.data.clone();
        for (offset, start, len) in &self.index {
            buf.write_u64::<BigEndian>(*offset).expect("vec write");
            buf.write_u32::<BigEndian>(*start).expect("vec write");
            buf.write_u32::<BigEndian>(*len).expect("vec write");
        }
        #[allow(clippy::cast_possible_truncation)]
        buf.write_u32::<BigEndian>(self.index.len() as u32)
            .expect("vec write");
        buf
    }

    /// Parses a block-based filter block's decompressed bytes.
    ///
    /// # Errors
    ///
    /// `Corruption` if the trailing index is truncated or malformed.
    pub fn parse(data: Vec<u8>) -> crate::Result<Self> {
        if data.len() < 4 {
            return Err(crate::Error::Corruption("block-based filter block too small"));
        }
        let tail_start = data.len() - 4;
        let count = {
            let mut cursor = Cursor::new(
                data.get(tail_start..)
                    .ok_or(crate::Error::Corruption("truncated filter index count"))?,
            );
            cursor.read_u32::<BigEndian>()?
        } as usize;

        let entry_size = 16;
        let index_bytes_len = count
            .checked_mul(entry_size)
            .ok_or(crate::Error::Corruption("filter index count overflow"))?;
        let index_start = tail_start
            .checked_sub(index_bytes_len)
            .ok_or(crate::Error::Corruption("filter index out of bounds"))?;

        let mut index = Vec::with_capacity(count);
        let index_bytes = data
            .get(index_start..tail_start)
            .ok_or(crate::Error::Corruption("filter index out of bounds"))?;
        for chunk in index_bytes.chunks_exact(entry_size) {
            let mut cursor = Cursor::new(chunk);
            let offset = cursor.read_u64::<BigEndian>()?;
            let start = cursor.read_u32::<BigEndian>()?;
            let len = cursor.read_u32::<BigEndian>()?;
            index.push((offset, start, len));
        }

        Ok(Self { data, index })
    }

    fn filter_at(&self, entry: IndexEntry) -> crate::Result<BloomFilter> {
        let (_, start, len) = entry;
        let bytes = self
            .data
            .get(start as usize..(start as usize + len as usize))
            .ok_or(crate::Error::Corruption("filter entry out of bounds"))?;
        BloomFilter::decode_from(&mut Cursor::new(bytes))
            .map_err(|_| crate::Error::Corruption("undecodable block-based filter entry"))
    }

    /// Probes the filter covering the data block at `data_block_offset`
    /// (spec §4.5 "probes the per-block Bloom at `block_offset`").
    ///
    /// If no filter was recorded for that exact offset, conservatively
    /// returns `true` (no information ⇒ cannot rule the key out).
    ///
    /// # Errors
    ///
    /// `Corruption` if the matched filter entry is malformed.
    pub fn key_may_match(&self, key: &[u8], data_block_offset: u64) -> crate::Result<bool> {
        match self
            .index
            .binary_search_by_key(&data_block_offset, |(offset, _, _)| *offset)
        {
            Ok(i) => {
                #[allow(clippy::indexing_slicing)]
                let filter = self.filter_at(self.index[i])?;
                Ok(filter.contains(key))
            }
            Err(_) => Ok(true),
        }
    }

    #[must_use]
    pub fn approximate_memory_usage(&self) -> usize {
        self.data.len() + self.index.len() * std::mem::size_of::<IndexEntry>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_with(keys: &[&[u8]]) -> BloomFilter {
        let mut filter = BloomFilter::with_fp_rate(keys.len().max(1), 0.01);
        for key in keys {
            filter.set_with_hash(BloomFilter::get_hash(key));
        }
        filter
    }

    #[test]
    fn probes_correct_per_block_filter() {
        let reader = BlockBasedFilterReader::build(&[
            (0, filter_with(&[b"a1", b"a2"])),
            (100, filter_with(&[b"b1", b"b2"])),
        ]);

        assert!(reader.key_may_match(b"a1", 0).unwrap());
        assert!(!reader.key_may_match(b"b1", 0).unwrap());
        assert!(reader.key_may_match(b"b1", 100).unwrap());
    }

    #[test]
    fn unknown_offset_is_conservatively_true() {
        let reader = BlockBasedFilterReader::build(&[(0, filter_with(&[b"a1"]))]);
        assert!(reader.key_may_match(b"anything", 999).unwrap());
    }

    #[test]
    fn round_trips_through_parse() {
        let reader = BlockBasedFilterReader::build(&[
            (0, filter_with(&[b"a1"])),
            (50, filter_with(&[b"b1"])),
        ]);
        let bytes = reader.encode();
        let parsed = BlockBasedFilterReader::parse(bytes).unwrap();
        assert!(parsed.key_may_match(b"a1", 0).unwrap());
        assert!(parsed.key_may_match(b"b1", 50).unwrap());
    }
}
