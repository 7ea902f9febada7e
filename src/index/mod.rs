// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Pluggable index readers (spec §4.4 "Index readers"): binary-search over
//! the index block, optionally accelerated by a hash-prefix auxiliary.

pub mod hash;

use crate::block::iter::BlockIter;
use crate::block::{Block, BlockHandle};
use crate::comparator::Comparator;
use crate::prefix_extractor::PrefixExtractor;
use hash::HashIndexAux;
use std::sync::Arc;

/// An index reader: locates the data-block handle whose range may contain a
/// target key (spec §4.4).
pub enum IndexReader<C> {
    /// Plain restart-point binary search over the index block (spec §4.4
    /// "Binary-search index").
    BinarySearch {
        block: Arc<Block>,
        comparator: Arc<C>,
    },
    /// Binary search accelerated by an in-memory prefix → restart-range
    /// auxiliary (spec §4.4 "Hash-augmented index"). Falls back to plain
    /// binary search whenever the target is outside the prefix extractor's
    /// domain, or when `total_order_seek` is requested.
    Hash {
        block: Arc<Block>,
        comparator: Arc<C>,
        aux: Arc<HashIndexAux>,
        extractor: Arc<dyn PrefixExtractor>,
    },
}

impl<C: Comparator> IndexReader<C> {
    /// Builds a hash-augmented reader, falling back to plain binary search
    /// if [`HashIndexAux::build`] fails (spec §4.4 "degrades silently").
    pub fn new_hash(
        block: Arc<Block>,
        comparator: Arc<C>,
        extractor: Arc<dyn PrefixExtractor>,
        allow_collision: bool,
    ) -> Self {
        match HashIndexAux::build(&block, &comparator, extractor.as_ref(), allow_collision) {
            Some(aux) => Self::Hash {
                block,
                comparator,
                aux: Arc::new(aux),
                extractor,
            },
            None => {
                log::warn!("hash index construction failed, falling back to binary search");
                Self::BinarySearch { block, comparator }
            }
        }
    }

    /// Approximate heap footprint of the index reader, beyond the shared
    /// block bytes (which the cache already accounts for separately).
    #[must_use]
    pub fn approximate_memory_usage(&self) -> usize {
        match self {
            Self::BinarySearch { .. } => 0,
            Self::Hash { aux, .. } => aux.approximate_memory_usage(),
        }
    }

    /// Creates a new iterator over this index.
    ///
    /// `total_order_seek` disables the hash acceleration for this iterator
    /// instance, forcing plain binary search (spec §4.4 "total order seek"
    /// / `ReadOptions::total_order_seek`).
    #[must_use]
    pub fn new_iterator(&self, total_order_seek: bool) -> IndexIter<C> {
        match self {
            Self::BinarySearch { block, comparator } => IndexIter {
                inner: BlockIter::new(Arc::clone(block), Arc::clone(comparator)),
                aux: None,
                extractor: None,
            },
            Self::Hash {
                block,
                comparator,
                aux,
                extractor,
            } => IndexIter {
                inner: BlockIter::new(Arc::clone(block), Arc::clone(comparator)),
                aux: if total_order_seek {
                    None
                } else {
                    Some(Arc::clone(aux))
                },
                extractor: Some(Arc::clone(extractor)),
            },
        }
    }
}

/// A cursor over an index block, yielding decoded [`BlockHandle`]s (spec
/// §4.4).
pub struct IndexIter<C> {
    inner: BlockIter<C>,
    aux: Option<Arc<HashIndexAux>>,
    extractor: Option<Arc<dyn PrefixExtractor>>,
}

impl<C: Comparator> IndexIter<C> {
    #[must_use]
    pub fn valid(&self) -> bool {
        self.inner.valid()
    }

    pub fn status(&self) -> crate::Result<()> {
        self.inner.status()
    }

    #[must_use]
    pub fn key(&self) -> &[u8] {
        self.inner.key()
    }

    /// Decodes the current entry's value as a [`BlockHandle`].
    ///
    /// # Errors
    ///
    /// `Corruption` if the value bytes are not a valid handle.
    pub fn value(&self) -> crate::Result<BlockHandle> {
        use crate::coding::Decode;
        BlockHandle::decode_from(&mut std::io::Cursor::new(self.inner.value()))
            .map_err(|_| crate::Error::Corruption("bad index entry value"))
    }

    pub fn seek_to_first(&mut self) {
        self.inner.seek_to_first();
    }

    pub fn seek_to_last(&mut self) {
        self.inner.seek_to_last();
    }

    pub fn next(&mut self) {
        self.inner.next();
    }

    pub fn prev(&mut self) {
        self.inner.prev();
    }

    /// Positions the cursor at the first entry whose key is `>= target`.
    ///
    /// When a hash auxiliary is active and `target` is within the prefix
    /// extractor's domain, restricts the binary search to the restart range
    /// the auxiliary reports for `target`'s prefix; otherwise falls back to
    /// a full binary search over the whole block.
    pub fn seek(&mut self, target: &[u8]) {
        if let (Some(aux), Some(extractor)) = (&self.aux, &self.extractor) {
            if extractor.in_domain(target) {
                let prefix = extractor.transform(target);
                if let Some(range) = aux.lookup(prefix) {
                    self.inner.seek_within_restart_range(range, target);
                    return;
                }
            }
        }
        self.inner.seek(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::BytewiseComparator;
    use crate::prefix_extractor::FixedPrefixExtractor;
    use varint_rs::VarintWriter;

    fn build_index_block(entries: &[(&[u8], BlockHandle)]) -> Arc<Block> {
        let mut data = Vec::new();
        let mut restarts = Vec::new();
        for (key, handle) in entries {
            restarts.push(data.len() as u32);
            let mut value = Vec::new();
            use crate::coding::Encode;
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

    #[test]
    fn binary_search_index_seeks_to_handle() {
        let block = build_index_block(&[
            (b"aaa", BlockHandle::new(0, 10)),
            (b"bbb", BlockHandle::new(10, 10)),
            (b"ccc", BlockHandle::new(20, 10)),
        ]);
        let reader = IndexReader::BinarySearch {
            block,
            comparator: Arc::new(BytewiseComparator),
        };
        let mut it = reader.new_iterator(false);
        it.seek(b"bb");
        assert!(it.valid());
        assert_eq!(it.key(), b"bbb");
        assert_eq!(it.value().unwrap(), BlockHandle::new(10, 10));
    }

    #[test]
    fn hash_index_finds_same_handle_as_binary_search() {
        let block = build_index_block(&[
            (b"aa1", BlockHandle::new(0, 10)),
            (b"aa2", BlockHandle::new(10, 10)),
            (b"bb1", BlockHandle::new(20, 10)),
        ]);
        let comparator = Arc::new(BytewiseComparator);
        let extractor: Arc<dyn PrefixExtractor> = Arc::new(FixedPrefixExtractor::new(2));

        let reader = IndexReader::new_hash(block, comparator, extractor, false);
        assert!(matches!(reader, IndexReader::Hash { .. }));

        let mut it = reader.new_iterator(false);
        it.seek(b"aa2");
        assert!(it.valid());
        assert_eq!(it.key(), b"aa2");
        assert_eq!(it.value().unwrap(), BlockHandle::new(10, 10));
    }

    #[test]
    fn total_order_seek_bypasses_hash_acceleration() {
        let block = build_index_block(&[
            (b"aa1", BlockHandle::new(0, 10)),
            (b"bb1", BlockHandle::new(20, 10)),
        ]);
        let comparator = Arc::new(BytewiseComparator);
        let extractor: Arc<dyn PrefixExtractor> = Arc::new(FixedPrefixExtractor::new(2));

        let reader = IndexReader::new_hash(block, comparator, extractor, false);
        let mut it = reader.new_iterator(true);
        it.seek(b"aa1");
        assert!(it.valid());
        assert_eq!(it.key(), b"aa1");
    }
}
