// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The hash-augmented index's in-memory auxiliary (spec §4.4
//! "Hash-augmented index").
//!
//! Real `rocksdb` builds this from two on-disk meta-blocks a matching
//! writer emits (`rocksdb.hashindex.prefixes` /
//! `rocksdb.hashindex.prefixesmetadata`). That wire encoding is an
//! implementation detail the spec does not pin down (see `DESIGN.md`), so
//! this reader instead builds the same in-memory structure by scanning the
//! index block once at `Open` time with the configured
//! [`PrefixExtractor`](crate::prefix_extractor::PrefixExtractor) — the
//! externally observable behavior (accelerated `Seek`, silent degrade to
//! binary search on failure) is unchanged.

use crate::block::iter::BlockIter;
use crate::block::Block;
use crate::comparator::Comparator;
use crate::prefix_extractor::PrefixExtractor;
use rustc_hash::FxHashMap;
use std::ops::Range;
use std::sync::Arc;

/// Exact or collision-tolerant prefix → restart-range map.
pub enum HashIndexAux {
    /// One entry per distinct prefix; always correct (spec §4.4 "exact
    /// structure").
    Exact(FxHashMap<Vec<u8>, Range<usize>>),
    /// Fixed-size bucket array indexed by `hash(prefix) % buckets.len()`;
    /// collisions merge ranges, so a lookup may return a wider range than
    /// strictly necessary but never a narrower one (spec §4.4 "denser
    /// alternative structure with probabilistic membership").
    Dense { buckets: Vec<Option<Range<usize>>>, mask: u64 },
}

impl HashIndexAux {
    /// Scans `index_block` and builds the prefix → restart-range map.
    ///
    /// Returns `None` if any index key is not in the extractor's domain —
    /// the caller degrades to plain binary search in that case (spec §4.4
    /// "On construction failure ... degrades silently").
    pub fn build<C: Comparator>(
        index_block: &Arc<Block>,
        comparator: &Arc<C>,
        extractor: &dyn PrefixExtractor,
        allow_collision: bool,
    ) -> Option<Self> {
        let mut it = BlockIter::new(Arc::clone(index_block), Arc::clone(comparator));
        it.seek_to_first();

        let mut ranges: Vec<(Vec<u8>, usize)> = Vec::new();
        while it.valid() {
            let key = it.key();
            if !extractor.in_domain(key) {
                return None;
            }
            ranges.push((extractor.transform(key).to_vec(), it.current_restart_index()));
            it.next();
        }
        it.status().ok()?;

        if ranges.is_empty() {
            return None;
        }

        if allow_collision {
            let bucket_count = ranges.len().next_power_of_two().max(1);
            let mut buckets: Vec<Option<Range<usize>>> = vec![None; bucket_count];
            let mask = (bucket_count as u64) - 1;

            for (prefix, restart_index) in &ranges {
                let h = (crate::hash::hash64(prefix) & mask) as usize;
                #[allow(clippy::indexing_slicing)]
                match &mut buckets[h] {
                    Some(range) => {
                        if *restart_index < range.start {
                            range.start = *restart_index;
                        }
                        if *restart_index + 1 > range.end {
                            range.end = *restart_index + 1;
                        }
                    }
                    slot @ None => *slot = Some(*restart_index..*restart_index + 1),
                }
            }

            Some(Self::Dense { buckets, mask })
        } else {
            let mut map: FxHashMap<Vec<u8>, Range<usize>> = FxHashMap::default();
            for (prefix, restart_index) in ranges {
                map.entry(prefix)
                    .and_modify(|range| {
                        if restart_index < range.start {
                            range.start = restart_index;
                        }
                        if restart_index + 1 > range.end {
                            range.end = restart_index + 1;
                        }
                    })
                    .or_insert(restart_index..restart_index + 1);
            }
            Some(Self::Exact(map))
        }
    }

    /// Looks up the restart-point range that might contain `prefix`
    /// (already-extracted; callers apply the
    /// [`PrefixExtractor`](crate::prefix_extractor::PrefixExtractor)
    /// first).
    #[must_use]
    pub fn lookup(&self, prefix: &[u8]) -> Option<Range<usize>> {
        match self {
            Self::Exact(map) => map.get(prefix).cloned(),
            Self::Dense { buckets, mask } => {
                let h = (crate::hash::hash64(prefix) & mask) as usize;
                buckets.get(h).and_then(Clone::clone)
            }
        }
    }

    /// Approximate heap footprint, for index-reader memory accounting.
    #[must_use]
    pub fn approximate_memory_usage(&self) -> usize {
        match self {
            Self::Exact(map) => map.len() * (std::mem::size_of::<Range<usize>>() + 24),
            Self::Dense { buckets, .. } => buckets.len() * std::mem::size_of::<Option<Range<usize>>>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::BytewiseComparator;
    use crate::prefix_extractor::FixedPrefixExtractor;
    use varint_rs::VarintWriter;

    fn build_index_block(entries: &[(&[u8], &[u8])]) -> Arc<Block> {
        let mut data = Vec::new();
        let mut restarts = Vec::new();
        for (key, value) in entries {
            restarts.push(data.len() as u32);
            data.write_u32_varint(0).unwrap();
            #[allow(clippy::cast_possible_truncation)]
            data.write_u32_varint(key.len() as u32).unwrap();
            #[allow(clippy::cast_possible_truncation)]
            data.write_u32_varint(value.len() as u32).unwrap();
            data.extend_from_slice(key);
            data.extend_from_slice(value);
        }
        for r in &restarts {
            data.extend_from_slice(&r.to_le_bytes());
        }
        #[allow(clippy::cast_possible_truncation)]
        data.extend_from_slice(&(restarts.len() as u32).to_le_bytes());
        Arc::new(Block::parse(crate::Slice::from(data)).unwrap())
    }

    #[test]
    fn exact_index_groups_contiguous_prefixes() {
        let block = build_index_block(&[
            (b"aa1", b"h0"),
            (b"aa2", b"h1"),
            (b"bb1", b"h2"),
        ]);
        let comparator = Arc::new(BytewiseComparator);
        let extractor = FixedPrefixExtractor::new(2);

        let aux = HashIndexAux::build(&block, &comparator, &extractor, false).unwrap();
        let range = aux.lookup(b"aa").unwrap();
        assert_eq!(range, 0..2);
        let range = aux.lookup(b"bb").unwrap();
        assert_eq!(range, 2..3);
        assert!(aux.lookup(b"zz").is_none());
    }

    #[test]
    fn dense_index_never_shrinks_below_exact_range() {
        let block = build_index_block(&[(b"aa1", b"h0"), (b"aa2", b"h1"), (b"bb1", b"h2")]);
        let comparator = Arc::new(BytewiseComparator);
        let extractor = FixedPrefixExtractor::new(2);

        let aux = HashIndexAux::build(&block, &comparator, &extractor, true).unwrap();
        if let Some(range) = aux.lookup(b"aa") {
            assert!(range.contains(&0) && range.contains(&1));
        }
    }

    #[test]
    fn build_fails_when_key_not_in_domain() {
        let block = build_index_block(&[(b"a", b"h0")]);
        let comparator = Arc::new(BytewiseComparator);
        let extractor = FixedPrefixExtractor::new(4);
        assert!(HashIndexAux::build(&block, &comparator, &extractor, false).is_none());
    }
}
