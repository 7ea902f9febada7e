// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Reader- and table-level configuration (spec §6 "Reader inputs" / "Read options").

use crate::compression::CompressionType;
use std::sync::Arc;

/// Which checksum algorithm protects each block.
///
/// The reader currently only implements `Xxh3`; `None` exists so
/// `ReadOptions::verify_checksums = false` call sites can express "there is
/// nothing to check" without special-casing the checksum type.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum ChecksumKind {
    /// xxh3-64 over the block's (possibly compressed) bytes.
    #[default]
    Xxh3,
    /// No checksum is stored or verified.
    None,
}

/// Which shape the data-block index uses.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum IndexType {
    /// Plain binary search over the index block's restart points.
    #[default]
    BinarySearch,
    /// Binary search augmented with an in-memory prefix → restart-range map
    /// (spec §4.4).
    HashSearch,
}

/// Whether reads may fall through to file I/O.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum ReadTier {
    /// Ordinary reads: cache, then file.
    #[default]
    ReadAll,
    /// Reads must not touch the file; a cache miss yields `Incomplete`
    /// (spec §5 "Suspension points").
    BlockCacheTier,
}

/// Table-level (`Open`-time) options (spec §6 "table-options").
#[derive(Debug, Clone)]
pub struct TableOptions {
    /// Preferred index shape; silently downgraded to `BinarySearch` at Open
    /// if no prefix extractor is configured (spec §4.4 "Fallback rule").
    pub index_type: IndexType,

    /// Checksum algorithm blocks were written with.
    pub checksum_kind: ChecksumKind,

    /// Whether the hash-augmented index may use the denser,
    /// collision-tolerant structure instead of the exact one (spec §4.4).
    pub hash_index_allow_collision: bool,

    /// Whether non-block-based filters should also be probed with the
    /// whole (untransformed) key, not just its prefix (spec §4.5/§4.9).
    pub whole_key_filtering: bool,

    /// Whether the prefix extractor should be consulted by the filter at
    /// all; disabling this suppresses prefix-based filtering even if a
    /// prefix extractor is configured (spec §4.5).
    pub prefix_filtering: bool,

    /// Warm the index (and non-fixed-size filter) at Open time rather than
    /// lazily on first use (spec §4.6 step 6).
    pub prefetch_index_and_filter: bool,

    /// When prefetching, whether the warmed index/filter go through the
    /// cache (shared, evictable) or are pinned directly on the `Rep`
    /// (exclusive, never evicted) (spec §4.6 step 6).
    pub cache_index_and_filter_blocks: bool,

    /// Skip all filter probing, as if the file had no filter block.
    pub skip_filters: bool,

    /// The filter policy name a matching writer tagged its meta-index
    /// entries with (spec §6 "Meta-index names": `filter.<POLICY>` /
    /// `fullfilter.<POLICY>` / `fixedsizefilter.<POLICY>`).
    pub filter_policy_name: String,
}

/// Default filter policy name, matching the bloom filter this reader
/// actually implements.
pub const DEFAULT_FILTER_POLICY_NAME: &str = "rocksdb.BuiltinBloomFilter";

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            index_type: IndexType::default(),
            checksum_kind: ChecksumKind::default(),
            hash_index_allow_collision: false,
            whole_key_filtering: true,
            prefix_filtering: true,
            prefetch_index_and_filter: true,
            cache_index_and_filter_blocks: false,
            skip_filters: false,
            filter_policy_name: DEFAULT_FILTER_POLICY_NAME.to_string(),
        }
    }
}

/// Per-call read options (spec §6 "Read options").
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Whether this read may fall through to file I/O.
    pub read_tier: ReadTier,

    /// Whether blocks read from file should be inserted into the cache.
    pub fill_cache: bool,

    /// If set, index seeks ignore any hash auxiliary and always use binary
    /// search, visiting every block in order (spec §4.4).
    pub total_order_seek: bool,

    /// Whether filters should be consulted during ordinary (non-Get) scans.
    pub use_bloom_on_scan: bool,

    /// Whether to verify each block's checksum on read.
    pub verify_checksums: bool,

    /// Opaque value forwarded to the cache's admission/eviction policy;
    /// does not participate in cache-key equality (spec §4.3).
    pub query_id: u64,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            read_tier: ReadTier::default(),
            fill_cache: true,
            total_order_seek: false,
            use_bloom_on_scan: true,
            verify_checksums: true,
            query_id: 0,
        }
    }
}

/// A construction policy for the table's Bloom filter(s), mirroring the two
/// knobs a writer might have been configured with; the reader only needs
/// this to size a sentinel or to report statistics, never to rebuild a
/// filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BloomConstructionPolicy {
    /// Fixed number of bits of filter memory per key.
    BitsPerKey(f32),
    /// Target false-positive rate; bits per key derived from it.
    FalsePositiveRate(f32),
}

impl Default for BloomConstructionPolicy {
    fn default() -> Self {
        Self::BitsPerKey(10.0)
    }
}

/// Compression setting shared by the (test-only) writer and by
/// documentation of what a reader may encounter on file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct CompressionPolicy(pub CompressionType);

/// A reference-counted, shareable comparator/prefix-extractor pair, so a
/// single `TableOptions` can be cloned cheaply across many open tables.
pub type SharedPrefixExtractor = Arc<dyn crate::prefix_extractor::PrefixExtractor>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_options_default_prefers_binary_search() {
        let opts = TableOptions::default();
        assert_eq!(opts.index_type, IndexType::BinarySearch);
    }

    #[test]
    fn read_options_default_allows_io() {
        let opts = ReadOptions::default();
        assert_eq!(opts.read_tier, ReadTier::ReadAll);
    }
}
