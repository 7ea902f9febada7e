// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The table reader itself: `Open`, `Get`, `PrefixMayMatch`, `Prefetch`, and
//! the data-block iterator factory (spec §4.6-§4.10).

use crate::bloom::BloomFilter;
use crate::block::{self, Block, BlockHandle, CompressedBlock};
use crate::cache::{BlockCache, CacheKey, FileCacheKeyPrefix};
use crate::coding::Decode;
use crate::comparator::{BytewiseComparator, Comparator};
use crate::config::{IndexType, ReadOptions, ReadTier, TableOptions};
use crate::filter::block_based::BlockBasedFilterReader;
use crate::filter::fixed_size::{FilterFetcher, FixedSizeFilterReader};
use crate::filter::full::FullFilterReader;
use crate::filter::{FilterReader, IdentityKeyTransformer, KeyTransformer};
use crate::footer::Footer;
use crate::index::IndexReader;
use crate::key::{InternalKey, ValueType};
use crate::meta::{self, FilterKind, MetaIndex, TableProperties};
use crate::stats::{Statistics, Ticker};
use crate::two_level_iter::{DataBlockSource, TwoLevelIterator};
use std::cmp::Ordering;
use std::io::{Read, Seek};
use std::sync::{Arc, Mutex, OnceLock};

/// Bundles the two logical block caches a table may be configured with
/// (spec §4.3 "Two logical caches").
#[derive(Clone, Default)]
pub struct TableCaches {
    pub uncompressed: Option<Arc<BlockCache<Block>>>,
    pub compressed: Option<Arc<BlockCache<CompressedBlock>>>,
}

/// Outcome of [`Table::get`] (spec §4.9 / §6 "Error codes").
pub enum GetResult {
    /// The key's value.
    Found(crate::Slice),
    /// The key is definitively absent.
    NotFound,
    /// `read_tier = BlockCacheTier` prevented a file read that would have
    /// been needed to decide (spec §4.9 step 3 "`MarkKeyMayExist`").
    Incomplete,
}

/// A reader over one sorted-string table (spec §3-§4).
pub struct Table<R, C = BytewiseComparator> {
    file: Mutex<R>,
    file_size: u64,
    footer: Footer,
    cache_key_prefix: FileCacheKeyPrefix,
    options: TableOptions,
    comparator: Arc<C>,
    prefix_extractor: Option<crate::config::SharedPrefixExtractor>,
    key_transformer: Arc<dyn KeyTransformer>,
    statistics: Arc<dyn Statistics>,
    caches: TableCaches,
    properties: TableProperties,
    filter_info: Option<(FilterKind, BlockHandle)>,
    index: OnceLock<Arc<IndexReader<C>>>,
    filter: OnceLock<Option<Arc<FilterReader<C>>>>,
}

impl<R: Read + Seek, C: Comparator> Table<R, C> {
    /// Opens a table (spec §4.6).
    ///
    /// # Errors
    ///
    /// `Corruption` on a malformed footer, meta-index, or properties block;
    /// `Io` on a read failure.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        mut file: R,
        file_size: u64,
        comparator: C,
        options: TableOptions,
        caches: TableCaches,
        prefix_extractor: Option<crate::config::SharedPrefixExtractor>,
        key_transformer: Option<Arc<dyn KeyTransformer>>,
        statistics: Option<Arc<dyn Statistics>>,
    ) -> crate::Result<Self> {
        let footer = Footer::read(&mut file, file_size)?;
        let verify_checksums = options.checksum_kind != crate::config::ChecksumKind::None;

        let meta_block = read_block_direct(&mut file, footer.metaindex_handle, verify_checksums)?;
        let meta_index = MetaIndex::parse(Arc::new(meta_block));

        let filter_info = if options.skip_filters {
            None
        } else {
            meta_index.find_filter(&options.filter_policy_name)?
        };

        let mut properties = TableProperties::default();
        if let Some(handle) = meta_index.find(meta::PROPERTIES_NAME)? {
            let block = read_block_direct(&mut file, handle, verify_checksums)?;
            properties = meta::parse_properties(&Arc::new(block))?;
        }

        let table = Self {
            file: Mutex::new(file),
            file_size,
            footer,
            cache_key_prefix: FileCacheKeyPrefix::next(),
            comparator: Arc::new(comparator),
            prefix_extractor,
            key_transformer: key_transformer.unwrap_or_else(|| Arc::new(IdentityKeyTransformer)),
            statistics: statistics.unwrap_or_else(|| Arc::new(crate::stats::NoopStatistics)),
            caches,
            properties,
            filter_info,
            options,
            index: OnceLock::new(),
            filter: OnceLock::new(),
        };

        if table.options.prefetch_index_and_filter {
            table.index()?;
            table.filter()?;

            if table.options.cache_index_and_filter_blocks {
                table.warm_index_cache()?;
            }
        }

        Ok(table)
    }

    /// Mirrors the index block's bytes into the uncompressed cache so
    /// cache-introspection call sites observe it as resident (spec §4.6
    /// step 6 "cache_index_and_filter_blocks").
    ///
    /// Non-fixed-size filter blocks are not on-disk in the restart-point
    /// [`Block`] format this cache stores, so only the index block (and,
    /// for a fixed-size filter, its filter-index block, which *is* a
    /// [`Block`]) participate; full/block-based filter bytes are held only
    /// as the already-parsed [`FilterReader`] resident on `self.filter`.
    fn warm_index_cache(&self) -> crate::Result<()> {
        let Some(cache) = &self.caches.uncompressed else {
            return Ok(());
        };

        let verify = self.options.checksum_kind != crate::config::ChecksumKind::None;
        let mut file = self.file.lock().expect("file mutex poisoned");

        let block = Arc::new(read_block_direct(&mut *file, self.footer.index_handle, verify)?);
        let key = CacheKey::new(self.cache_key_prefix, self.footer.index_handle.offset());
        let charge = block.size_in_bytes() as u64;
        let handle = cache.insert(key, block, charge, 0);
        cache.release(handle);

        if let Some((FilterKind::FixedSize, handle_loc)) = self.filter_info {
            let block = Arc::new(read_block_direct(&mut *file, handle_loc, verify)?);
            let key = CacheKey::new(self.cache_key_prefix, handle_loc.offset());
            let charge = block.size_in_bytes() as u64;
            let cache_handle = cache.insert(key, block, charge, 0);
            cache.release(cache_handle);
        }

        Ok(())
    }

    fn effective_whole_key_filtering(&self) -> bool {
        self.options.whole_key_filtering && self.properties.whole_key_filtering
    }

    fn effective_prefix_filtering(&self) -> bool {
        self.options.prefix_filtering && self.properties.prefix_filtering
    }

    pub(crate) fn index(&self) -> crate::Result<&Arc<IndexReader<C>>> {
        if self.index.get().is_none() {
            let verify = self.options.checksum_kind != crate::config::ChecksumKind::None;
            let block = {
                let mut file = self.file.lock().expect("file mutex poisoned");
                Arc::new(read_block_direct(&mut *file, self.footer.index_handle, verify)?)
            };

            // The file itself records which index shape its writer produced
            // (spec §6 "rocksdb.block.based.table.index.type"); honor that
            // over the caller's `options.index_type` when present, since the
            // index block's bytes were laid out for one specific shape and
            // `options` is only a hint for tables that predate the property.
            let index_type = self.properties.index_type.unwrap_or(self.options.index_type);

            let reader = match index_type {
                IndexType::HashSearch if self.prefix_extractor.is_some() => IndexReader::new_hash(
                    block,
                    Arc::clone(&self.comparator),
                    Arc::clone(self.prefix_extractor.as_ref().expect("checked Some above")),
                    self.options.hash_index_allow_collision,
                ),
                _ => IndexReader::BinarySearch {
                    block,
                    comparator: Arc::clone(&self.comparator),
                },
            };

            let _ = self.index.set(Arc::new(reader));
        }
        Ok(self.index.get().expect("just initialized"))
    }

    pub(crate) fn filter(&self) -> crate::Result<&Option<Arc<FilterReader<C>>>> {
        if self.filter.get().is_none() {
            let built = match self.filter_info {
                None => None,
                Some((kind, handle)) => {
                    let verify = self.options.checksum_kind != crate::config::ChecksumKind::None;
                    let mut file = self.file.lock().expect("file mutex poisoned");
                    let reader = match kind {
                        FilterKind::Full => {
                            let bytes = read_decompressed(&mut *file, handle, verify)?;
                            let filter = BloomFilter::decode_from(&mut std::io::Cursor::new(bytes))
                                .map_err(|_| crate::Error::Corruption("undecodable full filter"))?;
                            FilterReader::Full(FullFilterReader::new(filter))
                        }
                        FilterKind::BlockBased => {
                            let bytes = read_decompressed(&mut *file, handle, verify)?;
                            FilterReader::BlockBased(BlockBasedFilterReader::parse(bytes)?)
                        }
                        FilterKind::FixedSize => {
                            let block = read_block_direct(&mut *file, handle, verify)?;
                            FilterReader::FixedSize(FixedSizeFilterReader::new(
                                Arc::new(block),
                                Arc::clone(&self.comparator),
                            ))
                        }
                    };
                    Some(Arc::new(reader))
                }
            };
            let _ = self.filter.set(built);
        }
        Ok(self.filter.get().expect("just initialized"))
    }

    /// Fetches the bloom filter stored in the filter block at `handle`, for
    /// a fixed-size filter's per-probe lookup.
    ///
    /// Unlike data blocks, these are read straight from file on every call
    /// rather than through a cache: their on-disk shape (raw encoded
    /// [`BloomFilter`] bytes) doesn't fit the [`Block`]-typed uncompressed
    /// cache, and adding a third cache type purely for this would
    /// complicate the two-cache design spec §4.3 describes for a marginal
    /// case (a table's filter-index block is already resident once parsed;
    /// only the handful of filter payloads it points to are re-read).
    pub(crate) fn fetch_fixed_size_filter(&self, handle: BlockHandle) -> crate::Result<Arc<BloomFilter>> {
        let verify = self.options.checksum_kind != crate::config::ChecksumKind::None;
        let mut file = self.file.lock().expect("file mutex poisoned");
        let bytes = read_decompressed(&mut *file, handle, verify)?;
        let filter = BloomFilter::decode_from(&mut std::io::Cursor::new(bytes)).map_err(|_| {
            log::warn!("fixed-size filter block at offset {} is corrupt", handle.offset());
            crate::Error::Corruption("undecodable fixed-size filter entry")
        })?;
        Ok(Arc::new(filter))
    }

    /// Point lookup (spec §4.9).
    ///
    /// # Errors
    ///
    /// Propagates I/O or corruption errors encountered while resolving
    /// filter, index, or data blocks.
    pub fn get(&self, read_options: &ReadOptions, key: &InternalKey) -> crate::Result<GetResult> {
        let filter = self.filter()?;
        let prefix = self
            .prefix_extractor
            .as_ref()
            .filter(|_| self.effective_prefix_filtering())
            .filter(|ext| ext.in_domain(&key.user_key))
            .map(|ext| ext.transform(&key.user_key));

        let mut internal_key_bytes = Vec::new();
        {
            use crate::coding::Encode;
            key.encode_into(&mut internal_key_bytes)
                .expect("writing into a Vec cannot fail");
        }

        if let Some(filter) = filter.as_deref() {
            if filter.is_block_based() {
                let mut index_iter = self.index()?.new_iterator(read_options.total_order_seek);
                index_iter.seek(&internal_key_bytes);
                if !index_iter.valid() {
                    index_iter.status()?;
                    return Ok(GetResult::NotFound);
                }
                let handle = index_iter.value()?;
                if !filter.key_may_match_at_block(&key.user_key, handle.offset())? {
                    self.statistics.record_ticker(Ticker::BloomFilterUseful, 1);
                    return Ok(GetResult::NotFound);
                }
            } else {
                let transformed_key = self.key_transformer.transform(&key.user_key);
                let fetch: &FilterFetcher<'_> = &|h| self.fetch_fixed_size_filter(h);
                let may_match = filter.non_block_based_key_may_match(
                    transformed_key,
                    prefix,
                    self.effective_whole_key_filtering(),
                    self.effective_prefix_filtering(),
                    fetch,
                )?;
                if !may_match {
                    self.statistics.record_ticker(Ticker::BloomFilterUseful, 1);
                    return Ok(GetResult::NotFound);
                }
            }
        }

        let source = TableDataSource { table: self, options: read_options.clone() };
        let mut it = TwoLevelIterator::new(self.index()?.new_iterator(read_options.total_order_seek), source);
        it.seek(&internal_key_bytes);

        loop {
            if it.is_incomplete() {
                return Ok(GetResult::Incomplete);
            }
            if !it.valid() {
                it.status()?;
                return Ok(GetResult::NotFound);
            }

            let found = InternalKey::decode_from(&mut std::io::Cursor::new(it.key()))
                .map_err(|_| crate::Error::Corruption("undecodable internal key in data block"))?;

            match self.comparator.cmp(&found.user_key, &key.user_key) {
                Ordering::Equal => {
                    if found.value_type == ValueType::Tombstone {
                        return Ok(GetResult::NotFound);
                    }
                    return Ok(GetResult::Found(crate::Slice::from(it.value())));
                }
                Ordering::Greater => return Ok(GetResult::NotFound),
                Ordering::Less => {}
            }

            it.next();
        }
    }

    /// `PrefixMayMatch` (spec §4.9 "Prefix Seek optimization").
    ///
    /// Never issues file I/O beyond what's already been read for the index
    /// and filter (spec §4.9 "Non-IO invariant"): a cache miss on the
    /// candidate data block is treated as "inconclusive, so say yes".
    ///
    /// # Errors
    ///
    /// Propagates corruption errors from a malformed index entry.
    pub fn prefix_may_match(&self, prefix: &[u8]) -> crate::Result<bool> {
        let filter = self.filter()?;
        if let Some(filter) = filter.as_deref() {
            if !filter.is_block_based() {
                let fetch: &FilterFetcher<'_> = &|h| self.fetch_fixed_size_filter(h);
                let may_match = filter.non_block_based_key_may_match(prefix, Some(prefix), false, true, fetch)?;
                if !may_match {
                    return Ok(false);
                }
            }
        }

        let synthetic = InternalKey::new(prefix, u64::MAX, ValueType::Value);
        let mut synthetic_bytes = Vec::new();
        {
            use crate::coding::Encode;
            synthetic
                .encode_into(&mut synthetic_bytes)
                .expect("writing into a Vec cannot fail");
        }

        let no_io = ReadOptions {
            read_tier: ReadTier::BlockCacheTier,
            ..ReadOptions::default()
        };
        let mut index_iter = self.index()?.new_iterator(false);
        index_iter.seek(&synthetic_bytes);

        if !index_iter.valid() {
            index_iter.status()?;
            return Ok(true);
        }

        let handle = index_iter.value()?;

        match self.open_data_block_for_read(&no_io, handle)? {
            Some(mut block_iter) => {
                block_iter.seek_to_first();
                if block_iter.valid() {
                    let candidate = InternalKey::decode_from(&mut std::io::Cursor::new(block_iter.key()))
                        .map_err(|_| crate::Error::Corruption("undecodable internal key in data block"))?;
                    if candidate.user_key.starts_with(prefix) {
                        return Ok(true);
                    }
                }

                if let Some(filter) = filter.as_deref() {
                    if filter.is_block_based() {
                        return filter.key_may_match_at_block(prefix, handle.offset());
                    }
                }
                Ok(true)
            }
            // Incomplete under no_io: conservatively true (spec §4.9).
            None => Ok(true),
        }
    }

    /// Range warmup (spec §4.10): forces a data-block load for every entry
    /// from `begin` (or the first entry) while the index key is `< end`,
    /// plus one boundary block past `end`.
    ///
    /// # Errors
    ///
    /// Propagates I/O or corruption errors.
    pub fn prefetch(&self, begin: Option<&[u8]>, end: Option<&[u8]>) -> crate::Result<()> {
        let mut index_iter = self.index()?.new_iterator(true);
        match begin {
            Some(b) => index_iter.seek(b),
            None => index_iter.seek_to_first(),
        }

        let read_options = ReadOptions::default();
        let mut past_end = false;

        while index_iter.valid() {
            if let Some(end) = end {
                if !past_end && self.comparator.cmp(index_iter.key(), end) != Ordering::Less {
                    past_end = true;
                }
            }

            let handle = index_iter.value()?;
            self.open_data_block_for_read(&read_options, handle)?;

            if past_end {
                break;
            }
            index_iter.next();
        }

        Ok(())
    }

    /// Approximate byte offset of `key` within the file (spec §11
    /// supplement).
    ///
    /// # Errors
    ///
    /// Propagates corruption errors from a malformed index.
    pub fn approximate_offset_of(&self, key: &[u8]) -> crate::Result<u64> {
        let mut index_iter = self.index()?.new_iterator(true);
        index_iter.seek(key);
        if index_iter.valid() {
            Ok(index_iter.value()?.offset())
        } else {
            index_iter.status()?;
            Ok(self.footer.metaindex_handle.offset())
        }
    }

    /// The table's on-disk size.
    #[must_use]
    pub fn approximate_size(&self) -> u64 {
        self.file_size
    }

    /// `true` if the block at `handle` is currently resident in the
    /// uncompressed cache. Used by tests as `TEST_KeyInCache` (spec §8
    /// scenario 2).
    #[doc(hidden)]
    #[must_use]
    pub fn test_key_in_cache(&self, handle: BlockHandle) -> bool {
        self.caches
            .uncompressed
            .as_ref()
            .is_some_and(|cache| cache.contains(CacheKey::new(self.cache_key_prefix, handle.offset())))
    }

    /// Evicts the block at `handle` from the uncompressed cache, as if it
    /// had aged out under the cache's own admission policy. Used by tests
    /// as `TEST_` cache introspection (spec §8 scenario 2 "Evict").
    #[doc(hidden)]
    pub fn test_evict_from_cache(&self, handle: BlockHandle) {
        if let Some(cache) = &self.caches.uncompressed {
            cache.remove(CacheKey::new(self.cache_key_prefix, handle.offset()));
        }
    }

    fn open_data_block_for_read(
        &self,
        read_options: &ReadOptions,
        handle: BlockHandle,
    ) -> crate::Result<Option<crate::block::iter::BlockIter<C>>> {
        let source = TableDataSource { table: self, options: read_options.clone() };
        source.open_data_block(handle)
    }

    /// Builds a raw two-level iterator over the whole table, honoring
    /// `read_options`'s cache/IO/total-order-seek policy (spec §4.8
    /// `NewIterator`).
    ///
    /// # Errors
    ///
    /// Propagates index-block resolution errors.
    pub(crate) fn new_raw_iterator<'t>(
        &'t self,
        read_options: &ReadOptions,
    ) -> crate::Result<TwoLevelIterator<C, TableDataSource<'t, R, C>>> {
        let source = TableDataSource { table: self, options: read_options.clone() };
        Ok(TwoLevelIterator::new(self.index()?.new_iterator(read_options.total_order_seek), source))
    }

    pub(crate) fn statistics(&self) -> &dyn Statistics {
        self.statistics.as_ref()
    }

    /// Opens a [`crate::scanner::Scanner`] over the whole table, honoring
    /// `read_options`'s cache/IO policy (spec §11 supplement).
    ///
    /// # Errors
    ///
    /// Propagates index-block resolution errors.
    pub fn scan<'t>(&'t self, read_options: &ReadOptions) -> crate::Result<crate::scanner::Scanner<'t, R, C>> {
        crate::scanner::Scanner::new(self, read_options)
    }
}

/// Wraps a borrowed [`Table`] with the [`ReadOptions`] in effect for one
/// call, implementing [`DataBlockSource`] (spec §4.7 `NewDataBlockIterator`).
pub(crate) struct TableDataSource<'t, R, C> {
    table: &'t Table<R, C>,
    options: ReadOptions,
}

impl<'t, R: Read + Seek, C: Comparator> DataBlockSource<C> for TableDataSource<'t, R, C> {
    fn open_data_block(&self, handle: BlockHandle) -> crate::Result<Option<crate::block::iter::BlockIter<C>>> {
        let table = self.table;
        let opts = &self.options;
        let cache_key = CacheKey::new(table.cache_key_prefix, handle.offset());

        if let Some(cache) = &table.caches.uncompressed {
            if let Some(h) = cache.lookup(cache_key, opts.query_id) {
                table.statistics.record_ticker(Ticker::BlockCacheHit, 1);
                let block = h.value_arc();
                cache.release(h);
                return Ok(Some(crate::block::iter::BlockIter::new(block, Arc::clone(&table.comparator))));
            }
        }

        if let Some(ccache) = &table.caches.compressed {
            if let Some(h) = ccache.lookup(cache_key, opts.query_id) {
                let compressed = h.value_arc();
                ccache.release(h);
                let decompressed = block::decompress_block(&compressed.bytes, compressed.compression)?;
                let parsed = Arc::new(Block::parse(decompressed)?);

                if opts.fill_cache {
                    if let Some(cache) = &table.caches.uncompressed {
                        let charge = parsed.size_in_bytes() as u64;
                        let h = cache.insert(cache_key, Arc::clone(&parsed), charge, opts.query_id);
                        cache.release(h);
                    }
                }

                table.statistics.record_ticker(Ticker::BlockCacheHit, 1);
                return Ok(Some(crate::block::iter::BlockIter::new(parsed, Arc::clone(&table.comparator))));
            }
        }

        if matches!(opts.read_tier, ReadTier::BlockCacheTier) {
            return Ok(None);
        }

        table.statistics.record_ticker(Ticker::BlockCacheMiss, 1);
        let (raw, compression) = {
            let mut file = table.file.lock().expect("file mutex poisoned");
            block::read_raw_block(&mut *file, handle, opts.verify_checksums)?
        };

        if let Some(ccache) = &table.caches.compressed {
            let compressed_block = Arc::new(CompressedBlock { bytes: raw.clone(), compression });
            let charge = compressed_block.size_in_bytes() as u64;
            let h = ccache.insert(cache_key, compressed_block, charge, opts.query_id);
            ccache.release(h);
        }

        let decompressed = block::decompress_block(&raw, compression)?;
        let parsed = Arc::new(Block::parse(decompressed)?);

        if opts.fill_cache {
            if let Some(cache) = &table.caches.uncompressed {
                let charge = parsed.size_in_bytes() as u64;
                let h = cache.insert(cache_key, Arc::clone(&parsed), charge, opts.query_id);
                cache.release(h);
            }
        }

        Ok(Some(crate::block::iter::BlockIter::new(parsed, Arc::clone(&table.comparator))))
    }
}

/// Reads a block straight from file without going through either cache,
/// parsed into the restart-point [`Block`] format (used for the
/// meta-index, properties, and fixed-size filter-index blocks, all of
/// which share that on-disk shape).
fn read_block_direct<R: Read + Seek>(file: &mut R, handle: BlockHandle, verify_checksums: bool) -> crate::Result<Block> {
    let (raw, compression) = block::read_raw_block(file, handle, verify_checksums)?;
    let decompressed = block::decompress_block(&raw, compression)?;
    Block::parse(decompressed)
}

/// Reads and decompresses a block's bytes without parsing them as a
/// [`Block`] (used for full/block-based filter blocks and fixed-size
/// filter payload blocks, none of which are restart-point encoded).
fn read_decompressed<R: Read + Seek>(file: &mut R, handle: BlockHandle, verify_checksums: bool) -> crate::Result<Vec<u8>> {
    let (raw, compression) = block::read_raw_block(file, handle, verify_checksums)?;
    let decompressed = block::decompress_block(&raw, compression)?;
    Ok(decompressed.to_vec())
}
