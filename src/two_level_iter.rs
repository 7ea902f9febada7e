// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The two-level iterator and its `BloomFilterAwareIterator` wrapper (spec
//! §4.8).

use crate::block::iter::BlockIter;
use crate::block::Block;
use crate::comparator::Comparator;
use crate::filter::fixed_size::FilterFetcher;
use crate::filter::FilterReader;
use std::sync::Arc;

/// Resolves an index entry's [`crate::block::BlockHandle`] into a
/// data-block iterator, matching the caching/file-read policy of spec §4.7.
/// Implemented by the table so this module stays generic over the table's
/// file-reader and cache types.
///
/// Returns `Ok(None)` for the `no_io`/`BlockCacheTier` "would have to read
/// the file but isn't allowed to" case (spec §4.7 step 3 "return
/// `Incomplete`"), distinct from a hard error.
pub trait DataBlockSource<C> {
    fn open_data_block(&self, handle: crate::block::BlockHandle) -> crate::Result<Option<BlockIter<C>>>;
}

/// Composes an index iterator (primary) with lazily-constructed data-block
/// iterators (secondary); on a primary move, tears down the old secondary
/// and builds a new one (spec §4.8 "TwoLevelIterator").
///
/// Owns its `source` rather than borrowing it, so an iterator and the
/// table-specific glue that resolves its data blocks can be packaged
/// together as one self-contained value (see `scanner.rs`).
pub struct TwoLevelIterator<C, S: DataBlockSource<C>> {
    index: crate::index::IndexIter<C>,
    source: S,
    data: Option<BlockIter<C>>,
    /// Set when resolving an index entry into a data-block iterator fails;
    /// a short static tag rather than the original `Error`, since this
    /// iterator's `status` must be cheaply re-queryable without owning a
    /// non-`Clone` error.
    open_error: Option<&'static str>,
    /// Set when a data block could not be resolved without I/O under
    /// `read_tier = BlockCacheTier` (spec §4.7 step 3 / §4.9 step 3
    /// "`MarkKeyMayExist`").
    incomplete: bool,
}

impl<C: Comparator, S: DataBlockSource<C>> TwoLevelIterator<C, S> {
    #[must_use]
    pub fn new(index: crate::index::IndexIter<C>, source: S) -> Self {
        Self {
            index,
            source,
            data: None,
            open_error: None,
            incomplete: false,
        }
    }

    /// `true` if the last positioning attempt stopped short of a data block
    /// because `read_tier = BlockCacheTier` forbade the file read that
    /// would otherwise have resolved it.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    /// The first error encountered on either the index or the data level
    /// (spec §4.8 "status is the first error encountered on either level").
    pub fn status(&self) -> crate::Result<()> {
        if let Some(tag) = self.open_error {
            return Err(crate::Error::Corruption(tag));
        }
        self.index.status()?;
        if let Some(it) = &self.data {
            it.status()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn valid(&self) -> bool {
        self.data.as_ref().is_some_and(BlockIter::valid)
    }

    #[must_use]
    pub fn key(&self) -> &[u8] {
        self.data.as_ref().expect("valid() checked by caller").key()
    }

    #[must_use]
    pub fn value(&self) -> &[u8] {
        self.data.as_ref().expect("valid() checked by caller").value()
    }

    fn set_data_iter_from_current_index(&mut self) {
        self.incomplete = false;
        if !self.index.valid() {
            self.data = None;
            return;
        }
        match self.index.value() {
            Ok(handle) => match self.source.open_data_block(handle) {
                Ok(Some(iter)) => self.data = Some(iter),
                Ok(None) => {
                    self.incomplete = true;
                    self.data = None;
                }
                Err(_) => {
                    self.open_error = Some("failed to resolve data block handle");
                    self.data = None;
                }
            },
            Err(_) => {
                self.open_error = Some("bad index entry value");
                self.data = None;
            }
        }
    }

    /// Skips forward past exhausted data blocks until a valid entry is
    /// found or the index is exhausted. Each newly opened data block is
    /// positioned at its first entry before its validity is checked, since
    /// a just-opened `BlockIter` starts out invalid until positioned.
    fn skip_empty_data_blocks_forward(&mut self) {
        while self.data.as_ref().is_none_or(|it| !it.valid()) {
            if self.incomplete || self.open_error.is_some() {
                return;
            }
            if let Some(it) = &self.data {
                if it.status().is_err() {
                    return;
                }
            }
            self.index.next();
            if !self.index.valid() {
                self.data = None;
                return;
            }
            self.set_data_iter_from_current_index();
            if let Some(it) = &mut self.data {
                it.seek_to_first();
            }
        }
    }

    /// Mirrors [`skip_empty_data_blocks_forward`](Self::skip_empty_data_blocks_forward)
    /// for backward traversal.
    fn skip_empty_data_blocks_backward(&mut self) {
        while self.data.as_ref().is_none_or(|it| !it.valid()) {
            if self.incomplete || self.open_error.is_some() {
                return;
            }
            if let Some(it) = &self.data {
                if it.status().is_err() {
                    return;
                }
            }
            self.index.prev();
            if !self.index.valid() {
                self.data = None;
                return;
            }
            self.set_data_iter_from_current_index();
            if let Some(it) = &mut self.data {
                it.seek_to_last();
            }
        }
    }

    pub fn seek_to_first(&mut self) {
        self.index.seek_to_first();
        self.set_data_iter_from_current_index();
        if let Some(it) = &mut self.data {
            it.seek_to_first();
        }
        self.skip_empty_data_blocks_forward();
    }

    pub fn seek_to_last(&mut self) {
        self.index.seek_to_last();
        self.set_data_iter_from_current_index();
        if let Some(it) = &mut self.data {
            it.seek_to_last();
        }
        self.skip_empty_data_blocks_backward();
    }

    pub fn seek(&mut self, target: &[u8]) {
        self.index.seek(target);
        self.set_data_iter_from_current_index();
        if let Some(it) = &mut self.data {
            it.seek(target);
        }
        self.skip_empty_data_blocks_forward();
    }

    pub fn next(&mut self) {
        debug_assert!(self.valid());
        if let Some(it) = &mut self.data {
            it.next();
        }
        self.skip_empty_data_blocks_forward();
    }

    pub fn prev(&mut self) {
        debug_assert!(self.valid());
        if let Some(it) = &mut self.data {
            it.prev();
        }
        self.skip_empty_data_blocks_backward();
    }
}

/// Wraps a [`TwoLevelIterator`] so that a user-initiated `Seek` first
/// consults the fixed-size filter and short-circuits the whole scan when it
/// rules the key out (spec §4.8 "BloomFilterAwareIterator").
///
/// For any other filter kind this delegates `Seek` unchanged (spec §4.8
/// "For non-fixed-size filters this wrapper delegates unchanged").
pub struct BloomFilterAwareIterator<'f, C, S: DataBlockSource<C>> {
    inner: TwoLevelIterator<C, S>,
    filter: Option<&'f FilterReader<C>>,
    fetch_filter: &'f FilterFetcher<'f>,
    statistics: &'f dyn crate::stats::Statistics,
    /// Set to `true` by `seek` when the fixed-size filter ruled the key
    /// out; overrides `inner.valid()` without touching the inner iterator.
    filtered_out: bool,
}

impl<'f, C: Comparator, S: DataBlockSource<C>> BloomFilterAwareIterator<'f, C, S> {
    #[must_use]
    pub fn new(
        inner: TwoLevelIterator<C, S>,
        filter: Option<&'f FilterReader<C>>,
        fetch_filter: &'f FilterFetcher<'f>,
        statistics: &'f dyn crate::stats::Statistics,
    ) -> Self {
        Self {
            inner,
            filter,
            fetch_filter,
            statistics,
            filtered_out: false,
        }
    }

    #[must_use]
    pub fn valid(&self) -> bool {
        !self.filtered_out && self.inner.valid()
    }

    pub fn status(&self) -> crate::Result<()> {
        self.inner.status()
    }

    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        self.inner.is_incomplete()
    }

    #[must_use]
    pub fn key(&self) -> &[u8] {
        self.inner.key()
    }

    #[must_use]
    pub fn value(&self) -> &[u8] {
        self.inner.value()
    }

    pub fn next(&mut self) {
        self.inner.next();
    }

    /// `Seek(K)`: if a fixed-size filter is active, probes
    /// `transform(user_key(K))` first; on a definitive miss, marks the
    /// iterator invalid without touching the underlying index/data cursors
    /// (spec §4.8 "mark the iterator invalid without advancing").
    ///
    /// # Errors
    ///
    /// Propagates filter-fetch errors.
    pub fn seek(&mut self, filter_key: &[u8], target: &[u8]) -> crate::Result<()> {
        self.filtered_out = false;

        if let Some(FilterReader::FixedSize(reader)) = self.filter {
            if !reader.key_may_match(filter_key, self.fetch_filter)? {
                self.statistics
                    .record_ticker(crate::stats::Ticker::BloomFilterUseful, 1);
                self.filtered_out = true;
                return Ok(());
            }
        }

        self.inner.seek(target);
        Ok(())
    }
}
