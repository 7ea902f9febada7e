// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Double-ended iteration over a whole table (spec §11 supplement).
//!
//! Built on two independent [`TwoLevelIterator`] cursors, one advancing from
//! the front and one from the back, the way the teacher's `table/iter.rs`
//! keeps separate `lo`/`hi` data-block readers so `next`/`next_back` each
//! serve from their own side without re-walking the index from the other
//! end. Unlike that reader, [`TwoLevelIterator`] already absorbs the
//! index/data-block crossing logic, so the two cursors here only need to
//! notice when they meet.

use crate::coding::Decode;
use crate::comparator::Comparator;
use crate::config::ReadOptions;
use crate::key::InternalKey;
use crate::table::{Table, TableDataSource};
use crate::two_level_iter::TwoLevelIterator;
use std::io::{Read, Seek};

/// A `(key, value)` pair yielded by [`Scanner`], with the key left encoded
/// as [`InternalKey`] rather than just the raw user key, since a table may
/// hold several versions of the same user key.
pub type ScanItem = (InternalKey, crate::Slice);

/// Forward-and-backward iteration over every entry in a table (spec §11
/// supplement), obtained via [`Table::scan`].
pub struct Scanner<'t, R, C> {
    lo: TwoLevelIterator<C, TableDataSource<'t, R, C>>,
    hi: TwoLevelIterator<C, TableDataSource<'t, R, C>>,
    started: bool,
    done: bool,
}

impl<'t, R: Read + Seek, C: Comparator> Scanner<'t, R, C> {
    pub(crate) fn new(table: &'t Table<R, C>, read_options: &ReadOptions) -> crate::Result<Self> {
        Ok(Self {
            lo: table.new_raw_iterator(read_options)?,
            hi: table.new_raw_iterator(read_options)?,
            started: false,
            done: false,
        })
    }

    fn ensure_started(&mut self) {
        if !self.started {
            self.lo.seek_to_first();
            self.hi.seek_to_last();
            self.started = true;
        }
    }

    fn decode(&self, it: &TwoLevelIterator<C, TableDataSource<'t, R, C>>) -> crate::Result<ScanItem> {
        let key = InternalKey::decode_from(&mut std::io::Cursor::new(it.key()))
            .map_err(|_| crate::Error::Corruption("undecodable internal key in data block"))?;
        Ok((key, crate::Slice::from(it.value())))
    }
}

impl<'t, R: Read + Seek, C: Comparator> Iterator for Scanner<'t, R, C> {
    type Item = crate::Result<ScanItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.ensure_started();

        if let Err(e) = self.lo.status() {
            self.done = true;
            return Some(Err(e));
        }
        if !self.lo.valid() || !self.hi.valid() {
            self.done = true;
            return None;
        }

        // The cursors have converged on the same entry: serve it once and
        // stop, rather than risk yielding it again from the other side.
        let meeting = self.lo.key() == self.hi.key();
        let item = self.decode(&self.lo);

        if meeting || item.is_err() {
            self.done = true;
        } else {
            self.lo.next();
        }

        Some(item)
    }
}

impl<'t, R: Read + Seek, C: Comparator> DoubleEndedIterator for Scanner<'t, R, C> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.ensure_started();

        if let Err(e) = self.hi.status() {
            self.done = true;
            return Some(Err(e));
        }
        if !self.lo.valid() || !self.hi.valid() {
            self.done = true;
            return None;
        }

        let meeting = self.lo.key() == self.hi.key();
        let item = self.decode(&self.hi);

        if meeting || item.is_err() {
            self.done = true;
        } else {
            self.hi.prev();
        }

        Some(item)
    }
}
