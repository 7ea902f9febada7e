// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The block iterator (spec §4.2): binary-search the restart array, then
//! linearly decode shared-prefix entries within the chosen restart range.

use super::Block;
use crate::comparator::Comparator;
use std::io::Cursor;
use std::sync::Arc;
use varint_rs::VarintReader;

struct DecodedEntry {
    shared: usize,
    key_delta_range: (usize, usize),
    value_range: (usize, usize),
    next_offset: usize,
}

fn decode_entry(data: &[u8], offset: usize) -> Option<DecodedEntry> {
    let mut cursor = Cursor::new(data.get(offset..)?);
    let shared: u32 = cursor.read_u32_varint().ok()?;
    let unshared: u32 = cursor.read_u32_varint().ok()?;
    let value_len: u32 = cursor.read_u32_varint().ok()?;

    let header_len = offset + usize::try_from(cursor.position()).ok()?;
    let key_delta_start = header_len;
    let key_delta_end = key_delta_start.checked_add(unshared as usize)?;
    let value_start = key_delta_end;
    let value_end = value_start.checked_add(value_len as usize)?;

    if value_end > data.len() {
        return None;
    }

    Some(DecodedEntry {
        shared: shared as usize,
        key_delta_range: (key_delta_start, key_delta_end),
        value_range: (value_start, value_end),
        next_offset: value_end,
    })
}

/// An ordered cursor over a single block's entries (spec §4.2).
///
/// `Seek`/`SeekToFirst`/`SeekToLast`/`Next`/`Prev` reposition the cursor;
/// `Valid`/`key`/`value`/`status` inspect it. An invalid iterator with `Ok`
/// status means "exhausted", never "error" (spec §7's Not-found taxonomy).
pub struct BlockIter<C> {
    block: Arc<Block>,
    comparator: Arc<C>,
    offset: usize,
    restart_index: usize,
    key: Vec<u8>,
    value_range: (usize, usize),
    valid: bool,
    status: Option<&'static str>,
}

impl<C: Comparator> BlockIter<C> {
    /// Creates an iterator over `block`, initially invalid (as if just past
    /// the end). Call `seek_to_first`/`seek` before reading.
    pub fn new(block: Arc<Block>, comparator: Arc<C>) -> Self {
        Self {
            block,
            comparator,
            offset: 0,
            restart_index: 0,
            key: Vec::new(),
            value_range: (0, 0),
            valid: false,
            status: None,
        }
    }

    /// `true` if the cursor currently points at a valid entry.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// The restart point governing the current entry, if valid. Used by
    /// the hash-augmented index (spec §4.4) to record which restart range
    /// a given key's prefix falls into while scanning once at
    /// construction time.
    pub(crate) fn current_restart_index(&self) -> usize {
        self.restart_index
    }

    /// The first error encountered while decoding, if any.
    pub fn status(&self) -> crate::Result<()> {
        match self.status {
            None => Ok(()),
            Some(tag) => Err(crate::Error::Corruption(tag)),
        }
    }

    /// The current entry's fully-reconstructed key.
    ///
    /// # Panics
    ///
    /// Panics if not `valid()`.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        assert!(self.valid, "key() called on invalid iterator");
        &self.key
    }

    /// The current entry's value bytes.
    ///
    /// # Panics
    ///
    /// Panics if not `valid()`.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        assert!(self.valid, "value() called on invalid iterator");
        #[allow(clippy::indexing_slicing)]
        &self.block.entry_bytes()[self.value_range.0..self.value_range.1]
    }

    fn fail(&mut self, tag: &'static str) {
        self.valid = false;
        self.status = Some(tag);
    }

    fn restart_point_offset(&self, index: usize) -> Option<usize> {
        self.block.restarts().get(index).map(|o| *o as usize)
    }

    /// Decodes the entry at `offset`, given the key in effect at the
    /// restart point governing it (`base_key`, used to expand the shared
    /// prefix). Returns the new current key on success.
    fn parse_and_install(&mut self, offset: usize, base_key: &[u8]) -> bool {
        let entries = self.block.entry_bytes();

        let Some(entry) = decode_entry(entries, offset) else {
            self.fail("malformed block entry");
            return false;
        };

        if entry.shared > base_key.len() {
            self.fail("shared prefix longer than base key");
            return false;
        }

        let Some(delta) = entries.get(entry.key_delta_range.0..entry.key_delta_range.1) else {
            self.fail("key delta out of bounds");
            return false;
        };

        let mut key = Vec::with_capacity(entry.shared + delta.len());
        #[allow(clippy::indexing_slicing)]
        key.extend_from_slice(&base_key[..entry.shared]);
        key.extend_from_slice(delta);

        self.key = key;
        self.value_range = entry.value_range;
        self.offset = offset;
        self.valid = true;
        true
    }

    /// Moves to the first entry of the block.
    pub fn seek_to_first(&mut self) {
        self.restart_index = 0;
        let Some(offset) = self.restart_point_offset(0) else {
            self.valid = false;
            return;
        };
        self.parse_and_install(offset, &[]);
    }

    /// Moves to the last entry of the block.
    pub fn seek_to_last(&mut self) {
        let last_restart = self.block.restarts().len().saturating_sub(1);
        self.restart_index = last_restart;

        let Some(offset) = self.restart_point_offset(last_restart) else {
            self.valid = false;
            return;
        };
        if !self.parse_and_install(offset, &[]) {
            return;
        }

        // Walk forward within this restart's run until the next entry
        // would start a new restart point (or run off the block).
        loop {
            let entries_end = self.block.entry_bytes().len();
            let Some(entry) = decode_entry(self.block.entry_bytes(), self.offset) else {
                break;
            };
            if entry.next_offset >= entries_end {
                break;
            }
            let saved_key = self.key.clone();
            let saved_offset = entry.next_offset;
            if !self.advance_from(saved_offset, &saved_key) {
                break;
            }
        }
    }

    fn advance_from(&mut self, offset: usize, base_key: &[u8]) -> bool {
        if offset >= self.block.entry_bytes().len() {
            self.valid = false;
            return false;
        }
        self.parse_and_install(offset, base_key)
    }

    /// Moves to the entry following the current one.
    ///
    /// # Panics
    ///
    /// Panics if not `valid()`.
    pub fn next(&mut self) {
        assert!(self.valid, "next() called on invalid iterator");

        let entries_end = self.block.entry_bytes().len();
        let Some(entry) = decode_entry(self.block.entry_bytes(), self.offset) else {
            self.fail("malformed block entry");
            return;
        };

        if entry.next_offset >= entries_end {
            self.valid = false;
            return;
        }

        if self.restart_index + 1 < self.block.restarts().len() {
            if let Some(next_restart) = self.restart_point_offset(self.restart_index + 1) {
                if entry.next_offset == next_restart {
                    self.restart_index += 1;
                }
            }
        }

        let base_key = std::mem::take(&mut self.key);
        let next_offset = entry.next_offset;
        self.parse_and_install(next_offset, &base_key);
    }

    /// Moves to the entry preceding the current one.
    pub fn prev(&mut self) {
        let original_offset = self.offset;

        // Back up to the restart point at or before the current entry.
        while let Some(restart_offset) = self.restart_point_offset(self.restart_index) {
            if restart_offset < original_offset {
                break;
            }
            if self.restart_index == 0 {
                self.valid = false;
                return;
            }
            self.restart_index -= 1;
        }

        let Some(start_offset) = self.restart_point_offset(self.restart_index) else {
            self.valid = false;
            return;
        };

        self.parse_and_install(start_offset, &[]);

        // Scan forward from the restart point until the entry *before*
        // `original_offset` is reached.
        loop {
            let Some(entry) = decode_entry(self.block.entry_bytes(), self.offset) else {
                self.fail("malformed block entry");
                return;
            };
            if entry.next_offset >= original_offset {
                break;
            }
            let base_key = std::mem::take(&mut self.key);
            let next_offset = entry.next_offset;
            if !self.parse_and_install(next_offset, &base_key) {
                return;
            }
        }
    }

    /// Positions the cursor at the first entry whose key is `>= target`
    /// under the comparator, using binary search over restart points
    /// followed by a linear scan within the chosen restart range.
    pub fn seek(&mut self, target: &[u8]) {
        let restarts = self.block.restarts();
        if restarts.is_empty() {
            self.valid = false;
            return;
        }

        let index = crate::binary_search::partition_point(restarts, |&restart_offset| {
            let offset = restart_offset as usize;
            // At a restart point, shared == 0, so the key is just the delta.
            match decode_entry(self.block.entry_bytes(), offset) {
                Some(entry) => {
                    let key = self
                        .block
                        .entry_bytes()
                        .get(entry.key_delta_range.0..entry.key_delta_range.1)
                        .unwrap_or(&[]);
                    self.comparator.cmp(key, target) == std::cmp::Ordering::Less
                }
                None => false,
            }
        });

        let restart_index = index.saturating_sub(1);
        self.restart_index = restart_index;

        let Some(offset) = self.restart_point_offset(restart_index) else {
            self.valid = false;
            return;
        };
        if !self.parse_and_install(offset, &[]) {
            return;
        }

        while self.valid
            && self.comparator.cmp(&self.key, target) == std::cmp::Ordering::Less
        {
            self.next();
        }
    }

    /// Like [`seek`](Self::seek), but the initial binary search is
    /// restricted to `restarts[restart_range]` instead of the whole array
    /// (used by the hash-augmented index, spec §4.4, to skip straight to a
    /// prefix's restart-range bucket).
    ///
    /// Falls back to a full [`seek`](Self::seek) whenever the restricted
    /// range cannot be proven safe (empty, out of bounds, or its first key
    /// already sorts after `target`) — the accelerated path is only ever a
    /// shortcut, never a source of missed entries, since the trailing
    /// linear scan (`next()`) is unaffected by where it started and will
    /// always continue past `restart_range`'s end if needed.
    pub(crate) fn seek_within_restart_range(
        &mut self,
        restart_range: std::ops::Range<usize>,
        target: &[u8],
    ) {
        let restarts = self.block.restarts();
        let start = restart_range.start;
        let end = restart_range.end.min(restarts.len());

        if restarts.is_empty() || start >= end {
            self.seek(target);
            return;
        }

        let Some(first_offset) = self.restart_point_offset(start) else {
            self.seek(target);
            return;
        };
        match decode_entry(self.block.entry_bytes(), first_offset) {
            Some(entry) => {
                let key = self
                    .block
                    .entry_bytes()
                    .get(entry.key_delta_range.0..entry.key_delta_range.1)
                    .unwrap_or(&[]);
                if self.comparator.cmp(key, target) == std::cmp::Ordering::Greater {
                    // Bucket starts after target: it would skip entries
                    // before it that might still be `>= target`.
                    self.seek(target);
                    return;
                }
            }
            None => {
                self.seek(target);
                return;
            }
        }

        #[allow(clippy::indexing_slicing)]
        let slice = &restarts[start..end];
        let index = crate::binary_search::partition_point(slice, |&restart_offset| {
            let offset = restart_offset as usize;
            match decode_entry(self.block.entry_bytes(), offset) {
                Some(entry) => {
                    let key = self
                        .block
                        .entry_bytes()
                        .get(entry.key_delta_range.0..entry.key_delta_range.1)
                        .unwrap_or(&[]);
                    self.comparator.cmp(key, target) == std::cmp::Ordering::Less
                }
                None => false,
            }
        });

        let restart_index = start + index.saturating_sub(1);
        self.restart_index = restart_index;

        let Some(offset) = self.restart_point_offset(restart_index) else {
            self.seek(target);
            return;
        };
        if !self.parse_and_install(offset, &[]) {
            return;
        }

        while self.valid && self.comparator.cmp(&self.key, target) == std::cmp::Ordering::Less {
            self.next();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::BytewiseComparator;

    fn encode_entry(out: &mut Vec<u8>, shared: u32, key_delta: &[u8], value: &[u8]) {
        use varint_rs::VarintWriter;
        out.write_u32_varint(shared).unwrap();
        #[allow(clippy::cast_possible_truncation)]
        out.write_u32_varint(key_delta.len() as u32).unwrap();
        #[allow(clippy::cast_possible_truncation)]
        out.write_u32_varint(value.len() as u32).unwrap();
        out.extend_from_slice(key_delta);
        out.extend_from_slice(value);
    }

    fn build_block(entries: &[(&[u8], &[u8])], restart_interval: usize) -> Arc<Block> {
        let mut data = Vec::new();
        let mut restarts = Vec::new();
        let mut last_key: Vec<u8> = Vec::new();

        for (i, (key, value)) in entries.iter().enumerate() {
            let is_restart = i % restart_interval == 0;
            if is_restart {
                restarts.push(data.len() as u32);
            }
            let shared = if is_restart {
                0
            } else {
                last_key
                    .iter()
                    .zip(key.iter())
                    .take_while(|(a, b)| a == b)
                    .count()
            };
            #[allow(clippy::indexing_slicing)]
            encode_entry(&mut data, shared as u32, &key[shared..], value);
            last_key = key.to_vec();
        }

        for r in &restarts {
            data.extend_from_slice(&r.to_le_bytes());
        }
        #[allow(clippy::cast_possible_truncation)]
        data.extend_from_slice(&(restarts.len() as u32).to_le_bytes());

        Arc::new(Block::parse(crate::Slice::from(data)).unwrap())
    }

    #[test]
    fn iterate_forward() {
        let entries: Vec<(&[u8], &[u8])> =
            vec![(b"a", b"1"), (b"ab", b"2"), (b"abc", b"3"), (b"b", b"4")];
        let block = build_block(&entries, 2);
        let mut it = BlockIter::new(block, Arc::new(BytewiseComparator));

        it.seek_to_first();
        let mut seen = Vec::new();
        while it.valid() {
            seen.push((it.key().to_vec(), it.value().to_vec()));
            it.next();
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0].0, b"a");
        assert_eq!(seen[3].0, b"b");
        assert_eq!(seen[2].1, b"3");
    }

    #[test]
    fn iterate_backward_matches_forward_reversed() {
        let entries: Vec<(&[u8], &[u8])> =
            vec![(b"a", b"1"), (b"ab", b"2"), (b"abc", b"3"), (b"b", b"4")];
        let block = build_block(&entries, 2);
        let mut it = BlockIter::new(block, Arc::new(BytewiseComparator));

        it.seek_to_last();
        let mut seen = Vec::new();
        while it.valid() {
            seen.push(it.key().to_vec());
            it.prev();
        }
        seen.reverse();
        assert_eq!(seen, vec![b"a".to_vec(), b"ab".to_vec(), b"abc".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn seek_finds_first_key_greater_or_equal() {
        let entries: Vec<(&[u8], &[u8])> =
            vec![(b"a", b"1"), (b"c", b"2"), (b"e", b"3")];
        let block = build_block(&entries, 2);
        let mut it = BlockIter::new(block, Arc::new(BytewiseComparator));

        it.seek(b"b");
        assert!(it.valid());
        assert_eq!(it.key(), b"c");

        it.seek(b"z");
        assert!(!it.valid());
    }
}
