// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A block-based reader for sorted-string tables (SSTs), the immutable,
//! on-disk building block an LSM-tree storage engine flushes its memtables
//! and compacts its segments into.
//!
//! ##### NOTE
//!
//! > This crate only reads tables. Writing, compaction, and everything else
//! > around an LSM-tree's write path is out of scope — pair it with
//! > whichever write path already produces RocksDB/LevelDB-shaped SSTs.
//!
//! ##### About
//!
//! A table is a sequence of data blocks (sorted, prefix-compressed runs of
//! internal keys and values), followed by an index block locating each data
//! block, an optional filter block (a bloom filter in one of three shapes),
//! a meta-index block, a properties block, and a fixed-size footer.
//!
//! ```
//! use sst_reader::{GetResult, ReadOptions, Table, TableCaches, TableOptions};
//!
//! # fn run(file: std::fs::File, file_size: u64, key: &sst_reader::InternalKey) -> sst_reader::Result<()> {
//! let table = Table::open(
//!     file,
//!     file_size,
//!     sst_reader::BytewiseComparator,
//!     TableOptions::default(),
//!     TableCaches::default(),
//!     None,
//!     None,
//!     None,
//! )?;
//!
//! match table.get(&ReadOptions::default(), key)? {
//!     GetResult::Found(value) => { let _ = value; }
//!     GetResult::NotFound | GetResult::Incomplete => {}
//! }
//! # Ok(())
//! # }
//! ```

#![doc(html_logo_url = "https://raw.githubusercontent.com/fjall-rs/lsm-tree/main/logo.png")]
#![doc(html_favicon_url = "https://raw.githubusercontent.com/fjall-rs/lsm-tree/main/logo.png")]
#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]

mod binary_search;
pub mod block;
pub mod bloom;
mod cache;
mod checksum;
mod coding;
mod comparator;
mod compression;
mod config;
mod error;
pub mod filter;
mod footer;
mod hash;
pub mod index;
mod key;
mod meta;
mod prefix_extractor;
mod scanner;
mod slice;
pub mod stats;
mod table;

/// A minimal table-writer helper used by this crate's own tests and by the
/// top-level `tests/` integration crate (spec §10.4/§10.6 "Writer stub").
/// Not part of the crate's default public surface — only compiled under
/// `cfg(test)` or the opt-in `test-util` feature.
#[cfg(any(test, feature = "test-util"))]
pub mod test_writer;

mod two_level_iter;
mod value;

pub use block::{Block, BlockHandle, CompressedBlock};
pub use cache::{BlockCache, CacheHandle, CacheKey, FileCacheKeyPrefix};
pub use comparator::{BytewiseComparator, Comparator, InternalKeyComparator};
pub use compression::CompressionType;
pub use config::{
    BloomConstructionPolicy, ChecksumKind, CompressionPolicy, IndexType, ReadOptions, ReadTier, SharedPrefixExtractor,
    TableOptions,
};
pub use error::{Error, Result};
pub use footer::Footer;
pub use key::{InternalKey, ValueType};
pub use meta::{FilterKind, TableProperties};
pub use prefix_extractor::{FixedPrefixExtractor, PrefixExtractor};
pub use scanner::{ScanItem, Scanner};
pub use slice::Slice;
pub use stats::{CountingStatistics, NoopStatistics, Statistics, Ticker};
pub use table::{GetResult, Table, TableCaches};
pub use value::{SeqNo, UserKey, UserValue};
