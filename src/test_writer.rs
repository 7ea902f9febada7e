// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A minimal single-pass table writer, not part of the crate's default
//! public surface (spec §11 "Writer stub").
//!
//! The write/compaction path is out of scope for this reader, but exercising
//! `Open`/`Get`/`NewIterator`/`Prefetch` against a real on-disk layout
//! (rather than hand-built single blocks) needs *something* that emits one.
//! Grounded in how `other_examples/...dermesser-sstable__src-table_reader.rs`
//! pairs its reader tests against that crate's own `table_builder::TableBuilder`
//! — we keep the analogous helper test-only instead of a public writer API,
//! gated behind the `test-util` feature (rather than plain `#[cfg(test)]`)
//! so the top-level `tests/` integration crate (spec §10.4/§10.6), which
//! compiles against this crate like any other dependent, can reach it too.

#![cfg(any(test, feature = "test-util"))]

use crate::block::BlockHandle;
use crate::bloom::BloomFilter;
use crate::checksum::Checksum;
use crate::coding::Encode;
use crate::compression::{compress, CompressionType};
use crate::config::IndexType;
use crate::filter::block_based::BlockBasedFilterReader;
use crate::footer::{Footer, FORMAT_VERSION};
use crate::key::InternalKey;
use byteorder::{LittleEndian, WriteBytesExt};
use varint_rs::VarintWriter;

/// Which filter kind (spec §4.5) a built table should carry, if any.
#[derive(Clone, Copy)]
pub enum FilterSpec {
    /// A single bloom over every key in the table.
    Full,
    /// One bloom per data block, indexed by the block's file offset.
    BlockBased,
    /// Groups every `blocks_per_filter` data blocks under one filter block.
    FixedSize {
        /// How many data blocks share one filter block.
        blocks_per_filter: usize,
    },
}

/// Knobs for [`build_table`]; defaults produce a small multi-block table
/// with no filter.
pub struct TableSpec {
    /// Restart-point interval for every block this table writes.
    pub restart_interval: usize,
    /// Flush a data block once its accumulated entry bytes reach this size.
    pub block_size_target: usize,
    /// Compression applied to data blocks.
    pub compression: CompressionType,
    /// Filter kind to emit, if any.
    pub filter: Option<FilterSpec>,
    /// Filter-policy name recorded in the meta-index key.
    pub policy_name: String,
    /// Value written for the `rocksdb.whole.key.filtering` property.
    pub whole_key_filtering: bool,
    /// Value written for the `rocksdb.prefix.filtering` property.
    pub prefix_filtering: bool,
    /// Index type recorded in the properties block, if any.
    pub index_type: Option<IndexType>,
}

impl Default for TableSpec {
    fn default() -> Self {
        Self {
            restart_interval: 2,
            block_size_target: 64,
            compression: CompressionType::None,
            filter: None,
            policy_name: crate::config::DEFAULT_FILTER_POLICY_NAME.to_string(),
            whole_key_filtering: true,
            prefix_filtering: true,
            index_type: None,
        }
    }
}

fn encode_block(entries: &[(Vec<u8>, Vec<u8>)], restart_interval: usize) -> Vec<u8> {
    let mut data = Vec::new();
    let mut restarts = Vec::new();
    let mut last_key: Vec<u8> = Vec::new();

    for (i, (key, value)) in entries.iter().enumerate() {
        let is_restart = i % restart_interval.max(1) == 0;
        if is_restart {
            restarts.push(data.len() as u32);
        }
        let shared = if is_restart {
            0
        } else {
            last_key.iter().zip(key.iter()).take_while(|(a, b)| a == b).count()
        };

        #[allow(clippy::indexing_slicing)]
        let unshared = &key[shared..];
        data.write_u32_varint(shared as u32).expect("vec write");
        data.write_u32_varint(unshared.len() as u32).expect("vec write");
        data.write_u32_varint(value.len() as u32).expect("vec write");
        data.extend_from_slice(unshared);
        data.extend_from_slice(value);

        last_key = key.clone();
    }

    for r in &restarts {
        data.extend_from_slice(&r.to_le_bytes());
    }
    data.extend_from_slice(&(restarts.len() as u32).to_le_bytes());
    data
}

/// Compresses, checksums, and appends `payload` to `out`, returning the
/// handle to its (possibly compressed) bytes, trailer excluded.
fn write_block(out: &mut Vec<u8>, payload: &[u8], compression: CompressionType) -> BlockHandle {
    let compressed = compress(compression, payload).expect("test fixture compression cannot fail");
    let offset = out.len() as u64;
    out.extend_from_slice(&compressed);

    let mut tag = Vec::new();
    compression.encode_into(&mut tag).expect("vec write");
    out.extend_from_slice(&tag);

    let checksum = Checksum::of(&compressed);
    out.write_u64::<LittleEndian>(checksum.into_u64()).expect("vec write");

    BlockHandle::new(offset, compressed.len() as u64)
}

fn filter_with_keys(keys: &[&[u8]]) -> BloomFilter {
    let mut filter = BloomFilter::with_fp_rate(keys.len().max(1), 0.01);
    for key in keys {
        filter.set_with_hash(BloomFilter::get_hash(key));
    }
    filter
}

/// Encodes `key` the same way [`build_table`] encodes index and data-block
/// keys, so a caller driving `Table::prefetch`/`Table::approximate_offset_of`
/// from outside this crate can build a search key the comparator will
/// actually match against (spec §3: index and data-block entries are keyed
/// by the full-encoded `InternalKey`, not the bare user key).
#[must_use]
pub fn encode_internal_key(key: &InternalKey) -> Vec<u8> {
    key.encode_into_vec()
}

/// Builds a complete on-disk table from already-sorted, deduplicated
/// `(InternalKey, value)` pairs, returning the bytes a [`crate::table::Table`]
/// opened against them would read back.
pub fn build_table(entries: &[(InternalKey, &[u8])], spec: &TableSpec) -> Vec<u8> {
    let mut out = Vec::new();

    let mut index_entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    let mut block_based_filters: Vec<(u64, BloomFilter)> = Vec::new();
    let mut full_filter_keys: Vec<Vec<u8>> = Vec::new();
    let mut fixed_size_index: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();

    let mut current: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    let mut current_size = 0usize;
    let mut current_user_keys: Vec<Vec<u8>> = Vec::new();
    let mut group_user_keys: Vec<Vec<u8>> = Vec::new();
    let mut group_block_count = 0usize;

    let blocks_per_filter = match spec.filter {
        Some(FilterSpec::FixedSize { blocks_per_filter }) => blocks_per_filter.max(1),
        _ => usize::MAX,
    };

    let mut flush_block = |out: &mut Vec<u8>,
                            current: &mut Vec<(Vec<u8>, Vec<u8>)>,
                            current_user_keys: &mut Vec<Vec<u8>>,
                            index_entries: &mut Vec<(Vec<u8>, Vec<u8>)>,
                            block_based_filters: &mut Vec<(u64, BloomFilter)>| {
        if current.is_empty() {
            return;
        }
        let payload = encode_block(current, spec.restart_interval);
        let handle = write_block(out, &payload, spec.compression);

        if matches!(spec.filter, Some(FilterSpec::BlockBased)) {
            let keys: Vec<&[u8]> = current_user_keys.iter().map(Vec::as_slice).collect();
            block_based_filters.push((handle.offset(), filter_with_keys(&keys)));
        }

        let mut handle_bytes = Vec::new();
        handle.encode_into(&mut handle_bytes).expect("vec write");
        #[allow(clippy::unwrap_used)]
        let last_key = current.last().unwrap().0.clone();
        index_entries.push((last_key, handle_bytes));

        current.clear();
        current_user_keys.clear();
    };

    for (key, value) in entries {
        let key_bytes = key.encode_into_vec();
        current_size += key_bytes.len() + value.len();
        current_user_keys.push(key.user_key.to_vec());
        group_user_keys.push(key.user_key.to_vec());
        current.push((key_bytes, value.to_vec()));
        full_filter_keys.push(key.user_key.to_vec());

        if current_size >= spec.block_size_target {
            flush_block(
                &mut out,
                &mut current,
                &mut current_user_keys,
                &mut index_entries,
                &mut block_based_filters,
            );
            current_size = 0;
            group_block_count += 1;

            if group_block_count >= blocks_per_filter {
                let keys: Vec<&[u8]> = group_user_keys.iter().map(Vec::as_slice).collect();
                let filter = filter_with_keys(&keys);
                let filter_handle = write_block(&mut out, &filter.encode_into_vec(), CompressionType::None);
                #[allow(clippy::unwrap_used)]
                let upper_bound = group_user_keys.last().unwrap().clone();
                let mut handle_bytes = Vec::new();
                filter_handle.encode_into(&mut handle_bytes).expect("vec write");
                fixed_size_index.push((upper_bound, handle_bytes));
                group_user_keys.clear();
                group_block_count = 0;
            }
        }
    }
    flush_block(
        &mut out,
        &mut current,
        &mut current_user_keys,
        &mut index_entries,
        &mut block_based_filters,
    );
    if !group_user_keys.is_empty() {
        let keys: Vec<&[u8]> = group_user_keys.iter().map(Vec::as_slice).collect();
        let filter = filter_with_keys(&keys);
        let filter_handle = write_block(&mut out, &filter.encode_into_vec(), CompressionType::None);
        #[allow(clippy::unwrap_used)]
        let upper_bound = group_user_keys.last().unwrap().clone();
        let mut handle_bytes = Vec::new();
        filter_handle.encode_into(&mut handle_bytes).expect("vec write");
        fixed_size_index.push((upper_bound, handle_bytes));
    }

    let mut filter_block_handle = None;
    match spec.filter {
        Some(FilterSpec::Full) => {
            let keys: Vec<&[u8]> = full_filter_keys.iter().map(Vec::as_slice).collect();
            let filter = filter_with_keys(&keys);
            filter_block_handle = Some(("fullfilter.", write_block(&mut out, &filter.encode_into_vec(), CompressionType::None)));
        }
        Some(FilterSpec::BlockBased) => {
            let reader = BlockBasedFilterReader::build(&block_based_filters);
            filter_block_handle = Some(("filter.", write_block(&mut out, &reader.encode(), CompressionType::None)));
        }
        Some(FilterSpec::FixedSize { .. }) => {
            let payload = encode_block(&fixed_size_index, spec.restart_interval.max(1));
            filter_block_handle = Some(("fixedsizefilter.", write_block(&mut out, &payload, CompressionType::None)));
        }
        None => {}
    }

    let index_payload = encode_block(&index_entries, spec.restart_interval);
    let index_handle = write_block(&mut out, &index_payload, CompressionType::None);

    let mut properties_entries: Vec<(Vec<u8>, Vec<u8>)> = vec![
        (
            b"rocksdb.whole.key.filtering".to_vec(),
            if spec.whole_key_filtering { b"1".to_vec() } else { b"0".to_vec() },
        ),
        (
            b"rocksdb.prefix.filtering".to_vec(),
            if spec.prefix_filtering { b"1".to_vec() } else { b"0".to_vec() },
        ),
    ];
    if let Some(index_type) = spec.index_type {
        let tag: u32 = match index_type {
            IndexType::BinarySearch => 0,
            IndexType::HashSearch => 1,
        };
        let mut value = Vec::new();
        value.write_u32::<LittleEndian>(tag).expect("vec write");
        properties_entries.push((b"rocksdb.block.based.table.index.type".to_vec(), value));
    }
    properties_entries.sort();
    let properties_payload = encode_block(&properties_entries, 1);
    let properties_handle = write_block(&mut out, &properties_payload, CompressionType::None);

    let mut meta_entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    if let Some((prefix, handle)) = filter_block_handle {
        let mut handle_bytes = Vec::new();
        handle.encode_into(&mut handle_bytes).expect("vec write");
        meta_entries.push((format!("{prefix}{}", spec.policy_name).into_bytes(), handle_bytes));
    }
    {
        let mut handle_bytes = Vec::new();
        properties_handle.encode_into(&mut handle_bytes).expect("vec write");
        meta_entries.push((crate::meta::PROPERTIES_NAME.to_vec(), handle_bytes));
    }
    meta_entries.sort();
    let meta_payload = encode_block(&meta_entries, 1);
    let meta_handle = write_block(&mut out, &meta_payload, CompressionType::None);

    let footer = Footer {
        version: FORMAT_VERSION,
        metaindex_handle: meta_handle,
        index_handle,
    };
    out.extend_from_slice(&footer.encode());

    out
}
