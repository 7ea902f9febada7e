// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Meta-index and properties block parsing (spec §4.6 steps 3-5, §6
//! "Meta-index names" / "Properties of interest").

use crate::block::{Block, BlockHandle};
use crate::coding::Decode;
use crate::comparator::BytewiseComparator;
use crate::config::IndexType;
use byteorder::{ByteOrder, LittleEndian};
use std::sync::Arc;

/// Well-known meta-index key for the properties block.
pub const PROPERTIES_NAME: &[u8] = b"rocksdb.properties";

/// Meta-index key prefixes for each filter kind, in the priority order a
/// reader checks them when more than one is present (spec §9 "the reader
/// uses the first matched prefix in the order `fullfilter`, `filter`,
/// `fixedsizefilter`").
pub const FILTER_PREFIXES: [&str; 3] = ["fullfilter.", "filter.", "fixedsizefilter."];

/// Which of [`FILTER_PREFIXES`] matched, determining which [`crate::filter::FilterReader`]
/// variant to construct.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FilterKind {
    Full,
    BlockBased,
    FixedSize,
}

/// The parsed meta-index block: a name → block-handle map, always ordered
/// and compared with plain bytewise order regardless of the table's user
/// comparator (meta-index keys are internal names, not user keys).
pub struct MetaIndex {
    block: Arc<Block>,
}

impl MetaIndex {
    #[must_use]
    pub fn parse(block: Arc<Block>) -> Self {
        Self { block }
    }

    /// Looks up `name` in the meta-index.
    ///
    /// # Errors
    ///
    /// `Corruption` if `name`'s value is not a valid block handle.
    pub fn find(&self, name: &[u8]) -> crate::Result<Option<BlockHandle>> {
        let comparator = Arc::new(BytewiseComparator);
        let mut it = crate::block::iter::BlockIter::new(Arc::clone(&self.block), comparator);
        it.seek(name);
        if !it.valid() || it.key() != name {
            it.status()?;
            return Ok(None);
        }
        let handle = BlockHandle::decode_from(&mut std::io::Cursor::new(it.value()))
            .map_err(|_| crate::Error::Corruption("bad meta-index handle"))?;
        Ok(Some(handle))
    }

    /// Scans for a filter block under the first matching candidate prefix
    /// plus `policy_name` (spec §4.6 step 4).
    ///
    /// # Errors
    ///
    /// `Corruption` if a matched entry's value is not a valid block handle.
    pub fn find_filter(&self, policy_name: &str) -> crate::Result<Option<(FilterKind, BlockHandle)>> {
        for prefix in FILTER_PREFIXES {
            let name = format!("{prefix}{policy_name}");
            if let Some(handle) = self.find(name.as_bytes())? {
                let kind = match prefix {
                    "fullfilter." => FilterKind::Full,
                    "filter." => FilterKind::BlockBased,
                    "fixedsizefilter." => FilterKind::FixedSize,
                    _ => unreachable!("FILTER_PREFIXES is exhaustive"),
                };
                return Ok(Some((kind, handle)));
            }
        }
        Ok(None)
    }
}

/// User-visible table properties (spec §6 "Properties of interest").
#[derive(Debug, Clone)]
pub struct TableProperties {
    pub whole_key_filtering: bool,
    pub prefix_filtering: bool,
    pub index_type: Option<IndexType>,
}

impl Default for TableProperties {
    fn default() -> Self {
        Self {
            whole_key_filtering: true,
            prefix_filtering: true,
            index_type: None,
        }
    }
}

/// Parses the properties block (spec §4.6 step 5): a missing property means
/// "supported" for backward compatibility, and an unrecognized boolean-ish
/// value is treated as `true` (a caller should log a warning for that case).
///
/// # Errors
///
/// Propagates block-iterator status errors.
pub fn parse_properties(block: &Arc<Block>) -> crate::Result<TableProperties> {
    let mut props = TableProperties::default();
    let comparator = Arc::new(BytewiseComparator);
    let mut it = crate::block::iter::BlockIter::new(Arc::clone(block), comparator);
    it.seek_to_first();

    while it.valid() {
        match it.key() {
            b"rocksdb.whole.key.filtering" => {
                props.whole_key_filtering = parse_bool_property(it.value());
            }
            b"rocksdb.prefix.filtering" => {
                props.prefix_filtering = parse_bool_property(it.value());
            }
            b"rocksdb.block.based.table.index.type" if it.value().len() == 4 => {
                let tag = LittleEndian::read_u32(it.value());
                props.index_type = match tag {
                    0 => Some(IndexType::BinarySearch),
                    1 => Some(IndexType::HashSearch),
                    _ => {
                        log::warn!("unrecognized index type tag {tag} in properties block, ignoring");
                        None
                    }
                };
            }
            _ => {}
        }
        it.next();
    }
    it.status()?;

    Ok(props)
}

/// `"0"` ⇒ false; `"1"` or anything else (including absence, handled by the
/// caller defaulting first) ⇒ true (spec §6).
fn parse_bool_property(value: &[u8]) -> bool {
    if value != b"0" && value != b"1" {
        log::warn!("unrecognized boolean property value {value:?}, treating as true");
    }
    value != b"0"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::Encode;
    use varint_rs::VarintWriter;

    fn build_block(entries: &[(&[u8], &[u8])]) -> Arc<Block> {
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
    fn meta_index_finds_filter_by_priority_order() {
        let mut handle_bytes = Vec::new();
        BlockHandle::new(5, 6).encode_into(&mut handle_bytes).unwrap();

        let block = build_block(&[(b"fullfilter.bloom", handle_bytes.as_slice())]);
        let meta = MetaIndex::parse(block);

        let (kind, handle) = meta.find_filter("bloom").unwrap().unwrap();
        assert_eq!(kind, FilterKind::Full);
        assert_eq!(handle, BlockHandle::new(5, 6));
    }

    #[test]
    fn meta_index_missing_filter_is_none() {
        let block = build_block(&[]);
        let meta = MetaIndex::parse(block);
        assert!(meta.find_filter("bloom").unwrap().is_none());
    }

    #[test]
    fn properties_absent_default_to_true() {
        let block = build_block(&[]);
        let props = parse_properties(&block).unwrap();
        assert!(props.whole_key_filtering);
        assert!(props.prefix_filtering);
    }

    #[test]
    fn properties_zero_disables_filtering() {
        let block = build_block(&[(b"rocksdb.whole.key.filtering", b"0")]);
        let props = parse_properties(&block).unwrap();
        assert!(!props.whole_key_filtering);
    }
}
