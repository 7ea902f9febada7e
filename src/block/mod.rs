// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Block handles, block contents, and the on-disk block codec (spec §3,
//! §4.1).
//!
//! A block is a restart-point-indexed, prefix-compressed run of `(key,
//! value)` pairs:
//!
//! ```text
//! entry* restart[0..num_restarts) (u32 LE each) num_restarts (u32 LE)
//! ```
//!
//! where each `entry` is `shared_len(varint) unshared_len(varint)
//! value_len(varint) unshared_key_bytes value_bytes`, and `shared_len` is
//! always `0` at a restart point. This lets [`crate::block::iter::BlockIter`]
//! binary-search the restart array for the entry whose key is ≤ the seek
//! target, then linearly decode forward from there (spec §4.2).

pub mod iter;

use crate::{
    checksum::Checksum,
    coding::{Decode, DecodeError, Encode, EncodeError},
    compression::{self, CompressionType},
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use varint_rs::{VarintReader, VarintWriter};

/// A pair `(offset, size)` identifying a contiguous byte range within a
/// file (spec §3 "Block handle").
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct BlockHandle {
    offset: u64,
    size: u64,
}

impl BlockHandle {
    /// Constructs a handle.
    #[must_use]
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// The offset of the block's first byte.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The length of the block's raw (on-disk, possibly compressed)
    /// payload, excluding the trailer.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Encode for BlockHandle {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u64_varint(self.offset)?;
        writer.write_u64_varint(self.size)?;
        Ok(())
    }
}

impl Decode for BlockHandle {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let offset = reader.read_u64_varint()?;
        let size = reader.read_u64_varint()?;
        Ok(Self { offset, size })
    }
}

/// Number of trailer bytes following a block's payload on disk: one
/// compression-type byte plus an 8-byte xxh3-64 checksum.
pub const BLOCK_TRAILER_SIZE: usize = 1 + 8;

/// A parsed data or index block: its decompressed bytes plus the restart
/// offsets needed to binary-search it.
#[derive(Debug, Clone)]
pub struct Block {
    data: crate::Slice,
    restarts: Vec<u32>,
}

impl Block {
    /// Parses `data` (fully decompressed block contents, trailer already
    /// stripped) into entries plus a restart-offset table.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if the trailing restart-count/array is
    /// malformed or out of bounds.
    pub fn parse(data: crate::Slice) -> crate::Result<Self> {
        if data.len() < 4 {
            return Err(crate::Error::Corruption("block too small"));
        }

        let num_restarts = {
            let tail = data
                .get(data.len() - 4..)
                .ok_or(crate::Error::Corruption("block too small"))?;
            u32::from_le_bytes(tail.try_into().expect("checked length"))
        } as usize;

        let restarts_len = num_restarts
            .checked_mul(4)
            .ok_or(crate::Error::Corruption("restart count overflow"))?;
        let restarts_start = data
            .len()
            .checked_sub(4 + restarts_len)
            .ok_or(crate::Error::Corruption("restart array out of bounds"))?;

        let mut restarts = Vec::with_capacity(num_restarts);
        let restart_bytes = data
            .get(restarts_start..data.len() - 4)
            .ok_or(crate::Error::Corruption("restart array out of bounds"))?;
        for chunk in restart_bytes.chunks_exact(4) {
            restarts.push(u32::from_le_bytes(chunk.try_into().expect("exact chunk")));
        }

        Ok(Self { data, restarts })
    }

    /// Raw (restart-array-included) block bytes.
    pub(crate) fn raw_data(&self) -> &crate::Slice {
        &self.data
    }

    /// Offset (within `data`) where the entry stream ends and the restart
    /// array begins.
    fn entries_end(&self) -> usize {
        self.data.len() - 4 - self.restarts.len() * 4
    }

    /// The block's restart-point offsets, ascending.
    pub(crate) fn restarts(&self) -> &[u32] {
        &self.restarts
    }

    pub(crate) fn entry_bytes(&self) -> &[u8] {
        #[allow(clippy::indexing_slicing)]
        &self.data[..self.entries_end()]
    }

    /// Approximate heap footprint, for cache weighting.
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Reads a block by handle, verifies its checksum, and optionally
/// decompresses it (spec §4.1 `ReadBlock`).
///
/// Returns the block's raw (possibly still-compressed) bytes alongside its
/// compression tag when `decompress` is `false`, so the caller may cache
/// the raw form (spec §4.7 compressed-cache path); otherwise returns
/// already-decompressed bytes.
pub fn read_raw_block<R: std::io::Read + std::io::Seek>(
    reader: &mut R,
    handle: BlockHandle,
    verify_checksum: bool,
) -> crate::Result<(Vec<u8>, CompressionType)> {
    use std::io::SeekFrom;

    let total_len = handle
        .size
        .checked_add(BLOCK_TRAILER_SIZE as u64)
        .ok_or(crate::Error::Corruption("block handle overflow"))?;

    reader.seek(SeekFrom::Start(handle.offset))?;

    #[allow(clippy::cast_possible_truncation)]
    let mut buf = vec![0u8; total_len as usize];
    reader.read_exact(&mut buf)?;

    #[allow(clippy::cast_possible_truncation)]
    let payload_len = handle.size as usize;
    let (payload, trailer) = buf.split_at(payload_len);
    let compression_type = CompressionType::decode_from(&mut std::io::Cursor::new(trailer))
        .map_err(|_| crate::Error::Corruption("bad compression tag"))?;

    if verify_checksum {
        let checksum_bytes = trailer
            .get(1..9)
            .ok_or(crate::Error::Corruption("truncated block trailer"))?;
        let expected = Checksum::from_raw(u64::from_le_bytes(
            checksum_bytes.try_into().expect("checked length"),
        ));
        let got = Checksum::of(payload);
        got.check(expected)?;
    }

    Ok((payload.to_vec(), compression_type))
}

/// Decompresses raw block bytes previously returned by [`read_raw_block`].
pub fn decompress_block(bytes: &[u8], ty: CompressionType) -> crate::Result<crate::Slice> {
    let decompressed = compression::decompress(ty, bytes)?;
    Ok(crate::Slice::from(decompressed))
}

/// The payload stored in the *compressed* block cache (spec §4.7 step 4):
/// a block's raw on-disk bytes, still compressed, plus the tag needed to
/// decompress them on a subsequent hit.
#[derive(Debug, Clone)]
pub struct CompressedBlock {
    /// Raw (possibly compressed) block payload, trailer stripped.
    pub bytes: Vec<u8>,
    /// Compression the bytes are stored under.
    pub compression: CompressionType,
}

impl CompressedBlock {
    /// Approximate heap footprint, for cache weighting.
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_handle_round_trip() {
        let handle = BlockHandle::new(1234, 5678);
        let bytes = handle.encode_into_vec();
        let decoded = BlockHandle::decode_from(&mut std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(handle, decoded);
    }

    #[test]
    fn block_parse_rejects_too_small() {
        let err = Block::parse(crate::Slice::from(b"ab".as_slice()));
        assert!(err.is_err());
    }
}
