// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Compression algorithm a block was stored under.
///
/// Stored as the first trailer byte following a block's raw bytes (spec
/// §3/§4.1). `ReadBlock` only decompresses when asked to and the tag is not
/// `None`; a tag requiring a feature this build was compiled without is
/// surfaced as [`crate::Error::Decompress`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[allow(clippy::module_name_repetitions)]
pub enum CompressionType {
    /// Block was stored uncompressed.
    #[default]
    None,

    /// Block was stored LZ4-compressed.
    Lz4,
}

impl Encode for CompressionType {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u8(match self {
            Self::None => 0,
            Self::Lz4 => 1,
        })?;
        Ok(())
    }
}

impl Decode for CompressionType {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let tag = reader.read_u8()?;
        match tag {
            0 => Ok(Self::None),
            1 => Ok(Self::Lz4),
            tag => Err(DecodeError::InvalidTag("CompressionType", tag)),
        }
    }
}

impl std::fmt::Display for CompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::None => "no compression",
            Self::Lz4 => "lz4",
        })
    }
}

/// Decompresses `bytes` according to `ty`.
///
/// Returns [`crate::Error::Decompress`] if `ty` requires a cargo feature
/// that is not enabled, or if the underlying decoder rejects the bytes.
pub fn decompress(ty: CompressionType, bytes: &[u8]) -> crate::Result<Vec<u8>> {
    match ty {
        CompressionType::None => Ok(bytes.to_vec()),

        #[cfg(feature = "lz4")]
        CompressionType::Lz4 => lz4_flex::decompress_size_prepended(bytes)
            .map_err(|_| crate::Error::Decompress(ty)),

        #[cfg(not(feature = "lz4"))]
        CompressionType::Lz4 => Err(crate::Error::Decompress(ty)),
    }
}

/// Compresses `bytes` according to `ty`. Used only by the test-only writer.
#[cfg(any(test, feature = "test-util"))]
pub(crate) fn compress(ty: CompressionType, bytes: &[u8]) -> crate::Result<Vec<u8>> {
    match ty {
        CompressionType::None => Ok(bytes.to_vec()),

        #[cfg(feature = "lz4")]
        CompressionType::Lz4 => Ok(lz4_flex::compress_prepend_size(bytes)),

        #[cfg(not(feature = "lz4"))]
        CompressionType::Lz4 => Err(crate::Error::Decompress(ty)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_serialize_none() {
        let serialized = CompressionType::None.encode_into_vec();
        assert_eq!(1, serialized.len());
    }

    #[test]
    fn compression_round_trip_none() {
        let data = b"hello world, this is a block of data".to_vec();
        let compressed = compress(CompressionType::None, &data).unwrap();
        let decompressed = decompress(CompressionType::None, &compressed).unwrap();
        assert_eq!(data, decompressed);
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn compression_round_trip_lz4() {
        let data = b"hello world, this is a block of data, repeated repeated repeated".to_vec();
        let compressed = compress(CompressionType::Lz4, &data).unwrap();
        let decompressed = decompress(CompressionType::Lz4, &compressed).unwrap();
        assert_eq!(data, decompressed);
    }
}
