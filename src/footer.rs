// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The table footer (spec §3 "Footer", §4.1 `ReadFooter`).

use crate::block::BlockHandle;
use crate::coding::{Decode, Encode};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// 4-byte on-disk magic identifying a table produced by a compatible
/// writer.
pub const MAGIC_BYTES: [u8; 4] = *b"SSTR";

/// The only format version this reader understands.
pub const FORMAT_VERSION: u32 = 1;

/// Fixed-size footer length: metaindex handle (2 varints, max 20 bytes
/// each worst case but we pad to a fixed width) + index handle + version +
/// magic. We use a generous fixed width and zero-pad, matching the
/// classic block-based-table footer's fixed-size-trailer design (spec §3).
pub const FOOTER_SIZE: usize = 48;

/// The fixed-size trailer holding the magic number, format version, and
/// the handles locating the meta-index and data-index blocks (spec §3).
#[derive(Debug, Clone, Copy)]
pub struct Footer {
    /// Format version the file was written with.
    pub version: u32,
    /// Location of the meta-index block.
    pub metaindex_handle: BlockHandle,
    /// Location of the data index block.
    pub index_handle: BlockHandle,
}

impl Footer {
    /// Serializes the footer into its fixed-size on-disk form.
    ///
    /// Used only by the test-only writer; a real writer would own this
    /// too, but it is not part of this crate's public surface.
    #[cfg(any(test, feature = "test-util"))]
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FOOTER_SIZE);
        self.metaindex_handle
            .encode_into(&mut buf)
            .expect("writing into a Vec cannot fail");
        self.index_handle
            .encode_into(&mut buf)
            .expect("writing into a Vec cannot fail");
        buf.resize(FOOTER_SIZE - 4 - 4, 0);
        buf.write_u32::<BigEndian>(self.version)
            .expect("writing into a Vec cannot fail");
        buf.extend_from_slice(&MAGIC_BYTES);
        debug_assert_eq!(buf.len(), FOOTER_SIZE);
        buf
    }

    /// Reads and validates the footer living in the last [`FOOTER_SIZE`]
    /// bytes of a file of `file_size` bytes.
    ///
    /// # Errors
    ///
    /// `Corruption` on magic mismatch, unsupported version, or an
    /// undecodable handle; `Io` if the file is smaller than the footer.
    pub fn read<R: std::io::Read + std::io::Seek>(
        reader: &mut R,
        file_size: u64,
    ) -> crate::Result<Self> {
        if file_size < FOOTER_SIZE as u64 {
            return Err(crate::Error::Corruption("file too small for footer"));
        }

        reader.seek(std::io::SeekFrom::Start(file_size - FOOTER_SIZE as u64))?;
        let mut buf = vec![0u8; FOOTER_SIZE];
        reader.read_exact(&mut buf)?;

        let magic = buf
            .get(FOOTER_SIZE - 4..)
            .ok_or(crate::Error::Corruption("truncated footer"))?;
        if magic != MAGIC_BYTES {
            return Err(crate::Error::Corruption("bad magic"));
        }

        let mut version_bytes = buf
            .get(FOOTER_SIZE - 8..FOOTER_SIZE - 4)
            .ok_or(crate::Error::Corruption("truncated footer"))?;
        let version = version_bytes.read_u32::<BigEndian>()?;
        if version != FORMAT_VERSION {
            return Err(crate::Error::Corruption("bad footer version"));
        }

        let mut cursor = std::io::Cursor::new(&buf[..FOOTER_SIZE - 8]);
        let metaindex_handle = BlockHandle::decode_from(&mut cursor)
            .map_err(|_| crate::Error::Corruption("bad metaindex handle"))?;
        let index_handle = BlockHandle::decode_from(&mut cursor)
            .map_err(|_| crate::Error::Corruption("bad index handle"))?;

        Ok(Self {
            version,
            metaindex_handle,
            index_handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_round_trip() {
        let footer = Footer {
            version: FORMAT_VERSION,
            metaindex_handle: BlockHandle::new(10, 20),
            index_handle: BlockHandle::new(40, 50),
        };
        let bytes = footer.encode();
        assert_eq!(bytes.len(), FOOTER_SIZE);

        let mut cursor = std::io::Cursor::new(bytes);
        let decoded = Footer::read(&mut cursor, FOOTER_SIZE as u64).unwrap();
        assert_eq!(decoded.version, FORMAT_VERSION);
        assert_eq!(decoded.metaindex_handle.offset(), 10);
        assert_eq!(decoded.index_handle.offset(), 40);
    }

    #[test]
    fn footer_rejects_bad_magic() {
        let footer = Footer {
            version: FORMAT_VERSION,
            metaindex_handle: BlockHandle::new(10, 20),
            index_handle: BlockHandle::new(40, 50),
        };
        let mut bytes = footer.encode();
        let len = bytes.len();
        bytes[len - 1] = b'X';

        let mut cursor = std::io::Cursor::new(bytes);
        let err = Footer::read(&mut cursor, FOOTER_SIZE as u64);
        assert!(matches!(err, Err(crate::Error::Corruption("bad magic"))));
    }

    #[test]
    fn footer_rejects_short_file() {
        let mut cursor = std::io::Cursor::new(vec![0u8; 4]);
        let err = Footer::read(&mut cursor, 4);
        assert!(err.is_err());
    }
}
