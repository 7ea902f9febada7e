// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::checksum::Checksum;
use crate::compression::CompressionType;

/// Errors that can occur opening or reading a table.
///
/// `NotFound` and `Incomplete` are deliberately not variants here: they are
/// represented as return values (`Option`, or iterator validity/status)
/// rather than as errors, since a caller must act on them differently than
/// on a hard failure.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum Error {
    /// An I/O error occurred reading the underlying file.
    Io(std::io::Error),

    /// The on-disk format is corrupt: bad magic, undecodable handle, invalid
    /// filter block prefix, and so on. The tag is a short static description
    /// of what failed to parse.
    Corruption(&'static str),

    /// A block's stored checksum did not match the checksum computed over
    /// its bytes.
    ChecksumMismatch {
        /// Checksum computed over the bytes actually read.
        got: Checksum,
        /// Checksum stored in the block trailer.
        expected: Checksum,
    },

    /// A block claimed a compression type this build cannot decode (e.g.
    /// `Lz4` without the `lz4` feature), or decompression itself failed.
    Decompress(CompressionType),

    /// A caller-supplied argument was invalid, e.g. `Prefetch` called with
    /// `begin > end`.
    InvalidArgument(&'static str),

    /// The file uses an index or filter type this reader does not
    /// recognize.
    Unsupported(&'static str),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Corruption(tag) => write!(f, "corruption: {tag}"),
            Self::ChecksumMismatch { got, expected } => {
                write!(f, "checksum mismatch: got {got}, expected {expected}")
            }
            Self::Decompress(ty) => write!(f, "failed to decompress block ({ty})"),
            Self::InvalidArgument(tag) => write!(f, "invalid argument: {tag}"),
            Self::Unsupported(tag) => write!(f, "unsupported: {tag}"),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
