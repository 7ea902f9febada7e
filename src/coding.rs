// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::io::{Read, Write};

/// Error during serialization.
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error.
    Io(std::io::Error),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "EncodeError::Io({e})"),
        }
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for EncodeError {}

/// Error during deserialization of an on-disk structure.
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error (including unexpected EOF).
    Io(std::io::Error),

    /// A tag byte did not match any known variant of `what`.
    InvalidTag(&'static str, u8),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "DecodeError::Io({e})"),
            Self::InvalidTag(what, tag) => write!(f, "invalid {what} tag: {tag}"),
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for DecodeError {}

impl From<DecodeError> for crate::Error {
    fn from(value: DecodeError) -> Self {
        match value {
            DecodeError::Io(e) => Self::Io(e),
            DecodeError::InvalidTag(..) => Self::Corruption("invalid on-disk tag"),
        }
    }
}

impl From<EncodeError> for crate::Error {
    fn from(value: EncodeError) -> Self {
        match value {
            EncodeError::Io(e) => Self::Io(e),
        }
    }
}

/// Serializes a value into a byte stream.
pub trait Encode {
    /// Serializes into a writer.
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Serializes into a freshly-allocated vector.
    fn encode_into_vec(&self) -> Vec<u8> {
        let mut v = vec![];
        self.encode_into(&mut v).expect("writing into a Vec cannot fail");
        v
    }
}

/// Deserializes a value from a byte stream.
pub trait Decode {
    /// Deserializes from a reader.
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError>
    where
        Self: Sized;
}
