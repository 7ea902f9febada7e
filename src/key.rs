// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{Decode, DecodeError, Encode, EncodeError},
    SeqNo, UserKey,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::{
    cmp::Reverse,
    io::{Read, Write},
};

/// Whether an entry represents a live value or a deletion marker.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub enum ValueType {
    /// A live value.
    Value,

    /// A deletion marker (tombstone).
    Tombstone,
}

impl ValueType {
    /// Returns `true` if this is a tombstone marker.
    #[must_use]
    pub fn is_tombstone(self) -> bool {
        self == Self::Tombstone
    }
}

impl TryFrom<u8> for ValueType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Value),
            1 => Ok(Self::Tombstone),
            _ => Err(()),
        }
    }
}

impl From<ValueType> for u8 {
    fn from(value: ValueType) -> Self {
        match value {
            ValueType::Value => 0,
            ValueType::Tombstone => 1,
        }
    }
}

/// A user key suffixed with a sequence number and value type, as stored
/// inside data blocks.
///
/// This is the unit the table's key comparator orders entries by (spec §3
/// "Keys within one block are sorted by the table's key comparator"): two
/// internal keys sharing a user key are ordered newest-sequence-number
/// first, so a forward scan naturally visits the most recent version of a
/// key before its older, still-present versions.
#[derive(Clone, PartialEq, Eq)]
pub struct InternalKey {
    /// The raw, engine-visible key.
    pub user_key: UserKey,
    /// Monotonic sequence number assigned at write time.
    pub seqno: SeqNo,
    /// Value or tombstone.
    pub value_type: ValueType,
}

impl std::fmt::Debug for InternalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?}:{}:{}",
            self.user_key,
            self.seqno,
            match self.value_type {
                ValueType::Value => "V",
                ValueType::Tombstone => "T",
            },
        )
    }
}

impl InternalKey {
    /// Builds an internal key, asserting the 16-bit length budget implied
    /// by the `u16`-prefixed encoding below.
    pub fn new<K: Into<UserKey>>(user_key: K, seqno: SeqNo, value_type: ValueType) -> Self {
        let user_key = user_key.into();

        assert!(
            user_key.len() <= u16::MAX.into(),
            "keys can be 65535 bytes in length"
        );

        Self {
            user_key,
            seqno,
            value_type,
        }
    }

    /// Returns `true` if this entry is a tombstone.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value_type.is_tombstone()
    }
}

impl Encode for InternalKey {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u16::<BigEndian>(self.user_key.len() as u16)?;
        writer.write_all(&self.user_key)?;

        writer.write_u64::<BigEndian>(self.seqno)?;
        writer.write_u8(u8::from(self.value_type))?;

        Ok(())
    }
}

impl Decode for InternalKey {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let key_len = reader.read_u16::<BigEndian>()?;
        let mut key = vec![0; key_len.into()];
        reader.read_exact(&mut key)?;

        let seqno = reader.read_u64::<BigEndian>()?;

        let value_type = reader.read_u8()?;
        let value_type = value_type
            .try_into()
            .map_err(|()| DecodeError::InvalidTag("ValueType", value_type))?;

        Ok(Self::new(key, seqno, value_type))
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// Order by user key, THEN by sequence number (descending).
// This is one of the most important functions here: getting it wrong
// means queries silently return stale versions of a key.
impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.user_key, Reverse(self.seqno)).cmp(&(&other.user_key, Reverse(other.seqno)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pik_cmp_user_key() {
        let a = InternalKey::new("a", 0, ValueType::Value);
        let b = InternalKey::new("b", 0, ValueType::Value);
        assert!(a < b);
    }

    #[test]
    fn pik_cmp_seqno() {
        let newer = InternalKey::new("a", 5, ValueType::Value);
        let older = InternalKey::new("a", 1, ValueType::Value);
        assert!(newer < older, "higher seqno should sort first for equal keys");
    }

    #[test]
    fn pik_encode_decode_round_trip() {
        let key = InternalKey::new("hello", 42, ValueType::Tombstone);
        let bytes = key.encode_into_vec();
        let decoded = InternalKey::decode_from(&mut std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(key, decoded);
        assert!(decoded.is_tombstone());
    }
}
