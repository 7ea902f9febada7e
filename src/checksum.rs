// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Block checksums.
//!
//! The table's checksum kind (see [`crate::config::ChecksumKind`]) is
//! currently always `Xxh3`; the type exists so `ReadOptions::verify_checksums
//! = false` can skip the hash computation entirely without the caller caring
//! which algorithm would otherwise have run.

/// A 64-bit block checksum.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Checksum(u64);

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Checksum {
    /// Wraps a raw checksum value.
    #[must_use]
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw 64-bit integer.
    #[must_use]
    pub fn into_u64(self) -> u64 {
        self.0
    }

    /// Computes the checksum of a byte slice.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_64(bytes))
    }

    pub(crate) fn check(&self, expected: Self) -> crate::Result<()> {
        if self.0 == expected.0 {
            Ok(())
        } else {
            Err(crate::Error::ChecksumMismatch {
                expected,
                got: *self,
            })
        }
    }
}

/// A `Write` wrapper that hashes everything passed through it.
///
/// Used by the test-only table writer to compute a block's trailing
/// checksum without buffering the block twice.
pub struct ChecksummedWriter<W: std::io::Write> {
    inner: W,
    hasher: xxhash_rust::xxh3::Xxh3,
}

impl<W: std::io::Write> ChecksummedWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: writer,
            hasher: xxhash_rust::xxh3::Xxh3::new(),
        }
    }

    pub fn checksum(&self) -> Checksum {
        Checksum::from_raw(self.hasher.digest())
    }

    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

impl<W: std::io::Write> std::io::Write for ChecksummedWriter<W> {
    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.hasher.update(buf);
        self.inner.write(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::Checksum;

    #[test]
    fn checksum_stable_for_same_bytes() {
        let a = Checksum::of(b"hello world");
        let b = Checksum::of(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn checksum_differs_on_mutation() {
        let a = Checksum::of(b"hello world");
        let b = Checksum::of(b"hello worle");
        assert_ne!(a, b);
    }

    #[test]
    fn checksum_check_ok_and_mismatch() {
        let a = Checksum::of(b"abc");
        assert!(a.check(a).is_ok());
        assert!(a.check(Checksum::of(b"abd")).is_err());
    }
}
