// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Prefix extraction.
//!
//! Spec §4.5/§4.9 require a `PrefixExtractor` for hash-augmented indexes,
//! fixed-size filter key transformation, and the `PrefixMayMatch` analytic
//! optimization. Spec §4.9 states the three properties a correct extractor
//! must satisfy; we encode them here as doc obligations rather than runtime
//! checks (the reader trusts the caller, same as it trusts the comparator).

/// Derives a prefix from a user key.
///
/// # Required properties (spec §4.9)
///
/// For a correct implementation and the table's [`crate::comparator::Comparator`] `cmp`:
/// - `key.starts_with(extractor.transform(key))`
/// - `cmp(extractor.transform(key), key) != Greater` (the prefix never sorts after the key)
/// - monotonicity: if `cmp(a, b) != Greater` then
///   `cmp(extractor.transform(a), extractor.transform(b)) != Greater`
///
/// A reader never verifies these; violating them silently breaks
/// `PrefixMayMatch` and hash-index lookups.
pub trait PrefixExtractor: Sync + Send {
    /// Extracts the prefix of `key`. Only called when `in_domain(key)` is `true`.
    fn transform<'a>(&self, key: &'a [u8]) -> &'a [u8];

    /// Returns `true` if `key` has a well-defined prefix under this extractor.
    fn in_domain(&self, key: &[u8]) -> bool;
}

/// Extracts a fixed-length byte prefix; keys shorter than `len` are not in domain.
#[derive(Debug, Clone, Copy)]
pub struct FixedPrefixExtractor {
    len: usize,
}

impl FixedPrefixExtractor {
    /// Creates an extractor that takes the first `len` bytes of each key.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl PrefixExtractor for FixedPrefixExtractor {
    fn transform<'a>(&self, key: &'a [u8]) -> &'a [u8] {
        key.get(..self.len).unwrap_or(key)
    }

    fn in_domain(&self, key: &[u8]) -> bool {
        key.len() >= self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_prefix_extracts_leading_bytes() {
        let ext = FixedPrefixExtractor::new(3);
        assert!(ext.in_domain(b"hello"));
        assert_eq!(ext.transform(b"hello"), b"hel");
    }

    #[test]
    fn fixed_prefix_monotonic_under_bytewise_order() {
        let ext = FixedPrefixExtractor::new(2);
        let a = b"aa1";
        let b = b"ab9";
        assert!(a < b);
        assert!(ext.transform(a) <= ext.transform(b));
    }

    #[test]
    fn short_key_not_in_domain() {
        let ext = FixedPrefixExtractor::new(4);
        assert!(!ext.in_domain(b"ab"));
    }
}
