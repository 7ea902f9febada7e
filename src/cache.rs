// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The two-tier block cache adapter (spec §3 "Cache key", §4.3 "Cache
//! adapter").
//!
//! Two independent [`BlockCache`] instances are kept by a reader: one for
//! parsed, decompressed [`crate::block::Block`]s, one for raw (possibly
//! still-compressed) bytes. Both are the same generic cache underneath,
//! parameterized by what they store.
//!
//! `Lookup`/`Insert` return a [`CacheHandle`]; the handle must be passed to
//! [`BlockCache::release`] exactly once (spec §3 "Ownership invariants").
//! Because the cached value is reference-counted (an `Arc`), the handle's
//! `Drop` also releases it, so a handle dropped without an explicit
//! `release` call still cannot leak — but every reader code path still
//! calls `release` explicitly to keep the outstanding-handle count (used by
//! tests, spec §8 "Cache invariant") meaningful as a *protocol* check, not
//! just a memory-safety one.

use quick_cache::sync::Cache as QuickCache;
use quick_cache::Weighter;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// A per-file prefix used to build [`CacheKey`]s, guaranteeing that no two
/// blocks across all open tables collide in a shared cache (spec §3 "Cache
/// key" uniqueness invariant).
///
/// Real deployments could derive this from OS file identity (device +
/// inode); we always cache-allocate it instead, which satisfies the same
/// uniqueness invariant and keeps the reader free of platform-specific
/// `stat` calls (see `DESIGN.md`).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct FileCacheKeyPrefix(u64);

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

impl FileCacheKeyPrefix {
    /// Allocates a prefix guaranteed not to collide with any other prefix
    /// allocated in this process.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A cache key: a per-file prefix concatenated with a block's offset (spec
/// §3 "Cache key").
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct CacheKey {
    prefix: FileCacheKeyPrefix,
    offset: u64,
}

impl CacheKey {
    /// Builds the key for the block at `offset` within the file identified
    /// by `prefix`.
    #[must_use]
    pub fn new(prefix: FileCacheKeyPrefix, offset: u64) -> Self {
        Self { prefix, offset }
    }
}

#[derive(Clone)]
struct Entry<V> {
    value: Arc<V>,
    charge: u64,
}

struct EntryWeighter;

impl<V> Weighter<CacheKey, Entry<V>> for EntryWeighter {
    fn weight(&self, _key: &CacheKey, entry: &Entry<V>) -> u64 {
        entry.charge.max(1)
    }
}

/// A refcounted reference into a [`BlockCache`] (spec §3 "Cache handle").
///
/// Must be passed to [`BlockCache::release`] exactly once; an iterator
/// holding a handle registers that release as its cleanup (spec §3
/// "Lifecycles").
pub struct CacheHandle<V> {
    value: Arc<V>,
    outstanding: Arc<AtomicI64>,
}

impl<V> CacheHandle<V> {
    /// Accesses the cached value.
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Clones the underlying `Arc`, for callers that need an owned
    /// reference beyond the handle's lifetime (e.g. to hand to an
    /// iterator's cleanup closure).
    #[must_use]
    pub fn value_arc(&self) -> Arc<V> {
        Arc::clone(&self.value)
    }
}

impl<V> Drop for CacheHandle<V> {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A generic refcounted block cache (spec §4.3 "Cache adapter").
///
/// `query_id` is accepted by [`lookup`](Self::lookup) and
/// [`insert`](Self::insert) for API fidelity with spec §4.3 ("participates
/// in admission/eviction policy but not in equality") but is not otherwise
/// consulted by the default `quick_cache`-backed admission policy.
pub struct BlockCache<V> {
    data: QuickCache<CacheKey, Entry<V>, EntryWeighter, rustc_hash::FxBuildHasher>,
    capacity: u64,
    outstanding: Arc<AtomicI64>,
}

impl<V: Clone + Send + Sync + 'static> BlockCache<V> {
    /// Creates a cache with roughly `bytes` of capacity. A capacity of `0`
    /// disables caching: every lookup misses and every insert is a no-op,
    /// matching "no cache configured" call sites in spec §4.7.
    #[must_use]
    pub fn with_capacity_bytes(bytes: u64) -> Self {
        use quick_cache::sync::DefaultLifecycle;

        #[allow(clippy::default_trait_access)]
        let data = QuickCache::with(
            1_000_000,
            bytes.max(1),
            EntryWeighter,
            Default::default(),
            DefaultLifecycle::default(),
        );

        Self {
            data,
            capacity: bytes,
            outstanding: Arc::new(AtomicI64::new(0)),
        }
    }

    /// `true` if this cache has zero capacity, i.e. was never configured.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.capacity == 0
    }

    /// Looks up `key`. On a hit, increments the outstanding-handle count;
    /// the caller must `release` the returned handle exactly once (spec
    /// §4.3 "Lookup increments a refcount").
    #[must_use]
    pub fn lookup(&self, key: CacheKey, _query_id: u64) -> Option<CacheHandle<V>> {
        if self.capacity == 0 {
            return None;
        }
        let entry = self.data.get(&key)?;
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        Some(CacheHandle {
            value: entry.value,
            outstanding: Arc::clone(&self.outstanding),
        })
    }

    /// Inserts `value` under `key` with the given `charge` (weight), and
    /// returns a handle to it as if a `Lookup` had immediately followed
    /// (spec §4.3 "Insert ... -> Handle"). A charge of `0` is treated as
    /// `1`, so zero-sized values still occupy one capacity unit.
    ///
    /// Concurrent racing inserts for the same key are resolved by
    /// `quick_cache`: at most one wins, and the loser's handle still
    /// refers to a live value (spec §4.3 "losers' entries are harmlessly
    /// released").
    pub fn insert(&self, key: CacheKey, value: Arc<V>, charge: u64, _query_id: u64) -> CacheHandle<V> {
        if self.capacity > 0 {
            self.data.insert(
                key,
                Entry {
                    value: Arc::clone(&value),
                    charge,
                },
            );
        }
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        CacheHandle {
            value,
            outstanding: Arc::clone(&self.outstanding),
        }
    }

    /// Releases a handle previously returned by `lookup` or `insert`.
    ///
    /// This is a no-op beyond bookkeeping: the handle's `Drop` already
    /// performs the release, so calling this is purely for fidelity with
    /// spec §4.3's explicit `Release(Handle)` operation and for symmetry
    /// with call sites that want to release before the handle would
    /// otherwise go out of scope.
    pub fn release(&self, handle: CacheHandle<V>) {
        drop(handle);
    }

    /// Current total weight of cached entries.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.data.weight()
    }

    /// Configured capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Number of entries currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if no entries are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Evicts `key`, if present, as if it had aged out under the cache's own
    /// admission policy. Used by tests to force a miss on a previously
    /// cached block (spec §8 scenario 2 "Evict").
    #[doc(hidden)]
    pub fn remove(&self, key: CacheKey) {
        self.data.remove(&key);
    }

    /// `true` if `key` is currently resident, without affecting refcounts
    /// beyond `quick_cache`'s own LRU-promotion-on-read. Used by tests as
    /// `TEST_KeyInCache` (spec §8 scenario 2).
    #[doc(hidden)]
    #[must_use]
    pub fn contains(&self, key: CacheKey) -> bool {
        self.capacity > 0 && self.data.get(&key).is_some()
    }

    /// The number of `Lookup`/`Insert` handles not yet `release`d. Used by
    /// tests to assert the spec §8 "Cache invariant": this must be `0`
    /// once every handle a test acquired has been released and the table
    /// reader dropped.
    #[doc(hidden)]
    #[must_use]
    pub fn outstanding_handles(&self) -> i64 {
        self.outstanding.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_miss_then_insert_then_hit() {
        let cache: BlockCache<Vec<u8>> = BlockCache::with_capacity_bytes(1_000);
        let prefix = FileCacheKeyPrefix::next();
        let key = CacheKey::new(prefix, 0);

        assert!(cache.lookup(key, 0).is_none());

        let handle = cache.insert(key, Arc::new(vec![1, 2, 3]), 3, 0);
        assert_eq!(handle.value(), &vec![1u8, 2, 3]);
        cache.release(handle);

        let handle = cache.lookup(key, 0).expect("should be cached now");
        assert_eq!(handle.value(), &vec![1u8, 2, 3]);
        cache.release(handle);
    }

    #[test]
    fn every_lookup_and_insert_is_released() {
        let cache: BlockCache<Vec<u8>> = BlockCache::with_capacity_bytes(1_000);
        let prefix = FileCacheKeyPrefix::next();
        let key = CacheKey::new(prefix, 0);

        let h1 = cache.insert(key, Arc::new(vec![9]), 1, 0);
        assert_eq!(cache.outstanding_handles(), 1);

        let h2 = cache.lookup(key, 0).unwrap();
        assert_eq!(cache.outstanding_handles(), 2);

        cache.release(h1);
        cache.release(h2);
        assert_eq!(cache.outstanding_handles(), 0);
    }

    #[test]
    fn zero_capacity_cache_never_caches() {
        let cache: BlockCache<Vec<u8>> = BlockCache::with_capacity_bytes(0);
        let key = CacheKey::new(FileCacheKeyPrefix::next(), 0);
        let handle = cache.insert(key, Arc::new(vec![1]), 1, 0);
        cache.release(handle);
        assert!(cache.lookup(key, 0).is_none());
        assert!(!cache.contains(key));
    }

    #[test]
    fn cache_key_prefixes_are_unique() {
        let a = FileCacheKeyPrefix::next();
        let b = FileCacheKeyPrefix::next();
        assert_ne!(a, b);
    }
}
