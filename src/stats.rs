// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Statistics collaborator (spec §10.5).
//!
//! The reader calls into a `Statistics` implementation wherever spec §8's
//! scenarios need an observable counter ("zero filter-useful ticks",
//! "filter useful"); the actual sink (an exporter, a dashboard) is an
//! external collaborator out of scope here, mirroring the teacher's own
//! `metrics.rs` atomic-counter approach gated behind its `metrics` feature.

use std::sync::atomic::{AtomicU64, Ordering};

/// A countable event the reader reports.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Ticker {
    /// A block was found in the uncompressed or compressed cache.
    BlockCacheHit,
    /// A block had to be read from file.
    BlockCacheMiss,
    /// A filter ruled a key out, avoiding a block/data read.
    BloomFilterUseful,
    /// A full filter returned a positive result.
    BloomFilterFullPositive,
    /// A fixed-size filter's filter-index was consulted.
    BloomFilterPrefixChecked,
}

/// A sink for reader-reported counters.
pub trait Statistics: Send + Sync {
    /// Records `count` occurrences of `ticker`.
    fn record_ticker(&self, ticker: Ticker, count: u64);
}

/// Discards every recorded ticker; the default when the caller supplies
/// nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStatistics;

impl Statistics for NoopStatistics {
    fn record_ticker(&self, _ticker: Ticker, _count: u64) {}
}

/// An atomic-counter `Statistics` implementation used by tests to assert on
/// exact ticker counts (spec §8 "zero filter-useful ticks", scenario 1).
#[derive(Debug, Default)]
pub struct CountingStatistics {
    block_cache_hit: AtomicU64,
    block_cache_miss: AtomicU64,
    bloom_filter_useful: AtomicU64,
    bloom_filter_full_positive: AtomicU64,
    bloom_filter_prefix_checked: AtomicU64,
}

impl CountingStatistics {
    /// Returns the current count for `ticker`.
    #[must_use]
    pub fn get(&self, ticker: Ticker) -> u64 {
        self.counter(ticker).load(Ordering::Relaxed)
    }

    fn counter(&self, ticker: Ticker) -> &AtomicU64 {
        match ticker {
            Ticker::BlockCacheHit => &self.block_cache_hit,
            Ticker::BlockCacheMiss => &self.block_cache_miss,
            Ticker::BloomFilterUseful => &self.bloom_filter_useful,
            Ticker::BloomFilterFullPositive => &self.bloom_filter_full_positive,
            Ticker::BloomFilterPrefixChecked => &self.bloom_filter_prefix_checked,
        }
    }
}

impl Statistics for CountingStatistics {
    fn record_ticker(&self, ticker: Ticker, count: u64) {
        self.counter(ticker).fetch_add(count, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_statistics_accumulates() {
        let stats = CountingStatistics::default();
        stats.record_ticker(Ticker::BlockCacheHit, 1);
        stats.record_ticker(Ticker::BlockCacheHit, 2);
        assert_eq!(stats.get(Ticker::BlockCacheHit), 3);
        assert_eq!(stats.get(Ticker::BlockCacheMiss), 0);
    }
}
