//! End-to-end coverage of `Open`/`Get`/`Prefetch` against real, on-disk-shaped
//! tables built with [`sst_reader::test_writer`] (spec §10.4/§10.6), one test
//! per "Concrete scenario" enumerated in spec §8.

use sst_reader::test_writer::{build_table, encode_internal_key, FilterSpec, TableSpec};
use sst_reader::{
    BlockCache, BlockHandle, BytewiseComparator, CountingStatistics, GetResult, InternalKey,
    ReadOptions, Statistics, Table, TableCaches, TableOptions, Ticker, ValueType,
};
use std::io::{Cursor, Write};
use std::sync::Arc;

fn entry(user_key: &[u8], seqno: u64, value_type: ValueType) -> InternalKey {
    InternalKey::new(user_key, seqno, value_type)
}

/// The index and data blocks are keyed by the full-encoded `InternalKey`
/// (spec §3), so a raw user-key slice is not a valid search key for
/// `approximate_offset_of`/`prefetch` under the plain bytewise comparator —
/// this builds a key in the same encoding those blocks use.
fn search_key(user_key: &[u8], seqno: u64, value_type: ValueType) -> Vec<u8> {
    encode_internal_key(&entry(user_key, seqno, value_type))
}

fn open(
    bytes: Vec<u8>,
    options: TableOptions,
    caches: TableCaches,
    statistics: Option<Arc<dyn Statistics>>,
) -> Table<Cursor<Vec<u8>>> {
    let len = bytes.len() as u64;
    Table::open(Cursor::new(bytes), len, BytewiseComparator, options, caches, None, None, statistics)
        .expect("table opens")
}

fn get(table: &Table<Cursor<Vec<u8>>>, user_key: &[u8]) -> GetResult {
    table
        .get(&ReadOptions::default(), &entry(user_key, 1, ValueType::Value))
        .expect("get succeeds")
}

#[test]
fn scenario1_open_with_missing_filter() {
    let entries = vec![
        (entry(b"alpha", 1, ValueType::Value), b"a-value".as_slice()),
        (entry(b"beta", 1, ValueType::Value), b"b-value".as_slice()),
    ];
    let bytes = build_table(&entries, &TableSpec::default());

    let counting = Arc::new(CountingStatistics::default());
    let statistics: Arc<dyn Statistics> = Arc::clone(&counting);
    let table = open(bytes, TableOptions::default(), TableCaches::default(), Some(statistics));

    match get(&table, b"alpha") {
        GetResult::Found(value) => assert_eq!(&*value, b"a-value"),
        _ => panic!("expected alpha to be found"),
    }
    assert!(matches!(get(&table, b"missing"), GetResult::NotFound));
    assert_eq!(counting.get(Ticker::BloomFilterUseful), 0, "no filter block means nothing can rule a key out");
}

#[test]
fn scenario2_cache_hit_path() {
    let entries = vec![
        (entry(b"k1", 1, ValueType::Value), b"v1".as_slice()),
        (entry(b"k2", 1, ValueType::Value), b"v2".as_slice()),
    ];
    let bytes = build_table(&entries, &TableSpec::default());
    let caches = TableCaches {
        uncompressed: Some(Arc::new(BlockCache::with_capacity_bytes(1 << 20))),
        compressed: None,
    };
    let table = open(bytes, TableOptions::default(), caches, None);

    assert!(matches!(get(&table, b"k1"), GetResult::Found(_)));
    let offset = table
        .approximate_offset_of(&search_key(b"k1", 1, ValueType::Value))
        .expect("offset resolves");
    let handle = BlockHandle::new(offset, 0);

    assert!(table.test_key_in_cache(handle));
    table.test_evict_from_cache(handle);
    assert!(!table.test_key_in_cache(handle));
}

#[test]
fn scenario3_compressed_cache_promotion() {
    let entries = vec![
        (entry(b"k1", 1, ValueType::Value), b"v1".as_slice()),
        (entry(b"k2", 1, ValueType::Value), b"v2".as_slice()),
    ];
    let bytes = build_table(&entries, &TableSpec::default());
    let caches = TableCaches {
        uncompressed: Some(Arc::new(BlockCache::with_capacity_bytes(1 << 20))),
        compressed: Some(Arc::new(BlockCache::with_capacity_bytes(1 << 20))),
    };
    let counting = Arc::new(CountingStatistics::default());
    let statistics: Arc<dyn Statistics> = Arc::clone(&counting);
    let table = open(bytes, TableOptions::default(), caches, Some(statistics));

    assert!(matches!(get(&table, b"k1"), GetResult::Found(_)));
    assert_eq!(counting.get(Ticker::BlockCacheMiss), 1);

    let offset = table
        .approximate_offset_of(&search_key(b"k1", 1, ValueType::Value))
        .expect("offset resolves");
    let handle = BlockHandle::new(offset, 0);
    table.test_evict_from_cache(handle);
    assert!(!table.test_key_in_cache(handle));

    assert!(matches!(get(&table, b"k1"), GetResult::Found(_)));
    assert_eq!(counting.get(Ticker::BlockCacheMiss), 1, "the compressed cache satisfied the second read");
    assert!(table.test_key_in_cache(handle), "a compressed-cache hit repopulates the uncompressed cache");
}

#[test]
fn scenario4_block_based_filter_touches_one_block() {
    let entries = vec![
        (entry(b"A", 1, ValueType::Value), b"a".as_slice()),
        (entry(b"M", 1, ValueType::Value), b"m".as_slice()),
        (entry(b"Z", 1, ValueType::Value), b"z".as_slice()),
    ];
    let spec = TableSpec {
        block_size_target: 1,
        filter: Some(FilterSpec::BlockBased),
        ..TableSpec::default()
    };
    let bytes = build_table(&entries, &spec);

    for missing_key in [b"B".as_slice(), b"N".as_slice()] {
        let counting = Arc::new(CountingStatistics::default());
        let statistics: Arc<dyn Statistics> = Arc::clone(&counting);
        let table = open(bytes.clone(), TableOptions::default(), TableCaches::default(), Some(statistics));

        assert!(matches!(get(&table, missing_key), GetResult::NotFound));
        assert!(
            counting.get(Ticker::BlockCacheMiss) <= 1,
            "a block-based filter must rule the key out at its one candidate block, never scanning onward"
        );
    }
}

#[test]
fn scenario5_fixed_size_filter_sentinel_needs_zero_block_io() {
    let entries = vec![
        (entry(b"A", 1, ValueType::Value), b"1".as_slice()),
        (entry(b"E", 1, ValueType::Value), b"2".as_slice()),
        (entry(b"I", 1, ValueType::Value), b"3".as_slice()),
        (entry(b"M", 1, ValueType::Value), b"4".as_slice()),
        (entry(b"Q", 1, ValueType::Value), b"5".as_slice()),
    ];
    let spec = TableSpec {
        block_size_target: 1,
        filter: Some(FilterSpec::FixedSize { blocks_per_filter: 5 }),
        ..TableSpec::default()
    };
    let bytes = build_table(&entries, &spec);

    let counting = Arc::new(CountingStatistics::default());
    let statistics: Arc<dyn Statistics> = Arc::clone(&counting);
    let table = open(bytes, TableOptions::default(), TableCaches::default(), Some(statistics));

    assert!(matches!(get(&table, b"Z"), GetResult::NotFound));
    assert_eq!(counting.get(Ticker::BloomFilterUseful), 1, "\"Z\" sorts past the last filter-index entry (\"Q\")");
    assert_eq!(counting.get(Ticker::BlockCacheMiss), 0, "no data block may be fetched to answer this");
    assert_eq!(counting.get(Ticker::BlockCacheHit), 0, "no filter block may be fetched to answer this either");
}

#[test]
fn scenario6_prefetch_stops_at_the_boundary_block() {
    let entries = vec![
        (entry(b"C", 1, ValueType::Value), b"c".as_slice()),
        (entry(b"H", 1, ValueType::Value), b"h".as_slice()),
        (entry(b"P", 1, ValueType::Value), b"p".as_slice()),
        (entry(b"Z", 1, ValueType::Value), b"z".as_slice()),
    ];
    let spec = TableSpec {
        block_size_target: 1,
        ..TableSpec::default()
    };
    let bytes = build_table(&entries, &spec);
    let caches = TableCaches {
        uncompressed: Some(Arc::new(BlockCache::with_capacity_bytes(1 << 20))),
        compressed: None,
    };
    let counting = Arc::new(CountingStatistics::default());
    let statistics: Arc<dyn Statistics> = Arc::clone(&counting);
    let table = open(bytes, TableOptions::default(), caches, Some(statistics));

    let begin = search_key(b"B", 1, ValueType::Value);
    let end = search_key(b"K", 1, ValueType::Value);
    table.prefetch(Some(&begin), Some(&end)).expect("prefetch succeeds");

    for loaded_key in [b"C".as_slice(), b"H".as_slice(), b"P".as_slice()] {
        let offset = table
            .approximate_offset_of(&search_key(loaded_key, 1, ValueType::Value))
            .expect("offset resolves");
        assert!(
            table.test_key_in_cache(BlockHandle::new(offset, 0)),
            "block for {loaded_key:?} should have been warmed"
        );
    }

    let z_offset = table
        .approximate_offset_of(&search_key(b"Z", 1, ValueType::Value))
        .expect("offset resolves");
    assert!(
        !table.test_key_in_cache(BlockHandle::new(z_offset, 0)),
        "prefetch must stop at the boundary block and never touch the block past `end`"
    );
    assert_eq!(counting.get(Ticker::BlockCacheMiss), 3, "exactly the C/H/P blocks were read");
}

#[test]
fn on_disk_round_trip_through_a_real_file() {
    let entries = vec![
        (entry(b"apple", 1, ValueType::Value), b"fruit-a".as_slice()),
        (entry(b"banana", 1, ValueType::Value), b"fruit-b".as_slice()),
    ];
    let bytes = build_table(&entries, &TableSpec::default());

    let mut file = tempfile::NamedTempFile::new().expect("creates a temp file");
    file.write_all(&bytes).expect("writes the fixture table");
    file.flush().expect("flushes the fixture table");

    let handle = file.reopen().expect("reopens the fixture for reading");
    let file_size = handle.metadata().expect("stats the fixture").len();

    let table = Table::open(
        handle,
        file_size,
        BytewiseComparator,
        TableOptions::default(),
        TableCaches::default(),
        None,
        None,
        None,
    )
    .expect("table opens from a real file descriptor");

    match table
        .get(&ReadOptions::default(), &entry(b"banana", 1, ValueType::Value))
        .expect("get succeeds")
    {
        GetResult::Found(value) => assert_eq!(&*value, b"fruit-b"),
        _ => panic!("expected banana to be found"),
    }
}
