//! Tests for PagedCache
//!
//! These tests verify:
//! - Reads are bounded by the page containing the position
//! - Short reads at end of stream leave zeros
//! - Big-endian integer helpers
//! - Invalidation after direct writes to the wrapped stream
//! - Clear threshold and hit/miss counters

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use shardstore::PagedCache;

// =============================================================================
// Helper Functions
// =============================================================================

fn sequential_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn cache_over(data: Vec<u8>, page_size: usize) -> PagedCache<Cursor<Vec<u8>>> {
    PagedCache::new(Cursor::new(data), page_size)
}

/// Stream wrapper counting calls to `read`
struct CountingStream {
    inner: Cursor<Vec<u8>>,
    reads: usize,
}

impl Read for CountingStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reads += 1;
        self.inner.read(buf)
    }
}

impl Seek for CountingStream {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

// =============================================================================
// Read Tests
// =============================================================================

#[test]
fn test_read_within_page() {
    let data = sequential_bytes(100);
    let mut cache = cache_over(data.clone(), 16);

    let mut buf = [0u8; 4];
    let n = cache.read(3, &mut buf).unwrap();

    assert_eq!(n, 4);
    assert_eq!(&buf, &data[3..7]);
}

#[test]
fn test_read_stops_at_page_boundary() {
    let data = sequential_bytes(100);
    let mut cache = cache_over(data.clone(), 16);

    let mut buf = [0u8; 10];
    let n = cache.read(12, &mut buf).unwrap();

    // Only 4 bytes remain in page 0 (12..16)
    assert_eq!(n, 4);
    assert_eq!(&buf[..4], &data[12..16]);

    let n = cache.read(16, &mut buf).unwrap();
    assert_eq!(n, 10);
    assert_eq!(&buf, &data[16..26]);
}

#[test]
fn test_short_read_at_end_leaves_zeros() {
    let data = vec![0xaa; 20];
    let mut cache = cache_over(data, 16);

    let mut buf = [0xffu8; 16];
    let n = cache.read(16, &mut buf).unwrap();

    // Cache reports the page remainder, not the end of the stream
    assert_eq!(n, 16);
    assert_eq!(&buf[..4], &[0xaa; 4]);
    assert_eq!(&buf[4..], &[0u8; 12]);
}

#[test]
fn test_read_past_end_of_stream_is_zero_page() {
    let mut cache = cache_over(vec![1, 2, 3], 8);

    let mut buf = [0xffu8; 4];
    let n = cache.read(64, &mut buf).unwrap();

    assert_eq!(n, 4);
    assert_eq!(buf, [0, 0, 0, 0]);
}

#[test]
fn test_read_full_crosses_pages() {
    let data = sequential_bytes(64);
    let mut cache = cache_over(data.clone(), 8);

    let mut buf = [0u8; 30];
    cache.read_full(5, &mut buf).unwrap();

    assert_eq!(&buf[..], &data[5..35]);
    assert_eq!(cache.page_count(), 5);
}

#[test]
fn test_integer_helpers_are_big_endian() {
    let mut data = vec![0u8; 32];
    data[0] = 0x7f;
    data[1..3].copy_from_slice(&(-2i16).to_be_bytes());
    // Straddles the 8-byte page boundary
    data[6..10].copy_from_slice(&0x0102_0304i32.to_be_bytes());
    data[16..24].copy_from_slice(&(-5i64).to_be_bytes());
    let mut cache = cache_over(data, 8);

    assert_eq!(cache.read_u8(0).unwrap(), 0x7f);
    assert_eq!(cache.read_i16(1).unwrap(), -2);
    assert_eq!(cache.read_i32(6).unwrap(), 0x0102_0304);
    assert_eq!(cache.read_i64(16).unwrap(), -5);
    assert_eq!(cache.read_u64(16).unwrap(), (-5i64) as u64);
}

// =============================================================================
// Hit / Miss Tests
// =============================================================================

#[test]
fn test_repeated_reads_hit_cache() {
    let stream = CountingStream {
        inner: Cursor::new(sequential_bytes(64)),
        reads: 0,
    };
    let mut cache = PagedCache::new(stream, 32);

    let mut buf = [0u8; 1];
    for pos in 0..32 {
        cache.read(pos, &mut buf).unwrap();
    }

    assert_eq!(cache.cache_misses(), 1);
    assert_eq!(cache.cache_hits(), 31);
    // One page fetched; the second read call observes end of data in the page
    assert!(cache.get_ref().reads <= 2);
}

// =============================================================================
// Invalidation Tests
// =============================================================================

#[test]
fn test_stale_until_invalidated() {
    let mut cache = cache_over(vec![0u8; 32], 8);
    assert_eq!(cache.read_u8(10).unwrap(), 0);

    {
        let stream = cache.get_mut();
        stream.seek(SeekFrom::Start(10)).unwrap();
        stream.write_all(&[9]).unwrap();
    }

    // Cache was never told
    assert_eq!(cache.read_u8(10).unwrap(), 0);

    cache.invalidate_section(10, 1);
    assert_eq!(cache.read_u8(10).unwrap(), 9);
}

#[test]
fn test_invalidate_section_evicts_overlapping_pages_only() {
    let mut cache = cache_over(sequential_bytes(64), 8);
    let mut buf = [0u8; 64];
    cache.read_full(0, &mut buf).unwrap();
    assert_eq!(cache.page_count(), 8);

    // Bytes 15..17 touch pages 1 and 2
    cache.invalidate_section(15, 2);
    assert_eq!(cache.page_count(), 6);

    // Zero-length is a no-op
    cache.invalidate_section(40, 0);
    assert_eq!(cache.page_count(), 6);

    // A huge section clears everything it overlaps
    cache.invalidate_section(0, u64::MAX);
    assert_eq!(cache.page_count(), 0);
}

// =============================================================================
// Clear Threshold Tests
// =============================================================================

#[test]
fn test_clear_cache_only_above_threshold() {
    let mut cache = cache_over(sequential_bytes(64), 8);
    let mut buf = [0u8; 32];
    cache.read_full(0, &mut buf).unwrap();
    assert_eq!(cache.page_count(), 4);

    cache.clear_cache(4);
    assert_eq!(cache.page_count(), 4);

    cache.clear_cache(3);
    assert_eq!(cache.page_count(), 0);

    // Still readable after a clear
    assert_eq!(cache.read_u8(9).unwrap(), 9);
}
