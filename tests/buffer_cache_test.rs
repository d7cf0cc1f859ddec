//! Buffer cache tests.
//!
//! These tests exercise the cache through its public interface only: read,
//! write, release through guards, snapshot pairs and statistics.

use std::sync::Arc;
use std::thread;

use tempfile::tempdir;
use undolog::storage::{FileDisk, MemDisk};
use undolog::{BufferCache, Error, BSIZE};

const DEV: u32 = 1;
const BUFFERS: usize = 10;

fn create_cache(capacity: usize) -> (BufferCache<MemDisk>, MemDisk) {
    let disk = MemDisk::new(DEV, 128);
    (BufferCache::new(capacity, disk.clone()), disk)
}

/// Helper to write a string to block data.
fn copy_string(data: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    data[..bytes.len()].copy_from_slice(bytes);
    data[bytes.len()] = 0;
}

/// Helper to read a null-terminated string from block data.
fn read_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}

// ============================================================================
// Basic read / write
// ============================================================================

#[test]
fn test_very_basic() {
    let (cache, disk) = create_cache(BUFFERS);
    let str_data = "Hello, world!";

    {
        let mut buf = cache.read(DEV, 12).unwrap();
        copy_string(buf.data_mut().as_mut_slice(), str_data);
        cache.write(&buf).unwrap();
    }

    // Served from the cache.
    {
        let buf = cache.read(DEV, 12).unwrap();
        assert_eq!(read_string(buf.data().as_slice()), str_data);
    }

    // And durable on the device.
    assert_eq!(read_string(&disk.snapshot(12)), str_data);
}

#[test]
fn test_unwritten_change_lost_on_recycle() {
    let (cache, disk) = create_cache(2);

    {
        let mut buf = cache.read(DEV, 1).unwrap();
        copy_string(buf.data_mut().as_mut_slice(), "scratch");
    }

    // Push block 1 out of the cache.
    drop(cache.read(DEV, 2).unwrap());
    drop(cache.read(DEV, 3).unwrap());

    let buf = cache.read(DEV, 1).unwrap();
    assert_eq!(read_string(buf.data().as_slice()), "");
    assert!(disk.snapshot(1).iter().all(|&b| b == 0));
}

#[test]
fn test_out_of_range_block() {
    let (cache, _disk) = create_cache(BUFFERS);

    assert!(matches!(
        cache.read(DEV, 128),
        Err(Error::BlockOutOfRange {
            dev: DEV,
            blockno: 128
        })
    ));
}

#[test]
fn test_wrong_device() {
    let (cache, _disk) = create_cache(BUFFERS);
    assert!(matches!(cache.read(DEV + 1, 0), Err(Error::UnknownDevice(2))));
}

// ============================================================================
// Reference counts and coherence
// ============================================================================

#[test]
fn test_reference_counts() {
    let (cache, _disk) = create_cache(2);

    let a = cache.read(DEV, 5).unwrap();
    let b = cache.read(DEV, 5).unwrap();
    let c = cache.read(DEV, 5).unwrap();

    assert_eq!(a.id(), b.id());
    assert_eq!(b.id(), c.id());
    assert_eq!(cache.meta(a.id()).refcnt, 3);

    let id = a.id();
    drop(a);
    b.release();
    assert_eq!(cache.meta(id).refcnt, 1);

    drop(c);
    assert_eq!(cache.meta(id).refcnt, 0);
    assert!(cache.meta(id).is_recyclable());
}

#[test]
fn test_writes_visible_through_every_reference() {
    let (cache, _disk) = create_cache(BUFFERS);

    let mut writer = cache.read(DEV, 20).unwrap();
    let reader = cache.read(DEV, 20).unwrap();

    copy_string(writer.data_mut().as_mut_slice(), "shared");
    assert_eq!(read_string(reader.data().as_slice()), "shared");
}

// ============================================================================
// Exhaustion and recycling
// ============================================================================

#[test]
fn test_all_buffers_referenced() {
    let (cache, _disk) = create_cache(BUFFERS);

    let guards: Vec<_> = (0..BUFFERS as u32)
        .map(|b| cache.read(DEV, b).unwrap())
        .collect();

    // Every buffer is referenced: a miss cannot be served.
    assert!(matches!(cache.read(DEV, 100), Err(Error::NoBuffers)));

    // A hit still can.
    let again = cache.read(DEV, 3).unwrap();
    assert_eq!(again.id(), guards[3].id());
    drop(again);

    drop(guards);
    assert!(cache.read(DEV, 100).is_ok());
}

#[test]
fn test_recycle_order_follows_release_order() {
    let (cache, _disk) = create_cache(3);

    let a = cache.read(DEV, 1).unwrap();
    let b = cache.read(DEV, 2).unwrap();
    let c = cache.read(DEV, 3).unwrap();
    let (id_a, id_b, id_c) = (a.id(), b.id(), c.id());

    // Release in the order b, c, a.
    drop(b);
    drop(c);
    drop(a);

    assert_eq!(cache.read(DEV, 10).unwrap().id(), id_b);
    assert_eq!(cache.read(DEV, 11).unwrap().id(), id_c);

    // Block 1 is still resident.
    assert_eq!(cache.resident_copies(DEV, 1), vec![id_a]);
}

#[test]
fn test_persistence_across_recycling() {
    let (cache, _disk) = create_cache(2);

    for blockno in 0u32..8 {
        let mut buf = cache.read(DEV, blockno).unwrap();
        buf.data_mut().as_mut_slice()[0] = blockno as u8;
        buf.data_mut().as_mut_slice()[1] = (blockno as u8).wrapping_mul(3);
        cache.write(&buf).unwrap();
    }

    for blockno in 0u32..8 {
        let buf = cache.read(DEV, blockno).unwrap();
        assert_eq!(buf.data().as_slice()[0], blockno as u8);
        assert_eq!(buf.data().as_slice()[1], (blockno as u8).wrapping_mul(3));
    }
}

// ============================================================================
// Snapshot pairs
// ============================================================================

#[test]
fn test_snapshot_pair_is_independent() {
    let (cache, disk) = create_cache(BUFFERS);
    disk.poke(30, b"original");

    let mut new = cache.duplicate_for_write(DEV, 30).unwrap();
    copy_string(new.data_mut().as_mut_slice(), "modified");

    let old = cache.find_tagged(DEV, 30, true).unwrap();
    assert_eq!(read_string(cache.data(old).as_slice()), "original");
    assert_eq!(cache.find_tagged(DEV, 30, false).unwrap(), new.id());

    // A plain read shares the working copy, never the snapshot.
    let reader = cache.read(DEV, 30).unwrap();
    assert_eq!(reader.id(), new.id());
    assert_eq!(read_string(reader.data().as_slice()), "modified");

    // The working guard owns the snapshot reference.
    assert_eq!(new.snapshot(), Some(old));
    drop(reader);
    drop(new);
    assert_eq!(cache.meta(old).refcnt, 0);
}

#[test]
fn test_abandoned_write_frees_both_buffers() {
    let (cache, _disk) = create_cache(8);

    for i in 0..32u32 {
        let mut buf = cache.duplicate_for_write(DEV, 100 + (i % 20)).unwrap();
        copy_string(buf.data_mut().as_mut_slice(), "abandoned");
    }

    // Every slot can still be referenced at once.
    let guards: Vec<_> = (0..8u32).map(|b| cache.read(DEV, b).unwrap()).collect();
    assert_eq!(guards.len(), 8);
}

#[test]
fn test_snapshot_needs_two_buffers() {
    let (cache, _disk) = create_cache(1);

    assert!(matches!(
        cache.duplicate_for_write(DEV, 4),
        Err(Error::NoBuffers)
    ));

    // The working copy's reference was given back.
    assert!(cache.read(DEV, 5).is_ok());
}

// ============================================================================
// Statistics
// ============================================================================

#[test]
fn test_stats() {
    let (cache, _disk) = create_cache(2);

    drop(cache.read(DEV, 1).unwrap()); // miss
    drop(cache.read(DEV, 1).unwrap()); // hit
    drop(cache.read(DEV, 2).unwrap()); // miss
    {
        let buf = cache.read(DEV, 3).unwrap(); // miss, recycles block 1
        cache.write(&buf).unwrap();
    }

    let snapshot = cache.stats().snapshot();
    assert_eq!(snapshot.cache_hits, 1);
    assert_eq!(snapshot.cache_misses, 3);
    assert_eq!(snapshot.recycles, 3);
    assert_eq!(snapshot.blocks_read, 3);
    assert_eq!(snapshot.blocks_written, 1);
    assert!((snapshot.hit_rate() - 0.25).abs() < f64::EPSILON);

    cache.stats().reset();
    assert_eq!(cache.stats().snapshot().cache_misses, 0);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_readers() {
    let (cache, disk) = create_cache(BUFFERS);
    for blockno in 0u32..4 {
        disk.poke(blockno, &[blockno as u8 + 1; BSIZE]);
        drop(cache.read(DEV, blockno).unwrap());
    }
    let cache = Arc::new(cache);

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..200u32 {
                    let blockno = (t + i) % 4;
                    let buf = cache.read(DEV, blockno).unwrap();
                    assert!(buf.data().as_slice().iter().all(|&b| b == blockno as u8 + 1));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // Every read after warm-up was a hit.
    assert_eq!(disk.reads(), 4);
    assert_eq!(cache.stats().snapshot().cache_hits, 800);
}

// ============================================================================
// File-backed device
// ============================================================================

#[test]
fn test_file_disk_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("disk.img");
    let data = "persistent!";

    {
        let disk = FileDisk::create(&path, DEV, 64).unwrap();
        let cache = BufferCache::new(4, disk);

        let mut buf = cache.read(DEV, 42).unwrap();
        copy_string(buf.data_mut().as_mut_slice(), data);
        cache.write(&buf).unwrap();
    }

    {
        let disk = FileDisk::open(&path, DEV).unwrap();
        let cache = BufferCache::new(4, disk);
        assert_eq!(cache.device_blocks(), 64);

        let buf = cache.read(DEV, 42).unwrap();
        assert_eq!(read_string(buf.data().as_slice()), data);
    }
}
