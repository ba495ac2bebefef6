//! Allocator Tests
//!
//! Tests for:
//! - Buddy allocation: rounding, splitting, merging, exhaustion
//! - The staging ring cursor: alignment, monotonic offsets, overflow

use vesper::gpu::{BuddyAllocator, RingCursor};

// ============================================================================
// Buddy allocator
// ============================================================================

#[test]
fn allocates_and_rounds_to_power_of_two() {
    let mut buddy = BuddyAllocator::new(1024, 64);
    assert_eq!(buddy.reserved_size(1), 64);
    assert_eq!(buddy.reserved_size(65), 128);
    assert_eq!(buddy.reserved_size(128), 128);
    assert_eq!(buddy.reserved_size(1024), 1024);

    let offset = buddy.allocate(100).expect("fits");
    assert_eq!(offset % 64, 0);
    assert_eq!(buddy.used(), 128);
}

#[test]
fn fills_to_capacity_with_min_blocks() {
    let mut buddy = BuddyAllocator::new(512, 64);
    let mut offsets = Vec::new();
    for _ in 0..8 {
        offsets.push(buddy.allocate(64).expect("fits"));
    }
    assert!(buddy.allocate(64).is_none(), "capacity exhausted");

    offsets.sort_unstable();
    offsets.dedup();
    assert_eq!(offsets.len(), 8, "offsets must be distinct");
    assert_eq!(buddy.used(), 512);
}

#[test]
fn free_merges_back_to_whole_block() {
    let mut buddy = BuddyAllocator::new(256, 32);
    let a = buddy.allocate(32).unwrap();
    let b = buddy.allocate(32).unwrap();
    let c = buddy.allocate(64).unwrap();
    buddy.free(b);
    buddy.free(a);
    buddy.free(c);
    assert_eq!(buddy.used(), 0);
    // A fully merged block satisfies a whole-capacity request again
    assert_eq!(buddy.allocate(256), Some(0));
}

#[test]
fn split_blocks_do_not_overlap() {
    let mut buddy = BuddyAllocator::new(1024, 32);
    let mut spans: Vec<(u64, u64)> = Vec::new();
    for size in [32u64, 500, 64, 100, 32] {
        if let Some(offset) = buddy.allocate(size) {
            spans.push((offset, buddy.reserved_size(size)));
        }
    }
    for (i, (a_off, a_size)) in spans.iter().enumerate() {
        for (b_off, b_size) in &spans[i + 1..] {
            let disjoint = a_off + a_size <= *b_off || b_off + b_size <= *a_off;
            assert!(disjoint, "overlap {a_off}+{a_size} vs {b_off}+{b_size}");
        }
    }
}

#[test]
fn rejects_oversize_and_zero() {
    let mut buddy = BuddyAllocator::new(256, 32);
    assert!(buddy.allocate(0).is_none());
    assert!(buddy.allocate(512).is_none());
}

#[test]
fn freed_space_is_reusable() {
    let mut buddy = BuddyAllocator::new(256, 32);
    let a = buddy.allocate(128).unwrap();
    let _b = buddy.allocate(128).unwrap();
    buddy.free(a);
    let c = buddy.allocate(128).expect("freed half is available");
    assert_eq!(a, c);
}

// ============================================================================
// Staging ring cursor
// ============================================================================

#[test]
fn cursor_offsets_are_monotonic_and_aligned() {
    let mut cursor = RingCursor::new(4096);
    let a = cursor.allocate(100, 4).unwrap();
    let b = cursor.allocate(10, 256).unwrap();
    let c = cursor.allocate(1, 4).unwrap();
    assert_eq!(a, 0);
    assert_eq!(b % 256, 0);
    assert!(b >= 100);
    assert!(c > b);
    assert_eq!(cursor.used(), c + 1);
}

#[test]
fn cursor_overflow_is_an_error() {
    let mut cursor = RingCursor::new(256);
    cursor.allocate(200, 4).unwrap();
    let err = cursor.allocate(100, 4).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("staging ring"), "got: {message}");
}

#[test]
fn cursor_reset_rewinds() {
    let mut cursor = RingCursor::new(256);
    cursor.allocate(200, 4).unwrap();
    cursor.reset();
    assert_eq!(cursor.used(), 0);
    assert!(cursor.allocate(200, 4).is_ok());
}

#[test]
fn overflow_leaves_cursor_usable() {
    let mut cursor = RingCursor::new(128);
    assert!(cursor.allocate(256, 4).is_err());
    // The failed request must not advance the head
    assert_eq!(cursor.used(), 0);
    assert!(cursor.allocate(64, 4).is_ok());
}
