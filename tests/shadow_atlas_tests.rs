//! Shadow Atlas Tests
//!
//! Tests for:
//! - Shelf packing: bounds and pairwise disjointness
//! - Slice counts per light kind (cascades, cube faces, single map)
//! - Power-of-two growth on overflow
//! - Greedy drop at the resolution cap

use vesper::shadows::{AtlasRect, ShadowAtlas, ShadowRequest, ShelfPacker};

fn rects_disjoint(a: &AtlasRect, b: &AtlasRect) -> bool {
    a.x + a.size <= b.x || b.x + b.size <= a.x || a.y + a.size <= b.y || b.y + b.size <= a.y
}

fn assert_layout_valid(rects: &[AtlasRect], resolution: u32) {
    for rect in rects {
        assert!(
            rect.x + rect.size <= resolution && rect.y + rect.size <= resolution,
            "rect {rect:?} outside {resolution}"
        );
    }
    for (i, a) in rects.iter().enumerate() {
        for b in &rects[i + 1..] {
            assert!(rects_disjoint(a, b), "overlap between {a:?} and {b:?}");
        }
    }
}

// ============================================================================
// Shelf packer
// ============================================================================

#[test]
fn shelf_packer_fills_a_row() {
    let mut packer = ShelfPacker::new(1024);
    for i in 0..4 {
        let (x, y) = packer.pack(256).expect("fits");
        assert_eq!((x, y), (i * 256, 0));
    }
    // Fifth square opens a new shelf
    let (x, y) = packer.pack(256).expect("fits");
    assert_eq!((x, y), (0, 256));
}

#[test]
fn shelf_packer_rejects_oversize() {
    let mut packer = ShelfPacker::new(512);
    assert!(packer.pack(1024).is_none());
    assert!(packer.pack(0).is_none());
}

#[test]
fn shelf_packer_exhausts() {
    let mut packer = ShelfPacker::new(512);
    for _ in 0..4 {
        assert!(packer.pack(256).is_some());
    }
    assert!(packer.pack(256).is_none());
}

// ============================================================================
// Atlas packing
// ============================================================================

#[test]
fn atlas_packs_mixed_lights() {
    let mut atlas = ShadowAtlas::new(2048, 8192);
    let requests = [
        // Directional, 4 cascades
        ShadowRequest {
            light_index: 0,
            slice_count: 4,
            resolution: 512,
        },
        // Point, 6 faces
        ShadowRequest {
            light_index: 1,
            slice_count: 6,
            resolution: 256,
        },
        // Spot
        ShadowRequest {
            light_index: 2,
            slice_count: 1,
            resolution: 512,
        },
    ];
    let outcome = atlas.pack(&requests);
    assert!(outcome.dropped.is_empty());
    assert_eq!(outcome.rects.len(), 4 + 6 + 1);
    assert_layout_valid(&outcome.rects, atlas.resolution());

    for light in 0..3u32 {
        let mut slices: Vec<u32> = outcome
            .rects
            .iter()
            .filter(|r| r.light_index == light)
            .map(|r| r.slice)
            .collect();
        slices.sort_unstable();
        let expected: Vec<u32> = (0..requests[light as usize].slice_count).collect();
        assert_eq!(slices, expected, "light {light} slice coverage");
    }
}

#[test]
fn atlas_grows_power_of_two_until_fit() {
    let mut atlas = ShadowAtlas::new(512, 8192);
    // 16 × 512² cannot fit in 512² or 1024²; needs 2048²
    let requests = [ShadowRequest {
        light_index: 0,
        slice_count: 16,
        resolution: 512,
    }];
    let outcome = atlas.pack(&requests);
    assert!(outcome.grew);
    assert!(outcome.dropped.is_empty());
    assert_eq!(atlas.resolution(), 2048);
    assert_layout_valid(&outcome.rects, 2048);
}

#[test]
fn atlas_drops_lights_at_cap() {
    let mut atlas = ShadowAtlas::new(512, 512);
    let requests = [
        ShadowRequest {
            light_index: 0,
            slice_count: 1,
            resolution: 512,
        },
        ShadowRequest {
            light_index: 1,
            slice_count: 1,
            resolution: 512,
        },
    ];
    let outcome = atlas.pack(&requests);
    assert_eq!(atlas.resolution(), 512);
    assert_eq!(outcome.rects.len(), 1);
    assert_eq!(outcome.dropped, vec![1]);
    assert_layout_valid(&outcome.rects, 512);
}

#[test]
fn atlas_drops_whole_light_not_partial() {
    // A point light that can place some faces but not all six loses all
    let mut atlas = ShadowAtlas::new(1024, 1024);
    let requests = [
        ShadowRequest {
            light_index: 0,
            slice_count: 1,
            resolution: 1024,
        },
        ShadowRequest {
            light_index: 1,
            slice_count: 6,
            resolution: 512,
        },
    ];
    let outcome = atlas.pack(&requests);
    assert!(outcome.dropped.contains(&1));
    assert!(outcome.rects.iter().all(|r| r.light_index != 1));
}

#[test]
fn atlas_layout_is_stable_for_same_requests() {
    let requests = [
        ShadowRequest {
            light_index: 0,
            slice_count: 4,
            resolution: 256,
        },
        ShadowRequest {
            light_index: 1,
            slice_count: 1,
            resolution: 1024,
        },
    ];
    let mut a = ShadowAtlas::new(2048, 8192);
    let mut b = ShadowAtlas::new(2048, 8192);
    assert_eq!(a.pack(&requests).rects, b.pack(&requests).rects);
}
