//! Shadow Mapping
//!
//! All shadow maps for a frame share one depth atlas: each shadow-casting
//! light in the visible set requests one square per cascade (directional),
//! face (point), or map (spot), packed by a shelf packer that grows the
//! atlas on overflow. Cascade matrices use the parallel-split scheme with
//! sphere-fit stabilization and texel snapping.

pub mod atlas;
pub mod cascades;

pub use atlas::{AtlasRect, PackOutcome, ShadowAtlas, ShadowRequest, ShelfPacker};
pub use cascades::{
    build_cascade_view_projection, build_spot_view_projection, compute_cascade_splits,
    frustum_slice_corners_world, point_light_face_matrices,
};
