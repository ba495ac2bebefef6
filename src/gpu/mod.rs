//! GPU Resource Layer
//!
//! Thin ownership layer over wgpu: pooled allocators, the per-frame
//! staging ring, the frames-in-flight ring with deferred deletion, and the
//! texture registry the bindless tables index into.

pub mod allocator;
pub mod core;
pub mod frame;
pub mod staging;
pub mod texture;

pub use allocator::{BuddyAllocator, DEVICE_BUDDY_BLOCK_SIZE, GpuAllocators, PoolSlice};
pub use frame::{DeferredResource, DeletionQueue, FrameRing};
pub use self::core::{DYNAMIC_SLOT_SIZE, DynamicArena, GpuCore, Samplers, SharedLayouts};
pub use staging::{RingCursor, StagingRing};
pub use texture::{GpuTexture, TextureData, TextureId, TextureKind, TextureRegistry};
