//! Device Memory Pools
//!
//! Three allocation disciplines back the scene's GPU data:
//!
//! - **dedicated** — one buffer per resource, for the large long-lived
//!   arrays (vertex/index/storage buffers, render targets);
//! - **local buddy** — power-of-two suballocation out of shared
//!   device-local blocks, for the many small persistent slices (per-skin
//!   dynamic vertex segments);
//! - **staging** — per-frame upload space, owned by
//!   [`crate::gpu::StagingRing`].
//!
//! The buddy logic is pure offset arithmetic and unit-tested; the pool
//! types wrap it around real `wgpu::Buffer` blocks.

use rustc_hash::FxHashMap;

use crate::errors::{RenderError, Result};

/// Size of one device-local buddy block.
pub const DEVICE_BUDDY_BLOCK_SIZE: u64 = 256 * 1024 * 1024;

/// Smallest buddy granule. Requests round up to this.
const MIN_BLOCK_SIZE: u64 = 256;

// ─── Buddy allocator ─────────────────────────────────────────────────────────

/// Power-of-two buddy suballocator over a fixed capacity.
///
/// Level 0 is the whole block; each level halves the granule. Frees merge
/// with their buddy eagerly.
#[derive(Debug)]
pub struct BuddyAllocator {
    capacity: u64,
    min_block: u64,
    levels: usize,
    /// Free offsets per level.
    free: Vec<Vec<u64>>,
    /// offset → level of live allocations.
    allocated: FxHashMap<u64, usize>,
    used: u64,
}

impl BuddyAllocator {
    /// `capacity` must be a power of two and a multiple of `min_block`.
    #[must_use]
    pub fn new(capacity: u64, min_block: u64) -> Self {
        debug_assert!(capacity.is_power_of_two());
        debug_assert!(min_block.is_power_of_two());
        debug_assert!(capacity >= min_block);

        let levels = (capacity / min_block).ilog2() as usize + 1;
        let mut free = vec![Vec::new(); levels];
        free[0].push(0);
        Self {
            capacity,
            min_block,
            levels,
            free,
            allocated: FxHashMap::default(),
            used: 0,
        }
    }

    fn block_size_at(&self, level: usize) -> u64 {
        self.capacity >> level
    }

    fn level_for(&self, size: u64) -> usize {
        let size = size.max(self.min_block).next_power_of_two();
        if size >= self.capacity {
            return 0;
        }
        ((self.capacity / size).ilog2() as usize).min(self.levels - 1)
    }

    /// Allocates `size` bytes; returns the offset, or `None` when no free
    /// granule fits.
    pub fn allocate(&mut self, size: u64) -> Option<u64> {
        if size == 0 || size > self.capacity {
            return None;
        }
        let target = self.level_for(size);

        // Find the deepest level at or above the target with a free block
        let mut level = target;
        loop {
            if !self.free[level].is_empty() {
                break;
            }
            if level == 0 {
                return None;
            }
            level -= 1;
        }

        // Split down to the target level
        let mut offset = self.free[level].pop().expect("level checked non-empty");
        while level < target {
            level += 1;
            let half = self.block_size_at(level);
            self.free[level].push(offset + half);
        }

        self.allocated.insert(offset, target);
        self.used += self.block_size_at(target);
        Some(offset)
    }

    /// Frees a prior allocation, merging buddies as far as possible.
    pub fn free(&mut self, offset: u64) {
        let Some(mut level) = self.allocated.remove(&offset) else {
            debug_assert!(false, "double free at offset {offset}");
            return;
        };
        self.used -= self.block_size_at(level);

        let mut offset = offset;
        while level > 0 {
            let size = self.block_size_at(level);
            let buddy = offset ^ size;
            let Some(pos) = self.free[level].iter().position(|&o| o == buddy) else {
                break;
            };
            self.free[level].swap_remove(pos);
            offset = offset.min(buddy);
            level -= 1;
        }
        self.free[level].push(offset);
    }

    #[must_use]
    pub fn used(&self) -> u64 {
        self.used
    }

    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Size actually reserved for a request of `size` bytes.
    #[must_use]
    pub fn reserved_size(&self, size: u64) -> u64 {
        self.block_size_at(self.level_for(size))
    }
}

// ─── Buffer pools ────────────────────────────────────────────────────────────

/// A suballocated slice of a pooled buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSlice {
    pub block: usize,
    pub offset: u64,
    pub size: u64,
}

struct PoolBlock {
    buffer: wgpu::Buffer,
    buddy: BuddyAllocator,
}

/// Device-local buffer pool: buddy-suballocates shared blocks, adding
/// blocks on demand.
pub struct LocalBufferPool {
    label: &'static str,
    usage: wgpu::BufferUsages,
    block_size: u64,
    blocks: Vec<PoolBlock>,
}

impl LocalBufferPool {
    #[must_use]
    pub fn new(label: &'static str, usage: wgpu::BufferUsages, block_size: u64) -> Self {
        Self {
            label,
            usage,
            block_size,
            blocks: Vec::new(),
        }
    }

    pub fn allocate(&mut self, device: &wgpu::Device, size: u64) -> Result<PoolSlice> {
        if size == 0 || size > self.block_size {
            return Err(RenderError::ResourceExhausted {
                context: "local buffer pool",
                requested: size,
                available: self.block_size,
            });
        }

        for (index, block) in self.blocks.iter_mut().enumerate() {
            if let Some(offset) = block.buddy.allocate(size) {
                return Ok(PoolSlice {
                    block: index,
                    offset,
                    size,
                });
            }
        }

        // All blocks full: add one
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(self.label),
            size: self.block_size,
            usage: self.usage,
            mapped_at_creation: false,
        });
        let mut buddy = BuddyAllocator::new(self.block_size, MIN_BLOCK_SIZE);
        let offset = buddy.allocate(size).ok_or(RenderError::ResourceExhausted {
            context: "local buffer pool",
            requested: size,
            available: self.block_size,
        })?;
        self.blocks.push(PoolBlock { buffer, buddy });
        log::debug!(
            "{}: added block {} ({} MiB)",
            self.label,
            self.blocks.len() - 1,
            self.block_size / (1024 * 1024)
        );
        Ok(PoolSlice {
            block: self.blocks.len() - 1,
            offset,
            size,
        })
    }

    pub fn free(&mut self, slice: PoolSlice) {
        if let Some(block) = self.blocks.get_mut(slice.block) {
            block.buddy.free(slice.offset);
        }
    }

    #[must_use]
    pub fn buffer(&self, block: usize) -> &wgpu::Buffer {
        &self.blocks[block].buffer
    }

    #[must_use]
    pub fn used(&self) -> u64 {
        self.blocks.iter().map(|b| b.buddy.used()).sum()
    }
}

/// The allocator family the renderer owns: a device-local buddy pool plus
/// bookkeeping for dedicated allocations.
pub struct GpuAllocators {
    pub local: LocalBufferPool,
    dedicated_bytes: u64,
}

impl GpuAllocators {
    #[must_use]
    pub fn new() -> Self {
        Self {
            local: LocalBufferPool::new(
                "local buddy pool",
                wgpu::BufferUsages::UNIFORM
                    | wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST,
                DEVICE_BUDDY_BLOCK_SIZE,
            ),
            dedicated_bytes: 0,
        }
    }

    /// Creates a dedicated device-local buffer initialized from `data`.
    pub fn create_local_buffer(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        usage: wgpu::BufferUsages,
        data: &[u8],
    ) -> wgpu::Buffer {
        let size = (data.len() as u64).max(4).next_multiple_of(4);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if !data.is_empty() {
            queue.write_buffer(&buffer, 0, data);
        }
        self.dedicated_bytes += size;
        buffer
    }

    /// Creates an empty dedicated buffer of `size` bytes.
    pub fn create_empty_buffer(
        &mut self,
        device: &wgpu::Device,
        label: &str,
        usage: wgpu::BufferUsages,
        size: u64,
    ) -> wgpu::Buffer {
        let size = size.max(4).next_multiple_of(4);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });
        self.dedicated_bytes += size;
        buffer
    }

    #[must_use]
    pub fn dedicated_bytes(&self) -> u64 {
        self.dedicated_bytes
    }
}

impl Default for GpuAllocators {
    fn default() -> Self {
        Self::new()
    }
}
