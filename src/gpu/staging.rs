//! Per-Frame Staging Ring
//!
//! One staging buffer per frame in flight. Allocations within a frame are
//! monotonic offsets into the frame's slice; `reset` rewinds the cursor at
//! frame begin. Overflow is a reported error (the upload is dropped for
//! the frame), never undefined behavior.

use crate::FRAMES_IN_FLIGHT;
use crate::errors::{RenderError, Result};

/// The cursor arithmetic of one staging slice, separated from the GPU
/// buffer so it can be tested directly.
#[derive(Debug, Clone, Copy)]
pub struct RingCursor {
    capacity: u64,
    head: u64,
}

impl RingCursor {
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self { capacity, head: 0 }
    }

    pub fn reset(&mut self) {
        self.head = 0;
    }

    /// Reserves `size` bytes at `align` alignment; returns the offset.
    pub fn allocate(&mut self, size: u64, align: u64) -> Result<u64> {
        debug_assert!(align.is_power_of_two());
        let offset = self.head.next_multiple_of(align);
        let end = offset.checked_add(size).ok_or(RenderError::ResourceExhausted {
            context: "staging ring",
            requested: size,
            available: 0,
        })?;
        if end > self.capacity {
            return Err(RenderError::ResourceExhausted {
                context: "staging ring",
                requested: size,
                available: self.capacity.saturating_sub(offset),
            });
        }
        self.head = end;
        Ok(offset)
    }

    #[must_use]
    pub fn used(&self) -> u64 {
        self.head
    }

    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

/// The staging ring: `FRAMES_IN_FLIGHT` upload buffers plus their cursors.
pub struct StagingRing {
    buffers: Vec<wgpu::Buffer>,
    cursors: [RingCursor; FRAMES_IN_FLIGHT],
}

impl StagingRing {
    pub fn new(device: &wgpu::Device, capacity: u64) -> Self {
        let buffers = (0..FRAMES_IN_FLIGHT)
            .map(|i| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("staging ring {i}")),
                    size: capacity,
                    usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();
        Self {
            buffers,
            cursors: [RingCursor::new(capacity); FRAMES_IN_FLIGHT],
        }
    }

    /// Rewinds the slice for a new frame.
    pub fn reset(&mut self, slot: usize) {
        self.cursors[slot].reset();
    }

    /// Stages `data` into the frame's slice and returns its offset.
    pub fn stage(
        &mut self,
        queue: &wgpu::Queue,
        slot: usize,
        data: &[u8],
        align: u64,
    ) -> Result<u64> {
        let offset = self.cursors[slot].allocate(data.len() as u64, align)?;
        queue.write_buffer(&self.buffers[slot], offset, data);
        Ok(offset)
    }

    #[must_use]
    pub fn buffer(&self, slot: usize) -> &wgpu::Buffer {
        &self.buffers[slot]
    }

    #[must_use]
    pub fn used(&self, slot: usize) -> u64 {
        self.cursors[slot].used()
    }
}
