//! Frame Ring & Deferred Deletion
//!
//! `FRAMES_IN_FLIGHT` copies of every per-frame resource rotate through
//! the ring; before a slot is reused the GPU must be done with the frame
//! that last wrote it. Resource teardown is deferred the same way: a
//! retired handle is queued under the current frame number and dropped
//! only once that frame can no longer be in flight.

use crate::FRAMES_IN_FLIGHT;
use crate::errors::{RenderError, Result};

/// A GPU object whose drop is deferred past its last possible use.
pub enum DeferredResource {
    Buffer(wgpu::Buffer),
    Texture(wgpu::Texture),
    BindGroup(wgpu::BindGroup),
}

/// Per-frame deletion queue, drained at frame begin.
#[derive(Default)]
pub struct DeletionQueue {
    pending: Vec<(u64, DeferredResource)>,
}

impl DeletionQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a resource retired during `frame`.
    pub fn defer(&mut self, frame: u64, resource: DeferredResource) {
        self.pending.push((frame, resource));
    }

    /// Drops every entry whose frame is at least `FRAMES_IN_FLIGHT` behind
    /// `current_frame`.
    pub fn drain(&mut self, current_frame: u64) {
        let horizon = current_frame.saturating_sub(FRAMES_IN_FLIGHT as u64);
        self.pending.retain(|(frame, _)| *frame > horizon);
    }

    /// Drops everything immediately. Only valid after a device flush.
    pub fn drain_all(&mut self) {
        self.pending.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// The frames-in-flight ring.
///
/// wgpu exposes no timeline semaphores; the slot-reuse wait is expressed
/// as a whole-queue `device.poll(Wait)`, which is conservative (it waits
/// for all submitted work, a superset of the single oldest frame).
pub struct FrameRing {
    frame_number: u64,
    submitted: [bool; FRAMES_IN_FLIGHT],
    pub deletion_queue: DeletionQueue,
}

impl FrameRing {
    #[must_use]
    pub fn new() -> Self {
        Self {
            frame_number: 0,
            submitted: [false; FRAMES_IN_FLIGHT],
            deletion_queue: DeletionQueue::new(),
        }
    }

    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// The ring slot of the current frame.
    #[must_use]
    pub fn slot(&self) -> usize {
        (self.frame_number % FRAMES_IN_FLIGHT as u64) as usize
    }

    /// Waits for the slot's previous occupant and drains expired
    /// deletions. Surfaces `DeviceLost` to the caller of `begin_frame`.
    pub fn begin(&mut self, device: &wgpu::Device) -> Result<()> {
        let slot = self.slot();
        if self.submitted[slot] {
            device
                .poll(wgpu::PollType::wait_indefinitely())
                .map_err(|e| RenderError::DeviceLost(e.to_string()))?;
            self.submitted[slot] = false;
        }
        self.deletion_queue.drain(self.frame_number);
        Ok(())
    }

    /// Marks the current slot submitted and advances the ring.
    pub fn end(&mut self) {
        let slot = self.slot();
        self.submitted[slot] = true;
        self.frame_number += 1;
    }

    /// Abandons the current frame without submission; the slot stays
    /// reusable and the frame number still advances so readback timelines
    /// keep moving.
    pub fn skip(&mut self) {
        self.frame_number += 1;
    }

    /// Blocks until the device is idle. Used by resize and shutdown.
    pub fn flush(&mut self, device: &wgpu::Device) -> Result<()> {
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| RenderError::DeviceLost(e.to_string()))?;
        self.submitted = [false; FRAMES_IN_FLIGHT];
        self.deletion_queue.drain_all();
        Ok(())
    }
}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new()
    }
}
