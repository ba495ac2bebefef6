//! Mouse Picking
//!
//! The pick pass writes a 32-bit entity id per covered pixel, encoded as
//! RGBA8: index low 24 bits in RGB, `generation & 0xFF` in alpha. After
//! the pass a one-texel copy moves the pixel under the cursor into the
//! frame's 4-byte readback buffer; the result is decoded
//! `FRAMES_IN_FLIGHT − 1` frames later, once the buffer is safely
//! mappable. Decode validates against the live drawable map, so stale
//! generations and uncovered pixels both yield the null entity.

use crate::FRAMES_IN_FLIGHT;
use crate::ecs::Entity;
use crate::errors::{RenderError, Result};

/// Encodes an entity for the pick attachment.
#[must_use]
pub fn encode_entity(entity: Entity) -> [u8; 4] {
    let index = entity.index();
    [
        (index & 0xFF) as u8,
        ((index >> 8) & 0xFF) as u8,
        ((index >> 16) & 0xFF) as u8,
        (entity.generation() & 0xFF) as u8,
    ]
}

/// Encodes as normalized floats, for the pick shader's dynamic data.
#[must_use]
pub fn encode_entity_color(entity: Entity) -> [f32; 4] {
    let bytes = encode_entity(entity);
    bytes.map(|b| f32::from(b) / 255.0)
}

/// Decodes a pick pixel. `resolve` maps a 24-bit index to the live entity
/// with that index, if any; a generation mismatch means the slot was
/// reused since the pass ran.
#[must_use]
pub fn decode_entity(rgba: [u8; 4], resolve: impl Fn(u32) -> Option<Entity>) -> Entity {
    let index = u32::from(rgba[0]) | (u32::from(rgba[1]) << 8) | (u32::from(rgba[2]) << 16);
    if index == 0x00FF_FFFF {
        // Clear color: nothing under the cursor
        return Entity::NULL;
    }
    match resolve(index) {
        Some(entity) if entity.generation() & 0xFF == u32::from(rgba[3]) => entity,
        _ => Entity::NULL,
    }
}

/// The clear value of the pick attachment, decoding to the null entity.
#[must_use]
pub fn clear_color() -> wgpu::Color {
    wgpu::Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    }
}

/// Per-view picking state: the request flag, the cursor, and the
/// per-frame readback ring.
pub struct PickState {
    pub request_hover: bool,
    pub cursor: (u32, u32),
    pub hovered: Entity,
    processing: [bool; FRAMES_IN_FLIGHT],
    ready: [bool; FRAMES_IN_FLIGHT],
    buffers: Vec<wgpu::Buffer>,
}

impl PickState {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffers = (0..FRAMES_IN_FLIGHT)
            .map(|i| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("pick readback {i}")),
                    size: 4,
                    usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                    mapped_at_creation: false,
                })
            })
            .collect();
        Self {
            request_hover: false,
            cursor: (0, 0),
            hovered: Entity::NULL,
            processing: [false; FRAMES_IN_FLIGHT],
            ready: [false; FRAMES_IN_FLIGHT],
            buffers,
        }
    }

    #[must_use]
    pub fn buffer(&self, slot: usize) -> &wgpu::Buffer {
        &self.buffers[slot]
    }

    /// Marks the frame's buffer as holding an in-flight copy.
    pub fn mark_copied(&mut self, slot: usize) {
        self.processing[slot] = true;
        self.ready[slot] = false;
    }

    /// Advances the slot's state at frame begin: a buffer copied
    /// `FRAMES_IN_FLIGHT` frames ago is now safely readable.
    pub fn advance(&mut self, slot: usize) {
        if self.processing[slot] {
            self.processing[slot] = false;
            self.ready[slot] = true;
        }
    }

    /// True when the slot's readback can be resolved this frame.
    #[must_use]
    pub fn is_ready(&self, slot: usize) -> bool {
        self.ready[slot]
    }

    /// Maps the slot's buffer and decodes the hovered entity.
    pub fn resolve(
        &mut self,
        device: &wgpu::Device,
        slot: usize,
        resolve_index: impl Fn(u32) -> Option<Entity>,
    ) -> Result<Entity> {
        if !self.ready[slot] {
            return Err(RenderError::NotReady("pick readback"));
        }
        self.ready[slot] = false;

        let buffer = &self.buffers[slot];
        let (tx, rx) = flume::bounded(1);
        buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| RenderError::DeviceLost(e.to_string()))?;
        rx.recv()
            .map_err(|_| RenderError::NotReady("pick readback channel"))?
            .map_err(|e| RenderError::DeviceLost(e.to_string()))?;

        let rgba = {
            let view = buffer.slice(..).get_mapped_range();
            [view[0], view[1], view[2], view[3]]
        };
        buffer.unmap();

        let entity = decode_entity(rgba, resolve_index);
        self.hovered = entity;
        Ok(entity)
    }
}
