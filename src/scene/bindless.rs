//! Bindless Texture Tables
//!
//! Two append-only index spaces — 2D textures and cubemaps — shared by
//! every draw in a scene. The first query for a texture handle claims the
//! next slot; later queries return the cached slot, so a slot is stable
//! for the scene's lifetime. Handles are generational: a reused registry
//! slot hashes to a different key and can never resurrect a stale index.
//!
//! Slot 0 of each space is the dummy texture; materials with an absent map
//! sample it and multiply by factor 1.

use rustc_hash::FxHashMap;

use crate::errors::{RenderError, Result};
use crate::gpu::texture::TextureId;
use crate::{MAX_BINDLESS_CUBE_TEXTURES, MAX_BINDLESS_TEXTURES};

/// The scene's two bindless index spaces.
pub struct BindlessTables {
    slots_2d: Vec<TextureId>,
    slots_cube: Vec<TextureId>,
    index_2d: FxHashMap<TextureId, u32>,
    index_cube: FxHashMap<TextureId, u32>,
    dummy_2d: TextureId,
    dummy_cube: TextureId,
    /// Bumped on any slot change; the per-frame bind groups rebuild when
    /// their generation falls behind.
    generation: u64,
}

impl BindlessTables {
    #[must_use]
    pub fn new(dummy_2d: TextureId, dummy_cube: TextureId) -> Self {
        Self {
            slots_2d: vec![dummy_2d],
            slots_cube: vec![dummy_cube],
            index_2d: FxHashMap::default(),
            index_cube: FxHashMap::default(),
            dummy_2d,
            dummy_cube,
            generation: 1,
        }
    }

    /// Slot of a 2D texture, assigning one on first sight.
    pub fn index_2d(&mut self, id: TextureId) -> Result<u32> {
        if let Some(&slot) = self.index_2d.get(&id) {
            return Ok(slot);
        }
        let slot = self.slots_2d.len() as u32;
        if slot >= MAX_BINDLESS_TEXTURES {
            return Err(RenderError::ResourceExhausted {
                context: "bindless 2d table",
                requested: 1,
                available: 0,
            });
        }
        self.slots_2d.push(id);
        self.index_2d.insert(id, slot);
        self.generation += 1;
        Ok(slot)
    }

    /// Slot of a cubemap, assigning one on first sight.
    pub fn index_cube(&mut self, id: TextureId) -> Result<u32> {
        if let Some(&slot) = self.index_cube.get(&id) {
            return Ok(slot);
        }
        let slot = self.slots_cube.len() as u32;
        if slot >= MAX_BINDLESS_CUBE_TEXTURES {
            return Err(RenderError::ResourceExhausted {
                context: "bindless cube table",
                requested: 1,
                available: 0,
            });
        }
        self.slots_cube.push(id);
        self.index_cube.insert(id, slot);
        self.generation += 1;
        Ok(slot)
    }

    /// Points a retired texture's slot back at the dummy. The slot itself
    /// is never reassigned.
    pub fn invalidate(&mut self, id: TextureId) {
        if let Some(slot) = self.index_2d.remove(&id) {
            self.slots_2d[slot as usize] = self.dummy_2d;
            self.generation += 1;
        }
        if let Some(slot) = self.index_cube.remove(&id) {
            self.slots_cube[slot as usize] = self.dummy_cube;
            self.generation += 1;
        }
    }

    #[must_use]
    pub fn slots_2d(&self) -> &[TextureId] {
        &self.slots_2d
    }

    #[must_use]
    pub fn slots_cube(&self) -> &[TextureId] {
        &self.slots_cube
    }

    #[must_use]
    pub fn len_2d(&self) -> u32 {
        self.slots_2d.len() as u32
    }

    #[must_use]
    pub fn len_cube(&self) -> u32 {
        self.slots_cube.len() as u32
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Resets both spaces to just the dummy slots (scene teardown).
    pub fn clear(&mut self) {
        self.slots_2d.clear();
        self.slots_2d.push(self.dummy_2d);
        self.slots_cube.clear();
        self.slots_cube.push(self.dummy_cube);
        self.index_2d.clear();
        self.index_cube.clear();
        self.generation += 1;
    }
}
