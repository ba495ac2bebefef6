//! Packed Graphics State
//!
//! `wgpu` descriptor types do not implement `Hash`/`Eq`, and the variant
//! cache wants a compact key. `GraphicsState` mirrors exactly the
//! fixed-function state the renderer varies and packs it into a `u64`.

use crate::ecs::BlendMode;

/// Which pass family a pipeline targets. Part of pipeline identity: the
/// same material state compiles differently per target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Deferred,
    Forward,
    Shadow,
    Probe,
    Pick,
    Post,
}

/// Stencil usage families. References are supplied at draw time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilMode {
    Disabled,
    /// Always pass, write the reference (G-buffer marks rendered pixels,
    /// outline mask writes the selection).
    AlwaysReplace,
    /// Pass where the reference is ≥ the buffer value (outline edge).
    TestGreaterEqual,
}

/// The fixed-function half of a shader variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphicsState {
    pub pass: PassKind,
    pub depth_write: bool,
    pub depth_compare: wgpu::CompareFunction,
    pub cull_mode: Option<wgpu::Face>,
    pub front_ccw: bool,
    pub blend: BlendMode,
    pub stencil: StencilMode,
    /// Disabled for stencil-only passes (the outline mask).
    pub color_writes: bool,
}

impl GraphicsState {
    /// Opaque geometry defaults for a pass.
    #[must_use]
    pub fn opaque(pass: PassKind) -> Self {
        Self {
            pass,
            depth_write: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            cull_mode: Some(wgpu::Face::Back),
            front_ccw: true,
            blend: BlendMode::Opaque,
            stencil: StencilMode::Disabled,
            color_writes: true,
        }
    }

    /// Packs the state into the cache key representation.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        let pass = match self.pass {
            PassKind::Deferred => 0u64,
            PassKind::Forward => 1,
            PassKind::Shadow => 2,
            PassKind::Probe => 3,
            PassKind::Pick => 4,
            PassKind::Post => 5,
        };
        let compare = match self.depth_compare {
            wgpu::CompareFunction::Never => 0u64,
            wgpu::CompareFunction::Less => 1,
            wgpu::CompareFunction::Equal => 2,
            wgpu::CompareFunction::LessEqual => 3,
            wgpu::CompareFunction::Greater => 4,
            wgpu::CompareFunction::NotEqual => 5,
            wgpu::CompareFunction::GreaterEqual => 6,
            wgpu::CompareFunction::Always => 7,
        };
        let cull = match self.cull_mode {
            None => 0u64,
            Some(wgpu::Face::Front) => 1,
            Some(wgpu::Face::Back) => 2,
        };
        let blend = match self.blend {
            BlendMode::Opaque => 0u64,
            BlendMode::AlphaMask => 1,
            BlendMode::Blend => 2,
        };
        let stencil = match self.stencil {
            StencilMode::Disabled => 0u64,
            StencilMode::AlwaysReplace => 1,
            StencilMode::TestGreaterEqual => 2,
        };

        pass | (u64::from(self.depth_write) << 3)
            | (compare << 4)
            | (cull << 7)
            | (u64::from(self.front_ccw) << 9)
            | (blend << 10)
            | (stencil << 12)
            | (u64::from(self.color_writes) << 14)
    }

    /// The target blend state implied by the blend mode. Alpha masking is
    /// a shader discard, not a blend.
    #[must_use]
    pub fn blend_state(self) -> Option<wgpu::BlendState> {
        match self.blend {
            BlendMode::Opaque | BlendMode::AlphaMask => None,
            BlendMode::Blend => Some(wgpu::BlendState::ALPHA_BLENDING),
        }
    }

    /// The wgpu stencil descriptor for this mode.
    #[must_use]
    pub fn stencil_state(self) -> wgpu::StencilState {
        let face = match self.stencil {
            StencilMode::Disabled => wgpu::StencilFaceState::IGNORE,
            StencilMode::AlwaysReplace => wgpu::StencilFaceState {
                compare: wgpu::CompareFunction::Always,
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::Keep,
                pass_op: wgpu::StencilOperation::Replace,
            },
            StencilMode::TestGreaterEqual => wgpu::StencilFaceState {
                compare: wgpu::CompareFunction::GreaterEqual,
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::Keep,
                pass_op: wgpu::StencilOperation::Keep,
            },
        };
        wgpu::StencilState {
            front: face,
            back: face,
            read_mask: 0xFF,
            write_mask: 0xFF,
        }
    }
}
