#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod ecs;
pub mod errors;
pub mod gpu;
pub mod graph;
pub mod math;
pub mod pipeline;
pub mod renderer;
pub mod scene;
pub mod settings;
pub mod shadows;
pub mod skinning;

/// Number of frames the CPU may record ahead of the GPU. Every per-frame
/// GPU buffer exists once per slot in this ring.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Capacity of the global 2D texture array bound once per scene.
pub const MAX_BINDLESS_TEXTURES: u32 = 4096;

/// Capacity of the global cubemap array (probe outputs, skybox).
pub const MAX_BINDLESS_CUBE_TEXTURES: u32 = 256;

/// Upper bound on lights considered per frame.
pub const MAX_LIGHTS: usize = 100;

/// Views (render targets) a single scene may own.
pub const MAX_VIEWS_PER_SCENE: usize = 4;

/// Maximum cascade count for directional-light shadow maps.
pub const MAX_SHADOW_CASCADES: u32 = 4;

pub use ecs::{ComponentLibrary, Entity};
pub use errors::{RenderError, Result};
pub use renderer::{RenderSceneParams, Renderer, SceneId, ViewId};
pub use settings::RenderSettings;
