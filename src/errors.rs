//! Error Types
//!
//! The single error type [`RenderError`] covers every failure mode of the
//! renderer core. The propagation policy is deliberately two-tiered:
//!
//! - resource-creation and pipeline-compile failures surface through the
//!   scene/view API call that triggered them;
//! - per-frame conditions (culling, shadow packing, staging overflow) are
//!   logged and locally degraded — a single failed drawable never aborts
//!   the frame.

use thiserror::Error;

/// The renderer's error type.
#[derive(Error, Debug)]
pub enum RenderError {
    // ========================================================================
    // GPU initialization
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// The device was lost mid-frame. The caller of `begin_frame` is
    /// expected to recreate the swapchain and retry.
    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    /// Window system error.
    #[error("Window system error: {0}")]
    WindowError(#[from] raw_window_handle::HandleError),

    // ========================================================================
    // Resource allocation
    // ========================================================================
    /// An allocator, the staging ring, or the shadow atlas could not
    /// satisfy a request. The offending work is dropped for the frame.
    #[error("Resource exhausted in {context}: requested {requested}, available {available}")]
    ResourceExhausted {
        /// Which pool or table overflowed
        context: &'static str,
        /// The request that did not fit
        requested: u64,
        /// Remaining capacity at the time of the request
        available: u64,
    },

    // ========================================================================
    // Scene content
    // ========================================================================
    /// A drawable references data the scene cannot render (a mesh without
    /// positions, a material index out of range, a skin with zero joints).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A shader variant failed to compile. The draw falls back to the
    /// "missing" pipeline so the rest of the scene still renders.
    #[error("Shader compile error in template '{template}': {message}")]
    ShaderCompile {
        /// Template the variant was derived from
        template: &'static str,
        /// Generator or validator output
        message: String,
    },

    /// A readback was requested before the producing frame completed.
    #[error("Not ready: {0}")]
    NotReady(&'static str),

    // ========================================================================
    // Asset decoding
    // ========================================================================
    /// Image decoding error (panorama or material texture).
    #[error("Image decode error: {0}")]
    ImageDecode(String),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for RenderError {
    fn from(err: image::ImageError) -> Self {
        RenderError::ImageDecode(err.to_string())
    }
}

/// Alias for `Result<T, RenderError>`.
pub type Result<T> = std::result::Result<T, RenderError>;
