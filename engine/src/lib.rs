//! Forward+ Engine Library
//!
//! Tile-based light culling for wgpu renderers. The screen is split into
//! fixed-size tiles; each frame the GPU decides which lights touch which tile
//! and publishes a compact per-tile light index list for the shading pass.
//!
//! # Modules
//!
//! - [`render`] - Stages, GPU records, CPU reference culler and readback tools
//! - [`error`] - Error type of the fallible entry points
//!
//! # Example
//!
//! ```ignore
//! use forward_plus_engine::{FormatSupport, ForwardPlus, ForwardPlusConfig, FrameInputs, KernelSet};
//!
//! let mut forward_plus = ForwardPlus::new(
//!     &device,
//!     &queue,
//!     ForwardPlusConfig::default(),
//!     &KernelSet::embedded(),
//!     &FormatSupport::query(&adapter),
//!     surface_format,
//! )?;
//!
//! let mut encoder = device.create_command_encoder(&Default::default());
//! let report = forward_plus.render_frame(&device, &queue, &mut encoder, &FrameInputs {
//!     projection,
//!     view,
//!     target_size: (1920, 1080),
//!     render_scale: 1.0,
//!     depth_attachment: &depth_view,
//!     color_target: Some(&color_view),
//!     lights: &lights,
//!     opaque: &scene_meshes,
//! });
//! // Bind forward_plus.outputs() in the shading pass, then submit.
//! queue.submit([encoder.finish()]);
//! drop(report);
//! ```

pub mod error;
pub mod render;

pub use error::{ForwardPlusError, Result};
// Re-export the render module contents at crate level for convenience
pub use render::*;
