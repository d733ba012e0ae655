//! Render Module
//!
//! Forward+ tile light culling on wgpu: per-tile frustum precompute, depth
//! prepass and capture, GPU light culling into a per-tile light index list,
//! and an optional heatmap overlay of the resulting light grid.

pub mod binding_validator;
pub mod compute_pipelines;
pub mod depth_capture;
pub mod forward_plus;
pub mod forward_plus_config;
pub mod frustum;
pub mod frustum_pass;
pub mod gpu_context;
pub mod gpu_resource;
pub mod light_culling_cpu;
pub mod light_culling_pass;
pub mod light_data;
pub mod light_grid_debug;
pub mod readback;
pub mod shader_loader;
pub mod tile_grid;

// Re-export commonly used types for convenience
pub use compute_pipelines::{ComputeKernel, ComputePipelines, LIGHT_GRID_FORMAT, CAPTURED_DEPTH_FORMAT};
pub use depth_capture::{
    CapturedDepth, DepthCapture, DepthDrawSource, DepthInstance, DepthMesh, DepthPrepass, PREPASS_DEPTH_FORMAT,
    create_depth_attachment,
};
pub use forward_plus::{ForwardPlus, FrameGeometry, FrameInputs, FrameReport, StageStatus};
pub use forward_plus_config::{FalloffMode, ForwardPlusConfig, LightGridDebugConfig};
pub use frustum::{Plane, TileFrustum, build_tile_frustum, build_tile_frustums};
pub use frustum_pass::FrustumBuilder;
pub use gpu_context::{FormatSupport, GpuContext, GpuContextConfig};
pub use gpu_resource::{FrameLease, FramePool, Releasable, ResizableResource};
pub use light_culling_cpu::{CpuCullingInputs, CpuLightGrid, cull_lights_cpu};
pub use light_culling_pass::{CullingCounters, CullingFrameStats, CullingOutputs, TileLightCuller};
pub use light_data::{LightRecord, LightTable, MainLightGlobals, VisibleLight, compute_attenuation};
pub use light_grid_debug::{HeatmapLut, LightGridVisualizer};
pub use shader_loader::{KernelSet, ShaderSource, create_shader_module, load_shader_file};
pub use tile_grid::{TileGrid, effective_resolution};
