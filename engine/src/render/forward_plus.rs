//! Forward+ Orchestrator
//!
//! Owns every stage and runs them once per frame in a fixed order on one
//! command encoder:
//!
//! 1. Frustum Builder (compute, only when the grid or projection changed)
//! 2. Depth Prepass (render, always)
//! 3. Depth Capture (render, into a per-frame R32Float lease)
//! 4. Tile Light Culler (compute)
//! 5. Light Grid Visualizer (render, optional)
//!
//! Each stage reads only what earlier stages recorded on the same encoder,
//! so submission order is the only synchronization. A stage whose input is
//! missing, or whose texture format the adapter does not allow, reports
//! `StageStatus::Skipped` and every dependent stage skips too.
//!
//! The captured depth texture is leased to the returned `FrameReport`. Keep
//! the report alive until the encoder has been submitted; dropping it hands
//! the texture back to the pool for the next frame.

use glam::Mat4;

use super::binding_validator::validate_render_bindings;
use super::compute_pipelines::ComputePipelines;
use super::depth_capture::{
    CapturedDepth, DepthCapture, DepthDrawSource, DepthPrepass, depth_copy_layout_entries, prepass_layout_entries,
};
use super::forward_plus_config::ForwardPlusConfig;
use super::frustum_pass::FrustumBuilder;
use super::gpu_context::FormatSupport;
use super::light_culling_pass::{CullingFrameStats, CullingOutputs, TileLightCuller};
use super::light_data::VisibleLight;
use super::light_grid_debug::{HeatmapLut, LightGridVisualizer, light_grid_debug_layout_entries};
use super::shader_loader::KernelSet;
use super::tile_grid::TileGrid;
use crate::error::Result;

/// Outcome of one stage for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageStatus {
    /// Work was recorded this frame.
    Ran,
    /// Outputs from an earlier frame are still valid; nothing recorded.
    Reused,
    /// A required kernel or input was missing; outputs are unavailable.
    Skipped(&'static str),
}

impl StageStatus {
    /// Whether downstream stages may consume this stage's outputs.
    pub fn produced_output(&self) -> bool {
        !matches!(self, StageStatus::Skipped(_))
    }
}

/// Shared per-frame geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameGeometry {
    /// Inverse projection, column-major as WGSL `mat4x4<f32>` expects.
    pub inverse_projection: [[f32; 4]; 4],
    pub grid: TileGrid,
}

impl FrameGeometry {
    pub fn new(projection: Mat4, target_size: (u32, u32), render_scale: f32, tile_size_px: u32) -> Self {
        Self {
            inverse_projection: projection.inverse().to_cols_array_2d(),
            grid: TileGrid::from_target(target_size.0, target_size.1, render_scale, tile_size_px),
        }
    }
}

/// What the host hands in each frame.
pub struct FrameInputs<'a> {
    pub projection: Mat4,
    /// World to view (camera) matrix.
    pub view: Mat4,
    /// Size of the host's color and depth targets.
    pub target_size: (u32, u32),
    pub render_scale: f32,
    /// Depth32Float attachment at `target_size`, rendered by the prepass.
    pub depth_attachment: &'a wgpu::TextureView,
    /// Color target for the optional overlay.
    pub color_target: Option<&'a wgpu::TextureView>,
    pub lights: &'a [VisibleLight],
    pub opaque: &'a dyn DepthDrawSource,
}

/// Per-frame results handed to diagnostic consumers.
#[derive(Debug)]
pub struct FrameReport {
    pub geometry: FrameGeometry,
    pub frustums: StageStatus,
    pub depth_capture: StageStatus,
    pub culling: CullingFrameStats,
    pub visualizer: StageStatus,
    /// This frame's captured depth, referenced by the recorded commands.
    /// Returned to the pool when dropped, so drop it only after submit.
    pub captured_depth: Option<CapturedDepth>,
}

pub struct ForwardPlus {
    config: ForwardPlusConfig,
    pipelines: ComputePipelines,
    frustum_builder: FrustumBuilder,
    prepass: DepthPrepass,
    depth_capture: DepthCapture,
    culler: TileLightCuller,
    visualizer: Option<LightGridVisualizer>,
    frame_index: u64,
}

impl ForwardPlus {
    /// Build every stage. `formats` comes from `FormatSupport::query` on the
    /// device's adapter; `color_format` is the format of the overlay target.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        config: ForwardPlusConfig,
        kernels: &KernelSet,
        formats: &FormatSupport,
        color_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        config.validate()?;

        let render_mismatches = validate_render_bindings(
            &prepass_layout_entries(),
            &depth_copy_layout_entries(),
            &light_grid_debug_layout_entries(),
        );
        if render_mismatches > 0 {
            log::warn!("[ForwardPlus] {} render binding mismatch(es) detected!", render_mismatches);
        }

        let pipelines = ComputePipelines::new(device, kernels, formats);
        let frustum_builder = FrustumBuilder::new(device);
        let prepass = DepthPrepass::new(device, &kernels.depth_prepass);
        let depth_capture = DepthCapture::new(
            device,
            kernels.depth_copy.as_ref(),
            formats.captured_depth_renderable,
        );
        let culler = TileLightCuller::new(device, &config);

        let visualizer = match (&kernels.light_grid_debug, config.debug.enabled) {
            (Some(source), true) => {
                let lut = HeatmapLut::from_config(&config.debug)?;
                Some(LightGridVisualizer::new(device, queue, source, color_format, &config.debug, &lut))
            }
            _ => None,
        };

        log::info!(
            "[ForwardPlus] tile {}px, {} lights, {} per tile, falloff {:?}",
            config.tile_size_px,
            config.max_lights,
            config.max_lights_per_tile,
            config.falloff
        );

        Ok(Self {
            config,
            pipelines,
            frustum_builder,
            prepass,
            depth_capture,
            culler,
            visualizer,
            frame_index: 0,
        })
    }

    /// Record one frame into `encoder`.
    pub fn render_frame(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        inputs: &FrameInputs<'_>,
    ) -> FrameReport {
        let geometry = FrameGeometry::new(
            inputs.projection,
            inputs.target_size,
            inputs.render_scale,
            self.config.tile_size_px,
        );
        let grid = geometry.grid;

        // 1. Frustums
        let frustums = self.frustum_builder.build(
            device,
            queue,
            encoder,
            self.pipelines.frustum.as_ref(),
            geometry.inverse_projection,
            &grid,
            self.config.revalidate_every_frame,
        );

        // 2. Depth prepass
        self.prepass.execute(
            queue,
            encoder,
            inputs.depth_attachment,
            inputs.projection * inputs.view,
            inputs.opaque,
        );

        // 3. Depth capture, leased to the returned report
        self.depth_capture
            .configure(inputs.target_size.0, inputs.target_size.1, inputs.render_scale);
        let captured = self.depth_capture.acquire(device);
        let depth_capture = match &captured {
            Some(target) => self.depth_capture.execute(
                device,
                queue,
                encoder,
                inputs.depth_attachment,
                inputs.target_size,
                target,
            ),
            None => StageStatus::Skipped("depth copy unavailable"),
        };

        // 4. Culling. Grid-sized outputs exist only for a usable kernel.
        if self.pipelines.culling.is_some() {
            self.culler.setup(device, geometry.inverse_projection, &grid);
        }
        let depth_view = captured
            .as_ref()
            .filter(|_| depth_capture.produced_output())
            .map(|target| &target.view);
        let culling = self.culler.execute(
            device,
            queue,
            encoder,
            self.pipelines.culling.as_ref(),
            self.frustum_builder.frustum_buffer(),
            inputs.lights,
            inputs.view,
            depth_view,
        );

        // 5. Overlay
        let visualizer = match (&self.visualizer, inputs.color_target, self.culler.outputs()) {
            (Some(visualizer), Some(color_target), Some(outputs)) if culling.status.produced_output() => {
                visualizer.execute(device, queue, encoder, color_target, inputs.target_size, &outputs)
            }
            _ => StageStatus::Skipped("overlay unavailable"),
        };

        log::debug!(
            "[ForwardPlus] frame {}: {}x{} tiles, {} lights, culling {:?}",
            self.frame_index,
            grid.tiles_x,
            grid.tiles_y,
            culling.active_lights,
            culling.status
        );
        self.frame_index += 1;

        FrameReport {
            geometry,
            frustums,
            depth_capture,
            culling,
            visualizer,
            captured_depth: captured,
        }
    }

    /// The culler's outputs for shading. Only valid after a frame whose
    /// `culling.status` produced output.
    pub fn outputs(&self) -> Option<CullingOutputs<'_>> {
        self.culler.outputs()
    }

    pub fn frustum_buffer(&self) -> Option<&wgpu::Buffer> {
        self.frustum_builder.frustum_buffer()
    }

    pub fn config(&self) -> &ForwardPlusConfig {
        &self.config
    }

    pub fn visualizer_mut(&mut self) -> Option<&mut LightGridVisualizer> {
        self.visualizer.as_mut()
    }

    /// Frustum and index list allocation counts, for resize diagnostics.
    pub fn allocation_generations(&self) -> (u32, u32) {
        (self.frustum_builder.generation(), self.culler.generation())
    }

    /// Release every size-dependent GPU resource. The next frame reallocates.
    pub fn release(&mut self) {
        self.frustum_builder.release();
        self.culler.release();
        self.depth_capture.release();
        log::info!("[ForwardPlus] released GPU resources");
    }
}

impl Drop for ForwardPlus {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_uses_effective_resolution() {
        let projection = Mat4::perspective_rh(1.0, 16.0 / 9.0, 0.1, 100.0);
        let geometry = FrameGeometry::new(projection, (1920, 1080), 2.0, 16);
        assert_eq!(geometry.grid.dimensions(), (60, 34));
        assert_eq!(geometry.grid.screen_size_ratio(), [1.0 / 960.0, 1.0 / 540.0]);
    }

    #[test]
    fn test_inverse_projection_is_column_major() {
        let projection = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let geometry = FrameGeometry::new(projection, (64, 64), 1.0, 16);
        let inverse = projection.inverse();
        // Column 3 of the inverse holds the translation-like terms.
        assert_eq!(geometry.inverse_projection[3], inverse.col(3).to_array());
        assert_eq!(Mat4::from_cols_array_2d(&geometry.inverse_projection), inverse);
    }

    #[test]
    fn test_skipped_status_blocks_consumers() {
        assert!(StageStatus::Ran.produced_output());
        assert!(StageStatus::Reused.produced_output());
        assert!(!StageStatus::Skipped("missing").produced_output());
    }
}
