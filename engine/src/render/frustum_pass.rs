//! Frustum Builder
//!
//! Dispatches precompute_frustums.wgsl to write one `TileFrustum` per screen
//! tile into a storage buffer. The buffer is sized by tile count and only
//! reallocated when the grid dimensions change. The kernel runs when the
//! buffer is new, the grid or inverse projection changed, or the host asked
//! for per-frame revalidation; otherwise last frame's frustums are reused.

use super::compute_pipelines::{ComputeKernel, frustum_slots};
use super::forward_plus::StageStatus;
use super::frustum::{FRUSTUM_UNIFORMS_SIZE, FrustumUniforms, TileFrustum};
use super::gpu_resource::ResizableResource;
use super::tile_grid::TileGrid;

/// Bytes of one `TileFrustum` in the storage buffer.
pub const TILE_FRUSTUM_STRIDE: u64 = std::mem::size_of::<TileFrustum>() as u64;

/// Inputs the current frustum buffer was built from.
#[derive(Clone, Copy, Debug, PartialEq)]
struct BuiltFor {
    grid: TileGrid,
    inverse_projection: [[f32; 4]; 4],
}

/// Owner of the per-tile frustum buffer.
pub struct FrustumBuilder {
    frustums: ResizableResource<(u32, u32), wgpu::Buffer>,
    uniform_buffer: wgpu::Buffer,
    built_for: Option<BuiltFor>,
    warned_missing_kernel: bool,
}

impl FrustumBuilder {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frustum_uniforms_buffer"),
            size: FRUSTUM_UNIFORMS_SIZE as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            frustums: ResizableResource::new("FrustumBuffer"),
            uniform_buffer,
            built_for: None,
            warned_missing_kernel: false,
        }
    }

    /// Record the frustum dispatch for this frame if anything requires it.
    ///
    /// Without a kernel the stage is a no-op and `frustum_buffer()` stays
    /// `None`, so the culler skips as well.
    pub fn build(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        kernel: Option<&ComputeKernel>,
        inverse_projection: [[f32; 4]; 4],
        grid: &TileGrid,
        revalidate: bool,
    ) -> StageStatus {
        let Some(kernel) = kernel else {
            if !self.warned_missing_kernel {
                log::warn!("[FrustumBuilder] no frustum kernel, stage skipped");
                self.warned_missing_kernel = true;
            }
            return StageStatus::Skipped("frustum kernel missing");
        };

        let reallocated = self.frustums.reallocate_if(grid.dimensions(), |&(tiles_x, tiles_y)| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("tile_frustum_buffer"),
                size: (tiles_x * tiles_y) as u64 * TILE_FRUSTUM_STRIDE,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        });
        if reallocated {
            self.built_for = None;
        }

        let requested = BuiltFor {
            grid: *grid,
            inverse_projection,
        };
        if !revalidate && self.built_for == Some(requested) {
            return StageStatus::Reused;
        }

        let Some(frustum_buffer) = self.frustums.get() else {
            return StageStatus::Skipped("frustum buffer unavailable");
        };

        let uniforms = FrustumUniforms::new(inverse_projection, grid);
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frustum_bind_group"),
            layout: &kernel.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: frustum_slots::UNIFORMS,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: frustum_slots::FRUSTUMS,
                    resource: frustum_buffer.as_entire_binding(),
                },
            ],
        });

        // 16x16 tiles per workgroup, one invocation per tile.
        let (wg_x, wg_y) = grid.frustum_workgroups();
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("precompute_frustums_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(wg_x, wg_y, 1);
        }

        log::debug!(
            "[FrustumBuilder] dispatched {}x{} workgroups for {}x{} tiles",
            wg_x,
            wg_y,
            grid.tiles_x,
            grid.tiles_y
        );
        self.built_for = Some(requested);
        StageStatus::Ran
    }

    /// The frustum buffer, once it has been built for the current grid.
    pub fn frustum_buffer(&self) -> Option<&wgpu::Buffer> {
        self.built_for.and(self.frustums.get())
    }

    /// Number of buffer allocations so far.
    pub fn generation(&self) -> u32 {
        self.frustums.generation()
    }

    /// Force the next `build` to dispatch.
    pub fn invalidate(&mut self) {
        self.built_for = None;
    }

    pub fn release(&mut self) {
        self.frustums.release();
        self.built_for = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frustum_stride_matches_kernel() {
        assert_eq!(TILE_FRUSTUM_STRIDE, 64);
    }

    #[test]
    fn test_built_for_detects_projection_change() {
        let grid = TileGrid::new(640, 480, 16);
        let a = BuiltFor {
            grid,
            inverse_projection: glam::Mat4::IDENTITY.to_cols_array_2d(),
        };
        let mut b = a;
        b.inverse_projection[3][2] = 2.0;
        assert_ne!(a, b);
        assert_eq!(a, BuiltFor { grid, ..a });
    }
}
