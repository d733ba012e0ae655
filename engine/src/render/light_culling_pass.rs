//! Tile Light Culler
//!
//! Per frame: fills the fixed-capacity light table from the host's visible
//! lights, uploads it, resets the overflow counters and dispatches
//! light_culling.wgsl with one workgroup per tile. Outputs are the light grid
//! (Rg32Uint, one texel per tile: segment offset, count), the flat light index
//! list and the light data buffer, plus the main light globals.
//!
//! ## Buffer lifetimes
//!
//! - Light data, main light and counters: fixed size, created once.
//! - Light index list and light grid: sized by tile count, reallocated
//!   together (old released first) whenever the grid dimensions change.

use glam::Mat4;

use super::compute_pipelines::{
    CULLING_COUNTERS_SIZE, CULLING_UNIFORMS_SIZE, ComputeKernel, LIGHT_GRID_FORMAT, culling_slots,
};
use super::forward_plus::StageStatus;
use super::forward_plus_config::{FalloffMode, ForwardPlusConfig};
use super::gpu_resource::ResizableResource;
use super::light_data::{LightTable, MainLightGlobals, VisibleLight};
use super::tile_grid::TileGrid;

/// GPU-side uniforms matching `CullingUniforms` in light_culling.wgsl.
///
/// Layout (160 bytes):
/// - inverse_projection: mat4x4<f32> (64 bytes, column-major)
/// - world_to_view: mat4x4<f32>      (64 bytes, column-major)
/// - screen_size_ratio: vec2<f32>    (8 bytes)
/// - tile_counts: vec2<u32>          (8 bytes)
/// - light_count: u32                (4 bytes)
/// - max_lights_per_tile: u32        (4 bytes)
/// - tile_size_px: u32               (4 bytes)
/// - _pad0: u32                      (4 bytes)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CullingUniforms {
    pub inverse_projection: [[f32; 4]; 4],
    pub world_to_view: [[f32; 4]; 4],
    pub screen_size_ratio: [f32; 2],
    pub tile_counts: [u32; 2],
    pub light_count: u32,
    pub max_lights_per_tile: u32,
    pub tile_size_px: u32,
    pub _pad0: u32,
}

const _: () = assert!(std::mem::size_of::<CullingUniforms>() == CULLING_UNIFORMS_SIZE as usize);

/// Overflow counters matching `CullingCounters` in light_culling.wgsl.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CullingCounters {
    /// Indices written into tile segments this frame.
    pub appended: u32,
    /// Tile matches dropped because a segment was full.
    pub dropped: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

const _: () = assert!(std::mem::size_of::<CullingCounters>() == CULLING_COUNTERS_SIZE as usize);

/// What one `execute` call did, handed to diagnostic consumers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CullingFrameStats {
    pub status: StageStatus,
    /// Light slots populated this frame.
    pub active_lights: u32,
    /// Lights beyond `max_lights` that were not uploaded.
    pub dropped_lights: u32,
    pub has_main_light: bool,
    pub tile_count: u32,
    /// Whether the index list and grid were reallocated by the last `setup`.
    pub reallocated: bool,
}

/// Shading-facing outputs of the culler.
pub struct CullingOutputs<'a> {
    pub light_grid: &'a wgpu::Texture,
    pub light_grid_view: &'a wgpu::TextureView,
    pub light_index_list: &'a wgpu::Buffer,
    pub light_data: &'a wgpu::Buffer,
    pub main_light: &'a wgpu::Buffer,
    pub counters: &'a wgpu::Buffer,
    pub grid: TileGrid,
    pub max_lights_per_tile: u32,
}

/// Light grid texture plus its view; the view is rebuilt with the texture.
pub struct LightGridTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl super::gpu_resource::Releasable for LightGridTexture {
    fn release(&mut self) {
        self.texture.destroy();
    }
}

struct CullingSetup {
    grid: TileGrid,
    inverse_projection: [[f32; 4]; 4],
    reallocated: bool,
}

pub struct TileLightCuller {
    table: LightTable,
    falloff: FalloffMode,
    max_lights_per_tile: u32,
    light_buffer: wgpu::Buffer,
    main_light_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    counters_buffer: wgpu::Buffer,
    light_index_list: ResizableResource<(u32, u32), wgpu::Buffer>,
    light_grid: ResizableResource<(u32, u32), LightGridTexture>,
    setup: Option<CullingSetup>,
    warned_overflow: bool,
}

impl TileLightCuller {
    pub fn new(device: &wgpu::Device, config: &ForwardPlusConfig) -> Self {
        let table = LightTable::new(config.max_lights);

        let light_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("light_data_buffer"),
            size: table.buffer_size(),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let main_light_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("main_light_globals"),
            size: std::mem::size_of::<MainLightGlobals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("culling_uniforms_buffer"),
            size: CULLING_UNIFORMS_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let counters_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("culling_counters_buffer"),
            size: CULLING_COUNTERS_SIZE,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        log::info!(
            "[TileLightCuller] {} light slots ({} bytes), {} lights per tile",
            table.capacity(),
            table.buffer_size(),
            config.max_lights_per_tile
        );

        Self {
            table,
            falloff: config.falloff,
            max_lights_per_tile: config.max_lights_per_tile,
            light_buffer,
            main_light_buffer,
            uniform_buffer,
            counters_buffer,
            light_index_list: ResizableResource::new("LightIndexList"),
            light_grid: ResizableResource::new("LightGrid"),
            setup: None,
            warned_overflow: false,
        }
    }

    /// Size the grid-dependent outputs for `grid` and record the projection.
    ///
    /// Returns `true` when the index list and grid texture were reallocated.
    pub fn setup(&mut self, device: &wgpu::Device, inverse_projection: [[f32; 4]; 4], grid: &TileGrid) -> bool {
        let key = grid.dimensions();
        let per_tile = self.max_lights_per_tile;

        let list_reallocated = self.light_index_list.reallocate_if(key, |&(tiles_x, tiles_y)| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("light_index_list"),
                size: (tiles_x * tiles_y * per_tile) as u64 * std::mem::size_of::<u32>() as u64,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        });
        // Both outputs share one trigger; reallocate the grid whenever the list was.
        let grid_reallocated = self.light_grid.reallocate_when(
            key,
            |current, requested| list_reallocated || current != Some(requested),
            |&(tiles_x, tiles_y)| {
                let texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("light_grid"),
                    size: wgpu::Extent3d {
                        width: tiles_x,
                        height: tiles_y,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: LIGHT_GRID_FORMAT,
                    usage: wgpu::TextureUsages::STORAGE_BINDING
                        | wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                });
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                LightGridTexture { texture, view }
            },
        );

        let reallocated = list_reallocated || grid_reallocated;
        self.setup = Some(CullingSetup {
            grid: *grid,
            inverse_projection,
            reallocated,
        });
        reallocated
    }

    /// Upload this frame's lights and record the culling dispatch.
    ///
    /// The dispatch is skipped, never faulted, when the kernel, the frustum
    /// buffer, the captured depth or `setup` is missing. Light data and main
    /// light globals are uploaded either way.
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        kernel: Option<&ComputeKernel>,
        frustums: Option<&wgpu::Buffer>,
        lights: &[VisibleLight],
        world_to_view: Mat4,
        depth: Option<&wgpu::TextureView>,
    ) -> CullingFrameStats {
        let population = self.table.populate(lights, self.falloff);
        queue.write_buffer(&self.light_buffer, 0, bytemuck::cast_slice(self.table.records()));
        queue.write_buffer(&self.main_light_buffer, 0, bytemuck::bytes_of(&population.main_light));

        if population.dropped > 0 && !self.warned_overflow {
            log::warn!(
                "[TileLightCuller] {} lights exceed capacity {}, truncated",
                population.dropped,
                self.table.capacity()
            );
            self.warned_overflow = true;
        }

        let mut stats = CullingFrameStats {
            status: StageStatus::Ran,
            active_lights: population.active,
            dropped_lights: population.dropped,
            has_main_light: population.has_main_light,
            tile_count: self.setup.as_ref().map_or(0, |s| s.grid.tile_count()),
            reallocated: self.setup.as_ref().is_some_and(|s| s.reallocated),
        };

        let (Some(kernel), Some(frustums), Some(depth), Some(setup)) = (kernel, frustums, depth, self.setup.as_ref())
        else {
            stats.status = StageStatus::Skipped("culling inputs unavailable");
            log::debug!("[TileLightCuller] skipped: {:?}", stats.status);
            return stats;
        };
        let (Some(index_list), Some(light_grid)) = (self.light_index_list.get(), self.light_grid.get()) else {
            stats.status = StageStatus::Skipped("culling outputs unallocated");
            return stats;
        };

        let grid = setup.grid;
        let uniforms = CullingUniforms {
            inverse_projection: setup.inverse_projection,
            world_to_view: world_to_view.to_cols_array_2d(),
            screen_size_ratio: grid.screen_size_ratio(),
            tile_counts: [grid.tiles_x, grid.tiles_y],
            light_count: self.table.active_count(),
            max_lights_per_tile: self.max_lights_per_tile,
            tile_size_px: grid.tile_size_px,
            _pad0: 0,
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        // Reset the append counters and segments before the kernel claims slots.
        encoder.clear_buffer(&self.counters_buffer, 0, None);
        encoder.clear_buffer(index_list, 0, None);

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("light_culling_bind_group"),
            layout: &kernel.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: culling_slots::UNIFORMS,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: culling_slots::FRUSTUMS,
                    resource: frustums.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: culling_slots::LIGHTS,
                    resource: self.light_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: culling_slots::DEPTH,
                    resource: wgpu::BindingResource::TextureView(depth),
                },
                wgpu::BindGroupEntry {
                    binding: culling_slots::LIGHT_INDEX_LIST,
                    resource: index_list.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: culling_slots::LIGHT_GRID,
                    resource: wgpu::BindingResource::TextureView(&light_grid.view),
                },
                wgpu::BindGroupEntry {
                    binding: culling_slots::COUNTERS,
                    resource: self.counters_buffer.as_entire_binding(),
                },
            ],
        });

        // One 16x16 workgroup per tile.
        let (wg_x, wg_y) = grid.culling_workgroups();
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("light_culling_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(wg_x, wg_y, 1);
        }

        log::debug!(
            "[TileLightCuller] culled {} lights over {}x{} tiles",
            population.active,
            grid.tiles_x,
            grid.tiles_y
        );
        stats
    }

    /// The buffers shading reads. `None` until `setup` has allocated them.
    pub fn outputs(&self) -> Option<CullingOutputs<'_>> {
        let setup = self.setup.as_ref()?;
        let light_grid = self.light_grid.get()?;
        Some(CullingOutputs {
            light_grid: &light_grid.texture,
            light_grid_view: &light_grid.view,
            light_index_list: self.light_index_list.get()?,
            light_data: &self.light_buffer,
            main_light: &self.main_light_buffer,
            counters: &self.counters_buffer,
            grid: setup.grid,
            max_lights_per_tile: self.max_lights_per_tile,
        })
    }

    pub fn light_table(&self) -> &LightTable {
        &self.table
    }

    pub fn max_lights_per_tile(&self) -> u32 {
        self.max_lights_per_tile
    }

    /// Number of index list allocations so far.
    pub fn generation(&self) -> u32 {
        self.light_index_list.generation()
    }

    /// Release the grid-sized outputs. The fixed buffers are freed on drop.
    pub fn release(&mut self) {
        self.light_index_list.release();
        self.light_grid.release();
        self.setup = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_field_offsets() {
        assert_eq!(std::mem::offset_of!(CullingUniforms, world_to_view), 64);
        assert_eq!(std::mem::offset_of!(CullingUniforms, screen_size_ratio), 128);
        assert_eq!(std::mem::offset_of!(CullingUniforms, tile_counts), 136);
        assert_eq!(std::mem::offset_of!(CullingUniforms, light_count), 144);
        assert_eq!(std::mem::offset_of!(CullingUniforms, tile_size_px), 152);
    }

    #[test]
    fn test_counters_default_zero() {
        let counters = CullingCounters::default();
        assert_eq!(bytemuck::bytes_of(&counters), &[0u8; 16]);
    }
}
