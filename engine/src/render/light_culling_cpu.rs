//! CPU-Side Light Culling Reference
//!
//! Runs the same per-tile test as light_culling.wgsl on the CPU: tile depth
//! range from the captured depth, sphere against the four side planes and the
//! near/far slab, append into the tile's fixed-capacity segment. Lights are
//! visited in slot order, so each segment holds the first
//! `max_lights_per_tile` matches. The GPU appends in arbitrary order, so
//! comparisons against it must be per-tile sets.

use glam::{Mat4, Vec3, Vec4};

use super::frustum::TileFrustum;
use super::light_data::LightRecord;
use super::tile_grid::TileGrid;

/// Depth used for a tile with no samples (far plane of a standard projection).
pub const EMPTY_TILE_DEPTH: f32 = 1.0;

/// Everything the culling kernel reads, in CPU form.
pub struct CpuCullingInputs<'a> {
    pub grid: TileGrid,
    pub inverse_projection: Mat4,
    pub world_to_view: Mat4,
    /// One per tile, indexed `y * tiles_x + x`.
    pub frustums: &'a [TileFrustum],
    /// All slots; only the first `light_count` are visited.
    pub lights: &'a [LightRecord],
    pub light_count: u32,
    /// Captured depth, row-major, `screen_width * screen_height` samples.
    pub depth: &'a [f32],
    pub max_lights_per_tile: u32,
}

/// Result of a CPU culling pass, laid out like the GPU outputs.
#[derive(Clone, Debug, PartialEq)]
pub struct CpuLightGrid {
    pub grid: TileGrid,
    pub max_lights_per_tile: u32,
    /// `[segment offset, count]` per tile.
    pub cells: Vec<[u32; 2]>,
    /// `tile_count * max_lights_per_tile` slots; unused slots are 0.
    pub light_index_list: Vec<u32>,
    /// Matches dropped because a segment was full.
    pub dropped: u32,
}

impl CpuLightGrid {
    /// Light slots assigned to tile `(x, y)`.
    pub fn tile_lights(&self, x: u32, y: u32) -> &[u32] {
        let [offset, count] = self.cells[self.grid.tile_index(x, y) as usize];
        &self.light_index_list[offset as usize..(offset + count) as usize]
    }

    pub fn count(&self, x: u32, y: u32) -> u32 {
        self.cells[self.grid.tile_index(x, y) as usize][1]
    }

    /// Total indices written across all tiles.
    pub fn appended(&self) -> u32 {
        self.cells.iter().map(|c| c[1]).sum()
    }
}

/// View-space Z of an NDC depth sample at the screen center.
pub fn depth_to_view_z(inverse_projection: &Mat4, depth: f32) -> f32 {
    let view = *inverse_projection * Vec4::new(0.0, 0.0, depth, 1.0);
    view.z / view.w
}

/// `(min, max)` depth over the tile's pixels, clamped to [0, 1].
pub fn tile_depth_range(depth: &[f32], grid: &TileGrid, x: u32, y: u32) -> (f32, f32) {
    let [x0, y0, x1, y1] = grid.tile_pixel_rect(x, y);
    let mut min_depth = f32::MAX;
    let mut max_depth = 0.0f32;
    for py in y0..y1 {
        for px in x0..x1 {
            let Some(&sample) = depth.get((py * grid.screen_width + px) as usize) else {
                continue;
            };
            let sample = sample.clamp(0.0, 1.0);
            min_depth = min_depth.min(sample);
            max_depth = max_depth.max(sample);
        }
    }
    if min_depth > max_depth {
        (EMPTY_TILE_DEPTH, EMPTY_TILE_DEPTH)
    } else {
        (min_depth, max_depth)
    }
}

/// Sphere against the tile's side planes and its `[z_far, z_near]` slab.
pub fn sphere_in_tile(frustum: &TileFrustum, center: Vec3, radius: f32, z_near: f32, z_far: f32) -> bool {
    if !frustum.intersects_sphere(center, radius) {
        return false;
    }
    // View space looks down -Z.
    !(center.z - radius > z_near || center.z + radius < z_far)
}

/// Cull every light against every tile.
pub fn cull_lights_cpu(inputs: &CpuCullingInputs<'_>) -> CpuLightGrid {
    let grid = inputs.grid;
    let per_tile = inputs.max_lights_per_tile;
    let tile_count = grid.tile_count() as usize;

    let mut result = CpuLightGrid {
        grid,
        max_lights_per_tile: per_tile,
        cells: vec![[0, 0]; tile_count],
        light_index_list: vec![0; tile_count * per_tile as usize],
        dropped: 0,
    };

    // View-space spheres, computed once.
    let light_count = (inputs.light_count as usize).min(inputs.lights.len());
    let spheres: Vec<Option<(Vec3, f32)>> = inputs.lights[..light_count]
        .iter()
        .map(|light| {
            light.is_enabled().then(|| {
                let center = inputs.world_to_view.transform_point3(Vec3::from_array(light.world_position));
                (center, light.range)
            })
        })
        .collect();

    for y in 0..grid.tiles_y {
        for x in 0..grid.tiles_x {
            let tile = grid.tile_index(x, y) as usize;
            let Some(frustum) = inputs.frustums.get(tile) else {
                continue;
            };

            let (min_depth, max_depth) = tile_depth_range(inputs.depth, &grid, x, y);
            let z_a = depth_to_view_z(&inputs.inverse_projection, min_depth);
            let z_b = depth_to_view_z(&inputs.inverse_projection, max_depth);
            let (z_near, z_far) = (z_a.max(z_b), z_a.min(z_b));

            let segment_start = tile as u32 * per_tile;
            let mut count = 0u32;
            for (slot, sphere) in spheres.iter().enumerate() {
                let Some((center, radius)) = *sphere else {
                    continue;
                };
                if !sphere_in_tile(frustum, center, radius, z_near, z_far) {
                    continue;
                }
                if count < per_tile {
                    result.light_index_list[(segment_start + count) as usize] = slot as u32;
                    count += 1;
                } else {
                    result.dropped += 1;
                }
            }
            result.cells[tile] = [segment_start, count];
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::frustum::build_tile_frustums;

    #[test]
    fn test_empty_tile_uses_far_depth() {
        let grid = TileGrid::new(32, 16, 16);
        assert_eq!(tile_depth_range(&[], &grid, 1, 0), (EMPTY_TILE_DEPTH, EMPTY_TILE_DEPTH));
    }

    #[test]
    fn test_tile_depth_range_per_tile() {
        let grid = TileGrid::new(32, 16, 16);
        let mut depth = vec![0.9f32; 32 * 16];
        depth[5 * 32 + 20] = 0.3;
        depth[6 * 32 + 3] = 1.7;
        assert_eq!(tile_depth_range(&depth, &grid, 1, 0), (0.3, 0.9));
        assert_eq!(tile_depth_range(&depth, &grid, 0, 0), (0.9, 1.0));
    }

    #[test]
    fn test_slab_rejects_light_behind_surface() {
        let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let inverse = projection.inverse();
        let grid = TileGrid::new(16, 16, 16);
        let frustums = build_tile_frustums(&inverse, &grid);

        let surface_depth = projection.project_point3(Vec3::new(0.0, 0.0, -5.0)).z;
        let depth = vec![surface_depth; 256];

        let near = LightRecord::from_visible(
            &crate::render::light_data::VisibleLight::point(Vec3::new(0.0, 0.0, -5.5), Vec3::ONE, 1.0),
            crate::render::forward_plus_config::FalloffMode::HardCutoff,
        );
        let behind = LightRecord {
            world_position: [0.0, 0.0, -20.0],
            ..near
        };
        let lights = [near, behind];
        let result = cull_lights_cpu(&CpuCullingInputs {
            grid,
            inverse_projection: inverse,
            world_to_view: Mat4::IDENTITY,
            frustums: &frustums,
            lights: &lights,
            light_count: 2,
            depth: &depth,
            max_lights_per_tile: 8,
        });
        assert_eq!(result.tile_lights(0, 0), &[0]);
    }

    #[test]
    fn test_segment_capacity_drops_excess() {
        let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let inverse = projection.inverse();
        let grid = TileGrid::new(16, 16, 16);
        let frustums = build_tile_frustums(&inverse, &grid);
        let depth = vec![projection.project_point3(Vec3::new(0.0, 0.0, -5.0)).z; 256];

        let light = LightRecord {
            world_position: [0.0, 0.0, -5.0],
            enabled: 1.0,
            color: [1.0; 3],
            range: 2.0,
            attenuation: [0.0, 1.0, 0.0, 1.0],
        };
        let lights = vec![light; 5];
        let result = cull_lights_cpu(&CpuCullingInputs {
            grid,
            inverse_projection: inverse,
            world_to_view: Mat4::IDENTITY,
            frustums: &frustums,
            lights: &lights,
            light_count: 5,
            depth: &depth,
            max_lights_per_tile: 3,
        });
        assert_eq!(result.tile_lights(0, 0), &[0, 1, 2]);
        assert_eq!(result.dropped, 2);
        assert_eq!(result.appended(), 3);
    }

    #[test]
    fn test_disabled_slots_are_ignored() {
        let grid = TileGrid::new(16, 16, 16);
        let inverse = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0).inverse();
        let frustums = build_tile_frustums(&inverse, &grid);
        let lights = [LightRecord::cleared(); 4];
        let result = cull_lights_cpu(&CpuCullingInputs {
            grid,
            inverse_projection: inverse,
            world_to_view: Mat4::IDENTITY,
            frustums: &frustums,
            lights: &lights,
            light_count: 4,
            depth: &[0.5; 256],
            max_lights_per_tile: 4,
        });
        assert_eq!(result.appended(), 0);
    }
}
