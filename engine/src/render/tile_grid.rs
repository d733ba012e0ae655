//! Tile Grid
//!
//! Derives the screen tile partition from the effective (render-scale adjusted)
//! resolution. The grid is never stored by the GPU stages: every buffer sized
//! by tile count compares its own dimensions against a freshly derived
//! `TileGrid` each frame.
//!
//! ## Indexing
//!
//! Tile `(x, y)` has linear index `y * tiles_x + x`. Row 0 is the top of the
//! screen, matching texture/pixel coordinates of the captured depth texture.

use super::forward_plus_config::KERNEL_WORKGROUP_EDGE;

/// Screen partition into fixed-size tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileGrid {
    /// Effective screen width in pixels (>= 1).
    pub screen_width: u32,
    /// Effective screen height in pixels (>= 1).
    pub screen_height: u32,
    /// Tile edge length in pixels.
    pub tile_size_px: u32,
    /// Number of tile columns: `ceil(screen_width / tile_size_px)`.
    pub tiles_x: u32,
    /// Number of tile rows: `ceil(screen_height / tile_size_px)`.
    pub tiles_y: u32,
}

impl TileGrid {
    /// Build a grid for an effective resolution in pixels.
    ///
    /// Zero-sized resolutions are clamped to 1×1 so every derived buffer has
    /// at least one tile.
    pub fn new(screen_width: u32, screen_height: u32, tile_size_px: u32) -> Self {
        let screen_width = screen_width.max(1);
        let screen_height = screen_height.max(1);
        let tile_size_px = tile_size_px.max(1);
        Self {
            screen_width,
            screen_height,
            tile_size_px,
            tiles_x: screen_width.div_ceil(tile_size_px),
            tiles_y: screen_height.div_ceil(tile_size_px),
        }
    }

    /// Build a grid from the host target size and its render scale.
    ///
    /// The effective resolution is `target / render_scale`, truncated to whole
    /// pixels. A non-positive or non-finite render scale is treated as 1.0.
    pub fn from_target(target_width: u32, target_height: u32, render_scale: f32, tile_size_px: u32) -> Self {
        let (width, height) = effective_resolution(target_width, target_height, render_scale);
        Self::new(width, height, tile_size_px)
    }

    /// Tile grid dimensions `(tiles_x, tiles_y)`.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.tiles_x, self.tiles_y)
    }

    /// Total number of tiles.
    #[inline]
    pub fn tile_count(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }

    /// Linear index of tile `(x, y)`.
    #[inline]
    pub fn tile_index(&self, x: u32, y: u32) -> u32 {
        y * self.tiles_x + x
    }

    /// Tile coordinates of a linear index.
    #[inline]
    pub fn tile_coords(&self, index: u32) -> (u32, u32) {
        (index % self.tiles_x, index / self.tiles_x)
    }

    /// Tile containing pixel `(px, py)` of the effective resolution.
    #[inline]
    pub fn tile_of_pixel(&self, px: u32, py: u32) -> (u32, u32) {
        (
            (px / self.tile_size_px).min(self.tiles_x - 1),
            (py / self.tile_size_px).min(self.tiles_y - 1),
        )
    }

    /// `(1 / screen_width, 1 / screen_height)`, uploaded to both kernels.
    #[inline]
    pub fn screen_size_ratio(&self) -> [f32; 2] {
        [1.0 / self.screen_width as f32, 1.0 / self.screen_height as f32]
    }

    /// Workgroup counts for the frustum kernel (16×16 tiles per workgroup).
    #[inline]
    pub fn frustum_workgroups(&self) -> (u32, u32) {
        (
            self.tiles_x.div_ceil(KERNEL_WORKGROUP_EDGE),
            self.tiles_y.div_ceil(KERNEL_WORKGROUP_EDGE),
        )
    }

    /// Workgroup counts for the culling kernel (one workgroup per tile).
    #[inline]
    pub fn culling_workgroups(&self) -> (u32, u32) {
        (self.tiles_x, self.tiles_y)
    }

    /// Pixel rectangle `[x0, y0, x1, y1)` covered by a tile, clipped to the screen.
    pub fn tile_pixel_rect(&self, x: u32, y: u32) -> [u32; 4] {
        let x0 = x * self.tile_size_px;
        let y0 = y * self.tile_size_px;
        [
            x0,
            y0,
            (x0 + self.tile_size_px).min(self.screen_width),
            (y0 + self.tile_size_px).min(self.screen_height),
        ]
    }
}

/// Effective resolution for a target size and render scale.
pub fn effective_resolution(target_width: u32, target_height: u32, render_scale: f32) -> (u32, u32) {
    let scale = if render_scale.is_finite() && render_scale > 0.0 {
        render_scale
    } else {
        1.0
    };
    let width = (target_width as f32 / scale) as u32;
    let height = (target_height as f32 / scale) as u32;
    (width.max(1), height.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_1080p_grid() {
        let grid = TileGrid::new(1920, 1080, 16);
        assert_eq!(grid.dimensions(), (120, 68));
        assert_eq!(grid.tile_count(), 8160);
    }

    #[test]
    fn test_partial_tiles_round_up() {
        let grid = TileGrid::new(17, 33, 16);
        assert_eq!(grid.dimensions(), (2, 3));
        assert_eq!(grid.tile_pixel_rect(1, 2), [16, 32, 17, 33]);
    }

    #[test]
    fn test_render_scale_changes_grid() {
        let full = TileGrid::from_target(1920, 1080, 1.0, 16);
        let half = TileGrid::from_target(1920, 1080, 2.0, 16);
        assert_eq!(half.screen_width, 960);
        assert_eq!(half.screen_height, 540);
        assert_eq!(half.dimensions(), (60, 34));
        assert_ne!(full.dimensions(), half.dimensions());
    }

    #[test]
    fn test_invalid_render_scale_is_identity() {
        assert_eq!(effective_resolution(800, 600, 0.0), (800, 600));
        assert_eq!(effective_resolution(800, 600, f32::NAN), (800, 600));
    }

    #[test]
    fn test_zero_resolution_clamps_to_one_tile() {
        let grid = TileGrid::new(0, 0, 16);
        assert_eq!(grid.dimensions(), (1, 1));
    }

    #[test]
    fn test_index_round_trip() {
        let grid = TileGrid::new(1280, 720, 16);
        for index in [0, 1, 79, 80, 3599] {
            let (x, y) = grid.tile_coords(index);
            assert_eq!(grid.tile_index(x, y), index);
        }
        assert_eq!(grid.tile_coords(80), (0, 1));
    }

    #[test]
    fn test_workgroup_counts() {
        let grid = TileGrid::new(1920, 1080, 16);
        assert_eq!(grid.frustum_workgroups(), (8, 5));
        assert_eq!(grid.culling_workgroups(), (120, 68));
    }

    #[test]
    fn test_screen_size_ratio() {
        let grid = TileGrid::new(800, 400, 16);
        assert_eq!(grid.screen_size_ratio(), [1.0 / 800.0, 1.0 / 400.0]);
    }
}
