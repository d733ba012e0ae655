//! Tile Frustum Structures
//!
//! GPU records for the per-tile view-space frustums written by
//! `precompute_frustums.wgsl`, plus a CPU builder that performs the same f32
//! math so tests and the CPU culler can reason about exactly what the kernel
//! produces.
//!
//! ## Memory Layout
//!
//! Plane: 16 bytes (normal: vec3<f32>, distance: f32)
//! TileFrustum: 4 planes = 64 bytes, ordered left, up, right, down
//!
//! ## Plane construction
//!
//! Every plane contains the eye (view-space origin) and one tile edge. The
//! tile's four corners are unprojected through the inverse projection at a
//! mid-range NDC depth, so the construction also holds for infinite and
//! reversed-Z projections. Normals point into the tile volume: a point `p` is
//! inside a plane when `dot(normal, p) + distance >= 0`.

use glam::{Mat4, Vec2, Vec3, Vec4};

use super::tile_grid::TileGrid;

/// NDC depth at which tile corners are unprojected. Any depth strictly inside
/// the projection's range yields the same planes since they pass through the eye.
pub const CORNER_NDC_DEPTH: f32 = 0.5;

/// A half-space: `dot(normal, p) + distance >= 0` is inside.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Plane {
    /// Unit normal pointing into the frustum.
    pub normal: [f32; 3],
    /// Signed offset of the plane along `normal`.
    pub distance: f32,
}

const _: () = assert!(std::mem::size_of::<Plane>() == 16);

impl Plane {
    /// Plane through `origin`, `a` and `b`, normal = normalize((a - origin) × (b - origin)).
    pub fn from_points(origin: Vec3, a: Vec3, b: Vec3) -> Self {
        let normal = (a - origin).cross(b - origin).normalize();
        Self {
            normal: normal.to_array(),
            distance: -normal.dot(origin),
        }
    }

    /// Signed distance of `point` from the plane (positive inside).
    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        Vec3::from_array(self.normal).dot(point) + self.distance
    }

    /// Flip the plane so that `inside_point` lies on its positive side.
    pub fn oriented_towards(self, inside_point: Vec3) -> Self {
        if self.signed_distance(inside_point) < 0.0 {
            Self {
                normal: (-Vec3::from_array(self.normal)).to_array(),
                distance: -self.distance,
            }
        } else {
            self
        }
    }

    /// Sphere test used by the culling kernel: rejected only when the sphere
    /// lies entirely on the negative side.
    #[inline]
    pub fn sphere_inside(&self, center: Vec3, radius: f32) -> bool {
        self.signed_distance(center) >= -radius
    }
}

/// The four side planes of one tile's view-space frustum.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TileFrustum {
    /// Planes in kernel order: left, up, right, down.
    pub planes: [Plane; 4],
}

const _: () = assert!(std::mem::size_of::<TileFrustum>() == 64);

impl TileFrustum {
    /// Index of the left plane.
    pub const LEFT: usize = 0;
    /// Index of the up plane.
    pub const UP: usize = 1;
    /// Index of the right plane.
    pub const RIGHT: usize = 2;
    /// Index of the down plane.
    pub const DOWN: usize = 3;

    /// Whether a view-space sphere touches all four side planes.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes.iter().all(|plane| plane.sphere_inside(center, radius))
    }
}

/// GPU-side uniforms matching `FrustumUniforms` in precompute_frustums.wgsl.
///
/// Layout (96 bytes):
/// - inverse_projection: mat4x4<f32> (64 bytes, column-major)
/// - screen_size_ratio: vec2<f32>    (8 bytes)
/// - tile_counts: vec2<u32>          (8 bytes)
/// - tile_size_px: u32               (4 bytes)
/// - _pad: 3 × u32                   (12 bytes)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrustumUniforms {
    pub inverse_projection: [[f32; 4]; 4],
    pub screen_size_ratio: [f32; 2],
    pub tile_counts: [u32; 2],
    pub tile_size_px: u32,
    pub _pad0: u32,
    pub _pad1: u32,
    pub _pad2: u32,
}

pub const FRUSTUM_UNIFORMS_SIZE: usize = 96;
static_assertions::assert_eq_size!(FrustumUniforms, [u8; FRUSTUM_UNIFORMS_SIZE]);

impl FrustumUniforms {
    pub fn new(inverse_projection: [[f32; 4]; 4], grid: &TileGrid) -> Self {
        Self {
            inverse_projection,
            screen_size_ratio: grid.screen_size_ratio(),
            tile_counts: [grid.tiles_x, grid.tiles_y],
            tile_size_px: grid.tile_size_px,
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
        }
    }
}

/// Unproject a screen position (pixels, origin top-left) into view space.
pub fn screen_to_view(inverse_projection: &Mat4, screen: Vec2, screen_size_ratio: Vec2, ndc_depth: f32) -> Vec3 {
    let uv = screen * screen_size_ratio;
    let clip = Vec4::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, ndc_depth, 1.0);
    let view = *inverse_projection * clip;
    view.truncate() / view.w
}

/// Build the frustum of tile `(x, y)` exactly as the frustum kernel does.
pub fn build_tile_frustum(inverse_projection: &Mat4, grid: &TileGrid, x: u32, y: u32) -> TileFrustum {
    let ratio = Vec2::from_array(grid.screen_size_ratio());
    let size = grid.tile_size_px as f32;
    let x0 = x as f32 * size;
    let y0 = y as f32 * size;
    let x1 = x0 + size;
    let y1 = y0 + size;

    let top_left = screen_to_view(inverse_projection, Vec2::new(x0, y0), ratio, CORNER_NDC_DEPTH);
    let top_right = screen_to_view(inverse_projection, Vec2::new(x1, y0), ratio, CORNER_NDC_DEPTH);
    let bottom_left = screen_to_view(inverse_projection, Vec2::new(x0, y1), ratio, CORNER_NDC_DEPTH);
    let bottom_right = screen_to_view(inverse_projection, Vec2::new(x1, y1), ratio, CORNER_NDC_DEPTH);
    let center = (top_left + top_right + bottom_left + bottom_right) * 0.25;

    let eye = Vec3::ZERO;
    TileFrustum {
        planes: [
            Plane::from_points(eye, bottom_left, top_left).oriented_towards(center),
            Plane::from_points(eye, top_left, top_right).oriented_towards(center),
            Plane::from_points(eye, top_right, bottom_right).oriented_towards(center),
            Plane::from_points(eye, bottom_right, bottom_left).oriented_towards(center),
        ],
    }
}

/// Build all tile frustums, indexed `y * tiles_x + x`.
pub fn build_tile_frustums(inverse_projection: &Mat4, grid: &TileGrid) -> Vec<TileFrustum> {
    let mut frustums = Vec::with_capacity(grid.tile_count() as usize);
    for y in 0..grid.tiles_y {
        for x in 0..grid.tiles_x {
            frustums.push(build_tile_frustum(inverse_projection, grid, x, y));
        }
    }
    frustums
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_projection() -> Mat4 {
        Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0)
    }

    #[test]
    fn test_plane_orientation_flip() {
        let plane = Plane { normal: [1.0, 0.0, 0.0], distance: 0.0 };
        let flipped = plane.oriented_towards(Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(flipped.normal, [-1.0, 0.0, 0.0]);
        assert!(flipped.signed_distance(Vec3::new(-2.0, 0.0, 0.0)) > 0.0);
    }

    #[test]
    fn test_sphere_straddling_plane_is_kept() {
        let plane = Plane { normal: [1.0, 0.0, 0.0], distance: 0.0 };
        assert!(plane.sphere_inside(Vec3::new(-0.5, 0.0, 0.0), 1.0));
        assert!(!plane.sphere_inside(Vec3::new(-1.5, 0.0, 0.0), 1.0));
    }

    #[test]
    fn test_planes_pass_through_eye() {
        let inv = test_projection().inverse();
        let grid = TileGrid::new(64, 64, 16);
        for frustum in build_tile_frustums(&inv, &grid) {
            for plane in frustum.planes {
                assert!(plane.distance.abs() < 1e-6);
                let n = Vec3::from_array(plane.normal);
                assert!((n.length() - 1.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_tile_center_ray_is_inside() {
        let inv = test_projection().inverse();
        let grid = TileGrid::new(64, 64, 16);
        let frustum = build_tile_frustum(&inv, &grid, 1, 2);
        let ratio = Vec2::from_array(grid.screen_size_ratio());
        let center = screen_to_view(&inv, Vec2::new(24.0, 40.0), ratio, 0.9);
        assert!(frustum.planes.iter().all(|p| p.signed_distance(center) > 0.0));
    }

    #[test]
    fn test_neighbour_tile_center_is_outside() {
        let inv = test_projection().inverse();
        let grid = TileGrid::new(64, 64, 16);
        let frustum = build_tile_frustum(&inv, &grid, 1, 1);
        let ratio = Vec2::from_array(grid.screen_size_ratio());
        // Center of tile (2, 1) lies to the right of tile (1, 1).
        let right_neighbour = screen_to_view(&inv, Vec2::new(40.0, 24.0), ratio, 0.9);
        assert!(frustum.planes[TileFrustum::RIGHT].signed_distance(right_neighbour) < 0.0);
        assert!(frustum.planes[TileFrustum::LEFT].signed_distance(right_neighbour) > 0.0);
    }

    #[test]
    fn test_top_row_faces_up() {
        // Tile row 0 is the top of the screen, i.e. +Y in view space.
        let inv = test_projection().inverse();
        let grid = TileGrid::new(64, 64, 16);
        let ratio = Vec2::from_array(grid.screen_size_ratio());
        let top_pixel = screen_to_view(&inv, Vec2::new(32.0, 0.0), ratio, 0.9);
        assert!(top_pixel.y > 0.0);
        assert!(top_pixel.z < 0.0);
    }

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<FrustumUniforms>(), 96);
        let grid = TileGrid::new(1920, 1080, 16);
        let uniforms = FrustumUniforms::new(Mat4::IDENTITY.to_cols_array_2d(), &grid);
        assert_eq!(uniforms.tile_counts, [120, 68]);
        assert_eq!(uniforms.tile_size_px, 16);
    }
}
