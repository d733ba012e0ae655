//! Light Records for Tile Culling
//!
//! Converts the host's visible-light list into the fixed-capacity
//! `LightRecord` array uploaded every frame, and extracts the primary
//! directional light, which is never tile-culled and is published through
//! `MainLightGlobals` instead.

use glam::Vec3;

use super::forward_plus_config::{ATTENUATION_EPSILON, FADE_START_FRACTION, FalloffMode};

/// Attenuation written into cleared slots.
pub const DEFAULT_ATTENUATION: [f32; 4] = [0.0, 1.0, 0.0, 1.0];

/// One light as seen by the host this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisibleLight {
    /// World-space position (ignored for the main light).
    pub position: Vec3,
    /// World-space direction the light travels (main light only).
    pub direction: Vec3,
    /// Final linear color (intensity already applied).
    pub color: Vec3,
    /// Influence radius in world units.
    pub range: f32,
    /// Marks the primary directional light.
    pub is_main: bool,
}

impl VisibleLight {
    /// A point light at `position`.
    pub fn point(position: Vec3, color: Vec3, range: f32) -> Self {
        Self {
            position,
            direction: Vec3::ZERO,
            color,
            range,
            is_main: false,
        }
    }

    /// The primary directional light.
    pub fn main_directional(direction: Vec3, color: Vec3) -> Self {
        Self {
            position: Vec3::ZERO,
            direction,
            color,
            range: 0.0,
            is_main: true,
        }
    }
}

/// GPU-side light record matching `LightRecord` in light_culling.wgsl.
///
/// Layout (48 bytes, 3 rows of 16 bytes):
///   Row 0: world_position (vec3<f32>), enabled (f32)
///   Row 1: color (vec3<f32>), range (f32)
///   Row 2: attenuation (vec4<f32>), only x and y are used
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightRecord {
    pub world_position: [f32; 3],
    /// 1.0 for an active slot, 0.0 for a cleared one.
    pub enabled: f32,
    pub color: [f32; 3],
    pub range: f32,
    pub attenuation: [f32; 4],
}

pub const LIGHT_RECORD_SIZE: usize = 48;
static_assertions::assert_eq_size!(LightRecord, [u8; LIGHT_RECORD_SIZE]);

impl LightRecord {
    /// An unused slot.
    pub const fn cleared() -> Self {
        Self {
            world_position: [0.0; 3],
            enabled: 0.0,
            color: [0.0; 3],
            range: 0.0,
            attenuation: DEFAULT_ATTENUATION,
        }
    }

    /// Record for an active light.
    pub fn from_visible(light: &VisibleLight, falloff: FalloffMode) -> Self {
        Self {
            world_position: light.position.to_array(),
            enabled: 1.0,
            color: light.color.to_array(),
            range: light.range,
            attenuation: compute_attenuation(light.range, falloff),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled != 0.0
    }
}

/// Attenuation coefficients for a light range.
///
/// `fadeStart = 0.64 * range²`, `fadeRange = fadeStart - range²`,
/// `x = 1 / fadeRange` (smooth) or `1 / max(range², ε)` (hard cutoff),
/// `y = -range² / fadeRange`. `z` and `w` keep their default values.
pub fn compute_attenuation(range: f32, falloff: FalloffMode) -> [f32; 4] {
    let range_sqr = range * range;
    let fade_start_sqr = FADE_START_FRACTION * FADE_START_FRACTION * range_sqr;
    let mut fade_range_sqr = fade_start_sqr - range_sqr;
    // fadeRange is always <= 0; keep the sign while bounding the magnitude.
    if fade_range_sqr > -ATTENUATION_EPSILON {
        fade_range_sqr = -ATTENUATION_EPSILON;
    }

    let x = match falloff {
        FalloffMode::Smooth => 1.0 / fade_range_sqr,
        FalloffMode::HardCutoff => 1.0 / range_sqr.max(ATTENUATION_EPSILON),
    };
    let y = -range_sqr / fade_range_sqr;

    [x, y, DEFAULT_ATTENUATION[2], DEFAULT_ATTENUATION[3]]
}

/// Main directional light globals for shading (32 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MainLightGlobals {
    /// Linear color in xyz; w unused.
    pub color: [f32; 4],
    /// Normalized direction in xyz; w = 0.
    pub direction: [f32; 4],
}

static_assertions::assert_eq_size!(MainLightGlobals, [u8; 32]);

impl MainLightGlobals {
    pub fn from_light(light: &VisibleLight) -> Self {
        Self {
            color: light.color.extend(1.0).to_array(),
            direction: light.direction.normalize_or_zero().extend(0.0).to_array(),
        }
    }
}

/// Outcome of one `LightTable::populate` call.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LightPopulation {
    /// Slots written this frame.
    pub active: u32,
    /// Non-main lights that did not fit.
    pub dropped: u32,
    /// Globals of the primary light, or zeroed when the scene has none.
    pub main_light: MainLightGlobals,
    /// Whether a primary light was present.
    pub has_main_light: bool,
}

/// Fixed-capacity slot array mirrored into the GPU light buffer.
pub struct LightTable {
    records: Vec<LightRecord>,
    active_count: u32,
}

impl LightTable {
    /// A table of `capacity` cleared slots.
    pub fn new(capacity: u32) -> Self {
        Self {
            records: vec![LightRecord::cleared(); capacity as usize],
            active_count: 0,
        }
    }

    /// Fill slots from this frame's visible lights.
    ///
    /// The first light flagged `is_main` becomes the main light; every other
    /// light takes the next slot until capacity is reached. Slots that were
    /// active last frame but not this one are cleared.
    pub fn populate(&mut self, lights: &[VisibleLight], falloff: FalloffMode) -> LightPopulation {
        let capacity = self.records.len();
        let mut population = LightPopulation::default();
        let mut slot = 0usize;

        for light in lights {
            if light.is_main && !population.has_main_light {
                population.main_light = MainLightGlobals::from_light(light);
                population.has_main_light = true;
                continue;
            }
            if slot >= capacity {
                population.dropped += 1;
                continue;
            }
            self.records[slot] = LightRecord::from_visible(light, falloff);
            slot += 1;
        }

        let previous = self.active_count as usize;
        if previous > slot {
            for record in &mut self.records[slot..previous] {
                *record = LightRecord::cleared();
            }
        }

        self.active_count = slot as u32;
        population.active = self.active_count;
        population
    }

    /// All slots, active ones first.
    pub fn records(&self) -> &[LightRecord] {
        &self.records
    }

    pub fn active_count(&self) -> u32 {
        self.active_count
    }

    pub fn capacity(&self) -> u32 {
        self.records.len() as u32
    }

    /// Size of the GPU light buffer in bytes.
    pub fn buffer_size(&self) -> u64 {
        (self.records.len() * LIGHT_RECORD_SIZE) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() <= 1e-4 * b.abs().max(1.0)
    }

    #[test]
    fn test_attenuation_range_10() {
        let smooth = compute_attenuation(10.0, FalloffMode::Smooth);
        assert!(approx(smooth[0], 1.0 / -36.0));
        assert!(approx(smooth[1], 100.0 / 36.0));

        let hard = compute_attenuation(10.0, FalloffMode::HardCutoff);
        assert!(approx(hard[0], 1.0 / 100.0));
        assert!(approx(hard[1], 100.0 / 36.0));
        assert_eq!(&hard[2..], &[0.0, 1.0]);
    }

    #[test]
    fn test_attenuation_zero_range_is_finite() {
        for mode in [FalloffMode::Smooth, FalloffMode::HardCutoff] {
            let att = compute_attenuation(0.0, mode);
            assert!(att.iter().all(|v| v.is_finite()), "{mode:?}: {att:?}");
        }
    }

    #[test]
    fn test_main_light_excluded_from_slots() {
        let mut table = LightTable::new(4);
        let lights = [
            VisibleLight::point(Vec3::ONE, Vec3::ONE, 2.0),
            VisibleLight::main_directional(Vec3::new(0.0, -2.0, 0.0), Vec3::new(1.0, 0.9, 0.8)),
            VisibleLight::point(Vec3::ZERO, Vec3::ONE, 3.0),
        ];
        let population = table.populate(&lights, FalloffMode::HardCutoff);
        assert_eq!(population.active, 2);
        assert!(population.has_main_light);
        assert_eq!(population.main_light.direction, [0.0, -1.0, 0.0, 0.0]);
        assert_eq!(table.records()[1].range, 3.0);
        assert!(!table.records()[2].is_enabled());
    }

    #[test]
    fn test_shrinking_light_count_clears_trailing_slots() {
        let mut table = LightTable::new(8);
        let many: Vec<_> = (0..5)
            .map(|i| VisibleLight::point(Vec3::splat(i as f32), Vec3::ONE, 1.0))
            .collect();
        table.populate(&many, FalloffMode::HardCutoff);
        assert!(table.records()[4].is_enabled());

        table.populate(&many[..2], FalloffMode::HardCutoff);
        assert_eq!(table.active_count(), 2);
        for record in &table.records()[2..] {
            assert_eq!(*record, LightRecord::cleared());
        }
    }

    #[test]
    fn test_overflow_is_truncated_and_counted() {
        let mut table = LightTable::new(256);
        let lights: Vec<_> = (0..300)
            .map(|i| VisibleLight::point(Vec3::new(i as f32, 0.0, 0.0), Vec3::ONE, 1.0))
            .collect();
        let population = table.populate(&lights, FalloffMode::HardCutoff);
        assert_eq!(population.active, 256);
        assert_eq!(population.dropped, 44);
        assert_eq!(table.records().len(), 256);
        assert_eq!(table.records()[255].world_position, [255.0, 0.0, 0.0]);
    }

    #[test]
    fn test_buffer_size() {
        assert_eq!(LightTable::new(256).buffer_size(), 256 * 48);
    }
}
