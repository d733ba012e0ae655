//! Forward+ Configuration Module
//!
//! Constants and runtime configuration for tile light culling. The constants
//! mirror the WGSL kernels; the `ForwardPlusConfig` struct is the configuration
//! surface exposed to the host (tile size, light capacities, falloff policy,
//! diagnostic heatmap) and can be loaded from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ForwardPlusError, Result};

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE_PX: u32 = 16;

/// Workgroup edge used by both compute kernels (must match `@workgroup_size(16, 16, 1)`).
pub const KERNEL_WORKGROUP_EDGE: u32 = 16;

/// Default capacity of the light record buffer.
pub const DEFAULT_MAX_LIGHTS: u32 = 256;

/// Default capacity of one tile's light index segment.
pub const DEFAULT_MAX_LIGHTS_PER_TILE: u32 = 64;

/// Upper bound accepted for `max_lights`.
pub const MAX_LIGHTS_LIMIT: u32 = 1024;

/// Upper bound accepted for `max_lights_per_tile`.
pub const MAX_LIGHTS_PER_TILE_LIMIT: u32 = 256;

/// Fraction of the range at which the smooth falloff starts (0.8² of range²).
pub const FADE_START_FRACTION: f32 = 0.8;

/// Minimum denominator used in attenuation math.
pub const ATTENUATION_EPSILON: f32 = 0.0001;

/// How light attenuation coefficient `x` is derived from the light range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FalloffMode {
    /// `x = 1 / fadeRange`: soft fade between 80% and 100% of range.
    Smooth,
    /// `x = 1 / max(range², ε)`: hard cutoff at range.
    #[default]
    HardCutoff,
}

/// Settings for the light grid heatmap overlay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightGridDebugConfig {
    /// Whether the overlay pass is created at all.
    pub enabled: bool,
    /// Blend ratio of the overlay over the color target (0 disables drawing).
    pub blend_ratio: f32,
    /// Tint applied to tile borders (RGBA, linear).
    pub grid_color: [f32; 4],
    /// Optional PNG/JPEG heatmap lookup table. `None` uses the built-in gradient.
    pub heatmap_path: Option<String>,
}

impl Default for LightGridDebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            blend_ratio: 0.0,
            grid_color: [1.0, 1.0, 1.0, 1.0],
            heatmap_path: None,
        }
    }
}

/// Runtime configuration of the Forward+ culling engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardPlusConfig {
    /// Tile edge length in pixels.
    pub tile_size_px: u32,
    /// Capacity of the light record buffer; extra lights are dropped.
    pub max_lights: u32,
    /// Capacity of each tile's index segment; extra matches are dropped.
    pub max_lights_per_tile: u32,
    /// Attenuation policy for `LightRecord::attenuation.x`.
    pub falloff: FalloffMode,
    /// Re-run the frustum kernel every frame (editor-style hosts that resize
    /// without notice).
    pub revalidate_every_frame: bool,
    /// Heatmap overlay settings.
    pub debug: LightGridDebugConfig,
}

impl Default for ForwardPlusConfig {
    fn default() -> Self {
        Self {
            tile_size_px: DEFAULT_TILE_SIZE_PX,
            max_lights: DEFAULT_MAX_LIGHTS,
            max_lights_per_tile: DEFAULT_MAX_LIGHTS_PER_TILE,
            falloff: FalloffMode::default(),
            revalidate_every_frame: false,
            debug: LightGridDebugConfig::default(),
        }
    }
}

impl ForwardPlusConfig {
    /// Parse a config from JSON text and validate it. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check every field against the limits the kernels are built for.
    pub fn validate(&self) -> Result<()> {
        if self.tile_size_px == 0 || self.tile_size_px > KERNEL_WORKGROUP_EDGE {
            return Err(ForwardPlusError::InvalidConfig(format!(
                "tile_size_px must be in 1..={}, got {}",
                KERNEL_WORKGROUP_EDGE, self.tile_size_px
            )));
        }
        if self.max_lights == 0 || self.max_lights > MAX_LIGHTS_LIMIT {
            return Err(ForwardPlusError::InvalidConfig(format!(
                "max_lights must be in 1..={}, got {}",
                MAX_LIGHTS_LIMIT, self.max_lights
            )));
        }
        if self.max_lights_per_tile == 0 || self.max_lights_per_tile > MAX_LIGHTS_PER_TILE_LIMIT {
            return Err(ForwardPlusError::InvalidConfig(format!(
                "max_lights_per_tile must be in 1..={}, got {}",
                MAX_LIGHTS_PER_TILE_LIMIT, self.max_lights_per_tile
            )));
        }
        if !(0.0..=1.0).contains(&self.debug.blend_ratio) {
            return Err(ForwardPlusError::InvalidConfig(format!(
                "debug.blend_ratio must be in [0, 1], got {}",
                self.debug.blend_ratio
            )));
        }
        Ok(())
    }

    /// Whether the heatmap overlay should be drawn this frame.
    pub fn debug_overlay_active(&self) -> bool {
        self.debug.enabled && self.debug.blend_ratio > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_capacities() {
        let config = ForwardPlusConfig::default();
        assert_eq!(config.tile_size_px, 16);
        assert_eq!(config.max_lights, 256);
        assert_eq!(config.max_lights_per_tile, 64);
        assert_eq!(config.falloff, FalloffMode::HardCutoff);
        assert!(!config.debug_overlay_active());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = ForwardPlusConfig::from_json_str(
            r#"{ "falloff": "smooth", "debug": { "enabled": true, "blend_ratio": 0.5 } }"#,
        )
        .unwrap();
        assert_eq!(config.falloff, FalloffMode::Smooth);
        assert_eq!(config.max_lights, DEFAULT_MAX_LIGHTS);
        assert!(config.debug_overlay_active());
        assert_eq!(config.debug.grid_color, [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_rejects_oversized_tile() {
        let err = ForwardPlusConfig::from_json_str(r#"{ "tile_size_px": 32 }"#).unwrap_err();
        assert!(matches!(err, ForwardPlusError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let config = ForwardPlusConfig {
            max_lights_per_tile: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_blend_ratio_out_of_range() {
        let mut config = ForwardPlusConfig::default();
        config.debug.blend_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        let err = ForwardPlusConfig::from_json_str("{ tile_size_px: }").unwrap_err();
        assert!(matches!(err, ForwardPlusError::Json(_)));
    }
}
