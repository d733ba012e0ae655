//! Config Tests - File Loading and Heatmap Lookup Tables
//!
//! Covers the on-disk paths of the configuration surface: JSON files, a
//! heatmap image referenced by the config, and the errors each one reports.

use std::path::PathBuf;

use forward_plus_engine::{FalloffMode, ForwardPlusConfig, ForwardPlusError, HeatmapLut, LightGridDebugConfig};

/// A scratch file path unique to this test process.
fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("forward_plus_{}_{name}", std::process::id()))
}

#[test]
fn test_load_config_file() {
    let path = scratch_path("config.json");
    std::fs::write(
        &path,
        r#"{
            "tile_size_px": 8,
            "max_lights": 512,
            "max_lights_per_tile": 32,
            "falloff": "smooth",
            "revalidate_every_frame": true
        }"#,
    )
    .unwrap();

    let config = ForwardPlusConfig::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(config.tile_size_px, 8);
    assert_eq!(config.max_lights, 512);
    assert_eq!(config.max_lights_per_tile, 32);
    assert_eq!(config.falloff, FalloffMode::Smooth);
    assert!(config.revalidate_every_frame);
    assert_eq!(config.debug, LightGridDebugConfig::default());
}

#[test]
fn test_missing_config_file_is_io_error() {
    let err = ForwardPlusConfig::load(scratch_path("does_not_exist.json")).unwrap_err();
    assert!(matches!(err, ForwardPlusError::Io(_)));
}

#[test]
fn test_out_of_range_values_are_rejected() {
    for json in [
        r#"{ "tile_size_px": 0 }"#,
        r#"{ "max_lights": 2048 }"#,
        r#"{ "max_lights_per_tile": 257 }"#,
        r#"{ "debug": { "blend_ratio": -0.1 } }"#,
    ] {
        let err = ForwardPlusConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, ForwardPlusError::InvalidConfig(_)), "{json}");
    }
}

#[test]
fn test_config_serializes_back_to_equal_value() {
    let mut config = ForwardPlusConfig::default();
    config.debug.enabled = true;
    config.debug.blend_ratio = 0.25;
    config.debug.heatmap_path = Some("heatmap.png".to_string());

    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(ForwardPlusConfig::from_json_str(&json).unwrap(), config);
}

#[test]
fn test_error_display_names_the_field() {
    let err = ForwardPlusConfig::from_json_str(r#"{ "tile_size_px": 64 }"#).unwrap_err();
    assert!(err.to_string().contains("tile_size_px"));
}

// ============================================================================
// Heatmap lookup tables
// ============================================================================

#[test]
fn test_heatmap_loaded_from_config_path() {
    let path = scratch_path("heatmap.png");
    let strip = image::RgbaImage::from_fn(4, 1, |x, _| image::Rgba([x as u8 * 80, 0, 0, 255]));
    strip.save(&path).unwrap();

    let config = LightGridDebugConfig {
        enabled: true,
        blend_ratio: 0.5,
        heatmap_path: Some(path.to_string_lossy().into_owned()),
        ..Default::default()
    };
    let lut = HeatmapLut::from_config(&config).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!((lut.width, lut.height), (4, 1));
    assert_eq!(lut.sample(1.0), [240, 0, 0, 255]);
}
