//! Shader Binding Validator
//!
//! Validates that all bind group layouts match their expected shader bindings
//! at startup. Catches mismatches between Rust-side layouts and WGSL
//! declarations before they surface as GPU validation errors mid-frame.
//!
//! The expected bindings here are the canonical mirror of the WGSL
//! declarations. The actual entries used during pipeline creation are passed
//! in for comparison.

use std::fmt;

use super::compute_pipelines::{LIGHT_GRID_FORMAT, culling_slots, frustum_slots};

/// Describes a single expected binding in a bind group layout.
#[derive(Debug, Clone)]
struct ExpectedBinding {
    binding: u32,
    binding_type: ExpectedBindingType,
    label: &'static str,
}

/// The type of a binding, matching the wgpu::BindingType variants we use.
#[derive(Debug, Clone, PartialEq)]
enum ExpectedBindingType {
    UniformBuffer,
    StorageBufferReadOnly,
    StorageBufferReadWrite,
    /// `texture_2d<f32>`
    FloatTexture,
    /// `texture_2d<u32>`
    UintTexture,
    /// `texture_depth_2d`
    DepthTexture,
    /// `texture_storage_2d<format, write>`
    StorageTextureWrite(wgpu::TextureFormat),
    Sampler,
    Unsupported,
}

impl fmt::Display for ExpectedBindingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UniformBuffer => write!(f, "uniform buffer"),
            Self::StorageBufferReadOnly => write!(f, "storage buffer (read-only)"),
            Self::StorageBufferReadWrite => write!(f, "storage buffer (read-write)"),
            Self::FloatTexture => write!(f, "float texture 2d"),
            Self::UintTexture => write!(f, "uint texture 2d"),
            Self::DepthTexture => write!(f, "depth texture 2d"),
            Self::StorageTextureWrite(format) => write!(f, "write-only storage texture ({format:?})"),
            Self::Sampler => write!(f, "sampler"),
            Self::Unsupported => write!(f, "unsupported binding"),
        }
    }
}

/// Describes the expected layout for one bind group of a pipeline.
struct ExpectedBindGroup {
    pipeline_name: &'static str,
    group_index: u32,
    bindings: Vec<ExpectedBinding>,
}

/// Classifies a wgpu::BindGroupLayoutEntry into our ExpectedBindingType.
fn classify_entry(entry: &wgpu::BindGroupLayoutEntry) -> ExpectedBindingType {
    match &entry.ty {
        wgpu::BindingType::Buffer { ty, .. } => match ty {
            wgpu::BufferBindingType::Uniform => ExpectedBindingType::UniformBuffer,
            wgpu::BufferBindingType::Storage { read_only: true } => ExpectedBindingType::StorageBufferReadOnly,
            wgpu::BufferBindingType::Storage { read_only: false } => ExpectedBindingType::StorageBufferReadWrite,
        },
        wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            ..
        } => match sample_type {
            wgpu::TextureSampleType::Float { .. } => ExpectedBindingType::FloatTexture,
            wgpu::TextureSampleType::Uint => ExpectedBindingType::UintTexture,
            wgpu::TextureSampleType::Depth => ExpectedBindingType::DepthTexture,
            wgpu::TextureSampleType::Sint => ExpectedBindingType::Unsupported,
        },
        wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension: wgpu::TextureViewDimension::D2,
        } => ExpectedBindingType::StorageTextureWrite(*format),
        wgpu::BindingType::Sampler(_) => ExpectedBindingType::Sampler,
        _ => ExpectedBindingType::Unsupported,
    }
}

/// Validates actual bind group layout entries against expected bindings.
/// Returns the number of mismatches found.
fn validate_bind_group(expected: &ExpectedBindGroup, actual_entries: &[wgpu::BindGroupLayoutEntry]) -> u32 {
    let mut mismatches = 0u32;

    for exp in &expected.bindings {
        match actual_entries.iter().find(|e| e.binding == exp.binding) {
            None => {
                log::error!(
                    "[BindingValidator] MISMATCH in '{}' group {} binding {}: expected {} ({}), actual: MISSING",
                    expected.pipeline_name,
                    expected.group_index,
                    exp.binding,
                    exp.binding_type,
                    exp.label
                );
                mismatches += 1;
            }
            Some(actual) => {
                let actual_type = classify_entry(actual);
                if actual_type != exp.binding_type {
                    log::error!(
                        "[BindingValidator] MISMATCH in '{}' group {} binding {}: expected {} ({}), actual: {}",
                        expected.pipeline_name,
                        expected.group_index,
                        exp.binding,
                        exp.binding_type,
                        exp.label,
                        actual_type
                    );
                    mismatches += 1;
                }
            }
        }
    }

    for actual in actual_entries {
        if !expected.bindings.iter().any(|e| e.binding == actual.binding) {
            log::error!(
                "[BindingValidator] EXTRA binding in '{}' group {} binding {}: type {} not in shader expectations",
                expected.pipeline_name,
                expected.group_index,
                actual.binding,
                classify_entry(actual)
            );
            mismatches += 1;
        }
    }

    mismatches
}

/// Validate the frustum precompute and light culling bind groups.
///
/// Call from `ComputePipelines::new()` with the same entry slices used for
/// layout creation.
pub fn validate_compute_bindings(
    frustum_entries: &[wgpu::BindGroupLayoutEntry],
    culling_entries: &[wgpu::BindGroupLayoutEntry],
) -> u32 {
    let mut total = 0u32;

    let frustum = ExpectedBindGroup {
        pipeline_name: "Frustum Precompute",
        group_index: 0,
        bindings: vec![
            ExpectedBinding { binding: frustum_slots::UNIFORMS, binding_type: ExpectedBindingType::UniformBuffer, label: "FrustumUniforms" },
            ExpectedBinding { binding: frustum_slots::FRUSTUMS, binding_type: ExpectedBindingType::StorageBufferReadWrite, label: "TileFrustum[]" },
        ],
    };
    total += validate_bind_group(&frustum, frustum_entries);

    let culling = ExpectedBindGroup {
        pipeline_name: "Light Culling",
        group_index: 0,
        bindings: vec![
            ExpectedBinding { binding: culling_slots::UNIFORMS, binding_type: ExpectedBindingType::UniformBuffer, label: "CullingUniforms" },
            ExpectedBinding { binding: culling_slots::FRUSTUMS, binding_type: ExpectedBindingType::StorageBufferReadOnly, label: "TileFrustum[]" },
            ExpectedBinding { binding: culling_slots::LIGHTS, binding_type: ExpectedBindingType::StorageBufferReadOnly, label: "LightRecord[]" },
            ExpectedBinding { binding: culling_slots::DEPTH, binding_type: ExpectedBindingType::FloatTexture, label: "captured depth" },
            ExpectedBinding { binding: culling_slots::LIGHT_INDEX_LIST, binding_type: ExpectedBindingType::StorageBufferReadWrite, label: "light index list" },
            ExpectedBinding { binding: culling_slots::LIGHT_GRID, binding_type: ExpectedBindingType::StorageTextureWrite(LIGHT_GRID_FORMAT), label: "light grid" },
            ExpectedBinding { binding: culling_slots::COUNTERS, binding_type: ExpectedBindingType::StorageBufferReadWrite, label: "CullingCounters" },
        ],
    };
    total += validate_bind_group(&culling, culling_entries);

    total
}

/// Validate the render pipelines: depth prepass, depth copy and light grid overlay.
pub fn validate_render_bindings(
    prepass_entries: &[wgpu::BindGroupLayoutEntry],
    depth_copy_entries: &[wgpu::BindGroupLayoutEntry],
    light_grid_debug_entries: &[wgpu::BindGroupLayoutEntry],
) -> u32 {
    let mut total = 0u32;

    let prepass = ExpectedBindGroup {
        pipeline_name: "Depth Prepass",
        group_index: 0,
        bindings: vec![ExpectedBinding { binding: 0, binding_type: ExpectedBindingType::UniformBuffer, label: "Camera" }],
    };
    total += validate_bind_group(&prepass, prepass_entries);

    let depth_copy = ExpectedBindGroup {
        pipeline_name: "Depth Copy",
        group_index: 0,
        bindings: vec![
            ExpectedBinding { binding: 0, binding_type: ExpectedBindingType::DepthTexture, label: "source depth" },
            ExpectedBinding { binding: 1, binding_type: ExpectedBindingType::UniformBuffer, label: "CopyParams" },
        ],
    };
    total += validate_bind_group(&depth_copy, depth_copy_entries);

    let light_grid_debug = ExpectedBindGroup {
        pipeline_name: "Light Grid Debug",
        group_index: 0,
        bindings: vec![
            ExpectedBinding { binding: 0, binding_type: ExpectedBindingType::UintTexture, label: "light grid" },
            ExpectedBinding { binding: 1, binding_type: ExpectedBindingType::FloatTexture, label: "heatmap" },
            ExpectedBinding { binding: 2, binding_type: ExpectedBindingType::Sampler, label: "heatmap sampler" },
            ExpectedBinding { binding: 3, binding_type: ExpectedBindingType::UniformBuffer, label: "DebugUniforms" },
        ],
    };
    total += validate_bind_group(&light_grid_debug, light_grid_debug_entries);

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::compute_pipelines::{culling_layout_entries, frustum_layout_entries};
    use crate::render::depth_capture::{depth_copy_layout_entries, prepass_layout_entries};
    use crate::render::light_grid_debug::light_grid_debug_layout_entries;

    #[test]
    fn test_compute_layouts_match_shaders() {
        assert_eq!(validate_compute_bindings(&frustum_layout_entries(), &culling_layout_entries()), 0);
    }

    #[test]
    fn test_render_layouts_match_shaders() {
        let mismatches = validate_render_bindings(
            &prepass_layout_entries(),
            &depth_copy_layout_entries(),
            &light_grid_debug_layout_entries(),
        );
        assert_eq!(mismatches, 0);
    }

    #[test]
    fn test_missing_and_extra_bindings_are_counted() {
        let mut entries = culling_layout_entries().to_vec();
        entries.retain(|e| e.binding != culling_slots::COUNTERS);
        let mut extra = entries[0];
        extra.binding = 9;
        entries.push(extra);
        assert_eq!(validate_compute_bindings(&frustum_layout_entries(), &entries), 2);
    }

    #[test]
    fn test_wrong_storage_format_is_a_mismatch() {
        let mut entries = culling_layout_entries();
        for entry in entries.iter_mut() {
            if entry.binding == culling_slots::LIGHT_GRID {
                entry.ty = wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: wgpu::TextureFormat::R32Uint,
                    view_dimension: wgpu::TextureViewDimension::D2,
                };
            }
        }
        assert_eq!(validate_compute_bindings(&frustum_layout_entries(), &entries), 1);
    }
}
