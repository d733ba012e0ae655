//! Compute Pipeline Infrastructure Module
//!
//! Creates the two Forward+ compute pipelines:
//! - Frustum precompute: one view-space frustum per screen tile
//! - Light culling: per-tile light index segments and the light grid
//!
//! Binding slots are named constants shared by layout creation and bind group
//! creation, so a slot is resolved once at initialization and never looked up
//! by name at dispatch time.

use std::num::NonZeroU64;

use super::frustum::FRUSTUM_UNIFORMS_SIZE;
use super::gpu_context::FormatSupport;
use super::shader_loader::{KernelSet, ShaderSource, create_shader_module};

/// `@group(0)` slots of precompute_frustums.wgsl.
pub mod frustum_slots {
    pub const UNIFORMS: u32 = 0;
    pub const FRUSTUMS: u32 = 1;
}

/// `@group(0)` slots of light_culling.wgsl.
pub mod culling_slots {
    pub const UNIFORMS: u32 = 0;
    pub const FRUSTUMS: u32 = 1;
    pub const LIGHTS: u32 = 2;
    pub const DEPTH: u32 = 3;
    pub const LIGHT_INDEX_LIST: u32 = 4;
    pub const LIGHT_GRID: u32 = 5;
    pub const COUNTERS: u32 = 6;
}

/// Size of `CullingUniforms` in light_culling.wgsl.
pub const CULLING_UNIFORMS_SIZE: u64 = 160;

/// Size of `CullingCounters` in light_culling.wgsl.
pub const CULLING_COUNTERS_SIZE: u64 = 16;

/// Format of the light grid texture: `.x` segment offset, `.y` count.
pub const LIGHT_GRID_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg32Uint;

/// Format of the captured depth texture read by the culling kernel.
pub const CAPTURED_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

/// A compute pipeline plus the layout of its only bind group.
pub struct ComputeKernel {
    pub pipeline: wgpu::ComputePipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

/// The compute kernels that were configured. A `None` entry means the kernel
/// was absent from the `KernelSet`, or its output format is unsupported, and
/// its stage is a no-op.
pub struct ComputePipelines {
    pub frustum: Option<ComputeKernel>,
    pub culling: Option<ComputeKernel>,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32, size: u64) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(size),
        },
        count: None,
    }
}

/// Layout entries for precompute_frustums.wgsl.
pub fn frustum_layout_entries() -> [wgpu::BindGroupLayoutEntry; 2] {
    [
        uniform_entry(frustum_slots::UNIFORMS, FRUSTUM_UNIFORMS_SIZE as u64),
        storage_entry(frustum_slots::FRUSTUMS, false),
    ]
}

/// Layout entries for light_culling.wgsl.
pub fn culling_layout_entries() -> [wgpu::BindGroupLayoutEntry; 7] {
    [
        uniform_entry(culling_slots::UNIFORMS, CULLING_UNIFORMS_SIZE),
        storage_entry(culling_slots::FRUSTUMS, true),
        storage_entry(culling_slots::LIGHTS, true),
        wgpu::BindGroupLayoutEntry {
            binding: culling_slots::DEPTH,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        },
        storage_entry(culling_slots::LIGHT_INDEX_LIST, false),
        wgpu::BindGroupLayoutEntry {
            binding: culling_slots::LIGHT_GRID,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: LIGHT_GRID_FORMAT,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            count: None,
        },
        storage_entry(culling_slots::COUNTERS, false),
    ]
}

fn build_kernel(
    device: &wgpu::Device,
    name: &str,
    source: &ShaderSource,
    entry_point: &str,
    entries: &[wgpu::BindGroupLayoutEntry],
) -> ComputeKernel {
    let module = create_shader_module(device, name, source);

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{name}_bind_group_layout")),
        entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{name}_pipeline_layout")),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&format!("{name}_pipeline")),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    });

    ComputeKernel {
        pipeline,
        bind_group_layout,
    }
}

impl ComputePipelines {
    /// Create the configured compute pipelines. The culling kernel is left
    /// out when the adapter cannot write the light grid format.
    pub fn new(device: &wgpu::Device, kernels: &KernelSet, formats: &FormatSupport) -> Self {
        let frustum_entries = frustum_layout_entries();
        let culling_entries = culling_layout_entries();

        let mismatches = super::binding_validator::validate_compute_bindings(&frustum_entries, &culling_entries);
        if mismatches > 0 {
            log::warn!("[ComputePipelines] {} compute binding mismatch(es) detected!", mismatches);
        }

        let frustum = kernels.frustum.as_ref().map(|source| {
            build_kernel(device, "precompute_frustums", source, "cs_precompute_frustums", &frustum_entries)
        });
        if frustum.is_none() {
            log::warn!("[ComputePipelines] frustum kernel not configured, frustum stage disabled");
        }

        let culling = match (&kernels.culling, formats.light_grid_storage) {
            (Some(source), true) => Some(build_kernel(
                device,
                "light_culling",
                source,
                "cs_cull_lights",
                &culling_entries,
            )),
            (Some(_), false) => {
                log::warn!("[ComputePipelines] {:?} storage unsupported, culling stage disabled", LIGHT_GRID_FORMAT);
                None
            }
            (None, _) => {
                log::warn!("[ComputePipelines] culling kernel not configured, culling stage disabled");
                None
            }
        };

        Self { frustum, culling }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_unique() {
        let entries = culling_layout_entries();
        for (i, a) in entries.iter().enumerate() {
            for b in &entries[i + 1..] {
                assert_ne!(a.binding, b.binding);
            }
        }
    }

    #[test]
    fn test_uniform_min_sizes() {
        let frustum = frustum_layout_entries();
        match frustum[0].ty {
            wgpu::BindingType::Buffer { min_binding_size, .. } => {
                assert_eq!(min_binding_size.map(|s| s.get()), Some(96));
            }
            _ => panic!("frustum uniforms must be a buffer"),
        }
    }
}
