//! Shader Validation Tests - WGSL Kernels
//!
//! Parses and validates every embedded kernel with naga, checks entry points
//! and binding slots against the Rust layouts, and compares the WGSL struct
//! sizes with the `#[repr(C)]` records uploaded to them.

use forward_plus_engine::compute_pipelines::{culling_slots, frustum_slots};
use forward_plus_engine::depth_capture::CopyParams;
use forward_plus_engine::frustum::FrustumUniforms;
use forward_plus_engine::light_culling_pass::CullingUniforms;
use forward_plus_engine::light_grid_debug::DebugUniforms;
use forward_plus_engine::shader_loader::embedded;
use forward_plus_engine::{CullingCounters, LightRecord, TileFrustum};

fn parse_and_validate(name: &str, source: &str) -> naga::Module {
    let module = naga::front::wgsl::parse_str(source)
        .unwrap_or_else(|err| panic!("{name} failed to parse:\n{}", err.emit_to_string(source)));
    naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
        .validate(&module)
        .unwrap_or_else(|err| panic!("{name} failed validation: {err:?}"));
    module
}

fn entry_point(module: &naga::Module, name: &str) -> naga::ShaderStage {
    module
        .entry_points
        .iter()
        .find(|ep| ep.name == name)
        .map(|ep| ep.stage)
        .unwrap_or_else(|| panic!("missing entry point {name}"))
}

/// Sorted `@binding` indices of group 0.
fn group0_bindings(module: &naga::Module) -> Vec<u32> {
    let mut bindings: Vec<u32> = module
        .global_variables
        .iter()
        .filter_map(|(_, var)| var.binding.as_ref())
        .filter(|binding| binding.group == 0)
        .map(|binding| binding.binding)
        .collect();
    bindings.sort_unstable();
    bindings
}

/// Byte size of a named WGSL struct.
fn struct_size(module: &naga::Module, name: &str) -> u32 {
    let mut layouter = naga::proc::Layouter::default();
    layouter.update(module.to_ctx()).expect("layout");
    let (handle, _) = module
        .types
        .iter()
        .find(|(_, ty)| ty.name.as_deref() == Some(name))
        .unwrap_or_else(|| panic!("missing struct {name}"));
    layouter[handle].size
}

#[test]
fn test_precompute_frustums_kernel() {
    let module = parse_and_validate("precompute_frustums.wgsl", embedded::PRECOMPUTE_FRUSTUMS);
    assert_eq!(entry_point(&module, "cs_precompute_frustums"), naga::ShaderStage::Compute);
    assert_eq!(group0_bindings(&module), vec![frustum_slots::UNIFORMS, frustum_slots::FRUSTUMS]);
    assert_eq!(struct_size(&module, "FrustumUniforms") as usize, std::mem::size_of::<FrustumUniforms>());
    assert_eq!(struct_size(&module, "TileFrustum") as usize, std::mem::size_of::<TileFrustum>());
}

#[test]
fn test_light_culling_kernel() {
    let module = parse_and_validate("light_culling.wgsl", embedded::LIGHT_CULLING);
    assert_eq!(entry_point(&module, "cs_cull_lights"), naga::ShaderStage::Compute);
    assert_eq!(
        group0_bindings(&module),
        vec![
            culling_slots::UNIFORMS,
            culling_slots::FRUSTUMS,
            culling_slots::LIGHTS,
            culling_slots::DEPTH,
            culling_slots::LIGHT_INDEX_LIST,
            culling_slots::LIGHT_GRID,
            culling_slots::COUNTERS,
        ]
    );
    assert_eq!(struct_size(&module, "CullingUniforms") as usize, std::mem::size_of::<CullingUniforms>());
    assert_eq!(struct_size(&module, "LightRecord") as usize, std::mem::size_of::<LightRecord>());
    assert_eq!(struct_size(&module, "TileFrustum") as usize, std::mem::size_of::<TileFrustum>());
    assert_eq!(struct_size(&module, "CullingCounters") as usize, std::mem::size_of::<CullingCounters>());
}

#[test]
fn test_depth_prepass_shader() {
    let module = parse_and_validate("depth_prepass.wgsl", embedded::DEPTH_PREPASS);
    assert_eq!(entry_point(&module, "vs_depth"), naga::ShaderStage::Vertex);
    assert_eq!(group0_bindings(&module), vec![0]);
    assert_eq!(struct_size(&module, "Camera"), 64);
}

#[test]
fn test_depth_copy_shader() {
    let module = parse_and_validate("depth_copy.wgsl", embedded::DEPTH_COPY);
    assert_eq!(entry_point(&module, "vs_fullscreen"), naga::ShaderStage::Vertex);
    assert_eq!(entry_point(&module, "fs_copy_depth"), naga::ShaderStage::Fragment);
    assert_eq!(group0_bindings(&module), vec![0, 1]);
    assert_eq!(struct_size(&module, "CopyParams") as usize, std::mem::size_of::<CopyParams>());
}

#[test]
fn test_light_grid_debug_shader() {
    let module = parse_and_validate("light_grid_debug.wgsl", embedded::LIGHT_GRID_DEBUG);
    assert_eq!(entry_point(&module, "vs_fullscreen"), naga::ShaderStage::Vertex);
    assert_eq!(entry_point(&module, "fs_light_grid"), naga::ShaderStage::Fragment);
    assert_eq!(group0_bindings(&module), vec![0, 1, 2, 3]);
    assert_eq!(struct_size(&module, "DebugUniforms") as usize, std::mem::size_of::<DebugUniforms>());
}
