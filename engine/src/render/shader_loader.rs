//! Shader Loading Utilities
//!
//! WGSL sources for the Forward+ kernels, either embedded at compile time or
//! loaded from disk for hot iteration, plus the `KernelSet` that tells each
//! stage whether its kernel is configured.

use std::path::Path;

use crate::error::Result;

/// Shader source that can be either embedded at compile time or loaded at runtime.
#[derive(Clone, Debug)]
pub enum ShaderSource {
    /// Embedded shader source (no file I/O at runtime)
    Embedded(&'static str),
    /// Runtime-loaded shader source
    Runtime(String),
}

impl ShaderSource {
    /// Get the shader source as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            ShaderSource::Embedded(s) => s,
            ShaderSource::Runtime(s) => s.as_str(),
        }
    }
}

/// Load a shader from the filesystem at runtime.
pub fn load_shader_file(path: impl AsRef<Path>) -> Result<ShaderSource> {
    let source = std::fs::read_to_string(path)?;
    Ok(ShaderSource::Runtime(source))
}

/// Create a wgpu shader module from the given source.
pub fn create_shader_module(device: &wgpu::Device, label: &str, source: &ShaderSource) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.as_str().into()),
    })
}

/// Shader file names, relative to the shader directory.
pub mod paths {
    pub const PRECOMPUTE_FRUSTUMS: &str = "precompute_frustums.wgsl";
    pub const LIGHT_CULLING: &str = "light_culling.wgsl";
    pub const DEPTH_PREPASS: &str = "depth_prepass.wgsl";
    pub const DEPTH_COPY: &str = "depth_copy.wgsl";
    pub const LIGHT_GRID_DEBUG: &str = "light_grid_debug.wgsl";
}

/// Kernels compiled into the binary.
pub mod embedded {
    pub const PRECOMPUTE_FRUSTUMS: &str = include_str!("../../shaders/precompute_frustums.wgsl");
    pub const LIGHT_CULLING: &str = include_str!("../../shaders/light_culling.wgsl");
    pub const DEPTH_PREPASS: &str = include_str!("../../shaders/depth_prepass.wgsl");
    pub const DEPTH_COPY: &str = include_str!("../../shaders/depth_copy.wgsl");
    pub const LIGHT_GRID_DEBUG: &str = include_str!("../../shaders/light_grid_debug.wgsl");
}

/// The shaders each stage runs. A `None` kernel turns its stage, and every
/// stage that consumes its output, into a no-op for the frame.
#[derive(Clone, Debug)]
pub struct KernelSet {
    pub frustum: Option<ShaderSource>,
    pub culling: Option<ShaderSource>,
    /// The prepass is always enqueued; its shader is not optional.
    pub depth_prepass: ShaderSource,
    pub depth_copy: Option<ShaderSource>,
    pub light_grid_debug: Option<ShaderSource>,
}

impl KernelSet {
    /// Every kernel, from the sources compiled into the binary.
    pub fn embedded() -> Self {
        Self {
            frustum: Some(ShaderSource::Embedded(embedded::PRECOMPUTE_FRUSTUMS)),
            culling: Some(ShaderSource::Embedded(embedded::LIGHT_CULLING)),
            depth_prepass: ShaderSource::Embedded(embedded::DEPTH_PREPASS),
            depth_copy: Some(ShaderSource::Embedded(embedded::DEPTH_COPY)),
            light_grid_debug: Some(ShaderSource::Embedded(embedded::LIGHT_GRID_DEBUG)),
        }
    }

    /// Only the depth prepass; every other stage skips.
    pub fn prepass_only() -> Self {
        Self {
            frustum: None,
            culling: None,
            depth_prepass: ShaderSource::Embedded(embedded::DEPTH_PREPASS),
            depth_copy: None,
            light_grid_debug: None,
        }
    }

    /// Load kernels from `dir`. Missing optional files leave that kernel
    /// unset; a missing prepass falls back to the embedded one.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let optional = |name: &str| -> Result<Option<ShaderSource>> {
            let path = dir.join(name);
            if path.is_file() {
                load_shader_file(&path).map(Some)
            } else {
                log::warn!("[ShaderLoader] {} not found, stage disabled", path.display());
                Ok(None)
            }
        };

        Ok(Self {
            frustum: optional(paths::PRECOMPUTE_FRUSTUMS)?,
            culling: optional(paths::LIGHT_CULLING)?,
            depth_prepass: optional(paths::DEPTH_PREPASS)?
                .unwrap_or(ShaderSource::Embedded(embedded::DEPTH_PREPASS)),
            depth_copy: optional(paths::DEPTH_COPY)?,
            light_grid_debug: optional(paths::LIGHT_GRID_DEBUG)?,
        })
    }
}

impl Default for KernelSet {
    fn default() -> Self {
        Self::embedded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_source_embedded() {
        let source = ShaderSource::Embedded("@compute @workgroup_size(1) fn main() {}");
        assert!(source.as_str().starts_with("@compute"));
    }

    #[test]
    fn test_shader_source_runtime() {
        let source = ShaderSource::Runtime("fn f() {}".to_string());
        assert_eq!(source.as_str(), "fn f() {}");
    }

    #[test]
    fn test_embedded_entry_points_present() {
        let set = KernelSet::embedded();
        let has = |src: &Option<ShaderSource>, entry: &str| src.as_ref().is_some_and(|s| s.as_str().contains(entry));
        assert!(has(&set.frustum, "fn cs_precompute_frustums"));
        assert!(has(&set.culling, "fn cs_cull_lights"));
        assert!(has(&set.depth_copy, "fn fs_copy_depth"));
        assert!(has(&set.light_grid_debug, "fn fs_light_grid"));
        assert!(set.depth_prepass.as_str().contains("fn vs_depth"));
    }

    #[test]
    fn test_load_dir_missing_files_disable_stages() {
        let dir = std::env::temp_dir().join("forward_plus_empty_shader_dir");
        std::fs::create_dir_all(&dir).unwrap();
        let set = KernelSet::load_dir(&dir).unwrap();
        assert!(set.frustum.is_none());
        assert!(set.culling.is_none());
        assert!(set.depth_copy.is_none());
        assert!(set.depth_prepass.as_str().contains("vs_depth"));
    }

    #[test]
    fn test_load_dir_reads_shader_tree() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("engine/shaders");
        let set = KernelSet::load_dir(dir).unwrap();
        assert!(matches!(set.culling, Some(ShaderSource::Runtime(_))));
    }
}
