//! GPU Context
//!
//! Headless device and queue acquisition for tools and tests. Hosts with a
//! window bring their own device; the engine only needs `&wgpu::Device` and
//! `&wgpu::Queue`.

use super::compute_pipelines::{CAPTURED_DEPTH_FORMAT, LIGHT_GRID_FORMAT};
use crate::error::Result;

/// Texture usages the Forward+ stages need that downlevel adapters (GLES,
/// WebGL2) may not allow. A stage whose format is unsupported is built
/// disabled and reports `StageStatus::Skipped` instead of faulting the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatSupport {
    /// R32Float as a render attachment that is also sampled (depth capture).
    pub captured_depth_renderable: bool,
    /// Rg32Uint as a storage texture that is also sampled (light grid).
    pub light_grid_storage: bool,
}

impl FormatSupport {
    /// Every stage enabled.
    pub const ALL: Self = Self {
        captured_depth_renderable: true,
        light_grid_storage: true,
    };

    /// Every format-dependent stage disabled.
    pub const NONE: Self = Self {
        captured_depth_renderable: false,
        light_grid_storage: false,
    };

    /// Ask the adapter which of the engine's texture usages it allows.
    pub fn query(adapter: &wgpu::Adapter) -> Self {
        let allows = |format: wgpu::TextureFormat, usages: wgpu::TextureUsages| {
            adapter.get_texture_format_features(format).allowed_usages.contains(usages)
        };
        let support = Self {
            captured_depth_renderable: allows(
                CAPTURED_DEPTH_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            ),
            light_grid_storage: allows(
                LIGHT_GRID_FORMAT,
                wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            ),
        };
        if !support.supports_culling() {
            log::warn!("[GpuContext] downlevel texture formats: {:?}", support);
        }
        support
    }

    /// Whether a frame can run through to the light grid.
    pub fn supports_culling(&self) -> bool {
        self.captured_depth_renderable && self.light_grid_storage
    }
}

/// Adapter, device and queue of a headless context.
pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    /// What the adapter allows for the engine's texture formats.
    pub formats: FormatSupport,
}

/// Configuration for GPU context creation
#[derive(Clone, Debug)]
pub struct GpuContextConfig {
    /// Prefer high-performance GPU
    pub high_performance: bool,
    /// Accept only a software adapter
    pub force_fallback_adapter: bool,
    /// Enable debug validation
    pub debug: bool,
}

impl Default for GpuContextConfig {
    fn default() -> Self {
        Self {
            high_performance: true,
            force_fallback_adapter: false,
            debug: cfg!(debug_assertions),
        }
    }
}

impl GpuContext {
    /// Request an adapter and device without a surface.
    pub async fn request(config: &GpuContextConfig) -> Result<Self> {
        let flags = if config.debug {
            wgpu::InstanceFlags::debugging()
        } else {
            wgpu::InstanceFlags::empty()
        };
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: if config.high_performance {
                    wgpu::PowerPreference::HighPerformance
                } else {
                    wgpu::PowerPreference::LowPower
                },
                compatible_surface: None,
                force_fallback_adapter: config.force_fallback_adapter,
            })
            .await?;

        let info = adapter.get_info();
        log::info!("[GpuContext] adapter: {} ({:?}, {:?})", info.name, info.device_type, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Forward+ Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        let formats = FormatSupport::query(&adapter);

        Ok(Self {
            adapter,
            device,
            queue,
            formats,
        })
    }

    /// Blocking form of `request`.
    pub fn new_headless(config: &GpuContextConfig) -> Result<Self> {
        pollster::block_on(Self::request(config))
    }

    /// Whether the adapter is a CPU implementation.
    pub fn is_software(&self) -> bool {
        self.adapter.get_info().device_type == wgpu::DeviceType::Cpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_culling_needs_both_formats() {
        assert!(FormatSupport::ALL.supports_culling());
        assert!(!FormatSupport::NONE.supports_culling());
        let no_grid = FormatSupport {
            light_grid_storage: false,
            ..FormatSupport::ALL
        };
        assert!(!no_grid.supports_culling());
    }
}
