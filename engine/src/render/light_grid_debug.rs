//! Light Grid Visualizer
//!
//! Diagnostic fullscreen pass that maps each pixel to its tile, reads the
//! tile's light count from the light grid and blends a heatmap color over the
//! color target. It only reads the culler's outputs.
//!
//! The heatmap lookup table is a small RGBA strip sampled horizontally by
//! `count / max_lights_per_tile`; either the built-in gradient or an image
//! loaded from disk.

use std::path::Path;

use super::forward_plus::StageStatus;
use super::forward_plus_config::LightGridDebugConfig;
use super::light_culling_pass::CullingOutputs;
use super::shader_loader::{ShaderSource, create_shader_module};
use crate::error::Result;

/// Width of the built-in heatmap strip.
pub const BUILTIN_HEATMAP_WIDTH: u32 = 64;

/// Gradient stops of the built-in heatmap: none, few, some, many, full.
const HEATMAP_STOPS: [[f32; 3]; 5] = [
    [0.0, 0.0, 0.0],
    [0.0, 0.2, 1.0],
    [0.0, 1.0, 0.3],
    [1.0, 0.9, 0.0],
    [1.0, 0.0, 0.0],
];

/// CPU copy of the heatmap lookup table (RGBA8, row-major).
#[derive(Clone, Debug, PartialEq)]
pub struct HeatmapLut {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl HeatmapLut {
    /// The built-in black → blue → green → yellow → red strip.
    pub fn builtin() -> Self {
        let width = BUILTIN_HEATMAP_WIDTH;
        let rgba = (0..width)
            .flat_map(|i| {
                let [r, g, b] = gradient(i as f32 / (width - 1) as f32);
                [to_unorm8(r), to_unorm8(g), to_unorm8(b), 255]
            })
            .collect();
        Self { width, height: 1, rgba }
    }

    /// Decode a PNG or JPEG lookup table.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let image = image::open(path.as_ref())?.to_rgba8();
        log::info!(
            "[LightGridDebug] heatmap {} ({}x{})",
            path.as_ref().display(),
            image.width(),
            image.height()
        );
        Ok(Self {
            width: image.width(),
            height: image.height(),
            rgba: image.into_raw(),
        })
    }

    /// The configured table, or the built-in one when no path is set.
    pub fn from_config(config: &LightGridDebugConfig) -> Result<Self> {
        match &config.heatmap_path {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()),
        }
    }

    /// Nearest color of the middle row at `heat` in [0, 1].
    pub fn sample(&self, heat: f32) -> [u8; 4] {
        let x = (heat.clamp(0.0, 1.0) * (self.width - 1) as f32).round() as u32;
        let y = self.height / 2;
        let i = ((y * self.width + x) * 4) as usize;
        [self.rgba[i], self.rgba[i + 1], self.rgba[i + 2], self.rgba[i + 3]]
    }

    /// Render per-tile light counts into an image, one pixel per tile.
    pub fn render_counts(&self, counts: &[u32], tiles_x: u32, tiles_y: u32, max_lights_per_tile: u32) -> image::RgbaImage {
        image::RgbaImage::from_fn(tiles_x, tiles_y, |x, y| {
            let count = counts.get((y * tiles_x + x) as usize).copied().unwrap_or(0);
            image::Rgba(self.sample(count as f32 / max_lights_per_tile.max(1) as f32))
        })
    }
}

fn gradient(t: f32) -> [f32; 3] {
    let scaled = t.clamp(0.0, 1.0) * (HEATMAP_STOPS.len() - 1) as f32;
    let i = (scaled.floor() as usize).min(HEATMAP_STOPS.len() - 2);
    let f = scaled - i as f32;
    let (a, b) = (HEATMAP_STOPS[i], HEATMAP_STOPS[i + 1]);
    [a[0] + (b[0] - a[0]) * f, a[1] + (b[1] - a[1]) * f, a[2] + (b[2] - a[2]) * f]
}

fn to_unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// GPU-side uniforms matching `DebugUniforms` in light_grid_debug.wgsl (48 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DebugUniforms {
    pub grid_color: [f32; 4],
    /// effective_size / target_size
    pub target_to_screen: [f32; 2],
    pub blend_ratio: f32,
    pub tile_size_px: u32,
    pub max_lights_per_tile: u32,
    pub _pad0: u32,
    pub _pad1: u32,
    pub _pad2: u32,
}

static_assertions::assert_eq_size!(DebugUniforms, [u8; 48]);

/// Layout entries for light_grid_debug.wgsl.
pub fn light_grid_debug_layout_entries() -> [wgpu::BindGroupLayoutEntry; 4] {
    [
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Uint,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 3,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(48),
            },
            count: None,
        },
    ]
}

pub struct LightGridVisualizer {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    _heatmap_texture: wgpu::Texture,
    heatmap_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    config: LightGridDebugConfig,
}

impl LightGridVisualizer {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        source: &ShaderSource,
        color_format: wgpu::TextureFormat,
        config: &LightGridDebugConfig,
        lut: &HeatmapLut,
    ) -> Self {
        let shader = create_shader_module(device, "light_grid_debug", source);

        let heatmap_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("light_grid_heatmap"),
            size: wgpu::Extent3d {
                width: lut.width,
                height: lut.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &heatmap_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &lut.rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * lut.width),
                rows_per_image: Some(lut.height),
            },
            wgpu::Extent3d {
                width: lut.width,
                height: lut.height,
                depth_or_array_layers: 1,
            },
        );
        let heatmap_view = heatmap_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("light_grid_heatmap_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("light_grid_debug_uniforms"),
            size: std::mem::size_of::<DebugUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let entries = light_grid_debug_layout_entries();
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("light_grid_debug_bind_group_layout"),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("light_grid_debug_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("light_grid_debug_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_fullscreen"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_light_grid"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    // Alpha carries the blend ratio.
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::COLOR,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        log::info!("[LightGridDebug] overlay ready (blend {:.2})", config.blend_ratio);

        Self {
            pipeline,
            bind_group_layout,
            uniform_buffer,
            _heatmap_texture: heatmap_texture,
            heatmap_view,
            sampler,
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &LightGridDebugConfig {
        &self.config
    }

    pub fn set_blend_ratio(&mut self, blend_ratio: f32) {
        self.config.blend_ratio = blend_ratio.clamp(0.0, 1.0);
    }

    /// Blend the heatmap over `color_target` (of size `target_size`).
    pub fn execute(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        color_target: &wgpu::TextureView,
        target_size: (u32, u32),
        outputs: &CullingOutputs<'_>,
    ) -> StageStatus {
        if !self.config.enabled || self.config.blend_ratio <= 0.0 {
            return StageStatus::Skipped("overlay disabled");
        }

        let grid = outputs.grid;
        let uniforms = DebugUniforms {
            grid_color: self.config.grid_color,
            target_to_screen: [
                grid.screen_width as f32 / target_size.0.max(1) as f32,
                grid.screen_height as f32 / target_size.1.max(1) as f32,
            ],
            blend_ratio: self.config.blend_ratio,
            tile_size_px: grid.tile_size_px,
            max_lights_per_tile: outputs.max_lights_per_tile,
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("light_grid_debug_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(outputs.light_grid_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&self.heatmap_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("light_grid_debug_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load, // Overlay on the shaded image
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);

        StageStatus::Ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_gradient_endpoints() {
        let lut = HeatmapLut::builtin();
        assert_eq!(lut.rgba.len(), (BUILTIN_HEATMAP_WIDTH * 4) as usize);
        assert_eq!(lut.sample(0.0), [0, 0, 0, 255]);
        assert_eq!(lut.sample(1.0), [255, 0, 0, 255]);
    }

    #[test]
    fn test_render_counts_one_pixel_per_tile() {
        let lut = HeatmapLut::builtin();
        let image = lut.render_counts(&[0, 64, 0, 0, 32, 0], 3, 2, 64);
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(1, 0).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_missing_heatmap_file_is_error() {
        let config = LightGridDebugConfig {
            heatmap_path: Some("does/not/exist.png".to_string()),
            ..Default::default()
        };
        assert!(HeatmapLut::from_config(&config).is_err());
    }

    #[test]
    fn test_debug_uniform_offsets() {
        assert_eq!(std::mem::offset_of!(DebugUniforms, target_to_screen), 16);
        assert_eq!(std::mem::offset_of!(DebugUniforms, blend_ratio), 24);
        assert_eq!(std::mem::offset_of!(DebugUniforms, max_lights_per_tile), 32);
    }
}
