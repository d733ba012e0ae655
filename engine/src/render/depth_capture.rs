//! Depth Prepass and Depth Capture
//!
//! The prepass renders the host's opaque geometry into a Depth32Float
//! attachment. The capture stage then copies that attachment, with a
//! fullscreen triangle, into an R32Float texture at the effective
//! (render-scale adjusted) resolution so the culling kernel can `textureLoad`
//! it like any other texture.
//!
//! The captured texture is a per-frame temporary: `DepthCapture::acquire`
//! leases it from a pool and the lease hands it back when dropped, however
//! the frame ends.

use glam::Mat4;
use wgpu::util::DeviceExt;

use super::compute_pipelines::CAPTURED_DEPTH_FORMAT;
use super::forward_plus::StageStatus;
use super::gpu_resource::{FrameLease, FramePool, Releasable};
use super::shader_loader::{ShaderSource, create_shader_module};
use super::tile_grid::effective_resolution;

/// Format of the depth attachment the prepass writes.
pub const PREPASS_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Depth the prepass attachment is cleared to (far plane).
pub const PREPASS_CLEAR_DEPTH: f32 = 1.0;

// ============================================================================
// Prepass geometry
// ============================================================================

/// Per-instance model matrix for the prepass (64 bytes, column-major).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DepthInstance {
    pub model: [[f32; 4]; 4],
}

const _: () = assert!(std::mem::size_of::<DepthInstance>() == 64);

impl DepthInstance {
    pub fn from_matrix(model: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
        }
    }
}

/// Vertex buffer layouts of depth_prepass.wgsl: positions, then instances.
pub fn prepass_vertex_layouts() -> [wgpu::VertexBufferLayout<'static>; 2] {
    const POSITION: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
    const INSTANCE: [wgpu::VertexAttribute; 4] =
        wgpu::vertex_attr_array![1 => Float32x4, 2 => Float32x4, 3 => Float32x4, 4 => Float32x4];
    [
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &POSITION,
        },
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<DepthInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &INSTANCE,
        },
    ]
}

/// Opaque geometry supplied by the host for the depth prepass.
///
/// The prepass pipeline and camera bind group are already set when
/// `draw_depth` is called; implementors bind vertex buffers 0 (positions) and
/// 1 (instances) and issue draws.
pub trait DepthDrawSource {
    fn draw_depth(&self, pass: &mut wgpu::RenderPass<'_>);
}

/// A scene with no opaque geometry.
impl DepthDrawSource for () {
    fn draw_depth(&self, _pass: &mut wgpu::RenderPass<'_>) {}
}

impl<T: DepthDrawSource> DepthDrawSource for Vec<T> {
    fn draw_depth(&self, pass: &mut wgpu::RenderPass<'_>) {
        for item in self {
            item.draw_depth(pass);
        }
    }
}

/// Indexed, instanced mesh for the prepass.
pub struct DepthMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    instance_buffer: wgpu::Buffer,
    instance_count: u32,
}

impl DepthMesh {
    pub fn new(device: &wgpu::Device, positions: &[[f32; 3]], indices: &[u32], instances: &[DepthInstance]) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("depth_mesh_vertices"),
            contents: bytemuck::cast_slice(positions),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("depth_mesh_indices"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("depth_mesh_instances"),
            contents: bytemuck::cast_slice(instances),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            instance_buffer,
            instance_count: instances.len() as u32,
        }
    }

    /// A single quad spanning `[-half, half]²` in the XY plane, facing +Z.
    pub fn quad(device: &wgpu::Device, half_extent: f32, instances: &[DepthInstance]) -> Self {
        let h = half_extent;
        let positions = [[-h, -h, 0.0], [h, -h, 0.0], [h, h, 0.0], [-h, h, 0.0]];
        Self::new(device, &positions, &[0, 1, 2, 0, 2, 3], instances)
    }
}

impl DepthDrawSource for DepthMesh {
    fn draw_depth(&self, pass: &mut wgpu::RenderPass<'_>) {
        if self.index_count == 0 || self.instance_count == 0 {
            return;
        }
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..self.instance_count);
    }
}

/// Create a depth attachment the prepass can render into and the capture
/// stage can sample.
pub fn create_depth_attachment(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("prepass_depth_attachment"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: PREPASS_DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

// ============================================================================
// Depth prepass
// ============================================================================

/// Layout entries for depth_prepass.wgsl.
pub fn prepass_layout_entries() -> [wgpu::BindGroupLayoutEntry; 1] {
    [wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(64),
        },
        count: None,
    }]
}

/// Depth-only render of the host's opaque geometry.
pub struct DepthPrepass {
    pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl DepthPrepass {
    pub fn new(device: &wgpu::Device, source: &ShaderSource) -> Self {
        let shader = create_shader_module(device, "depth_prepass", source);

        let entries = prepass_layout_entries();
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("depth_prepass_bind_group_layout"),
            entries: &entries,
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("depth_prepass_camera"),
            size: 64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("depth_prepass_bind_group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("depth_prepass_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let vertex_layouts = prepass_vertex_layouts();
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("depth_prepass_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_depth"),
                buffers: &vertex_layouts,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: None,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: PREPASS_DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            camera_buffer,
            bind_group,
        }
    }

    /// Clear `depth_view` and render `scene` into it.
    pub fn execute(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        depth_view: &wgpu::TextureView,
        view_projection: Mat4,
        scene: &dyn DepthDrawSource,
    ) {
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&view_projection.to_cols_array_2d()));

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("depth_prepass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(PREPASS_CLEAR_DEPTH),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        scene.draw_depth(&mut pass);
    }
}

// ============================================================================
// Depth capture
// ============================================================================

/// GPU-side params matching `CopyParams` in depth_copy.wgsl (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CopyParams {
    /// source_size / destination_size
    pub source_scale: [f32; 2],
    pub _pad0: [f32; 2],
}

static_assertions::assert_eq_size!(CopyParams, [u8; 16]);

impl CopyParams {
    pub fn new(source: (u32, u32), destination: (u32, u32)) -> Self {
        Self {
            source_scale: [
                source.0.max(1) as f32 / destination.0.max(1) as f32,
                source.1.max(1) as f32 / destination.1.max(1) as f32,
            ],
            _pad0: [0.0; 2],
        }
    }
}

/// Layout entries for depth_copy.wgsl.
pub fn depth_copy_layout_entries() -> [wgpu::BindGroupLayoutEntry; 2] {
    [
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Depth,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(16),
            },
            count: None,
        },
    ]
}

/// The R32Float texture the culler reads.
pub struct CapturedTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl Releasable for CapturedTexture {
    fn release(&mut self) {
        self.texture.destroy();
    }
}

/// This frame's captured depth. Returned to the pool when dropped.
pub type CapturedDepth = FrameLease<(u32, u32), CapturedTexture>;

struct CopyPipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
}

/// Materializes the prepass depth into a compute-readable texture.
pub struct DepthCapture {
    copy: Option<CopyPipeline>,
    pool: FramePool<(u32, u32), CapturedTexture>,
    extent: (u32, u32),
}

impl DepthCapture {
    /// Without a copy shader, or when the adapter cannot render to
    /// `CAPTURED_DEPTH_FORMAT`, the stage is a no-op and `acquire` returns `None`.
    pub fn new(device: &wgpu::Device, source: Option<&ShaderSource>, renderable: bool) -> Self {
        let copy = match source {
            Some(source) if renderable => Some(Self::create_pipeline(device, source)),
            Some(_) => {
                log::warn!("[DepthCapture] {:?} is not renderable, stage disabled", CAPTURED_DEPTH_FORMAT);
                None
            }
            None => {
                log::warn!("[DepthCapture] no depth copy shader, stage disabled");
                None
            }
        };
        Self {
            copy,
            pool: FramePool::new("CapturedDepth"),
            extent: (1, 1),
        }
    }

    fn create_pipeline(device: &wgpu::Device, source: &ShaderSource) -> CopyPipeline {
        let shader = create_shader_module(device, "depth_copy", source);

        let entries = depth_copy_layout_entries();
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("depth_copy_bind_group_layout"),
            entries: &entries,
        });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("depth_copy_params"),
            size: std::mem::size_of::<CopyParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("depth_copy_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("depth_copy_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_fullscreen"),
                buffers: &[], // Fullscreen triangle, no vertex buffer
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_copy_depth"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: CAPTURED_DEPTH_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
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

        CopyPipeline {
            pipeline,
            bind_group_layout,
            params_buffer,
        }
    }

    /// Size the captured texture for a target and render scale.
    /// Returns the effective extent.
    pub fn configure(&mut self, target_width: u32, target_height: u32, render_scale: f32) -> (u32, u32) {
        self.extent = effective_resolution(target_width, target_height, render_scale);
        self.extent
    }

    pub fn extent(&self) -> (u32, u32) {
        self.extent
    }

    pub fn is_available(&self) -> bool {
        self.copy.is_some()
    }

    /// Lease this frame's captured texture at the configured extent.
    pub fn acquire(&self, device: &wgpu::Device) -> Option<CapturedDepth> {
        self.copy.as_ref()?;
        Some(self.pool.acquire(self.extent, |&(width, height)| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("captured_depth"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: CAPTURED_DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            CapturedTexture { texture, view }
        }))
    }

    /// Copy `source_depth` (of size `source_size`) into `target`.
    pub fn execute(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        source_depth: &wgpu::TextureView,
        source_size: (u32, u32),
        target: &CapturedDepth,
    ) -> StageStatus {
        let Some(copy) = self.copy.as_ref() else {
            return StageStatus::Skipped("depth copy unavailable");
        };

        let params = CopyParams::new(source_size, target.key());
        queue.write_buffer(&copy.params_buffer, 0, bytemuck::bytes_of(&params));

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("depth_copy_bind_group"),
            layout: &copy.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source_depth),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: copy.params_buffer.as_entire_binding(),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("depth_capture_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: PREPASS_CLEAR_DEPTH as f64,
                        g: 0.0,
                        b: 0.0,
                        a: 0.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&copy.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);

        StageStatus::Ran
    }

    /// Captured textures waiting for the next frame.
    pub fn idle_textures(&self) -> usize {
        self.pool.idle_count()
    }

    pub fn release(&mut self) {
        self.pool.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_params_scale() {
        let params = CopyParams::new((1920, 1080), (960, 540));
        assert_eq!(params.source_scale, [2.0, 2.0]);
        let same = CopyParams::new((800, 600), (800, 600));
        assert_eq!(same.source_scale, [1.0, 1.0]);
    }

    #[test]
    fn test_instance_layout_covers_matrix() {
        let layouts = prepass_vertex_layouts();
        assert_eq!(layouts[0].array_stride, 12);
        assert_eq!(layouts[1].array_stride, 64);
        assert_eq!(layouts[1].attributes.len(), 4);
        assert_eq!(layouts[1].attributes[3].offset, 48);
    }

    #[test]
    fn test_depth_instance_is_column_major() {
        let model = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let instance = DepthInstance::from_matrix(model);
        assert_eq!(instance.model[3], [1.0, 2.0, 3.0, 1.0]);
    }
}
