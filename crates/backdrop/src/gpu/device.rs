use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use wgpu::naga::ShaderStage as NagaStage;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::device::{
    BufferId, DrawError, GpuDevice, ProgramId, ShaderId, ShaderStage, UniformLocation,
    UniformValue, VertexLayoutId,
};
use crate::glsl::{Declaration, GlslType};
use crate::types::{ContextOptions, SurfaceSize};

use super::compile::{wrap_stage, WrappedStage};
use super::context::GpuContext;
use super::uniforms::{UniformBlock, UniformStaging, VIEWPORT_MEMBER};

struct ShaderObject {
    stage: ShaderStage,
    compiled: Option<(WrappedStage, wgpu::ShaderModule)>,
}

struct LinkedProgram {
    pipeline: wgpu::RenderPipeline,
    block: UniformBlock,
    staging: UniformStaging,
    uniforms: Option<(wgpu::Buffer, wgpu::BindGroup)>,
    attributes: Vec<Declaration>,
}

#[derive(Default)]
struct ProgramObject {
    attached: Vec<ShaderId>,
    linked: Option<LinkedProgram>,
}

struct VertexBuffer {
    buffer: wgpu::Buffer,
    floats: usize,
}

#[derive(Clone, Copy)]
struct VertexLayout {
    buffer: BufferId,
    location: u32,
    components: u32,
}

/// Offscreen colour target at backing-store resolution.
struct BackingTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: SurfaceSize,
}

impl BackingTarget {
    fn new(device: &wgpu::Device, size: SurfaceSize, format: wgpu::TextureFormat) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("backdrop backing store"),
            size: wgpu::Extent3d {
                width: size.width.max(1),
                height: size.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
            size,
        }
    }
}

/// Stretches the backing store over the whole swapchain image.
struct Presenter {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    bind_group: wgpu::BindGroup,
}

const PRESENT_WGSL: &str = r"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(0) @binding(0) var backing_texture: texture_2d<f32>;
@group(0) @binding(1) var backing_sampler: sampler;

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let x = f32((index << 1u) & 2u);
    let y = f32(index & 2u);
    var out: VertexOutput;
    out.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(x, 1.0 - y);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(backing_texture, backing_sampler, in.uv);
}
";

impl Presenter {
    fn new(device: &wgpu::Device, format: wgpu::TextureFormat, source: &wgpu::TextureView) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("backdrop present"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(PRESENT_WGSL)),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("backdrop present layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("backdrop present pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("backdrop present pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("backdrop present sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let bind_group = Self::bind(device, &layout, &sampler, source);
        Self {
            pipeline,
            layout,
            sampler,
            bind_group,
        }
    }

    fn bind(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        source: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("backdrop present bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    fn rebind(&mut self, device: &wgpu::Device, source: &wgpu::TextureView) {
        self.bind_group = Self::bind(device, &self.layout, &self.sampler, source);
    }
}

/// [`GpuDevice`] backed by wgpu, presenting into a winit window.
///
/// Stages are GLSL ES 3.00 and go through [`wrap_stage`] before naga sees
/// them. Draws land in an offscreen target at backing-store resolution, which
/// is then scaled onto the swapchain image.
pub struct WgpuDevice {
    gpu: GpuContext,
    presenter: Presenter,
    backing: BackingTarget,
    uniform_layout: wgpu::BindGroupLayout,
    next_id: u32,
    shaders: HashMap<ShaderId, ShaderObject>,
    programs: HashMap<ProgramId, ProgramObject>,
    buffers: HashMap<BufferId, VertexBuffer>,
    layouts: HashMap<VertexLayoutId, VertexLayout>,
    current_program: Option<ProgramId>,
    current_layout: Option<VertexLayoutId>,
    // Last field: the surface above borrows the window's handles.
    window: Arc<Window>,
}

impl WgpuDevice {
    pub fn new(window: Arc<Window>, size: SurfaceSize, options: &ContextOptions) -> Result<Self> {
        let gpu = GpuContext::new(window.as_ref(), window.inner_size(), options)?;
        let uniform_layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("backdrop uniform layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });
        let backing = BackingTarget::new(&gpu.device, size, gpu.surface_format);
        let presenter = Presenter::new(&gpu.device, gpu.surface_format, &backing.view);
        Ok(Self {
            gpu,
            presenter,
            backing,
            uniform_layout,
            next_id: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            layouts: HashMap::new(),
            current_program: None,
            current_layout: None,
            window,
        })
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Runs `f` inside a validation error scope and returns the first error.
    fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        self.gpu
            .device
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.gpu.device);
        match pollster::block_on(self.gpu.device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(value),
        }
    }

    fn build_pipeline(
        &self,
        vertex: &(WrappedStage, wgpu::ShaderModule),
        fragment: &(WrappedStage, wgpu::ShaderModule),
    ) -> Result<LinkedProgram, String> {
        let (vertex_stage, vertex_module) = vertex;
        let (fragment_stage, fragment_module) = fragment;
        let attributes = vertex_stage.interface.inputs.clone();
        let vertex_attributes: Vec<[wgpu::VertexAttribute; 1]> = attributes
            .iter()
            .enumerate()
            .map(|(location, decl)| {
                [wgpu::VertexAttribute {
                    format: vertex_format(decl.ty),
                    offset: 0,
                    shader_location: location as u32,
                }]
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout<'_>> = attributes
            .iter()
            .zip(&vertex_attributes)
            .map(|(decl, attribute)| wgpu::VertexBufferLayout {
                array_stride: u64::from(decl.ty.size()),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attribute,
            })
            .collect();

        let block = fragment_stage.block.clone();
        let bind_group_layouts: Vec<&wgpu::BindGroupLayout> = if block.is_empty() {
            Vec::new()
        } else {
            vec![&self.uniform_layout]
        };
        let format = self.gpu.surface_format;

        let pipeline = self.scoped(|device| {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("backdrop program layout"),
                bind_group_layouts: &bind_group_layouts,
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("backdrop program"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: vertex_module,
                    entry_point: Some("main"),
                    buffers: &vertex_buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                fragment: Some(wgpu::FragmentState {
                    module: fragment_module,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            })
        })?;

        let uniforms = (!block.is_empty()).then(|| {
            let buffer = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("backdrop uniforms"),
                size: u64::from(block.size()),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = self
                .gpu
                .device
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("backdrop uniform bind group"),
                    layout: &self.uniform_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                });
            (buffer, bind_group)
        });

        Ok(LinkedProgram {
            pipeline,
            staging: UniformStaging::new(&block),
            block,
            uniforms,
            attributes,
        })
    }
}

impl GpuDevice for WgpuDevice {
    fn create_shader(&mut self, stage: ShaderStage) -> Option<ShaderId> {
        let id = ShaderId::from_raw(self.next());
        self.shaders.insert(
            id,
            ShaderObject {
                stage,
                compiled: None,
            },
        );
        Some(id)
    }

    fn compile_shader(&mut self, shader: ShaderId, source: &str) -> Result<(), String> {
        let stage = self
            .shaders
            .get(&shader)
            .map(|object| object.stage)
            .ok_or_else(|| "unknown shader object".to_string())?;
        let wrapped = wrap_stage(stage, source)?;
        let naga_stage = match stage {
            ShaderStage::Vertex => NagaStage::Vertex,
            ShaderStage::Fragment => NagaStage::Fragment,
        };
        let label = format!("backdrop {stage} stage");
        let module = self.scoped(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label.as_str()),
                source: wgpu::ShaderSource::Glsl {
                    shader: Cow::Borrowed(wrapped.glsl.as_str()),
                    stage: naga_stage,
                    defines: &[],
                },
            })
        })?;
        tracing::trace!(%stage, bytes = wrapped.glsl.len(), "compiled shader stage");
        if let Some(object) = self.shaders.get_mut(&shader) {
            object.compiled = Some((wrapped, module));
        }
        Ok(())
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn create_program(&mut self) -> Option<ProgramId> {
        let id = ProgramId::from_raw(self.next());
        self.programs.insert(id, ProgramObject::default());
        Some(id)
    }

    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) {
        if let Some(object) = self.programs.get_mut(&program) {
            object.attached.push(shader);
        }
    }

    fn link_program(&mut self, program: ProgramId) -> Result<(), String> {
        let object = self
            .programs
            .get(&program)
            .ok_or_else(|| "unknown program object".to_string())?;
        let mut vertex = None;
        let mut fragment = None;
        for id in &object.attached {
            let shader = self
                .shaders
                .get(id)
                .ok_or_else(|| "attached shader was deleted".to_string())?;
            let compiled = shader
                .compiled
                .as_ref()
                .ok_or_else(|| format!("{} shader is not compiled", shader.stage))?;
            match shader.stage {
                ShaderStage::Vertex => vertex = Some(compiled),
                ShaderStage::Fragment => fragment = Some(compiled),
            }
        }
        let (Some(vertex), Some(fragment)) = (vertex, fragment) else {
            return Err("program needs one vertex and one fragment shader".into());
        };
        let linked = self.build_pipeline(vertex, fragment)?;
        if let Some(object) = self.programs.get_mut(&program) {
            object.linked = Some(linked);
        }
        Ok(())
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        if name == VIEWPORT_MEMBER {
            return None;
        }
        let linked = self.programs.get(&program)?.linked.as_ref()?;
        let slot = linked.block.slot(name)?;
        Some(UniformLocation::new(program, slot))
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        let linked = self.programs.get(&program)?.linked.as_ref()?;
        linked
            .attributes
            .iter()
            .position(|decl| decl.name == name)
            .map(|location| location as u32)
    }

    fn create_vertex_buffer(&mut self, data: &[f32]) -> Option<BufferId> {
        let buffer = self
            .gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("backdrop vertices"),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let id = BufferId::from_raw(self.next());
        self.buffers.insert(
            id,
            VertexBuffer {
                buffer,
                floats: data.len(),
            },
        );
        Some(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    fn create_vertex_layout(
        &mut self,
        buffer: BufferId,
        location: u32,
        components: u32,
    ) -> Option<VertexLayoutId> {
        if !self.buffers.contains_key(&buffer) || !(1..=4).contains(&components) {
            return None;
        }
        let id = VertexLayoutId::from_raw(self.next());
        self.layouts.insert(
            id,
            VertexLayout {
                buffer,
                location,
                components,
            },
        );
        Some(id)
    }

    fn delete_vertex_layout(&mut self, layout: VertexLayoutId) {
        self.layouts.remove(&layout);
        if self.current_layout == Some(layout) {
            self.current_layout = None;
        }
    }

    fn resize_surface(&mut self, size: SurfaceSize) {
        if size.is_empty() {
            return;
        }
        if size != self.backing.size {
            self.backing = BackingTarget::new(&self.gpu.device, size, self.gpu.surface_format);
            self.presenter.rebind(&self.gpu.device, &self.backing.view);
        }
        self.gpu.resize(self.window.inner_size());
        tracing::debug!(
            backing_width = size.width,
            backing_height = size.height,
            surface_width = self.gpu.size.width,
            surface_height = self.gpu.size.height,
            "resized backing store"
        );
    }

    fn use_program(&mut self, program: ProgramId) {
        self.current_program = self.programs.contains_key(&program).then_some(program);
    }

    fn bind_vertex_layout(&mut self, layout: VertexLayoutId) {
        self.current_layout = self.layouts.contains_key(&layout).then_some(layout);
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        if self.current_program != Some(location.program()) {
            return;
        }
        let Some(linked) = self
            .programs
            .get_mut(&location.program())
            .and_then(|object| object.linked.as_mut())
        else {
            return;
        };
        if let Some(member) = linked.block.member(location.slot()) {
            if !linked.staging.write(member, value) {
                tracing::debug!(uniform = %member.name, "uniform type mismatch; value ignored");
            }
        }
    }

    fn draw_arrays(&mut self, first: u32, count: u32) -> Result<(), DrawError> {
        let layout = self
            .current_layout
            .and_then(|id| self.layouts.get(&id).copied())
            .ok_or_else(|| DrawError::Other("no vertex layout bound".into()))?;
        let vertices = self
            .buffers
            .get(&layout.buffer)
            .ok_or_else(|| DrawError::Other("vertex buffer was deleted".into()))?;
        if ((first + count) * layout.components) as usize > vertices.floats {
            return Err(DrawError::Other("draw reads past the vertex buffer".into()));
        }
        let linked = self
            .current_program
            .and_then(|id| self.programs.get_mut(&id))
            .and_then(|object| object.linked.as_mut())
            .ok_or_else(|| DrawError::Other("no linked program in use".into()))?;
        if let Some(attribute) = linked.attributes.get(layout.location as usize) {
            if attribute.ty.components() != layout.components {
                return Err(DrawError::Other(format!(
                    "attribute `{}` expects {} components",
                    attribute.name,
                    attribute.ty.components()
                )));
            }
        }

        let viewport = self.backing.size;
        if let Some(slot) = linked.block.slot(VIEWPORT_MEMBER) {
            if let Some(member) = linked.block.member(slot) {
                linked.staging.write(
                    member,
                    UniformValue::Vec2([viewport.width as f32, viewport.height as f32]),
                );
            }
        }
        if let (Some(bytes), Some((buffer, _))) = (linked.staging.take_dirty(), &linked.uniforms) {
            self.gpu.queue.write_buffer(buffer, 0, bytes);
        }

        let frame = self
            .gpu
            .surface
            .get_current_texture()
            .map_err(map_surface_error)?;
        let frame_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("backdrop frame"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("backdrop shader pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.backing.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&linked.pipeline);
            if let Some((_, bind_group)) = &linked.uniforms {
                pass.set_bind_group(0, bind_group, &[]);
            }
            pass.set_vertex_buffer(layout.location, vertices.buffer.slice(..));
            pass.set_viewport(
                0.0,
                0.0,
                viewport.width as f32,
                viewport.height as f32,
                0.0,
                1.0,
            );
            pass.draw(first..first + count, 0..1);
        }
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("backdrop present pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.presenter.pipeline);
            pass.set_bind_group(0, &self.presenter.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.gpu.queue.submit(Some(encoder.finish()));
        self.window.pre_present_notify();
        frame.present();
        Ok(())
    }
}

fn vertex_format(ty: GlslType) -> wgpu::VertexFormat {
    match ty {
        GlslType::Float => wgpu::VertexFormat::Float32,
        GlslType::Vec2 => wgpu::VertexFormat::Float32x2,
        GlslType::Vec3 => wgpu::VertexFormat::Float32x3,
        GlslType::Vec4 => wgpu::VertexFormat::Float32x4,
    }
}

fn map_surface_error(err: wgpu::SurfaceError) -> DrawError {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => DrawError::Lost,
        wgpu::SurfaceError::Timeout => DrawError::Timeout,
        wgpu::SurfaceError::OutOfMemory => DrawError::OutOfMemory,
        other => DrawError::Other(other.to_string()),
    }
}
