//! The wgpu backend of [`GraphicsDevice`].
//!
//! [`Context`] owns the window surface, device and queue. [`WgpuDevice`]
//! keeps every resource the engine creates in slot maps and records the draw
//! calls of a frame. The recorded calls are replayed into a single render
//! pass in [`GraphicsDevice::end_frame`], with pipelines built on demand for
//! each combination of shader, blend mode, depth state and topology.
//!
//! Bind groups:
//! - group 0: camera block (binding 0) and lighting block (binding 1)
//! - group 1: material block
//! - group 2: object block
//! - group 3: base colour texture and sampler
//!
//! Only the base colour slot is sampled by the shaders; the other texture
//! slots are tracked but not bound.

use std::{collections::HashMap, sync::Arc};

use slotmap::SlotMap;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    data_structures::{
        material::TextureSlot,
        mesh::{IndexType, Topology},
        texture::Texture,
    },
    device::{
        AttributeSlot, BlendMode, BufferHandle, BufferKind, DeviceError, GraphicsDevice,
        ShaderKind, TextureData, TextureHandle, UniformSlot, VertexArrayDesc,
        VertexArrayHandle,
    },
    pipelines::basic::{mk_scene_pipeline, PipelineKey},
};

#[derive(Debug)]
pub struct Context {
    pub(crate) window: Arc<Window>,
    pub(crate) depth_texture: Texture,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    is_surface_configured: bool,
}

impl Context {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();

        // The instance is a handle to our GPU
        // BackendBit::PRIMARY => Vulkan + Metal + DX12 + Browser WebGPU
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features, so if
                // we're building for the web we'll have to disable some.
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
                ..Default::default()
            })
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        // The shaders output linear colour and rely on an sRGB surface.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow::anyhow!("surface supports no texture format"))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let depth_texture = Texture::depth(&device, config.width, config.height);

        let mut ctx = Self {
            window,
            depth_texture,
            surface,
            device,
            queue,
            config,
            is_surface_configured: false,
        };
        ctx.resize(size.width, size.height);
        Ok(ctx)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.is_surface_configured = true;
            self.surface.configure(&self.device, &self.config);
            self.depth_texture = Texture::depth(&self.device, width, height);
        }
    }
}

#[derive(Debug)]
struct GpuBuffer {
    buffer: wgpu::Buffer,
    kind: BufferKind,
    /// Size as seen by the engine, before widening or padding.
    size: usize,
    uniform_group: Option<wgpu::BindGroup>,
}

#[derive(Debug)]
struct GpuVertexArray {
    /// Indexed by [`AttributeSlot::location`]. Missing streams are zero filled.
    vertex_buffers: Vec<wgpu::Buffer>,
    index: Option<(wgpu::Buffer, wgpu::IndexFormat)>,
}

#[derive(Debug)]
struct GpuTexture {
    bind_group: wgpu::BindGroup,
}

#[derive(Clone, Copy, Debug)]
struct DrawCall {
    key: PipelineKey,
    camera: BufferHandle,
    lighting: BufferHandle,
    material: BufferHandle,
    object: BufferHandle,
    texture: Option<TextureHandle>,
    vertex_array: VertexArrayHandle,
    count: u32,
}

#[derive(Debug)]
struct Frame {
    clear_color: wgpu::Color,
    draws: Vec<DrawCall>,
}

fn index_format(index_type: IndexType) -> wgpu::IndexFormat {
    match index_type {
        // WebGPU has no 8 bit indices, they are widened on upload
        IndexType::U8 | IndexType::U16 => wgpu::IndexFormat::Uint16,
        IndexType::U32 => wgpu::IndexFormat::Uint32,
    }
}

fn widen_u8(bytes: &[u8]) -> Vec<u8> {
    let wide: Vec<u16> = bytes.iter().map(|b| *b as u16).collect();
    bytemuck::cast_slice(&wide).to_vec()
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub struct WgpuDevice {
    ctx: Context,
    buffers: SlotMap<BufferHandle, GpuBuffer>,
    vertex_arrays: SlotMap<VertexArrayHandle, GpuVertexArray>,
    textures: SlotMap<TextureHandle, GpuTexture>,
    uniform_layout: wgpu::BindGroupLayout,
    frame_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    frame_groups: HashMap<(BufferHandle, BufferHandle), wgpu::BindGroup>,
    fallback_texture: wgpu::BindGroup,
    shader: ShaderKind,
    blend: BlendMode,
    depth_test: bool,
    depth_write: bool,
    uniforms: [Option<BufferHandle>; UniformSlot::COUNT],
    base_color: Option<TextureHandle>,
    frame: Option<Frame>,
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("buffers", &self.buffers.len())
            .field("vertex_arrays", &self.vertex_arrays.len())
            .field("textures", &self.textures.len())
            .field("pipelines", &self.pipelines.len())
            .finish()
    }
}

impl WgpuDevice {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let ctx = Context::new(window).await?;
        let device = &ctx.device;

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[uniform_entry(0)],
            label: Some("uniform_bind_group_layout"),
        });
        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[uniform_entry(0), uniform_entry(1)],
            label: Some("frame_bind_group_layout"),
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
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
            label: Some("texture_bind_group_layout"),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render Pipeline Layout"),
            bind_group_layouts: &[
                Some(&frame_layout),
                Some(&uniform_layout),
                Some(&uniform_layout),
                Some(&texture_layout),
            ],
            immediate_size: 0,
        });

        let white = Texture::solid(device, &ctx.queue, [255; 4], "fallback texture");
        let fallback_texture = texture_bind_group(device, &texture_layout, &white, "fallback");

        log::info!("wgpu device ready ({:?})", ctx.config.format);
        Ok(Self {
            ctx,
            buffers: SlotMap::with_key(),
            vertex_arrays: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            uniform_layout,
            frame_layout,
            texture_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
            frame_groups: HashMap::new(),
            fallback_texture,
            shader: ShaderKind::Pbr,
            blend: BlendMode::Disabled,
            depth_test: true,
            depth_write: true,
            uniforms: [None; UniformSlot::COUNT],
            base_color: None,
            frame: None,
        })
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    fn bound(&self, slot: UniformSlot) -> Result<BufferHandle, DeviceError> {
        self.uniforms[slot.index()].ok_or(DeviceError::MissingBinding(slot))
    }

    /// Builds pipelines and frame bind groups the recorded draws need.
    fn prepare(&mut self, draws: &[DrawCall]) -> Result<(), DeviceError> {
        for draw in draws {
            if !self.pipelines.contains_key(&draw.key) {
                log::debug!("Creating pipeline {:?}", draw.key);
                let pipeline = mk_scene_pipeline(
                    &self.ctx.device,
                    &self.pipeline_layout,
                    self.ctx.config.format,
                    &draw.key,
                );
                self.pipelines.insert(draw.key, pipeline);
            }
            let key = (draw.camera, draw.lighting);
            if !self.frame_groups.contains_key(&key) {
                let camera = self
                    .buffers
                    .get(draw.camera)
                    .ok_or(DeviceError::UnknownBuffer(draw.camera))?;
                let lighting = self
                    .buffers
                    .get(draw.lighting)
                    .ok_or(DeviceError::UnknownBuffer(draw.lighting))?;
                let group = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    layout: &self.frame_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: camera.buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: lighting.buffer.as_entire_binding(),
                        },
                    ],
                    label: Some("frame_bind_group"),
                });
                self.frame_groups.insert(key, group);
            }
        }
        Ok(())
    }
}

fn texture_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    texture: &Texture,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&texture.sampler),
            },
        ],
        label: Some(label),
    })
}

impl GraphicsDevice for WgpuDevice {
    fn create_buffer(&mut self, kind: BufferKind, label: &str, contents: &[u8]) -> BufferHandle {
        let (usage, bytes) = match kind {
            BufferKind::Vertex => (wgpu::BufferUsages::VERTEX, contents.to_vec()),
            BufferKind::Index(IndexType::U8) => (wgpu::BufferUsages::INDEX, widen_u8(contents)),
            BufferKind::Index(_) => (wgpu::BufferUsages::INDEX, contents.to_vec()),
            BufferKind::Uniform => {
                // uniform structs are sized in multiples of 16 bytes
                let mut padded = contents.to_vec();
                padded.resize(contents.len().div_ceil(16).max(1) * 16, 0);
                (wgpu::BufferUsages::UNIFORM, padded)
            }
        };
        let buffer = self
            .ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: &bytes,
                usage: usage | wgpu::BufferUsages::COPY_DST,
            });
        let uniform_group = (kind == BufferKind::Uniform).then(|| {
            self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &self.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
                label: Some(label),
            })
        });
        self.buffers.insert(GpuBuffer {
            buffer,
            kind,
            size: contents.len(),
            uniform_group,
        })
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: usize,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let stored = self
            .buffers
            .get(buffer)
            .ok_or(DeviceError::UnknownBuffer(buffer))?;
        if offset + data.len() > stored.size {
            return Err(DeviceError::OutOfRange {
                offset,
                len: data.len(),
                size: stored.size,
            });
        }
        let (offset, bytes) = match stored.kind {
            BufferKind::Index(IndexType::U8) => (offset * 2, widen_u8(data)),
            _ => (offset, data.to_vec()),
        };
        if offset % 4 != 0 || bytes.len() % 4 != 0 {
            return Err(DeviceError::Unaligned {
                offset,
                len: bytes.len(),
            });
        }
        self.ctx
            .queue
            .write_buffer(&stored.buffer, offset as wgpu::BufferAddress, &bytes);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<(), DeviceError> {
        self.buffers
            .remove(buffer)
            .ok_or(DeviceError::UnknownBuffer(buffer))?;
        self.frame_groups
            .retain(|(camera, lighting), _| *camera != buffer && *lighting != buffer);
        for bound in self.uniforms.iter_mut() {
            if *bound == Some(buffer) {
                *bound = None;
            }
        }
        Ok(())
    }

    fn create_vertex_array(
        &mut self,
        desc: &VertexArrayDesc,
    ) -> Result<VertexArrayHandle, DeviceError> {
        let mut vertex_buffers = Vec::with_capacity(AttributeSlot::ALL.len());
        for slot in AttributeSlot::ALL {
            let stream = desc
                .attributes
                .iter()
                .find(|(attribute, _)| *attribute == slot)
                .map(|(_, handle)| {
                    self.buffers
                        .get(*handle)
                        .map(|b| b.buffer.clone())
                        .ok_or(DeviceError::UnknownBuffer(*handle))
                })
                .transpose()?;
            let buffer = match stream {
                Some(buffer) => buffer,
                None => {
                    let size = desc.vertex_count.max(1) as usize * slot.components() as usize * 4;
                    self.ctx
                        .device
                        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("Empty Vertex Stream"),
                            contents: &vec![0u8; size],
                            usage: wgpu::BufferUsages::VERTEX,
                        })
                }
            };
            vertex_buffers.push(buffer);
        }
        let index = match desc.index {
            Some((handle, index_type)) => {
                let stored = self
                    .buffers
                    .get(handle)
                    .ok_or(DeviceError::UnknownBuffer(handle))?;
                Some((stored.buffer.clone(), index_format(index_type)))
            }
            None => None,
        };
        Ok(self.vertex_arrays.insert(GpuVertexArray {
            vertex_buffers,
            index,
        }))
    }

    fn destroy_vertex_array(
        &mut self,
        vertex_array: VertexArrayHandle,
    ) -> Result<(), DeviceError> {
        self.vertex_arrays
            .remove(vertex_array)
            .map(|_| ())
            .ok_or(DeviceError::UnknownVertexArray(vertex_array))
    }

    fn create_texture(
        &mut self,
        label: &str,
        data: &TextureData,
    ) -> Result<TextureHandle, DeviceError> {
        if data.rgba.len() != data.expected_len() {
            return Err(DeviceError::TextureSize {
                expected: data.expected_len(),
                actual: data.rgba.len(),
            });
        }
        let texture = Texture::upload(&self.ctx.device, &self.ctx.queue, data, label);
        let bind_group = texture_bind_group(&self.ctx.device, &self.texture_layout, &texture, label);
        Ok(self.textures.insert(GpuTexture { bind_group }))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) -> Result<(), DeviceError> {
        self.textures
            .remove(texture)
            .ok_or(DeviceError::UnknownTexture(texture))?;
        if self.base_color == Some(texture) {
            self.base_color = None;
        }
        Ok(())
    }

    fn use_shader(&mut self, shader: ShaderKind) {
        self.shader = shader;
    }

    fn bind_uniform_buffer(
        &mut self,
        slot: UniformSlot,
        buffer: BufferHandle,
    ) -> Result<(), DeviceError> {
        if !self.buffers.contains_key(buffer) {
            return Err(DeviceError::UnknownBuffer(buffer));
        }
        self.uniforms[slot.index()] = Some(buffer);
        Ok(())
    }

    fn bind_texture(
        &mut self,
        slot: TextureSlot,
        texture: Option<TextureHandle>,
    ) -> Result<(), DeviceError> {
        if let Some(texture) = texture {
            if !self.textures.contains_key(texture) {
                return Err(DeviceError::UnknownTexture(texture));
            }
        }
        if slot == TextureSlot::BaseColor {
            self.base_color = texture;
        }
        Ok(())
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.depth_write = enabled;
    }

    fn set_blend(&mut self, mode: BlendMode) {
        self.blend = mode;
    }

    fn draw_indexed(
        &mut self,
        vertex_array: VertexArrayHandle,
        topology: Topology,
        index_type: IndexType,
        count: u32,
    ) -> Result<(), DeviceError> {
        if !self.vertex_arrays.contains_key(vertex_array) {
            return Err(DeviceError::UnknownVertexArray(vertex_array));
        }
        let call = DrawCall {
            key: PipelineKey {
                shader: self.shader,
                blend: self.blend,
                depth_test: self.depth_test,
                depth_write: self.depth_write,
                topology,
                strip_index_format: matches!(topology, Topology::LineStrip | Topology::TriangleStrip)
                    .then(|| index_format(index_type)),
            },
            camera: self.bound(UniformSlot::Camera)?,
            lighting: self.bound(UniformSlot::Lighting)?,
            material: self.bound(UniformSlot::Material)?,
            object: self.bound(UniformSlot::Object)?,
            texture: self.base_color,
            vertex_array,
            count,
        };
        let frame = self.frame.as_mut().ok_or(DeviceError::NoFrame)?;
        frame.draws.push(call);
        Ok(())
    }

    fn begin_frame(&mut self, clear_color: [f64; 4]) -> Result<(), DeviceError> {
        let [r, g, b, a] = clear_color;
        self.frame = Some(Frame {
            clear_color: wgpu::Color { r, g, b, a },
            draws: Vec::new(),
        });
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), DeviceError> {
        let frame = self.frame.take().ok_or(DeviceError::NoFrame)?;
        // Rendering requires the surface to be configured
        if !self.ctx.is_surface_configured {
            return Ok(());
        }
        let output = match self.ctx.surface.get_current_texture() {
            wgpu::CurrentSurfaceTexture::Success(output)
            | wgpu::CurrentSurfaceTexture::Suboptimal(output) => output,
            // Reconfigure the surface if it's lost or outdated
            wgpu::CurrentSurfaceTexture::Lost | wgpu::CurrentSurfaceTexture::Outdated => {
                let size = self.ctx.window.inner_size();
                self.ctx.resize(size.width, size.height);
                return Err(DeviceError::Surface("surface lost, reconfigured".to_string()));
            }
            e => return Err(DeviceError::Surface(format!("{e:?}"))),
        };
        self.prepare(&frame.draws)?;

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(frame.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.ctx.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
                multiview_mask: None,
            });

            for draw in &frame.draws {
                let (Some(pipeline), Some(frame_group), Some(vertex_array)) = (
                    self.pipelines.get(&draw.key),
                    self.frame_groups.get(&(draw.camera, draw.lighting)),
                    self.vertex_arrays.get(draw.vertex_array),
                ) else {
                    continue;
                };
                let material = self
                    .buffers
                    .get(draw.material)
                    .and_then(|b| b.uniform_group.as_ref());
                let object = self
                    .buffers
                    .get(draw.object)
                    .and_then(|b| b.uniform_group.as_ref());
                let (Some(material), Some(object), Some((index, format))) =
                    (material, object, vertex_array.index.as_ref())
                else {
                    log::warn!("Skipping a draw whose buffers were destroyed mid-frame");
                    continue;
                };
                let texture = draw
                    .texture
                    .and_then(|t| self.textures.get(t))
                    .map(|t| &t.bind_group)
                    .unwrap_or(&self.fallback_texture);

                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, frame_group, &[]);
                render_pass.set_bind_group(1, material, &[]);
                render_pass.set_bind_group(2, object, &[]);
                render_pass.set_bind_group(3, texture, &[]);
                for (slot, buffer) in vertex_array.vertex_buffers.iter().enumerate() {
                    render_pass.set_vertex_buffer(slot as u32, buffer.slice(..));
                }
                render_pass.set_index_buffer(index.slice(..), *format);
                render_pass.draw_indexed(0..draw.count, 0, 0..1);
            }
        }
        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.ctx.resize(width, height);
    }
}
