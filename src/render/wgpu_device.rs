//! [`GpuDevice`] backed by wgpu.
//!
//! Object handles index into per-kind tables. Compute-program uniforms are
//! written into a CPU copy of the scene block and flushed to the GPU buffer
//! just before each dispatch. Compute passes accumulate in a pending encoder
//! that [`Barrier::ShaderImageAccess`] submits, which orders the image writes
//! before any later draw sampling that image.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::error::GpuError;

use super::device::{
    Barrier, BufferDescriptor, BufferId, BufferKind, DeviceLimits, FilterMode, GpuDevice,
    ImageDescriptor, ImageFormat, ImageId, ProgramId, Resource, ShaderId, ShaderStage,
    UniformHandle, UniformValue, VertexArrayId, VertexAttribute, WorkGroups, WrapMode,
};
use super::layout::{SceneLayout, UniformSlot};
use super::present::{OUTPUT_TEXTURE_UNIT, TRANSFORM_SLOT, TransformBlock};
use super::Viewport;

const COMPUTE_ENTRY: &str = "main";
const VERTEX_ENTRY: &str = "vs_main";
const FRAGMENT_ENTRY: &str = "fs_main";

struct Image {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

struct Shader {
    stage: ShaderStage,
    module: wgpu::ShaderModule,
}

struct ComputeProgram {
    pipeline: wgpu::ComputePipeline,
    bind_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    staging: Vec<u8>,
    slots: Vec<UniformSlot>,
    names: HashMap<String, u32>,
    dirty: bool,
}

struct RenderProgram {
    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
}

enum Program {
    Compute(ComputeProgram),
    Render(RenderProgram),
}

#[derive(Default)]
struct ObjectTable {
    next_id: u32,
    images: HashMap<ImageId, Image>,
    shaders: HashMap<ShaderId, Shader>,
    programs: HashMap<ProgramId, Program>,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    vertex_arrays: HashMap<VertexArrayId, Vec<VertexAttribute>>,
}

impl ObjectTable {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default, Clone)]
struct DrawState {
    program: Option<ProgramId>,
    textures: HashMap<u32, ImageId>,
    uniform_buffers: HashMap<u32, BufferId>,
    vertex_array: Option<VertexArrayId>,
}

/// wgpu device, queue and window surface.
pub struct WgpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: Mutex<wgpu::SurfaceConfiguration>,
    limits: DeviceLimits,
    max_texture_dimension: u32,
    objects: Mutex<ObjectTable>,
    draw_state: Mutex<DrawState>,
    pending: Mutex<Option<wgpu::CommandEncoder>>,
    frame: Mutex<Option<wgpu::SurfaceTexture>>,
    fatal: Mutex<Option<wgpu::SurfaceError>>,
    window: Arc<Window>,
}

impl WgpuDevice {
    /// Creates a device presenting to `window`. `vsync` selects FIFO
    /// presentation; otherwise mailbox or immediate is preferred.
    pub async fn new(window: Arc<Window>, vsync: bool) -> Result<Self, GpuError> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(GpuError::ResourceCreation {
                what: "surface",
                reason: "window has zero area".to_string(),
            });
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;
        let adapter_info = adapter.get_info();
        info!(
            "using {} ({:?} backend)",
            adapter_info.name, adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("raytracer-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: Default::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let Some(&first_format) = surface_caps.formats.first() else {
            return Err(GpuError::ResourceCreation {
                what: "surface",
                reason: "adapter reports no surface formats".to_string(),
            });
        };
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .unwrap_or(first_format);
        let present_mode = if vsync {
            wgpu::PresentMode::Fifo
        } else {
            surface_caps
                .present_modes
                .iter()
                .copied()
                .find(|mode| {
                    matches!(
                        mode,
                        wgpu::PresentMode::Mailbox | wgpu::PresentMode::Immediate
                    )
                })
                .unwrap_or(wgpu::PresentMode::Fifo)
        };
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);
        debug!(
            "surface configured: {}x{} {:?} {:?}",
            config.width, config.height, config.format, config.present_mode
        );

        let device_limits = device.limits();
        let limits = DeviceLimits {
            max_workgroup_count: [device_limits.max_compute_workgroups_per_dimension; 3],
            max_workgroup_size: [
                device_limits.max_compute_workgroup_size_x,
                device_limits.max_compute_workgroup_size_y,
                device_limits.max_compute_workgroup_size_z,
            ],
            max_workgroup_invocations: device_limits.max_compute_invocations_per_workgroup,
            max_uniform_block_size: device_limits.max_uniform_buffer_binding_size,
        };

        Ok(Self {
            surface,
            device,
            queue,
            config: Mutex::new(config),
            limits,
            max_texture_dimension: device_limits.max_texture_dimension_2d,
            objects: Mutex::new(ObjectTable::default()),
            draw_state: Mutex::new(DrawState::default()),
            pending: Mutex::new(None),
            frame: Mutex::new(None),
            fatal: Mutex::new(None),
            window,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Current surface size.
    pub fn viewport(&self) -> Viewport {
        let config = self.config.lock();
        Viewport::new(config.width, config.height)
    }

    /// Presents the frame drawn since the last call, if any.
    ///
    /// Lost or outdated surfaces are reconfigured and the frame is dropped;
    /// running out of memory is returned as an error.
    pub fn present(&self) -> Result<(), GpuError> {
        if let Some(err) = self.fatal.lock().take() {
            return Err(err.into());
        }
        if let Some(frame) = self.frame.lock().take() {
            self.window.pre_present_notify();
            frame.present();
        }
        Ok(())
    }

    fn scoped<T>(&self, create: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create();
        let error = pollster::block_on(self.device.pop_error_scope());
        (value, error)
    }

    fn reconfigure(&self) {
        let config = self.config.lock();
        self.surface.configure(&self.device, &config);
    }

    fn acquire_frame(&self) -> Option<wgpu::TextureView> {
        let mut frame = self.frame.lock();
        if frame.is_none() {
            match self.surface.get_current_texture() {
                Ok(texture) => *frame = Some(texture),
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    debug!("surface lost or outdated, reconfiguring");
                    self.reconfigure();
                    return None;
                }
                Err(wgpu::SurfaceError::OutOfMemory) => {
                    *self.fatal.lock() = Some(wgpu::SurfaceError::OutOfMemory);
                    return None;
                }
                Err(err) => {
                    warn!("skipping frame: {err}");
                    return None;
                }
            }
        }
        frame.as_ref().map(|frame| {
            frame
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default())
        })
    }

    fn link_compute(&self, module: &wgpu::ShaderModule) -> ComputeProgram {
        let bind_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("raytracer-bind-layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::StorageTexture {
                            access: wgpu::StorageTextureAccess::WriteOnly,
                            format: wgpu::TextureFormat::Rgba32Float,
                            view_dimension: wgpu::TextureViewDimension::D2,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: NonZeroU64::new(SceneLayout::SIZE as u64),
                        },
                        count: None,
                    },
                ],
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("raytracer-pipeline-layout"),
                bind_group_layouts: &[&bind_layout],
                push_constant_ranges: &[],
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("raytracer-pipeline"),
                layout: Some(&pipeline_layout),
                module,
                entry_point: Some(COMPUTE_ENTRY),
                compilation_options: Default::default(),
                cache: None,
            });
        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene-uniform"),
            size: SceneLayout::SIZE as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let reflected = SceneLayout::reflect();
        let mut names = HashMap::with_capacity(reflected.len());
        let mut slots = Vec::with_capacity(reflected.len());
        for (index, (name, slot)) in reflected.into_iter().enumerate() {
            names.insert(name, index as u32);
            slots.push(slot);
        }

        ComputeProgram {
            pipeline,
            bind_layout,
            uniform_buffer,
            staging: vec![0; SceneLayout::SIZE],
            slots,
            names,
            dirty: true,
        }
    }

    fn link_render(
        &self,
        vertex: &wgpu::ShaderModule,
        fragment: &wgpu::ShaderModule,
    ) -> RenderProgram {
        let bind_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("quad-bind-layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: NonZeroU64::new(
                                std::mem::size_of::<TransformBlock>() as u64,
                            ),
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                        count: None,
                    },
                ],
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("quad-pipeline-layout"),
                bind_group_layouts: &[&bind_layout],
                push_constant_ranges: &[],
            });
        let format = self.config.lock().format;
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("quad-pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: vertex,
                    entry_point: Some(VERTEX_ENTRY),
                    compilation_options: Default::default(),
                    buffers: &[
                        wgpu::VertexBufferLayout {
                            array_stride: (3 * std::mem::size_of::<f32>()) as u64,
                            step_mode: wgpu::VertexStepMode::Vertex,
                            attributes: &[wgpu::VertexAttribute {
                                format: wgpu::VertexFormat::Float32x3,
                                offset: 0,
                                shader_location: 0,
                            }],
                        },
                        wgpu::VertexBufferLayout {
                            array_stride: (2 * std::mem::size_of::<f32>()) as u64,
                            step_mode: wgpu::VertexStepMode::Vertex,
                            attributes: &[wgpu::VertexAttribute {
                                format: wgpu::VertexFormat::Float32x2,
                                offset: 0,
                                shader_location: 1,
                            }],
                        },
                    ],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: fragment,
                    entry_point: Some(FRAGMENT_ENTRY),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            });
        RenderProgram {
            pipeline,
            bind_layout,
        }
    }
}

fn texture_format(format: ImageFormat) -> wgpu::TextureFormat {
    match format {
        ImageFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
    }
}

fn address_mode(wrap: WrapMode) -> wgpu::AddressMode {
    match wrap {
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

fn filter_mode(filter: FilterMode) -> wgpu::FilterMode {
    match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
    }
}

impl GpuDevice for WgpuDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_image(&self, desc: &ImageDescriptor) -> Result<ImageId, GpuError> {
        if desc.width == 0
            || desc.height == 0
            || desc.width > self.max_texture_dimension
            || desc.height > self.max_texture_dimension
        {
            return Err(GpuError::ResourceCreation {
                what: "image",
                reason: format!(
                    "{}x{} is outside 1..={} texels per side",
                    desc.width, desc.height, self.max_texture_dimension
                ),
            });
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_levels.max(1),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(desc.format),
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let address = address_mode(desc.wrap);
        let filter = filter_mode(desc.filter);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(desc.label),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: filter,
            ..Default::default()
        });

        let mut objects = self.objects.lock();
        let image = ImageId(objects.next_id());
        objects.images.insert(
            image,
            Image {
                _texture: texture,
                view,
                sampler,
            },
        );
        Ok(image)
    }

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<ShaderId, GpuError> {
        let (module, error) = self.scoped(|| {
            self.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(match stage {
                        ShaderStage::Compute => "raytracer-shader",
                        ShaderStage::Vertex => "quad-vertex-shader",
                        ShaderStage::Fragment => "quad-fragment-shader",
                    }),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                })
        });
        if let Some(error) = error {
            return Err(GpuError::ShaderCompilation {
                stage,
                log: error.to_string(),
            });
        }
        let mut objects = self.objects.lock();
        let shader = ShaderId(objects.next_id());
        objects.shaders.insert(shader, Shader { stage, module });
        Ok(shader)
    }

    fn link_program(&self, shaders: &[ShaderId]) -> Result<ProgramId, GpuError> {
        let mut objects = self.objects.lock();
        let mut modules = Vec::with_capacity(shaders.len());
        for id in shaders {
            let Some(shader) = objects.shaders.get(id) else {
                return Err(GpuError::ProgramLink {
                    log: format!("shader {} does not exist", id.raw()),
                });
            };
            modules.push(shader);
        }

        let find = |stage: ShaderStage| modules.iter().find(|shader| shader.stage == stage);
        let (program, error) = match (
            find(ShaderStage::Compute),
            find(ShaderStage::Vertex),
            find(ShaderStage::Fragment),
        ) {
            (Some(compute), None, None) if modules.len() == 1 => {
                let (program, error) = self.scoped(|| self.link_compute(&compute.module));
                (Program::Compute(program), error)
            }
            (None, Some(vertex), Some(fragment)) if modules.len() == 2 => {
                let (program, error) =
                    self.scoped(|| self.link_render(&vertex.module, &fragment.module));
                (Program::Render(program), error)
            }
            _ => {
                let stages: Vec<String> = modules.iter().map(|shader| shader.stage.to_string()).collect();
                return Err(GpuError::ProgramLink {
                    log: format!(
                        "expected one compute shader or a vertex/fragment pair, got [{}]",
                        stages.join(", ")
                    ),
                });
            }
        };
        if let Some(error) = error {
            return Err(GpuError::ProgramLink {
                log: error.to_string(),
            });
        }

        let id = ProgramId(objects.next_id());
        objects.programs.insert(id, program);
        Ok(id)
    }

    fn create_buffer(&self, desc: &BufferDescriptor<'_>) -> Result<BufferId, GpuError> {
        let usage = match desc.kind {
            BufferKind::Uniform => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        };
        let buffer = match desc.contents {
            Some(contents) if contents.len() as u64 != desc.size => {
                return Err(GpuError::ResourceCreation {
                    what: "buffer",
                    reason: format!(
                        "{} holds {} bytes of initial data but is {} bytes long",
                        desc.label,
                        contents.len(),
                        desc.size
                    ),
                });
            }
            Some(contents) => self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(desc.label),
                    contents,
                    usage,
                }),
            None => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(desc.label),
                size: desc.size,
                usage,
                mapped_at_creation: false,
            }),
        };
        let mut objects = self.objects.lock();
        let id = BufferId(objects.next_id());
        objects.buffers.insert(id, buffer);
        Ok(id)
    }

    fn create_vertex_array(
        &self,
        attributes: &[VertexAttribute],
    ) -> Result<VertexArrayId, GpuError> {
        let mut objects = self.objects.lock();
        if let Some(missing) = attributes
            .iter()
            .find(|attribute| !objects.buffers.contains_key(&attribute.buffer))
        {
            return Err(GpuError::ResourceCreation {
                what: "vertex array",
                reason: format!("buffer {} does not exist", missing.buffer.raw()),
            });
        }
        let id = VertexArrayId(objects.next_id());
        objects.vertex_arrays.insert(id, attributes.to_vec());
        Ok(id)
    }

    fn destroy(&self, resource: Resource) {
        let mut objects = self.objects.lock();
        match resource {
            Resource::Image(id) => {
                objects.images.remove(&id);
            }
            Resource::Shader(id) => {
                objects.shaders.remove(&id);
            }
            Resource::Program(id) => {
                objects.programs.remove(&id);
            }
            Resource::Buffer(id) => {
                if let Some(buffer) = objects.buffers.remove(&id) {
                    buffer.destroy();
                }
            }
            Resource::VertexArray(id) => {
                objects.vertex_arrays.remove(&id);
            }
        }
    }

    fn resolve_uniform(&self, program: ProgramId, name: &str) -> UniformHandle {
        match self.objects.lock().programs.get(&program) {
            Some(Program::Compute(compute)) => compute
                .names
                .get(name)
                .map_or(UniformHandle::INVALID, |&index| UniformHandle(index)),
            _ => UniformHandle::INVALID,
        }
    }

    fn set_uniform(&self, program: ProgramId, handle: UniformHandle, value: UniformValue) {
        if !handle.is_valid() {
            return;
        }
        let mut objects = self.objects.lock();
        let Some(Program::Compute(compute)) = objects.programs.get_mut(&program) else {
            return;
        };
        let Some(slot) = compute.slots.get(handle.0 as usize).copied() else {
            return;
        };
        if slot.kind != value.kind() {
            warn!(
                "uniform write of {:?} into {:?} slot ignored",
                value.kind(),
                slot.kind
            );
            return;
        }
        value.write_to(&mut compute.staging[slot.offset..slot.offset + slot.kind.size()]);
        compute.dirty = true;
    }

    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) {
        if let Some(buffer) = self.objects.lock().buffers.get(&buffer) {
            self.queue.write_buffer(buffer, offset, data);
        }
    }

    fn dispatch_compute(&self, program: ProgramId, target: ImageId, groups: WorkGroups) {
        let mut objects = self.objects.lock();
        let ObjectTable {
            images, programs, ..
        } = &mut *objects;
        let (Some(Program::Compute(compute)), Some(image)) =
            (programs.get_mut(&program), images.get(&target))
        else {
            warn!(
                "dispatch skipped: program {} or image {} is not a live compute target",
                program.raw(),
                target.raw()
            );
            return;
        };

        if compute.dirty {
            self.queue
                .write_buffer(&compute.uniform_buffer, 0, &compute.staging);
            compute.dirty = false;
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("raytracer-bind-group"),
            layout: &compute.bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&image.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: compute.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let mut pending = self.pending.lock();
        let encoder = pending.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("raytracer-encoder"),
                })
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("raytracer-pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&compute.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(groups.x, groups.y, groups.z);
    }

    fn memory_barrier(&self, barrier: Barrier) {
        match barrier {
            Barrier::ShaderImageAccess => {
                if let Some(encoder) = self.pending.lock().take() {
                    self.queue.submit(std::iter::once(encoder.finish()));
                }
            }
        }
    }

    fn bind_program(&self, program: ProgramId) {
        self.draw_state.lock().program = Some(program);
    }

    fn unbind_program(&self) {
        self.draw_state.lock().program = None;
    }

    fn bind_texture(&self, unit: u32, image: ImageId) {
        self.draw_state.lock().textures.insert(unit, image);
    }

    fn unbind_texture(&self, unit: u32) {
        self.draw_state.lock().textures.remove(&unit);
    }

    fn bind_uniform_buffer(&self, slot: u32, buffer: BufferId) {
        self.draw_state.lock().uniform_buffers.insert(slot, buffer);
    }

    fn unbind_uniform_buffer(&self, slot: u32) {
        self.draw_state.lock().uniform_buffers.remove(&slot);
    }

    fn bind_vertex_array(&self, vertex_array: VertexArrayId) {
        self.draw_state.lock().vertex_array = Some(vertex_array);
    }

    fn unbind_vertex_array(&self) {
        self.draw_state.lock().vertex_array = None;
    }

    fn draw_triangles(&self, vertex_count: u32) {
        let state = self.draw_state.lock().clone();
        let objects = self.objects.lock();

        let program = state
            .program
            .and_then(|id| match objects.programs.get(&id) {
                Some(Program::Render(render)) => Some(render),
                _ => None,
            });
        let image = state
            .textures
            .get(&OUTPUT_TEXTURE_UNIT)
            .and_then(|id| objects.images.get(id));
        let transforms = state
            .uniform_buffers
            .get(&TRANSFORM_SLOT)
            .and_then(|id| objects.buffers.get(id));
        let attributes = state
            .vertex_array
            .and_then(|id| objects.vertex_arrays.get(&id));
        let (Some(program), Some(image), Some(transforms), Some(attributes)) =
            (program, image, transforms, attributes)
        else {
            warn!("draw skipped: incomplete bindings");
            return;
        };

        let Some(view) = self.acquire_frame() else {
            return;
        };
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("quad-bind-group"),
            layout: &program.bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: transforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&image.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&image.sampler),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("quad-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("quad-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            for attribute in attributes {
                if let Some(buffer) = objects.buffers.get(&attribute.buffer) {
                    pass.set_vertex_buffer(attribute.location, buffer.slice(..));
                }
            }
            pass.draw(0..vertex_count, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}
