//! Handle-based GPU seam.
//!
//! Stages talk to the GPU exclusively through [`GpuDevice`]. Objects are
//! addressed by small copyable handles; ownership of those handles lives in
//! [`Owned`](super::resource::Owned) wrappers. The real backend is
//! [`WgpuDevice`](super::WgpuDevice); tests use
//! `RecordingDevice` (behind the `test-support` feature).

use std::fmt;

use crate::error::GpuError;

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

gpu_handle!(
    /// A 2D image usable as a compute write target and as a sampled texture.
    ImageId
);
gpu_handle!(ShaderId);
gpu_handle!(ProgramId);
gpu_handle!(BufferId);
gpu_handle!(
    /// A vertex-input configuration binding buffers to attribute locations.
    VertexArrayId
);

/// Any GPU object a device can destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Image(ImageId),
    Shader(ShaderId),
    Program(ProgramId),
    Buffer(BufferId),
    VertexArray(VertexArrayId),
}

macro_rules! into_resource {
    ($($handle:ident => $variant:ident),* $(,)?) => {
        $(impl From<$handle> for Resource {
            fn from(handle: $handle) -> Self {
                Resource::$variant(handle)
            }
        })*
    };
}

into_resource!(
    ImageId => Image,
    ShaderId => Shader,
    ProgramId => Program,
    BufferId => Buffer,
    VertexArrayId => VertexArray,
);

/// Opaque location of a uniform inside a linked program.
///
/// [`UniformHandle::INVALID`] is returned when the program has no active
/// uniform of that name, typically because the compiler eliminated it.
/// Writes through it are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformHandle(pub(crate) u32);

impl UniformHandle {
    pub const INVALID: Self = Self(u32::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

/// Value written to a single uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec3([f32; 3]),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::Vec3(_) => UniformKind::Vec3,
        }
    }

    /// Native-endian bytes as laid out in a uniform block.
    pub fn write_to(&self, out: &mut [u8]) {
        match self {
            UniformValue::Float(value) => out[..4].copy_from_slice(bytemuck::bytes_of(value)),
            UniformValue::Int(value) => out[..4].copy_from_slice(bytemuck::bytes_of(value)),
            UniformValue::Vec3(value) => out[..12].copy_from_slice(bytemuck::bytes_of(value)),
        }
    }
}

impl From<glam::Vec3> for UniformValue {
    fn from(value: glam::Vec3) -> Self {
        UniformValue::Vec3(value.to_array())
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Int,
    Vec3,
}

impl UniformKind {
    pub fn size(self) -> usize {
        match self {
            UniformKind::Float | UniformKind::Int => 4,
            UniformKind::Vec3 => 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Compute,
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Compute => "compute",
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Rgba32Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    ClampToEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub mip_levels: u32,
    pub wrap: WrapMode,
    pub filter: FilterMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Uniform,
    Vertex,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferDescriptor<'a> {
    pub label: &'static str,
    pub kind: BufferKind,
    pub size: u64,
    /// Initial contents; must be exactly `size` bytes when present.
    pub contents: Option<&'a [u8]>,
}

/// Binds one vertex buffer to a shader attribute location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub buffer: BufferId,
    /// Number of tightly packed `f32` components per vertex.
    pub components: u32,
}

/// Number of workgroups launched by one compute dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkGroups {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// Memory-visibility barriers the pipeline can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Barrier {
    /// Image writes of earlier dispatches become visible to every later
    /// image read or texture sample.
    ShaderImageAccess,
}

/// Compute capabilities reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_workgroup_count: [u32; 3],
    pub max_workgroup_size: [u32; 3],
    pub max_workgroup_invocations: u32,
    pub max_uniform_block_size: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_workgroup_count: [65_535; 3],
            max_workgroup_size: [256, 256, 64],
            max_workgroup_invocations: 256,
            max_uniform_block_size: 65_536,
        }
    }
}

/// GPU operations required by the compute and presentation stages.
///
/// Bind calls are stateful in the way a classic graphics API is: whatever is
/// bound when [`draw_triangles`](GpuDevice::draw_triangles) runs is used, and
/// stays bound until explicitly unbound.
pub trait GpuDevice {
    fn limits(&self) -> DeviceLimits;

    fn create_image(&self, desc: &ImageDescriptor) -> Result<ImageId, GpuError>;

    /// Compiles one shader stage. The error carries the compiler diagnostic.
    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<ShaderId, GpuError>;

    /// Links compiled shaders into a program. The error carries the linker diagnostic.
    fn link_program(&self, shaders: &[ShaderId]) -> Result<ProgramId, GpuError>;

    fn create_buffer(&self, desc: &BufferDescriptor<'_>) -> Result<BufferId, GpuError>;

    fn create_vertex_array(
        &self,
        attributes: &[VertexAttribute],
    ) -> Result<VertexArrayId, GpuError>;

    fn destroy(&self, resource: Resource);

    /// Looks up a uniform by its structured name, e.g. `spheres[3].radius`.
    fn resolve_uniform(&self, program: ProgramId, name: &str) -> UniformHandle;

    /// Writes a uniform of `program`. A no-op for [`UniformHandle::INVALID`].
    fn set_uniform(&self, program: ProgramId, handle: UniformHandle, value: UniformValue);

    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]);

    /// Runs `program` over `groups`, with `target` bound as its write-only output image.
    fn dispatch_compute(&self, program: ProgramId, target: ImageId, groups: WorkGroups);

    fn memory_barrier(&self, barrier: Barrier);

    fn bind_program(&self, program: ProgramId);
    fn unbind_program(&self);
    fn bind_texture(&self, unit: u32, image: ImageId);
    fn unbind_texture(&self, unit: u32);
    fn bind_uniform_buffer(&self, slot: u32, buffer: BufferId);
    fn unbind_uniform_buffer(&self, slot: u32);
    fn bind_vertex_array(&self, vertex_array: VertexArrayId);
    fn unbind_vertex_array(&self);

    /// Draws `vertex_count` vertices as a triangle list with the current bindings.
    fn draw_triangles(&self, vertex_count: u32);
}
