//! Instrumented [`GpuDevice`] that records every call instead of touching a GPU.
//!
//! Used by the test suite to check upload/dispatch/barrier/sample ordering,
//! capacity clamping and resource lifetimes without a graphics context.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::error::GpuError;

use super::device::{
    Barrier, BufferDescriptor, BufferId, BufferKind, DeviceLimits, GpuDevice, ImageDescriptor,
    ImageId, ProgramId, Resource, ShaderId, ShaderStage, UniformHandle, UniformValue,
    VertexArrayId, VertexAttribute, WorkGroups,
};
use super::layout::SceneLayout;

/// One observed device call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateImage { image: ImageId, desc: ImageDescriptor },
    CompileShader { shader: ShaderId, stage: ShaderStage },
    LinkProgram { program: ProgramId, shaders: Vec<ShaderId> },
    CreateBuffer { buffer: BufferId, kind: BufferKind, size: u64 },
    CreateVertexArray { vertex_array: VertexArrayId, attributes: Vec<VertexAttribute> },
    Destroy(Resource),
    SetUniform { program: ProgramId, name: String, value: UniformValue },
    WriteBuffer { buffer: BufferId, offset: u64, data: Vec<u8> },
    Dispatch { program: ProgramId, target: ImageId, groups: WorkGroups },
    MemoryBarrier(Barrier),
    BindProgram(ProgramId),
    UnbindProgram,
    BindTexture { unit: u32, image: ImageId },
    UnbindTexture { unit: u32 },
    BindUniformBuffer { slot: u32, buffer: BufferId },
    UnbindUniformBuffer { slot: u32 },
    BindVertexArray(VertexArrayId),
    UnbindVertexArray,
    Draw { vertex_count: u32 },
}

#[derive(Debug, Default)]
struct State {
    next_id: u32,
    calls: Vec<GpuCall>,
    live: HashSet<Resource>,
    shader_stages: HashMap<ShaderId, ShaderStage>,
    /// Uniform names exposed by each linked program, indexed by handle.
    program_uniforms: HashMap<ProgramId, Vec<String>>,
}

impl State {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Recording stand-in for a GPU.
///
/// Compute programs expose every name of the scene uniform block except those
/// registered with [`with_missing_uniform`](Self::with_missing_uniform);
/// vertex/fragment programs expose none.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    state: Mutex<State>,
    limits: DeviceLimits,
    missing_uniforms: HashSet<String>,
    compile_failure: Option<(ShaderStage, String)>,
    link_failure: Option<String>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a program whose compiler eliminated `name`.
    pub fn with_missing_uniform(mut self, name: impl Into<String>) -> Self {
        self.missing_uniforms.insert(name.into());
        self
    }

    /// Makes every compilation of `stage` fail with `log` as the diagnostic.
    pub fn with_compile_failure(mut self, stage: ShaderStage, log: impl Into<String>) -> Self {
        self.compile_failure = Some((stage, log.into()));
        self
    }

    /// Makes every link fail with `log` as the diagnostic.
    pub fn with_link_failure(mut self, log: impl Into<String>) -> Self {
        self.link_failure = Some(log.into());
        self
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Snapshot of every call recorded so far.
    pub fn calls(&self) -> Vec<GpuCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Objects created and not yet destroyed.
    pub fn live_resources(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn is_live(&self, resource: Resource) -> bool {
        self.state.lock().live.contains(&resource)
    }

    fn record(&self, call: GpuCall) {
        self.state.lock().calls.push(call);
    }
}

impl GpuDevice for RecordingDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_image(&self, desc: &ImageDescriptor) -> Result<ImageId, GpuError> {
        let mut state = self.state.lock();
        let image = ImageId(state.next_id());
        state.live.insert(image.into());
        state.calls.push(GpuCall::CreateImage { image, desc: *desc });
        Ok(image)
    }

    fn compile_shader(&self, stage: ShaderStage, _source: &str) -> Result<ShaderId, GpuError> {
        if let Some((failing, log)) = &self.compile_failure {
            if *failing == stage {
                return Err(GpuError::ShaderCompilation {
                    stage,
                    log: log.clone(),
                });
            }
        }
        let mut state = self.state.lock();
        let shader = ShaderId(state.next_id());
        state.live.insert(shader.into());
        state.shader_stages.insert(shader, stage);
        state.calls.push(GpuCall::CompileShader { shader, stage });
        Ok(shader)
    }

    fn link_program(&self, shaders: &[ShaderId]) -> Result<ProgramId, GpuError> {
        if let Some(log) = &self.link_failure {
            return Err(GpuError::ProgramLink { log: log.clone() });
        }
        let mut state = self.state.lock();
        let is_compute = shaders
            .iter()
            .any(|shader| state.shader_stages.get(shader) == Some(&ShaderStage::Compute));
        let uniforms = if is_compute {
            SceneLayout::reflect()
                .into_iter()
                .map(|(name, _)| name)
                .filter(|name| !self.missing_uniforms.contains(name))
                .collect()
        } else {
            Vec::new()
        };
        let program = ProgramId(state.next_id());
        state.live.insert(program.into());
        state.program_uniforms.insert(program, uniforms);
        state.calls.push(GpuCall::LinkProgram {
            program,
            shaders: shaders.to_vec(),
        });
        Ok(program)
    }

    fn create_buffer(&self, desc: &BufferDescriptor<'_>) -> Result<BufferId, GpuError> {
        let mut state = self.state.lock();
        let buffer = BufferId(state.next_id());
        state.live.insert(buffer.into());
        state.calls.push(GpuCall::CreateBuffer {
            buffer,
            kind: desc.kind,
            size: desc.size,
        });
        Ok(buffer)
    }

    fn create_vertex_array(
        &self,
        attributes: &[VertexAttribute],
    ) -> Result<VertexArrayId, GpuError> {
        let mut state = self.state.lock();
        let vertex_array = VertexArrayId(state.next_id());
        state.live.insert(vertex_array.into());
        state.calls.push(GpuCall::CreateVertexArray {
            vertex_array,
            attributes: attributes.to_vec(),
        });
        Ok(vertex_array)
    }

    fn destroy(&self, resource: Resource) {
        let mut state = self.state.lock();
        state.live.remove(&resource);
        if let Resource::Program(program) = resource {
            state.program_uniforms.remove(&program);
        }
        state.calls.push(GpuCall::Destroy(resource));
    }

    fn resolve_uniform(&self, program: ProgramId, name: &str) -> UniformHandle {
        let state = self.state.lock();
        state
            .program_uniforms
            .get(&program)
            .and_then(|names| names.iter().position(|candidate| candidate == name))
            .map_or(UniformHandle::INVALID, |index| UniformHandle(index as u32))
    }

    fn set_uniform(&self, program: ProgramId, handle: UniformHandle, value: UniformValue) {
        if !handle.is_valid() {
            return;
        }
        let mut state = self.state.lock();
        let Some(name) = state
            .program_uniforms
            .get(&program)
            .and_then(|names| names.get(handle.0 as usize))
            .cloned()
        else {
            return;
        };
        state.calls.push(GpuCall::SetUniform {
            program,
            name,
            value,
        });
    }

    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) {
        self.record(GpuCall::WriteBuffer {
            buffer,
            offset,
            data: data.to_vec(),
        });
    }

    fn dispatch_compute(&self, program: ProgramId, target: ImageId, groups: WorkGroups) {
        self.record(GpuCall::Dispatch {
            program,
            target,
            groups,
        });
    }

    fn memory_barrier(&self, barrier: Barrier) {
        self.record(GpuCall::MemoryBarrier(barrier));
    }

    fn bind_program(&self, program: ProgramId) {
        self.record(GpuCall::BindProgram(program));
    }

    fn unbind_program(&self) {
        self.record(GpuCall::UnbindProgram);
    }

    fn bind_texture(&self, unit: u32, image: ImageId) {
        self.record(GpuCall::BindTexture { unit, image });
    }

    fn unbind_texture(&self, unit: u32) {
        self.record(GpuCall::UnbindTexture { unit });
    }

    fn bind_uniform_buffer(&self, slot: u32, buffer: BufferId) {
        self.record(GpuCall::BindUniformBuffer { slot, buffer });
    }

    fn unbind_uniform_buffer(&self, slot: u32) {
        self.record(GpuCall::UnbindUniformBuffer { slot });
    }

    fn bind_vertex_array(&self, vertex_array: VertexArrayId) {
        self.record(GpuCall::BindVertexArray(vertex_array));
    }

    fn unbind_vertex_array(&self) {
        self.record(GpuCall::UnbindVertexArray);
    }

    fn draw_triangles(&self, vertex_count: u32) {
        self.record(GpuCall::Draw { vertex_count });
    }
}
