use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use log::debug;

use crate::error::PipelineError;

use super::device::{
    BufferDescriptor, BufferId, BufferKind, GpuDevice, ImageId, ProgramId, ShaderId, ShaderStage,
    VertexArrayId, VertexAttribute,
};
use super::resource::Owned;
use super::{expect_state, log_failure, StageState, Viewport};

/// Two triangles covering the unit square; scaled to the viewport by the
/// model matrix.
pub const QUAD_POSITIONS: [[f32; 3]; 6] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
];

pub const QUAD_TEX_COORDS: [[f32; 2]; 6] = [
    [0.0, 0.0],
    [1.0, 0.0],
    [0.0, 1.0],
    [0.0, 1.0],
    [1.0, 0.0],
    [1.0, 1.0],
];

pub const QUAD_VERTEX_COUNT: u32 = QUAD_POSITIONS.len() as u32;

pub const POSITION_LOCATION: u32 = 0;
pub const TEX_COORD_LOCATION: u32 = 1;
pub const TRANSFORM_SLOT: u32 = 0;
pub const OUTPUT_TEXTURE_UNIT: u32 = 0;

/// `Transforms` uniform block of the quad vertex shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TransformBlock {
    pub proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
}

impl TransformBlock {
    /// Pixel-space orthographic projection with the origin at the top-left,
    /// identity view, and a model matrix stretching the unit quad to the viewport.
    pub fn for_viewport(viewport: Viewport) -> Self {
        let (width, height) = (viewport.width as f32, viewport.height as f32);
        let proj = Mat4::orthographic_rh(0.0, width, height, 0.0, -1.0, 1.0);
        let model = Mat4::from_scale(Vec3::new(width, height, 1.0));
        Self {
            proj: proj.to_cols_array_2d(),
            view: Mat4::IDENTITY.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
        }
    }

    pub fn clip_from_object(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.proj)
            * Mat4::from_cols_array_2d(&self.view)
            * Mat4::from_cols_array_2d(&self.model)
    }
}

// Field order is release order.
struct PresentResources<D: GpuDevice + ?Sized> {
    uniform_buffer: Owned<D, BufferId>,
    vertex_array: Owned<D, VertexArrayId>,
    tex_coords: Owned<D, BufferId>,
    positions: Owned<D, BufferId>,
    program: Owned<D, ProgramId>,
    fragment_shader: Owned<D, ShaderId>,
    vertex_shader: Owned<D, ShaderId>,
    source_image: ImageId,
}

/// Draws the compute output image onto a full-viewport quad.
///
/// The source image is borrowed from the compute stage and never destroyed here.
pub struct PresentationStage<D: GpuDevice + ?Sized> {
    device: Arc<D>,
    viewport: Viewport,
    state: StageState,
    resources: Option<PresentResources<D>>,
}

impl<D: GpuDevice + ?Sized> PresentationStage<D> {
    const NAME: &'static str = "presentation";

    pub fn new(device: Arc<D>, viewport: Viewport) -> Self {
        Self {
            device,
            viewport,
            state: StageState::Uninitialized,
            resources: None,
        }
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn source_image(&self) -> Option<ImageId> {
        self.resources.as_ref().map(|resources| resources.source_image)
    }

    pub fn transform(&self) -> TransformBlock {
        TransformBlock::for_viewport(self.viewport)
    }

    pub fn initialize(
        &mut self,
        source_image: ImageId,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<(), PipelineError> {
        expect_state(Self::NAME, self.state, StageState::Uninitialized)?;
        let device = &self.device;

        let vertex_shader = Owned::new(
            device,
            device
                .compile_shader(ShaderStage::Vertex, vertex_source)
                .map_err(log_failure)?,
        );
        let fragment_shader = Owned::new(
            device,
            device
                .compile_shader(ShaderStage::Fragment, fragment_source)
                .map_err(log_failure)?,
        );
        let program = Owned::new(
            device,
            device
                .link_program(&[vertex_shader.handle(), fragment_shader.handle()])
                .map_err(log_failure)?,
        );

        let positions = Owned::new(
            device,
            device.create_buffer(&BufferDescriptor {
                label: "quad-positions",
                kind: BufferKind::Vertex,
                size: std::mem::size_of_val(&QUAD_POSITIONS) as u64,
                contents: Some(bytemuck::cast_slice(&QUAD_POSITIONS)),
            })?,
        );
        let tex_coords = Owned::new(
            device,
            device.create_buffer(&BufferDescriptor {
                label: "quad-tex-coords",
                kind: BufferKind::Vertex,
                size: std::mem::size_of_val(&QUAD_TEX_COORDS) as u64,
                contents: Some(bytemuck::cast_slice(&QUAD_TEX_COORDS)),
            })?,
        );
        let vertex_array = Owned::new(
            device,
            device.create_vertex_array(&[
                VertexAttribute {
                    location: POSITION_LOCATION,
                    buffer: positions.handle(),
                    components: 3,
                },
                VertexAttribute {
                    location: TEX_COORD_LOCATION,
                    buffer: tex_coords.handle(),
                    components: 2,
                },
            ])?,
        );
        let uniform_buffer = Owned::new(
            device,
            device.create_buffer(&BufferDescriptor {
                label: "quad-transforms",
                kind: BufferKind::Uniform,
                size: std::mem::size_of::<TransformBlock>() as u64,
                contents: None,
            })?,
        );

        debug!(
            "presentation stage ready: sampling image {} onto {}x{} quad",
            source_image.raw(),
            self.viewport.width,
            self.viewport.height
        );
        self.resources = Some(PresentResources {
            uniform_buffer,
            vertex_array,
            tex_coords,
            positions,
            program,
            fragment_shader,
            vertex_shader,
            source_image,
        });
        self.state = StageState::Ready;
        Ok(())
    }

    /// Uploads the transforms and draws the quad. Every binding made for the
    /// draw is undone before returning.
    pub fn render_frame(&mut self) -> Result<(), PipelineError> {
        expect_state(Self::NAME, self.state, StageState::Ready)?;
        let Some(resources) = self.resources.as_ref() else {
            return Err(PipelineError::InvalidState {
                stage: Self::NAME,
                state: self.state,
                expected: StageState::Ready,
            });
        };
        self.state = StageState::Dispatching;

        let transform = TransformBlock::for_viewport(self.viewport);
        self.device.write_buffer(
            resources.uniform_buffer.handle(),
            0,
            bytemuck::bytes_of(&transform),
        );

        let mut bindings = DrawBindings::new(self.device.as_ref());
        bindings.program(resources.program.handle());
        bindings.texture(OUTPUT_TEXTURE_UNIT, resources.source_image);
        bindings.uniform_buffer(TRANSFORM_SLOT, resources.uniform_buffer.handle());
        bindings.vertex_array(resources.vertex_array.handle());
        self.device.draw_triangles(QUAD_VERTEX_COUNT);
        drop(bindings);

        self.state = StageState::Ready;
        Ok(())
    }

    /// Destroys the uniform buffer, vertex array, both vertex buffers, the
    /// program and both shaders, in that order. Idempotent.
    pub fn release(&mut self) {
        if let Some(resources) = self.resources.take() {
            let PresentResources {
                uniform_buffer,
                vertex_array,
                tex_coords,
                positions,
                program,
                fragment_shader,
                vertex_shader,
                ..
            } = resources;
            drop(uniform_buffer);
            drop(vertex_array);
            drop(tex_coords);
            drop(positions);
            drop(program);
            drop(fragment_shader);
            drop(vertex_shader);
            debug!("presentation stage released");
        }
        self.state = StageState::Released;
    }
}

#[derive(Clone, Copy)]
enum Binding {
    Program,
    Texture(u32),
    UniformBuffer(u32),
    VertexArray,
}

/// Device bindings made for one draw; undone in reverse on drop.
struct DrawBindings<'a, D: GpuDevice + ?Sized> {
    device: &'a D,
    bound: Vec<Binding>,
}

impl<'a, D: GpuDevice + ?Sized> DrawBindings<'a, D> {
    fn new(device: &'a D) -> Self {
        Self {
            device,
            bound: Vec::with_capacity(4),
        }
    }

    fn program(&mut self, program: ProgramId) {
        self.device.bind_program(program);
        self.bound.push(Binding::Program);
    }

    fn texture(&mut self, unit: u32, image: ImageId) {
        self.device.bind_texture(unit, image);
        self.bound.push(Binding::Texture(unit));
    }

    fn uniform_buffer(&mut self, slot: u32, buffer: BufferId) {
        self.device.bind_uniform_buffer(slot, buffer);
        self.bound.push(Binding::UniformBuffer(slot));
    }

    fn vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.device.bind_vertex_array(vertex_array);
        self.bound.push(Binding::VertexArray);
    }
}

impl<D: GpuDevice + ?Sized> Drop for DrawBindings<'_, D> {
    fn drop(&mut self) {
        while let Some(binding) = self.bound.pop() {
            match binding {
                Binding::Program => self.device.unbind_program(),
                Binding::Texture(unit) => self.device.unbind_texture(unit),
                Binding::UniformBuffer(slot) => self.device.unbind_uniform_buffer(slot),
                Binding::VertexArray => self.device.unbind_vertex_array(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec2, Vec4};

    use super::*;
    use crate::render::device::Resource;
    use crate::render::recording::{GpuCall, RecordingDevice};

    const IMAGE: ImageId = ImageId(99);

    fn ready_stage(device: &Arc<RecordingDevice>) -> PresentationStage<RecordingDevice> {
        let mut stage = PresentationStage::new(Arc::clone(device), Viewport::new(1280, 720));
        stage.initialize(IMAGE, "vs", "fs").unwrap();
        stage
    }

    #[test]
    fn transform_maps_quad_to_full_viewport() {
        let transform = TransformBlock::for_viewport(Viewport::new(1280, 720));
        assert_eq!(
            Mat4::from_cols_array_2d(&transform.model),
            Mat4::from_scale(Vec3::new(1280.0, 720.0, 1.0))
        );

        let clip = transform.clip_from_object();
        let top_left = clip * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let bottom_right = clip * Vec4::new(1.0, 1.0, 0.0, 1.0);
        assert!((top_left.truncate().truncate() - Vec2::new(-1.0, 1.0)).length() < 1e-5);
        assert!((bottom_right.truncate().truncate() - Vec2::new(1.0, -1.0)).length() < 1e-5);
        // Depth range is [0, 1], so the quad plane lands mid-range.
        assert!((top_left.z - 0.5).abs() < 1e-5);
        assert!((bottom_right.z - 0.5).abs() < 1e-5);
    }

    #[test]
    fn render_binds_draws_and_unbinds_in_reverse() {
        let device = Arc::new(RecordingDevice::new());
        let mut stage = ready_stage(&device);
        device.clear_calls();

        stage.render_frame().unwrap();
        let calls = device.calls();
        assert!(matches!(calls[0], GpuCall::WriteBuffer { offset: 0, ref data, .. } if data.len() == 192));
        assert!(matches!(calls[1], GpuCall::BindProgram(_)));
        assert_eq!(calls[2], GpuCall::BindTexture { unit: OUTPUT_TEXTURE_UNIT, image: IMAGE });
        assert!(matches!(calls[3], GpuCall::BindUniformBuffer { slot: TRANSFORM_SLOT, .. }));
        assert!(matches!(calls[4], GpuCall::BindVertexArray(_)));
        assert_eq!(calls[5], GpuCall::Draw { vertex_count: 6 });
        assert_eq!(calls[6], GpuCall::UnbindVertexArray);
        assert_eq!(calls[7], GpuCall::UnbindUniformBuffer { slot: TRANSFORM_SLOT });
        assert_eq!(calls[8], GpuCall::UnbindTexture { unit: OUTPUT_TEXTURE_UNIT });
        assert_eq!(calls[9], GpuCall::UnbindProgram);
        assert_eq!(calls.len(), 10);
    }

    #[test]
    fn release_never_destroys_borrowed_image() {
        let device = Arc::new(RecordingDevice::new());
        let mut stage = ready_stage(&device);
        assert_eq!(device.live_resources(), 7);
        device.clear_calls();

        stage.release();
        stage.release();
        let calls = device.calls();
        assert_eq!(calls.len(), 7);
        assert!(matches!(calls[0], GpuCall::Destroy(Resource::Buffer(_))));
        assert!(matches!(calls[1], GpuCall::Destroy(Resource::VertexArray(_))));
        assert!(matches!(calls[4], GpuCall::Destroy(Resource::Program(_))));
        assert!(!calls.contains(&GpuCall::Destroy(Resource::Image(IMAGE))));
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    fn fragment_failure_releases_vertex_shader() {
        let device = Arc::new(
            RecordingDevice::new().with_compile_failure(ShaderStage::Fragment, "undeclared sampler"),
        );
        let mut stage = PresentationStage::new(Arc::clone(&device), Viewport::new(64, 64));
        assert!(stage.initialize(IMAGE, "vs", "fs").is_err());
        assert_eq!(stage.state(), StageState::Uninitialized);
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    fn render_before_initialize_is_rejected() {
        let device = Arc::new(RecordingDevice::new());
        let mut stage = PresentationStage::new(Arc::clone(&device), Viewport::new(64, 64));
        assert!(stage.render_frame().is_err());
        assert!(device.calls().is_empty());
    }
}
