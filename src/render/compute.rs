use std::sync::Arc;

use log::{debug, warn};

use crate::camera::Camera;
use crate::error::{GpuError, PipelineError};
use crate::scene::{SceneDescription, MAX_LIGHTS, MAX_SPHERES};

use super::device::{
    Barrier, FilterMode, GpuDevice, ImageDescriptor, ImageFormat, ImageId, ProgramId, ShaderId,
    ShaderStage, UniformValue, WorkGroups, WrapMode,
};
use super::resource::Owned;
use super::uniforms::{self, UniformBindingTable, UniformKey};
use super::{expect_state, log_failure, StageState, Viewport};

/// Invocations per workgroup along x and y; must match `@workgroup_size` in
/// the compute shader.
pub const WORKGROUP_SIZE: [u32; 2] = [8, 8];

/// Workgroup grid covering every pixel of `viewport`.
pub fn dispatch_size(viewport: Viewport) -> WorkGroups {
    WorkGroups {
        x: viewport.width.div_ceil(WORKGROUP_SIZE[0]),
        y: viewport.height.div_ceil(WORKGROUP_SIZE[1]),
        z: 1,
    }
}

/// Storage image the compute program writes: one RGBA32F texel per pixel,
/// single level, clamped, unfiltered.
pub fn output_image_descriptor(viewport: Viewport) -> ImageDescriptor {
    ImageDescriptor {
        label: "raytracer-output",
        width: viewport.width,
        height: viewport.height,
        format: ImageFormat::Rgba32Float,
        mip_levels: 1,
        wrap: WrapMode::ClampToEdge,
        filter: FilterMode::Nearest,
    }
}

// Field order is release order: program, shader, image.
struct ComputeResources<D: GpuDevice + ?Sized> {
    program: Owned<D, ProgramId>,
    shader: Owned<D, ShaderId>,
    image: Owned<D, ImageId>,
    bindings: UniformBindingTable,
    groups: WorkGroups,
}

/// Owns the output image and compute program and produces one ray-traced
/// frame per [`dispatch_frame`](Self::dispatch_frame).
pub struct ComputeStage<D: GpuDevice + ?Sized> {
    device: Arc<D>,
    viewport: Viewport,
    state: StageState,
    resources: Option<ComputeResources<D>>,
    uploads: Vec<(UniformKey, UniformValue)>,
    reported_overflow: Option<(usize, usize)>,
}

impl<D: GpuDevice + ?Sized> ComputeStage<D> {
    const NAME: &'static str = "compute";

    pub fn new(device: Arc<D>, viewport: Viewport) -> Self {
        Self {
            device,
            viewport,
            state: StageState::Uninitialized,
            resources: None,
            uploads: Vec::new(),
            reported_overflow: None,
        }
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Non-owning handle of the output image, while the stage is ready.
    pub fn output_image(&self) -> Option<ImageId> {
        self.resources.as_ref().map(|resources| resources.image.handle())
    }

    pub fn bindings(&self) -> Option<&UniformBindingTable> {
        self.resources.as_ref().map(|resources| &resources.bindings)
    }

    pub fn work_groups(&self) -> Option<WorkGroups> {
        self.resources.as_ref().map(|resources| resources.groups)
    }

    /// Allocates the output image, builds the compute program from `source`
    /// and resolves every uniform handle up to capacity.
    ///
    /// On failure everything created so far is destroyed and the stage stays
    /// uninitialized.
    pub fn initialize(&mut self, source: &str) -> Result<(), PipelineError> {
        expect_state(Self::NAME, self.state, StageState::Uninitialized)?;

        let limits = self.device.limits();
        let groups = dispatch_size(self.viewport);
        if groups.x > limits.max_workgroup_count[0] || groups.y > limits.max_workgroup_count[1] {
            return Err(log_failure(GpuError::ResourceCreation {
                what: "compute dispatch",
                reason: format!(
                    "{}x{} workgroups exceed the device limit of {:?}",
                    groups.x, groups.y, limits.max_workgroup_count
                ),
            })
            .into());
        }
        debug!(
            "compute limits: max groups {:?}, max group size {:?}, max invocations {}, max uniform block {} bytes (scene block {} bytes)",
            limits.max_workgroup_count,
            limits.max_workgroup_size,
            limits.max_workgroup_invocations,
            limits.max_uniform_block_size,
            super::layout::SceneLayout::SIZE,
        );

        let device = &self.device;
        let image = Owned::new(
            device,
            device.create_image(&output_image_descriptor(self.viewport))?,
        );
        let shader = Owned::new(
            device,
            device
                .compile_shader(ShaderStage::Compute, source)
                .map_err(log_failure)?,
        );
        let program = Owned::new(
            device,
            device
                .link_program(&[shader.handle()])
                .map_err(log_failure)?,
        );
        let bindings = UniformBindingTable::resolve(device.as_ref(), program.handle());
        if !bindings.unresolved().is_empty() {
            debug!(
                "{} scene uniforms are not active in the compute program",
                bindings.unresolved().len()
            );
        }
        debug!(
            "compute stage ready: {}x{} output, {}x{} workgroups of {:?}",
            self.viewport.width, self.viewport.height, groups.x, groups.y, WORKGROUP_SIZE
        );

        self.resources = Some(ComputeResources {
            program,
            shader,
            image,
            bindings,
            groups,
        });
        self.state = StageState::Ready;
        Ok(())
    }

    /// Uploads the camera and scene, dispatches one invocation per pixel and
    /// makes the image writes visible to later sampling.
    pub fn dispatch_frame(
        &mut self,
        camera: &Camera,
        scene: &SceneDescription,
    ) -> Result<(), PipelineError> {
        expect_state(Self::NAME, self.state, StageState::Ready)?;
        self.report_overflow(scene);
        let Some(resources) = self.resources.as_ref() else {
            return Err(PipelineError::InvalidState {
                stage: Self::NAME,
                state: self.state,
                expected: StageState::Ready,
            });
        };
        self.state = StageState::Dispatching;

        uniforms::marshal(camera, scene, &mut self.uploads);
        for (key, value) in &self.uploads {
            resources.bindings.set(self.device.as_ref(), *key, *value);
        }
        self.device.dispatch_compute(
            resources.program.handle(),
            resources.image.handle(),
            resources.groups,
        );
        // Must follow every dispatch; the image is sampled right after.
        self.device.memory_barrier(Barrier::ShaderImageAccess);

        self.state = StageState::Ready;
        Ok(())
    }

    /// Destroys program, shader and image, in that order. Idempotent.
    pub fn release(&mut self) {
        if let Some(resources) = self.resources.take() {
            let ComputeResources {
                program,
                shader,
                image,
                ..
            } = resources;
            drop(program);
            drop(shader);
            drop(image);
            debug!("compute stage released");
        }
        self.state = StageState::Released;
    }

    fn report_overflow(&mut self, scene: &SceneDescription) {
        let overflow = scene.overflow();
        if overflow == (0, 0) || self.reported_overflow == Some(overflow) {
            return;
        }
        warn!(
            "scene holds {} spheres and {} lights; only the first {MAX_SPHERES} spheres and {MAX_LIGHTS} lights are uploaded",
            scene.spheres().len(),
            scene.lights().len(),
        );
        self.reported_overflow = Some(overflow);
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::render::device::{DeviceLimits, Resource};
    use crate::render::recording::{GpuCall, RecordingDevice};
    use crate::render::uniforms::LightField;

    fn stage(device: &Arc<RecordingDevice>) -> ComputeStage<RecordingDevice> {
        ComputeStage::new(Arc::clone(device), Viewport::new(1280, 720))
    }

    fn camera() -> Camera {
        Camera::new(Vec3::ZERO, 60.0, 1280.0 / 720.0)
    }

    #[test]
    fn dispatch_grid_covers_viewport() {
        let groups = dispatch_size(Viewport::new(1280, 720));
        assert_eq!(groups, WorkGroups { x: 160, y: 90, z: 1 });
        assert_eq!(groups.x * WORKGROUP_SIZE[0], 1280);
        assert_eq!(groups.y * WORKGROUP_SIZE[1], 720);

        let odd = dispatch_size(Viewport::new(1001, 3));
        assert_eq!((odd.x, odd.y), (126, 1));
    }

    #[test]
    fn initialize_creates_image_then_program() {
        let device = Arc::new(RecordingDevice::new());
        let mut stage = stage(&device);
        stage.initialize("compute").unwrap();
        assert_eq!(stage.state(), StageState::Ready);

        let calls = device.calls();
        assert!(matches!(
            calls[0],
            GpuCall::CreateImage { desc, .. } if desc == output_image_descriptor(Viewport::new(1280, 720))
        ));
        assert!(matches!(calls[1], GpuCall::CompileShader { stage: ShaderStage::Compute, .. }));
        assert!(matches!(calls[2], GpuCall::LinkProgram { .. }));
        assert_eq!(device.live_resources(), 3);
    }

    #[test]
    fn release_is_ordered_and_idempotent() {
        let device = Arc::new(RecordingDevice::new());
        let mut stage = stage(&device);
        stage.initialize("compute").unwrap();
        let image = stage.output_image().unwrap();
        device.clear_calls();

        stage.release();
        let calls = device.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], GpuCall::Destroy(Resource::Program(_))));
        assert!(matches!(calls[1], GpuCall::Destroy(Resource::Shader(_))));
        assert_eq!(calls[2], GpuCall::Destroy(Resource::Image(image)));

        stage.release();
        assert_eq!(device.calls().len(), 3);
        assert!(!device.is_live(Resource::Image(image)));
        assert_eq!(stage.state(), StageState::Released);
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    fn compile_failure_cleans_up_and_stays_uninitialized() {
        let device = Arc::new(
            RecordingDevice::new().with_compile_failure(ShaderStage::Compute, "error: expected ';'"),
        );
        let mut stage = stage(&device);
        let err = stage.initialize("broken").unwrap_err();
        assert!(err.to_string().contains("expected ';'"));
        assert_eq!(stage.state(), StageState::Uninitialized);
        assert_eq!(device.live_resources(), 0);
        assert!(stage.output_image().is_none());
    }

    #[test]
    fn dispatch_requires_ready_stage() {
        let device = Arc::new(RecordingDevice::new());
        let mut stage = stage(&device);
        let err = stage
            .dispatch_frame(&camera(), &SceneDescription::demo())
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidState { state: StageState::Uninitialized, .. }
        ));
        assert!(device.calls().is_empty());
    }

    #[test]
    fn oversized_grid_is_rejected_before_allocation() {
        let limits = DeviceLimits {
            max_workgroup_count: [100, 100, 1],
            ..DeviceLimits::default()
        };
        let device = Arc::new(RecordingDevice::new().with_limits(limits));
        let mut stage = stage(&device);
        assert!(stage.initialize("compute").is_err());
        assert!(device.calls().is_empty());
    }

    #[test]
    fn unresolved_uniform_is_never_uploaded() {
        let device = Arc::new(RecordingDevice::new().with_missing_uniform("lights[0].color"));
        let mut stage = stage(&device);
        stage.initialize("compute").unwrap();
        assert_eq!(
            stage.bindings().unwrap().unresolved(),
            &[UniformKey::Light(0, LightField::Color)]
        );
        device.clear_calls();

        stage.dispatch_frame(&camera(), &SceneDescription::demo()).unwrap();
        let names: Vec<String> = device
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                GpuCall::SetUniform { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        assert!(names.contains(&"lights[0].position".to_string()));
        assert!(!names.contains(&"lights[0].color".to_string()));
    }
}
