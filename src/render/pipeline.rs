use std::sync::Arc;

use log::info;

use crate::camera::Camera;
use crate::error::PipelineError;
use crate::scene::SceneDescription;
use crate::shaders::ShaderSources;

use super::compute::ComputeStage;
use super::device::GpuDevice;
use super::present::PresentationStage;
use super::{StageState, Viewport};

/// Composition root: one compute stage feeding one presentation stage.
///
/// The presentation stage only references the compute output image, so it
/// is initialized after and released before the compute stage.
pub struct Pipeline<D: GpuDevice + ?Sized> {
    // Declared first so an implicit drop also releases it first.
    present: PresentationStage<D>,
    compute: ComputeStage<D>,
    shaders: ShaderSources,
}

impl<D: GpuDevice + ?Sized> Pipeline<D> {
    pub fn new(device: Arc<D>, viewport: Viewport, shaders: ShaderSources) -> Self {
        Self {
            present: PresentationStage::new(Arc::clone(&device), viewport),
            compute: ComputeStage::new(device, viewport),
            shaders,
        }
    }

    pub fn compute(&self) -> &ComputeStage<D> {
        &self.compute
    }

    pub fn present(&self) -> &PresentationStage<D> {
        &self.present
    }

    pub fn is_ready(&self) -> bool {
        self.compute.state() == StageState::Ready && self.present.state() == StageState::Ready
    }

    /// Builds the compute stage, then the presentation stage on top of its
    /// output image. A failure leaves nothing allocated.
    pub fn initialize(&mut self) -> Result<(), PipelineError> {
        self.compute.initialize(&self.shaders.compute)?;
        let Some(image) = self.compute.output_image() else {
            return Err(PipelineError::InvalidState {
                stage: "compute",
                state: self.compute.state(),
                expected: StageState::Ready,
            });
        };
        if let Err(err) = self
            .present
            .initialize(image, &self.shaders.vertex, &self.shaders.fragment)
        {
            self.compute.release();
            return Err(err);
        }
        let viewport = self.compute.viewport();
        info!(
            "pipeline initialized at {}x{}",
            viewport.width, viewport.height
        );
        Ok(())
    }

    /// Ray-traces one frame and draws it. Both stages run every frame.
    pub fn frame(&mut self, camera: &Camera, scene: &SceneDescription) -> Result<(), PipelineError> {
        self.compute.dispatch_frame(camera, scene)?;
        self.present.render_frame()
    }

    /// Releases the presentation stage, then the compute stage. Idempotent.
    pub fn release(&mut self) {
        self.present.release();
        self.compute.release();
    }
}

impl<D: GpuDevice + ?Sized> Drop for Pipeline<D> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::render::device::{Resource, ShaderStage};
    use crate::render::recording::{GpuCall, RecordingDevice};

    fn pipeline(device: &Arc<RecordingDevice>) -> Pipeline<RecordingDevice> {
        Pipeline::new(
            Arc::clone(device),
            Viewport::new(320, 240),
            ShaderSources::builtin(),
        )
    }

    #[test]
    fn presentation_failure_releases_compute() {
        let device = Arc::new(
            RecordingDevice::new().with_compile_failure(ShaderStage::Vertex, "bad vertex"),
        );
        let mut pipeline = pipeline(&device);
        assert!(pipeline.initialize().is_err());
        assert!(!pipeline.is_ready());
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    fn frame_before_initialize_touches_nothing() {
        let device = Arc::new(RecordingDevice::new());
        let mut pipeline = pipeline(&device);
        let camera = Camera::new(Vec3::ZERO, 60.0, 4.0 / 3.0);
        assert!(pipeline.frame(&camera, &SceneDescription::demo()).is_err());
        assert!(device.calls().is_empty());
    }

    #[test]
    fn drop_releases_presentation_before_compute_image() {
        let device = Arc::new(RecordingDevice::new());
        let image = {
            let mut pipeline = pipeline(&device);
            pipeline.initialize().unwrap();
            let image = pipeline.compute().output_image().unwrap();
            device.clear_calls();
            image
        };
        let calls = device.calls();
        assert_eq!(calls.len(), 10);
        assert_eq!(calls.last(), Some(&GpuCall::Destroy(Resource::Image(image))));
        assert_eq!(device.live_resources(), 0);
    }
}
