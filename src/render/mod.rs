//! GPU pipeline orchestration: a compute stage ray-traces into an image that
//! the presentation stage samples onto a full-screen quad.

pub mod compute;
pub mod device;
pub mod layout;
pub mod pipeline;
pub mod present;
#[cfg(any(test, feature = "test-support"))]
pub mod recording;
pub mod resource;
pub mod uniforms;
pub mod wgpu_device;

pub use compute::ComputeStage;
pub use device::{
    Barrier, BufferDescriptor, BufferId, BufferKind, DeviceLimits, GpuDevice, ImageDescriptor,
    ImageId, ProgramId, Resource, ShaderId, ShaderStage, UniformHandle, UniformValue,
    VertexArrayId, VertexAttribute, WorkGroups,
};
pub use pipeline::Pipeline;
pub use present::{PresentationStage, TransformBlock};
#[cfg(any(test, feature = "test-support"))]
pub use recording::{GpuCall, RecordingDevice};
pub use resource::Owned;
pub use uniforms::{UniformBindingTable, UniformKey};
pub use wgpu_device::WgpuDevice;

use crate::error::{GpuError, PipelineError};

/// Fixed output resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Lifecycle of a pipeline stage.
///
/// `Uninitialized -> Ready -> (Dispatching -> Ready)* -> Released`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Uninitialized,
    Ready,
    Dispatching,
    Released,
}

pub(crate) fn expect_state(
    stage: &'static str,
    state: StageState,
    expected: StageState,
) -> Result<(), PipelineError> {
    if state == expected {
        Ok(())
    } else {
        Err(PipelineError::InvalidState {
            stage,
            state,
            expected,
        })
    }
}

/// Hands compile/link diagnostics to the log before propagating them.
pub(crate) fn log_failure(err: GpuError) -> GpuError {
    log::error!("{err}");
    err
}
