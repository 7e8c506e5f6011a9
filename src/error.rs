use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::render::{ShaderStage, StageState};

/// Failures reported by a [`GpuDevice`](crate::render::GpuDevice) backend.
#[derive(Debug, Error)]
pub enum GpuError {
    /// The shader compiler rejected a source blob. `log` holds the compiler diagnostic.
    #[error("{stage} shader failed to compile:\n{log}")]
    ShaderCompilation { stage: ShaderStage, log: String },

    /// Program linkage failed. `log` holds the linker diagnostic.
    #[error("program failed to link:\n{log}")]
    ProgramLink { log: String },

    #[error("failed to create {what}: {reason}")]
    ResourceCreation { what: &'static str, reason: String },

    #[error("failed to request GPU adapter: {0}")]
    AdapterRequest(#[from] wgpu::RequestAdapterError),

    #[error("failed to create GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("failed to create window surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
}

/// Errors surfaced by the pipeline lifecycle entry points.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error("{stage} stage is {state:?}, expected {expected:?}")]
    InvalidState {
        stage: &'static str,
        state: StageState,
        expected: StageState,
    },
}

#[derive(Debug, Error)]
#[error("failed to read shader {}", path.display())]
pub struct ShaderLoadError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown argument: {0}")]
    UnknownArgument(String),

    #[error("{0} expects a value")]
    MissingValue(&'static str),

    #[error("invalid viewport size {0:?}, expected WIDTHxHEIGHT")]
    InvalidSize(String),

    #[error("viewport dimensions must be greater than zero (got {width}x{height})")]
    EmptyViewport { width: u32, height: u32 },
}
