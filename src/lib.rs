//! Interactive compute-shader ray tracer.
//!
//! A compute stage ray-traces a small fixed scene into an image each frame
//! and a presentation stage samples that image onto a full-screen quad. The
//! GPU is reached only through [`render::GpuDevice`], so the pipeline can be
//! driven by `render::RecordingDevice` in tests and by
//! [`render::WgpuDevice`] in the binary.

pub mod app;
pub mod camera;
pub mod config;
pub mod error;
pub mod input;
pub mod logging;
pub mod render;
pub mod scene;
pub mod shaders;

pub use camera::{Camera, CameraController};
pub use config::Config;
pub use error::{ConfigError, GpuError, PipelineError, ShaderLoadError};
pub use input::{InputState, KeyCode, NamedKey};
pub use render::{Pipeline, StageState, Viewport};
pub use scene::{Light, SceneDescription, Sphere, MAX_LIGHTS, MAX_SPHERES};
pub use shaders::ShaderSources;
