use std::fs;
use std::path::Path;

use crate::error::ShaderLoadError;

pub const COMPUTE_FILE: &str = "raytracer.wgsl";
pub const VERTEX_FILE: &str = "quad.vert.wgsl";
pub const FRAGMENT_FILE: &str = "quad.frag.wgsl";

/// Source text of the three programs the pipeline builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSources {
    pub compute: String,
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSources {
    /// Shaders compiled into the binary.
    pub fn builtin() -> Self {
        Self {
            compute: include_str!("../shaders/raytracer.wgsl").to_owned(),
            vertex: include_str!("../shaders/quad.vert.wgsl").to_owned(),
            fragment: include_str!("../shaders/quad.frag.wgsl").to_owned(),
        }
    }

    /// Reads all three sources from `dir`. Every file must be present.
    pub fn load_from_dir(dir: &Path) -> Result<Self, ShaderLoadError> {
        let read = |name: &str| {
            let path = dir.join(name);
            fs::read_to_string(&path).map_err(|source| ShaderLoadError { path, source })
        };
        Ok(Self {
            compute: read(COMPUTE_FILE)?,
            vertex: read(VERTEX_FILE)?,
            fragment: read(FRAGMENT_FILE)?,
        })
    }
}
