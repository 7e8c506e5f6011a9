//! Typed scene-to-uniform marshalling.
//!
//! Every uniform the compute program reads is addressed by a [`UniformKey`]
//! (an index plus a field tag). Keys render to the structured names the shader
//! declares (`camera.position`, `spheres[3].radius`, `lightCount`), and this is
//! the only place that naming contract lives.

use std::fmt;

use crate::camera::Camera;
use crate::scene::{SceneDescription, MAX_LIGHTS, MAX_SPHERES};

use super::device::{GpuDevice, ProgramId, UniformHandle, UniformValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraField {
    Position,
    Forward,
    Right,
    Up,
    Width,
    Height,
}

impl CameraField {
    pub const COUNT: usize = 6;
    pub const ALL: [Self; Self::COUNT] = [
        Self::Position,
        Self::Forward,
        Self::Right,
        Self::Up,
        Self::Width,
        Self::Height,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Forward => "forward",
            Self::Right => "right",
            Self::Up => "up",
            Self::Width => "width",
            Self::Height => "height",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SphereField {
    Position,
    Radius,
    Color,
    SpecularFactor,
}

impl SphereField {
    pub const COUNT: usize = 4;
    pub const ALL: [Self; Self::COUNT] = [
        Self::Position,
        Self::Radius,
        Self::Color,
        Self::SpecularFactor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Radius => "radius",
            Self::Color => "color",
            Self::SpecularFactor => "specularFactor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightField {
    Position,
    Intensity,
    Color,
}

impl LightField {
    pub const COUNT: usize = 3;
    pub const ALL: [Self; Self::COUNT] = [Self::Position, Self::Intensity, Self::Color];

    pub fn name(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Intensity => "intensity",
            Self::Color => "color",
        }
    }
}

/// Stable address of one compute-program uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKey {
    Camera(CameraField),
    Sphere(usize, SphereField),
    Light(usize, LightField),
    SphereCount,
    LightCount,
}

impl UniformKey {
    /// Every key up to full capacity, in upload order.
    pub fn all() -> impl Iterator<Item = UniformKey> {
        let camera = CameraField::ALL.into_iter().map(UniformKey::Camera);
        let spheres = (0..MAX_SPHERES).flat_map(|index| {
            SphereField::ALL
                .into_iter()
                .map(move |field| UniformKey::Sphere(index, field))
        });
        let lights = (0..MAX_LIGHTS).flat_map(|index| {
            LightField::ALL
                .into_iter()
                .map(move |field| UniformKey::Light(index, field))
        });
        camera
            .chain(spheres)
            .chain(lights)
            .chain([UniformKey::SphereCount, UniformKey::LightCount])
    }
}

impl fmt::Display for UniformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformKey::Camera(field) => write!(f, "camera.{}", field.name()),
            UniformKey::Sphere(index, field) => write!(f, "spheres[{index}].{}", field.name()),
            UniformKey::Light(index, field) => write!(f, "lights[{index}].{}", field.name()),
            UniformKey::SphereCount => f.write_str("sphereCount"),
            UniformKey::LightCount => f.write_str("lightCount"),
        }
    }
}

/// Resolved uniform handles of one linked compute program.
///
/// Built once right after linkage, for every slot up to capacity, and never
/// mutated afterwards. Names the program does not expose resolve to
/// [`UniformHandle::INVALID`] and are silently skipped on upload.
#[derive(Debug, Clone)]
pub struct UniformBindingTable {
    program: ProgramId,
    camera: [UniformHandle; CameraField::COUNT],
    spheres: [[UniformHandle; SphereField::COUNT]; MAX_SPHERES],
    lights: [[UniformHandle; LightField::COUNT]; MAX_LIGHTS],
    sphere_count: UniformHandle,
    light_count: UniformHandle,
    unresolved: Vec<UniformKey>,
}

impl UniformBindingTable {
    pub fn resolve<D: GpuDevice + ?Sized>(device: &D, program: ProgramId) -> Self {
        let mut table = Self {
            program,
            camera: [UniformHandle::INVALID; CameraField::COUNT],
            spheres: [[UniformHandle::INVALID; SphereField::COUNT]; MAX_SPHERES],
            lights: [[UniformHandle::INVALID; LightField::COUNT]; MAX_LIGHTS],
            sphere_count: UniformHandle::INVALID,
            light_count: UniformHandle::INVALID,
            unresolved: Vec::new(),
        };
        for key in UniformKey::all() {
            let handle = device.resolve_uniform(program, &key.to_string());
            if !handle.is_valid() {
                table.unresolved.push(key);
            }
            if let Some(slot) = table.slot_mut(key) {
                *slot = handle;
            }
        }
        table
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    /// Handle for `key`; invalid for unresolved names and out-of-capacity indices.
    pub fn handle(&self, key: UniformKey) -> UniformHandle {
        match key {
            UniformKey::Camera(field) => self.camera[field as usize],
            UniformKey::Sphere(index, field) => self
                .spheres
                .get(index)
                .map_or(UniformHandle::INVALID, |fields| fields[field as usize]),
            UniformKey::Light(index, field) => self
                .lights
                .get(index)
                .map_or(UniformHandle::INVALID, |fields| fields[field as usize]),
            UniformKey::SphereCount => self.sphere_count,
            UniformKey::LightCount => self.light_count,
        }
    }

    /// Writes `value` through the handle for `key`. Returns whether anything
    /// reached the device.
    pub fn set<D: GpuDevice + ?Sized>(&self, device: &D, key: UniformKey, value: UniformValue) -> bool {
        let handle = self.handle(key);
        if !handle.is_valid() {
            return false;
        }
        device.set_uniform(self.program, handle, value);
        true
    }

    /// Keys the program did not expose, in resolution order.
    pub fn unresolved(&self) -> &[UniformKey] {
        &self.unresolved
    }

    fn slot_mut(&mut self, key: UniformKey) -> Option<&mut UniformHandle> {
        match key {
            UniformKey::Camera(field) => Some(&mut self.camera[field as usize]),
            UniformKey::Sphere(index, field) => self
                .spheres
                .get_mut(index)
                .map(|fields| &mut fields[field as usize]),
            UniformKey::Light(index, field) => self
                .lights
                .get_mut(index)
                .map(|fields| &mut fields[field as usize]),
            UniformKey::SphereCount => Some(&mut self.sphere_count),
            UniformKey::LightCount => Some(&mut self.light_count),
        }
    }
}

/// Flattens the camera and the active part of the scene into uniform writes.
///
/// Camera fields come first, then every active sphere, every active light and
/// finally the two counts. Counts are clamped to capacity and slots past the
/// active count are never emitted.
pub fn marshal(camera: &Camera, scene: &SceneDescription, out: &mut Vec<(UniformKey, UniformValue)>) {
    out.clear();
    out.extend([
        (UniformKey::Camera(CameraField::Position), UniformValue::from(camera.position)),
        (UniformKey::Camera(CameraField::Forward), UniformValue::from(camera.forward)),
        (UniformKey::Camera(CameraField::Right), UniformValue::from(camera.right)),
        (UniformKey::Camera(CameraField::Up), UniformValue::from(camera.up)),
        (UniformKey::Camera(CameraField::Width), UniformValue::from(camera.width)),
        (UniformKey::Camera(CameraField::Height), UniformValue::from(camera.height)),
    ]);
    for (index, sphere) in scene.active_spheres().iter().enumerate() {
        out.extend([
            (UniformKey::Sphere(index, SphereField::Position), UniformValue::from(sphere.position)),
            (UniformKey::Sphere(index, SphereField::Radius), UniformValue::from(sphere.radius)),
            (UniformKey::Sphere(index, SphereField::Color), UniformValue::from(sphere.color)),
            (
                UniformKey::Sphere(index, SphereField::SpecularFactor),
                UniformValue::from(sphere.specular_factor),
            ),
        ]);
    }
    for (index, light) in scene.active_lights().iter().enumerate() {
        out.extend([
            (UniformKey::Light(index, LightField::Position), UniformValue::from(light.position)),
            (UniformKey::Light(index, LightField::Intensity), UniformValue::from(light.intensity)),
            (UniformKey::Light(index, LightField::Color), UniformValue::from(light.color)),
        ]);
    }
    out.push((
        UniformKey::SphereCount,
        UniformValue::Int(scene.sphere_count() as i32),
    ));
    out.push((
        UniformKey::LightCount,
        UniformValue::Int(scene.light_count() as i32),
    ));
}
