//! Byte layout of the compute program's scene uniform block.
//!
//! The structs mirror the WGSL declarations in `shaders/raytracer.wgsl`
//! under uniform address-space rules (`vec3<f32>` aligned to 16 bytes, array
//! strides rounded to 16). Backends use [`SceneLayout`] as the reflection
//! table for `resolve_uniform`.

use std::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};

use crate::scene::{MAX_LIGHTS, MAX_SPHERES};

use super::device::UniformKind;
use super::uniforms::{CameraField, LightField, SphereField, UniformKey};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuCamera {
    pub position: [f32; 3],
    pub width: f32,
    pub forward: [f32; 3],
    pub height: f32,
    pub right: [f32; 3],
    pub _pad0: f32,
    pub up: [f32; 3],
    pub _pad1: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuSphere {
    pub position: [f32; 3],
    pub radius: f32,
    pub color: [f32; 3],
    pub specular_factor: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuLight {
    pub position: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 3],
    pub _pad: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuScene {
    pub camera: GpuCamera,
    pub spheres: [GpuSphere; MAX_SPHERES],
    pub lights: [GpuLight; MAX_LIGHTS],
    pub sphere_count: i32,
    pub light_count: i32,
    pub _pad: [i32; 2],
}

/// Location and type of one uniform inside the scene block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    pub offset: usize,
    pub kind: UniformKind,
}

pub struct SceneLayout;

impl SceneLayout {
    pub const SIZE: usize = size_of::<GpuScene>();

    /// Slot of `key`, or `None` when its index exceeds capacity.
    pub fn slot(key: UniformKey) -> Option<UniformSlot> {
        let (offset, kind) = match key {
            UniformKey::Camera(field) => {
                let base = offset_of!(GpuScene, camera);
                match field {
                    CameraField::Position => (base + offset_of!(GpuCamera, position), UniformKind::Vec3),
                    CameraField::Forward => (base + offset_of!(GpuCamera, forward), UniformKind::Vec3),
                    CameraField::Right => (base + offset_of!(GpuCamera, right), UniformKind::Vec3),
                    CameraField::Up => (base + offset_of!(GpuCamera, up), UniformKind::Vec3),
                    CameraField::Width => (base + offset_of!(GpuCamera, width), UniformKind::Float),
                    CameraField::Height => (base + offset_of!(GpuCamera, height), UniformKind::Float),
                }
            }
            UniformKey::Sphere(index, field) => {
                if index >= MAX_SPHERES {
                    return None;
                }
                let base = offset_of!(GpuScene, spheres) + index * size_of::<GpuSphere>();
                match field {
                    SphereField::Position => (base + offset_of!(GpuSphere, position), UniformKind::Vec3),
                    SphereField::Radius => (base + offset_of!(GpuSphere, radius), UniformKind::Float),
                    SphereField::Color => (base + offset_of!(GpuSphere, color), UniformKind::Vec3),
                    SphereField::SpecularFactor => {
                        (base + offset_of!(GpuSphere, specular_factor), UniformKind::Float)
                    }
                }
            }
            UniformKey::Light(index, field) => {
                if index >= MAX_LIGHTS {
                    return None;
                }
                let base = offset_of!(GpuScene, lights) + index * size_of::<GpuLight>();
                match field {
                    LightField::Position => (base + offset_of!(GpuLight, position), UniformKind::Vec3),
                    LightField::Intensity => (base + offset_of!(GpuLight, intensity), UniformKind::Float),
                    LightField::Color => (base + offset_of!(GpuLight, color), UniformKind::Vec3),
                }
            }
            UniformKey::SphereCount => (offset_of!(GpuScene, sphere_count), UniformKind::Int),
            UniformKey::LightCount => (offset_of!(GpuScene, light_count), UniformKind::Int),
        };
        Some(UniformSlot { offset, kind })
    }

    /// Every uniform name the scene block exposes, with its slot.
    pub fn reflect() -> Vec<(String, UniformSlot)> {
        UniformKey::all()
            .filter_map(|key| Self::slot(key).map(|slot| (key.to_string(), slot)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_matches_wgsl_uniform_layout() {
        assert_eq!(size_of::<GpuCamera>(), 64);
        assert_eq!(size_of::<GpuSphere>(), 32);
        assert_eq!(size_of::<GpuLight>(), 32);
        assert_eq!(SceneLayout::SIZE, 976);
        assert_eq!(offset_of!(GpuScene, spheres), 64);
        assert_eq!(offset_of!(GpuScene, lights), 704);
        assert_eq!(offset_of!(GpuScene, sphere_count), 960);
    }

    #[test]
    fn slots_address_expected_bytes() {
        let slot = SceneLayout::slot(UniformKey::Sphere(2, SphereField::Radius)).unwrap();
        assert_eq!(slot, UniformSlot { offset: 64 + 2 * 32 + 12, kind: UniformKind::Float });

        let slot = SceneLayout::slot(UniformKey::Light(7, LightField::Color)).unwrap();
        assert_eq!(slot.offset, 704 + 7 * 32 + 16);
        assert_eq!(slot.kind, UniformKind::Vec3);

        assert_eq!(SceneLayout::slot(UniformKey::Light(8, LightField::Color)), None);
    }

    #[test]
    fn reflected_slots_fit_and_do_not_overlap() {
        let mut slots: Vec<_> = SceneLayout::reflect().into_iter().map(|(_, slot)| slot).collect();
        slots.sort_by_key(|slot| slot.offset);
        for pair in slots.windows(2) {
            assert!(pair[0].offset + pair[0].kind.size() <= pair[1].offset);
        }
        let last = slots.last().unwrap();
        assert!(last.offset + last.kind.size() <= SceneLayout::SIZE);
    }
}
