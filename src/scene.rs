use glam::Vec3;

/// Number of sphere slots the compute shader can address.
pub const MAX_SPHERES: usize = 20;
/// Number of light slots the compute shader can address.
pub const MAX_LIGHTS: usize = 8;

/// Reflective sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub position: Vec3,
    pub radius: f32,
    pub color: Vec3,
    /// 0.0 is rough/diffuse, 1.0 is mirror-like.
    pub specular_factor: f32,
}

impl Sphere {
    pub fn new(position: Vec3, radius: f32, color: Vec3, specular_factor: f32) -> Self {
        Self {
            position,
            radius,
            color,
            specular_factor,
        }
    }
}

/// Point light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub intensity: f32,
    pub color: Vec3,
}

impl Light {
    pub fn new(position: Vec3, intensity: f32, color: Vec3) -> Self {
        Self {
            position,
            intensity,
            color,
        }
    }
}

/// Fixed-capacity set of spheres and lights consumed by the compute stage.
///
/// The description may hold more entries than the shader can address; only the
/// first [`MAX_SPHERES`] spheres and [`MAX_LIGHTS`] lights are ever uploaded.
/// The rest are dropped. This is a fixed capacity, not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneDescription {
    spheres: Vec<Sphere>,
    lights: Vec<Light>,
}

impl SceneDescription {
    pub fn new(spheres: Vec<Sphere>, lights: Vec<Light>) -> Self {
        Self { spheres, lights }
    }

    /// The demo scene: four small spheres around the origin on top of a huge
    /// ground sphere, lit by a single white light.
    pub fn demo() -> Self {
        let spheres = vec![
            Sphere::new(Vec3::new(-8.0, 0.0, 0.0), 1.0, Vec3::splat(0.5), 0.5),
            Sphere::new(Vec3::new(0.0, 0.0, -8.0), 1.0, Vec3::new(0.0, 0.5, 0.0), 0.5),
            Sphere::new(Vec3::new(8.0, 0.0, 0.0), 1.0, Vec3::new(0.0, 0.0, 0.5), 0.5),
            Sphere::new(Vec3::new(0.0, 0.0, 8.0), 1.0, Vec3::new(0.5, 0.0, 0.0), 0.5),
            Sphere::new(
                Vec3::new(0.0, -5001.0, 0.0),
                5000.0,
                Vec3::new(0.5, 0.5, 0.0),
                0.5,
            ),
        ];
        let lights = vec![Light::new(Vec3::new(0.0, 1.0, 0.0), 0.6, Vec3::ONE)];
        Self { spheres, lights }
    }

    /// Every configured sphere, including any beyond capacity.
    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres
    }

    /// Every configured light, including any beyond capacity.
    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Spheres the shader will see, clamped to [`MAX_SPHERES`].
    pub fn active_spheres(&self) -> &[Sphere] {
        &self.spheres[..self.sphere_count()]
    }

    /// Lights the shader will see, clamped to [`MAX_LIGHTS`].
    pub fn active_lights(&self) -> &[Light] {
        &self.lights[..self.light_count()]
    }

    pub fn sphere_count(&self) -> usize {
        self.spheres.len().min(MAX_SPHERES)
    }

    pub fn light_count(&self) -> usize {
        self.lights.len().min(MAX_LIGHTS)
    }

    /// Number of spheres and lights that do not fit and will never be uploaded.
    pub fn overflow(&self) -> (usize, usize) {
        (
            self.spheres.len().saturating_sub(MAX_SPHERES),
            self.lights.len().saturating_sub(MAX_LIGHTS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spheres(count: usize) -> Vec<Sphere> {
        (0..count)
            .map(|i| Sphere::new(Vec3::new(i as f32, 0.0, 0.0), 1.0, Vec3::ONE, 0.0))
            .collect()
    }

    #[test]
    fn demo_scene_matches_fixed_dataset() {
        let scene = SceneDescription::demo();
        assert_eq!(scene.sphere_count(), 5);
        assert_eq!(scene.light_count(), 1);
        assert_eq!(scene.spheres()[4].radius, 5000.0);
        assert_eq!(scene.lights()[0].intensity, 0.6);
        assert_eq!(scene.overflow(), (0, 0));
    }

    #[test]
    fn counts_clamp_to_capacity() {
        let lights = vec![Light::new(Vec3::Y, 1.0, Vec3::ONE); MAX_LIGHTS + 3];
        let scene = SceneDescription::new(spheres(MAX_SPHERES + 5), lights);
        assert_eq!(scene.sphere_count(), MAX_SPHERES);
        assert_eq!(scene.light_count(), MAX_LIGHTS);
        assert_eq!(scene.active_spheres().len(), MAX_SPHERES);
        assert_eq!(scene.active_spheres().last().unwrap().position.x, 19.0);
        assert_eq!(scene.overflow(), (5, 3));
    }

    #[test]
    fn empty_scene_has_no_active_entries() {
        let scene = SceneDescription::default();
        assert!(scene.active_spheres().is_empty());
        assert!(scene.active_lights().is_empty());
    }
}
