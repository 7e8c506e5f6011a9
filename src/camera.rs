use glam::Vec3;

use crate::input::{InputState, NamedKey};

/// Viewer position, orthonormal basis and projection half-extents.
///
/// `right` is `forward x world_up` and `up` is `forward x right`, so `up`
/// points toward increasing image rows and `right x up == forward`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub width: f32,
    pub height: f32,
}

impl Camera {
    pub const DEFAULT_FOV_DEGREES: f32 = 60.0;

    /// Camera at `position` looking down -Z.
    pub fn new(position: Vec3, fov_degrees: f32, aspect: f32) -> Self {
        let mut camera = Self {
            position,
            forward: Vec3::NEG_Z,
            right: Vec3::X,
            up: Vec3::NEG_Y,
            width: 0.0,
            height: 0.0,
        };
        camera.set_forward(Vec3::NEG_Z);
        camera.set_projection(fov_degrees, aspect);
        camera
    }

    /// Recomputes the whole basis from a view direction.
    ///
    /// Directions (anti)parallel to the world up axis are rejected and leave
    /// the basis untouched.
    pub fn set_forward(&mut self, direction: Vec3) {
        let forward = direction.normalize_or_zero();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        if forward == Vec3::ZERO || right == Vec3::ZERO {
            return;
        }
        self.forward = forward;
        self.right = right;
        self.up = forward.cross(right);
    }

    /// Recomputes the basis from yaw/pitch in degrees.
    pub fn set_angles(&mut self, yaw_degrees: f32, pitch_degrees: f32) {
        let (yaw, pitch) = (yaw_degrees.to_radians(), pitch_degrees.to_radians());
        self.set_forward(Vec3::new(
            yaw.cos() * pitch.cos(),
            pitch.sin(),
            yaw.sin() * pitch.cos(),
        ));
    }

    /// Derives the half-extents of the image plane at unit distance.
    pub fn set_projection(&mut self, fov_degrees: f32, aspect: f32) {
        self.height = (fov_degrees.to_radians() * 0.5).tan();
        self.width = self.height * aspect;
    }

    pub fn is_orthonormal(&self, tolerance: f32) -> bool {
        let unit = |v: Vec3| (v.length() - 1.0).abs() <= tolerance;
        unit(self.forward)
            && unit(self.right)
            && unit(self.up)
            && self.forward.dot(self.right).abs() <= tolerance
            && self.forward.dot(self.up).abs() <= tolerance
            && self.right.dot(self.up).abs() <= tolerance
            && self.right.cross(self.up).distance(self.forward) <= tolerance
    }
}

/// Integrates keyboard input into camera motion.
///
/// Arrow keys rotate, WASD moves on the horizontal plane, Space/LeftShift move
/// vertically.
#[derive(Debug, Clone)]
pub struct CameraController {
    yaw: f32,
    pitch: f32,
    pub rotate_speed: f32,
    pub move_speed: f32,
}

impl Default for CameraController {
    fn default() -> Self {
        // yaw of -90 degrees faces -Z, matching `Camera::new`
        Self {
            yaw: -90.0,
            pitch: 0.0,
            rotate_speed: 64.0,
            move_speed: 4.0,
        }
    }
}

impl CameraController {
    const PITCH_LIMIT: f32 = 89.0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Advances the camera by `delta` seconds of held input.
    pub fn update(&mut self, camera: &mut Camera, input: &InputState, delta: f32) {
        let rotation = self.rotate_speed * delta;
        if input.is_named_down(NamedKey::Left) {
            self.yaw -= rotation;
        }
        if input.is_named_down(NamedKey::Right) {
            self.yaw += rotation;
        }
        if self.yaw < -360.0 {
            self.yaw += 360.0;
        }
        if self.yaw > 360.0 {
            self.yaw -= 360.0;
        }
        if input.is_named_down(NamedKey::Up) {
            self.pitch += rotation;
        }
        if input.is_named_down(NamedKey::Down) {
            self.pitch -= rotation;
        }
        self.pitch = self.pitch.clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);

        camera.set_angles(self.yaw, self.pitch);

        let step = self.move_speed * delta;
        let ground_forward = Vec3::new(camera.forward.x, 0.0, camera.forward.z);
        let mut offset = Vec3::ZERO;
        if input.is_char_down('W') {
            offset += ground_forward;
        }
        if input.is_char_down('S') {
            offset -= ground_forward;
        }
        if input.is_char_down('A') {
            offset -= camera.right;
        }
        if input.is_char_down('D') {
            offset += camera.right;
        }
        if input.is_named_down(NamedKey::Space) {
            offset += Vec3::Y;
        }
        if input.is_named_down(NamedKey::LeftShift) {
            offset -= Vec3::Y;
        }
        camera.position += offset * step;
    }
}
