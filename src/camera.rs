//! Camera state and the controller-binding contract.
//!
//! [`Camera`] is plain state: position, orientation, projection parameters,
//! and the matrices derived from them. Input is routed through whichever
//! [`CameraController`] is currently bound; the pipeline rebinds the
//! controller when the camera-control option changes, calling
//! [`CameraController::on_bind`] so the new controller can sync its
//! internal state to wherever the camera currently is.

use glam::{Mat4, Vec3};

use crate::input::Input;

/// A perspective camera.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 8.0),
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: 55f32.to_radians(),
            near: 0.1,
            far: 200.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn looking_at(mut self, target: Vec3) -> Self {
        self.forward = (target - self.position).normalize_or(Vec3::NEG_Z);
        self
    }

    pub fn with_fov_degrees(mut self, fov: f32) -> Self {
        self.fov = fov.to_radians();
        self
    }

    /// World-to-view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward, self.up)
    }

    /// View matrix with translation removed, for skybox rendering.
    pub fn sky_view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(Vec3::ZERO, self.forward, self.up)
    }

    /// View-to-clip matrix for the given aspect ratio.
    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov, aspect, self.near, self.far)
    }

    /// The right vector from forward and up.
    pub fn right(&self) -> Vec3 {
        self.forward.cross(self.up).normalize_or(Vec3::X)
    }
}

/// Something that moves a camera in response to input.
///
/// Exactly one controller is bound at a time; swapping controllers calls
/// `on_bind` on the incoming one so it can adopt the camera's pose instead
/// of snapping it back to stale internal state.
pub trait CameraController {
    /// Called when this controller takes over the camera.
    fn on_bind(&mut self, camera: &Camera);

    /// Advance the camera by one frame of input.
    fn update(&mut self, camera: &mut Camera, input: &Input, dt: f32);
}

/// Mouse-look flight: WASD planar movement, Space/Shift vertical.
pub struct FlyController {
    pub speed: f32,
    pub sensitivity: f32,
    yaw: f32,
    pitch: f32,
}

impl Default for FlyController {
    fn default() -> Self {
        Self {
            speed: 6.0,
            sensitivity: 0.0025,
            yaw: -std::f32::consts::FRAC_PI_2,
            pitch: 0.0,
        }
    }
}

impl FlyController {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CameraController for FlyController {
    fn on_bind(&mut self, camera: &Camera) {
        self.yaw = camera.forward.z.atan2(camera.forward.x);
        self.pitch = camera.forward.y.asin();
    }

    fn update(&mut self, camera: &mut Camera, input: &Input, dt: f32) {
        use winit::event::MouseButton;
        use winit::keyboard::KeyCode;

        if input.mouse_down(MouseButton::Right) {
            let delta = input.mouse_delta() * self.sensitivity;
            self.yaw += delta.x;
            self.pitch = (self.pitch - delta.y).clamp(-1.54, 1.54);
        }

        camera.forward = Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize();

        let mut movement = Vec3::ZERO;
        if input.key_down(KeyCode::KeyW) {
            movement += camera.forward;
        }
        if input.key_down(KeyCode::KeyS) {
            movement -= camera.forward;
        }
        if input.key_down(KeyCode::KeyD) {
            movement += camera.right();
        }
        if input.key_down(KeyCode::KeyA) {
            movement -= camera.right();
        }
        if input.key_down(KeyCode::Space) {
            movement += Vec3::Y;
        }
        if input.key_down(KeyCode::ShiftLeft) {
            movement -= Vec3::Y;
        }
        camera.position += movement.normalize_or_zero() * self.speed * dt;
    }
}

/// Orbit around a focal point: drag to rotate, scroll to zoom.
pub struct OrbitController {
    pub target: Vec3,
    pub sensitivity: f32,
    distance: f32,
    yaw: f32,
    pitch: f32,
}

impl Default for OrbitController {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            sensitivity: 0.005,
            distance: 8.0,
            yaw: std::f32::consts::FRAC_PI_2,
            pitch: 0.3,
        }
    }
}

impl OrbitController {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CameraController for OrbitController {
    fn on_bind(&mut self, camera: &Camera) {
        let offset = camera.position - self.target;
        self.distance = offset.length().max(0.5);
        self.yaw = offset.z.atan2(offset.x);
        self.pitch = (offset.y / self.distance).clamp(-1.0, 1.0).asin();
    }

    fn update(&mut self, camera: &mut Camera, input: &Input, dt: f32) {
        use winit::event::MouseButton;
        let _ = dt;

        if input.mouse_down(MouseButton::Right) {
            let delta = input.mouse_delta() * self.sensitivity;
            self.yaw += delta.x;
            self.pitch = (self.pitch + delta.y).clamp(-1.54, 1.54);
        }
        self.distance = (self.distance * (1.0 - input.scroll_delta().y * 0.1)).clamp(0.5, 100.0);

        let offset = Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        ) * self.distance;
        camera.position = self.target + offset;
        camera.forward = (self.target - camera.position).normalize_or(Vec3::NEG_Z);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_matrix_places_camera_at_origin() {
        let camera = Camera::default();
        let view = camera.view_matrix();
        let eye = view.transform_point3(camera.position);
        assert!(eye.length() < 1e-5);
    }

    #[test]
    fn sky_view_has_no_translation() {
        let camera = Camera::default().at(Vec3::new(10.0, 5.0, -3.0));
        let sky = camera.sky_view_matrix();
        assert!(sky.w_axis.truncate().length() < 1e-6);
    }

    #[test]
    fn orbit_bind_adopts_current_pose() {
        let camera = Camera::default().at(Vec3::new(0.0, 0.0, 5.0));
        let mut orbit = OrbitController::new();
        orbit.on_bind(&camera);
        assert!((orbit.distance - 5.0).abs() < 1e-5);
    }

    #[test]
    fn looking_at_normalizes_forward() {
        let camera = Camera::default()
            .at(Vec3::ZERO)
            .looking_at(Vec3::new(10.0, 0.0, 0.0));
        assert!((camera.forward - Vec3::X).length() < 1e-6);
    }
}
