//! Scene-facing collaborators passes read from: view size, camera, light

use glam::{Mat4, Vec3};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// Output surface size, used to size pass framebuffers and viewports
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RenderView {
    pub width: u32,
    pub height: u32,
}

impl RenderView {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// Camera with separate view and projection matrices
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
}

impl Camera {
    pub fn new(view: Mat4, projection: Mat4, position: Vec3) -> Self {
        Self { view, projection, position }
    }

    pub fn perspective(position: Vec3, target: Vec3, up: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            view: Mat4::look_at_rh(position, target, up),
            projection: Mat4::perspective_rh(fov_y, aspect, near, far),
            position,
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view
    }

    /// View matrix without translation, for geometry at infinity (skybox)
    pub fn rotation_only_view(&self) -> Mat4 {
        let mut view = self.view;
        view.w_axis = glam::Vec4::W;
        view
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Light {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Light {
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            color,
            intensity,
        }
    }

    /// Orthographic light-space matrix covering a cube of `half_extent` around the origin
    pub fn view_proj(&self, half_extent: f32) -> Mat4 {
        let eye = -self.direction * half_extent * 2.0;
        let up = if self.direction.abs().y > 0.99 { Vec3::Z } else { Vec3::Y };
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, up);
        let proj = Mat4::orthographic_rh(
            -half_extent,
            half_extent,
            -half_extent,
            half_extent,
            0.1,
            half_extent * 4.0,
        );
        proj * view
    }
}

impl Default for Light {
    fn default() -> Self {
        Self::directional(Vec3::new(-0.3, -1.0, -0.4), Vec3::ONE, 1.0)
    }
}

/// Per-frame values handed to `Material::update_uniforms`
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_proj: Mat4,
    pub camera_position: Vec3,
    pub time: f32,
    pub light_direction: Vec3,
    pub light_intensity: f32,
    pub light_color: Vec3,
    pub _pad: f32,
}

/// Camera and light shared by every pass of a manager
///
/// The camera is held weakly: the application owns it and may drop it, in
/// which case passes render with identity matrices.
#[derive(Default)]
pub struct RenderContext {
    camera: RwLock<Weak<Camera>>,
    light: RwLock<Light>,
    time: RwLock<f32>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_camera(&self, camera: &Arc<Camera>) {
        *self.camera.write() = Arc::downgrade(camera);
    }

    pub fn detach_camera(&self) {
        *self.camera.write() = Weak::new();
    }

    pub fn camera(&self) -> Option<Arc<Camera>> {
        self.camera.read().upgrade()
    }

    pub fn default_light(&self) -> Light {
        *self.light.read()
    }

    pub fn set_default_light(&self, light: Light) {
        *self.light.write() = light;
    }

    /// Seconds since the application started, set once per frame
    pub fn set_time(&self, seconds: f32) {
        *self.time.write() = seconds;
    }

    pub fn time(&self) -> f32 {
        *self.time.read()
    }

    pub fn frame_uniforms(&self) -> FrameUniforms {
        let time = self.time();
        let camera = self.camera();
        let light = self.default_light();
        let (view, projection, position) = match camera.as_deref() {
            Some(cam) => (cam.view, cam.projection, cam.position),
            None => (Mat4::IDENTITY, Mat4::IDENTITY, Vec3::ZERO),
        };
        FrameUniforms {
            view,
            projection,
            view_proj: projection * view,
            camera_position: position,
            time,
            light_direction: light.direction,
            light_intensity: light.intensity,
            light_color: light.color,
            _pad: 0.0,
        }
    }
}
