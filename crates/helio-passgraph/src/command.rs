//! Per-frame draw submissions and the material capability passes consume

use crate::context::FrameUniforms;
use crate::device::GpuDevice;
use crate::pass::FurParams;
use bitflags::bitflags;
use glam::Mat4;
use std::sync::Arc;

bitflags! {
    /// Which passes should consume a [`RenderCommand`].
    /// The empty set means "no pass".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderPassFlag: u32 {
        const BASE_COLOR  = 1 << 0;
        const GEOMETRY    = 1 << 1;
        const TRANSPARENT = 1 << 2;
        const SHADOWING   = 1 << 3;
        const BACKGROUND  = 1 << 4;
        const BLIT        = 1 << 5;
        const DEPTH_PRE   = 1 << 6;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RenderMode {
    Opaque,
    Transparent,
    Wireframe,
    Points,
    Lines,
}

/// Unpacked vertex as submitted by the application (32 bytes)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, normal, uv }
    }
}

/// Shader program plus its parameters, as seen by a pass
///
/// Passes call `apply`, `update_uniforms` and `bind_textures` once per command,
/// then `set_transform` with the command's world matrix.
pub trait Material: Send + Sync {
    fn name(&self) -> &str;

    /// Make this material's program current
    fn apply(&self, device: &mut dyn GpuDevice);

    fn update_uniforms(&self, _device: &mut dyn GpuDevice, _frame: &FrameUniforms) {}

    fn bind_textures(&self, _device: &mut dyn GpuDevice) {}

    fn set_transform(&self, device: &mut dyn GpuDevice, transform: &Mat4) {
        device.set_uniform_mat4("u_model", transform);
    }

    /// Fur shell parameters, for materials that render as fur
    fn fur_params(&self) -> Option<&FurParams> {
        None
    }
}

/// One drawable unit, rebuilt by the application every frame
#[derive(Clone)]
pub struct RenderCommand {
    pub material: Arc<dyn Material>,
    pub vertices: Arc<[Vertex]>,
    pub indices: Arc<[u32]>,
    pub transform: Mat4,
    pub mode: RenderMode,
    pub has_uvs: bool,
    pub flags: RenderPassFlag,
}

impl RenderCommand {
    pub fn new(material: Arc<dyn Material>, vertices: impl Into<Arc<[Vertex]>>, indices: impl Into<Arc<[u32]>>) -> Self {
        Self {
            material,
            vertices: vertices.into(),
            indices: indices.into(),
            transform: Mat4::IDENTITY,
            mode: RenderMode::Opaque,
            has_uvs: true,
            flags: RenderPassFlag::GEOMETRY,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_flags(mut self, flags: RenderPassFlag) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_uvs(mut self, has_uvs: bool) -> Self {
        self.has_uvs = has_uvs;
        self
    }

    /// Commands without vertices or indices draw nothing and are skipped
    pub fn is_drawable(&self) -> bool {
        !self.vertices.is_empty() && !self.indices.is_empty()
    }

    /// True when any of this command's flags is in `mask`
    pub fn targets(&self, mask: RenderPassFlag) -> bool {
        self.flags.intersects(mask)
    }
}

impl std::fmt::Debug for RenderCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCommand")
            .field("material", &self.material.name())
            .field("vertices", &self.vertices.len())
            .field("indices", &self.indices.len())
            .field("mode", &self.mode)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Unit quad in the XY plane facing +Z
pub fn quad_mesh(half_size: f32) -> (Vec<Vertex>, Vec<u32>) {
    let s = half_size;
    let n = [0.0, 0.0, 1.0];
    let vertices = vec![
        Vertex::new([-s, -s, 0.0], n, [0.0, 1.0]),
        Vertex::new([s, -s, 0.0], n, [1.0, 1.0]),
        Vertex::new([s, s, 0.0], n, [1.0, 0.0]),
        Vertex::new([-s, s, 0.0], n, [0.0, 0.0]),
    ];
    (vertices, vec![0, 1, 2, 0, 2, 3])
}
