//! GPU device seam
//!
//! Passes and render targets never talk to a graphics API directly. They drive
//! a [`GpuDevice`], an immediate-mode interface shaped after the classic
//! bind/attach/clear/draw model:
//!
//! - textures and framebuffers are created and destroyed explicitly
//! - exactly one framebuffer is bound at a time (`None` = the screen)
//! - global render state (depth, blend, cull, viewport) can be saved and restored
//!
//! Two implementations ship with the crate: [`HeadlessDevice`] (in-memory,
//! records every call, used by tests and tools) and [`WgpuDevice`].

mod headless;
mod wgpu_backend;

pub use headless::{DeviceCommand, DeviceStats, HeadlessDevice};
pub use wgpu_backend::WgpuDevice;

use crate::command::{RenderMode, Vertex};
use crate::target::RenderTargetDesc;
use crate::Result;
use bitflags::bitflags;
use glam::Mat4;

/// Handle to a device texture
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct TextureHandle(pub u64);

/// Handle to a device framebuffer object
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct FramebufferHandle(pub u64);

/// Handle to a linked shader program, owned by whoever compiled it
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ProgramHandle(pub u64);

/// Framebuffer attachment point
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Attachment {
    Color(u32),
    Depth,
    Stencil,
    DepthStencil,
}

/// Completeness of a framebuffer, checked before drawing into it
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    MissingAttachment,
    MismatchedDimensions,
    InvalidAttachment,
    Unknown,
}

bitflags! {
    /// Which buffers a clear touches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Values written by a clear
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
            stencil: 0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DepthFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    Always,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlendMode {
    /// src * alpha + dst * (1 - alpha)
    Alpha,
    Additive,
    Premultiplied,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CullMode {
    None,
    Back,
    Front,
}

/// Global fixed-function state that passes change and must restore
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RenderState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: DepthFunc,
    pub blend: Option<BlendMode>,
    pub cull: CullMode,
    pub viewport: Viewport,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            depth_func: DepthFunc::Less,
            blend: None,
            cull: CullMode::Back,
            viewport: Viewport::default(),
        }
    }
}

/// Memory barrier issued at a sync point
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BarrierKind {
    /// Make attachment writes visible to texture fetches
    TextureFetch,
    /// Make prior writes visible to framebuffer attachment access
    Framebuffer,
    All,
}

/// Immediate-mode graphics device
///
/// Every method is synchronous. Implementations must tolerate destroying
/// handles they no longer know about (logging, not failing).
pub trait GpuDevice: Send {
    /// Short backend name for logs
    fn backend_name(&self) -> &str;

    fn create_texture(&mut self, desc: &RenderTargetDesc) -> Result<TextureHandle>;
    fn destroy_texture(&mut self, texture: TextureHandle);

    fn create_framebuffer(&mut self, label: &str) -> Result<FramebufferHandle>;
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Attach (or with `None`, detach) a texture at an attachment point
    fn attach_texture(&mut self, framebuffer: FramebufferHandle, attachment: Attachment, texture: Option<TextureHandle>);

    /// Select which color attachments fragment outputs write to
    fn set_draw_buffers(&mut self, framebuffer: FramebufferHandle, buffers: &[u32]);

    fn framebuffer_status(&self, framebuffer: FramebufferHandle) -> FramebufferStatus;

    /// Bind a framebuffer for drawing, `None` binds the default (screen) target
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);

    fn set_viewport(&mut self, viewport: Viewport);
    fn clear(&mut self, flags: ClearFlags, values: &ClearValues);

    /// Bind a texture to a sampler unit, `None` unbinds the unit
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>);

    fn render_state(&self) -> RenderState;
    fn set_render_state(&mut self, state: &RenderState);

    fn memory_barrier(&mut self, barrier: BarrierKind);

    fn use_program(&mut self, program: ProgramHandle);

    /// Set a matrix uniform on the currently applied program
    fn set_uniform_mat4(&mut self, name: &str, value: &Mat4);

    fn draw_indexed(&mut self, vertices: &[Vertex], indices: &[u32], mode: RenderMode);
    fn draw_fullscreen_quad(&mut self);

    /// Submit pending work. Immediate backends have nothing to do.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
