//! Helio Pass Graph - render pass orchestration for Helio
//!
//! Independent rendering stages (shadow, geometry, lighting, post-process,
//! skybox, custom effects) declare the textures they read and write plus the
//! passes they depend on. This crate turns those declarations into a safe
//! execution order:
//!
//! - `RenderPassManager` runs registered passes after a dependency sort and
//!   wires each pass's inputs to upstream outputs
//! - `RenderGraphBuilder` / `RenderGraphCompiler` derive a dependency graph from
//!   explicit dependencies and resource reads/writes, then compute lifetimes,
//!   aliasing and sync points
//! - `RenderGraphExecutor` walks the compiled order, creating and destroying
//!   transient render targets as their lifetimes begin and end
//!
//! All GPU work goes through the [`device::GpuDevice`] seam, so the same
//! orchestration runs on wgpu or on the in-memory [`device::HeadlessDevice`].

pub mod command;
pub mod context;
pub mod device;
pub mod graph;
pub mod pass;
pub mod target;
pub mod threading;

mod manager;

pub use command::{Material, RenderCommand, RenderMode, RenderPassFlag, Vertex};
pub use context::{Camera, FrameUniforms, Light, RenderContext, RenderView};
pub use device::{GpuDevice, HeadlessDevice};
pub use graph::{CompiledGraph, RenderGraphBuilder, RenderGraphCompiler, RenderGraphExecutor};
pub use manager::{ManagerConfig, RenderPassManager};
pub use pass::{RenderPass, RenderPassConfig};
pub use target::{MultiRenderTarget, PixelFormat, RenderTarget, RenderTargetDesc, RenderTargetType};

/// Result type for pass graph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or running passes
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Pass '{0}' is already registered")]
    DuplicatePass(String),

    #[error("Pass '{0}' not found")]
    UnknownPass(String),

    #[error("Render target '{0}' already exists")]
    DuplicateTarget(String),

    #[error("Post effect '{0}' already added")]
    DuplicateEffect(String),

    #[error("Graph resource '{0}' already declared")]
    DuplicateResource(String),

    #[error("Render target '{0}' is already initialized")]
    AlreadyInitialized(String),

    #[error("Framebuffer '{name}' is incomplete: {status:?}")]
    IncompleteFramebuffer {
        name: String,
        status: device::FramebufferStatus,
    },

    #[error("Pass '{0}' has no view and no viewport; cannot size its framebuffer")]
    MissingExtent(String),

    #[error("Cyclic dependency between passes: {}", .passes.join(" -> "))]
    CyclicDependency { passes: Vec<String> },

    #[error("Resource usage '{0}' declared before any pass was added")]
    NoPassForUsage(String),

    #[error("Compiled graph does not match pass list: {0}")]
    GraphMismatch(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("WGPU error: {0}")]
    Wgpu(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<wgpu::Error> for Error {
    fn from(err: wgpu::Error) -> Self {
        Error::Wgpu(err.to_string())
    }
}
