//! Graph resources, usages and the per-resource results of compilation

use crate::pass::PassDependency;
use crate::target::{PixelFormat, RenderTargetDesc};

/// Graph name of a pass output: `<pass>.<output>`
pub fn resource_name(pass: &str, output: &str) -> String {
    format!("{}.{}", pass, output)
}

/// Tracked GPU state of a resource between passes
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Never written this frame
    Undefined,
    RenderTarget,
    DepthWrite,
    ShaderRead,
}

impl ResourceState {
    /// State a pass needs to render into an image of `format`
    pub fn attachment(format: PixelFormat) -> Self {
        if format.is_depth() {
            ResourceState::DepthWrite
        } else {
            ResourceState::RenderTarget
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceAccess {
    Read,
    Write,
    ReadWrite,
}

impl ResourceAccess {
    pub fn reads(&self) -> bool {
        matches!(self, ResourceAccess::Read | ResourceAccess::ReadWrite)
    }

    pub fn writes(&self) -> bool {
        matches!(self, ResourceAccess::Write | ResourceAccess::ReadWrite)
    }
}

/// Storage a graph resource needs
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDesc {
    pub name: String,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Lives across frames: never aliased, only destroyed at executor shutdown
    pub persistent: bool,
}

impl ResourceDesc {
    pub fn new(name: impl Into<String>, format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            format,
            width,
            height,
            persistent: false,
        }
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    /// Aliasing requires identical storage
    pub fn storage_key(&self) -> (PixelFormat, u32, u32) {
        (self.format, self.width, self.height)
    }

    pub fn to_target_desc(&self) -> RenderTargetDesc {
        RenderTargetDesc::for_format(self.name.clone(), self.format, self.width, self.height)
    }
}

/// One read or write of a resource by a pass
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceUsage {
    pub resource: String,
    pub access: ResourceAccess,
    /// State the resource must be in while this pass runs
    pub state: ResourceState,
    /// Pass-local input or output name the resource is bound to
    pub binding: Option<String>,
}

/// A pass as seen by the compiler: metadata only, the pass itself stays with its owner
#[derive(Debug, Clone)]
pub struct PassNode {
    pub name: String,
    /// Index into the pass list handed to the builder
    pub pass_index: usize,
    pub usages: Vec<ResourceUsage>,
    pub dependencies: Vec<PassDependency>,
}

impl PassNode {
    pub fn reads(&self) -> impl Iterator<Item = &ResourceUsage> {
        self.usages.iter().filter(|u| u.access.reads())
    }

    pub fn writes(&self) -> impl Iterator<Item = &ResourceUsage> {
        self.usages.iter().filter(|u| u.access.writes())
    }

    pub fn uses(&self, resource: &str) -> bool {
        self.usages.iter().any(|u| u.resource == resource)
    }
}

/// Inclusive span of compiled-order positions using a resource
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ResourceLifetime {
    pub first_use: usize,
    pub last_use: usize,
}

impl ResourceLifetime {
    pub fn overlaps(&self, other: &ResourceLifetime) -> bool {
        !(self.last_use < other.first_use || other.last_use < self.first_use)
    }
}

/// State transition required before the pass at `position` runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPoint {
    pub position: usize,
    pub resource: String,
    pub from: ResourceState,
    pub to: ResourceState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAllocation {
    pub resource: String,
    /// Canonical resource whose storage this one reuses
    pub alias_of: Option<String>,
    pub create_at: usize,
    /// One past the last use
    pub destroy_at: usize,
    pub persistent: bool,
}
