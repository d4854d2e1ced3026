//! Render graph with automatic ordering and transient resource management
//!
//! Passes are added to a [`RenderGraphBuilder`] (usually straight from their
//! configs), the [`RenderGraphCompiler`] orders them and analyses resource
//! usage, and a [`RenderGraphExecutor`] owns the resulting [`CompiledGraph`]
//! and drives the passes frame after frame.
//!
//! Dependency edges come from two sources:
//! - explicit: pass B names pass A in its dependency list
//! - implicit: pass B reads a resource pass A writes
//!
//! A cycle fails compilation with [`crate::Error::CyclicDependency`].

mod builder;
mod compiler;
mod executor;
mod resource;
mod visualize;

pub use builder::RenderGraphBuilder;
pub use compiler::RenderGraphCompiler;
pub use executor::RenderGraphExecutor;
pub use resource::{
    resource_name, PassNode, ResourceAccess, ResourceAllocation, ResourceDesc, ResourceLifetime, ResourceState,
    ResourceUsage, SyncPoint,
};
pub use visualize::{to_dot, write_dot};

pub(crate) use compiler::find_cycle;

use std::collections::BTreeMap;

/// Immutable result of compilation
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    /// Indices into the builder's pass list, in execution order
    order: Vec<usize>,
    /// Pass nodes in execution order
    nodes: Vec<PassNode>,
    resources: BTreeMap<String, ResourceDesc>,
    /// alias -> canonical
    aliases: BTreeMap<String, String>,
    lifetimes: BTreeMap<String, ResourceLifetime>,
    sync_points: Vec<SyncPoint>,
    allocations: Vec<ResourceAllocation>,
}

impl CompiledGraph {
    pub fn execution_order(&self) -> &[usize] {
        &self.order
    }

    pub fn nodes(&self) -> &[PassNode] {
        &self.nodes
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// Position of a pass in execution order
    pub fn position(&self, pass: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == pass)
    }

    pub fn resources(&self) -> &BTreeMap<String, ResourceDesc> {
        &self.resources
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceDesc> {
        self.resources.get(name)
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    pub fn alias_of(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    /// Resource whose storage backs `name`
    pub fn canonical<'a>(&'a self, name: &'a str) -> &'a str {
        self.alias_of(name).unwrap_or(name)
    }

    pub fn lifetimes(&self) -> &BTreeMap<String, ResourceLifetime> {
        &self.lifetimes
    }

    pub fn lifetime(&self, name: &str) -> Option<ResourceLifetime> {
        self.lifetimes.get(name).copied()
    }

    pub fn sync_points(&self) -> &[SyncPoint] {
        &self.sync_points
    }

    pub fn sync_points_at(&self, position: usize) -> impl Iterator<Item = &SyncPoint> {
        self.sync_points.iter().filter(move |sp| sp.position == position)
    }

    pub fn allocations(&self) -> &[ResourceAllocation] {
        &self.allocations
    }

    pub fn allocation(&self, name: &str) -> Option<&ResourceAllocation> {
        self.allocations.iter().find(|a| a.resource == name)
    }

    /// Number of distinct storages after aliasing
    pub fn physical_resource_count(&self) -> usize {
        self.resources.len() - self.aliases.len()
    }
}
