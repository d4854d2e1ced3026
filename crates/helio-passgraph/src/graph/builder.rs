//! Declarative graph construction

use super::resource::{resource_name, PassNode, ResourceAccess, ResourceDesc, ResourceState, ResourceUsage};
use super::{CompiledGraph, RenderGraphCompiler};
use crate::pass::{RenderPass, RenderPassConfig};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Collects pass nodes and resource declarations for the compiler
///
/// Passes contribute the usages their config declares: every output becomes a
/// write of `<pass>.<output>`, every input a read of
/// `<source_pass>.<source_target>`. [`read`](Self::read),
/// [`write`](Self::write) and [`read_write`](Self::read_write) add usages to
/// the most recently added pass.
pub struct RenderGraphBuilder {
    nodes: Vec<PassNode>,
    resources: BTreeMap<String, ResourceDesc>,
    default_extent: (u32, u32),
}

impl RenderGraphBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            resources: BTreeMap::new(),
            default_extent: (1280, 720),
        }
    }

    /// Size of resources produced by passes that were never sized
    pub fn with_default_extent(mut self, width: u32, height: u32) -> Self {
        self.default_extent = (width, height);
        self
    }

    /// Add an initialized (or at least configured) pass
    pub fn add_pass(&mut self, pass: &dyn RenderPass) -> Result<&mut Self> {
        self.add_config(pass.config(), pass.base().extent())
    }

    /// Add a pass by its config alone; `extent` sizes its outputs
    pub fn add_config(&mut self, config: &RenderPassConfig, extent: Option<(u32, u32)>) -> Result<&mut Self> {
        if self.nodes.iter().any(|n| n.name == config.name) {
            log::warn!("Render graph already has a pass named '{}'", config.name);
            return Err(Error::DuplicatePass(config.name.clone()));
        }
        let (width, height) = extent.unwrap_or(self.default_extent);

        let mut usages = Vec::with_capacity(config.inputs.len() + config.outputs.len());
        for input in &config.inputs {
            usages.push(ResourceUsage {
                resource: resource_name(&input.source_pass, &input.source_target),
                access: ResourceAccess::Read,
                state: ResourceState::ShaderRead,
                binding: Some(input.name.clone()),
            });
        }
        for output in &config.outputs {
            let resource = resource_name(&config.name, &output.name);
            self.resources
                .entry(resource.clone())
                .or_insert_with(|| ResourceDesc::new(resource.clone(), output.format, width, height));
            usages.push(ResourceUsage {
                resource,
                access: ResourceAccess::Write,
                state: ResourceState::attachment(output.format),
                binding: Some(output.name.clone()),
            });
        }

        self.nodes.push(PassNode {
            name: config.name.clone(),
            pass_index: self.nodes.len(),
            usages,
            dependencies: config.dependencies.clone(),
        });
        Ok(self)
    }

    /// Declare a resource explicitly (e.g. persistent history buffers)
    pub fn declare_resource(&mut self, desc: ResourceDesc) -> Result<&mut Self> {
        if self.resources.contains_key(&desc.name) {
            log::warn!("Render graph resource '{}' declared twice", desc.name);
            return Err(Error::DuplicateResource(desc.name));
        }
        self.resources.insert(desc.name.clone(), desc);
        Ok(self)
    }

    pub fn read(&mut self, resource: &str) -> Result<&mut Self> {
        self.add_usage(resource, ResourceAccess::Read, ResourceState::ShaderRead)
    }

    pub fn write(&mut self, resource: &str) -> Result<&mut Self> {
        let state = self.attachment_state(resource);
        self.add_usage(resource, ResourceAccess::Write, state)
    }

    pub fn read_write(&mut self, resource: &str) -> Result<&mut Self> {
        let state = self.attachment_state(resource);
        self.add_usage(resource, ResourceAccess::ReadWrite, state)
    }

    fn attachment_state(&self, resource: &str) -> ResourceState {
        self.resources
            .get(resource)
            .map(|desc| ResourceState::attachment(desc.format))
            .unwrap_or(ResourceState::RenderTarget)
    }

    fn add_usage(&mut self, resource: &str, access: ResourceAccess, state: ResourceState) -> Result<&mut Self> {
        let Some(node) = self.nodes.last_mut() else {
            return Err(Error::NoPassForUsage(resource.to_string()));
        };
        node.usages.push(ResourceUsage {
            resource: resource.to_string(),
            access,
            state,
            binding: None,
        });
        Ok(self)
    }

    pub fn nodes(&self) -> &[PassNode] {
        &self.nodes
    }

    pub fn resources(&self) -> &BTreeMap<String, ResourceDesc> {
        &self.resources
    }

    pub fn compile(&self) -> Result<CompiledGraph> {
        RenderGraphCompiler::new().compile(self)
    }
}

impl Default for RenderGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::PassType;
    use crate::target::PixelFormat;

    #[test]
    fn usage_before_pass_fails() {
        let mut builder = RenderGraphBuilder::new();
        assert!(matches!(builder.read("history"), Err(Error::NoPassForUsage(_))));
    }

    #[test]
    fn outputs_become_resources() {
        let mut builder = RenderGraphBuilder::new().with_default_extent(64, 32);
        let config = RenderPassConfig::new("gbuf", PassType::Geometry)
            .with_output("albedo", PixelFormat::Rgba8)
            .with_output("depth", PixelFormat::Depth24);
        builder.add_config(&config, None).unwrap();

        let depth = &builder.resources()["gbuf.depth"];
        assert_eq!((depth.width, depth.height), (64, 32));
        let node = &builder.nodes()[0];
        assert_eq!(node.writes().count(), 2);
        assert_eq!(node.usages[1].state, ResourceState::DepthWrite);
    }

    #[test]
    fn duplicate_declarations_rejected() {
        let mut builder = RenderGraphBuilder::new();
        let config = RenderPassConfig::new("a", PassType::Custom);
        builder.add_config(&config, None).unwrap();
        assert!(matches!(builder.add_config(&config, None), Err(Error::DuplicatePass(_))));

        builder.declare_resource(ResourceDesc::new("history", PixelFormat::Rgba16F, 8, 8)).unwrap();
        assert!(builder
            .declare_resource(ResourceDesc::new("history", PixelFormat::Rgba16F, 8, 8))
            .is_err());
    }
}
