//! Runs a compiled graph against a pass list

use super::resource::ResourceState;
use super::CompiledGraph;
use crate::command::RenderCommand;
use crate::device::{BarrierKind, GpuDevice, TextureHandle};
use crate::pass::{ConditionContext, RenderPass};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};

/// Owns a [`CompiledGraph`] and the physical storage of its resources
///
/// Per frame, for each pass in compiled order:
/// 1. create storage for resources first used here (aliases reuse their canonical's storage)
/// 2. issue barriers for this position's sync points
/// 3. bind resource textures as pass inputs/outputs
/// 4. `prepare`, `on_pre_execute`, `execute`, when active with dependencies met
/// 5. destroy storage whose last user (across all aliases) just ran
pub struct RenderGraphExecutor {
    graph: CompiledGraph,
    /// canonical resource -> storage
    physical: HashMap<String, TextureHandle>,
    /// canonical resource -> position after which its storage is dead
    release_after: HashMap<String, usize>,
    states: HashMap<String, ResourceState>,
    frame: u64,
}

impl RenderGraphExecutor {
    pub fn new(graph: CompiledGraph) -> Self {
        let mut release_after: HashMap<String, usize> = HashMap::new();
        for allocation in graph.allocations().iter().filter(|a| !a.persistent) {
            let canonical = allocation.alias_of.clone().unwrap_or_else(|| allocation.resource.clone());
            let last = allocation.destroy_at.saturating_sub(1);
            release_after
                .entry(canonical)
                .and_modify(|at| *at = (*at).max(last))
                .or_insert(last);
        }
        Self {
            graph,
            physical: HashMap::new(),
            release_after,
            states: HashMap::new(),
            frame: 0,
        }
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    /// Storage currently backing `resource`, if alive
    pub fn texture(&self, resource: &str) -> Option<TextureHandle> {
        self.physical.get(self.graph.canonical(resource)).copied()
    }

    /// State recorded for `resource` during the current or last frame
    pub fn resource_state(&self, resource: &str) -> ResourceState {
        self.states.get(resource).copied().unwrap_or(ResourceState::Undefined)
    }

    pub fn live_resource_count(&self) -> usize {
        self.physical.len()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Run one frame. `passes` must be the list the graph was built from.
    pub fn execute(
        &mut self,
        device: &mut dyn GpuDevice,
        passes: &mut [Box<dyn RenderPass>],
        commands: &[RenderCommand],
        conditions: &ConditionContext,
    ) -> Result<()> {
        if passes.len() != self.graph.nodes().len() {
            return Err(Error::GraphMismatch(format!(
                "graph has {} passes, got {}",
                self.graph.nodes().len(),
                passes.len()
            )));
        }
        log::trace!("Executing render graph (frame {})", self.frame);

        let names: Vec<String> = self.graph.nodes().iter().map(|n| n.name.clone()).collect();
        let available: HashSet<&str> = names.iter().map(String::as_str).collect();
        self.states.clear();

        for position in 0..self.graph.nodes().len() {
            let node = &self.graph.nodes()[position];
            let Some(pass) = passes.get_mut(node.pass_index) else {
                return Err(Error::GraphMismatch(format!("no pass at index {}", node.pass_index)));
            };
            if pass.name() != node.name {
                return Err(Error::GraphMismatch(format!(
                    "expected '{}' at index {}, found '{}'",
                    node.name,
                    node.pass_index,
                    pass.name()
                )));
            }

            // storage for everything this pass touches
            for usage in &node.usages {
                let canonical = self.graph.canonical(&usage.resource);
                if self.physical.contains_key(canonical) {
                    continue;
                }
                let Some(desc) = self.graph.resource(canonical) else {
                    continue;
                };
                let texture = device.create_texture(&desc.to_target_desc())?;
                log::trace!("  Allocated '{}' as {:?}", canonical, texture);
                self.physical.insert(canonical.to_string(), texture);
            }

            for sync in self.graph.sync_points_at(position) {
                let barrier = match sync.to {
                    ResourceState::ShaderRead => BarrierKind::TextureFetch,
                    ResourceState::RenderTarget | ResourceState::DepthWrite => BarrierKind::Framebuffer,
                    ResourceState::Undefined => BarrierKind::All,
                };
                device.memory_barrier(barrier);
                self.states.insert(sync.resource.clone(), sync.to);
            }

            for usage in &node.usages {
                let Some(binding) = &usage.binding else {
                    continue;
                };
                let texture = self.physical.get(self.graph.canonical(&usage.resource)).copied();
                if usage.access.writes() {
                    pass.set_output(binding, texture);
                    self.states.insert(usage.resource.clone(), usage.state);
                } else {
                    pass.set_input(binding, texture);
                }
            }

            let active = pass.base().is_active(conditions)
                && pass.check_dependencies(&available, conditions)
                && pass.base().missing_inputs().is_empty();
            if active {
                pass.prepare(device)?;
                pass.on_pre_execute(device, commands)?;
                pass.execute(device, commands)?;
            } else {
                log::trace!("  Skipping pass '{}'", node.name);
            }

            let expired: Vec<String> = self
                .release_after
                .iter()
                .filter(|(_, last)| **last == position)
                .map(|(name, _)| name.clone())
                .collect();
            for name in expired {
                if let Some(texture) = self.physical.remove(&name) {
                    device.destroy_texture(texture);
                    log::trace!("  Released '{}'", name);
                }
                detach_storage(&self.graph, passes, &name);
            }
        }

        self.frame += 1;
        Ok(())
    }

    /// Destroy all remaining storage, persistent resources included
    pub fn shutdown(&mut self, device: &mut dyn GpuDevice) {
        for (_, texture) in self.physical.drain() {
            device.destroy_texture(texture);
        }
        self.states.clear();
    }
}

/// Unbind released storage from every pass that used it under any alias,
/// so no framebuffer or input keeps a destroyed handle
fn detach_storage(graph: &CompiledGraph, passes: &mut [Box<dyn RenderPass>], canonical: &str) {
    for node in graph.nodes() {
        let Some(pass) = passes.get_mut(node.pass_index) else {
            continue;
        };
        for usage in &node.usages {
            let Some(binding) = &usage.binding else {
                continue;
            };
            if graph.canonical(&usage.resource) != canonical {
                continue;
            }
            if usage.access.writes() {
                pass.set_output(binding, None);
            } else {
                pass.set_input(binding, None);
            }
        }
    }
}
