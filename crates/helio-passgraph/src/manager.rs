//! Pass registry and frame driver

use crate::command::RenderCommand;
use crate::context::{RenderContext, RenderView};
use crate::device::{GpuDevice, TextureHandle};
use crate::graph::{find_cycle, CompiledGraph, RenderGraphBuilder, RenderGraphExecutor};
use crate::pass::{ConditionContext, RenderPass, RenderPassConfig};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Manager configuration
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Compile passes through the render graph instead of the dependency sorter
    pub use_render_graph: bool,
    /// Resource size for passes that were never sized (graph mode)
    pub default_extent: (u32, u32),
    /// Call `GpuDevice::flush` after every frame
    pub flush_each_frame: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            use_render_graph: false,
            default_extent: (1280, 720),
            flush_each_frame: true,
        }
    }
}

impl ManagerConfig {
    pub fn with_render_graph(mut self, enabled: bool) -> Self {
        self.use_render_graph = enabled;
        self
    }

    pub fn with_default_extent(mut self, width: u32, height: u32) -> Self {
        self.default_extent = (width, height);
        self
    }

    pub fn with_flush(mut self, flush_each_frame: bool) -> Self {
        self.flush_each_frame = flush_each_frame;
        self
    }
}

/// Ordered registry of passes that runs them once per frame
///
/// Two execution paths:
/// - sorter (default): passes are ordered by their required dependencies, and
///   each input is wired to the named output of its source pass
/// - render graph: passes are compiled through [`RenderGraphBuilder`] and run by
///   a [`RenderGraphExecutor`], which also owns transient storage
///
/// Ordering is recomputed only after the pass set or a pass config changed.
/// Both paths refuse to run a frame whose passes form a cycle.
pub struct RenderPassManager {
    config: ManagerConfig,
    passes: Vec<Box<dyn RenderPass>>,
    order: Vec<usize>,
    dirty: bool,
    conditions: ConditionContext,
    context: Arc<RenderContext>,
    view: Option<RenderView>,
    executor: Option<RenderGraphExecutor>,
    last_executed: Vec<String>,
    frame: u64,
}

impl RenderPassManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            passes: Vec::new(),
            order: Vec::new(),
            dirty: true,
            conditions: ConditionContext::new(),
            context: Arc::new(RenderContext::new()),
            view: None,
            executor: None,
            last_executed: Vec::new(),
            frame: 0,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn set_use_render_graph(&mut self, enabled: bool) {
        if self.config.use_render_graph != enabled {
            self.config.use_render_graph = enabled;
            self.dirty = true;
        }
    }

    /// Camera/light context handed to passes at initialization
    pub fn context(&self) -> &Arc<RenderContext> {
        &self.context
    }

    pub fn conditions(&self) -> &ConditionContext {
        &self.conditions
    }

    /// Set a flag read by conditional dependencies and conditional passes
    pub fn set_condition(&mut self, name: &str, value: bool) {
        self.conditions.set(name, value);
    }

    pub fn view(&self) -> Option<RenderView> {
        self.view
    }

    pub fn set_view(&mut self, view: Option<RenderView>) {
        self.view = view;
    }

    /// Register a pass. Names are unique; on a clash nothing changes.
    pub fn add_pass(&mut self, pass: impl RenderPass + 'static) -> Result<()> {
        self.add_boxed_pass(Box::new(pass))
    }

    pub fn add_boxed_pass(&mut self, pass: Box<dyn RenderPass>) -> Result<()> {
        if self.passes.iter().any(|p| p.name() == pass.name()) {
            log::warn!("Pass '{}' is already registered", pass.name());
            return Err(Error::DuplicatePass(pass.name().to_string()));
        }
        log::info!("Registered pass '{}' ({:?})", pass.name(), pass.config().pass_type);
        self.passes.push(pass);
        self.dirty = true;
        Ok(())
    }

    /// Unregister a pass and hand it back; the caller shuts it down
    pub fn remove_pass(&mut self, name: &str) -> Option<Box<dyn RenderPass>> {
        let index = self.passes.iter().position(|p| p.name() == name)?;
        self.dirty = true;
        let mut pass = self.passes.remove(index);
        if self.executor.is_some() {
            detach_bindings(pass.as_mut());
        }
        Some(pass)
    }

    pub fn get_pass(&self, name: &str) -> Option<&dyn RenderPass> {
        self.passes.iter().find(|p| p.name() == name).map(|p| p.as_ref())
    }

    /// Mutable access; assumes the config may change and schedules a re-sort
    pub fn get_pass_mut(&mut self, name: &str) -> Option<&mut (dyn RenderPass + 'static)> {
        let pass = self.passes.iter_mut().find(|p| p.name() == name)?;
        self.dirty = true;
        Some(pass.as_mut())
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Initialize every pass not yet initialized with the current view and context
    pub fn initialize_all(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        for pass in self.passes.iter_mut().filter(|p| !p.is_initialized()) {
            pass.initialize(device, self.view, Some(self.context.clone()))?;
        }
        Ok(())
    }

    pub fn resize(&mut self, device: &mut dyn GpuDevice, width: u32, height: u32) -> Result<()> {
        self.view = Some(RenderView::new(width, height));
        for pass in &mut self.passes {
            pass.resize(device, width, height)?;
        }
        self.dirty = true;
        Ok(())
    }

    /// Names in the current execution order (empty until the first sort)
    pub fn execution_order(&self) -> Vec<&str> {
        self.order.iter().filter_map(|&i| self.passes.get(i)).map(|p| p.name()).collect()
    }

    /// Passes that actually executed in the last frame, in order
    pub fn last_executed(&self) -> &[String] {
        &self.last_executed
    }

    pub fn compiled_graph(&self) -> Option<&CompiledGraph> {
        self.executor.as_ref().map(|e| e.graph())
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Free the executor's storage and detach it from every pass
    fn release_executor(&mut self, device: &mut dyn GpuDevice) {
        let Some(mut executor) = self.executor.take() else {
            return;
        };
        executor.shutdown(device);
        for pass in &mut self.passes {
            detach_bindings(pass.as_mut());
        }
    }

    fn ensure_sorted(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        if self.config.use_render_graph {
            let (width, height) = self.config.default_extent;
            let mut builder = RenderGraphBuilder::new().with_default_extent(width, height);
            for pass in &self.passes {
                builder.add_pass(pass.as_ref())?;
            }
            let graph = builder.compile()?;
            self.order = graph.execution_order().to_vec();
            self.release_executor(device);
            self.executor = Some(RenderGraphExecutor::new(graph));
        } else {
            self.release_executor(device);
            let configs: Vec<&RenderPassConfig> = self.passes.iter().map(|p| p.config()).collect();
            let (order, unsorted) = dependency_sort(&configs);
            if !unsorted.is_empty() {
                let names: Vec<&str> = configs.iter().map(|c| c.name.as_str()).collect();
                let cycle = find_cycle(&names, required_edges(&configs));
                let passes = if cycle.is_empty() {
                    unsorted.iter().map(|&i| names[i].to_string()).collect()
                } else {
                    cycle
                };
                log::error!("Circular dependency between passes: {}", passes.join(" -> "));
                return Err(Error::CyclicDependency { passes });
            }
            self.order = order;
        }

        log::debug!("Pass order: {:?}", self.execution_order());
        self.dirty = false;
        Ok(())
    }

    /// Run one frame over `commands`
    pub fn execute_all(&mut self, device: &mut dyn GpuDevice, commands: &[RenderCommand]) -> Result<()> {
        self.ensure_sorted(device)?;
        self.last_executed.clear();
        let before: Vec<u64> = self.passes.iter().map(|p| p.stats().executions).collect();

        if self.config.use_render_graph {
            if let Some(executor) = &mut self.executor {
                executor.execute(device, &mut self.passes, commands, &self.conditions)?;
            }
        } else {
            self.execute_sorted(device, commands)?;
        }

        for &index in &self.order {
            if self.passes[index].stats().executions > before[index] {
                self.last_executed.push(self.passes[index].name().to_string());
            }
        }
        if self.config.flush_each_frame {
            device.flush()?;
        }
        self.frame += 1;
        Ok(())
    }

    fn execute_sorted(&mut self, device: &mut dyn GpuDevice, commands: &[RenderCommand]) -> Result<()> {
        let names: Vec<String> = self.passes.iter().map(|p| p.name().to_string()).collect();
        let available: HashSet<&str> = names.iter().map(String::as_str).collect();
        let index: HashMap<&str, usize> = names.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();

        for position in 0..self.order.len() {
            let current = self.order[position];

            let wiring: Vec<(String, Option<TextureHandle>)> = self.passes[current]
                .config()
                .inputs
                .iter()
                .map(|input| {
                    let texture = index
                        .get(input.source_pass.as_str())
                        .and_then(|&source| self.passes[source].output_texture(&input.source_target));
                    (input.name.clone(), texture)
                })
                .collect();

            let pass = &mut self.passes[current];
            for (name, texture) in wiring {
                pass.set_input(&name, texture);
            }

            if !pass.base().is_active(&self.conditions) {
                log::trace!("Pass '{}' inactive", pass.name());
                continue;
            }
            if !pass.check_dependencies(&available, &self.conditions) {
                continue;
            }
            let missing = pass.base().missing_inputs();
            if !missing.is_empty() {
                log::warn!("Pass '{}' skipped, missing inputs: {:?}", pass.name(), missing);
                continue;
            }

            pass.prepare(device)?;
            pass.on_pre_execute(device, commands)?;
            pass.execute(device, commands)?;
        }
        Ok(())
    }

    pub fn shutdown(&mut self, device: &mut dyn GpuDevice) {
        self.release_executor(device);
        for pass in &mut self.passes {
            pass.shutdown(device);
        }
        self.dirty = true;
        log::info!("Pass manager shut down after {} frames", self.frame);
    }
}

impl Default for RenderPassManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

/// Edges (dependency -> dependent) for required dependencies on registered passes
/// Drop every output override and input a graph executor may have installed
fn detach_bindings(pass: &mut dyn RenderPass) {
    let config = pass.config();
    let outputs: Vec<String> = config.outputs.iter().map(|o| o.name.clone()).collect();
    let inputs: Vec<String> = config.inputs.iter().map(|i| i.name.clone()).collect();
    for name in outputs {
        pass.set_output(&name, None);
    }
    for name in inputs {
        pass.set_input(&name, None);
    }
}

fn required_edges(configs: &[&RenderPassConfig]) -> Vec<(usize, usize)> {
    let index: HashMap<&str, usize> = configs.iter().enumerate().map(|(i, c)| (c.name.as_str(), i)).collect();
    let mut edges = Vec::new();
    for (b, config) in configs.iter().enumerate() {
        for dep in config.dependencies.iter().filter(|d| d.required) {
            if let Some(&a) = index.get(dep.pass.as_str()) {
                edges.push((a, b));
            }
        }
    }
    edges
}

/// Greedy sweep: take any pass whose required, registered dependencies are
/// already placed, until a sweep places nothing. Always terminates; returns
/// the order reached and the passes left over.
fn dependency_sort(configs: &[&RenderPassConfig]) -> (Vec<usize>, Vec<usize>) {
    let registered: HashSet<&str> = configs.iter().map(|c| c.name.as_str()).collect();
    let mut placed: HashSet<&str> = HashSet::new();
    let mut order = Vec::with_capacity(configs.len());

    loop {
        let mut progressed = false;
        for (i, config) in configs.iter().enumerate() {
            if placed.contains(config.name.as_str()) {
                continue;
            }
            let ready = config
                .dependencies
                .iter()
                .filter(|d| d.required && registered.contains(d.pass.as_str()))
                .all(|d| placed.contains(d.pass.as_str()));
            if ready {
                placed.insert(config.name.as_str());
                order.push(i);
                progressed = true;
            }
        }
        if !progressed || order.len() == configs.len() {
            break;
        }
    }

    let unsorted = (0..configs.len()).filter(|i| !order.contains(i)).collect();
    (order, unsorted)
}
