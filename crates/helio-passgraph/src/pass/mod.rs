//! Render passes
//!
//! A pass is a configured unit of GPU work. Its [`RenderPassConfig`] declares
//! what it reads (inputs produced by other passes), what it writes (outputs in
//! its own framebuffer) and which passes it depends on. [`PassBase`] implements
//! the shared lifecycle so concrete passes only write `execute`:
//!
//! ```text
//! initialize ─► [ prepare ─► on_pre_execute ─► execute ]* ─► shutdown
//! ```
//!
//! Inside `execute` every pass follows the same shape: `begin` (save state,
//! bind framebuffer, clear, bind inputs), draw the commands whose flags match,
//! `end` (unbind, restore state).

mod condition;
mod config;
mod full_screen;
mod fur;
mod geometry;
mod lighting;
mod post_process;
mod shadow;
mod skybox;

pub use condition::{Condition, ConditionContext};
pub use config::{PassDependency, PassInput, PassOutput, PassState, PassType, RenderPassConfig};
pub use full_screen::FullScreenPass;
pub use fur::{FurGeometryGenerator, FurParams, FurRenderPass};
pub use geometry::GeometryPass;
pub use lighting::BasePass;
pub use post_process::{PostEffect, PostProcessPass};
pub use shadow::ShadowPass;
pub use skybox::SkyboxPass;

use crate::command::RenderCommand;
use crate::context::{FrameUniforms, RenderContext, RenderView};
use crate::device::{GpuDevice, RenderState, TextureHandle, Viewport};
use crate::target::{MultiRenderTarget, PixelFormat, RenderTargetDesc};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Per-pass counters, observable after each frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub executions: u64,
    /// Draws issued by the most recent execution
    pub draws: usize,
    /// Commands matching the pass flags but skipped for empty geometry
    pub skipped: usize,
}

/// State and behavior shared by every pass
pub struct PassBase {
    config: RenderPassConfig,
    extent: Option<(u32, u32)>,
    framebuffer: Option<MultiRenderTarget>,
    inputs: HashMap<String, TextureHandle>,
    bound_units: Vec<u32>,
    context: Option<Arc<RenderContext>>,
    saved_state: Option<RenderState>,
    stats: PassStats,
    initialized: bool,
}

impl PassBase {
    pub fn new(config: RenderPassConfig) -> Self {
        Self {
            config,
            extent: None,
            framebuffer: None,
            inputs: HashMap::new(),
            bound_units: Vec::new(),
            context: None,
            saved_state: None,
            stats: PassStats::default(),
            initialized: false,
        }
    }

    pub fn config(&self) -> &RenderPassConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RenderPassConfig {
        &mut self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Framebuffer size, known after initialization
    pub fn extent(&self) -> Option<(u32, u32)> {
        self.extent
    }

    pub fn context(&self) -> Option<&Arc<RenderContext>> {
        self.context.as_ref()
    }

    pub fn framebuffer(&self) -> Option<&MultiRenderTarget> {
        self.framebuffer.as_ref()
    }

    pub fn stats(&self) -> PassStats {
        self.stats
    }

    /// Size the pass and build its framebuffer from the declared outputs.
    ///
    /// The config viewport wins over the view size. A pass with outputs and
    /// neither fails with [`Error::MissingExtent`].
    pub fn initialize(
        &mut self,
        device: &mut dyn GpuDevice,
        view: Option<RenderView>,
        context: Option<Arc<RenderContext>>,
    ) -> Result<()> {
        if self.initialized {
            return Err(Error::AlreadyInitialized(self.config.name.clone()));
        }

        self.extent = match (self.config.viewport, view) {
            (Some(vp), _) => Some((vp.width, vp.height)),
            (None, Some(view)) => Some((view.width, view.height)),
            (None, None) => None,
        };
        self.context = context;

        if !self.config.outputs.is_empty() {
            let Some((width, height)) = self.extent else {
                log::error!("Pass '{}' declares outputs but has no size", self.config.name);
                return Err(Error::MissingExtent(self.config.name.clone()));
            };
            let mut framebuffer = MultiRenderTarget::new(self.config.name.clone(), width, height);
            for output in &self.config.outputs {
                let desc = RenderTargetDesc::for_format(output.target.clone(), output.format, width, height);
                if let Err(e) = framebuffer.add_target(device, desc) {
                    framebuffer.shutdown(device);
                    return Err(e);
                }
            }
            self.framebuffer = Some(framebuffer);
        }

        self.initialized = true;
        log::debug!(
            "Initialized pass '{}' ({:?}, {} outputs, extent {:?})",
            self.config.name,
            self.config.pass_type,
            self.config.outputs.len(),
            self.extent
        );
        Ok(())
    }

    /// Add an output after initialization (for `on_initialize` hooks)
    pub fn declare_output(&mut self, device: &mut dyn GpuDevice, name: &str, format: PixelFormat) -> Result<()> {
        let Some((width, height)) = self.extent else {
            return Err(Error::MissingExtent(self.config.name.clone()));
        };
        if self.config.output(name).is_some() {
            return Err(Error::DuplicateTarget(name.to_string()));
        }
        let framebuffer = self
            .framebuffer
            .get_or_insert_with(|| MultiRenderTarget::new(self.config.name.clone(), width, height));
        framebuffer.add_target(device, RenderTargetDesc::for_format(name, format, width, height))?;
        self.config.outputs.push(PassOutput {
            name: name.to_string(),
            target: name.to_string(),
            format,
        });
        Ok(())
    }

    pub fn resize(&mut self, device: &mut dyn GpuDevice, width: u32, height: u32) -> Result<()> {
        if self.config.viewport.is_some() || self.extent == Some((width, height)) {
            return Ok(());
        }
        self.extent = Some((width, height));
        if let Some(framebuffer) = &mut self.framebuffer {
            framebuffer.resize(device, width, height)?;
        }
        Ok(())
    }

    pub fn shutdown(&mut self, device: &mut dyn GpuDevice) {
        if let Some(mut framebuffer) = self.framebuffer.take() {
            framebuffer.shutdown(device);
        }
        self.inputs.clear();
        self.initialized = false;
    }

    pub fn set_input(&mut self, name: &str, texture: Option<TextureHandle>) {
        match texture {
            Some(texture) => {
                self.inputs.insert(name.to_string(), texture);
            }
            None => {
                self.inputs.remove(name);
            }
        }
    }

    pub fn input(&self, name: &str) -> Option<TextureHandle> {
        self.inputs.get(name).copied()
    }

    /// Replace the image behind an output with an external texture (graph mode)
    pub fn set_output(&mut self, name: &str, texture: Option<TextureHandle>) {
        let Some(output) = self.config.output(name) else {
            log::warn!("Pass '{}' has no output '{}'", self.config.name, name);
            return;
        };
        if let Some(framebuffer) = &mut self.framebuffer {
            framebuffer.set_external(&output.target, texture);
        }
    }

    pub fn output_texture(&self, name: &str) -> Option<TextureHandle> {
        let output = self.config.output(name)?;
        self.framebuffer.as_ref()?.texture(&output.target)
    }

    /// Required inputs that have no texture bound
    pub fn missing_inputs(&self) -> Vec<&str> {
        self.config
            .inputs
            .iter()
            .filter(|input| input.required && !self.inputs.contains_key(&input.name))
            .map(|input| input.name.as_str())
            .collect()
    }

    /// Whether the pass should run this frame, ignoring dependencies
    pub fn is_active(&self, conditions: &ConditionContext) -> bool {
        match &self.config.state {
            PassState::Disabled => false,
            PassState::Enabled => true,
            PassState::Conditional(condition) => condition.evaluate(conditions),
        }
    }

    /// False when a required dependency is absent from `available` or its condition is false
    pub fn check_dependencies(&self, available: &HashSet<&str>, conditions: &ConditionContext) -> bool {
        for dep in self.config.dependencies.iter().filter(|d| d.required) {
            if !available.contains(dep.pass.as_str()) {
                log::debug!("Pass '{}': required dependency '{}' missing", self.config.name, dep.pass);
                return false;
            }
            if !dep.condition.evaluate(conditions) {
                log::debug!(
                    "Pass '{}': condition '{}' on '{}' is false",
                    self.config.name,
                    dep.condition,
                    dep.pass
                );
                return false;
            }
        }
        true
    }

    pub fn frame_uniforms(&self) -> FrameUniforms {
        match &self.context {
            Some(context) => context.frame_uniforms(),
            None => RenderContext::new().frame_uniforms(),
        }
    }

    /// Save state, bind the framebuffer, clear, apply depth/blend/cull, bind inputs
    pub fn begin(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        let saved = device.render_state();
        match &mut self.framebuffer {
            Some(framebuffer) => framebuffer.bind(device)?,
            None => {
                if let Some((width, height)) = self.extent {
                    device.set_viewport(Viewport::new(width, height));
                }
            }
        }
        self.saved_state = Some(saved);
        if !self.config.clear.is_empty() {
            device.clear(self.config.clear, &self.config.clear_values);
        }

        let viewport = device.render_state().viewport;
        device.set_render_state(&RenderState {
            depth_test: self.config.depth_test,
            depth_write: self.config.depth_write,
            depth_func: self.config.depth_func,
            blend: self.config.blend,
            cull: self.config.cull,
            viewport,
        });

        self.bound_units.clear();
        for (unit, input) in self.config.inputs.iter().enumerate() {
            if let Some(texture) = self.inputs.get(&input.name) {
                device.bind_texture(unit as u32, Some(*texture));
                self.bound_units.push(unit as u32);
            }
        }
        Ok(())
    }

    /// Unbind inputs and framebuffer, restore the state saved by `begin`
    pub fn end(&mut self, device: &mut dyn GpuDevice) {
        for unit in self.bound_units.drain(..) {
            device.bind_texture(unit, None);
        }
        if let Some(framebuffer) = &self.framebuffer {
            framebuffer.unbind(device);
        }
        if let Some(saved) = self.saved_state.take() {
            device.set_render_state(&saved);
        }
    }

    /// Draw every command whose flags match the pass flags. Returns the draw count.
    pub fn draw_commands(&mut self, device: &mut dyn GpuDevice, commands: &[RenderCommand]) -> usize {
        let frame = self.frame_uniforms();
        let mut draws = 0;
        let mut skipped = 0;
        for cmd in commands.iter().filter(|c| c.targets(self.config.flags)) {
            if !cmd.is_drawable() {
                skipped += 1;
                continue;
            }
            draw_command(device, cmd, &frame);
            draws += 1;
        }
        self.stats.skipped = skipped;
        draws
    }

    pub fn record_execution(&mut self, draws: usize) {
        self.stats.executions += 1;
        self.stats.draws = draws;
        log::trace!("Pass '{}' issued {} draws", self.config.name, draws);
    }
}

/// Apply the command's material and issue its indexed draw
pub fn draw_command(device: &mut dyn GpuDevice, cmd: &RenderCommand, frame: &FrameUniforms) {
    cmd.material.apply(device);
    cmd.material.update_uniforms(device, frame);
    cmd.material.bind_textures(device);
    cmd.material.set_transform(device, &cmd.transform);
    device.draw_indexed(&cmd.vertices, &cmd.indices, cmd.mode);
}

/// A render pass
///
/// Implementors hold a [`PassBase`] and provide `execute`; everything else has
/// a default that forwards to the base.
pub trait RenderPass: Send {
    fn base(&self) -> &PassBase;
    fn base_mut(&mut self) -> &mut PassBase;

    fn name(&self) -> &str {
        &self.base().config().name
    }

    fn config(&self) -> &RenderPassConfig {
        self.base().config()
    }

    /// Mutable config. Output changes only take effect on the next `initialize`.
    fn config_mut(&mut self) -> &mut RenderPassConfig {
        self.base_mut().config_mut()
    }

    /// Hook run after the base built the framebuffer
    fn on_initialize(&mut self, _device: &mut dyn GpuDevice) -> Result<()> {
        Ok(())
    }

    fn initialize(
        &mut self,
        device: &mut dyn GpuDevice,
        view: Option<RenderView>,
        context: Option<Arc<RenderContext>>,
    ) -> Result<()> {
        self.base_mut().initialize(device, view, context)?;
        if let Err(e) = self.on_initialize(device) {
            // roll back so a later retry starts clean
            self.shutdown(device);
            return Err(e);
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.base().is_initialized()
    }

    /// Graph-mode setup, called by the executor once resources are bound
    fn prepare(&mut self, _device: &mut dyn GpuDevice) -> Result<()> {
        Ok(())
    }

    /// Called by both execution paths right before `execute`
    fn on_pre_execute(&mut self, _device: &mut dyn GpuDevice, _commands: &[RenderCommand]) -> Result<()> {
        Ok(())
    }

    fn execute(&mut self, device: &mut dyn GpuDevice, commands: &[RenderCommand]) -> Result<()>;

    fn resize(&mut self, device: &mut dyn GpuDevice, width: u32, height: u32) -> Result<()> {
        self.base_mut().resize(device, width, height)
    }

    fn shutdown(&mut self, device: &mut dyn GpuDevice) {
        self.base_mut().shutdown(device);
    }

    fn set_input(&mut self, name: &str, texture: Option<TextureHandle>) {
        self.base_mut().set_input(name, texture);
    }

    fn set_output(&mut self, name: &str, texture: Option<TextureHandle>) {
        self.base_mut().set_output(name, texture);
    }

    fn output_texture(&self, name: &str) -> Option<TextureHandle> {
        self.base().output_texture(name)
    }

    fn check_dependencies(&self, available: &HashSet<&str>, conditions: &ConditionContext) -> bool {
        self.base().check_dependencies(available, conditions)
    }

    fn stats(&self) -> PassStats {
        self.base().stats()
    }

    fn as_post_process_mut(&mut self) -> Option<&mut PostProcessPass> {
        None
    }

    fn as_fur_mut(&mut self) -> Option<&mut FurRenderPass> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCommand, HeadlessDevice};
    use crate::target::PixelFormat;

    fn config() -> RenderPassConfig {
        RenderPassConfig::new("test", PassType::Custom).with_output("color", PixelFormat::Rgba8)
    }

    #[test]
    fn outputs_without_size_fail() {
        let mut device = HeadlessDevice::new();
        let mut base = PassBase::new(config());
        assert!(matches!(base.initialize(&mut device, None, None), Err(Error::MissingExtent(_))));
        assert!(!base.is_initialized());
    }

    #[test]
    fn viewport_overrides_view_size() {
        let mut device = HeadlessDevice::new();
        let mut base = PassBase::new(config().with_viewport(Viewport::new(256, 256)));
        base.initialize(&mut device, Some(RenderView::new(1280, 720)), None).unwrap();
        assert_eq!(base.extent(), Some((256, 256)));
        let texture = base.output_texture("color").unwrap();
        assert_eq!(device.texture_desc(texture).unwrap().width, 256);
    }

    #[test]
    fn begin_end_restores_state() {
        let mut device = HeadlessDevice::new();
        let mut base = PassBase::new(config().with_blend(Some(crate::device::BlendMode::Additive)));
        base.initialize(&mut device, Some(RenderView::new(8, 8)), None).unwrap();
        let before = device.render_state();

        base.begin(&mut device).unwrap();
        assert_eq!(device.render_state().blend, Some(crate::device::BlendMode::Additive));
        base.end(&mut device);

        assert_eq!(device.render_state(), before);
        assert_eq!(device.bound_framebuffer(), None);
        assert!(device.commands().contains(&DeviceCommand::BindFramebuffer(None)));
    }

    #[test]
    fn failed_bind_does_not_keep_saved_state() {
        let mut device = HeadlessDevice::new();
        let mut base = PassBase::new(config());
        base.initialize(&mut device, Some(RenderView::new(8, 8)), None).unwrap();
        let stale = device
            .create_texture(&RenderTargetDesc::color("stale", PixelFormat::Rgba8, 8, 8))
            .unwrap();
        device.destroy_texture(stale);
        base.set_output("color", Some(stale));

        assert!(matches!(base.begin(&mut device), Err(Error::IncompleteFramebuffer { .. })));
        device.clear_commands();
        base.end(&mut device);
        assert!(!device.commands().iter().any(|cmd| matches!(cmd, DeviceCommand::SetState(_))));

        base.set_output("color", None);
        base.begin(&mut device).unwrap();
        base.end(&mut device);
        assert!(device.commands().iter().any(|cmd| matches!(cmd, DeviceCommand::SetState(_))));
    }

    struct FlakyPass {
        base: PassBase,
        fail: bool,
    }

    impl RenderPass for FlakyPass {
        fn base(&self) -> &PassBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut PassBase {
            &mut self.base
        }

        fn on_initialize(&mut self, _device: &mut dyn GpuDevice) -> Result<()> {
            if self.fail {
                return Err(Error::Device("shader compile failed".into()));
            }
            Ok(())
        }

        fn execute(&mut self, _device: &mut dyn GpuDevice, _commands: &[RenderCommand]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_hook_rolls_back_initialization() {
        let mut device = HeadlessDevice::new();
        let mut pass = FlakyPass { base: PassBase::new(config()), fail: true };
        let view = Some(RenderView::new(8, 8));

        assert!(matches!(pass.initialize(&mut device, view, None), Err(Error::Device(_))));
        assert!(!pass.is_initialized());
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.live_framebuffer_count(), 0);

        pass.fail = false;
        pass.initialize(&mut device, view, None).unwrap();
        assert!(pass.is_initialized());
        assert!(pass.output_texture("color").is_some());
    }

    #[test]
    fn conditional_dependency() {
        let base = PassBase::new(config().with_conditional_dependency("shadow", true, Condition::flag("shadows")));
        let available: HashSet<&str> = ["shadow"].into_iter().collect();
        let mut conditions = ConditionContext::new();
        assert!(!base.check_dependencies(&available, &conditions));
        conditions.set("shadows", true);
        assert!(base.check_dependencies(&available, &conditions));
        assert!(!base.check_dependencies(&HashSet::new(), &conditions));
    }
}
