//! Post-process pass - a chain of full-screen effects

use super::lighting::COLOR;
use super::{PassBase, PassType, RenderPass, RenderPassConfig};
use crate::command::{Material, RenderCommand};
use crate::context::FrameUniforms;
use crate::device::{CullMode, DepthFunc, GpuDevice, TextureHandle};
use crate::target::{PixelFormat, RenderTarget, RenderTargetDesc};
use crate::{Error, Result};
use std::sync::Arc;

/// One pluggable full-screen effect
pub struct PostEffect {
    pub name: String,
    pub material: Arc<dyn Material>,
    pub enabled: bool,
}

/// Applies enabled effects in registration order
///
/// Reads `color` from the upstream pass. Intermediate results ping-pong
/// between two private targets; the last enabled effect writes the pass
/// output `color`. With no enabled effect the input is copied through.
pub struct PostProcessPass {
    base: PassBase,
    effects: Vec<PostEffect>,
    ping_pong: [RenderTarget; 2],
}

impl PostProcessPass {
    pub fn new() -> Self {
        Self::with_config(Self::default_config("post_process", "base"))
    }

    pub fn with_config(config: RenderPassConfig) -> Self {
        Self {
            base: PassBase::new(config),
            effects: Vec::new(),
            ping_pong: [RenderTarget::new(), RenderTarget::new()],
        }
    }

    pub fn default_config(name: &str, source_pass: &str) -> RenderPassConfig {
        RenderPassConfig::new(name, PassType::PostProcess)
            .with_input(COLOR, source_pass, COLOR, true)
            .with_dependency(source_pass, true)
            .with_output(COLOR, PixelFormat::Rgba16F)
            .with_depth(false, false, DepthFunc::Always)
            .with_cull(CullMode::None)
    }

    /// Append an effect. Names are unique within the pass.
    pub fn add_effect(&mut self, name: &str, material: Arc<dyn Material>) -> Result<()> {
        if self.effects.iter().any(|e| e.name == name) {
            log::warn!("Post effect '{}' already added to '{}'", name, self.base.config().name);
            return Err(Error::DuplicateEffect(name.to_string()));
        }
        self.effects.push(PostEffect {
            name: name.to_string(),
            material,
            enabled: true,
        });
        Ok(())
    }

    pub fn remove_effect(&mut self, name: &str) -> bool {
        let before = self.effects.len();
        self.effects.retain(|e| e.name != name);
        self.effects.len() != before
    }

    pub fn set_effect_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.effects.iter_mut().find(|e| e.name == name) {
            Some(effect) => {
                effect.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn effects(&self) -> &[PostEffect] {
        &self.effects
    }

    pub fn enabled_effect_count(&self) -> usize {
        self.effects.iter().filter(|e| e.enabled).count()
    }

    fn intermediate_desc(&self, index: usize) -> Option<RenderTargetDesc> {
        let (width, height) = self.base.extent()?;
        Some(RenderTargetDesc::color(
            format!("{}_pingpong{}", self.base.config().name, index),
            PixelFormat::Rgba16F,
            width,
            height,
        ))
    }

    fn ensure_intermediates(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        for index in 0..2 {
            let Some(desc) = self.intermediate_desc(index) else {
                continue;
            };
            self.ping_pong[index].update(device, &desc)?;
        }
        Ok(())
    }

    /// Draw one effect reading `source` into the bound framebuffer
    fn apply_effect(device: &mut dyn GpuDevice, effect: &PostEffect, source: Option<TextureHandle>, frame: &FrameUniforms) {
        device.bind_texture(0, source);
        effect.material.apply(device);
        effect.material.update_uniforms(device, frame);
        effect.material.bind_textures(device);
        device.draw_fullscreen_quad();
    }
}

impl Default for PostProcessPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for PostProcessPass {
    fn base(&self) -> &PassBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PassBase {
        &mut self.base
    }

    fn on_initialize(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        self.ensure_intermediates(device)
    }

    fn resize(&mut self, device: &mut dyn GpuDevice, width: u32, height: u32) -> Result<()> {
        self.base.resize(device, width, height)?;
        self.ensure_intermediates(device)
    }

    fn execute(&mut self, device: &mut dyn GpuDevice, commands: &[RenderCommand]) -> Result<()> {
        if self.base.config().is_disabled() {
            return Ok(());
        }
        let frame = self.base.frame_uniforms();
        let enabled: Vec<&PostEffect> = self.effects.iter().filter(|e| e.enabled).collect();
        let mut source = self.base.input(COLOR);
        let mut draws = 0;

        // all but the last effect write into the ping-pong targets
        if enabled.len() > 1 {
            let saved = device.render_state();
            for (i, effect) in enabled[..enabled.len() - 1].iter().enumerate() {
                let target = &self.ping_pong[i % 2];
                target.bind(device);
                Self::apply_effect(device, effect, source, &frame);
                target.unbind(device);
                source = target.texture();
                draws += 1;
            }
            device.bind_texture(0, None);
            device.set_render_state(&saved);
        }

        self.base.begin(device)?;
        match enabled.last() {
            Some(effect) => Self::apply_effect(device, effect, source, &frame),
            None => {
                device.bind_texture(0, source);
                device.draw_fullscreen_quad();
            }
        }
        draws += 1;
        draws += self.base.draw_commands(device, commands);
        self.base.end(device);

        self.base.record_execution(draws);
        Ok(())
    }

    fn shutdown(&mut self, device: &mut dyn GpuDevice) {
        for target in &mut self.ping_pong {
            target.shutdown(device);
        }
        self.base.shutdown(device);
    }

    fn as_post_process_mut(&mut self) -> Option<&mut PostProcessPass> {
        Some(self)
    }
}
