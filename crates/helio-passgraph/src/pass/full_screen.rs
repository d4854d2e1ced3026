//! Full-screen pass - blits a texture to the default framebuffer

use super::lighting::COLOR;
use super::{PassBase, PassType, RenderPass, RenderPassConfig};
use crate::command::{Material, RenderCommand, RenderPassFlag};
use crate::device::{ClearFlags, ClearValues, CullMode, DepthFunc, GpuDevice};
use crate::Result;
use std::sync::Arc;

/// Terminal stage: one quad covering the viewport, sampling `color`
///
/// Has no outputs, so it draws into the screen. `Blit` commands are drawn
/// after the quad (overlays, UI textures).
pub struct FullScreenPass {
    base: PassBase,
    material: Option<Arc<dyn Material>>,
}

impl FullScreenPass {
    pub fn new(source_pass: &str) -> Self {
        Self::with_config(Self::default_config("final", source_pass))
    }

    pub fn with_config(config: RenderPassConfig) -> Self {
        Self {
            base: PassBase::new(config),
            material: None,
        }
    }

    pub fn default_config(name: &str, source_pass: &str) -> RenderPassConfig {
        RenderPassConfig::new(name, PassType::FullScreen)
            .with_input(COLOR, source_pass, COLOR, true)
            .with_dependency(source_pass, true)
            .with_clear(ClearFlags::COLOR, ClearValues::default())
            .with_depth(false, false, DepthFunc::Always)
            .with_cull(CullMode::None)
            .with_flags(RenderPassFlag::BLIT)
    }

    pub fn with_material(mut self, material: Arc<dyn Material>) -> Self {
        self.material = Some(material);
        self
    }
}

impl RenderPass for FullScreenPass {
    fn base(&self) -> &PassBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PassBase {
        &mut self.base
    }

    fn execute(&mut self, device: &mut dyn GpuDevice, commands: &[RenderCommand]) -> Result<()> {
        if self.base.config().is_disabled() {
            return Ok(());
        }
        self.base.begin(device)?;

        if let Some(material) = &self.material {
            let frame = self.base.frame_uniforms();
            material.apply(device);
            material.update_uniforms(device, &frame);
            material.bind_textures(device);
        }
        device.draw_fullscreen_quad();
        let draws = 1 + self.base.draw_commands(device, commands);

        self.base.end(device);
        self.base.record_execution(draws);
        Ok(())
    }
}
