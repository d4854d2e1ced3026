//! Base pass - lights the G-buffer and combines it with the background

use super::geometry::{ALBEDO, DEPTH, NORMAL, POSITION};
use super::{Condition, PassBase, PassDependency, PassInput, PassType, RenderPass, RenderPassConfig};
use crate::command::{Material, RenderCommand, RenderPassFlag};
use crate::device::{ClearFlags, ClearValues, DepthFunc, GpuDevice};
use crate::target::PixelFormat;
use crate::Result;
use std::sync::Arc;

pub const COLOR: &str = "color";

/// Deferred lighting resolve
///
/// Samples the G-buffer (required inputs from the geometry pass), optionally a
/// background texture, and writes lit HDR color. `BaseColor` commands are then
/// drawn forward on top.
pub struct BasePass {
    base: PassBase,
    lighting: Option<Arc<dyn Material>>,
}

impl BasePass {
    pub fn new() -> Self {
        Self::with_config(Self::default_config("base", "geometry"))
    }

    pub fn with_config(config: RenderPassConfig) -> Self {
        Self {
            base: PassBase::new(config),
            lighting: None,
        }
    }

    /// Config reading the four G-buffer outputs of `geometry_pass`
    pub fn default_config(name: &str, geometry_pass: &str) -> RenderPassConfig {
        RenderPassConfig::new(name, PassType::Base)
            .with_input(ALBEDO, geometry_pass, ALBEDO, true)
            .with_input(NORMAL, geometry_pass, NORMAL, true)
            .with_input(POSITION, geometry_pass, POSITION, true)
            .with_input(DEPTH, geometry_pass, DEPTH, true)
            .with_dependency(geometry_pass, true)
            .with_output(COLOR, PixelFormat::Rgba16F)
            .with_clear(ClearFlags::COLOR, ClearValues::default())
            .with_depth(false, false, DepthFunc::Always)
            .with_flags(RenderPassFlag::BASE_COLOR)
    }

    /// Optional background input combined under the lit result
    pub fn with_background(mut self, source_pass: &str, source_target: &str) -> Self {
        let config = self.base.config_mut();
        config.inputs.push(PassInput {
            name: "background".to_string(),
            source_pass: source_pass.to_string(),
            source_target: source_target.to_string(),
            required: false,
        });
        if !config.depends_on(source_pass) {
            config.dependencies.push(PassDependency {
                pass: source_pass.to_string(),
                required: false,
                condition: Condition::Always,
            });
        }
        self
    }

    pub fn with_lighting_material(mut self, material: Arc<dyn Material>) -> Self {
        self.lighting = Some(material);
        self
    }
}

impl Default for BasePass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for BasePass {
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

        let mut draws = 0;
        if let Some(material) = &self.lighting {
            let frame = self.base.frame_uniforms();
            material.apply(device);
            material.update_uniforms(device, &frame);
            material.bind_textures(device);
            device.draw_fullscreen_quad();
            draws += 1;
        }
        draws += self.base.draw_commands(device, commands);

        self.base.end(device);
        self.base.record_execution(draws);
        Ok(())
    }
}
