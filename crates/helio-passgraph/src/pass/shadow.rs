//! Shadow pass - renders shadow casters into a depth map from the default light

use super::{PassBase, PassType, RenderPass, RenderPassConfig};
use crate::command::{RenderCommand, RenderPassFlag};
use crate::device::{ClearFlags, ClearValues, CullMode, GpuDevice, Viewport};
use crate::target::PixelFormat;
use crate::Result;

pub const SHADOW_MAP: &str = "shadow_map";

/// Depth-only pass over `Shadowing` commands
///
/// The shadow map has its own fixed resolution (the config viewport), so it
/// does not follow view resizes. Front faces are culled to reduce acne.
pub struct ShadowPass {
    base: PassBase,
    /// Half size of the orthographic light frustum
    coverage: f32,
}

impl ShadowPass {
    pub fn new(resolution: u32) -> Self {
        Self::with_config(Self::default_config("shadow", resolution))
    }

    pub fn with_config(config: RenderPassConfig) -> Self {
        Self {
            base: PassBase::new(config),
            coverage: 25.0,
        }
    }

    pub fn default_config(name: &str, resolution: u32) -> RenderPassConfig {
        RenderPassConfig::new(name, PassType::Shadow)
            .with_output(SHADOW_MAP, PixelFormat::Depth32F)
            .with_viewport(Viewport::new(resolution, resolution))
            .with_clear(ClearFlags::DEPTH, ClearValues::default())
            .with_cull(CullMode::Front)
            .with_flags(RenderPassFlag::SHADOWING)
    }

    pub fn with_coverage(mut self, half_extent: f32) -> Self {
        self.coverage = half_extent;
        self
    }
}

impl RenderPass for ShadowPass {
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

        let light = self
            .base
            .context()
            .map(|ctx| ctx.default_light())
            .unwrap_or_default();
        device.set_uniform_mat4("u_light_view_proj", &light.view_proj(self.coverage));
        let draws = self.base.draw_commands(device, commands);

        self.base.end(device);
        self.base.record_execution(draws);
        Ok(())
    }
}
