//! Geometry pass - fills the deferred G-buffer

use super::{PassBase, PassType, RenderPass, RenderPassConfig};
use crate::command::{RenderCommand, RenderPassFlag};
use crate::device::{ClearFlags, ClearValues, GpuDevice};
use crate::target::PixelFormat;
use crate::Result;

/// G-buffer output names
pub const ALBEDO: &str = "albedo";
pub const NORMAL: &str = "normal";
pub const POSITION: &str = "position";
pub const DEPTH: &str = "depth";

/// Writes albedo, normal, position and depth for every `Geometry` command
pub struct GeometryPass {
    base: PassBase,
}

impl GeometryPass {
    pub fn new() -> Self {
        Self::with_config(Self::default_config("geometry"))
    }

    pub fn with_config(config: RenderPassConfig) -> Self {
        Self {
            base: PassBase::new(config),
        }
    }

    pub fn default_config(name: &str) -> RenderPassConfig {
        RenderPassConfig::new(name, PassType::Geometry)
            .with_output(ALBEDO, PixelFormat::Rgba8)
            .with_output(NORMAL, PixelFormat::Rgba16F)
            .with_output(POSITION, PixelFormat::Rgba16F)
            .with_output(DEPTH, PixelFormat::Depth24)
            .with_clear(
                ClearFlags::COLOR | ClearFlags::DEPTH,
                ClearValues {
                    color: [0.0, 0.0, 0.0, 0.0],
                    ..Default::default()
                },
            )
            .with_flags(RenderPassFlag::GEOMETRY)
    }
}

impl Default for GeometryPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for GeometryPass {
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
        let draws = self.base.draw_commands(device, commands);
        self.base.end(device);
        self.base.record_execution(draws);
        Ok(())
    }
}
