//! Skybox pass - draws background geometry at the far plane

use super::{draw_command, PassBase, PassType, RenderPass, RenderPassConfig};
use crate::command::{Material, RenderCommand, RenderMode, RenderPassFlag, Vertex};
use crate::device::{CullMode, DepthFunc, GpuDevice};
use crate::Result;
use std::sync::Arc;

/// Renders `Background` commands into whatever framebuffer is bound
///
/// Has no outputs. Depth testing uses less-or-equal with writes off, so a cube
/// projected onto the far plane passes where nothing else was drawn. With
/// [`SkyboxPass::with_material`] it also draws its own unit cube.
pub struct SkyboxPass {
    base: PassBase,
    cube: Option<RenderCommand>,
}

impl SkyboxPass {
    pub fn new() -> Self {
        Self::with_config(Self::default_config("skybox"))
    }

    pub fn with_config(config: RenderPassConfig) -> Self {
        Self {
            base: PassBase::new(config),
            cube: None,
        }
    }

    pub fn default_config(name: &str) -> RenderPassConfig {
        RenderPassConfig::new(name, PassType::Skybox)
            .with_depth(true, false, DepthFunc::LessEqual)
            .with_cull(CullMode::None)
            .with_flags(RenderPassFlag::BACKGROUND)
    }

    pub fn with_material(mut self, material: Arc<dyn Material>) -> Self {
        let (vertices, indices) = cube_mesh();
        self.cube = Some(
            RenderCommand::new(material, vertices, indices)
                .with_mode(RenderMode::Opaque)
                .with_flags(RenderPassFlag::BACKGROUND),
        );
        self
    }
}

impl Default for SkyboxPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for SkyboxPass {
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
        if let Some(cube) = &self.cube {
            let mut frame = self.base.frame_uniforms();
            if let Some(camera) = self.base.context().and_then(|ctx| ctx.camera()) {
                frame.view = camera.rotation_only_view();
                frame.view_proj = frame.projection * frame.view;
            }
            draw_command(device, cube, &frame);
            draws += 1;
        }
        draws += self.base.draw_commands(device, commands);

        self.base.end(device);
        self.base.record_execution(draws);
        Ok(())
    }
}

/// Inward-facing unit cube
fn cube_mesh() -> (Vec<Vertex>, Vec<u32>) {
    let corners = [
        [-1.0, -1.0, -1.0],
        [1.0, -1.0, -1.0],
        [1.0, 1.0, -1.0],
        [-1.0, 1.0, -1.0],
        [-1.0, -1.0, 1.0],
        [1.0, -1.0, 1.0],
        [1.0, 1.0, 1.0],
        [-1.0, 1.0, 1.0],
    ];
    let vertices = corners
        .iter()
        .map(|&p: &[f32; 3]| {
            let len = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
            Vertex::new(p, [-p[0] / len, -p[1] / len, -p[2] / len], [0.0, 0.0])
        })
        .collect();
    #[rustfmt::skip]
    let indices = vec![
        0, 2, 1, 0, 3, 2, // -z
        4, 5, 6, 4, 6, 7, // +z
        0, 1, 5, 0, 5, 4, // -y
        3, 6, 2, 3, 7, 6, // +y
        0, 4, 7, 0, 7, 3, // -x
        1, 2, 6, 1, 6, 5, // +x
    ];
    (vertices, indices)
}
