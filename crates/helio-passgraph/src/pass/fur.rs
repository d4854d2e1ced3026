//! Fur pass - shell-based hair rendered from `Transparent` commands

use super::{PassBase, PassType, RenderPass, RenderPassConfig};
use crate::command::{RenderCommand, RenderMode, RenderPassFlag, Vertex};
use crate::device::{BlendMode, CullMode, DepthFunc, GpuDevice};
use crate::Result;
use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Shell fur parameters, per material or per pass
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FurParams {
    pub shell_count: u32,
    /// Offset of the outermost shell along the normal
    pub length: f32,
    /// Random normal perturbation, 0 = combed straight
    pub jitter: f32,
    pub seed: u64,
}

impl Default for FurParams {
    fn default() -> Self {
        Self {
            shell_count: 8,
            length: 0.05,
            jitter: 0.15,
            seed: 0x5eed,
        }
    }
}

impl FurParams {
    pub fn with_shells(mut self, shell_count: u32) -> Self {
        self.shell_count = shell_count;
        self
    }

    pub fn with_length(mut self, length: f32) -> Self {
        self.length = length;
        self
    }

    pub fn with_jitter(mut self, jitter: f32) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Builds fur shells from a base mesh
///
/// Shell `k` of `n` is the base mesh pushed out by `length * k / n` along a
/// jittered normal. Jitter is seeded, so the same mesh and params always give
/// the same shells. Output buffers are reused between calls.
#[derive(Debug, Default)]
pub struct FurGeometryGenerator {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl FurGeometryGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(&mut self, base_vertices: &[Vertex], base_indices: &[u32], params: &FurParams) -> (&[Vertex], &[u32]) {
        self.vertices.clear();
        self.indices.clear();
        if base_vertices.is_empty() || base_indices.is_empty() || params.shell_count == 0 {
            return (&self.vertices, &self.indices);
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let jitter: Vec<Vec3> = base_vertices
            .iter()
            .map(|_| {
                Vec3::new(
                    rng.gen_range(-1.0..=1.0),
                    rng.gen_range(-1.0..=1.0),
                    rng.gen_range(-1.0..=1.0),
                ) * params.jitter
            })
            .collect();

        let count = params.shell_count as usize;
        self.vertices.reserve(base_vertices.len() * count);
        self.indices.reserve(base_indices.len() * count);

        for shell in 1..=count {
            let height = params.length * shell as f32 / count as f32;
            let offset = ((shell - 1) * base_vertices.len()) as u32;
            for (vertex, jitter) in base_vertices.iter().zip(&jitter) {
                let normal = Vec3::from(vertex.normal);
                let direction = (normal + *jitter).normalize_or(normal);
                let position = Vec3::from(vertex.position) + direction * height;
                self.vertices.push(Vertex::new(position.into(), vertex.normal, vertex.uv));
            }
            self.indices.extend(base_indices.iter().map(|i| i + offset));
        }

        (&self.vertices, &self.indices)
    }
}

/// Draws shells for every `Transparent` command
///
/// Shells are rebuilt every frame from the command's base mesh, using the
/// material's [`FurParams`] when it has some and the pass params otherwise.
/// Culling is off, alpha blending on and depth writes off.
pub struct FurRenderPass {
    base: PassBase,
    params: FurParams,
    generator: FurGeometryGenerator,
}

impl FurRenderPass {
    pub fn new() -> Self {
        Self::with_config(Self::default_config("fur"))
    }

    pub fn with_config(config: RenderPassConfig) -> Self {
        Self {
            base: PassBase::new(config),
            params: FurParams::default(),
            generator: FurGeometryGenerator::new(),
        }
    }

    pub fn default_config(name: &str) -> RenderPassConfig {
        RenderPassConfig::new(name, PassType::Transparent)
            .with_depth(true, false, DepthFunc::LessEqual)
            .with_blend(Some(BlendMode::Alpha))
            .with_cull(CullMode::None)
            .with_flags(RenderPassFlag::TRANSPARENT)
    }

    pub fn params(&self) -> &FurParams {
        &self.params
    }

    pub fn set_params(&mut self, params: FurParams) {
        self.params = params;
    }
}

impl Default for FurRenderPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for FurRenderPass {
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

        let frame = self.base.frame_uniforms();
        let mask = self.base.config().flags;
        let mut draws = 0;
        for cmd in commands.iter().filter(|c| c.targets(mask) && c.is_drawable()) {
            let params = cmd.material.fur_params().copied().unwrap_or(self.params);
            let (vertices, indices) = self.generator.generate(&cmd.vertices, &cmd.indices, &params);
            if indices.is_empty() {
                continue;
            }
            cmd.material.apply(device);
            cmd.material.update_uniforms(device, &frame);
            cmd.material.bind_textures(device);
            cmd.material.set_transform(device, &cmd.transform);
            device.draw_indexed(vertices, indices, RenderMode::Transparent);
            draws += 1;
        }

        self.base.end(device);
        self.base.record_execution(draws);
        Ok(())
    }

    fn as_fur_mut(&mut self) -> Option<&mut FurRenderPass> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::quad_mesh;

    #[test]
    fn shells_offset_along_normals() {
        let (vertices, indices) = quad_mesh(1.0);
        let params = FurParams::default().with_shells(4).with_length(1.0).with_jitter(0.0);
        let mut generator = FurGeometryGenerator::new();
        let (shells, shell_indices) = generator.generate(&vertices, &indices, &params);

        assert_eq!(shells.len(), vertices.len() * 4);
        assert_eq!(shell_indices.len(), indices.len() * 4);
        assert!((shells[0].position[2] - 0.25).abs() < 1e-6);
        assert!((shells[shells.len() - 1].position[2] - 1.0).abs() < 1e-6);
        assert_eq!(*shell_indices.iter().max().unwrap() as usize, shells.len() - 1);
    }

    #[test]
    fn jitter_is_deterministic() {
        let (vertices, indices) = quad_mesh(1.0);
        let params = FurParams::default();
        let first = FurGeometryGenerator::new().generate(&vertices, &indices, &params).0.to_vec();
        let second = FurGeometryGenerator::new().generate(&vertices, &indices, &params).0.to_vec();
        assert_eq!(first, second);
    }
}
