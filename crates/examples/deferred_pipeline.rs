//! Deferred pipeline on the headless device
//!
//! Registers shadow, skybox, G-buffer, lighting, post-process, fur and final
//! blit passes, renders a few frames through the dependency sorter, then the
//! same frames through the render graph, and writes the compiled graph as
//! Graphviz to `render_graph.dot` (or the path given as first argument).
//!
//!   cargo run --bin deferred_pipeline -- /tmp/graph.dot
//!   dot -Tsvg /tmp/graph.dot -o graph.svg

use glam::{Mat4, Vec3};
use helio_passgraph::command::quad_mesh;
use helio_passgraph::device::ProgramHandle;
use helio_passgraph::graph::write_dot;
use helio_passgraph::pass::{
    BasePass, FullScreenPass, FurParams, FurRenderPass, GeometryPass, PostProcessPass, ShadowPass, SkyboxPass,
};
use helio_passgraph::{
    Camera, FrameUniforms, GpuDevice, HeadlessDevice, Light, ManagerConfig, Material, RenderCommand, RenderMode,
    RenderPassFlag, RenderPassManager, RenderView,
};
use std::sync::Arc;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

/// Minimal material: one program, view-projection uniform, optional fur
struct DemoMaterial {
    name: &'static str,
    program: ProgramHandle,
    fur: Option<FurParams>,
}

impl DemoMaterial {
    fn new(name: &'static str, program: u64) -> Arc<Self> {
        Arc::new(Self {
            name,
            program: ProgramHandle(program),
            fur: None,
        })
    }

    fn furry(name: &'static str, program: u64, params: FurParams) -> Arc<Self> {
        Arc::new(Self {
            name,
            program: ProgramHandle(program),
            fur: Some(params),
        })
    }
}

impl Material for DemoMaterial {
    fn name(&self) -> &str {
        self.name
    }

    fn apply(&self, device: &mut dyn GpuDevice) {
        device.use_program(self.program);
    }

    fn update_uniforms(&self, device: &mut dyn GpuDevice, frame: &FrameUniforms) {
        device.set_uniform_mat4("u_view_proj", &frame.view_proj);
    }

    fn fur_params(&self) -> Option<&FurParams> {
        self.fur.as_ref()
    }
}

fn build_manager(config: ManagerConfig) -> helio_passgraph::Result<RenderPassManager> {
    let mut manager = RenderPassManager::new(config);
    manager.set_view(Some(RenderView::new(WIDTH, HEIGHT)));

    let mut post = PostProcessPass::new();
    post.add_effect("bloom", DemoMaterial::new("bloom", 10))?;
    post.add_effect("tonemap", DemoMaterial::new("tonemap", 11))?;

    manager.add_pass(ShadowPass::new(2048).with_coverage(20.0))?;
    manager.add_pass(SkyboxPass::new().with_material(DemoMaterial::new("sky", 1)))?;
    manager.add_pass(GeometryPass::new())?;
    manager.add_pass(BasePass::new().with_lighting_material(DemoMaterial::new("deferred_light", 2)))?;
    manager.add_pass(FurRenderPass::new())?;
    manager.add_pass(post)?;
    manager.add_pass(FullScreenPass::new("post_process"))?;

    // a duplicate is refused and changes nothing
    if let Err(e) = manager.add_pass(GeometryPass::new()) {
        log::info!("Expected rejection: {}", e);
    }
    Ok(manager)
}

fn scene(frame: u32) -> Vec<RenderCommand> {
    let (vertices, indices) = quad_mesh(1.0);
    let vertices: Arc<[_]> = vertices.into();
    let indices: Arc<[_]> = indices.into();
    let spin = Mat4::from_rotation_y(frame as f32 * 0.1);

    let ground = DemoMaterial::new("ground", 3);
    let fur = DemoMaterial::furry("fur", 4, FurParams::default().with_shells(16).with_length(0.08));

    vec![
        RenderCommand::new(ground.clone(), vertices.clone(), indices.clone())
            .with_transform(Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2) * Mat4::from_scale(Vec3::splat(10.0)))
            .with_flags(RenderPassFlag::GEOMETRY | RenderPassFlag::SHADOWING),
        RenderCommand::new(ground, vertices.clone(), indices.clone())
            .with_transform(spin * Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)))
            .with_flags(RenderPassFlag::GEOMETRY | RenderPassFlag::SHADOWING),
        RenderCommand::new(fur, vertices, indices)
            .with_transform(spin)
            .with_mode(RenderMode::Transparent)
            .with_flags(RenderPassFlag::TRANSPARENT),
    ]
}

fn run(manager: &mut RenderPassManager, device: &mut HeadlessDevice, frames: u32) -> helio_passgraph::Result<()> {
    let camera = Arc::new(Camera::perspective(
        Vec3::new(0.0, 3.0, 8.0),
        Vec3::ZERO,
        Vec3::Y,
        60f32.to_radians(),
        WIDTH as f32 / HEIGHT as f32,
        0.1,
        100.0,
    ));
    manager.context().attach_camera(&camera);
    manager
        .context()
        .set_default_light(Light::directional(Vec3::new(-0.4, -1.0, -0.3), Vec3::ONE, 3.0));

    manager.initialize_all(device)?;
    for frame in 0..frames {
        manager.context().set_time(frame as f32 / 60.0);
        manager.execute_all(device, &scene(frame))?;
    }
    log::info!("Order: {:?}", manager.last_executed());
    for name in manager.pass_names() {
        if let Some(pass) = manager.get_pass(name) {
            log::info!("  {:<14} {:?}", name, pass.stats());
        }
    }
    Ok(())
}

fn main() -> helio_passgraph::Result<()> {
    env_logger::init();
    let dot_path = std::env::args().nth(1).unwrap_or_else(|| "render_graph.dot".to_string());

    let mut device = HeadlessDevice::new();
    let mut sorted = build_manager(ManagerConfig::default())?;
    run(&mut sorted, &mut device, 3)?;
    sorted.shutdown(&mut device);
    log::info!("Dependency sorter: {:?}", device.stats());

    let mut device = HeadlessDevice::new();
    let mut graph = build_manager(ManagerConfig::default().with_render_graph(true))?;
    run(&mut graph, &mut device, 3)?;
    if let Some(compiled) = graph.compiled_graph() {
        log::info!(
            "Graph: {} resources in {} physical targets, {} sync points",
            compiled.resources().len(),
            compiled.physical_resource_count(),
            compiled.sync_points().len()
        );
        write_dot(compiled, &dot_path)?;
        log::info!("Wrote {}", dot_path);
    }
    graph.shutdown(&mut device);
    log::info!("Render graph: {:?}", device.stats());
    Ok(())
}
