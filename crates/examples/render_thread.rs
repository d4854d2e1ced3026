//! Producer/consumer frame loop
//!
//! The main thread builds commands and hands them over once per frame; a
//! dedicated render thread owns the device and the pass manager. Between
//! frames the main thread takes the context lock briefly, the way UI drawing
//! on a shared context would.

use glam::{Mat4, Vec3};
use helio_passgraph::command::quad_mesh;
use helio_passgraph::pass::{BasePass, GeometryPass, PostProcessPass};
use helio_passgraph::threading::{GpuContextLock, RenderThread};
use helio_passgraph::{
    GpuDevice, HeadlessDevice, ManagerConfig, Material, RenderCommand, RenderPassFlag, RenderPassManager, RenderView,
};
use std::sync::Arc;
use std::time::Instant;

struct Unlit;

impl Material for Unlit {
    fn name(&self) -> &str {
        "unlit"
    }

    fn apply(&self, _device: &mut dyn GpuDevice) {}
}

fn main() -> helio_passgraph::Result<()> {
    env_logger::init();

    let mut manager = RenderPassManager::new(ManagerConfig::default());
    manager.set_view(Some(RenderView::new(800, 600)));
    manager.add_pass(GeometryPass::new())?;
    manager.add_pass(BasePass::new())?;
    manager.add_pass(PostProcessPass::new())?;

    let context = Arc::new(GpuContextLock::new(Box::new(HeadlessDevice::new())));
    let thread = RenderThread::spawn(manager, context.clone())?;

    let material: Arc<dyn Material> = Arc::new(Unlit);
    let (vertices, indices) = quad_mesh(0.5);
    let vertices: Arc<[_]> = vertices.into();
    let indices: Arc<[_]> = indices.into();

    let start = Instant::now();
    for frame in 0..60u32 {
        let commands = (0..16).map(|i| {
            let offset = Vec3::new((i % 4) as f32 - 1.5, (i / 4) as f32 - 1.5, 0.0);
            let spin = Mat4::from_rotation_z(frame as f32 * 0.05 + i as f32);
            RenderCommand::new(material.clone(), vertices.clone(), indices.clone())
                .with_transform(Mat4::from_translation(offset) * spin)
                .with_flags(RenderPassFlag::GEOMETRY)
        });
        thread.submit_batch(commands);

        if !thread.render_frame() {
            log::warn!("Render thread stopped at frame {}", frame);
            break;
        }

        // overlay work on the main thread while the render thread waits
        let device = context.acquire();
        log::trace!("Frame {} done on {}", frame, device.backend_name());
    }
    log::info!(
        "{} frames ({} failed) in {:.1?}",
        thread.frames_rendered(),
        thread.failed_frames(),
        start.elapsed()
    );

    let manager = thread.join()?;
    log::info!("Last frame ran {:?}", manager.last_executed());
    Ok(())
}
