//! G-buffer and lighting on a real wgpu device without a window
//!
//! Exits quietly when no adapter is available.

use helio_passgraph::device::WgpuDevice;
use helio_passgraph::pass::{BasePass, GeometryPass};
use helio_passgraph::{ManagerConfig, RenderPassManager, RenderView};

fn main() -> helio_passgraph::Result<()> {
    env_logger::init();

    let mut device = match WgpuDevice::request_headless() {
        Ok(device) => device,
        Err(e) => {
            log::warn!("Skipping: {}", e);
            return Ok(());
        }
    };

    let mut manager = RenderPassManager::new(ManagerConfig::default());
    manager.set_view(Some(RenderView::new(640, 360)));
    manager.add_pass(GeometryPass::new())?;
    manager.add_pass(BasePass::new())?;
    manager.initialize_all(&mut device)?;

    for _ in 0..3 {
        manager.execute_all(&mut device, &[])?;
    }
    log::info!("Ran {:?} for {} frames", manager.last_executed(), manager.frame());

    if let Some(color) = manager.get_pass("base").and_then(|pass| pass.output_texture("color")) {
        if let Some(texture) = device.texture(color) {
            log::info!("Lighting output: {:?}", texture.size());
        }
    }

    manager.shutdown(&mut device);
    Ok(())
}
