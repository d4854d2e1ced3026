//! Shared fixtures for the integration suites

#![allow(dead_code)]

use helio_passgraph::command::quad_mesh;
use helio_passgraph::pass::{FurParams, PassBase, PassType};
use helio_passgraph::{GpuDevice, Material, RenderCommand, RenderPass, RenderPassConfig, RenderPassFlag, RenderView};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn view() -> RenderView {
    RenderView::new(64, 48)
}

/// Counts how often passes applied it
#[derive(Default)]
pub struct CountingMaterial {
    name: String,
    applied: AtomicUsize,
    fur: Option<FurParams>,
}

impl CountingMaterial {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ..Default::default()
        })
    }

    pub fn furry(name: &str, params: FurParams) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fur: Some(params),
            ..Default::default()
        })
    }

    pub fn applied(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }
}

impl Material for CountingMaterial {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, device: &mut dyn GpuDevice) {
        self.applied.fetch_add(1, Ordering::SeqCst);
        device.set_uniform_mat4(&self.name, &glam::Mat4::IDENTITY);
    }

    fn fur_params(&self) -> Option<&FurParams> {
        self.fur.as_ref()
    }
}

/// Quad command for `material` consumed by passes matching `flags`
pub fn quad_command(material: Arc<dyn Material>, flags: RenderPassFlag) -> RenderCommand {
    let (vertices, indices) = quad_mesh(0.5);
    RenderCommand::new(material, vertices, indices).with_flags(flags)
}

pub type ExecutionLog = Arc<Mutex<Vec<String>>>;

/// Pass that appends its name to a shared log when executed
pub struct RecordingPass {
    base: PassBase,
    log: ExecutionLog,
}

impl RecordingPass {
    pub fn new(config: RenderPassConfig, log: &ExecutionLog) -> Self {
        Self {
            base: PassBase::new(config),
            log: log.clone(),
        }
    }

    /// Custom pass depending on `deps` (all required)
    pub fn named(name: &str, deps: &[&str], log: &ExecutionLog) -> Self {
        let config = deps
            .iter()
            .fold(RenderPassConfig::new(name, PassType::Custom), |config, dep| {
                config.with_dependency(*dep, true)
            });
        Self::new(config, log)
    }
}

impl RenderPass for RecordingPass {
    fn base(&self) -> &PassBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PassBase {
        &mut self.base
    }

    fn execute(&mut self, device: &mut dyn GpuDevice, commands: &[RenderCommand]) -> helio_passgraph::Result<()> {
        self.base.begin(device)?;
        let draws = self.base.draw_commands(device, commands);
        self.base.end(device);
        self.base.record_execution(draws);
        self.log.lock().push(self.base.config().name.clone());
        Ok(())
    }
}

pub fn position(order: &[String], name: &str) -> usize {
    order
        .iter()
        .position(|n| n == name)
        .unwrap_or_else(|| panic!("'{}' missing from {:?}", name, order))
}
