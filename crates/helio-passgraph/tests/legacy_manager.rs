mod common;

use common::*;
use helio_passgraph::device::{DeviceCommand, HeadlessDevice};
use helio_passgraph::pass::{
    BasePass, Condition, FurParams, FurRenderPass, GeometryPass, PassState, PostProcessPass, SkyboxPass,
};
use helio_passgraph::{Error, ManagerConfig, RenderMode, RenderPass, RenderPassFlag, RenderPassManager, Vertex};

fn manager() -> RenderPassManager {
    let mut manager = RenderPassManager::new(ManagerConfig::default());
    manager.set_view(Some(view()));
    manager
}

/// Post-process reading `base.color` that also waits for the skybox
fn post_process() -> PostProcessPass {
    PostProcessPass::with_config(PostProcessPass::default_config("post_process", "base").with_dependency("skybox", true))
}

fn assert_deferred_order(order: &[String]) {
    assert_eq!(order.len(), 4, "{:?}", order);
    assert!(position(order, "geometry") < position(order, "base"));
    assert!(position(order, "base") < position(order, "post_process"));
    assert!(position(order, "skybox") < position(order, "post_process"));
}

#[test]
fn deferred_pipeline_runs_in_dependency_order() {
    init_logger();
    let mut device = HeadlessDevice::new();
    let mut manager = manager();
    manager.add_pass(SkyboxPass::new()).unwrap();
    manager.add_pass(GeometryPass::new()).unwrap();
    manager.add_pass(BasePass::new()).unwrap();
    manager.add_pass(post_process()).unwrap();
    manager.initialize_all(&mut device).unwrap();

    let material = CountingMaterial::new("opaque");
    let commands = vec![quad_command(material.clone(), RenderPassFlag::GEOMETRY)];
    manager.execute_all(&mut device, &commands).unwrap();

    assert_deferred_order(manager.last_executed());
    assert_eq!(manager.get_pass("geometry").unwrap().stats().draws, 1);
    assert_eq!(material.applied(), 1);

    // base inputs are the geometry outputs
    let geometry = manager.get_pass("geometry").unwrap();
    let base = manager.get_pass("base").unwrap();
    for name in ["albedo", "normal", "position", "depth"] {
        assert!(geometry.output_texture(name).is_some());
        assert_eq!(base.base().input(name), geometry.output_texture(name));
    }
}

#[test]
fn registration_order_does_not_matter() {
    let mut device = HeadlessDevice::new();
    let mut manager = manager();
    manager.add_pass(post_process()).unwrap();
    manager.add_pass(BasePass::new()).unwrap();
    manager.add_pass(GeometryPass::new()).unwrap();
    manager.add_pass(SkyboxPass::new()).unwrap();
    manager.initialize_all(&mut device).unwrap();

    manager.execute_all(&mut device, &[]).unwrap();
    assert_deferred_order(manager.last_executed());

    let sorted: Vec<String> = manager.execution_order().iter().map(|s| s.to_string()).collect();
    assert_eq!(sorted, manager.last_executed());
}

#[test]
fn duplicate_name_is_rejected_and_original_kept() {
    let log = ExecutionLog::default();
    let mut device = HeadlessDevice::new();
    let mut manager = manager();
    manager.add_pass(RecordingPass::named("a", &[], &log)).unwrap();
    manager.add_pass(RecordingPass::named("b", &["a"], &log)).unwrap();

    let disabled = RecordingPass::new(
        helio_passgraph::RenderPassConfig::new("a", helio_passgraph::pass::PassType::Custom)
            .with_state(PassState::Disabled),
        &log,
    );
    let err = manager.add_pass(disabled).unwrap_err();
    assert!(matches!(err, Error::DuplicatePass(ref name) if name == "a"));
    assert_eq!(manager.pass_names(), vec!["a", "b"]);

    manager.initialize_all(&mut device).unwrap();
    manager.execute_all(&mut device, &[]).unwrap();
    assert_eq!(*log.lock(), vec!["a", "b"]);
}

#[test]
fn disabled_pass_never_executes() {
    let log = ExecutionLog::default();
    let mut device = HeadlessDevice::new();
    let mut manager = manager();
    let config = helio_passgraph::RenderPassConfig::new("off", helio_passgraph::pass::PassType::Custom)
        .with_state(PassState::Disabled);
    manager.add_pass(RecordingPass::new(config, &log)).unwrap();
    manager.add_pass(RecordingPass::named("on", &[], &log)).unwrap();
    manager.initialize_all(&mut device).unwrap();

    for _ in 0..3 {
        manager.execute_all(&mut device, &[]).unwrap();
    }
    assert_eq!(manager.get_pass("off").unwrap().stats().executions, 0);
    assert_eq!(manager.get_pass("on").unwrap().stats().executions, 3);
    assert!(log.lock().iter().all(|name| name == "on"));
}

#[test]
fn conditional_pass_follows_flag() {
    let log = ExecutionLog::default();
    let mut device = HeadlessDevice::new();
    let mut manager = manager();
    let config = helio_passgraph::RenderPassConfig::new("shadow_debug", helio_passgraph::pass::PassType::Custom)
        .with_state(PassState::Conditional(Condition::flag("debug")));
    manager.add_pass(RecordingPass::new(config, &log)).unwrap();
    manager.initialize_all(&mut device).unwrap();

    manager.execute_all(&mut device, &[]).unwrap();
    assert!(manager.last_executed().is_empty());

    manager.set_condition("debug", true);
    manager.execute_all(&mut device, &[]).unwrap();
    assert_eq!(manager.last_executed(), ["shadow_debug"]);
}

#[test]
fn conditional_dependency_gates_dependent() {
    let log = ExecutionLog::default();
    let mut device = HeadlessDevice::new();
    let mut manager = manager();
    manager.add_pass(RecordingPass::named("shadow", &[], &log)).unwrap();
    let config = helio_passgraph::RenderPassConfig::new("lit", helio_passgraph::pass::PassType::Custom)
        .with_conditional_dependency("shadow", true, Condition::flag("shadows"));
    manager.add_pass(RecordingPass::new(config, &log)).unwrap();
    manager.initialize_all(&mut device).unwrap();

    manager.execute_all(&mut device, &[]).unwrap();
    assert_eq!(manager.last_executed(), ["shadow"]);

    manager.set_condition("shadows", true);
    manager.execute_all(&mut device, &[]).unwrap();
    assert_eq!(manager.last_executed(), ["shadow", "lit"]);
}

#[test]
fn missing_required_dependency_skips_only_that_pass() {
    let log = ExecutionLog::default();
    let mut device = HeadlessDevice::new();
    let mut manager = manager();
    manager.add_pass(RecordingPass::named("orphan", &["ghost"], &log)).unwrap();
    manager.add_pass(RecordingPass::named("fine", &[], &log)).unwrap();
    manager.initialize_all(&mut device).unwrap();

    manager.execute_all(&mut device, &[]).unwrap();
    assert_eq!(manager.last_executed(), ["fine"]);
}

#[test]
fn cycle_fails_loudly_and_runs_nothing() {
    let log = ExecutionLog::default();
    let mut device = HeadlessDevice::new();
    let mut manager = manager();
    manager.add_pass(RecordingPass::named("a", &["b"], &log)).unwrap();
    manager.add_pass(RecordingPass::named("b", &["a"], &log)).unwrap();
    manager.add_pass(RecordingPass::named("c", &[], &log)).unwrap();
    manager.initialize_all(&mut device).unwrap();

    match manager.execute_all(&mut device, &[]) {
        Err(Error::CyclicDependency { passes }) => {
            assert!(passes.contains(&"a".to_string()));
            assert!(passes.contains(&"b".to_string()));
            assert!(!passes.contains(&"c".to_string()));
        }
        other => panic!("expected cycle error, got {:?}", other),
    }
    assert!(log.lock().is_empty());

    // breaking the cycle recovers; `b` still lacks its dependency
    manager.remove_pass("a").unwrap();
    manager.execute_all(&mut device, &[]).unwrap();
    assert_eq!(*log.lock(), vec!["c"]);
}

#[test]
fn commands_reach_only_matching_passes() {
    let mut device = HeadlessDevice::new();
    let mut manager = manager();
    manager.add_pass(GeometryPass::new()).unwrap();
    manager.add_pass(FurRenderPass::new()).unwrap();
    manager.initialize_all(&mut device).unwrap();

    let material = CountingMaterial::furry("fur", FurParams::default().with_shells(3));
    let commands = vec![quad_command(material, RenderPassFlag::TRANSPARENT)];
    manager.execute_all(&mut device, &commands).unwrap();

    assert_eq!(manager.get_pass("geometry").unwrap().stats().draws, 0);
    assert_eq!(manager.get_pass("fur").unwrap().stats().draws, 1);

    let transparent_draws: Vec<usize> = device
        .commands()
        .iter()
        .filter_map(|c| match c {
            DeviceCommand::Draw {
                index_count,
                mode: RenderMode::Transparent,
                ..
            } => Some(*index_count),
            _ => None,
        })
        .collect();
    // three shells of a six-index quad
    assert_eq!(transparent_draws, vec![18]);
}

#[test]
fn empty_commands_are_skipped() {
    let mut device = HeadlessDevice::new();
    let mut manager = manager();
    manager.add_pass(GeometryPass::new()).unwrap();
    manager.initialize_all(&mut device).unwrap();

    let empty = helio_passgraph::RenderCommand::new(CountingMaterial::new("empty"), Vec::<Vertex>::new(), Vec::<u32>::new())
        .with_flags(RenderPassFlag::GEOMETRY);
    manager.execute_all(&mut device, &[empty]).unwrap();

    let stats = manager.get_pass("geometry").unwrap().stats();
    assert_eq!(stats.executions, 1);
    assert_eq!(stats.draws, 0);
    assert_eq!(stats.skipped, 1);
}

#[test]
fn post_effects_reachable_through_capability_query() {
    let mut device = HeadlessDevice::new();
    let mut manager = manager();
    manager.add_pass(GeometryPass::new()).unwrap();
    manager.add_pass(BasePass::new()).unwrap();
    manager.add_pass(PostProcessPass::new()).unwrap();
    manager.initialize_all(&mut device).unwrap();

    let bloom = CountingMaterial::new("bloom");
    let post = manager
        .get_pass_mut("post_process")
        .and_then(|pass| pass.as_post_process_mut())
        .unwrap();
    post.add_effect("bloom", bloom.clone()).unwrap();
    assert!(manager.get_pass_mut("geometry").unwrap().as_post_process_mut().is_none());

    manager.execute_all(&mut device, &[]).unwrap();
    assert_eq!(bloom.applied(), 1);
}

#[test]
fn resize_reaches_pass_targets() {
    let mut device = HeadlessDevice::new();
    let mut manager = manager();
    manager.add_pass(GeometryPass::new()).unwrap();
    manager.initialize_all(&mut device).unwrap();

    manager.resize(&mut device, 128, 96).unwrap();
    let albedo = manager.get_pass("geometry").unwrap().output_texture("albedo").unwrap();
    let desc = device.texture_desc(albedo).unwrap();
    assert_eq!((desc.width, desc.height), (128, 96));

    manager.execute_all(&mut device, &[]).unwrap();
    assert_eq!(manager.last_executed(), ["geometry"]);
}

#[test]
fn shutdown_releases_every_target() {
    let mut device = HeadlessDevice::new();
    let mut manager = manager();
    manager.add_pass(GeometryPass::new()).unwrap();
    manager.add_pass(BasePass::new()).unwrap();
    manager.initialize_all(&mut device).unwrap();
    manager.execute_all(&mut device, &[]).unwrap();
    assert!(device.live_texture_count() > 0);

    manager.shutdown(&mut device);
    assert_eq!(device.live_texture_count(), 0);
    assert_eq!(device.live_framebuffer_count(), 0);
}

#[test]
fn uninitialized_outputs_need_a_size() {
    let mut device = HeadlessDevice::new();
    let mut manager = RenderPassManager::default();
    manager.add_pass(GeometryPass::new()).unwrap();
    assert!(matches!(
        manager.initialize_all(&mut device),
        Err(Error::MissingExtent(ref name)) if name == "geometry"
    ));

    // output-less passes are fine without a view
    let mut manager = RenderPassManager::default();
    manager.add_pass(SkyboxPass::new().with_material(CountingMaterial::new("sky"))).unwrap();
    manager.initialize_all(&mut device).unwrap();
    manager.execute_all(&mut device, &[]).unwrap();
    assert_eq!(manager.get_pass("skybox").unwrap().stats().draws, 1);
}
