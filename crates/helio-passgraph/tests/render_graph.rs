mod common;

use common::*;
use helio_passgraph::device::{Attachment, DeviceCommand, HeadlessDevice};
use helio_passgraph::graph::{to_dot, ResourceDesc, ResourceState};
use helio_passgraph::pass::{BasePass, GeometryPass, PassState, PassType, PostProcessPass, SkyboxPass};
use helio_passgraph::{
    Error, ManagerConfig, PixelFormat, RenderGraphBuilder, RenderGraphCompiler, RenderGraphExecutor, RenderPass,
    RenderPassConfig, RenderPassFlag, RenderPassManager,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn pass(name: &str) -> RenderPassConfig {
    RenderPassConfig::new(name, PassType::Custom)
}

/// a -> b -> c -> d, each handing one Rgba16F image to the next
fn chain() -> RenderGraphBuilder {
    let mut builder = RenderGraphBuilder::new().with_default_extent(32, 32);
    builder
        .add_config(&pass("d").with_input("z", "c", "z", true), None)
        .unwrap();
    builder
        .add_config(&pass("c").with_input("y", "b", "y", true).with_output("z", PixelFormat::Rgba16F), None)
        .unwrap();
    builder
        .add_config(&pass("b").with_input("x", "a", "x", true).with_output("y", PixelFormat::Rgba16F), None)
        .unwrap();
    builder
        .add_config(&pass("a").with_output("x", PixelFormat::Rgba16F), None)
        .unwrap();
    builder
}

#[test]
fn resource_flow_orders_passes() {
    init_logger();
    let graph = chain().compile().unwrap();
    assert_eq!(graph.pass_names(), vec!["a", "b", "c", "d"]);
    assert_eq!(graph.execution_order(), &[3, 2, 1, 0]);

    let x = graph.lifetime("a.x").unwrap();
    assert_eq!((x.first_use, x.last_use), (0, 1));
    let z = graph.lifetime("c.z").unwrap();
    assert_eq!((z.first_use, z.last_use), (2, 3));
}

#[test]
fn disjoint_lifetimes_share_storage() {
    let graph = chain().compile().unwrap();
    assert_eq!(graph.alias_of("c.z"), Some("a.x"));
    assert_eq!(graph.alias_of("b.y"), None);
    assert_eq!(graph.physical_resource_count(), 2);

    let allocation = graph.allocation("c.z").unwrap();
    assert_eq!(allocation.alias_of.as_deref(), Some("a.x"));
    assert_eq!((allocation.create_at, allocation.destroy_at), (2, 4));

    let unaliased = RenderGraphCompiler::new().with_aliasing(false).compile(&chain()).unwrap();
    assert!(unaliased.aliases().is_empty());
    assert_eq!(unaliased.physical_resource_count(), 3);
}

#[test]
fn explicit_dependencies_order_passes() {
    let mut builder = RenderGraphBuilder::new();
    builder.add_config(&pass("post").with_dependency("sky", true), None).unwrap();
    builder.add_config(&pass("sky"), None).unwrap();
    let graph = builder.compile().unwrap();
    assert_eq!(graph.pass_names(), vec!["sky", "post"]);
}

#[test]
fn mutual_dependency_fails_compilation() {
    let mut builder = RenderGraphBuilder::new();
    builder.add_config(&pass("a").with_dependency("b", true), None).unwrap();
    builder.add_config(&pass("b").with_dependency("a", true), None).unwrap();
    builder.add_config(&pass("c"), None).unwrap();

    match builder.compile() {
        Err(Error::CyclicDependency { passes }) => assert_eq!(passes, vec!["a", "b"]),
        other => panic!("expected cycle error, got {:?}", other.map(|g| g.pass_names().len())),
    }
}

#[test]
fn resource_cycle_fails_compilation() {
    let mut builder = RenderGraphBuilder::new();
    builder
        .add_config(&pass("a").with_input("in", "b", "out", true).with_output("out", PixelFormat::Rgba8), None)
        .unwrap();
    builder
        .add_config(&pass("b").with_input("in", "a", "out", true).with_output("out", PixelFormat::Rgba8), None)
        .unwrap();
    assert!(matches!(builder.compile(), Err(Error::CyclicDependency { .. })));
}

#[test]
fn duplicate_pass_and_resource_rejected() {
    let mut builder = RenderGraphBuilder::new();
    builder.add_config(&pass("a"), None).unwrap();
    assert!(matches!(builder.add_config(&pass("a"), None), Err(Error::DuplicatePass(_))));
    assert_eq!(builder.nodes().len(), 1);

    builder
        .declare_resource(ResourceDesc::new("history", PixelFormat::Rgba16F, 8, 8).persistent())
        .unwrap();
    assert!(matches!(
        builder.declare_resource(ResourceDesc::new("history", PixelFormat::Rgba8, 8, 8)),
        Err(Error::DuplicateResource(_))
    ));
    assert_eq!(builder.resources()["history"].format, PixelFormat::Rgba16F);
}

#[test]
fn usage_without_pass_is_an_error() {
    let mut builder = RenderGraphBuilder::new();
    assert!(matches!(builder.read("anything"), Err(Error::NoPassForUsage(_))));
}

#[test]
fn extra_usages_attach_to_last_pass() {
    let mut builder = RenderGraphBuilder::new();
    builder
        .declare_resource(ResourceDesc::new("history", PixelFormat::Rgba16F, 16, 16).persistent())
        .unwrap();
    builder.add_config(&pass("taa"), None).unwrap().read_write("history").unwrap();
    builder.add_config(&pass("resolve"), None).unwrap().read("history").unwrap();

    let graph = builder.compile().unwrap();
    assert_eq!(graph.pass_names(), vec!["taa", "resolve"]);
    assert!(graph.nodes()[0].uses("history"));
    assert!(graph.alias_of("history").is_none());

    // taa leaves it as a render target, resolve samples it
    let syncs: Vec<_> = graph.sync_points().iter().collect();
    assert_eq!(syncs.len(), 1);
    assert_eq!(syncs[0].position, 1);
    assert_eq!(syncs[0].from, ResourceState::RenderTarget);
    assert_eq!(syncs[0].to, ResourceState::ShaderRead);
}

#[test]
fn sync_points_only_after_writes() {
    let graph = chain().compile().unwrap();
    let synced: Vec<&str> = graph.sync_points().iter().map(|s| s.resource.as_str()).collect();
    assert_eq!(synced, vec!["a.x", "b.y", "c.z"]);
    assert!(graph.sync_points().iter().all(|s| s.from == ResourceState::RenderTarget));

    // reading something nobody wrote never syncs
    let mut builder = RenderGraphBuilder::new();
    builder.add_config(&pass("lonely").with_input("in", "nobody", "out", false), None).unwrap();
    assert!(builder.compile().unwrap().sync_points().is_empty());
}

/// Random layered graphs: aliasing never joins overlapping lifetimes
#[test]
fn aliasing_never_overlaps() {
    let formats = [PixelFormat::Rgba8, PixelFormat::Rgba16F];
    for seed in 0..32u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let pass_count = rng.gen_range(3..12);
        let mut builder = RenderGraphBuilder::new().with_default_extent(16, 16);

        for i in 0..pass_count {
            let mut config = pass(&format!("p{}", i));
            for _ in 0..rng.gen_range(0..3) {
                if i == 0 {
                    break;
                }
                let source = rng.gen_range(0..i);
                config = config.with_input(format!("in{}", source), format!("p{}", source), "out", false);
            }
            config = config.with_output("out", formats[rng.gen_range(0..formats.len())]);
            builder.add_config(&config, None).unwrap();
        }

        let graph = builder.compile().unwrap();
        for (alias, canonical) in graph.aliases() {
            assert!(graph.alias_of(canonical).is_none(), "seed {}: chained alias", seed);
            assert_eq!(graph.resource(alias).unwrap().storage_key(), graph.resource(canonical).unwrap().storage_key());
        }

        // every pair sharing storage is disjoint in time
        let names: Vec<&String> = graph.lifetimes().keys().collect();
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                if graph.canonical(a) != graph.canonical(b) {
                    continue;
                }
                let (la, lb) = (graph.lifetime(a).unwrap(), graph.lifetime(b).unwrap());
                assert!(!la.overlaps(&lb), "seed {}: '{}' {:?} and '{}' {:?} share storage", seed, a, la, b, lb);
            }
        }

        // topological validity for resource edges
        for node in graph.nodes() {
            for usage in node.reads() {
                let writer = usage.resource.split('.').next().unwrap();
                assert!(graph.position(writer).unwrap() < graph.position(&node.name).unwrap());
            }
        }
    }
}

#[test]
fn executor_runs_passes_and_releases_transients() {
    let mut device = HeadlessDevice::new();
    let log = ExecutionLog::default();
    let configs = [
        pass("a").with_output("x", PixelFormat::Rgba16F),
        pass("b").with_input("x", "a", "x", true).with_output("y", PixelFormat::Rgba16F),
        pass("c").with_input("y", "b", "y", true).with_output("z", PixelFormat::Rgba16F),
        pass("d").with_input("z", "c", "z", true),
    ];
    let mut passes: Vec<Box<dyn RenderPass>> = Vec::new();
    let mut builder = RenderGraphBuilder::new();
    for config in configs {
        let mut recording = RecordingPass::new(config, &log);
        recording.initialize(&mut device, Some(view()), None).unwrap();
        builder.add_pass(&recording).unwrap();
        passes.push(Box::new(recording));
    }
    let textures_before = device.live_texture_count();
    let own_z = passes[2].output_texture("z").unwrap();
    let c_framebuffer = passes[2].base().framebuffer().and_then(|fb| fb.framebuffer()).unwrap();
    device.clear_commands();

    let mut executor = RenderGraphExecutor::new(builder.compile().unwrap());
    executor.execute(&mut device, &mut passes, &[], &Default::default()).unwrap();

    assert_eq!(*log.lock(), vec!["a", "b", "c", "d"]);
    assert_eq!(executor.live_resource_count(), 0);
    assert_eq!(device.live_texture_count(), textures_before);
    assert_eq!(executor.frame(), 1);

    // "c" rendered into graph storage and "d" sampled that same texture
    let storage = device
        .commands()
        .iter()
        .find_map(|cmd| match cmd {
            DeviceCommand::Attach { framebuffer, attachment: Attachment::Color(0), texture: Some(t) }
                if *framebuffer == c_framebuffer =>
            {
                Some(*t)
            }
            _ => None,
        })
        .unwrap();
    assert_ne!(storage, own_z);
    assert!(device
        .commands()
        .contains(&DeviceCommand::BindTexture { unit: 0, texture: Some(storage) }));

    // released storage is no longer reachable from any pass
    assert!(!device.is_texture_alive(storage));
    assert_eq!(passes[2].output_texture("z"), Some(own_z));
    assert_eq!(passes[3].base().input("z"), None);
    for pass in &passes {
        for output in &pass.config().outputs {
            let texture = pass.output_texture(&output.name).unwrap();
            assert!(device.is_texture_alive(texture), "{}.{} is dead", pass.name(), output.name);
        }
    }
}

#[test]
fn executor_rejects_mismatched_pass_list() {
    let mut device = HeadlessDevice::new();
    let log = ExecutionLog::default();
    let mut builder = RenderGraphBuilder::new();
    builder.add_config(&pass("a"), None).unwrap();
    builder.add_config(&pass("b"), None).unwrap();
    let mut executor = RenderGraphExecutor::new(builder.compile().unwrap());

    let mut swapped: Vec<Box<dyn RenderPass>> = vec![
        Box::new(RecordingPass::named("b", &[], &log)),
        Box::new(RecordingPass::named("a", &[], &log)),
    ];
    let result = executor.execute(&mut device, &mut swapped, &[], &Default::default());
    assert!(matches!(result, Err(Error::GraphMismatch(_))));
    assert!(log.lock().is_empty());
}

#[test]
fn manager_graph_mode_runs_deferred_pipeline() {
    init_logger();
    let mut device = HeadlessDevice::new();
    let mut manager = RenderPassManager::new(ManagerConfig::default().with_render_graph(true));
    manager.set_view(Some(view()));
    manager.add_pass(PostProcessPass::with_config(
        PostProcessPass::default_config("post_process", "base").with_dependency("skybox", true),
    ))
    .unwrap();
    manager.add_pass(BasePass::new()).unwrap();
    manager.add_pass(GeometryPass::new()).unwrap();
    manager.add_pass(SkyboxPass::new()).unwrap();
    manager.initialize_all(&mut device).unwrap();
    let textures_before = device.live_texture_count();

    let material = CountingMaterial::new("opaque");
    let commands = vec![quad_command(material.clone(), RenderPassFlag::GEOMETRY)];
    for _ in 0..2 {
        manager.execute_all(&mut device, &commands).unwrap();
        let order = manager.last_executed();
        assert_eq!(order.len(), 4, "{:?}", order);
        assert!(position(order, "geometry") < position(order, "base"));
        assert!(position(order, "base") < position(order, "post_process"));
        assert!(position(order, "skybox") < position(order, "post_process"));
    }
    assert_eq!(material.applied(), 2);
    assert_eq!(device.live_texture_count(), textures_before);

    let graph = manager.compiled_graph().unwrap();
    assert!(graph.resource("geometry.albedo").is_some());
    assert!(graph.lifetime("base.color").is_some());

    let dot = to_dot(graph);
    assert!(dot.starts_with("digraph RenderGraph {"));
    assert!(dot.contains("\"pass:geometry\""));
    assert!(dot.contains("\"res:geometry.albedo\""));
}

#[test]
fn manager_graph_mode_reports_cycles() {
    let log = ExecutionLog::default();
    let mut device = HeadlessDevice::new();
    let mut manager = RenderPassManager::new(ManagerConfig::default().with_render_graph(true));
    manager.add_pass(RecordingPass::named("a", &["b"], &log)).unwrap();
    manager.add_pass(RecordingPass::named("b", &["a"], &log)).unwrap();
    manager.initialize_all(&mut device).unwrap();

    assert!(matches!(
        manager.execute_all(&mut device, &[]),
        Err(Error::CyclicDependency { .. })
    ));
    assert!(log.lock().is_empty());
    assert!(manager.compiled_graph().is_none());
}

fn deferred_manager(device: &mut HeadlessDevice) -> RenderPassManager {
    let mut manager = RenderPassManager::new(ManagerConfig::default().with_render_graph(true));
    manager.set_view(Some(view()));
    manager.add_pass(GeometryPass::new()).unwrap();
    manager.add_pass(BasePass::new()).unwrap();
    manager.initialize_all(device).unwrap();
    manager
}

fn assert_outputs_alive(manager: &RenderPassManager, device: &HeadlessDevice) {
    for name in manager.pass_names() {
        let pass = manager.get_pass(name).unwrap();
        for output in &pass.config().outputs {
            let texture = pass.output_texture(&output.name).unwrap();
            assert!(device.is_texture_alive(texture), "{}.{} points at freed storage", name, output.name);
        }
    }
}

#[test]
fn switching_to_legacy_restores_pass_outputs() {
    init_logger();
    let mut device = HeadlessDevice::new();
    let mut manager = deferred_manager(&mut device);
    let commands = vec![quad_command(CountingMaterial::new("opaque"), RenderPassFlag::GEOMETRY)];

    manager.execute_all(&mut device, &commands).unwrap();
    assert_outputs_alive(&manager, &device);

    manager.set_use_render_graph(false);
    manager.execute_all(&mut device, &commands).unwrap();
    assert_eq!(manager.last_executed(), ["geometry", "base"]);
    assert!(manager.compiled_graph().is_none());
    assert_outputs_alive(&manager, &device);

    let albedo = manager.get_pass("geometry").unwrap().output_texture("albedo").unwrap();
    assert!(device.is_texture_alive(albedo));
    assert_eq!(manager.get_pass("base").unwrap().base().input("albedo"), Some(albedo));
}

#[test]
fn mode_round_trip_keeps_storage_balanced() {
    let mut device = HeadlessDevice::new();
    let mut manager = deferred_manager(&mut device);
    let textures_before = device.live_texture_count();
    let material = CountingMaterial::new("opaque");
    let commands = vec![quad_command(material.clone(), RenderPassFlag::GEOMETRY)];

    for graph_mode in [true, false, true] {
        manager.set_use_render_graph(graph_mode);
        manager.execute_all(&mut device, &commands).unwrap();
        assert_eq!(manager.last_executed(), ["geometry", "base"], "graph mode {}", graph_mode);
        assert_eq!(manager.compiled_graph().is_some(), graph_mode);
        assert_eq!(device.live_texture_count(), textures_before);
        assert_outputs_alive(&manager, &device);
    }
    assert_eq!(material.applied(), 3);

    manager.shutdown(&mut device);
    assert_eq!(device.live_texture_count(), 0);
}

#[test]
fn graph_mode_never_runs_disabled_pass() {
    let log = ExecutionLog::default();
    let mut device = HeadlessDevice::new();
    let mut manager = RenderPassManager::new(ManagerConfig::default().with_render_graph(true));
    manager
        .add_pass(RecordingPass::new(pass("off").with_state(PassState::Disabled), &log))
        .unwrap();
    manager.add_pass(RecordingPass::named("on", &[], &log)).unwrap();
    // registered dependencies count as met even when disabled
    manager.add_pass(RecordingPass::named("after", &["off"], &log)).unwrap();
    manager.initialize_all(&mut device).unwrap();

    for _ in 0..3 {
        manager.execute_all(&mut device, &[]).unwrap();
        assert!(!manager.last_executed().iter().any(|name| name == "off"));
    }
    assert!(manager.compiled_graph().is_some());
    assert_eq!(manager.get_pass("off").unwrap().stats().executions, 0);
    assert_eq!(manager.get_pass("on").unwrap().stats().executions, 3);
    assert_eq!(manager.get_pass("after").unwrap().stats().executions, 3);
    assert!(log.lock().iter().all(|name| name != "off"));
}
