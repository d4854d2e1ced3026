//! Graph compilation: ordering, lifetimes, aliasing, sync points

use super::resource::{
    PassNode, ResourceAllocation, ResourceDesc, ResourceLifetime, ResourceState, SyncPoint,
};
use super::{CompiledGraph, RenderGraphBuilder};
use crate::target::PixelFormat;
use crate::{Error, Result};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Turns a builder's declarations into a [`CompiledGraph`]
#[derive(Debug, Default)]
pub struct RenderGraphCompiler {
    /// Skip aliasing entirely, every resource gets its own storage
    disable_aliasing: bool,
}

impl RenderGraphCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_aliasing(mut self, enabled: bool) -> Self {
        self.disable_aliasing = !enabled;
        self
    }

    pub fn compile(&self, builder: &RenderGraphBuilder) -> Result<CompiledGraph> {
        let nodes = builder.nodes();
        log::info!("Compiling render graph with {} passes", nodes.len());

        let edges = build_edges(nodes);
        let order = topological_order(nodes, &edges)?;
        for (position, &index) in order.iter().enumerate() {
            log::debug!("  Pass {}: {}", position, nodes[index].name);
        }

        let sorted: Vec<PassNode> = order.iter().map(|&i| nodes[i].clone()).collect();
        let lifetimes = compute_lifetimes(&sorted);

        let mut resources = BTreeMap::new();
        for name in lifetimes.keys() {
            match builder.resources().get(name) {
                Some(desc) => {
                    resources.insert(name.clone(), desc.clone());
                }
                None => log::warn!("Render graph resource '{}' is used but never produced", name),
            }
        }

        let aliases = if self.disable_aliasing {
            BTreeMap::new()
        } else {
            compute_aliases(&resources, &lifetimes)
        };
        let sync_points = compute_sync_points(&sorted);
        let allocations = compute_allocations(&resources, &lifetimes, &aliases);

        log::info!(
            "Render graph compiled: {} passes, {} resources ({} aliased), {} sync points",
            sorted.len(),
            resources.len(),
            aliases.len(),
            sync_points.len()
        );

        Ok(CompiledGraph {
            order,
            nodes: sorted,
            resources,
            aliases,
            lifetimes,
            sync_points,
            allocations,
        })
    }
}

/// "Must run before" edges: explicit dependencies plus writer -> reader
fn build_edges(nodes: &[PassNode]) -> BTreeSet<(usize, usize)> {
    let index: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (n.name.as_str(), i)).collect();

    let mut writers: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, node) in nodes.iter().enumerate() {
        for usage in node.writes() {
            writers.entry(usage.resource.as_str()).or_default().push(i);
        }
    }

    let mut edges = BTreeSet::new();
    for (b, node) in nodes.iter().enumerate() {
        for dep in &node.dependencies {
            match index.get(dep.pass.as_str()) {
                Some(&a) if a != b => {
                    edges.insert((a, b));
                }
                Some(_) => {}
                None => log::debug!("Pass '{}' depends on unknown pass '{}'", node.name, dep.pass),
            }
        }
        for usage in node.reads() {
            let Some(resource_writers) = writers.get(usage.resource.as_str()) else {
                continue;
            };
            // a pass that also writes the resource only follows earlier writers
            let also_writes = usage.access.writes() || node.writes().any(|w| w.resource == usage.resource);
            for &a in resource_writers {
                if a == b || (also_writes && a > b) {
                    continue;
                }
                edges.insert((a, b));
            }
        }
    }
    edges
}

/// Kahn's algorithm, FIFO so independent passes keep insertion order
fn topological_order(nodes: &[PassNode], edges: &BTreeSet<(usize, usize)>) -> Result<Vec<usize>> {
    let mut in_degree = vec![0usize; nodes.len()];
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for &(a, b) in edges {
        adjacency[a].push(b);
        in_degree[b] += 1;
    }

    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(node) = queue.pop_front() {
        order.push(node);
        for &next in &adjacency[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() != nodes.len() {
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        let cycle = find_cycle(&names, edges.iter().copied());
        log::error!("Cyclic dependency detected in render graph: {}", cycle.join(" -> "));
        return Err(Error::CyclicDependency { passes: cycle });
    }
    Ok(order)
}

/// Names of the passes forming cycles, in declaration order
pub(crate) fn find_cycle(names: &[&str], edges: impl IntoIterator<Item = (usize, usize)>) -> Vec<String> {
    let mut graph = DiGraph::<usize, ()>::new();
    let indices: Vec<_> = (0..names.len()).map(|i| graph.add_node(i)).collect();
    let mut self_loops = BTreeSet::new();
    for (a, b) in edges {
        if a == b {
            self_loops.insert(a);
        }
        graph.add_edge(indices[a], indices[b], ());
    }

    let mut members: BTreeSet<usize> = BTreeSet::new();
    for component in tarjan_scc(&graph) {
        if component.len() > 1 || self_loops.contains(&graph[component[0]]) {
            members.extend(component.iter().map(|&n| graph[n]));
        }
    }
    members.into_iter().map(|i| names[i].to_string()).collect()
}

/// First/last position of every resource in compiled order
fn compute_lifetimes(sorted: &[PassNode]) -> BTreeMap<String, ResourceLifetime> {
    let mut lifetimes: BTreeMap<String, ResourceLifetime> = BTreeMap::new();
    for (position, node) in sorted.iter().enumerate() {
        for usage in &node.usages {
            lifetimes
                .entry(usage.resource.clone())
                .and_modify(|lt| {
                    lt.first_use = lt.first_use.min(position);
                    lt.last_use = lt.last_use.max(position);
                })
                .or_insert(ResourceLifetime {
                    first_use: position,
                    last_use: position,
                });
        }
    }
    lifetimes
}

/// Greedy interval packing per (format, width, height) group.
///
/// A resource aliases the first canonical resource none of whose occupants
/// overlap it; aliases always point at a canonical resource, never at another
/// alias. Persistent resources are never aliased.
fn compute_aliases(
    resources: &BTreeMap<String, ResourceDesc>,
    lifetimes: &BTreeMap<String, ResourceLifetime>,
) -> BTreeMap<String, String> {
    let mut groups: HashMap<(PixelFormat, u32, u32), Vec<(&str, ResourceLifetime)>> = HashMap::new();
    for (name, desc) in resources.iter().filter(|(_, d)| !d.persistent) {
        let Some(lifetime) = lifetimes.get(name) else {
            continue;
        };
        groups.entry(desc.storage_key()).or_default().push((name.as_str(), *lifetime));
    }

    let mut aliases = BTreeMap::new();
    for (_, mut members) in groups {
        members.sort_by(|a, b| a.1.first_use.cmp(&b.1.first_use).then(a.0.cmp(b.0)));

        // canonical name + every lifetime placed in its storage
        let mut slots: Vec<(&str, Vec<ResourceLifetime>)> = Vec::new();
        for (name, lifetime) in members {
            let slot = slots
                .iter_mut()
                .find(|(_, occupied)| occupied.iter().all(|other| !other.overlaps(&lifetime)));
            match slot {
                Some((canonical, occupied)) => {
                    log::debug!("Aliasing '{}' onto '{}'", name, canonical);
                    occupied.push(lifetime);
                    aliases.insert(name.to_string(), canonical.to_string());
                }
                None => slots.push((name, vec![lifetime])),
            }
        }
    }
    aliases
}

/// Transitions for reads of resources whose tracked state differs
fn compute_sync_points(sorted: &[PassNode]) -> Vec<SyncPoint> {
    let mut states: HashMap<&str, ResourceState> = HashMap::new();
    let mut sync_points = Vec::new();

    for (position, node) in sorted.iter().enumerate() {
        for usage in node.reads() {
            let current = states.get(usage.resource.as_str()).copied().unwrap_or(ResourceState::Undefined);
            if current != ResourceState::Undefined && current != usage.state {
                log::debug!(
                    "Sync point before '{}': {} {:?} -> {:?}",
                    node.name,
                    usage.resource,
                    current,
                    usage.state
                );
                sync_points.push(SyncPoint {
                    position,
                    resource: usage.resource.clone(),
                    from: current,
                    to: usage.state,
                });
                states.insert(usage.resource.as_str(), usage.state);
            }
        }
        for usage in node.writes() {
            states.insert(usage.resource.as_str(), usage.state);
        }
    }
    sync_points
}

fn compute_allocations(
    resources: &BTreeMap<String, ResourceDesc>,
    lifetimes: &BTreeMap<String, ResourceLifetime>,
    aliases: &BTreeMap<String, String>,
) -> Vec<ResourceAllocation> {
    let mut allocations: Vec<ResourceAllocation> = resources
        .iter()
        .filter_map(|(name, desc)| {
            let lifetime = lifetimes.get(name)?;
            Some(ResourceAllocation {
                resource: name.clone(),
                alias_of: aliases.get(name).cloned(),
                create_at: lifetime.first_use,
                destroy_at: lifetime.last_use + 1,
                persistent: desc.persistent,
            })
        })
        .collect();
    allocations.sort_by(|a, b| a.create_at.cmp(&b.create_at).then_with(|| a.resource.cmp(&b.resource)));
    allocations
}
