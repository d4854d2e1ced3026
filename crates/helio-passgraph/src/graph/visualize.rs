//! Graphviz export of a compiled graph, for debugging

use super::CompiledGraph;
use crate::Result;
use std::fmt::Write as _;
use std::path::Path;

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render the graph as DOT: boxes for passes, ellipses for resources
///
/// Edge styles: dashed gray = explicit dependency, red = write, teal = read,
/// dotted purple = alias onto canonical storage.
pub fn to_dot(graph: &CompiledGraph) -> String {
    let mut dot = String::new();
    // writing into a String cannot fail
    let _ = write_graph(graph, &mut dot);
    dot
}

fn write_graph(graph: &CompiledGraph, dot: &mut String) -> std::fmt::Result {
    writeln!(dot, "digraph RenderGraph {{")?;
    writeln!(dot, "    rankdir=LR;")?;
    writeln!(dot, "    node [fontname=\"Helvetica\", fontsize=10];")?;
    writeln!(dot, "    edge [fontname=\"Helvetica\", fontsize=9];")?;

    for (position, node) in graph.nodes().iter().enumerate() {
        writeln!(
            dot,
            "    \"pass:{0}\" [shape=box, style=\"rounded,filled\", fillcolor=\"#8ecae6\", label=\"{1}: {0}\"];",
            escape(&node.name),
            position
        )?;
    }

    for (name, desc) in graph.resources() {
        let lifetime = graph
            .lifetime(name)
            .map(|lt| format!("[{}..{}]", lt.first_use, lt.last_use))
            .unwrap_or_default();
        let fill = if desc.persistent { "#ffb703" } else { "#e9edc9" };
        writeln!(
            dot,
            "    \"res:{0}\" [shape=ellipse, style=filled, fillcolor=\"{1}\", label=\"{0}\\n{2:?} {3}x{4}\\n{5}\"];",
            escape(name),
            fill,
            desc.format,
            desc.width,
            desc.height,
            lifetime
        )?;
    }

    for node in graph.nodes() {
        for dep in &node.dependencies {
            if graph.position(&dep.pass).is_none() {
                continue;
            }
            let mut label = if dep.required { "required".to_string() } else { "optional".to_string() };
            if !dep.condition.is_always() {
                label.push_str(&format!(" if {}", dep.condition));
            }
            writeln!(
                dot,
                "    \"pass:{}\" -> \"pass:{}\" [style=dashed, color=gray50, label=\"{}\"];",
                escape(&dep.pass),
                escape(&node.name),
                escape(&label)
            )?;
        }
        for usage in &node.usages {
            if graph.resource(&usage.resource).is_none() {
                continue;
            }
            if usage.access.writes() {
                writeln!(
                    dot,
                    "    \"pass:{}\" -> \"res:{}\" [color=\"#d62828\", label=\"write\"];",
                    escape(&node.name),
                    escape(&usage.resource)
                )?;
            }
            if usage.access.reads() {
                writeln!(
                    dot,
                    "    \"res:{}\" -> \"pass:{}\" [color=\"#2a9d8f\", label=\"read\"];",
                    escape(&usage.resource),
                    escape(&node.name)
                )?;
            }
        }
    }

    for (alias, canonical) in graph.aliases() {
        writeln!(
            dot,
            "    \"res:{}\" -> \"res:{}\" [style=dotted, color=\"#6a4c93\", label=\"alias\"];",
            escape(alias),
            escape(canonical)
        )?;
    }

    writeln!(dot, "}}")
}

/// Write [`to_dot`] output to a file
pub fn write_dot(graph: &CompiledGraph, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, to_dot(graph))?;
    log::info!("Wrote render graph to {}", path.display());
    Ok(())
}
