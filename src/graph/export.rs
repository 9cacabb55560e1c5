//! Graph export functionality.
//!
//! This module provides functions to export the resolved resource graph
//! in various formats for visualization and analysis.

use crate::error::Result;
use crate::graph::types::{GraphNode, ReferenceStatus, ResourceGraph};
use crate::types::{GraphFormat, NodeId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Export the resource graph to the specified format.
///
/// # Supported Formats
///
/// - **DOT**: Graphviz DOT format for visualization
/// - **JSON**: Structured JSON for programmatic access
/// - **Mermaid**: Mermaid diagram syntax for documentation
///
/// Demoted edges are drawn dashed; unresolved targets appear as separate
/// dotted nodes.
///
/// # Example
///
/// ```rust
/// use terracarto::graph::{export_graph, ResourceGraph};
/// use terracarto::types::GraphFormat;
///
/// let graph = ResourceGraph::new();
/// let dot = export_graph(&graph, GraphFormat::Dot).unwrap();
/// assert!(dot.starts_with("digraph"));
/// ```
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn export_graph(graph: &ResourceGraph, format: GraphFormat) -> Result<String> {
    match format {
        GraphFormat::Dot => Ok(export_dot(graph)),
        GraphFormat::Json => export_json(graph),
        GraphFormat::Mermaid => Ok(export_mermaid(graph)),
    }
}

/// Unresolved targets with the reason recorded on the first reference to each.
fn unresolved_targets(graph: &ResourceGraph) -> BTreeMap<NodeId, (String, Vec<&GraphNode>)> {
    let mut targets: BTreeMap<NodeId, (String, Vec<&GraphNode>)> = BTreeMap::new();
    for node in graph.nodes() {
        for reference in &node.references {
            if let ReferenceStatus::Unresolved { reason } = &reference.status {
                let entry = targets
                    .entry(reference.target.clone())
                    .or_insert_with(|| (reason.clone(), Vec::new()));
                if !entry.1.iter().any(|n| n.id == node.id) {
                    entry.1.push(node);
                }
            }
        }
    }
    targets
}

/// Export to Graphviz DOT format.
fn export_dot(graph: &ResourceGraph) -> String {
    let mut dot = String::new();
    dot.push_str("digraph Terracarto {\n");
    dot.push_str("    rankdir=BT;\n");
    dot.push_str("    node [shape=box, style=rounded];\n");

    let mut by_category: BTreeMap<&str, Vec<&GraphNode>> = BTreeMap::new();
    for node in graph.nodes() {
        by_category.entry(&node.category).or_default().push(node);
    }

    for (category, nodes) in &by_category {
        let _ = writeln!(dot, "\n    subgraph cluster_{} {{", escape_dot_id(category));
        let _ = writeln!(dot, "        label=\"{}\";", escape_dot_string(category));
        dot.push_str("        style=dashed;\n");
        for node in nodes {
            let fill = if node.is_dependency_only() { "lightyellow" } else { "lightblue" };
            let _ = writeln!(
                dot,
                "        \"{}\" [label=\"{}\\n{}\", fillcolor={fill}, style=\"rounded,filled\"];",
                escape_dot_id(&node.id.to_string()),
                escape_dot_string(&node.address()),
                escape_dot_string(&node.id.provider_id),
            );
        }
        dot.push_str("    }\n");
    }

    let unresolved = unresolved_targets(graph);
    if !unresolved.is_empty() {
        dot.push('\n');
    }
    for (target, (reason, _)) in &unresolved {
        let _ = writeln!(
            dot,
            "    \"{}\" [label=\"{}\\n{}\", style=dotted, color=red];",
            escape_dot_id(&target.to_string()),
            escape_dot_string(&target.to_string()),
            escape_dot_string(reason),
        );
    }

    dot.push('\n');
    for (from, to, edge) in graph.edges() {
        let style = match (edge.demoted, edge.strength) {
            (true, _) => "style=dashed, color=gray, label=\"demoted\"",
            (false, crate::registry::ReferenceStrength::Hard) => "style=solid, color=blue",
            (false, crate::registry::ReferenceStrength::Soft) => "style=solid, color=orange",
        };
        let _ = writeln!(
            dot,
            "    \"{}\" -> \"{}\" [{style}];",
            escape_dot_id(&from.id.to_string()),
            escape_dot_id(&to.id.to_string()),
        );
    }
    for (target, (_, sources)) in &unresolved {
        for source in sources {
            let _ = writeln!(
                dot,
                "    \"{}\" -> \"{}\" [style=dotted, color=red];",
                escape_dot_id(&source.id.to_string()),
                escape_dot_id(&target.to_string()),
            );
        }
    }

    dot.push_str("}\n");
    dot
}

/// Export to JSON format.
fn export_json(graph: &ResourceGraph) -> Result<String> {
    #[derive(Serialize)]
    struct JsonGraph<'a> {
        nodes: Vec<JsonNode<'a>>,
        edges: Vec<JsonEdge>,
        unresolved: Vec<JsonUnresolved>,
        metadata: JsonMetadata,
    }

    #[derive(Serialize)]
    struct JsonNode<'a> {
        id: String,
        address: String,
        #[serde(rename = "type")]
        resource_type: &'a str,
        provider_id: &'a str,
        category: &'a str,
        origin: crate::graph::NodeOrigin,
    }

    #[derive(Serialize)]
    struct JsonEdge {
        from: String,
        to: String,
        strength: crate::registry::ReferenceStrength,
        demoted: bool,
    }

    #[derive(Serialize)]
    struct JsonUnresolved {
        target: String,
        reason: String,
        referenced_by: Vec<String>,
    }

    #[derive(Serialize)]
    struct JsonMetadata {
        total_nodes: usize,
        total_edges: usize,
        dependency_only: usize,
        demoted_edges: usize,
        unresolved_targets: usize,
    }

    let nodes: Vec<JsonNode<'_>> = graph
        .nodes()
        .map(|n| JsonNode {
            id: n.id.to_string(),
            address: n.address(),
            resource_type: &n.terraform_type,
            provider_id: &n.id.provider_id,
            category: &n.category,
            origin: n.origin,
        })
        .collect();

    let edges: Vec<JsonEdge> = graph
        .edges()
        .map(|(from, to, edge)| JsonEdge {
            from: from.id.to_string(),
            to: to.id.to_string(),
            strength: edge.strength,
            demoted: edge.demoted,
        })
        .collect();

    let unresolved: Vec<JsonUnresolved> = unresolved_targets(graph)
        .into_iter()
        .map(|(target, (reason, sources))| JsonUnresolved {
            target: target.to_string(),
            reason,
            referenced_by: sources.iter().map(|n| n.id.to_string()).collect(),
        })
        .collect();

    let json_graph = JsonGraph {
        metadata: JsonMetadata {
            total_nodes: nodes.len(),
            total_edges: edges.len(),
            dependency_only: graph.nodes().filter(|n| n.is_dependency_only()).count(),
            demoted_edges: graph.demoted_count(),
            unresolved_targets: unresolved.len(),
        },
        nodes,
        edges,
        unresolved,
    };

    serde_json::to_string_pretty(&json_graph).map_err(|e| {
        crate::err!(ReportGeneration {
            message: format!("Failed to serialize graph to JSON: {e}"),
        })
    })
}

/// Export to Mermaid diagram format.
fn export_mermaid(graph: &ResourceGraph) -> String {
    let mut mermaid = String::new();
    mermaid.push_str("graph BT\n");
    mermaid.push_str("    %% Terracarto resource graph\n\n");

    for node in graph.nodes() {
        let id = sanitize_mermaid_id(&node.id.to_string());
        let label = escape_mermaid_string(&node.address());
        let _ = writeln!(mermaid, "    {id}[\"{label}\"]");
    }

    let unresolved = unresolved_targets(graph);
    for target in unresolved.keys() {
        let id = sanitize_mermaid_id(&target.to_string());
        let label = escape_mermaid_string(&target.to_string());
        let _ = writeln!(mermaid, "    {id}([\"{label}\"])");
    }

    mermaid.push('\n');

    for (from, to, edge) in graph.edges() {
        let arrow = if edge.demoted { "-.->" } else { "-->" };
        let _ = writeln!(
            mermaid,
            "    {} {arrow} {}",
            sanitize_mermaid_id(&from.id.to_string()),
            sanitize_mermaid_id(&to.id.to_string()),
        );
    }
    for (target, (_, sources)) in &unresolved {
        for source in sources {
            let _ = writeln!(
                mermaid,
                "    {} -.-x {}",
                sanitize_mermaid_id(&source.id.to_string()),
                sanitize_mermaid_id(&target.to_string()),
            );
        }
    }

    mermaid.push_str("\n    %% Styling\n");
    mermaid.push_str("    classDef dependency fill:#fff8e1,stroke:#ff6f00\n");
    mermaid.push_str("    classDef unresolved stroke:#b71c1c,stroke-dasharray: 5 5\n");

    let dependency_ids: Vec<String> = graph
        .nodes()
        .filter(|n| n.is_dependency_only())
        .map(|n| sanitize_mermaid_id(&n.id.to_string()))
        .collect();
    if !dependency_ids.is_empty() {
        let _ = writeln!(mermaid, "    class {} dependency", dependency_ids.join(","));
    }
    let unresolved_ids: Vec<String> = unresolved
        .keys()
        .map(|t| sanitize_mermaid_id(&t.to_string()))
        .collect();
    if !unresolved_ids.is_empty() {
        let _ = writeln!(mermaid, "    class {} unresolved", unresolved_ids.join(","));
    }

    mermaid
}

/// Escape a string for use in DOT labels.
fn escape_dot_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Escape a string for use as a quoted DOT node ID.
fn escape_dot_id(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Sanitize a string for use as a Mermaid node ID.
fn sanitize_mermaid_id(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Escape a string for use in Mermaid labels.
fn escape_mermaid_string(s: &str) -> String {
    s.replace('"', "'").replace('\n', " ")
}
