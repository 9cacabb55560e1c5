//! Terraform state (format version 4) output.

use crate::config::StateOptions;
use crate::error::Result;
use crate::graph::{GraphNode, ResourceGraph};
use crate::registry::Registry;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Serialize)]
struct StateDocument<'a> {
    version: u8,
    terraform_version: &'a str,
    serial: u64,
    lineage: String,
    outputs: BTreeMap<String, Value>,
    resources: Vec<StateResource<'a>>,
}

#[derive(Serialize)]
struct StateResource<'a> {
    mode: &'static str,
    #[serde(rename = "type")]
    resource_type: &'a str,
    name: &'a str,
    provider: String,
    instances: Vec<StateInstance>,
}

#[derive(Serialize)]
struct StateInstance {
    schema_version: u8,
    attributes: BTreeMap<String, Value>,
    sensitive_attributes: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dependencies: Vec<String>,
}

pub(super) fn render(
    graph: &ResourceGraph,
    order: &[&GraphNode],
    registry: &Registry,
    options: &StateOptions,
) -> Result<String> {
    let mut resources = Vec::with_capacity(order.len());
    for node in order {
        resources.push(resource(graph, node, registry)?);
    }

    let document = StateDocument {
        version: 4,
        terraform_version: &options.terraform_version,
        serial: 1,
        lineage: options.lineage.clone().unwrap_or_else(|| lineage(order)),
        outputs: BTreeMap::new(),
        resources,
    };

    let mut out = serde_json::to_string_pretty(&document).map_err(|e| {
        crate::err!(Serialization {
            node: "terraform.tfstate".to_string(),
            message: e.to_string(),
        })
    })?;
    out.push('\n');
    Ok(out)
}

fn resource<'a>(graph: &ResourceGraph, node: &'a GraphNode, registry: &Registry) -> Result<StateResource<'a>> {
    let id = registry
        .get(&node.terraform_type)
        .and_then(|descriptor| descriptor.identity_of(&node.attributes))
        .ok_or_else(|| {
            crate::err!(Serialization {
                node: node.address(),
                message: "identity fields are missing".to_string(),
            })
        })?;

    let mut attributes = node.attributes.clone();
    attributes.insert("id".to_string(), Value::String(id));

    let dependencies = graph
        .dependencies(&node.id)
        .iter()
        .map(|dep| dep.address())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    Ok(StateResource {
        mode: "managed",
        resource_type: &node.terraform_type,
        name: &node.local_name,
        provider: format!("provider[\"registry.terraform.io/hashicorp/{}\"]", node.provider),
        instances: vec![StateInstance {
            schema_version: 0,
            attributes,
            sensitive_attributes: Vec::new(),
            dependencies,
        }],
    })
}

/// Name-based (v5) UUID over the sorted node IDs.
fn lineage(order: &[&GraphNode]) -> String {
    let mut ids: Vec<String> = order.iter().map(|n| n.id.to_string()).collect();
    ids.sort();
    let seed = ids.join("\n");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()).to_string()
}
