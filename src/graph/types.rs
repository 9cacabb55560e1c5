//! Graph type definitions.
//!
//! This module defines the core types of the resource graph:
//! - `ResourceGraph`: the graph structure
//! - `GraphNode`: one normalized Terraform resource
//! - `Reference`: one attribute value pointing at another resource
//! - `DependencyEdge`: the "depends on" relationship between two nodes

use crate::error::Result;
use crate::registry::{AttributePath, ReferenceStrength};
use crate::types::{NodeId, NormalizedAttributes};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// How a node entered the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeOrigin {
    /// Listed by discovery and accepted by the filter
    Discovered,
    /// Fetched only because another node references it
    DependencyOnly,
}

/// Resolution state of a reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReferenceStatus {
    /// Not linked yet
    Pending,
    /// Target present; the reference orders emission
    Resolved,
    /// Target present, but the edge was dropped to break a cycle
    Demoted,
    /// Target absent; the literal value is kept
    Unresolved {
        /// Why the target could not be added
        reason: String,
    },
}

/// An attribute value of a node that points at another resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    /// Concrete location of the value inside the node's attributes
    pub path: AttributePath,
    /// Target resource
    pub target: NodeId,
    /// Exported attribute of the target used for interpolation
    pub target_attribute: String,
    /// Ordering strength
    pub strength: ReferenceStrength,
    /// Resolution state
    #[serde(flatten)]
    pub status: ReferenceStatus,
}

/// A normalized resource.
#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    /// Unique identifier
    pub id: NodeId,
    /// Terraform resource type
    pub terraform_type: String,
    /// Provider local name
    pub provider: String,
    /// Category from the registry
    pub category: String,
    /// HCL block label, unique within the type
    pub local_name: String,
    /// Terraform attributes
    pub attributes: NormalizedAttributes,
    /// Outgoing references, ordered by path
    pub references: Vec<Reference>,
    /// How the node entered the graph
    pub origin: NodeOrigin,
}

impl GraphNode {
    /// Terraform address (`type.local_name`).
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}.{}", self.terraform_type, self.local_name)
    }

    /// Whether the node was pulled in only to satisfy a reference.
    #[must_use]
    pub fn is_dependency_only(&self) -> bool {
        self.origin == NodeOrigin::DependencyOnly
    }
}

/// A "depends on" edge (`source → target`).
///
/// One edge exists per ordered pair of nodes, however many references the
/// source holds to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DependencyEdge {
    /// Strongest reference between the pair
    pub strength: ReferenceStrength,
    /// Excluded from ordering to break a cycle
    pub demoted: bool,
}

/// The resource graph.
///
/// # Structure
///
/// ```text
/// ResourceGraph
/// ├── inner: DiGraph<GraphNode, DependencyEdge>  // The actual graph
/// ├── node_index: BTreeMap<NodeId, NodeIndex>    // Ordered lookup by ID
/// └── local_names: HashMap<type, {names}>       // Names taken per type
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    inner: DiGraph<GraphNode, DependencyEdge>,
    node_index: BTreeMap<NodeId, NodeIndex>,
    local_names: HashMap<String, BTreeSet<String>>,
}

impl ResourceGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Returns false (and drops the node) if its ID or its
    /// local name is already taken.
    pub fn add_node(&mut self, node: GraphNode) -> bool {
        if self.node_index.contains_key(&node.id) || self.has_local_name(&node.terraform_type, &node.local_name) {
            return false;
        }
        self.local_names
            .entry(node.terraform_type.clone())
            .or_default()
            .insert(node.local_name.clone());
        let id = node.id.clone();
        let idx = self.inner.add_node(node);
        self.node_index.insert(id, idx);
        true
    }

    /// Whether a local name is used by a node of the given type.
    #[must_use]
    pub fn has_local_name(&self, terraform_type: &str, local_name: &str) -> bool {
        self.local_names
            .get(terraform_type)
            .is_some_and(|names| names.contains(local_name))
    }

    /// Whether the node exists.
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.node_index.contains_key(id)
    }

    /// Get a node by its ID.
    #[must_use]
    pub fn get_node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.node_index.get(id).map(|&idx| &self.inner[idx])
    }

    /// Get the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Get the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Iterate over nodes in `NodeId` order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.node_index.values().map(|&idx| &self.inner[idx])
    }

    /// Iterate over edges, ordered by `(source, target)`.
    pub fn edges(&self) -> impl Iterator<Item = (&GraphNode, &GraphNode, &DependencyEdge)> {
        let mut edges: Vec<_> = self
            .inner
            .edge_references()
            .map(|edge| (&self.inner[edge.source()], &self.inner[edge.target()], edge.weight()))
            .collect();
        edges.sort_by(|a, b| a.0.id.cmp(&b.0.id).then_with(|| a.1.id.cmp(&b.1.id)));
        edges.into_iter()
    }

    /// Nodes the given node depends on (non-demoted edges only).
    #[must_use]
    pub fn dependencies(&self, id: &NodeId) -> Vec<&GraphNode> {
        let Some(&idx) = self.node_index.get(id) else {
            return Vec::new();
        };
        let mut deps: Vec<&GraphNode> = self
            .inner
            .edges_directed(idx, Direction::Outgoing)
            .filter(|edge| !edge.weight().demoted)
            .map(|edge| &self.inner[edge.target()])
            .collect();
        deps.sort_by(|a, b| a.id.cmp(&b.id));
        deps
    }

    /// Get the underlying petgraph for advanced operations.
    #[must_use]
    pub fn inner(&self) -> &DiGraph<GraphNode, DependencyEdge> {
        &self.inner
    }

    /// Link every pending reference whose target is present, adding the
    /// corresponding edge. Returns the targets that are still missing.
    pub fn link(&mut self) -> BTreeSet<NodeId> {
        let mut missing = BTreeSet::new();
        let mut new_edges: Vec<(NodeIndex, NodeIndex, ReferenceStrength)> = Vec::new();

        let indices: Vec<NodeIndex> = self.node_index.values().copied().collect();
        for source in indices {
            let targets: Vec<(usize, Option<NodeIndex>)> = self.inner[source]
                .references
                .iter()
                .enumerate()
                .filter(|(_, r)| r.status == ReferenceStatus::Pending)
                .map(|(i, r)| (i, self.node_index.get(&r.target).copied()))
                .collect();

            for (i, target) in targets {
                let reference = &mut self.inner[source].references[i];
                match target {
                    Some(target) => {
                        reference.status = ReferenceStatus::Resolved;
                        new_edges.push((source, target, reference.strength));
                    }
                    None => {
                        missing.insert(reference.target.clone());
                    }
                }
            }
        }

        for (source, target, strength) in new_edges {
            match self.inner.find_edge(source, target) {
                Some(edge) => {
                    let weight = &mut self.inner[edge];
                    weight.strength = weight.strength.max(strength);
                }
                None => {
                    self.inner.add_edge(source, target, DependencyEdge { strength, demoted: false });
                }
            }
        }

        missing
    }

    /// Mark every pending reference to `target` as unresolved. Returns the
    /// referencing nodes, sorted.
    pub fn mark_unresolved(&mut self, target: &NodeId, reason: &str) -> Vec<NodeId> {
        let mut sources = BTreeSet::new();
        for node in self.inner.node_weights_mut() {
            for reference in &mut node.references {
                if reference.status == ReferenceStatus::Pending && &reference.target == target {
                    reference.status = ReferenceStatus::Unresolved {
                        reason: reason.to_string(),
                    };
                    sources.insert(node.id.clone());
                }
            }
        }
        sources.into_iter().collect()
    }

    /// Number of unresolved references.
    #[must_use]
    pub fn unresolved_count(&self) -> usize {
        self.inner
            .node_weights()
            .flat_map(|n| &n.references)
            .filter(|r| matches!(r.status, ReferenceStatus::Unresolved { .. }))
            .count()
    }

    /// Number of demoted edges.
    #[must_use]
    pub fn demoted_count(&self) -> usize {
        self.inner.edge_weights().filter(|e| e.demoted).count()
    }

    /// Demote edges until the ordering edges form a DAG.
    ///
    /// Each cyclic strongly-connected component (more than one node, or a
    /// self-loop) loses one edge per pass: soft before hard, then the
    /// smallest `(source, target)`. Returns the demoted pairs in order.
    pub fn break_cycles(&mut self) -> Vec<(NodeId, NodeId)> {
        let mut demoted = Vec::new();

        loop {
            let ordering = self.inner.filter_map(
                |idx, _| Some(idx),
                |_, edge| (!edge.demoted).then_some(()),
            );

            let mut victims: Vec<(EdgeIndex, NodeIndex, NodeIndex)> = Vec::new();
            for component in tarjan_scc(&ordering) {
                let members: BTreeSet<NodeIndex> =
                    component.iter().map(|&i| ordering[i]).collect();
                let cyclic = members.len() > 1
                    || component
                        .first()
                        .is_some_and(|&i| ordering.contains_edge(i, i));
                if !cyclic {
                    continue;
                }

                let victim = self
                    .inner
                    .edge_references()
                    .filter(|edge| {
                        !edge.weight().demoted
                            && members.contains(&edge.source())
                            && members.contains(&edge.target())
                    })
                    .min_by(|a, b| {
                        a.weight()
                            .strength
                            .cmp(&b.weight().strength)
                            .then_with(|| self.inner[a.source()].id.cmp(&self.inner[b.source()].id))
                            .then_with(|| self.inner[a.target()].id.cmp(&self.inner[b.target()].id))
                    })
                    .map(|edge| (edge.id(), edge.source(), edge.target()));
                victims.extend(victim);
            }

            if victims.is_empty() {
                break;
            }

            for (edge, source, target) in victims {
                demoted.push(self.demote(edge, source, target));
            }
        }

        if !demoted.is_empty() {
            tracing::debug!(demoted = demoted.len(), "Reference cycles broken");
        }
        demoted
    }

    fn demote(&mut self, edge: EdgeIndex, source: NodeIndex, target: NodeIndex) -> (NodeId, NodeId) {
        self.inner[edge].demoted = true;
        let target_id = self.inner[target].id.clone();
        for reference in &mut self.inner[source].references {
            if reference.target == target_id && reference.status == ReferenceStatus::Resolved {
                reference.status = ReferenceStatus::Demoted;
            }
        }
        let source_id = self.inner[source].id.clone();
        tracing::debug!(source = %source_id, target = %target_id, "Demoted edge");
        (source_id, target_id)
    }

    /// Emission order: dependencies first over non-demoted edges, ties broken
    /// by `(terraform_type, local_name)`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::TerracartoError::CircularDependency`] if the
    /// ordering edges still contain a cycle.
    pub fn emission_order(&self) -> Result<Vec<&GraphNode>> {
        let mut remaining: HashMap<NodeIndex, usize> = HashMap::new();
        let mut ready: BTreeSet<(&str, &str, NodeIndex)> = BTreeSet::new();

        for idx in self.inner.node_indices() {
            let deps = self
                .inner
                .edges_directed(idx, Direction::Outgoing)
                .filter(|edge| !edge.weight().demoted)
                .count();
            if deps == 0 {
                let node = &self.inner[idx];
                ready.insert((node.terraform_type.as_str(), node.local_name.as_str(), idx));
            } else {
                remaining.insert(idx, deps);
            }
        }

        let mut order = Vec::with_capacity(self.inner.node_count());
        while let Some(first) = ready.pop_first() {
            let (_, _, idx) = first;
            order.push(&self.inner[idx]);

            for edge in self.inner.edges_directed(idx, Direction::Incoming) {
                if edge.weight().demoted {
                    continue;
                }
                let dependent = edge.source();
                if let Some(count) = remaining.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 {
                        remaining.remove(&dependent);
                        let node = &self.inner[dependent];
                        ready.insert((node.terraform_type.as_str(), node.local_name.as_str(), dependent));
                    }
                }
            }
        }

        if order.len() != self.inner.node_count() {
            let mut stuck: Vec<String> = remaining
                .keys()
                .map(|&idx| self.inner[idx].id.to_string())
                .collect();
            stuck.sort();
            return Err(crate::err!(CircularDependency {
                cycle: stuck.join(", "),
            }));
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(resource_type: &str, id: &str, refs: &[(&str, &str, &str, ReferenceStrength)]) -> GraphNode {
        GraphNode {
            id: NodeId::new(resource_type, id),
            terraform_type: resource_type.to_string(),
            provider: "aws".to_string(),
            category: "network".to_string(),
            local_name: id.replace('-', "_"),
            attributes: [("id".to_string(), json!(id))].into_iter().collect(),
            references: refs
                .iter()
                .map(|(path, target_type, target_id, strength)| Reference {
                    path: AttributePath::attribute(path),
                    target: NodeId::new(*target_type, *target_id),
                    target_attribute: "id".to_string(),
                    strength: *strength,
                    status: ReferenceStatus::Pending,
                })
                .collect(),
            origin: NodeOrigin::Discovered,
        }
    }

    fn order(graph: &ResourceGraph) -> Vec<String> {
        graph
            .emission_order()
            .unwrap()
            .iter()
            .map(|n| n.id.to_string())
            .collect()
    }

    #[test]
    fn test_link_and_missing() {
        let mut graph = ResourceGraph::new();
        graph.add_node(node("aws_subnet", "subnet-1", &[("vpc_id", "aws_vpc", "vpc-1", ReferenceStrength::Hard)]));
        assert_eq!(
            graph.link().into_iter().collect::<Vec<_>>(),
            vec![NodeId::new("aws_vpc", "vpc-1")]
        );
        assert_eq!(graph.edge_count(), 0);

        graph.add_node(node("aws_vpc", "vpc-1", &[]));
        assert!(graph.link().is_empty());
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(order(&graph), vec!["aws_vpc:vpc-1", "aws_subnet:subnet-1"]);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut graph = ResourceGraph::new();
        assert!(graph.add_node(node("aws_vpc", "vpc-1", &[])));
        assert!(!graph.add_node(node("aws_vpc", "vpc-1", &[])));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_mark_unresolved() {
        let mut graph = ResourceGraph::new();
        graph.add_node(node("aws_subnet", "subnet-1", &[("vpc_id", "aws_vpc", "vpc-1", ReferenceStrength::Hard)]));
        graph.link();
        let sources = graph.mark_unresolved(&NodeId::new("aws_vpc", "vpc-1"), "access denied");
        assert_eq!(sources, vec![NodeId::new("aws_subnet", "subnet-1")]);
        assert_eq!(graph.unresolved_count(), 1);
        assert!(graph.link().is_empty());
    }

    #[test]
    fn test_break_cycle_prefers_soft() {
        let mut graph = ResourceGraph::new();
        graph.add_node(node("aws_security_group", "sg-a", &[("ingress", "aws_security_group", "sg-b", ReferenceStrength::Hard)]));
        graph.add_node(node("aws_security_group", "sg-b", &[("ingress", "aws_security_group", "sg-a", ReferenceStrength::Soft)]));
        graph.link();

        let demoted = graph.break_cycles();
        assert_eq!(
            demoted,
            vec![(NodeId::new("aws_security_group", "sg-b"), NodeId::new("aws_security_group", "sg-a"))]
        );
        assert_eq!(order(&graph), vec!["aws_security_group:sg-b", "aws_security_group:sg-a"]);

        let sg_b = graph.get_node(&NodeId::new("aws_security_group", "sg-b")).unwrap();
        assert_eq!(sg_b.references[0].status, ReferenceStatus::Demoted);
    }

    #[test]
    fn test_break_cycle_lexicographic_tie_and_self_loop() {
        let mut graph = ResourceGraph::new();
        graph.add_node(node("aws_security_group", "sg-a", &[("ingress", "aws_security_group", "sg-b", ReferenceStrength::Soft)]));
        graph.add_node(node("aws_security_group", "sg-b", &[("ingress", "aws_security_group", "sg-a", ReferenceStrength::Soft)]));
        graph.add_node(node("aws_security_group", "sg-c", &[("ingress", "aws_security_group", "sg-c", ReferenceStrength::Soft)]));
        graph.link();

        let demoted = graph.break_cycles();
        assert_eq!(demoted.len(), 2);
        assert!(demoted.contains(&(NodeId::new("aws_security_group", "sg-a"), NodeId::new("aws_security_group", "sg-b"))));
        assert!(demoted.contains(&(NodeId::new("aws_security_group", "sg-c"), NodeId::new("aws_security_group", "sg-c"))));
        assert_eq!(graph.demoted_count(), 2);
        assert_eq!(order(&graph).len(), 3);
    }

    #[test]
    fn test_break_three_node_hard_cycle() {
        let hard = ReferenceStrength::Hard;
        let mut graph = ResourceGraph::new();
        graph.add_node(node("aws_subnet", "s-1", &[("vpc_id", "aws_vpc", "v-1", hard)]));
        graph.add_node(node("aws_vpc", "v-1", &[("main_route_table_id", "aws_route_table", "r-1", hard)]));
        graph.add_node(node("aws_route_table", "r-1", &[("subnet_id", "aws_subnet", "s-1", hard)]));
        graph.link();

        // All edges equally expensive: the lowest source ID loses its edge.
        let demoted = graph.break_cycles();
        assert_eq!(
            demoted,
            vec![(NodeId::new("aws_route_table", "r-1"), NodeId::new("aws_subnet", "s-1"))]
        );
        assert_eq!(graph.demoted_count(), 1);
        assert_eq!(order(&graph), vec!["aws_route_table:r-1", "aws_vpc:v-1", "aws_subnet:s-1"]);

        let route_table = graph.get_node(&NodeId::new("aws_route_table", "r-1")).unwrap();
        assert_eq!(route_table.references[0].status, ReferenceStatus::Demoted);
        let subnet = graph.get_node(&NodeId::new("aws_subnet", "s-1")).unwrap();
        assert_eq!(subnet.references[0].status, ReferenceStatus::Resolved);
    }

    #[test]
    fn test_break_three_node_cycle_soft_edge_wins() {
        let mut graph = ResourceGraph::new();
        graph.add_node(node("aws_subnet", "s-1", &[("vpc_id", "aws_vpc", "v-1", ReferenceStrength::Soft)]));
        graph.add_node(node("aws_vpc", "v-1", &[("main_route_table_id", "aws_route_table", "r-1", ReferenceStrength::Hard)]));
        graph.add_node(node("aws_route_table", "r-1", &[("subnet_id", "aws_subnet", "s-1", ReferenceStrength::Hard)]));
        graph.link();

        assert_eq!(
            graph.break_cycles(),
            vec![(NodeId::new("aws_subnet", "s-1"), NodeId::new("aws_vpc", "v-1"))]
        );
        assert_eq!(order(&graph), vec!["aws_subnet:s-1", "aws_route_table:r-1", "aws_vpc:v-1"]);
    }

    #[test]
    fn test_emission_order_ties() {
        let mut graph = ResourceGraph::new();
        graph.add_node(node("aws_vpc", "vpc-2", &[]));
        graph.add_node(node("aws_s3_bucket", "logs", &[]));
        graph.add_node(node("aws_vpc", "vpc-1", &[]));
        graph.link();
        assert_eq!(order(&graph), vec!["aws_s3_bucket:logs", "aws_vpc:vpc-1", "aws_vpc:vpc-2"]);
    }
}
