//! Graph builder implementation.
//!
//! This module provides the `GraphBuilder` which turns raw provider
//! resources into normalized graph nodes with candidate references.

use crate::error::TerracartoError;
use crate::graph::naming;
use crate::graph::types::{GraphNode, NodeOrigin, Reference, ReferenceStatus, ResourceGraph};
use crate::registry::Registry;
use crate::types::{NodeId, RawResource};

/// A raw resource the builder could not turn into a node.
#[derive(Debug)]
pub struct SkippedResource {
    /// The resource that was dropped
    pub id: NodeId,
    /// Why it was dropped
    pub error: TerracartoError,
}

/// Result of [`GraphBuilder::build`].
#[derive(Debug)]
pub struct BuildOutput {
    /// The graph with unlinked references
    pub graph: ResourceGraph,
    /// Resources dropped because of malformed data or unknown types
    pub skipped: Vec<SkippedResource>,
}

/// Builder for resource graphs.
///
/// # Algorithm
///
/// 1. **Ordering Phase**: sort raw resources by `(resource_type, provider_id)`
///    so names and insertion order never depend on discovery timing.
/// 2. **Normalization Phase**: look up each type's descriptor and apply its
///    field-mapping table. Failures skip the resource.
/// 3. **Reference Phase**: record every non-empty reference field value as a
///    pending reference. Targets need not exist yet.
/// 4. **Naming Phase**: derive a collision-free local name.
///
/// # Example
///
/// ```rust
/// use terracarto::graph::GraphBuilder;
/// use terracarto::registry::Registry;
/// use terracarto::types::RawResource;
/// use serde_json::json;
///
/// let registry = Registry::builtin();
/// let output = GraphBuilder::new(&registry).build(vec![
///     RawResource::new("aws_vpc", "vpc-1", json!({"VpcId": "vpc-1"})),
/// ]);
/// assert_eq!(output.graph.node_count(), 1);
/// assert!(output.skipped.is_empty());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct GraphBuilder<'a> {
    registry: &'a Registry,
}

impl<'a> GraphBuilder<'a> {
    /// Create a builder backed by a registry.
    #[must_use]
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Build a graph from discovered resources.
    #[must_use]
    pub fn build(&self, raw: Vec<RawResource>) -> BuildOutput {
        tracing::debug!(resources = raw.len(), "Starting graph construction");
        let mut graph = ResourceGraph::new();
        let skipped = self.insert(&mut graph, raw, NodeOrigin::Discovered);
        tracing::debug!(
            nodes = graph.node_count(),
            skipped = skipped.len(),
            "Graph construction complete"
        );
        BuildOutput { graph, skipped }
    }

    /// Add resources to an existing graph. Resources whose ID is already
    /// present are ignored (first wins).
    pub fn insert(
        &self,
        graph: &mut ResourceGraph,
        mut raw: Vec<RawResource>,
        origin: NodeOrigin,
    ) -> Vec<SkippedResource> {
        // Stable sort: among duplicates, input order decides.
        raw.sort_by(|a, b| {
            a.resource_type
                .cmp(&b.resource_type)
                .then_with(|| a.provider_id.cmp(&b.provider_id))
        });

        let mut skipped = Vec::new();
        let mut duplicates = 0_usize;
        for resource in raw {
            let id = resource.node_id();
            if graph.contains(&id) {
                duplicates += 1;
                continue;
            }
            match self.node_from(graph, resource, origin) {
                Ok(node) => {
                    tracing::trace!(id = %node.id, local_name = %node.local_name, "Added node");
                    graph.add_node(node);
                }
                Err(error) => {
                    tracing::warn!(id = %id, error = %error.summary(), "Skipping resource");
                    skipped.push(SkippedResource { id, error });
                }
            }
        }

        if duplicates > 0 {
            tracing::debug!(duplicates, "Dropped duplicate resources");
        }
        skipped
    }

    fn node_from(
        &self,
        graph: &ResourceGraph,
        resource: RawResource,
        origin: NodeOrigin,
    ) -> Result<GraphNode, TerracartoError> {
        let descriptor = self.registry.get(&resource.resource_type).ok_or_else(|| {
            crate::err!(UnknownResourceType {
                resource_type: resource.resource_type.clone(),
            })
        })?;

        let normalization_error = |message: String| {
            crate::err!(Normalization {
                resource_type: resource.resource_type.clone(),
                provider_id: resource.provider_id.clone(),
                message,
            })
        };

        let attributes = descriptor
            .normalize(&resource.attributes)
            .map_err(normalization_error)?;
        let references = descriptor
            .references(&attributes)
            .map_err(normalization_error)?
            .into_iter()
            .map(|found| Reference {
                path: found.path,
                target: found.target,
                target_attribute: found.target_attribute,
                strength: found.strength,
                status: ReferenceStatus::Pending,
            })
            .collect();

        let local_name = naming::unique(&naming::sanitize(&resource.provider_id), |candidate| {
            graph.has_local_name(&descriptor.name, candidate)
        });

        Ok(GraphNode {
            id: NodeId::new(&resource.resource_type, &resource.provider_id),
            terraform_type: descriptor.name.clone(),
            provider: descriptor.provider.clone(),
            category: descriptor.category.clone(),
            local_name,
            attributes,
            references,
            origin,
        })
    }
}
