//! Deduplication and closure resolution.
//!
//! After the builder runs, references may point at resources that were never
//! discovered (filtered out, in another type, hidden from listing). The
//! resolver closes the graph round by round:
//!
//! 1. link references whose targets are present;
//! 2. for each missing target, in `NodeId` order, take the raw resource from
//!    the pool of already-listed-but-filtered-out resources, or fetch it with
//!    `get` (concurrently, on the shared limiter);
//! 3. insert what was found as dependency-only nodes, whose own references
//!    are closed in the next round.
//!
//! Targets that cannot be added keep their literal value and are marked
//! unresolved. Finally, reference cycles are broken so the ordering edges
//! form a DAG.

use crate::error::{Result, TerracartoError};
use crate::graph::builder::{GraphBuilder, SkippedResource};
use crate::graph::types::{NodeOrigin, ResourceGraph};
use crate::provider::{self, ProviderAdapter};
use crate::registry::Registry;
use crate::types::{NodeId, RawResource};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// A reference target that could not be added to the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedTarget {
    /// The missing resource
    pub target: NodeId,
    /// Why it is missing
    pub reason: String,
    /// Nodes holding a reference to it
    pub referenced_by: Vec<NodeId>,
}

/// Outcome of a resolution pass.
#[derive(Debug, Default)]
pub struct ResolveSummary {
    /// Dependency-only nodes added
    pub fetched: usize,
    /// Of which taken from the filtered-out pool
    pub from_pool: usize,
    /// Targets left unresolved, in `NodeId` order per round
    pub unresolved: Vec<UnresolvedTarget>,
    /// Edges demoted to break cycles
    pub demoted: Vec<(NodeId, NodeId)>,
    /// Fetched resources that failed to normalize
    pub skipped: Vec<SkippedResource>,
    /// Rounds performed
    pub rounds: usize,
    /// Whether cancellation interrupted resolution
    pub cancelled: bool,
}

/// Closes a resource graph over its references.
pub struct ClosureResolver {
    registry: Arc<Registry>,
    adapter: Arc<dyn ProviderAdapter>,
    limiter: Arc<Semaphore>,
    cancel: CancellationToken,
    pool: HashMap<NodeId, RawResource>,
    follow_references: bool,
    max_depth: usize,
}

impl ClosureResolver {
    /// Create a resolver fetching through `adapter`.
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        adapter: Arc<dyn ProviderAdapter>,
        limiter: Arc<Semaphore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            adapter,
            limiter,
            cancel,
            pool: HashMap::new(),
            follow_references: true,
            max_depth: 10,
        }
    }

    /// Raw resources already listed but rejected by the filter. They are
    /// used before asking the adapter.
    #[must_use]
    pub fn with_pool(mut self, pool: impl IntoIterator<Item = RawResource>) -> Self {
        for resource in pool {
            self.pool.entry(resource.node_id()).or_insert(resource);
        }
        self
    }

    /// When false, missing targets are marked unresolved without fetching.
    #[must_use]
    pub fn follow_references(mut self, follow: bool) -> Self {
        self.follow_references = follow;
        self
    }

    /// Maximum number of fetch rounds.
    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Close the graph and break its cycles.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error when a fetch fails fatally (for example
    /// expired credentials). Per-target failures are recorded instead.
    pub async fn resolve(&self, graph: &mut ResourceGraph) -> Result<ResolveSummary> {
        let builder = GraphBuilder::new(&self.registry);
        let mut summary = ResolveSummary::default();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut skip_reasons: HashMap<NodeId, String> = HashMap::new();

        loop {
            let missing = graph.link();
            if missing.is_empty() {
                break;
            }

            let stop_reason = if self.cancel.is_cancelled() {
                summary.cancelled = true;
                Some("cancelled".to_string())
            } else if !self.follow_references {
                Some("reference following disabled".to_string())
            } else if summary.rounds >= self.max_depth {
                Some(format!("dependency depth limit ({}) reached", self.max_depth))
            } else {
                None
            };
            if let Some(reason) = stop_reason {
                for target in missing {
                    Self::unresolve(graph, &mut summary, target, &reason);
                }
                break;
            }

            summary.rounds += 1;
            tracing::debug!(round = summary.rounds, missing = missing.len(), "Closing references");

            let mut found: Vec<RawResource> = Vec::new();
            let mut to_fetch: Vec<NodeId> = Vec::new();
            for target in missing {
                if !visited.insert(target.clone()) {
                    let reason = skip_reasons
                        .get(&target)
                        .cloned()
                        .unwrap_or_else(|| "provider returned a different resource".to_string());
                    Self::unresolve(graph, &mut summary, target, &reason);
                } else if !self.registry.contains(&target.resource_type) {
                    let reason = format!("unknown resource type {}", target.resource_type);
                    Self::unresolve(graph, &mut summary, target, &reason);
                } else if let Some(resource) = self.pool.get(&target) {
                    tracing::debug!(target = %target, "Dependency found among filtered-out resources");
                    summary.from_pool += 1;
                    found.push(resource.clone());
                } else {
                    to_fetch.push(target);
                }
            }

            let fetches = to_fetch.iter().map(|target| self.fetch(target));
            let results = futures::future::join_all(fetches).await;

            for (target, result) in to_fetch.into_iter().zip(results) {
                match result {
                    Ok(resource) => found.push(resource),
                    Err(TerracartoError::Cancelled { .. }) => {
                        summary.cancelled = true;
                        Self::unresolve(graph, &mut summary, target, "cancelled");
                    }
                    Err(error) if provider::aborts_run(&error) => return Err(error),
                    Err(error) => {
                        tracing::warn!(target = %target, error = %error.summary(), "Dependency fetch failed");
                        let reason = error.summary();
                        Self::unresolve(graph, &mut summary, target, &reason);
                    }
                }
            }

            let before = graph.node_count();
            let skipped = builder.insert(graph, found, NodeOrigin::DependencyOnly);
            summary.fetched += graph.node_count() - before;
            for entry in &skipped {
                skip_reasons.insert(entry.id.clone(), entry.error.summary());
            }
            summary.skipped.extend(skipped);
        }

        summary.demoted = graph.break_cycles();

        tracing::debug!(
            fetched = summary.fetched,
            from_pool = summary.from_pool,
            unresolved = summary.unresolved.len(),
            demoted = summary.demoted.len(),
            rounds = summary.rounds,
            "Closure resolution complete"
        );
        Ok(summary)
    }

    fn unresolve(graph: &mut ResourceGraph, summary: &mut ResolveSummary, target: NodeId, reason: &str) {
        let referenced_by = graph.mark_unresolved(&target, reason);
        if referenced_by.is_empty() {
            return;
        }
        summary.unresolved.push(UnresolvedTarget {
            target,
            reason: reason.to_string(),
            referenced_by,
        });
    }

    async fn fetch(&self, target: &NodeId) -> Result<RawResource> {
        let cancelled = || {
            crate::err!(Cancelled {
                stage: "closure".to_string(),
            })
        };

        let _permit = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(cancelled()),
            permit = self.limiter.acquire() => permit.map_err(|e| {
                TerracartoError::internal(format!("limiter closed: {e}"), file!(), line!())
            })?,
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(cancelled()),
            result = self.adapter.get(&target.resource_type, &target.provider_id) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::ReferenceStatus;
    use crate::provider::{AccountSnapshot, SnapshotProvider};
    use serde_json::json;

    fn resolver(snapshot: serde_json::Value) -> (ClosureResolver, Arc<SnapshotProvider>) {
        let registry = Arc::new(Registry::builtin());
        let snapshot: AccountSnapshot = serde_json::from_value(snapshot).unwrap();
        let adapter = Arc::new(SnapshotProvider::new(snapshot, Arc::clone(&registry)).unwrap());
        let resolver = ClosureResolver::new(
            registry,
            adapter.clone(),
            Arc::new(Semaphore::new(4)),
            CancellationToken::new(),
        );
        (resolver, adapter)
    }

    fn subnet_graph(registry: &Registry) -> ResourceGraph {
        GraphBuilder::new(registry)
            .build(vec![RawResource::new(
                "aws_subnet",
                "subnet-1",
                json!({"SubnetId": "subnet-1", "VpcId": "vpc-1"}),
            )])
            .graph
    }

    #[tokio::test]
    async fn test_fetches_missing_dependency() {
        let (resolver, adapter) = resolver(json!({
            "provider": "aws",
            "hidden": [{"type": "aws_vpc", "id": "vpc-1", "attributes": {"VpcId": "vpc-1"}}]
        }));
        let mut graph = subnet_graph(&Registry::builtin());

        let summary = resolver.resolve(&mut graph).await.unwrap();
        assert_eq!(summary.fetched, 1);
        assert!(summary.unresolved.is_empty());
        assert_eq!(adapter.get_calls(), 1);

        let vpc = graph.get_node(&NodeId::new("aws_vpc", "vpc-1")).unwrap();
        assert!(vpc.is_dependency_only());
        assert_eq!(graph.edge_count(), 1);
    }

    #[tokio::test]
    async fn test_pool_used_before_fetch() {
        let (resolver, adapter) = resolver(json!({"provider": "aws"}));
        let resolver = resolver.with_pool(vec![RawResource::new(
            "aws_vpc",
            "vpc-1",
            json!({"VpcId": "vpc-1"}),
        )]);
        let mut graph = subnet_graph(&Registry::builtin());

        let summary = resolver.resolve(&mut graph).await.unwrap();
        assert_eq!(summary.from_pool, 1);
        assert_eq!(adapter.get_calls(), 0);
        assert!(graph.contains(&NodeId::new("aws_vpc", "vpc-1")));
    }

    #[tokio::test]
    async fn test_denied_target_unresolved() {
        let (resolver, _) = resolver(json!({"provider": "aws", "denied": ["aws_vpc.vpc-1"]}));
        let mut graph = subnet_graph(&Registry::builtin());

        let summary = resolver.resolve(&mut graph).await.unwrap();
        assert_eq!(summary.unresolved.len(), 1);
        assert_eq!(summary.unresolved[0].reason, "access denied");
        assert_eq!(summary.unresolved[0].referenced_by, vec![NodeId::new("aws_subnet", "subnet-1")]);

        let subnet = graph.get_node(&NodeId::new("aws_subnet", "subnet-1")).unwrap();
        assert!(matches!(subnet.references[0].status, ReferenceStatus::Unresolved { .. }));
    }

    #[tokio::test]
    async fn test_follow_disabled_and_depth_limit() {
        let (resolver, adapter) = resolver(json!({
            "provider": "aws",
            "hidden": [{"type": "aws_vpc", "id": "vpc-1", "attributes": {"VpcId": "vpc-1"}}]
        }));
        let resolver = resolver.follow_references(false);
        let mut graph = subnet_graph(&Registry::builtin());
        let summary = resolver.resolve(&mut graph).await.unwrap();
        assert_eq!(summary.unresolved[0].reason, "reference following disabled");
        assert_eq!(adapter.get_calls(), 0);

        let (resolver, _) = resolver_chain();
        let mut graph = GraphBuilder::new(&Registry::builtin())
            .build(vec![RawResource::new(
                "aws_eip",
                "eipalloc-1",
                json!({"AllocationId": "eipalloc-1", "InstanceId": "i-1"}),
            )])
            .graph;
        let summary = resolver.max_depth(1).resolve(&mut graph).await.unwrap();
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.unresolved.len(), 1);
        assert_eq!(summary.unresolved[0].target, NodeId::new("aws_subnet", "subnet-1"));
        assert!(summary.unresolved[0].reason.contains("depth limit"));
    }

    fn resolver_chain() -> (ClosureResolver, Arc<SnapshotProvider>) {
        resolver(json!({
            "provider": "aws",
            "hidden": [
                {"type": "aws_instance", "id": "i-1", "attributes": {"InstanceId": "i-1", "SubnetId": "subnet-1"}},
                {"type": "aws_subnet", "id": "subnet-1", "attributes": {"SubnetId": "subnet-1"}}
            ]
        }))
    }

    #[tokio::test]
    async fn test_cancelled_marks_unresolved() {
        let (resolver, adapter) = resolver(json!({"provider": "aws"}));
        resolver.cancel.cancel();
        let mut graph = subnet_graph(&Registry::builtin());
        let summary = resolver.resolve(&mut graph).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(adapter.get_calls(), 0);
        assert_eq!(graph.unresolved_count(), 1);
    }
}
