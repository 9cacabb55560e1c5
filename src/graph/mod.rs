//! Resource Graph Module
//!
//! This module turns independently discovered cloud resources into a
//! directed "depends on" graph that can be serialized in dependency order.
//!
//! # Architecture Overview
//!
//! The graph uses the `petgraph` library as its foundation. Nodes are
//! normalized Terraform resources; an edge `A → B` means A holds at least
//! one reference to B and must be emitted after it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        RESOURCE GRAPH                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  hard   ┌──────────────┐  hard   ┌─────────┐ │
//! │  │ aws_instance │────────▶│  aws_subnet  │────────▶│ aws_vpc │ │
//! │  │   "i_0abc"   │         │ "subnet_01"  │         │ "vpc_1" │ │
//! │  └──────────────┘         └──────────────┘         └─────────┘ │
//! │         │ hard                                                  │
//! │         ▼                                                       │
//! │  ┌──────────────┐  soft   ┌──────────────┐                      │
//! │  │ aws_security │────────▶│ aws_security │                      │
//! │  │ _group "a"   │◀ ─ ─ ─ ─│ _group "b"   │  (demoted)           │
//! │  └──────────────┘         └──────────────┘                      │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Reference Lifecycle
//!
//! Every reference starts `Pending`. Linking turns it `Resolved` when the
//! target exists. The closure resolver fetches missing targets and marks
//! the ones it cannot fetch `Unresolved` with a reason. Finally cycle
//! breaking turns the references behind one edge of each cycle `Demoted`.
//!
//! # Data Flow
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Provider   │────▶│   Filter    │────▶│ GraphBuilder│
//! │  Adapter    │     │             │     │             │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                                       │
//!        │ get()                                 ▼
//!        │                                ┌─────────────┐
//!        └────────────────────────────────│  Closure    │
//!                                         │  Resolver   │
//!                                         └─────────────┘
//!                                                │
//!                           ┌────────────────────┴────────────────────┐
//!                           ▼                                         ▼
//!                    ┌─────────────┐                           ┌─────────────┐
//!                    │   Writer    │                           │  Exporter   │
//!                    │ (HCL/state) │                           │(DOT/JSON/..)│
//!                    └─────────────┘                           └─────────────┘
//! ```
//!
//! # Example: Complete Workflow
//!
//! ```rust
//! use terracarto::graph::{export_graph, GraphBuilder};
//! use terracarto::registry::Registry;
//! use terracarto::types::{GraphFormat, RawResource};
//! use serde_json::json;
//!
//! let registry = Registry::builtin();
//! let mut graph = GraphBuilder::new(&registry)
//!     .build(vec![
//!         RawResource::new("aws_vpc", "vpc-1", json!({"VpcId": "vpc-1"})),
//!         RawResource::new("aws_subnet", "subnet-1", json!({"SubnetId": "subnet-1", "VpcId": "vpc-1"})),
//!     ])
//!     .graph;
//!
//! assert!(graph.link().is_empty());
//! let order: Vec<String> = graph.emission_order().unwrap().iter().map(|n| n.address()).collect();
//! assert_eq!(order, vec!["aws_vpc.vpc_1", "aws_subnet.subnet_1"]);
//!
//! let dot = export_graph(&graph, GraphFormat::Dot).unwrap();
//! assert!(dot.contains("aws_subnet.subnet_1"));
//! ```

mod builder;
mod export;
pub mod naming;
mod resolver;
mod types;

pub use builder::{BuildOutput, GraphBuilder, SkippedResource};
pub use export::export_graph;
pub use resolver::{ClosureResolver, ResolveSummary, UnresolvedTarget};
pub use types::{DependencyEdge, GraphNode, NodeOrigin, Reference, ReferenceStatus, ResourceGraph};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::types::{GraphFormat, NodeId, RawResource};
    use serde_json::json;

    fn network() -> Vec<RawResource> {
        vec![
            RawResource::new(
                "aws_instance",
                "i-1",
                json!({"InstanceId": "i-1", "SubnetId": "subnet-1", "InstanceType": "t3.micro"}),
            ),
            RawResource::new("aws_subnet", "subnet-1", json!({"SubnetId": "subnet-1", "VpcId": "vpc-1"})),
            RawResource::new("aws_vpc", "vpc-1", json!({"VpcId": "vpc-1", "CidrBlock": "10.0.0.0/16"})),
        ]
    }

    #[test]
    fn test_build_link_and_order() {
        let registry = Registry::builtin();
        let mut graph = GraphBuilder::new(&registry).build(network()).graph;

        assert!(graph.link().is_empty());
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);

        let order: Vec<String> = graph
            .emission_order()
            .unwrap()
            .iter()
            .map(|n| n.address())
            .collect();
        assert_eq!(
            order,
            vec!["aws_vpc.vpc_1", "aws_subnet.subnet_1", "aws_instance.i_1"]
        );
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let registry = Registry::builtin();
        let mut forward = GraphBuilder::new(&registry).build(network()).graph;
        let mut reversed_input = network();
        reversed_input.reverse();
        let mut backward = GraphBuilder::new(&registry).build(reversed_input).graph;
        forward.link();
        backward.link();

        assert_eq!(
            export_graph(&forward, GraphFormat::Json).unwrap(),
            export_graph(&backward, GraphFormat::Json).unwrap()
        );
    }

    #[test]
    fn test_missing_target_reported_by_link() {
        let registry = Registry::builtin();
        let mut graph = GraphBuilder::new(&registry)
            .build(network().into_iter().filter(|r| r.resource_type != "aws_vpc").collect())
            .graph;

        let missing = graph.link();
        assert_eq!(missing.into_iter().collect::<Vec<_>>(), vec![NodeId::new("aws_vpc", "vpc-1")]);
    }
}
