//! HCL configuration output.

use super::RenderedFile;
use crate::config::HclOptions;
use crate::error::{Result, TerracartoError};
use crate::graph::{GraphNode, Reference, ReferenceStatus, ResourceGraph};
use crate::registry::AttributePath;
use crate::types::HclLayout;
use ::hcl::expr::{Traversal, TraversalOperator, Variable};
use ::hcl::{Attribute, Block, Expression, Identifier, Number, Object, ObjectKey};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Attributes Terraform computes; they never appear in configuration.
const COMPUTED_ATTRIBUTES: &[&str] = &["id", "arn"];

pub(super) fn render(
    graph: &ResourceGraph,
    order: &[&GraphNode],
    options: &HclOptions,
) -> Result<Vec<RenderedFile>> {
    let mut blocks: Vec<(&str, String)> = Vec::with_capacity(order.len());
    for node in order {
        blocks.push((node.category.as_str(), render_node(graph, node, options)?));
    }

    let providers: BTreeSet<&str> = order.iter().map(|n| n.provider.as_str()).collect();
    let preamble = if options.emit_provider_block && !providers.is_empty() {
        Some(render_providers(&providers)?)
    } else {
        None
    };

    match options.layout {
        HclLayout::Single => {
            let mut content = preamble.unwrap_or_default();
            for (_, block) in &blocks {
                append_block(&mut content, block);
            }
            Ok(vec![RenderedFile {
                name: "main.tf".to_string(),
                content,
            }])
        }
        HclLayout::ByCategory => {
            let mut files: BTreeMap<String, String> = BTreeMap::new();
            for (category, block) in &blocks {
                append_block(files.entry(format!("{category}.tf")).or_default(), block);
            }
            if let Some(preamble) = preamble {
                files.insert("providers.tf".to_string(), preamble);
            }
            Ok(files
                .into_iter()
                .map(|(name, content)| RenderedFile { name, content })
                .collect())
        }
    }
}

fn append_block(content: &mut String, block: &str) {
    if !content.is_empty() {
        content.push('\n');
    }
    content.push_str(block);
}

/// `terraform { required_providers { ... } }` followed by one empty
/// provider block per provider.
fn render_providers(providers: &BTreeSet<&str>) -> Result<String> {
    let mut required = Block::builder("required_providers");
    for provider in providers {
        let source: Object<ObjectKey, Expression> = [(
            ObjectKey::Identifier(Identifier::sanitized("source")),
            Expression::String(format!("hashicorp/{provider}")),
        )]
        .into_iter()
        .collect();
        required = required.add_attribute(Attribute::new(identifier(provider, "provider")?, source));
    }
    let mut body = ::hcl::Body::builder().add_block(Block::builder("terraform").add_block(required.build()).build());

    for provider in providers {
        let mut block = Block::builder("provider").add_label(*provider);
        if *provider == "azurerm" {
            block = block.add_block(Block::builder("features").build());
        }
        body = body.add_block(block.build());
    }

    ::hcl::format::to_string(&body.build()).map_err(|e| {
        crate::err!(Serialization {
            node: "terraform".to_string(),
            message: e.to_string(),
        })
    })
}

fn render_node(graph: &ResourceGraph, node: &GraphNode, options: &HclOptions) -> Result<String> {
    let address = node.address();
    let references: BTreeMap<&AttributePath, &Reference> =
        node.references.iter().map(|r| (&r.path, r)).collect();
    let renderer = ValueRenderer {
        graph,
        references: &references,
        options,
    };

    let mut block = Block::builder("resource")
        .add_label(node.terraform_type.as_str())
        .add_label(node.local_name.as_str());
    for (name, value) in &node.attributes {
        if COMPUTED_ATTRIBUTES.contains(&name.as_str()) {
            continue;
        }
        let expr = renderer
            .expression(value, &AttributePath::attribute(name))
            .map_err(|message| serialization_error(&address, message))?;
        let key = Identifier::new(name.as_str()).map_err(|e| serialization_error(&address, e.to_string()))?;
        block = block.add_attribute(Attribute::new(key, expr));
    }

    let text = ::hcl::format::to_string(&block.build())
        .map_err(|e| serialization_error(&address, e.to_string()))?;

    let mut out = String::new();
    for comment in comments(graph, node, options) {
        out.push_str(&comment);
        out.push('\n');
    }
    out.push_str(&text);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

fn serialization_error(address: &str, message: String) -> TerracartoError {
    crate::err!(Serialization {
        node: address.to_string(),
        message,
    })
}

fn comments(graph: &ResourceGraph, node: &GraphNode, options: &HclOptions) -> Vec<String> {
    let mut out = Vec::new();
    if node.is_dependency_only() {
        out.push(format!("# dependency-only: {} is referenced by imported resources", node.id));
    }
    for reference in &node.references {
        match &reference.status {
            ReferenceStatus::Unresolved { reason } => out.push(format!(
                "# unresolved reference: {} = \"{}\" ({}: {reason})",
                reference.path, reference.target.provider_id, reference.target.resource_type
            )),
            ReferenceStatus::Demoted if !interpolates(reference, options) => {
                let target = graph
                    .get_node(&reference.target)
                    .map_or_else(|| reference.target.to_string(), GraphNode::address);
                out.push(format!(
                    "# cycle broken: {} = \"{}\" refers to {target}",
                    reference.path, reference.target.provider_id
                ));
            }
            _ => {}
        }
    }
    out
}

/// Whether a reference is rendered as a traversal.
fn interpolates(reference: &Reference, options: &HclOptions) -> bool {
    if !options.interpolate {
        return false;
    }
    match reference.status {
        ReferenceStatus::Resolved => true,
        ReferenceStatus::Demoted => options.interpolate_demoted,
        ReferenceStatus::Pending | ReferenceStatus::Unresolved { .. } => false,
    }
}

struct ValueRenderer<'a> {
    graph: &'a ResourceGraph,
    references: &'a BTreeMap<&'a AttributePath, &'a Reference>,
    options: &'a HclOptions,
}

impl ValueRenderer<'_> {
    fn expression(&self, value: &Value, path: &AttributePath) -> std::result::Result<Expression, String> {
        if let Some(reference) = self.references.get(path) {
            if interpolates(reference, self.options) {
                return self.traversal(reference);
            }
        }

        Ok(match value {
            Value::Null => Expression::Null,
            Value::Bool(b) => Expression::Bool(*b),
            Value::Number(n) => Expression::Number(number(n)?),
            Value::String(s) => Expression::String(s.clone()),
            Value::Array(items) => Expression::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| self.expression(item, &path.child_index(index)))
                    .collect::<std::result::Result<_, _>>()?,
            ),
            Value::Object(map) => {
                let mut object = Object::new();
                for (key, item) in map {
                    let expr = self.expression(item, &path.child_key(key))?;
                    object.insert(object_key(key), expr);
                }
                Expression::Object(object)
            }
        })
    }

    fn traversal(&self, reference: &Reference) -> std::result::Result<Expression, String> {
        let target = self
            .graph
            .get_node(&reference.target)
            .ok_or_else(|| format!("reference target {} is not in the graph", reference.target))?;
        let root = Variable::new(target.terraform_type.as_str()).map_err(|e| e.to_string())?;
        let operators = [
            TraversalOperator::GetAttr(Identifier::new(target.local_name.as_str()).map_err(|e| e.to_string())?),
            TraversalOperator::GetAttr(
                Identifier::new(reference.target_attribute.as_str()).map_err(|e| e.to_string())?,
            ),
        ];
        Ok(Expression::from(Traversal::new(root, operators)))
    }
}

fn number(n: &serde_json::Number) -> std::result::Result<Number, String> {
    if let Some(i) = n.as_i64() {
        Ok(Number::from(i))
    } else if let Some(u) = n.as_u64() {
        Ok(Number::from(u))
    } else {
        n.as_f64()
            .and_then(Number::from_f64)
            .ok_or_else(|| format!("number {n} cannot be represented in HCL"))
    }
}

fn identifier(name: &str, what: &str) -> Result<Identifier> {
    Identifier::new(name).map_err(|e| serialization_error(what, e.to_string()))
}

fn object_key(key: &str) -> ObjectKey {
    match Identifier::new(key) {
        Ok(ident) => ObjectKey::Identifier(ident),
        Err(_) => ObjectKey::Expression(Expression::String(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::registry::Registry;
    use crate::types::{NodeId, RawResource};
    use serde_json::json;

    fn render_single(graph: &ResourceGraph, options: &HclOptions) -> String {
        let order = graph.emission_order().unwrap();
        render(graph, &order, options).unwrap().remove(0).content
    }

    fn plain() -> HclOptions {
        HclOptions {
            emit_provider_block: false,
            ..HclOptions::default()
        }
    }

    fn vpc_subnet_instance() -> ResourceGraph {
        let registry = Registry::builtin();
        let mut graph = GraphBuilder::new(&registry)
            .build(vec![
                RawResource::new(
                    "aws_instance",
                    "i-1",
                    json!({"InstanceId": "i-1", "SubnetId": "subnet-1", "InstanceType": "t3.micro"}),
                ),
                RawResource::new(
                    "aws_subnet",
                    "subnet-1",
                    json!({"SubnetId": "subnet-1", "VpcId": "vpc-1", "CidrBlock": "10.0.1.0/24"}),
                ),
                RawResource::new("aws_vpc", "vpc-1", json!({"VpcId": "vpc-1", "CidrBlock": "10.0.0.0/16"})),
            ])
            .graph;
        graph.link();
        graph
    }

    #[test]
    fn test_references_become_traversals() {
        let hcl = render_single(&vpc_subnet_instance(), &plain());

        assert!(hcl.contains("vpc_id = aws_vpc.vpc_1.id"));
        assert!(hcl.contains("subnet_id = aws_subnet.subnet_1.id"));
        let vpc = hcl.find("resource \"aws_vpc\" \"vpc_1\"").unwrap();
        let subnet = hcl.find("resource \"aws_subnet\" \"subnet_1\"").unwrap();
        let instance = hcl.find("resource \"aws_instance\" \"i_1\"").unwrap();
        assert!(vpc < subnet && subnet < instance);
        assert!(!hcl.contains("unresolved"));
    }

    #[test]
    fn test_no_interpolate_keeps_literals() {
        let options = HclOptions {
            interpolate: false,
            ..plain()
        };
        let hcl = render_single(&vpc_subnet_instance(), &options);
        assert!(hcl.contains("vpc_id = \"vpc-1\""));
        assert!(!hcl.contains("aws_vpc.vpc_1.id"));
    }

    #[test]
    fn test_unresolved_literal_with_comment() {
        let registry = Registry::builtin();
        let mut graph = GraphBuilder::new(&registry)
            .build(vec![RawResource::new(
                "aws_subnet",
                "subnet-1",
                json!({"SubnetId": "subnet-1", "VpcId": "vpc-1"}),
            )])
            .graph;
        graph.link();
        graph.mark_unresolved(&NodeId::new("aws_vpc", "vpc-1"), "access denied");

        let hcl = render_single(&graph, &plain());
        assert!(hcl.starts_with("# unresolved reference: vpc_id = \"vpc-1\" (aws_vpc: access denied)\n"));
        assert!(hcl.contains("vpc_id = \"vpc-1\""));
    }

    #[test]
    fn test_demoted_reference_rendering() {
        let registry = Registry::builtin();
        let group = |id: &str, peer: &str| {
            RawResource::new(
                "aws_security_group",
                id,
                json!({
                    "GroupId": id,
                    "GroupName": id,
                    "IpPermissions": [{
                        "IpProtocol": "tcp", "FromPort": 443, "ToPort": 443,
                        "UserIdGroupPairs": [{"GroupId": peer}]
                    }]
                }),
            )
        };
        let mut graph = GraphBuilder::new(&registry)
            .build(vec![group("sg-a", "sg-b"), group("sg-b", "sg-a")])
            .graph;
        graph.link();
        assert_eq!(graph.break_cycles().len(), 1);

        let literal = render_single(&graph, &plain());
        assert!(literal.contains("# cycle broken: ingress.0.security_groups.0 = \"sg-b\" refers to aws_security_group.sg_b"));
        assert!(literal.contains("aws_security_group.sg_a.id"));

        let interpolated = render_single(
            &graph,
            &HclOptions {
                interpolate_demoted: true,
                ..plain()
            },
        );
        assert!(!interpolated.contains("cycle broken"));
        assert!(interpolated.contains("aws_security_group.sg_b.id"));
    }

    #[test]
    fn test_provider_block_and_layout() {
        let options = HclOptions {
            emit_provider_block: true,
            layout: HclLayout::ByCategory,
            ..HclOptions::default()
        };
        let graph = vpc_subnet_instance();
        let order = graph.emission_order().unwrap();
        let files = render(&graph, &order, &options).unwrap();

        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["compute.tf", "network.tf", "providers.tf"]);
        assert!(files[2].content.contains("source = \"hashicorp/aws\""));
        assert!(files[2].content.contains("provider \"aws\""));
    }

    #[test]
    fn test_quoted_object_keys() {
        let registry = Registry::builtin();
        let mut graph = GraphBuilder::new(&registry)
            .build(vec![RawResource::new(
                "aws_vpc",
                "vpc-1",
                json!({"VpcId": "vpc-1", "Tags": [{"Key": "aws:cloudformation:stack-name", "Value": "core"}, {"Key": "Name", "Value": "main"}]}),
            )])
            .graph;
        graph.link();

        let hcl = render_single(&graph, &plain());
        assert!(hcl.contains("\"aws:cloudformation:stack-name\" = \"core\""));
        assert!(hcl.contains("Name = \"main\""));
    }
}
