//! Filter engine.
//!
//! Decides which discovered resources are imported. The filter only looks at
//! a resource's type, tags and ID; it never pulls a resource in. Resources
//! rejected here may still be imported later as dependency-only nodes when an
//! included resource references them.

use crate::types::{FilterSpec, NodeId};
use std::collections::BTreeMap;

/// Evaluates a [`FilterSpec`].
#[derive(Debug, Clone, Default)]
pub struct Filter {
    spec: FilterSpec,
}

impl Filter {
    /// Create a filter from a specification.
    #[must_use]
    pub fn new(spec: FilterSpec) -> Self {
        Self { spec }
    }

    /// The underlying specification.
    #[must_use]
    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    /// Whether resources of this type can ever be included, letting the
    /// orchestrator skip listing the type altogether.
    #[must_use]
    pub fn considers_type(&self, resource_type: &str) -> bool {
        let by_type = if self.spec.include.is_empty() {
            !self.spec.exclude.contains(resource_type)
        } else {
            self.spec.include.contains(resource_type)
        };
        by_type
            && (self.spec.targets.is_empty()
                || self
                    .spec
                    .targets
                    .iter()
                    .any(|target| target.resource_type == resource_type))
    }

    /// Type and tag decision.
    ///
    /// With a non-empty `include` list, only listed types pass; otherwise
    /// every type not in `exclude` passes. In both cases the tags must
    /// satisfy every tag filter (exact key and value).
    #[must_use]
    pub fn should_include(&self, resource_type: &str, tags: &BTreeMap<String, String>) -> bool {
        let by_type = if self.spec.include.is_empty() {
            !self.spec.exclude.contains(resource_type)
        } else {
            self.spec.include.contains(resource_type)
        };
        by_type && self.tags_match(tags)
    }

    /// Whether a resource is one of the explicit targets (always true when
    /// no target is configured).
    #[must_use]
    pub fn matches_target(&self, id: &NodeId) -> bool {
        self.spec.targets.is_empty() || self.spec.targets.contains(id)
    }

    /// Full decision for one discovered resource.
    #[must_use]
    pub fn accepts(&self, id: &NodeId, tags: &BTreeMap<String, String>) -> bool {
        self.should_include(&id.resource_type, tags) && self.matches_target(id)
    }

    fn tags_match(&self, tags: &BTreeMap<String, String>) -> bool {
        self.spec
            .tag_filters
            .iter()
            .all(|filter| tags.get(&filter.key) == Some(&filter.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TagFilter;
    use test_case::test_case;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn filter(include: &[&str], exclude: &[&str], tag_filters: &[(&str, &str)]) -> Filter {
        Filter::new(FilterSpec {
            include: include.iter().map(|s| (*s).to_string()).collect(),
            exclude: exclude.iter().map(|s| (*s).to_string()).collect(),
            tag_filters: tag_filters
                .iter()
                .map(|(k, v)| TagFilter::new(*k, *v))
                .collect(),
            targets: Default::default(),
        })
    }

    #[test_case(&[], &[], "aws_vpc" => true; "no filters")]
    #[test_case(&["aws_instance"], &[], "aws_instance" => true; "included type")]
    #[test_case(&["aws_instance"], &[], "aws_vpc" => false; "type not in include")]
    #[test_case(&[], &["aws_vpc"], "aws_vpc" => false; "excluded type")]
    #[test_case(&[], &["aws_vpc"], "aws_subnet" => true; "other than excluded")]
    #[test_case(&["aws_vpc"], &["aws_vpc"], "aws_vpc" => true; "include wins over exclude")]
    fn test_type_decision(include: &[&str], exclude: &[&str], resource_type: &str) -> bool {
        filter(include, exclude, &[]).should_include(resource_type, &BTreeMap::new())
    }

    #[test_case(&[("env", "prod")] => true; "all filters satisfied")]
    #[test_case(&[("env", "prod"), ("team", "x")] => false; "second filter fails")]
    #[test_case(&[("env", "dev")] => false; "value mismatch")]
    #[test_case(&[] => true; "no tag filters")]
    fn test_tag_and_semantics(filters: &[(&str, &str)]) -> bool {
        filter(&[], &[], filters).should_include("aws_vpc", &tags(&[("env", "prod"), ("team", "y")]))
    }

    #[test]
    fn test_considers_type() {
        let f = filter(&["aws_instance"], &[], &[]);
        assert!(f.considers_type("aws_instance"));
        assert!(!f.considers_type("aws_vpc"));

        let targeted = Filter::new(FilterSpec {
            targets: [NodeId::new("aws_subnet", "subnet-1")].into_iter().collect(),
            ..FilterSpec::default()
        });
        assert!(targeted.considers_type("aws_subnet"));
        assert!(!targeted.considers_type("aws_vpc"));
    }

    #[test]
    fn test_targets() {
        let f = Filter::new(FilterSpec {
            targets: [NodeId::new("aws_subnet", "subnet-1")].into_iter().collect(),
            ..FilterSpec::default()
        });
        assert!(f.accepts(&NodeId::new("aws_subnet", "subnet-1"), &BTreeMap::new()));
        assert!(!f.accepts(&NodeId::new("aws_subnet", "subnet-2"), &BTreeMap::new()));
    }

    #[test]
    fn test_referenced_type_not_auto_included() {
        // aws_vpc is excluded even though included subnets point at it.
        let f = filter(&["aws_subnet"], &[], &[]);
        assert!(!f.should_include("aws_vpc", &BTreeMap::new()));
    }
}
