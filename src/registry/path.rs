//! Dotted attribute paths.
//!
//! A [`FieldPath`] is a declaration (`ingress.*.security_groups`) that may
//! match many locations; an [`AttributePath`] is one concrete location
//! (`ingress.0.security_groups.1`).

use crate::types::RawAttributes;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    /// Object key
    Key(String),
    /// Array index
    Index(usize),
    /// Every element of an array (declarations only)
    Each,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Index(index) => write!(f, "{index}"),
            Self::Each => write!(f, "*"),
        }
    }
}

/// A declared path, possibly matching several concrete locations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Parse a dotted path. `*` matches every array element and numeric
    /// segments index into arrays.
    #[must_use]
    pub fn new(path: &str) -> Self {
        let segments = path
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|segment| {
                if segment == "*" {
                    PathSegment::Each
                } else if let Ok(index) = segment.parse::<usize>() {
                    PathSegment::Index(index)
                } else {
                    PathSegment::Key(segment.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    /// The parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Whether the path can match more than one location.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.segments.contains(&PathSegment::Each)
    }

    /// Every concrete location matched in `root`, in document order.
    #[must_use]
    pub fn resolve<'a>(&self, root: &'a Value) -> Vec<(AttributePath, &'a Value)> {
        let mut out = Vec::new();
        walk(&self.segments, root, AttributePath::default(), &mut out);
        out
    }

    /// Extract a value from raw attributes.
    ///
    /// Plain paths yield the single matched value; wildcard paths collect
    /// every non-null match into an array.
    #[must_use]
    pub fn extract(&self, raw: &RawAttributes) -> Option<Value> {
        let (PathSegment::Key(first), rest) = self.segments.split_first()? else {
            return None;
        };
        let start = raw.get(first)?;

        let mut out = Vec::new();
        walk(rest, start, AttributePath::default().child_key(first), &mut out);

        if self.is_wildcard() {
            let values: Vec<Value> = out
                .into_iter()
                .map(|(_, v)| v.clone())
                .filter(|v| !v.is_null())
                .collect();
            (!values.is_empty()).then_some(Value::Array(values))
        } else {
            out.into_iter().next().map(|(_, v)| v.clone())
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

fn walk<'a>(
    segments: &[PathSegment],
    value: &'a Value,
    current: AttributePath,
    out: &mut Vec<(AttributePath, &'a Value)>,
) {
    let Some((head, rest)) = segments.split_first() else {
        out.push((current, value));
        return;
    };

    match (head, value) {
        (PathSegment::Key(key), Value::Object(map)) => {
            if let Some(next) = map.get(key) {
                walk(rest, next, current.child_key(key), out);
            }
        }
        (PathSegment::Index(index), Value::Array(items)) => {
            if let Some(next) = items.get(*index) {
                walk(rest, next, current.child_index(*index), out);
            }
        }
        (PathSegment::Each, Value::Array(items)) => {
            for (index, next) in items.iter().enumerate() {
                walk(rest, next, current.child_index(index), out);
            }
        }
        _ => {}
    }
}

/// A concrete location inside a resource's attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributePath {
    segments: Vec<PathSegment>,
}

impl AttributePath {
    /// Path to a top-level attribute.
    #[must_use]
    pub fn attribute(name: &str) -> Self {
        Self::default().child_key(name)
    }

    /// Extend with an object key.
    #[must_use]
    pub fn child_key(&self, key: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Key(key.to_string()));
        Self { segments }
    }

    /// Extend with an array index.
    #[must_use]
    pub fn child_index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(index));
        Self { segments }
    }

    /// The concrete segments.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Name of the top-level attribute this path lives under.
    #[must_use]
    pub fn root_attribute(&self) -> Option<&str> {
        match self.segments.first() {
            Some(PathSegment::Key(key)) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl Serialize for AttributePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_segments() {
        let path = FieldPath::new("ingress.*.security_groups");
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("ingress".to_string()),
                PathSegment::Each,
                PathSegment::Key("security_groups".to_string()),
            ]
        );
        assert!(path.is_wildcard());
        assert_eq!(path.to_string(), "ingress.*.security_groups");
    }

    #[test]
    fn test_resolve_wildcard() {
        let doc = json!({
            "ingress": [
                {"security_groups": ["sg-1"]},
                {"cidr_blocks": ["0.0.0.0/0"]},
                {"security_groups": ["sg-2", "sg-3"]}
            ]
        });
        let matches = FieldPath::new("ingress.*.security_groups").resolve(&doc);
        let paths: Vec<String> = matches.iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(paths, vec!["ingress.0.security_groups", "ingress.2.security_groups"]);
    }

    #[test]
    fn test_extract_nested_and_indexed() {
        let raw = match json!({
            "properties": {"addressSpace": {"addressPrefixes": ["10.0.0.0/16"]}},
            "NetworkInterfaces": [{"SubnetId": "subnet-1"}]
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        assert_eq!(
            FieldPath::new("properties.addressSpace.addressPrefixes").extract(&raw),
            Some(json!(["10.0.0.0/16"]))
        );
        assert_eq!(
            FieldPath::new("NetworkInterfaces.0.SubnetId").extract(&raw),
            Some(json!("subnet-1"))
        );
        assert_eq!(FieldPath::new("NetworkInterfaces.*.SubnetId").extract(&raw), Some(json!(["subnet-1"])));
        assert_eq!(FieldPath::new("missing").extract(&raw), None);
    }

    #[test]
    fn test_attribute_path_order() {
        let a = AttributePath::attribute("ingress").child_index(0);
        let b = AttributePath::attribute("ingress").child_index(1);
        assert!(a < b);
        assert_eq!(a.root_attribute(), Some("ingress"));
    }
}
