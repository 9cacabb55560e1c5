//! Resource Type Registry.
//!
//! The registry is the static catalog of every Terraform resource type
//! Terracarto knows how to import. For each type it records:
//!
//! - the provider and category the type belongs to,
//! - the identity fields that make up the Terraform `id`,
//! - the reference fields that point at other resources,
//! - an explicit field-mapping table turning provider-native attributes
//!   into Terraform attribute names.
//!
//! Supporting a new resource type means adding a table entry; there is no
//! reflection involved.
//!
//! # Example
//!
//! ```rust
//! use terracarto::registry::Registry;
//!
//! let registry = Registry::builtin();
//! let subnet = registry.get("aws_subnet").unwrap();
//! assert_eq!(subnet.category, "network");
//! assert_eq!(subnet.reference_fields[0].target_type, "aws_vpc");
//! ```

mod aws;
mod azurerm;
mod path;

pub use path::{AttributePath, FieldPath, PathSegment};

use crate::types::{NodeId, NormalizedAttributes, RawAttributes};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Extraction function used by computed field mappings.
///
/// Returns `Ok(None)` when the source data is absent and `Err` when it is
/// present but malformed.
pub type Extractor = fn(&RawAttributes) -> std::result::Result<Option<Value>, String>;

/// Where a normalized attribute value comes from.
#[derive(Clone)]
pub enum FieldSource {
    /// Copy the value found at a dotted path of the raw attributes
    Path(FieldPath),
    /// Compute the value with an explicit extraction function
    Computed(Extractor),
}

impl std::fmt::Debug for FieldSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => write!(f, "Path({path})"),
            Self::Computed(_) => write!(f, "Computed(..)"),
        }
    }
}

impl FieldSource {
    /// Extract a value from raw attributes.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the data is malformed.
    pub fn extract(&self, raw: &RawAttributes) -> std::result::Result<Option<Value>, String> {
        match self {
            Self::Path(path) => Ok(path.extract(raw)),
            Self::Computed(extract) => extract(raw),
        }
    }
}

/// One entry of a type's field-mapping table.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    /// Terraform attribute name
    pub name: String,
    /// Where the value comes from
    pub source: FieldSource,
}

/// Whether a reference constrains emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceStrength {
    /// Informational reference; demoted first when it closes a cycle
    Soft,
    /// Structural dependency (the target must exist first)
    Hard,
}

/// A field whose value identifies another resource.
#[derive(Debug, Clone)]
pub struct ReferenceField {
    /// Path into the normalized attributes
    pub path: FieldPath,
    /// Resource type the value points at
    pub target_type: String,
    /// Exported attribute of the target used for interpolation
    pub target_attribute: String,
    /// Ordering strength
    pub strength: ReferenceStrength,
}

/// A reference found in a concrete resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundReference {
    /// Concrete location of the value
    pub path: AttributePath,
    /// Target resource
    pub target: NodeId,
    /// Exported attribute of the target
    pub target_attribute: String,
    /// Ordering strength
    pub strength: ReferenceStrength,
}

/// Static description of one Terraform resource type.
#[derive(Debug, Clone)]
pub struct ResourceTypeDescriptor {
    /// Terraform type name (e.g. "aws_subnet")
    pub name: String,
    /// Provider local name (e.g. "aws")
    pub provider: String,
    /// Grouping used for reports and split output
    pub category: String,
    /// Normalized fields that make up the resource identity
    pub identity_fields: Vec<FieldPath>,
    /// Normalized fields that point at other resources
    pub reference_fields: Vec<ReferenceField>,
    /// Field-mapping table
    pub fields: Vec<FieldMapping>,
    /// Tag extraction used by the filter engine
    pub tags: Option<FieldSource>,
}

impl ResourceTypeDescriptor {
    /// Start a descriptor.
    #[must_use]
    pub fn new(name: &str, provider: &str, category: &str) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            category: category.to_string(),
            identity_fields: Vec::new(),
            reference_fields: Vec::new(),
            fields: Vec::new(),
            tags: None,
        }
    }

    /// Add an identity field.
    #[must_use]
    pub fn identity(mut self, path: &str) -> Self {
        self.identity_fields.push(FieldPath::new(path));
        self
    }

    /// Map a Terraform attribute to a raw dotted path.
    #[must_use]
    pub fn field(mut self, name: &str, raw_path: &str) -> Self {
        self.fields.push(FieldMapping {
            name: name.to_string(),
            source: FieldSource::Path(FieldPath::new(raw_path)),
        });
        self
    }

    /// Map a Terraform attribute to an extraction function.
    #[must_use]
    pub fn computed(mut self, name: &str, extract: Extractor) -> Self {
        self.fields.push(FieldMapping {
            name: name.to_string(),
            source: FieldSource::Computed(extract),
        });
        self
    }

    /// Declare a reference to the `id` of another resource type.
    #[must_use]
    pub fn reference(self, path: &str, target_type: &str, strength: ReferenceStrength) -> Self {
        self.reference_to(path, target_type, "id", strength)
    }

    /// Declare a reference to an arbitrary exported attribute.
    #[must_use]
    pub fn reference_to(
        mut self,
        path: &str,
        target_type: &str,
        target_attribute: &str,
        strength: ReferenceStrength,
    ) -> Self {
        self.reference_fields.push(ReferenceField {
            path: FieldPath::new(path),
            target_type: target_type.to_string(),
            target_attribute: target_attribute.to_string(),
            strength,
        });
        self
    }

    /// Declare where tags come from. The result must be a string map.
    #[must_use]
    pub fn tags_from(mut self, extract: Extractor) -> Self {
        self.tags = Some(FieldSource::Computed(extract));
        self
    }

    /// Normalize raw provider attributes into Terraform attributes.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when a mapping fails, when an
    /// identity field is missing or empty, or when a reference field holds
    /// something other than a string or a list of strings.
    pub fn normalize(&self, raw: &RawAttributes) -> std::result::Result<NormalizedAttributes, String> {
        let mut normalized = NormalizedAttributes::new();
        for mapping in &self.fields {
            match mapping.source.extract(raw) {
                Ok(Some(Value::Null) | None) => {}
                Ok(Some(value)) => {
                    normalized.insert(mapping.name.clone(), value);
                }
                Err(message) => return Err(format!("field '{}': {message}", mapping.name)),
            }
        }

        let root = Value::Object(normalized.clone().into_iter().collect());
        for identity in &self.identity_fields {
            let present = identity
                .resolve(&root)
                .iter()
                .any(|(_, value)| !scalar_text(value).unwrap_or_default().is_empty());
            if !present {
                return Err(format!("missing identity field '{identity}'"));
            }
        }

        // Validate reference shapes up front so a malformed resource is
        // rejected before it enters the graph.
        self.references(&normalized)?;

        Ok(normalized)
    }

    /// Identity string of a normalized resource (identity values joined with `/`).
    #[must_use]
    pub fn identity_of(&self, attributes: &NormalizedAttributes) -> Option<String> {
        let root = Value::Object(attributes.clone().into_iter().collect());
        let parts: Vec<String> = self
            .identity_fields
            .iter()
            .filter_map(|path| {
                path.resolve(&root)
                    .into_iter()
                    .find_map(|(_, value)| scalar_text(value))
            })
            .collect();
        if parts.is_empty() || parts.len() != self.identity_fields.len() {
            None
        } else {
            Some(parts.join("/"))
        }
    }

    /// Find every reference held by normalized attributes.
    ///
    /// Empty strings and nulls are ignored. Results are ordered by path.
    ///
    /// # Errors
    ///
    /// Returns a description when a reference field holds a value that is
    /// neither a string nor a list of strings.
    pub fn references(
        &self,
        attributes: &NormalizedAttributes,
    ) -> std::result::Result<Vec<FoundReference>, String> {
        let root = Value::Object(attributes.clone().into_iter().collect());
        let mut found = Vec::new();

        for field in &self.reference_fields {
            for (path, value) in field.path.resolve(&root) {
                match value {
                    Value::Null => {}
                    Value::String(id) => {
                        if !id.is_empty() {
                            found.push(field.found(path, id));
                        }
                    }
                    Value::Array(items) => {
                        for (index, item) in items.iter().enumerate() {
                            match item {
                                Value::String(id) if id.is_empty() => {}
                                Value::String(id) => {
                                    found.push(field.found(path.child_index(index), id));
                                }
                                Value::Null => {}
                                other => {
                                    return Err(format!(
                                        "reference field '{}' contains a non-string element: {other}",
                                        field.path
                                    ));
                                }
                            }
                        }
                    }
                    other => {
                        return Err(format!(
                            "reference field '{}' must be a string or a list of strings, got {other}",
                            field.path
                        ));
                    }
                }
            }
        }

        found.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.target.cmp(&b.target)));
        Ok(found)
    }

    /// Extract the tag map used for filtering.
    ///
    /// Malformed tags are treated as "no tags": the filter is not the place
    /// to reject a resource for bad data.
    #[must_use]
    pub fn tags(&self, raw: &RawAttributes) -> BTreeMap<String, String> {
        let Some(source) = &self.tags else {
            return BTreeMap::new();
        };
        match source.extract(raw) {
            Ok(Some(Value::Object(map))) => map
                .into_iter()
                .filter_map(|(k, v)| scalar_text(&v).map(|v| (k, v)))
                .collect(),
            Ok(_) => BTreeMap::new(),
            Err(message) => {
                tracing::debug!(resource_type = %self.name, error = %message, "Ignoring malformed tags");
                BTreeMap::new()
            }
        }
    }
}

impl ReferenceField {
    fn found(&self, path: AttributePath, id: &str) -> FoundReference {
        FoundReference {
            path,
            target: NodeId::new(&self.target_type, id),
            target_attribute: self.target_attribute.clone(),
            strength: self.strength,
        }
    }
}

/// Render a scalar JSON value as text (strings unquoted).
#[must_use]
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The catalog of known resource types.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    descriptors: BTreeMap<String, ResourceTypeDescriptor>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in catalog.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for descriptor in aws::descriptors().into_iter().chain(azurerm::descriptors()) {
            registry.register(descriptor);
        }
        tracing::debug!(types = registry.len(), "Built-in registry loaded");
        registry
    }

    /// Add or replace a descriptor.
    pub fn register(&mut self, descriptor: ResourceTypeDescriptor) {
        self.descriptors.insert(descriptor.name.clone(), descriptor);
    }

    /// Look up a descriptor by type name.
    #[must_use]
    pub fn get(&self, resource_type: &str) -> Option<&ResourceTypeDescriptor> {
        self.descriptors.get(resource_type)
    }

    /// Whether the type is registered.
    #[must_use]
    pub fn contains(&self, resource_type: &str) -> bool {
        self.descriptors.contains_key(resource_type)
    }

    /// Descriptors of one provider, sorted by type name.
    #[must_use]
    pub fn types_for_provider(&self, provider: &str) -> Vec<&ResourceTypeDescriptor> {
        self.descriptors
            .values()
            .filter(|d| d.provider == provider)
            .collect()
    }

    /// Every provider with at least one registered type.
    #[must_use]
    pub fn providers(&self) -> BTreeSet<&str> {
        self.descriptors.values().map(|d| d.provider.as_str()).collect()
    }

    /// Iterate over all descriptors in type-name order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceTypeDescriptor> {
        self.descriptors.values()
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawAttributes {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_builtin_catalog() {
        let registry = Registry::builtin();
        assert!(registry.contains("aws_vpc"));
        assert!(registry.contains("azurerm_subnet"));
        assert_eq!(
            registry.providers().into_iter().collect::<Vec<_>>(),
            vec!["aws", "azurerm"]
        );

        let names: Vec<_> = registry
            .types_for_provider("aws")
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_every_reference_targets_registered_type() {
        let registry = Registry::builtin();
        for descriptor in registry.iter() {
            assert!(!descriptor.identity_fields.is_empty(), "{} has no identity", descriptor.name);
            for reference in &descriptor.reference_fields {
                assert!(
                    registry.contains(&reference.target_type),
                    "{} references unknown {}",
                    descriptor.name,
                    reference.target_type
                );
            }
        }
    }

    #[test]
    fn test_normalize_subnet() {
        let registry = Registry::builtin();
        let subnet = registry.get("aws_subnet").unwrap();
        let attributes = subnet
            .normalize(&raw(json!({
                "SubnetId": "subnet-1",
                "VpcId": "vpc-1",
                "CidrBlock": "10.0.1.0/24",
                "Tags": [{"Key": "Name", "Value": "private"}]
            })))
            .unwrap();

        assert_eq!(attributes["id"], json!("subnet-1"));
        assert_eq!(attributes["vpc_id"], json!("vpc-1"));
        assert_eq!(attributes["tags"], json!({"Name": "private"}));

        let references = subnet.references(&attributes).unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].target, NodeId::new("aws_vpc", "vpc-1"));
        assert_eq!(references[0].path.to_string(), "vpc_id");
    }

    #[test]
    fn test_normalize_missing_identity() {
        let registry = Registry::builtin();
        let vpc = registry.get("aws_vpc").unwrap();
        let error = vpc.normalize(&raw(json!({"CidrBlock": "10.0.0.0/16"}))).unwrap_err();
        assert!(error.contains("identity"));
    }

    #[test]
    fn test_malformed_reference_rejected() {
        let registry = Registry::builtin();
        let subnet = registry.get("aws_subnet").unwrap();
        let error = subnet
            .normalize(&raw(json!({"SubnetId": "subnet-1", "VpcId": {"nested": true}})))
            .unwrap_err();
        assert!(error.contains("vpc_id"));
    }

    #[test]
    fn test_list_references_get_indexed_paths() {
        let registry = Registry::builtin();
        let instance = registry.get("aws_instance").unwrap();
        let attributes = instance
            .normalize(&raw(json!({
                "InstanceId": "i-1",
                "SubnetId": "subnet-1",
                "SecurityGroups": [{"GroupId": "sg-b"}, {"GroupId": "sg-a"}]
            })))
            .unwrap();
        let references = instance.references(&attributes).unwrap();
        let paths: Vec<String> = references.iter().map(|r| r.path.to_string()).collect();
        assert_eq!(
            paths,
            vec!["subnet_id", "vpc_security_group_ids.0", "vpc_security_group_ids.1"]
        );
    }

    #[test]
    fn test_tags_extraction() {
        let registry = Registry::builtin();
        let vpc = registry.get("aws_vpc").unwrap();
        let tags = vpc.tags(&raw(json!({
            "VpcId": "vpc-1",
            "Tags": [{"Key": "env", "Value": "prod"}, {"Key": "team", "Value": "x"}]
        })));
        assert_eq!(tags.get("env").map(String::as_str), Some("prod"));
        assert_eq!(tags.len(), 2);

        let group = registry.get("azurerm_resource_group").unwrap();
        let tags = group.tags(&raw(json!({"id": "/subscriptions/s/resourceGroups/rg", "tags": {"env": "dev"}})));
        assert_eq!(tags.get("env").map(String::as_str), Some("dev"));
    }

    #[test]
    fn test_identity_of() {
        let registry = Registry::builtin();
        let bucket = registry.get("aws_s3_bucket").unwrap();
        let attributes = bucket.normalize(&raw(json!({"Name": "logs"}))).unwrap();
        assert_eq!(bucket.identity_of(&attributes), Some("logs".to_string()));
    }
}
