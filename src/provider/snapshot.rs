//! Snapshot provider.
//!
//! Replays an account inventory captured to a JSON or YAML document:
//!
//! ```yaml
//! provider: aws
//! resources:            # returned by list() and get()
//!   - type: aws_vpc
//!     id: vpc-1
//!     attributes: { VpcId: vpc-1, CidrBlock: 10.0.0.0/16 }
//! hidden:               # returned by get() only (e.g. shared resources)
//!   - type: aws_security_group
//!     id: sg-shared
//!     attributes: { GroupId: sg-shared }
//! denied:               # get() answers "access denied"
//!   - aws_iam_role.admin
//! list_errors:          # list() fails for these types
//!   aws_s3_bucket: "AccessDenied: s3:ListAllMyBuckets"
//! get_errors:           # get() fails with a provider error
//!   aws_kms_key.k-1: "ThrottlingException"
//! authentication_error: null
//! latency_ms: 0
//! ```

use super::ProviderAdapter;
use crate::error::{Result, TerracartoError};
use crate::registry::Registry;
use crate::types::{FilterSpec, NodeId, RawResource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A captured account inventory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSnapshot {
    /// Provider local name (e.g. "aws")
    pub provider: String,
    /// Resources visible to both `list` and `get`
    pub resources: Vec<RawResource>,
    /// Resources visible to `get` only
    pub hidden: Vec<RawResource>,
    /// `type.id` entries for which `get` answers access denied
    pub denied: Vec<String>,
    /// Per-type `list` failures
    pub list_errors: BTreeMap<String, String>,
    /// Per-resource `get` failures, keyed by `type.id`
    pub get_errors: BTreeMap<String, String>,
    /// When set, `authenticate` fails with this message
    pub authentication_error: Option<String>,
    /// When set, `authenticate` reports the control plane as unreachable
    pub unreachable: Option<String>,
    /// Simulated latency of every call, in milliseconds
    pub latency_ms: u64,
}

impl AccountSnapshot {
    /// Parse a snapshot document. YAML is a superset of JSON, so JSON
    /// documents are accepted by the YAML branch as well.
    ///
    /// # Errors
    ///
    /// Returns the parser message when the document is malformed.
    pub fn parse(content: &str, yaml: bool) -> std::result::Result<Self, String> {
        if yaml {
            serde_yaml::from_str(content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(content).map_err(|e| e.to_string())
        }
    }
}

/// Provider adapter backed by an [`AccountSnapshot`].
#[derive(Debug)]
pub struct SnapshotProvider {
    provider: String,
    listed: BTreeMap<String, Vec<RawResource>>,
    by_id: HashMap<NodeId, RawResource>,
    denied: BTreeSet<NodeId>,
    list_errors: BTreeMap<String, String>,
    get_errors: BTreeMap<NodeId, String>,
    authentication_error: Option<String>,
    unreachable: Option<String>,
    latency: Duration,
    registry: Arc<Registry>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl SnapshotProvider {
    /// Load a snapshot file. Files ending in `.yaml`/`.yml` are read as
    /// YAML, everything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TerracartoError::Io`] when the file cannot be read and
    /// [`TerracartoError::Snapshot`] when it is malformed.
    pub fn from_path(path: &Path, registry: Arc<Registry>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TerracartoError::io(path, e, file!(), line!()))?;
        let yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );
        let snapshot = AccountSnapshot::parse(&content, yaml).map_err(|message| {
            crate::err!(Snapshot {
                path: path.to_path_buf(),
                message,
            })
        })?;
        Self::build(snapshot, registry, path)
    }

    /// Wrap an in-memory snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`TerracartoError::Snapshot`] when the snapshot is invalid.
    pub fn new(snapshot: AccountSnapshot, registry: Arc<Registry>) -> Result<Self> {
        Self::build(snapshot, registry, Path::new("<memory>"))
    }

    fn build(snapshot: AccountSnapshot, registry: Arc<Registry>, path: &Path) -> Result<Self> {
        let invalid = |message: String| {
            crate::err!(Snapshot {
                path: PathBuf::from(path),
                message,
            })
        };

        if snapshot.provider.trim().is_empty() {
            return Err(invalid("missing 'provider'".to_string()));
        }

        let denied = snapshot
            .denied
            .iter()
            .map(|entry| entry.parse::<NodeId>())
            .collect::<std::result::Result<BTreeSet<_>, _>>()
            .map_err(|e| invalid(format!("invalid 'denied' entry: {e}")))?;
        let get_errors = snapshot
            .get_errors
            .iter()
            .map(|(entry, message)| entry.parse::<NodeId>().map(|id| (id, message.clone())))
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()
            .map_err(|e| invalid(format!("invalid 'get_errors' entry: {e}")))?;

        let mut listed: BTreeMap<String, Vec<RawResource>> = BTreeMap::new();
        let mut by_id = HashMap::new();
        for resource in &snapshot.resources {
            listed
                .entry(resource.resource_type.clone())
                .or_default()
                .push(resource.clone());
            by_id
                .entry(resource.node_id())
                .or_insert_with(|| resource.clone());
        }
        for resource in &snapshot.hidden {
            by_id
                .entry(resource.node_id())
                .or_insert_with(|| resource.clone());
        }

        tracing::debug!(
            provider = %snapshot.provider,
            resources = snapshot.resources.len(),
            hidden = snapshot.hidden.len(),
            denied = denied.len(),
            "Snapshot loaded"
        );

        Ok(Self {
            provider: snapshot.provider,
            listed,
            by_id,
            denied,
            list_errors: snapshot.list_errors,
            get_errors,
            authentication_error: snapshot.authentication_error,
            unreachable: snapshot.unreachable,
            latency: Duration::from_millis(snapshot.latency_ms),
            registry,
            list_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
        })
    }

    /// Number of `list` calls served so far.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    /// Number of `get` calls served so far.
    #[must_use]
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::Relaxed)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn matches_tags(&self, resource: &RawResource, filter: &FilterSpec) -> bool {
        if filter.tag_filters.is_empty() {
            return true;
        }
        let Some(descriptor) = self.registry.get(&resource.resource_type) else {
            return true;
        };
        let tags = descriptor.tags(&resource.attributes);
        filter
            .tag_filters
            .iter()
            .all(|f| tags.get(&f.key) == Some(&f.value))
    }
}

#[async_trait]
impl ProviderAdapter for SnapshotProvider {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn authenticate(&self) -> Result<()> {
        self.simulate_latency().await;
        if let Some(message) = &self.unreachable {
            return Err(crate::err!(Unreachable {
                provider: self.provider.clone(),
                message: message.clone(),
            }));
        }
        if let Some(message) = &self.authentication_error {
            return Err(crate::err!(Authentication {
                provider: self.provider.clone(),
                message: message.clone(),
            }));
        }
        Ok(())
    }

    async fn list(&self, resource_type: &str, filter: &FilterSpec) -> Result<Vec<RawResource>> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;

        if let Some(message) = self.list_errors.get(resource_type) {
            return Err(crate::err!(Discovery {
                resource_type: resource_type.to_string(),
                message: message.clone(),
            }));
        }

        let resources: Vec<RawResource> = self
            .listed
            .get(resource_type)
            .map(|items| {
                items
                    .iter()
                    .filter(|r| self.matches_tags(r, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        tracing::trace!(resource_type = %resource_type, count = resources.len(), "Snapshot list");
        Ok(resources)
    }

    async fn get(&self, resource_type: &str, id: &str) -> Result<RawResource> {
        self.get_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;

        let node = NodeId::new(resource_type, id);
        if self.denied.contains(&node) {
            return Err(crate::err!(AccessDenied {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
                message: String::new(),
            }));
        }
        if let Some(message) = self.get_errors.get(&node) {
            return Err(crate::err!(Provider {
                message: message.clone(),
            }));
        }
        self.by_id.get(&node).cloned().ok_or_else(|| {
            crate::err!(NotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            })
        })
    }
}
