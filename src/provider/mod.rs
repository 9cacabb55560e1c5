//! Provider adapters.
//!
//! A provider adapter is the only component that talks to a cloud. It
//! exposes three capabilities: verifying credentials, listing every resource
//! of a type, and fetching a single resource by ID. Everything above this
//! layer works on [`RawResource`] values and never sees an SDK type.
//!
//! Errors returned by an adapter fall in two groups:
//!
//! - **fatal**: [`TerracartoError::Authentication`] and
//!   [`TerracartoError::Unreachable`] abort the whole run;
//! - **recoverable**: [`TerracartoError::Discovery`],
//!   [`TerracartoError::NotFound`], [`TerracartoError::AccessDenied`] and
//!   [`TerracartoError::Provider`] affect a single type or resource.

mod snapshot;

pub use snapshot::{AccountSnapshot, SnapshotProvider};

use crate::config::{ProviderKind, ProviderOptions};
use crate::error::{Result, TerracartoError};
use crate::registry::Registry;
use crate::types::{FilterSpec, RawResource};
use async_trait::async_trait;
use std::sync::Arc;

/// Capability interface of a cloud provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider local name, matching the registry (e.g. "aws").
    fn provider(&self) -> &str;

    /// Verify that the configured credentials work.
    ///
    /// # Errors
    ///
    /// Returns a fatal error when the account cannot be used at all.
    async fn authenticate(&self) -> Result<()>;

    /// List every resource of one type.
    ///
    /// Adapters may push tag filters down to the cloud API; callers must not
    /// rely on it and filter again.
    ///
    /// # Errors
    ///
    /// Returns [`TerracartoError::Discovery`] when the type cannot be listed.
    async fn list(&self, resource_type: &str, filter: &FilterSpec) -> Result<Vec<RawResource>>;

    /// Fetch one resource by provider ID.
    ///
    /// # Errors
    ///
    /// Returns [`TerracartoError::NotFound`] or
    /// [`TerracartoError::AccessDenied`] when the resource is unavailable.
    async fn get(&self, resource_type: &str, id: &str) -> Result<RawResource>;
}

/// Build the adapter selected by the configuration.
///
/// # Errors
///
/// Returns a configuration error when a required setting is missing, or the
/// adapter's own error when it fails to initialize.
pub fn from_config(
    options: &ProviderOptions,
    registry: Arc<Registry>,
) -> Result<Arc<dyn ProviderAdapter>> {
    match options.kind {
        ProviderKind::Snapshot => {
            let path = options.snapshot.as_ref().ok_or_else(|| {
                crate::err!(ConfigMissing {
                    key: "provider.snapshot (or --snapshot)".to_string(),
                })
            })?;
            tracing::info!(path = %path.display(), "Using snapshot provider");
            let adapter = SnapshotProvider::from_path(path, registry)?;
            Ok(Arc::new(adapter))
        }
    }
}

/// Whether an adapter error should stop the run rather than be recorded.
pub(crate) fn aborts_run(error: &TerracartoError) -> bool {
    error.is_fatal() || matches!(error, TerracartoError::Cancelled { .. })
}
