//! Error types for Terracarto.
//!
//! This module defines the error hierarchy using `thiserror`. Every variant
//! that can be raised from inside the crate records the source location it
//! was created at, which the `err!` macro fills in automatically.
//!
//! # Error Categories
//!
//! - **Fatal errors**: authentication failures, an unreachable control plane,
//!   total discovery failure, invalid configuration. These abort a run.
//! - **Per-type discovery errors**: one resource type could not be listed.
//! - **Per-resource errors**: a malformed resource was skipped during
//!   normalization.
//! - **Fetch errors**: a dependency target could not be fetched; the
//!   reference is kept as a literal.
//! - **Serialization errors**: abort the write step only.
//!
//! # Example
//!
//! ```rust
//! use terracarto::error::{TerracartoError, Result};
//!
//! fn read_snapshot(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path).map_err(|e| TerracartoError::Io {
//!         path: path.into(),
//!         source: e,
//!         src_path: file!(),
//!         src_line: line!(),
//!     })
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Macro to create errors with automatic source location tracking.
///
/// Fields accept the struct-literal shorthand as well.
///
/// Usage:
/// ```ignore
/// return Err(err!(ConfigMissing { key: "provider.snapshot".to_string() }));
/// let message = "expired token".to_string();
/// return Err(err!(Authentication { provider: "aws".to_string(), message }));
/// ```
#[macro_export]
macro_rules! err {
    ($variant:ident { $($field:ident $(: $value:expr)?),* $(,)? }) => {
        $crate::error::TerracartoError::$variant {
            $($field $(: $value)?,)*
            src_path: file!(),
            src_line: line!(),
        }
    };
}

/// A specialized Result type for Terracarto operations.
pub type Result<T> = std::result::Result<T, TerracartoError>;

/// The main error type for Terracarto.
#[derive(Error, Debug)]
pub enum TerracartoError {
    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// I/O error with path context.
    #[error("I/O error at '{path}' ({src_path}:{src_line}): {source}")]
    Io {
        /// The path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Provider Adapter Errors
    // =========================================================================
    /// The adapter could not authenticate against the cloud account.
    #[error("Authentication failed for provider '{provider}' ({src_path}:{src_line}): {message}")]
    Authentication {
        /// Provider name (e.g. "aws")
        provider: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// The cloud control plane could not be reached at all.
    #[error("Provider '{provider}' is unreachable ({src_path}:{src_line}): {message}")]
    Unreachable {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Every attempted resource type failed to list.
    #[error("Discovery failed for every resource type of provider '{provider}' ({attempted} attempted) ({src_path}:{src_line})")]
    DiscoveryFailed {
        /// Provider name
        provider: String,
        /// Number of resource types attempted
        attempted: usize,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Listing a single resource type failed.
    #[error("Failed to list '{resource_type}' ({src_path}:{src_line}): {message}")]
    Discovery {
        /// The resource type being listed
        resource_type: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// The requested resource does not exist.
    #[error("Resource '{resource_type}' '{id}' not found ({src_path}:{src_line})")]
    NotFound {
        /// Resource type
        resource_type: String,
        /// Provider ID
        id: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// The credentials in use may not read the requested resource.
    #[error("Access denied to '{resource_type}' '{id}' ({src_path}:{src_line}): {message}")]
    AccessDenied {
        /// Resource type
        resource_type: String,
        /// Provider ID
        id: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Generic provider-side failure.
    #[error("Provider error ({src_path}:{src_line}): {message}")]
    Provider {
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// An account snapshot could not be loaded.
    #[error("Invalid account snapshot '{path}' ({src_path}:{src_line}): {message}")]
    Snapshot {
        /// Snapshot path
        path: PathBuf,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Graph Errors
    // =========================================================================
    /// The resource type is not present in the registry.
    #[error("Unknown resource type '{resource_type}' ({src_path}:{src_line})")]
    UnknownResourceType {
        /// The unregistered type
        resource_type: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// A raw resource could not be normalized.
    #[error("Failed to normalize '{resource_type}' '{provider_id}' ({src_path}:{src_line}): {message}")]
    Normalization {
        /// Resource type
        resource_type: String,
        /// Provider ID
        provider_id: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Ordering edges still form a cycle.
    #[error("Circular dependency detected ({src_path}:{src_line}): {cycle}")]
    CircularDependency {
        /// Description of the cycle
        cycle: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Output Errors
    // =========================================================================
    /// A node could not be serialized.
    #[error("Failed to serialize '{node}' ({src_path}:{src_line}): {message}")]
    Serialization {
        /// Address or ID of the offending node
        node: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Report generation error.
    #[error("Failed to generate report ({src_path}:{src_line}): {message}")]
    ReportGeneration {
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration parsing error.
    #[error("Failed to parse configuration ({src_path}:{src_line}): {message}")]
    ConfigParse {
        /// Error message
        message: String,
        /// The underlying error (if any)
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}' ({src_path}:{src_line}): {message}")]
    ConfigValue {
        /// The configuration key
        key: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Missing required configuration.
    #[error("Missing required configuration: {key} ({src_path}:{src_line})")]
    ConfigMissing {
        /// The missing configuration key
        key: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// The run was cancelled.
    #[error("Cancelled during {stage} ({src_path}:{src_line})")]
    Cancelled {
        /// Pipeline stage that observed the cancellation
        stage: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Internal error (should not happen in normal operation).
    #[error("Internal error ({src_path}:{src_line}): {message}")]
    Internal {
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Multiple errors occurred.
    #[error("Multiple errors occurred ({count} total)")]
    Multiple {
        /// Number of errors
        count: usize,
        /// The individual errors
        errors: Vec<TerracartoError>,
    },
}

impl TerracartoError {
    /// Creates an `Io` error.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error, src_path: &'static str, src_line: u32) -> Self {
        Self::Io { path: path.into(), source, src_path, src_line }
    }

    /// Creates a `ConfigParse` error.
    #[must_use]
    pub fn config_parse(message: String, source: Option<Box<dyn std::error::Error + Send + Sync>>, src_path: &'static str, src_line: u32) -> Self {
        Self::ConfigParse { message, source, src_path, src_line }
    }

    /// Creates an `Internal` error.
    #[must_use]
    pub fn internal(message: String, src_path: &'static str, src_line: u32) -> Self {
        Self::Internal { message, src_path, src_line }
    }

    /// Errors that abort a whole import run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Authentication { .. }
            | Self::Unreachable { .. }
            | Self::DiscoveryFailed { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigValue { .. }
            | Self::ConfigMissing { .. }
            | Self::Snapshot { .. } => true,
            Self::Multiple { errors, .. } => errors.iter().any(Self::is_fatal),
            _ => false,
        }
    }

    /// Determines if the error is recoverable (the run can continue with the
    /// affected resource type or resource skipped).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Discovery { .. }
            | Self::NotFound { .. }
            | Self::AccessDenied { .. }
            | Self::Provider { .. }
            | Self::UnknownResourceType { .. }
            | Self::Normalization { .. } => true,
            _ => false,
        }
    }

    /// Short, location-free description used in reports and HCL comments.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::NotFound { .. } => "not found".to_string(),
            Self::AccessDenied { message, .. } if message.is_empty() => "access denied".to_string(),
            Self::AccessDenied { message, .. } => format!("access denied: {message}"),
            Self::Discovery { message, .. }
            | Self::Provider { message, .. }
            | Self::Normalization { message, .. }
            | Self::Authentication { message, .. }
            | Self::Unreachable { message, .. } => message.clone(),
            Self::UnknownResourceType { resource_type, .. } => {
                format!("unknown resource type {resource_type}")
            }
            Self::Cancelled { .. } => "cancelled".to_string(),
            other => other.to_string(),
        }
    }

    /// Returns the appropriate exit code for the error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied => 13,
            Self::Authentication { .. } => 16,
            Self::Unreachable { .. } => 17,
            Self::ConfigParse { .. } => 18,
            Self::ConfigValue { .. } => 19,
            Self::ConfigMissing { .. } => 20,
            Self::Multiple { .. } => 21,
            Self::DiscoveryFailed { .. } => 22,
            Self::Snapshot { .. } => 23,
            Self::Cancelled { .. } => 130,
            _ => 1,
        }
    }

    /// Consolidates multiple errors into a single `TerracartoError::Multiple` if there's more than one.
    /// Otherwise, returns the single error or `Ok(())` if no errors.
    pub fn collect(errors: Vec<Self>) -> Result<()> {
        let mut errors = errors;
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            count => Err(Self::Multiple { count, errors }),
        }
    }
}

/// Extension trait for `Result` to add context to errors.
pub trait ResultExt<T> {
    /// Converts a general error into a `ConfigParse` error with context.
    fn to_config_parse_error(self, message: String) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn to_config_parse_error(self, message: String) -> Result<T> {
        self.map_err(|e| TerracartoError::config_parse(message, Some(e.into()), file!(), line!()))
    }
}
