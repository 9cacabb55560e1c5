//! # Terracarto
//!
//! Reverse-engineers Terraform configuration from existing cloud resources.
//!
//! Terracarto asks a provider adapter for every resource of every supported
//! type, keeps the ones selected by type, tag or explicit target, pulls in
//! whatever those resources reference, and writes the result either as
//! dependency-ordered HCL or as a Terraform state document.
//!
//! ## Features
//!
//! - **Registry-driven normalization**: per-type mapping tables turn raw
//!   provider payloads into Terraform-shaped attributes
//! - **Closure resolution**: filtered-out or hidden dependencies are fetched
//!   so references can be interpolated
//! - **Cycle handling**: reference cycles are broken deterministically
//! - **Deterministic output**: the same account yields byte-identical HCL
//!   and state
//! - **Graph export**: DOT, JSON and Mermaid views of the resolved graph
//!
//! ## Example
//!
//! ```rust,no_run
//! use terracarto::importer::{Importer, RunContext};
//! use terracarto::types::OutputMode;
//! use terracarto::writer::Destination;
//! use terracarto::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::default();
//!     config.provider.snapshot = Some("inventory.json".into());
//!
//!     let ctx = RunContext::from_config(&config)?;
//!     let report = Importer::from_config(&config)
//!         .run(&ctx, OutputMode::Hcl, &Destination::Stdout)
//!         .await?;
//!
//!     eprintln!("{} resources imported", report.counts.included);
//!     Ok(())
//! }
//! ```

#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod graph;
pub mod importer;
pub mod provider;
pub mod registry;
pub mod reporter;
pub mod types;
pub mod writer;

// Re-export commonly used types at crate root
pub use config::Config;
pub use error::{Result, TerracartoError};
pub use filter::Filter;
pub use importer::{Importer, Prepared, RunContext};
pub use provider::{ProviderAdapter, SnapshotProvider};
pub use registry::Registry;
pub use types::{
    FilterSpec, GraphFormat, ImportReport, NodeId, OutputMode, RawResource, ReportFormat,
};
