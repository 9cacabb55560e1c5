//! Import orchestration.
//!
//! The [`Importer`] drives a whole run:
//!
//! ```text
//! authenticate ──▶ discover (per type, bounded) ──▶ filter ──▶ build
//!                                                              │
//!                         write ◀── resolve closure + cycles ◀─┘
//! ```
//!
//! Everything a run needs from the outside lives in a [`RunContext`]; there
//! is no global state. Non-fatal problems end up in the returned
//! [`ImportReport`], fatal ones are returned as errors.

use crate::config::{Config, HclOptions, StateOptions};
use crate::error::{Result, TerracartoError};
use crate::filter::Filter;
use crate::graph::{ClosureResolver, GraphBuilder, ResourceGraph, SkippedResource};
use crate::provider::{self, ProviderAdapter};
use crate::registry::Registry;
use crate::types::{FilterSpec, ImportReport, IssueKind, NodeId, OutputMode, RawResource};
use crate::writer::{Destination, Writer};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Collaborators of an import run.
#[derive(Clone)]
pub struct RunContext {
    /// Cloud access
    pub adapter: Arc<dyn ProviderAdapter>,
    /// Resource type catalog
    pub registry: Arc<Registry>,
    /// Inclusion rules
    pub filter: Filter,
    /// Bounds concurrent adapter calls (discovery and dependency fetches)
    pub limiter: Arc<Semaphore>,
    /// Stops the run when triggered
    pub cancel: CancellationToken,
}

impl RunContext {
    /// Assemble a context with its own cancellation token.
    #[must_use]
    pub fn new(
        adapter: Arc<dyn ProviderAdapter>,
        registry: Arc<Registry>,
        filter: Filter,
        concurrency: usize,
    ) -> Self {
        Self {
            adapter,
            registry,
            filter,
            limiter: Arc::new(Semaphore::new(concurrency.max(1))),
            cancel: CancellationToken::new(),
        }
    }

    /// Build the context described by a configuration.
    ///
    /// # Errors
    ///
    /// Returns configuration errors (bad filter strings, missing provider
    /// settings) and adapter initialization errors.
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = Arc::new(Registry::builtin());
        let filter = Filter::new(config.filter_spec()?);
        let adapter = provider::from_config(&config.provider, Arc::clone(&registry))?;
        Ok(Self::new(adapter, registry, filter, config.import.concurrency))
    }

    /// Use an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Resolved graph and report of a run that has not been written yet.
#[derive(Debug)]
pub struct Prepared {
    /// The closed, acyclic resource graph
    pub graph: ResourceGraph,
    /// Counters and recorded problems so far
    pub report: ImportReport,
}

/// Runs imports.
#[derive(Debug, Clone)]
pub struct Importer {
    follow_references: bool,
    max_depth: usize,
    progress: bool,
    hcl: HclOptions,
    state: StateOptions,
}

impl Default for Importer {
    fn default() -> Self {
        Self {
            follow_references: true,
            max_depth: 10,
            progress: false,
            hcl: HclOptions::default(),
            state: StateOptions::default(),
        }
    }
}

type Listing = (String, Result<Vec<RawResource>>);

impl Importer {
    /// Create an importer with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an importer from the configuration's import and writer options.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            follow_references: config.import.follow_references,
            max_depth: config.import.max_dependency_depth,
            progress: config.output.progress,
            hcl: config.hcl.clone(),
            state: config.state.clone(),
        }
    }

    /// Whether filtered-out references are fetched.
    #[must_use]
    pub fn follow_references(mut self, follow: bool) -> Self {
        self.follow_references = follow;
        self
    }

    /// Show a progress bar on stderr during discovery.
    #[must_use]
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// HCL rendering options.
    #[must_use]
    pub fn hcl(mut self, hcl: HclOptions) -> Self {
        self.hcl = hcl;
        self
    }

    /// Run an import and write its output.
    ///
    /// A cancelled run returns its partial report with `cancelled` set and
    /// writes nothing. A failed write is reported through `write_error`.
    ///
    /// # Errors
    ///
    /// Returns fatal errors: authentication, unreachable provider, or every
    /// resource type failing to list.
    pub async fn run(&self, ctx: &RunContext, mode: OutputMode, out: &Destination) -> Result<ImportReport> {
        let Prepared { graph, mut report } = self.prepare_for(ctx, mode).await?;
        if report.cancelled {
            tracing::warn!("Import cancelled, nothing written");
            return Ok(report);
        }

        let writer = Writer::new(&ctx.registry, self.hcl.clone(), self.state.clone());
        if let Err(error) = writer.write(&graph, mode, out) {
            tracing::error!(error = %error, "Writing output failed");
            let key = match &error {
                TerracartoError::Serialization { node, .. } => {
                    node.split('.').next().unwrap_or("output").to_string()
                }
                _ => "output".to_string(),
            };
            report.record(key, IssueKind::Serialization, None, error.summary());
            report.write_error = Some(error.to_string());
        }

        tracing::info!(
            included = report.counts.included,
            dependencies = report.counts.dependency_fetched,
            unresolved = report.counts.unresolved,
            issues = report.issue_count(),
            "Import complete"
        );
        Ok(report)
    }

    /// Discover, filter, build and resolve without writing.
    ///
    /// # Errors
    ///
    /// Same fatal errors as [`Importer::run`].
    pub async fn prepare(&self, ctx: &RunContext) -> Result<Prepared> {
        self.prepare_for(ctx, OutputMode::Hcl).await
    }

    async fn prepare_for(&self, ctx: &RunContext, mode: OutputMode) -> Result<Prepared> {
        let provider_name = ctx.adapter.provider().to_string();
        let mut report = ImportReport::new(&provider_name, mode);

        tracing::info!(provider = %provider_name, "Authenticating");
        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => {
                report.cancelled = true;
                return Ok(Prepared { graph: ResourceGraph::new(), report });
            }
            result = ctx.adapter.authenticate() => result?,
        }

        let Some(listings) = self.discover(ctx, &provider_name, &mut report).await? else {
            report.cancelled = true;
            return Ok(Prepared { graph: ResourceGraph::new(), report });
        };

        let (included, pool) = Self::apply_filter(ctx, listings, &mut report);

        let build = GraphBuilder::new(&ctx.registry).build(included);
        let mut graph = build.graph;
        record_skipped(&mut report, &build.skipped);
        report.counts.included = graph.node_count();

        let resolver = ClosureResolver::new(
            Arc::clone(&ctx.registry),
            Arc::clone(&ctx.adapter),
            Arc::clone(&ctx.limiter),
            ctx.cancel.clone(),
        )
        .with_pool(pool)
        .follow_references(self.follow_references)
        .max_depth(self.max_depth);
        let summary = resolver.resolve(&mut graph).await?;

        record_skipped(&mut report, &summary.skipped);
        report.counts.dependency_fetched = summary.fetched;
        report.counts.demoted = summary.demoted.len();

        let mut unresolved: BTreeMap<NodeId, (String, Vec<NodeId>)> = BTreeMap::new();
        for entry in summary.unresolved {
            let (_, referenced_by) = unresolved
                .entry(entry.target)
                .or_insert_with(|| (entry.reason, Vec::new()));
            referenced_by.extend(entry.referenced_by);
        }
        report.counts.unresolved = unresolved.len();
        for (target, (reason, mut referenced_by)) in unresolved {
            referenced_by.sort();
            referenced_by.dedup();
            let holders: Vec<String> = referenced_by.iter().map(ToString::to_string).collect();
            report.record(
                target.resource_type,
                IssueKind::Unresolved,
                Some(target.provider_id),
                format!("{reason} (referenced by {})", holders.join(", ")),
            );
        }

        if summary.cancelled || ctx.cancel.is_cancelled() {
            report.cancelled = true;
        }

        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            rounds = summary.rounds,
            "Graph resolved"
        );
        Ok(Prepared { graph, report })
    }

    /// List every considered type concurrently. `None` means cancelled.
    async fn discover(
        &self,
        ctx: &RunContext,
        provider_name: &str,
        report: &mut ImportReport,
    ) -> Result<Option<BTreeMap<String, Vec<RawResource>>>> {
        let types: Vec<String> = ctx
            .registry
            .types_for_provider(provider_name)
            .into_iter()
            .map(|descriptor| descriptor.name.clone())
            .filter(|name| ctx.filter.considers_type(name))
            .collect();
        tracing::info!(types = types.len(), "Discovering resources");

        let bar = self.progress_bar(types.len());
        // Tag filters stay with the filter step so every rejection is counted and pooled.
        let spec = Arc::new(FilterSpec {
            tag_filters: Vec::new(),
            ..ctx.filter.spec().clone()
        });
        let mut tasks: JoinSet<Listing> = JoinSet::new();
        for resource_type in &types {
            tasks.spawn(list_type(
                Arc::clone(&ctx.adapter),
                Arc::clone(&ctx.limiter),
                ctx.cancel.clone(),
                Arc::clone(&spec),
                resource_type.clone(),
            ));
        }

        let mut listings = BTreeMap::new();
        let mut failed = 0_usize;
        while let Some(joined) = tasks.join_next().await {
            let (resource_type, result) = joined
                .map_err(|e| TerracartoError::internal(format!("discovery task failed: {e}"), file!(), line!()))?;
            bar.inc(1);
            bar.set_message(resource_type.clone());

            match result {
                Ok(resources) => {
                    tracing::debug!(resource_type = %resource_type, count = resources.len(), "Listed");
                    listings.insert(resource_type, resources);
                }
                Err(TerracartoError::Cancelled { .. }) => {
                    tasks.abort_all();
                    bar.abandon_with_message("cancelled");
                    return Ok(None);
                }
                Err(error) if provider::aborts_run(&error) => {
                    tasks.abort_all();
                    bar.abandon();
                    return Err(error);
                }
                Err(error) if error.is_recoverable() => {
                    tracing::warn!(resource_type = %resource_type, error = %error.summary(), "Listing failed");
                    failed += 1;
                    report.types.entry(resource_type.clone()).or_default().failed = true;
                    report.record(resource_type, IssueKind::Discovery, None, error.summary());
                }
                Err(error) => {
                    tasks.abort_all();
                    bar.abandon();
                    return Err(error);
                }
            }
        }
        bar.finish_and_clear();

        if !types.is_empty() && failed == types.len() {
            return Err(crate::err!(DiscoveryFailed {
                provider: provider_name.to_string(),
                attempted: types.len(),
            }));
        }
        Ok(Some(listings))
    }

    fn apply_filter(
        ctx: &RunContext,
        listings: BTreeMap<String, Vec<RawResource>>,
        report: &mut ImportReport,
    ) -> (Vec<RawResource>, Vec<RawResource>) {
        let mut included = Vec::new();
        let mut pool = Vec::new();
        for (resource_type, resources) in listings {
            let descriptor = ctx.registry.get(&resource_type);
            let summary = report.types.entry(resource_type).or_default();
            for resource in resources {
                summary.discovered += 1;
                let tags = descriptor
                    .map(|d| d.tags(&resource.attributes))
                    .unwrap_or_default();
                if ctx.filter.accepts(&resource.node_id(), &tags) {
                    summary.included += 1;
                    included.push(resource);
                } else {
                    summary.filtered_out += 1;
                    pool.push(resource);
                }
            }
        }
        report.counts.discovered = included.len() + pool.len();
        report.counts.filtered_out = pool.len();
        tracing::info!(
            discovered = report.counts.discovered,
            included = included.len(),
            filtered_out = pool.len(),
            "Filter applied"
        );
        (included, pool)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar
    }
}

async fn list_type(
    adapter: Arc<dyn ProviderAdapter>,
    limiter: Arc<Semaphore>,
    cancel: CancellationToken,
    spec: Arc<FilterSpec>,
    resource_type: String,
) -> Listing {
    let cancelled = || crate::err!(Cancelled { stage: "discovery".to_string() });
    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(cancelled()),
        result = async {
            let _permit = limiter
                .acquire()
                .await
                .map_err(|e| TerracartoError::internal(format!("limiter closed: {e}"), file!(), line!()))?;
            adapter.list(&resource_type, &spec).await
        } => result,
    };
    (resource_type, result)
}

fn record_skipped(report: &mut ImportReport, skipped: &[SkippedResource]) {
    for entry in skipped {
        report.counts.skipped += 1;
        report.record(
            entry.id.resource_type.clone(),
            IssueKind::Normalization,
            Some(entry.id.provider_id.clone()),
            entry.error.summary(),
        );
    }
}
