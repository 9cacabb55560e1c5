//! Output writers.
//!
//! The writer serializes a resolved [`ResourceGraph`] either as HCL
//! configuration or as a Terraform state document. Output is always
//! rendered completely in memory first; a failure on any node aborts the
//! write before a single byte reaches the destination.
//!
//! # Determinism
//!
//! Nodes are emitted in [`ResourceGraph::emission_order`], attributes in
//! key order, and state lineage is derived from the node set unless one is
//! configured. Writing the same graph twice yields identical bytes.
//!
//! # Example
//!
//! ```rust
//! use terracarto::config::{HclOptions, StateOptions};
//! use terracarto::graph::GraphBuilder;
//! use terracarto::registry::Registry;
//! use terracarto::types::{OutputMode, RawResource};
//! use terracarto::writer::Writer;
//! use serde_json::json;
//!
//! let registry = Registry::builtin();
//! let mut graph = GraphBuilder::new(&registry)
//!     .build(vec![RawResource::new("aws_vpc", "vpc-1", json!({"VpcId": "vpc-1", "CidrBlock": "10.0.0.0/16"}))])
//!     .graph;
//! graph.link();
//!
//! let writer = Writer::new(&registry, HclOptions::default(), StateOptions::default());
//! let files = writer.render(&graph, OutputMode::Hcl).unwrap();
//! assert!(files[0].content.contains("resource \"aws_vpc\" \"vpc_1\""));
//! ```

mod configuration;
mod state;

use crate::config::{HclOptions, StateOptions};
use crate::error::{Result, TerracartoError};
use crate::graph::ResourceGraph;
use crate::registry::Registry;
use crate::types::{HclLayout, OutputMode};
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// Where generated output goes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Destination {
    /// Standard output
    #[default]
    Stdout,
    /// A file, or a directory when the output spans several files
    Path(PathBuf),
}

/// One rendered output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    /// File name relative to the destination directory
    pub name: String,
    /// Full file content
    pub content: String,
}

/// Serializes resource graphs.
#[derive(Debug, Clone)]
pub struct Writer<'a> {
    registry: &'a Registry,
    hcl: HclOptions,
    state: StateOptions,
}

impl<'a> Writer<'a> {
    /// Create a writer.
    #[must_use]
    pub fn new(registry: &'a Registry, hcl: HclOptions, state: StateOptions) -> Self {
        Self { registry, hcl, state }
    }

    /// Render the graph without writing anything.
    ///
    /// # Errors
    ///
    /// Returns a [`TerracartoError::Serialization`] naming the first node
    /// that could not be rendered, or a circular dependency error if the
    /// graph was not resolved.
    pub fn render(&self, graph: &ResourceGraph, mode: OutputMode) -> Result<Vec<RenderedFile>> {
        let order = graph.emission_order()?;
        tracing::debug!(nodes = order.len(), %mode, "Rendering output");
        match mode {
            OutputMode::Hcl => configuration::render(graph, &order, &self.hcl),
            OutputMode::State => {
                let content = state::render(graph, &order, self.registry, &self.state)?;
                Ok(vec![RenderedFile {
                    name: "terraform.tfstate".to_string(),
                    content,
                }])
            }
        }
    }

    /// Render the graph and write it to `out`.
    ///
    /// A single rendered file goes to the destination path itself (or into
    /// it, if it is an existing directory). Several files are staged in a
    /// sibling directory first and only moved into the destination once all
    /// of them are on disk. A new destination directory is renamed into
    /// place whole. In an existing one, the generated files replace their
    /// namesakes and any other file is left alone, including `.tf` files
    /// from earlier runs with a different category set.
    ///
    /// # Errors
    ///
    /// Returns rendering errors unchanged, and I/O errors with the failing
    /// path. Nothing is written when rendering fails.
    pub fn write(&self, graph: &ResourceGraph, mode: OutputMode, out: &Destination) -> Result<()> {
        let files = self.render(graph, mode)?;
        match out {
            Destination::Stdout => write_stdout(&files),
            Destination::Path(path) => {
                let single = mode == OutputMode::State || self.hcl.layout == HclLayout::Single;
                if single && !path.is_dir() {
                    if let Some(file) = files.first() {
                        write_atomic(path, &file.content)?;
                    }
                    return Ok(());
                }
                write_directory(path, &files)?;
                tracing::info!(files = files.len(), path = %path.display(), "Output written");
                Ok(())
            }
        }
    }
}

fn write_stdout(files: &[RenderedFile]) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    let multiple = files.len() > 1;
    for file in files {
        if multiple {
            writeln!(stdout, "# {}", file.name).map_err(|e| TerracartoError::io("<stdout>", e, file!(), line!()))?;
        }
        stdout
            .write_all(file.content.as_bytes())
            .map_err(|e| TerracartoError::io("<stdout>", e, file!(), line!()))?;
    }
    stdout.flush().map_err(|e| TerracartoError::io("<stdout>", e, file!(), line!()))
}

/// Stage every file in a sibling directory, then move the set into `path`.
fn write_directory(path: &Path, files: &[RenderedFile]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| TerracartoError::io(parent, e, file!(), line!()))?;
    }
    let staging = sibling(path, "staging");
    if let Err(error) = stage(&staging, files) {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(error);
    }

    if !path.exists() {
        return std::fs::rename(&staging, path).map_err(|e| {
            let _ = std::fs::remove_dir_all(&staging);
            TerracartoError::io(path, e, file!(), line!())
        });
    }

    let result = move_into(&staging, path, files);
    let _ = std::fs::remove_dir_all(&staging);
    result
}

fn stage(staging: &Path, files: &[RenderedFile]) -> Result<()> {
    std::fs::create_dir(staging).map_err(|e| TerracartoError::io(staging, e, file!(), line!()))?;
    for file in files {
        let target = staging.join(&file.name);
        std::fs::write(&target, &file.content).map_err(|e| TerracartoError::io(&target, e, file!(), line!()))?;
    }
    Ok(())
}

/// Targets are checked before the first rename so a conflict moves nothing.
fn move_into(staging: &Path, path: &Path, files: &[RenderedFile]) -> Result<()> {
    if !path.is_dir() {
        return Err(TerracartoError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "not a directory"),
            file!(),
            line!(),
        ));
    }
    if let Some(blocked) = files.iter().map(|f| path.join(&f.name)).find(|target| target.is_dir()) {
        return Err(TerracartoError::io(
            &blocked,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "a directory is in the way"),
            file!(),
            line!(),
        ));
    }
    for file in files {
        let target = path.join(&file.name);
        std::fs::rename(staging.join(&file.name), &target)
            .map_err(|e| TerracartoError::io(&target, e, file!(), line!()))?;
    }
    Ok(())
}

/// Hidden sibling of `path` tagged with the process ID.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!(".{file_name}.{}.{suffix}", std::process::id()))
}

/// Write through a sibling temporary file, then rename it into place.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let temp = sibling(path, "tmp");

    if let Err(e) = std::fs::write(&temp, content) {
        let _ = std::fs::remove_file(&temp);
        return Err(TerracartoError::io(&temp, e, file!(), line!()));
    }
    std::fs::rename(&temp, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        TerracartoError::io(path, e, file!(), line!())
    })?;
    tracing::debug!(path = %path.display(), bytes = content.len(), "Wrote file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::types::RawResource;
    use serde_json::json;

    fn graph(registry: &Registry) -> ResourceGraph {
        let mut graph = GraphBuilder::new(registry)
            .build(vec![
                RawResource::new("aws_vpc", "vpc-1", json!({"VpcId": "vpc-1", "CidrBlock": "10.0.0.0/16"})),
                RawResource::new("aws_s3_bucket", "logs", json!({"Name": "logs"})),
            ])
            .graph;
        graph.link();
        graph
    }

    #[test]
    fn test_write_file_atomically() {
        let registry = Registry::builtin();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.tf");
        let writer = Writer::new(&registry, HclOptions::default(), StateOptions::default());

        writer
            .write(&graph(&registry), OutputMode::Hcl, &Destination::Path(path.clone()))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("resource \"aws_vpc\" \"vpc_1\""));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_write_by_category_into_directory() {
        let registry = Registry::builtin();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("generated");
        let hcl = HclOptions {
            layout: HclLayout::ByCategory,
            ..HclOptions::default()
        };
        let writer = Writer::new(&registry, hcl, StateOptions::default());

        writer
            .write(&graph(&registry), OutputMode::Hcl, &Destination::Path(out.clone()))
            .unwrap();

        assert!(out.join("network.tf").exists());
        assert!(out.join("storage.tf").exists());
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_by_category_keeps_unrelated_files() {
        let registry = Registry::builtin();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("backend.tf"), "terraform {}\n").unwrap();
        std::fs::write(dir.path().join("network.tf"), "# old\n").unwrap();
        let hcl = HclOptions {
            layout: HclLayout::ByCategory,
            ..HclOptions::default()
        };
        let writer = Writer::new(&registry, hcl, StateOptions::default());

        writer
            .write(&graph(&registry), OutputMode::Hcl, &Destination::Path(dir.path().to_path_buf()))
            .unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("backend.tf")).unwrap(), "terraform {}\n");
        let network = std::fs::read_to_string(dir.path().join("network.tf")).unwrap();
        assert!(network.contains("resource \"aws_vpc\" \"vpc_1\""));
        assert!(!sibling(dir.path(), "staging").exists());
    }

    #[test]
    fn test_by_category_conflict_moves_nothing() {
        let registry = Registry::builtin();
        let dir = tempfile::tempdir().unwrap();
        // "network.tf" sorts first, "storage.tf" is blocked by a directory.
        std::fs::create_dir(dir.path().join("storage.tf")).unwrap();
        let hcl = HclOptions {
            layout: HclLayout::ByCategory,
            ..HclOptions::default()
        };
        let writer = Writer::new(&registry, hcl, StateOptions::default());

        let error = writer
            .write(&graph(&registry), OutputMode::Hcl, &Destination::Path(dir.path().to_path_buf()))
            .unwrap_err();

        assert!(matches!(error, TerracartoError::Io { .. }));
        assert!(!dir.path().join("network.tf").exists());
        assert!(!sibling(dir.path(), "staging").exists());
    }

    #[test]
    fn test_state_into_existing_directory() {
        let registry = Registry::builtin();
        let dir = tempfile::tempdir().unwrap();
        let writer = Writer::new(&registry, HclOptions::default(), StateOptions::default());

        writer
            .write(&graph(&registry), OutputMode::State, &Destination::Path(dir.path().to_path_buf()))
            .unwrap();

        assert!(dir.path().join("terraform.tfstate").exists());
    }
}
