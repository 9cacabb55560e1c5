//! Integration tests for Terracarto.
//!
//! These tests drive whole import runs against the snapshot fixtures and
//! exercise the binary end to end.

use std::path::PathBuf;
use std::sync::Arc;
use terracarto::importer::{Importer, RunContext};
use terracarto::types::{FilterSpec, IssueKind, OutputMode, TagFilter};
use terracarto::writer::Destination;
use terracarto::{Config, Filter, Registry, SnapshotProvider};

/// Get the path to the test fixtures directory.
fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn context(fixture: &str, spec: FilterSpec) -> RunContext {
    let registry = Arc::new(Registry::builtin());
    let adapter = SnapshotProvider::from_path(&fixtures_path().join(fixture), Arc::clone(&registry)).unwrap();
    RunContext::new(Arc::new(adapter), registry, Filter::new(spec), 4)
}

fn prod_instances() -> FilterSpec {
    FilterSpec {
        include: ["aws_instance".to_string()].into_iter().collect(),
        tag_filters: vec![TagFilter::new("env", "prod")],
        ..FilterSpec::default()
    }
}

mod import_tests {
    use super::*;

    #[tokio::test]
    async fn test_instance_import_pulls_dependencies() {
        let ctx = context("network.json", prod_instances());
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("main.tf");

        let report = Importer::new()
            .run(&ctx, OutputMode::Hcl, &Destination::Path(out.clone()))
            .await
            .unwrap();

        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.counts.discovered, 2);
        assert_eq!(report.counts.filtered_out, 1);
        assert_eq!(report.counts.included, 1);
        assert_eq!(report.counts.dependency_fetched, 4);
        assert_eq!(report.counts.unresolved, 0);
        assert_eq!(report.counts.demoted, 1);

        let hcl = std::fs::read_to_string(out).unwrap();
        let position = |needle: &str| hcl.find(needle).unwrap_or_else(|| panic!("missing {needle}"));
        assert!(position("resource \"aws_vpc\" \"vpc_1\"") < position("resource \"aws_subnet\" \"subnet_1\""));
        assert!(position("resource \"aws_subnet\" \"subnet_1\"") < position("resource \"aws_instance\" \"i_1\""));
        assert!(position("resource \"aws_security_group\" \"sg_web\"") < position("resource \"aws_instance\" \"i_1\""));
        assert!(hcl.contains("subnet_id = aws_subnet.subnet_1.id"));
        assert!(hcl.contains("aws_security_group.sg_web.id"));
        assert!(hcl.contains("# dependency-only"));
        assert!(hcl.contains("# cycle broken"));
        assert!(!hcl.contains("i_2"));
        assert!(!hcl.contains("aws_s3_bucket"));
    }

    #[tokio::test]
    async fn test_output_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let mut outputs = Vec::new();
        for name in ["first.tf", "second.tf"] {
            let ctx = context("network.json", FilterSpec::default());
            let out = dir.path().join(name);
            Importer::new()
                .run(&ctx, OutputMode::Hcl, &Destination::Path(out.clone()))
                .await
                .unwrap();
            outputs.push(std::fs::read(out).unwrap());
        }
        assert_eq!(outputs[0], outputs[1]);
    }

    #[tokio::test]
    async fn test_state_output() {
        let ctx = context("network.json", prod_instances());
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("terraform.tfstate");

        Importer::new()
            .run(&ctx, OutputMode::State, &Destination::Path(out.clone()))
            .await
            .unwrap();

        let state: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(state["version"], 4);
        let resources = state["resources"].as_array().unwrap();
        assert_eq!(resources.len(), 5);
        let instance = resources.iter().find(|r| r["type"] == "aws_instance").unwrap();
        assert_eq!(instance["name"], "i_1");
        assert_eq!(instance["instances"][0]["attributes"]["id"], "i-1");
        let dependencies = instance["instances"][0]["dependencies"].as_array().unwrap();
        assert!(dependencies.contains(&serde_json::json!("aws_subnet.subnet_1")));
    }

    #[tokio::test]
    async fn test_unresolved_dependency_scenario() {
        let ctx = context("denied_vpc.json", FilterSpec::default());
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("main.tf");

        let report = Importer::new()
            .run(&ctx, OutputMode::Hcl, &Destination::Path(out.clone()))
            .await
            .unwrap();

        assert_eq!(report.exit_code(), 0);
        assert!(!report.errors.is_empty());
        assert_eq!(report.issues_of(IssueKind::Unresolved), 1);

        let hcl = std::fs::read_to_string(out).unwrap();
        assert!(hcl.contains("vpc_id = \"vpc-1\""));
        assert!(hcl.contains("# unresolved reference"));
        assert!(hcl.contains("access denied"));
        assert!(!hcl.contains("resource \"aws_vpc\""));
    }

    #[tokio::test]
    async fn test_literal_references_without_following() {
        let ctx = context("network.json", prod_instances());
        let prepared = Importer::new().follow_references(false).prepare(&ctx).await.unwrap();

        assert_eq!(prepared.graph.node_count(), 1);
        assert_eq!(prepared.report.counts.unresolved, 2);
        assert_eq!(prepared.report.counts.dependency_fetched, 0);
    }

    #[tokio::test]
    async fn test_by_category_layout() {
        let ctx = context("network.json", FilterSpec::default());
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("generated");
        let hcl = terracarto::config::HclOptions {
            layout: terracarto::types::HclLayout::ByCategory,
            ..Default::default()
        };

        Importer::new()
            .hcl(hcl)
            .run(&ctx, OutputMode::Hcl, &Destination::Path(out.clone()))
            .await
            .unwrap();

        for file in ["network.tf", "compute.tf", "storage.tf", "providers.tf"] {
            assert!(out.join(file).exists(), "{file} missing");
        }
        let compute = std::fs::read_to_string(out.join("compute.tf")).unwrap();
        assert!(compute.contains("resource \"aws_instance\" \"i_1\""));
        assert!(compute.contains("resource \"aws_instance\" \"i_2\""));
    }
}

mod graph_tests {
    use super::*;
    use terracarto::graph::export_graph;
    use terracarto::types::GraphFormat;

    #[tokio::test]
    async fn test_export_resolved_graph() {
        let ctx = context("network.json", prod_instances());
        let prepared = Importer::new().prepare(&ctx).await.unwrap();

        let dot = export_graph(&prepared.graph, GraphFormat::Dot).unwrap();
        assert!(dot.starts_with("digraph Terracarto"));
        assert!(dot.contains("style=dashed"));

        let json: serde_json::Value =
            serde_json::from_str(&export_graph(&prepared.graph, GraphFormat::Json).unwrap()).unwrap();
        assert_eq!(json["nodes"].as_array().unwrap().len(), 5);

        let mermaid = export_graph(&prepared.graph, GraphFormat::Mermaid).unwrap();
        assert!(mermaid.contains("-.->"));
    }
}

mod config_tests {
    use super::*;

    #[tokio::test]
    async fn test_context_from_config() {
        let yaml = format!(
            r#"
provider:
  kind: snapshot
  snapshot: {}
import:
  include: [aws_instance]
  tags: ["env:prod"]
"#,
            fixtures_path().join("network.json").display()
        );
        let config = Config::from_yaml(&yaml).unwrap();
        config.validate().unwrap();

        let ctx = RunContext::from_config(&config).unwrap();
        let prepared = Importer::from_config(&config).progress(false).prepare(&ctx).await.unwrap();
        assert_eq!(prepared.report.counts.included, 1);
    }

    #[test]
    fn test_missing_snapshot_rejected() {
        let config = Config::default();
        let error = RunContext::from_config(&config).err().unwrap();
        assert_eq!(error.exit_code(), 20);
    }
}

mod cli_tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;

    fn terracarto(dir: &std::path::Path) -> Command {
        let mut cmd = Command::cargo_bin("terracarto").unwrap();
        cmd.current_dir(dir)
            .env_remove("TERRACARTO_CONFIG")
            .env_remove("TERRACARTO_SNAPSHOT")
            .env_remove("RUST_LOG");
        cmd
    }

    #[test]
    fn test_import_to_stdout() {
        let dir = tempfile::tempdir().unwrap();
        terracarto(dir.path())
            .arg("import")
            .arg("--snapshot")
            .arg(fixtures_path().join("network.json"))
            .args(["--include", "aws_subnet", "--no-progress"])
            .assert()
            .success()
            .stdout(predicate::str::contains("vpc_id = aws_vpc.vpc_1.id"))
            .stderr(predicate::str::contains("COMPLETED"));
    }

    #[test]
    fn test_import_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("terraform.tfstate");
        terracarto(dir.path())
            .arg("import")
            .arg("--snapshot")
            .arg(fixtures_path().join("denied_vpc.json"))
            .args(["--tf-state", "--report", "json", "--no-progress"])
            .arg("-o")
            .arg(&out)
            .assert()
            .success()
            .stderr(predicate::str::contains("\"status\": \"completed\""))
            .stderr(predicate::str::contains("\"unresolved\""));
        assert!(out.exists());
    }

    #[test]
    fn test_import_without_snapshot_fails() {
        let dir = tempfile::tempdir().unwrap();
        terracarto(dir.path())
            .arg("import")
            .assert()
            .code(20)
            .stderr(predicate::str::contains("provider.snapshot"));
    }

    #[test]
    fn test_resources_listing() {
        let dir = tempfile::tempdir().unwrap();
        terracarto(dir.path())
            .args(["resources", "--provider", "azurerm"])
            .assert()
            .success()
            .stdout(predicate::str::contains("azurerm_virtual_network"))
            .stdout(predicate::str::contains("aws_vpc").not());
    }

    #[test]
    fn test_init_then_validate() {
        let dir = tempfile::tempdir().unwrap();
        terracarto(dir.path()).arg("init").assert().success();
        assert!(dir.path().join("terracarto.yaml").exists());

        terracarto(dir.path())
            .arg("validate")
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid"));

        terracarto(dir.path()).arg("init").assert().failure();
    }

    #[test]
    fn test_graph_mermaid() {
        let dir = tempfile::tempdir().unwrap();
        terracarto(dir.path())
            .arg("graph")
            .arg("--snapshot")
            .arg(fixtures_path().join("network.json"))
            .args(["--format", "mermaid", "--no-progress"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("graph BT"));
    }
}
