//! Terracarto CLI entry point.
//!
//! This binary provides the command-line interface for Terracarto.

use clap::Parser;
use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use std::process::ExitCode;
use terracarto::cli::{Cli, Commands, ResourcesArgs};
use terracarto::importer::{Importer, RunContext};
use terracarto::registry::Registry;
use terracarto::reporter::Reporter;
use terracarto::writer::Destination;
use terracarto::{Config, TerracartoError};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.quiet);

    // Run the appropriate command
    match run(cli).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");

            // Print error with full chain
            eprintln!("Error: {e}");

            let mut source = e.source();
            if source.is_some() {
                eprintln!("\nCaused by:");
                let mut i = 0;
                while let Some(cause) = source {
                    eprintln!("  {i}: {cause}");
                    source = cause.source();
                    i += 1;
                }
            }

            // Print backtrace if RUST_BACKTRACE is set
            let backtrace = e.backtrace();
            if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
                eprintln!("\nStack backtrace:");
                let backtrace_str = format!("{backtrace}");
                let mut in_terracarto = false;
                for line in backtrace_str.lines() {
                    let trimmed = line.trim();
                    if trimmed.contains("terracarto::") {
                        in_terracarto = true;
                        eprintln!("{line}");
                    } else if in_terracarto && trimmed.starts_with("at ") && trimmed.contains("./src/") {
                        eprintln!("{line}");
                        in_terracarto = false;
                    } else {
                        in_terracarto = false;
                    }
                }
            }

            let code = e
                .downcast_ref::<TerracartoError>()
                .map_or(1, TerracartoError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        // RUST_LOG wins over the verbose flag
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let base_level = match verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            };
            EnvFilter::new(format!("warn,terracarto={base_level}"))
        })
    };

    // stdout carries generated HCL/state, logs go to stderr
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false),
        )
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    tracing::debug!("Loading configuration");
    let mut config = load_config(&cli)?;
    if cli.verbose >= 2 {
        config.output.verbose = true;
    }

    match cli.command {
        Commands::Import(args) => {
            config.merge_import_args(&args);
            if cli.quiet {
                config.output.progress = false;
            }
            config.validate()?;

            let ctx = RunContext::from_config(&config)?.with_cancellation(interrupt_token());
            let importer = Importer::from_config(&config);
            let out = args.out.clone().map_or(Destination::Stdout, Destination::Path);

            let report = importer.run(&ctx, args.mode(), &out).await?;

            if !cli.quiet || !report.is_complete() {
                let rendered = Reporter::new(&config).generate(&report, args.report)?;
                eprint!("{rendered}");
            }

            Ok(ExitCode::from(report.exit_code()))
        }

        Commands::Graph(args) => {
            config.merge_cli_args(&args.discovery);
            if cli.quiet {
                config.output.progress = false;
            }
            config.validate()?;

            let ctx = RunContext::from_config(&config)?.with_cancellation(interrupt_token());
            let prepared = Importer::from_config(&config).prepare(&ctx).await?;
            if prepared.report.cancelled {
                eprintln!("Cancelled, no graph written");
                return Ok(ExitCode::from(prepared.report.exit_code()));
            }

            let graph_output = terracarto::graph::export_graph(&prepared.graph, args.format)?;

            if let Some(output_path) = args.output {
                std::fs::write(&output_path, &graph_output)
                    .map_err(|e| TerracartoError::io(&output_path, e, file!(), line!()))?;
                tracing::info!(path = %output_path.display(), "Graph written");
            } else {
                println!("{graph_output}");
            }

            Ok(ExitCode::SUCCESS)
        }

        Commands::Resources(args) => {
            print_resources(&Registry::builtin(), &args, config.output.colored);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Init => {
            let config_path = std::path::Path::new("terracarto.yaml");

            if config_path.exists() {
                anyhow::bail!("Configuration file already exists: {}", config_path.display());
            }

            std::fs::write(config_path, Config::example_yaml())
                .map_err(|e| TerracartoError::io(config_path, e, file!(), line!()))?;
            println!("Created example configuration: terracarto.yaml");
            Ok(ExitCode::SUCCESS)
        }

        Commands::Validate(args) => {
            let content = std::fs::read_to_string(&args.file)
                .map_err(|e| TerracartoError::io(&args.file, e, file!(), line!()))?;
            match Config::from_yaml(&content).and_then(|config| config.validate()) {
                Ok(()) => {
                    println!("Configuration is valid: {}", args.file.display());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("Configuration error: {e}");
                    Ok(ExitCode::from(1))
                }
            }
        }
    }
}

/// Token cancelled on the first Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            token.cancel();
        }
    });
    cancel
}

fn print_resources(registry: &Registry, args: &ResourcesArgs, use_colors: bool) {
    let mut table = Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Type", "Provider", "Category", "Identity", "References"]);

    let mut count = 0;
    for descriptor in registry.iter() {
        if args.provider.as_deref().is_some_and(|p| p != descriptor.provider) {
            continue;
        }
        count += 1;
        let identity: Vec<String> = descriptor.identity_fields.iter().map(ToString::to_string).collect();
        let references: Vec<String> = descriptor
            .reference_fields
            .iter()
            .map(|r| format!("{} -> {}", r.path, r.target_type))
            .collect();
        table.add_row(vec![
            descriptor.name.clone(),
            descriptor.provider.clone(),
            descriptor.category.clone(),
            identity.join(", "),
            references.join("\n"),
        ]);
    }

    println!("{table}");
    let summary = format!("{count} resource types");
    if use_colors {
        println!("{}", summary.dimmed());
    } else {
        println!("{summary}");
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    // Check for explicit config file
    if let Some(ref config_path) = cli.config {
        tracing::debug!(path = %config_path.display(), "Loading configuration from explicit path");
        let content = std::fs::read_to_string(config_path)
            .map_err(|e| TerracartoError::io(config_path, e, file!(), line!()))?;
        return Ok(Config::from_yaml(&content)?);
    }

    // Look for default config files
    let default_paths = ["terracarto.yaml", "terracarto.yml", ".terracarto.yaml"];
    for path in &default_paths {
        if std::path::Path::new(path).exists() {
            tracing::debug!(path = %path, "Found configuration file");
            let content = std::fs::read_to_string(path)
                .map_err(|e| TerracartoError::io(*path, e, file!(), line!()))?;
            return Ok(Config::from_yaml(&content)?);
        }
    }

    tracing::debug!("No configuration file found, using default configuration");
    Ok(Config::default())
}
