// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pruefwerk: document inspection for QR codes, signatures and stamps.
//
// Entry point. Initialises logging, loads the configuration and detector
// models, runs one inspection job and prints its JSON report.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pruefwerk_core::error::{InspectError, Result};
use pruefwerk_core::human_errors::humanize_error;
use pruefwerk_core::InspectorConfig;
use pruefwerk_detect::DetectorEnsemble;
use pruefwerk_document::{PageRenderer, Rasterizer};
use pruefwerk_inspect::{InspectionService, Inspector};
use serde::Serialize;
use tracing::info;

/// The pruefwerk CLI.
#[derive(Parser)]
#[command(name = "pruefwerk")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// JSON configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect one PDF and write annotated artifacts.
    Analyze(JobArgs),
    /// Inspect every PDF inside a ZIP archive.
    Batch(JobArgs),
    /// Show the page sizes a PDF would be rasterized to.
    Plan {
        /// PDF to examine.
        input: PathBuf,
    },
    /// Print the effective configuration as JSON.
    PrintConfig,
}

#[derive(clap::Args)]
struct JobArgs {
    /// Input file.
    input: PathBuf,

    /// Write the JSON report here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let human = humanize_error(&err);
            tracing::debug!(%err, "Command failed");
            eprintln!("error: {}", human.message);
            eprintln!("hint: {}", human.suggestion);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::PrintConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Plan { input } => {
            let bytes = read_input(&input)?;
            let rasterizer = Rasterizer::new(config.raster, renderer(&config));
            for target in rasterizer.plan(&bytes)? {
                println!(
                    "page {}: {}x{} px (scale {:.3})",
                    target.page_index, target.width, target.height, target.scale
                );
            }
            Ok(())
        }
        Commands::Analyze(args) => {
            let service = service(&config)?;
            let bytes = read_input(&args.input)?;
            let report = service.analyze(file_name(&args.input), bytes).await?;
            info!(job_id = %report.job_id, pages = report.pages.len(), "Analysis complete");
            emit(&report, args.output.as_deref())
        }
        Commands::Batch(args) => {
            let service = service(&config)?;
            let bytes = read_input(&args.input)?;
            let report = service.batch_analyze(file_name(&args.input), bytes).await?;
            info!(
                job_id = %report.job_id,
                files_processed = report.files_processed,
                "Batch complete"
            );
            emit(&report, args.output.as_deref())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<InspectorConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            InspectorConfig::from_file(path)
        }
        None => {
            let config = InspectorConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|err| {
        InspectError::InputFormat(format!("Cannot read {}: {err}", path.display()))
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn emit<T: Serialize>(report: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => {
            std::fs::write(path, json).map_err(|err| {
                InspectError::ResultPersistence(format!("cannot write {}: {err}", path.display()))
            })?;
            info!(path = %path.display(), "Report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn service(config: &InspectorConfig) -> Result<InspectionService> {
    let ensemble = Arc::new(load_ensemble(config)?);
    let inspector = Inspector::from_config(config, ensemble, renderer(config));
    Ok(InspectionService::new(
        Arc::new(inspector),
        config.limits.max_concurrent_jobs,
    ))
}

#[cfg(feature = "yolo")]
fn load_ensemble(config: &InspectorConfig) -> Result<DetectorEnsemble> {
    DetectorEnsemble::from_config(config)
}

#[cfg(not(feature = "yolo"))]
fn load_ensemble(_config: &InspectorConfig) -> Result<DetectorEnsemble> {
    Err(InspectError::Config(
        "no detector backend compiled in; rebuild with `--features yolo`".into(),
    ))
}

#[cfg(feature = "pdfium")]
fn renderer(config: &InspectorConfig) -> Arc<dyn PageRenderer> {
    Arc::new(pruefwerk_document::PdfiumRenderer::new(
        config.pdfium_library_path.clone(),
    ))
}

#[cfg(not(feature = "pdfium"))]
fn renderer(config: &InspectorConfig) -> Arc<dyn PageRenderer> {
    Arc::new(pruefwerk_document::ScanPageRenderer::with_image_limit(
        config.raster.max_image_pixels,
    ))
}
