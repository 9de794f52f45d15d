//! CLI entry point for consearch.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use consearch_core::{
    IdentifierDetector, InputType, ResolutionService, ResolveReport, ResolverRegistry, Settings, WorkKind,
    with_resource,
};
use serde::Serialize;
use tracing::{debug, error, info};

mod app_config;
mod cli;

use cli::Args;

/// Exit status when the lookup ran but found nothing.
const EXIT_NOT_FOUND: u8 = 1;
/// Exit status for configuration and other setup failures.
const EXIT_USAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %format!("{err:#}"), "consearch failed");
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_USAGE)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let query = args.query_text();

    if args.detect_only {
        let candidates = IdentifierDetector::new().detect_all(&query);
        print_json(&candidates)?;
        return Ok(exit_code(!candidates.is_empty()));
    }

    let settings = build_settings(&args)?;
    let registry = Arc::new(ResolverRegistry::from_settings(&settings));
    let service = ResolutionService::from_settings(Arc::clone(&registry), &settings);

    let service = &service;
    let query = query.as_str();
    let kind = args.kind.map(WorkKind::from);
    let input_type = args.input_type;
    let report = with_resource(registry, move |_registry| async move {
        resolve(service, kind, query, input_type).await
    })
    .await;

    info!(
        success = report.success(),
        sources = report.result.sources_tried.len(),
        duration_ms = report.duration_ms,
        "lookup complete"
    );
    print_json(&report)?;
    Ok(exit_code(report.success()))
}

async fn resolve(
    service: &ResolutionService,
    kind: Option<WorkKind>,
    query: &str,
    input_type: Option<InputType>,
) -> ResolveReport {
    match kind {
        Some(WorkKind::Book) => service.resolve_book(query, input_type).await,
        Some(WorkKind::Paper) => service.resolve_paper(query, input_type).await,
        None => service.resolve(query, input_type).await,
    }
}

/// File config, then `CONSEARCH_*` variables, then command-line flags.
fn build_settings(args: &Args) -> Result<Settings> {
    let loaded = app_config::load_config(args.config.as_deref())?;
    if loaded.loaded_from_file {
        debug!(path = ?loaded.path, "loaded config file");
    }

    let mut file_config = loaded.config;
    file_config
        .apply_env_overrides(|name| std::env::var(name).ok())
        .context("Invalid environment configuration")?;

    let mut settings = file_config.to_settings();
    if args.all_sources || args.parallel {
        settings.fallback = settings
            .fallback
            .all_sources(args.parallel || settings.fallback.parallel_execution);
    }
    if let Some(secs) = args.timeout {
        settings.fallback.total_timeout = Duration::from_secs(secs);
    }
    if let Some(score) = args.min_reliability {
        settings.fallback.min_reliability_score = score;
    }
    Ok(settings)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}

fn exit_code(found: bool) -> ExitCode {
    if found {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_NOT_FOUND)
    }
}
