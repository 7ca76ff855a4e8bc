//! Solar Advisor server
//!
//! Loads the operator settings and the catalog directory, then serves the
//! recommendation and advisory endpoints until Ctrl+C.
//!
//! ## Usage
//!
//! ```text
//! solar-advisor                                  # serve with ./solar_advisor.toml or defaults
//! solar-advisor --config prod.toml serve
//! solar-advisor check --catalog-dir ./solar_config
//! solar-advisor recommend --input roof.json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use solar_advisor::api::{create_app, AppState};
use solar_advisor::config::{AppSettings, Catalog};
use solar_advisor::llm::{create_backend, GenerationPolicy};

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "solar-advisor")]
#[command(about = "Rooftop solar economics estimator with LLM advisories")]
#[command(version)]
struct CliArgs {
    /// Settings file (default: $SOLAR_ADVISOR_CONFIG, then ./solar_advisor.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the server address (default: "0.0.0.0:5001")
    #[arg(short, long, value_name = "HOST:PORT")]
    addr: Option<String>,

    /// Override the catalog directory
    #[arg(long, value_name = "DIR")]
    catalog_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, env = "SOLAR_ADVISOR_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run the HTTP server (default)
    Serve,

    /// Load settings and catalog, report warnings, and exit
    Check,

    /// Run one recommendation request from a JSON file and print the result
    Recommend {
        /// Request body, e.g. {"roof_area_m2": 30, "coverage_rate": 0.8, "address": "台南市"}
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

/// Settings after file, environment and CLI overrides, in that order.
fn resolve_settings(args: &CliArgs) -> Result<AppSettings> {
    let mut settings =
        AppSettings::load(args.config.as_deref()).context("Failed to load settings")?;
    settings.apply_env_overrides();
    if let Some(addr) = &args.addr {
        settings.server.addr.clone_from(addr);
    }
    if let Some(dir) = &args.catalog_dir {
        settings.catalog.dir.clone_from(dir);
    }
    settings.validate().context("Invalid settings after overrides")?;
    Ok(settings)
}

fn load_catalog(dir: &Path) -> Result<Arc<Catalog>> {
    let catalog = Catalog::load(dir)
        .with_context(|| format!("Failed to load catalog from {}", dir.display()))?;
    Ok(Arc::new(catalog))
}

// ============================================================================
// Subcommands
// ============================================================================

fn run_check(settings: &AppSettings) -> Result<()> {
    let catalog = load_catalog(&settings.catalog.dir)?;
    let warnings = catalog.warnings();
    info!(
        modules = catalog.modules().len(),
        formulas = catalog.formulas().len(),
        warnings = warnings.len(),
        "Catalog OK"
    );
    Ok(())
}

fn run_recommend(settings: &AppSettings, input: &Path) -> Result<()> {
    let catalog = load_catalog(&settings.catalog.dir)?;
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let body: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", input.display()))?;

    let recommendations = solar_advisor::recommend(&catalog, &body)?;
    let out = serde_json::to_string_pretty(&serde_json::json!({ "recommendations": recommendations }))?;
    println!("{out}");
    Ok(())
}

async fn run_server(settings: AppSettings) -> Result<()> {
    let catalog = load_catalog(&settings.catalog.dir)?;
    let llm = create_backend(&settings.llm).context("Failed to initialize LLM backend")?;
    let policy = GenerationPolicy::from(&settings.llm);
    let state = AppState::new(catalog, llm, policy);
    let app = create_app(state, &settings.server.cors_origins);

    let listener = tokio::net::TcpListener::bind(&settings.server.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.server.addr))?;
    info!("HTTP server listening on {}", settings.server.addr);

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
        })
        .await
        .context("HTTP server error")?;

    info!("Graceful shutdown complete");
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("warning: failed to read .env: {e}");
        }
    }

    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let settings = resolve_settings(&args)?;

    match &args.command {
        Some(SubCommand::Check) => run_check(&settings),
        Some(SubCommand::Recommend { input }) => run_recommend(&settings, input),
        Some(SubCommand::Serve) | None => {
            if settings.server.cors_origins.is_empty() {
                warn!("server.cors_origins is empty; allowing any origin");
            }
            run_server(settings).await
        }
    }
}
