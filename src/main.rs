//! VisiScan - visual health scanner for web pages
//!
//! Fetches a page, runs clarity, accessibility, readability, focus and
//! AI-vision analyzers over it and aggregates their output into a stored
//! report. Serves an HTTP API by default; `--url` runs a single scan and
//! writes a report file.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (invalid arguments, config, failed scan, etc.)

mod analysis;
mod api;
mod cli;
mod config;
mod error;
mod fetcher;
mod models;
mod orchestrator;
mod report;
mod store;

use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use models::{ScanReport, ScanRequest};
use orchestrator::{ScanOrchestrator, ScanPhase};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use store::{MemoryStore, ScanStore};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(&args, &config);

    info!("VisiScan v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let result = match args.url.clone() {
        Some(url) => run_once(&args, &config, url).await,
        None => run_server(&config).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .visiscan.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize timeouts, the vision service, history and more.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` wins over the verbosity flags when set.
fn init_logging(args: &Args, config: &Config) {
    let level = if config.general.verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Ignoring {}: {:#}", CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}

/// Open the configured scan store.
async fn open_store(config: &Config) -> Result<Arc<dyn ScanStore>> {
    let store = match config.store.path {
        Some(ref path) => {
            let store = MemoryStore::open(path.clone())
                .await
                .with_context(|| format!("Failed to open scan history {}", path.display()))?;
            if let Some(path) = store.path() {
                info!("Scan history: {}", path.display());
            }
            store
        }
        None => {
            debug!("Scan history is memory-only");
            MemoryStore::new()
        }
    };
    Ok(Arc::new(store))
}

fn build_orchestrator(config: &Config, store: Arc<dyn ScanStore>) -> Result<ScanOrchestrator> {
    let orchestrator = ScanOrchestrator::from_config(config, store)
        .context("Failed to initialize the page fetcher")?;

    let kinds: Vec<String> = orchestrator
        .analyzer_kinds()
        .iter()
        .map(ToString::to_string)
        .collect();
    debug!("Analyzers: {}", kinds.join(", "));

    match config.vision.ollama_url {
        Some(ref url) => info!("AI vision: {} via {}", config.vision.model, url),
        None => info!("AI vision: local baseline analysis"),
    }

    Ok(orchestrator)
}

/// Serve the HTTP API until interrupted.
async fn run_server(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let orchestrator = build_orchestrator(config, store)?;

    api::serve(&config.server.listen, api::AppState::new(orchestrator)).await
}

/// Scan one URL, write the report and print a summary.
async fn run_once(args: &Args, config: &Config, url: String) -> Result<()> {
    let start_time = Instant::now();

    let store = open_store(config).await?;
    let orchestrator = build_orchestrator(config, store)?;

    println!("🔎 Scanning {}", url);

    let spinner = if args.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    let (progress, mut phases) = watch::channel(ScanPhase::Pending);
    let watcher = {
        let spinner = spinner.clone();
        tokio::spawn(async move {
            while phases.changed().await.is_ok() {
                let phase = phases.borrow_and_update().to_string();
                spinner.set_message(phase);
            }
        })
    };

    let outcome = orchestrator
        .run_scan_observed(&ScanRequest { url }, &progress)
        .await;

    drop(progress);
    if let Err(e) = watcher.await {
        warn!("Progress watcher stopped: {}", e);
    }

    let report = match outcome {
        Ok(report) => {
            spinner.finish_with_message("done");
            report
        }
        Err(e) => {
            spinner.abandon_with_message("failed");
            return Err(e).context("Scan failed");
        }
    };

    // Generate and save the report
    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.general.output));

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    print_summary(&report, start_time.elapsed());
    println!(
        "\n✅ Scan complete! Report saved to: {}",
        output_path.display()
    );

    Ok(())
}

fn print_summary(report: &ScanReport, duration: Duration) {
    let fmt = |score: Option<f64>| score.map_or("n/a".to_string(), |s| format!("{:.0}", s));
    let scores = &report.scores;

    println!("\n📊 Visual Health Summary:");
    println!("   Overall: {:.1}", scores.overall());
    println!(
        "   - Clarity: {} | Accessibility: {} | Readability: {} | Focus: {}",
        fmt(scores.visual_clarity()),
        fmt(scores.accessibility()),
        fmt(scores.readability()),
        fmt(scores.focus_accuracy())
    );
    if let Some(ux) = scores.ux_score() {
        println!("   - UX (AI vision): {:.0}", ux);
    }
    println!("   Recommendations: {}", report.recommendations.len());
    println!("   Duration: {:.1}s", duration.as_secs_f64());
}
