//! incidex - incident consolidation and KPI reporting
//!
//! Consolidates incident exports from several sources into one history-preserving document,
//! manages operator overrides, and reports KPIs over the effective (override-applied) view.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use incidex_common::config::{self, LoggingConfig, TomlConfig};
use incidex_common::fingerprint::fingerprint;
use incidex_common::models::{OverrideFields, Severity, Status};
use incidex_common::time;
use incidex_engine::services::override_layer;
use incidex_engine::workflow::{self, ConsolidationPipeline, EngineConfig};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for incidex
#[derive(Parser, Debug)]
#[command(name = "incidex")]
#[command(about = "Incident consolidation and KPI reporting")]
#[command(version)]
struct Args {
    /// Config file (default: INCIDEX_CONFIG, then user and system config locations)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Folder holding the consolidated document and overrides
    #[arg(short, long, value_name = "DIR")]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one consolidation over every configured source
    Consolidate,

    /// Report KPIs over the effective incident view
    Kpi {
        /// Reference date (default: today, UTC)
        #[arg(long, value_name = "YYYY-MM-DD")]
        today: Option<NaiveDate>,

        /// Trailing window in days (default: kpi.period_days)
        #[arg(long, allow_negative_numbers = true)]
        period_days: Option<i64>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Manage operator overrides
    Override {
        #[command(subcommand)]
        action: OverrideAction,
    },

    /// Print the global id for a source key
    Fingerprint { source_id: String, source_key: String },

    /// List recorded runs, oldest first
    Runs,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write the effective configuration to a TOML file
    Init {
        /// Target file (default: --config, else the user config location)
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum OverrideAction {
    /// Set (or extend) the override for an incident
    Set {
        global_id: String,
        #[arg(long)]
        severity: Option<Severity>,
        #[arg(long)]
        status: Option<Status>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        product: Option<String>,
        #[arg(long)]
        feature: Option<String>,
        #[arg(long, value_name = "YYYY-MM-DD")]
        incident_date: Option<NaiveDate>,
        #[arg(long)]
        clients: Option<u32>,
    },

    /// Remove the override for an incident
    Clear { global_id: String },

    /// Show every stored override
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = config::resolve_config_path(args.config.as_deref());
    let toml_config = config::load_toml_config(config_path.as_deref())
        .context("Failed to load configuration")?;

    init_tracing(&toml_config.logging)?;

    info!(
        "Starting incidex v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    let root_folder = config::resolve_root_folder(
        args.root_folder.as_deref(),
        config::ROOT_FOLDER_ENV,
        toml_config.root_folder.as_deref(),
    );
    info!("Root folder: {}", root_folder.display());

    let engine_config = EngineConfig::from_toml(&toml_config, root_folder.clone());

    match args.command {
        Command::Consolidate => consolidate(engine_config).await,
        Command::Kpi {
            today,
            period_days,
            format,
        } => kpi(&engine_config, today, period_days, format).await,
        Command::Override { action } => override_command(&engine_config, action).await,
        Command::Fingerprint {
            source_id,
            source_key,
        } => {
            println!("{}", fingerprint(&source_id, &source_key));
            Ok(())
        }
        Command::Runs => runs(&engine_config).await,
        Command::Config {
            action: ConfigAction::Init { path, force },
        } => {
            let target = path
                .or(args.config)
                .or_else(config::user_config_path)
                .context("No config location available; pass a file path")?;
            let mut effective = toml_config;
            effective.root_folder = Some(root_folder);
            init_config(&effective, &target, force)?;
            println!("Wrote {}", target.display());
            Ok(())
        }
    }
}

/// RUST_LOG wins over `logging.level`; `logging.file` redirects output from stderr
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Write `config` to `target`, refusing to replace an existing file unless `force`
fn init_config(config: &TomlConfig, target: &Path, force: bool) -> Result<()> {
    if target.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to replace it)",
            target.display()
        );
    }
    config::write_toml_config(config, target)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    info!(path = %target.display(), "Wrote configuration");
    Ok(())
}

async fn consolidate(engine_config: EngineConfig) -> Result<()> {
    if engine_config.sources.is_empty() {
        warn!("No sources configured; the run will only record itself");
    }

    let pipeline = ConsolidationPipeline::new(engine_config);
    match pipeline.run().await {
        Ok(summary) => {
            println!("{}", summary.display_string());
            Ok(())
        }
        Err(e) => {
            error!(
                run_id = e.run_id().unwrap_or("-"),
                stage = e.stage(),
                "Consolidation failed: {}",
                e
            );
            Err(e.into())
        }
    }
}

async fn kpi(
    engine_config: &EngineConfig,
    today: Option<NaiveDate>,
    period_days: Option<i64>,
    format: OutputFormat,
) -> Result<()> {
    let mut kpi_config = engine_config.kpi;
    if let Some(period_days) = period_days {
        kpi_config.period_days = period_days;
    }

    let today = today.unwrap_or_else(time::today);
    let result = workflow::report_with(engine_config, kpi_config, today).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print!("{}", result.render_text()),
    }
    Ok(())
}

async fn override_command(engine_config: &EngineConfig, action: OverrideAction) -> Result<()> {
    let store = engine_config.override_store();
    debug!(path = %store.path().display(), "Overrides file");

    match action {
        OverrideAction::Set {
            global_id,
            severity,
            status,
            description,
            product,
            feature,
            incident_date,
            clients,
        } => {
            let fields = OverrideFields {
                severity,
                status,
                description,
                product,
                feature,
                incident_date,
                clients_affected: clients,
            };
            let set = store.set(&global_id, fields).await?;

            let document = engine_config.document_store().load_snapshot().await?;
            if !document.incidents.contains_key(&global_id) {
                warn!(global_id = %global_id, "Override stored for an incident not in the document");
            }
            if let Some(entry) = set.get(&global_id) {
                println!("{}", serde_json::to_string_pretty(entry)?);
            }
        }
        OverrideAction::Clear { global_id } => {
            if store.clear(&global_id).await? {
                println!("Cleared override for {}", global_id);
            } else {
                println!("No override stored for {}", global_id);
            }
        }
        OverrideAction::List => {
            let set = store.load().await;
            let document = engine_config.document_store().load_snapshot().await?;
            for orphan in override_layer::orphaned(&document, &set) {
                warn!(global_id = orphan, "Override targets an incident not in the document");
            }
            println!("{}", serde_json::to_string_pretty(&set)?);
        }
    }
    Ok(())
}

async fn runs(engine_config: &EngineConfig) -> Result<()> {
    let store = engine_config.document_store();
    debug!(path = %store.path().display(), "Listing runs");
    let document = store.load_snapshot().await?;
    if document.runs.is_empty() {
        println!("No runs recorded");
        return Ok(());
    }

    for run in &document.runs {
        println!("{}  {}", run.run_id, run.started_at.to_rfc3339());
        for source in &run.sources {
            println!(
                "    {:<16} {} {}",
                source.source_id,
                source.fingerprint.as_deref().unwrap_or("-"),
                source.asset
            );
        }
    }
    Ok(())
}
