//! # Prompt Relay CLI (`prelay`)
//!
//! ## Usage
//!
//! ```bash
//! prelay --config ./config/prelay.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `prelay init` | Create the state database and schema |
//! | `prelay key set <KEY>` | Validate an API key with the server and save it |
//! | `prelay key show` | Print the saved key (masked) |
//! | `prelay key check` | Validate the saved key |
//! | `prelay watch` | Watch workspace storage and relay new prompts |
//! | `prelay scan <DB>` | Extract prompts from one state database |
//! | `prelay status` | Show environment, paths, and relay history size |

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use prompt_relay::config::{self, Config};
use prompt_relay::extract::{extract_records, ExtractSettings};
use prompt_relay::ingest::Pipeline;
use prompt_relay::logging::{self, EventLog, TracingLog};
use prompt_relay::migrate;
use prompt_relay::session::Orchestrator;
use prompt_relay::store::{self, DedupStore, SettingsStore};
use prompt_relay::upload::{self, UploadClient};

/// Prompt Relay: forwards editor prompt history to a collector.
#[derive(Parser)]
#[command(
    name = "prelay",
    about = "Prompt Relay: watch editor state databases and relay new prompts",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Built-in defaults are used when the file does not exist.
    #[arg(long, global = true, default_value = "./config/prelay.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the state database. Safe to run repeatedly.
    Init,

    /// Manage the collector API key.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Watch workspace storage and relay new prompts until Ctrl-C.
    Watch {
        /// Override `[watch].root`.
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Run a single extraction pass over one state database.
    ///
    /// Prints the prompts found. With `--upload`, relays them instead.
    Scan {
        /// Path to the state database.
        path: PathBuf,

        /// Relay new prompts to the collector.
        #[arg(long)]
        upload: bool,
    },

    /// Show the active environment, paths, and relay history size.
    Status,
}

#[derive(Subcommand)]
enum KeyAction {
    /// Validate a key with the server, then save it.
    Set {
        key: String,
    },
    /// Print the saved key, masked.
    Show,
    /// Validate the saved key with the server.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;
    logging::init(&cfg.logging.level);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("State database initialized at {}.", cfg.store.path.display());
        }
        Commands::Key { action } => run_key(&cfg, action).await?,
        Commands::Watch { root } => {
            let root = root.unwrap_or_else(|| cfg.watch.root.clone());
            run_watch(&cfg, &root).await?;
        }
        Commands::Scan { path, upload } => run_scan(&cfg, &path, upload).await?,
        Commands::Status => run_status(&cfg).await?,
    }

    Ok(())
}

async fn run_key(cfg: &Config, action: KeyAction) -> Result<()> {
    let pool = store::open(cfg).await?;
    let settings = SettingsStore::new(pool.clone());
    let server_url = cfg.server.upload_url();

    match action {
        KeyAction::Set { key } => {
            let key = key.trim();
            if key.is_empty() {
                bail!("API key must not be empty");
            }
            upload::validate_api_key(key, &server_url, timeout(cfg))
                .await
                .context("API key validation failed")?;
            settings.save_api_key(key).await?;
            println!("API key saved.");
        }
        KeyAction::Show => match settings.load_api_key().await? {
            Some(key) => println!("Key: {}", mask_key(&key)),
            None => println!("Key: not set"),
        },
        KeyAction::Check => {
            let key = require_key(&settings).await?;
            upload::validate_api_key(&key, &server_url, timeout(cfg))
                .await
                .context("API key validation failed")?;
            println!("API key is valid.");
        }
    }

    pool.close().await;
    Ok(())
}

async fn run_watch(cfg: &Config, root: &Path) -> Result<()> {
    let log: Arc<dyn EventLog> = Arc::new(TracingLog);
    let pipeline = build_pipeline(cfg, log.clone()).await?;

    let orchestrator = Orchestrator::new(
        Arc::new(pipeline),
        &cfg.watch.target_file,
        cfg.watch.channel_capacity,
    );
    let session = orchestrator.start(root)?;
    let stop = session.stop_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    let result = session.wait().await;
    log.close()?;
    result?;
    Ok(())
}

async fn run_scan(cfg: &Config, path: &Path, upload: bool) -> Result<()> {
    let log: Arc<dyn EventLog> = Arc::new(TracingLog);

    if upload {
        let pipeline = build_pipeline(cfg, log).await?;
        let summary = pipeline
            .process_file(path, chrono::Utc::now().timestamp())
            .await;
        println!("scan {}", path.display());
        println!("  extracted: {}", summary.extracted);
        println!("  delivered: {}", summary.delivered);
        println!("  already sent: {}", summary.duplicates);
        println!("  failed: {}", summary.failed);
        println!("ok");
        return Ok(());
    }

    let settings = ExtractSettings::from(&cfg.watch);
    let extraction = extract_records(path, &settings, log.as_ref()).await?;

    println!("scan {} (dry-run)", path.display());
    println!("  workspace: {}", extraction.workspace);
    println!("  records: {}", extraction.records.len());
    for record in &extraction.records {
        println!("  [{}] {}", record.command_type, record.text);
    }
    println!("ok");
    Ok(())
}

async fn run_status(cfg: &Config) -> Result<()> {
    let pool = store::open(cfg).await?;
    let settings = SettingsStore::new(pool.clone());
    let dedup = DedupStore::new(pool.clone());

    println!("environment: {}", cfg.server.environment().label());
    println!("server: {}", cfg.server.upload_url());
    println!("watch root: {}", cfg.watch.root.display());
    println!("state db: {}", cfg.store.path.display());
    match settings.load_api_key().await? {
        Some(key) => println!("key: {}", mask_key(&key)),
        None => println!("key: not set"),
    }
    println!("relayed prompts: {}", dedup.count().await?);

    pool.close().await;
    Ok(())
}

/// Load and validate the saved key, then wire the relay pipeline.
async fn build_pipeline(cfg: &Config, log: Arc<dyn EventLog>) -> Result<Pipeline> {
    let pool = store::open(cfg).await?;
    let settings = SettingsStore::new(pool.clone());
    let api_key = require_key(&settings).await?;
    let server_url = cfg.server.upload_url();

    upload::validate_api_key(&api_key, &server_url, timeout(cfg))
        .await
        .context("API key validation failed")?;

    let uploader = UploadClient::new(&server_url, &api_key, timeout(cfg))?;
    Ok(Pipeline::new(
        DedupStore::new(pool),
        uploader,
        ExtractSettings::from(&cfg.watch),
        log,
    ))
}

async fn require_key(settings: &SettingsStore) -> Result<String> {
    settings
        .load_api_key()
        .await?
        .ok_or_else(|| anyhow::anyhow!("No API key saved. Run `prelay key set <KEY>` first."))
}

fn timeout(cfg: &Config) -> Duration {
    Duration::from_secs(cfg.server.timeout_secs)
}

fn mask_key(key: &str) -> String {
    match key.char_indices().nth(10) {
        Some((idx, _)) => format!("{}...", &key[..idx]),
        None => key.to_string(),
    }
}
