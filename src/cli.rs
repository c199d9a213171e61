//! Command-line surface: `serve`, `import`, `replay`, `normalize`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use telemon_api::AppState;
use telemon_core::capture::{import_capture, CaptureFile, ImportReport};
use telemon_core::config::Config;
use telemon_core::store::Store;
use telemon_core::timestamp::resolve;
use telemon_replay::{ReplayOptions, ReplayOrder, DEFAULT_PATH};

#[derive(Debug, Parser)]
#[command(
    name = "telemon",
    version,
    about = "Telemetry ingestion API with tolerant timestamp normalisation"
)]
pub struct Cli {
    /// Log at debug level (RUST_LOG still wins when set).
    #[arg(long, global = true)]
    pub debug: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP ingestion API.
    Serve(ServeArgs),
    /// Load a capture file into the database.
    Import(ImportArgs),
    /// POST the records of a capture file to a running API.
    Replay(ReplayArgs),
    /// Show how timestamps would be normalised.
    Normalize {
        #[arg(required = true)]
        inputs: Vec<String>,
    },
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    /// Config file (default: $XDG_CONFIG_HOME/telemon/config.toml if present).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// SQLite database path.
    #[arg(long, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Label stored with every row and reported in responses.
    #[arg(long)]
    pub api_label: Option<String>,
}

impl StoreArgs {
    fn load(&self) -> anyhow::Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(path) = &self.database {
            config.database.path = path.clone();
        }
        if let Some(label) = &self.api_label {
            config.server.api_label = label.clone();
        }
        Ok(config)
    }
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Listen address, e.g. 127.0.0.1:8000.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Capture file written by a collection run.
    pub file: PathBuf,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Capture file whose `data` records are sent.
    pub file: PathBuf,

    /// Base URL of the API, e.g. http://127.0.0.1:8000.
    #[arg(long)]
    pub target: String,

    #[arg(long, default_value = DEFAULT_PATH)]
    pub path: String,

    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Total requests (default: one per record).
    #[arg(long)]
    pub requests: Option<usize>,

    /// `shared`, `per-worker` or `random`.
    #[arg(long, default_value = "shared")]
    pub order: ReplayOrder,

    /// Seed for `--order random`, for repeatable runs.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Send bare records instead of the phase envelope.
    #[arg(long)]
    pub no_envelope: bool,

    /// Pause between requests of one worker.
    #[arg(long, default_value_t = 0)]
    pub delay_ms: u64,

    /// Envelope phase (default: the capture's).
    #[arg(long)]
    pub phase: Option<i64>,
}

impl ReplayArgs {
    pub fn options(&self) -> ReplayOptions {
        ReplayOptions {
            target: self.target.clone(),
            path: self.path.clone(),
            workers: self.workers,
            requests: self.requests,
            order: self.order,
            envelope: !self.no_envelope,
            delay: Duration::from_millis(self.delay_ms),
            phase: self.phase,
            seed: self.seed,
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Import(args) => {
            let report = tokio::task::spawn_blocking(move || import(&args)).await??;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Replay(args) => {
            let capture = CaptureFile::load(&args.file)?;
            let report = telemon_replay::replay_capture(&capture, &args.options()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Normalize { inputs } => normalize(&inputs),
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = args.store.load()?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let store = Store::open(&config.database.path)
        .with_context(|| format!("opening {}", config.database.path.display()))?;
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("listening on {}", config.server.bind))?;

    telemon_api::serve(listener, AppState::new(store, &config), shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

/// Open the configured store and import `args.file` into it.
pub fn import(args: &ImportArgs) -> anyhow::Result<ImportReport> {
    let config = args.store.load()?;
    let capture = CaptureFile::load(&args.file)?;
    let store = Store::open(&config.database.path)
        .with_context(|| format!("opening {}", config.database.path.display()))?;
    Ok(import_capture(
        &store,
        &capture,
        config.ingest.policy(),
        &config.server.api_label,
    )?)
}

fn normalize(inputs: &[String]) -> anyhow::Result<()> {
    let mut failed = 0;
    for input in inputs {
        match resolve(input) {
            Ok(resolved) => println!("{input}\t{}\t{}", resolved.strategy, resolved.timestamp),
            Err(err) => {
                failed += 1;
                eprintln!("{err}");
            }
        }
    }
    anyhow::ensure!(failed == 0, "{failed} of {} inputs could not be normalised", inputs.len());
    Ok(())
}
