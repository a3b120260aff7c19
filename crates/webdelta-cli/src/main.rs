use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use webdelta_client::{ReqwestFetcher, parse_extractor};
use webdelta_core::traits::{CacheStorage, Extractor};
use webdelta_core::{CycleReport, Engine, EngineConfig, PollMode};
use webdelta_store::JsonFileStorage;

#[derive(Parser)]
#[command(name = "webdelta", version, about = "Watch web pages for changes")]
struct Cli {
    /// JSON file the cache is loaded from and flushed to
    #[arg(long, global = true, env = "WEBDELTA_CACHE_FILE")]
    cache_file: Option<PathBuf>,

    /// Extra fetch attempts when extraction finds nothing
    #[arg(long, global = true)]
    retry_limit: Option<u32>,

    /// Seconds to wait between polling cycles
    #[arg(long, global = true)]
    rate_limit_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print values that changed since the last run
    Check(TaskArgs),

    /// Print the current value of every registered page
    All(TaskArgs),

    /// Poll continuously and print changes until Ctrl-C
    Watch {
        #[command(flatten)]
        tasks: TaskArgs,

        /// Emit the full cached snapshot before the first cycle
        #[arg(long, default_value_t = false)]
        all: bool,
    },

    /// Delete the cache file
    Clear,
}

#[derive(Args)]
struct TaskArgs {
    /// Page to watch (repeatable)
    #[arg(short, long = "url", required = true)]
    urls: Vec<String>,

    /// Extractor: body, sha256 or json:<pointer>
    #[arg(short, long, default_value = "body")]
    extractor: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("webdelta=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    if matches!(cli.command, Commands::Clear) && config.cache_file.is_none() {
        anyhow::bail!("Nothing to clear: pass --cache-file or set WEBDELTA_CACHE_FILE");
    }

    let fetcher = match config.fetch_timeout {
        Some(timeout) => ReqwestFetcher::with_timeout(timeout),
        None => ReqwestFetcher::new(),
    }
    .context("Failed to create HTTP client")?;

    match JsonFileStorage::from_config(&config) {
        Some(storage) => {
            tracing::debug!(path = %storage.path().display(), "Using cache file");
            run(Engine::with_storage(fetcher, storage, config), cli.command).await
        }
        None => run(Engine::new(fetcher, config), cli.command).await,
    }
}

/// Environment first, then command-line flags on top.
fn build_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = EngineConfig::from_env().context("Invalid WEBDELTA_* environment")?;

    if let Some(path) = &cli.cache_file {
        config = config.with_cache_file(path.clone());
    }
    if let Some(limit) = cli.retry_limit {
        config = config.with_retry_limit(limit);
    }
    if let Some(secs) = cli.rate_limit_secs {
        config = config.with_rate_limit_duration(Duration::from_secs(secs));
    }

    Ok(config)
}

async fn run<S: CacheStorage>(engine: Engine<ReqwestFetcher, S>, command: Commands) -> Result<()> {
    match command {
        Commands::Check(tasks) => {
            load(&engine).await?;
            register(&engine, &tasks)?;
            print_report(engine.get_changes().await?)
        }
        Commands::All(tasks) => {
            load(&engine).await?;
            register(&engine, &tasks)?;
            print_report(engine.get_all().await?)
        }
        Commands::Watch { tasks, all } => {
            load(&engine).await?;
            register(&engine, &tasks)?;
            let mode = if all {
                PollMode::All
            } else {
                PollMode::ChangesOnly
            };
            cmd_watch(&engine, mode).await
        }
        // Never reads the old cache, so a corrupt file can still be removed.
        Commands::Clear => {
            engine.clear().await.context("Failed to clear cache")?;
            tracing::info!("Cache cleared");
            Ok(())
        }
    }
}

async fn load<S: CacheStorage>(engine: &Engine<ReqwestFetcher, S>) -> Result<()> {
    engine.load().await.context("Failed to load cache")
}

fn register<S: CacheStorage>(engine: &Engine<ReqwestFetcher, S>, tasks: &TaskArgs) -> Result<()> {
    let extractor: Arc<dyn Extractor> = parse_extractor(&tasks.extractor)?;
    for url in &tasks.urls {
        engine.register(url.clone(), Arc::clone(&extractor));
    }
    Ok(())
}

/// Results go to stdout as JSON lines, failures to stderr.
fn print_report(report: CycleReport) -> Result<()> {
    for failure in &report.failures {
        eprintln!(
            "failed: {} [{}]: {}",
            failure.url, failure.extractor, failure.error
        );
    }

    for result in &report.results {
        println!("{}", serde_json::to_string(result)?);
    }

    if report.has_failures() {
        anyhow::bail!("{} of the registered pages failed", report.failures.len());
    }
    Ok(())
}

async fn cmd_watch<S: CacheStorage>(engine: &Engine<ReqwestFetcher, S>, mode: PollMode) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = engine.start(mode, tx)?;

    tracing::info!(
        tasks = engine.task_count(),
        interval_secs = engine.rate_limit().as_secs(),
        "Watching, press Ctrl-C to stop"
    );

    loop {
        tokio::select! {
            item = rx.recv() => match item {
                Some((url, value)) => {
                    println!("{}", serde_json::json!({ "url": url, "value": value }));
                }
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Stopping");
                break;
            }
        }
    }

    handle.stop();
    handle.join().await?;
    Ok(())
}
