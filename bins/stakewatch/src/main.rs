//! stakewatch — Over-selling detection for validator score vectors.
//!
//! Replays recorded scoring cycles through the detection engine, inspects the
//! persisted stake history of a single uid, and runs history cleanup.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use stakewatch_core::traits::{HistoryBackend, MemoryBackend};
use stakewatch_core::types::{Uid, unix_now};
use stakewatch_detect::Engine;
use stakewatch_node::{BackendKind, LogFormat, NodeConfig, open_backend, read_cycles};

/// Stakewatch command-line interface.
#[derive(Parser, Debug)]
#[command(name = "stakewatch", version, about = "Stake over-selling detection and penalties")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Config file (TOML, JSON or YAML). Missing files are ignored.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for stake history
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// History backend ("json" or "rocksdb")
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Feed recorded cycles through the engine, one JSON report per line.
    Replay(ReplayArgs),
    /// Show the stored history, protection and analysis of one uid.
    Inspect(InspectArgs),
    /// Run age-based history cleanup and save the result.
    Cleanup(CleanupArgs),
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// JSON array of {block, observed_at, entries, scores} cycles
    #[arg(short, long)]
    input: PathBuf,

    /// Start from the stored history but never write it back
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    #[arg(long)]
    uid: Uid,

    /// Block height to evaluate at (default: last recorded block)
    #[arg(long)]
    block: Option<u64>,
}

#[derive(Args, Debug)]
struct CleanupArgs {
    /// Reference unix time in seconds (default: now)
    #[arg(long)]
    now: Option<f64>,
}

impl GlobalArgs {
    /// Load the layered config and apply command-line overrides.
    fn into_config(self) -> Result<NodeConfig> {
        let mut config = NodeConfig::load(self.config.as_deref()).context("failed to load configuration")?;
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.global.into_config()?;

    init_logging(&config.log_level, config.log_format);

    info!("Stakewatch v{}", env!("CARGO_PKG_VERSION"));
    info!(data_dir = %config.data_dir.display(), netuid = config.netuid, backend = %config.backend, "configuration");

    match cli.command {
        Commands::Replay(args) => replay(&config, args),
        Commands::Inspect(args) => inspect(&config, args),
        Commands::Cleanup(args) => cleanup(&config, args),
    }
}

fn open_engine(config: &NodeConfig) -> Result<Engine<Box<dyn HistoryBackend>>> {
    let backend = open_backend(config).with_context(|| format!("failed to open {} backend", config.backend))?;
    Engine::open(config.engine.clone(), backend).context("invalid engine configuration")
}

fn replay(config: &NodeConfig, args: ReplayArgs) -> Result<()> {
    let cycles = read_cycles(&args.input).with_context(|| format!("failed to read {}", args.input.display()))?;

    let mut engine = if args.dry_run {
        let mut stored = open_backend(config).with_context(|| format!("failed to open {} backend", config.backend))?;
        let histories = stored.load().unwrap_or_else(|e| {
            warn!(error = %e, "failed to load stored history, replaying from empty");
            Default::default()
        });
        let backend: Box<dyn HistoryBackend> = Box::new(MemoryBackend::with_histories(histories));
        Engine::open(config.engine.clone(), backend).context("invalid engine configuration")?
    } else {
        open_engine(config)?
    };

    let mut skipped = 0;
    for cycle in &cycles {
        skipped += cycle.skipped.len();
        let report = engine.run_cycle(&cycle.snapshot, &cycle.scores);
        println!("{}", serde_json::to_string(&report)?);
    }

    if !args.dry_run {
        engine.flush().context("failed to save stake history")?;
    }
    let summary = engine.penalty_summary();
    info!(
        cycles = cycles.len(),
        skipped_inputs = skipped,
        active_penalties = summary.active_penalties,
        tracked = summary.tracked_entities,
        "replay complete"
    );
    Ok(())
}

fn inspect(config: &NodeConfig, args: InspectArgs) -> Result<()> {
    let engine = open_engine(config)?;
    let history = engine.history(args.uid).unwrap_or_default();
    let block = args
        .block
        .or_else(|| history.last().map(|s| s.block))
        .unwrap_or_default();

    let analysis = match engine.analyze(args.uid, block) {
        Ok(a) => serde_json::to_value(a)?,
        Err(e) => json!({ "unavailable": e.to_string() }),
    };
    let out = json!({
        "uid": args.uid,
        "block": block,
        "snapshots": history.len(),
        "history": history,
        "protection": engine.protection(args.uid, block),
        "analysis": analysis,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn cleanup(config: &NodeConfig, args: CleanupArgs) -> Result<()> {
    let mut engine = open_engine(config)?;
    let report = engine.cleanup(args.now.unwrap_or_else(unix_now));
    engine.flush().context("failed to save stake history")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Logs go to stderr so stdout stays machine-readable. `RUST_LOG` overrides
/// `level_str` when set.
fn init_logging(level_str: &str, format: LogFormat) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init(),
    }
}
