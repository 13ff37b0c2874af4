//! Pipelab CLI: run the pipeline, compare its two forms, manage fixtures.
//!
//! Commands:
//! - `run` evaluate every node, print a summary, optionally export CSV
//! - `graph` print the Graphviz source of the pipeline up to a node
//! - `compare` check that the eager and lazy pipelines call `get_signals` alike
//! - `cache status|warm|clear` inspect or manage cached pipeline fixtures
//! - `snapshot regenerate|check` manage the non-regression file

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use pipelab_core::library;
use pipelab_core::symbols::Registry;
use pipelab_runner::cache::{CachePolicy, Freshness, PipelineCache};
use pipelab_runner::export::{export_pipeline_csv, generate_summary};
use pipelab_runner::snapshot::{check_all, regenerate, Regeneration, Snapshot};
use pipelab_runner::{compare_signal_arguments, full_pipeline, PipelineConfig, PipelineParams, ProviderKind};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "pipelab",
    about = "Pipelab CLI: market-data pipeline with argument interception and non-regression fixtures"
)]
struct Cli {
    /// Path to a TOML config file. Defaults to the reference run.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data provider: yahoo, synthetic or fixture. Overrides the config file.
    #[arg(long, global = true)]
    provider: Option<ProviderKind>,

    /// Tickers, comma separated. Overrides the config file.
    #[arg(long, global = true, value_delimiter = ',')]
    tickers: Option<Vec<String>>,

    /// Start date (YYYY-MM-DD). Overrides the config file.
    #[arg(long, global = true)]
    start: Option<String>,

    /// End date (YYYY-MM-DD). Overrides the config file.
    #[arg(long, global = true)]
    end: Option<String>,

    /// Log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every pipeline node and print a summary.
    Run {
        /// Write one CSV per frame into this directory.
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },
    /// Print the pipeline graph up to a node as Graphviz source.
    Graph {
        #[arg(long, default_value = "signals")]
        node: String,

        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Compare the arguments the eager and lazy pipelines pass to get_signals.
    Compare,
    /// Cached pipeline fixtures.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Non-regression snapshot file.
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List worker directories with their parameters and age.
    Status,
    /// Evaluate and store the pipeline for one worker unless it is fresh.
    Warm {
        #[arg(long, default_value = "master")]
        worker: String,

        /// Regenerate even when the cache is fresh.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Remove every worker directory.
    Clear,
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// Generate the non-regression file if it does not exist.
    Regenerate {
        /// Snapshot path. Defaults to the config's snapshot path.
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Re-evaluate every node on stored inputs and report changes.
    Check {
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = load_config(&cli)?;
    match cli.command {
        Commands::Run { export_dir } => run_pipeline(&config, export_dir.as_deref()),
        Commands::Graph { node, output } => run_graph(&config, &node, output.as_deref()),
        Commands::Compare => run_compare(&config),
        Commands::Cache { action } => match action {
            CacheAction::Status => run_cache_status(&config),
            CacheAction::Warm { worker, force } => run_cache_warm(&config, &worker, force),
            CacheAction::Clear => run_cache_clear(&config),
        },
        Commands::Snapshot { action } => match action {
            SnapshotAction::Regenerate { path } => {
                run_snapshot_regenerate(&config, &snapshot_path(&config, path))
            }
            SnapshotAction::Check { path } => run_snapshot_check(&config, &snapshot_path(&config, path)),
        },
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to init logging: {e}"))?;

    Ok(())
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(provider) = cli.provider {
        config.provider = provider;
    }
    if let Some(tickers) = &cli.tickers {
        config.tickers = tickers.clone();
    }
    if let Some(start) = cli.start.as_deref() {
        config.start_date = parse_date(start)?;
    }
    if let Some(end) = cli.end.as_deref() {
        config.end_date = parse_date(end)?;
    }
    config.params().validate()?;
    tracing::debug!(
        provider = %config.provider,
        tickers = config.tickers.len(),
        start = %config.start_date,
        end = %config.end_date,
        "configuration loaded"
    );
    Ok(config)
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

fn snapshot_path(config: &PipelineConfig, path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| config.snapshot.path.clone())
}

fn registry(config: &PipelineConfig) -> Result<Registry> {
    let registry = Registry::new();
    library::install(&registry, config.provider.build()?)?;
    Ok(registry)
}

fn run_pipeline(config: &PipelineConfig, export_dir: Option<&Path>) -> Result<()> {
    let registry = registry(config)?;
    let evaluated = full_pipeline(&registry, &config.params())?.compute_all()?;

    print_params(&config.params(), config.provider);
    println!("{}", generate_summary(&evaluated));

    if let Some(dir) = export_dir {
        let written = export_pipeline_csv(&evaluated, dir)?;
        println!("Exported {} file(s) to {}", written.len(), dir.display());
    }
    Ok(())
}

fn run_graph(config: &PipelineConfig, node: &str, output: Option<&Path>) -> Result<()> {
    let registry = registry(config)?;
    let dot = full_pipeline(&registry, &config.params())?.to_dot(node)?;
    match output {
        Some(path) => {
            std::fs::write(path, dot).with_context(|| format!("writing {}", path.display()))?;
            println!("Graph written to {}", path.display());
        }
        None => print!("{dot}"),
    }
    Ok(())
}

fn run_compare(config: &PipelineConfig) -> Result<()> {
    let registry = registry(config)?;
    let differences = compare_signal_arguments(&registry, &config.params())?;
    if differences.is_empty() {
        println!("get_signals receives the same arguments from both pipelines.");
        return Ok(());
    }
    for diff in &differences {
        println!("  {diff}");
    }
    bail!("{} argument difference(s) between the eager and lazy pipelines", differences.len())
}

fn cache(config: &PipelineConfig, force: bool) -> PipelineCache {
    let env = CachePolicy::from_env();
    let policy = CachePolicy {
        max_age: config.cache.max_age(),
        force_regenerate: force || env.force_regenerate,
    };
    PipelineCache::new(config.cache.root(), policy)
}

fn run_cache_status(config: &PipelineConfig) -> Result<()> {
    let cache = cache(config, false);
    let entries = cache.status()?;
    if entries.is_empty() {
        println!("Cache is empty: {}", cache.root().display());
        return Ok(());
    }

    let params = config.params();
    println!("Cache: {}", cache.root().display());
    println!();
    println!("{:<12} {:<16} {:<25} {:>10}", "Worker", "State", "Period", "Age");
    println!("{}", "-".repeat(66));
    for entry in &entries {
        let state = freshness_label(&cache.freshness(&entry.dir, &params));
        let (period, age) = match &entry.meta {
            Some(meta) => (
                format!("{} to {}", meta.params.start_date, meta.params.end_date),
                format_age(meta.age().as_secs()),
            ),
            None => ("(no meta)".into(), "-".into()),
        };
        println!("{:<12} {:<16} {:<25} {:>10}", entry.worker_id, state, period, age);
    }
    Ok(())
}

fn run_cache_warm(config: &PipelineConfig, worker: &str, force: bool) -> Result<()> {
    let registry = registry(config)?;
    let pipeline = full_pipeline(&registry, &config.params())?;
    let dir = cache(config, force).ensure(&pipeline, worker)?;
    println!("Cached pipeline: {}", dir.display());
    Ok(())
}

fn run_cache_clear(config: &PipelineConfig) -> Result<()> {
    let cache = cache(config, false);
    let removed = cache.clear()?;
    let noun = if removed == 1 { "directory" } else { "directories" };
    println!("Removed {removed} worker {noun} from {}", cache.root().display());
    Ok(())
}

fn run_snapshot_regenerate(config: &PipelineConfig, path: &Path) -> Result<()> {
    let registry = registry(config)?;
    let pipeline = full_pipeline(&registry, &config.params())?;
    match regenerate(&pipeline, path)? {
        Regeneration::AlreadyPresent(path) => {
            println!("Non-regression data already present at {}; delete it to regenerate.", path.display())
        }
        Regeneration::Regenerated(path) => {
            println!("Non-regression data written to {}", path.display())
        }
    }
    Ok(())
}

fn run_snapshot_check(config: &PipelineConfig, path: &Path) -> Result<()> {
    let snapshot = Snapshot::load(path)?;
    let registry = registry(config)?;
    // The stored parameters decide what the pipeline computes.
    let pipeline = full_pipeline(&registry, snapshot.params())?;

    let mut failures = 0;
    for (node, result) in check_all(&pipeline, &snapshot) {
        match result {
            Ok(()) => println!("ok       {node}"),
            Err(err) => {
                failures += 1;
                println!("CHANGED  {node}");
                eprintln!("{err}");
            }
        }
    }
    if failures > 0 {
        bail!("{failures} node(s) differ from {}", path.display());
    }
    Ok(())
}

fn print_params(params: &PipelineParams, provider: ProviderKind) {
    println!();
    println!("=== Pipeline ===");
    println!("Tickers:  {}", params.tickers.join(", "));
    println!("Period:   {} to {}", params.start_date, params.end_date);
    println!("Provider: {provider}");
    println!();
}

fn freshness_label(freshness: &Freshness) -> &'static str {
    match freshness {
        Freshness::Fresh => "fresh",
        Freshness::Missing => "missing",
        Freshness::Forced => "forced",
        Freshness::Stale { .. } => "stale",
        Freshness::ParamsChanged => "params changed",
    }
}

fn format_age(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
