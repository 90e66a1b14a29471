use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use al_core::{DAY_MS, ExclusionRules, VisitOutcome, now_unix_ms, unix_ms_to_iso8601};
use al_engine::{LedgerEngine, LedgerSnapshot, ReconciliationScheduler, StubClient};
use al_store::{LedgerConfig, SnapshotStore, default_base_dir};

#[derive(Parser)]
#[command(name = "al", about = "Attention ledger CLI")]
struct Cli {
    /// Override the data directory (default: ~/.attention-ledger)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show publisher attention statistics
    Stats,

    /// Run the normalizer and show the contribution split
    Report,

    /// Record a navigation event
    Visit {
        /// URL being navigated to
        url: String,

        /// URL being navigated away from
        #[arg(long)]
        from: String,

        /// Tab the navigation happened in
        #[arg(long, default_value_t = 1)]
        tab: u32,

        /// Event timestamp in Unix milliseconds (default: now)
        #[arg(long)]
        at: Option<u64>,
    },

    /// Pin a publisher to a fixed percentage (0 clears the pin)
    Pin {
        key: String,
        percentage: u8,
    },

    /// Exclude a publisher from allocation
    Exclude {
        key: String,

        /// Re-include instead
        #[arg(long)]
        clear: bool,
    },

    /// Drop publishers absent from a remote publisher list (one key per line)
    Prune {
        list: PathBuf,
    },

    /// Drive the reconciliation scheduler against the stub client
    Run {
        /// Ballots the stub client hands out per window
        #[arg(long, default_value_t = 10)]
        ballots: u32,
    },

    /// Export the ledger snapshot to a JSON file
    Export {
        path: PathBuf,
    },

    /// Import a ledger snapshot from a JSON file
    Import {
        path: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn data_dir(cli: &Cli) -> PathBuf {
    cli.data_dir
        .clone()
        .or_else(|| std::env::var("AL_DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(default_base_dir)
}

/// Open the store and rebuild the engine from the last snapshot, with
/// config.toml folded in on top.
fn load_engine(dir: &Path) -> Result<(SnapshotStore, LedgerEngine)> {
    let store = SnapshotStore::open(dir).context("failed to open snapshot store")?;
    let mut engine = match store.load().context("failed to load ledger snapshot")? {
        Some(snapshot) => LedgerEngine::restore(snapshot),
        None => LedgerEngine::new(now_unix_ms()),
    };

    let config = LedgerConfig::load(dir);
    config.apply_to(&mut engine.synopsis);
    if let Some(days) = config.frequency_days() {
        engine.state.reconcile_frequency_days = days;
    }
    if let Some(patterns) = &config.exclusion_rules {
        let (rules, rejected) = ExclusionRules::compile(patterns);
        for pattern in &rejected {
            tracing::warn!("skipping invalid exclusion rule: {pattern}");
        }
        engine.set_exclusion_rules(rules);
    }

    Ok((store, engine))
}

fn save(store: &SnapshotStore, engine: &LedgerEngine) -> Result<()> {
    store
        .write(&engine.snapshot())
        .context("failed to write ledger snapshot")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Stats => cmd_stats(&cli),
        Commands::Report => cmd_report(&cli),
        Commands::Visit { url, from, tab, at } => cmd_visit(&cli, url, from, *tab, *at),
        Commands::Pin { key, percentage } => cmd_pin(&cli, key, *percentage),
        Commands::Exclude { key, clear } => cmd_exclude(&cli, key, *clear),
        Commands::Prune { list } => cmd_prune(&cli, list),
        Commands::Run { ballots } => cmd_run(&cli, *ballots).await,
        Commands::Export { path } => cmd_export(&cli, path),
        Commands::Import { path } => cmd_import(&cli, path),
    }
}

fn cmd_stats(cli: &Cli) -> Result<()> {
    let (_, engine) = load_engine(&data_dir(cli))?;

    println!("publishers: {}", engine.synopsis.len());
    println!(
        "next reconcile: {} (every {} days)",
        unix_ms_to_iso8601(engine.state.reconcile_stamp_ms),
        engine.state.reconcile_frequency_days,
    );

    if engine.synopsis.is_empty() {
        return Ok(());
    }

    println!();
    println!(
        "{:<36} {:>10} {:>7} {:>9} {:>5} {:>5}",
        "KEY", "DURATION", "VISITS", "SCORE", "PIN", "PCT"
    );
    for rec in engine.synopsis.publishers() {
        let pin = rec
            .pin_percentage
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        let flags = if rec.excluded { " excluded" } else { "" };
        println!(
            "{:<36} {:>9.1}s {:>7} {:>9.2} {:>5} {:>5}{}",
            rec.key,
            rec.duration_ms as f64 / 1_000.0,
            rec.visits,
            rec.score,
            pin,
            rec.percentage,
            flags,
        );
    }
    Ok(())
}

fn cmd_report(cli: &Cli) -> Result<()> {
    let dir = data_dir(cli);
    let (store, mut engine) = load_engine(&dir)?;
    let allocation = engine.renormalize(None);

    if !allocation.pinned.is_empty() {
        println!("pinned:");
        for share in &allocation.pinned {
            println!("  {:<36} {:>3}%", share.key, share.percentage);
        }
    }
    if !allocation.unpinned.is_empty() {
        println!("unpinned:");
        for share in &allocation.unpinned {
            println!("  {:<36} {:>3}%", share.key, share.percentage);
        }
    }
    if !allocation.excluded.is_empty() {
        println!("excluded:");
        for key in &allocation.excluded {
            println!("  {key}");
        }
    }
    println!("total: {}%", allocation.total());

    save(&store, &engine)
}

fn cmd_visit(cli: &Cli, url: &str, from: &str, tab: u32, at: Option<u64>) -> Result<()> {
    let dir = data_dir(cli);
    let (store, mut engine) = load_engine(&dir)?;

    let timestamp = at.unwrap_or_else(now_unix_ms);
    match engine.record_visit(url, from, timestamp, tab) {
        VisitOutcome::Attributed {
            publisher_key,
            duration_ms,
            revisited,
        } => {
            let kind = if revisited { "revisit" } else { "visit" };
            println!("{kind}: {publisher_key} +{duration_ms}ms");
        }
        VisitOutcome::Ignored => println!("ignored: no publisher for {from}"),
    }

    save(&store, &engine)
}

fn cmd_pin(cli: &Cli, key: &str, percentage: u8) -> Result<()> {
    let dir = data_dir(cli);
    let (store, mut engine) = load_engine(&dir)?;

    let allocation = engine.set_pin(key, percentage);
    let assigned = engine.synopsis.get(key).map(|r| r.percentage).unwrap_or(0);
    println!("pinned {key} at {assigned}% (total {}%)", allocation.total());

    save(&store, &engine)
}

fn cmd_exclude(cli: &Cli, key: &str, clear: bool) -> Result<()> {
    let dir = data_dir(cli);
    let (store, mut engine) = load_engine(&dir)?;

    engine.set_excluded(key, !clear);
    if clear {
        println!("re-included {key}");
    } else {
        println!("excluded {key}");
    }

    save(&store, &engine)
}

fn cmd_prune(cli: &Cli, list: &Path) -> Result<()> {
    let dir = data_dir(cli);
    let (store, mut engine) = load_engine(&dir)?;

    let raw = std::fs::read_to_string(list)
        .with_context(|| format!("failed to read {}", list.display()))?;
    let known: HashSet<String> = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    let removed = engine.synopsis.prune(&known);
    engine.renormalize(None);
    println!("pruned {removed} publishers");

    save(&store, &engine)
}

async fn cmd_run(cli: &Cli, ballots: u32) -> Result<()> {
    let dir = data_dir(cli);
    let (store, engine) = load_engine(&dir)?;

    let next_stamp =
        now_unix_ms() + u64::from(engine.state.reconcile_frequency_days) * DAY_MS;
    let client = StubClient::dry_run(ballots, next_stamp);

    tracing::info!(
        "scheduler starting; current stamp {}",
        unix_ms_to_iso8601(engine.state.reconcile_stamp_ms)
    );
    let scheduler = ReconciliationScheduler::new(engine, client, store);
    let handle = scheduler.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.shutdown();
        }
    });

    println!("scheduler running against the stub client; ctrl-c to stop");
    scheduler.run().await;
    Ok(())
}

fn cmd_export(cli: &Cli, path: &Path) -> Result<()> {
    let (_, engine) = load_engine(&data_dir(cli))?;
    let payload = serde_json::to_string_pretty(&engine.snapshot())?;
    std::fs::write(path, payload)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("exported to {}", path.display());
    Ok(())
}

fn cmd_import(cli: &Cli, path: &Path) -> Result<()> {
    let dir = data_dir(cli);
    let store = SnapshotStore::open(&dir).context("failed to open snapshot store")?;

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let snapshot: LedgerSnapshot =
        serde_json::from_str(&raw).context("failed to parse snapshot")?;

    store.write(&snapshot).context("failed to write ledger snapshot")?;
    println!(
        "imported {} publishers from {}",
        snapshot.synopsis.len(),
        path.display()
    );
    Ok(())
}
