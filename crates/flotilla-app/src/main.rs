use anyhow::{Context, Result};
use clap::Parser;
use flotilla_app::{RunOptions, load_config, run_headless};
use flotilla_core::Simulation;
use flotilla_storage::{SharedWinnerStore, WinnerStore};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "flotilla",
    version,
    about = "Evolve boats and pirates competing for crates"
)]
struct Cli {
    /// JSON configuration file; omitted fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// RNG seed for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,
    /// Generations to run before stopping.
    #[arg(long, default_value_t = 5)]
    generations: u32,
    /// Ticks per generation (overrides the config file).
    #[arg(long)]
    generation_ticks: Option<u32>,
    /// DuckDB file receiving each generation's winners.
    #[arg(long, env = "FLOTILLA_DB")]
    db: Option<PathBuf>,
    /// Fire the pull trigger for every abled agent at this tick interval.
    #[arg(long)]
    pull_every: Option<u64>,
    /// Leaderboard rows printed at the end.
    #[arg(long, default_value_t = 10)]
    leaderboard: usize,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(seed) = cli.seed {
        config.rng_seed = Some(seed);
    }
    if let Some(ticks) = cli.generation_ticks {
        config.generation_ticks = ticks;
    }

    let store = match &cli.db {
        Some(path) => {
            let path = path.to_str().context("database path must be valid UTF-8")?;
            Some(SharedWinnerStore::new(
                WinnerStore::open(path).with_context(|| format!("failed to open {path}"))?,
            ))
        }
        None => None,
    };
    let mut simulation = match &store {
        Some(store) => Simulation::with_store(config, Box::new(store.clone()))?,
        None => Simulation::new(config)?,
    };

    let options = RunOptions {
        generations: cli.generations,
        pull_every: cli.pull_every,
        ..RunOptions::default()
    };
    info!(generations = options.generations, "starting flotilla run");
    let report = run_headless(&mut simulation, &options)?;
    info!(
        ticks = report.ticks,
        generations = report.summaries.len(),
        pulls = report.pulls_fired,
        "run complete"
    );

    if let Some(store) = store {
        let board = store.with(|store| store.leaderboard(cli.leaderboard))?;
        println!("{:<28} {:>10} {:>10}", "winner", "generation", "points");
        for entry in board {
            println!(
                "{:<28} {:>10} {:>10.2}",
                entry.name, entry.generation, entry.points
            );
        }
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
