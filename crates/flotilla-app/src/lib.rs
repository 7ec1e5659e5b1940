//! Shared plumbing for the headless flotilla runner.

use anyhow::{Context, Result};
use flotilla_core::{Cohort, ControlCommand, FlotillaConfig, GenerationSummary, Simulation};
use std::path::Path;
use tracing::info;

pub mod command;

pub use command::CommandQueue;

/// Knobs for a headless run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Generations to complete before stopping.
    pub generations: u32,
    /// Send a pull trigger to every abled agent at this tick interval.
    pub pull_every: Option<u64>,
    pub command_capacity: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            generations: 5,
            pull_every: None,
            command_capacity: 1024,
        }
    }
}

/// What a headless run produced.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub summaries: Vec<GenerationSummary>,
    pub ticks: u64,
    pub pulls_fired: usize,
}

/// Load a JSON configuration file, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<FlotillaConfig> {
    let Some(path) = path else {
        return Ok(FlotillaConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: FlotillaConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}

/// Start `simulation`, run it for the requested generations, then stop it.
pub fn run_headless(simulation: &mut Simulation, options: &RunOptions) -> Result<RunReport> {
    let mut queue = CommandQueue::new(options.command_capacity);
    let mut report = RunReport::default();
    queue.submit(ControlCommand::Start);
    queue.drain(simulation)?;

    while simulation.generation().0 < options.generations {
        if let Some(interval) = options.pull_every.filter(|interval| *interval > 0)
            && simulation.tick().0 % interval == 0
        {
            for cohort in [Cohort::BoatAbled, Cohort::PirateAbled] {
                for &agent in simulation.subpopulation(cohort).members() {
                    queue.submit(ControlCommand::ActivatePull(agent));
                }
            }
            report.pulls_fired += queue.drain(simulation)?;
        }
        let events = simulation
            .step()
            .with_context(|| format!("tick {} failed", simulation.tick().0 + 1))?;
        report.ticks = events.tick.0;
        if let Some(summary) = events.turnover {
            for cohort in &summary.cohorts {
                info!(
                    generation = summary.generation.0,
                    cohort = %cohort.cohort,
                    survivors = cohort.survivors,
                    best = cohort.best_points,
                    mean = cohort.mean_points,
                    fell_back = cohort.fell_back,
                    "generation summary"
                );
            }
            report.summaries.push(summary);
        }
    }

    queue.submit(ControlCommand::Stop);
    queue.drain(simulation)?;
    Ok(report)
}
