//! Generational controller: ranking, parent pools, respawn and winner persistence.

use crate::agent::{Cohort, ObjectTag};
use crate::config::FlotillaConfig;
use crate::genome::{Genome, GenomeError, PowerupKind};
use crate::world::{ContactReport, World};
use crate::{EntityId, Generation, Tick};
use flotilla_index::IndexError;
use ordered_float::OrderedFloat;
use rand::Rng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::VecDeque;
use std::f32::consts::PI;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while ranking or respawning subpopulations.
#[derive(Debug, Error, PartialEq)]
pub enum EvolutionError {
    #[error("invalid argument for {cohort}: {reason}")]
    InvalidArgument {
        cohort: Cohort,
        reason: &'static str,
    },
}

/// Failure reported by a durable artifact store.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact backend error: {0}")]
    Backend(String),
    #[error("failed to encode artifact {name}: {reason}")]
    Encode { name: String, reason: String },
}

/// Errors that can occur while constructing or advancing a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error(transparent)]
    Genome(#[from] GenomeError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Evolution(#[from] EvolutionError),
}

/// Best agent of a subpopulation at the end of a generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WinnerRecord {
    pub name: String,
    pub cohort: Cohort,
    pub generation: u32,
    pub points: f32,
    pub genome: Genome,
}

impl WinnerRecord {
    #[must_use]
    pub fn new(cohort: Cohort, generation: Generation, points: f32, genome: Genome) -> Self {
        Self {
            name: format!("{cohort}-gen{:04}", generation.0),
            cohort,
            generation: generation.0,
            points,
            genome,
        }
    }
}

/// Durable sink for winning genomes.
pub trait ArtifactStore: Send {
    fn save(&mut self, record: &WinnerRecord) -> Result<(), ArtifactError>;
}

/// No-op artifact sink.
#[derive(Debug, Default)]
pub struct NullArtifactStore;

impl ArtifactStore for NullArtifactStore {
    fn save(&mut self, _record: &WinnerRecord) -> Result<(), ArtifactError> {
        Ok(())
    }
}

/// One independently evolving group of agents.
#[derive(Debug, Clone)]
pub struct Subpopulation {
    cohort: Cohort,
    members: Vec<EntityId>,
    parent_pool: Vec<Genome>,
    last_winner: Option<WinnerRecord>,
}

impl Subpopulation {
    #[must_use]
    pub const fn new(cohort: Cohort) -> Self {
        Self {
            cohort,
            members: Vec::new(),
            parent_pool: Vec::new(),
            last_winner: None,
        }
    }

    #[must_use]
    pub const fn cohort(&self) -> Cohort {
        self.cohort
    }

    #[must_use]
    pub fn members(&self) -> &[EntityId] {
        &self.members
    }

    /// Genome snapshots of the previous generation's elites, best first.
    #[must_use]
    pub fn parent_pool(&self) -> &[Genome] {
        &self.parent_pool
    }

    #[must_use]
    pub const fn last_winner(&self) -> Option<&WinnerRecord> {
        self.last_winner.as_ref()
    }

    /// Live members sorted by points, best first; ties keep spawn order.
    pub fn rank(&self, world: &World) -> Result<Vec<(EntityId, f32, Genome)>, EvolutionError> {
        let mut ranked = Vec::with_capacity(self.members.len());
        for &id in &self.members {
            if !world.contains(id) {
                continue;
            }
            let Some(runtime) = world.agent(id) else {
                return Err(EvolutionError::InvalidArgument {
                    cohort: self.cohort,
                    reason: "live member has no agent runtime",
                });
            };
            if runtime.cohort() != self.cohort {
                return Err(EvolutionError::InvalidArgument {
                    cohort: self.cohort,
                    reason: "member belongs to another cohort",
                });
            }
            ranked.push((id, runtime.points(), *runtime.genome()));
        }
        ranked.sort_by_key(|(_, points, _)| Reverse(OrderedFloat(*points)));
        Ok(ranked)
    }
}

/// Lifecycle of the simulation as a whole.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SimulationState {
    #[default]
    Uninitialized,
    Running,
    Stopped,
}

/// Per-cohort outcome of one turnover.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CohortSummary {
    pub cohort: Cohort,
    pub survivors: usize,
    pub best_points: f32,
    pub mean_points: f32,
    /// True when nobody survived and the previous parent pool was reused.
    pub fell_back: bool,
}

/// Outcome of one generation turnover.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationSummary {
    /// Generation that just ended.
    pub generation: Generation,
    pub cohorts: [CohortSummary; 4],
}

/// Events emitted after processing a tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickEvents {
    pub tick: Tick,
    pub turnover: Option<GenerationSummary>,
    pub steered: usize,
    pub pulled: usize,
    pub contacts: ContactReport,
}

/// External triggers accepted by a running simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Continue,
    Stop,
    ActivatePull(EntityId),
}

/// Apply an operator command; returns whether it took effect.
pub fn apply_control_command(
    simulation: &mut Simulation,
    command: ControlCommand,
) -> Result<bool, SimulationError> {
    match command {
        ControlCommand::Start => simulation.start().map(|()| true),
        ControlCommand::Continue => simulation.continue_simulation().map(|_| true),
        ControlCommand::Stop => {
            simulation.stop();
            Ok(true)
        }
        ControlCommand::ActivatePull(agent) => Ok(simulation.trigger_pull(agent)),
    }
}

/// Boats and pirates evolving in a shared arena.
pub struct Simulation {
    config: FlotillaConfig,
    rng: SmallRng,
    world: World,
    subpopulations: [Subpopulation; 4],
    state: SimulationState,
    tick: Tick,
    generation: Generation,
    ticks_in_generation: u32,
    store: Box<dyn ArtifactStore>,
    history: VecDeque<GenerationSummary>,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("state", &self.state)
            .field("tick", &self.tick)
            .field("generation", &self.generation)
            .field("entities", &self.world.entity_count())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Validate `config` and build an idle simulation without persistence.
    pub fn new(config: FlotillaConfig) -> Result<Self, SimulationError> {
        Self::with_store(config, Box::new(NullArtifactStore))
    }

    pub fn with_store(
        config: FlotillaConfig,
        store: Box<dyn ArtifactStore>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let rng = config.seeded_rng();
        let world = World::new(config.arena_width, config.arena_height);
        let history = VecDeque::with_capacity(config.history_capacity);
        Ok(Self {
            config,
            rng,
            world,
            subpopulations: Cohort::ALL.map(Subpopulation::new),
            state: SimulationState::Uninitialized,
            tick: Tick::zero(),
            generation: Generation::default(),
            ticks_in_generation: 0,
            store,
            history,
        })
    }

    /// Swap the artifact store at runtime.
    pub fn set_store(&mut self, store: Box<dyn ArtifactStore>) {
        self.store = store;
    }

    #[must_use]
    pub const fn config(&self) -> &FlotillaConfig {
        &self.config
    }

    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    #[must_use]
    pub const fn state(&self) -> SimulationState {
        self.state
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// Ticks elapsed on the generation timer.
    #[must_use]
    pub const fn ticks_in_generation(&self) -> u32 {
        self.ticks_in_generation
    }

    #[must_use]
    pub const fn subpopulation(&self, cohort: Cohort) -> &Subpopulation {
        &self.subpopulations[cohort.index()]
    }

    pub fn subpopulations(&self) -> impl Iterator<Item = &Subpopulation> {
        self.subpopulations.iter()
    }

    pub fn history(&self) -> impl Iterator<Item = &GenerationSummary> {
        self.history.iter()
    }

    /// Reset the arena: fresh resources, default genomes, empty parent pools.
    pub fn start(&mut self) -> Result<(), SimulationError> {
        for cohort in Cohort::ALL {
            self.despawn(cohort);
            let subpopulation = &mut self.subpopulations[cohort.index()];
            subpopulation.parent_pool.clear();
            subpopulation.last_winner = None;
        }
        self.generation = Generation::default();
        self.history.clear();
        self.regenerate_resources();
        for cohort in Cohort::ALL {
            self.respawn(cohort, false);
        }
        self.world.rebuild_index()?;
        self.ticks_in_generation = 0;
        self.state = SimulationState::Running;
        info!(
            agents = self.world.agents().count(),
            entities = self.world.entity_count(),
            "simulation started"
        );
        Ok(())
    }

    /// Resume with one turnover from the recorded parent pools; starts fresh if never started.
    pub fn continue_simulation(&mut self) -> Result<Option<GenerationSummary>, SimulationError> {
        if self.state == SimulationState::Uninitialized {
            self.start()?;
            return Ok(None);
        }
        let summary = self.turnover()?;
        self.state = SimulationState::Running;
        info!(generation = self.generation.0, "simulation continued");
        Ok(Some(summary))
    }

    /// Halt the timer and freeze every agent. Pools and scores are kept.
    pub fn stop(&mut self) {
        if self.state == SimulationState::Running {
            self.state = SimulationState::Stopped;
            info!(tick = self.tick.0, "simulation stopped");
        }
        self.world.sleep_all();
    }

    /// Fire the pull effect for `agent`; `false` when it cannot pull right now.
    pub fn trigger_pull(&mut self, agent: EntityId) -> bool {
        if self.state != SimulationState::Running {
            return false;
        }
        self.world.trigger_pull(agent, &self.config.powers)
    }

    /// Execute one tick: generation timer, steering, motion, pulls, contacts.
    pub fn step(&mut self) -> Result<TickEvents, SimulationError> {
        if self.state != SimulationState::Running {
            return Ok(TickEvents {
                tick: self.tick,
                ..TickEvents::default()
            });
        }
        self.tick = self.tick.next();
        self.ticks_in_generation += 1;
        let mut events = TickEvents {
            tick: self.tick,
            ..TickEvents::default()
        };
        if self.ticks_in_generation >= self.config.generation_ticks {
            events.turnover = Some(self.turnover()?);
        }

        let dt = self.config.dt;
        self.world.rebuild_index()?;
        events.steered = self.world.steer_agents(&mut self.rng);
        self.world.integrate(dt);
        events.pulled = self.world.advance_pulls(dt);
        self.world.rebuild_index()?;
        let contacts = self.world.detect_contacts();
        events.contacts =
            self.world
                .resolve_contacts(&contacts, &self.config.points, &self.config.powers);
        Ok(events)
    }

    /// Rank every cohort, refresh parent pools, persist winners and respawn.
    pub fn turnover(&mut self) -> Result<GenerationSummary, SimulationError> {
        let rankings = self
            .subpopulations
            .iter()
            .map(|subpopulation| subpopulation.rank(&self.world))
            .collect::<Result<Vec<_>, _>>()?;

        let ended = self.generation;
        let elite_count = self.config.elite_count;
        let mut cohorts = Cohort::ALL.map(|cohort| CohortSummary {
            cohort,
            survivors: 0,
            best_points: 0.0,
            mean_points: 0.0,
            fell_back: false,
        });

        for (cohort, ranked) in Cohort::ALL.into_iter().zip(rankings) {
            let summary = &mut cohorts[cohort.index()];
            summary.survivors = ranked.len();
            let Some(&(_, best_points, best_genome)) = ranked.first() else {
                summary.fell_back = true;
                warn!(
                    %cohort,
                    generation = ended.0,
                    pool = self.subpopulations[cohort.index()].parent_pool.len(),
                    "no survivors; reusing previous parent pool"
                );
                continue;
            };
            summary.best_points = best_points;
            summary.mean_points =
                ranked.iter().map(|(_, points, _)| *points).sum::<f32>() / ranked.len() as f32;

            let winner = WinnerRecord::new(cohort, ended, best_points, best_genome);
            if let Err(err) = self.store.save(&winner) {
                warn!(name = %winner.name, error = %err, "failed to persist winner");
            }
            let subpopulation = &mut self.subpopulations[cohort.index()];
            subpopulation.parent_pool = ranked
                .iter()
                .take(elite_count)
                .map(|(_, _, genome)| *genome)
                .collect();
            subpopulation.last_winner = Some(winner);
        }

        for cohort in Cohort::ALL {
            self.despawn(cohort);
        }
        self.regenerate_resources();
        for cohort in Cohort::ALL {
            self.respawn(cohort, true);
        }
        self.world.rebuild_index()?;

        self.generation = ended.next();
        self.ticks_in_generation = 0;
        let summary = GenerationSummary {
            generation: ended,
            cohorts,
        };
        info!(
            generation = ended.0,
            best = ?summary.cohorts.map(|c| c.best_points),
            "generation turnover"
        );
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary.clone());
        Ok(summary)
    }

    fn despawn(&mut self, cohort: Cohort) {
        let members = std::mem::take(&mut self.subpopulations[cohort.index()].members);
        for id in members {
            self.world.remove(id);
        }
    }

    /// Spawn `cohort` back to its configured count. First-generation spawns keep the
    /// region default genome; later ones inherit from the pool and mutate.
    fn respawn(&mut self, cohort: Cohort, mutate: bool) {
        let settings = *self.config.cohort(cohort);
        let radius = self.config.vessel_radius;
        let pool_len = self.subpopulations[cohort.index()].parent_pool.len();
        let mut members = Vec::with_capacity(settings.count);
        for _ in 0..settings.count {
            let position = settings.spawn_region.sample(&mut self.rng);
            let heading = self.rng.random_range(-PI..PI);
            let id = self
                .world
                .spawn_agent(cohort, settings.genome, position, heading, radius);
            let parent = (pool_len > 0).then(|| {
                let pick = self.rng.random_range(0..pool_len);
                self.subpopulations[cohort.index()].parent_pool[pick]
            });
            if let Some(runtime) = self.world.agent_mut(id) {
                if let Some(parent) = parent {
                    runtime.birth(&parent);
                }
                if mutate {
                    runtime.mutate(&self.config.mutation, &mut self.rng);
                }
                runtime.wake();
            }
            members.push(id);
        }
        debug!(%cohort, spawned = members.len(), inherited = pool_len > 0, "cohort respawned");
        self.subpopulations[cohort.index()].members = members;
    }

    fn regenerate_resources(&mut self) {
        let cleared = self.world.clear_resources();
        let resources = self.config.resources;
        let radius = self.config.item_radius;
        let region = resources.region;
        self.world
            .populate(&region, ObjectTag::Box, resources.box_count, radius, &mut self.rng);
        for (kind, count) in [
            (PowerupKind::Speed, resources.speed_count),
            (PowerupKind::Pull, resources.pull_count),
            (PowerupKind::Multiplier, resources.multiplier_count),
        ] {
            self.world.populate(
                &region,
                ObjectTag::from_powerup(kind),
                count,
                radius,
                &mut self.rng,
            );
        }
        debug!(cleared, "resources regenerated");
    }
}
