//! Core simulation for competing boat and pirate fleets evolved across generations.

pub mod agent;
pub mod config;
pub mod evolution;
pub mod genome;
pub mod powerup;
pub mod steering;
pub mod world;

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

pub use agent::{AgentRuntime, Category, Cohort, ContactOutcome, ObjectTag, PointValues, Species};
pub use config::{CohortSettings, FlotillaConfig, ResourceSettings};
pub use evolution::{
    ArtifactError, ArtifactStore, CohortSummary, ControlCommand, EvolutionError,
    GenerationSummary, NullArtifactStore, Simulation, SimulationError, SimulationState,
    Subpopulation, TickEvents, WinnerRecord, apply_control_command,
};
pub use genome::{Attraction, Genome, GenomeError, MutationPolicy, PowerupAttraction, PowerupKind};
pub use powerup::{PowerupPowers, PowerupState, PullLink};
pub use steering::{Pose, Sighting, Steering, decide};
pub use world::{Entity, Region, World};

new_key_type! {
    /// Stable handle for arena entities backed by a generational slot map.
    pub struct EntityId;
}

const FULL_TURN: f32 = std::f32::consts::TAU;
const HALF_TURN: f32 = std::f32::consts::PI;

pub(crate) fn wrap_signed_angle(mut angle: f32) -> f32 {
    if angle.is_nan() {
        return 0.0;
    }
    while angle <= -HALF_TURN {
        angle += FULL_TURN;
    }
    while angle > HALF_TURN {
        angle -= FULL_TURN;
    }
    angle
}

/// High level simulation clock (ticks processed since boot).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Generation counter (turnovers completed since start).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(pub u32);

impl Generation {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Position on the horizontal plane of the arena.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

/// Planar velocity in world units per second.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Velocity {
    pub vx: f32,
    pub vy: f32,
}

impl Velocity {
    #[must_use]
    pub const fn new(vx: f32, vy: f32) -> Self {
        Self { vx, vy }
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.vx == 0.0 && self.vy == 0.0
    }
}
