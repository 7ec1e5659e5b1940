//! Species rules, subpopulation keys, and the per-agent runtime record.

use crate::genome::{Genome, PowerupKind};
use crate::powerup::PowerupState;
use crate::{EntityId, Velocity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Tag attached to every entity in the arena.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ObjectTag {
    Boat,
    Pirate,
    Box,
    SpeedPowerup,
    PullPowerup,
    MultiplierPowerup,
}

impl ObjectTag {
    /// Powerup category carried by this tag, if any.
    #[must_use]
    pub const fn powerup(self) -> Option<PowerupKind> {
        match self {
            Self::SpeedPowerup => Some(PowerupKind::Speed),
            Self::PullPowerup => Some(PowerupKind::Pull),
            Self::MultiplierPowerup => Some(PowerupKind::Multiplier),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_vessel(self) -> bool {
        matches!(self, Self::Boat | Self::Pirate)
    }

    #[must_use]
    pub const fn from_powerup(kind: PowerupKind) -> Self {
        match kind {
            PowerupKind::Speed => Self::SpeedPowerup,
            PowerupKind::Pull => Self::PullPowerup,
            PowerupKind::Multiplier => Self::MultiplierPowerup,
        }
    }
}

/// Scoring category a sighted object falls into from an agent's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Box,
    RivalVessel,
    Enemy,
    Powerup(PowerupKind),
}

/// What happens when a vessel touches another entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactOutcome {
    /// Nothing happens.
    Ignore,
    /// Score `points` (before multiplier) and consume the touched entity.
    Score { points: f32 },
    /// Collect a powerup; the entity is consumed whether or not the effect applies.
    Collect(PowerupKind),
}

/// Point values awarded on scoring contacts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PointValues {
    pub box_points: f32,
    pub capture_points: f32,
}

impl Default for PointValues {
    fn default() -> Self {
        Self {
            box_points: 1.0,
            capture_points: 1.0,
        }
    }
}

/// Closed set of competing species.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Species {
    Boat,
    Pirate,
}

impl Species {
    #[must_use]
    pub const fn tag(self) -> ObjectTag {
        match self {
            Self::Boat => ObjectTag::Boat,
            Self::Pirate => ObjectTag::Pirate,
        }
    }

    /// Map a sighted tag into this species' scoring category.
    #[must_use]
    pub const fn classify(self, tag: ObjectTag) -> Category {
        match (self, tag) {
            (_, ObjectTag::Box) => Category::Box,
            (Self::Boat, ObjectTag::Boat) | (Self::Pirate, ObjectTag::Pirate) => {
                Category::RivalVessel
            }
            (Self::Boat, ObjectTag::Pirate) | (Self::Pirate, ObjectTag::Boat) => Category::Enemy,
            (_, ObjectTag::SpeedPowerup) => Category::Powerup(PowerupKind::Speed),
            (_, ObjectTag::PullPowerup) => Category::Powerup(PowerupKind::Pull),
            (_, ObjectTag::MultiplierPowerup) => Category::Powerup(PowerupKind::Multiplier),
        }
    }

    /// Point-scoring rule applied when this species touches `tag`.
    #[must_use]
    pub fn on_contact(self, tag: ObjectTag, values: &PointValues) -> ContactOutcome {
        if let Some(kind) = tag.powerup() {
            return ContactOutcome::Collect(kind);
        }
        match (self, tag) {
            (Self::Boat, ObjectTag::Box) => ContactOutcome::Score {
                points: values.box_points,
            },
            (Self::Pirate, ObjectTag::Boat) => ContactOutcome::Score {
                points: values.capture_points,
            },
            _ => ContactOutcome::Ignore,
        }
    }
}

/// One of the four independently evolving subpopulations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Cohort {
    BoatStandard,
    BoatAbled,
    PirateStandard,
    PirateAbled,
}

impl Cohort {
    pub const ALL: [Self; 4] = [
        Self::BoatStandard,
        Self::BoatAbled,
        Self::PirateStandard,
        Self::PirateAbled,
    ];

    #[must_use]
    pub const fn species(self) -> Species {
        match self {
            Self::BoatStandard | Self::BoatAbled => Species::Boat,
            Self::PirateStandard | Self::PirateAbled => Species::Pirate,
        }
    }

    /// Whether agents in this cohort can use powerups.
    #[must_use]
    pub const fn abled(self) -> bool {
        matches!(self, Self::BoatAbled | Self::PirateAbled)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::BoatStandard => 0,
            Self::BoatAbled => 1,
            Self::PirateStandard => 2,
            Self::PirateAbled => 3,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::BoatStandard => "boat-standard",
            Self::BoatAbled => "boat-abled",
            Self::PirateStandard => "pirate-standard",
            Self::PirateAbled => "pirate-abled",
        }
    }

    /// Inverse of [`Cohort::label`].
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cohort| cohort.label() == label)
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Mutable per-agent state wrapped around a genome.
#[derive(Debug, Clone)]
pub struct AgentRuntime {
    pub(crate) cohort: Cohort,
    pub(crate) genome: Genome,
    pub(crate) points: f32,
    pub(crate) powerups: PowerupState,
    pub(crate) awake: bool,
    pub(crate) velocity: Velocity,
    pub(crate) visibility: HashMap<EntityId, f32>,
    pub(crate) ticks_since_cache_clear: u32,
}

impl AgentRuntime {
    /// Fresh runtime for `cohort`, asleep until the controller wakes it.
    #[must_use]
    pub fn new(cohort: Cohort, genome: Genome) -> Self {
        Self {
            cohort,
            genome: genome.for_abled(cohort.abled()),
            points: 0.0,
            powerups: PowerupState::default(),
            awake: false,
            velocity: Velocity::default(),
            visibility: HashMap::new(),
            ticks_since_cache_clear: 0,
        }
    }

    #[must_use]
    pub const fn cohort(&self) -> Cohort {
        self.cohort
    }

    #[must_use]
    pub const fn species(&self) -> Species {
        self.cohort.species()
    }

    #[must_use]
    pub const fn abled(&self) -> bool {
        self.cohort.abled()
    }

    #[must_use]
    pub const fn genome(&self) -> &Genome {
        &self.genome
    }

    #[must_use]
    pub const fn points(&self) -> f32 {
        self.points
    }

    #[must_use]
    pub const fn powerups(&self) -> &PowerupState {
        &self.powerups
    }

    #[must_use]
    pub const fn is_awake(&self) -> bool {
        self.awake
    }

    #[must_use]
    pub const fn velocity(&self) -> Velocity {
        self.velocity
    }

    /// Objects seen since the last cache clear, with their last computed utility.
    pub fn visibility(&self) -> &HashMap<EntityId, f32> {
        &self.visibility
    }

    #[must_use]
    pub const fn ticks_since_cache_clear(&self) -> u32 {
        self.ticks_since_cache_clear
    }

    /// Copy a parent's genome into this agent.
    pub fn birth(&mut self, parent: &Genome) {
        self.genome.birth_from(parent, self.cohort.abled());
    }

    /// Perturb this agent's genome.
    pub fn mutate<R: rand::Rng + ?Sized>(
        &mut self,
        policy: &crate::genome::MutationPolicy,
        rng: &mut R,
    ) {
        self.genome.mutate(policy, self.cohort.abled(), rng);
    }

    pub fn wake(&mut self) {
        self.awake = true;
    }

    /// Halt motion and stop deciding; safe to call repeatedly.
    pub fn sleep(&mut self) {
        self.awake = false;
        self.velocity = Velocity::default();
    }

    /// Credit points scaled by the active multiplier.
    pub fn award(&mut self, points: f32) {
        self.points = (self.points + points * self.powerups.points_multiplier).max(0.0);
    }
}
