//! Heritable steering parameters and the single-parent birth/mutation operators.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Degrees swept by a full sensor fan.
pub const FULL_SWEEP_DEGREES: f32 = 360.0;

const MIN_SENSE_VALUE: f32 = 0.1;
const ENVIRONMENT_FACTOR_SCALE: f32 = 0.1;

/// Attraction toward an always-active object category.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Attraction {
    pub weight: f32,
    pub distance_factor: f32,
}

impl Attraction {
    #[must_use]
    pub const fn new(weight: f32, distance_factor: f32) -> Self {
        Self {
            weight,
            distance_factor,
        }
    }
}

/// Attraction toward a powerup category, plus how strongly nearby activity raises its appeal.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PowerupAttraction {
    pub weight: f32,
    pub distance_factor: f32,
    pub environment_factor: f32,
}

impl PowerupAttraction {
    #[must_use]
    pub const fn new(weight: f32, distance_factor: f32, environment_factor: f32) -> Self {
        Self {
            weight,
            distance_factor,
            environment_factor,
        }
    }

    /// All-zero attraction carried by agents without abilities.
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    fn clamp_non_negative(&mut self) {
        self.weight = self.weight.max(0.0);
        self.distance_factor = self.distance_factor.max(0.0);
        self.environment_factor = self.environment_factor.max(0.0);
    }
}

/// Powerup categories an abled agent can collect and value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PowerupKind {
    Speed,
    Pull,
    Multiplier,
}

impl PowerupKind {
    pub const ALL: [Self; 3] = [Self::Speed, Self::Pull, Self::Multiplier];

    /// Dense index used by per-category accumulators.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Speed => 0,
            Self::Pull => 1,
            Self::Multiplier => 2,
        }
    }
}

/// Errors raised when validating genome values.
#[derive(Debug, Error, PartialEq)]
pub enum GenomeError {
    #[error("sector_count must be non-zero")]
    ZeroSectors,
    #[error("{field} must be positive (got {value})")]
    NonPositive { field: &'static str, value: f32 },
    #[error("powerup field {field} must be non-negative (got {value})")]
    NegativePowerup { field: &'static str, value: f32 },
    #[error("{field} must be finite")]
    NonFinite { field: &'static str },
}

/// Governs how `Genome::mutate` perturbs a genome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MutationPolicy {
    /// Half-width of the uniform perturbation applied to attraction genes.
    pub factor: f32,
    /// Per-gene chance (0..=100) that a perturbation is applied.
    pub chance_percent: f32,
    /// Whether sector count, sight range and moving speed evolve at all.
    pub evolve_senses: bool,
    /// Largest change to `sector_count` in one mutation when senses evolve.
    pub sector_step: u32,
    /// Half-width of the perturbation applied to sight range and moving speed.
    pub sense_factor: f32,
}

impl Default for MutationPolicy {
    fn default() -> Self {
        Self {
            factor: 0.5,
            chance_percent: 20.0,
            evolve_senses: false,
            sector_step: 1,
            sense_factor: 1.0,
        }
    }
}

/// Heritable parameters steering one agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Genome {
    pub sector_count: u32,
    pub sight_range: f32,
    pub moving_speed: f32,
    /// Bounds of the uniform fallback utility; either order is accepted.
    pub exploration_range: (f32, f32),
    pub boxes: Attraction,
    pub rival: Attraction,
    pub enemy: Attraction,
    pub speed: PowerupAttraction,
    pub pull: PowerupAttraction,
    pub multiplier: PowerupAttraction,
}

impl Default for Genome {
    fn default() -> Self {
        Self {
            sector_count: 8,
            sight_range: 30.0,
            moving_speed: 6.0,
            exploration_range: (0.0, 0.5),
            boxes: Attraction::new(1.0, 1.0),
            rival: Attraction::new(0.0, 0.0),
            enemy: Attraction::new(-1.0, 1.0),
            speed: PowerupAttraction::new(0.5, 0.5, 0.05),
            pull: PowerupAttraction::new(0.5, 0.5, 0.05),
            multiplier: PowerupAttraction::new(0.5, 0.5, 0.05),
        }
    }
}

impl Genome {
    /// Angle in degrees between neighbouring fan directions.
    #[must_use]
    pub fn angular_step(&self) -> f32 {
        FULL_SWEEP_DEGREES / self.sector_count.max(1) as f32
    }

    #[must_use]
    pub fn powerup(&self, kind: PowerupKind) -> &PowerupAttraction {
        match kind {
            PowerupKind::Speed => &self.speed,
            PowerupKind::Pull => &self.pull,
            PowerupKind::Multiplier => &self.multiplier,
        }
    }

    fn powerup_mut(&mut self, kind: PowerupKind) -> &mut PowerupAttraction {
        match kind {
            PowerupKind::Speed => &mut self.speed,
            PowerupKind::Pull => &mut self.pull,
            PowerupKind::Multiplier => &mut self.multiplier,
        }
    }

    /// Lower and upper exploration bounds regardless of stored order.
    #[must_use]
    pub fn exploration_bounds(&self) -> (f32, f32) {
        let (a, b) = self.exploration_range;
        (a.min(b), a.max(b))
    }

    /// Zero every powerup gene.
    pub fn clear_powerups(&mut self) {
        for kind in PowerupKind::ALL {
            *self.powerup_mut(kind) = PowerupAttraction::zero();
        }
    }

    /// Returns a copy of `self` sanitised for an agent with or without abilities.
    #[must_use]
    pub fn for_abled(mut self, abled: bool) -> Self {
        if !abled {
            self.clear_powerups();
        }
        self
    }

    /// Overwrite this genome with a parent's genes. Agents without abilities never inherit
    /// powerup genes.
    pub fn birth_from(&mut self, parent: &Genome, abled: bool) {
        *self = parent.for_abled(abled);
    }

    /// Perturb genes in place according to `policy`.
    pub fn mutate<R: Rng + ?Sized>(&mut self, policy: &MutationPolicy, abled: bool, rng: &mut R) {
        let factor = policy.factor.abs();
        let chance = policy.chance_percent;

        for attraction in [&mut self.boxes, &mut self.rival, &mut self.enemy] {
            attraction.weight = shifted(attraction.weight, perturbation(rng, chance, factor));
            attraction.distance_factor =
                shifted(attraction.distance_factor, perturbation(rng, chance, factor));
        }
        self.exploration_range.0 =
            shifted(self.exploration_range.0, perturbation(rng, chance, factor));
        self.exploration_range.1 =
            shifted(self.exploration_range.1, perturbation(rng, chance, factor));

        if abled {
            for kind in PowerupKind::ALL {
                let powerup = self.powerup_mut(kind);
                powerup.weight = shifted(powerup.weight, perturbation(rng, chance, factor));
                powerup.distance_factor =
                    shifted(powerup.distance_factor, perturbation(rng, chance, factor));
                powerup.environment_factor = shifted(
                    powerup.environment_factor,
                    perturbation(rng, chance, factor * ENVIRONMENT_FACTOR_SCALE),
                );
                powerup.clamp_non_negative();
            }
        } else {
            self.clear_powerups();
        }

        if policy.evolve_senses {
            self.mutate_senses(policy, rng);
        }
    }

    fn mutate_senses<R: Rng + ?Sized>(&mut self, policy: &MutationPolicy, rng: &mut R) {
        let chance = policy.chance_percent;
        if rolls_under(rng, chance) && policy.sector_step > 0 {
            let step = i64::from(policy.sector_step);
            let delta = rng.random_range(-step..=step);
            self.sector_count = (i64::from(self.sector_count) + delta).clamp(1, i64::from(u32::MAX)) as u32;
        }
        let sense_factor = policy.sense_factor.abs();
        self.sight_range =
            shifted(self.sight_range, perturbation(rng, chance, sense_factor)).max(MIN_SENSE_VALUE);
        self.moving_speed =
            shifted(self.moving_speed, perturbation(rng, chance, sense_factor)).max(MIN_SENSE_VALUE);
    }

    /// Ensure the genome describes a usable agent.
    pub fn validate(&self) -> Result<(), GenomeError> {
        if self.sector_count == 0 {
            return Err(GenomeError::ZeroSectors);
        }
        for (field, value) in [
            ("sight_range", self.sight_range),
            ("moving_speed", self.moving_speed),
        ] {
            if !value.is_finite() {
                return Err(GenomeError::NonFinite { field });
            }
            if value <= 0.0 {
                return Err(GenomeError::NonPositive { field, value });
            }
        }
        for (field, value) in [
            ("exploration_range.low", self.exploration_range.0),
            ("exploration_range.high", self.exploration_range.1),
            ("boxes.weight", self.boxes.weight),
            ("boxes.distance_factor", self.boxes.distance_factor),
            ("rival.weight", self.rival.weight),
            ("rival.distance_factor", self.rival.distance_factor),
            ("enemy.weight", self.enemy.weight),
            ("enemy.distance_factor", self.enemy.distance_factor),
        ] {
            if !value.is_finite() {
                return Err(GenomeError::NonFinite { field });
            }
        }
        let powerup_fields = [
            ("speed.weight", self.speed.weight),
            ("speed.distance_factor", self.speed.distance_factor),
            ("speed.environment_factor", self.speed.environment_factor),
            ("pull.weight", self.pull.weight),
            ("pull.distance_factor", self.pull.distance_factor),
            ("pull.environment_factor", self.pull.environment_factor),
            ("multiplier.weight", self.multiplier.weight),
            ("multiplier.distance_factor", self.multiplier.distance_factor),
            ("multiplier.environment_factor", self.multiplier.environment_factor),
        ];
        for (field, value) in powerup_fields {
            if !value.is_finite() {
                return Err(GenomeError::NonFinite { field });
            }
            if value < 0.0 {
                return Err(GenomeError::NegativePowerup { field, value });
            }
        }
        Ok(())
    }
}

fn rolls_under<R: Rng + ?Sized>(rng: &mut R, chance_percent: f32) -> bool {
    rng.random_range(0.0..=100.0_f32) <= chance_percent
}

/// Uniform offset in `[-factor, factor)`; scaling a unit sample never overflows the range.
fn perturbation<R: Rng + ?Sized>(rng: &mut R, chance_percent: f32, factor: f32) -> f32 {
    if rolls_under(rng, chance_percent) {
        let span = factor.min(f32::MAX);
        (rng.random::<f32>() * 2.0 - 1.0) * span
    } else {
        0.0
    }
}

/// `value + delta`, saturating at the finite `f32` range.
fn shifted(value: f32, delta: f32) -> f32 {
    (value + delta).clamp(f32::MIN, f32::MAX)
}
