use crate::agent::{Cohort, PointValues};
use crate::evolution::SimulationError;
use crate::genome::{Attraction, Genome, MutationPolicy};
use crate::powerup::PowerupPowers;
use crate::world::Region;
use crate::Position;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

/// Collectibles scattered at every start and turnover.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResourceSettings {
    pub box_count: usize,
    pub speed_count: usize,
    pub pull_count: usize,
    pub multiplier_count: usize,
    pub region: Region,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            box_count: 40,
            speed_count: 4,
            pull_count: 4,
            multiplier_count: 4,
            region: Region::new(Position::new(0.0, 0.0), Position::new(200.0, 200.0)),
        }
    }
}

/// Size, spawn area and starting genome of one subpopulation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CohortSettings {
    pub count: usize,
    pub spawn_region: Region,
    /// Genome used before any parent pool exists.
    pub genome: Genome,
}

impl CohortSettings {
    fn boats(spawn_region: Region) -> Self {
        Self {
            count: 10,
            spawn_region,
            genome: Genome::default(),
        }
    }

    fn pirates(spawn_region: Region) -> Self {
        Self {
            count: 6,
            spawn_region,
            genome: Genome {
                boxes: Attraction::new(0.0, 0.0),
                enemy: Attraction::new(1.0, 1.5),
                ..Genome::default()
            },
        }
    }
}

/// Static configuration for a flotilla simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlotillaConfig {
    /// Width of the toroidal arena in world units.
    pub arena_width: f32,
    /// Height of the toroidal arena in world units.
    pub arena_height: f32,
    /// Seconds of simulated time per tick.
    pub dt: f32,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Ticks between generation turnovers.
    pub generation_ticks: u32,
    /// Parent pool size kept per subpopulation.
    pub elite_count: usize,
    pub mutation: MutationPolicy,
    pub powers: PowerupPowers,
    pub points: PointValues,
    pub vessel_radius: f32,
    pub item_radius: f32,
    pub resources: ResourceSettings,
    pub boat_standard: CohortSettings,
    pub boat_abled: CohortSettings,
    pub pirate_standard: CohortSettings,
    pub pirate_abled: CohortSettings,
    /// Generation summaries retained in memory.
    pub history_capacity: usize,
}

impl Default for FlotillaConfig {
    fn default() -> Self {
        let west = Region::new(Position::new(10.0, 10.0), Position::new(40.0, 190.0));
        let east = Region::new(Position::new(160.0, 10.0), Position::new(190.0, 190.0));
        Self {
            arena_width: 200.0,
            arena_height: 200.0,
            dt: 0.1,
            rng_seed: None,
            generation_ticks: 600,
            elite_count: 3,
            mutation: MutationPolicy::default(),
            powers: PowerupPowers::default(),
            points: PointValues::default(),
            vessel_radius: 1.0,
            item_radius: 0.75,
            resources: ResourceSettings::default(),
            boat_standard: CohortSettings::boats(west),
            boat_abled: CohortSettings::boats(west),
            pirate_standard: CohortSettings::pirates(east),
            pirate_abled: CohortSettings::pirates(east),
            history_capacity: 256,
        }
    }
}

impl FlotillaConfig {
    #[must_use]
    pub const fn cohort(&self, cohort: Cohort) -> &CohortSettings {
        match cohort {
            Cohort::BoatStandard => &self.boat_standard,
            Cohort::BoatAbled => &self.boat_abled,
            Cohort::PirateStandard => &self.pirate_standard,
            Cohort::PirateAbled => &self.pirate_abled,
        }
    }

    pub fn cohort_mut(&mut self, cohort: Cohort) -> &mut CohortSettings {
        match cohort {
            Cohort::BoatStandard => &mut self.boat_standard,
            Cohort::BoatAbled => &mut self.boat_abled,
            Cohort::PirateStandard => &mut self.pirate_standard,
            Cohort::PirateAbled => &mut self.pirate_abled,
        }
    }

    /// Check every field that would otherwise break the simulation loop.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(self.arena_width > 0.0 && self.arena_width.is_finite())
            || !(self.arena_height > 0.0 && self.arena_height.is_finite())
        {
            return Err(SimulationError::InvalidConfig(
                "arena dimensions must be positive and finite",
            ));
        }
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return Err(SimulationError::InvalidConfig("dt must be positive"));
        }
        if self.generation_ticks == 0 {
            return Err(SimulationError::InvalidConfig(
                "generation_ticks must be non-zero",
            ));
        }
        if self.elite_count == 0 {
            return Err(SimulationError::InvalidConfig(
                "elite_count must be non-zero",
            ));
        }
        if self.history_capacity == 0 {
            return Err(SimulationError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        let non_negative = |value: f32| value >= 0.0 && value.is_finite();
        if !(self.vessel_radius > 0.0 && self.vessel_radius.is_finite())
            || !(self.item_radius > 0.0 && self.item_radius.is_finite())
        {
            return Err(SimulationError::InvalidConfig(
                "radii must be positive and finite",
            ));
        }
        let mutation = &self.mutation;
        if !non_negative(mutation.factor)
            || !non_negative(mutation.sense_factor)
            || !(0.0..=100.0).contains(&mutation.chance_percent)
        {
            return Err(SimulationError::InvalidConfig(
                "mutation factors must be finite and non-negative, chance_percent within [0, 100]",
            ));
        }
        let powers = &self.powers;
        if !non_negative(powers.speed_multiplier_power)
            || !non_negative(powers.points_multiplier_power)
            || !non_negative(powers.pull_power)
        {
            return Err(SimulationError::InvalidConfig(
                "powerup powers must be finite and non-negative",
            ));
        }
        if !non_negative(self.points.box_points) || !non_negative(self.points.capture_points) {
            return Err(SimulationError::InvalidConfig(
                "point values must be non-negative",
            ));
        }
        for cohort in Cohort::ALL {
            self.cohort(cohort).genome.validate()?;
        }
        Ok(())
    }

    /// Generator seeded from `rng_seed`, or from entropy when unset.
    #[must_use]
    pub fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}
