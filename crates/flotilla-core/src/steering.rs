//! Utility-based steering: a radial ray sweep scored per direction, reduced to one heading.
//!
//! Each tick an awake agent samples `sector_count + 1` directions fanned evenly around its
//! facing plus a long-range frontal probe. Every direction starts from a random exploration
//! utility; a ray hit replaces it with a distance-weighted attraction for the hit object's
//! category. The best direction wins most of the time, the runner-up otherwise, and the
//! agent turns gradually toward the pick.

use crate::agent::{AgentRuntime, Category};
use crate::genome::Genome;
use crate::powerup::PowerupState;
use crate::{EntityId, ObjectTag, Position, Velocity, wrap_signed_angle};
use flotilla_index::SpatialQuery;
use ordered_float::OrderedFloat;
use rand::Rng;
use std::cmp::Reverse;

/// Ticks after which the visibility cache and environment accumulators are reset.
pub const VISIBILITY_WINDOW_TICKS: u32 = 60;
/// Sight range multiplier for the frontal probe.
pub const FRONTAL_PROBE_FACTOR: f32 = 1.5;
/// Chance of committing to the best-ranked direction instead of the runner-up.
pub const TOP_CHOICE_PROBABILITY: f32 = 0.85;
/// Fraction of the remaining turn applied each tick.
pub const TURN_BLEND: f32 = 0.1;

/// Payload attached to colliders so rays can report what they touched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sighting {
    pub id: EntityId,
    pub tag: ObjectTag,
}

/// Where an agent is and which way it faces (radians, counter-clockwise from +x).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    pub position: Position,
    pub heading: f32,
}

/// One scored direction from the sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub angle: f32,
    pub sight_factor: f32,
    pub utility: f32,
    pub sighted: Option<Sighting>,
}

/// Movement decision produced for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Steering {
    /// Facing after blending toward the chosen direction.
    pub heading: f32,
    /// Unit vector of the chosen direction.
    pub direction: (f32, f32),
    pub velocity: Velocity,
    /// Index of the chosen candidate in construction order.
    pub candidate: usize,
    pub utility: f32,
}

fn unit(angle: f32) -> (f32, f32) {
    let (sin, cos) = angle.sin_cos();
    (cos, sin)
}

/// Utility of a ray hit on `category` at `distance` along a ray of `length`.
///
/// Returns `None` when the category is a powerup the agent cannot use.
#[must_use]
pub fn hit_utility(
    genome: &Genome,
    powerups: &PowerupState,
    abled: bool,
    category: Category,
    distance: f32,
    length: f32,
) -> Option<f32> {
    let distance_index = 1.0 - distance / length;
    let utility = match category {
        Category::Box => distance_index * genome.boxes.distance_factor + genome.boxes.weight,
        Category::RivalVessel => {
            distance_index * genome.rival.distance_factor + genome.rival.weight
        }
        Category::Enemy => distance_index * genome.enemy.distance_factor + genome.enemy.weight,
        Category::Powerup(kind) => {
            if !abled {
                return None;
            }
            let attraction = genome.powerup(kind);
            distance_index * attraction.distance_factor
                + attraction.weight
                    * powerups.environment_weight(kind)
                    * powerups.suppression(kind)
        }
    };
    Some(utility)
}

/// Sample and score every candidate direction, updating the agent's visibility bookkeeping.
pub fn survey<Q, R>(agent: &mut AgentRuntime, pose: Pose, query: &Q, rng: &mut R) -> Vec<Candidate>
where
    Q: SpatialQuery<Sighting> + ?Sized,
    R: Rng + ?Sized,
{
    if agent.ticks_since_cache_clear >= VISIBILITY_WINDOW_TICKS {
        agent.visibility.clear();
        agent.powerups.reset_environment();
        agent.ticks_since_cache_clear = 0;
    }
    agent.ticks_since_cache_clear += 1;

    let genome = agent.genome;
    let abled = agent.abled();
    let species = agent.species();
    let sectors = genome.sector_count.max(1);
    let step = genome.angular_step().to_radians();
    let first = pose.heading - step * sectors as f32 / 2.0;
    let (low, high) = genome.exploration_bounds();
    let origin = (pose.position.x, pose.position.y);

    let directions = (0..=sectors)
        .map(|i| (first + step * i as f32, 1.0))
        .chain(std::iter::once((pose.heading, FRONTAL_PROBE_FACTOR)));

    let mut candidates = Vec::with_capacity(sectors as usize + 2);
    for (angle, sight_factor) in directions {
        let mut utility = rng.random_range(low..=high);
        let length = genome.sight_range * sight_factor;
        let hit = query.cast(origin, unit(angle), length);
        if let Some(hit) = hit {
            let category = species.classify(hit.payload.tag);
            if let Some(scored) =
                hit_utility(&genome, &agent.powerups, abled, category, hit.distance, length)
            {
                utility = scored;
            }
            let id = hit.payload.id;
            if agent.visibility.insert(id, utility).is_none() {
                agent.powerups.accumulate_environment(&genome);
            }
        }
        candidates.push(Candidate {
            angle,
            sight_factor,
            utility,
            sighted: hit.map(|hit| hit.payload),
        });
    }
    candidates
}

/// Candidate indices ordered by descending utility; ties keep construction order.
#[must_use]
pub fn rank(candidates: &[Candidate]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by_key(|&idx| Reverse(OrderedFloat(candidates[idx].utility)));
    order
}

/// Choose a movement for this tick and store the resulting velocity on the agent.
pub fn decide<Q, R>(agent: &mut AgentRuntime, pose: Pose, query: &Q, rng: &mut R) -> Steering
where
    Q: SpatialQuery<Sighting> + ?Sized,
    R: Rng + ?Sized,
{
    let candidates = survey(agent, pose, query, rng);
    let order = rank(&candidates);
    let pick = if order.len() < 2 || rng.random::<f32>() < TOP_CHOICE_PROBABILITY {
        order[0]
    } else {
        order[1]
    };
    let chosen = candidates[pick];
    let direction = unit(chosen.angle);
    let heading =
        wrap_signed_angle(pose.heading + TURN_BLEND * wrap_signed_angle(chosen.angle - pose.heading));
    let speed = agent.genome.moving_speed * agent.powerups.speed_multiplier;
    let velocity = Velocity::new(direction.0 * speed, direction.1 * speed);
    agent.velocity = velocity;
    Steering {
        heading,
        direction,
        velocity,
        candidate: pick,
        utility: chosen.utility,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Cohort;
    use crate::genome::{Attraction, PowerupAttraction, PowerupKind};
    use flotilla_index::{Collider, RayHit};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use slotmap::SlotMap;

    struct EmptySea;

    impl SpatialQuery<Sighting> for EmptySea {
        fn cast(&self, _: (f32, f32), _: (f32, f32), _: f32) -> Option<RayHit<Sighting>> {
            None
        }

        fn overlapping(&self, _: (f32, f32), _: f32, _: &mut dyn FnMut(&Collider<Sighting>)) {}
    }

    /// Every ray hits the same object at a fixed distance.
    struct FixedHit {
        sighting: Sighting,
        distance: f32,
    }

    impl SpatialQuery<Sighting> for FixedHit {
        fn cast(
            &self,
            origin: (f32, f32),
            direction: (f32, f32),
            max_distance: f32,
        ) -> Option<RayHit<Sighting>> {
            (self.distance <= max_distance).then(|| RayHit {
                distance: self.distance,
                point: (
                    origin.0 + direction.0 * self.distance,
                    origin.1 + direction.1 * self.distance,
                ),
                payload: self.sighting,
            })
        }

        fn overlapping(&self, _: (f32, f32), _: f32, _: &mut dyn FnMut(&Collider<Sighting>)) {}
    }

    fn entity_ids(count: usize) -> Vec<EntityId> {
        let mut ids: SlotMap<EntityId, ()> = SlotMap::with_key();
        (0..count).map(|_| ids.insert(())).collect()
    }

    fn flat_genome(sectors: u32, sight: f32) -> Genome {
        Genome {
            sector_count: sectors,
            sight_range: sight,
            exploration_range: (5.0, 5.0),
            ..Genome::default()
        }
    }

    #[test]
    fn fan_is_centered_on_forward_with_frontal_probe() {
        let mut agent = AgentRuntime::new(Cohort::BoatStandard, flat_genome(4, 10.0));
        let mut rng = SmallRng::seed_from_u64(1);
        let heading = 0.3;
        let pose = Pose {
            heading,
            ..Pose::default()
        };
        let candidates = survey(&mut agent, pose, &EmptySea, &mut rng);
        assert_eq!(candidates.len(), 6);
        let step = 90.0_f32.to_radians();
        assert!((candidates[0].angle - (heading - 2.0 * step)).abs() < 1e-5);
        for pair in candidates[..5].windows(2) {
            assert!((pair[1].angle - pair[0].angle - step).abs() < 1e-5);
        }
        assert!((candidates[2].angle - heading).abs() < 1e-5);
        let probe = candidates[5];
        assert_eq!(probe.angle, heading);
        assert_eq!(probe.sight_factor, FRONTAL_PROBE_FACTOR);
        assert!(candidates.iter().all(|c| c.utility == 5.0));
    }

    #[test]
    fn box_hit_scores_distance_weighted_utility() {
        let ids = entity_ids(1);
        let mut genome = flat_genome(4, 10.0);
        genome.boxes = Attraction::new(1.0, 2.0);
        let mut agent = AgentRuntime::new(Cohort::BoatStandard, genome);
        let query = FixedHit {
            sighting: Sighting {
                id: ids[0],
                tag: ObjectTag::Box,
            },
            distance: 5.0,
        };
        let mut rng = SmallRng::seed_from_u64(2);
        let candidates = survey(&mut agent, Pose::default(), &query, &mut rng);
        for candidate in &candidates[..5] {
            assert!((candidate.utility - 2.0).abs() < 1e-6);
        }
        let probe = candidates[5];
        let expected = (1.0 - 5.0 / 15.0) * 2.0 + 1.0;
        assert!((probe.utility - expected).abs() < 1e-5);
        assert_eq!(agent.visibility().len(), 1);
    }

    #[test]
    fn disabled_agents_ignore_powerup_hits() {
        let ids = entity_ids(1);
        let mut agent = AgentRuntime::new(Cohort::BoatStandard, flat_genome(2, 10.0));
        let query = FixedHit {
            sighting: Sighting {
                id: ids[0],
                tag: ObjectTag::SpeedPowerup,
            },
            distance: 1.0,
        };
        let mut rng = SmallRng::seed_from_u64(3);
        let candidates = survey(&mut agent, Pose::default(), &query, &mut rng);
        assert!(candidates.iter().all(|c| c.utility == 5.0));
    }

    #[test]
    fn powerup_utility_uses_environment_and_suppression() {
        let ids = entity_ids(1);
        let mut genome = flat_genome(2, 10.0);
        genome.speed = PowerupAttraction::new(2.0, 1.0, 0.5);
        let mut agent = AgentRuntime::new(Cohort::BoatAbled, genome);
        let query = FixedHit {
            sighting: Sighting {
                id: ids[0],
                tag: ObjectTag::SpeedPowerup,
            },
            distance: 5.0,
        };
        let mut rng = SmallRng::seed_from_u64(4);
        let candidates = survey(&mut agent, Pose::default(), &query, &mut rng);
        // first candidate sees the object before the accumulator moves
        assert!((candidates[0].utility - (0.5 + 2.0)).abs() < 1e-6);
        // newly observed once, so the accumulator rose by one environment factor
        assert!((candidates[1].utility - (0.5 + 2.0 * 1.5)).abs() < 1e-6);
        assert!((agent.powerups().environment_weight(PowerupKind::Speed) - 1.5).abs() < 1e-6);

        agent
            .powerups
            .apply_pickup(PowerupKind::Speed, true, &Default::default());
        let candidates = survey(&mut agent, Pose::default(), &query, &mut rng);
        assert!((candidates[0].utility - 0.5).abs() < 1e-6);
    }

    #[test]
    fn cache_and_environment_reset_after_window() {
        let ids = entity_ids(1);
        let mut agent = AgentRuntime::new(Cohort::PirateAbled, flat_genome(2, 10.0));
        let query = FixedHit {
            sighting: Sighting {
                id: ids[0],
                tag: ObjectTag::Boat,
            },
            distance: 2.0,
        };
        let mut rng = SmallRng::seed_from_u64(5);
        survey(&mut agent, Pose::default(), &query, &mut rng);
        let raised = agent.powerups().environment_weight(PowerupKind::Pull);
        assert!(raised > 1.0);
        for _ in 1..VISIBILITY_WINDOW_TICKS {
            survey(&mut agent, Pose::default(), &EmptySea, &mut rng);
        }
        assert_eq!(agent.ticks_since_cache_clear(), VISIBILITY_WINDOW_TICKS);
        assert_eq!(agent.visibility().len(), 1);
        survey(&mut agent, Pose::default(), &EmptySea, &mut rng);
        assert!(agent.visibility().is_empty());
        assert_eq!(agent.powerups().environment_weight(PowerupKind::Pull), 1.0);
        assert_eq!(agent.ticks_since_cache_clear(), 1);
    }

    #[test]
    fn top_candidate_wins_eighty_five_percent_of_the_time() {
        const TRIALS: usize = 10_000;
        let mut agent = AgentRuntime::new(Cohort::BoatStandard, flat_genome(6, 10.0));
        agent.wake();
        let mut rng = SmallRng::seed_from_u64(0xF1EE7);
        let mut top = 0usize;
        for _ in 0..TRIALS {
            let steering = decide(&mut agent, Pose::default(), &EmptySea, &mut rng);
            assert_eq!(steering.utility, 5.0);
            match steering.candidate {
                0 => top += 1,
                1 => {}
                other => panic!("unexpected candidate {other}"),
            }
        }
        let ratio = top as f32 / TRIALS as f32;
        assert!((ratio - TOP_CHOICE_PROBABILITY).abs() < 0.03, "ratio {ratio}");
    }

    #[test]
    fn decide_turns_gradually_and_sets_velocity() {
        let mut genome = flat_genome(4, 10.0);
        genome.moving_speed = 3.0;
        let mut agent = AgentRuntime::new(Cohort::BoatAbled, genome);
        agent.powerups.speed_multiplier = 2.0;
        let mut rng = SmallRng::seed_from_u64(6);
        let steering = decide(&mut agent, Pose::default(), &EmptySea, &mut rng);
        let speed = (steering.velocity.vx.powi(2) + steering.velocity.vy.powi(2)).sqrt();
        assert!((speed - 6.0).abs() < 1e-4);
        assert_eq!(agent.velocity(), steering.velocity);
        let target = steering.direction.1.atan2(steering.direction.0);
        let expected = TURN_BLEND * wrap_signed_angle(target);
        assert!((steering.heading - expected).abs() < 1e-5);
    }

    #[test]
    fn rank_is_stable_for_ties() {
        let candidate = |utility| Candidate {
            angle: 0.0,
            sight_factor: 1.0,
            utility,
            sighted: None,
        };
        let candidates = [candidate(1.0), candidate(3.0), candidate(1.0), candidate(3.0)];
        assert_eq!(rank(&candidates), vec![1, 3, 0, 2]);
    }
}
