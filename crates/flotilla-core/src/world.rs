//! Entity registry for the arena: generational handles, spatial index, motion and contacts.

use crate::agent::{AgentRuntime, Cohort, ContactOutcome, ObjectTag, PointValues};
use crate::genome::Genome;
use crate::powerup::{PowerupPowers, PullLink, pull_targets};
use crate::steering::{Pose, Sighting, decide};
use crate::{EntityId, Position};
use flotilla_index::{CircleIndex, Collider, IndexError, SpatialQuery};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::HashSet;
use tracing::debug;

/// Axis-aligned spawn rectangle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Region {
    pub min: Position,
    pub max: Position,
}

impl Region {
    #[must_use]
    pub const fn new(min: Position, max: Position) -> Self {
        Self { min, max }
    }

    /// Uniform random point inside the region (degenerate axes collapse to their bound).
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        Position::new(
            sample_axis(rng, self.min.x, self.max.x),
            sample_axis(rng, self.min.y, self.max.y),
        )
    }

    #[must_use]
    pub fn contains(&self, position: Position) -> bool {
        (self.min.x.min(self.max.x)..=self.min.x.max(self.max.x)).contains(&position.x)
            && (self.min.y.min(self.max.y)..=self.min.y.max(self.max.y)).contains(&position.y)
    }
}

fn sample_axis<R: Rng + ?Sized>(rng: &mut R, a: f32, b: f32) -> f32 {
    let (low, high) = (a.min(b), a.max(b));
    if high - low <= f32::EPSILON {
        low
    } else {
        rng.random_range(low..high)
    }
}

/// Anything with a footprint in the arena.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entity {
    pub tag: ObjectTag,
    pub position: Position,
    /// Facing in radians (vessels only; items keep zero).
    pub heading: f32,
    pub radius: f32,
    pub pull: Option<PullLink>,
}

impl Entity {
    #[must_use]
    pub const fn new(tag: ObjectTag, position: Position, radius: f32) -> Self {
        Self {
            tag,
            position,
            heading: 0.0,
            radius,
            pull: None,
        }
    }
}

/// Vessel touching another entity this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub agent: EntityId,
    pub other: EntityId,
    pub tag: ObjectTag,
}

/// Tally of contact resolution for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContactReport {
    pub scored: usize,
    pub collected: usize,
    pub consumed: usize,
}

/// Toroidal arena owning every entity and agent runtime.
#[derive(Debug)]
pub struct World {
    width: f32,
    height: f32,
    entities: SlotMap<EntityId, Entity>,
    agents: SecondaryMap<EntityId, AgentRuntime>,
    index: CircleIndex<Sighting>,
}

impl World {
    #[must_use]
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            entities: SlotMap::with_key(),
            agents: SecondaryMap::new(),
            index: CircleIndex::new(),
        }
    }

    #[must_use]
    pub const fn width(&self) -> f32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> f32 {
        self.height
    }

    /// Insert a passive entity.
    pub fn spawn(&mut self, entity: Entity) -> EntityId {
        self.entities.insert(entity)
    }

    /// Insert a vessel entity together with its agent runtime.
    pub fn spawn_agent(
        &mut self,
        cohort: Cohort,
        genome: Genome,
        position: Position,
        heading: f32,
        radius: f32,
    ) -> EntityId {
        let mut entity = Entity::new(cohort.species().tag(), position, radius);
        entity.heading = heading;
        let id = self.entities.insert(entity);
        self.agents.insert(id, AgentRuntime::new(cohort, genome));
        id
    }

    /// Scatter `count` entities tagged `tag` uniformly inside `region`.
    pub fn populate<R: Rng + ?Sized>(
        &mut self,
        region: &Region,
        tag: ObjectTag,
        count: usize,
        radius: f32,
        rng: &mut R,
    ) -> Vec<EntityId> {
        (0..count)
            .map(|_| {
                let position = self.wrap(region.sample(rng));
                self.spawn(Entity::new(tag, position, radius))
            })
            .collect()
    }

    /// Remove an entity (and its agent runtime, if any).
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.agents.remove(id);
        self.entities.remove(id)
    }

    /// Remove every collectible (boxes and powerups), returning how many were dropped.
    pub fn clear_resources(&mut self) -> usize {
        let before = self.entities.len();
        self.entities.retain(|_, entity| entity.tag.is_vessel());
        before - self.entities.len()
    }

    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(id)
    }

    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    #[must_use]
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    #[must_use]
    pub fn agent(&self, id: EntityId) -> Option<&AgentRuntime> {
        self.agents.get(id)
    }

    #[must_use]
    pub fn agent_mut(&mut self, id: EntityId) -> Option<&mut AgentRuntime> {
        self.agents.get_mut(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities.iter()
    }

    pub fn agents(&self) -> impl Iterator<Item = (EntityId, &AgentRuntime)> {
        self.agents.iter()
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn count_tag(&self, tag: ObjectTag) -> usize {
        self.entities.values().filter(|e| e.tag == tag).count()
    }

    #[must_use]
    pub fn index(&self) -> &CircleIndex<Sighting> {
        &self.index
    }

    fn wrap(&self, position: Position) -> Position {
        Position::new(
            wrap_coordinate(position.x, self.width),
            wrap_coordinate(position.y, self.height),
        )
    }

    /// Rebuild the spatial index from current footprints.
    pub fn rebuild_index(&mut self) -> Result<(), IndexError> {
        let colliders = self.entities.iter().map(|(id, entity)| {
            Collider::new(
                (entity.position.x, entity.position.y),
                entity.radius,
                Sighting {
                    id,
                    tag: entity.tag,
                },
            )
        });
        self.index.rebuild(colliders)
    }

    /// Run the steering engine for every awake agent; returns how many decided.
    pub fn steer_agents<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        let mut decided = 0;
        for (id, runtime) in self.agents.iter_mut() {
            if !runtime.is_awake() {
                continue;
            }
            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            let pose = Pose {
                position: entity.position,
                heading: entity.heading,
            };
            let steering = decide(runtime, pose, &self.index, rng);
            entity.heading = steering.heading;
            decided += 1;
        }
        decided
    }

    /// Advance agent positions by their velocity on the wrapped arena.
    pub fn integrate(&mut self, dt: f32) {
        let (width, height) = (self.width, self.height);
        for (id, runtime) in self.agents.iter() {
            let velocity = runtime.velocity();
            if velocity.is_zero() {
                continue;
            }
            if let Some(entity) = self.entities.get_mut(id) {
                entity.position.x = wrap_coordinate(entity.position.x + velocity.vx * dt, width);
                entity.position.y = wrap_coordinate(entity.position.y + velocity.vy * dt, height);
            }
        }
    }

    /// Attach a pull link to every live object the agent values non-negatively.
    ///
    /// Returns `false` when the agent is missing, cannot use powerups, or is unarmed.
    pub fn trigger_pull(&mut self, agent: EntityId, powers: &PowerupPowers) -> bool {
        let Some(runtime) = self.agents.get(agent) else {
            return false;
        };
        if !runtime.abled() || !runtime.powerups().pull_armed() {
            return false;
        }
        let link = PullLink {
            puller: agent,
            speed: powers.pull_power,
        };
        let mut attached = 0usize;
        for target in pull_targets(runtime.visibility()) {
            if target == agent {
                continue;
            }
            if let Some(entity) = self.entities.get_mut(target) {
                entity.pull = Some(link);
                attached += 1;
            }
        }
        debug!(?agent, attached, "pull triggered");
        true
    }

    /// Move pulled entities toward their pullers, releasing links that ended.
    pub fn advance_pulls(&mut self, dt: f32) -> usize {
        let links: Vec<(EntityId, Option<Position>)> = self
            .entities
            .iter()
            .filter_map(|(id, entity)| {
                entity.pull.map(|link| {
                    let puller = self.entities.get(link.puller).map(|e| e.position);
                    (id, puller)
                })
            })
            .collect();
        let (width, height) = (self.width, self.height);
        let mut moved = 0;
        for (id, puller) in links {
            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            let Some(target) = puller else {
                entity.pull = None;
                continue;
            };
            let Some(link) = entity.pull else {
                continue;
            };
            let step = link.speed * dt;
            let dx = seam_delta(entity.position.x, target.x, width);
            let dy = seam_delta(entity.position.y, target.y, height);
            let remaining = dx.hypot(dy);
            if remaining <= step {
                entity.position = target;
                entity.pull = None;
            } else {
                let scale = step / remaining;
                entity.position.x = wrap_coordinate(entity.position.x + dx * scale, width);
                entity.position.y = wrap_coordinate(entity.position.y + dy * scale, height);
            }
            moved += 1;
        }
        moved
    }

    /// Find every overlap between an awake vessel and another entity.
    #[must_use]
    pub fn detect_contacts(&self) -> Vec<Contact> {
        let vessels: Vec<(EntityId, Position, f32)> = self
            .agents
            .iter()
            .filter(|(_, runtime)| runtime.is_awake())
            .filter_map(|(id, _)| {
                self.entities
                    .get(id)
                    .map(|entity| (id, entity.position, entity.radius))
            })
            .collect();
        let index = &self.index;
        vessels
            .par_iter()
            .flat_map_iter(|&(agent, position, radius)| {
                let mut touching = Vec::new();
                index.overlapping((position.x, position.y), radius, &mut |collider| {
                    if collider.payload.id != agent {
                        touching.push(Contact {
                            agent,
                            other: collider.payload.id,
                            tag: collider.payload.tag,
                        });
                    }
                });
                touching
            })
            .collect()
    }

    /// Apply contact outcomes in order; each entity is consumed at most once.
    pub fn resolve_contacts(
        &mut self,
        contacts: &[Contact],
        values: &PointValues,
        powers: &PowerupPowers,
    ) -> ContactReport {
        let mut report = ContactReport::default();
        let mut consumed = HashSet::new();
        for contact in contacts {
            if consumed.contains(&contact.agent) || consumed.contains(&contact.other) {
                continue;
            }
            let Some(runtime) = self.agents.get_mut(contact.agent) else {
                continue;
            };
            match runtime.species().on_contact(contact.tag, values) {
                ContactOutcome::Ignore => {}
                ContactOutcome::Score { points } => {
                    runtime.award(points);
                    consumed.insert(contact.other);
                    report.scored += 1;
                }
                ContactOutcome::Collect(kind) => {
                    let abled = runtime.abled();
                    if runtime.powerups.apply_pickup(kind, abled, powers) {
                        report.collected += 1;
                    }
                    debug!(agent = ?contact.agent, ?kind, abled, "powerup collected");
                    consumed.insert(contact.other);
                }
            }
        }
        for id in consumed {
            if self.remove(id).is_some() {
                report.consumed += 1;
            }
        }
        report
    }

    /// Put every agent to sleep with zero velocity.
    pub fn sleep_all(&mut self) {
        for runtime in self.agents.values_mut() {
            runtime.sleep();
        }
    }
}

fn wrap_coordinate(value: f32, extent: f32) -> f32 {
    if extent <= 0.0 {
        return 0.0;
    }
    let wrapped = value.rem_euclid(extent);
    if wrapped >= extent { 0.0 } else { wrapped }
}

/// Shortest signed offset from `from` to `to` on a ring of length `extent`.
fn seam_delta(from: f32, to: f32, extent: f32) -> f32 {
    let delta = to - from;
    if extent <= 0.0 {
        return delta;
    }
    let half = extent * 0.5;
    if delta > half {
        delta - extent
    } else if delta < -half {
        delta + extent
    } else {
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Velocity;
    use crate::genome::PowerupKind;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn world() -> World {
        World::new(100.0, 100.0)
    }

    #[test]
    fn handles_are_generational() {
        let mut world = world();
        let a = world.spawn(Entity::new(ObjectTag::Box, Position::new(1.0, 1.0), 1.0));
        assert!(world.remove(a).is_some());
        let b = world.spawn(Entity::new(ObjectTag::Box, Position::new(1.0, 1.0), 1.0));
        assert_ne!(a, b);
        assert!(!world.contains(a));
        assert!(world.entity(a).is_none());
    }

    #[test]
    fn populate_stays_inside_region() {
        let mut world = world();
        let mut rng = SmallRng::seed_from_u64(7);
        let region = Region::new(Position::new(10.0, 20.0), Position::new(30.0, 25.0));
        let ids = world.populate(&region, ObjectTag::Box, 50, 1.0, &mut rng);
        assert_eq!(ids.len(), 50);
        for id in ids {
            assert!(region.contains(world.entity(id).expect("entity").position));
        }
        assert_eq!(world.clear_resources(), 50);
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn clear_resources_keeps_vessels() {
        let mut world = world();
        world.spawn_agent(Cohort::BoatStandard, Genome::default(), Position::default(), 0.0, 1.0);
        world.spawn(Entity::new(ObjectTag::PullPowerup, Position::new(5.0, 5.0), 1.0));
        assert_eq!(world.clear_resources(), 1);
        assert_eq!(world.count_tag(ObjectTag::Boat), 1);
    }

    #[test]
    fn integrate_wraps_around_edges() {
        let mut world = world();
        let id = world.spawn_agent(
            Cohort::BoatStandard,
            Genome::default(),
            Position::new(99.0, 1.0),
            0.0,
            1.0,
        );
        world.agent_mut(id).expect("agent").velocity = Velocity::new(4.0, -4.0);
        world.integrate(1.0);
        let position = world.entity(id).expect("entity").position;
        assert!((position.x - 3.0).abs() < 1e-4);
        assert!((position.y - 97.0).abs() < 1e-4);
    }

    #[test]
    fn boat_collects_box_and_box_is_consumed_once() {
        let mut world = world();
        let boat_a =
            world.spawn_agent(Cohort::BoatStandard, Genome::default(), Position::new(10.0, 10.0), 0.0, 1.0);
        let boat_b =
            world.spawn_agent(Cohort::BoatStandard, Genome::default(), Position::new(11.5, 10.0), 0.0, 1.0);
        world.agent_mut(boat_a).expect("a").wake();
        world.agent_mut(boat_b).expect("b").wake();
        let crate_id = world.spawn(Entity::new(ObjectTag::Box, Position::new(10.8, 10.0), 0.5));
        world.rebuild_index().expect("index");
        let contacts = world.detect_contacts();
        let report = world.resolve_contacts(&contacts, &PointValues::default(), &PowerupPowers::default());
        assert_eq!(report.scored, 1);
        assert!(!world.contains(crate_id));
        let total = world.agent(boat_a).expect("a").points() + world.agent(boat_b).expect("b").points();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn pirate_capture_destroys_boat() {
        let mut world = world();
        let pirate =
            world.spawn_agent(Cohort::PirateStandard, Genome::default(), Position::new(50.0, 50.0), 0.0, 1.0);
        let boat =
            world.spawn_agent(Cohort::BoatStandard, Genome::default(), Position::new(51.0, 50.0), 0.0, 1.0);
        world.agent_mut(pirate).expect("pirate").wake();
        world.agent_mut(boat).expect("boat").wake();
        world.rebuild_index().expect("index");
        let contacts = world.detect_contacts();
        world.resolve_contacts(&contacts, &PointValues::default(), &PowerupPowers::default());
        assert!(!world.contains(boat));
        assert!(world.agent(boat).is_none());
        assert!((world.agent(pirate).expect("pirate").points() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn standard_vessel_consumes_powerup_without_effect() {
        let mut world = world();
        let boat =
            world.spawn_agent(Cohort::BoatStandard, Genome::default(), Position::new(20.0, 20.0), 0.0, 1.0);
        world.agent_mut(boat).expect("boat").wake();
        let item = world.spawn(Entity::new(ObjectTag::SpeedPowerup, Position::new(20.5, 20.0), 0.5));
        world.rebuild_index().expect("index");
        let contacts = world.detect_contacts();
        let report = world.resolve_contacts(&contacts, &PointValues::default(), &PowerupPowers::default());
        assert_eq!(report.collected, 0);
        assert_eq!(report.consumed, 1);
        assert!(!world.contains(item));
        assert_eq!(world.agent(boat).expect("boat").powerups().speed_multiplier(), 1.0);
    }

    #[test]
    fn pull_drags_cached_objects_until_arrival() {
        let mut world = world();
        let powers = PowerupPowers {
            pull_power: 2.0,
            ..PowerupPowers::default()
        };
        let boat =
            world.spawn_agent(Cohort::BoatAbled, Genome::default(), Position::new(0.0, 0.0), 0.0, 1.0);
        let near = world.spawn(Entity::new(ObjectTag::Box, Position::new(5.0, 0.0), 0.5));
        let disliked = world.spawn(Entity::new(ObjectTag::Box, Position::new(0.0, 5.0), 0.5));
        let gone = world.spawn(Entity::new(ObjectTag::Box, Position::new(9.0, 9.0), 0.5));
        {
            let runtime = world.agent_mut(boat).expect("boat");
            runtime.visibility.insert(near, 0.5);
            runtime.visibility.insert(disliked, -1.0);
            runtime.visibility.insert(gone, 1.0);
        }
        world.remove(gone);

        assert!(!world.trigger_pull(boat, &powers), "unarmed agents cannot pull");
        world
            .agent_mut(boat)
            .expect("boat")
            .powerups
            .apply_pickup(PowerupKind::Pull, true, &powers);
        assert!(world.trigger_pull(boat, &powers));
        assert!(world.trigger_pull(boat, &powers), "pull is re-triggerable");
        assert!(world.entity(disliked).expect("disliked").pull.is_none());

        assert_eq!(world.advance_pulls(1.0), 1);
        assert!((world.entity(near).expect("near").position.x - 3.0).abs() < 1e-5);
        world.advance_pulls(1.0);
        world.advance_pulls(1.0);
        let entity = world.entity(near).expect("near");
        assert_eq!(entity.position, Position::new(0.0, 0.0));
        assert!(entity.pull.is_none());
    }

    #[test]
    fn pull_links_drop_when_puller_disappears() {
        let mut world = world();
        let boat =
            world.spawn_agent(Cohort::BoatAbled, Genome::default(), Position::new(0.0, 0.0), 0.0, 1.0);
        let item = world.spawn(Entity::new(ObjectTag::Box, Position::new(5.0, 0.0), 0.5));
        world.entity_mut(item).expect("item").pull = Some(PullLink {
            puller: boat,
            speed: 1.0,
        });
        world.remove(boat);
        assert_eq!(world.advance_pulls(1.0), 0);
        let entity = world.entity(item).expect("item");
        assert!(entity.pull.is_none());
        assert_eq!(entity.position, Position::new(5.0, 0.0));
    }

    #[test]
    fn pull_takes_the_short_way_across_the_seam() {
        let mut world = world();
        let boat =
            world.spawn_agent(Cohort::BoatAbled, Genome::default(), Position::new(2.0, 50.0), 0.0, 1.0);
        let item = world.spawn(Entity::new(ObjectTag::Box, Position::new(97.0, 50.0), 0.5));
        world.entity_mut(item).expect("item").pull = Some(PullLink {
            puller: boat,
            speed: 2.0,
        });
        assert_eq!(world.advance_pulls(1.0), 1);
        let position = world.entity(item).expect("item").position;
        assert!((position.x - 99.0).abs() < 1e-4, "moved to {position:?}");
        world.advance_pulls(1.0);
        let position = world.entity(item).expect("item").position;
        assert!((position.x - 1.0).abs() < 1e-4, "wrapped to {position:?}");
        world.advance_pulls(1.0);
        let entity = world.entity(item).expect("item");
        assert_eq!(entity.position, Position::new(2.0, 50.0));
        assert!(entity.pull.is_none());
    }

    #[test]
    fn steer_skips_sleeping_agents() {
        let mut world = world();
        let mut rng = SmallRng::seed_from_u64(3);
        let awake =
            world.spawn_agent(Cohort::PirateAbled, Genome::default(), Position::new(10.0, 10.0), 0.0, 1.0);
        world.spawn_agent(Cohort::PirateAbled, Genome::default(), Position::new(80.0, 80.0), 0.0, 1.0);
        world.agent_mut(awake).expect("awake").wake();
        world.rebuild_index().expect("index");
        assert_eq!(world.steer_agents(&mut rng), 1);
        assert!(!world.agent(awake).expect("awake").velocity().is_zero());
        world.sleep_all();
        assert!(world.agents().all(|(_, runtime)| runtime.velocity().is_zero() && !runtime.is_awake()));
    }
}
