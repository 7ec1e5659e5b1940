//! Transient powerup buffs and the environment-driven attraction accumulators.

use crate::EntityId;
use crate::genome::{Genome, PowerupKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configured strength of each powerup effect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PowerupPowers {
    /// Speed multiplier granted by a speed pickup.
    pub speed_multiplier_power: f32,
    /// Points multiplier granted by a multiplier pickup.
    pub points_multiplier_power: f32,
    /// Distance per second that pulled objects travel toward the puller.
    pub pull_power: f32,
}

impl Default for PowerupPowers {
    fn default() -> Self {
        Self {
            speed_multiplier_power: 2.0,
            points_multiplier_power: 2.0,
            pull_power: 8.0,
        }
    }
}

/// Per-agent buffs and attraction modifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerupState {
    pub(crate) speed_multiplier: f32,
    pub(crate) points_multiplier: f32,
    pub(crate) environment_weights: [f32; 3],
    speed_suppression: f32,
    multiplier_suppression: f32,
    pub(crate) pull_armed: bool,
}

impl Default for PowerupState {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            points_multiplier: 1.0,
            environment_weights: [1.0; 3],
            speed_suppression: 1.0,
            multiplier_suppression: 1.0,
            pull_armed: false,
        }
    }
}

impl PowerupState {
    #[must_use]
    pub const fn speed_multiplier(&self) -> f32 {
        self.speed_multiplier
    }

    #[must_use]
    pub const fn points_multiplier(&self) -> f32 {
        self.points_multiplier
    }

    #[must_use]
    pub const fn environment_weight(&self, kind: PowerupKind) -> f32 {
        self.environment_weights[kind.index()]
    }

    /// Attraction suppression for `kind`; pull is never suppressed.
    #[must_use]
    pub const fn suppression(&self, kind: PowerupKind) -> f32 {
        match kind {
            PowerupKind::Speed => self.speed_suppression,
            PowerupKind::Multiplier => self.multiplier_suppression,
            PowerupKind::Pull => 1.0,
        }
    }

    #[must_use]
    pub const fn pull_armed(&self) -> bool {
        self.pull_armed
    }

    /// Restore the accumulators to their neutral weight.
    pub fn reset_environment(&mut self) {
        self.environment_weights = [1.0; 3];
    }

    /// Raise every accumulator by its category's environment factor.
    pub fn accumulate_environment(&mut self, genome: &Genome) {
        for kind in PowerupKind::ALL {
            self.environment_weights[kind.index()] += genome.powerup(kind).environment_factor;
        }
    }

    /// Apply a pickup of `kind`. Returns `false` when the agent cannot use powerups.
    pub fn apply_pickup(&mut self, kind: PowerupKind, abled: bool, powers: &PowerupPowers) -> bool {
        if !abled {
            return false;
        }
        match kind {
            PowerupKind::Speed => {
                self.speed_multiplier = powers.speed_multiplier_power;
                self.speed_suppression = 0.0;
            }
            PowerupKind::Multiplier => {
                self.points_multiplier = powers.points_multiplier_power;
                self.multiplier_suppression = 0.0;
            }
            PowerupKind::Pull => {
                self.pull_armed = true;
            }
        }
        true
    }
}

/// Transient behaviour dragging an entity toward its puller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PullLink {
    pub puller: EntityId,
    pub speed: f32,
}

/// Cached objects eligible to be pulled: every entry with non-negative utility.
pub fn pull_targets(visibility: &HashMap<EntityId, f32>) -> Vec<EntityId> {
    let mut targets: Vec<EntityId> = visibility
        .iter()
        .filter(|(_, utility)| **utility >= 0.0)
        .map(|(id, _)| *id)
        .collect();
    targets.sort_unstable();
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn speed_pickup_is_idempotent() {
        let powers = PowerupPowers {
            speed_multiplier_power: 2.5,
            ..PowerupPowers::default()
        };
        let mut state = PowerupState::default();
        assert!(state.apply_pickup(PowerupKind::Speed, true, &powers));
        assert!(state.apply_pickup(PowerupKind::Speed, true, &powers));
        assert_eq!(state.speed_multiplier(), 2.5);
        assert_eq!(state.suppression(PowerupKind::Speed), 0.0);
        assert_eq!(state.suppression(PowerupKind::Multiplier), 1.0);
    }

    #[test]
    fn multiplier_pickup_mirrors_speed() {
        let powers = PowerupPowers::default();
        let mut state = PowerupState::default();
        state.apply_pickup(PowerupKind::Multiplier, true, &powers);
        assert_eq!(state.points_multiplier(), powers.points_multiplier_power);
        assert_eq!(state.suppression(PowerupKind::Multiplier), 0.0);
        assert_eq!(state.speed_multiplier(), 1.0);
    }

    #[test]
    fn pull_is_never_suppressed() {
        let mut state = PowerupState::default();
        state.apply_pickup(PowerupKind::Pull, true, &PowerupPowers::default());
        state.apply_pickup(PowerupKind::Pull, true, &PowerupPowers::default());
        assert!(state.pull_armed());
        assert_eq!(state.suppression(PowerupKind::Pull), 1.0);
    }

    #[test]
    fn disabled_agents_ignore_pickups() {
        let mut state = PowerupState::default();
        for kind in PowerupKind::ALL {
            assert!(!state.apply_pickup(kind, false, &PowerupPowers::default()));
        }
        assert_eq!(state, PowerupState::default());
    }

    #[test]
    fn environment_accumulates_and_resets() {
        let genome = Genome::default();
        let mut state = PowerupState::default();
        state.accumulate_environment(&genome);
        state.accumulate_environment(&genome);
        let expected = 1.0 + 2.0 * genome.speed.environment_factor;
        assert!((state.environment_weight(PowerupKind::Speed) - expected).abs() < 1e-6);
        state.reset_environment();
        assert_eq!(state.environment_weight(PowerupKind::Pull), 1.0);
    }

    #[test]
    fn pull_targets_skip_negative_utility() {
        let mut ids: SlotMap<EntityId, ()> = SlotMap::with_key();
        let a = ids.insert(());
        let b = ids.insert(());
        let c = ids.insert(());
        let visibility = HashMap::from([(a, 0.0), (b, -0.5), (c, 2.0)]);
        assert_eq!(pull_targets(&visibility), vec![a, c]);
    }
}
