//! Spatial query abstractions for ray sensing and contact detection.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors emitted by spatial index implementations.
#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    /// Indicates collider values that cannot be indexed (e.g., non-positive radius).
    #[error("invalid collider: {0}")]
    InvalidConfig(&'static str),
}

/// Circular footprint registered with an index, carrying caller-defined payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Collider<T> {
    pub center: (f32, f32),
    pub radius: f32,
    pub payload: T,
}

impl<T> Collider<T> {
    #[must_use]
    pub const fn new(center: (f32, f32), radius: f32, payload: T) -> Self {
        Self {
            center,
            radius,
            payload,
        }
    }
}

/// Nearest intersection reported by a ray cast.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RayHit<T> {
    /// Distance travelled along the ray before touching the collider.
    pub distance: f32,
    /// World-space point where the ray enters the collider.
    pub point: (f32, f32),
    pub payload: T,
}

/// Common behaviour exposed by spatial query services.
pub trait SpatialQuery<T> {
    /// Cast a ray from `origin` along the unit `direction`, returning the nearest hit within
    /// `max_distance`. Colliders containing `origin` are never reported.
    fn cast(&self, origin: (f32, f32), direction: (f32, f32), max_distance: f32)
    -> Option<RayHit<T>>;

    /// Visit every collider whose footprint overlaps the circle at `center` with `radius`.
    fn overlapping(&self, center: (f32, f32), radius: f32, visitor: &mut dyn FnMut(&Collider<T>));
}

/// Flat collider list rebuilt once per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircleIndex<T> {
    colliders: Vec<Collider<T>>,
}

impl<T> Default for CircleIndex<T> {
    fn default() -> Self {
        Self {
            colliders: Vec::new(),
        }
    }
}

impl<T: Copy> CircleIndex<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the indexed colliders, rejecting degenerate footprints.
    pub fn rebuild<I>(&mut self, colliders: I) -> Result<(), IndexError>
    where
        I: IntoIterator<Item = Collider<T>>,
    {
        self.colliders.clear();
        for collider in colliders {
            if !collider.radius.is_finite() || collider.radius <= 0.0 {
                self.colliders.clear();
                return Err(IndexError::InvalidConfig("radius must be positive and finite"));
            }
            if !collider.center.0.is_finite() || !collider.center.1.is_finite() {
                self.colliders.clear();
                return Err(IndexError::InvalidConfig("center must be finite"));
            }
            self.colliders.push(collider);
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }

    pub fn colliders(&self) -> &[Collider<T>] {
        &self.colliders
    }
}

/// Entry distance of a ray into a circle, if the ray crosses its boundary.
fn ray_entry(origin: (f32, f32), direction: (f32, f32), center: (f32, f32), radius: f32) -> Option<f32> {
    let to_center = (center.0 - origin.0, center.1 - origin.1);
    let radius_sq = radius * radius;
    let center_dist_sq = to_center.0 * to_center.0 + to_center.1 * to_center.1;
    if center_dist_sq <= radius_sq {
        return None;
    }
    let along = to_center.0 * direction.0 + to_center.1 * direction.1;
    if along < 0.0 {
        return None;
    }
    let perpendicular_sq = center_dist_sq - along * along;
    if perpendicular_sq > radius_sq {
        return None;
    }
    Some(along - (radius_sq - perpendicular_sq).sqrt())
}

impl<T: Copy> SpatialQuery<T> for CircleIndex<T> {
    fn cast(
        &self,
        origin: (f32, f32),
        direction: (f32, f32),
        max_distance: f32,
    ) -> Option<RayHit<T>> {
        let length = (direction.0 * direction.0 + direction.1 * direction.1).sqrt();
        if !length.is_finite() || length <= f32::EPSILON || max_distance <= 0.0 {
            return None;
        }
        let unit = (direction.0 / length, direction.1 / length);
        self.colliders
            .iter()
            .filter_map(|collider| {
                ray_entry(origin, unit, collider.center, collider.radius)
                    .filter(|distance| *distance <= max_distance)
                    .map(|distance| (OrderedFloat(distance), collider))
            })
            .min_by_key(|(distance, _)| *distance)
            .map(|(distance, collider)| {
                let distance = distance.into_inner();
                RayHit {
                    distance,
                    point: (origin.0 + unit.0 * distance, origin.1 + unit.1 * distance),
                    payload: collider.payload,
                }
            })
    }

    fn overlapping(&self, center: (f32, f32), radius: f32, visitor: &mut dyn FnMut(&Collider<T>)) {
        for collider in &self.colliders {
            let dx = collider.center.0 - center.0;
            let dy = collider.center.1 - center.1;
            let reach = collider.radius + radius;
            if dx * dx + dy * dy < reach * reach {
                visitor(collider);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(colliders: Vec<Collider<u32>>) -> CircleIndex<u32> {
        let mut index = CircleIndex::new();
        index.rebuild(colliders).expect("valid colliders");
        index
    }

    #[test]
    fn cast_reports_nearest_collider() {
        let index = index_of(vec![
            Collider::new((10.0, 0.0), 1.0, 1),
            Collider::new((5.0, 0.0), 1.0, 2),
            Collider::new((5.0, 5.0), 1.0, 3),
        ]);
        let hit = index.cast((0.0, 0.0), (1.0, 0.0), 20.0).expect("hit");
        assert_eq!(hit.payload, 2);
        assert!((hit.distance - 4.0).abs() < 1e-5);
        assert!((hit.point.0 - 4.0).abs() < 1e-5);
    }

    #[test]
    fn cast_respects_max_distance() {
        let index = index_of(vec![Collider::new((10.0, 0.0), 1.0, 7)]);
        assert!(index.cast((0.0, 0.0), (1.0, 0.0), 8.0).is_none());
        assert!(index.cast((0.0, 0.0), (1.0, 0.0), 9.0).is_some());
    }

    #[test]
    fn cast_ignores_collider_containing_origin() {
        let index = index_of(vec![
            Collider::new((0.0, 0.0), 2.0, 1),
            Collider::new((6.0, 0.0), 1.0, 2),
        ]);
        let hit = index.cast((0.0, 0.0), (1.0, 0.0), 10.0).expect("hit");
        assert_eq!(hit.payload, 2);
    }

    #[test]
    fn cast_ignores_colliders_behind_and_beside() {
        let index = index_of(vec![
            Collider::new((-5.0, 0.0), 1.0, 1),
            Collider::new((5.0, 3.0), 1.0, 2),
        ]);
        assert!(index.cast((0.0, 0.0), (1.0, 0.0), 10.0).is_none());
    }

    #[test]
    fn cast_normalizes_direction_and_rejects_zero() {
        let index = index_of(vec![Collider::new((0.0, 5.0), 1.0, 4)]);
        let hit = index.cast((0.0, 0.0), (0.0, 3.0), 10.0).expect("hit");
        assert!((hit.distance - 4.0).abs() < 1e-5);
        assert!(index.cast((0.0, 0.0), (0.0, 0.0), 10.0).is_none());
    }

    #[test]
    fn overlapping_visits_touching_colliders_only() {
        let index = index_of(vec![
            Collider::new((1.0, 0.0), 0.5, 1),
            Collider::new((3.0, 0.0), 0.5, 2),
        ]);
        let mut seen = Vec::new();
        index.overlapping((0.0, 0.0), 1.0, &mut |collider| seen.push(collider.payload));
        assert_eq!(seen, vec![1]);
    }

    #[test]
    fn rebuild_rejects_degenerate_radius() {
        let mut index = CircleIndex::new();
        let err = index
            .rebuild(vec![Collider::new((0.0, 0.0), 0.0, 1u32)])
            .unwrap_err();
        assert_eq!(err, IndexError::InvalidConfig("radius must be positive and finite"));
        assert!(index.is_empty());
    }
}
