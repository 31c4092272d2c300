//! Field sources: anything that contributes a scalar field and a gradient at
//! a query point.
//!
//! Every variant uses the same inverse decay law, `strength / (1 + decay * d)`,
//! and differs only in how `d` is measured. Gradients point from the source
//! toward the query point and carry the slope magnitude
//! `strength * decay / (1 + decay * d)^2`; they vanish on the source itself.

use crate::types::{SegmentId, Vec3};

/// Identity of a source inside a [`FieldAggregator`](crate::aggregator::FieldAggregator),
/// used to exclude a segment's own contribution from queries made on its behalf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceId {
    /// Rebuilt every step from the segment with this id.
    Segment(SegmentId),
    /// Registered once and kept across steps (points, lines, nutrients).
    Fixed(u32),
}

/// A source of a scalar field and its gradient.
///
/// Implementations must be pure: the same point yields the same value.
pub trait FieldSource: Send + Sync {
    /// Scalar field value at `point`.
    fn field(&self, point: Vec3) -> f64;

    /// Gradient at `point`. Sources without a meaningful gradient keep the default.
    fn gradient(&self, _point: Vec3) -> Vec3 {
        Vec3::ZERO
    }

    /// Representative location used for neighbour-radius culling. Sources
    /// without one are never culled.
    fn anchor(&self) -> Option<Vec3> {
        None
    }
}

#[inline]
fn decayed(strength: f64, decay: f64, d: f64) -> f64 {
    strength / (1.0 + decay * d)
}

/// Gradient of the decay law along `offset` (query point minus nearest source point).
#[inline]
fn decay_gradient(strength: f64, decay: f64, offset: Vec3) -> Vec3 {
    let d = offset.length();
    if d == 0.0 {
        return Vec3::ZERO;
    }
    let slope = strength * decay / ((1.0 + decay * d) * (1.0 + decay * d));
    offset * (slope / d)
}

/// Emitter at a fixed point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointSource {
    pub position: Vec3,
    pub strength: f64,
    pub decay: f64,
}

impl PointSource {
    pub fn new(position: Vec3, strength: f64, decay: f64) -> Self {
        Self {
            position,
            strength,
            decay,
        }
    }
}

impl FieldSource for PointSource {
    fn field(&self, point: Vec3) -> f64 {
        decayed(self.strength, self.decay, point.distance_to(self.position))
    }

    fn gradient(&self, point: Vec3) -> Vec3 {
        decay_gradient(self.strength, self.decay, point - self.position)
    }

    fn anchor(&self) -> Option<Vec3> {
        Some(self.position)
    }
}

/// Infinite straight substrate through `origin` along `direction`; decays with
/// perpendicular distance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineSource {
    pub origin: Vec3,
    direction: Vec3,
    pub strength: f64,
    pub decay: f64,
}

impl LineSource {
    pub fn new(origin: Vec3, direction: Vec3, strength: f64, decay: f64) -> Self {
        Self {
            origin,
            direction: direction.normalized(),
            strength,
            decay,
        }
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    fn perpendicular(&self, point: Vec3) -> Vec3 {
        let delta = point - self.origin;
        delta - self.direction * delta.dot(self.direction)
    }
}

impl FieldSource for LineSource {
    fn field(&self, point: Vec3) -> f64 {
        decayed(self.strength, self.decay, self.perpendicular(point).length())
    }

    fn gradient(&self, point: Vec3) -> Vec3 {
        decay_gradient(self.strength, self.decay, self.perpendicular(point))
    }
}

/// Finite hyphal segment `[start, end]`. Holds a copy of the geometry taken when
/// the aggregator was last rebuilt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentSource {
    pub start: Vec3,
    pub end: Vec3,
    pub strength: f64,
    pub decay: f64,
}

impl SegmentSource {
    pub fn new(start: Vec3, end: Vec3, strength: f64, decay: f64) -> Self {
        Self {
            start,
            end,
            strength,
            decay,
        }
    }
}

impl FieldSource for SegmentSource {
    fn field(&self, point: Vec3) -> f64 {
        let closest = point.closest_on_segment(self.start, self.end);
        decayed(self.strength, self.decay, point.distance_to(closest))
    }

    fn gradient(&self, point: Vec3) -> Vec3 {
        let closest = point.closest_on_segment(self.start, self.end);
        decay_gradient(self.strength, self.decay, point - closest)
    }

    fn anchor(&self) -> Option<Vec3> {
        Some(self.end)
    }
}

/// Nutrient attractor, or repellent when `repulsive` (field and gradient negated).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NutrientSource {
    pub location: Vec3,
    pub strength: f64,
    pub decay: f64,
    pub repulsive: bool,
}

impl NutrientSource {
    pub fn attractor(location: Vec3, strength: f64, decay: f64) -> Self {
        Self {
            location,
            strength,
            decay,
            repulsive: false,
        }
    }

    pub fn repellent(location: Vec3, strength: f64, decay: f64) -> Self {
        Self {
            repulsive: true,
            ..Self::attractor(location, strength, decay)
        }
    }

    fn sign(&self) -> f64 {
        if self.repulsive {
            -1.0
        } else {
            1.0
        }
    }
}

impl FieldSource for NutrientSource {
    fn field(&self, point: Vec3) -> f64 {
        self.sign() * decayed(self.strength, self.decay, point.distance_to(self.location))
    }

    fn gradient(&self, point: Vec3) -> Vec3 {
        decay_gradient(self.strength, self.decay, point - self.location) * self.sign()
    }

    fn anchor(&self) -> Option<Vec3> {
        Some(self.location)
    }
}
