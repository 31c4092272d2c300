use rand::Rng;
use std::f64::consts::TAU;
use std::fmt;

use crate::aggregator::FieldAggregator;
use crate::config::SimulationConfig;
use crate::field::{SegmentSource, SourceId};
use crate::types::{Color, SegmentId, Vec3};

/// Below this start-to-end distance a segment is considered degenerate and dies.
pub const MIN_SEGMENT_LENGTH: f64 = 1e-5;

/// One hyphal element, from its branch point (`start`) to its growing end.
///
/// Segments live in the simulation's arena; `parent` and `children` are arena
/// ids. Once a segment stops (`is_tip` cleared) or dies (`is_dead` set) it
/// stays that way.
#[derive(Clone, Debug)]
pub struct Segment {
    pub(crate) id: SegmentId,
    pub(crate) parent: Option<SegmentId>,
    pub(crate) children: Vec<SegmentId>,
    pub(crate) start: Vec3,
    pub(crate) end: Vec3,
    pub(crate) length: f64,
    pub(crate) orientation: Vec3,
    pub(crate) direction_memory: Vec3,
    pub(crate) is_tip: bool,
    pub(crate) is_dead: bool,
    pub(crate) age: f64,
    pub(crate) branches_made: u32,
    pub(crate) color: Color,
    pub(crate) subsegments: Vec<(Vec3, Vec3)>,
}

impl Segment {
    /// A fresh tip at `start`. A zero `orientation` falls back to `+Z`.
    pub fn new(
        id: SegmentId,
        parent: Option<SegmentId>,
        start: Vec3,
        orientation: Vec3,
        color: Color,
    ) -> Self {
        let mut orientation = orientation.normalized();
        if orientation.is_zero() || !orientation.is_finite() {
            orientation = Vec3::Z;
        }
        Self {
            id,
            parent,
            children: Vec::new(),
            start,
            end: start,
            length: 0.0,
            orientation,
            direction_memory: orientation,
            is_tip: true,
            is_dead: false,
            age: 0.0,
            branches_made: 0,
            color: color.clamped(),
            subsegments: vec![(start, start)],
        }
    }

    /// A root segment with no parent.
    pub fn seed(id: SegmentId, start: Vec3, orientation: Vec3, color: Color) -> Self {
        Self::new(id, None, start, orientation, color)
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn parent(&self) -> Option<SegmentId> {
        self.parent
    }

    pub fn children(&self) -> &[SegmentId] {
        &self.children
    }

    pub fn start(&self) -> Vec3 {
        self.start
    }

    pub fn end(&self) -> Vec3 {
        self.end
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn orientation(&self) -> Vec3 {
        self.orientation
    }

    pub fn direction_memory(&self) -> Vec3 {
        self.direction_memory
    }

    pub fn is_tip(&self) -> bool {
        self.is_tip
    }

    pub fn is_dead(&self) -> bool {
        self.is_dead
    }

    /// Alive and still growing.
    pub fn is_live_tip(&self) -> bool {
        self.is_tip && !self.is_dead
    }

    pub fn age(&self) -> f64 {
        self.age
    }

    pub fn branches_made(&self) -> u32 {
        self.branches_made
    }

    pub fn color(&self) -> Color {
        self.color
    }

    /// `(previous end, new end)` for every growth increment, oldest first.
    pub fn subsegments(&self) -> &[(Vec3, Vec3)] {
        &self.subsegments
    }

    pub(crate) fn source_id(&self) -> SourceId {
        SourceId::Segment(self.id)
    }

    /// Snapshot of the current geometry as a field source.
    pub fn field_source(&self, strength: f64, decay: f64) -> SegmentSource {
        SegmentSource::new(self.start, self.end, strength, decay)
    }

    /// Replaces the heading. A zero or non-finite vector keeps the current one.
    pub fn set_orientation(&mut self, orientation: Vec3) {
        let unit = orientation.normalized();
        debug_assert!(unit.is_finite(), "non-finite orientation for segment {}", self.id);
        if unit.is_zero() || !unit.is_finite() {
            return;
        }
        self.orientation = unit;
    }

    pub fn kill(&mut self) {
        self.is_dead = true;
    }

    pub fn deactivate(&mut self) {
        self.is_tip = false;
    }

    /// Extends a live tip along its orientation by `rate * dt` (after length and
    /// age modifiers) and ages it by `dt`. A tip leaving the configured volume is
    /// clamped to the box face and stops growing for good.
    pub fn grow(&mut self, rate: f64, dt: f64, config: &SimulationConfig) {
        if !self.is_live_tip() {
            return;
        }

        let mut rate = rate;
        if let Some(coef) = config.length_growth_coef.get() {
            rate *= 1.0 + self.length * coef;
        }
        if let Some(exponent) = config.age_slowdown_exponent.get() {
            let age = if self.age > 0.0 { self.age } else { 1.0 };
            rate /= age.powf(exponent);
        }
        let growth_distance = rate.max(0.0) * dt;

        let prev_end = self.end;
        self.end += self.orientation * growth_distance;
        self.length += growth_distance;
        self.age += dt;
        self.subsegments.push((prev_end, self.end));

        if let Some(bounds) = config.volume.get() {
            let (clamped, moved) = bounds.clamp(self.end);
            if moved {
                self.end = clamped;
                if let Some(last) = self.subsegments.last_mut() {
                    last.1 = clamped;
                }
                self.length = self.start.distance_to(self.end);
                self.is_tip = false;
                tracing::trace!(segment = %self.id, end = %self.end, "tip reached volume boundary");
                return;
            }
        }

        let alpha = config.direction_memory_blend;
        let memory = self.direction_memory * (1.0 - alpha) + self.orientation * alpha;
        self.direction_memory = if memory.is_zero() {
            self.orientation
        } else {
            memory.normalized()
        };
    }

    /// Re-derives `length` from the endpoints and kills degenerate segments.
    pub fn update(&mut self) {
        self.length = self.start.distance_to(self.end);
        if self.length < MIN_SEGMENT_LENGTH {
            self.is_dead = true;
        }
    }

    /// Runs the branching gates in order and, if all pass, creates a child at
    /// this segment's end with id `child_id`.
    ///
    /// `tip_count` is the number of live tips at the start of the step; it is
    /// only reported in traces.
    pub fn maybe_branch<R: Rng + ?Sized>(
        &mut self,
        branch_chance: f64,
        tip_count: usize,
        child_id: SegmentId,
        config: &SimulationConfig,
        field: &FieldAggregator,
        rng: &mut R,
    ) -> Option<Segment> {
        if self.is_dead || !(self.is_tip || config.allow_internal_branching) {
            return None;
        }
        if !config.branching_enabled {
            return None;
        }
        if self.branches_made >= config.max_branches {
            return None;
        }
        if let Some(window) = config.branch_time_window.get() {
            if self.age > window {
                return None;
            }
        }
        if let Some(min_age) = config.min_tip_age.get() {
            if self.age < min_age {
                return None;
            }
        }
        if let Some(min_length) = config.min_tip_length.get() {
            if self.length < min_length {
                return None;
            }
        }
        if !config.secondary_branching && !self.children.is_empty() {
            return None;
        }

        let own = [self.source_id()];
        if let Some(limit) = config.branching_density.get() {
            let density = field.segment_density(self.end, &own);
            if density >= limit {
                tracing::trace!(segment = %self.id, density, limit, "branch refused: crowded");
                return None;
            }
        }
        if let Some(threshold) = config.field_threshold.get() {
            let strongest = self
                .field_samples(config)
                .map(|p| field.field_value(p, &own))
                .fold(f64::NEG_INFINITY, f64::max);
            if strongest >= threshold {
                tracing::trace!(segment = %self.id, strongest, threshold, "branch refused: field");
                return None;
            }
        }

        if rng.gen::<f64>() >= branch_chance {
            return None;
        }

        let mut rotated = self.new_growing_vector(config, field, rng);
        if config.curvature_branch_bias > 0.0 {
            if let Some(curve) = self.trail_curvature() {
                rotated = blend(rotated, curve, config.curvature_branch_bias);
            }
        }
        if config.direction_memory_blend > 0.0 {
            rotated = blend(rotated, self.direction_memory, config.direction_memory_blend);
        }

        // coin flip decides who leads: the child takes the new heading, or the
        // parent turns and the child continues straight on
        let child_orientation = if rng.gen::<f64>() < config.leading_branch_prob {
            rotated
        } else {
            let original = self.orientation;
            self.set_orientation(rotated);
            original
        };

        let color = self.mutated_color(config, rng);
        let mut child = Segment::new(child_id, Some(self.id), self.end, child_orientation, color);
        child.direction_memory = self.direction_memory;

        self.children.push(child_id);
        self.branches_made += 1;
        debug_assert!(self.branches_made <= config.max_branches);

        tracing::trace!(
            parent = %self.id,
            child = %child_id,
            tips = tip_count,
            heading = %child.orientation,
            "branched"
        );
        Some(child)
    }

    /// Points the environmental-field gate samples at.
    fn field_samples<'a>(&'a self, config: &SimulationConfig) -> impl Iterator<Item = Vec3> + 'a {
        let along: Box<dyn Iterator<Item = Vec3> + 'a> = if config.complete_evaluation {
            Box::new(self.subsegments.iter().map(|&(_, to)| to))
        } else {
            Box::new(std::iter::once(self.end))
        };
        let junction = (config.evaluate_junction && self.parent.is_some()).then_some(self.start);
        along.chain(junction)
    }

    /// Candidate heading for a new branch: the field gradient when optimal
    /// orientation is on and a gradient exists, otherwise a uniform draw from
    /// the cone of half-angle `branch_angle_spread` around the current heading.
    pub fn new_growing_vector<R: Rng + ?Sized>(
        &self,
        config: &SimulationConfig,
        field: &FieldAggregator,
        rng: &mut R,
    ) -> Vec3 {
        let mut direction = Vec3::ZERO;
        if config.optimal_branch_orientation {
            let (_, gradient) = field.compute_field(self.end, &[self.source_id()]);
            direction = gradient;
        }
        if direction.is_zero() {
            direction = sample_cone(self.orientation, config.branch_angle_spread, rng);
        }

        if let Some(tolerance) = config.plagiotropism_tolerance.get() {
            if direction.angle_to(Vec3::DOWN) > tolerance {
                direction = Vec3::DOWN;
            }
        }
        direction
    }

    /// Unit turn of the trail over its last three recorded points, if any.
    fn trail_curvature(&self) -> Option<Vec3> {
        let n = self.subsegments.len();
        if n < 3 {
            return None;
        }
        let p1 = self.subsegments[n - 3].0;
        let p2 = self.subsegments[n - 2].0;
        let p3 = self.subsegments[n - 1].1;
        let v1 = (p2 - p1).normalized();
        let v2 = (p3 - p2).normalized();
        let curve = (v2 - v1).normalized();
        (!curve.is_zero()).then_some(curve)
    }

    fn mutated_color<R: Rng + ?Sized>(&self, config: &SimulationConfig, rng: &mut R) -> Color {
        match config.color_mutation.get() {
            Some(mutation) if rng.gen::<f64>() < mutation.probability => Color::new(
                self.color.r + laplace(mutation.scale, rng),
                self.color.g + laplace(mutation.scale, rng),
                self.color.b + laplace(mutation.scale, rng),
            )
            .clamped(),
            _ => self.color,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_dead {
            "DEAD"
        } else if self.is_tip {
            "TIP"
        } else {
            "BRANCHED"
        };
        write!(
            f,
            "[{status}] {} {} -> {} | len={:.2}",
            self.id, self.start, self.end, self.length
        )
    }
}

/// `(1 - w) * a + w * b`, normalized. Falls back to `a` when the blend cancels out.
fn blend(a: Vec3, b: Vec3, w: f64) -> Vec3 {
    let mixed = a * (1.0 - w) + b * w;
    if mixed.is_zero() {
        a
    } else {
        mixed.normalized()
    }
}

/// Uniform direction on the spherical cap of half-angle `half_angle_degrees`
/// around `axis`: `cos(phi)` uniform in `[cos(max), 1]`, azimuth uniform in `[0, 2pi)`.
pub(crate) fn sample_cone<R: Rng + ?Sized>(axis: Vec3, half_angle_degrees: f64, rng: &mut R) -> Vec3 {
    let axis = if axis.is_zero() { Vec3::Z } else { axis.normalized() };
    let min_cos = half_angle_degrees.clamp(0.0, 180.0).to_radians().cos();
    let cos_phi = if min_cos < 1.0 {
        rng.gen_range(min_cos..=1.0)
    } else {
        1.0
    };
    let sin_phi = (1.0 - cos_phi * cos_phi).max(0.0).sqrt();
    let theta = rng.gen_range(0.0..TAU);

    let helper = if axis.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    let u = axis.cross(helper).normalized();
    let v = axis.cross(u);
    (axis * cos_phi + (u * theta.cos() + v * theta.sin()) * sin_phi).normalized()
}

/// One draw from Laplace(0, scale) by inverse CDF.
fn laplace<R: Rng + ?Sized>(scale: f64, rng: &mut R) -> f64 {
    let u: f64 = rng.gen_range(-0.5..0.5);
    let tail = (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE);
    -scale * u.signum() * tail.ln()
}
