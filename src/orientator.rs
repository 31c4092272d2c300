//! Tropism blending: turns the environment around a tip into its next heading.

use rand::Rng;

use crate::aggregator::FieldAggregator;
use crate::config::SimulationConfig;
use crate::grid::{DensityField, DirectionField};
use crate::segment::{sample_cone, Segment};
use crate::types::Vec3;

/// Borrowed view of everything a tip can sense during one step.
///
/// Holds no state of its own; [`compute`](Self::compute) is a pure function of
/// the segment, the environment and the random draws it takes.
pub struct Orientator<'a> {
    pub config: &'a SimulationConfig,
    pub field: &'a FieldAggregator,
    pub density: Option<&'a dyn DensityField>,
    pub anisotropy: Option<&'a dyn DirectionField>,
}

impl<'a> Orientator<'a> {
    pub fn new(config: &'a SimulationConfig, field: &'a FieldAggregator) -> Self {
        Self {
            config,
            field,
            density: None,
            anisotropy: None,
        }
    }

    pub fn with_density(mut self, density: Option<&'a dyn DensityField>) -> Self {
        self.density = density;
        self
    }

    pub fn with_anisotropy(mut self, anisotropy: Option<&'a dyn DirectionField>) -> Self {
        self.anisotropy = anisotropy;
        self
    }

    /// New unit heading for `segment`. If every contribution cancels out the
    /// current orientation is returned unchanged.
    pub fn compute<R: Rng + ?Sized>(&self, segment: &Segment, rng: &mut R) -> Vec3 {
        let cfg = self.config;
        let previous = segment.orientation();
        let tip = segment.end();
        let own = [segment.source_id()];
        let mut heading = previous;

        // Trail field: self-avoidance for a positive scale
        let (_, gradient) = self.field.compute_field(tip, &own);
        if !gradient.is_zero() {
            heading += gradient * cfg.autotropism_scale();

            if cfg.field_alignment_boost > 0.0 {
                let dot = heading.dot(gradient);
                if dot > 0.0 {
                    heading += gradient * (dot * cfg.field_alignment_boost);
                }
            }

            if cfg.field_curvature_influence != 0.0 {
                let curvature = self
                    .field
                    .compute_field_curvature_excluding(tip, cfg.curvature_epsilon, &own);
                heading += gradient * (curvature * cfg.field_curvature_influence);
            }
        }

        if cfg.density_avoidance {
            if let Some(density) = self.density {
                heading -= density.gradient_at(tip);
            }
        }

        if cfg.gravitropism > 0.0 {
            heading += Vec3::DOWN * gravity_strength(cfg, tip.z);
        }

        if cfg.use_nutrient_field {
            let radius = cfg.nutrient_radius;
            for &attractor in &cfg.nutrient_attractors {
                let delta = attractor - tip;
                let dist = delta.length();
                if dist < radius && cfg.nutrient_attraction > 0.0 {
                    heading += delta.normalized() * (cfg.nutrient_attraction * (1.0 - dist / radius));
                }
            }
            for &repellent in &cfg.nutrient_repellents {
                let delta = repellent - tip;
                let dist = delta.length();
                if dist < radius && cfg.nutrient_repulsion > 0.0 {
                    heading -= delta.normalized() * (cfg.nutrient_repulsion * (1.0 - dist / radius));
                }
            }
        }

        // An attached grid wins over the global vector
        let bias = match (self.anisotropy, cfg.anisotropy.get()) {
            (Some(grid), _) => Some(grid.direction_at(tip)),
            (None, Some(direction)) => Some(direction.normalized()),
            (None, None) => None,
        };
        if let Some(bias) = bias {
            heading += bias * cfg.anisotropy_strength;
        }

        if cfg.random_walk > 0.0 {
            heading += sample_cone(Vec3::Z, 180.0, rng) * cfg.random_walk;
        }

        let blend = cfg.direction_memory_blend;
        if blend > 0.0 {
            heading = previous * blend + heading.normalized() * (1.0 - blend);
        }

        let heading = heading.normalized();
        if heading.is_zero() || !heading.is_finite() {
            tracing::trace!(segment = %segment.id(), "tropisms cancelled out, keeping heading");
            return previous;
        }
        heading
    }
}

/// Linear ramp from 0 at `gravi_angle_start` to `gravitropism` at `gravi_angle_end`.
fn gravity_strength(cfg: &SimulationConfig, z: f64) -> f64 {
    if z < cfg.gravi_angle_start {
        0.0
    } else if z > cfg.gravi_angle_end {
        cfg.gravitropism
    } else {
        let t = (z - cfg.gravi_angle_start) / (cfg.gravi_angle_end - cfg.gravi_angle_start);
        t * cfg.gravitropism
    }
}
