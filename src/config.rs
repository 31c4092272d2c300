// Global configuration for the growth engine

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{Color, Vec3};

/// A parameter that can be switched off. Disabled parameters fall back to the
/// neutral behaviour documented on the field that uses them (usually "no limit").
///
/// Serialized as the bare value when enabled and `null` when disabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Toggle<T> {
    #[default]
    Disabled,
    Enabled(T),
}

impl<T> Toggle<T> {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Toggle::Enabled(_))
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Toggle::Enabled(v) => Some(v),
            Toggle::Disabled => None,
        }
    }
}

impl<T: Copy> Toggle<T> {
    pub fn get(&self) -> Option<T> {
        self.as_option().copied()
    }
}

impl<T> From<Option<T>> for Toggle<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Toggle::Enabled(v),
            None => Toggle::Disabled,
        }
    }
}

impl<T: Serialize> Serialize for Toggle<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.as_option().serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Toggle<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Toggle::from)
    }
}

/// Axis-aligned box tips are confined to.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Clamps `p` onto the box. Returns the clamped point and whether any
    /// coordinate had to move.
    pub fn clamp(&self, p: Vec3) -> (Vec3, bool) {
        let clamped = Vec3::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
            p.z.clamp(self.min.z, self.max.z),
        );
        (clamped, clamped != p)
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new(Vec3::new(-10.0, -10.0, -10.0), Vec3::new(10.0, 10.0, 10.0))
    }
}

/// Extent of the 2D density grid, centred on the origin.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub width: f64,
    pub height: f64,
    pub resolution: f64,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            width: 100.0,
            height: 100.0,
            resolution: 1.0,
        }
    }
}

/// Laplace-noise colour drift applied to a child with `probability`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorMutation {
    pub probability: f64,
    pub scale: f64,
}

impl Default for ColorMutation {
    fn default() -> Self {
        Self {
            probability: 0.05,
            scale: 0.02,
        }
    }
}

// Configuration struct for simulation parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    // Timing
    pub growth_rate: f64,
    pub time_step: f64,

    // Growth modifiers
    /// `rate *= 1 + length * coef`. Disabled: no length scaling.
    pub length_growth_coef: Toggle<f64>,
    /// `rate /= age^exponent`. Disabled: no slowdown.
    pub age_slowdown_exponent: Toggle<f64>,
    /// Tips that leave the box are clamped to its face and stop. Disabled: unbounded.
    pub volume: Toggle<BoundingBox>,

    // Branching
    pub branching_enabled: bool,
    pub branch_probability: f64,
    pub max_branches: u32,
    /// Half-angle of the sampling cone, degrees.
    pub branch_angle_spread: f64,
    /// Refuse branching past this age. Disabled: no cutoff.
    pub branch_time_window: Toggle<f64>,
    pub min_tip_age: Toggle<f64>,
    pub min_tip_length: Toggle<f64>,
    /// When false, a segment that already has a child cannot branch again.
    pub secondary_branching: bool,
    /// Refuse branching when nearby hyphal density reaches this. Disabled: no gate.
    pub branching_density: Toggle<f64>,
    /// Refuse branching when the sampled field reaches this. Disabled: no gate.
    pub field_threshold: Toggle<f64>,
    /// Sample the field gate at every recorded sub-segment point, not just the tip.
    pub complete_evaluation: bool,
    /// Also sample the field gate at the junction with the parent.
    pub evaluate_junction: bool,
    pub optimal_branch_orientation: bool,
    /// Branch directions further than this from straight down are snapped to it, degrees.
    pub plagiotropism_tolerance: Toggle<f64>,
    pub leading_branch_prob: f64,
    pub allow_internal_branching: bool,
    pub curvature_branch_bias: f64,

    // Tropisms
    pub autotropism: f64,
    pub autotropism_impact: f64,
    pub field_alignment_boost: f64,
    pub field_curvature_influence: f64,
    pub curvature_epsilon: f64,
    pub density_avoidance: bool,
    pub gravitropism: f64,
    pub gravi_angle_start: f64,
    pub gravi_angle_end: f64,
    pub use_nutrient_field: bool,
    pub nutrient_attraction: f64,
    pub nutrient_repulsion: f64,
    pub nutrient_attractors: Vec<Vec3>,
    pub nutrient_repellents: Vec<Vec3>,
    pub nutrient_radius: f64,
    pub nutrient_decay: f64,
    /// Global growth bias; an attached anisotropy grid takes precedence.
    pub anisotropy: Toggle<Vec3>,
    pub anisotropy_strength: f64,
    pub random_walk: f64,
    pub direction_memory_blend: f64,

    // Death & pruning
    pub max_age: Toggle<f64>,
    pub max_length: Toggle<f64>,
    pub density_threshold: Toggle<f64>,
    /// Locality radius for field culling and neighbour counts. Disabled: unlimited.
    pub neighbour_radius: Toggle<f64>,
    pub min_supported_tips: Toggle<usize>,
    pub max_neighbour_tips: Toggle<usize>,
    /// Global cap on live tips; the excess is pruned at random. Disabled: no cap.
    pub max_supported_tips: Toggle<usize>,

    // Segment field sources
    pub segment_field_strength: f64,
    pub segment_field_decay: f64,
    pub density_from_tips: bool,
    pub density_from_branches: bool,

    // Density grid
    pub density_grid: Toggle<GridSpec>,

    // Lineage colour
    pub initial_color: Color,
    pub color_mutation: Toggle<ColorMutation>,

    // Run control
    pub seed: u64,
    pub auto_stop: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            growth_rate: 1.0,
            time_step: 1.0,
            length_growth_coef: Toggle::Disabled,
            age_slowdown_exponent: Toggle::Disabled,
            volume: Toggle::Disabled,
            branching_enabled: true,
            branch_probability: 0.1,
            max_branches: 8,
            branch_angle_spread: 60.0,
            branch_time_window: Toggle::Disabled,
            min_tip_age: Toggle::Disabled,
            min_tip_length: Toggle::Disabled,
            secondary_branching: true,
            branching_density: Toggle::Disabled,
            field_threshold: Toggle::Disabled,
            complete_evaluation: false,
            evaluate_junction: false,
            optimal_branch_orientation: false,
            plagiotropism_tolerance: Toggle::Disabled,
            leading_branch_prob: 0.0,
            allow_internal_branching: false,
            curvature_branch_bias: 0.25,
            autotropism: 1.0,
            autotropism_impact: 1.0,
            field_alignment_boost: 0.0,
            field_curvature_influence: 0.0,
            curvature_epsilon: 1.0,
            density_avoidance: false,
            gravitropism: 0.0,
            gravi_angle_start: 100.0,
            gravi_angle_end: 500.0,
            use_nutrient_field: false,
            nutrient_attraction: 0.0,
            nutrient_repulsion: 0.0,
            nutrient_attractors: vec![Vec3::new(30.0, 30.0, 0.0)],
            nutrient_repellents: vec![Vec3::new(-20.0, -20.0, 0.0)],
            nutrient_radius: 50.0,
            nutrient_decay: 1.0,
            anisotropy: Toggle::Disabled,
            anisotropy_strength: 0.1,
            random_walk: 0.2,
            direction_memory_blend: 0.1,
            max_age: Toggle::Disabled,
            max_length: Toggle::Enabled(50.0),
            density_threshold: Toggle::Disabled,
            neighbour_radius: Toggle::Enabled(400.0),
            min_supported_tips: Toggle::Disabled,
            max_neighbour_tips: Toggle::Disabled,
            max_supported_tips: Toggle::Enabled(1000),
            segment_field_strength: 1.0,
            segment_field_decay: 1.5,
            density_from_tips: true,
            density_from_branches: true,
            density_grid: Toggle::Disabled,
            initial_color: Color::default(),
            color_mutation: Toggle::Disabled,
            seed: 123,
            auto_stop: true,
        }
    }
}

const DEFAULT_PATHS: [&str; 3] = ["config.yaml", "config.yml", "config.json"];

impl SimulationConfig {
    /// Loads a YAML (`.yaml`/`.yml`) or JSON file and validates it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config: SimulationConfig = if is_yaml {
            serde_yaml::from_str(&text)?
        } else {
            serde_json::from_str(&text)?
        };
        config.validate()?;
        Ok(config)
    }

    /// First readable file among `config.yaml`, `config.yml`, `config.json` in the
    /// working directory, or the defaults when none exists. A file that exists but
    /// fails to parse or validate is an error.
    pub fn from_default_paths() -> Result<Self> {
        for candidate in DEFAULT_PATHS {
            if Path::new(candidate).is_file() {
                tracing::info!(path = candidate, "loading configuration");
                return Self::from_file(candidate);
            }
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        fn finite(field: &'static str, v: f64) -> Result<()> {
            if v.is_finite() {
                Ok(())
            } else {
                Err(Error::invalid(field, format!("{v} is not finite")))
            }
        }
        fn unit_interval(field: &'static str, v: f64) -> Result<()> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(Error::invalid(field, format!("{v} is outside [0, 1]")))
            }
        }
        fn positive(field: &'static str, v: f64) -> Result<()> {
            if v > 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(Error::invalid(field, format!("{v} must be positive")))
            }
        }
        fn non_negative(field: &'static str, v: f64) -> Result<()> {
            if v >= 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(Error::invalid(field, format!("{v} must be non-negative")))
            }
        }

        positive("time_step", self.time_step)?;
        non_negative("growth_rate", self.growth_rate)?;
        unit_interval("branch_probability", self.branch_probability)?;
        unit_interval("leading_branch_prob", self.leading_branch_prob)?;
        unit_interval("direction_memory_blend", self.direction_memory_blend)?;
        unit_interval("curvature_branch_bias", self.curvature_branch_bias)?;
        if !(0.0..=180.0).contains(&self.branch_angle_spread) {
            return Err(Error::invalid(
                "branch_angle_spread",
                format!("{} is outside [0, 180] degrees", self.branch_angle_spread),
            ));
        }
        if let Some(coef) = self.length_growth_coef.get() {
            finite("length_growth_coef", coef)?;
        }
        if let Some(exp) = self.age_slowdown_exponent.get() {
            non_negative("age_slowdown_exponent", exp)?;
        }
        if let Some(bounds) = self.volume.get() {
            let ok = bounds.min.x <= bounds.max.x
                && bounds.min.y <= bounds.max.y
                && bounds.min.z <= bounds.max.z;
            if !ok || !bounds.min.is_finite() || !bounds.max.is_finite() {
                return Err(Error::invalid("volume", "min must not exceed max on any axis"));
            }
        }
        if let Some(tol) = self.plagiotropism_tolerance.get() {
            if !(0.0..=180.0).contains(&tol) {
                return Err(Error::invalid(
                    "plagiotropism_tolerance",
                    format!("{tol} is outside [0, 180] degrees"),
                ));
            }
        }
        for (field, v) in [
            ("autotropism", self.autotropism),
            ("autotropism_impact", self.autotropism_impact),
            ("field_alignment_boost", self.field_alignment_boost),
            ("field_curvature_influence", self.field_curvature_influence),
            ("gravitropism", self.gravitropism),
            ("anisotropy_strength", self.anisotropy_strength),
            ("segment_field_strength", self.segment_field_strength),
        ] {
            finite(field, v)?;
        }
        positive("curvature_epsilon", self.curvature_epsilon)?;
        non_negative("random_walk", self.random_walk)?;
        non_negative("nutrient_attraction", self.nutrient_attraction)?;
        non_negative("nutrient_repulsion", self.nutrient_repulsion)?;
        non_negative("nutrient_decay", self.nutrient_decay)?;
        non_negative("segment_field_decay", self.segment_field_decay)?;
        positive("nutrient_radius", self.nutrient_radius)?;
        if self.gravitropism > 0.0 && self.gravi_angle_end <= self.gravi_angle_start {
            return Err(Error::invalid(
                "gravi_angle_end",
                "must be greater than gravi_angle_start when gravitropism is active",
            ));
        }
        if let Some(radius) = self.neighbour_radius.get() {
            positive("neighbour_radius", radius)?;
        }
        if let Some(spec) = self.density_grid.get() {
            positive("density_grid.width", spec.width)?;
            positive("density_grid.height", spec.height)?;
            positive("density_grid.resolution", spec.resolution)?;
        }
        for channel in self.initial_color.channels() {
            unit_interval("initial_color", channel)?;
        }
        if let Some(mutation) = self.color_mutation.get() {
            unit_interval("color_mutation.probability", mutation.probability)?;
            non_negative("color_mutation.scale", mutation.scale)?;
        }
        Ok(())
    }

    /// Effective self-interaction weight of the trail field on a tip's heading.
    pub fn autotropism_scale(&self) -> f64 {
        self.autotropism * self.autotropism_impact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SimulationConfig::default().validate().unwrap();
    }

    #[test]
    fn toggles_serialize_as_value_or_null() {
        let config = SimulationConfig {
            max_age: Toggle::Enabled(12.5),
            ..SimulationConfig::default()
        };
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["max_age"], serde_json::json!(12.5));
        assert_eq!(value["volume"], serde_json::Value::Null);

        let back: SimulationConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "growth_rate: 2.0\nmax_length: ~\nvolume:\n  min: [-1, -1, -1]\n  max: [1, 1, 1]\n";
        let config: SimulationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.growth_rate, 2.0);
        assert_eq!(config.max_length, Toggle::Disabled);
        assert_eq!(
            config.volume.get().map(|b| b.max),
            Some(Vec3::new(1.0, 1.0, 1.0))
        );
        assert_eq!(config.max_branches, SimulationConfig::default().max_branches);
    }

    #[test]
    fn invalid_values_are_refused() {
        let bad_prob = SimulationConfig {
            branch_probability: 1.5,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            bad_prob.validate(),
            Err(Error::InvalidConfig { field: "branch_probability", .. })
        ));

        let bad_step = SimulationConfig {
            time_step: 0.0,
            ..SimulationConfig::default()
        };
        assert!(bad_step.validate().is_err());

        let inverted_box = SimulationConfig {
            volume: Toggle::Enabled(BoundingBox::new(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO)),
            ..SimulationConfig::default()
        };
        assert!(inverted_box.validate().is_err());

        let bad_gravity = SimulationConfig {
            gravitropism: 0.5,
            gravi_angle_start: 10.0,
            gravi_angle_end: 5.0,
            ..SimulationConfig::default()
        };
        assert!(bad_gravity.validate().is_err());
    }

    #[test]
    fn bounding_box_clamps_to_faces() {
        let b = BoundingBox::default();
        let (inside, moved) = b.clamp(Vec3::new(1.0, 2.0, 3.0));
        assert!(!moved);
        assert_eq!(inside, Vec3::new(1.0, 2.0, 3.0));

        let (outside, moved) = b.clamp(Vec3::new(0.0, 0.0, 12.0));
        assert!(moved);
        assert_eq!(outside, Vec3::new(0.0, 0.0, 10.0));
    }

    #[test]
    fn loads_json_file() {
        let path = std::env::temp_dir().join(format!("hyphal-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"growth_rate": 0.5, "max_supported_tips": 10}"#).unwrap();
        let config = SimulationConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.growth_rate, 0.5);
        assert_eq!(config.max_supported_tips, Toggle::Enabled(10));
    }
}
