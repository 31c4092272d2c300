use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::aggregator::FieldAggregator;
use crate::config::SimulationConfig;
use crate::error::Result;
use crate::field::{FieldSource, NutrientSource, SourceId};
use crate::grid::{DensityField, DensityGrid, DirectionField};
use crate::orientator::Orientator;
use crate::segment::{sample_cone, Segment};
use crate::types::{Color, SegmentId, Vec3};

/// One live tip as recorded at the end of a step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TipSnapshot {
    pub time: f64,
    pub position: Vec3,
    pub age: f64,
    pub length: f64,
}

/// Tip positions after a completed step.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepRecord {
    pub time: f64,
    pub tips: Vec<Vec3>,
}

/// Why a tip was killed in the death pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeathCause {
    Age,
    Length,
    Density,
    Repellent,
    Isolated,
    Crowded,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StepReport {
    pub grown: usize,
    pub killed: usize,
    pub branched: usize,
    pub pruned: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SimulationStats {
    pub time: f64,
    pub steps: u64,
    pub segments: usize,
    pub live_tips: usize,
    pub dead: usize,
    pub biomass: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub steps_run: u64,
    pub stopped_early: bool,
    pub stats: SimulationStats,
}

// Simulation state - the segment arena, clock and histories
#[derive(Clone, Debug, Default)]
pub struct SimulationState {
    /// Every segment ever created, in creation order. Index == `SegmentId`.
    pub segments: Vec<Segment>,
    pub time: f64,
    pub steps: u64,
    pub step_history: Vec<StepRecord>,
    pub time_series: Vec<Vec<TipSnapshot>>,
    pub biomass_history: Vec<f64>,
}

impl SimulationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// The growth engine: owns the network, the configuration and the environment
/// the tips sense.
pub struct Simulation {
    pub state: SimulationState,
    pub config: SimulationConfig,
    field: FieldAggregator,
    nutrient_sources: Vec<SourceId>,
    density: Option<Box<dyn DensityField>>,
    external_density: bool,
    anisotropy: Option<Box<dyn DirectionField>>,
}

// Deref so callers can write sim.segments instead of sim.state.segments
impl std::ops::Deref for Simulation {
    type Target = SimulationState;
    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl std::ops::DerefMut for Simulation {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.state
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation {
    pub fn new() -> Self {
        Self::build(SimulationConfig::default())
    }

    /// Validates `config` and builds an empty network around it.
    pub fn with_config(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SimulationConfig) -> Self {
        let mut sim = Self {
            state: SimulationState::new(),
            field: FieldAggregator::new(config.neighbour_radius.get()),
            config,
            nutrient_sources: Vec::new(),
            density: None,
            external_density: false,
            anisotropy: None,
        };
        sim.install_environment();
        sim
    }

    /// Swaps in a new configuration between steps. The current one is kept
    /// if validation fails.
    pub fn set_config(&mut self, config: SimulationConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.install_environment();
        Ok(())
    }

    // Nutrient sources, neighbour radius and the built-in density grid all
    // follow the configuration
    fn install_environment(&mut self) {
        self.field.set_neighbour_radius(self.config.neighbour_radius.get());

        for id in self.nutrient_sources.drain(..) {
            self.field.remove_source(id);
        }
        if self.config.use_nutrient_field {
            let cfg = &self.config;
            for &location in &cfg.nutrient_attractors {
                let id = self.field.add_source(NutrientSource::attractor(
                    location,
                    cfg.nutrient_attraction,
                    cfg.nutrient_decay,
                ));
                self.nutrient_sources.push(id);
            }
            for &location in &cfg.nutrient_repellents {
                let id = self.field.add_source(NutrientSource::repellent(
                    location,
                    cfg.nutrient_repulsion,
                    cfg.nutrient_decay,
                ));
                self.nutrient_sources.push(id);
            }
        }

        if !self.external_density {
            self.density = self.config.density_grid.get().map(|spec| {
                let mut grid = DensityGrid::new(spec);
                grid.update_from(&self.state.segments);
                Box::new(grid) as Box<dyn DensityField>
            });
        }
    }

    /// Plants a root tip and returns its id.
    pub fn seed(&mut self, location: Vec3, orientation: Vec3) -> SegmentId {
        let color = self.config.initial_color;
        self.seed_with_color(location, orientation, color)
    }

    pub fn seed_with_color(&mut self, location: Vec3, orientation: Vec3, color: Color) -> SegmentId {
        let id = SegmentId(self.state.segments.len());
        self.state
            .segments
            .push(Segment::seed(id, location, orientation, color));
        tracing::debug!(segment = %id, %location, "seeded");
        id
    }

    /// Plants a root tip at the origin with a uniformly random heading.
    pub fn seed_at_origin<R: Rng>(&mut self, rng: &mut R) -> SegmentId {
        let heading = sample_cone(Vec3::Z, 180.0, rng);
        self.seed(Vec3::ZERO, heading)
    }

    /// Registers a persistent field source (substrate line, extra point, ...).
    pub fn add_field_source(&mut self, source: impl FieldSource + 'static) -> SourceId {
        self.field.add_source(source)
    }

    pub fn field(&self) -> &FieldAggregator {
        &self.field
    }

    /// Uses an externally managed density field instead of the configured grid.
    pub fn set_density_field(&mut self, density: Box<dyn DensityField>) {
        self.density = Some(density);
        self.external_density = true;
    }

    /// Drops any external density field and goes back to the configured grid.
    pub fn clear_density_field(&mut self) {
        self.external_density = false;
        self.install_environment();
    }

    pub fn density_field(&self) -> Option<&dyn DensityField> {
        self.density.as_deref()
    }

    pub fn set_anisotropy_field(&mut self, anisotropy: Box<dyn DirectionField>) {
        self.anisotropy = Some(anisotropy);
    }

    pub fn clear_anisotropy_field(&mut self) {
        self.anisotropy = None;
    }

    /// Discards every segment-backed field source and recreates one per
    /// non-dead segment from its current geometry. Fixed sources are kept.
    pub fn rebuild_field_sources(&mut self) {
        let cfg = &self.config;
        let (strength, decay) = (cfg.segment_field_strength, cfg.segment_field_decay);
        let (from_tips, from_branches) = (cfg.density_from_tips, cfg.density_from_branches);
        self.field.set_segment_sources(
            self.state
                .segments
                .iter()
                .filter(|s| !s.is_dead())
                .filter(|s| if s.is_tip() { from_tips } else { from_branches })
                .map(|s| (s.id(), s.field_source(strength, decay))),
        );
    }

    /// Advances the network by one `time_step`.
    pub fn step<R: Rng>(&mut self, rng: &mut R) -> StepReport {
        let mut report = StepReport::default();
        let tip_count = self.live_tip_count();

        self.rebuild_field_sources();
        self.orient_tips(rng);

        // Grow
        let (rate, dt) = (self.config.growth_rate, self.config.time_step);
        for segment in self.state.segments.iter_mut() {
            if segment.is_dead() {
                continue;
            }
            let growing = segment.is_live_tip();
            if growing {
                report.grown += 1;
            }
            let before = segment.end();
            segment.grow(rate, dt, &self.config);
            debug_assert!(
                growing || segment.end() == before,
                "segment {} grew without being a live tip",
                segment.id()
            );
            segment.update();
        }
        self.rebuild_field_sources();

        // Death
        for idx in 0..self.state.segments.len() {
            if !self.state.segments[idx].is_live_tip() {
                continue;
            }
            if let Some(cause) = self.death_cause(idx) {
                let segment = &mut self.state.segments[idx];
                segment.kill();
                report.killed += 1;
                tracing::trace!(segment = %segment.id(), ?cause, "tip died");
            }
        }

        // Branch; children are appended afterwards so they neither grow nor
        // branch in the step that created them
        let existing = self.state.segments.len();
        let mut children = Vec::new();
        for idx in 0..existing {
            let segment = &mut self.state.segments[idx];
            if segment.is_dead() || !(segment.is_tip() || self.config.allow_internal_branching) {
                continue;
            }
            let child_id = SegmentId(existing + children.len());
            if let Some(child) = segment.maybe_branch(
                self.config.branch_probability,
                tip_count,
                child_id,
                &self.config,
                &self.field,
                rng,
            ) {
                children.push(child);
            }
        }
        report.branched = children.len();
        self.state.segments.extend(children);

        // Snapshot
        let now = self.state.time;
        let snapshot: Vec<TipSnapshot> = self
            .tips()
            .map(|tip| TipSnapshot {
                time: now,
                position: tip.end(),
                age: tip.age(),
                length: tip.length(),
            })
            .collect();
        self.state.time_series.push(snapshot);
        self.state.time += dt;

        report.pruned = self.prune(rng);

        let tips: Vec<Vec3> = self.tips().map(Segment::end).collect();
        self.state.step_history.push(StepRecord {
            time: self.state.time,
            tips,
        });
        let biomass = self.biomass();
        self.state.biomass_history.push(biomass);
        self.state.steps += 1;

        if let Some(density) = self.density.as_mut() {
            density.refresh(&self.state.segments);
        }

        tracing::debug!(
            time = self.state.time,
            tips = self.live_tip_count(),
            segments = self.state.segments.len(),
            biomass,
            branched = report.branched,
            killed = report.killed,
            pruned = report.pruned,
            "step complete"
        );
        report
    }

    fn orient_tips<R: Rng>(&mut self, rng: &mut R) {
        let orientator = Orientator::new(&self.config, &self.field)
            .with_density(self.density.as_deref())
            .with_anisotropy(self.anisotropy.as_deref());
        for segment in self.state.segments.iter_mut() {
            if !segment.is_live_tip() {
                continue;
            }
            let heading = orientator.compute(segment, rng);
            debug_assert!(heading.is_finite(), "orientator produced {heading}");
            segment.set_orientation(heading);
        }
    }

    // First death check that fires for the live tip at `idx`, in order
    fn death_cause(&self, idx: usize) -> Option<DeathCause> {
        let cfg = &self.config;
        let segment = &self.state.segments[idx];
        let own = [SourceId::Segment(segment.id())];

        if cfg.max_age.get().is_some_and(|max| segment.age() > max) {
            return Some(DeathCause::Age);
        }
        if cfg.max_length.get().is_some_and(|max| segment.length() > max) {
            return Some(DeathCause::Length);
        }
        if let Some(threshold) = cfg.density_threshold.get() {
            if self.field.field_value(segment.end(), &own) > threshold {
                return Some(DeathCause::Density);
            }
        }
        if cfg.use_nutrient_field
            && self.field.field_value(segment.end(), &own) < -cfg.nutrient_repulsion.abs()
        {
            return Some(DeathCause::Repellent);
        }

        let (min, max) = (cfg.min_supported_tips.get(), cfg.max_neighbour_tips.get());
        if min.is_some() || max.is_some() {
            let radius = cfg.neighbour_radius.get().unwrap_or(f64::INFINITY);
            let neighbours = self
                .state
                .segments
                .iter()
                .enumerate()
                .filter(|(other, s)| *other != idx && s.is_live_tip())
                .filter(|(_, s)| segment.end().distance_to(s.end()) <= radius)
                .count();
            if min.is_some_and(|min| neighbours < min) {
                return Some(DeathCause::Isolated);
            }
            if max.is_some_and(|max| neighbours > max) {
                return Some(DeathCause::Crowded);
            }
        }
        None
    }

    // Kills a random excess of live tips above `max_supported_tips`
    fn prune<R: Rng>(&mut self, rng: &mut R) -> usize {
        let Some(cap) = self.config.max_supported_tips.get() else {
            return 0;
        };
        let live: Vec<usize> = (0..self.state.segments.len())
            .filter(|&i| self.state.segments[i].is_live_tip())
            .collect();
        if live.len() <= cap {
            return 0;
        }
        let excess = live.len() - cap;
        tracing::warn!(tips = live.len(), cap, excess, "pruning excess tips");
        for &idx in live.choose_multiple(rng, excess) {
            self.state.segments[idx].kill();
        }
        excess
    }

    /// Steps up to `steps` times, stopping early once no tips remain when
    /// `auto_stop` is on.
    pub fn run<R: Rng>(&mut self, steps: u64, rng: &mut R) -> RunSummary {
        let mut steps_run = 0;
        let mut stopped_early = false;
        for _ in 0..steps {
            if self.should_stop() {
                tracing::info!(time = self.state.time, steps = steps_run, "auto-stop: no live tips");
                stopped_early = true;
                break;
            }
            self.step(rng);
            steps_run += 1;
        }
        RunSummary {
            steps_run,
            stopped_early,
            stats: self.stats(),
        }
    }

    /// True when `auto_stop` is on and no live tip remains.
    pub fn should_stop(&self) -> bool {
        self.config.auto_stop && self.live_tip_count() == 0
    }

    /// Forgets the network and its histories; configuration and fixed field
    /// sources are kept.
    pub fn reset(&mut self) {
        self.state.clear();
        self.rebuild_field_sources();
        if let Some(density) = self.density.as_mut() {
            density.refresh(&self.state.segments);
        }
    }

    // Installs a reconstructed network; histories start empty
    pub(crate) fn restore(&mut self, segments: Vec<Segment>, time: f64) {
        self.state.clear();
        self.state.segments = segments;
        self.state.time = time;
        self.rebuild_field_sources();
        if let Some(density) = self.density.as_mut() {
            density.refresh(&self.state.segments);
        }
    }

    /// Live tips in creation order.
    pub fn tips(&self) -> impl Iterator<Item = &Segment> {
        self.state.segments.iter().filter(|s| s.is_live_tip())
    }

    pub fn get_tips(&self) -> Vec<&Segment> {
        self.tips().collect()
    }

    pub fn get_all_segments(&self) -> &[Segment] {
        &self.state.segments
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.state.segments.get(id.index())
    }

    pub fn live_tip_count(&self) -> usize {
        self.tips().count()
    }

    /// Total length of all non-dead segments.
    pub fn biomass(&self) -> f64 {
        self.state
            .segments
            .iter()
            .filter(|s| !s.is_dead())
            .map(Segment::length)
            .sum()
    }

    pub fn stats(&self) -> SimulationStats {
        SimulationStats {
            time: self.state.time,
            steps: self.state.steps,
            segments: self.state.segments.len(),
            live_tips: self.live_tip_count(),
            dead: self.state.segments.iter().filter(|s| s.is_dead()).count(),
            biomass: self.biomass(),
        }
    }
}
