//! JSON save/load of a grown network.
//!
//! Only the segment tree, the clock and the configuration are written. Step
//! histories are not persisted; a loaded simulation starts them afresh.
//! Each segment's growth polyline is reduced to one `(start, end)` span, so
//! branch curvature bias has no effect on a loaded segment until it has
//! recorded two more growth increments.
//!
//! Parents must precede their children in the saved order, as they do in the
//! live arena.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::config::SimulationConfig;
use crate::error::{Error, Result};
use crate::segment::Segment;
use crate::simulation::Simulation;
use crate::types::{Color, SegmentId, Vec3};

/// One segment as stored on disk. The parent is referenced by its position
/// in the `segments` array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedSegment {
    pub start: Vec3,
    pub end: Vec3,
    pub orientation: Vec3,
    pub direction_memory: Vec3,
    pub length: f64,
    pub age: f64,
    pub is_tip: bool,
    pub is_dead: bool,
    #[serde(default)]
    pub branches_made: u32,
    #[serde(default)]
    pub color: Color,
    pub parent_index: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SavedNetwork {
    pub time: f64,
    #[serde(default)]
    pub steps: u64,
    pub config: SimulationConfig,
    pub segments: Vec<SavedSegment>,
}

impl SavedNetwork {
    pub fn capture(sim: &Simulation) -> Self {
        Self {
            time: sim.state.time,
            steps: sim.state.steps,
            config: sim.config.clone(),
            segments: sim
                .state
                .segments
                .iter()
                .map(|s| SavedSegment {
                    start: s.start(),
                    end: s.end(),
                    orientation: s.orientation(),
                    direction_memory: s.direction_memory(),
                    length: s.length(),
                    age: s.age(),
                    is_tip: s.is_tip(),
                    is_dead: s.is_dead(),
                    branches_made: s.branches_made(),
                    color: s.color(),
                    parent_index: s.parent().map(SegmentId::index),
                })
                .collect(),
        }
    }

    /// Rebuilds a simulation. Children are re-linked from the parent
    /// indices once every record has been read.
    pub fn into_simulation(self) -> Result<Simulation> {
        let count = self.segments.len();
        let mut segments = Vec::with_capacity(count);
        for (index, saved) in self.segments.into_iter().enumerate() {
            let parent = match saved.parent_index {
                Some(p) if p >= count => {
                    return Err(Error::Persist(format!(
                        "segment {index} points at parent {p}, but only {count} segments were saved"
                    )))
                }
                Some(p) if p >= index => {
                    return Err(Error::Persist(format!(
                        "segment {index} points at parent {p}, which was not created before it"
                    )))
                }
                other => other.map(SegmentId),
            };
            segments.push(restore_segment(SegmentId(index), parent, saved));
        }

        for index in 0..count {
            let parent = segments[index].parent;
            if let Some(parent) = parent {
                segments[parent.index()].children.push(SegmentId(index));
            }
        }

        let mut sim = Simulation::with_config(self.config)?;
        sim.restore(segments, self.time);
        sim.state.steps = self.steps;
        Ok(sim)
    }
}

fn restore_segment(id: SegmentId, parent: Option<SegmentId>, saved: SavedSegment) -> Segment {
    let mut segment = Segment::new(id, parent, saved.start, saved.orientation, saved.color);
    let memory = saved.direction_memory.normalized();
    if !memory.is_zero() && memory.is_finite() {
        segment.direction_memory = memory;
    }
    segment.end = saved.end;
    segment.length = saved.length;
    segment.age = saved.age;
    segment.is_tip = saved.is_tip;
    segment.is_dead = saved.is_dead;
    segment.branches_made = saved.branches_made;
    // the polyline is not stored; one span stands in for it
    segment.subsegments = vec![(saved.start, saved.end)];
    segment
}

pub fn to_json_string(sim: &Simulation) -> Result<String> {
    Ok(serde_json::to_string_pretty(&SavedNetwork::capture(sim))?)
}

pub fn from_json_str(json: &str) -> Result<Simulation> {
    let saved: SavedNetwork = serde_json::from_str(json)?;
    saved.into_simulation()
}

pub fn save_json(sim: &Simulation, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, to_json_string(sim)?)?;
    tracing::info!(path = %path.display(), segments = sim.state.segments.len(), "network saved");
    Ok(())
}

pub fn load_json(path: impl AsRef<Path>) -> Result<Simulation> {
    let path = path.as_ref();
    let sim = from_json_str(&fs::read_to_string(path)?)?;
    tracing::info!(path = %path.display(), segments = sim.state.segments.len(), "network loaded");
    Ok(sim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn grown() -> Simulation {
        let mut sim = Simulation::with_config(SimulationConfig {
            branch_probability: 0.6,
            ..SimulationConfig::default()
        })
        .unwrap();
        sim.seed(Vec3::ZERO, Vec3::Z);
        let mut rng = StdRng::seed_from_u64(11);
        sim.run(8, &mut rng);
        sim
    }

    #[test]
    fn structure_survives_a_round_trip() {
        let sim = grown();
        let loaded = from_json_str(&to_json_string(&sim).unwrap()).unwrap();

        assert!((loaded.time - sim.time).abs() < 1e-9);
        assert_eq!(loaded.steps, sim.steps);
        assert_eq!(loaded.config.branch_probability, 0.6);
        assert_eq!(loaded.segments.len(), sim.segments.len());
        for (a, b) in sim.segments.iter().zip(&loaded.segments) {
            assert_eq!(a.id(), b.id());
            assert_eq!(a.parent(), b.parent());
            assert_eq!(a.children(), b.children());
            assert!(a.start().distance_to(b.start()) < 1e-9);
            assert!(a.end().distance_to(b.end()) < 1e-9);
            assert_eq!(a.is_tip(), b.is_tip());
            assert_eq!(a.is_dead(), b.is_dead());
            assert_eq!(a.branches_made(), b.branches_made());
        }
        assert!(loaded.biomass_history.is_empty());
        assert_eq!(loaded.field().segment_source_count(), sim.field().segment_source_count());
    }

    #[test]
    fn loaded_network_keeps_growing() {
        let mut loaded = from_json_str(&to_json_string(&grown()).unwrap()).unwrap();
        let before = loaded.segments.len();
        let mut rng = StdRng::seed_from_u64(3);
        loaded.run(3, &mut rng);
        assert!(loaded.segments.len() >= before);
        assert_eq!(loaded.biomass_history.len(), 3);
    }

    #[test]
    fn dangling_parent_is_rejected() {
        let mut saved = SavedNetwork::capture(&grown());
        let n = saved.segments.len();
        saved.segments[0].parent_index = Some(n + 4);
        assert!(matches!(saved.into_simulation(), Err(Error::Persist(_))));
    }

    #[test]
    fn parent_must_come_before_child() {
        let mut saved = SavedNetwork::capture(&grown());
        let first = saved.segments[0].clone();
        saved.segments.push(first);
        saved.segments[0].parent_index = Some(1);
        saved.segments[1].parent_index = Some(0);
        assert!(matches!(saved.clone().into_simulation(), Err(Error::Persist(_))));

        saved.segments[0].parent_index = None;
        saved.segments[1].parent_index = Some(1);
        assert!(matches!(saved.into_simulation(), Err(Error::Persist(_))));
    }

    #[test]
    fn invalid_saved_config_is_rejected() {
        let mut saved = SavedNetwork::capture(&grown());
        saved.config.time_step = -1.0;
        assert!(matches!(saved.into_simulation(), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn file_round_trip() {
        let sim = grown();
        let path = std::env::temp_dir().join(format!("hyphal-growth-{}.json", std::process::id()));
        save_json(&sim, &path).unwrap();
        let loaded = load_json(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(loaded.segments.len(), sim.segments.len());
    }
}
