//! Three-dimensional hyphal growth: a network of segments that extend,
//! branch, turn in response to tropisms and die, driven one step at a time.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod control;
pub mod error;
pub mod field;
pub mod grid;
pub mod orientator;
pub mod persist;
pub mod segment;
pub mod simulation;
pub mod types;

pub use aggregator::FieldAggregator;
pub use config::{SimulationConfig, Toggle};
pub use error::{Error, Result};
pub use field::{FieldSource, LineSource, NutrientSource, PointSource, SegmentSource, SourceId};
pub use orientator::Orientator;
pub use segment::Segment;
pub use simulation::{RunSummary, Simulation, SimulationStats, StepReport};
pub use types::{Color, SegmentId, Vec3};
