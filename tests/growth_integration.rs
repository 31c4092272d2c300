use hyphal_growth::{
    persist, FieldSource, PointSource, Segment, SegmentId, Simulation, SimulationConfig, Toggle,
    Vec3,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;

fn branching_config() -> SimulationConfig {
    SimulationConfig {
        branch_probability: 0.3,
        max_branches: 3,
        random_walk: 0.4,
        ..SimulationConfig::default()
    }
}

fn grow(config: SimulationConfig, seed: u64, steps: u64) -> Simulation {
    let mut sim = Simulation::with_config(config).expect("valid config");
    let mut rng = StdRng::seed_from_u64(seed);
    sim.seed_at_origin(&mut rng);
    sim.run(steps, &mut rng);
    sim
}

fn live_ids(sim: &Simulation) -> Vec<SegmentId> {
    sim.get_tips().iter().map(|s| s.id()).collect()
}

#[test]
fn same_seed_same_network() {
    let a = grow(branching_config(), 77, 25);
    let b = grow(branching_config(), 77, 25);
    assert_eq!(a.biomass_history, b.biomass_history);
    assert_eq!(a.segments.len(), b.segments.len());
    for (x, y) in a.segments.iter().zip(&b.segments) {
        assert_eq!(x.end(), y.end());
        assert_eq!(x.is_dead(), y.is_dead());
    }
}

#[test]
fn invariants_hold_across_steps() {
    let config = branching_config();
    let max_branches = config.max_branches;
    let mut sim = Simulation::with_config(config).unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    sim.seed(Vec3::ZERO, Vec3::Z);

    let mut flags: Vec<(bool, bool)> = Vec::new();
    for _ in 0..30 {
        sim.step(&mut rng);
        for (i, s) in sim.segments.iter().enumerate() {
            assert_eq!(s.id(), SegmentId(i));
            assert!((s.length() - s.start().distance_to(s.end())).abs() < 1e-9);
            assert!((s.orientation().length() - 1.0).abs() < 1e-9);
            assert!((s.direction_memory().length() - 1.0).abs() < 1e-9);
            assert!(s.branches_made() <= max_branches);
            assert_eq!(s.children().len(), s.branches_made() as usize);
            for &child in s.children() {
                assert_eq!(sim.segments[child.index()].parent(), Some(s.id()));
            }
            if let Some(&(was_tip, was_dead)) = flags.get(i) {
                assert!(was_tip || !s.is_tip(), "segment {i} became a tip again");
                assert!(!was_dead || s.is_dead(), "segment {i} came back to life");
            }
        }
        flags = sim
            .segments
            .iter()
            .map(|s| (s.is_tip(), s.is_dead()))
            .collect();
    }
    assert!(sim.segments.len() > 1);
}

#[test]
fn get_tips_is_idempotent() {
    let sim = grow(branching_config(), 3, 10);
    assert_eq!(live_ids(&sim), live_ids(&sim));
    let expected: Vec<SegmentId> = sim
        .get_all_segments()
        .iter()
        .filter(|s| s.is_tip() && !s.is_dead())
        .map(Segment::id)
        .collect();
    assert_eq!(live_ids(&sim), expected);
}

#[test]
fn pruning_caps_live_tips_exactly() {
    let mut sim = Simulation::with_config(SimulationConfig {
        branch_probability: 1.0,
        max_supported_tips: Toggle::Enabled(5),
        ..SimulationConfig::default()
    })
    .unwrap();
    let mut rng = StdRng::seed_from_u64(21);
    sim.seed(Vec3::ZERO, Vec3::Z);

    // every tip branches every step: 1 -> 2 -> 4
    sim.step(&mut rng);
    sim.step(&mut rng);
    assert_eq!(sim.live_tip_count(), 4);

    let before: HashSet<SegmentId> = live_ids(&sim).into_iter().collect();
    let existing = sim.segments.len();
    let report = sim.step(&mut rng);

    // 8 candidates, 3 pruned
    assert_eq!(report.branched, 4);
    assert_eq!(report.pruned, 3);
    assert_eq!(sim.live_tip_count(), 5);
    for id in live_ids(&sim) {
        assert!(before.contains(&id) || id.index() >= existing);
    }
}

#[test]
fn point_source_and_rotation_basics() {
    let source = PointSource::new(Vec3::ZERO, 1.0, 1.0);
    assert!((source.field(Vec3::X) - 0.5).abs() < 1e-12);
    assert!((source.field(Vec3::ZERO) - 1.0).abs() < 1e-12);

    let rotated = Vec3::X.rotated_around(Vec3::Z, 90.0);
    assert!(rotated.distance_to(Vec3::Y) < 1e-9);
}

#[test]
fn saved_network_reloads_with_same_tree() {
    let sim = grow(branching_config(), 12, 15);
    let json = persist::to_json_string(&sim).unwrap();
    let loaded = persist::from_json_str(&json).unwrap();
    assert_eq!(loaded.segments.len(), sim.segments.len());
    assert_eq!(live_ids(&loaded), live_ids(&sim));
    for (a, b) in sim.segments.iter().zip(&loaded.segments) {
        assert_eq!(a.parent(), b.parent());
        assert_eq!(a.children(), b.children());
    }
}
