use glam::Vec2;
use reflex_director_core::{DeterministicRng, Seed};
use reflex_director_system_placement::{AreaRect, PlacementTuning, SpatialPlacement};

fn average_nearest_neighbour(points: &[Vec2]) -> f32 {
    let total: f32 = points
        .iter()
        .enumerate()
        .map(|(index, point)| {
            points
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != index)
                .map(|(_, other)| other.distance(*point))
                .fold(f32::INFINITY, f32::min)
        })
        .sum();
    total / points.len() as f32
}

#[test]
fn recent_placements_stay_spread_out() {
    let area = AreaRect::new(0.0, 0.0, 1_200.0, 700.0);
    let mut failures = 0;
    for seed in 0..20u32 {
        let mut placement = SpatialPlacement::new(PlacementTuning::default());
        let mut rng = DeterministicRng::new(&Seed::from(seed));
        let points: Vec<Vec2> = (0..50)
            .map(|_| placement.choose_position(&area, 96.0, &mut rng))
            .collect();
        if average_nearest_neighbour(&points[points.len() - 10..]) <= 80.0 {
            failures += 1;
        }
    }
    assert!(failures <= 1, "{failures} seeds produced clustered placements");
}

#[test]
fn placement_replays_identically() {
    let area = AreaRect::new(40.0, 60.0, 800.0, 500.0);
    let run = || {
        let mut placement = SpatialPlacement::new(PlacementTuning::default());
        let mut rng = DeterministicRng::new(&Seed::from("replay"));
        (0..100)
            .map(|step| placement.choose_position(&area, 60.0 + step as f32, &mut rng))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn memory_is_bounded() {
    let tuning = PlacementTuning::default();
    let capacity = tuning.memory;
    let mut placement = SpatialPlacement::new(tuning);
    let mut rng = DeterministicRng::new(&Seed::from(9u32));
    let area = AreaRect::new(0.0, 0.0, 500.0, 500.0);
    for _ in 0..40 {
        let _ = placement.choose_position(&area, 50.0, &mut rng);
    }
    assert_eq!(placement.recent().len(), capacity);
}
