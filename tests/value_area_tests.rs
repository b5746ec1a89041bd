use delta_pivots::profile::{FinalizedProfile, PriceLevelAccumulator, ValueAreaCalculator};
use delta_pivots::{LevelError, Tick};

fn profile(levels: &[(f64, u64)]) -> PriceLevelAccumulator {
    let mut acc = PriceLevelAccumulator::new(0.25).unwrap();
    for (i, (price, volume)) in levels.iter().enumerate() {
        acc.add_tick(&Tick::ask(i as i64, *price, *volume));
    }
    acc
}

/// Volume within `[low, high]`, summed from the finalized levels.
fn volume_between(profile: &FinalizedProfile, low: f64, high: f64) -> u64 {
    profile
        .levels()
        .filter(|(p, _)| *p >= low - 1e-9 && *p <= high + 1e-9)
        .map(|(_, s)| s.volume)
        .sum()
}

#[test]
fn four_level_profile_expands_toward_heavier_couplet() {
    let mut acc = profile(&[(99.75, 10), (100.00, 50), (100.25, 30), (100.50, 10)]);
    let calc = ValueAreaCalculator::new(0.70).unwrap();
    let va = acc.value_area(&calc).unwrap();

    assert!((va.point_of_control - 100.00).abs() < f64::EPSILON);
    assert_eq!(va.total_volume, 100);
    // The couplet above (100.25 + 100.50 = 40) beats the clipped couplet
    // below (99.75 = 10), so one step reaches 90%.
    assert_eq!(va.volume, 90);
    assert!((va.coverage() - 0.90).abs() < 1e-12);
    assert!((va.low - 100.00).abs() < f64::EPSILON);
    assert!((va.high - 100.50).abs() < f64::EPSILON);
    assert!((va.breadth - 0.50).abs() < f64::EPSILON);
    assert!((va.mid - 100.25).abs() < f64::EPSILON);
    assert_eq!(va.last_step_volume, 40);
}

#[test]
fn value_area_is_contiguous_sufficient_and_minimal() {
    let profiles: Vec<Vec<(f64, u64)>> = vec![
        vec![(100.0, 1)],
        vec![(99.75, 10), (100.00, 50), (100.25, 30), (100.50, 10)],
        vec![(99.0, 5), (99.25, 5), (99.5, 5), (99.75, 5), (100.0, 5)],
        vec![(100.0, 40), (102.0, 35), (98.0, 25)],
        vec![(100.0, 1), (100.25, 2), (100.5, 3), (100.75, 100), (101.0, 3), (101.25, 2)],
        (0..40)
            .map(|i| (4_000.0 + i as f64 * 0.25, ((i * 37) % 23 + 1) as u64))
            .collect(),
    ];
    let fractions = [0.1, 0.5, 0.682, 0.7, 0.95, 1.0];

    for levels in &profiles {
        let finalized = profile(levels).finalize();
        for &fraction in &fractions {
            let calc = ValueAreaCalculator::new(fraction).unwrap();
            let va = finalized.value_area(&calc).unwrap();
            let total = va.total_volume as f64;

            assert!(va.low <= va.point_of_control && va.point_of_control <= va.high);
            assert_eq!(va.volume, volume_between(&finalized, va.low, va.high));
            assert!(va.volume as f64 / total >= fraction - 1e-12);
            if va.last_step_volume > 0 {
                let before = (va.volume - va.last_step_volume) as f64 / total;
                assert!(before < fraction, "profile {:?} fraction {}", levels, fraction);
            }
        }
    }
}

#[test]
fn full_fraction_covers_every_level() {
    let levels = [(99.0, 5), (99.5, 1), (100.0, 9), (101.0, 2)];
    let finalized = profile(&levels).finalize();
    let va = finalized
        .value_area(&ValueAreaCalculator::new(1.0).unwrap())
        .unwrap();
    assert!((va.low - 99.0).abs() < f64::EPSILON);
    assert!((va.high - 101.0).abs() < f64::EPSILON);
    assert_eq!(va.volume, va.total_volume);
}

#[test]
fn memo_is_invalidated_by_new_ticks() {
    let mut acc = profile(&[(100.0, 10), (100.25, 5)]);
    let calc = ValueAreaCalculator::new(0.5).unwrap();
    let first = acc.value_area(&calc).unwrap();
    assert_eq!(acc.value_area(&calc).unwrap(), first);

    acc.add_tick(&Tick::bid(10, 101.0, 500));
    let second = acc.value_area(&calc).unwrap();
    assert!((second.point_of_control - 101.0).abs() < f64::EPSILON);
    assert_ne!(first, second);
}

#[test]
fn finalized_value_area_is_stable() {
    let finalized = profile(&[(100.0, 10), (100.25, 5), (100.5, 7)]).finalize();
    let calc = ValueAreaCalculator::default();
    assert_eq!(
        finalized.value_area(&calc).unwrap(),
        finalized.value_area(&calc).unwrap()
    );
}

#[test]
fn empty_profile_and_bad_fraction_are_errors() {
    let mut acc = PriceLevelAccumulator::new(0.25).unwrap();
    assert_eq!(
        acc.value_area(&ValueAreaCalculator::default()),
        Err(LevelError::EmptyDistribution)
    );
    assert!(matches!(
        ValueAreaCalculator::new(0.0),
        Err(LevelError::InvalidFraction(_))
    ));
    assert!(ValueAreaCalculator::new(1.01).is_err());
}
