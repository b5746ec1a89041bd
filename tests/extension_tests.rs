use delta_pivots::pivot::{extension, extension_levels, Direction, DEFAULT_EXTENSION_PERCENTS};
use delta_pivots::LevelError;

#[test]
fn hundred_percent_extension_from_band_edge() {
    assert!((extension(100.0, 4.0, 100.0, Direction::Above).unwrap() - 106.0).abs() < f64::EPSILON);
    assert!((extension(100.0, 4.0, 100.0, Direction::Below).unwrap() - 94.0).abs() < f64::EPSILON);
}

#[test]
fn levels_are_symmetric_about_pivot() {
    let levels = extension_levels(4_500.0, 6.5, &DEFAULT_EXTENSION_PERCENTS).unwrap();
    assert_eq!(levels.len(), 3);
    for level in &levels {
        let up = level.above - 4_500.0;
        let down = 4_500.0 - level.below;
        assert!((up - down).abs() < 1e-9);
        assert!((up - (3.25 + 6.5 * level.percent / 100.0)).abs() < 1e-9);
    }
    assert!(levels.windows(2).all(|w| w[0].above < w[1].above));
}

#[test]
fn zero_percent_sits_on_band_edge() {
    assert!((extension(10.0, 2.0, 0.0, Direction::Above).unwrap() - 11.0).abs() < f64::EPSILON);
    assert!((extension(10.0, 2.0, 0.0, Direction::Below).unwrap() - 9.0).abs() < f64::EPSILON);
}

#[test]
fn negative_breadth_is_rejected() {
    assert_eq!(
        extension(100.0, -1.0, 100.0, Direction::Above),
        Err(LevelError::NegativeBreadth(-1.0))
    );
    assert!(extension_levels(100.0, f64::INFINITY, &[100.0]).is_err());
}
