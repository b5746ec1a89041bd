pub mod accumulator;
pub mod value_area;

pub use accumulator::{FinalizedProfile, LevelStats, PriceLevelAccumulator, VolumeProfile};
pub use value_area::{ValueArea, ValueAreaCalculator, DEFAULT_VALUE_AREA_FRACTION};
