use serde::{Deserialize, Serialize};

use crate::error::{LevelError, LevelResult};

pub const DEFAULT_EXTENSION_PERCENTS: [f64; 3] = [100.0, 200.0, 300.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

/// Level projected from the edge of a pivot's band by `percent` of its breadth.
///
/// Above: `pivot + breadth/2 + breadth * percent/100`; below mirrors it.
pub fn extension(
    pivot: f64,
    breadth: f64,
    percent: f64,
    direction: Direction,
) -> LevelResult<f64> {
    if !breadth.is_finite() || breadth < 0.0 {
        return Err(LevelError::NegativeBreadth(breadth));
    }
    let offset = breadth / 2.0 + breadth * (percent / 100.0);
    Ok(match direction {
        Direction::Above => pivot + offset,
        Direction::Below => pivot - offset,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtensionLevel {
    pub percent: f64,
    pub above: f64,
    pub below: f64,
}

/// Symmetric extension pairs for each percentage, in the order given.
pub fn extension_levels(
    pivot: f64,
    breadth: f64,
    percents: &[f64],
) -> LevelResult<Vec<ExtensionLevel>> {
    percents
        .iter()
        .map(|&percent| {
            Ok(ExtensionLevel {
                percent,
                above: extension(pivot, breadth, percent, Direction::Above)?,
                below: extension(pivot, breadth, percent, Direction::Below)?,
            })
        })
        .collect()
}
