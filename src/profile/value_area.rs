use serde::{Deserialize, Serialize};

use crate::error::{LevelError, LevelResult};
use crate::profile::accumulator::{key_price, VolumeProfile};

pub const DEFAULT_VALUE_AREA_FRACTION: f64 = 0.682;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueArea {
    pub point_of_control: f64,
    pub high: f64,
    pub low: f64,
    pub breadth: f64,
    pub mid: f64,
    /// Volume inside `[low, high]`.
    pub volume: u64,
    pub total_volume: u64,
    /// Volume added by the final expansion step (0 when the POC alone met the target).
    pub last_step_volume: u64,
}

impl ValueArea {
    pub fn coverage(&self) -> f64 {
        if self.total_volume == 0 {
            return 0.0;
        }
        self.volume as f64 / self.total_volume as f64
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expansion {
    Above,
    Below,
}

/// Expands from the point of control two ticks at a time until the target
/// fraction of total volume is covered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueAreaCalculator {
    target_fraction: f64,
}

impl Default for ValueAreaCalculator {
    fn default() -> Self {
        Self {
            target_fraction: DEFAULT_VALUE_AREA_FRACTION,
        }
    }
}

impl ValueAreaCalculator {
    pub fn new(target_fraction: f64) -> LevelResult<Self> {
        if !target_fraction.is_finite() || target_fraction <= 0.0 || target_fraction > 1.0 {
            return Err(LevelError::InvalidFraction(target_fraction));
        }
        Ok(Self { target_fraction })
    }

    pub fn target_fraction(&self) -> f64 {
        self.target_fraction
    }

    pub fn compute<P: VolumeProfile + ?Sized>(&self, profile: &P) -> LevelResult<ValueArea> {
        let (min_key, max_key) = profile.key_range().ok_or(LevelError::EmptyDistribution)?;
        let total = profile.total_volume();
        if total == 0 {
            return Err(LevelError::EmptyDistribution);
        }

        let poc = profile.point_of_control_key()?;
        let level_count = profile.level_count();
        let mut running = profile.volume_at_key(poc);
        let mut consumed = 1usize;
        let mut above = poc;
        let mut below = poc;
        let mut last_step_volume = 0u64;

        while (running as f64) / (total as f64) < self.target_fraction && consumed < level_count {
            let above_open = above < max_key;
            let below_open = below > min_key;
            let side = match (above_open, below_open) {
                (true, true) => {
                    let up = couplet(profile, above, 1, min_key, max_key);
                    let down = couplet(profile, below, -1, min_key, max_key);
                    if up.volume > down.volume {
                        Expansion::Above
                    } else {
                        Expansion::Below
                    }
                }
                (true, false) => Expansion::Above,
                (false, true) => Expansion::Below,
                (false, false) => break,
            };

            let step = match side {
                Expansion::Above => couplet(profile, above, 1, min_key, max_key),
                Expansion::Below => couplet(profile, below, -1, min_key, max_key),
            };
            match side {
                Expansion::Above => above = step.cursor,
                Expansion::Below => below = step.cursor,
            }
            running = running.saturating_add(step.volume);
            consumed += step.traded_levels;
            last_step_volume = step.volume;
        }

        let tick_size = profile.tick_size();
        let high = key_price(above, tick_size);
        let low = key_price(below, tick_size);
        let breadth = high - low;
        Ok(ValueArea {
            point_of_control: key_price(poc, tick_size),
            high,
            low,
            breadth,
            mid: high - breadth / 2.0,
            volume: running,
            total_volume: total,
            last_step_volume,
        })
    }
}

struct Couplet {
    volume: u64,
    cursor: i64,
    traded_levels: usize,
}

/// The next two keys beyond `cursor` in direction `dir`, clipped to the traded range.
fn couplet<P: VolumeProfile + ?Sized>(
    profile: &P,
    cursor: i64,
    dir: i64,
    min_key: i64,
    max_key: i64,
) -> Couplet {
    let mut out = Couplet {
        volume: 0,
        cursor,
        traded_levels: 0,
    };
    for offset in 1..=2 {
        let key = cursor + dir * offset;
        if key < min_key || key > max_key {
            break;
        }
        out.volume = out.volume.saturating_add(profile.volume_at_key(key));
        if profile.has_level(key) {
            out.traded_levels += 1;
        }
        out.cursor = key;
    }
    out
}
