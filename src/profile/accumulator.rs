use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use crate::error::{LevelError, LevelResult};
use crate::model::tick::{Side, Tick};
use crate::profile::value_area::{ValueArea, ValueAreaCalculator};

/// Per-price aggregate. `delta == ask_volume - bid_volume` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelStats {
    pub volume: u64,
    pub delta: i64,
    pub ask_volume: u64,
    pub bid_volume: u64,
}

impl LevelStats {
    fn add(&mut self, tick: &Tick) {
        self.volume = self.volume.saturating_add(tick.volume);
        self.delta = self.delta.saturating_add(tick.side.signed(tick.volume));
        match tick.side {
            Side::Ask => self.ask_volume = self.ask_volume.saturating_add(tick.volume),
            Side::Bid => self.bid_volume = self.bid_volume.saturating_add(tick.volume),
        }
    }
}

/// Price index on the instrument's tick grid.
pub fn price_key(price: f64, tick_size: f64) -> i64 {
    (price / tick_size).round() as i64
}

pub fn key_price(key: i64, tick_size: f64) -> f64 {
    key as f64 * tick_size
}

/// Read access to a volume-at-price distribution keyed on the tick grid.
///
/// Implemented by both the live accumulator and its finalized snapshot so the
/// value-area expansion runs over either.
pub trait VolumeProfile {
    fn tick_size(&self) -> f64;
    fn total_volume(&self) -> u64;
    fn level_count(&self) -> usize;
    fn volume_at_key(&self, key: i64) -> u64;
    fn has_level(&self, key: i64) -> bool;
    /// Lowest and highest traded keys, `None` when empty.
    fn key_range(&self) -> Option<(i64, i64)>;
    /// Key with the greatest volume, ties resolved to the lowest key.
    fn point_of_control_key(&self) -> LevelResult<i64>;

    fn is_empty(&self) -> bool {
        self.level_count() == 0
    }
}

fn poc_key<'a>(levels: impl Iterator<Item = (&'a i64, &'a LevelStats)>) -> LevelResult<i64> {
    levels
        .max_by_key(|(key, stats)| (stats.volume, Reverse(**key)))
        .map(|(key, _)| *key)
        .ok_or(LevelError::EmptyDistribution)
}

fn delta_poc_key<'a>(
    levels: impl Iterator<Item = (&'a i64, &'a LevelStats)>,
) -> LevelResult<i64> {
    levels
        .max_by_key(|(key, stats)| (stats.delta.unsigned_abs(), Reverse(**key)))
        .map(|(key, _)| *key)
        .ok_or(LevelError::EmptyDistribution)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Totals {
    stats: LevelStats,
    ticks: u64,
}

impl Totals {
    fn add(&mut self, tick: &Tick) {
        self.stats.add(tick);
        self.ticks += 1;
    }
}

/// Volume and delta at price for one bar or session window.
///
/// Owned by whoever opened the window; reset by dropping it and creating a new
/// one. `finalize` freezes it into a [`FinalizedProfile`].
#[derive(Debug, Clone)]
pub struct PriceLevelAccumulator {
    tick_size: f64,
    levels: HashMap<i64, LevelStats>,
    totals: Totals,
    cached_value_area: Option<(u64, LevelResult<ValueArea>)>,
}

impl PriceLevelAccumulator {
    pub fn new(tick_size: f64) -> LevelResult<Self> {
        if !tick_size.is_finite() || tick_size <= 0.0 {
            return Err(LevelError::InvalidTickSize(tick_size));
        }
        Ok(Self {
            tick_size,
            levels: HashMap::new(),
            totals: Totals::default(),
            cached_value_area: None,
        })
    }

    pub fn add_tick(&mut self, tick: &Tick) {
        let key = price_key(tick.price, self.tick_size);
        self.levels.entry(key).or_default().add(tick);
        self.totals.add(tick);
        self.cached_value_area = None;
    }

    pub fn is_empty(&self) -> bool {
        self.totals.ticks == 0
    }

    pub fn total_volume(&self) -> u64 {
        self.totals.stats.volume
    }

    pub fn total_delta(&self) -> i64 {
        self.totals.stats.delta
    }

    pub fn ask_volume(&self) -> u64 {
        self.totals.stats.ask_volume
    }

    pub fn bid_volume(&self) -> u64 {
        self.totals.stats.bid_volume
    }

    pub fn tick_count(&self) -> u64 {
        self.totals.ticks
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn tick_size(&self) -> f64 {
        self.tick_size
    }

    pub fn level(&self, price: f64) -> Option<LevelStats> {
        self.levels.get(&price_key(price, self.tick_size)).copied()
    }

    pub fn volume_at(&self, price: f64) -> u64 {
        self.level(price).map(|s| s.volume).unwrap_or(0)
    }

    pub fn delta_at(&self, price: f64) -> i64 {
        self.level(price).map(|s| s.delta).unwrap_or(0)
    }

    pub fn point_of_control(&self) -> LevelResult<f64> {
        poc_key(self.levels.iter()).map(|k| key_price(k, self.tick_size))
    }

    pub fn delta_point_of_control(&self) -> LevelResult<f64> {
        delta_poc_key(self.levels.iter()).map(|k| key_price(k, self.tick_size))
    }

    /// Value area of the current contents, memoized until the next tick.
    pub fn value_area(&mut self, calculator: &ValueAreaCalculator) -> LevelResult<ValueArea> {
        let fraction_bits = calculator.target_fraction().to_bits();
        if let Some((bits, cached)) = &self.cached_value_area {
            if *bits == fraction_bits {
                return cached.clone();
            }
        }
        let computed = calculator.compute(&*self);
        self.cached_value_area = Some((fraction_bits, computed.clone()));
        computed
    }

    pub fn finalize(self) -> FinalizedProfile {
        FinalizedProfile {
            tick_size: self.tick_size,
            levels: self.levels.into_iter().collect(),
            totals: self.totals,
            value_area: OnceLock::new(),
        }
    }
}

impl VolumeProfile for PriceLevelAccumulator {
    fn tick_size(&self) -> f64 {
        self.tick_size
    }

    fn total_volume(&self) -> u64 {
        self.totals.stats.volume
    }

    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn volume_at_key(&self, key: i64) -> u64 {
        self.levels.get(&key).map(|s| s.volume).unwrap_or(0)
    }

    fn has_level(&self, key: i64) -> bool {
        self.levels.contains_key(&key)
    }

    fn key_range(&self) -> Option<(i64, i64)> {
        let min = self.levels.keys().min()?;
        let max = self.levels.keys().max()?;
        Some((*min, *max))
    }

    fn point_of_control_key(&self) -> LevelResult<i64> {
        poc_key(self.levels.iter())
    }
}

/// Immutable, price-sorted snapshot of a closed window.
///
/// Safe to share across readers; the first value-area request is memoized.
#[derive(Debug)]
pub struct FinalizedProfile {
    tick_size: f64,
    levels: BTreeMap<i64, LevelStats>,
    totals: Totals,
    value_area: OnceLock<(u64, LevelResult<ValueArea>)>,
}

impl FinalizedProfile {
    pub fn is_empty(&self) -> bool {
        self.totals.ticks == 0
    }

    pub fn tick_size(&self) -> f64 {
        self.tick_size
    }

    pub fn total_volume(&self) -> u64 {
        self.totals.stats.volume
    }

    pub fn total_delta(&self) -> i64 {
        self.totals.stats.delta
    }

    pub fn ask_volume(&self) -> u64 {
        self.totals.stats.ask_volume
    }

    pub fn bid_volume(&self) -> u64 {
        self.totals.stats.bid_volume
    }

    pub fn tick_count(&self) -> u64 {
        self.totals.ticks
    }

    pub fn level(&self, price: f64) -> Option<LevelStats> {
        self.levels.get(&price_key(price, self.tick_size)).copied()
    }

    pub fn volume_at(&self, price: f64) -> u64 {
        self.level(price).map(|s| s.volume).unwrap_or(0)
    }

    pub fn delta_at(&self, price: f64) -> i64 {
        self.level(price).map(|s| s.delta).unwrap_or(0)
    }

    /// Levels in ascending price order.
    pub fn levels(&self) -> impl Iterator<Item = (f64, LevelStats)> + '_ {
        self.levels
            .iter()
            .map(|(k, s)| (key_price(*k, self.tick_size), *s))
    }

    pub fn high(&self) -> Option<f64> {
        self.key_range().map(|(_, hi)| key_price(hi, self.tick_size))
    }

    pub fn low(&self) -> Option<f64> {
        self.key_range().map(|(lo, _)| key_price(lo, self.tick_size))
    }

    pub fn point_of_control(&self) -> LevelResult<f64> {
        poc_key(self.levels.iter()).map(|k| key_price(k, self.tick_size))
    }

    pub fn delta_point_of_control(&self) -> LevelResult<f64> {
        delta_poc_key(self.levels.iter()).map(|k| key_price(k, self.tick_size))
    }

    /// Value area for `calculator`. The first fraction requested is cached;
    /// other fractions are computed on each call.
    pub fn value_area(&self, calculator: &ValueAreaCalculator) -> LevelResult<ValueArea> {
        let fraction_bits = calculator.target_fraction().to_bits();
        let (bits, cached) = self
            .value_area
            .get_or_init(|| (fraction_bits, calculator.compute(self)));
        if *bits == fraction_bits {
            cached.clone()
        } else {
            calculator.compute(self)
        }
    }
}

impl VolumeProfile for FinalizedProfile {
    fn tick_size(&self) -> f64 {
        self.tick_size
    }

    fn total_volume(&self) -> u64 {
        self.totals.stats.volume
    }

    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn volume_at_key(&self, key: i64) -> u64 {
        self.levels.get(&key).map(|s| s.volume).unwrap_or(0)
    }

    fn has_level(&self, key: i64) -> bool {
        self.levels.contains_key(&key)
    }

    fn key_range(&self) -> Option<(i64, i64)> {
        let (lo, _) = self.levels.first_key_value()?;
        let (hi, _) = self.levels.last_key_value()?;
        Some((*lo, *hi))
    }

    fn point_of_control_key(&self) -> LevelResult<i64> {
        poc_key(self.levels.iter())
    }
}
