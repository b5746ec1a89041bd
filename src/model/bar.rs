use std::sync::Arc;

use crate::error::LevelResult;
use crate::model::tick::Tick;
use crate::profile::accumulator::{FinalizedProfile, PriceLevelAccumulator};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub index: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub open_time_ms: i64,
    pub close_time_ms: i64,
}

impl Bar {
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// A closed bar together with its frozen volume/delta profile.
#[derive(Debug, Clone)]
pub struct CompletedBar {
    pub bar: Bar,
    pub profile: Arc<FinalizedProfile>,
}

impl CompletedBar {
    pub fn index(&self) -> u64 {
        self.bar.index
    }

    pub fn delta(&self) -> i64 {
        self.profile.total_delta()
    }

    pub fn volume(&self) -> u64 {
        self.profile.total_volume()
    }
}

/// Aggregates trade ticks into one time bar and its price-level profile.
#[derive(Debug, Clone)]
pub struct BarBuilder {
    index: u64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    open_time_ms: i64,
    close_time_ms: i64,
    profile: PriceLevelAccumulator,
}

impl BarBuilder {
    /// Start a new bar at `tick`. The bucket is aligned to the interval.
    pub fn new(index: u64, tick: &Tick, interval_ms: i64, tick_size: f64) -> LevelResult<Self> {
        assert!(interval_ms > 0, "interval_ms must be > 0");
        let open_time_ms = tick.timestamp_ms - tick.timestamp_ms.rem_euclid(interval_ms);
        let mut profile = PriceLevelAccumulator::new(tick_size)?;
        profile.add_tick(tick);
        Ok(Self {
            index,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            open_time_ms,
            close_time_ms: open_time_ms + interval_ms,
            profile,
        })
    }

    /// Trims the bucket to `[start_ms, end_ms)`, e.g. a session window that
    /// does not sit on an interval boundary.
    pub fn clamp_to(mut self, start_ms: i64, end_ms: i64) -> Self {
        self.open_time_ms = self.open_time_ms.max(start_ms);
        self.close_time_ms = self.close_time_ms.min(end_ms);
        self
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn update(&mut self, tick: &Tick) {
        self.high = self.high.max(tick.price);
        self.low = self.low.min(tick.price);
        self.close = tick.price;
        self.profile.add_tick(tick);
    }

    /// Check if a timestamp belongs to this bar's time bucket.
    pub fn contains(&self, timestamp_ms: i64) -> bool {
        timestamp_ms >= self.open_time_ms && timestamp_ms < self.close_time_ms
    }

    pub fn finish(self) -> CompletedBar {
        CompletedBar {
            bar: Bar {
                index: self.index,
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
                open_time_ms: self.open_time_ms,
                close_time_ms: self.close_time_ms,
            },
            profile: Arc::new(self.profile.finalize()),
        }
    }
}
