use std::cmp::Reverse;
use std::collections::VecDeque;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::error::{LevelError, LevelResult};
use crate::model::bar::CompletedBar;
use crate::pivot::extension::{extension, extension_levels, Direction, ExtensionLevel};
use crate::session::calendar::SessionName;

pub const DEFAULT_WINDOW_BARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PivotConfig {
    pub window_bars: NonZeroUsize,
    /// Use the representative bar's delta POC instead of the span midpoint.
    pub use_poc_as_pivot: bool,
}

impl Default for PivotConfig {
    fn default() -> Self {
        Self {
            window_bars: NonZeroUsize::new(DEFAULT_WINDOW_BARS).unwrap_or(NonZeroUsize::MIN),
            use_poc_as_pivot: false,
        }
    }
}

/// Level derived from the session's most extreme rolling-delta window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPivot {
    pub session: SessionName,
    pub window_start_index: u64,
    /// Bar inside the window with the largest absolute delta.
    pub representative_index: u64,
    pub start_time_ms: i64,
    pub pivot_price: f64,
    pub breadth: f64,
    pub high: f64,
    pub low: f64,
    /// Aggregated delta of the representative bar.
    pub delta: i64,
    /// Sum of bar deltas over the whole window.
    pub window_delta: i64,
    pub delta_point_of_control: f64,
}

impl SessionPivot {
    pub fn extension(&self, percent: f64, direction: Direction) -> LevelResult<f64> {
        extension(self.pivot_price, self.breadth, percent, direction)
    }

    pub fn extensions(&self, percents: &[f64]) -> LevelResult<Vec<ExtensionLevel>> {
        extension_levels(self.pivot_price, self.breadth, percents)
    }
}

#[derive(Debug, Clone)]
struct BestWindow {
    sum: i64,
    bars: Vec<CompletedBar>,
}

/// Tracks per-bar delta over a rolling window of `W` bars within one session.
#[derive(Debug, Clone)]
pub struct RollingDeltaPivotDetector {
    config: PivotConfig,
    session: Option<(SessionName, i64)>,
    window: VecDeque<CompletedBar>,
    window_sum: i64,
    bars_seen: usize,
    last_index: Option<u64>,
    best: Option<BestWindow>,
}

impl RollingDeltaPivotDetector {
    pub fn new(config: PivotConfig) -> Self {
        Self {
            config,
            session: None,
            window: VecDeque::with_capacity(config.window_bars.get()),
            window_sum: 0,
            bars_seen: 0,
            last_index: None,
            best: None,
        }
    }

    pub fn config(&self) -> PivotConfig {
        self.config
    }

    pub fn begin_session(&mut self, session: SessionName, start_ms: i64) {
        self.session = Some((session, start_ms));
        self.window.clear();
        self.window_sum = 0;
        self.bars_seen = 0;
        self.best = None;
    }

    pub fn bars_seen(&self) -> usize {
        self.bars_seen
    }

    /// Sum of the current window, or `InsufficientWindow` before `W` bars.
    pub fn window_sum(&self) -> LevelResult<i64> {
        let need = self.config.window_bars.get();
        if self.window.len() < need {
            return Err(LevelError::InsufficientWindow {
                have: self.window.len(),
                need,
            });
        }
        Ok(self.window_sum)
    }

    /// Best `(window_start_index, window_sum)` seen so far this session.
    pub fn max_window(&self) -> Option<(u64, i64)> {
        self.best
            .as_ref()
            .and_then(|b| b.bars.first().map(|bar| (bar.index(), b.sum)))
    }

    /// Feeds a completed bar; returns the window sum ending at it.
    ///
    /// Bars must arrive in increasing index order; a bar at or below the last
    /// seen index is rejected as already complete.
    pub fn on_bar(&mut self, bar: CompletedBar) -> LevelResult<i64> {
        if let Some(last) = self.last_index {
            if bar.index() <= last {
                return Err(LevelError::BarAlreadyComplete(bar.index()));
            }
        }
        self.last_index = Some(bar.index());
        self.bars_seen += 1;

        let need = self.config.window_bars.get();
        if self.window.len() == need {
            if let Some(evicted) = self.window.pop_front() {
                self.window_sum -= evicted.delta();
            }
        }
        self.window_sum += bar.delta();
        self.window.push_back(bar);

        let sum = self.window_sum()?;
        let replace = self
            .best
            .as_ref()
            .map(|best| sum.unsigned_abs() > best.sum.unsigned_abs())
            .unwrap_or(true);
        if replace {
            self.best = Some(BestWindow {
                sum,
                bars: self.window.iter().cloned().collect(),
            });
        }
        Ok(sum)
    }

    /// Builds the session's pivot and resets for the next session.
    ///
    /// Returns `None` when fewer than `W` bars completed in the session.
    pub fn finish_session(&mut self) -> Option<SessionPivot> {
        let (session, _) = self.session.take()?;
        let best = self.best.take();
        self.window.clear();
        self.window_sum = 0;
        self.bars_seen = 0;
        let best = best?;

        let first = best.bars.first()?;
        let representative = best
            .bars
            .iter()
            .max_by_key(|b| (b.delta().unsigned_abs(), Reverse(b.index())))?;

        let high = best
            .bars
            .iter()
            .map(|b| b.bar.high)
            .fold(f64::MIN, f64::max);
        let low = best.bars.iter().map(|b| b.bar.low).fold(f64::MAX, f64::min);
        let breadth = high - low;
        let midpoint = high - breadth / 2.0;
        let delta_poc = representative
            .profile
            .delta_point_of_control()
            .unwrap_or(midpoint);
        let pivot_price = if self.config.use_poc_as_pivot {
            delta_poc
        } else {
            midpoint
        };

        let pivot = SessionPivot {
            session,
            window_start_index: first.index(),
            representative_index: representative.index(),
            start_time_ms: first.bar.open_time_ms,
            pivot_price,
            breadth,
            high,
            low,
            delta: representative.delta(),
            window_delta: best.sum,
            delta_point_of_control: delta_poc,
        };
        tracing::info!(
            session = %pivot.session,
            window_start = pivot.window_start_index,
            window_delta = pivot.window_delta,
            pivot = pivot.pivot_price,
            breadth = pivot.breadth,
            "Session pivot built"
        );
        Some(pivot)
    }
}
