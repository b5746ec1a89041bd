use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::archive::{BarArchive, BarCompletion};
use crate::error::{LevelError, LevelResult};
use crate::model::bar::BarBuilder;
use crate::model::tick::Tick;
use crate::pivot::{
    ExtensionLevel, PivotConfig, RollingDeltaPivotDetector, SessionPivot,
    DEFAULT_EXTENSION_PERCENTS,
};
use crate::profile::{PriceLevelAccumulator, ValueArea, ValueAreaCalculator};
use crate::session::{ActiveSession, SessionCalendar, SessionName, SessionWindowTracker};

/// Diagnostics kept before the oldest are discarded.
pub const DIAGNOSTIC_CAPACITY: usize = 1_024;

/// Finalized bars kept by default: one day of 1m bars.
pub const DEFAULT_ARCHIVE_CAPACITY: usize = 1_440;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub tick_size: f64,
    pub bar_interval_ms: i64,
    pub value_area: ValueAreaCalculator,
    pub pivot: PivotConfig,
    pub extension_percents: Vec<f64>,
    pub archive_capacity: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_size: 0.25,
            bar_interval_ms: 60_000,
            value_area: ValueAreaCalculator::default(),
            pivot: PivotConfig::default(),
            extension_percents: DEFAULT_EXTENSION_PERCENTS.to_vec(),
            archive_capacity: Some(DEFAULT_ARCHIVE_CAPACITY),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub day: NaiveDate,
    pub session: SessionName,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.day, self.session)
    }
}

/// Everything derived from one finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub key: SessionKey,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub bar_count: usize,
    pub first_bar_index: Option<u64>,
    pub last_bar_index: Option<u64>,
    pub volume: u64,
    pub delta: i64,
    pub value_area: Option<ValueArea>,
    pub pivot: Option<SessionPivot>,
    pub extensions: Vec<ExtensionLevel>,
}

/// A tick that was dropped, or a boundary problem that was recovered from.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub timestamp_ms: i64,
    pub error: LevelError,
}

#[derive(Debug)]
struct SessionState {
    session: ActiveSession,
    profile: PriceLevelAccumulator,
    bar: Option<BarBuilder>,
    bar_count: usize,
    first_bar_index: Option<u64>,
    last_bar_index: Option<u64>,
}

/// Synchronous tick consumer: one call per tick, in timestamp order.
///
/// Ticks inside a session feed the session profile and the current time bar.
/// Closed bars go to the archive and the pivot detector; a closed session
/// yields a [`SessionSummary`].
#[derive(Debug)]
pub struct LevelEngine<C: SessionCalendar> {
    config: EngineConfig,
    tracker: SessionWindowTracker<C>,
    detector: RollingDeltaPivotDetector,
    archive: Arc<BarArchive>,
    active: Option<SessionState>,
    last_summary: Option<SessionSummary>,
    next_bar_index: u64,
    last_timestamp_ms: Option<i64>,
    diagnostics: VecDeque<Diagnostic>,
    ticks_accepted: u64,
    ticks_dropped: u64,
}

impl<C: SessionCalendar> LevelEngine<C> {
    pub fn new(config: EngineConfig, calendar: C) -> LevelResult<Self> {
        let archive = match config.archive_capacity {
            Some(capacity) => BarArchive::with_capacity(capacity),
            None => BarArchive::new(),
        };
        Self::with_archive(config, calendar, Arc::new(archive))
    }

    /// Shares an externally owned archive, e.g. one whose complete flags the
    /// host already populated.
    pub fn with_archive(
        config: EngineConfig,
        calendar: C,
        archive: Arc<BarArchive>,
    ) -> LevelResult<Self> {
        PriceLevelAccumulator::new(config.tick_size)?;
        if config.bar_interval_ms <= 0 {
            return Err(LevelError::Config(format!(
                "bar interval must be > 0 ms, got {}",
                config.bar_interval_ms
            )));
        }
        let next_bar_index = archive.last_index().map(|i| i + 1).unwrap_or(0);
        Ok(Self {
            detector: RollingDeltaPivotDetector::new(config.pivot),
            tracker: SessionWindowTracker::new(calendar),
            config,
            archive,
            active: None,
            last_summary: None,
            next_bar_index,
            last_timestamp_ms: None,
            diagnostics: VecDeque::new(),
            ticks_accepted: 0,
            ticks_dropped: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn archive(&self) -> Arc<BarArchive> {
        Arc::clone(&self.archive)
    }

    /// Most recent diagnostics, oldest first. At most [`DIAGNOSTIC_CAPACITY`]
    /// are retained.
    pub fn diagnostics(&self) -> impl ExactSizeIterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Drains the retained diagnostics.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics.drain(..).collect()
    }

    pub fn ticks_accepted(&self) -> u64 {
        self.ticks_accepted
    }

    /// Ticks rejected as invalid or out of order since construction.
    pub fn ticks_dropped(&self) -> u64 {
        self.ticks_dropped
    }

    pub fn active_session(&self) -> Option<ActiveSession> {
        self.active.as_ref().map(|s| s.session)
    }

    /// Summary of the most recently finalized session. Earlier summaries are
    /// only returned to the caller, never retained.
    pub fn last_summary(&self) -> Option<&SessionSummary> {
        self.last_summary.as_ref()
    }

    /// Value area of an archived bar.
    pub fn bar_value_area(&self, index: u64) -> Option<LevelResult<ValueArea>> {
        self.archive.value_area(index, &self.config.value_area)
    }

    /// Value area of the session in progress so far.
    pub fn live_value_area(&mut self) -> LevelResult<ValueArea> {
        let calculator = self.config.value_area;
        match self.active.as_mut() {
            Some(state) => state.profile.value_area(&calculator),
            None => Err(LevelError::EmptyDistribution),
        }
    }

    pub fn process_tick(&mut self, tick: &Tick) -> Option<SessionSummary> {
        if let Err(error) = tick.validate() {
            self.reject(tick.timestamp_ms, error);
            return None;
        }
        if let Some(last_ms) = self.last_timestamp_ms {
            if tick.timestamp_ms < last_ms {
                self.reject(
                    tick.timestamp_ms,
                    LevelError::OutOfOrderTick {
                        last_ms,
                        observed_ms: tick.timestamp_ms,
                    },
                );
                return None;
            }
        }
        self.last_timestamp_ms = Some(tick.timestamp_ms);
        self.ticks_accepted += 1;

        let transition = self.tracker.observe(tick.timestamp_ms);
        if let Some(error) = transition.stale {
            self.record(tick.timestamp_ms, error);
        }
        let summary = if transition.closed.is_some() {
            self.finalize_session()
        } else {
            None
        };
        if let Some(opened) = transition.opened {
            self.open_session(opened);
        }

        self.feed(tick);
        summary
    }

    /// Finalizes the session in progress, e.g. at end of stream.
    pub fn flush(&mut self) -> Option<SessionSummary> {
        self.tracker.close();
        self.finalize_session()
    }

    fn reject(&mut self, timestamp_ms: i64, error: LevelError) {
        tracing::warn!(timestamp_ms, error = %error, "Tick dropped");
        self.ticks_dropped += 1;
        self.record(timestamp_ms, error);
    }

    fn record(&mut self, timestamp_ms: i64, error: LevelError) {
        if self.diagnostics.len() == DIAGNOSTIC_CAPACITY {
            self.diagnostics.pop_front();
        }
        self.diagnostics.push_back(Diagnostic {
            timestamp_ms,
            error,
        });
    }

    fn open_session(&mut self, session: ActiveSession) {
        let profile = match PriceLevelAccumulator::new(self.config.tick_size) {
            Ok(profile) => profile,
            Err(error) => {
                tracing::warn!(error = %error, "Failed to open session profile");
                self.record(session.start_ms, error);
                return;
            }
        };
        self.detector.begin_session(session.name, session.start_ms);
        self.active = Some(SessionState {
            session,
            profile,
            bar: None,
            bar_count: 0,
            first_bar_index: None,
            last_bar_index: None,
        });
        tracing::info!(
            session = %session.name,
            day = %session.day,
            start_ms = session.start_ms,
            "Session started"
        );
    }

    fn feed(&mut self, tick: &Tick) {
        let Some(state) = self.active.as_mut() else {
            return;
        };
        state.profile.add_tick(tick);

        let finished = match state.bar.as_mut() {
            Some(bar) if bar.contains(tick.timestamp_ms) => {
                bar.update(tick);
                None
            }
            _ => {
                let previous = state.bar.take();
                let mut index = self.next_bar_index;
                while self.archive.is_complete(index) {
                    index += 1;
                }
                match BarBuilder::new(
                    index,
                    tick,
                    self.config.bar_interval_ms,
                    self.config.tick_size,
                ) {
                    Ok(bar) => {
                        let session = state.session;
                        state.bar = Some(bar.clamp_to(session.start_ms, session.end_ms));
                        state.first_bar_index.get_or_insert(index);
                        self.next_bar_index = index + 1;
                    }
                    Err(error) => {
                        tracing::warn!(error = %error, "Failed to open bar");
                    }
                }
                previous
            }
        };

        if let Some(bar) = finished {
            if let Some(index) = self.complete_bar(bar) {
                if let Some(state) = self.active.as_mut() {
                    state.bar_count += 1;
                    state.last_bar_index = Some(index);
                }
            }
        }
    }

    /// Archives a closed bar and feeds it to the pivot detector.
    /// Returns its index unless the bar was already complete.
    fn complete_bar(&mut self, builder: BarBuilder) -> Option<u64> {
        let completed = builder.finish();
        let index = completed.index();
        if let Err(error) = self.archive.insert(completed.clone()) {
            tracing::warn!(bar = index, error = %error, "Bar not archived");
            self.record(completed.bar.open_time_ms, error);
            return None;
        }

        match self.detector.on_bar(completed) {
            Ok(sum) => tracing::debug!(bar = index, window_sum = sum, "Bar completed"),
            Err(LevelError::InsufficientWindow { have, need }) => {
                tracing::debug!(bar = index, have, need, "Bar completed; window filling")
            }
            Err(error) => {
                tracing::warn!(bar = index, error = %error, "Bar rejected by pivot detector")
            }
        }
        Some(index)
    }

    fn finalize_session(&mut self) -> Option<SessionSummary> {
        let mut state = self.active.take()?;
        if let Some(bar) = state.bar.take() {
            if let Some(index) = self.complete_bar(bar) {
                state.bar_count += 1;
                state.last_bar_index = Some(index);
            }
        }

        let pivot = self.detector.finish_session();
        let profile = state.profile.finalize();
        let value_area = match profile.value_area(&self.config.value_area) {
            Ok(va) => Some(va),
            Err(LevelError::EmptyDistribution) => None,
            Err(error) => {
                tracing::warn!(error = %error, "Session value area unavailable");
                None
            }
        };
        let extensions = match pivot
            .as_ref()
            .map(|p| p.extensions(&self.config.extension_percents))
            .transpose()
        {
            Ok(levels) => levels.unwrap_or_default(),
            Err(error) => {
                tracing::warn!(error = %error, "Pivot extensions unavailable");
                Vec::new()
            }
        };

        let key = SessionKey {
            day: state.session.day,
            session: state.session.name,
        };
        let summary = SessionSummary {
            key,
            start_time_ms: state.session.start_ms,
            end_time_ms: state.session.end_ms,
            bar_count: state.bar_count,
            first_bar_index: state.first_bar_index,
            last_bar_index: state.last_bar_index,
            volume: profile.total_volume(),
            delta: profile.total_delta(),
            value_area,
            pivot,
            extensions,
        };
        tracing::info!(
            session = %key,
            bars = summary.bar_count,
            volume = summary.volume,
            delta = summary.delta,
            has_value_area = summary.value_area.is_some(),
            has_pivot = summary.pivot.is_some(),
            "Session finalized"
        );
        self.last_summary = Some(summary.clone());
        Some(summary)
    }
}
