use chrono::{Duration, NaiveDate};

use crate::error::LevelError;
use crate::session::calendar::{FixedSessionCalendar, SessionCalendar, SessionName, SessionWindow};

// Longest run of closed days (e.g. a holiday weekend) not reported as a gap.
const MAX_CLOSED_DAYS: usize = 7;

/// Maps a timestamp to the session it falls in, if any.
pub trait SessionClassifier {
    fn classify(&self, timestamp_ms: i64) -> Option<SessionName>;
}

fn classify_fresh<C: SessionCalendar + ?Sized>(
    calendar: &C,
    timestamp_ms: i64,
) -> Option<SessionName> {
    calendar
        .sessions(calendar.trading_day(timestamp_ms))
        .into_iter()
        .find(|w| w.contains(timestamp_ms))
        .map(|w| w.name)
}

impl SessionClassifier for FixedSessionCalendar {
    fn classify(&self, timestamp_ms: i64) -> Option<SessionName> {
        classify_fresh(self, timestamp_ms)
    }
}

/// The session window currently being accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSession {
    pub name: SessionName,
    pub day: NaiveDate,
    pub start_ms: i64,
    pub end_ms: i64,
}

impl ActiveSession {
    fn from_window(day: NaiveDate, w: &SessionWindow) -> Self {
        Self {
            name: w.name,
            day,
            start_ms: w.start_ms,
            end_ms: w.end_ms,
        }
    }
}

/// Result of observing one timestamp. A close is always applied before an open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionTransition {
    pub closed: Option<ActiveSession>,
    pub opened: Option<ActiveSession>,
    /// Set when the cached boundaries were more than one trading day old.
    pub stale: Option<LevelError>,
}

impl SessionTransition {
    pub fn is_empty(&self) -> bool {
        self.closed.is_none() && self.opened.is_none()
    }
}

/// OUTSIDE/INSIDE state machine over the daily session rotation.
///
/// Boundaries are computed once per trading day and recomputed as soon as a
/// timestamp leaves the cached day.
#[derive(Debug)]
pub struct SessionWindowTracker<C: SessionCalendar> {
    calendar: C,
    day: Option<NaiveDate>,
    day_start_ms: i64,
    day_end_ms: i64,
    windows: Vec<SessionWindow>,
    active: Option<ActiveSession>,
    recomputes: u64,
}

impl<C: SessionCalendar> SessionWindowTracker<C> {
    pub fn new(calendar: C) -> Self {
        Self {
            calendar,
            day: None,
            day_start_ms: 0,
            day_end_ms: 0,
            windows: Vec::new(),
            active: None,
            recomputes: 0,
        }
    }

    pub fn calendar(&self) -> &C {
        &self.calendar
    }

    pub fn active(&self) -> Option<ActiveSession> {
        self.active
    }

    pub fn is_inside(&self) -> bool {
        self.active.is_some()
    }

    pub fn trading_day(&self) -> Option<NaiveDate> {
        self.day
    }

    /// Number of times boundaries have been (re)computed.
    pub fn recomputes(&self) -> u64 {
        self.recomputes
    }

    pub fn observe(&mut self, timestamp_ms: i64) -> SessionTransition {
        let stale = self.ensure_day(timestamp_ms);
        let day = self.day.unwrap_or(NaiveDate::MIN);
        let current = self
            .windows
            .iter()
            .find(|w| w.contains(timestamp_ms))
            .map(|w| ActiveSession::from_window(day, w));

        let mut transition = SessionTransition {
            stale,
            ..SessionTransition::default()
        };
        match (self.active, current) {
            (Some(active), Some(now)) if active == now => {}
            (Some(active), now) => {
                transition.closed = Some(active);
                transition.opened = now;
            }
            (None, now) => transition.opened = now,
        }
        if !transition.is_empty() {
            self.active = current;
        }
        if let Some(closed) = transition.closed {
            tracing::debug!(
                session = %closed.name,
                day = %closed.day,
                end_ms = closed.end_ms,
                "Session closed"
            );
        }
        if let Some(opened) = transition.opened {
            tracing::debug!(
                session = %opened.name,
                day = %opened.day,
                start_ms = opened.start_ms,
                "Session opened"
            );
        }
        transition
    }

    /// Closes the active session regardless of time, e.g. at end of stream.
    pub fn close(&mut self) -> Option<ActiveSession> {
        self.active.take()
    }

    fn ensure_day(&mut self, timestamp_ms: i64) -> Option<LevelError> {
        if self.day.is_some() && timestamp_ms >= self.day_start_ms && timestamp_ms < self.day_end_ms
        {
            return None;
        }

        let observed_day = self.calendar.trading_day(timestamp_ms);
        let stale = match self.day {
            Some(last_day) if self.skipped_trading_day(last_day, observed_day) => {
                tracing::warn!(
                    %last_day,
                    %observed_day,
                    timestamp_ms,
                    "Session boundaries stale after data gap; recomputing"
                );
                Some(LevelError::StaleSessionBoundary {
                    last_day,
                    observed_day,
                })
            }
            _ => None,
        };

        let (start, end) = self.calendar.day_bounds(observed_day);
        self.day = Some(observed_day);
        self.day_start_ms = start;
        self.day_end_ms = end;
        self.windows = self.calendar.sessions(observed_day);
        self.recomputes += 1;
        stale
    }
}

impl<C: SessionCalendar> SessionWindowTracker<C> {
    /// True when a day with sessions lies strictly between `last` and
    /// `observed`, or time went backwards. Closed days (weekends) are skipped.
    fn skipped_trading_day(&self, last: NaiveDate, observed: NaiveDate) -> bool {
        if observed < last {
            return true;
        }
        let mut day = last + Duration::days(1);
        for _ in 0..MAX_CLOSED_DAYS {
            if day >= observed {
                return false;
            }
            if !self.calendar.sessions(day).is_empty() {
                return true;
            }
            day += Duration::days(1);
        }
        true
    }
}

impl<C: SessionCalendar> SessionClassifier for SessionWindowTracker<C> {
    fn classify(&self, timestamp_ms: i64) -> Option<SessionName> {
        if self.day.is_some() && timestamp_ms >= self.day_start_ms && timestamp_ms < self.day_end_ms
        {
            return self
                .windows
                .iter()
                .find(|w| w.contains(timestamp_ms))
                .map(|w| w.name);
        }
        classify_fresh(&self.calendar, timestamp_ms)
    }
}
