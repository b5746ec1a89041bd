use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{LevelError, LevelResult};

const DAY_MS: i64 = 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionName {
    Rth,
    #[serde(alias = "globex")]
    Overnight,
    #[serde(alias = "euro")]
    London,
}

impl SessionName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rth => "RTH",
            Self::Overnight => "OVERNIGHT",
            Self::London => "LONDON",
        }
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One concrete occurrence of a session, `[start_ms, end_ms)` in epoch millis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub name: SessionName,
    pub start_ms: i64,
    pub end_ms: i64,
}

impl SessionWindow {
    pub fn contains(&self, timestamp_ms: i64) -> bool {
        timestamp_ms >= self.start_ms && timestamp_ms < self.end_ms
    }
}

/// Session boundaries supplied by the host.
pub trait SessionCalendar {
    /// Trading day a timestamp belongs to.
    fn trading_day(&self, timestamp_ms: i64) -> NaiveDate;

    /// `[start, end)` of the trading day in epoch millis.
    fn day_bounds(&self, day: NaiveDate) -> (i64, i64);

    /// Sessions of `day`, ordered by start. Empty when the market is closed.
    fn sessions(&self, day: NaiveDate) -> Vec<SessionWindow>;

    fn is_inside_session(&self, timestamp_ms: i64, name: SessionName) -> bool {
        self.sessions(self.trading_day(timestamp_ms))
            .iter()
            .any(|w| w.name == name && w.contains(timestamp_ms))
    }
}

/// Local wall-clock definition of a recurring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSpec {
    pub name: SessionName,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl SessionSpec {
    pub fn new(name: SessionName, start: NaiveTime, end: NaiveTime) -> Self {
        Self { name, start, end }
    }
}

/// Daily session rotation at a fixed UTC offset.
///
/// A trading day starts at `day_start` local time and is labelled with the
/// local date it starts on. Sessions may wrap past local midnight but must fit
/// inside the 24h trading day and must not overlap. Trading days whose start
/// date falls on a closed weekday have no sessions.
#[derive(Debug, Clone)]
pub struct FixedSessionCalendar {
    utc_offset_ms: i64,
    day_start: NaiveTime,
    // (offset from day start, duration), both in ms, sorted by offset
    layout: Vec<(SessionName, i64, i64)>,
    // indexed by days from Monday
    open_weekdays: [bool; 7],
}

const ALL_WEEKDAYS: [bool; 7] = [true; 7];

fn time_of_day_ms(t: NaiveTime) -> i64 {
    i64::from(t.num_seconds_from_midnight()) * 1_000 + i64::from(t.nanosecond() / 1_000_000)
}

impl FixedSessionCalendar {
    pub fn new(
        utc_offset_minutes: i32,
        day_start: NaiveTime,
        specs: &[SessionSpec],
    ) -> LevelResult<Self> {
        if utc_offset_minutes.abs() >= 24 * 60 {
            return Err(LevelError::Config(format!(
                "utc offset {} minutes is out of range",
                utc_offset_minutes
            )));
        }
        if specs.is_empty() {
            return Err(LevelError::Config("no sessions configured".to_string()));
        }

        let day_start_ms = time_of_day_ms(day_start);
        let mut layout = Vec::with_capacity(specs.len());
        for spec in specs {
            let offset = (time_of_day_ms(spec.start) - day_start_ms).rem_euclid(DAY_MS);
            let duration =
                (time_of_day_ms(spec.end) - time_of_day_ms(spec.start)).rem_euclid(DAY_MS);
            if duration == 0 {
                return Err(LevelError::Config(format!(
                    "session {} has zero length",
                    spec.name
                )));
            }
            if offset + duration > DAY_MS {
                return Err(LevelError::Config(format!(
                    "session {} crosses the trading-day boundary at {}",
                    spec.name, day_start
                )));
            }
            layout.push((spec.name, offset, duration));
        }
        layout.sort_by_key(|(_, offset, _)| *offset);

        for pair in layout.windows(2) {
            let (name_a, off_a, dur_a) = pair[0];
            let (name_b, off_b, _) = pair[1];
            if off_a + dur_a > off_b {
                return Err(LevelError::Config(format!(
                    "sessions {} and {} overlap",
                    name_a, name_b
                )));
            }
            if name_a == name_b {
                return Err(LevelError::Config(format!(
                    "session {} configured twice",
                    name_a
                )));
            }
        }

        Ok(Self {
            utc_offset_ms: i64::from(utc_offset_minutes) * 60_000,
            day_start,
            layout,
            open_weekdays: ALL_WEEKDAYS,
        })
    }

    /// Restricts sessions to trading days starting on `weekdays`.
    pub fn with_trading_weekdays(mut self, weekdays: &[Weekday]) -> LevelResult<Self> {
        if weekdays.is_empty() {
            return Err(LevelError::Config("no trading weekdays configured".to_string()));
        }
        self.open_weekdays = [false; 7];
        for day in weekdays {
            self.open_weekdays[day.num_days_from_monday() as usize] = true;
        }
        Ok(self)
    }

    pub fn is_trading_day(&self, day: NaiveDate) -> bool {
        self.open_weekdays[day.weekday().num_days_from_monday() as usize]
    }

    /// CME-style equity index rotation at UTC-05:00: OVERNIGHT 18:00-03:00,
    /// LONDON 03:00-09:30, RTH 09:30-16:00, trading day starting 18:00.
    /// Trading days start Sunday through Thursday evening.
    pub fn cme_equity_index() -> Self {
        let hm = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        Self {
            utc_offset_ms: -5 * 3_600_000,
            day_start: hm(18, 0),
            layout: vec![
                (SessionName::Overnight, 0, 9 * 3_600_000),
                (SessionName::London, 9 * 3_600_000, 6 * 3_600_000 + 1_800_000),
                (SessionName::Rth, 15 * 3_600_000 + 1_800_000, 6 * 3_600_000 + 1_800_000),
            ],
            open_weekdays: [true, true, true, true, false, false, true],
        }
    }

    fn local_naive(&self, timestamp_ms: i64) -> Option<NaiveDateTime> {
        chrono::DateTime::from_timestamp_millis(timestamp_ms + self.utc_offset_ms)
            .map(|dt| dt.naive_utc())
    }
}

impl SessionCalendar for FixedSessionCalendar {
    fn trading_day(&self, timestamp_ms: i64) -> NaiveDate {
        let Some(local) = self.local_naive(timestamp_ms) else {
            return NaiveDate::MIN;
        };
        if local.time() >= self.day_start {
            local.date()
        } else {
            local.date() - Duration::days(1)
        }
    }

    fn day_bounds(&self, day: NaiveDate) -> (i64, i64) {
        let start = day.and_time(self.day_start).and_utc().timestamp_millis() - self.utc_offset_ms;
        (start, start + DAY_MS)
    }

    fn sessions(&self, day: NaiveDate) -> Vec<SessionWindow> {
        if !self.is_trading_day(day) {
            return Vec::new();
        }
        let (day_start_ms, _) = self.day_bounds(day);
        self.layout
            .iter()
            .map(|(name, offset, duration)| SessionWindow {
                name: *name,
                start_ms: day_start_ms + offset,
                end_ms: day_start_ms + offset + duration,
            })
            .collect()
    }
}
