use anyhow::{bail, Context, Result};
use chrono::{NaiveTime, Weekday};
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::engine::{EngineConfig, DEFAULT_ARCHIVE_CAPACITY};
use crate::pivot::{PivotConfig, DEFAULT_EXTENSION_PERCENTS, DEFAULT_WINDOW_BARS};
use crate::profile::{ValueAreaCalculator, DEFAULT_VALUE_AREA_FRACTION};
use crate::session::{FixedSessionCalendar, SessionName, SessionSpec};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub pivot: PivotSettings,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentConfig {
    pub symbol: String,
    pub tick_size: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_bar_interval")]
    pub bar_interval: String,
    #[serde(default = "default_value_area_fraction")]
    pub value_area_fraction: f64,
    /// Finalized bars kept in the archive; `0` keeps every bar.
    #[serde(default = "default_archive_capacity")]
    pub archive_capacity: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            bar_interval: default_bar_interval(),
            value_area_fraction: default_value_area_fraction(),
            archive_capacity: default_archive_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PivotSettings {
    #[serde(default = "default_window_bars")]
    pub window_bars: usize,
    #[serde(default)]
    pub use_poc_as_pivot: bool,
    #[serde(default = "default_extension_percents")]
    pub extension_percents: Vec<f64>,
}

impl Default for PivotSettings {
    fn default() -> Self {
        Self {
            window_bars: default_window_bars(),
            use_poc_as_pivot: false,
            extension_percents: default_extension_percents(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_day_start")]
    pub day_start: String,
    #[serde(default = "default_session_windows")]
    pub windows: Vec<SessionEntry>,
    /// Weekdays on which a trading day may start, e.g. `["sun", "mon"]`.
    #[serde(default = "default_trading_weekdays")]
    pub trading_weekdays: Vec<Weekday>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: default_utc_offset_minutes(),
            day_start: default_day_start(),
            windows: default_session_windows(),
            trading_weekdays: default_trading_weekdays(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionEntry {
    pub name: SessionName,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_bar_interval() -> String {
    "1m".to_string()
}

fn default_value_area_fraction() -> f64 {
    DEFAULT_VALUE_AREA_FRACTION
}

fn default_archive_capacity() -> usize {
    DEFAULT_ARCHIVE_CAPACITY
}

fn default_window_bars() -> usize {
    DEFAULT_WINDOW_BARS
}

fn default_extension_percents() -> Vec<f64> {
    DEFAULT_EXTENSION_PERCENTS.to_vec()
}

fn default_utc_offset_minutes() -> i32 {
    -300
}

fn default_day_start() -> String {
    "18:00".to_string()
}

fn default_trading_weekdays() -> Vec<Weekday> {
    vec![
        Weekday::Sun,
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
    ]
}

fn default_session_windows() -> Vec<SessionEntry> {
    let entry = |name, start: &str, end: &str| SessionEntry {
        name,
        start: start.to_string(),
        end: end.to_string(),
    };
    vec![
        entry(SessionName::Overnight, "18:00", "03:00"),
        entry(SessionName::London, "03:00", "09:30"),
        entry(SessionName::Rth, "09:30", "16:00"),
    ]
}

/// Parse a bar interval string (e.g. "1s", "1m", "1h", "1d", "1w", "1M") into milliseconds.
pub fn parse_interval_ms(s: &str) -> Result<u64> {
    let split = match s.char_indices().last() {
        Some((idx, _)) if idx > 0 => idx,
        _ => bail!("invalid interval '{}': expected format like '1m'", s),
    };

    let (num_str, suffix) = s.split_at(split);
    let n: u64 = num_str.parse().with_context(|| {
        format!(
            "invalid interval '{}': quantity must be a positive integer",
            s
        )
    })?;
    if n == 0 {
        bail!("invalid interval '{}': quantity must be > 0", s);
    }

    let unit_ms = match suffix {
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 7 * 86_400_000,
        "M" => 30 * 86_400_000,
        _ => bail!(
            "invalid interval '{}': unsupported suffix '{}', expected one of s/m/h/d/w/M",
            s,
            suffix
        ),
    };

    n.checked_mul(unit_ms)
        .with_context(|| format!("invalid interval '{}': value is too large", s))
}

/// Parse a local wall-clock time like "09:30".
pub fn parse_clock(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .with_context(|| format!("invalid time '{}': expected HH:MM", s))
}

impl ProfileConfig {
    pub fn bar_interval_ms(&self) -> Result<u64> {
        parse_interval_ms(&self.bar_interval)
    }
}

impl SessionsConfig {
    pub fn calendar(&self) -> Result<FixedSessionCalendar> {
        let day_start = parse_clock(&self.day_start).context("sessions.day_start is invalid")?;
        let specs = self
            .windows
            .iter()
            .map(|w| {
                Ok(SessionSpec::new(
                    w.name,
                    parse_clock(&w.start)
                        .with_context(|| format!("session {} start is invalid", w.name))?,
                    parse_clock(&w.end)
                        .with_context(|| format!("session {} end is invalid", w.name))?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        FixedSessionCalendar::new(self.utc_offset_minutes, day_start, &specs)
            .and_then(|calendar| calendar.with_trading_weekdays(&self.trading_weekdays))
            .context("sessions are invalid")
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = std::env::var("DELTA_PIVOTS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&config_str)
            .with_context(|| format!("failed to load {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("failed to parse config toml")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.engine_config().context("engine settings are invalid")?;
        self.sessions.calendar()?;
        Ok(())
    }

    pub fn engine_config(&self) -> Result<EngineConfig> {
        let tick_size = self.instrument.tick_size;
        if !tick_size.is_finite() || tick_size <= 0.0 {
            bail!("instrument.tick_size must be > 0, got {}", tick_size);
        }
        let bar_interval_ms = self
            .profile
            .bar_interval_ms()
            .context("profile.bar_interval is invalid")?;
        let bar_interval_ms =
            i64::try_from(bar_interval_ms).context("profile.bar_interval is too large")?;
        let value_area = ValueAreaCalculator::new(self.profile.value_area_fraction)
            .context("profile.value_area_fraction is invalid")?;
        let window_bars = NonZeroUsize::new(self.pivot.window_bars)
            .context("pivot.window_bars must be > 0")?;
        if self
            .pivot
            .extension_percents
            .iter()
            .any(|p| !p.is_finite() || *p < 0.0)
        {
            bail!("pivot.extension_percents must be finite and >= 0");
        }

        Ok(EngineConfig {
            tick_size,
            bar_interval_ms,
            value_area,
            pivot: PivotConfig {
                window_bars,
                use_poc_as_pivot: self.pivot.use_poc_as_pivot,
            },
            extension_percents: self.pivot.extension_percents.clone(),
            archive_capacity: Some(self.profile.archive_capacity).filter(|c| *c > 0),
        })
    }
}
