use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LevelError {
    #[error("empty distribution: no volume to derive a level from")]
    EmptyDistribution,

    #[error("insufficient window: {have} of {need} bars completed")]
    InsufficientWindow { have: usize, need: usize },

    #[error("stale session boundary: boundaries for {last_day} used at {observed_day}")]
    StaleSessionBoundary {
        last_day: NaiveDate,
        observed_day: NaiveDate,
    },

    #[error("invalid tick: {0}")]
    InvalidTick(String),

    #[error("out-of-order tick: {observed_ms} ms after {last_ms} ms")]
    OutOfOrderTick { last_ms: i64, observed_ms: i64 },

    #[error("invalid tick size: {0}")]
    InvalidTickSize(f64),

    #[error("invalid value-area fraction {0}: expected 0 < f <= 1")]
    InvalidFraction(f64),

    #[error("negative breadth: {0}")]
    NegativeBreadth(f64),

    #[error("bar {0} is already complete")]
    BarAlreadyComplete(u64),

    #[error("config error: {0}")]
    Config(String),
}

pub type LevelResult<T> = Result<T, LevelError>;
