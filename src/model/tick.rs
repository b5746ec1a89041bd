use serde::{Deserialize, Serialize};

use crate::error::{LevelError, LevelResult};

/// Aggressor side of a trade.
///
/// `Ask` trades lifted the offer (aggressive buys), `Bid` trades hit the bid
/// (aggressive sells).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Ask,
    Bid,
}

impl Side {
    /// Signed contribution of `volume` to delta.
    pub fn signed(self, volume: u64) -> i64 {
        let v = i64::try_from(volume).unwrap_or(i64::MAX);
        match self {
            Self::Ask => v,
            Self::Bid => -v,
        }
    }

    /// Maps an exchange "buyer is maker" flag to the aggressor side.
    pub fn from_buyer_maker(is_buyer_maker: bool) -> Self {
        if is_buyer_maker {
            Self::Bid
        } else {
            Self::Ask
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp_ms: i64,
    pub price: f64,
    pub volume: u64,
    pub side: Side,
}

impl Tick {
    pub fn new(timestamp_ms: i64, price: f64, volume: u64, side: Side) -> Self {
        Self {
            timestamp_ms,
            price,
            volume,
            side,
        }
    }

    pub fn ask(timestamp_ms: i64, price: f64, volume: u64) -> Self {
        Self::new(timestamp_ms, price, volume, Side::Ask)
    }

    pub fn bid(timestamp_ms: i64, price: f64, volume: u64) -> Self {
        Self::new(timestamp_ms, price, volume, Side::Bid)
    }

    /// Rejects prices the accumulators cannot quantize.
    pub fn validate(&self) -> LevelResult<()> {
        if !self.price.is_finite() {
            return Err(LevelError::InvalidTick(format!(
                "non-finite price {} at {}",
                self.price, self.timestamp_ms
            )));
        }
        if self.price <= 0.0 {
            return Err(LevelError::InvalidTick(format!(
                "non-positive price {} at {}",
                self.price, self.timestamp_ms
            )));
        }
        Ok(())
    }
}
