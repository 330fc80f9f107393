//! Stock position and round-trip trade records.

use chrono::{DateTime, Utc};
use rgk_regime::{RegimeType, VolatilityLevel};
use serde::{Deserialize, Serialize};

/// An open stock position, exclusively owned by the portfolio manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Signed shares: positive long, negative short. Never zero while
    /// the position exists.
    pub quantity: i64,
    /// Average entry price.
    pub avg_entry_price_micros: i64,
    pub entry_time: DateTime<Utc>,
    pub current_price_micros: i64,
    pub regime_at_entry: Option<RegimeType>,
    pub vol_at_entry: Option<VolatilityLevel>,
}

impl Position {
    /// Signed market value at the current mark.
    pub fn market_value_micros(&self) -> i64 {
        self.current_price_micros.saturating_mul(self.quantity)
    }

    /// `(mark − avg_entry) × quantity` — sign handles shorts.
    pub fn unrealized_pnl_micros(&self) -> i64 {
        (self.current_price_micros - self.avg_entry_price_micros).saturating_mul(self.quantity)
    }
}

/// A completed round trip. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price_micros: i64,
    pub exit_price_micros: i64,
    /// Signed quantity the round trip carried (positive = was long).
    pub quantity: i64,
    pub pnl_micros: i64,
    pub pnl_pct: f64,
    pub reason: String,
    pub agent: String,
    pub regime_at_entry: Option<RegimeType>,
    pub vol_at_entry: Option<VolatilityLevel>,
}

/// Attribution attached to a fill when it reaches the portfolio.
#[derive(Debug, Clone)]
pub struct FillContext {
    pub ts: DateTime<Utc>,
    pub reason: String,
    pub agent: String,
    pub regime: Option<RegimeType>,
    pub volatility: Option<VolatilityLevel>,
}
