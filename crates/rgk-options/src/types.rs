//! Options position model: single legs, leg fills, multi-leg structures.

use chrono::{DateTime, NaiveDate, Utc};
use rgk_agents::MultiLegStrategy;
use rgk_regime::{RegimeType, VolatilityLevel};
use rgk_schemas::OptionType;
use serde::{Deserialize, Serialize};

/// Contract multiplier: one contract covers 100 shares.
pub const CONTRACT_MULTIPLIER: i64 = 100;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegType {
    Call,
    Put,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegStatus {
    Pending,
    Filled,
    PartiallyFilled,
    Rejected,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiLegType {
    Straddle,
    Strangle,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionDirection {
    Long,
    Short,
}

impl PositionDirection {
    /// +1 long, -1 short.
    pub fn sign(self) -> i64 {
        match self {
            PositionDirection::Long => 1,
            PositionDirection::Short => -1,
        }
    }
}

/// Immutable record of one leg execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegFill {
    pub leg_type: LegType,
    pub contract_symbol: String,
    pub strike_micros: i64,
    /// Contracts, always positive; direction lives on the structure.
    pub quantity: i64,
    pub fill_price_micros: i64,
    pub fill_time: Option<DateTime<Utc>>,
    pub order_id: String,
    pub status: LegStatus,
}

impl LegFill {
    pub fn pending(
        leg_type: LegType,
        contract_symbol: impl Into<String>,
        strike_micros: i64,
        quantity: i64,
        order_id: impl Into<String>,
    ) -> Self {
        Self {
            leg_type,
            contract_symbol: contract_symbol.into(),
            strike_micros,
            quantity,
            fill_price_micros: 0,
            fill_time: None,
            order_id: order_id.into(),
            status: LegStatus::Pending,
        }
    }

    /// Premium notional of the fill: quantity × price × 100.
    pub fn total_cost_micros(&self) -> i64 {
        self.quantity
            .saturating_mul(self.fill_price_micros)
            .saturating_mul(CONTRACT_MULTIPLIER)
    }
}

/// One leg of a multi-leg structure with its live Greeks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionLeg {
    pub contract_symbol: String,
    pub strike_micros: i64,
    /// Signed contracts: negative for short structures.
    pub quantity: i64,
    pub entry_price_micros: i64,
    pub current_price_micros: i64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub iv: f64,
}

impl OptionLeg {
    /// `(current − entry) × signed quantity × 100` — negative quantity
    /// flips the sign for short legs.
    pub fn unrealized_pnl_micros(&self) -> i64 {
        (self.current_price_micros - self.entry_price_micros)
            .saturating_mul(self.quantity)
            .saturating_mul(CONTRACT_MULTIPLIER)
    }

    /// Delta contribution in underlying-share terms per contract unit.
    pub fn net_delta(&self) -> f64 {
        self.delta * self.quantity as f64
    }
}

/// A straddle or strangle held as one coherent unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiLegPosition {
    pub multi_leg_id: String,
    pub underlying: String,
    pub strategy: MultiLegStrategy,
    pub trade_type: MultiLegType,
    pub direction: PositionDirection,
    pub call: OptionLeg,
    pub put: OptionLeg,
    pub expiration: NaiveDate,
    pub entry_time: DateTime<Utc>,
    pub entry_bar: u64,
    pub underlying_price_micros: i64,
    pub call_fill: LegFill,
    pub put_fill: LegFill,
    pub entry_iv: f64,
    pub iv_percentile_at_entry: f64,
    pub entry_gex_strength: f64,
    /// Recorded without broker submissions (paper-account guard).
    pub sim_only: bool,
    pub regime_at_entry: Option<RegimeType>,
    pub vol_at_entry: Option<VolatilityLevel>,
}

impl MultiLegPosition {
    pub fn both_legs_filled(&self) -> bool {
        self.call_fill.status == LegStatus::Filled && self.put_fill.status == LegStatus::Filled
    }

    /// Total premium at entry: Σ leg fill price × contracts × 100.
    /// Credit for short structures, debit for long.
    pub fn total_premium_micros(&self) -> i64 {
        self.call_fill.total_cost_micros() + self.put_fill.total_cost_micros()
    }

    pub fn combined_unrealized_pnl_micros(&self) -> i64 {
        self.call.unrealized_pnl_micros() + self.put.unrealized_pnl_micros()
    }

    /// Combined P&L as a percentage of the entry premium.
    pub fn combined_pnl_pct(&self) -> f64 {
        let premium = self.total_premium_micros();
        if premium <= 0 {
            return 0.0;
        }
        self.combined_unrealized_pnl_micros() as f64 / premium as f64 * 100.0
    }

    /// Net delta in per-contract units: call_δ × call_qty + put_δ ×
    /// put_qty. Near zero for a balanced long strangle.
    pub fn net_delta(&self) -> f64 {
        self.call.net_delta() + self.put.net_delta()
    }

    /// Signed market value at current marks: negative for short
    /// structures (a liability).
    pub fn market_value_micros(&self) -> i64 {
        self.call
            .current_price_micros
            .saturating_mul(self.call.quantity)
            .saturating_mul(CONTRACT_MULTIPLIER)
            + self
                .put
                .current_price_micros
                .saturating_mul(self.put.quantity)
                .saturating_mul(CONTRACT_MULTIPLIER)
    }

    /// Contracts per leg (unsigned).
    pub fn contracts(&self) -> i64 {
        self.call.quantity.abs()
    }
}

/// An open single-leg options position. One position per contract
/// symbol — adds at the same contract re-average the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionPosition {
    pub underlying: String,
    pub contract_symbol: String,
    pub option_type: OptionType,
    pub strike_micros: i64,
    pub expiration: NaiveDate,
    /// Signed contracts: positive long, negative short.
    pub quantity: i64,
    /// Premium per share at entry (×100 for per-contract).
    pub avg_entry_price_micros: i64,
    pub entry_time: DateTime<Utc>,
    pub current_price_micros: i64,
    pub underlying_price_micros: i64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub iv: f64,
    pub regime_at_entry: Option<RegimeType>,
    pub vol_at_entry: Option<VolatilityLevel>,
}

impl OptionPosition {
    /// Signed market value at the current premium mark.
    pub fn market_value_micros(&self) -> i64 {
        self.current_price_micros
            .saturating_mul(self.quantity)
            .saturating_mul(CONTRACT_MULTIPLIER)
    }

    pub fn unrealized_pnl_micros(&self) -> i64 {
        (self.current_price_micros - self.avg_entry_price_micros)
            .saturating_mul(self.quantity)
            .saturating_mul(CONTRACT_MULTIPLIER)
    }

    /// Whole days until expiration as of `today` (0 on expiry day).
    pub fn days_to_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiration - today).num_days()
    }
}

/// Completed single-leg round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionTrade {
    pub underlying: String,
    pub contract_symbol: String,
    pub option_type: OptionType,
    pub strike_micros: i64,
    pub expiration: NaiveDate,
    pub quantity: i64,
    pub entry_price_micros: i64,
    pub exit_price_micros: i64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub pnl_micros: i64,
    pub pnl_pct: f64,
    pub reason: String,
    pub agent: String,
    pub delta_at_entry: f64,
    pub iv_at_entry: f64,
    pub regime_at_entry: Option<RegimeType>,
    pub vol_at_entry: Option<VolatilityLevel>,
}

/// Completed multi-leg round trip (both legs closed together).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiLegTrade {
    pub multi_leg_id: String,
    pub underlying: String,
    pub strategy: MultiLegStrategy,
    pub trade_type: MultiLegType,
    pub direction: PositionDirection,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub total_premium_micros: i64,
    pub combined_pnl_micros: i64,
    pub combined_pnl_pct: f64,
    pub reason: String,
    pub call_exit: LegFill,
    pub put_exit: LegFill,
}
