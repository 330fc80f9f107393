//! Trade intent contract — an agent's desired action, pre-arbitration.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Long,
    Short,
    Flat,
}

impl TradeDirection {
    /// +1 long, -1 short, 0 flat.
    pub fn sign(self) -> i64 {
        match self {
            TradeDirection::Long => 1,
            TradeDirection::Short => -1,
            TradeDirection::Flat => 0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentType {
    Stock,
    Option,
}

impl InstrumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            InstrumentType::Stock => "stock",
            InstrumentType::Option => "option",
        }
    }

    pub const ALL: [InstrumentType; 2] = [InstrumentType::Stock, InstrumentType::Option];
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    Call,
    Put,
    Straddle,
    Strangle,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Moneyness {
    Atm,
    Otm,
    Itm,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiLegStrategy {
    ThetaHarvester,
    GammaScalper,
}

/// A concrete single-contract order plan chosen by the options agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleLegPlan {
    pub contract_symbol: String,
    pub strike_micros: i64,
    pub expiration: NaiveDate,
    /// Limit price the executor should use (ask for long, bid for short).
    pub limit_price_micros: i64,
    pub target_delta: f64,
    pub selection_score: f64,
    pub iv_percentile: Option<f64>,
}

/// A straddle/strangle order plan: both legs resolved to contracts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiLegPlan {
    pub strategy: MultiLegStrategy,
    pub call_symbol: String,
    pub call_strike_micros: i64,
    pub put_symbol: String,
    pub put_strike_micros: i64,
    pub expiration: NaiveDate,
    /// Per-structure premium: credit for short entries, debit for long,
    /// per one straddle/strangle (both legs, per contract pair).
    pub expected_premium_micros: i64,
    pub entry_iv: f64,
    pub iv_percentile: f64,
    /// Signed GEX strength (billions) observed at decision time.
    pub entry_gex_strength: f64,
    /// True when the broker cannot carry short multi-leg orders and the
    /// position should be recorded without real submissions.
    pub sim_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OptionPlan {
    SingleLeg(SingleLegPlan),
    MultiLeg(MultiLegPlan),
}

/// Option-specific fields of an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionIntent {
    pub option_kind: OptionKind,
    pub moneyness: Moneyness,
    pub time_to_expiry_days: i64,
    pub plan: OptionPlan,
}

/// An agent's desired action. `size` is relative units for stock intents
/// (scaled by the risk sizer) and whole contracts for option intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub symbol: String,
    pub agent_name: String,
    pub direction: TradeDirection,
    pub size: f64,
    pub confidence: f64,
    pub reason: String,
    pub instrument_type: InstrumentType,
    pub option: Option<OptionIntent>,
    /// Numeric annotations (fvg midpoints, distances, credits).
    pub metadata: BTreeMap<String, f64>,
}

impl TradeIntent {
    pub fn stock(
        symbol: impl Into<String>,
        agent_name: impl Into<String>,
        direction: TradeDirection,
        size: f64,
        confidence: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            agent_name: agent_name.into(),
            direction,
            size,
            confidence,
            reason: reason.into(),
            instrument_type: InstrumentType::Stock,
            option: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn multi_leg_plan(&self) -> Option<&MultiLegPlan> {
        match self.option.as_ref()?.plan {
            OptionPlan::MultiLeg(ref p) => Some(p),
            OptionPlan::SingleLeg(_) => None,
        }
    }

    pub fn single_leg_plan(&self) -> Option<&SingleLegPlan> {
        match self.option.as_ref()?.plan {
            OptionPlan::SingleLeg(ref p) => Some(p),
            OptionPlan::MultiLeg(_) => None,
        }
    }
}
