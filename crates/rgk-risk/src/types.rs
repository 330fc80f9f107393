//! Risk configuration and running state.

use std::collections::{BTreeMap, VecDeque};

use chrono::NaiveDate;
use rgk_regime::{RegimeType, VolatilityLevel};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Intents below this confidence never trade.
    pub min_confidence: f64,

    // Position sizing.
    /// Fraction of equity one unit of position delta targets.
    pub base_position_pct: f64,
    /// Per-regime cap on position notional as a fraction of equity.
    pub regime_caps: BTreeMap<RegimeType, f64>,
    pub enable_volatility_scaling: bool,
    /// Size reduction per volatility level above base.
    pub vol_scaling_factor: f64,
    pub base_volatility: VolatilityLevel,

    // Drawdown limits (fractions of peak equity).
    pub hard_drawdown_pct: f64,
    pub soft_drawdown_pct: f64,
    /// Size multiplier while inside the soft-drawdown band.
    pub soft_drawdown_size_mult: f64,

    // Circuit breaker.
    pub enable_circuit_breakers: bool,
    pub max_losses_in_window: usize,
    pub loss_window_size: usize,
    pub circuit_breaker_cooldown_bars: u64,

    // Daily loss limit (fraction of initial capital).
    pub daily_loss_limit_pct: f64,

    // Value-at-risk.
    pub enable_var: bool,
    pub var_confidence: f64,
    pub var_window: usize,
    /// Cap on per-trade VaR as a fraction of equity.
    pub max_var_exposure: f64,

    /// Cap on per-symbol notional as a fraction of equity.
    pub max_symbol_exposure_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        let mut regime_caps = BTreeMap::new();
        regime_caps.insert(RegimeType::Trend, 0.15);
        regime_caps.insert(RegimeType::MeanReversion, 0.10);
        regime_caps.insert(RegimeType::Compression, 0.05);
        regime_caps.insert(RegimeType::Expansion, 0.12);
        regime_caps.insert(RegimeType::Neutral, 0.10);
        Self {
            min_confidence: 0.4,
            base_position_pct: 0.10,
            regime_caps,
            enable_volatility_scaling: true,
            vol_scaling_factor: 0.5,
            base_volatility: VolatilityLevel::Medium,
            hard_drawdown_pct: 0.15,
            soft_drawdown_pct: 0.10,
            soft_drawdown_size_mult: 0.5,
            enable_circuit_breakers: true,
            max_losses_in_window: 5,
            loss_window_size: 20,
            circuit_breaker_cooldown_bars: 50,
            daily_loss_limit_pct: 0.03,
            enable_var: true,
            var_confidence: 0.95,
            var_window: 100,
            max_var_exposure: 0.02,
            max_symbol_exposure_pct: 0.20,
        }
    }
}

impl RiskConfig {
    /// The challenge profile: the same engine under aggressive limits.
    /// Higher conviction bar, much larger per-position budget, a wider
    /// daily stop to let the leverage breathe.
    pub fn challenge() -> Self {
        let mut cfg = Self::default();
        cfg.min_confidence = 0.6;
        cfg.base_position_pct = 0.50;
        cfg.daily_loss_limit_pct = 0.06;
        cfg.hard_drawdown_pct = 0.25;
        cfg.soft_drawdown_pct = 0.15;
        cfg.regime_caps.insert(RegimeType::Trend, 0.50);
        cfg.regime_caps.insert(RegimeType::Expansion, 0.40);
        cfg.regime_caps.insert(RegimeType::MeanReversion, 0.30);
        cfg.regime_caps.insert(RegimeType::Neutral, 0.25);
        cfg
    }

    pub fn regime_cap(&self, regime: RegimeType) -> f64 {
        self.regime_caps.get(&regime).copied().unwrap_or(0.10)
    }
}

/// Mutable risk state, persisted in the checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub kill_switch_engaged: bool,
    pub initial_capital_micros: i64,
    pub current_equity_micros: i64,
    /// Monotonically non-decreasing.
    pub peak_equity_micros: i64,
    pub daily_pnl_micros: i64,
    pub current_day: Option<NaiveDate>,
    /// Rolling win/loss flags, newest last, bounded by the loss window.
    pub recent_losses: VecDeque<bool>,
    pub circuit_breaker_active: bool,
    pub circuit_breaker_until_bar: u64,
    /// Per-bar equity returns for the VaR estimate.
    pub returns_history: VecDeque<f64>,
}

impl RiskState {
    pub fn new(initial_capital_micros: i64) -> Self {
        Self {
            kill_switch_engaged: false,
            initial_capital_micros,
            current_equity_micros: initial_capital_micros,
            peak_equity_micros: initial_capital_micros,
            daily_pnl_micros: 0,
            current_day: None,
            recent_losses: VecDeque::new(),
            circuit_breaker_active: false,
            circuit_breaker_until_bar: 0,
            returns_history: VecDeque::new(),
        }
    }

    /// Current drawdown as a fraction of peak equity; 0.0 with no peak.
    pub fn drawdown(&self) -> f64 {
        if self.peak_equity_micros <= 0 {
            return 0.0;
        }
        let dd = (self.peak_equity_micros - self.current_equity_micros) as f64
            / self.peak_equity_micros as f64;
        dd.max(0.0)
    }
}

/// Outcome of the risk gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub allowed: bool,
    /// Signed quantity (shares for stock, contracts passed through for
    /// options). 0 when vetoed.
    pub sized_qty: i64,
    /// Empty when allowed without caveat.
    pub reason: String,
}

impl GateDecision {
    pub fn veto(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            sized_qty: 0,
            reason: reason.into(),
        }
    }

    pub fn allow(sized_qty: i64) -> Self {
        Self {
            allowed: true,
            sized_qty,
            reason: String::new(),
        }
    }
}

/// Canonical veto reason strings, shared with the event log.
pub mod reasons {
    pub const KILL_SWITCH: &str = "kill-switch";
    pub const CONFIDENCE_FLOOR: &str = "confidence-floor";
    pub const HARD_DRAWDOWN: &str = "hard-drawdown";
    pub const CIRCUIT_BREAKER: &str = "circuit-breaker";
    pub const DAILY_LOSS_LIMIT: &str = "daily-loss-limit";
    pub const ZERO_SIZE: &str = "zero-size";
}
