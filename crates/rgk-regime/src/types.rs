//! Regime signal contract.

use rgk_features::Fvg;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeType {
    Trend,
    MeanReversion,
    Compression,
    Expansion,
    Neutral,
}

impl RegimeType {
    pub fn as_str(self) -> &'static str {
        match self {
            RegimeType::Trend => "trend",
            RegimeType::MeanReversion => "mean_reversion",
            RegimeType::Compression => "compression",
            RegimeType::Expansion => "expansion",
            RegimeType::Neutral => "neutral",
        }
    }

    pub const ALL: [RegimeType; 5] = [
        RegimeType::Trend,
        RegimeType::MeanReversion,
        RegimeType::Compression,
        RegimeType::Expansion,
        RegimeType::Neutral,
    ];
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Sideways,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityLevel {
    Low,
    Medium,
    High,
}

impl VolatilityLevel {
    /// Ordinal used by volatility-scaled position sizing.
    pub fn ordinal(self) -> i32 {
        match self {
            VolatilityLevel::Low => 0,
            VolatilityLevel::Medium => 1,
            VolatilityLevel::High => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VolatilityLevel::Low => "low",
            VolatilityLevel::Medium => "medium",
            VolatilityLevel::High => "high",
        }
    }

    pub const ALL: [VolatilityLevel; 3] = [
        VolatilityLevel::Low,
        VolatilityLevel::Medium,
        VolatilityLevel::High,
    ];
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Long,
    Short,
    Neutral,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GexRegime {
    Positive,
    Negative,
    Neutral,
}

/// Dealer-positioning proxy attached to the regime signal. Defaults to
/// neutral/zero when no options-chain provider is wired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GexSnapshot {
    pub gex_regime: GexRegime,
    /// Signed net gamma exposure in billions of dollars.
    pub gex_strength_billions: f64,
    pub total_gex_dollar: f64,
    /// Contracts that passed the OI/delta filters and contributed.
    pub gex_coverage: usize,
}

impl Default for GexSnapshot {
    fn default() -> Self {
        Self {
            gex_regime: GexRegime::Neutral,
            gex_strength_billions: 0.0,
            total_gex_dollar: 0.0,
            gex_coverage: 0,
        }
    }
}

/// Classifier output for one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSignal {
    pub regime_type: RegimeType,
    pub trend_direction: TrendDirection,
    pub volatility_level: VolatilityLevel,
    pub bias: Bias,
    /// Clipped to [0, 1].
    pub confidence: f64,
    /// False when the window is too small or the evidence too weak;
    /// agents emit nothing on an invalid signal.
    pub is_valid: bool,
    pub active_fvg: Option<Fvg>,
    pub microstructure: GexSnapshot,
}

impl RegimeSignal {
    /// A signal that cannot drive trading (insufficient data).
    pub fn invalid() -> Self {
        Self {
            regime_type: RegimeType::Neutral,
            trend_direction: TrendDirection::Sideways,
            volatility_level: VolatilityLevel::Medium,
            bias: Bias::Neutral,
            confidence: 0.0,
            is_valid: false,
            active_fvg: None,
            microstructure: GexSnapshot::default(),
        }
    }

    pub fn is_trending(&self) -> bool {
        self.regime_type == RegimeType::Trend
    }

    pub fn is_mean_reversion(&self) -> bool {
        self.regime_type == RegimeType::MeanReversion
    }
}
