//! Trend agent: follows directional moves when the regime confirms trend
//! conditions.

use rgk_regime::{Bias, RegimeSignal, TrendDirection};
use serde::{Deserialize, Serialize};

use crate::intent::{TradeDirection, TradeIntent};
use crate::MarketState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    pub min_confidence: f64,
    pub position_size: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            position_size: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrendAgent {
    pub symbol: String,
    pub config: TrendConfig,
}

impl TrendAgent {
    pub const NAME: &'static str = "trend_agent";

    pub fn evaluate(&self, signal: &RegimeSignal, _state: &MarketState) -> Vec<TradeIntent> {
        if !signal.is_trending() || signal.confidence < self.config.min_confidence {
            return Vec::new();
        }
        if signal.bias == Bias::Neutral {
            return Vec::new();
        }
        let direction = match signal.trend_direction {
            TrendDirection::Up => TradeDirection::Long,
            TrendDirection::Down => TradeDirection::Short,
            TrendDirection::Sideways => return Vec::new(),
        };
        vec![TradeIntent::stock(
            &self.symbol,
            Self::NAME,
            direction,
            self.config.position_size,
            signal.confidence,
            "trend_regime_alignment",
        )]
    }
}
