//! FVG agent: targets unfilled fair value gaps near price.

use rgk_features::GapType;
use rgk_regime::RegimeSignal;
use serde::{Deserialize, Serialize};

use crate::intent::{TradeDirection, TradeIntent};
use crate::MarketState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FvgConfig {
    pub min_confidence: f64,
    pub position_size: f64,
}

impl Default for FvgConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            position_size: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FvgAgent {
    pub symbol: String,
    pub config: FvgConfig,
}

impl FvgAgent {
    pub const NAME: &'static str = "fvg_agent";

    pub fn evaluate(&self, signal: &RegimeSignal, state: &MarketState) -> Vec<TradeIntent> {
        let Some(fvg) = signal.active_fvg.as_ref() else {
            return Vec::new();
        };
        if signal.confidence < self.config.min_confidence {
            return Vec::new();
        }
        let price = state.features.close;
        if price <= 0.0 {
            return Vec::new();
        }
        let midpoint = fvg.midpoint();

        // Bullish gap below price pulls it down toward the zone: buy at or
        // under the midpoint. Bearish symmetrically.
        let direction = match fvg.gap_type {
            GapType::Bullish if price <= midpoint => TradeDirection::Long,
            GapType::Bearish if price >= midpoint => TradeDirection::Short,
            _ => return Vec::new(),
        };

        vec![TradeIntent::stock(
            &self.symbol,
            Self::NAME,
            direction,
            self.config.position_size,
            signal.confidence,
            "fvg_alignment",
        )
        .with_metadata("fvg_mid", midpoint)
        .with_metadata("price", price)]
    }
}
