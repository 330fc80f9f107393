//! Volatility agent: seeks breakout / expansion opportunities when the
//! volatility bucket is high.

use rgk_regime::{Bias, RegimeSignal, VolatilityLevel};
use serde::{Deserialize, Serialize};

use crate::intent::{TradeDirection, TradeIntent};
use crate::MarketState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityConfig {
    pub min_confidence: f64,
    pub position_size: f64,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            position_size: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VolatilityAgent {
    pub symbol: String,
    pub config: VolatilityConfig,
}

impl VolatilityAgent {
    pub const NAME: &'static str = "volatility_agent";

    pub fn evaluate(&self, signal: &RegimeSignal, _state: &MarketState) -> Vec<TradeIntent> {
        if signal.volatility_level != VolatilityLevel::High
            || signal.confidence < self.config.min_confidence
        {
            return Vec::new();
        }
        // Neutral bias defaults long: expansion drift is upward more often
        // than not and the sizer keeps this small.
        let direction = match signal.bias {
            Bias::Short => TradeDirection::Short,
            Bias::Long | Bias::Neutral => TradeDirection::Long,
        };
        vec![TradeIntent::stock(
            &self.symbol,
            Self::NAME,
            direction,
            self.config.position_size,
            signal.confidence,
            "volatility_expansion",
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{features, high_vol_signal, market_state};

    #[test]
    fn emits_in_high_vol() {
        let agent = VolatilityAgent {
            symbol: "QQQ".into(),
            config: VolatilityConfig::default(),
        };
        let sig = high_vol_signal(Bias::Neutral, 0.6);
        let f = features(100.0);
        let intents = agent.evaluate(&sig, &market_state(&f));
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].direction, TradeDirection::Long);
    }

    #[test]
    fn silent_in_medium_vol() {
        let agent = VolatilityAgent {
            symbol: "QQQ".into(),
            config: VolatilityConfig::default(),
        };
        let mut sig = high_vol_signal(Bias::Long, 0.6);
        sig.volatility_level = VolatilityLevel::Medium;
        let f = features(100.0);
        assert!(agent.evaluate(&sig, &market_state(&f)).is_empty());
    }
}
