//! Mean-reversion agent: trades toward VWAP when the regime favors it.

use rgk_regime::{Bias, RegimeSignal};
use serde::{Deserialize, Serialize};

use crate::intent::{TradeDirection, TradeIntent};
use crate::MarketState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanReversionConfig {
    pub min_confidence: f64,
    pub position_size: f64,
}

impl Default for MeanReversionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.55,
            position_size: 0.75,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeanReversionAgent {
    pub symbol: String,
    pub config: MeanReversionConfig,
}

impl MeanReversionAgent {
    pub const NAME: &'static str = "mean_reversion_agent";

    pub fn evaluate(&self, signal: &RegimeSignal, _state: &MarketState) -> Vec<TradeIntent> {
        if !signal.is_mean_reversion() || signal.confidence < self.config.min_confidence {
            return Vec::new();
        }
        let (direction, reason) = match signal.bias {
            Bias::Long => (TradeDirection::Long, "mean_reversion_long_bias"),
            Bias::Short => (TradeDirection::Short, "mean_reversion_short_bias"),
            Bias::Neutral => return Vec::new(),
        };
        vec![TradeIntent::stock(
            &self.symbol,
            Self::NAME,
            direction,
            self.config.position_size,
            signal.confidence,
            reason,
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{features, market_state, mean_reversion_signal};

    #[test]
    fn fades_short_when_bias_is_short() {
        let agent = MeanReversionAgent {
            symbol: "QQQ".into(),
            config: MeanReversionConfig::default(),
        };
        let sig = mean_reversion_signal(Bias::Short, 0.7);
        let f = features(100.0);
        let intents = agent.evaluate(&sig, &market_state(&f));
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].direction, TradeDirection::Short);
    }

    #[test]
    fn silent_on_neutral_bias() {
        let agent = MeanReversionAgent {
            symbol: "QQQ".into(),
            config: MeanReversionConfig::default(),
        };
        let sig = mean_reversion_signal(Bias::Neutral, 0.7);
        let f = features(100.0);
        assert!(agent.evaluate(&sig, &market_state(&f)).is_empty());
    }
}
