//! EMA momentum agent: trades crossings of the 9-period EMA when the
//! distance clears a whipsaw threshold and the bias agrees.

use rgk_regime::{Bias, RegimeSignal, TrendDirection};
use serde::{Deserialize, Serialize};

use crate::intent::{TradeDirection, TradeIntent};
use crate::MarketState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmaConfig {
    pub min_confidence: f64,
    pub position_size: f64,
    /// Percent distance from the EMA required before emitting.
    pub momentum_threshold_pct: f64,
    /// EMA signals never exceed this confidence.
    pub confidence_cap: f64,
}

impl Default for EmaConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            position_size: 0.8,
            momentum_threshold_pct: 0.1,
            confidence_cap: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmaAgent {
    pub symbol: String,
    pub config: EmaConfig,
}

impl EmaAgent {
    pub const NAME: &'static str = "ema_agent";

    pub fn evaluate(&self, signal: &RegimeSignal, state: &MarketState) -> Vec<TradeIntent> {
        if !signal.is_valid || signal.confidence < self.config.min_confidence {
            return Vec::new();
        }
        let close = state.features.close;
        let ema9 = state.features.ema9;
        if close <= 0.0 || ema9 <= 0.0 {
            return Vec::new();
        }

        let distance_pct = ((close - ema9) / ema9).abs() * 100.0;
        if distance_pct < self.config.momentum_threshold_pct {
            return Vec::new();
        }

        let confidence = signal.confidence.min(self.config.confidence_cap);

        if close > ema9
            && (signal.bias == Bias::Long || signal.trend_direction == TrendDirection::Up)
        {
            return vec![TradeIntent::stock(
                &self.symbol,
                Self::NAME,
                TradeDirection::Long,
                self.config.position_size,
                confidence,
                "price_above_ema_with_bullish_momentum",
            )
            .with_metadata("ema_distance_pct", distance_pct)];
        }

        if close < ema9
            && (signal.bias == Bias::Short || signal.trend_direction == TrendDirection::Down)
        {
            return vec![TradeIntent::stock(
                &self.symbol,
                Self::NAME,
                TradeDirection::Short,
                self.config.position_size,
                confidence,
                "price_below_ema_with_bearish_momentum",
            )
            .with_metadata("ema_distance_pct", distance_pct)];
        }

        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{features_with_ema, market_state, trend_signal};

    fn agent() -> EmaAgent {
        EmaAgent {
            symbol: "QQQ".into(),
            config: EmaConfig::default(),
        }
    }

    #[test]
    fn long_when_price_clears_ema_with_uptrend() {
        let sig = trend_signal(TrendDirection::Up, 0.8);
        let f = features_with_ema(100.5, 100.0); // 0.5% above
        let intents = agent().evaluate(&sig, &market_state(&f));
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].direction, TradeDirection::Long);
        // EMA confidence is capped.
        assert!(intents[0].confidence <= 0.7);
    }

    #[test]
    fn silent_inside_whipsaw_band() {
        let sig = trend_signal(TrendDirection::Up, 0.8);
        let f = features_with_ema(100.05, 100.0); // 0.05% above, below threshold
        assert!(agent().evaluate(&sig, &market_state(&f)).is_empty());
    }

    #[test]
    fn silent_when_direction_conflicts_with_bias() {
        let sig = trend_signal(TrendDirection::Up, 0.8);
        let f = features_with_ema(99.0, 100.0); // below EMA but bias long
        assert!(agent().evaluate(&sig, &market_state(&f)).is_empty());
    }

    #[test]
    fn silent_on_invalid_signal() {
        let mut sig = trend_signal(TrendDirection::Up, 0.8);
        sig.is_valid = false;
        let f = features_with_ema(100.5, 100.0);
        assert!(agent().evaluate(&sig, &market_state(&f)).is_empty());
    }
}
