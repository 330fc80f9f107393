//! Meta-policy controller: many intents in, one [`FinalTradeIntent`] out.
//!
//! Intents are bucketed by direction and scored under the adaptive
//! weight tables; the best bucket wins if it clears the minimum score.
//! Conviction multipliers for option structures are applied here — in
//! exactly one place — so arbitration stays deterministic no matter
//! which agent emitted the intent.

use rgk_agents::{InstrumentType, TradeDirection, TradeIntent};
use rgk_regime::RegimeSignal;
use serde::{Deserialize, Serialize};

use crate::adaptor::WeightTables;
use crate::types::FinalTradeIntent;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// A bucket must score at least this to produce a trade.
    pub min_score: f64,
    /// Option intents at or above this confidence are high-conviction.
    pub high_conviction_confidence: f64,
    pub high_conviction_mult: f64,
    /// Long option entries below this IV percentile get the cheap-vol
    /// multiplier.
    pub low_iv_percentile: f64,
    pub low_iv_mult: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            min_score: 0.1,
            high_conviction_confidence: 0.8,
            high_conviction_mult: 1.5,
            low_iv_percentile: 30.0,
            low_iv_mult: 1.3,
        }
    }
}

/// Conviction multiplier for one intent (1.0 for stock intents).
fn conviction_mult(cfg: &ControllerConfig, intent: &TradeIntent) -> f64 {
    if intent.instrument_type != InstrumentType::Option {
        return 1.0;
    }
    let mut mult = 1.0;
    if intent.confidence >= cfg.high_conviction_confidence {
        mult *= cfg.high_conviction_mult;
    }
    let iv_percentile = intent
        .option
        .as_ref()
        .and_then(|o| match &o.plan {
            rgk_agents::OptionPlan::SingleLeg(p) => p.iv_percentile,
            rgk_agents::OptionPlan::MultiLeg(p) => Some(p.iv_percentile),
        });
    if intent.direction == TradeDirection::Long {
        if let Some(pct) = iv_percentile {
            if pct < cfg.low_iv_percentile {
                mult *= cfg.low_iv_mult;
            }
        }
    }
    mult
}

fn intent_score(
    cfg: &ControllerConfig,
    weights: &WeightTables,
    signal: &RegimeSignal,
    intent: &TradeIntent,
) -> f64 {
    intent.confidence
        * intent.size
        * weights.agent_weight(&intent.agent_name)
        * weights.regime_weight(signal.regime_type)
        * weights.volatility_weight(signal.volatility_level)
        * weights.structure_weight(intent.instrument_type)
        * conviction_mult(cfg, intent)
}

/// Reduce this bar's intents to a single arbitrated action.
///
/// An empty intent list, or no bucket clearing `min_score`, yields
/// `is_valid = false` and mutates nothing anywhere.
pub fn reconcile(
    cfg: &ControllerConfig,
    intents: &[TradeIntent],
    signal: &RegimeSignal,
    weights: &WeightTables,
) -> FinalTradeIntent {
    let symbol = intents
        .first()
        .map(|i| i.symbol.clone())
        .unwrap_or_default();

    if intents.is_empty() {
        return FinalTradeIntent::invalid(symbol, "no intents");
    }

    let mut long_bucket: Vec<(&TradeIntent, f64)> = Vec::new();
    let mut short_bucket: Vec<(&TradeIntent, f64)> = Vec::new();

    for intent in intents {
        let score = intent_score(cfg, weights, signal, intent);
        match intent.direction {
            TradeDirection::Long => long_bucket.push((intent, score)),
            TradeDirection::Short => short_bucket.push((intent, score)),
            TradeDirection::Flat => {}
        }
    }

    let long_score: f64 = long_bucket.iter().map(|(_, s)| s).sum();
    let short_score: f64 = short_bucket.iter().map(|(_, s)| s).sum();

    let (bucket, bucket_score, sign) = if long_score >= short_score {
        (long_bucket, long_score, 1.0)
    } else {
        (short_bucket, short_score, -1.0)
    };

    if bucket.is_empty() || bucket_score < cfg.min_score {
        return FinalTradeIntent::invalid(symbol, "no bucket above minimum score");
    }

    // Primary = highest-scoring contributor; ties resolve to the earliest
    // intent so arbitration is order-stable.
    let (primary, _) = bucket
        .iter()
        .fold(None::<(&TradeIntent, f64)>, |acc, &(i, s)| match acc {
            None => Some((i, s)),
            Some((_, best)) if s > best => Some((i, s)),
            Some(keep) => Some(keep),
        })
        .expect("bucket checked non-empty");

    // Score-weighted average of sizes and confidences.
    let weight_sum: f64 = bucket.iter().map(|(_, s)| s).sum();
    let avg_size: f64 = bucket.iter().map(|(i, s)| i.size * s).sum::<f64>() / weight_sum;
    let avg_confidence: f64 =
        (bucket.iter().map(|(i, s)| i.confidence * s).sum::<f64>() / weight_sum).clamp(0.0, 1.0);

    let contributing_agents = bucket.iter().map(|(i, _)| i.agent_name.clone()).collect();

    FinalTradeIntent {
        symbol: primary.symbol.clone(),
        position_delta: sign * avg_size,
        confidence: avg_confidence,
        primary_agent: primary.agent_name.clone(),
        contributing_agents,
        reason: primary.reason.clone(),
        is_valid: true,
        instrument_type: primary.instrument_type,
        option: primary.option.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rgk_regime::{
        Bias, GexSnapshot, RegimeSignal, RegimeType, TrendDirection, VolatilityLevel,
    };

    fn signal() -> RegimeSignal {
        RegimeSignal {
            regime_type: RegimeType::Trend,
            trend_direction: TrendDirection::Up,
            volatility_level: VolatilityLevel::Medium,
            bias: Bias::Long,
            confidence: 0.7,
            is_valid: true,
            active_fvg: None,
            microstructure: GexSnapshot::default(),
        }
    }

    fn stock(agent: &str, direction: TradeDirection, size: f64, confidence: f64) -> TradeIntent {
        TradeIntent::stock("QQQ", agent, direction, size, confidence, "test")
    }

    fn tables() -> WeightTables {
        WeightTables::new(&[
            "trend_agent".to_string(),
            "ema_agent".to_string(),
            "mean_reversion_agent".to_string(),
        ])
    }

    #[test]
    fn empty_intent_list_is_invalid() {
        let out = reconcile(&ControllerConfig::default(), &[], &signal(), &tables());
        assert!(!out.is_valid);
        assert_eq!(out.position_delta, 0.0);
    }

    #[test]
    fn single_long_intent_wins() {
        let intents = vec![stock("trend_agent", TradeDirection::Long, 1.0, 0.7)];
        let out = reconcile(&ControllerConfig::default(), &intents, &signal(), &tables());
        assert!(out.is_valid);
        assert_eq!(out.primary_agent, "trend_agent");
        assert!(out.position_delta > 0.0);
        assert_eq!(out.contributing_agents, vec!["trend_agent".to_string()]);
    }

    #[test]
    fn stronger_bucket_wins_direction() {
        let intents = vec![
            stock("trend_agent", TradeDirection::Long, 1.0, 0.9),
            stock("ema_agent", TradeDirection::Long, 0.8, 0.6),
            stock("mean_reversion_agent", TradeDirection::Short, 0.5, 0.5),
        ];
        let out = reconcile(&ControllerConfig::default(), &intents, &signal(), &tables());
        assert!(out.is_valid);
        assert!(out.position_delta > 0.0);
        assert_eq!(out.primary_agent, "trend_agent");
        assert_eq!(out.contributing_agents.len(), 2);
    }

    #[test]
    fn short_bucket_gives_negative_delta() {
        let intents = vec![stock("mean_reversion_agent", TradeDirection::Short, 1.0, 0.8)];
        let out = reconcile(&ControllerConfig::default(), &intents, &signal(), &tables());
        assert!(out.is_valid);
        assert!(out.position_delta < 0.0);
    }

    #[test]
    fn below_min_score_is_invalid() {
        let intents = vec![stock("trend_agent", TradeDirection::Long, 0.1, 0.1)];
        let out = reconcile(&ControllerConfig::default(), &intents, &signal(), &tables());
        assert!(!out.is_valid);
    }

    #[test]
    fn agent_weight_biases_primary_selection() {
        let mut t = tables();
        t.agent_weights.insert("ema_agent".into(), 3.0);
        let intents = vec![
            stock("trend_agent", TradeDirection::Long, 1.0, 0.7),
            stock("ema_agent", TradeDirection::Long, 1.0, 0.7),
        ];
        let out = reconcile(&ControllerConfig::default(), &intents, &signal(), &t);
        assert_eq!(out.primary_agent, "ema_agent");
    }

    #[test]
    fn flat_intents_never_trade() {
        let intents = vec![stock("trend_agent", TradeDirection::Flat, 1.0, 0.9)];
        let out = reconcile(&ControllerConfig::default(), &intents, &signal(), &tables());
        assert!(!out.is_valid);
    }

    #[test]
    fn confidence_is_clipped_to_unit_interval() {
        let intents = vec![stock("trend_agent", TradeDirection::Long, 1.0, 1.0)];
        let out = reconcile(&ControllerConfig::default(), &intents, &signal(), &tables());
        assert!(out.confidence <= 1.0);
    }
}
