//! Feature → regime mapping.
//!
//! `classify` is deterministic over its inputs; the previous bar's signal
//! is one of those inputs solely for hysteresis, so the function stays
//! pure (no internal state, no clock, no randomness).

use rgk_features::FeatureSet;
use serde::{Deserialize, Serialize};

use crate::types::{
    Bias, GexSnapshot, RegimeSignal, RegimeType, TrendDirection, VolatilityLevel,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// ATR-normalized slope magnitude above which the market is trending.
    pub slope_threshold: f64,
    /// VWAP z-score magnitude above which mean reversion is plausible.
    pub zscore_threshold: f64,
    /// Short/long vol ratio below ⇒ compression, above ⇒ expansion.
    pub compression_ratio: f64,
    pub expansion_ratio: f64,
    /// Bars required before a signal can be valid.
    pub min_window: usize,
    /// Confidence below this floor invalidates the signal.
    pub confidence_floor: f64,
    /// Two tags scoring within this band keep the previous bar's tag.
    pub hysteresis_epsilon: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            slope_threshold: 0.05,
            zscore_threshold: 1.5,
            compression_ratio: 0.7,
            expansion_ratio: 1.3,
            min_window: 50,
            confidence_floor: 0.2,
            hysteresis_epsilon: 0.05,
        }
    }
}

/// Evidence score in [0, 1] for each candidate tag. Neutral carries a
/// small constant floor so it wins only when nothing else shows up.
fn tag_scores(cfg: &ClassifierConfig, f: &FeatureSet) -> [(RegimeType, f64); 5] {
    let slope_mag = f.trend_slope_norm.abs();
    let trend = (slope_mag / (2.0 * cfg.slope_threshold)).min(1.0);

    let z_mag = f.vwap_zscore.abs();
    let low_slope = if slope_mag < cfg.slope_threshold { 1.0 } else { 0.0 };
    let mean_rev = (z_mag / (2.0 * cfg.zscore_threshold)).min(1.0) * low_slope;

    let compression = if f.vol_ratio < cfg.compression_ratio {
        ((cfg.compression_ratio - f.vol_ratio) / (cfg.compression_ratio / 2.0)).min(1.0)
    } else {
        0.0
    };
    let expansion = if f.vol_ratio > cfg.expansion_ratio {
        ((f.vol_ratio - cfg.expansion_ratio) / cfg.expansion_ratio).min(1.0)
    } else {
        0.0
    };

    [
        (RegimeType::Trend, trend),
        (RegimeType::MeanReversion, mean_rev),
        (RegimeType::Compression, compression),
        (RegimeType::Expansion, expansion),
        (RegimeType::Neutral, 0.10),
    ]
}

/// Map a feature set (plus the externally supplied microstructure
/// snapshot) to a regime signal.
pub fn classify(
    cfg: &ClassifierConfig,
    features: &FeatureSet,
    microstructure: GexSnapshot,
    prev: Option<&RegimeSignal>,
) -> RegimeSignal {
    let scores = tag_scores(cfg, features);

    let (mut regime, best_score) = scores
        .iter()
        .fold((RegimeType::Neutral, f64::MIN), |acc, &(tag, s)| {
            if s > acc.1 {
                (tag, s)
            } else {
                acc
            }
        });

    // Hysteresis: if the previous tag scores within epsilon of the best,
    // keep it to suppress flip noise on the boundary.
    if let Some(p) = prev {
        if p.is_valid && p.regime_type != regime {
            let prev_score = scores
                .iter()
                .find(|(tag, _)| *tag == p.regime_type)
                .map(|(_, s)| *s)
                .unwrap_or(0.0);
            if best_score - prev_score < cfg.hysteresis_epsilon {
                regime = p.regime_type;
            }
        }
    }

    let trend_direction = if features.trend_slope_norm > cfg.slope_threshold {
        TrendDirection::Up
    } else if features.trend_slope_norm < -cfg.slope_threshold {
        TrendDirection::Down
    } else {
        TrendDirection::Sideways
    };

    let volatility_level = if features.vol_percentile < 33.0 {
        VolatilityLevel::Low
    } else if features.vol_percentile <= 66.0 {
        VolatilityLevel::Medium
    } else {
        VolatilityLevel::High
    };

    let bias = match regime {
        RegimeType::Compression => Bias::Neutral,
        RegimeType::MeanReversion => {
            // Fade the stretch: price above VWAP ⇒ short, below ⇒ long.
            if features.vwap_zscore > 0.0 {
                Bias::Short
            } else if features.vwap_zscore < 0.0 {
                Bias::Long
            } else {
                Bias::Neutral
            }
        }
        _ => match trend_direction {
            TrendDirection::Up => Bias::Long,
            TrendDirection::Down => Bias::Short,
            TrendDirection::Sideways => Bias::Neutral,
        },
    };

    // Confidence blends tag evidence, vol-ratio separation from 1.0, and
    // sample sufficiency. Clipped to [0, 1].
    let vol_sep = ((features.vol_ratio - 1.0).abs() / 0.5).min(1.0);
    let sample_frac = (features.sample_size as f64 / cfg.min_window as f64).min(1.0);
    let confidence = (0.6 * best_score + 0.2 * vol_sep + 0.2 * sample_frac).clamp(0.0, 1.0);

    let is_valid = features.sample_size >= cfg.min_window && confidence >= cfg.confidence_floor;

    RegimeSignal {
        regime_type: regime,
        trend_direction,
        volatility_level,
        bias,
        confidence,
        is_valid,
        active_fvg: features.active_fvg.clone(),
        microstructure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> FeatureSet {
        FeatureSet {
            close: 100.0,
            vwap: 100.0,
            atr: 0.5,
            realized_vol: 0.002,
            realized_vol_long: 0.002,
            vol_ratio: 1.0,
            vol_percentile: 50.0,
            trend_slope: 0.0,
            trend_slope_norm: 0.0,
            ema9: 100.0,
            vwap_zscore: 0.0,
            active_fvg: None,
            sample_size: 100,
        }
    }

    #[test]
    fn strong_uptrend_classifies_as_trend_long() {
        let mut f = features();
        f.trend_slope_norm = 0.3;
        f.trend_slope = 0.15;
        let sig = classify(&ClassifierConfig::default(), &f, GexSnapshot::default(), None);
        assert_eq!(sig.regime_type, RegimeType::Trend);
        assert_eq!(sig.trend_direction, TrendDirection::Up);
        assert_eq!(sig.bias, Bias::Long);
        assert!(sig.confidence >= 0.6, "confidence {}", sig.confidence);
        assert!(sig.is_valid);
    }

    #[test]
    fn downtrend_bias_is_short() {
        let mut f = features();
        f.trend_slope_norm = -0.3;
        let sig = classify(&ClassifierConfig::default(), &f, GexSnapshot::default(), None);
        assert_eq!(sig.trend_direction, TrendDirection::Down);
        assert_eq!(sig.bias, Bias::Short);
    }

    #[test]
    fn low_vol_ratio_is_compression_with_neutral_bias() {
        let mut f = features();
        f.vol_ratio = 0.35;
        let sig = classify(&ClassifierConfig::default(), &f, GexSnapshot::default(), None);
        assert_eq!(sig.regime_type, RegimeType::Compression);
        assert_eq!(sig.bias, Bias::Neutral);
        assert!(sig.confidence >= 0.85, "confidence {}", sig.confidence);
    }

    #[test]
    fn high_vol_ratio_is_expansion() {
        let mut f = features();
        f.vol_ratio = 2.8;
        let sig = classify(&ClassifierConfig::default(), &f, GexSnapshot::default(), None);
        assert_eq!(sig.regime_type, RegimeType::Expansion);
    }

    #[test]
    fn stretched_price_with_flat_slope_is_mean_reversion() {
        let mut f = features();
        f.vwap_zscore = 2.5;
        let sig = classify(&ClassifierConfig::default(), &f, GexSnapshot::default(), None);
        assert_eq!(sig.regime_type, RegimeType::MeanReversion);
        // Price above VWAP fades short.
        assert_eq!(sig.bias, Bias::Short);
    }

    #[test]
    fn small_window_is_invalid() {
        let mut f = features();
        f.sample_size = 10;
        f.trend_slope_norm = 0.3;
        let sig = classify(&ClassifierConfig::default(), &f, GexSnapshot::default(), None);
        assert!(!sig.is_valid);
    }

    #[test]
    fn hysteresis_keeps_previous_tag_on_the_boundary() {
        let cfg = ClassifierConfig::default();
        let mut f = features();
        f.vol_ratio = 0.35; // strong compression
        let prev = classify(&cfg, &f, GexSnapshot::default(), None);
        assert_eq!(prev.regime_type, RegimeType::Compression);

        // Evidence drifts so trend barely edges out compression.
        let mut f2 = features();
        f2.vol_ratio = 0.45;
        f2.trend_slope_norm = 0.075;
        let scores_only = classify(&cfg, &f2, GexSnapshot::default(), None);
        let with_prev = classify(&cfg, &f2, GexSnapshot::default(), Some(&prev));
        // Without hysteresis the tag may flip; with the previous signal
        // within epsilon, compression is retained.
        assert_eq!(with_prev.regime_type, RegimeType::Compression);
        let _ = scores_only;
    }

    #[test]
    fn vol_percentile_buckets() {
        let cfg = ClassifierConfig::default();
        for (pct, want) in [
            (10.0, VolatilityLevel::Low),
            (50.0, VolatilityLevel::Medium),
            (90.0, VolatilityLevel::High),
        ] {
            let mut f = features();
            f.vol_percentile = pct;
            let sig = classify(&cfg, &f, GexSnapshot::default(), None);
            assert_eq!(sig.volatility_level, want);
        }
    }
}
