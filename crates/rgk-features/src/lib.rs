//! Feature layer: rolling bar window → per-bar [`FeatureSet`].
//!
//! One [`FeatureEngine`] instance exists per symbol; the scheduler feeds
//! it every accepted bar and hands the resulting `FeatureSet` to the
//! regime classifier and the agents. No I/O, no clock — features are a
//! pure function of the bars seen so far.

pub mod fvg;
pub mod indicators;
pub mod window;

use std::collections::VecDeque;

use rgk_schemas::Bar;
use serde::{Deserialize, Serialize};

pub use fvg::{Fvg, FvgTracker, GapType};
pub use window::RollingWindow;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Bars retained in the rolling window.
    pub window_capacity: usize,
    /// Lookback for trend slope / VWAP / long volatility.
    pub lookback: usize,
    /// Short window for recent realized volatility.
    pub vol_window: usize,
    pub ema_period: usize,
    /// Bars before an unfilled gap is discarded.
    pub fvg_max_age_bars: u64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            window_capacity: 500,
            lookback: 120,
            vol_window: 30,
            ema_period: 9,
            fvg_max_age_bars: 100,
        }
    }
}

/// Everything the classifier and agents read for one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub close: f64,
    pub vwap: f64,
    pub atr: f64,
    /// Realized vol over the short window (per-bar return stdev).
    pub realized_vol: f64,
    /// Realized vol over the full lookback.
    pub realized_vol_long: f64,
    /// short / long realized vol; 1.0 when degenerate.
    pub vol_ratio: f64,
    /// Percentile (0..=100) of current short vol within its own history.
    pub vol_percentile: f64,
    /// Regression slope of closes, dollars per bar.
    pub trend_slope: f64,
    /// Slope normalized by ATR (dimensionless).
    pub trend_slope_norm: f64,
    pub ema9: f64,
    /// Z-score of close vs VWAP in realized-vol units.
    pub vwap_zscore: f64,
    /// Most recent active gap near price, if any.
    pub active_fvg: Option<Fvg>,
    /// Bars that contributed to this feature set.
    pub sample_size: usize,
}

#[derive(Debug, Clone)]
pub struct FeatureEngine {
    config: FeatureConfig,
    window: RollingWindow,
    fvgs: FvgTracker,
    /// History of short-window realized vol, for percentile ranking.
    vol_history: VecDeque<f64>,
    bar_index: u64,
}

impl FeatureEngine {
    pub fn new(config: FeatureConfig) -> Self {
        let window = RollingWindow::new(config.window_capacity);
        let fvgs = FvgTracker::new(config.fvg_max_age_bars);
        Self {
            config,
            window,
            fvgs,
            vol_history: VecDeque::new(),
            bar_index: 0,
        }
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn bar_count(&self) -> usize {
        self.window.len()
    }

    /// Ingest one bar and return the feature set describing it.
    pub fn on_bar(&mut self, bar: Bar) -> FeatureSet {
        self.bar_index += 1;

        // FVG detection needs the bar two positions back, read before push.
        let tail = self.window.tail(2);
        let (p2h, p2l) = match tail.first() {
            Some(b) if tail.len() == 2 => (Some(b.high_f64()), Some(b.low_f64())),
            _ => (None, None),
        };
        let (cur_high, cur_low, close) = (bar.high_f64(), bar.low_f64(), bar.close_f64());

        self.window.push(bar);

        self.fvgs
            .on_bar(self.bar_index, p2h, p2l, cur_high, cur_low, close);

        let look = self.window.tail(self.config.lookback);
        let short = self.window.tail(self.config.vol_window);

        let vwap = indicators::vwap(&look);
        let atr = indicators::atr(&look);
        let realized_vol = indicators::realized_vol(&short);
        let realized_vol_long = indicators::realized_vol(&look);
        let vol_ratio = if realized_vol_long > 0.0 {
            realized_vol / realized_vol_long
        } else {
            1.0
        };

        let vol_percentile =
            indicators::percentile_rank(self.vol_history.make_contiguous(), realized_vol);
        self.vol_history.push_back(realized_vol);
        if self.vol_history.len() > self.config.lookback {
            self.vol_history.pop_front();
        }

        let trend_slope = indicators::trend_slope(&look);
        let trend_slope_norm = if atr > 0.0 { trend_slope / atr } else { 0.0 };
        let ema9 = indicators::ema(&look, self.config.ema_period);
        let vwap_zscore = indicators::vwap_zscore(&look);

        let active_fvg = self.fvgs.nearest_active(close, atr.max(close * 0.001)).cloned();

        FeatureSet {
            close,
            vwap,
            atr,
            realized_vol,
            realized_vol_long,
            vol_ratio,
            vol_percentile,
            trend_slope,
            trend_slope_norm,
            ema9,
            vwap_zscore,
            active_fvg,
            sample_size: self.window.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rgk_schemas::micros::from_f64;

    fn bar(i: i64, close: f64) -> Bar {
        Bar::new(
            "QQQ",
            Utc.timestamp_opt(i * 60, 0).unwrap(),
            from_f64(close),
            from_f64(close + 0.3),
            from_f64(close - 0.3),
            from_f64(close),
            1_000,
        )
    }

    #[test]
    fn sample_size_tracks_window() {
        let mut eng = FeatureEngine::new(FeatureConfig::default());
        for i in 0..10 {
            let f = eng.on_bar(bar(i, 100.0));
            assert_eq!(f.sample_size, (i + 1) as usize);
        }
    }

    #[test]
    fn uptrend_has_positive_normalized_slope() {
        let mut eng = FeatureEngine::new(FeatureConfig::default());
        let mut last = FeatureSet {
            close: 0.0,
            vwap: 0.0,
            atr: 0.0,
            realized_vol: 0.0,
            realized_vol_long: 0.0,
            vol_ratio: 1.0,
            vol_percentile: 50.0,
            trend_slope: 0.0,
            trend_slope_norm: 0.0,
            ema9: 0.0,
            vwap_zscore: 0.0,
            active_fvg: None,
            sample_size: 0,
        };
        for i in 0..60 {
            last = eng.on_bar(bar(i, 100.0 + 0.2 * i as f64));
        }
        assert!(last.trend_slope > 0.0);
        assert!(last.trend_slope_norm > 0.0);
        assert!(last.close > last.vwap);
    }

    #[test]
    fn flat_series_has_unit_vol_ratio() {
        let mut eng = FeatureEngine::new(FeatureConfig::default());
        let mut last = None;
        for i in 0..60 {
            last = Some(eng.on_bar(bar(i, 100.0)));
        }
        let f = last.unwrap();
        assert_eq!(f.realized_vol, 0.0);
        assert_eq!(f.vol_ratio, 1.0);
    }

    #[test]
    fn ema_follows_constant_price() {
        let mut eng = FeatureEngine::new(FeatureConfig::default());
        let mut last = None;
        for i in 0..30 {
            last = Some(eng.on_bar(bar(i, 250.0)));
        }
        assert!((last.unwrap().ema9 - 250.0).abs() < 1e-9);
    }
}
