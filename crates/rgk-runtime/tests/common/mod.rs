//! Shared builders for runtime scenario tests.
#![allow(dead_code)]

use std::sync::Mutex;

use chrono::{NaiveDate, TimeZone, Utc};
use rgk_config::{EngineConfig, EngineMode, WarmupProfile};
use rgk_md::{ChainError, OptionsChainProvider};
use rgk_regime::ChainRow;
use rgk_schemas::micros::{from_f64, MICROS_SCALE};
use rgk_schemas::{Bar, OptionContract, OptionGreeks, OptionQuote, OptionType};

pub const M: i64 = MICROS_SCALE;

/// A 1-minute bar with a symmetric 0.3% high/low band.
pub fn bar(symbol: &str, index: i64, close: f64, volume: i64) -> Bar {
    let band = close * 0.003;
    Bar::new(
        symbol,
        Utc.timestamp_opt(1_700_000_000 + index * 60, 0).unwrap(),
        from_f64(close),
        from_f64(close + band),
        from_f64(close - band),
        from_f64(close),
        volume,
    )
}

/// Linear drift: `pct_per_bar` percent change per bar from `start`.
pub fn trending_bars(symbol: &str, start_index: i64, count: i64, start: f64, pct_per_bar: f64) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let close = start * (1.0 + pct_per_bar / 100.0).powi(i as i32);
            bar(symbol, start_index + i, close, 5_000)
        })
        .collect()
}

/// Volatile phase then a flat phase: drives the vol ratio down so the
/// classifier reads compression in the back half.
pub fn compression_bars(symbol: &str, count_volatile: i64, count_flat: i64, level: f64) -> Vec<Bar> {
    let mut bars = Vec::new();
    for i in 0..count_volatile {
        let wiggle = if i % 2 == 0 { 1.0 } else { -1.0 };
        bars.push(bar(symbol, i, level * (1.0 + 0.005 * wiggle), 5_000));
    }
    for i in 0..count_flat {
        let wiggle = if i % 2 == 0 { 1.0 } else { -1.0 };
        bars.push(bar(
            symbol,
            count_volatile + i,
            level * (1.0 + 0.0001 * wiggle),
            5_000,
        ));
    }
    bars
}

pub fn offline_config(symbol: &str) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.symbols = vec![symbol.to_string()];
    config.mode = EngineMode::Offline;
    config.warmup = WarmupProfile::Relaxed;
    // Short windows so scenarios flip regimes within a few dozen bars.
    config.features.lookback = 30;
    config.features.vol_window = 10;
    config.classifier.min_window = 20;
    config.checkpoint_every_bars = 0;
    config
}

pub fn expiry() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 12, 15).unwrap()
}

pub fn chain_row(
    underlying: &str,
    option_type: OptionType,
    strike: f64,
    delta: f64,
    gamma: f64,
    bid: f64,
    ask: f64,
    iv: f64,
    open_interest: i64,
) -> ChainRow {
    (
        OptionContract {
            symbol: format!("{underlying}-{}-{}", option_type.as_str(), strike as i64),
            underlying: underlying.to_string(),
            option_type,
            strike_micros: from_f64(strike),
            expiration: expiry(),
        },
        OptionQuote {
            bid_micros: from_f64(bid),
            ask_micros: from_f64(ask),
            last_micros: from_f64((bid + ask) / 2.0),
            volume: 400,
            open_interest,
        },
        OptionGreeks {
            delta,
            gamma,
            theta: -0.05,
            vega: 0.1,
            implied_volatility: iv,
        },
    )
}

/// Chain provider whose rows advance through scripted phases: phase `i`
/// is served while the bar counter is below `until_bar[i]`. The counter
/// advances once per `options_chain` call (one call per bar).
pub struct ScriptedChainProvider {
    phases: Vec<(u64, Vec<ChainRow>)>,
    calls: Mutex<u64>,
    pub iv_percentile: Option<f64>,
}

impl ScriptedChainProvider {
    pub fn new(phases: Vec<(u64, Vec<ChainRow>)>, iv_percentile: Option<f64>) -> Self {
        Self {
            phases,
            calls: Mutex::new(0),
            iv_percentile,
        }
    }

    fn current_rows(&self, call: u64) -> Vec<ChainRow> {
        for (until, rows) in &self.phases {
            if call < *until {
                return rows.clone();
            }
        }
        self.phases
            .last()
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }
}

impl OptionsChainProvider for ScriptedChainProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn options_chain(
        &self,
        underlying: &str,
        _expiration: Option<NaiveDate>,
        option_type: Option<OptionType>,
    ) -> Result<Vec<OptionContract>, ChainError> {
        let mut calls = self.calls.lock().unwrap();
        let current = *calls;
        *calls += 1;
        Ok(self
            .current_rows(current)
            .into_iter()
            .map(|(c, _, _)| c)
            .filter(|c| c.underlying == underlying)
            .filter(|c| option_type.map(|t| c.option_type == t).unwrap_or(true))
            .collect())
    }

    fn option_quote(&self, contract_symbol: &str) -> Result<Option<OptionQuote>, ChainError> {
        let call = self.calls.lock().unwrap().saturating_sub(1);
        Ok(self
            .current_rows(call)
            .into_iter()
            .find(|(c, _, _)| c.symbol == contract_symbol)
            .map(|(_, q, _)| q))
    }

    fn option_greeks(&self, contract_symbol: &str) -> Result<Option<OptionGreeks>, ChainError> {
        let call = self.calls.lock().unwrap().saturating_sub(1);
        Ok(self
            .current_rows(call)
            .into_iter()
            .find(|(c, _, _)| c.symbol == contract_symbol)
            .map(|(_, _, g)| g))
    }

    fn iv_percentile(
        &self,
        _underlying: &str,
        _current_iv: f64,
        _lookback_days: u32,
    ) -> Result<Option<f64>, ChainError> {
        Ok(self.iv_percentile)
    }
}
