//! Gamma-exposure proxy from a chain snapshot.
//!
//! GEX per contract = gamma × open_interest × 100 × spot, signed + for
//! calls and − for puts (dealer-long-call convention). Only contracts
//! with meaningful open interest and mid-range delta contribute; deep
//! wings and dead strikes are noise.

use rgk_schemas::{OptionContract, OptionGreeks, OptionQuote, OptionType};

use crate::types::{GexRegime, GexSnapshot};

/// Open interest below this is ignored.
pub const MIN_OPEN_INTEREST: i64 = 50;
/// Delta magnitude band contributing to the proxy.
pub const MIN_ABS_DELTA: f64 = 0.2;
pub const MAX_ABS_DELTA: f64 = 0.8;
/// Net exposure under this magnitude (dollars) reads as neutral.
pub const NEUTRAL_BAND_DOLLAR: f64 = 0.25e9;

/// One row of the chain with its quote and Greeks resolved.
pub type ChainRow = (OptionContract, OptionQuote, OptionGreeks);

pub fn calculate_gex_proxy(rows: &[ChainRow], underlying_price: f64) -> GexSnapshot {
    let mut total = 0.0;
    let mut coverage = 0usize;

    for (contract, quote, greeks) in rows {
        if quote.open_interest < MIN_OPEN_INTEREST {
            continue;
        }
        let abs_delta = greeks.delta.abs();
        if !(MIN_ABS_DELTA..=MAX_ABS_DELTA).contains(&abs_delta) {
            continue;
        }
        let sign = match contract.option_type {
            OptionType::Call => 1.0,
            OptionType::Put => -1.0,
        };
        total += sign * greeks.gamma * quote.open_interest as f64 * 100.0 * underlying_price;
        coverage += 1;
    }

    let gex_regime = if total > NEUTRAL_BAND_DOLLAR {
        GexRegime::Positive
    } else if total < -NEUTRAL_BAND_DOLLAR {
        GexRegime::Negative
    } else {
        GexRegime::Neutral
    };

    GexSnapshot {
        gex_regime,
        gex_strength_billions: total / 1e9,
        total_gex_dollar: total,
        gex_coverage: coverage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rgk_schemas::micros::MICROS_SCALE;

    fn row(option_type: OptionType, oi: i64, delta: f64, gamma: f64) -> ChainRow {
        (
            OptionContract {
                symbol: "X".into(),
                underlying: "QQQ".into(),
                option_type,
                strike_micros: 480 * MICROS_SCALE,
                expiration: NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
            },
            OptionQuote {
                bid_micros: 1_000_000,
                ask_micros: 1_100_000,
                last_micros: 1_050_000,
                volume: 100,
                open_interest: oi,
            },
            OptionGreeks {
                delta,
                gamma,
                theta: -0.05,
                vega: 0.1,
                implied_volatility: 0.2,
            },
        )
    }

    #[test]
    fn calls_add_puts_subtract() {
        // Each row: 0.01 × 100_000 × 100 × 480 = 48M; needs scale for regime,
        // so use large OI to cross the neutral band.
        let rows = vec![
            row(OptionType::Call, 100_000, 0.5, 0.01),
            row(OptionType::Put, 40_000, -0.5, 0.01),
        ];
        let g = calculate_gex_proxy(&rows, 480.0);
        assert!(g.total_gex_dollar > 0.0);
        assert_eq!(g.gex_coverage, 2);
    }

    #[test]
    fn low_oi_and_wing_deltas_are_filtered() {
        let rows = vec![
            row(OptionType::Call, 10, 0.5, 0.01),   // OI too low
            row(OptionType::Call, 1_000, 0.05, 0.01), // delta too small
            row(OptionType::Call, 1_000, 0.95, 0.01), // delta too large
        ];
        let g = calculate_gex_proxy(&rows, 480.0);
        assert_eq!(g.gex_coverage, 0);
        assert_eq!(g.gex_regime, GexRegime::Neutral);
    }

    #[test]
    fn heavy_put_gamma_reads_negative() {
        let rows = vec![row(OptionType::Put, 10_000_000, -0.4, 0.01)];
        let g = calculate_gex_proxy(&rows, 480.0);
        assert_eq!(g.gex_regime, GexRegime::Negative);
        assert!(g.gex_strength_billions < -2.0);
    }

    #[test]
    fn small_net_exposure_is_neutral() {
        let rows = vec![row(OptionType::Call, 100, 0.5, 0.001)];
        let g = calculate_gex_proxy(&rows, 480.0);
        assert_eq!(g.gex_regime, GexRegime::Neutral);
    }
}
