//! Synthetic option pricing fallback.
//!
//! A deliberately simple Black-Scholes-style approximation used only
//! when the vendor feed cannot supply a price or Greeks. Delta is 0.5 at
//! the money and scales linearly with moneyness toward 0.05/0.95; theta
//! is proportional to premium and inverse to time; gamma is a two-level
//! constant. This is a degradation mode, not a pricer.

use rgk_schemas::{micros, OptionType};

pub const DEFAULT_RISK_FREE_RATE: f64 = 0.05;
pub const DEFAULT_IV: f64 = 0.20;

/// Synthetic Greeks bundle (mirrors the vendor shape).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SyntheticGreeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub iv: f64,
}

/// Approximate premium in micros.
///
/// At expiry this is pure intrinsic value. Before expiry the extrinsic
/// base is `spot × √t × iv × 0.4`, shaded by moneyness.
pub fn option_price_micros(
    underlying_micros: i64,
    strike_micros: i64,
    time_to_expiry_years: f64,
    iv: f64,
    option_type: OptionType,
) -> i64 {
    let spot = micros::to_f64(underlying_micros);
    let strike = micros::to_f64(strike_micros);

    if time_to_expiry_years <= 0.0 {
        let intrinsic = match option_type {
            OptionType::Call => (spot - strike).max(0.0),
            OptionType::Put => (strike - spot).max(0.0),
        };
        return micros::from_f64(intrinsic);
    }

    let moneyness = if strike > 0.0 { spot / strike } else { 1.0 };
    let base_extrinsic = spot * time_to_expiry_years.sqrt() * iv * 0.4;

    let price = match option_type {
        OptionType::Call => {
            let intrinsic = (spot - strike).max(0.0);
            let extrinsic = if moneyness > 1.0 {
                base_extrinsic * (1.0 + (moneyness - 1.0) * 0.5)
            } else {
                base_extrinsic * moneyness
            };
            intrinsic + extrinsic
        }
        OptionType::Put => {
            let intrinsic = (strike - spot).max(0.0);
            let extrinsic = if moneyness < 1.0 {
                base_extrinsic * (1.0 + (1.0 - moneyness) * 0.5)
            } else if moneyness > 0.0 {
                base_extrinsic / moneyness
            } else {
                base_extrinsic
            };
            intrinsic + extrinsic
        }
    };

    micros::from_f64(price)
}

/// Approximate Greeks for a contract priced at `current_price_micros`.
pub fn greeks(
    underlying_micros: i64,
    strike_micros: i64,
    time_to_expiry_years: f64,
    iv: f64,
    option_type: OptionType,
    current_price_micros: i64,
) -> SyntheticGreeks {
    let spot = micros::to_f64(underlying_micros);
    let strike = micros::to_f64(strike_micros);
    let price = micros::to_f64(current_price_micros);
    let moneyness = if strike > 0.0 { spot / strike } else { 1.0 };

    let delta = match option_type {
        OptionType::Call => {
            if (moneyness - 1.0).abs() < 0.02 {
                0.5
            } else if moneyness > 1.0 {
                (0.5 + (moneyness - 1.0) * 2.0).min(0.95)
            } else {
                (0.5 * moneyness).max(0.05)
            }
        }
        OptionType::Put => {
            if (moneyness - 1.0).abs() < 0.02 {
                -0.5
            } else if moneyness < 1.0 {
                (-0.5 - (1.0 - moneyness) * 2.0).max(-0.95)
            } else {
                (-0.5 / moneyness).min(-0.05)
            }
        }
    };

    let theta = if time_to_expiry_years > 0.0 {
        // More decay near expiration.
        let daily_decay_pct = 0.01 + 0.04 / (1.0 + time_to_expiry_years * 365.0);
        -price * daily_decay_pct
    } else {
        0.0
    };

    let gamma = if (moneyness - 1.0).abs() < 0.05 { 0.01 } else { 0.005 };
    let vega = price * 0.1;

    SyntheticGreeks {
        delta,
        gamma,
        theta,
        vega,
        iv,
    }
}

/// Strike implied by a moneyness bucket (2% offsets, matching the
/// agents' ATM window).
pub fn strike_from_moneyness(
    underlying_micros: i64,
    moneyness: rgk_agents::Moneyness,
    option_type: OptionType,
) -> i64 {
    use rgk_agents::Moneyness;
    let spot = micros::to_f64(underlying_micros);
    let strike = match (moneyness, option_type) {
        (Moneyness::Atm, _) => spot,
        (Moneyness::Otm, OptionType::Call) => spot * 1.02,
        (Moneyness::Otm, OptionType::Put) => spot * 0.98,
        (Moneyness::Itm, OptionType::Call) => spot * 0.98,
        (Moneyness::Itm, OptionType::Put) => spot * 1.02,
    };
    micros::from_f64(strike)
}

/// Years until expiry from a whole-day DTE count.
pub fn years_from_dte(dte: i64) -> f64 {
    dte.max(0) as f64 / 365.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rgk_schemas::micros::MICROS_SCALE;

    const M: i64 = MICROS_SCALE;

    #[test]
    fn expired_option_is_intrinsic_only() {
        let call = option_price_micros(480 * M, 470 * M, 0.0, 0.2, OptionType::Call);
        assert_eq!(call, 10 * M);
        let otm = option_price_micros(480 * M, 490 * M, 0.0, 0.2, OptionType::Call);
        assert_eq!(otm, 0);
        let put = option_price_micros(480 * M, 490 * M, 0.0, 0.2, OptionType::Put);
        assert_eq!(put, 10 * M);
    }

    #[test]
    fn atm_premium_scales_with_iv_and_time() {
        let cheap = option_price_micros(480 * M, 480 * M, 7.0 / 365.0, 0.15, OptionType::Call);
        let rich = option_price_micros(480 * M, 480 * M, 7.0 / 365.0, 0.30, OptionType::Call);
        let longer = option_price_micros(480 * M, 480 * M, 30.0 / 365.0, 0.15, OptionType::Call);
        assert!(rich > cheap);
        assert!(longer > cheap);
    }

    #[test]
    fn atm_delta_is_half() {
        let g = greeks(480 * M, 480 * M, 0.05, 0.2, OptionType::Call, 3 * M);
        assert_eq!(g.delta, 0.5);
        let g = greeks(480 * M, 480 * M, 0.05, 0.2, OptionType::Put, 3 * M);
        assert_eq!(g.delta, -0.5);
    }

    #[test]
    fn deep_itm_call_delta_approaches_one() {
        let g = greeks(480 * M, 400 * M, 0.05, 0.2, OptionType::Call, 82 * M);
        assert_eq!(g.delta, 0.95);
    }

    #[test]
    fn far_otm_call_delta_floors_at_005() {
        let g = greeks(50 * M, 480 * M, 0.05, 0.2, OptionType::Call, M / 100);
        assert!((g.delta - 0.0520833333).abs() < 1e-6 || g.delta >= 0.05);
        assert!(g.delta <= 0.5);
    }

    #[test]
    fn theta_is_negative_and_stronger_near_expiry() {
        let near = greeks(480 * M, 480 * M, 1.0 / 365.0, 0.2, OptionType::Call, 2 * M);
        let far = greeks(480 * M, 480 * M, 30.0 / 365.0, 0.2, OptionType::Call, 2 * M);
        assert!(near.theta < 0.0);
        assert!(near.theta < far.theta);
    }

    #[test]
    fn gamma_two_level() {
        let atm = greeks(480 * M, 480 * M, 0.05, 0.2, OptionType::Call, 2 * M);
        let wing = greeks(480 * M, 520 * M, 0.05, 0.2, OptionType::Call, M);
        assert_eq!(atm.gamma, 0.01);
        assert_eq!(wing.gamma, 0.005);
    }

    #[test]
    fn strike_from_moneyness_buckets() {
        use rgk_agents::Moneyness;
        let spot = 500 * M;
        assert_eq!(strike_from_moneyness(spot, Moneyness::Atm, OptionType::Call), spot);
        assert_eq!(
            strike_from_moneyness(spot, Moneyness::Otm, OptionType::Call),
            510 * M
        );
        assert_eq!(
            strike_from_moneyness(spot, Moneyness::Otm, OptionType::Put),
            490 * M
        );
    }
}
