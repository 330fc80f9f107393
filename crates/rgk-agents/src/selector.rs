//! Options contract selection: hard validation filters, then weighted
//! scoring (delta 30%, expiration 20%, liquidity 15%, spread 15%,
//! reward/risk 20%). Ties break toward the tighter spread.

use chrono::NaiveDate;
use rgk_regime::ChainRow;
use rgk_schemas::{micros, OptionType};
use serde::{Deserialize, Serialize};

use crate::chain_view::ChainView;

/// Hard limits a contract must clear before scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionRiskProfile {
    pub max_spread_pct: f64,
    pub min_open_interest: i64,
    pub min_volume: i64,
    pub min_dte: i64,
    pub max_dte: i64,
    pub min_abs_delta: f64,
    pub max_abs_delta: f64,
    pub min_iv_percentile: f64,
    pub max_iv_percentile: f64,
    pub max_premium_micros: i64,
    /// Daily theta as a fraction of mid premium above which the decay is
    /// unaffordable.
    pub max_theta_decay_ratio: f64,
}

impl Default for OptionRiskProfile {
    fn default() -> Self {
        Self {
            max_spread_pct: 10.0,
            min_open_interest: 100,
            min_volume: 10,
            min_dte: 0,
            max_dte: 45,
            min_abs_delta: 0.15,
            max_abs_delta: 0.70,
            min_iv_percentile: 0.0,
            max_iv_percentile: 100.0,
            max_premium_micros: 5_000 * micros::MICROS_SCALE,
            max_theta_decay_ratio: 0.08,
        }
    }
}

/// Why a contract was rejected by the hard filters.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    SpreadTooWide { spread_pct: f64 },
    OpenInterestTooLow { oi: i64 },
    VolumeTooLow { volume: i64 },
    DteOutOfRange { dte: i64 },
    DeltaOutOfRange { delta: f64 },
    IvPercentileOutOfWindow { percentile: f64 },
    PremiumTooLarge { mid_micros: i64 },
    ThetaDecayTooHigh { ratio: f64 },
}

#[derive(Debug, Clone)]
pub struct ScoredContract {
    pub row: ChainRow,
    pub score: f64,
    pub spread_pct: f64,
}

/// Apply the hard filters; `Ok(())` means the contract may be scored.
pub fn validate(
    profile: &OptionRiskProfile,
    row: &ChainRow,
    today: NaiveDate,
    iv_percentile: Option<f64>,
) -> Result<(), RejectReason> {
    let (contract, quote, greeks) = row;

    let spread_pct = quote.spread_pct();
    if spread_pct > profile.max_spread_pct {
        return Err(RejectReason::SpreadTooWide { spread_pct });
    }
    if quote.open_interest < profile.min_open_interest {
        return Err(RejectReason::OpenInterestTooLow {
            oi: quote.open_interest,
        });
    }
    if quote.volume < profile.min_volume {
        return Err(RejectReason::VolumeTooLow {
            volume: quote.volume,
        });
    }
    let dte = contract.days_to_expiry(today);
    if dte < profile.min_dte || dte > profile.max_dte {
        return Err(RejectReason::DteOutOfRange { dte });
    }
    let abs_delta = greeks.delta.abs();
    if abs_delta < profile.min_abs_delta || abs_delta > profile.max_abs_delta {
        return Err(RejectReason::DeltaOutOfRange {
            delta: greeks.delta,
        });
    }
    if let Some(pct) = iv_percentile {
        if pct < profile.min_iv_percentile || pct > profile.max_iv_percentile {
            return Err(RejectReason::IvPercentileOutOfWindow { percentile: pct });
        }
    }
    let mid = quote.mid_micros();
    // Premium is per contract (×100 shares).
    if mid.saturating_mul(100) > profile.max_premium_micros {
        return Err(RejectReason::PremiumTooLarge { mid_micros: mid });
    }
    if mid > 0 {
        let ratio = greeks.theta.abs() / micros::to_f64(mid);
        if ratio > profile.max_theta_decay_ratio {
            return Err(RejectReason::ThetaDecayTooHigh { ratio });
        }
    }
    Ok(())
}

/// Score one contract that already passed validation.
pub fn score(
    profile: &OptionRiskProfile,
    row: &ChainRow,
    target_abs_delta: f64,
    target_expiration: Option<NaiveDate>,
    spot: f64,
    today: NaiveDate,
) -> f64 {
    let (contract, quote, greeks) = row;
    let mut score = 0.0;

    // Delta alignment: 30%.
    let delta_diff = (greeks.delta.abs() - target_abs_delta).abs();
    score += (1.0 - delta_diff / 0.20).max(0.0) * 30.0;

    // Expiration alignment: 20%.
    let dte = contract.days_to_expiry(today);
    match target_expiration {
        Some(target) => {
            let days_diff = (contract.expiration - target).num_days().abs() as f64;
            score += (1.0 - days_diff / 30.0).max(0.0) * 20.0;
        }
        None => {
            if (14..=30).contains(&dte) {
                score += 20.0;
            } else if (7..14).contains(&dte) || (31..=45).contains(&dte) {
                score += 10.0;
            }
        }
    }

    // Liquidity: 15%.
    let oi_score = (quote.open_interest as f64 / 1_000.0).min(1.0);
    let volume_score = (quote.volume as f64 / 100.0).min(1.0);
    score += (oi_score + volume_score) / 2.0 * 15.0;

    // Spread: 15%.
    let spread_score = (1.0 - quote.spread_pct() / profile.max_spread_pct).max(0.0);
    score += spread_score * 15.0;

    // Reward/risk: 20%. Estimated return on a 5% favorable underlying
    // move, against full premium at risk.
    let mid = micros::to_f64(quote.mid_micros());
    if mid > 0.0 && spot > 0.0 {
        let estimated_profit = greeks.delta.abs() * 0.05 * spot;
        let rr_ratio = estimated_profit / mid;
        score += (rr_ratio / 2.0).min(1.0) * 20.0;
    }

    score
}

/// Select the best contract of `option_type` from the chain view.
pub fn select_best_contract(
    profile: &OptionRiskProfile,
    view: &ChainView,
    option_type: OptionType,
    target_abs_delta: f64,
    target_expiration: Option<NaiveDate>,
    spot: f64,
) -> Option<ScoredContract> {
    let mut best: Option<ScoredContract> = None;

    for row in view.rows_of(option_type) {
        if validate(profile, row, view.today, view.iv_percentile).is_err() {
            continue;
        }
        let s = score(profile, row, target_abs_delta, target_expiration, spot, view.today);
        let spread_pct = row.1.spread_pct();
        let better = match &best {
            None => true,
            Some(b) => s > b.score || (s == b.score && spread_pct < b.spread_pct),
        };
        if better {
            best = Some(ScoredContract {
                row: row.clone(),
                score: s,
                spread_pct,
            });
        }
    }

    best
}
