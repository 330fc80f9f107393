//! Portfolio summary statistics.

use rgk_schemas::micros;

use crate::types::Trade;

/// Maximum drawdown over an equity curve, as a percentage of the running
/// peak. Empty or single-point curves have zero drawdown.
pub fn max_drawdown_pct(curve: impl Iterator<Item = i64>) -> f64 {
    let mut peak: Option<i64> = None;
    let mut max_dd = 0.0f64;
    for equity in curve {
        let p = match peak {
            Some(p) if p >= equity => p,
            _ => {
                peak = Some(equity);
                equity
            }
        };
        if p > 0 {
            let dd = (p - equity) as f64 / p as f64 * 100.0;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Fraction of closed trades with positive P&L, as a percentage.
pub fn win_rate_pct(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let wins = trades.iter().filter(|t| t.pnl_micros > 0).count();
    wins as f64 / trades.len() as f64 * 100.0
}

/// Annualized Sharpe ratio over per-bar P&L normalized by initial
/// capital. Zero with fewer than two samples or zero variance.
pub fn sharpe_ratio(pnl_history: impl Iterator<Item = i64>, initial_capital_micros: i64) -> f64 {
    if initial_capital_micros <= 0 {
        return 0.0;
    }
    let capital = micros::to_f64(initial_capital_micros);
    let returns: Vec<f64> = pnl_history
        .map(|p| micros::to_f64(p) / capital)
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    if std == 0.0 {
        return 0.0;
    }
    mean / std * 252f64.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rgk_schemas::micros::MICROS_SCALE;

    const M: i64 = MICROS_SCALE;

    #[test]
    fn zero_length_curve_has_zero_drawdown() {
        assert_eq!(max_drawdown_pct(std::iter::empty()), 0.0);
    }

    #[test]
    fn monotone_rising_curve_has_zero_drawdown() {
        let curve = [100 * M, 110 * M, 120 * M];
        assert_eq!(max_drawdown_pct(curve.into_iter()), 0.0);
    }

    #[test]
    fn drawdown_measured_from_peak() {
        let curve = [100 * M, 120 * M, 90 * M, 110 * M];
        let dd = max_drawdown_pct(curve.into_iter());
        assert!((dd - 25.0).abs() < 1e-9); // 120 → 90
    }

    #[test]
    fn sharpe_zero_for_constant_pnl() {
        let pnl = vec![0i64; 10];
        assert_eq!(sharpe_ratio(pnl.into_iter(), 100_000 * M), 0.0);
    }

    #[test]
    fn sharpe_positive_for_positive_drift() {
        let pnl: Vec<i64> = (0..50).map(|i| if i % 5 == 0 { -M } else { 2 * M }).collect();
        assert!(sharpe_ratio(pnl.into_iter(), 100_000 * M) > 0.0);
    }
}
