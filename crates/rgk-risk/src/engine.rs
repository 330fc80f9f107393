//! Risk gate: deterministic layered evaluation.
//!
//! All functions are pure over `(config, state, inputs)`; the only
//! mutations are the documented sticky flags in [`RiskState`]. Layer
//! order is fixed: kill switch, confidence, drawdown, circuit breaker,
//! daily loss, then sizing.

use chrono::NaiveDate;
use rgk_regime::{RegimeType, VolatilityLevel};
use rgk_schemas::micros;

use crate::types::{reasons, GateDecision, RiskConfig, RiskState};

/// Per-bar maintenance: update equity, keep the peak monotonic, append
/// the equity return for VaR, roll daily counters on a date change.
pub fn tick(cfg: &RiskConfig, st: &mut RiskState, equity_micros: i64, day: NaiveDate) {
    if st.current_day != Some(day) {
        st.current_day = Some(day);
        st.daily_pnl_micros = 0;
    }

    if st.current_equity_micros > 0 {
        let ret = (equity_micros - st.current_equity_micros) as f64
            / st.current_equity_micros as f64;
        st.returns_history.push_back(ret);
        while st.returns_history.len() > cfg.var_window {
            st.returns_history.pop_front();
        }
    }

    st.current_equity_micros = equity_micros;
    if equity_micros > st.peak_equity_micros {
        st.peak_equity_micros = equity_micros;
    }
}

/// Record a closed trade: daily P&L, loss window, circuit-breaker
/// engagement. Engagement happens here so the breaker is active on the
/// very bar the losing streak completes.
pub fn record_trade_result(cfg: &RiskConfig, st: &mut RiskState, pnl_micros: i64, current_bar: u64) {
    st.daily_pnl_micros += pnl_micros;

    st.recent_losses.push_back(pnl_micros < 0);
    while st.recent_losses.len() > cfg.loss_window_size {
        st.recent_losses.pop_front();
    }

    if cfg.enable_circuit_breakers && !st.circuit_breaker_active {
        let losses = st.recent_losses.iter().filter(|&&l| l).count();
        if losses >= cfg.max_losses_in_window {
            st.circuit_breaker_active = true;
            st.circuit_breaker_until_bar = current_bar + cfg.circuit_breaker_cooldown_bars;
        }
    }
}

/// Historical VaR estimate (dollars, micros) at the configured
/// confidence over the returns window; 0 with fewer than 20 samples.
pub fn value_at_risk_micros(cfg: &RiskConfig, st: &RiskState) -> i64 {
    if !cfg.enable_var || st.returns_history.len() < 20 {
        return 0;
    }
    let mut returns: Vec<f64> = st.returns_history.iter().copied().collect();
    returns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((1.0 - cfg.var_confidence) * returns.len() as f64).floor() as usize;
    let var = returns[idx.min(returns.len() - 1)];
    micros::from_f64(var.abs() * micros::to_f64(st.current_equity_micros))
}

/// Check the veto layers only (no sizing). Used directly for option
/// intents, whose contract counts the agents already bounded.
///
/// Releases the circuit breaker when its cooldown has elapsed; that is
/// the only state this function mutates.
pub fn can_trade(
    cfg: &RiskConfig,
    st: &mut RiskState,
    confidence: f64,
    current_bar: u64,
) -> Result<(), GateDecision> {
    if st.kill_switch_engaged {
        return Err(GateDecision::veto(reasons::KILL_SWITCH));
    }
    if confidence < cfg.min_confidence {
        return Err(GateDecision::veto(reasons::CONFIDENCE_FLOOR));
    }
    if st.drawdown() >= cfg.hard_drawdown_pct {
        return Err(GateDecision::veto(reasons::HARD_DRAWDOWN));
    }

    if st.circuit_breaker_active {
        if current_bar >= st.circuit_breaker_until_bar {
            st.circuit_breaker_active = false;
        } else {
            return Err(GateDecision::veto(reasons::CIRCUIT_BREAKER));
        }
    }

    if st.daily_pnl_micros < 0 {
        let loss_frac =
            st.daily_pnl_micros.unsigned_abs() as f64 / st.initial_capital_micros.max(1) as f64;
        if loss_frac >= cfg.daily_loss_limit_pct {
            return Err(GateDecision::veto(reasons::DAILY_LOSS_LIMIT));
        }
    }

    Ok(())
}

/// Full gate for stock intents: veto layers then layered sizing.
///
/// `position_delta` is the controller's signed relative size;
/// `price_micros` the current mark; `current_position_qty` the signed
/// shares already held in the symbol (the symbol-exposure cap bounds
/// the resulting position, not the single order). The returned
/// quantity is whole shares, signed with the intent.
#[allow(clippy::too_many_arguments)]
pub fn gate_stock(
    cfg: &RiskConfig,
    st: &mut RiskState,
    position_delta: f64,
    confidence: f64,
    price_micros: i64,
    regime: RegimeType,
    volatility: VolatilityLevel,
    current_bar: u64,
    current_position_qty: i64,
) -> GateDecision {
    if let Err(veto) = can_trade(cfg, st, confidence, current_bar) {
        return veto;
    }
    if price_micros <= 0 || position_delta == 0.0 {
        return GateDecision::veto(reasons::ZERO_SIZE);
    }

    let equity = micros::to_f64(st.current_equity_micros);
    let price = micros::to_f64(price_micros);

    // Base size from the controller's relative delta.
    let mut size = position_delta.abs() * (equity * cfg.base_position_pct) / price;

    // Soft-drawdown throttle.
    if st.drawdown() >= cfg.soft_drawdown_pct {
        size *= cfg.soft_drawdown_size_mult;
    }

    // Regime cap.
    let cap = (equity * cfg.regime_cap(regime)) / price;
    size = size.min(cap);

    // Volatility scaling above the base bucket.
    if cfg.enable_volatility_scaling {
        let diff = volatility.ordinal() - cfg.base_volatility.ordinal();
        if diff > 0 {
            size *= (1.0 - cfg.vol_scaling_factor).powi(diff);
        }
    }

    // Confidence scaling.
    size *= confidence;

    // VaR cap: treat a 1% adverse move as the position's VaR.
    if cfg.enable_var {
        let position_var = size * price * 0.01;
        let var_limit = cfg.max_var_exposure * equity;
        if position_var > var_limit && price > 0.0 {
            size = var_limit / (price * 0.01);
        }
    }

    // Symbol exposure cap bounds the resulting position. Orders that
    // reduce exposure always pass this layer.
    let symbol_cap = (equity * cfg.max_symbol_exposure_pct) / price;
    let sign = if position_delta >= 0.0 { 1.0 } else { -1.0 };
    let resulting = current_position_qty as f64 + sign * size;
    if resulting.abs() > symbol_cap && resulting.abs() > current_position_qty.abs() as f64 {
        let headroom = symbol_cap - current_position_qty.abs() as f64;
        size = size.min(headroom.max(0.0));
    }

    let shares = size.floor() as i64;
    if shares <= 0 {
        return GateDecision::veto(reasons::ZERO_SIZE);
    }

    let signed = if position_delta >= 0.0 { shares } else { -shares };
    GateDecision::allow(signed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rgk_schemas::micros::MICROS_SCALE;

    const M: i64 = MICROS_SCALE;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 7).unwrap()
    }

    fn state() -> RiskState {
        let mut st = RiskState::new(100_000 * M);
        st.current_day = Some(day());
        st
    }

    fn gate(cfg: &RiskConfig, st: &mut RiskState, delta: f64, conf: f64) -> GateDecision {
        gate_stock(
            cfg,
            st,
            delta,
            conf,
            150 * M,
            RegimeType::Trend,
            VolatilityLevel::Medium,
            100,
            0,
        )
    }

    #[test]
    fn kill_switch_vetoes_everything() {
        let cfg = RiskConfig::default();
        let mut st = state();
        st.kill_switch_engaged = true;
        let d = gate(&cfg, &mut st, 1.0, 0.9);
        assert!(!d.allowed);
        assert_eq!(d.reason, reasons::KILL_SWITCH);
    }

    #[test]
    fn low_confidence_vetoed() {
        let cfg = RiskConfig::default();
        let mut st = state();
        let d = gate(&cfg, &mut st, 1.0, 0.2);
        assert_eq!(d.reason, reasons::CONFIDENCE_FLOOR);
    }

    #[test]
    fn normal_intent_sized_and_allowed() {
        let cfg = RiskConfig::default();
        let mut st = state();
        let d = gate(&cfg, &mut st, 1.0, 0.7);
        assert!(d.allowed);
        // base = 100k * 10% / 150 = 66.7 shares, × 0.7 confidence = 46.
        assert_eq!(d.sized_qty, 46);
    }

    #[test]
    fn short_delta_gives_negative_shares() {
        let cfg = RiskConfig::default();
        let mut st = state();
        let d = gate(&cfg, &mut st, -1.0, 0.7);
        assert!(d.allowed);
        assert!(d.sized_qty < 0);
    }

    #[test]
    fn regime_cap_binds_large_deltas() {
        let cfg = RiskConfig::default();
        let mut st = state();
        let d = gate(&cfg, &mut st, 10.0, 1.0);
        assert!(d.allowed);
        // Trend cap: 100k × 15% / 150 = 100 shares.
        assert_eq!(d.sized_qty, 100);
    }

    #[test]
    fn high_vol_halves_size() {
        let cfg = RiskConfig::default();
        let mut st = state();
        let medium = gate(&cfg, &mut st, 1.0, 1.0).sized_qty;
        let high = gate_stock(
            &cfg,
            &mut st,
            1.0,
            1.0,
            150 * M,
            RegimeType::Trend,
            VolatilityLevel::High,
            100,
            0,
        )
        .sized_qty;
        assert_eq!(high, medium / 2);
    }

    #[test]
    fn hard_drawdown_exactly_at_limit_fires() {
        let cfg = RiskConfig::default();
        let mut st = state();
        tick(&cfg, &mut st, 100_000 * M, day());
        tick(&cfg, &mut st, 85_000 * M, day()); // exactly 15% down
        let d = gate(&cfg, &mut st, 1.0, 0.9);
        assert_eq!(d.reason, reasons::HARD_DRAWDOWN);
    }

    #[test]
    fn soft_drawdown_halves_size_without_veto() {
        let cfg = RiskConfig::default();
        let mut st = state();
        tick(&cfg, &mut st, 100_000 * M, day());
        let full = gate(&cfg, &mut st, 1.0, 1.0).sized_qty;

        let mut st2 = state();
        tick(&cfg, &mut st2, 100_000 * M, day());
        tick(&cfg, &mut st2, 89_000 * M, day()); // 11% down: soft band
        let d = gate(&cfg, &mut st2, 1.0, 1.0);
        assert!(d.allowed);
        assert!(d.sized_qty < full);
    }

    #[test]
    fn circuit_breaker_engages_after_loss_streak() {
        let cfg = RiskConfig::default();
        let mut st = state();
        for _ in 0..5 {
            record_trade_result(&cfg, &mut st, -200 * M, 100);
        }
        assert!(st.circuit_breaker_active);
        let d = gate(&cfg, &mut st, 1.0, 0.9);
        assert_eq!(d.reason, reasons::CIRCUIT_BREAKER);
    }

    #[test]
    fn circuit_breaker_releases_exactly_at_cooldown() {
        let cfg = RiskConfig::default();
        let mut st = state();
        for _ in 0..5 {
            record_trade_result(&cfg, &mut st, -200 * M, 100);
        }
        let until = st.circuit_breaker_until_bar;
        assert_eq!(until, 150);

        // One bar before cooldown: still engaged.
        let d = gate_stock(
            &cfg,
            &mut st,
            1.0,
            0.9,
            150 * M,
            RegimeType::Trend,
            VolatilityLevel::Medium,
            until - 1,
            0,
        );
        assert_eq!(d.reason, reasons::CIRCUIT_BREAKER);

        // At cooldown: released.
        let d = gate_stock(
            &cfg,
            &mut st,
            1.0,
            0.9,
            150 * M,
            RegimeType::Trend,
            VolatilityLevel::Medium,
            until,
            0,
        );
        assert!(d.allowed);
        assert!(!st.circuit_breaker_active);
    }

    #[test]
    fn daily_loss_limit_vetoes_until_reset() {
        let cfg = RiskConfig::default();
        let mut st = state();
        record_trade_result(&cfg, &mut st, -3_000 * M, 100); // 3% of 100k
        let d = gate(&cfg, &mut st, 1.0, 0.9);
        assert_eq!(d.reason, reasons::DAILY_LOSS_LIMIT);

        // New trading day clears the counter.
        let equity = st.current_equity_micros;
        tick(&cfg, &mut st, equity, day().succ_opt().unwrap());
        let d = gate(&cfg, &mut st, 1.0, 0.9);
        assert!(d.allowed);
    }

    #[test]
    fn peak_equity_is_monotonic() {
        let cfg = RiskConfig::default();
        let mut st = state();
        tick(&cfg, &mut st, 110_000 * M, day());
        tick(&cfg, &mut st, 90_000 * M, day());
        assert_eq!(st.peak_equity_micros, 110_000 * M);
    }

    #[test]
    fn empty_equity_history_has_zero_drawdown() {
        let st = RiskState::new(0);
        assert_eq!(st.drawdown(), 0.0);
    }

    #[test]
    fn var_needs_twenty_samples() {
        let cfg = RiskConfig::default();
        let mut st = state();
        for i in 0..10 {
            tick(&cfg, &mut st, (100_000 + i * 10) * M, day());
        }
        assert_eq!(value_at_risk_micros(&cfg, &st), 0);
        for i in 0..30 {
            tick(&cfg, &mut st, (100_000 + (i % 7) * 100 - 300) * M, day());
        }
        assert!(value_at_risk_micros(&cfg, &st) > 0);
    }

    #[test]
    fn challenge_profile_is_stricter_on_confidence() {
        let cfg = RiskConfig::challenge();
        let mut st = state();
        let d = gate(&cfg, &mut st, 1.0, 0.5);
        assert_eq!(d.reason, reasons::CONFIDENCE_FLOOR);
        let d = gate(&cfg, &mut st, 1.0, 0.7);
        assert!(d.allowed);
        // Challenge sizing is far larger than the default profile.
        let default_qty = gate(&RiskConfig::default(), &mut state(), 1.0, 0.7).sized_qty;
        assert!(d.sized_qty > default_qty);
    }
}
