//! Five consecutive losing trades inside the window engage the circuit
//! breaker on the fifth close; every intent for the cooldown is vetoed
//! with the breaker reason, and the bar after cooldown trades again.

use chrono::NaiveDate;
use rgk_regime::{RegimeType, VolatilityLevel};
use rgk_risk::{gate_stock, reasons, record_trade_result, tick, RiskConfig, RiskState};
use rgk_schemas::micros::MICROS_SCALE;

const M: i64 = MICROS_SCALE;

fn gate_at(cfg: &RiskConfig, st: &mut RiskState, bar: u64) -> rgk_risk::GateDecision {
    gate_stock(
        cfg,
        st,
        1.0,
        0.9,
        150 * M,
        RegimeType::Trend,
        VolatilityLevel::Medium,
        bar,
        0,
    )
}

#[test]
fn five_losses_veto_the_next_fifty_bars() {
    let cfg = RiskConfig::default();
    let mut st = RiskState::new(100_000 * M);
    tick(&cfg, &mut st, 100_000 * M, NaiveDate::from_ymd_opt(2024, 6, 7).unwrap());

    // Wins sprinkled in the window do not defuse the streak counter.
    record_trade_result(&cfg, &mut st, 300 * M, 95);
    for bar in 96..=100 {
        record_trade_result(&cfg, &mut st, -200 * M, bar);
    }
    assert!(st.circuit_breaker_active);
    assert_eq!(st.circuit_breaker_until_bar, 100 + 50);

    // Every bar of the cooldown is vetoed with the breaker reason.
    for bar in 101..150 {
        let d = gate_at(&cfg, &mut st, bar);
        assert!(!d.allowed, "bar {bar} should be vetoed");
        assert_eq!(d.reason, reasons::CIRCUIT_BREAKER);
    }

    // Cooldown boundary: engaged at cooldown − 1, released at cooldown.
    let d = gate_at(&cfg, &mut st, 149);
    assert_eq!(d.reason, reasons::CIRCUIT_BREAKER);
    let d = gate_at(&cfg, &mut st, 150);
    assert!(d.allowed);
    assert!(!st.circuit_breaker_active);
}

#[test]
fn spaced_losses_outside_window_do_not_trip() {
    let cfg = RiskConfig {
        loss_window_size: 4,
        max_losses_in_window: 4,
        ..RiskConfig::default()
    };
    let mut st = RiskState::new(100_000 * M);

    // Five losses, but the window only ever holds four with a win
    // rotating through.
    for i in 0..4 {
        record_trade_result(&cfg, &mut st, -200 * M, 10 + i);
        record_trade_result(&cfg, &mut st, 100 * M, 20 + i);
    }
    assert!(!st.circuit_breaker_active);
}
