//! Rewards reshape arbitration: after a string of wins attributed to
//! one agent, its weight grows until it outvotes a peer that started
//! level with it.

use rgk_agents::{InstrumentType, TradeDirection, TradeIntent};
use rgk_policy::{
    reconcile, AdaptorConfig, ControllerConfig, PolicyAdaptor, TradeOutcome,
};
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

fn outcome(agent: &str, reward: f64) -> TradeOutcome {
    TradeOutcome {
        agent_name: agent.to_string(),
        regime: RegimeType::Trend,
        volatility: VolatilityLevel::Medium,
        instrument: InstrumentType::Stock,
        reward,
    }
}

#[test]
fn winning_agent_takes_over_primary_attribution() {
    let names = vec!["trend_agent".to_string(), "ema_agent".to_string()];
    let mut adaptor = PolicyAdaptor::new(AdaptorConfig::default(), &names);
    let controller = ControllerConfig::default();

    // Identical intents from both agents: the tie resolves to the first.
    let intents = vec![
        TradeIntent::stock("QQQ", "trend_agent", TradeDirection::Long, 1.0, 0.7, "a"),
        TradeIntent::stock("QQQ", "ema_agent", TradeDirection::Long, 1.0, 0.7, "b"),
    ];
    let before = reconcile(&controller, &intents, &signal(), adaptor.tables());
    assert_eq!(before.primary_agent, "trend_agent");

    // The EMA agent keeps winning; the trend agent keeps losing.
    for _ in 0..200 {
        adaptor.record_trade_outcome(&outcome("ema_agent", 0.1));
        adaptor.record_trade_outcome(&outcome("trend_agent", -0.1));
    }
    assert!(
        adaptor.tables().agent_weight("ema_agent")
            > adaptor.tables().agent_weight("trend_agent")
    );

    let after = reconcile(&controller, &intents, &signal(), adaptor.tables());
    assert_eq!(after.primary_agent, "ema_agent");
}

#[test]
fn weight_updates_never_affect_the_bar_that_produced_them() {
    let names = vec!["trend_agent".to_string()];
    let mut adaptor = PolicyAdaptor::new(AdaptorConfig::default(), &names);
    let controller = ControllerConfig::default();
    let intents = vec![TradeIntent::stock(
        "QQQ",
        "trend_agent",
        TradeDirection::Long,
        1.0,
        0.7,
        "a",
    )];

    // Arbitrate with the tables as they stand, then record the outcome —
    // the caller's ordering, mirrored here, is what keeps a bar's trade
    // from feeding back into its own arbitration.
    let tables_before = adaptor.tables().clone();
    let decided = reconcile(&controller, &intents, &signal(), &tables_before);
    assert!(decided.is_valid);
    adaptor.record_trade_outcome(&outcome("trend_agent", 0.1));
    assert_eq!(tables_before.agent_weight("trend_agent"), 1.0);
}
