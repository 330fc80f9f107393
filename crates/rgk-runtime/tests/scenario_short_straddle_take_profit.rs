//! Theta harvester end to end: compression + rich IV sells an ATM
//! straddle; premium decay trips the 50%-of-credit profit take and the
//! combined trade lands in the multi-leg log.

mod common;

use common::{chain_row, compression_bars, offline_config, ScriptedChainProvider, M};
use rgk_agents::MultiLegStrategy;
use rgk_broker_paper::PaperBroker;
use rgk_md::ReplayFeed;
use rgk_options::PositionDirection;
use rgk_runtime::{Engine, LoopState};
use rgk_schemas::OptionType;

fn rich_premium_rows() -> Vec<rgk_regime::ChainRow> {
    vec![
        chain_row("QQQ", OptionType::Call, 480.0, 0.50, 0.01, 1.95, 2.05, 0.25, 1_000),
        chain_row("QQQ", OptionType::Put, 480.0, -0.50, 0.01, 1.95, 2.05, 0.25, 1_000),
    ]
}

fn decayed_premium_rows() -> Vec<rgk_regime::ChainRow> {
    vec![
        chain_row("QQQ", OptionType::Call, 480.0, 0.50, 0.01, 0.85, 0.95, 0.22, 1_000),
        chain_row("QQQ", OptionType::Put, 480.0, -0.50, 0.01, 0.85, 0.95, 0.22, 1_000),
    ]
}

#[test]
fn short_straddle_collects_credit_and_takes_profit() {
    let config = offline_config("QQQ");

    let mut feed = ReplayFeed::new();
    feed.seed_bars("QQQ", compression_bars("QQQ", 60, 45, 480.0));

    // Rich premium until bar 78, then the straddle decays.
    let chain = ScriptedChainProvider::new(
        vec![(78, rich_premium_rows()), (u64::MAX, decayed_premium_rows())],
        Some(80.0),
    );

    let broker = PaperBroker::new(config.initial_capital_micros());
    let mut engine = Engine::new(
        config,
        Box::new(feed),
        Box::new(broker),
        Some(Box::new(chain)),
    )
    .unwrap();

    let state = engine.run_to_completion();
    assert_eq!(state, LoopState::Stopped);

    let trades = engine.options().multi_leg_trades();
    assert!(
        !trades.is_empty(),
        "expected a closed multi-leg trade; open: {:?}",
        engine.options().multi_leg_positions().keys()
    );
    let trade = &trades[0];
    assert_eq!(trade.strategy, MultiLegStrategy::ThetaHarvester);
    assert_eq!(trade.direction, PositionDirection::Short);
    assert!(trade.reason.contains("take-profit"), "reason: {}", trade.reason);

    // 5 contracts sold at a 3.90 credit, bought back around 0.95/leg:
    // combined P&L ≈ +$1,000, comfortably past half the credit.
    assert!(trade.combined_pnl_micros > 0);
    assert!(
        trade.combined_pnl_pct >= 50.0,
        "pnl_pct {}",
        trade.combined_pnl_pct
    );
    assert_eq!(trade.total_premium_micros, 1_950 * M);
    assert_eq!(trade.combined_pnl_micros, 1_000 * M);

    // Short premium is never delta hedged.
    assert!(engine.hedge().positions().is_empty());
}

#[test]
fn restricted_account_records_sim_only_structure() {
    let config = offline_config("QQQ");

    let mut feed = ReplayFeed::new();
    feed.seed_bars("QQQ", compression_bars("QQQ", 60, 20, 480.0));

    let chain = ScriptedChainProvider::new(vec![(u64::MAX, rich_premium_rows())], Some(80.0));

    let broker =
        PaperBroker::new(config.initial_capital_micros()).without_short_multi_leg();
    let mut engine = Engine::new(
        config,
        Box::new(feed),
        Box::new(broker),
        Some(Box::new(chain)),
    )
    .unwrap();
    engine.run_to_completion();

    // The structure exists but is shadow-tracked: no premium cash moved.
    let open = engine.options().multi_leg_positions();
    assert_eq!(open.len(), 1);
    let pos = open.values().next().unwrap();
    assert!(pos.sim_only);
    assert_eq!(
        engine.portfolio().cash_micros(),
        engine.portfolio().initial_capital_micros()
    );
}
