//! Scheduler shell: pause/resume, kill switch, and a drained stop.

mod common;

use std::time::Duration;

use common::{offline_config, trending_bars};
use rgk_broker_paper::PaperBroker;
use rgk_md::ReplayFeed;
use rgk_runtime::{spawn, Command, Engine, LoopState};

fn engine_with_bars(count: i64) -> Engine {
    let mut config = offline_config("QQQ");
    // Generous pacing so commands land mid-session.
    config.replay_speed_multiplier = 6_000.0;
    let mut feed = ReplayFeed::new();
    feed.seed_bars("QQQ", trending_bars("QQQ", 0, count, 150.0, 0.01));
    let broker = PaperBroker::new(config.initial_capital_micros());
    Engine::new(config, Box::new(feed), Box::new(broker), None).unwrap()
}

#[tokio::test]
async fn pause_halts_bar_processing_and_resume_continues() {
    let handle = spawn(engine_with_bars(2_000)).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(handle.send(Command::Pause).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let paused_at = handle.snapshot();
    assert!(paused_at.is_paused);
    let frozen_count = paused_at.bar_count;

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(handle.snapshot().bar_count, frozen_count);

    assert!(handle.send(Command::Resume).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(handle.snapshot().bar_count > frozen_count);

    let engine = handle.stop().await.expect("loop drains within grace");
    assert_eq!(engine.state(), LoopState::Stopped);
}

#[tokio::test]
async fn stop_persists_and_reports_stopped() {
    let handle = spawn(engine_with_bars(2_000)).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let engine = handle.stop().await.expect("loop drains within grace");
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, LoopState::Stopped);
    assert!(!snapshot.is_running);
    assert_eq!(snapshot.stop_reason.as_deref(), Some("stop command"));
}

#[tokio::test]
async fn kill_switch_blocks_trading_until_disengaged() {
    let handle = spawn(engine_with_bars(500)).unwrap();

    assert!(handle.send(Command::EngageKillSwitch).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(handle.snapshot().risk.kill_switch_engaged);

    assert!(handle.send(Command::DisengageKillSwitch).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!handle.snapshot().risk.kill_switch_engaged);

    handle.stop().await;
}

#[tokio::test]
async fn replay_session_finishes_on_its_own() {
    let handle = spawn(engine_with_bars(30)).unwrap();
    let engine = handle.join().await.expect("task returns the engine");
    assert_eq!(engine.state(), LoopState::Stopped);
    assert_eq!(engine.bar_count(), 30);
}
