//! Loop state machine, commands, and read snapshots.
//!
//! The scheduler publishes an immutable [`EngineSnapshot`] after every
//! bar on a `watch` channel; control-plane readers consume snapshots
//! and never touch live state. Commands arrive on a bounded channel and
//! are drained between pipeline stages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rgk_config::EngineMode;
use rgk_hedge::HedgePosition;
use rgk_options::MultiLegPosition;
use rgk_policy::{AgentFitness, WeightTables};
use rgk_portfolio::{PortfolioStats, Trade};
use rgk_regime::RegimeSignal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Running,
    Paused,
    Stopping,
    Stopped,
    Error,
}

/// Commands accepted over the scheduler's channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Stop,
    Pause,
    Resume,
    EngageKillSwitch,
    DisengageKillSwitch,
}

/// Risk layer view for the control surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskStatus {
    pub kill_switch_engaged: bool,
    pub drawdown_pct: f64,
    pub peak_equity_micros: i64,
    pub daily_pnl_micros: i64,
    pub circuit_breaker_active: bool,
    pub circuit_breaker_until_bar: u64,
    pub var_95_micros: i64,
}

/// Point-in-time engine view published after each bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub state: LoopState,
    pub mode: EngineMode,
    pub is_running: bool,
    pub is_paused: bool,
    pub bar_count: u64,
    pub last_bar_time: Option<DateTime<Utc>>,
    pub bars_per_symbol: BTreeMap<String, u64>,
    pub error_message: Option<String>,
    pub stop_reason: Option<String>,
    pub regime: Option<RegimeSignal>,
    pub portfolio: PortfolioStats,
    pub agent_fitness: BTreeMap<String, AgentFitness>,
    pub weights: WeightTables,
    pub risk: RiskStatus,
    /// Most recent closed stock round trips (newest last, bounded).
    pub recent_trades: Vec<Trade>,
    pub multi_leg_positions: Vec<MultiLegPosition>,
    pub hedge_positions: Vec<HedgePosition>,
    pub open_multi_leg_positions: usize,
    pub open_hedge_positions: usize,
    pub closed_multi_leg_trades: usize,
}

impl LoopState {
    /// Whether `next` is a legal transition from this state. `Error` is
    /// reachable from anywhere.
    pub fn can_transition_to(self, next: LoopState) -> bool {
        use LoopState::*;
        if next == Error {
            return true;
        }
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Stopping)
                | (Paused, Stopping)
                | (Stopping, Stopped)
                | (Running, Stopped)
                | (Paused, Stopped)
        )
    }
}
