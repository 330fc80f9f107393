//! Profit-take / stop-loss rules for multi-leg structures.
//!
//! Theta harvester (short straddle): take profit at 50% of credit, stop
//! at 200%, exit on IV collapse, on leaving compression, or at max hold.
//! Gamma scalper (long strangle): take profit at 150%, stop at 50%,
//! exit when GEX flips back positive, or at max hold. Both honor a
//! minimum hold before any exit check.

use std::collections::BTreeMap;

use rgk_agents::MultiLegStrategy;
use rgk_regime::{GexRegime, GexSnapshot, RegimeType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitConfig {
    pub theta_take_profit_pct: f64,
    pub theta_stop_loss_pct: f64,
    /// Fractional IV drop from entry that forces the exit.
    pub theta_iv_collapse_threshold: f64,
    pub gamma_take_profit_pct: f64,
    pub gamma_stop_loss_pct: f64,
    /// Billions of positive GEX required to call a reversal.
    pub gamma_gex_reversal_threshold: f64,
    pub min_hold_bars: u64,
    pub max_hold_bars: u64,
}

impl Default for ProfitConfig {
    fn default() -> Self {
        Self {
            theta_take_profit_pct: 50.0,
            theta_stop_loss_pct: 200.0,
            theta_iv_collapse_threshold: 0.3,
            gamma_take_profit_pct: 150.0,
            gamma_stop_loss_pct: 50.0,
            gamma_gex_reversal_threshold: 1.0,
            min_hold_bars: 5,
            max_hold_bars: 390,
        }
    }
}

/// Per-structure tracking state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionTracker {
    pub strategy: MultiLegStrategy,
    pub entry_bar: u64,
    pub entry_iv: f64,
    pub entry_gex_strength: f64,
    /// Best combined P&L percentage seen so far.
    pub peak_profit_pct: f64,
}

/// Everything the exit rules read for one bar.
#[derive(Debug, Clone)]
pub struct ExitInputs<'a> {
    pub current_pnl_pct: f64,
    pub current_bar: u64,
    pub regime_type: RegimeType,
    /// Current ATM IV when the chain resolved one this bar.
    pub current_iv: Option<f64>,
    pub microstructure: &'a GexSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit { pnl_pct: f64 },
    StopLoss { pnl_pct: f64 },
    IvCollapse { entry_iv: f64, current_iv: f64 },
    RegimeExit { now: RegimeType },
    GexReversal { strength_billions: f64 },
    MaxHold { bars_held: u64 },
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TakeProfit { pnl_pct } => write!(f, "take-profit at {pnl_pct:.1}%"),
            Self::StopLoss { pnl_pct } => write!(f, "stop-loss at {pnl_pct:.1}%"),
            Self::IvCollapse {
                entry_iv,
                current_iv,
            } => write!(f, "iv-collapse {entry_iv:.3} -> {current_iv:.3}"),
            Self::RegimeExit { now } => write!(f, "regime-exit to {}", now.as_str()),
            Self::GexReversal { strength_billions } => {
                write!(f, "gex-reversal to +{strength_billions:.2}B")
            }
            Self::MaxHold { bars_held } => write!(f, "max-hold {bars_held} bars"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiLegProfitManager {
    config: ProfitConfig,
    trackers: BTreeMap<String, PositionTracker>,
}

impl MultiLegProfitManager {
    pub fn new(config: ProfitConfig) -> Self {
        Self {
            config,
            trackers: BTreeMap::new(),
        }
    }

    /// Restore trackers from a checkpoint.
    pub fn with_trackers(config: ProfitConfig, trackers: BTreeMap<String, PositionTracker>) -> Self {
        Self { config, trackers }
    }

    pub fn track(
        &mut self,
        multi_leg_id: &str,
        strategy: MultiLegStrategy,
        entry_bar: u64,
        entry_iv: f64,
        entry_gex_strength: f64,
    ) {
        self.trackers.insert(
            multi_leg_id.to_string(),
            PositionTracker {
                strategy,
                entry_bar,
                entry_iv,
                entry_gex_strength,
                peak_profit_pct: 0.0,
            },
        );
    }

    pub fn tracker(&self, multi_leg_id: &str) -> Option<&PositionTracker> {
        self.trackers.get(multi_leg_id)
    }

    pub fn trackers(&self) -> &BTreeMap<String, PositionTracker> {
        &self.trackers
    }

    pub fn remove(&mut self, multi_leg_id: &str) -> Option<PositionTracker> {
        self.trackers.remove(multi_leg_id)
    }

    /// Evaluate the exit rules for one tracked structure.
    pub fn should_exit(&mut self, multi_leg_id: &str, inputs: &ExitInputs) -> Option<ExitReason> {
        let cfg = &self.config;
        let tracker = self.trackers.get_mut(multi_leg_id)?;

        let bars_held = inputs.current_bar.saturating_sub(tracker.entry_bar);
        if bars_held < cfg.min_hold_bars {
            return None;
        }
        if bars_held >= cfg.max_hold_bars {
            return Some(ExitReason::MaxHold { bars_held });
        }

        if inputs.current_pnl_pct > tracker.peak_profit_pct {
            tracker.peak_profit_pct = inputs.current_pnl_pct;
        }

        match tracker.strategy {
            MultiLegStrategy::ThetaHarvester => {
                if inputs.current_pnl_pct >= cfg.theta_take_profit_pct {
                    return Some(ExitReason::TakeProfit {
                        pnl_pct: inputs.current_pnl_pct,
                    });
                }
                if inputs.current_pnl_pct <= -cfg.theta_stop_loss_pct {
                    return Some(ExitReason::StopLoss {
                        pnl_pct: inputs.current_pnl_pct,
                    });
                }
                if let Some(current_iv) = inputs.current_iv {
                    if tracker.entry_iv > 0.0 && current_iv > 0.0 {
                        let drop = (tracker.entry_iv - current_iv) / tracker.entry_iv;
                        if drop >= cfg.theta_iv_collapse_threshold {
                            return Some(ExitReason::IvCollapse {
                                entry_iv: tracker.entry_iv,
                                current_iv,
                            });
                        }
                    }
                }
                if inputs.regime_type != RegimeType::Compression {
                    return Some(ExitReason::RegimeExit {
                        now: inputs.regime_type,
                    });
                }
            }
            MultiLegStrategy::GammaScalper => {
                if inputs.current_pnl_pct >= cfg.gamma_take_profit_pct {
                    return Some(ExitReason::TakeProfit {
                        pnl_pct: inputs.current_pnl_pct,
                    });
                }
                if inputs.current_pnl_pct <= -cfg.gamma_stop_loss_pct {
                    return Some(ExitReason::StopLoss {
                        pnl_pct: inputs.current_pnl_pct,
                    });
                }
                // Entered on negative GEX; a strong flip to positive
                // removes the expansion edge.
                if tracker.entry_gex_strength < 0.0
                    && inputs.microstructure.gex_regime == GexRegime::Positive
                    && inputs.microstructure.gex_strength_billions
                        >= cfg.gamma_gex_reversal_threshold
                {
                    return Some(ExitReason::GexReversal {
                        strength_billions: inputs.microstructure.gex_strength_billions,
                    });
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gex_neutral() -> GexSnapshot {
        GexSnapshot::default()
    }

    fn inputs<'a>(
        pnl_pct: f64,
        bar: u64,
        regime: RegimeType,
        gex: &'a GexSnapshot,
    ) -> ExitInputs<'a> {
        ExitInputs {
            current_pnl_pct: pnl_pct,
            current_bar: bar,
            regime_type: regime,
            current_iv: None,
            microstructure: gex,
        }
    }

    fn theta_manager() -> MultiLegProfitManager {
        let mut m = MultiLegProfitManager::new(ProfitConfig::default());
        m.track("ml-1", MultiLegStrategy::ThetaHarvester, 10, 0.30, 0.0);
        m
    }

    fn gamma_manager() -> MultiLegProfitManager {
        let mut m = MultiLegProfitManager::new(ProfitConfig::default());
        m.track("ml-1", MultiLegStrategy::GammaScalper, 10, 0.15, -3.0);
        m
    }

    #[test]
    fn min_hold_suppresses_all_exits() {
        let mut m = theta_manager();
        let g = gex_neutral();
        // 90% profit at bar 12 (2 bars held) — still no exit.
        assert!(m
            .should_exit("ml-1", &inputs(90.0, 12, RegimeType::Compression, &g))
            .is_none());
    }

    #[test]
    fn theta_take_profit_at_half_credit() {
        let mut m = theta_manager();
        let g = gex_neutral();
        let exit = m
            .should_exit("ml-1", &inputs(50.0, 40, RegimeType::Compression, &g))
            .unwrap();
        assert!(matches!(exit, ExitReason::TakeProfit { .. }));
    }

    #[test]
    fn theta_stop_loss_at_double_credit() {
        let mut m = theta_manager();
        let g = gex_neutral();
        let exit = m
            .should_exit("ml-1", &inputs(-200.0, 40, RegimeType::Compression, &g))
            .unwrap();
        assert!(matches!(exit, ExitReason::StopLoss { .. }));
    }

    #[test]
    fn theta_exits_on_iv_collapse() {
        let mut m = theta_manager();
        let g = gex_neutral();
        let mut i = inputs(10.0, 40, RegimeType::Compression, &g);
        i.current_iv = Some(0.30 * 0.65); // 35% drop from entry
        let exit = m.should_exit("ml-1", &i).unwrap();
        assert!(matches!(exit, ExitReason::IvCollapse { .. }));
    }

    #[test]
    fn theta_exits_when_compression_ends() {
        let mut m = theta_manager();
        let g = gex_neutral();
        let exit = m
            .should_exit("ml-1", &inputs(10.0, 40, RegimeType::Trend, &g))
            .unwrap();
        assert!(matches!(exit, ExitReason::RegimeExit { .. }));
    }

    #[test]
    fn theta_holds_inside_compression_with_modest_pnl() {
        let mut m = theta_manager();
        let g = gex_neutral();
        assert!(m
            .should_exit("ml-1", &inputs(10.0, 40, RegimeType::Compression, &g))
            .is_none());
    }

    #[test]
    fn gamma_take_profit() {
        let mut m = gamma_manager();
        let g = gex_neutral();
        let exit = m
            .should_exit("ml-1", &inputs(150.0, 40, RegimeType::Expansion, &g))
            .unwrap();
        assert!(matches!(exit, ExitReason::TakeProfit { .. }));
    }

    #[test]
    fn gamma_stop_loss() {
        let mut m = gamma_manager();
        let g = gex_neutral();
        let exit = m
            .should_exit("ml-1", &inputs(-50.0, 40, RegimeType::Expansion, &g))
            .unwrap();
        assert!(matches!(exit, ExitReason::StopLoss { .. }));
    }

    #[test]
    fn gamma_exits_on_strong_gex_reversal() {
        let mut m = gamma_manager();
        let g = GexSnapshot {
            gex_regime: GexRegime::Positive,
            gex_strength_billions: 1.5,
            total_gex_dollar: 1.5e9,
            gex_coverage: 30,
        };
        let exit = m
            .should_exit("ml-1", &inputs(20.0, 40, RegimeType::Expansion, &g))
            .unwrap();
        assert!(matches!(exit, ExitReason::GexReversal { .. }));
    }

    #[test]
    fn gamma_ignores_weak_reversal() {
        let mut m = gamma_manager();
        let g = GexSnapshot {
            gex_regime: GexRegime::Positive,
            gex_strength_billions: 0.4,
            total_gex_dollar: 0.4e9,
            gex_coverage: 30,
        };
        assert!(m
            .should_exit("ml-1", &inputs(20.0, 40, RegimeType::Expansion, &g))
            .is_none());
    }

    #[test]
    fn max_hold_forces_exit() {
        let mut m = theta_manager();
        let g = gex_neutral();
        let exit = m
            .should_exit("ml-1", &inputs(0.0, 10 + 390, RegimeType::Compression, &g))
            .unwrap();
        assert!(matches!(exit, ExitReason::MaxHold { bars_held: 390 }));
    }

    #[test]
    fn peak_profit_is_tracked() {
        let mut m = theta_manager();
        let g = gex_neutral();
        m.should_exit("ml-1", &inputs(20.0, 40, RegimeType::Compression, &g));
        m.should_exit("ml-1", &inputs(5.0, 41, RegimeType::Compression, &g));
        assert_eq!(m.tracker("ml-1").unwrap().peak_profit_pct, 20.0);
    }

    #[test]
    fn untracked_id_never_exits() {
        let mut m = theta_manager();
        let g = gex_neutral();
        assert!(m
            .should_exit("ghost", &inputs(500.0, 1_000, RegimeType::Trend, &g))
            .is_none());
    }
}
