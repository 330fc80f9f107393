//! Adaptive weight tables.
//!
//! Four tables bias the controller's scoring: per-agent, per-regime,
//! per-volatility-bucket, per-instrument. After every closed trade the
//! relevant entry in each table is multiplied by `(1 + learning_rate ×
//! reward)` and the table is renormalized so its weights average 1.0.
//! The tables are plain values owned by the adaptor — no globals; the
//! scheduler passes them to the controller explicitly.

use std::collections::BTreeMap;

use rgk_agents::InstrumentType;
use rgk_regime::{RegimeType, VolatilityLevel};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptorConfig {
    pub learning_rate: f64,
    /// Rewards are clipped to ±this before they touch the tables.
    pub reward_clip: f64,
    /// Weight moves at or above this fraction are reported.
    pub change_report_threshold: f64,
}

impl Default for AdaptorConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            reward_clip: 0.1,
            change_report_threshold: 0.05,
        }
    }
}

/// All four weight tables, serializable as a unit for checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTables {
    pub agent_weights: BTreeMap<String, f64>,
    pub regime_weights: BTreeMap<RegimeType, f64>,
    pub volatility_weights: BTreeMap<VolatilityLevel, f64>,
    pub structure_weights: BTreeMap<InstrumentType, f64>,
}

impl WeightTables {
    /// Fresh tables: every known key at weight 1.0.
    pub fn new(agent_names: &[String]) -> Self {
        Self {
            agent_weights: agent_names.iter().map(|n| (n.clone(), 1.0)).collect(),
            regime_weights: RegimeType::ALL.iter().map(|&r| (r, 1.0)).collect(),
            volatility_weights: VolatilityLevel::ALL.iter().map(|&v| (v, 1.0)).collect(),
            structure_weights: InstrumentType::ALL.iter().map(|&i| (i, 1.0)).collect(),
        }
    }

    pub fn agent_weight(&self, name: &str) -> f64 {
        self.agent_weights.get(name).copied().unwrap_or(1.0)
    }

    pub fn regime_weight(&self, regime: RegimeType) -> f64 {
        self.regime_weights.get(&regime).copied().unwrap_or(1.0)
    }

    pub fn volatility_weight(&self, level: VolatilityLevel) -> f64 {
        self.volatility_weights.get(&level).copied().unwrap_or(1.0)
    }

    pub fn structure_weight(&self, instrument: InstrumentType) -> f64 {
        self.structure_weights.get(&instrument).copied().unwrap_or(1.0)
    }
}

/// One weight move worth reporting (≥ the configured threshold).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightChange {
    /// "agent" | "regime" | "volatility" | "structure"
    pub table: &'static str,
    pub name: String,
    pub old_weight: f64,
    pub new_weight: f64,
}

/// Closed-trade attribution the adaptor learns from.
#[derive(Debug, Clone)]
pub struct TradeOutcome {
    pub agent_name: String,
    pub regime: RegimeType,
    pub volatility: VolatilityLevel,
    pub instrument: InstrumentType,
    /// P&L ÷ initial capital, pre-clip.
    pub reward: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyAdaptor {
    config: AdaptorConfig,
    tables: WeightTables,
}

impl PolicyAdaptor {
    pub fn new(config: AdaptorConfig, agent_names: &[String]) -> Self {
        Self {
            config,
            tables: WeightTables::new(agent_names),
        }
    }

    /// Restore tables from a checkpoint.
    pub fn with_tables(config: AdaptorConfig, tables: WeightTables) -> Self {
        Self { config, tables }
    }

    pub fn tables(&self) -> &WeightTables {
        &self.tables
    }

    /// Apply a closed trade's reward to the four tables. Returns the
    /// weight moves that cleared the reporting threshold.
    ///
    /// Updated weights take effect from the next bar onward — the caller
    /// invokes this after the bar's pipeline has consumed the old tables.
    pub fn record_trade_outcome(&mut self, outcome: &TradeOutcome) -> Vec<WeightChange> {
        let reward = outcome
            .reward
            .clamp(-self.config.reward_clip, self.config.reward_clip);
        let factor = 1.0 + self.config.learning_rate * reward;
        let mut changes = Vec::new();

        let threshold = self.config.change_report_threshold;
        let mut track = |table: &'static str, name: String, old: f64, new: f64| {
            if old > 0.0 && ((new - old) / old).abs() >= threshold {
                changes.push(WeightChange {
                    table,
                    name,
                    old_weight: old,
                    new_weight: new,
                });
            }
        };

        {
            let snapshot: Vec<(String, f64)> = self
                .tables
                .agent_weights
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect();
            if let Some(w) = self.tables.agent_weights.get_mut(&outcome.agent_name) {
                *w *= factor;
            }
            renormalize_string_table(&mut self.tables.agent_weights);
            for (name, old) in snapshot {
                let new = self.tables.agent_weight(&name);
                track("agent", name, old, new);
            }
        }
        {
            let old = self.tables.regime_weight(outcome.regime);
            if let Some(w) = self.tables.regime_weights.get_mut(&outcome.regime) {
                *w *= factor;
            }
            renormalize_table(&mut self.tables.regime_weights);
            track(
                "regime",
                outcome.regime.as_str().to_string(),
                old,
                self.tables.regime_weight(outcome.regime),
            );
        }
        {
            let old = self.tables.volatility_weight(outcome.volatility);
            if let Some(w) = self.tables.volatility_weights.get_mut(&outcome.volatility) {
                *w *= factor;
            }
            renormalize_table(&mut self.tables.volatility_weights);
            track(
                "volatility",
                outcome.volatility.as_str().to_string(),
                old,
                self.tables.volatility_weight(outcome.volatility),
            );
        }
        {
            let old = self.tables.structure_weight(outcome.instrument);
            if let Some(w) = self.tables.structure_weights.get_mut(&outcome.instrument) {
                *w *= factor;
            }
            renormalize_table(&mut self.tables.structure_weights);
            track(
                "structure",
                outcome.instrument.as_str().to_string(),
                old,
                self.tables.structure_weight(outcome.instrument),
            );
        }

        changes
    }
}

fn renormalize_table<K: Ord>(table: &mut BTreeMap<K, f64>) {
    let n = table.len();
    if n == 0 {
        return;
    }
    let sum: f64 = table.values().sum();
    if sum <= 0.0 {
        return;
    }
    let scale = n as f64 / sum;
    for w in table.values_mut() {
        *w *= scale;
    }
}

fn renormalize_string_table(table: &mut BTreeMap<String, f64>) {
    renormalize_table(table)
}
