//! Rolling per-agent fitness memory.
//!
//! Two exponentially weighted views of each agent's reward stream: a
//! short horizon that reacts within a handful of trades and a long
//! horizon that anchors it, plus the raw cumulative sum.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Short EWMA time constant, in trades.
    pub tau_short: f64,
    /// Long EWMA time constant, in trades.
    pub tau_long: f64,
    /// Rewards are clipped to ±this before recording.
    pub reward_clip: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            tau_short: 10.0,
            tau_long: 100.0,
            reward_clip: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFitness {
    /// EWMA over roughly the last `tau_short` trades.
    pub short_term: f64,
    /// EWMA over roughly the last `tau_long` trades.
    pub long_term: f64,
    /// Unsmoothed cumulative reward.
    pub cumulative: f64,
    pub trade_count: u64,
}

impl Default for AgentFitness {
    fn default() -> Self {
        Self {
            short_term: 0.0,
            long_term: 0.0,
            cumulative: 0.0,
            trade_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingMemoryStore {
    config: MemoryConfig,
    fitness: BTreeMap<String, AgentFitness>,
}

impl RollingMemoryStore {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            fitness: BTreeMap::new(),
        }
    }

    pub fn with_fitness(config: MemoryConfig, fitness: BTreeMap<String, AgentFitness>) -> Self {
        Self { config, fitness }
    }

    /// Record one closed trade's reward for `agent`.
    pub fn record_reward(&mut self, agent: &str, reward: f64) {
        let reward = reward.clamp(-self.config.reward_clip, self.config.reward_clip);
        let alpha_short = 1.0 - (-1.0 / self.config.tau_short).exp();
        let alpha_long = 1.0 - (-1.0 / self.config.tau_long).exp();

        let entry = self.fitness.entry(agent.to_string()).or_default();
        entry.short_term = (1.0 - alpha_short) * entry.short_term + alpha_short * reward;
        entry.long_term = (1.0 - alpha_long) * entry.long_term + alpha_long * reward;
        entry.cumulative += reward;
        entry.trade_count += 1;
    }

    pub fn fitness(&self, agent: &str) -> Option<&AgentFitness> {
        self.fitness.get(agent)
    }

    pub fn all(&self) -> &BTreeMap<String, AgentFitness> {
        &self.fitness
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_term_reacts_faster_than_long_term() {
        let mut m = RollingMemoryStore::new(MemoryConfig::default());
        for _ in 0..5 {
            m.record_reward("trend_agent", 0.05);
        }
        let f = m.fitness("trend_agent").unwrap();
        assert!(f.short_term > f.long_term);
        assert!(f.short_term > 0.0 && f.short_term < 0.05);
        assert_eq!(f.trade_count, 5);
    }

    #[test]
    fn cumulative_sums_clipped_rewards() {
        let mut m = RollingMemoryStore::new(MemoryConfig::default());
        m.record_reward("a", 0.5); // clips to 0.1
        m.record_reward("a", -0.02);
        let f = m.fitness("a").unwrap();
        assert!((f.cumulative - 0.08).abs() < 1e-12);
    }

    #[test]
    fn unknown_agent_has_no_fitness() {
        let m = RollingMemoryStore::new(MemoryConfig::default());
        assert!(m.fitness("ghost").is_none());
    }

    #[test]
    fn losses_pull_fitness_negative() {
        let mut m = RollingMemoryStore::new(MemoryConfig::default());
        for _ in 0..10 {
            m.record_reward("a", -0.03);
        }
        let f = m.fitness("a").unwrap();
        assert!(f.short_term < 0.0);
        assert!(f.long_term < 0.0);
    }
}
