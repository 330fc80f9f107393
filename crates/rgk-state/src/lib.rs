//! Engine checkpoint: the single document persisted on stop and at
//! periodic intervals.
//!
//! Serialization is canonical by construction — struct fields emit in
//! declaration order and every map is a `BTreeMap` — so persist → load
//! → persist produces identical bytes, which is what the restart
//! determinism guarantee rests on.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rgk_hedge::DeltaHedgeManager;
use rgk_options::{OptionsPortfolio, PositionTracker};
use rgk_policy::{AgentFitness, WeightTables};
use rgk_portfolio::PortfolioManager;
use rgk_risk::RiskState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub bar_count: u64,
    pub last_bar_time: Option<DateTime<Utc>>,
    pub bars_per_symbol: BTreeMap<String, u64>,
    /// Stock book: positions, trade log, equity curve (bounded ring).
    pub portfolio: PortfolioManager,
    /// Options book: single-leg and multi-leg positions plus both logs.
    pub options: OptionsPortfolio,
    /// Hedge positions keyed by multi-leg id.
    pub hedge: DeltaHedgeManager,
    /// The four adaptive weight tables.
    pub weights: WeightTables,
    pub memory_fitness: BTreeMap<String, AgentFitness>,
    /// Peak equity, daily P&L, circuit-breaker state.
    pub risk_state: RiskState,
    pub profit_trackers: BTreeMap<String, PositionTracker>,
}

/// Serialize to the canonical byte form.
pub fn to_bytes(checkpoint: &Checkpoint) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(checkpoint).context("serialize checkpoint")
}

pub fn from_bytes(bytes: &[u8]) -> Result<Checkpoint> {
    serde_json::from_slice(bytes).context("parse checkpoint")
}

/// Persist atomically: write a sibling temp file, then rename over the
/// target. A crash mid-write leaves the previous checkpoint intact.
pub fn persist(path: impl AsRef<Path>, checkpoint: &Checkpoint) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create checkpoint dir {parent:?}"))?;
    }
    let bytes = to_bytes(checkpoint)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &bytes).with_context(|| format!("write checkpoint temp {tmp:?}"))?;
    fs::rename(&tmp, path).with_context(|| format!("rename checkpoint into place {path:?}"))?;
    Ok(())
}

pub fn load(path: impl AsRef<Path>) -> Result<Checkpoint> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("read checkpoint {path:?}"))?;
    from_bytes(&bytes)
}
