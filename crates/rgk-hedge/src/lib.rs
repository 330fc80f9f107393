//! Delta hedging for multi-leg option structures.
//!
//! The manager is split into a pure decision step ([`DeltaHedgeManager::decide`])
//! and an accounting step ([`DeltaHedgeManager::apply_fill`]); order
//! submission happens in the scheduler between the two, so this crate
//! never touches a broker. Hedge positions are keyed by multi-leg id —
//! the id is held by value, never a pointer back into the options book,
//! so there is no ownership cycle.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rgk_schemas::{micros, OrderSide};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeConfig {
    pub enabled: bool,
    /// Hedge when |net_delta| exceeds this per contract held.
    pub delta_threshold: f64,
    /// Re-hedge only when net delta moved at least this much.
    pub min_delta_change: f64,
    /// Bars between hedges of one structure.
    pub hedge_frequency_bars: u64,
    /// Skip adjustments smaller than this many shares.
    pub min_hedge_shares: i64,
    pub max_hedge_trades_per_day: u32,
    pub max_hedge_notional_per_day_micros: i64,
    /// Bars a hedge may outlive its options before forced flattening.
    pub max_orphan_hedge_bars: u64,
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delta_threshold: 0.10,
            min_delta_change: 0.05,
            hedge_frequency_bars: 5,
            min_hedge_shares: 5,
            max_hedge_trades_per_day: 50,
            max_hedge_notional_per_day_micros: 100_000 * micros::MICROS_SCALE,
            max_orphan_hedge_bars: 60,
        }
    }
}

/// Running hedge state for one multi-leg structure.
///
/// Invariant: `avg_price_micros == 0` whenever `hedge_shares == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgePosition {
    pub multi_leg_id: String,
    pub symbol: String,
    /// Signed shares: positive long, negative short.
    pub hedge_shares: i64,
    pub avg_price_micros: i64,
    pub last_hedge_price_micros: i64,
    pub last_hedge_bar: u64,
    pub last_net_delta: f64,
    pub realized_pnl_micros: i64,
    pub unrealized_pnl_micros: i64,
    /// Gross notional traded, monotonically non-decreasing.
    pub total_cost_micros: i64,
    pub hedge_count: u32,
    pub total_shares_traded: i64,
}

impl HedgePosition {
    fn new(multi_leg_id: &str, symbol: &str) -> Self {
        Self {
            multi_leg_id: multi_leg_id.to_string(),
            symbol: symbol.to_string(),
            hedge_shares: 0,
            avg_price_micros: 0,
            last_hedge_price_micros: 0,
            last_hedge_bar: 0,
            last_net_delta: 0.0,
            realized_pnl_micros: 0,
            unrealized_pnl_micros: 0,
            total_cost_micros: 0,
            hedge_count: 0,
            total_shares_traded: 0,
        }
    }
}

/// An adjustment the scheduler should submit as a market order.
#[derive(Debug, Clone, PartialEq)]
pub struct HedgeOrder {
    pub multi_leg_id: String,
    pub symbol: String,
    pub side: OrderSide,
    /// Always positive.
    pub shares: i64,
}

/// Why no hedge order was produced this bar.
#[derive(Debug, Clone, PartialEq)]
pub enum HedgeSkip {
    Disabled,
    WithinThreshold,
    FrequencyLimit { bars_since_last: u64 },
    DeltaChangeTooSmall { change: f64 },
    BelowMinShares { shares: i64 },
    DailyTradeLimit { trades_today: u32 },
    DailyNotionalLimit { notional_today_micros: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaHedgeManager {
    config: HedgeConfig,
    positions: BTreeMap<String, HedgePosition>,
    daily_trades: BTreeMap<String, u32>,
    daily_notional_micros: BTreeMap<String, i64>,
    current_day: Option<NaiveDate>,
    orphan_bars: BTreeMap<String, u64>,
}

impl DeltaHedgeManager {
    pub fn new(config: HedgeConfig) -> Self {
        Self {
            config,
            positions: BTreeMap::new(),
            daily_trades: BTreeMap::new(),
            daily_notional_micros: BTreeMap::new(),
            current_day: None,
            orphan_bars: BTreeMap::new(),
        }
    }

    pub fn position(&self, multi_leg_id: &str) -> Option<&HedgePosition> {
        self.positions.get(multi_leg_id)
    }

    pub fn positions(&self) -> &BTreeMap<String, HedgePosition> {
        &self.positions
    }

    fn roll_day(&mut self, day: NaiveDate) {
        if self.current_day != Some(day) {
            self.current_day = Some(day);
            self.daily_trades.clear();
            self.daily_notional_micros.clear();
        }
    }

    /// Decide whether `multi_leg_id` needs a hedge adjustment this bar.
    ///
    /// `net_delta` is the structure's summed per-contract delta exposure;
    /// `contracts` scales the threshold (0.10 per contract held).
    #[allow(clippy::too_many_arguments)]
    pub fn decide(
        &mut self,
        multi_leg_id: &str,
        symbol: &str,
        net_delta: f64,
        contracts: i64,
        price_micros: i64,
        current_bar: u64,
        day: NaiveDate,
    ) -> Result<HedgeOrder, HedgeSkip> {
        if !self.config.enabled {
            return Err(HedgeSkip::Disabled);
        }
        self.roll_day(day);

        let effective_threshold = self.config.delta_threshold * contracts.max(1) as f64;
        let current = self.positions.get(multi_leg_id);

        if let Some(pos) = current {
            if pos.hedge_count > 0 {
                let bars_since_last = current_bar.saturating_sub(pos.last_hedge_bar);
                if bars_since_last < self.config.hedge_frequency_bars {
                    return Err(HedgeSkip::FrequencyLimit { bars_since_last });
                }
            }
        }

        if net_delta.abs() <= effective_threshold {
            return Err(HedgeSkip::WithinThreshold);
        }

        if let Some(pos) = current {
            if pos.hedge_count > 0 {
                let change = (net_delta - pos.last_net_delta).abs();
                if change < self.config.min_delta_change {
                    return Err(HedgeSkip::DeltaChangeTooSmall { change });
                }
            }
        }

        let current_shares = current.map(|p| p.hedge_shares).unwrap_or(0);
        let target_shares = (-net_delta * 100.0).round() as i64;
        let adjustment = target_shares - current_shares;
        if adjustment.abs() < self.config.min_hedge_shares {
            return Err(HedgeSkip::BelowMinShares {
                shares: adjustment,
            });
        }

        let trades_today = self.daily_trades.get(symbol).copied().unwrap_or(0);
        if trades_today >= self.config.max_hedge_trades_per_day {
            return Err(HedgeSkip::DailyTradeLimit { trades_today });
        }
        let notional_today = self
            .daily_notional_micros
            .get(symbol)
            .copied()
            .unwrap_or(0);
        let order_notional = adjustment.abs().saturating_mul(price_micros);
        if notional_today.saturating_add(order_notional)
            > self.config.max_hedge_notional_per_day_micros
        {
            return Err(HedgeSkip::DailyNotionalLimit {
                notional_today_micros: notional_today,
            });
        }

        Ok(HedgeOrder {
            multi_leg_id: multi_leg_id.to_string(),
            symbol: symbol.to_string(),
            side: if adjustment > 0 {
                OrderSide::Buy
            } else {
                OrderSide::Sell
            },
            shares: adjustment.abs(),
        })
    }

    /// Account for an executed hedge adjustment.
    ///
    /// Reversals realize P&L on the closed portion at the old weighted
    /// average; the remainder re-averages. Counters and daily guardrail
    /// totals advance here.
    pub fn apply_fill(
        &mut self,
        multi_leg_id: &str,
        symbol: &str,
        signed_shares: i64,
        fill_price_micros: i64,
        net_delta: f64,
        current_bar: u64,
    ) {
        let pos = self
            .positions
            .entry(multi_leg_id.to_string())
            .or_insert_with(|| HedgePosition::new(multi_leg_id, symbol));

        let old_shares = pos.hedge_shares;
        let old_avg = pos.avg_price_micros;

        if old_shares != 0 && old_shares.signum() != signed_shares.signum() {
            let closed = old_shares.abs().min(signed_shares.abs());
            let realized = (fill_price_micros - old_avg)
                .saturating_mul(closed)
                .saturating_mul(old_shares.signum());
            pos.realized_pnl_micros += realized;
        }

        let new_total = old_shares + signed_shares;
        if old_shares == 0 {
            pos.avg_price_micros = fill_price_micros;
        } else if new_total == 0 {
            pos.avg_price_micros = 0;
            pos.unrealized_pnl_micros = 0;
        } else if old_shares.signum() != new_total.signum() {
            // Flipped through zero: the surviving side opened at the fill.
            pos.avg_price_micros = fill_price_micros;
        } else if signed_shares.signum() == old_shares.signum() {
            // Added to the same side: weighted average.
            let old_notional = old_avg as i128 * old_shares.abs() as i128;
            let new_notional = fill_price_micros as i128 * signed_shares.abs() as i128;
            pos.avg_price_micros =
                ((old_notional + new_notional) / new_total.abs() as i128) as i64;
        }
        // Partial close on the same side keeps the old average.

        pos.hedge_shares = new_total;
        pos.last_hedge_price_micros = fill_price_micros;
        pos.last_hedge_bar = current_bar;
        pos.last_net_delta = net_delta;
        pos.hedge_count += 1;
        pos.total_shares_traded += signed_shares.abs();
        pos.total_cost_micros = pos
            .total_cost_micros
            .saturating_add(signed_shares.abs().saturating_mul(fill_price_micros));

        *self.daily_trades.entry(symbol.to_string()).or_insert(0) += 1;
        *self
            .daily_notional_micros
            .entry(symbol.to_string())
            .or_insert(0) += signed_shares.abs().saturating_mul(fill_price_micros);
    }

    /// Mark the hedge to `price_micros`; returns the unrealized P&L.
    pub fn update_unrealized(&mut self, multi_leg_id: &str, price_micros: i64) -> i64 {
        let Some(pos) = self.positions.get_mut(multi_leg_id) else {
            return 0;
        };
        if pos.hedge_shares == 0 {
            pos.unrealized_pnl_micros = 0;
            return 0;
        }
        pos.unrealized_pnl_micros =
            (price_micros - pos.avg_price_micros).saturating_mul(pos.hedge_shares);
        pos.unrealized_pnl_micros
    }

    pub fn total_pnl_micros(&self, multi_leg_id: &str) -> i64 {
        self.positions
            .get(multi_leg_id)
            .map(|p| p.realized_pnl_micros + p.unrealized_pnl_micros)
            .unwrap_or(0)
    }

    /// Advance orphan counters for hedges whose structure is gone.
    /// Returns the ids whose hedges must now be flattened.
    pub fn check_orphans(&mut self, active_ids: &BTreeSet<String>) -> Vec<String> {
        let mut to_flatten = Vec::new();
        for (id, pos) in &self.positions {
            if active_ids.contains(id) {
                self.orphan_bars.insert(id.clone(), 0);
                continue;
            }
            if pos.hedge_shares != 0 {
                let bars = self.orphan_bars.get(id).copied().unwrap_or(0) + 1;
                self.orphan_bars.insert(id.clone(), bars);
                if bars >= self.config.max_orphan_hedge_bars {
                    to_flatten.push(id.clone());
                }
            }
        }
        to_flatten
    }

    /// Remove a hedge when its structure closes. Realizes the remaining
    /// P&L at `price_micros` and returns the final state plus the signed
    /// share count the scheduler must flatten at the broker (0 if flat).
    pub fn remove(
        &mut self,
        multi_leg_id: &str,
        price_micros: i64,
    ) -> Option<(HedgePosition, i64)> {
        let mut pos = self.positions.remove(multi_leg_id)?;
        self.orphan_bars.remove(multi_leg_id);
        let to_flatten = pos.hedge_shares;
        if to_flatten != 0 {
            let final_pnl =
                (price_micros - pos.avg_price_micros).saturating_mul(pos.hedge_shares);
            pos.realized_pnl_micros += final_pnl;
            pos.unrealized_pnl_micros = 0;
            pos.hedge_shares = 0;
            pos.avg_price_micros = 0;
        }
        Some((pos, to_flatten))
    }
}
