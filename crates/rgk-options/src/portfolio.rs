//! Options book: single-leg positions, multi-leg structures, and their
//! closed-trade logs. Exclusively owned by the scheduler task.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rgk_schemas::micros;
use serde::{Deserialize, Serialize};

use crate::types::{
    LegFill, LegStatus, MultiLegPosition, MultiLegTrade, OptionTrade, CONTRACT_MULTIPLIER,
};

/// Single-leg positions are keyed by contract symbol (one position per
/// contract), multi-leg structures by their id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionsPortfolio {
    positions: BTreeMap<String, crate::types::OptionPosition>,
    multi_leg: BTreeMap<String, MultiLegPosition>,
    trades: Vec<OptionTrade>,
    multi_leg_trades: Vec<MultiLegTrade>,
}

impl OptionsPortfolio {
    pub fn new() -> Self {
        Self::default()
    }

    // -- single leg ---------------------------------------------------------

    pub fn positions(&self) -> &BTreeMap<String, crate::types::OptionPosition> {
        &self.positions
    }

    pub fn position(&self, contract_symbol: &str) -> Option<&crate::types::OptionPosition> {
        self.positions.get(contract_symbol)
    }

    /// Open or add to a single-leg position. Adds re-average the entry.
    pub fn add_position(&mut self, pos: crate::types::OptionPosition) {
        match self.positions.get_mut(&pos.contract_symbol) {
            Some(existing) => {
                let total = existing.quantity + pos.quantity;
                if total == 0 {
                    self.positions.remove(&pos.contract_symbol);
                    return;
                }
                let old = existing.avg_entry_price_micros as i128 * existing.quantity.abs() as i128;
                let new = pos.avg_entry_price_micros as i128 * pos.quantity.abs() as i128;
                existing.avg_entry_price_micros = ((old + new) / total.abs() as i128) as i64;
                existing.quantity = total;
                existing.current_price_micros = pos.current_price_micros;
            }
            None => {
                self.positions.insert(pos.contract_symbol.clone(), pos);
            }
        }
    }

    pub fn update_position(
        &mut self,
        contract_symbol: &str,
        underlying_price_micros: i64,
        option_price_micros: i64,
        delta: f64,
        theta: f64,
        iv: f64,
    ) {
        if let Some(pos) = self.positions.get_mut(contract_symbol) {
            pos.underlying_price_micros = underlying_price_micros;
            pos.current_price_micros = option_price_micros;
            pos.delta = delta;
            pos.theta = theta;
            pos.iv = iv;
        }
    }

    /// Close a single-leg position entirely, recording the round trip.
    pub fn close_position(
        &mut self,
        contract_symbol: &str,
        exit_price_micros: i64,
        exit_time: DateTime<Utc>,
        reason: &str,
        agent: &str,
    ) -> Option<OptionTrade> {
        let pos = self.positions.remove(contract_symbol)?;
        let pnl = (exit_price_micros - pos.avg_entry_price_micros)
            .saturating_mul(pos.quantity)
            .saturating_mul(CONTRACT_MULTIPLIER);
        let pnl_pct = if pos.avg_entry_price_micros > 0 {
            micros::to_f64(exit_price_micros - pos.avg_entry_price_micros)
                / micros::to_f64(pos.avg_entry_price_micros)
                * 100.0
                * pos.quantity.signum() as f64
        } else {
            0.0
        };
        let trade = OptionTrade {
            underlying: pos.underlying.clone(),
            contract_symbol: pos.contract_symbol.clone(),
            option_type: pos.option_type,
            strike_micros: pos.strike_micros,
            expiration: pos.expiration,
            quantity: pos.quantity,
            entry_price_micros: pos.avg_entry_price_micros,
            exit_price_micros,
            entry_time: pos.entry_time,
            exit_time,
            pnl_micros: pnl,
            pnl_pct,
            reason: reason.to_string(),
            agent: agent.to_string(),
            delta_at_entry: pos.delta,
            iv_at_entry: pos.iv,
            regime_at_entry: pos.regime_at_entry,
            vol_at_entry: pos.vol_at_entry,
        };
        self.trades.push(trade.clone());
        Some(trade)
    }

    pub fn trades(&self) -> &[OptionTrade] {
        &self.trades
    }

    // -- multi-leg ----------------------------------------------------------

    pub fn multi_leg_positions(&self) -> &BTreeMap<String, MultiLegPosition> {
        &self.multi_leg
    }

    pub fn multi_leg(&self, id: &str) -> Option<&MultiLegPosition> {
        self.multi_leg.get(id)
    }

    pub fn multi_leg_mut(&mut self, id: &str) -> Option<&mut MultiLegPosition> {
        self.multi_leg.get_mut(id)
    }

    pub fn active_multi_leg_ids(&self) -> Vec<String> {
        self.multi_leg.keys().cloned().collect()
    }

    /// Insert a freshly submitted structure (legs may still be pending).
    pub fn insert_multi_leg(&mut self, pos: MultiLegPosition) {
        self.multi_leg.insert(pos.multi_leg_id.clone(), pos);
    }

    /// Apply a leg fill by order id. Returns true when the structure now
    /// has both legs filled.
    pub fn apply_leg_fill(
        &mut self,
        multi_leg_id: &str,
        order_id: &str,
        fill_price_micros: i64,
        fill_time: DateTime<Utc>,
    ) -> bool {
        let Some(pos) = self.multi_leg.get_mut(multi_leg_id) else {
            return false;
        };
        for (leg_fill, leg) in [
            (&mut pos.call_fill, &mut pos.call),
            (&mut pos.put_fill, &mut pos.put),
        ] {
            if leg_fill.order_id == order_id {
                leg_fill.fill_price_micros = fill_price_micros;
                leg_fill.fill_time = Some(fill_time);
                leg_fill.status = LegStatus::Filled;
                leg.entry_price_micros = fill_price_micros;
                leg.current_price_micros = fill_price_micros;
            }
        }
        pos.both_legs_filled()
    }

    /// Update one structure's marks and Greeks for the bar.
    #[allow(clippy::too_many_arguments)]
    pub fn update_multi_leg(
        &mut self,
        id: &str,
        underlying_price_micros: i64,
        call_price_micros: i64,
        call_delta: f64,
        call_theta: f64,
        call_iv: f64,
        put_price_micros: i64,
        put_delta: f64,
        put_theta: f64,
        put_iv: f64,
    ) {
        if let Some(pos) = self.multi_leg.get_mut(id) {
            pos.underlying_price_micros = underlying_price_micros;
            pos.call.current_price_micros = call_price_micros;
            pos.call.delta = call_delta;
            pos.call.theta = call_theta;
            pos.call.iv = call_iv;
            pos.put.current_price_micros = put_price_micros;
            pos.put.delta = put_delta;
            pos.put.theta = put_theta;
            pos.put.iv = put_iv;
        }
    }

    /// Close a structure with both exit leg fills; records the combined
    /// trade and removes the position.
    pub fn close_multi_leg(
        &mut self,
        id: &str,
        call_exit: LegFill,
        put_exit: LegFill,
        exit_time: DateTime<Utc>,
        reason: &str,
    ) -> Option<MultiLegTrade> {
        let mut pos = self.multi_leg.remove(id)?;

        // Final marks at the exit prices, so combined P&L is computed
        // against what the closing legs actually traded at.
        pos.call.current_price_micros = call_exit.fill_price_micros;
        pos.put.current_price_micros = put_exit.fill_price_micros;

        let combined_pnl = pos.combined_unrealized_pnl_micros();
        let premium = pos.total_premium_micros();
        let combined_pnl_pct = if premium > 0 {
            combined_pnl as f64 / premium as f64 * 100.0
        } else {
            0.0
        };

        let trade = MultiLegTrade {
            multi_leg_id: pos.multi_leg_id.clone(),
            underlying: pos.underlying.clone(),
            strategy: pos.strategy,
            trade_type: pos.trade_type,
            direction: pos.direction,
            entry_time: pos.entry_time,
            exit_time,
            total_premium_micros: premium,
            combined_pnl_micros: combined_pnl,
            combined_pnl_pct,
            reason: reason.to_string(),
            call_exit,
            put_exit,
        };
        self.multi_leg_trades.push(trade.clone());
        Some(trade)
    }

    pub fn multi_leg_trades(&self) -> &[MultiLegTrade] {
        &self.multi_leg_trades
    }

    /// Cumulative closed P&L per underlying across both logs.
    pub fn pnl_by_underlying(&self) -> BTreeMap<String, i64> {
        let mut out: BTreeMap<String, i64> = BTreeMap::new();
        for t in &self.trades {
            *out.entry(t.underlying.clone()).or_insert(0) += t.pnl_micros;
        }
        for t in &self.multi_leg_trades {
            *out.entry(t.underlying.clone()).or_insert(0) += t.combined_pnl_micros;
        }
        out
    }

    /// Total unrealized P&L across all open options positions.
    pub fn unrealized_pnl_micros(&self) -> i64 {
        let singles: i64 = self
            .positions
            .values()
            .map(|p| {
                (p.current_price_micros - p.avg_entry_price_micros)
                    .saturating_mul(p.quantity)
                    .saturating_mul(CONTRACT_MULTIPLIER)
            })
            .sum();
        let multis: i64 = self
            .multi_leg
            .values()
            .map(|p| p.combined_unrealized_pnl_micros())
            .sum();
        singles + multis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LegType, MultiLegType, OptionLeg, OptionPosition, PositionDirection};
    use chrono::{NaiveDate, TimeZone};
    use rgk_agents::MultiLegStrategy;
    use rgk_schemas::micros::MICROS_SCALE;
    use rgk_schemas::OptionType;

    const M: i64 = MICROS_SCALE;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn single(contract: &str, qty: i64, entry: i64) -> OptionPosition {
        OptionPosition {
            underlying: "QQQ".into(),
            contract_symbol: contract.into(),
            option_type: OptionType::Call,
            strike_micros: 480 * M,
            expiration: NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
            quantity: qty,
            avg_entry_price_micros: entry,
            entry_time: ts(60),
            current_price_micros: entry,
            underlying_price_micros: 480 * M,
            delta: 0.5,
            gamma: 0.01,
            theta: -0.05,
            vega: 0.1,
            iv: 0.2,
            regime_at_entry: None,
            vol_at_entry: None,
        }
    }

    fn pending_leg(leg_type: LegType, order_id: &str) -> LegFill {
        LegFill::pending(leg_type, "X", 480 * M, 5, order_id)
    }

    fn structure(id: &str) -> MultiLegPosition {
        let leg = |qty: i64, delta: f64| OptionLeg {
            contract_symbol: "X".into(),
            strike_micros: 480 * M,
            quantity: qty,
            entry_price_micros: 0,
            current_price_micros: 0,
            delta,
            gamma: 0.01,
            theta: -0.05,
            vega: 0.1,
            iv: 0.25,
        };
        MultiLegPosition {
            multi_leg_id: id.into(),
            underlying: "QQQ".into(),
            strategy: MultiLegStrategy::ThetaHarvester,
            trade_type: MultiLegType::Straddle,
            direction: PositionDirection::Short,
            call: leg(-5, 0.5),
            put: leg(-5, -0.5),
            expiration: NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
            entry_time: ts(60),
            entry_bar: 1,
            underlying_price_micros: 480 * M,
            call_fill: pending_leg(LegType::Call, "c-1"),
            put_fill: pending_leg(LegType::Put, "p-1"),
            entry_iv: 0.25,
            iv_percentile_at_entry: 80.0,
            entry_gex_strength: 0.0,
            sim_only: false,
            regime_at_entry: None,
            vol_at_entry: None,
        }
    }

    #[test]
    fn one_position_per_contract_symbol() {
        let mut book = OptionsPortfolio::new();
        book.add_position(single("QQQ-C-480", 2, 2_000_000));
        book.add_position(single("QQQ-C-480", 2, 3_000_000));
        assert_eq!(book.positions().len(), 1);
        let p = book.position("QQQ-C-480").unwrap();
        assert_eq!(p.quantity, 4);
        assert_eq!(p.avg_entry_price_micros, 2_500_000);
    }

    #[test]
    fn close_single_leg_records_trade() {
        let mut book = OptionsPortfolio::new();
        book.add_position(single("QQQ-C-480", 2, 2_000_000));
        let trade = book
            .close_position("QQQ-C-480", 3_000_000, ts(120), "tp", "options_agent")
            .unwrap();
        // (3.0 − 2.0) × 2 × 100 = $200.
        assert_eq!(trade.pnl_micros, 200 * M);
        assert!(book.positions().is_empty());
        assert_eq!(book.trades().len(), 1);
    }

    #[test]
    fn leg_fills_complete_the_structure() {
        let mut book = OptionsPortfolio::new();
        book.insert_multi_leg(structure("ml-1"));
        assert!(!book.multi_leg("ml-1").unwrap().both_legs_filled());

        assert!(!book.apply_leg_fill("ml-1", "c-1", 2_400_000, ts(70)));
        assert!(book.apply_leg_fill("ml-1", "p-1", 2_380_000, ts(71)));

        let pos = book.multi_leg("ml-1").unwrap();
        assert!(pos.both_legs_filled());
        assert_eq!(pos.call.entry_price_micros, 2_400_000);
        assert_eq!(pos.put.entry_price_micros, 2_380_000);
        // Credit: (2.40 + 2.38) × 5 × 100 = $2,390.
        assert_eq!(pos.total_premium_micros(), 2_390 * M);
    }

    #[test]
    fn close_multi_leg_records_combined_trade() {
        let mut book = OptionsPortfolio::new();
        book.insert_multi_leg(structure("ml-1"));
        book.apply_leg_fill("ml-1", "c-1", 2_400_000, ts(70));
        book.apply_leg_fill("ml-1", "p-1", 2_400_000, ts(71));

        let call_exit = LegFill {
            fill_price_micros: 1_200_000,
            fill_time: Some(ts(500)),
            status: LegStatus::Filled,
            ..pending_leg(LegType::Call, "c-2")
        };
        let put_exit = LegFill {
            fill_price_micros: 1_200_000,
            fill_time: Some(ts(500)),
            status: LegStatus::Filled,
            ..pending_leg(LegType::Put, "p-2")
        };
        let trade = book
            .close_multi_leg("ml-1", call_exit, put_exit, ts(500), "profit-take")
            .unwrap();
        // Short 5× at 4.80 credit, closed at 2.40: +$1,200 = 50%.
        assert_eq!(trade.combined_pnl_micros, 1_200 * M);
        assert!((trade.combined_pnl_pct - 50.0).abs() < 1e-9);
        assert!(book.multi_leg("ml-1").is_none());
        assert_eq!(book.multi_leg_trades().len(), 1);
    }

    #[test]
    fn pnl_by_underlying_sums_both_logs() {
        let mut book = OptionsPortfolio::new();
        book.add_position(single("QQQ-C-480", 1, 2_000_000));
        book.close_position("QQQ-C-480", 2_500_000, ts(120), "tp", "a");
        book.insert_multi_leg(structure("ml-1"));
        book.apply_leg_fill("ml-1", "c-1", 2_400_000, ts(70));
        book.apply_leg_fill("ml-1", "p-1", 2_400_000, ts(71));
        let exit = |o: &str, lt: LegType| LegFill {
            fill_price_micros: 2_000_000,
            fill_time: Some(ts(500)),
            status: LegStatus::Filled,
            ..pending_leg(lt, o)
        };
        book.close_multi_leg("ml-1", exit("c-2", LegType::Call), exit("p-2", LegType::Put), ts(500), "x");

        let by = book.pnl_by_underlying();
        // Single: +$50. Multi: short, 4.8→4.0 ⇒ +0.8×5×100 = $400.
        assert_eq!(by["QQQ"], 450 * M);
    }
}
