//! Portfolio manager: cash, open positions, trade history, equity curve.
//!
//! Average-price accounting: adds at the same sign re-average the entry;
//! opposite-sign fills realize P&L on the closed portion at the stored
//! average. A [`Trade`] is produced only on full close (or flip), which
//! is the unit the memory store rewards.
//!
//! Deterministic and pure — no I/O, no clock; all timestamps arrive on
//! the fills. Two managers fed the same fill sequence produce identical
//! state.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use rgk_schemas::{micros, Fill, OrderSide};
use serde::{Deserialize, Serialize};

use crate::metrics;
use crate::types::{FillContext, Position, Trade};

/// Equity-curve points retained (ring, oldest dropped).
pub const EQUITY_CURVE_CAP: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioManager {
    initial_capital_micros: i64,
    cash_micros: i64,
    realized_pnl_micros: i64,
    positions: BTreeMap<String, Position>,
    trades: Vec<Trade>,
    equity_curve: VecDeque<(DateTime<Utc>, i64)>,
    pnl_history: VecDeque<i64>,
}

/// Summary statistics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub equity_micros: i64,
    pub cash_micros: i64,
    pub realized_pnl_micros: i64,
    pub unrealized_pnl_micros: i64,
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
    pub win_rate_pct: f64,
    pub sharpe_ratio: f64,
    pub open_positions: usize,
    pub closed_trades: usize,
}

impl PortfolioManager {
    pub fn new(initial_capital_micros: i64) -> Self {
        Self {
            initial_capital_micros,
            cash_micros: initial_capital_micros,
            realized_pnl_micros: 0,
            positions: BTreeMap::new(),
            trades: Vec::new(),
            equity_curve: VecDeque::new(),
            pnl_history: VecDeque::new(),
        }
    }

    pub fn initial_capital_micros(&self) -> i64 {
        self.initial_capital_micros
    }

    pub fn cash_micros(&self) -> i64 {
        self.cash_micros
    }

    pub fn realized_pnl_micros(&self) -> i64 {
        self.realized_pnl_micros
    }

    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.positions
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn qty_signed(&self, symbol: &str) -> i64 {
        self.positions.get(symbol).map(|p| p.quantity).unwrap_or(0)
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &VecDeque<(DateTime<Utc>, i64)> {
        &self.equity_curve
    }

    pub fn pnl_history(&self) -> &VecDeque<i64> {
        &self.pnl_history
    }

    /// Mark-to-market equity: cash + Σ position market value.
    pub fn equity_micros(&self) -> i64 {
        let mut equity = self.cash_micros;
        for pos in self.positions.values() {
            equity = equity.saturating_add(pos.market_value_micros());
        }
        equity
    }

    pub fn unrealized_pnl_micros(&self) -> i64 {
        self.positions
            .values()
            .map(|p| p.unrealized_pnl_micros())
            .sum()
    }

    /// Update a symbol's mark without trading.
    pub fn update_price(&mut self, symbol: &str, price_micros: i64) {
        if let Some(pos) = self.positions.get_mut(symbol) {
            pos.current_price_micros = price_micros;
        }
    }

    /// Adjust cash directly (option premium flows, hedge settlements).
    /// Positive credits, negative debits.
    pub fn apply_cash(&mut self, amount_micros: i64) {
        self.cash_micros = self.cash_micros.saturating_add(amount_micros);
    }

    /// Apply one fill. Returns the round-trip trade if this fill fully
    /// closed (or flipped) the position.
    pub fn reconcile(&mut self, fill: &Fill, ctx: &FillContext) -> Option<Trade> {
        let signed_qty = fill.quantity * fill.side.sign();
        debug_assert!(fill.quantity > 0 && fill.price_micros > 0);

        // Cash moves opposite the signed quantity, commission always out.
        self.cash_micros -= signed_qty.saturating_mul(fill.price_micros);
        self.cash_micros -= fill.commission_micros;

        let current = self.positions.get(&fill.symbol).cloned();
        match current {
            None => {
                self.positions.insert(
                    fill.symbol.clone(),
                    Position {
                        symbol: fill.symbol.clone(),
                        quantity: signed_qty,
                        avg_entry_price_micros: fill.price_micros,
                        entry_time: fill.ts,
                        current_price_micros: fill.price_micros,
                        regime_at_entry: ctx.regime,
                        vol_at_entry: ctx.volatility,
                    },
                );
                None
            }
            Some(mut pos) => {
                if pos.quantity.signum() == signed_qty.signum() {
                    // Add to the position: re-average the entry, keep the
                    // original entry attribution.
                    let total = pos.quantity + signed_qty;
                    let old_notional = pos.avg_entry_price_micros as i128 * pos.quantity.abs() as i128;
                    let new_notional = fill.price_micros as i128 * signed_qty.abs() as i128;
                    pos.avg_entry_price_micros =
                        ((old_notional + new_notional) / total.abs() as i128) as i64;
                    pos.quantity = total;
                    pos.current_price_micros = fill.price_micros;
                    self.positions.insert(fill.symbol.clone(), pos);
                    return None;
                }

                // Opposite sign: close some, all, or flip.
                let closing = pos.quantity.abs().min(signed_qty.abs());
                let direction = pos.quantity.signum();
                let realized = (fill.price_micros - pos.avg_entry_price_micros)
                    .saturating_mul(closing * direction);
                self.realized_pnl_micros += realized;

                let remaining = pos.quantity + signed_qty;
                if remaining == 0 || remaining.signum() != pos.quantity.signum() {
                    // Full close (possibly flipping): record the round trip.
                    let entry = pos.avg_entry_price_micros;
                    let pnl_pct = if entry > 0 {
                        micros::to_f64(fill.price_micros - entry) / micros::to_f64(entry)
                            * 100.0
                            * direction as f64
                    } else {
                        0.0
                    };
                    let trade = Trade {
                        symbol: pos.symbol.clone(),
                        entry_time: pos.entry_time,
                        exit_time: ctx.ts,
                        entry_price_micros: entry,
                        exit_price_micros: fill.price_micros,
                        quantity: pos.quantity,
                        pnl_micros: realized,
                        pnl_pct,
                        reason: ctx.reason.clone(),
                        agent: ctx.agent.clone(),
                        regime_at_entry: pos.regime_at_entry,
                        vol_at_entry: pos.vol_at_entry,
                    };
                    self.trades.push(trade.clone());

                    if remaining == 0 {
                        self.positions.remove(&fill.symbol);
                    } else {
                        // Flip: the excess opens a fresh position at the
                        // fill price with the new attribution.
                        self.positions.insert(
                            fill.symbol.clone(),
                            Position {
                                symbol: fill.symbol.clone(),
                                quantity: remaining,
                                avg_entry_price_micros: fill.price_micros,
                                entry_time: ctx.ts,
                                current_price_micros: fill.price_micros,
                                regime_at_entry: ctx.regime,
                                vol_at_entry: ctx.volatility,
                            },
                        );
                    }
                    Some(trade)
                } else {
                    // Partial close: realize P&L, keep the entry average.
                    pos.quantity = remaining;
                    pos.current_price_micros = fill.price_micros;
                    self.positions.insert(fill.symbol.clone(), pos);
                    None
                }
            }
        }
    }

    /// Append an equity point after marking positions to `marks`.
    pub fn record_equity(&mut self, ts: DateTime<Utc>, marks: &BTreeMap<String, i64>) {
        self.record_equity_with(ts, marks, 0);
    }

    /// Like [`PortfolioManager::record_equity`], with the market value
    /// of externally held books (options structures, hedge shares)
    /// folded into the equity point.
    pub fn record_equity_with(
        &mut self,
        ts: DateTime<Utc>,
        marks: &BTreeMap<String, i64>,
        external_value_micros: i64,
    ) {
        let symbols: Vec<String> = self.positions.keys().cloned().collect();
        for symbol in symbols {
            if let Some(&mark) = marks.get(&symbol) {
                self.update_price(&symbol, mark);
            }
        }
        let equity = self.equity_micros().saturating_add(external_value_micros);
        if let Some(&(_, last)) = self.equity_curve.back() {
            self.pnl_history.push_back(equity - last);
            if self.pnl_history.len() > EQUITY_CURVE_CAP {
                self.pnl_history.pop_front();
            }
        }
        self.equity_curve.push_back((ts, equity));
        if self.equity_curve.len() > EQUITY_CURVE_CAP {
            self.equity_curve.pop_front();
        }
    }

    pub fn stats(&self) -> PortfolioStats {
        let equity = self.equity_micros();
        let total_return_pct = if self.initial_capital_micros > 0 {
            micros::to_f64(equity - self.initial_capital_micros)
                / micros::to_f64(self.initial_capital_micros)
                * 100.0
        } else {
            0.0
        };
        PortfolioStats {
            equity_micros: equity,
            cash_micros: self.cash_micros,
            realized_pnl_micros: self.realized_pnl_micros,
            unrealized_pnl_micros: self.unrealized_pnl_micros(),
            total_return_pct,
            max_drawdown_pct: metrics::max_drawdown_pct(
                self.equity_curve.iter().map(|&(_, e)| e),
            ),
            win_rate_pct: metrics::win_rate_pct(&self.trades),
            sharpe_ratio: metrics::sharpe_ratio(
                self.pnl_history.iter().copied(),
                self.initial_capital_micros,
            ),
            open_positions: self.positions.len(),
            closed_trades: self.trades.len(),
        }
    }
}
