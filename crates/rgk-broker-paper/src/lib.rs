//! Deterministic in-memory paper broker.
//!
//! Design decisions, kept intentionally simple and deterministic:
//! - Order ids are `paper:{seq}` from a monotonic counter.
//! - Market orders fill immediately at the caller-supplied reference
//!   price; limit orders fill at the limit price. No partial fills.
//! - No randomness, no wall clock: fill timestamps come from the
//!   request.
//! - Cash and positions are tracked so `account()` reflects activity;
//!   margin is unconstrained (the risk layer owns sizing).
//!
//! Tests can force the next submission to reject via
//! [`PaperBroker::inject_rejection`], which exercises the pipeline's
//! broker-rejection path without a misbehaving vendor.

use std::collections::BTreeMap;

use rgk_execution::{
    Broker, BrokerError, OptionsBroker, OptionsOrderRequest, OrderRequest,
};
use rgk_schemas::{
    micros, Account, BrokerPosition, Fill, Order, OrderSide, OrderStatus, OrderType,
};

#[derive(Debug, Clone, Default)]
struct Book {
    /// symbol → (signed qty, avg price micros).
    positions: BTreeMap<String, (i64, i64)>,
    /// Last trade price per symbol, for marks.
    last_price: BTreeMap<String, i64>,
}

impl Book {
    fn apply(&mut self, symbol: &str, signed_qty: i64, price_micros: i64) {
        self.last_price.insert(symbol.to_string(), price_micros);
        let entry = self.positions.entry(symbol.to_string()).or_insert((0, 0));
        let (old_qty, old_avg) = *entry;
        let new_qty = old_qty + signed_qty;
        if new_qty == 0 {
            self.positions.remove(symbol);
            return;
        }
        if old_qty == 0 || old_qty.signum() != new_qty.signum() {
            *entry = (new_qty, price_micros);
        } else if old_qty.signum() == signed_qty.signum() {
            let old_notional = old_avg as i128 * old_qty.abs() as i128;
            let add_notional = price_micros as i128 * signed_qty.abs() as i128;
            let avg = ((old_notional + add_notional) / new_qty.abs() as i128) as i64;
            *entry = (new_qty, avg);
        } else {
            // Reduced on the same side: average unchanged.
            *entry = (new_qty, old_avg);
        }
    }

    fn market_value_micros(&self, contract_multiplier: i64) -> i64 {
        self.positions
            .iter()
            .map(|(symbol, &(qty, avg))| {
                let mark = self.last_price.get(symbol).copied().unwrap_or(avg);
                qty.saturating_mul(mark).saturating_mul(contract_multiplier)
            })
            .sum()
    }
}

#[derive(Debug)]
pub struct PaperBroker {
    cash_micros: i64,
    stocks: Book,
    options: Book,
    orders: BTreeMap<String, Order>,
    fills: Vec<Fill>,
    seq: u64,
    allow_short_multi_leg: bool,
    pending_rejection: Option<String>,
}

impl PaperBroker {
    pub fn new(initial_cash_micros: i64) -> Self {
        Self {
            cash_micros: initial_cash_micros,
            stocks: Book::default(),
            options: Book::default(),
            orders: BTreeMap::new(),
            fills: Vec::new(),
            seq: 0,
            allow_short_multi_leg: true,
            pending_rejection: None,
        }
    }

    /// Emulate an account without short multi-leg approval.
    pub fn without_short_multi_leg(mut self) -> Self {
        self.allow_short_multi_leg = false;
        self
    }

    /// Force the next submission to reject with `reason` (one-shot).
    pub fn inject_rejection(&mut self, reason: impl Into<String>) {
        self.pending_rejection = Some(reason.into());
    }

    pub fn cash_micros(&self) -> i64 {
        self.cash_micros
    }

    pub fn option_qty(&self, contract_symbol: &str) -> i64 {
        self.options
            .positions
            .get(contract_symbol)
            .map(|&(q, _)| q)
            .unwrap_or(0)
    }

    pub fn stock_qty(&self, symbol: &str) -> i64 {
        self.stocks
            .positions
            .get(symbol)
            .map(|&(q, _)| q)
            .unwrap_or(0)
    }

    fn next_order_id(&mut self) -> String {
        self.seq += 1;
        format!("paper:{}", self.seq)
    }

    fn take_rejection(&mut self) -> Option<BrokerError> {
        self.pending_rejection
            .take()
            .map(|reason| BrokerError::Rejected { reason })
    }

    fn fill_price(req_type: OrderType, limit: Option<i64>, current: Option<i64>) -> Option<i64> {
        match req_type {
            OrderType::Market => current,
            OrderType::Limit | OrderType::Stop | OrderType::StopLimit => limit.or(current),
        }
    }
}

impl Broker for PaperBroker {
    fn name(&self) -> &'static str {
        "paper"
    }

    fn account(&self) -> Result<Account, BrokerError> {
        let stock_mv = self.stocks.market_value_micros(1);
        let option_mv = self.options.market_value_micros(100);
        let equity = self.cash_micros + stock_mv + option_mv;
        Ok(Account {
            cash_micros: self.cash_micros,
            equity_micros: equity,
            buying_power_micros: self.cash_micros.max(0).saturating_mul(2),
            portfolio_value_micros: equity,
        })
    }

    fn positions(&self, symbol: Option<&str>) -> Result<Vec<BrokerPosition>, BrokerError> {
        Ok(self
            .stocks
            .positions
            .iter()
            .filter(|(s, _)| symbol.map(|want| want == s.as_str()).unwrap_or(true))
            .map(|(s, &(qty, avg))| {
                let mark = self.stocks.last_price.get(s).copied().unwrap_or(avg);
                BrokerPosition {
                    symbol: s.clone(),
                    quantity: qty,
                    avg_entry_price_micros: avg,
                    current_price_micros: mark,
                    market_value_micros: qty.saturating_mul(mark),
                    unrealized_pnl_micros: (mark - avg).saturating_mul(qty),
                }
            })
            .collect())
    }

    fn submit_order(&mut self, req: &OrderRequest) -> Result<Order, BrokerError> {
        if let Some(err) = self.take_rejection() {
            return Err(err);
        }
        if req.quantity <= 0 {
            return Err(BrokerError::Rejected {
                reason: format!("non-positive quantity {}", req.quantity),
            });
        }
        let Some(price) = Self::fill_price(
            req.order_type,
            req.limit_price_micros,
            req.current_price_micros,
        ) else {
            return Err(BrokerError::Rejected {
                reason: "market order without reference price".to_string(),
            });
        };

        let order_id = self.next_order_id();
        let signed_qty = req.quantity * req.side.sign();
        self.stocks.apply(&req.symbol, signed_qty, price);
        self.cash_micros -= signed_qty.saturating_mul(price);

        let order = Order {
            order_id: order_id.clone(),
            symbol: req.symbol.clone(),
            side: req.side,
            quantity: req.quantity,
            order_type: req.order_type,
            time_in_force: req.time_in_force,
            status: OrderStatus::Filled,
            filled_quantity: req.quantity,
            filled_price_micros: Some(price),
            limit_price_micros: req.limit_price_micros,
            stop_price_micros: req.stop_price_micros,
            submitted_at: Some(req.ts),
            filled_at: Some(req.ts),
        };
        self.orders.insert(order_id.clone(), order.clone());
        self.fills.push(Fill {
            order_id,
            symbol: req.symbol.clone(),
            side: req.side,
            quantity: req.quantity,
            price_micros: price,
            ts: req.ts,
            commission_micros: 0,
        });
        Ok(order)
    }

    fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>, BrokerError> {
        Ok(self
            .orders
            .values()
            .filter(|o| !o.status.is_terminal())
            .filter(|o| symbol.map(|want| want == o.symbol).unwrap_or(true))
            .cloned()
            .collect())
    }

    fn cancel_order(&mut self, order_id: &str) -> Result<bool, BrokerError> {
        match self.orders.get_mut(order_id) {
            Some(order) if !order.status.is_terminal() => {
                order.status = OrderStatus::Cancelled;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    fn recent_fills(&self, symbol: Option<&str>, limit: usize) -> Result<Vec<Fill>, BrokerError> {
        let mut fills: Vec<Fill> = self
            .fills
            .iter()
            .filter(|f| symbol.map(|want| want == f.symbol).unwrap_or(true))
            .cloned()
            .collect();
        fills.reverse(); // newest first
        fills.truncate(limit);
        Ok(fills)
    }
}

impl OptionsBroker for PaperBroker {
    fn submit_options_order(&mut self, req: &OptionsOrderRequest) -> Result<Order, BrokerError> {
        if let Some(err) = self.take_rejection() {
            return Err(err);
        }
        if req.contracts <= 0 {
            return Err(BrokerError::Rejected {
                reason: format!("non-positive contracts {}", req.contracts),
            });
        }
        let current_qty = self.option_qty(&req.contract_symbol);
        if !self.allow_short_multi_leg
            && req.side == OrderSide::Sell
            && current_qty - req.contracts < 0
        {
            return Err(BrokerError::Rejected {
                reason: "account not approved for naked option selling".to_string(),
            });
        }
        let Some(price) = Self::fill_price(req.order_type, req.limit_price_micros, None) else {
            return Err(BrokerError::Rejected {
                reason: "options order without limit price".to_string(),
            });
        };

        let order_id = self.next_order_id();
        let signed = req.contracts * req.side.sign();
        self.options.apply(&req.contract_symbol, signed, price);
        // Premium notional: contracts × price × 100.
        self.cash_micros -= signed.saturating_mul(price).saturating_mul(100);

        let order = Order {
            order_id: order_id.clone(),
            symbol: req.contract_symbol.clone(),
            side: req.side,
            quantity: req.contracts,
            order_type: req.order_type,
            time_in_force: req.time_in_force,
            status: OrderStatus::Filled,
            filled_quantity: req.contracts,
            filled_price_micros: Some(price),
            limit_price_micros: req.limit_price_micros,
            stop_price_micros: None,
            submitted_at: Some(req.ts),
            filled_at: Some(req.ts),
        };
        self.orders.insert(order_id.clone(), order.clone());
        self.fills.push(Fill {
            order_id,
            symbol: req.contract_symbol.clone(),
            side: req.side,
            quantity: req.contracts,
            price_micros: price,
            ts: req.ts,
            commission_micros: 0,
        });
        Ok(order)
    }

    fn supports_short_multi_leg(&self) -> bool {
        self.allow_short_multi_leg
    }
}

/// Convenience: $100k paper account, full approvals.
impl Default for PaperBroker {
    fn default() -> Self {
        Self::new(100_000 * micros::MICROS_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rgk_schemas::micros::MICROS_SCALE;
    use rgk_schemas::{OrderType, TimeInForce};

    const M: i64 = MICROS_SCALE;

    fn ts() -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(60, 0).unwrap()
    }

    fn market(symbol: &str, side: OrderSide, qty: i64, price: i64) -> OrderRequest {
        OrderRequest::market(symbol, side, qty, price * M, ts())
    }

    #[test]
    fn market_order_fills_at_reference_price() {
        let mut broker = PaperBroker::default();
        let order = broker
            .submit_order(&market("QQQ", OrderSide::Buy, 10, 480))
            .unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_price_micros, Some(480 * M));
        assert_eq!(broker.stock_qty("QQQ"), 10);
        assert_eq!(broker.cash_micros(), (100_000 - 4_800) * M);
    }

    #[test]
    fn order_ids_are_sequential() {
        let mut broker = PaperBroker::default();
        let a = broker
            .submit_order(&market("QQQ", OrderSide::Buy, 1, 480))
            .unwrap();
        let b = broker
            .submit_order(&market("QQQ", OrderSide::Buy, 1, 480))
            .unwrap();
        assert_eq!(a.order_id, "paper:1");
        assert_eq!(b.order_id, "paper:2");
    }

    #[test]
    fn sell_flattens_and_restores_cash() {
        let mut broker = PaperBroker::default();
        broker
            .submit_order(&market("QQQ", OrderSide::Buy, 10, 480))
            .unwrap();
        broker
            .submit_order(&market("QQQ", OrderSide::Sell, 10, 490))
            .unwrap();
        assert_eq!(broker.stock_qty("QQQ"), 0);
        assert_eq!(broker.cash_micros(), (100_000 + 100) * M);
    }

    #[test]
    fn account_equity_reflects_positions() {
        let mut broker = PaperBroker::default();
        broker
            .submit_order(&market("QQQ", OrderSide::Buy, 10, 480))
            .unwrap();
        let account = broker.account().unwrap();
        assert_eq!(account.equity_micros, 100_000 * M);
        assert_eq!(account.cash_micros, (100_000 - 4_800) * M);
    }

    #[test]
    fn injected_rejection_fires_once() {
        let mut broker = PaperBroker::default();
        broker.inject_rejection("insufficient buying power");
        let err = broker
            .submit_order(&market("QQQ", OrderSide::Buy, 10, 480))
            .unwrap_err();
        assert!(matches!(err, BrokerError::Rejected { .. }));
        assert!(broker
            .submit_order(&market("QQQ", OrderSide::Buy, 10, 480))
            .is_ok());
    }

    fn options_req(side: OrderSide, contracts: i64, limit: i64) -> OptionsOrderRequest {
        OptionsOrderRequest {
            contract_symbol: "QQQ240621C00480000".to_string(),
            side,
            contracts,
            order_type: OrderType::Limit,
            limit_price_micros: Some(limit),
            time_in_force: TimeInForce::Day,
            ts: ts(),
        }
    }

    #[test]
    fn options_order_moves_premium_notional() {
        let mut broker = PaperBroker::default();
        broker
            .submit_options_order(&options_req(OrderSide::Buy, 5, 2_400_000))
            .unwrap();
        // 5 × $2.40 × 100 = $1,200.
        assert_eq!(broker.cash_micros(), (100_000 - 1_200) * M);
        assert_eq!(broker.option_qty("QQQ240621C00480000"), 5);
    }

    #[test]
    fn restricted_account_rejects_naked_selling() {
        let mut broker = PaperBroker::default().without_short_multi_leg();
        assert!(!broker.supports_short_multi_leg());
        let err = broker
            .submit_options_order(&options_req(OrderSide::Sell, 5, 2_400_000))
            .unwrap_err();
        assert!(matches!(err, BrokerError::Rejected { .. }));
        // Closing a long is still fine.
        broker
            .submit_options_order(&options_req(OrderSide::Buy, 5, 2_400_000))
            .unwrap();
        assert!(broker
            .submit_options_order(&options_req(OrderSide::Sell, 5, 2_400_000))
            .is_ok());
    }

    #[test]
    fn recent_fills_newest_first_with_limit() {
        let mut broker = PaperBroker::default();
        for i in 1..=5 {
            broker
                .submit_order(&market("QQQ", OrderSide::Buy, i, 480))
                .unwrap();
        }
        let fills = broker.recent_fills(Some("QQQ"), 2).unwrap();
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].quantity, 5);
        assert_eq!(fills[1].quantity, 4);
    }

    #[test]
    fn cancel_of_filled_order_is_false() {
        let mut broker = PaperBroker::default();
        let order = broker
            .submit_order(&market("QQQ", OrderSide::Buy, 1, 480))
            .unwrap();
        assert!(!broker.cancel_order(&order.order_id).unwrap());
        assert!(!broker.cancel_order("paper:999").unwrap());
    }
}
