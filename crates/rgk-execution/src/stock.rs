//! Stock execution: sized delta → market order → fill.

use chrono::{DateTime, Utc};
use rgk_schemas::{Fill, OrderSide, OrderStatus};

use crate::broker::{Broker, BrokerError, OrderRequest};

#[derive(Debug)]
pub enum ExecError {
    Broker(BrokerError),
    /// Order was accepted but came back without a fill price.
    NoFill { order_id: String },
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecError::Broker(e) => write!(f, "execution broker error: {e}"),
            ExecError::NoFill { order_id } => {
                write!(f, "order {order_id} returned no fill")
            }
        }
    }
}

impl std::error::Error for ExecError {}

impl From<BrokerError> for ExecError {
    fn from(e: BrokerError) -> Self {
        ExecError::Broker(e)
    }
}

/// Execute a signed share delta as a market order at the bar's mark.
///
/// Returns the resulting fill. A rejection leaves the portfolio
/// untouched; the caller logs it as a risk event and continues.
pub fn execute_stock_delta(
    broker: &mut dyn Broker,
    symbol: &str,
    signed_qty: i64,
    price_micros: i64,
    ts: DateTime<Utc>,
) -> Result<Fill, ExecError> {
    debug_assert!(signed_qty != 0);
    let side = if signed_qty > 0 {
        OrderSide::Buy
    } else {
        OrderSide::Sell
    };
    let req = OrderRequest::market(symbol, side, signed_qty.abs(), price_micros, ts);
    let order = broker.submit_order(&req)?;

    match (order.status, order.filled_price_micros) {
        (OrderStatus::Filled | OrderStatus::PartiallyFilled, Some(price)) => Ok(Fill {
            order_id: order.order_id,
            symbol: symbol.to_string(),
            side,
            quantity: order.filled_quantity,
            price_micros: price,
            ts: order.filled_at.unwrap_or(ts),
            commission_micros: 0,
        }),
        _ => Err(ExecError::NoFill {
            order_id: order.order_id,
        }),
    }
}
