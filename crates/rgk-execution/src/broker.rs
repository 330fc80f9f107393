//! Broker capability boundary.
//!
//! Adapters convert vendor SDK behavior into these traits at the edge;
//! failures arrive as tagged [`BrokerError`] values and never unwind
//! through the pipeline. Implementations must be `Send` (the scheduler
//! task owns them) and may be internally multi-threaded, but must expose
//! blocking entry points — the core never shares mutable state with
//! them.

use std::fmt;

use chrono::{DateTime, Utc};
use rgk_schemas::{
    Account, BrokerPosition, Fill, Order, OrderSide, OrderType, TimeInForce,
};

#[derive(Debug)]
pub enum BrokerError {
    /// The broker refused the order (insufficient buying power, unknown
    /// symbol, market closed). Recoverable: surfaced as a risk event.
    Rejected { reason: String },
    /// Transport failure talking to the vendor.
    Transport(String),
    /// The adapter cannot carry this instrument or structure.
    Unsupported { what: String },
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::Rejected { reason } => write!(f, "order rejected: {reason}"),
            BrokerError::Transport(msg) => write!(f, "broker transport error: {msg}"),
            BrokerError::Unsupported { what } => write!(f, "broker cannot handle: {what}"),
        }
    }
}

impl std::error::Error for BrokerError {}

/// A stock order as the executors hand it to an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: i64,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub limit_price_micros: Option<i64>,
    pub stop_price_micros: Option<i64>,
    /// Reference price for market fills in paper/replay adapters.
    pub current_price_micros: Option<i64>,
    /// Bar time, stamped onto fills (no wall clock in the pipeline).
    pub ts: DateTime<Utc>,
}

impl OrderRequest {
    pub fn market(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: i64,
        current_price_micros: i64,
        ts: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Day,
            limit_price_micros: None,
            stop_price_micros: None,
            current_price_micros: Some(current_price_micros),
            ts,
        }
    }
}

/// An options order; quantity is in contracts.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionsOrderRequest {
    pub contract_symbol: String,
    pub side: OrderSide,
    pub contracts: i64,
    pub order_type: OrderType,
    pub limit_price_micros: Option<i64>,
    pub time_in_force: TimeInForce,
    pub ts: DateTime<Utc>,
}

pub trait Broker: Send {
    fn name(&self) -> &'static str;

    fn account(&self) -> Result<Account, BrokerError>;

    fn positions(&self, symbol: Option<&str>) -> Result<Vec<BrokerPosition>, BrokerError>;

    fn submit_order(&mut self, req: &OrderRequest) -> Result<Order, BrokerError>;

    fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>, BrokerError>;

    fn cancel_order(&mut self, order_id: &str) -> Result<bool, BrokerError>;

    fn recent_fills(&self, symbol: Option<&str>, limit: usize) -> Result<Vec<Fill>, BrokerError>;
}

/// Superset capability for adapters that can route option contracts.
pub trait OptionsBroker: Broker {
    fn submit_options_order(&mut self, req: &OptionsOrderRequest) -> Result<Order, BrokerError>;

    /// Whether short multi-leg structures (naked straddle selling) are
    /// accepted. Paper accounts typically cannot carry them; the theta
    /// harvester falls back to sim-only recording when this is false.
    fn supports_short_multi_leg(&self) -> bool;
}
