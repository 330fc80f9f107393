//! Core data model shared by every crate in the workspace.
//!
//! Monetary values (prices, premiums, cash, PnL) are `i64` micros
//! (1 USD = 1_000_000); analytic values (Greeks, volatility, confidence,
//! weights) are `f64`. The [`micros`] module owns the conversions.

pub mod bar;
pub mod micros;
pub mod option_chain;
pub mod order;

pub use bar::Bar;
pub use option_chain::{OptionContract, OptionGreeks, OptionQuote, OptionType};
pub use order::{
    Account, BrokerPosition, Fill, Order, OrderSide, OrderStatus, OrderType, TimeInForce,
};
