//! Layered risk manager: gate intents, size positions, halt trading
//! under dangerous conditions.

pub mod engine;
pub mod types;

pub use engine::{can_trade, gate_stock, record_trade_result, tick, value_at_risk_micros};
pub use types::{reasons, GateDecision, RiskConfig, RiskState};
