//! Meta-policy layer: arbitration, adaptive weights, rolling memory.

pub mod adaptor;
pub mod controller;
pub mod memory;
pub mod types;

pub use adaptor::{
    AdaptorConfig, PolicyAdaptor, TradeOutcome, WeightChange, WeightTables,
};
pub use controller::{reconcile, ControllerConfig};
pub use memory::{AgentFitness, MemoryConfig, RollingMemoryStore};
pub use types::FinalTradeIntent;
