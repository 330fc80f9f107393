//! Options lifecycle: positions and trades, synthetic pricing fallback,
//! profit-take rules for multi-leg structures.

pub mod portfolio;
pub mod pricing;
pub mod profit;
pub mod types;

pub use portfolio::OptionsPortfolio;
pub use pricing::{SyntheticGreeks, DEFAULT_IV, DEFAULT_RISK_FREE_RATE};
pub use profit::{ExitInputs, ExitReason, MultiLegProfitManager, PositionTracker, ProfitConfig};
pub use types::{
    LegFill, LegStatus, LegType, MultiLegPosition, MultiLegTrade, MultiLegType, OptionLeg,
    OptionPosition, OptionTrade, PositionDirection, CONTRACT_MULTIPLIER,
};
