//! Regime classification: feature set → [`RegimeSignal`].

pub mod classifier;
pub mod gex;
pub mod types;

pub use classifier::{classify, ClassifierConfig};
pub use gex::{calculate_gex_proxy, ChainRow};
pub use types::{
    Bias, GexRegime, GexSnapshot, RegimeSignal, RegimeType, TrendDirection, VolatilityLevel,
};
