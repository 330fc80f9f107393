//! Agent federation.
//!
//! Agents are a closed sum type — the set is small and per-bar iteration
//! is linear, so tagged variants buy exhaustiveness checking over trait
//! objects. Every agent is a pure function of `(RegimeSignal,
//! MarketState)`; agents share no state and perform no I/O.

pub mod chain_view;
pub mod ema;
pub mod fvg_agent;
pub mod gamma;
pub mod intent;
pub mod mean_reversion;
pub mod options;
pub mod selector;
pub mod theta;
pub mod trend;
pub mod volatility;

use rgk_features::FeatureSet;
use rgk_regime::RegimeSignal;

pub use chain_view::ChainView;
pub use ema::{EmaAgent, EmaConfig};
pub use fvg_agent::{FvgAgent, FvgConfig};
pub use gamma::{GammaConfig, GammaScalperAgent};
pub use intent::{
    InstrumentType, Moneyness, MultiLegPlan, MultiLegStrategy, OptionIntent, OptionKind,
    OptionPlan, SingleLegPlan, TradeDirection, TradeIntent,
};
pub use mean_reversion::{MeanReversionAgent, MeanReversionConfig};
pub use options::{OptionsAgent, OptionsConfig};
pub use selector::{select_best_contract, OptionRiskProfile, RejectReason, ScoredContract};
pub use theta::{ThetaConfig, ThetaHarvesterAgent};
pub use trend::{TrendAgent, TrendConfig};
pub use volatility::{VolatilityAgent, VolatilityConfig};

/// Per-bar snapshot of everything agents may read. Assembled by the
/// scheduler; agents never reach past it.
#[derive(Debug, Clone, Copy)]
pub struct MarketState<'a> {
    pub features: &'a FeatureSet,
    /// Chain snapshot for this bar, absent when no provider is wired.
    pub chain: Option<&'a ChainView>,
    /// Whether the broker adapter can carry short multi-leg orders.
    pub supports_short_multi_leg: bool,
}

/// The federation's closed variant set.
#[derive(Debug, Clone)]
pub enum Agent {
    Trend(TrendAgent),
    MeanReversion(MeanReversionAgent),
    Volatility(VolatilityAgent),
    Fvg(FvgAgent),
    Ema(EmaAgent),
    Options(OptionsAgent),
    ThetaHarvester(ThetaHarvesterAgent),
    GammaScalper(GammaScalperAgent),
}

impl Agent {
    pub fn name(&self) -> &'static str {
        match self {
            Agent::Trend(_) => TrendAgent::NAME,
            Agent::MeanReversion(_) => MeanReversionAgent::NAME,
            Agent::Volatility(_) => VolatilityAgent::NAME,
            Agent::Fvg(_) => FvgAgent::NAME,
            Agent::Ema(_) => EmaAgent::NAME,
            Agent::Options(_) => OptionsAgent::NAME,
            Agent::ThetaHarvester(_) => ThetaHarvesterAgent::NAME,
            Agent::GammaScalper(_) => GammaScalperAgent::NAME,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Agent::Trend(a) => &a.symbol,
            Agent::MeanReversion(a) => &a.symbol,
            Agent::Volatility(a) => &a.symbol,
            Agent::Fvg(a) => &a.symbol,
            Agent::Ema(a) => &a.symbol,
            Agent::Options(a) => &a.symbol,
            Agent::ThetaHarvester(a) => &a.symbol,
            Agent::GammaScalper(a) => &a.symbol,
        }
    }

    /// Evaluate one bar. An invalid signal produces no intents from any
    /// variant, by contract.
    pub fn evaluate(&self, signal: &RegimeSignal, state: &MarketState) -> Vec<TradeIntent> {
        // Theta/gamma gate on their own conditions but still never act on
        // an invalid signal; enforce the contract once here.
        if !signal.is_valid {
            return Vec::new();
        }
        match self {
            Agent::Trend(a) => a.evaluate(signal, state),
            Agent::MeanReversion(a) => a.evaluate(signal, state),
            Agent::Volatility(a) => a.evaluate(signal, state),
            Agent::Fvg(a) => a.evaluate(signal, state),
            Agent::Ema(a) => a.evaluate(signal, state),
            Agent::Options(a) => a.evaluate(signal, state),
            Agent::ThetaHarvester(a) => a.evaluate(signal, state),
            Agent::GammaScalper(a) => a.evaluate(signal, state),
        }
    }

    /// The default federation for one symbol: all eight variants with
    /// their default thresholds.
    pub fn default_federation(symbol: &str) -> Vec<Agent> {
        vec![
            Agent::Trend(TrendAgent {
                symbol: symbol.to_string(),
                config: TrendConfig::default(),
            }),
            Agent::MeanReversion(MeanReversionAgent {
                symbol: symbol.to_string(),
                config: MeanReversionConfig::default(),
            }),
            Agent::Volatility(VolatilityAgent {
                symbol: symbol.to_string(),
                config: VolatilityConfig::default(),
            }),
            Agent::Fvg(FvgAgent {
                symbol: symbol.to_string(),
                config: FvgConfig::default(),
            }),
            Agent::Ema(EmaAgent {
                symbol: symbol.to_string(),
                config: EmaConfig::default(),
            }),
            Agent::Options(OptionsAgent {
                symbol: symbol.to_string(),
                config: OptionsConfig::default(),
            }),
            Agent::ThetaHarvester(ThetaHarvesterAgent {
                symbol: symbol.to_string(),
                config: ThetaConfig::default(),
            }),
            Agent::GammaScalper(GammaScalperAgent {
                symbol: symbol.to_string(),
                config: GammaConfig::default(),
            }),
        ]
    }
}
