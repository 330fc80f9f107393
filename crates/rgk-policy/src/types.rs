//! Arbitrated intent — the controller's output.

use rgk_agents::{InstrumentType, OptionIntent};
use serde::{Deserialize, Serialize};

/// The single action the pipeline carries forward from a bar's intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalTradeIntent {
    pub symbol: String,
    /// Signed units: positive buys, negative sells. Relative units for
    /// stock (sized by risk), whole contracts for options.
    pub position_delta: f64,
    pub confidence: f64,
    pub primary_agent: String,
    pub contributing_agents: Vec<String>,
    pub reason: String,
    pub is_valid: bool,
    pub instrument_type: InstrumentType,
    /// Propagated from the primary contributor when it traded options.
    pub option: Option<OptionIntent>,
}

impl FinalTradeIntent {
    /// The no-trade outcome; every field inert.
    pub fn invalid(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            position_delta: 0.0,
            confidence: 0.0,
            primary_agent: String::new(),
            contributing_agents: Vec::new(),
            reason: reason.into(),
            is_valid: false,
            instrument_type: InstrumentType::Stock,
            option: None,
        }
    }
}
