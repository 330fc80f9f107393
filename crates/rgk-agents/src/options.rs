//! Directional options agent: buys calls (long bias) or puts (short
//! bias), picking the contract through the selection engine.

use rgk_regime::{Bias, RegimeSignal, VolatilityLevel};
use rgk_schemas::{micros, OptionType};
use serde::{Deserialize, Serialize};

use crate::intent::{
    InstrumentType, Moneyness, OptionIntent, OptionKind, OptionPlan, SingleLegPlan,
    TradeDirection, TradeIntent,
};
use crate::selector::{select_best_contract, OptionRiskProfile};
use crate::MarketState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsConfig {
    pub min_confidence: f64,
    /// Contracts per entry.
    pub contracts: i64,
    /// Unsigned delta target for the long leg.
    pub target_abs_delta: f64,
    pub risk_profile: OptionRiskProfile,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            contracts: 1,
            target_abs_delta: 0.30,
            risk_profile: OptionRiskProfile::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptionsAgent {
    pub symbol: String,
    pub config: OptionsConfig,
}

impl OptionsAgent {
    pub const NAME: &'static str = "options_agent";

    pub fn evaluate(&self, signal: &RegimeSignal, state: &MarketState) -> Vec<TradeIntent> {
        if !signal.is_valid || signal.confidence < self.config.min_confidence {
            return Vec::new();
        }
        // Cheap-vol chop produces premium that never moves; skip it.
        if signal.volatility_level == VolatilityLevel::Low {
            return Vec::new();
        }
        let Some(chain) = state.chain else {
            return Vec::new();
        };
        let option_type = match signal.bias {
            Bias::Long => OptionType::Call,
            Bias::Short => OptionType::Put,
            Bias::Neutral => return Vec::new(),
        };
        let spot = state.features.close;

        let Some(best) = select_best_contract(
            &self.config.risk_profile,
            chain,
            option_type,
            self.config.target_abs_delta,
            None,
            spot,
        ) else {
            return Vec::new();
        };

        let (contract, quote, _greeks) = &best.row;
        if quote.ask_micros <= 0 {
            return Vec::new();
        }

        let strike = micros::to_f64(contract.strike_micros);
        let moneyness = if spot > 0.0 && (strike - spot).abs() / spot < 0.01 {
            Moneyness::Atm
        } else {
            let itm = match option_type {
                OptionType::Call => strike < spot,
                OptionType::Put => strike > spot,
            };
            if itm {
                Moneyness::Itm
            } else {
                Moneyness::Otm
            }
        };
        let dte = contract.days_to_expiry(chain.today);

        let intent = TradeIntent {
            symbol: self.symbol.clone(),
            agent_name: Self::NAME.to_string(),
            direction: TradeDirection::Long,
            size: self.config.contracts as f64,
            confidence: signal.confidence,
            reason: format!(
                "directional {} {} @ {:.2} (score {:.1})",
                option_type.as_str(),
                contract.symbol,
                strike,
                best.score
            ),
            instrument_type: InstrumentType::Option,
            option: Some(OptionIntent {
                option_kind: match option_type {
                    OptionType::Call => OptionKind::Call,
                    OptionType::Put => OptionKind::Put,
                },
                moneyness,
                time_to_expiry_days: dte,
                plan: OptionPlan::SingleLeg(SingleLegPlan {
                    contract_symbol: contract.symbol.clone(),
                    strike_micros: contract.strike_micros,
                    expiration: contract.expiration,
                    limit_price_micros: quote.ask_micros,
                    target_delta: self.config.target_abs_delta,
                    selection_score: best.score,
                    iv_percentile: chain.iv_percentile,
                }),
            }),
            metadata: Default::default(),
        };
        vec![intent.with_metadata("selection_score", best.score)]
    }
}
