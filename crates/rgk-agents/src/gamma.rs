//! Gamma scalper: buys 25-delta strangles when dealers are short gamma
//! (negative GEX) and implied volatility is cheap.

use rgk_regime::{GexRegime, RegimeSignal};
use rgk_schemas::{micros, OptionType};
use serde::{Deserialize, Serialize};

use crate::intent::{
    InstrumentType, Moneyness, MultiLegPlan, MultiLegStrategy, OptionIntent, OptionKind,
    OptionPlan, TradeDirection, TradeIntent,
};
use crate::MarketState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GammaConfig {
    /// IV percentile above which premium is no longer cheap.
    pub max_iv_percentile: f64,
    /// Minimum |GEX| in billions before the expansion edge is real.
    pub min_gex_strength: f64,
    pub max_position_size: i64,
    pub target_delta: f64,
}

impl Default for GammaConfig {
    fn default() -> Self {
        Self {
            max_iv_percentile: 30.0,
            min_gex_strength: 2.0,
            max_position_size: 7,
            target_delta: 0.25,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GammaScalperAgent {
    pub symbol: String,
    pub config: GammaConfig,
}

impl GammaScalperAgent {
    pub const NAME: &'static str = "gamma_scalper";

    pub fn evaluate(&self, signal: &RegimeSignal, state: &MarketState) -> Vec<TradeIntent> {
        let gex = &signal.microstructure;
        if gex.gex_regime != GexRegime::Negative
            || gex.gex_strength_billions.abs() < self.config.min_gex_strength
        {
            return Vec::new();
        }
        let Some(chain) = state.chain else {
            return Vec::new();
        };
        let spot = state.features.close;
        if spot <= 0.0 {
            return Vec::new();
        }

        let Some(iv_percentile) = chain.iv_percentile else {
            return Vec::new();
        };
        if iv_percentile > self.config.max_iv_percentile {
            return Vec::new();
        }

        let Some((call, call_quote, call_greeks)) =
            chain.closest_delta_row(OptionType::Call, self.config.target_delta)
        else {
            return Vec::new();
        };
        let Some((put, put_quote, _)) =
            chain.closest_delta_row(OptionType::Put, self.config.target_delta)
        else {
            return Vec::new();
        };
        if call_quote.ask_micros <= 0 || put_quote.ask_micros <= 0 {
            return Vec::new();
        }

        let debit_micros = call_quote.ask_micros + put_quote.ask_micros;
        let debit = micros::to_f64(debit_micros);
        let size = ((debit * 15.0) as i64).clamp(1, self.config.max_position_size);
        let dte = call.days_to_expiry(chain.today);
        let total_debit = debit * size as f64 * 100.0;

        let intent = TradeIntent {
            symbol: self.symbol.clone(),
            agent_name: Self::NAME.to_string(),
            direction: TradeDirection::Long,
            size: size as f64,
            confidence: signal.confidence,
            reason: format!(
                "buy {size}x 25d strangle ({:.0}C/{:.0}P): GEX {:.2}B + IV p{iv_percentile:.0}, debit ${total_debit:.0}",
                micros::to_f64(call.strike_micros),
                micros::to_f64(put.strike_micros),
                gex.gex_strength_billions
            ),
            instrument_type: InstrumentType::Option,
            option: Some(OptionIntent {
                option_kind: OptionKind::Strangle,
                moneyness: Moneyness::Otm,
                time_to_expiry_days: dte,
                plan: OptionPlan::MultiLeg(MultiLegPlan {
                    strategy: MultiLegStrategy::GammaScalper,
                    call_symbol: call.symbol.clone(),
                    call_strike_micros: call.strike_micros,
                    put_symbol: put.symbol.clone(),
                    put_strike_micros: put.strike_micros,
                    expiration: call.expiration,
                    expected_premium_micros: debit_micros,
                    entry_iv: call_greeks.implied_volatility,
                    iv_percentile,
                    entry_gex_strength: gex.gex_strength_billions,
                    sim_only: false,
                }),
            }),
            metadata: Default::default(),
        };
        vec![intent
            .with_metadata("total_debit", total_debit)
            .with_metadata("gex_strength", gex.gex_strength_billions)]
    }
}
