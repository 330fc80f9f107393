//! Theta harvester: sells ATM straddles in compression regimes when
//! implied volatility is rich.

use rgk_regime::{RegimeSignal, RegimeType};
use rgk_schemas::{micros, OptionType};
use serde::{Deserialize, Serialize};

use crate::intent::{
    InstrumentType, Moneyness, MultiLegPlan, MultiLegStrategy, OptionIntent, OptionKind,
    OptionPlan, TradeDirection, TradeIntent,
};
use crate::MarketState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThetaConfig {
    /// IV percentile below which premium is not worth selling.
    pub min_iv_percentile: f64,
    /// Selling premium demands near-certainty about the regime.
    pub min_confidence: f64,
    /// Contract cap per structure.
    pub max_position_size: i64,
}

impl Default for ThetaConfig {
    fn default() -> Self {
        Self {
            min_iv_percentile: 70.0,
            min_confidence: 0.85,
            max_position_size: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThetaHarvesterAgent {
    pub symbol: String,
    pub config: ThetaConfig,
}

impl ThetaHarvesterAgent {
    pub const NAME: &'static str = "theta_harvester";

    pub fn evaluate(&self, signal: &RegimeSignal, state: &MarketState) -> Vec<TradeIntent> {
        if signal.regime_type != RegimeType::Compression {
            return Vec::new();
        }
        if signal.confidence < self.config.min_confidence {
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
        if iv_percentile < self.config.min_iv_percentile {
            return Vec::new();
        }

        let Some((call, call_quote, call_greeks)) = chain.atm_row(OptionType::Call, spot) else {
            return Vec::new();
        };
        let Some((put, put_quote, _)) = chain.atm_row(OptionType::Put, spot) else {
            return Vec::new();
        };
        if call_quote.bid_micros <= 0 || put_quote.bid_micros <= 0 {
            return Vec::new();
        }

        // Per-share credit for the structure; dollars for sizing.
        let credit_micros = call_quote.bid_micros + put_quote.bid_micros;
        let credit = micros::to_f64(credit_micros);
        let size = ((credit * 10.0) as i64).clamp(1, self.config.max_position_size);

        let sim_only = !state.supports_short_multi_leg;
        let dte = call.days_to_expiry(chain.today);
        let total_credit = credit * size as f64 * 100.0;

        let intent = TradeIntent {
            symbol: self.symbol.clone(),
            agent_name: Self::NAME.to_string(),
            direction: TradeDirection::Short,
            size: size as f64,
            confidence: signal.confidence,
            reason: format!(
                "sell {size}x ATM straddle @ {:.2}: compression + IV p{iv_percentile:.0}, credit ${total_credit:.0}",
                micros::to_f64(call.strike_micros)
            ),
            instrument_type: InstrumentType::Option,
            option: Some(OptionIntent {
                option_kind: OptionKind::Straddle,
                moneyness: Moneyness::Atm,
                time_to_expiry_days: dte,
                plan: OptionPlan::MultiLeg(MultiLegPlan {
                    strategy: MultiLegStrategy::ThetaHarvester,
                    call_symbol: call.symbol.clone(),
                    call_strike_micros: call.strike_micros,
                    put_symbol: put.symbol.clone(),
                    put_strike_micros: put.strike_micros,
                    expiration: call.expiration,
                    expected_premium_micros: credit_micros,
                    entry_iv: call_greeks.implied_volatility,
                    iv_percentile,
                    entry_gex_strength: signal.microstructure.gex_strength_billions,
                    sim_only,
                }),
            }),
            metadata: Default::default(),
        };
        vec![intent
            .with_metadata("total_credit", total_credit)
            .with_metadata("iv_percentile", iv_percentile)]
    }
}
