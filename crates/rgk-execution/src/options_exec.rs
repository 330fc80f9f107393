//! Multi-leg and single-leg options execution.
//!
//! Entry submits two independent limit leg orders, records each as a
//! [`LegFill`], and verifies realized credit/debit against the agent's
//! expectation (10% tolerance, warning only). Sim-only structures are
//! recorded with synthesized fills and never touch the broker.

use chrono::{DateTime, Utc};
use rgk_agents::{MultiLegPlan, MultiLegStrategy, SingleLegPlan};
use rgk_options::{
    LegFill, LegStatus, LegType, MultiLegPosition, MultiLegType, OptionLeg, PositionDirection,
};
use rgk_regime::{RegimeType, VolatilityLevel};
use rgk_schemas::{micros, OptionGreeks, OrderSide, OrderStatus, OrderType, TimeInForce};
use tracing::warn;

use crate::broker::{OptionsBroker, OptionsOrderRequest};
use crate::stock::ExecError;

/// Fractional deviation between expected and realized premium that
/// triggers a warning (never a failure).
pub const PREMIUM_TOLERANCE: f64 = 0.10;

/// Per-leg quote and Greeks the runtime resolved for this bar.
#[derive(Debug, Clone, Copy)]
pub struct LegQuote {
    /// Limit price for the leg order (bid for short, ask for long).
    pub price_micros: i64,
    pub greeks: OptionGreeks,
}

/// Everything needed to open a structure, beyond the plan itself.
#[derive(Debug, Clone)]
pub struct MultiLegEntryContext {
    pub underlying: String,
    pub direction: PositionDirection,
    pub contracts: i64,
    pub call: LegQuote,
    pub put: LegQuote,
    pub underlying_price_micros: i64,
    pub ts: DateTime<Utc>,
    pub entry_bar: u64,
    pub regime: Option<RegimeType>,
    pub volatility: Option<VolatilityLevel>,
}

/// Result of an entry: the position (legs possibly already filled) and
/// an optional premium-mismatch warning.
#[derive(Debug, Clone)]
pub struct MultiLegEntry {
    pub position: MultiLegPosition,
    pub premium_warning: Option<String>,
}

fn leg(
    plan_symbol: &str,
    strike_micros: i64,
    quote: &LegQuote,
    signed_contracts: i64,
) -> OptionLeg {
    OptionLeg {
        contract_symbol: plan_symbol.to_string(),
        strike_micros,
        quantity: signed_contracts,
        entry_price_micros: quote.price_micros,
        current_price_micros: quote.price_micros,
        delta: quote.greeks.delta,
        gamma: quote.greeks.gamma,
        theta: quote.greeks.theta,
        vega: quote.greeks.vega,
        iv: quote.greeks.implied_volatility,
    }
}

/// Open a straddle/strangle per the plan. Both leg orders are limit at
/// the resolved quote; with an immediate-fill adapter (paper) the
/// returned position already has `both_legs_filled() == true`.
pub fn enter_multi_leg(
    broker: &mut dyn OptionsBroker,
    plan: &MultiLegPlan,
    ctx: &MultiLegEntryContext,
) -> Result<MultiLegEntry, ExecError> {
    let multi_leg_id = format!(
        "{}-{}-{}",
        ctx.underlying,
        match plan.strategy {
            MultiLegStrategy::ThetaHarvester => "theta",
            MultiLegStrategy::GammaScalper => "gamma",
        },
        ctx.entry_bar
    );
    let trade_type = match plan.strategy {
        MultiLegStrategy::ThetaHarvester => MultiLegType::Straddle,
        MultiLegStrategy::GammaScalper => MultiLegType::Strangle,
    };
    let signed_contracts = ctx.contracts * ctx.direction.sign();
    let opening_side = match ctx.direction {
        PositionDirection::Long => OrderSide::Buy,
        PositionDirection::Short => OrderSide::Sell,
    };

    let mut submit_leg = |leg_type: LegType,
                          contract_symbol: &str,
                          strike_micros: i64,
                          quote: &LegQuote|
     -> Result<LegFill, ExecError> {
        if plan.sim_only {
            return Ok(LegFill {
                leg_type,
                contract_symbol: contract_symbol.to_string(),
                strike_micros,
                quantity: ctx.contracts,
                fill_price_micros: quote.price_micros,
                fill_time: Some(ctx.ts),
                order_id: format!("sim:{multi_leg_id}:{}", leg_label(leg_type)),
                status: LegStatus::Filled,
            });
        }

        let req = OptionsOrderRequest {
            contract_symbol: contract_symbol.to_string(),
            side: opening_side,
            contracts: ctx.contracts,
            order_type: OrderType::Limit,
            limit_price_micros: Some(quote.price_micros),
            time_in_force: TimeInForce::Day,
            ts: ctx.ts,
        };
        let order = broker.submit_options_order(&req)?;
        let mut fill = LegFill::pending(
            leg_type,
            contract_symbol,
            strike_micros,
            ctx.contracts,
            order.order_id.clone(),
        );
        if matches!(order.status, OrderStatus::Filled | OrderStatus::PartiallyFilled) {
            fill.fill_price_micros = order.filled_price_micros.unwrap_or(quote.price_micros);
            fill.fill_time = Some(order.filled_at.unwrap_or(ctx.ts));
            fill.status = LegStatus::Filled;
        }
        Ok(fill)
    };

    let call_fill = submit_leg(
        LegType::Call,
        &plan.call_symbol,
        plan.call_strike_micros,
        &ctx.call,
    )?;
    let put_fill = submit_leg(
        LegType::Put,
        &plan.put_symbol,
        plan.put_strike_micros,
        &ctx.put,
    )?;

    let position = MultiLegPosition {
        multi_leg_id,
        underlying: ctx.underlying.clone(),
        strategy: plan.strategy,
        trade_type,
        direction: ctx.direction,
        call: leg(
            &plan.call_symbol,
            plan.call_strike_micros,
            &ctx.call,
            signed_contracts,
        ),
        put: leg(
            &plan.put_symbol,
            plan.put_strike_micros,
            &ctx.put,
            signed_contracts,
        ),
        expiration: plan.expiration,
        entry_time: ctx.ts,
        entry_bar: ctx.entry_bar,
        underlying_price_micros: ctx.underlying_price_micros,
        call_fill,
        put_fill,
        entry_iv: plan.entry_iv,
        iv_percentile_at_entry: plan.iv_percentile,
        entry_gex_strength: plan.entry_gex_strength,
        sim_only: plan.sim_only,
        regime_at_entry: ctx.regime,
        vol_at_entry: ctx.volatility,
    };

    let premium_warning = verify_premium(plan, &position);
    if let Some(ref msg) = premium_warning {
        warn!(target: "rgk::execution", "{msg}");
    }

    Ok(MultiLegEntry {
        position,
        premium_warning,
    })
}

fn leg_label(leg_type: LegType) -> &'static str {
    match leg_type {
        LegType::Call => "call",
        LegType::Put => "put",
    }
}

/// Compare realized per-structure premium against the plan's expected
/// value; a deviation beyond the tolerance produces a warning string.
fn verify_premium(plan: &MultiLegPlan, position: &MultiLegPosition) -> Option<String> {
    if !position.both_legs_filled() || plan.expected_premium_micros <= 0 {
        return None;
    }
    let realized = position.call_fill.fill_price_micros + position.put_fill.fill_price_micros;
    let expected = plan.expected_premium_micros;
    let deviation = (realized - expected).abs() as f64 / expected as f64;
    if deviation > PREMIUM_TOLERANCE {
        Some(format!(
            "{}: realized premium {} deviates {:.1}% from expected {}",
            position.multi_leg_id,
            micros::to_f64(realized),
            deviation * 100.0,
            micros::to_f64(expected),
        ))
    } else {
        None
    }
}

/// Close both legs at the current opposite side of the spread
/// (buy-to-close for short structures, sell-to-close for long).
pub fn exit_multi_leg(
    broker: &mut dyn OptionsBroker,
    position: &MultiLegPosition,
    call_exit_price_micros: i64,
    put_exit_price_micros: i64,
    ts: DateTime<Utc>,
) -> Result<(LegFill, LegFill), ExecError> {
    let closing_side = match position.direction {
        PositionDirection::Long => OrderSide::Sell,
        PositionDirection::Short => OrderSide::Buy,
    };

    let mut close_leg = |leg_type: LegType,
                         contract_symbol: &str,
                         strike_micros: i64,
                         price_micros: i64|
     -> Result<LegFill, ExecError> {
        let contracts = match leg_type {
            LegType::Call => position.call.quantity.abs(),
            LegType::Put => position.put.quantity.abs(),
        };
        if position.sim_only {
            return Ok(LegFill {
                leg_type,
                contract_symbol: contract_symbol.to_string(),
                strike_micros,
                quantity: contracts,
                fill_price_micros: price_micros,
                fill_time: Some(ts),
                order_id: format!(
                    "sim:{}:{}-close",
                    position.multi_leg_id,
                    leg_label(leg_type)
                ),
                status: LegStatus::Filled,
            });
        }
        let req = OptionsOrderRequest {
            contract_symbol: contract_symbol.to_string(),
            side: closing_side,
            contracts,
            order_type: OrderType::Limit,
            limit_price_micros: Some(price_micros),
            time_in_force: TimeInForce::Day,
            ts,
        };
        let order = broker.submit_options_order(&req)?;
        Ok(LegFill {
            leg_type,
            contract_symbol: contract_symbol.to_string(),
            strike_micros,
            quantity: contracts,
            fill_price_micros: order.filled_price_micros.unwrap_or(price_micros),
            fill_time: Some(order.filled_at.unwrap_or(ts)),
            order_id: order.order_id,
            status: LegStatus::Filled,
        })
    };

    let call_exit = close_leg(
        LegType::Call,
        &position.call.contract_symbol,
        position.call.strike_micros,
        call_exit_price_micros,
    )?;
    let put_exit = close_leg(
        LegType::Put,
        &position.put.contract_symbol,
        position.put.strike_micros,
        put_exit_price_micros,
    )?;
    Ok((call_exit, put_exit))
}

/// Result of a single-leg entry submission.
#[derive(Debug, Clone)]
pub struct SingleLegExecution {
    pub order_id: String,
    pub fill_price_micros: i64,
    pub contracts: i64,
}

/// Buy a single contract position per the plan (limit at the plan's
/// price).
pub fn enter_single_leg(
    broker: &mut dyn OptionsBroker,
    plan: &SingleLegPlan,
    contracts: i64,
    ts: DateTime<Utc>,
) -> Result<SingleLegExecution, ExecError> {
    let req = OptionsOrderRequest {
        contract_symbol: plan.contract_symbol.clone(),
        side: OrderSide::Buy,
        contracts,
        order_type: OrderType::Limit,
        limit_price_micros: Some(plan.limit_price_micros),
        time_in_force: TimeInForce::Day,
        ts,
    };
    let order = broker.submit_options_order(&req)?;
    match order.filled_price_micros {
        Some(price) => Ok(SingleLegExecution {
            order_id: order.order_id,
            fill_price_micros: price,
            contracts: order.filled_quantity,
        }),
        None => Err(ExecError::NoFill {
            order_id: order.order_id,
        }),
    }
}

/// Sell-to-close a single-leg position.
pub fn exit_single_leg(
    broker: &mut dyn OptionsBroker,
    contract_symbol: &str,
    contracts: i64,
    limit_price_micros: i64,
    ts: DateTime<Utc>,
) -> Result<SingleLegExecution, ExecError> {
    let req = OptionsOrderRequest {
        contract_symbol: contract_symbol.to_string(),
        side: OrderSide::Sell,
        contracts,
        order_type: OrderType::Limit,
        limit_price_micros: Some(limit_price_micros),
        time_in_force: TimeInForce::Day,
        ts,
    };
    let order = broker.submit_options_order(&req)?;
    match order.filled_price_micros {
        Some(price) => Ok(SingleLegExecution {
            order_id: order.order_id,
            fill_price_micros: price,
            contracts: order.filled_quantity,
        }),
        None => Err(ExecError::NoFill {
            order_id: order.order_id,
        }),
    }
}
