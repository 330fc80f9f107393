//! The bar-driven engine core.
//!
//! One `Engine` instance owns every mutable component — portfolio,
//! options book, hedge manager, weights, memory, risk state — and runs
//! the per-bar pipeline synchronously. The async shell in
//! [`crate::scheduler`] supplies the replay clock, the command channel,
//! and snapshot publication; nothing in this module suspends.
//!
//! Determinism: all timestamps come from bars, all iteration is in
//! config symbol order or `BTreeMap` order, and no randomness exists
//! anywhere in the pipeline. Two engines fed the same bars under the
//! same config produce identical trade logs, weights, and checkpoints.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rgk_agents::{
    Agent, ChainView, InstrumentType, MarketState, MultiLegPlan, OptionPlan, TradeIntent,
};
use rgk_audit::{EventLogger, Severity};
use rgk_config::{EngineConfig, EngineMode};
use rgk_execution::{
    enter_multi_leg, enter_single_leg, execute_stock_delta, exit_multi_leg, LegQuote,
    MultiLegEntryContext, OptionsBroker,
};
use rgk_features::FeatureEngine;
use rgk_hedge::DeltaHedgeManager;
use rgk_md::{assemble_chain_view, DataFeed, FeedError, OptionsChainProvider};
use rgk_options::{
    pricing, ExitInputs, MultiLegPosition, MultiLegProfitManager, OptionPosition, OptionsPortfolio,
    PositionDirection, CONTRACT_MULTIPLIER,
};
use rgk_policy::{
    reconcile, FinalTradeIntent, PolicyAdaptor, RollingMemoryStore, TradeOutcome,
};
use rgk_portfolio::{FillContext, PortfolioManager, Trade};
use rgk_regime::{calculate_gex_proxy, classify, RegimeSignal, VolatilityLevel};
use rgk_risk::{self as risk, GateDecision, RiskConfig, RiskState};
use rgk_schemas::{micros, Bar, OptionGreeks, OptionType};
use rgk_state::Checkpoint;
use tracing::{debug, error, info, warn};

use crate::status::{EngineSnapshot, LoopState, RiskStatus};

/// Outcome of one round-robin pass over all symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// At least one bar was processed.
    Processed { bars: usize },
    /// Every symbol missed this pass.
    AllMissed,
    /// Offline feed is exhausted; the session is complete.
    EndOfData,
    /// Fatal condition; the engine is in the error state.
    Fatal,
}

#[derive(Debug)]
pub enum EngineError {
    Config(rgk_config::ConfigError),
    Feed(FeedError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Config(e) => write!(f, "engine config error: {e}"),
            EngineError::Feed(e) => write!(f, "engine feed error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Per-symbol pipeline state.
struct SymbolState {
    features: FeatureEngine,
    prev_signal: Option<RegimeSignal>,
    last_close_micros: i64,
    consecutive_misses: u32,
}

pub struct Engine {
    config: EngineConfig,
    risk_config: RiskConfig,

    feed: Box<dyn DataFeed>,
    broker: Box<dyn OptionsBroker>,
    chain: Option<Box<dyn OptionsChainProvider>>,

    symbols: Vec<String>,
    symbol_state: BTreeMap<String, SymbolState>,
    federation: BTreeMap<String, Vec<Agent>>,
    /// Agents that panicked this run; excluded until restart.
    quarantined_agents: BTreeMap<String, Vec<String>>,

    adaptor: PolicyAdaptor,
    memory: RollingMemoryStore,
    risk_state: RiskState,
    portfolio: PortfolioManager,
    options: OptionsPortfolio,
    profit: MultiLegProfitManager,
    hedge: DeltaHedgeManager,
    events: EventLogger,

    bar_count: u64,
    bars_per_symbol: BTreeMap<String, u64>,
    last_bar_time: Option<DateTime<Utc>>,
    consecutive_all_misses: u32,

    state: LoopState,
    error_message: Option<String>,
    stop_reason: Option<String>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        mut feed: Box<dyn DataFeed>,
        broker: Box<dyn OptionsBroker>,
        chain: Option<Box<dyn OptionsChainProvider>>,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::Config)?;

        feed.connect().map_err(EngineError::Feed)?;
        feed.subscribe(&config.symbols, config.features.lookback)
            .map_err(EngineError::Feed)?;

        let events = match EventLogger::new(config.event_log_path.as_ref()) {
            Ok(logger) => logger,
            Err(e) => {
                // Event log trouble must not block startup.
                warn!(target: "rgk::engine", "event log unavailable: {e:#}");
                EventLogger::in_memory()
            }
        };

        let symbols = config.symbols.clone();
        let mut symbol_state = BTreeMap::new();
        let mut federation = BTreeMap::new();
        for symbol in &symbols {
            symbol_state.insert(
                symbol.clone(),
                SymbolState {
                    features: FeatureEngine::new(config.features.clone()),
                    prev_signal: None,
                    last_close_micros: 0,
                    consecutive_misses: 0,
                },
            );
            federation.insert(symbol.clone(), Agent::default_federation(symbol));
        }

        let agent_names: Vec<String> = federation
            .values()
            .flatten()
            .map(|a| a.name().to_string())
            .collect();

        let initial_capital = config.initial_capital_micros();
        let risk_config = config.resolved_risk();

        Ok(Self {
            adaptor: PolicyAdaptor::new(config.adaptor.clone(), &agent_names),
            memory: RollingMemoryStore::new(config.memory.clone()),
            risk_state: RiskState::new(initial_capital),
            portfolio: PortfolioManager::new(initial_capital),
            options: OptionsPortfolio::new(),
            profit: MultiLegProfitManager::new(config.profit.clone()),
            hedge: DeltaHedgeManager::new(config.hedge.clone()),
            events,
            risk_config,
            feed,
            broker,
            chain,
            symbols,
            symbol_state,
            federation,
            quarantined_agents: BTreeMap::new(),
            bar_count: 0,
            bars_per_symbol: BTreeMap::new(),
            last_bar_time: None,
            consecutive_all_misses: 0,
            state: LoopState::Idle,
            error_message: None,
            stop_reason: None,
            config,
        })
    }

    // -- lifecycle ----------------------------------------------------------

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn start(&mut self) -> Result<(), String> {
        if !self.state.can_transition_to(LoopState::Running) {
            return Err(format!("cannot start from {:?}", self.state));
        }
        self.state = LoopState::Running;
        info!(target: "rgk::engine", mode = ?self.config.mode, symbols = ?self.symbols, "engine started");
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.state == LoopState::Running {
            self.state = LoopState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == LoopState::Paused {
            self.state = LoopState::Running;
        }
    }

    pub fn engage_kill_switch(&mut self) {
        self.risk_state.kill_switch_engaged = true;
        self.events.log_risk_event(
            self.last_bar_time.unwrap_or_else(Utc::now),
            "kill_switch",
            "manually engaged",
            1.0,
            1.0,
            "halted",
            Severity::Critical,
        );
    }

    pub fn disengage_kill_switch(&mut self) {
        self.risk_state.kill_switch_engaged = false;
    }

    /// Drain the loop: persist state, close the feed, land in `Stopped`.
    pub fn stop(&mut self, reason: &str) {
        if matches!(self.state, LoopState::Stopped) {
            return;
        }
        self.state = LoopState::Stopping;
        self.persist_checkpoint();
        self.feed.close();
        self.stop_reason = Some(reason.to_string());
        self.state = LoopState::Stopped;
        info!(target: "rgk::engine", reason, "engine stopped");
    }

    fn fatal(&mut self, message: String) {
        error!(target: "rgk::engine", "{message}");
        self.error_message = Some(message);
        self.persist_checkpoint();
        self.state = LoopState::Error;
    }

    // -- bar loop -----------------------------------------------------------

    /// One round-robin pass: poll each symbol once, processing whatever
    /// bars arrive.
    pub fn step(&mut self) -> StepOutcome {
        if self.state != LoopState::Running {
            return StepOutcome::AllMissed;
        }

        let timeout = Duration::from_secs_f64(self.config.feed_timeout_secs);
        let symbols = self.symbols.clone();
        let mut processed = 0usize;

        for symbol in &symbols {
            match self.feed.next_bar(symbol, timeout) {
                Ok(Some(bar)) => {
                    if let Some(st) = self.symbol_state.get_mut(symbol) {
                        st.consecutive_misses = 0;
                    }
                    self.process_bar(bar);
                    processed += 1;
                    if self.state == LoopState::Error {
                        return StepOutcome::Fatal;
                    }
                }
                Ok(None) => {
                    // Timeout is not an error; note it and move on.
                    let misses = {
                        let st = self.symbol_state.get_mut(symbol);
                        match st {
                            Some(st) => {
                                st.consecutive_misses += 1;
                                st.consecutive_misses
                            }
                            None => 0,
                        }
                    };
                    debug!(target: "rgk::engine", %symbol, misses, "feed timeout");
                    self.events.log_risk_event(
                        self.last_bar_time.unwrap_or_else(Utc::now),
                        "feed_timeout",
                        &format!("no bar for {symbol}"),
                        misses as f64,
                        self.config.max_consecutive_feed_failures as f64,
                        "skipped",
                        Severity::Info,
                    );
                }
                Err(FeedError::Integrity(e)) => {
                    self.fatal(format!("bar integrity failure on {symbol}: {e}"));
                    return StepOutcome::Fatal;
                }
                Err(e) => {
                    warn!(target: "rgk::engine", %symbol, "feed error: {e}");
                    if let Some(st) = self.symbol_state.get_mut(symbol) {
                        st.consecutive_misses += 1;
                    }
                }
            }
        }

        if processed > 0 {
            self.consecutive_all_misses = 0;
            return StepOutcome::Processed { bars: processed };
        }

        self.consecutive_all_misses += 1;
        if self.consecutive_all_misses >= self.config.max_consecutive_feed_failures {
            return match self.config.mode {
                // Offline: an exhausted feed is the natural end.
                EngineMode::Offline => StepOutcome::EndOfData,
                EngineMode::Live => {
                    self.fatal(format!(
                        "no bars on any symbol for {} consecutive passes",
                        self.consecutive_all_misses
                    ));
                    StepOutcome::Fatal
                }
            };
        }
        StepOutcome::AllMissed
    }

    /// Run offline until the feed is exhausted or a fatal error lands.
    /// Used by tests and the CLI replay path (no clock pacing).
    pub fn run_to_completion(&mut self) -> LoopState {
        if self.state == LoopState::Idle {
            let _ = self.start();
        }
        loop {
            if self.state != LoopState::Running {
                return self.state;
            }
            match self.step() {
                StepOutcome::Processed { .. } | StepOutcome::AllMissed => continue,
                StepOutcome::EndOfData => {
                    self.stop("end of data");
                    return self.state;
                }
                StepOutcome::Fatal => return self.state,
            }
        }
    }

    // -- pipeline -----------------------------------------------------------

    fn process_bar(&mut self, bar: Bar) {
        let symbol = bar.symbol.clone();
        let ts = bar.ts;
        let day = bar.trading_date();

        self.bar_count += 1;
        *self.bars_per_symbol.entry(symbol.clone()).or_insert(0) += 1;
        self.last_bar_time = Some(ts);

        // 1-2. Window append + feature computation.
        let features = {
            let Some(st) = self.symbol_state.get_mut(&symbol) else {
                return;
            };
            st.last_close_micros = bar.close_micros;
            st.features.on_bar(bar)
        };

        // 3-4. Chain snapshot + microstructure.
        let chain_view = self.assemble_chain(&symbol, features.close, day);
        let gex = chain_view
            .as_ref()
            .map(|v| calculate_gex_proxy(&v.rows, features.close))
            .unwrap_or_default();

        // 5. Regime classification (window gate: below the minimum the
        // signal is forced invalid and agents stay silent).
        let prev = self
            .symbol_state
            .get(&symbol)
            .and_then(|st| st.prev_signal.clone());
        let mut signal = classify(&self.config.classifier, &features, gex, prev.as_ref());
        if features.sample_size < self.config.minimum_bars_required() {
            signal.is_valid = false;
        }

        if let Some(ref p) = prev {
            if p.is_valid && signal.is_valid && p.regime_type != signal.regime_type {
                self.events.log_regime_flip(
                    ts,
                    p.regime_type.as_str(),
                    signal.regime_type.as_str(),
                    signal.confidence,
                    self.bar_count,
                );
            }
        }
        if let Some(st) = self.symbol_state.get_mut(&symbol) {
            st.prev_signal = Some(signal.clone());
        }

        // Risk maintenance against marked equity.
        let equity = self.total_equity_micros();
        risk::tick(&self.risk_config, &mut self.risk_state, equity, day);

        // 6. Agent evaluation (panic-isolated).
        let intents = self.evaluate_agents(&symbol, &signal, &features, chain_view.as_ref());

        // 7. Meta-policy arbitration.
        let final_intent = reconcile(
            &self.config.controller,
            &intents,
            &signal,
            self.adaptor.tables(),
        );

        // 8-10. Risk gate + execution + reconciliation.
        if final_intent.is_valid {
            self.execute_final_intent(&final_intent, &signal, &features, chain_view.as_ref(), ts);
        } else if !intents.is_empty() {
            self.events
                .log_no_trade(ts, &final_intent.reason, signal.confidence, 0.0);
        }

        // 11. Multi-leg marks, Greeks, delta hedging.
        self.update_multi_leg_positions(&symbol, chain_view.as_ref(), day, ts);
        self.run_delta_hedging(&symbol, ts, day);

        // 12. Profit-take / stop-loss exits.
        self.run_profit_exits(&symbol, &signal, chain_view.as_ref(), day, ts);

        // Expired single legs settle at intrinsic.
        self.settle_expired_single_legs(day, ts);

        // Orphan hedge guard.
        self.flatten_orphan_hedges(ts);

        // Equity point for this bar.
        let marks = self.mark_map();
        let external = self.external_value_micros();
        self.portfolio.record_equity_with(ts, &marks, external);

        // 14. Periodic checkpoint.
        if self.config.checkpoint_every_bars > 0
            && self.bar_count % self.config.checkpoint_every_bars == 0
        {
            self.persist_checkpoint();
        }
    }

    fn evaluate_agents(
        &mut self,
        symbol: &str,
        signal: &RegimeSignal,
        features: &rgk_features::FeatureSet,
        chain: Option<&ChainView>,
    ) -> Vec<TradeIntent> {
        let state = MarketState {
            features,
            chain,
            supports_short_multi_leg: self.broker.supports_short_multi_leg(),
        };
        let quarantined = self
            .quarantined_agents
            .get(symbol)
            .cloned()
            .unwrap_or_default();

        let mut intents = Vec::new();
        let mut newly_quarantined = Vec::new();
        if let Some(agents) = self.federation.get(symbol) {
            for agent in agents {
                if quarantined.iter().any(|n| n == agent.name()) {
                    continue;
                }
                match catch_unwind(AssertUnwindSafe(|| agent.evaluate(signal, &state))) {
                    Ok(mut out) => intents.append(&mut out),
                    Err(_) => {
                        error!(
                            target: "rgk::engine",
                            agent = agent.name(),
                            symbol,
                            "agent panicked; quarantined for the rest of the run"
                        );
                        newly_quarantined.push(agent.name().to_string());
                    }
                }
            }
        }
        if !newly_quarantined.is_empty() {
            self.quarantined_agents
                .entry(symbol.to_string())
                .or_default()
                .extend(newly_quarantined);
        }
        intents
    }

    // -- execution paths ----------------------------------------------------

    fn execute_final_intent(
        &mut self,
        intent: &FinalTradeIntent,
        signal: &RegimeSignal,
        features: &rgk_features::FeatureSet,
        chain: Option<&ChainView>,
        ts: DateTime<Utc>,
    ) {
        match intent.instrument_type {
            InstrumentType::Stock => self.execute_stock_intent(intent, signal, features, ts),
            InstrumentType::Option => {
                self.execute_option_intent(intent, signal, features, chain, ts)
            }
        }
    }

    fn execute_stock_intent(
        &mut self,
        intent: &FinalTradeIntent,
        signal: &RegimeSignal,
        features: &rgk_features::FeatureSet,
        ts: DateTime<Utc>,
    ) {
        let price_micros = micros::from_f64(features.close);
        let decision = risk::gate_stock(
            &self.risk_config,
            &mut self.risk_state,
            intent.position_delta,
            intent.confidence,
            price_micros,
            signal.regime_type,
            signal.volatility_level,
            self.bar_count,
            self.portfolio.qty_signed(&intent.symbol),
        );
        if !decision.allowed {
            self.log_veto(&decision, intent, signal, ts);
            return;
        }

        match execute_stock_delta(
            self.broker.as_mut(),
            &intent.symbol,
            decision.sized_qty,
            price_micros,
            ts,
        ) {
            Ok(fill) => {
                let ctx = FillContext {
                    ts,
                    reason: intent.reason.clone(),
                    agent: intent.primary_agent.clone(),
                    regime: Some(signal.regime_type),
                    volatility: Some(signal.volatility_level),
                };
                if let Some(trade) = self.portfolio.reconcile(&fill, &ctx) {
                    self.settle_closed_trade(&trade, ts);
                }
            }
            Err(e) => {
                // Broker rejection: risk event, portfolio untouched.
                self.events.log_risk_event(
                    ts,
                    "broker_rejection",
                    &e.to_string(),
                    0.0,
                    0.0,
                    "skipped",
                    Severity::Warning,
                );
            }
        }
    }

    fn execute_option_intent(
        &mut self,
        intent: &FinalTradeIntent,
        signal: &RegimeSignal,
        features: &rgk_features::FeatureSet,
        chain: Option<&ChainView>,
        ts: DateTime<Utc>,
    ) {
        // Option sizing was bounded by the emitting agent; the gate
        // applies the veto layers only.
        if let Err(veto) = risk::can_trade(
            &self.risk_config,
            &mut self.risk_state,
            intent.confidence,
            self.bar_count,
        ) {
            self.log_veto(&veto, intent, signal, ts);
            return;
        }
        let contracts = intent.position_delta.abs().round() as i64;
        if contracts == 0 {
            return;
        }
        let Some(option) = intent.option.as_ref() else {
            return;
        };

        match &option.plan {
            OptionPlan::SingleLeg(plan) => {
                match enter_single_leg(self.broker.as_mut(), plan, contracts, ts) {
                    Ok(exec) => {
                        let option_type = match option.option_kind {
                            rgk_agents::OptionKind::Put => OptionType::Put,
                            _ => OptionType::Call,
                        };
                        let debit = exec
                            .fill_price_micros
                            .saturating_mul(exec.contracts)
                            .saturating_mul(CONTRACT_MULTIPLIER);
                        self.portfolio.apply_cash(-debit);
                        self.options.add_position(OptionPosition {
                            underlying: intent.symbol.clone(),
                            contract_symbol: plan.contract_symbol.clone(),
                            option_type,
                            strike_micros: plan.strike_micros,
                            expiration: plan.expiration,
                            quantity: exec.contracts,
                            avg_entry_price_micros: exec.fill_price_micros,
                            entry_time: ts,
                            current_price_micros: exec.fill_price_micros,
                            underlying_price_micros: micros::from_f64(features.close),
                            delta: plan.target_delta,
                            gamma: 0.0,
                            theta: 0.0,
                            vega: 0.0,
                            iv: chain.map(|c| c.atm_iv).unwrap_or(pricing::DEFAULT_IV),
                            regime_at_entry: Some(signal.regime_type),
                            vol_at_entry: Some(signal.volatility_level),
                        });
                    }
                    Err(e) => {
                        self.events.log_risk_event(
                            ts,
                            "broker_rejection",
                            &e.to_string(),
                            0.0,
                            0.0,
                            "skipped",
                            Severity::Warning,
                        );
                    }
                }
            }
            OptionPlan::MultiLeg(plan) => {
                self.enter_multi_leg_structure(intent, plan, signal, features, chain, contracts, ts)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn enter_multi_leg_structure(
        &mut self,
        intent: &FinalTradeIntent,
        plan: &MultiLegPlan,
        signal: &RegimeSignal,
        features: &rgk_features::FeatureSet,
        chain: Option<&ChainView>,
        contracts: i64,
        ts: DateTime<Utc>,
    ) {
        // One open structure per strategy per underlying; a second
        // signal while the first is working is the same signal.
        let already_open = self
            .options
            .multi_leg_positions()
            .values()
            .any(|p| p.underlying == intent.symbol && p.strategy == plan.strategy);
        if already_open {
            return;
        }

        let direction = if intent.position_delta >= 0.0 {
            PositionDirection::Long
        } else {
            PositionDirection::Short
        };

        // Short entries trade at the bid, long at the ask.
        let day = ts.date_naive();
        let Some(call_quote) = self.leg_quote(chain, &plan.call_symbol, plan.call_strike_micros, OptionType::Call, direction, true, features.close, plan.expiration, day) else {
            return;
        };
        let Some(put_quote) = self.leg_quote(chain, &plan.put_symbol, plan.put_strike_micros, OptionType::Put, direction, true, features.close, plan.expiration, day) else {
            return;
        };

        // A broker that cannot carry the short structure forces the
        // sim-only path even if the agent did not flag it.
        let mut plan = plan.clone();
        if direction == PositionDirection::Short && !self.broker.supports_short_multi_leg() {
            plan.sim_only = true;
        }

        let ctx = MultiLegEntryContext {
            underlying: intent.symbol.clone(),
            direction,
            contracts,
            call: call_quote,
            put: put_quote,
            underlying_price_micros: micros::from_f64(features.close),
            ts,
            entry_bar: self.bar_count,
            regime: Some(signal.regime_type),
            volatility: Some(signal.volatility_level),
        };

        match enter_multi_leg(self.broker.as_mut(), &plan, &ctx) {
            Ok(entry) => {
                if let Some(warning) = entry.premium_warning {
                    self.events.log_risk_event(
                        ts,
                        "premium_mismatch",
                        &warning,
                        0.0,
                        0.0,
                        "logged",
                        Severity::Warning,
                    );
                }
                let position = entry.position;
                if position.both_legs_filled() && !position.sim_only {
                    // Credit in, debit out.
                    let premium = position.total_premium_micros();
                    match direction {
                        PositionDirection::Short => self.portfolio.apply_cash(premium),
                        PositionDirection::Long => self.portfolio.apply_cash(-premium),
                    }
                }
                self.profit.track(
                    &position.multi_leg_id,
                    position.strategy,
                    self.bar_count,
                    position.entry_iv,
                    position.entry_gex_strength,
                );
                info!(
                    target: "rgk::engine",
                    id = %position.multi_leg_id,
                    strategy = ?position.strategy,
                    direction = ?position.direction,
                    contracts,
                    sim_only = position.sim_only,
                    "multi-leg structure opened"
                );
                self.options.insert_multi_leg(position);
            }
            Err(e) => {
                self.events.log_risk_event(
                    ts,
                    "broker_rejection",
                    &e.to_string(),
                    0.0,
                    0.0,
                    "skipped",
                    Severity::Warning,
                );
            }
        }
    }

    // -- per-bar position maintenance ---------------------------------------

    fn update_multi_leg_positions(
        &mut self,
        symbol: &str,
        chain: Option<&ChainView>,
        day: chrono::NaiveDate,
        _ts: DateTime<Utc>,
    ) {
        let ids = self.options.active_multi_leg_ids();
        for id in ids {
            let Some(pos) = self.options.multi_leg(&id) else {
                continue;
            };
            if pos.underlying != symbol || !pos.both_legs_filled() {
                continue;
            }
            let underlying_micros = self
                .symbol_state
                .get(symbol)
                .map(|s| s.last_close_micros)
                .unwrap_or(pos.underlying_price_micros);

            let call = self.resolve_mark(
                chain,
                &pos.call.contract_symbol,
                pos.call.strike_micros,
                OptionType::Call,
                pos.call.iv,
                pos.expiration,
                day,
                underlying_micros,
            );
            let put = self.resolve_mark(
                chain,
                &pos.put.contract_symbol,
                pos.put.strike_micros,
                OptionType::Put,
                pos.put.iv,
                pos.expiration,
                day,
                underlying_micros,
            );

            self.options.update_multi_leg(
                &id,
                underlying_micros,
                call.0,
                call.1.delta,
                call.1.theta,
                call.1.implied_volatility,
                put.0,
                put.1.delta,
                put.1.theta,
                put.1.implied_volatility,
            );
        }
    }

    fn run_delta_hedging(&mut self, symbol: &str, ts: DateTime<Utc>, day: chrono::NaiveDate) {
        let price_micros = self
            .symbol_state
            .get(symbol)
            .map(|s| s.last_close_micros)
            .unwrap_or(0);
        if price_micros <= 0 {
            return;
        }

        let candidates: Vec<(String, f64, i64)> = self
            .options
            .multi_leg_positions()
            .values()
            .filter(|p| {
                p.underlying == symbol
                    && p.both_legs_filled()
                    && !p.sim_only
                    // Delta-neutral extraction applies to long premium;
                    // short structures wear their exposure.
                    && p.direction == PositionDirection::Long
            })
            .map(|p| (p.multi_leg_id.clone(), p.net_delta(), p.contracts()))
            .collect();

        for (id, net_delta, contracts) in candidates {
            match self
                .hedge
                .decide(&id, symbol, net_delta, contracts, price_micros, self.bar_count, day)
            {
                Ok(order) => {
                    let signed = order.shares * order.side.sign();
                    match execute_stock_delta(
                        self.broker.as_mut(),
                        symbol,
                        signed,
                        price_micros,
                        ts,
                    ) {
                        Ok(fill) => {
                            let filled_signed = fill.quantity * fill.side.sign();
                            self.hedge.apply_fill(
                                &id,
                                symbol,
                                filled_signed,
                                fill.price_micros,
                                net_delta,
                                self.bar_count,
                            );
                            self.portfolio
                                .apply_cash(-filled_signed.saturating_mul(fill.price_micros));
                            debug!(
                                target: "rgk::engine",
                                id = %id, shares = filled_signed, price = fill.price_micros,
                                "hedge adjusted"
                            );
                        }
                        Err(e) => {
                            self.events.log_risk_event(
                                ts,
                                "hedge_rejection",
                                &e.to_string(),
                                0.0,
                                0.0,
                                "skipped",
                                Severity::Warning,
                            );
                        }
                    }
                }
                Err(_skip) => {}
            }
            self.hedge.update_unrealized(&id, price_micros);
        }
    }

    fn run_profit_exits(
        &mut self,
        symbol: &str,
        signal: &RegimeSignal,
        chain: Option<&ChainView>,
        day: chrono::NaiveDate,
        ts: DateTime<Utc>,
    ) {
        let current_iv = chain.and_then(|c| {
            if c.atm_iv > 0.0 {
                Some(c.atm_iv)
            } else {
                None
            }
        });

        let ids = self.options.active_multi_leg_ids();
        for id in ids {
            let Some(pos) = self.options.multi_leg(&id) else {
                continue;
            };
            if pos.underlying != symbol || !pos.both_legs_filled() {
                continue;
            }

            let inputs = ExitInputs {
                current_pnl_pct: pos.combined_pnl_pct(),
                current_bar: self.bar_count,
                regime_type: signal.regime_type,
                current_iv,
                microstructure: &signal.microstructure,
            };
            let Some(exit_reason) = self.profit.should_exit(&id, &inputs) else {
                continue;
            };

            let pos = pos.clone();
            self.close_multi_leg_structure(&pos, chain, day, ts, &exit_reason.to_string());
        }
    }

    fn close_multi_leg_structure(
        &mut self,
        pos: &MultiLegPosition,
        chain: Option<&ChainView>,
        day: chrono::NaiveDate,
        ts: DateTime<Utc>,
        reason: &str,
    ) {
        // Exits trade the opposite side of the spread from entry.
        let underlying_micros = pos.underlying_price_micros;
        let Some(call_quote) = self.leg_quote(
            chain,
            &pos.call.contract_symbol,
            pos.call.strike_micros,
            OptionType::Call,
            pos.direction,
            false,
            micros::to_f64(underlying_micros),
            pos.expiration,
            day,
        ) else {
            return;
        };
        let Some(put_quote) = self.leg_quote(
            chain,
            &pos.put.contract_symbol,
            pos.put.strike_micros,
            OptionType::Put,
            pos.direction,
            false,
            micros::to_f64(underlying_micros),
            pos.expiration,
            day,
        ) else {
            return;
        };

        match exit_multi_leg(
            self.broker.as_mut(),
            pos,
            call_quote.price_micros,
            put_quote.price_micros,
            ts,
        ) {
            Ok((call_exit, put_exit)) => {
                let contracts = pos.contracts();
                let close_notional = (call_exit.fill_price_micros + put_exit.fill_price_micros)
                    .saturating_mul(contracts)
                    .saturating_mul(CONTRACT_MULTIPLIER);
                if !pos.sim_only {
                    match pos.direction {
                        // Buy-to-close costs cash; sell-to-close raises it.
                        PositionDirection::Short => self.portfolio.apply_cash(-close_notional),
                        PositionDirection::Long => self.portfolio.apply_cash(close_notional),
                    }
                }

                let Some(trade) =
                    self.options
                        .close_multi_leg(&pos.multi_leg_id, call_exit, put_exit, ts, reason)
                else {
                    return;
                };
                self.profit.remove(&pos.multi_leg_id);

                // Flatten any hedge riding on this structure.
                let mut hedge_pnl = 0;
                let mark = self
                    .symbol_state
                    .get(&pos.underlying)
                    .map(|s| s.last_close_micros)
                    .unwrap_or(underlying_micros);
                if let Some((hedge_pos, to_flatten)) = self.hedge.remove(&pos.multi_leg_id, mark) {
                    hedge_pnl = hedge_pos.realized_pnl_micros;
                    if to_flatten != 0 && !pos.sim_only {
                        match execute_stock_delta(
                            self.broker.as_mut(),
                            &pos.underlying,
                            -to_flatten,
                            mark,
                            ts,
                        ) {
                            Ok(fill) => {
                                let signed = fill.quantity * fill.side.sign();
                                self.portfolio
                                    .apply_cash(-signed.saturating_mul(fill.price_micros));
                            }
                            Err(e) => {
                                warn!(target: "rgk::engine", "hedge flatten failed: {e}");
                            }
                        }
                    }
                }

                info!(
                    target: "rgk::engine",
                    id = %trade.multi_leg_id,
                    pnl = trade.combined_pnl_micros,
                    pnl_pct = trade.combined_pnl_pct,
                    hedge_pnl,
                    reason,
                    "multi-leg structure closed"
                );

                if !pos.sim_only {
                    let total_pnl = trade.combined_pnl_micros + hedge_pnl;
                    let agent = match pos.strategy {
                        rgk_agents::MultiLegStrategy::ThetaHarvester => "theta_harvester",
                        rgk_agents::MultiLegStrategy::GammaScalper => "gamma_scalper",
                    };
                    self.record_trade_outcome(
                        agent,
                        total_pnl,
                        pos.regime_at_entry,
                        pos.vol_at_entry,
                        InstrumentType::Option,
                        ts,
                    );
                }
            }
            Err(e) => {
                self.events.log_risk_event(
                    ts,
                    "broker_rejection",
                    &format!("multi-leg exit failed: {e}"),
                    0.0,
                    0.0,
                    "retained",
                    Severity::Warning,
                );
            }
        }
    }

    fn settle_expired_single_legs(&mut self, day: chrono::NaiveDate, ts: DateTime<Utc>) {
        let expired: Vec<OptionPosition> = self
            .options
            .positions()
            .values()
            .filter(|p| p.expiration < day)
            .cloned()
            .collect();
        for pos in expired {
            let intrinsic = pricing::option_price_micros(
                pos.underlying_price_micros,
                pos.strike_micros,
                0.0,
                pos.iv,
                pos.option_type,
            );
            if let Some(trade) = self.options.close_position(
                &pos.contract_symbol,
                intrinsic,
                ts,
                "expired",
                "system",
            ) {
                let proceeds = intrinsic
                    .saturating_mul(trade.quantity)
                    .saturating_mul(CONTRACT_MULTIPLIER);
                self.portfolio.apply_cash(proceeds);
                self.record_trade_outcome(
                    &trade.agent.clone(),
                    trade.pnl_micros,
                    trade.regime_at_entry,
                    trade.vol_at_entry,
                    InstrumentType::Option,
                    ts,
                );
            }
        }
    }

    fn flatten_orphan_hedges(&mut self, ts: DateTime<Utc>) {
        let active: std::collections::BTreeSet<String> =
            self.options.active_multi_leg_ids().into_iter().collect();
        let orphans = self.hedge.check_orphans(&active);
        for id in orphans {
            let Some(hedge_pos) = self.hedge.position(&id) else {
                continue;
            };
            let symbol = hedge_pos.symbol.clone();
            let mark = self
                .symbol_state
                .get(&symbol)
                .map(|s| s.last_close_micros)
                .unwrap_or(hedge_pos.avg_price_micros);
            if let Some((_, to_flatten)) = self.hedge.remove(&id, mark) {
                if to_flatten != 0 {
                    if let Ok(fill) =
                        execute_stock_delta(self.broker.as_mut(), &symbol, -to_flatten, mark, ts)
                    {
                        let signed = fill.quantity * fill.side.sign();
                        self.portfolio
                            .apply_cash(-signed.saturating_mul(fill.price_micros));
                    }
                }
                self.events.log_risk_event(
                    ts,
                    "orphan_hedge",
                    &format!("hedge {id} outlived its structure; flattened"),
                    to_flatten.abs() as f64,
                    0.0,
                    "flattened",
                    Severity::Warning,
                );
            }
        }
    }

    // -- bookkeeping --------------------------------------------------------

    fn settle_closed_trade(&mut self, trade: &Trade, ts: DateTime<Utc>) {
        self.record_trade_outcome(
            &trade.agent.clone(),
            trade.pnl_micros,
            trade.regime_at_entry,
            trade.vol_at_entry,
            InstrumentType::Stock,
            ts,
        );
    }

    fn record_trade_outcome(
        &mut self,
        agent: &str,
        pnl_micros: i64,
        regime: Option<rgk_regime::RegimeType>,
        volatility: Option<VolatilityLevel>,
        instrument: InstrumentType,
        ts: DateTime<Utc>,
    ) {
        risk::record_trade_result(
            &self.risk_config,
            &mut self.risk_state,
            pnl_micros,
            self.bar_count,
        );
        if self.risk_state.circuit_breaker_active {
            self.events.log_risk_event(
                ts,
                "circuit_breaker",
                "loss streak tripped the breaker",
                self.risk_config.max_losses_in_window as f64,
                self.risk_config.max_losses_in_window as f64,
                "halted",
                Severity::Warning,
            );
        }

        let initial = self.portfolio.initial_capital_micros();
        let reward = if initial > 0 {
            micros::to_f64(pnl_micros) / micros::to_f64(initial)
        } else {
            0.0
        };
        self.memory.record_reward(agent, reward);

        let outcome = TradeOutcome {
            agent_name: agent.to_string(),
            regime: regime.unwrap_or(rgk_regime::RegimeType::Neutral),
            volatility: volatility.unwrap_or(VolatilityLevel::Medium),
            instrument,
            reward,
        };
        // Weight updates land after this bar's arbitration consumed the
        // old tables; they influence the next bar onward.
        let changes = self.adaptor.record_trade_outcome(&outcome);
        for change in changes {
            self.events.log_weight_change(
                ts,
                change.table,
                &change.name,
                change.old_weight,
                change.new_weight,
                self.bar_count,
            );
        }

        let history: Vec<f64> = self
            .portfolio
            .trades()
            .iter()
            .map(|t| micros::to_f64(t.pnl_micros))
            .collect();
        self.events
            .log_outlier_pnl(ts, micros::to_f64(pnl_micros), reward * 100.0, &history, 2.0);
    }

    fn log_veto(
        &mut self,
        decision: &GateDecision,
        intent: &FinalTradeIntent,
        signal: &RegimeSignal,
        ts: DateTime<Utc>,
    ) {
        self.events.log_risk_event(
            ts,
            &decision.reason,
            &format!("intent from {} vetoed", intent.primary_agent),
            intent.confidence,
            self.risk_config.min_confidence,
            "vetoed",
            Severity::Info,
        );
        self.events
            .log_no_trade(ts, &decision.reason, signal.confidence, intent.confidence);
    }

    // -- pricing helpers ----------------------------------------------------

    fn assemble_chain(
        &self,
        symbol: &str,
        spot: f64,
        day: chrono::NaiveDate,
    ) -> Option<ChainView> {
        let provider = self.chain.as_deref()?;
        match assemble_chain_view(provider, symbol, spot, day) {
            Ok(view) => view,
            Err(e) => {
                warn!(target: "rgk::engine", symbol, "chain provider error: {e}");
                None
            }
        }
    }

    /// Resolve a leg's order price and Greeks: chain quote when present,
    /// synthetic fallback otherwise. `opening` picks entry-side pricing
    /// (short ⇒ bid, long ⇒ ask); exits take the opposite side.
    #[allow(clippy::too_many_arguments)]
    fn leg_quote(
        &self,
        chain: Option<&ChainView>,
        contract_symbol: &str,
        strike_micros: i64,
        option_type: OptionType,
        direction: PositionDirection,
        opening: bool,
        spot: f64,
        expiration: chrono::NaiveDate,
        day: chrono::NaiveDate,
    ) -> Option<LegQuote> {
        if let Some(view) = chain {
            if let Some((_, quote, greeks)) = view
                .rows
                .iter()
                .find(|(c, _, _)| c.symbol == contract_symbol)
            {
                let sell_side = match (direction, opening) {
                    (PositionDirection::Short, true) => true, // sell to open
                    (PositionDirection::Short, false) => false, // buy to close
                    (PositionDirection::Long, true) => false, // buy to open
                    (PositionDirection::Long, false) => true, // sell to close
                };
                let price = if sell_side {
                    quote.bid_micros
                } else {
                    quote.ask_micros
                };
                if price > 0 {
                    return Some(LegQuote {
                        price_micros: price,
                        greeks: *greeks,
                    });
                }
            }
        }

        // Synthetic degradation path.
        let spot_micros = micros::from_f64(spot);
        if spot_micros <= 0 {
            return None;
        }
        let t_years = pricing::years_from_dte((expiration - day).num_days());
        let iv = pricing::DEFAULT_IV;
        let price = pricing::option_price_micros(spot_micros, strike_micros, t_years, iv, option_type);
        if price <= 0 {
            return None;
        }
        let g = pricing::greeks(spot_micros, strike_micros, t_years, iv, option_type, price);
        Some(LegQuote {
            price_micros: price,
            greeks: OptionGreeks {
                delta: g.delta,
                gamma: g.gamma,
                theta: g.theta,
                vega: g.vega,
                implied_volatility: g.iv,
            },
        })
    }

    /// Mid-mark and Greeks for an open leg (chain first, synthetic
    /// fallback at the leg's own IV).
    #[allow(clippy::too_many_arguments)]
    fn resolve_mark(
        &self,
        chain: Option<&ChainView>,
        contract_symbol: &str,
        strike_micros: i64,
        option_type: OptionType,
        leg_iv: f64,
        expiration: chrono::NaiveDate,
        day: chrono::NaiveDate,
        underlying_micros: i64,
    ) -> (i64, OptionGreeks) {
        if let Some(view) = chain {
            if let Some((_, quote, greeks)) = view
                .rows
                .iter()
                .find(|(c, _, _)| c.symbol == contract_symbol)
            {
                let mid = quote.mid_micros();
                if mid > 0 {
                    return (mid, *greeks);
                }
            }
        }
        let iv = if leg_iv > 0.0 { leg_iv } else { pricing::DEFAULT_IV };
        let t_years = pricing::years_from_dte((expiration - day).num_days());
        let price =
            pricing::option_price_micros(underlying_micros, strike_micros, t_years, iv, option_type);
        let g = pricing::greeks(underlying_micros, strike_micros, t_years, iv, option_type, price);
        (
            price,
            OptionGreeks {
                delta: g.delta,
                gamma: g.gamma,
                theta: g.theta,
                vega: g.vega,
                implied_volatility: g.iv,
            },
        )
    }

    // -- equity & snapshots -------------------------------------------------

    fn mark_map(&self) -> BTreeMap<String, i64> {
        self.symbol_state
            .iter()
            .filter(|(_, st)| st.last_close_micros > 0)
            .map(|(s, st)| (s.clone(), st.last_close_micros))
            .collect()
    }

    /// Market value of the books outside the stock portfolio: options
    /// structures (sim-only excluded) and hedge shares.
    fn external_value_micros(&self) -> i64 {
        let options_mv: i64 = self
            .options
            .multi_leg_positions()
            .values()
            .filter(|p| !p.sim_only && p.both_legs_filled())
            .map(|p| p.market_value_micros())
            .sum::<i64>()
            + self
                .options
                .positions()
                .values()
                .map(|p| p.market_value_micros())
                .sum::<i64>();

        let hedge_mv: i64 = self
            .hedge
            .positions()
            .values()
            .map(|h| {
                let mark = self
                    .symbol_state
                    .get(&h.symbol)
                    .map(|s| s.last_close_micros)
                    .unwrap_or(h.avg_price_micros);
                h.hedge_shares.saturating_mul(mark)
            })
            .sum();

        options_mv + hedge_mv
    }

    /// Equity across all books: stock cash+positions, options, hedges.
    pub fn total_equity_micros(&self) -> i64 {
        self.portfolio
            .equity_micros()
            .saturating_add(self.external_value_micros())
    }

    pub fn portfolio(&self) -> &PortfolioManager {
        &self.portfolio
    }

    pub fn options(&self) -> &OptionsPortfolio {
        &self.options
    }

    pub fn hedge(&self) -> &DeltaHedgeManager {
        &self.hedge
    }

    pub fn weights(&self) -> &rgk_policy::WeightTables {
        self.adaptor.tables()
    }

    pub fn events(&self) -> &EventLogger {
        &self.events
    }

    pub fn bar_count(&self) -> u64 {
        self.bar_count
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        // Any symbol's latest signal serves the regime query; with one
        // symbol this is exact, with several it is the last processed.
        let regime = self
            .symbol_state
            .values()
            .filter_map(|s| s.prev_signal.clone())
            .last();

        let recent_trades: Vec<Trade> = self
            .portfolio
            .trades()
            .iter()
            .rev()
            .take(50)
            .rev()
            .cloned()
            .collect();

        EngineSnapshot {
            state: self.state,
            mode: self.config.mode,
            is_running: matches!(self.state, LoopState::Running | LoopState::Paused),
            is_paused: self.state == LoopState::Paused,
            bar_count: self.bar_count,
            last_bar_time: self.last_bar_time,
            bars_per_symbol: self.bars_per_symbol.clone(),
            error_message: self.error_message.clone(),
            stop_reason: self.stop_reason.clone(),
            regime,
            portfolio: self.portfolio.stats(),
            agent_fitness: self.memory.all().clone(),
            weights: self.adaptor.tables().clone(),
            risk: RiskStatus {
                kill_switch_engaged: self.risk_state.kill_switch_engaged,
                drawdown_pct: self.risk_state.drawdown() * 100.0,
                peak_equity_micros: self.risk_state.peak_equity_micros,
                daily_pnl_micros: self.risk_state.daily_pnl_micros,
                circuit_breaker_active: self.risk_state.circuit_breaker_active,
                circuit_breaker_until_bar: self.risk_state.circuit_breaker_until_bar,
                var_95_micros: risk::value_at_risk_micros(&self.risk_config, &self.risk_state),
            },
            recent_trades,
            multi_leg_positions: self.options.multi_leg_positions().values().cloned().collect(),
            hedge_positions: self.hedge.positions().values().cloned().collect(),
            open_multi_leg_positions: self.options.multi_leg_positions().len(),
            open_hedge_positions: self.hedge.positions().len(),
            closed_multi_leg_trades: self.options.multi_leg_trades().len(),
        }
    }

    // -- persistence --------------------------------------------------------

    pub fn make_checkpoint(&self) -> Checkpoint {
        Checkpoint {
            bar_count: self.bar_count,
            last_bar_time: self.last_bar_time,
            bars_per_symbol: self.bars_per_symbol.clone(),
            portfolio: self.portfolio.clone(),
            options: self.options.clone(),
            hedge: self.hedge.clone(),
            weights: self.adaptor.tables().clone(),
            memory_fitness: self.memory.all().clone(),
            risk_state: self.risk_state.clone(),
            profit_trackers: self.profit.trackers().clone(),
        }
    }

    /// Restore engine state from a checkpoint (before starting).
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.bar_count = checkpoint.bar_count;
        self.last_bar_time = checkpoint.last_bar_time;
        self.bars_per_symbol = checkpoint.bars_per_symbol;
        self.portfolio = checkpoint.portfolio;
        self.options = checkpoint.options;
        self.hedge = checkpoint.hedge;
        self.adaptor = PolicyAdaptor::with_tables(self.config.adaptor.clone(), checkpoint.weights);
        self.memory =
            RollingMemoryStore::with_fitness(self.config.memory.clone(), checkpoint.memory_fitness);
        self.risk_state = checkpoint.risk_state;
        self.profit =
            MultiLegProfitManager::with_trackers(self.config.profit.clone(), checkpoint.profit_trackers);
    }

    fn persist_checkpoint(&mut self) {
        let Some(path) = self.config.checkpoint_path.clone() else {
            return;
        };
        let checkpoint = self.make_checkpoint();
        if let Err(e) = rgk_state::persist(&path, &checkpoint) {
            // Warning only; retried at the next checkpoint interval.
            warn!(target: "rgk::engine", "checkpoint persist failed: {e:#}");
        }
    }

    /// The underlying gate decision for externally injected intents
    /// (testkit hook used by scenario tests).
    pub fn gate_for_test(&mut self, intent: &FinalTradeIntent, signal: &RegimeSignal, price_micros: i64) -> GateDecision {
        risk::gate_stock(
            &self.risk_config,
            &mut self.risk_state,
            intent.position_delta,
            intent.confidence,
            price_micros,
            signal.regime_type,
            signal.volatility_level,
            self.bar_count,
            0,
        )
    }
}
