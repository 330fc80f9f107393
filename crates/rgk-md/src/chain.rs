//! Options-chain capability boundary and the static in-memory provider.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rgk_agents::ChainView;
use rgk_regime::ChainRow;
use rgk_schemas::{OptionContract, OptionGreeks, OptionQuote, OptionType};

#[derive(Debug)]
pub enum ChainError {
    Transport(String),
    Decode(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::Transport(msg) => write!(f, "chain transport error: {msg}"),
            ChainError::Decode(msg) => write!(f, "chain decode error: {msg}"),
        }
    }
}

impl std::error::Error for ChainError {}

/// Options-chain provider contract. Absence of data is `Ok(None)`, not
/// an error — the synthetic pricer covers the gap downstream.
pub trait OptionsChainProvider: Send {
    fn name(&self) -> &'static str;

    fn options_chain(
        &self,
        underlying: &str,
        expiration: Option<NaiveDate>,
        option_type: Option<OptionType>,
    ) -> Result<Vec<OptionContract>, ChainError>;

    fn option_quote(&self, contract_symbol: &str) -> Result<Option<OptionQuote>, ChainError>;

    fn option_greeks(&self, contract_symbol: &str) -> Result<Option<OptionGreeks>, ChainError>;

    /// Percentile rank of `current_iv` for the underlying. Providers
    /// without IV history rank against the current chain's distribution
    /// — a documented proxy, not a true historical percentile.
    fn iv_percentile(
        &self,
        underlying: &str,
        current_iv: f64,
        lookback_days: u32,
    ) -> Result<Option<f64>, ChainError>;
}

/// Assemble the per-bar [`ChainView`] the agents read: resolve quotes
/// and Greeks for every contract, then rank ATM IV. Contracts missing a
/// quote or Greeks are dropped from the view (the selector would reject
/// them anyway).
pub fn assemble_chain_view(
    provider: &dyn OptionsChainProvider,
    underlying: &str,
    spot: f64,
    today: NaiveDate,
) -> Result<Option<ChainView>, ChainError> {
    let contracts = provider.options_chain(underlying, None, None)?;
    if contracts.is_empty() {
        return Ok(None);
    }

    let mut rows: Vec<ChainRow> = Vec::with_capacity(contracts.len());
    for contract in contracts {
        let Some(quote) = provider.option_quote(&contract.symbol)? else {
            continue;
        };
        let Some(greeks) = provider.option_greeks(&contract.symbol)? else {
            continue;
        };
        rows.push((contract, quote, greeks));
    }
    if rows.is_empty() {
        return Ok(None);
    }

    let mut view = ChainView::new(underlying, today, rows, spot, None);
    if view.atm_iv > 0.0 {
        view.iv_percentile = provider.iv_percentile(underlying, view.atm_iv, 252)?;
    }
    Ok(Some(view))
}

/// In-memory provider backed by a fixed set of rows; the chain source
/// for replay sessions and tests.
#[derive(Debug, Default)]
pub struct StaticChainProvider {
    rows: Vec<ChainRow>,
    quotes: BTreeMap<String, OptionQuote>,
    greeks: BTreeMap<String, OptionGreeks>,
    /// Forced percentile; `None` ranks against the chain's IVs.
    pub iv_percentile_override: Option<f64>,
}

impl StaticChainProvider {
    pub fn new(rows: Vec<ChainRow>) -> Self {
        let mut provider = Self::default();
        provider.set_rows(rows);
        provider
    }

    pub fn set_rows(&mut self, rows: Vec<ChainRow>) {
        self.quotes = rows
            .iter()
            .map(|(c, q, _)| (c.symbol.clone(), q.clone()))
            .collect();
        self.greeks = rows
            .iter()
            .map(|(c, _, g)| (c.symbol.clone(), *g))
            .collect();
        self.rows = rows;
    }
}

impl OptionsChainProvider for StaticChainProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    fn options_chain(
        &self,
        underlying: &str,
        expiration: Option<NaiveDate>,
        option_type: Option<OptionType>,
    ) -> Result<Vec<OptionContract>, ChainError> {
        Ok(self
            .rows
            .iter()
            .map(|(c, _, _)| c.clone())
            .filter(|c| c.underlying == underlying)
            .filter(|c| expiration.map(|e| c.expiration == e).unwrap_or(true))
            .filter(|c| option_type.map(|t| c.option_type == t).unwrap_or(true))
            .collect())
    }

    fn option_quote(&self, contract_symbol: &str) -> Result<Option<OptionQuote>, ChainError> {
        Ok(self.quotes.get(contract_symbol).cloned())
    }

    fn option_greeks(&self, contract_symbol: &str) -> Result<Option<OptionGreeks>, ChainError> {
        Ok(self.greeks.get(contract_symbol).copied())
    }

    fn iv_percentile(
        &self,
        _underlying: &str,
        current_iv: f64,
        _lookback_days: u32,
    ) -> Result<Option<f64>, ChainError> {
        if let Some(forced) = self.iv_percentile_override {
            return Ok(Some(forced));
        }
        let ivs: Vec<f64> = self
            .greeks
            .values()
            .map(|g| g.implied_volatility)
            .filter(|iv| *iv > 0.0)
            .collect();
        if ivs.is_empty() {
            return Ok(None);
        }
        let below = ivs.iter().filter(|&&iv| iv < current_iv).count();
        Ok(Some(below as f64 / ivs.len() as f64 * 100.0))
    }
}
