//! Per-bar options-chain snapshot consumed by agents.
//!
//! The scheduler assembles one `ChainView` per bar from the chain
//! provider (or leaves it absent when no provider is wired). Agents read
//! it; they never perform chain I/O themselves.

use chrono::NaiveDate;
use rgk_regime::ChainRow;
use rgk_schemas::{micros, OptionType};

#[derive(Debug, Clone)]
pub struct ChainView {
    pub underlying: String,
    /// Trading date of the bar the snapshot was taken for.
    pub today: NaiveDate,
    pub rows: Vec<ChainRow>,
    /// IV of the nearest-ATM call, 0.0 when unresolvable.
    pub atm_iv: f64,
    /// Percentile rank of `atm_iv` within this chain's IV distribution
    /// (provider approximation for a historical percentile).
    pub iv_percentile: Option<f64>,
}

impl ChainView {
    pub fn new(
        underlying: impl Into<String>,
        today: NaiveDate,
        rows: Vec<ChainRow>,
        spot: f64,
        iv_percentile: Option<f64>,
    ) -> Self {
        let mut view = Self {
            underlying: underlying.into(),
            today,
            rows,
            atm_iv: 0.0,
            iv_percentile,
        };
        if let Some((_, _, g)) = view.atm_row(OptionType::Call, spot) {
            view.atm_iv = g.implied_volatility;
        }
        view
    }

    pub fn rows_of(&self, option_type: OptionType) -> impl Iterator<Item = &ChainRow> {
        self.rows
            .iter()
            .filter(move |(c, _, _)| c.option_type == option_type)
    }

    /// Nearest-ATM row of the given type: strike within 2% of spot,
    /// closest wins. Ties resolve to the lower strike (stable order).
    pub fn atm_row(&self, option_type: OptionType, spot: f64) -> Option<&ChainRow> {
        if spot <= 0.0 {
            return None;
        }
        self.rows_of(option_type)
            .filter(|(c, _, _)| {
                (micros::to_f64(c.strike_micros) - spot).abs() / spot < 0.02
            })
            .min_by(|(a, _, _), (b, _, _)| {
                let da = (micros::to_f64(a.strike_micros) - spot).abs();
                let db = (micros::to_f64(b.strike_micros) - spot).abs();
                da.partial_cmp(&db)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.strike_micros.cmp(&b.strike_micros))
            })
    }

    /// Row whose delta magnitude is closest to `target_abs_delta`.
    pub fn closest_delta_row(
        &self,
        option_type: OptionType,
        target_abs_delta: f64,
    ) -> Option<&ChainRow> {
        self.rows_of(option_type).min_by(|(_, _, ga), (_, _, gb)| {
            let da = (ga.delta.abs() - target_abs_delta).abs();
            let db = (gb.delta.abs() - target_abs_delta).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}
