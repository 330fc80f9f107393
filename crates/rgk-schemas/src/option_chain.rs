//! Options-chain data model: contracts, quotes, Greeks.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::micros;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn as_str(self) -> &'static str {
        match self {
            OptionType::Call => "call",
            OptionType::Put => "put",
        }
    }
}

/// A single listed option contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionContract {
    /// Vendor contract symbol (e.g. `QQQ240621C00480000`).
    pub symbol: String,
    pub underlying: String,
    pub option_type: OptionType,
    pub strike_micros: i64,
    pub expiration: NaiveDate,
}

impl OptionContract {
    /// Whole days from `today` to expiration (0 on expiration day,
    /// negative once expired).
    pub fn days_to_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiration - today).num_days()
    }
}

/// NBBO-style quote for one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionQuote {
    pub bid_micros: i64,
    pub ask_micros: i64,
    pub last_micros: i64,
    pub volume: i64,
    pub open_interest: i64,
}

impl OptionQuote {
    pub fn mid_micros(&self) -> i64 {
        (self.bid_micros + self.ask_micros) / 2
    }

    /// Bid/ask spread as a percentage of mid; 100.0 when the quote is
    /// one-sided or crossed (worst case, so hard filters reject it).
    pub fn spread_pct(&self) -> f64 {
        let mid = self.mid_micros();
        if self.bid_micros <= 0 || self.ask_micros <= 0 || mid <= 0 {
            return 100.0;
        }
        micros::to_f64(self.ask_micros - self.bid_micros) / micros::to_f64(mid) * 100.0
    }
}

/// First-order Greeks plus implied volatility.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionGreeks {
    pub delta: f64,
    pub gamma: f64,
    /// Dollar decay per day (negative for long premium).
    pub theta: f64,
    pub vega: f64,
    pub implied_volatility: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::micros::MICROS_SCALE;

    #[test]
    fn dte_counts_whole_days() {
        let c = OptionContract {
            symbol: "QQQ240621C00480000".into(),
            underlying: "QQQ".into(),
            option_type: OptionType::Call,
            strike_micros: 480 * MICROS_SCALE,
            expiration: NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
        };
        let today = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        assert_eq!(c.days_to_expiry(today), 7);
        assert_eq!(c.days_to_expiry(c.expiration), 0);
    }

    #[test]
    fn spread_pct_normal_quote() {
        let q = OptionQuote {
            bid_micros: 1_900_000, // $1.90
            ask_micros: 2_100_000, // $2.10
            last_micros: 2_000_000,
            volume: 500,
            open_interest: 2_000,
        };
        assert_eq!(q.mid_micros(), 2_000_000);
        assert!((q.spread_pct() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn spread_pct_one_sided_quote_is_worst_case() {
        let q = OptionQuote {
            bid_micros: 0,
            ask_micros: 2_100_000,
            last_micros: 0,
            volume: 0,
            open_interest: 0,
        };
        assert_eq!(q.spread_pct(), 100.0);
    }
}
