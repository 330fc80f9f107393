//! OHLCV bar type.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::micros;

/// A timestamped OHLCV bar for one symbol at one timeframe.
///
/// Immutable once produced by a feed. Prices are micros; volume is in
/// whole shares (fractional vendor volume is truncated at the boundary).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    /// Bar close timestamp, UTC.
    pub ts: DateTime<Utc>,
    pub open_micros: i64,
    pub high_micros: i64,
    pub low_micros: i64,
    pub close_micros: i64,
    pub volume: i64,
}

/// Integrity violations detected on a bar. All are fatal to the loop
/// (corrupted upstream data must halt, not trade).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarIntegrityError {
    NonPositivePrice { field: &'static str, value_micros: i64 },
    HighBelowLow { high_micros: i64, low_micros: i64 },
    NegativeVolume { volume: i64 },
    NonMonotonicTimestamp { prev: DateTime<Utc>, got: DateTime<Utc> },
}

impl std::fmt::Display for BarIntegrityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositivePrice { field, value_micros } => {
                write!(f, "bar integrity: {field} must be > 0, got {value_micros}")
            }
            Self::HighBelowLow { high_micros, low_micros } => {
                write!(f, "bar integrity: high {high_micros} < low {low_micros}")
            }
            Self::NegativeVolume { volume } => {
                write!(f, "bar integrity: volume must be >= 0, got {volume}")
            }
            Self::NonMonotonicTimestamp { prev, got } => {
                write!(f, "bar integrity: timestamp {got} not after {prev}")
            }
        }
    }
}

impl std::error::Error for BarIntegrityError {}

impl Bar {
    pub fn new(
        symbol: impl Into<String>,
        ts: DateTime<Utc>,
        open_micros: i64,
        high_micros: i64,
        low_micros: i64,
        close_micros: i64,
        volume: i64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            ts,
            open_micros,
            high_micros,
            low_micros,
            close_micros,
            volume,
        }
    }

    /// Validate prices and volume. Timestamp monotonicity is checked by the
    /// caller that holds the previous bar (see [`Bar::validate_after`]).
    pub fn validate(&self) -> Result<(), BarIntegrityError> {
        for (field, v) in [
            ("open", self.open_micros),
            ("high", self.high_micros),
            ("low", self.low_micros),
            ("close", self.close_micros),
        ] {
            if v <= 0 {
                return Err(BarIntegrityError::NonPositivePrice {
                    field,
                    value_micros: v,
                });
            }
        }
        if self.high_micros < self.low_micros {
            return Err(BarIntegrityError::HighBelowLow {
                high_micros: self.high_micros,
                low_micros: self.low_micros,
            });
        }
        if self.volume < 0 {
            return Err(BarIntegrityError::NegativeVolume {
                volume: self.volume,
            });
        }
        Ok(())
    }

    /// Validate this bar as the successor of `prev` (same symbol stream).
    pub fn validate_after(&self, prev: &Bar) -> Result<(), BarIntegrityError> {
        self.validate()?;
        if self.ts <= prev.ts {
            return Err(BarIntegrityError::NonMonotonicTimestamp {
                prev: prev.ts,
                got: self.ts,
            });
        }
        Ok(())
    }

    /// UTC trading date of this bar — the daily-rollover key for risk and
    /// hedge counters.
    pub fn trading_date(&self) -> NaiveDate {
        self.ts.date_naive()
    }

    pub fn close_f64(&self) -> f64 {
        micros::to_f64(self.close_micros)
    }

    pub fn high_f64(&self) -> f64 {
        micros::to_f64(self.high_micros)
    }

    pub fn low_f64(&self) -> f64 {
        micros::to_f64(self.low_micros)
    }

    pub fn open_f64(&self) -> f64 {
        micros::to_f64(self.open_micros)
    }

    /// Typical price (H+L+C)/3 in dollars, used by VWAP.
    pub fn typical_f64(&self) -> f64 {
        (self.high_f64() + self.low_f64() + self.close_f64()) / 3.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::micros::MICROS_SCALE;
    use chrono::TimeZone;

    fn bar(ts_secs: i64, close: i64) -> Bar {
        Bar::new(
            "QQQ",
            Utc.timestamp_opt(ts_secs, 0).unwrap(),
            close * MICROS_SCALE,
            (close + 1) * MICROS_SCALE,
            (close - 1) * MICROS_SCALE,
            close * MICROS_SCALE,
            1_000,
        )
    }

    #[test]
    fn valid_bar_passes() {
        assert!(bar(60, 100).validate().is_ok());
    }

    #[test]
    fn zero_price_rejected() {
        let mut b = bar(60, 100);
        b.close_micros = 0;
        assert!(matches!(
            b.validate(),
            Err(BarIntegrityError::NonPositivePrice { field: "close", .. })
        ));
    }

    #[test]
    fn inverted_high_low_rejected() {
        let mut b = bar(60, 100);
        b.high_micros = b.low_micros - 1;
        assert!(matches!(
            b.validate(),
            Err(BarIntegrityError::HighBelowLow { .. })
        ));
    }

    #[test]
    fn non_monotonic_timestamp_rejected() {
        let a = bar(120, 100);
        let b = bar(60, 101);
        assert!(matches!(
            b.validate_after(&a),
            Err(BarIntegrityError::NonMonotonicTimestamp { .. })
        ));
    }

    #[test]
    fn equal_timestamp_rejected() {
        let a = bar(60, 100);
        let b = bar(60, 101);
        assert!(b.validate_after(&a).is_err());
    }

    #[test]
    fn trading_date_is_utc_date() {
        let b = bar(86_400 + 60, 100); // 1970-01-02 00:01:00 UTC
        assert_eq!(
            b.trading_date(),
            NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()
        );
    }
}
