//! Fair value gap detection and lifecycle.
//!
//! A fair value gap is a three-bar imbalance: when bar `i-2`'s high sits
//! below bar `i`'s low the middle bar left an unfilled bullish zone
//! (and symmetrically for bearish). The zone stays active until price
//! traverses its midpoint or the gap ages out.

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapType {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fvg {
    pub gap_type: GapType,
    /// Upper bound of the zone in dollars.
    pub upper: f64,
    /// Lower bound of the zone in dollars.
    pub lower: f64,
    /// Bar index (engine-wide counter) at which the gap was created.
    pub created_at_bar: u64,
}

impl Fvg {
    pub fn midpoint(&self) -> f64 {
        (self.upper + self.lower) / 2.0
    }
}

/// Tracks active gaps across bars for one symbol.
#[derive(Debug, Clone, Default)]
pub struct FvgTracker {
    active: Vec<Fvg>,
    max_age_bars: u64,
}

impl FvgTracker {
    pub fn new(max_age_bars: u64) -> Self {
        Self {
            active: Vec::new(),
            max_age_bars,
        }
    }

    /// Process one bar: detect a new gap from the last three bars
    /// (`highs`/`lows` oldest-first, length >= 3 to detect), retire gaps
    /// whose midpoint the close traversed, and age out stale gaps.
    pub fn on_bar(
        &mut self,
        bar_index: u64,
        prev2_high: Option<f64>,
        prev2_low: Option<f64>,
        cur_high: f64,
        cur_low: f64,
        close: f64,
    ) {
        // Retire filled gaps: price crossing the midpoint consumes the zone.
        self.active.retain(|g| match g.gap_type {
            GapType::Bullish => close > g.midpoint(),
            GapType::Bearish => close < g.midpoint(),
        });

        // Age out.
        let max_age = self.max_age_bars;
        self.active
            .retain(|g| bar_index.saturating_sub(g.created_at_bar) < max_age);

        // Detect.
        if let (Some(p2h), Some(p2l)) = (prev2_high, prev2_low) {
            if cur_low > p2h {
                self.active.push(Fvg {
                    gap_type: GapType::Bullish,
                    upper: cur_low,
                    lower: p2h,
                    created_at_bar: bar_index,
                });
            } else if cur_high < p2l {
                self.active.push(Fvg {
                    gap_type: GapType::Bearish,
                    upper: p2l,
                    lower: cur_high,
                    created_at_bar: bar_index,
                });
            }
        }
    }

    pub fn active(&self) -> &[Fvg] {
        &self.active
    }

    /// Most recent active gap whose midpoint is within `atr` of `price` —
    /// the one the regime signal exposes.
    pub fn nearest_active(&self, price: f64, atr: f64) -> Option<&Fvg> {
        self.active
            .iter()
            .rev()
            .find(|g| (g.midpoint() - price).abs() <= atr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_bullish_gap() {
        let mut t = FvgTracker::new(100);
        // prev2 high 100, current low 102 => bullish zone [100, 102].
        t.on_bar(2, Some(100.0), Some(99.0), 103.0, 102.0, 102.5);
        assert_eq!(t.active().len(), 1);
        let g = &t.active()[0];
        assert_eq!(g.gap_type, GapType::Bullish);
        assert_eq!(g.midpoint(), 101.0);
    }

    #[test]
    fn detects_bearish_gap() {
        let mut t = FvgTracker::new(100);
        // prev2 low 100, current high 98 => bearish zone [98, 100].
        t.on_bar(2, Some(101.0), Some(100.0), 98.0, 97.0, 97.5);
        assert_eq!(t.active().len(), 1);
        assert_eq!(t.active()[0].gap_type, GapType::Bearish);
    }

    #[test]
    fn bullish_gap_retired_when_price_falls_through_midpoint() {
        let mut t = FvgTracker::new(100);
        t.on_bar(2, Some(100.0), Some(99.0), 103.0, 102.0, 102.5);
        assert_eq!(t.active().len(), 1);
        // Close below midpoint (101) fills the gap.
        t.on_bar(3, None, None, 101.5, 100.0, 100.5);
        assert!(t.active().is_empty());
    }

    #[test]
    fn gap_ages_out() {
        let mut t = FvgTracker::new(5);
        t.on_bar(2, Some(100.0), Some(99.0), 103.0, 102.0, 102.5);
        // Stay above midpoint so only aging can retire it.
        for i in 3..8 {
            t.on_bar(i, None, None, 103.0, 102.0, 102.5);
        }
        assert!(t.active().is_empty());
    }

    #[test]
    fn nearest_active_respects_atr_distance() {
        let mut t = FvgTracker::new(100);
        t.on_bar(2, Some(100.0), Some(99.0), 103.0, 102.0, 102.5);
        assert!(t.nearest_active(101.5, 1.0).is_some());
        assert!(t.nearest_active(110.0, 1.0).is_none());
    }
}
