//! Feature primitives over a bar window.
//!
//! All functions are pure over their slice inputs and return `f64`
//! dollars / ratios; insufficient data yields the documented neutral
//! value rather than an error, so the classifier can run from bar one
//! and report low confidence instead of failing.

use rgk_schemas::Bar;

/// Volume-weighted average price over the window (typical price ×
/// volume). Falls back to the last close when total volume is zero.
pub fn vwap(bars: &[&Bar]) -> f64 {
    let mut pv = 0.0;
    let mut vol = 0.0;
    for b in bars {
        pv += b.typical_f64() * b.volume as f64;
        vol += b.volume as f64;
    }
    if vol > 0.0 {
        pv / vol
    } else {
        bars.last().map(|b| b.close_f64()).unwrap_or(0.0)
    }
}

/// Average True Range over the window (simple mean of true ranges).
///
/// True range of bar i uses the previous close; the first bar's true
/// range is its own high-low span.
pub fn atr(bars: &[&Bar]) -> f64 {
    if bars.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut prev_close: Option<f64> = None;
    for b in bars {
        let hl = b.high_f64() - b.low_f64();
        let tr = match prev_close {
            Some(pc) => hl.max((b.high_f64() - pc).abs()).max((b.low_f64() - pc).abs()),
            None => hl,
        };
        sum += tr;
        prev_close = Some(b.close_f64());
    }
    sum / bars.len() as f64
}

/// Realized volatility: sample standard deviation of simple per-bar
/// returns. Needs at least 3 bars; 0.0 below that.
pub fn realized_vol(bars: &[&Bar]) -> f64 {
    if bars.len() < 3 {
        return 0.0;
    }
    let returns: Vec<f64> = bars
        .windows(2)
        .filter_map(|w| {
            let prev = w[0].close_f64();
            if prev > 0.0 {
                Some((w[1].close_f64() - prev) / prev)
            } else {
                None
            }
        })
        .collect();
    stddev(&returns)
}

/// Least-squares slope of closes against bar index, in dollars per bar.
pub fn trend_slope(bars: &[&Bar]) -> f64 {
    let n = bars.len();
    if n < 2 {
        return 0.0;
    }
    let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let ys: Vec<f64> = bars.iter().map(|b| b.close_f64()).collect();
    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..n {
        num += (xs[i] - mean_x) * (ys[i] - mean_y);
        den += (xs[i] - mean_x) * (xs[i] - mean_x);
    }
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// Exponential moving average of closes with the standard 2/(n+1)
/// smoothing, seeded with the first close.
pub fn ema(bars: &[&Bar], period: usize) -> f64 {
    debug_assert!(period > 0);
    let mut iter = bars.iter();
    let Some(first) = iter.next() else {
        return 0.0;
    };
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut value = first.close_f64();
    for b in iter {
        value = alpha * b.close_f64() + (1.0 - alpha) * value;
    }
    value
}

/// Z-score of the last close against VWAP, scaled by realized vol of the
/// window (in price terms). 0.0 when vol is degenerate.
pub fn vwap_zscore(bars: &[&Bar]) -> f64 {
    let Some(last) = bars.last() else {
        return 0.0;
    };
    let v = vwap(bars);
    let rv = realized_vol(bars);
    let price_sigma = rv * last.close_f64();
    if price_sigma > 0.0 {
        (last.close_f64() - v) / price_sigma
    } else {
        0.0
    }
}

/// Percentile rank (0..=100) of `value` within `history`.
pub fn percentile_rank(history: &[f64], value: f64) -> f64 {
    if history.is_empty() {
        return 50.0;
    }
    let below = history.iter().filter(|&&h| h < value).count();
    below as f64 / history.len() as f64 * 100.0
}

fn stddev(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n < 2 {
        return 0.0;
    }
    let mean = xs.iter().sum::<f64>() / n as f64;
    let var = xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (n as f64 - 1.0);
    var.sqrt()
}
