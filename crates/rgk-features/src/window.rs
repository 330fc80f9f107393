//! Bounded rolling bar window.

use std::collections::VecDeque;

use rgk_schemas::Bar;

/// Ring buffer of the most recent bars for one symbol.
///
/// Eviction is strictly FIFO; capacity is fixed at construction. The
/// window never reorders — bars are appended in feed order and the feed
/// layer enforces timestamp monotonicity before they get here.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    bars: VecDeque<Bar>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            capacity,
            bars: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, bar: Bar) {
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bar> {
        self.bars.iter()
    }

    /// The most recent `n` bars, oldest first. Returns fewer when the
    /// window holds fewer.
    pub fn tail(&self, n: usize) -> Vec<&Bar> {
        let skip = self.bars.len().saturating_sub(n);
        self.bars.iter().skip(skip).collect()
    }

    /// Closes of the most recent `n` bars in dollars, oldest first.
    pub fn tail_closes(&self, n: usize) -> Vec<f64> {
        self.tail(n).iter().map(|b| b.close_f64()).collect()
    }
}
