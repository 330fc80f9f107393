//! Deterministic replay feed over preloaded bars.
//!
//! Drives offline sessions and scenario tests: bars are seeded up
//! front, `next_bar` hands them out in order, and `Gap` items simulate
//! vendor dropouts (each gap consumes one poll and yields `None`).

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rgk_schemas::Bar;

use crate::feed::{DataFeed, FeedError};

#[derive(Debug, Clone)]
enum Item {
    Bar(Bar),
    /// One missed poll.
    Gap,
}

#[derive(Debug, Default)]
pub struct ReplayFeed {
    connected: bool,
    queues: BTreeMap<String, VecDeque<Item>>,
    subscribed: Vec<String>,
    /// Last delivered bar per symbol, for monotonicity checks.
    last_bar: BTreeMap<String, Bar>,
}

impl ReplayFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed bars for a symbol (appended in order).
    pub fn seed_bars(&mut self, symbol: &str, bars: impl IntoIterator<Item = Bar>) {
        let queue = self.queues.entry(symbol.to_string()).or_default();
        queue.extend(bars.into_iter().map(Item::Bar));
    }

    /// Append `count` missed polls at the current end of the queue.
    pub fn seed_gap(&mut self, symbol: &str, count: usize) {
        let queue = self.queues.entry(symbol.to_string()).or_default();
        queue.extend(std::iter::repeat(Item::Gap).take(count));
    }

    pub fn remaining(&self, symbol: &str) -> usize {
        self.queues.get(symbol).map(|q| q.len()).unwrap_or(0)
    }
}

impl DataFeed for ReplayFeed {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn connect(&mut self) -> Result<(), FeedError> {
        self.connected = true;
        Ok(())
    }

    fn subscribe(&mut self, symbols: &[String], _preload_bars: usize) -> Result<(), FeedError> {
        if !self.connected {
            return Err(FeedError::NotConnected);
        }
        // All bars are preloaded by construction; preload depth is moot.
        self.subscribed = symbols.to_vec();
        Ok(())
    }

    fn next_bar(&mut self, symbol: &str, _timeout: Duration) -> Result<Option<Bar>, FeedError> {
        if !self.connected {
            return Err(FeedError::NotConnected);
        }
        if !self.subscribed.iter().any(|s| s == symbol) {
            return Err(FeedError::NotSubscribed {
                symbol: symbol.to_string(),
            });
        }
        let Some(queue) = self.queues.get_mut(symbol) else {
            return Ok(None);
        };
        match queue.pop_front() {
            Some(Item::Bar(bar)) => {
                match self.last_bar.get(symbol) {
                    Some(prev) => bar.validate_after(prev),
                    None => bar.validate(),
                }
                .map_err(FeedError::Integrity)?;
                self.last_bar.insert(symbol.to_string(), bar.clone());
                Ok(Some(bar))
            }
            Some(Item::Gap) | None => Ok(None),
        }
    }

    fn historical_bars(
        &mut self,
        symbol: &str,
        _timeframe_secs: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, FeedError> {
        let Some(queue) = self.queues.get(symbol) else {
            return Ok(Vec::new());
        };
        Ok(queue
            .iter()
            .filter_map(|item| match item {
                Item::Bar(b) if b.ts >= start && b.ts <= end => Some(b.clone()),
                _ => None,
            })
            .collect())
    }

    fn close(&mut self) {
        self.connected = false;
        self.queues.clear();
        self.subscribed.clear();
    }
}
