//! Append-only structured event log. One JSON object per line; keys
//! are emitted in canonical (sorted) order so identical runs produce
//! byte-identical logs.

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

/// Recent events retained in memory for control-surface queries.
const RECENT_EVENTS_CAP: usize = 100;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventPayload {
    RegimeFlip {
        from_regime: String,
        to_regime: String,
        confidence: f64,
        bar_count: u64,
    },
    RiskEvent {
        risk_type: String,
        reason: String,
        current_value: f64,
        threshold: f64,
        action_taken: String,
    },
    WeightChange {
        weight_type: String,
        name: String,
        old_weight: f64,
        new_weight: f64,
        change_pct: f64,
        bar_count: u64,
    },
    OutlierPnl {
        pnl: f64,
        pnl_pct: f64,
        mean_pnl: f64,
        std_dev: f64,
        z_score: f64,
    },
    NoTrade {
        reason: String,
        regime_confidence: f64,
        intent_confidence: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingEvent {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Event writer. With no path configured it still counts and buffers
/// events (useful in tests and dry runs); persistence failures are
/// logged and retried on the next append, never fatal.
#[derive(Debug)]
pub struct EventLogger {
    path: Option<PathBuf>,
    event_count: u64,
    recent: VecDeque<TradingEvent>,
}

impl EventLogger {
    pub fn new(path: Option<impl AsRef<Path>>) -> Result<Self> {
        let path = path.map(|p| p.as_ref().to_path_buf());
        if let Some(ref p) = path {
            if let Some(parent) = p.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create event log dir {parent:?}"))?;
            }
        }
        Ok(Self {
            path,
            event_count: 0,
            recent: VecDeque::new(),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            event_count: 0,
            recent: VecDeque::new(),
        }
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    pub fn recent(&self) -> impl Iterator<Item = &TradingEvent> {
        self.recent.iter()
    }

    pub fn log(&mut self, event: TradingEvent) {
        self.event_count += 1;

        match event.severity {
            Severity::Info => info!(target: "rgk::events", event = ?event.payload),
            Severity::Warning => warn!(target: "rgk::events", event = ?event.payload),
            Severity::Error | Severity::Critical => {
                error!(target: "rgk::events", event = ?event.payload)
            }
        }

        if let Some(ref path) = self.path {
            if let Err(e) = append_line(path, &event) {
                // Persistence failure is a warning: keep trading, retry
                // on the next event.
                warn!(target: "rgk::events", "event log write failed: {e:#}");
            }
        }

        self.recent.push_back(event);
        if self.recent.len() > RECENT_EVENTS_CAP {
            self.recent.pop_front();
        }
    }

    pub fn log_regime_flip(
        &mut self,
        ts: DateTime<Utc>,
        from_regime: &str,
        to_regime: &str,
        confidence: f64,
        bar_count: u64,
    ) {
        self.log(TradingEvent {
            timestamp: ts,
            severity: Severity::Info,
            payload: EventPayload::RegimeFlip {
                from_regime: from_regime.to_string(),
                to_regime: to_regime.to_string(),
                confidence,
                bar_count,
            },
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_risk_event(
        &mut self,
        ts: DateTime<Utc>,
        risk_type: &str,
        reason: &str,
        current_value: f64,
        threshold: f64,
        action_taken: &str,
        severity: Severity,
    ) {
        self.log(TradingEvent {
            timestamp: ts,
            severity,
            payload: EventPayload::RiskEvent {
                risk_type: risk_type.to_string(),
                reason: reason.to_string(),
                current_value,
                threshold,
                action_taken: action_taken.to_string(),
            },
        });
    }

    /// Weight changes arrive pre-filtered by the adaptor's threshold;
    /// moves of 20%+ escalate to warning.
    pub fn log_weight_change(
        &mut self,
        ts: DateTime<Utc>,
        weight_type: &str,
        name: &str,
        old_weight: f64,
        new_weight: f64,
        bar_count: u64,
    ) {
        let change_pct = if old_weight != 0.0 {
            ((new_weight - old_weight) / old_weight).abs() * 100.0
        } else {
            0.0
        };
        let severity = if change_pct >= 20.0 {
            Severity::Warning
        } else {
            Severity::Info
        };
        self.log(TradingEvent {
            timestamp: ts,
            severity,
            payload: EventPayload::WeightChange {
                weight_type: weight_type.to_string(),
                name: name.to_string(),
                old_weight,
                new_weight,
                change_pct,
                bar_count,
            },
        });
    }

    /// Log a trade's P&L when it is a z-score outlier against history.
    /// No-op below the threshold or with degenerate stats.
    pub fn log_outlier_pnl(
        &mut self,
        ts: DateTime<Utc>,
        pnl: f64,
        pnl_pct: f64,
        pnl_history: &[f64],
        z_threshold: f64,
    ) {
        let Some((mean, std_dev)) = mean_std(pnl_history) else {
            return;
        };
        if std_dev == 0.0 {
            return;
        }
        let z_score = ((pnl - mean) / std_dev).abs();
        if z_score < z_threshold {
            return;
        }
        let severity = if z_score >= 3.0 {
            Severity::Error
        } else {
            Severity::Warning
        };
        self.log(TradingEvent {
            timestamp: ts,
            severity,
            payload: EventPayload::OutlierPnl {
                pnl,
                pnl_pct,
                mean_pnl: mean,
                std_dev,
                z_score,
            },
        });
    }

    /// Log a no-trade decision — only when the signals were strong
    /// enough that a reader would ask why nothing happened.
    pub fn log_no_trade(
        &mut self,
        ts: DateTime<Utc>,
        reason: &str,
        regime_confidence: f64,
        intent_confidence: f64,
    ) {
        if regime_confidence <= 0.6 && intent_confidence <= 0.6 {
            return;
        }
        self.log(TradingEvent {
            timestamp: ts,
            severity: Severity::Info,
            payload: EventPayload::NoTrade {
                reason: reason.to_string(),
                regime_confidence,
                intent_confidence,
            },
        });
    }
}

fn mean_std(xs: &[f64]) -> Option<(f64, f64)> {
    if xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (n - 1.0);
    Some((mean, var.sqrt()))
}

fn append_line(path: &Path, event: &TradingEvent) -> Result<()> {
    let line = canonical_json_line(event)?;
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open event log {path:?}"))?;
    f.write_all(line.as_bytes()).context("write event line")?;
    f.write_all(b"\n").context("write newline")?;
    Ok(())
}

/// Canonicalize by sorting keys recursively and emitting compact JSON.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize event")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("stringify event")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}
