//! Engine configuration: one typed document aggregating every
//! component's knobs, validated before anything starts. Invalid
//! configuration refuses to start — there is no partial boot.

use std::fmt;
use std::path::{Path, PathBuf};

use rgk_features::FeatureConfig;
use rgk_hedge::HedgeConfig;
use rgk_options::ProfitConfig;
use rgk_policy::{AdaptorConfig, ControllerConfig, MemoryConfig};
use rgk_regime::ClassifierConfig;
use rgk_risk::RiskConfig;
use rgk_schemas::micros;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// Block on the feed for fresh bars.
    Live,
    /// Replay cached bars under the replay clock.
    Offline,
}

/// Window-size profile. Testing mode trades from the first bar;
/// relaxed after ten; default demands a full statistical window.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmupProfile {
    Testing,
    Relaxed,
    Default,
}

impl WarmupProfile {
    pub fn minimum_bars(self) -> usize {
        match self {
            WarmupProfile::Testing => 1,
            WarmupProfile::Relaxed => 10,
            WarmupProfile::Default => 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub symbols: Vec<String>,
    /// Dollars; converted to micros at the boundary.
    pub initial_capital: f64,
    pub mode: EngineMode,
    pub timeframe_secs: i64,
    pub warmup: WarmupProfile,
    pub replay_speed_multiplier: f64,
    pub feed_timeout_secs: f64,
    pub max_consecutive_feed_failures: u32,
    pub checkpoint_every_bars: u64,
    pub checkpoint_path: Option<PathBuf>,
    pub event_log_path: Option<PathBuf>,
    /// Challenge mode swaps in the aggressive risk profile.
    pub challenge_mode: bool,
    /// Explicit risk overrides; `None` uses the profile defaults.
    pub risk: Option<RiskConfig>,
    pub features: FeatureConfig,
    pub classifier: ClassifierConfig,
    pub controller: ControllerConfig,
    pub adaptor: AdaptorConfig,
    pub memory: MemoryConfig,
    pub hedge: HedgeConfig,
    pub profit: ProfitConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["QQQ".to_string()],
            initial_capital: 100_000.0,
            mode: EngineMode::Offline,
            timeframe_secs: 60,
            warmup: WarmupProfile::Default,
            replay_speed_multiplier: 600.0,
            feed_timeout_secs: 5.0,
            max_consecutive_feed_failures: 10,
            checkpoint_every_bars: 60,
            checkpoint_path: None,
            event_log_path: None,
            challenge_mode: false,
            risk: None,
            features: FeatureConfig::default(),
            classifier: ClassifierConfig::default(),
            controller: ControllerConfig::default(),
            adaptor: AdaptorConfig::default(),
            memory: MemoryConfig::default(),
            hedge: HedgeConfig::default(),
            profit: ProfitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Io { path: PathBuf, message: String },
    Parse { path: PathBuf, message: String },
    NoSymbols,
    NonPositiveCapital { value: f64 },
    NonPositiveTimeframe { value: i64 },
    NonPositiveReplaySpeed { value: f64 },
    InvalidThreshold { field: &'static str, value: f64 },
    DrawdownOrdering { soft: f64, hard: f64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, message } => write!(f, "config io error {path:?}: {message}"),
            Self::Parse { path, message } => {
                write!(f, "config parse error {path:?}: {message}")
            }
            Self::NoSymbols => write!(f, "config: at least one symbol is required"),
            Self::NonPositiveCapital { value } => {
                write!(f, "config: initial_capital must be > 0, got {value}")
            }
            Self::NonPositiveTimeframe { value } => {
                write!(f, "config: timeframe_secs must be > 0, got {value}")
            }
            Self::NonPositiveReplaySpeed { value } => {
                write!(f, "config: replay_speed_multiplier must be > 0, got {value}")
            }
            Self::InvalidThreshold { field, value } => {
                write!(f, "config: {field} must be within [0, 1], got {value}")
            }
            Self::DrawdownOrdering { soft, hard } => write!(
                f,
                "config: soft_drawdown ({soft}) must be below hard_drawdown ({hard})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    pub fn initial_capital_micros(&self) -> i64 {
        micros::from_f64(self.initial_capital)
    }

    pub fn minimum_bars_required(&self) -> usize {
        self.warmup.minimum_bars()
    }

    /// The resolved risk configuration: explicit overrides win, else the
    /// challenge or standard profile.
    pub fn resolved_risk(&self) -> RiskConfig {
        match (&self.risk, self.challenge_mode) {
            (Some(explicit), _) => explicit.clone(),
            (None, true) => RiskConfig::challenge(),
            (None, false) => RiskConfig::default(),
        }
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: EngineConfig =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        if self.initial_capital <= 0.0 {
            return Err(ConfigError::NonPositiveCapital {
                value: self.initial_capital,
            });
        }
        if self.timeframe_secs <= 0 {
            return Err(ConfigError::NonPositiveTimeframe {
                value: self.timeframe_secs,
            });
        }
        if self.replay_speed_multiplier <= 0.0 {
            return Err(ConfigError::NonPositiveReplaySpeed {
                value: self.replay_speed_multiplier,
            });
        }

        let risk = self.resolved_risk();
        for (field, value) in [
            ("risk.min_confidence", risk.min_confidence),
            ("risk.hard_drawdown_pct", risk.hard_drawdown_pct),
            ("risk.soft_drawdown_pct", risk.soft_drawdown_pct),
            ("risk.daily_loss_limit_pct", risk.daily_loss_limit_pct),
            ("classifier.confidence_floor", self.classifier.confidence_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidThreshold { field, value });
            }
        }
        if risk.soft_drawdown_pct >= risk.hard_drawdown_pct {
            return Err(ConfigError::DrawdownOrdering {
                soft: risk.soft_drawdown_pct,
                hard: risk.hard_drawdown_pct,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_symbols_refused() {
        let mut cfg = EngineConfig::default();
        cfg.symbols.clear();
        assert_eq!(cfg.validate(), Err(ConfigError::NoSymbols));
    }

    #[test]
    fn negative_capital_refused() {
        let mut cfg = EngineConfig::default();
        cfg.initial_capital = -5.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NonPositiveCapital { .. })
        ));
    }

    #[test]
    fn inverted_drawdown_thresholds_refused() {
        let mut cfg = EngineConfig::default();
        let mut risk = RiskConfig::default();
        risk.soft_drawdown_pct = 0.20;
        risk.hard_drawdown_pct = 0.15;
        cfg.risk = Some(risk);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::DrawdownOrdering { .. })
        ));
    }

    #[test]
    fn out_of_range_confidence_refused() {
        let mut cfg = EngineConfig::default();
        let mut risk = RiskConfig::default();
        risk.min_confidence = 1.5;
        cfg.risk = Some(risk);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn challenge_mode_resolves_aggressive_profile() {
        let mut cfg = EngineConfig::default();
        cfg.challenge_mode = true;
        let risk = cfg.resolved_risk();
        assert_eq!(risk.min_confidence, 0.6);
        assert!(risk.base_position_pct > RiskConfig::default().base_position_pct);
    }

    #[test]
    fn warmup_profiles_map_to_bar_floors() {
        assert_eq!(WarmupProfile::Testing.minimum_bars(), 1);
        assert_eq!(WarmupProfile::Relaxed.minimum_bars(), 10);
        assert_eq!(WarmupProfile::Default.minimum_bars(), 50);
    }

    #[test]
    fn partial_json_round_trips_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(
            &path,
            r#"{"symbols": ["SPY"], "initial_capital": 25000.0, "warmup": "relaxed"}"#,
        )
        .unwrap();
        let cfg = EngineConfig::load_from_path(&path).unwrap();
        assert_eq!(cfg.symbols, vec!["SPY".to_string()]);
        assert_eq!(cfg.minimum_bars_required(), 10);
        assert_eq!(cfg.timeframe_secs, 60);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            EngineConfig::load_from_path(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            EngineConfig::load_from_path("/nonexistent/engine.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
