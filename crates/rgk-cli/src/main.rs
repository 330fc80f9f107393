//! Replay entry point: run the engine offline over cached bars.
//!
//! ```text
//! rgk replay --config engine.json --bars qqq-1min.csv
//! ```
//!
//! Bar files are CSV: `symbol,ts_epoch_secs,open,high,low,close,volume`
//! with prices in dollars.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use rgk_broker_paper::PaperBroker;
use rgk_config::{EngineConfig, EngineMode};
use rgk_md::ReplayFeed;
use rgk_runtime::Engine;
use rgk_schemas::{micros, Bar};
use tracing::info;

#[derive(Parser)]
#[command(name = "rgk", about = "Regime-adaptive trading engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay cached bars through the full pipeline.
    Replay {
        /// Engine configuration (JSON).
        #[arg(long)]
        config: PathBuf,
        /// CSV bar file.
        #[arg(long)]
        bars: PathBuf,
        /// Run at full speed, ignoring the replay clock.
        #[arg(long, default_value_t = false)]
        fast: bool,
    },
}

fn parse_bars(path: &PathBuf) -> Result<Vec<Bar>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read bars {path:?}"))?;
    let mut bars = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("symbol") {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 7 {
            bail!("line {}: expected 7 fields, got {}", lineno + 1, fields.len());
        }
        let ts_secs: i64 = fields[1]
            .trim()
            .parse()
            .with_context(|| format!("line {}: bad timestamp", lineno + 1))?;
        let price = |idx: usize| -> Result<i64> {
            let value: f64 = fields[idx]
                .trim()
                .parse()
                .with_context(|| format!("line {}: bad price field {idx}", lineno + 1))?;
            Ok(micros::from_f64(value))
        };
        let volume: f64 = fields[6]
            .trim()
            .parse()
            .with_context(|| format!("line {}: bad volume", lineno + 1))?;
        let ts = Utc
            .timestamp_opt(ts_secs, 0)
            .single()
            .with_context(|| format!("line {}: timestamp out of range", lineno + 1))?;
        bars.push(Bar::new(
            fields[0].trim(),
            ts,
            price(2)?,
            price(3)?,
            price(4)?,
            price(5)?,
            volume as i64,
        ));
    }
    Ok(bars)
}

async fn run_replay(config_path: PathBuf, bars_path: PathBuf, fast: bool) -> Result<()> {
    let mut config = EngineConfig::load_from_path(&config_path)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    config.mode = EngineMode::Offline;

    let bars = parse_bars(&bars_path)?;
    if bars.is_empty() {
        bail!("no bars in {bars_path:?}");
    }
    info!(bars = bars.len(), symbols = ?config.symbols, "replay loaded");

    let mut feed = ReplayFeed::new();
    for symbol in &config.symbols {
        let symbol_bars: Vec<Bar> = bars
            .iter()
            .filter(|b| &b.symbol == symbol)
            .cloned()
            .collect();
        feed.seed_bars(symbol, symbol_bars);
    }

    let broker = PaperBroker::new(config.initial_capital_micros());
    let engine = Engine::new(config, Box::new(feed), Box::new(broker), None)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let engine = if fast {
        let mut engine = engine;
        engine.run_to_completion();
        engine
    } else {
        let handle = rgk_runtime::spawn(engine).map_err(|e| anyhow::anyhow!(e))?;
        handle
            .join()
            .await
            .context("loop task did not return an engine")?
    };

    let snapshot = engine.snapshot();
    let stats = &snapshot.portfolio;
    println!("state:          {:?}", snapshot.state);
    println!("bars processed: {}", snapshot.bar_count);
    println!("closed trades:  {}", stats.closed_trades);
    println!("multi-leg:      {}", snapshot.closed_multi_leg_trades);
    println!("total return:   {:.2}%", stats.total_return_pct);
    println!("max drawdown:   {:.2}%", stats.max_drawdown_pct);
    println!("win rate:       {:.1}%", stats.win_rate_pct);
    println!("sharpe:         {:.2}", stats.sharpe_ratio);
    if let Some(err) = snapshot.error_message {
        println!("error:          {err}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Replay { config, bars, fast } => run_replay(config, bars, fast).await,
    }
}
