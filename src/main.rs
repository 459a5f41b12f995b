//! PolySurge backtest runner.
//!
//! Fetches active markets, pulls each market's recent trades, runs the
//! anomaly engine with the chosen preset, evaluates forward outcomes, prints
//! the aggregate report and optionally persists the enriched events as JSON.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use polysurge_backend::config::Config;
use polysurge_backend::detect::{normalize, AnomalyEngine, DetectorConfig};
use polysurge_backend::report::{flatten_events, BacktestReport, MarketRun};
use polysurge_backend::scrapers::{MarketKind, PolymarketClient};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    /// New-wallet inflow detector.
    WalletSurge,
    /// Volume spikes plus volume-confirmed wallet surges.
    VolumeConfirmed,
    /// All five predicates.
    FullSpectrum,
}

impl Preset {
    fn config(self) -> DetectorConfig {
        match self {
            Preset::WalletSurge => DetectorConfig::new_wallet_surge(),
            Preset::VolumeConfirmed => DetectorConfig::volume_confirmed(),
            Preset::FullSpectrum => DetectorConfig::full_spectrum(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "polysurge", about = "Polymarket trade anomaly backtester")]
struct Cli {
    /// Number of markets to analyze, highest 24h volume first.
    #[arg(long, default_value_t = 30)]
    markets: usize,

    /// Maximum trades fetched per market.
    #[arg(long, default_value_t = 1000)]
    trade_limit: usize,

    /// Detector preset.
    #[arg(long, value_enum, default_value_t = Preset::FullSpectrum)]
    preset: Preset,

    /// Override the sliding window, in minutes.
    #[arg(long)]
    window_mins: Option<i64>,

    /// Override the forward horizon, in minutes.
    #[arg(long)]
    forward_mins: Option<i64>,

    /// Skip sports markets.
    #[arg(long)]
    exclude_sports: bool,

    /// Skip sub-daily markets.
    #[arg(long)]
    exclude_short_term: bool,

    /// Also fetch hourly price history as the forward price reference.
    #[arg(long)]
    with_price_history: bool,

    /// Write the enriched events to this JSON file.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let app_config = Config::from_env()?;

    let mut detector = cli.preset.config();
    if let Some(mins) = cli.window_mins {
        detector.window_secs = mins * 60;
    }
    if let Some(mins) = cli.forward_mins {
        detector.forward.horizon_secs = mins * 60;
    }
    let engine = AnomalyEngine::new(detector);

    let mut exclude = Vec::new();
    if cli.exclude_sports {
        exclude.push(MarketKind::Sports);
    }
    if cli.exclude_short_term {
        exclude.push(MarketKind::ShortTerm);
    }

    let pacing = Duration::from_millis(app_config.market_pacing_ms);
    let mut client = PolymarketClient::new(app_config)?;

    let markets = client.fetch_markets(cli.markets, &exclude).await?;
    if markets.is_empty() {
        warn!("no markets matched the filters, nothing to do");
        return Ok(());
    }
    info!("analyzing {} markets", markets.len());

    let mut runs: Vec<MarketRun> = Vec::with_capacity(markets.len());

    for (i, market) in markets.into_iter().enumerate() {
        let raw = match client.fetch_trades(&market.condition_id, cli.trade_limit).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(market = %market.slug, error = %e, "skipping market, trades unavailable");
                continue;
            }
        };
        if raw.is_empty() {
            info!("[{}] {}: no trades", i + 1, market.question);
            continue;
        }

        let trades = normalize::normalize(raw);

        let history = if cli.with_price_history {
            let points = client.fetch_price_history(&market.condition_id).await?;
            if points.is_empty() {
                None
            } else {
                Some(points)
            }
        } else {
            None
        };

        let events = engine.run(&trades, history.as_deref());
        info!(
            "[{}] [{}] {}: {} trades, {} events",
            i + 1,
            market.kind.as_str(),
            market.question,
            trades.len(),
            events.len()
        );

        runs.push(MarketRun {
            market,
            trade_count: trades.len(),
            events,
        });

        sleep(pacing).await;
    }

    let report = BacktestReport::from_runs(&runs);
    print!("{}", report.render());

    if let Some(path) = cli.output {
        let events = flatten_events(&runs);
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &events)
            .context("failed to write events JSON")?;
        info!("wrote {} events to {}", events.len(), path.display());
    }

    Ok(())
}
