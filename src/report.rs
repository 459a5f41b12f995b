//! Aggregate scoring and report rendering.
//!
//! Consumes the enriched event sequences produced by the engine, one per
//! market, and turns them into the accuracy / frequency / distribution
//! summary the backtest prints and persists.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::detect::baseline::median;
use crate::models::Event;
use crate::scrapers::{MarketInfo, MarketKind};

/// Everything the engine produced for one market.
#[derive(Debug, Clone, Serialize)]
pub struct MarketRun {
    pub market: MarketInfo,
    pub trade_count: usize,
    pub events: Vec<Event>,
}

/// Flat event record for persistence, market context included.
#[derive(Debug, Serialize)]
pub struct RecordedEvent<'a> {
    pub market: &'a str,
    pub condition_id: &'a str,
    pub market_type: &'a str,
    #[serde(flatten)]
    pub event: &'a Event,
}

/// Flatten per-market runs into one persistable event list.
pub fn flatten_events<'a>(runs: &'a [MarketRun]) -> Vec<RecordedEvent<'a>> {
    runs.iter()
        .flat_map(|run| {
            run.events.iter().map(move |event| RecordedEvent {
                market: &run.market.question,
                condition_id: &run.market.condition_id,
                market_type: run.market.kind.as_str(),
                event,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
struct KindStats {
    markets: usize,
    trades: usize,
    events: usize,
    correct: usize,
    known: usize,
}

/// Aggregated backtest statistics across all analyzed markets.
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub markets_analyzed: usize,
    pub markets_with_events: usize,
    pub total_trades: usize,
    pub total_events: usize,
    pub correct_signals: usize,
    pub known_signals: usize,
    pub anomaly_counts: BTreeMap<&'static str, usize>,
    by_kind: BTreeMap<MarketKind, KindStats>,
    /// Price impact samples, percent, extremes (|x| >= 50) filtered out.
    price_changes_pct: Vec<f64>,
    /// Mean gap between consecutive events across all markets, in hours.
    pub avg_event_interval_hours: Option<f64>,
    recent: Vec<RecentEvent>,
}

#[derive(Debug, Clone)]
struct RecentEvent {
    market: String,
    kind: &'static str,
    datetime: String,
    types: String,
    wallets: usize,
    volume: f64,
    change_pct: Option<f64>,
    correct: Option<bool>,
}

impl BacktestReport {
    pub fn from_runs(runs: &[MarketRun]) -> Self {
        let mut report = BacktestReport {
            markets_analyzed: runs.len(),
            markets_with_events: 0,
            total_trades: 0,
            total_events: 0,
            correct_signals: 0,
            known_signals: 0,
            anomaly_counts: BTreeMap::new(),
            by_kind: BTreeMap::new(),
            price_changes_pct: Vec::new(),
            avg_event_interval_hours: None,
            recent: Vec::new(),
        };

        let mut timestamps = Vec::new();
        let mut recent: Vec<(i64, RecentEvent)> = Vec::new();

        for run in runs {
            let stats = report.by_kind.entry(run.market.kind).or_default();
            stats.markets += 1;
            stats.trades += run.trade_count;
            stats.events += run.events.len();

            report.total_trades += run.trade_count;
            report.total_events += run.events.len();
            if !run.events.is_empty() {
                report.markets_with_events += 1;
            }

            for event in &run.events {
                timestamps.push(event.timestamp);
                for kind in &event.kinds {
                    *report.anomaly_counts.entry(kind.as_str()).or_default() += 1;
                }

                let mut change_pct = None;
                let mut correct = None;
                if let Some(outcome) = &event.outcome {
                    report.known_signals += 1;
                    let stats = report.by_kind.entry(run.market.kind).or_default();
                    stats.known += 1;
                    if outcome.signal_correct {
                        report.correct_signals += 1;
                        stats.correct += 1;
                    }
                    if outcome.price_change_pct.abs() < 50.0 {
                        report.price_changes_pct.push(outcome.price_change_pct);
                    }
                    change_pct = Some(outcome.price_change_pct);
                    correct = Some(outcome.signal_correct);
                }

                recent.push((
                    event.timestamp,
                    RecentEvent {
                        market: run.market.question.clone(),
                        kind: run.market.kind.as_str(),
                        datetime: event.datetime.clone(),
                        types: event
                            .kinds
                            .iter()
                            .map(|k| k.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                        wallets: event.metrics.unique_wallets,
                        volume: event.metrics.total_volume,
                        change_pct,
                        correct,
                    },
                ));
            }
        }

        if timestamps.len() > 1 {
            timestamps.sort_unstable();
            let gaps: Vec<f64> = timestamps
                .windows(2)
                .map(|w| (w[1] - w[0]) as f64 / 3600.0)
                .collect();
            report.avg_event_interval_hours =
                Some(gaps.iter().sum::<f64>() / gaps.len() as f64);
        }

        recent.sort_by_key(|(ts, _)| std::cmp::Reverse(*ts));
        report.recent = recent.into_iter().take(5).map(|(_, e)| e).collect();

        report
    }

    /// correct / (correct + incorrect), unknown outcomes excluded.
    pub fn accuracy(&self) -> Option<f64> {
        if self.known_signals == 0 {
            return None;
        }
        Some(self.correct_signals as f64 / self.known_signals as f64)
    }

    fn verdict(accuracy_pct: f64) -> &'static str {
        if accuracy_pct >= 55.0 {
            "signal has predictive value"
        } else if accuracy_pct >= 52.0 {
            "marginally better than random"
        } else {
            "close to random"
        }
    }

    /// Render the human-readable summary the runner prints.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let line = "=".repeat(60);

        let _ = writeln!(out, "{line}\nBacktest results\n{line}");
        let _ = writeln!(out, "\nOverall:");
        let _ = writeln!(out, "  markets analyzed:    {}", self.markets_analyzed);
        let _ = writeln!(out, "  markets with events: {}", self.markets_with_events);
        let _ = writeln!(out, "  trades:              {}", self.total_trades);
        let _ = writeln!(out, "  anomaly events:      {}", self.total_events);
        if self.markets_analyzed > 0 {
            let _ = writeln!(
                out,
                "  events per market:   {:.2}",
                self.total_events as f64 / self.markets_analyzed as f64
            );
        }
        if self.total_trades > 0 {
            let _ = writeln!(
                out,
                "  events per 1k trades: {:.2}",
                self.total_events as f64 / self.total_trades as f64 * 1000.0
            );
        }
        if let Some(hours) = self.avg_event_interval_hours {
            let _ = writeln!(out, "  avg event interval:  {hours:.1}h");
        }

        let _ = writeln!(out, "\nBy market type:");
        for (kind, stats) in &self.by_kind {
            let _ = writeln!(
                out,
                "  [{}] markets: {}, trades: {}, events: {}",
                kind.as_str(),
                stats.markets,
                stats.trades,
                stats.events
            );
            if stats.known > 0 {
                let _ = writeln!(
                    out,
                    "    accuracy: {:.1}% ({} samples)",
                    stats.correct as f64 / stats.known as f64 * 100.0,
                    stats.known
                );
            }
        }

        let _ = writeln!(out, "\nAnomaly type distribution:");
        let mut counts: Vec<_> = self.anomaly_counts.iter().collect();
        counts.sort_by_key(|(_, c)| std::cmp::Reverse(**c));
        for (name, count) in counts {
            let pct = if self.total_events > 0 {
                *count as f64 / self.total_events as f64 * 100.0
            } else {
                0.0
            };
            let _ = writeln!(out, "  {name}: {count} ({pct:.0}%)");
        }

        let _ = writeln!(out, "\nSignal quality:");
        match self.accuracy() {
            Some(acc) => {
                let pct = acc * 100.0;
                let _ = writeln!(
                    out,
                    "  samples: {} | correct: {} | accuracy: {:.1}% ({})",
                    self.known_signals,
                    self.correct_signals,
                    pct,
                    Self::verdict(pct)
                );
            }
            None => {
                let _ = writeln!(out, "  not enough evaluated events");
            }
        }

        if !self.price_changes_pct.is_empty() {
            let mean = self.price_changes_pct.iter().sum::<f64>()
                / self.price_changes_pct.len() as f64;
            let med = median(self.price_changes_pct.clone());
            let _ = writeln!(out, "\nPrice impact (extremes filtered):");
            let _ = writeln!(
                out,
                "  samples: {} | mean: {mean:.2}% | median: {med:.2}%",
                self.price_changes_pct.len()
            );
        }

        if !self.recent.is_empty() {
            let _ = writeln!(out, "\nMost recent events:");
            for (i, e) in self.recent.iter().enumerate() {
                let _ = writeln!(out, "  {}. [{}] {}", i + 1, e.kind, e.market);
                let _ = writeln!(out, "     time: {} | types: {}", e.datetime, e.types);
                let _ = writeln!(
                    out,
                    "     wallets: {} | volume: ${:.0}",
                    e.wallets, e.volume
                );
                if let (Some(pct), Some(correct)) = (e.change_pct, e.correct) {
                    let _ = writeln!(
                        out,
                        "     after horizon: {}{:.2}% ({})",
                        if pct > 0.0 { "+" } else { "" },
                        pct,
                        if correct { "correct" } else { "wrong" }
                    );
                }
            }
        }

        out
    }
}
