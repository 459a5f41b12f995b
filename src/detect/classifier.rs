//! Multi-predicate anomaly classification against adaptive baselines.
//!
//! One configurable classifier replaces the earlier family of near-identical
//! detectors; the variants survive as [`DetectorConfig`] presets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::detect::baseline::Baselines;
use crate::detect::outcome::{EventPriceSource, ForwardConfig};
use crate::detect::window::{compute_metrics, WindowScanner};
use crate::models::{AnomalyCandidate, AnomalyKind, Trade, WindowMetrics};

/// Wallet-participation predicate variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletSurgeRule {
    /// Fire on wallets whose first appearance in the batch falls inside the
    /// window: at least `min_count` of them, making up at least `min_ratio`
    /// of the window's distinct wallets. With `volume_confirm_multiplier`
    /// set, the surge must also carry window volume above that multiple of
    /// the baseline to count (noise reduction).
    NewWallets {
        min_count: usize,
        min_ratio: f64,
        volume_confirm_multiplier: Option<f64>,
    },
    /// Fire on sheer wallet cardinality regardless of novelty: distinct
    /// wallets >= max(min_count, median_multiplier * median wallet count).
    AnyWallets {
        min_count: usize,
        median_multiplier: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpikeRule {
    pub multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WhaleTradeRule {
    pub multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImbalanceRule {
    /// Minimum |net| / total volume fraction.
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceMoveRule {
    /// Minimum window price range as a percentage of the average price.
    pub min_range_pct: f64,
}

/// Full classifier configuration: window geometry, the active predicate set
/// with thresholds, and the forward-evaluation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub window_secs: i64,
    pub min_window_trades: usize,
    pub wallet_surge: Option<WalletSurgeRule>,
    pub volume_spike: Option<VolumeSpikeRule>,
    pub whale_trade: Option<WhaleTradeRule>,
    pub imbalance: Option<ImbalanceRule>,
    pub price_move: Option<PriceMoveRule>,
    pub forward: ForwardConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::full_spectrum()
    }
}

impl DetectorConfig {
    /// First-generation detector: new-wallet inflow only, window average as
    /// the event price, plain `> 0` correctness comparison.
    pub fn new_wallet_surge() -> Self {
        Self {
            window_secs: 300,
            min_window_trades: 3,
            wallet_surge: Some(WalletSurgeRule::NewWallets {
                min_count: 3,
                min_ratio: 0.3,
                volume_confirm_multiplier: None,
            }),
            volume_spike: None,
            whale_trade: None,
            imbalance: None,
            price_move: None,
            forward: ForwardConfig {
                horizon_secs: 1800,
                reference_trades: 5,
                min_future_trades: 1,
                epsilon: 0.0,
                event_price_source: EventPriceSource::WindowAverage,
            },
        }
    }

    /// Second-generation detector: volume spikes, plus new-wallet surges
    /// that are confirmed by above-baseline volume.
    pub fn volume_confirmed() -> Self {
        Self {
            window_secs: 300,
            min_window_trades: 3,
            wallet_surge: Some(WalletSurgeRule::NewWallets {
                min_count: 4,
                min_ratio: 0.3,
                volume_confirm_multiplier: Some(3.0),
            }),
            volume_spike: Some(VolumeSpikeRule { multiplier: 5.0 }),
            whale_trade: None,
            imbalance: None,
            price_move: None,
            forward: ForwardConfig {
                horizon_secs: 1800,
                reference_trades: 5,
                min_future_trades: 2,
                epsilon: 0.0,
                event_price_source: EventPriceSource::TrailingMean,
            },
        }
    }

    /// Widest detector: any-wallet inflow, volume spikes, outsized single
    /// trades, directional imbalance and rapid price movement.
    pub fn full_spectrum() -> Self {
        Self {
            window_secs: 300,
            min_window_trades: 3,
            wallet_surge: Some(WalletSurgeRule::AnyWallets {
                min_count: 5,
                median_multiplier: 2.0,
            }),
            volume_spike: Some(VolumeSpikeRule { multiplier: 5.0 }),
            whale_trade: Some(WhaleTradeRule { multiplier: 20.0 }),
            imbalance: Some(ImbalanceRule { threshold: 0.8 }),
            price_move: Some(PriceMoveRule {
                min_range_pct: 10.0,
            }),
            forward: ForwardConfig {
                horizon_secs: 1800,
                reference_trades: 3,
                min_future_trades: 2,
                epsilon: 0.001,
                event_price_source: EventPriceSource::TrailingMean,
            },
        }
    }

    /// Evaluate the active predicates for one window. Pure: all baseline
    /// guards (zero medians, zero volume, zero average price) short-circuit
    /// the corresponding predicate to "not triggered".
    pub fn evaluate(&self, metrics: &WindowMetrics, baselines: &Baselines) -> Vec<AnomalyKind> {
        let mut fired = Vec::new();

        if let Some(rule) = &self.wallet_surge {
            let surged = match rule {
                WalletSurgeRule::NewWallets {
                    min_count,
                    min_ratio,
                    volume_confirm_multiplier,
                } => {
                    let base = metrics.new_wallets >= *min_count
                        && metrics.new_wallet_ratio >= *min_ratio;
                    let confirmed = match volume_confirm_multiplier {
                        Some(m) => {
                            baselines.median_window_volume > 0.0
                                && metrics.total_volume > m * baselines.median_window_volume
                        }
                        None => true,
                    };
                    base && confirmed
                }
                WalletSurgeRule::AnyWallets {
                    min_count,
                    median_multiplier,
                } => {
                    let threshold =
                        (*min_count as f64).max(median_multiplier * baselines.median_wallet_count);
                    metrics.unique_wallets as f64 >= threshold
                }
            };
            if surged {
                fired.push(AnomalyKind::WalletSurge);
            }
        }

        if let Some(rule) = &self.volume_spike {
            if baselines.median_window_volume > 0.0
                && metrics.total_volume > rule.multiplier * baselines.median_window_volume
            {
                fired.push(AnomalyKind::VolumeSpike);
            }
        }

        if let Some(rule) = &self.whale_trade {
            if baselines.median_trade_notional > 0.0
                && metrics.anchor_notional > rule.multiplier * baselines.median_trade_notional
            {
                fired.push(AnomalyKind::WhaleTrade);
            }
        }

        if let Some(rule) = &self.imbalance {
            if metrics.total_volume > 0.0
                && metrics.net_volume.abs() / metrics.total_volume > rule.threshold
            {
                fired.push(AnomalyKind::Imbalance);
            }
        }

        if let Some(rule) = &self.price_move {
            if metrics.price_range_pct > rule.min_range_pct {
                fired.push(AnomalyKind::PriceMove);
            }
        }

        fired
    }
}

/// Per-invocation record of every wallet seen so far, keyed to the anchor
/// index of its first appearance. Owned by one market batch; never shared
/// across markets.
#[derive(Debug, Default)]
pub struct SeenWallets {
    first_seen: HashMap<String, usize>,
}

impl SeenWallets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a wallet at its anchor index; re-recording keeps the earliest.
    pub fn record(&mut self, wallet: &str, index: usize) {
        if !self.first_seen.contains_key(wallet) {
            self.first_seen.insert(wallet.to_string(), index);
        }
    }

    /// A wallet is "new" for a window starting at `window_start` when its
    /// first appearance is inside that window (or it has no history at all,
    /// which covers the anchor's own wallet trading for the first time).
    pub fn is_new(&self, wallet: &str, window_start: usize) -> bool {
        self.first_seen
            .get(wallet)
            .map_or(true, |&first| first >= window_start)
    }

    pub fn len(&self) -> usize {
        self.first_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first_seen.is_empty()
    }

    pub fn contains(&self, wallet: &str) -> bool {
        self.first_seen.contains_key(wallet)
    }
}

/// Run the classifier over a sorted batch and emit raw anomaly candidates in
/// chronological order.
///
/// Anchors whose window holds fewer than the minimum trade count are skipped
/// but still feed the seen-wallet state. A batch with no qualifying windows
/// produces no candidates.
pub fn classify(trades: &[Trade], config: &DetectorConfig) -> Vec<AnomalyCandidate> {
    let Some(baselines) = Baselines::estimate(trades, config.window_secs, config.min_window_trades)
    else {
        return Vec::new();
    };

    let mut candidates = Vec::new();
    let mut seen = SeenWallets::new();
    let mut scanner = WindowScanner::new(config.window_secs);

    for i in 0..trades.len() {
        let start = scanner.advance(trades, i);
        let window = &trades[start..=i];

        if window.len() >= config.min_window_trades {
            let metrics = compute_metrics(window, &trades[i], |w| seen.is_new(w, start));
            let kinds = config.evaluate(&metrics, &baselines);
            if !kinds.is_empty() {
                candidates.push(AnomalyCandidate {
                    timestamp: trades[i].timestamp,
                    kinds,
                    metrics,
                });
            }
        }

        // The anchor joins the history only after its own novelty was judged.
        seen.record(&trades[i].wallet, i);
    }

    candidates
}
