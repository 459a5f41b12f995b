//! Batch-level baselines used as adaptive anomaly thresholds.
//!
//! Baselines are computed once per market batch from every qualifying window
//! and are immutable afterwards. Medians rather than means so that the very
//! spikes we want to detect do not inflate their own threshold.

use std::collections::HashSet;

use crate::detect::window::WindowScanner;
use crate::models::Trade;

/// Robust per-batch reference values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baselines {
    pub median_wallet_count: f64,
    pub median_window_volume: f64,
    pub median_trade_notional: f64,
}

impl Baselines {
    /// Scan every anchor's trailing window and take medians over the windows
    /// with at least `min_window_trades` trades. Returns `None` when no
    /// window qualifies, which downstream treats as "no events", not an
    /// error.
    pub fn estimate(
        trades: &[Trade],
        window_secs: i64,
        min_window_trades: usize,
    ) -> Option<Baselines> {
        let mut wallet_counts = Vec::new();
        let mut window_volumes = Vec::new();
        let mut anchor_notionals = Vec::new();

        let mut scanner = WindowScanner::new(window_secs);
        for i in 0..trades.len() {
            let start = scanner.advance(trades, i);
            let window = &trades[start..=i];
            if window.len() < min_window_trades {
                continue;
            }
            let wallets: HashSet<&str> = window.iter().map(|t| t.wallet.as_str()).collect();
            wallet_counts.push(wallets.len() as f64);
            window_volumes.push(window.iter().map(Trade::notional).sum());
            anchor_notionals.push(trades[i].notional());
        }

        if wallet_counts.is_empty() {
            return None;
        }

        Some(Baselines {
            median_wallet_count: median(wallet_counts),
            median_window_volume: median(window_volumes),
            median_trade_notional: median(anchor_notionals),
        })
    }
}

/// Standard median: mean of the two middle values for even counts.
pub fn median(mut values: Vec<f64>) -> f64 {
    debug_assert!(!values.is_empty());
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}
