//! Trailing-window maintenance and per-window metrics.
//!
//! A window for an anchor trade at time `t` is the contiguous run of trades
//! with timestamp in `(t - window_secs, t]`, anchor included. Because the
//! batch is sorted, the left edge only ever moves forward, so the scan over a
//! full batch is amortized O(n) instead of the naive per-anchor rescan.

use std::collections::HashSet;

use crate::models::{Side, Trade, WindowMetrics};

/// Two-pointer cursor over a sorted trade slice.
pub struct WindowScanner {
    window_secs: i64,
    start: usize,
}

impl WindowScanner {
    pub fn new(window_secs: i64) -> Self {
        Self {
            window_secs,
            start: 0,
        }
    }

    /// Advance the left edge for the anchor at `index` and return the start
    /// index of its window. Anchors must be visited in ascending order.
    pub fn advance(&mut self, trades: &[Trade], index: usize) -> usize {
        let cutoff = trades[index].timestamp - self.window_secs;
        while self.start < index && trades[self.start].timestamp <= cutoff {
            self.start += 1;
        }
        self.start
    }
}

/// Compute the metrics snapshot for one window.
///
/// `is_new` reports whether a wallet's first appearance in the batch lies
/// inside this window; the classifier supplies it from its seen-wallet state.
pub fn compute_metrics<F>(window: &[Trade], anchor: &Trade, is_new: F) -> WindowMetrics
where
    F: Fn(&str) -> bool,
{
    let mut wallets: HashSet<&str> = HashSet::with_capacity(window.len());
    let mut buy_volume = 0.0;
    let mut sell_volume = 0.0;
    let mut price_min = f64::INFINITY;
    let mut price_max = f64::NEG_INFINITY;
    let mut price_sum = 0.0;
    let mut priced = 0usize;

    for trade in window {
        wallets.insert(trade.wallet.as_str());
        match trade.side {
            Side::Buy => buy_volume += trade.notional(),
            Side::Sell => sell_volume += trade.notional(),
        }
        // Zero means "price missing"; keep it out of the price statistics.
        if trade.price > 0.0 {
            price_min = price_min.min(trade.price);
            price_max = price_max.max(trade.price);
            price_sum += trade.price;
            priced += 1;
        }
    }

    let unique_wallets = wallets.len();
    let new_wallets = wallets.iter().copied().filter(|w| is_new(w)).count();
    let new_wallet_ratio = if unique_wallets > 0 {
        new_wallets as f64 / unique_wallets as f64
    } else {
        0.0
    };

    let avg_price = if priced > 0 {
        price_sum / priced as f64
    } else {
        0.0
    };
    let price_range_pct = if avg_price > 0.0 {
        (price_max - price_min) / avg_price * 100.0
    } else {
        0.0
    };

    let net_volume = buy_volume - sell_volume;

    WindowMetrics {
        trade_count: window.len(),
        unique_wallets,
        new_wallets,
        new_wallet_ratio,
        buy_volume,
        sell_volume,
        net_volume,
        total_volume: buy_volume + sell_volume,
        avg_price,
        price_range_pct,
        anchor_notional: anchor.notional(),
        is_buy_surge: net_volume > 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn trade(timestamp: i64, wallet: &str, side: Side, size: f64, price: f64) -> Trade {
        Trade {
            timestamp,
            wallet: wallet.to_string(),
            side,
            size,
            price,
        }
    }

    #[test]
    fn window_is_half_open_on_the_left() {
        // Anchor at t=300 with a 300s window: t=0 is excluded, t=1 included.
        let trades = vec![
            trade(0, "a", Side::Buy, 1.0, 0.5),
            trade(1, "b", Side::Buy, 1.0, 0.5),
            trade(300, "c", Side::Buy, 1.0, 0.5),
        ];
        let mut scanner = WindowScanner::new(300);
        let start = scanner.advance(&trades, 2);
        assert_eq!(start, 1);
    }

    #[test]
    fn window_always_contains_its_anchor() {
        let trades = vec![
            trade(0, "a", Side::Buy, 1.0, 0.5),
            trade(10_000, "b", Side::Buy, 1.0, 0.5),
        ];
        let mut scanner = WindowScanner::new(300);
        scanner.advance(&trades, 0);
        let start = scanner.advance(&trades, 1);
        assert_eq!(start, 1);
    }

    #[test]
    fn scanner_matches_brute_force_on_random_batches() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..50 {
            let n = rng.gen_range(1..120);
            let window_secs = rng.gen_range(1..600);
            let mut ts: Vec<i64> = (0..n).map(|_| rng.gen_range(0..3_000)).collect();
            ts.sort_unstable();
            let trades: Vec<Trade> = ts
                .iter()
                .map(|&t| trade(t, "w", Side::Buy, 1.0, 0.5))
                .collect();

            let mut scanner = WindowScanner::new(window_secs);
            for i in 0..trades.len() {
                let start = scanner.advance(&trades, i);
                let anchor_time = trades[i].timestamp;
                let expected: Vec<i64> = ts
                    .iter()
                    .enumerate()
                    .filter(|&(j, &t)| j <= i && t > anchor_time - window_secs && t <= anchor_time)
                    .map(|(_, &t)| t)
                    .collect();
                let actual: Vec<i64> =
                    trades[start..=i].iter().map(|t| t.timestamp).collect();
                assert_eq!(actual, expected, "window mismatch at anchor {}", i);
            }
        }
    }

    #[test]
    fn metrics_split_volume_by_side() {
        let trades = vec![
            trade(0, "a", Side::Buy, 10.0, 0.5),  // 5.0 buy
            trade(1, "b", Side::Sell, 4.0, 0.5),  // 2.0 sell
            trade(2, "a", Side::Buy, 2.0, 0.5),   // 1.0 buy
        ];
        let m = compute_metrics(&trades, &trades[2], |_| false);
        assert!((m.buy_volume - 6.0).abs() < 1e-12);
        assert!((m.sell_volume - 2.0).abs() < 1e-12);
        assert!((m.net_volume - 4.0).abs() < 1e-12);
        assert!((m.total_volume - 8.0).abs() < 1e-12);
        assert_eq!(m.unique_wallets, 2);
        assert!(m.is_buy_surge);
    }

    #[test]
    fn zero_prices_are_excluded_from_price_stats() {
        let trades = vec![
            trade(0, "a", Side::Buy, 1.0, 0.0),
            trade(1, "b", Side::Buy, 1.0, 0.4),
            trade(2, "c", Side::Buy, 1.0, 0.6),
        ];
        let m = compute_metrics(&trades, &trades[2], |_| false);
        assert!((m.avg_price - 0.5).abs() < 1e-12);
        assert!((m.price_range_pct - 40.0).abs() < 1e-9);
    }

    #[test]
    fn all_zero_prices_yield_zeroed_price_stats() {
        let trades = vec![
            trade(0, "a", Side::Buy, 1.0, 0.0),
            trade(1, "b", Side::Buy, 1.0, 0.0),
        ];
        let m = compute_metrics(&trades, &trades[1], |_| false);
        assert_eq!(m.avg_price, 0.0);
        assert_eq!(m.price_range_pct, 0.0);
        assert_eq!(m.total_volume, 0.0);
        assert!(!m.is_buy_surge);
    }
}
