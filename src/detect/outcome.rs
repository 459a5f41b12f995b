//! Forward-looking outcome evaluation.
//!
//! For each event, look `horizon_secs` ahead, compute the realized price
//! change and judge whether the event's dominant trading side called the
//! direction. No-lookahead is the hard invariant here: the event price only
//! reads trades at-or-before the event, the final price only reads strictly
//! later data. Thin forward data yields an absent outcome, never an error.

use serde::{Deserialize, Serialize};

use crate::models::{Event, Outcome, PricePoint, Trade};

/// Where the pre-event reference price comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriceSource {
    /// The triggering window's own average price.
    WindowAverage,
    /// Mean price of the last `reference_trades` trades at-or-before the
    /// event.
    TrailingMean,
}

/// Forward-evaluation parameters. The reference-trade count and epsilon are
/// product-tuning knobs with no settled value, so they stay configurable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForwardConfig {
    pub horizon_secs: i64,
    pub reference_trades: usize,
    pub min_future_trades: usize,
    /// Tolerance so noise-level moves are not credited as correct calls.
    pub epsilon: f64,
    pub event_price_source: EventPriceSource,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            horizon_secs: 1800,
            reference_trades: 3,
            min_future_trades: 2,
            epsilon: 0.001,
            event_price_source: EventPriceSource::TrailingMean,
        }
    }
}

/// Evaluate one event against the full sorted trade batch, optionally
/// preferring fetched price-history points for the forward reference price.
/// Returns `None` when the data is too thin to judge the signal.
pub fn evaluate(
    event: &Event,
    trades: &[Trade],
    config: &ForwardConfig,
    history: Option<&[PricePoint]>,
) -> Option<Outcome> {
    let event_time = event.timestamp;

    // First index strictly after the event; trades before it are the past.
    let split = trades.partition_point(|t| t.timestamp <= event_time);

    let event_price = match config.event_price_source {
        EventPriceSource::WindowAverage => event.metrics.avg_price,
        EventPriceSource::TrailingMean => {
            let past = &trades[..split];
            if past.is_empty() {
                return None;
            }
            let tail = &past[past.len().saturating_sub(config.reference_trades)..];
            mean(tail.iter().map(|t| t.price))
        }
    };
    if event_price <= 0.0 {
        return None;
    }

    let horizon_end = event_time + config.horizon_secs;
    let end = trades.partition_point(|t| t.timestamp <= horizon_end);
    let future = &trades[split..end];

    let history_prices: Vec<f64> = history
        .map(|points| {
            points
                .iter()
                .filter(|p| p.timestamp > event_time && p.timestamp <= horizon_end)
                .map(|p| p.price)
                .collect()
        })
        .unwrap_or_default();

    let final_price = if !history_prices.is_empty() {
        tail_mean(&history_prices, config.reference_trades)
    } else {
        if future.len() < config.min_future_trades {
            return None;
        }
        let prices: Vec<f64> = future.iter().map(|t| t.price).collect();
        if prices.len() >= config.reference_trades {
            tail_mean(&prices, config.reference_trades)
        } else {
            *prices.last()?
        }
    };

    let price_change = final_price - event_price;
    let price_change_pct = price_change / event_price * 100.0;
    let signal_correct = if event.metrics.is_buy_surge {
        price_change > config.epsilon
    } else {
        price_change < -config.epsilon
    };

    Some(Outcome {
        event_price,
        final_price,
        price_change,
        price_change_pct,
        signal_correct,
        future_trade_count: future.len(),
    })
}

/// Enrich a whole event sequence in place.
pub fn evaluate_all(
    events: &mut [Event],
    trades: &[Trade],
    config: &ForwardConfig,
    history: Option<&[PricePoint]>,
) {
    for event in events.iter_mut() {
        event.outcome = evaluate(event, trades, config, history);
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count > 0 {
        sum / count as f64
    } else {
        0.0
    }
}

fn tail_mean(values: &[f64], count: usize) -> f64 {
    let tail = &values[values.len().saturating_sub(count)..];
    mean(tail.iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyKind, Side, WindowMetrics};

    fn trade(timestamp: i64, price: f64) -> Trade {
        Trade {
            timestamp,
            wallet: "w".to_string(),
            side: Side::Buy,
            size: 1.0,
            price,
        }
    }

    fn buy_event(timestamp: i64, avg_price: f64) -> Event {
        Event::new(
            timestamp,
            vec![AnomalyKind::WalletSurge],
            WindowMetrics {
                trade_count: 5,
                unique_wallets: 5,
                new_wallets: 5,
                new_wallet_ratio: 1.0,
                buy_volume: 10.0,
                sell_volume: 0.0,
                net_volume: 10.0,
                total_volume: 10.0,
                avg_price,
                price_range_pct: 0.0,
                anchor_notional: 1.0,
                is_buy_surge: true,
            },
        )
    }

    fn window_avg_config() -> ForwardConfig {
        ForwardConfig {
            horizon_secs: 1800,
            reference_trades: 3,
            min_future_trades: 2,
            epsilon: 0.0,
            event_price_source: EventPriceSource::WindowAverage,
        }
    }

    #[test]
    fn correct_buy_call_on_rising_forward_prices() {
        // Event at t=1000 with avg price 0.50; forward trades at 1100..1700
        // whose last three average 0.60.
        let trades: Vec<Trade> = vec![
            trade(500, 0.50),
            trade(1000, 0.50),
            trade(1100, 0.52),
            trade(1200, 0.54),
            trade(1300, 0.55),
            trade(1400, 0.58),
            trade(1500, 0.60),
            trade(1600, 0.60),
            trade(1700, 0.60),
        ];
        let event = buy_event(1000, 0.50);
        let outcome = evaluate(&event, &trades, &window_avg_config(), None).unwrap();
        assert!((outcome.price_change - 0.10).abs() < 1e-9);
        assert!((outcome.price_change_pct - 20.0).abs() < 1e-9);
        assert!(outcome.signal_correct);
        assert_eq!(outcome.future_trade_count, 7);
    }

    #[test]
    fn sell_surge_is_correct_only_on_falling_prices() {
        let trades: Vec<Trade> = vec![
            trade(1000, 0.50),
            trade(1100, 0.40),
            trade(1200, 0.40),
        ];
        let mut event = buy_event(1000, 0.50);
        event.metrics.is_buy_surge = false;
        event.metrics.net_volume = -10.0;
        let outcome = evaluate(&event, &trades, &window_avg_config(), None).unwrap();
        assert!(outcome.price_change < 0.0);
        assert!(outcome.signal_correct);
    }

    #[test]
    fn epsilon_discounts_noise_level_moves() {
        let trades: Vec<Trade> = vec![
            trade(1000, 0.500),
            trade(1100, 0.5005),
            trade(1200, 0.5005),
        ];
        let event = buy_event(1000, 0.500);
        let mut config = window_avg_config();
        config.epsilon = 0.001;
        let outcome = evaluate(&event, &trades, &config, None).unwrap();
        assert!(!outcome.signal_correct);
    }

    #[test]
    fn too_few_future_trades_yields_unknown() {
        let trades: Vec<Trade> = vec![trade(1000, 0.50), trade(1100, 0.60)];
        let event = buy_event(1000, 0.50);
        assert!(evaluate(&event, &trades, &window_avg_config(), None).is_none());
    }

    #[test]
    fn trades_beyond_the_horizon_are_ignored() {
        let trades: Vec<Trade> = vec![
            trade(1000, 0.50),
            trade(1100, 0.55),
            trade(1200, 0.55),
            trade(10_000, 0.99), // outside the 1800s horizon
        ];
        let event = buy_event(1000, 0.50);
        let outcome = evaluate(&event, &trades, &window_avg_config(), None).unwrap();
        assert_eq!(outcome.future_trade_count, 2);
        assert!((outcome.final_price - 0.55).abs() < 1e-12);
    }

    #[test]
    fn zero_event_price_yields_unknown() {
        let trades: Vec<Trade> = vec![trade(1000, 0.0), trade(1100, 0.5), trade(1200, 0.5)];
        let event = buy_event(1000, 0.0);
        assert!(evaluate(&event, &trades, &window_avg_config(), None).is_none());
    }

    #[test]
    fn trailing_mean_reads_only_past_trades() {
        let mut config = window_avg_config();
        config.event_price_source = EventPriceSource::TrailingMean;

        let mut trades: Vec<Trade> = vec![
            trade(800, 0.40),
            trade(900, 0.50),
            trade(1000, 0.60),
            trade(1100, 0.70),
            trade(1200, 0.80),
        ];
        let event = buy_event(1000, 0.0);
        let before = evaluate(&event, &trades, &config, None).unwrap();
        assert!((before.event_price - 0.50).abs() < 1e-12);

        // Mutating future trades must not move the event price.
        trades[3].price = 0.01;
        trades[4].price = 0.02;
        let after = evaluate(&event, &trades, &config, None).unwrap();
        assert_eq!(after.event_price, before.event_price);
    }

    #[test]
    fn history_points_supply_the_forward_price_when_present() {
        let trades: Vec<Trade> = vec![trade(1000, 0.50), trade(1100, 0.10), trade(1200, 0.10)];
        let history = vec![
            PricePoint {
                timestamp: 1500,
                price: 0.70,
            },
            PricePoint {
                timestamp: 5000, // outside the horizon
                price: 0.01,
            },
        ];
        let event = buy_event(1000, 0.50);
        let outcome = evaluate(&event, &trades, &window_avg_config(), Some(&history)).unwrap();
        assert!((outcome.final_price - 0.70).abs() < 1e-12);
        assert!(outcome.signal_correct);
    }
}
