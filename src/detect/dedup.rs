//! Event deduplication.
//!
//! Candidates sharing an exact timestamp collapse into one event whose
//! anomaly-type set is the union of the inputs. The metrics snapshot of the
//! first candidate wins; metrics are never re-averaged. Ordering follows
//! first occurrence, which for a single classifier pass is chronological.

use std::collections::HashMap;

use crate::models::{AnomalyCandidate, AnomalyKind, Event};

/// Collapse classifier candidates into one event per distinct timestamp.
pub fn dedupe(candidates: Vec<AnomalyCandidate>) -> Vec<Event> {
    let mut by_timestamp: HashMap<i64, usize> = HashMap::with_capacity(candidates.len());
    let mut events: Vec<Event> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        match by_timestamp.get(&candidate.timestamp).copied() {
            Some(idx) => union_kinds(&mut events[idx].kinds, &candidate.kinds),
            None => {
                by_timestamp.insert(candidate.timestamp, events.len());
                events.push(Event::new(
                    candidate.timestamp,
                    candidate.kinds,
                    candidate.metrics,
                ));
            }
        }
    }

    events
}

/// Merge already-deduplicated event streams, e.g. the outputs of several
/// detector configurations over the same batch. Idempotent: merging a merged
/// stream with itself-only input is a no-op.
pub fn merge_events(events: Vec<Event>) -> Vec<Event> {
    let mut by_timestamp: HashMap<i64, usize> = HashMap::with_capacity(events.len());
    let mut merged: Vec<Event> = Vec::with_capacity(events.len());

    for event in events {
        match by_timestamp.get(&event.timestamp).copied() {
            Some(idx) => {
                union_kinds(&mut merged[idx].kinds, &event.kinds);
                if merged[idx].outcome.is_none() {
                    merged[idx].outcome = event.outcome;
                }
            }
            None => {
                by_timestamp.insert(event.timestamp, merged.len());
                merged.push(event);
            }
        }
    }

    merged
}

fn union_kinds(into: &mut Vec<AnomalyKind>, from: &[AnomalyKind]) {
    for kind in from {
        if !into.contains(kind) {
            into.push(*kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WindowMetrics;

    fn metrics(total_volume: f64) -> WindowMetrics {
        WindowMetrics {
            trade_count: 3,
            unique_wallets: 3,
            new_wallets: 0,
            new_wallet_ratio: 0.0,
            buy_volume: total_volume,
            sell_volume: 0.0,
            net_volume: total_volume,
            total_volume,
            avg_price: 0.5,
            price_range_pct: 0.0,
            anchor_notional: 1.0,
            is_buy_surge: true,
        }
    }

    fn candidate(timestamp: i64, kinds: Vec<AnomalyKind>, total_volume: f64) -> AnomalyCandidate {
        AnomalyCandidate {
            timestamp,
            kinds,
            metrics: metrics(total_volume),
        }
    }

    #[test]
    fn same_timestamp_candidates_union_their_kinds() {
        let events = dedupe(vec![
            candidate(100, vec![AnomalyKind::VolumeSpike], 10.0),
            candidate(100, vec![AnomalyKind::Imbalance, AnomalyKind::VolumeSpike], 99.0),
            candidate(200, vec![AnomalyKind::WhaleTrade], 5.0),
        ]);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].kinds,
            vec![AnomalyKind::VolumeSpike, AnomalyKind::Imbalance]
        );
        // First snapshot wins.
        assert_eq!(events[0].metrics.total_volume, 10.0);
        assert_eq!(events[1].kinds, vec![AnomalyKind::WhaleTrade]);
    }

    #[test]
    fn order_follows_first_occurrence() {
        let events = dedupe(vec![
            candidate(300, vec![AnomalyKind::VolumeSpike], 1.0),
            candidate(100, vec![AnomalyKind::WhaleTrade], 1.0),
            candidate(300, vec![AnomalyKind::Imbalance], 1.0),
        ]);
        let order: Vec<i64> = events.iter().map(|e| e.timestamp).collect();
        assert_eq!(order, vec![300, 100]);
    }

    #[test]
    fn merge_is_idempotent() {
        let events = dedupe(vec![
            candidate(100, vec![AnomalyKind::VolumeSpike], 10.0),
            candidate(100, vec![AnomalyKind::Imbalance], 11.0),
            candidate(200, vec![AnomalyKind::WhaleTrade], 5.0),
        ]);
        let once = merge_events(events.clone());
        let twice = merge_events(once.clone());
        assert_eq!(once, events);
        assert_eq!(twice, once);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(dedupe(Vec::new()).is_empty());
    }
}
