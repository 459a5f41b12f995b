//! Core data model shared by the detection engine, the fetch clients and the
//! reporting layer.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Trade direction as reported by the Data API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    #[default]
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// One trade record as it arrives from the Data API.
///
/// Upstream feeds are not fully reliable, so every field is optional on the
/// wire and defaults to a neutral value instead of failing the whole batch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTrade {
    #[serde(default, deserialize_with = "de_i64_lenient")]
    pub timestamp: i64,
    #[serde(rename = "proxyWallet", alias = "wallet_id", default)]
    pub wallet: String,
    #[serde(default, deserialize_with = "de_side_lenient")]
    pub side: Side,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub size: f64,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub price: f64,
}

/// Canonical, validated trade. Immutable once constructed; the engine only
/// ever derives new records from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub timestamp: i64,
    pub wallet: String,
    pub side: Side,
    pub size: f64,
    pub price: f64,
}

impl Trade {
    /// Size times price, in collateral units.
    pub fn notional(&self) -> f64 {
        self.size * self.price
    }
}

impl From<RawTrade> for Trade {
    fn from(raw: RawTrade) -> Self {
        Self {
            timestamp: raw.timestamp,
            wallet: raw.wallet,
            side: raw.side,
            size: raw.size.max(0.0),
            price: raw.price,
        }
    }
}

/// One point of the `/prices-history` series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "p", deserialize_with = "de_f64_lenient")]
    pub price: f64,
}

/// The anomaly predicates the classifier can fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    WalletSurge,
    VolumeSpike,
    WhaleTrade,
    Imbalance,
    PriceMove,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::WalletSurge => "wallet_surge",
            AnomalyKind::VolumeSpike => "volume_spike",
            AnomalyKind::WhaleTrade => "whale_trade",
            AnomalyKind::Imbalance => "imbalance",
            AnomalyKind::PriceMove => "price_move",
        }
    }
}

/// Metrics snapshot for one trailing window, taken at classification time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub trade_count: usize,
    pub unique_wallets: usize,
    pub new_wallets: usize,
    pub new_wallet_ratio: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub net_volume: f64,
    pub total_volume: f64,
    /// Mean over the positive prices in the window; 0.0 when none.
    pub avg_price: f64,
    /// (max - min) / avg over positive window prices, in percent.
    pub price_range_pct: f64,
    /// Notional of the anchor trade itself.
    pub anchor_notional: f64,
    pub is_buy_surge: bool,
}

/// Classification result for one anchor trade. Transient: produced by the
/// classifier, consumed by the deduplicator.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyCandidate {
    pub timestamp: i64,
    pub kinds: Vec<AnomalyKind>,
    pub metrics: WindowMetrics,
}

/// Realized forward price move for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub event_price: f64,
    pub final_price: f64,
    pub price_change: f64,
    pub price_change_pct: f64,
    pub signal_correct: bool,
    pub future_trade_count: usize,
}

/// Deduplicated, externally visible anomaly event, optionally enriched with
/// its forward outcome. Absent outcome means the forward data was too thin to
/// judge the signal, which is an expected result, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: i64,
    pub datetime: String,
    #[serde(rename = "anomaly_types")]
    pub kinds: Vec<AnomalyKind>,
    #[serde(flatten)]
    pub metrics: WindowMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

impl Event {
    pub fn new(timestamp: i64, kinds: Vec<AnomalyKind>, metrics: WindowMetrics) -> Self {
        Self {
            timestamp,
            datetime: format_timestamp(timestamp),
            kinds,
            metrics,
            outcome: None,
        }
    }
}

/// Epoch seconds to RFC 3339 (UTC). Out-of-range values fall back to the raw
/// number so a corrupt timestamp never aborts a batch.
pub fn format_timestamp(timestamp: i64) -> String {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}

// Gamma and the Data API are inconsistent about numeric fields: the same
// field can arrive as a number, a string, or null depending on endpoint
// version. These helpers accept all of them.

fn de_f64_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn de_i64_lenient<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .or_else(|_| s.trim().parse::<f64>().map(|f| f as i64))
            .unwrap_or(0),
        _ => 0,
    })
}

fn de_side_lenient<'de, D>(deserializer: D) -> Result<Side, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(match v {
        Value::String(s) if s.eq_ignore_ascii_case("sell") => Side::Sell,
        _ => Side::Buy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_trade_defaults_missing_fields() {
        let raw: RawTrade = serde_json::from_str("{}").unwrap();
        assert_eq!(raw.timestamp, 0);
        assert_eq!(raw.wallet, "");
        assert_eq!(raw.side, Side::Buy);
        assert_eq!(raw.size, 0.0);
        assert_eq!(raw.price, 0.0);
    }

    #[test]
    fn raw_trade_accepts_stringly_numbers() {
        let raw: RawTrade = serde_json::from_str(
            r#"{"timestamp":"1700000000","proxyWallet":"0xabc","side":"SELL","size":"12.5","price":0.42}"#,
        )
        .unwrap();
        assert_eq!(raw.timestamp, 1_700_000_000);
        assert_eq!(raw.wallet, "0xabc");
        assert_eq!(raw.side, Side::Sell);
        assert_eq!(raw.size, 12.5);
        assert_eq!(raw.price, 0.42);
    }

    #[test]
    fn raw_trade_garbage_numbers_default_to_zero() {
        let raw: RawTrade =
            serde_json::from_str(r#"{"timestamp":1,"size":"n/a","price":null,"side":"hold"}"#)
                .unwrap();
        assert_eq!(raw.size, 0.0);
        assert_eq!(raw.price, 0.0);
        assert_eq!(raw.side, Side::Buy);
    }

    #[test]
    fn notional_is_size_times_price() {
        let trade = Trade {
            timestamp: 0,
            wallet: "w".into(),
            side: Side::Buy,
            size: 100.0,
            price: 0.4,
        };
        assert!((trade.notional() - 40.0).abs() < 1e-12);
    }

    #[test]
    fn event_serializes_with_flattened_metrics() {
        let event = Event::new(
            1_700_000_000,
            vec![AnomalyKind::WalletSurge],
            WindowMetrics {
                trade_count: 5,
                unique_wallets: 5,
                new_wallets: 5,
                new_wallet_ratio: 1.0,
                buy_volume: 10.0,
                sell_volume: 2.0,
                net_volume: 8.0,
                total_volume: 12.0,
                avg_price: 0.5,
                price_range_pct: 4.0,
                anchor_notional: 3.0,
                is_buy_surge: true,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["anomaly_types"][0], "wallet_surge");
        assert_eq!(json["unique_wallets"], 5);
        assert!(json.get("outcome").is_none());
    }
}
