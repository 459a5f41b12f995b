//! Polymarket Gamma & Data API clients.
//!
//! External collaborators of the engine: market discovery, trade batches and
//! price history. All retrieval concerns (timeouts, retries, rate limits)
//! live here; the engine itself never performs I/O.

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::{PricePoint, RawTrade};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 200;

/// Simple fixed-window rate limiter to respect published API limits.
struct RateLimiter {
    requests_per_10s: u32,
    current_requests: u32,
    window_start: std::time::Instant,
}

impl RateLimiter {
    fn new(requests_per_10s: u32) -> Self {
        Self {
            requests_per_10s,
            current_requests: 0,
            window_start: std::time::Instant::now(),
        }
    }

    async fn acquire(&mut self) {
        let elapsed = self.window_start.elapsed();

        if elapsed >= Duration::from_secs(10) {
            self.current_requests = 0;
            self.window_start = std::time::Instant::now();
        }

        if self.current_requests >= self.requests_per_10s {
            let wait_time = Duration::from_secs(10).saturating_sub(elapsed);
            if wait_time > Duration::ZERO {
                debug!("Rate limiting: waiting {}ms", wait_time.as_millis());
                sleep(wait_time).await;
            }
            self.current_requests = 0;
            self.window_start = std::time::Instant::now();
        }

        self.current_requests += 1;
    }
}

/// Coarse market categorization by slug/question keywords, used to filter
/// and to break down backtest results by market family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    ShortTerm,
    Sports,
    General,
}

impl MarketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::ShortTerm => "short_term",
            MarketKind::Sports => "sports",
            MarketKind::General => "general",
        }
    }

    /// Classify from the market's slug and question text.
    pub fn classify(slug: &str, question: &str) -> Self {
        const SHORT_TERM: &[&str] = &["15m", "30m", "1h", "hour", "minute", "daily", "today"];
        const SPORTS: &[&str] = &[
            "nba", "nfl", "mlb", "nhl", "soccer", "football", "basketball", "baseball", "hockey",
            "tennis", "match", "game", "vs.", "vs ", "euro", "copa", "league", "win-on", "win on",
            "beat",
        ];

        let slug = slug.to_lowercase();
        let question = question.to_lowercase();
        let hit = |keys: &[&str]| keys.iter().any(|k| slug.contains(k) || question.contains(k));

        if hit(SHORT_TERM) {
            MarketKind::ShortTerm
        } else if hit(SPORTS) {
            MarketKind::Sports
        } else {
            MarketKind::General
        }
    }
}

/// One discoverable market, already classified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInfo {
    pub condition_id: String,
    pub question: String,
    pub slug: String,
    pub kind: MarketKind,
    pub volume_24h: f64,
}

/// Raw Gamma `/markets` row. Gamma is loose about types, so numeric fields
/// tolerate string encodings and several naming generations coexist.
#[derive(Debug, Clone, Deserialize)]
struct GammaMarket {
    #[serde(rename = "conditionId", default)]
    condition_id: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    slug: String,
    #[serde(rename = "volume24hrClob", default, deserialize_with = "de_f64_opt")]
    volume_24hr_clob: Option<f64>,
    #[serde(rename = "volume24hr", default, deserialize_with = "de_f64_opt")]
    volume_24hr: Option<f64>,
}

impl GammaMarket {
    fn volume_24h(&self) -> f64 {
        self.volume_24hr_clob
            .or(self.volume_24hr)
            .unwrap_or(0.0)
    }
}

fn de_f64_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.is_empty() => s.parse::<f64>().ok(),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
struct PriceHistoryResponse {
    #[serde(default)]
    history: Vec<PricePoint>,
}

pub struct PolymarketClient {
    client: Client,
    config: Config,
    gamma_limiter: RateLimiter,
    data_limiter: RateLimiter,
}

impl PolymarketClient {
    pub fn new(config: Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            config,
            gamma_limiter: RateLimiter::new(75), // 750/10s published, be conservative
            data_limiter: RateLimiter::new(20),  // 200/10s
        })
    }

    /// Fetch active markets ordered by 24h volume, classify them, and keep
    /// the first `limit` that pass the kind filter.
    pub async fn fetch_markets(
        &mut self,
        limit: usize,
        exclude: &[MarketKind],
    ) -> Result<Vec<MarketInfo>> {
        self.gamma_limiter.acquire().await;

        let url = format!("{}/markets", self.config.gamma_base);
        let response = self
            .execute_with_retry(&url, &[
                ("limit", "300"),
                ("active", "true"),
                ("closed", "false"),
                ("order", "volume24hr"),
                ("ascending", "false"),
            ])
            .await?;

        let rows: Vec<GammaMarket> = response
            .json()
            .await
            .context("Failed to parse gamma markets response")?;

        let mut markets = Vec::with_capacity(limit);
        for row in rows {
            if row.condition_id.is_empty() {
                continue;
            }
            let kind = MarketKind::classify(&row.slug, &row.question);
            if exclude.contains(&kind) {
                continue;
            }
            let volume_24h = row.volume_24h();
            markets.push(MarketInfo {
                condition_id: row.condition_id,
                question: row.question,
                slug: row.slug,
                kind,
                volume_24h,
            });
            if markets.len() >= limit {
                break;
            }
        }

        info!("Fetched {} markets from Gamma", markets.len());
        Ok(markets)
    }

    /// Fetch up to `limit` trades for one market. Tolerant record-level
    /// parsing happens in the [`RawTrade`] serde layer.
    pub async fn fetch_trades(&mut self, condition_id: &str, limit: usize) -> Result<Vec<RawTrade>> {
        self.data_limiter.acquire().await;

        let url = format!("{}/trades", self.config.data_api_base);
        let limit = limit.to_string();
        let response = self
            .execute_with_retry(&url, &[("market", condition_id), ("limit", limit.as_str())])
            .await?;

        let trades: Vec<RawTrade> = response
            .json()
            .await
            .context("Failed to parse trades response")?;

        debug!(market = condition_id, trades = trades.len(), "trades fetched");
        Ok(trades)
    }

    /// Fetch the hourly price history for one market. Missing history is an
    /// empty series, not an error; the engine degrades to trade prices.
    pub async fn fetch_price_history(&mut self, condition_id: &str) -> Result<Vec<PricePoint>> {
        self.data_limiter.acquire().await;

        let url = format!("{}/prices-history", self.config.data_api_base);
        let response = match self
            .execute_with_retry(&url, &[
                ("market", condition_id),
                ("interval", "1h"),
                ("fidelity", "60"),
            ])
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(market = condition_id, error = %e, "price history unavailable");
                return Ok(Vec::new());
            }
        };

        let parsed: PriceHistoryResponse = response
            .json()
            .await
            .context("Failed to parse price history response")?;
        Ok(parsed.history)
    }

    async fn execute_with_retry(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        for attempt in 0..MAX_RETRIES {
            match self.client.get(url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        warn!(
                            url,
                            %status,
                            attempt,
                            "request failed with retryable status"
                        );
                    } else {
                        anyhow::bail!("request to {} failed with status {}", url, status);
                    }
                }
                Err(e) => {
                    warn!(url, error = %e, attempt, "request error");
                }
            }

            if attempt + 1 < MAX_RETRIES {
                sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
            }
        }

        anyhow::bail!("request to {} failed after {} attempts", url, MAX_RETRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_sports_markets() {
        assert_eq!(
            MarketKind::classify("lakers-vs-celtics-win-on-friday", ""),
            MarketKind::Sports
        );
        assert_eq!(
            MarketKind::classify("", "Will the Chiefs beat the Bills?"),
            MarketKind::Sports
        );
    }

    #[test]
    fn classifies_short_term_markets() {
        assert_eq!(
            MarketKind::classify("btc-updown-15m-1762755300", ""),
            MarketKind::ShortTerm
        );
    }

    #[test]
    fn defaults_to_general() {
        assert_eq!(
            MarketKind::classify("fed-rate-cut-september", "Will the Fed cut rates?"),
            MarketKind::General
        );
    }

    #[test]
    fn gamma_market_volume_prefers_clob_field() {
        let m: GammaMarket = serde_json::from_str(
            r#"{"conditionId":"0x1","slug":"s","question":"q","volume24hrClob":"120.5","volume24hr":99.0}"#,
        )
        .unwrap();
        assert_eq!(m.volume_24h(), 120.5);

        let m: GammaMarket =
            serde_json::from_str(r#"{"conditionId":"0x1","slug":"s","volume24hr":99.0}"#).unwrap();
        assert_eq!(m.volume_24h(), 99.0);
    }
}
