//! Environment-driven application configuration.

use anyhow::Result;

/// Runtime settings for the fetch clients and the backtest runner. Detector
/// thresholds live in [`crate::detect::DetectorConfig`], not here.
#[derive(Debug, Clone)]
pub struct Config {
    pub gamma_base: String,
    pub data_api_base: String,
    pub user_agent: String,
    /// Pause between per-market fetches so the Data API is not hammered.
    pub market_pacing_ms: u64,
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let gamma_base = std::env::var("GAMMA_API_BASE")
            .unwrap_or_else(|_| "https://gamma-api.polymarket.com".to_string());

        let data_api_base = std::env::var("DATA_API_BASE")
            .unwrap_or_else(|_| "https://data-api.polymarket.com".to_string());

        let user_agent = std::env::var("POLYSURGE_USER_AGENT")
            .unwrap_or_else(|_| "PolySurge/1.0 (Anomaly Backtester)".to_string());

        let market_pacing_ms = std::env::var("MARKET_PACING_MS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .unwrap_or(300);

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        Ok(Self {
            gamma_base,
            data_api_base,
            user_agent,
            market_pacing_ms,
            request_timeout_secs,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gamma_base: "https://gamma-api.polymarket.com".to_string(),
            data_api_base: "https://data-api.polymarket.com".to_string(),
            user_agent: "PolySurge/1.0 (Anomaly Backtester)".to_string(),
            market_pacing_ms: 300,
            request_timeout_secs: 30,
        }
    }
}
