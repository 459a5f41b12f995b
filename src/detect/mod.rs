//! Anomaly detection and signal-scoring engine.
//!
//! Purely batch and synchronous: one [`AnomalyEngine`] invocation processes
//! one market's trade batch start to finish with no I/O and no shared state,
//! so callers are free to run markets in parallel, one engine run each.

pub mod baseline;
pub mod classifier;
pub mod dedup;
pub mod normalize;
pub mod outcome;
pub mod window;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub use baseline::Baselines;
pub use classifier::{
    DetectorConfig, ImbalanceRule, PriceMoveRule, SeenWallets, VolumeSpikeRule, WalletSurgeRule,
    WhaleTradeRule,
};
pub use outcome::{EventPriceSource, ForwardConfig};

use crate::models::{Event, PricePoint, Trade};

/// Fatal engine errors. Sparse or messy data is never fatal; it surfaces as
/// empty event lists or absent outcome fields instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid trade input: {0}")]
    InvalidInput(String),
}

/// The configured detection pipeline: classify, deduplicate, evaluate.
#[derive(Debug, Clone, Default)]
pub struct AnomalyEngine {
    config: DetectorConfig,
}

impl AnomalyEngine {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Classify a sorted batch and deduplicate the candidates. Outcomes are
    /// left unset.
    pub fn detect(&self, trades: &[Trade]) -> Vec<Event> {
        let candidates = classifier::classify(trades, &self.config);
        debug!(
            trades = trades.len(),
            candidates = candidates.len(),
            "classification pass complete"
        );
        dedup::dedupe(candidates)
    }

    /// Enrich detected events with their forward outcomes.
    pub fn evaluate(
        &self,
        events: &mut [Event],
        trades: &[Trade],
        history: Option<&[PricePoint]>,
    ) {
        outcome::evaluate_all(events, trades, &self.config.forward, history);
    }

    /// Full pipeline over an already-normalized batch.
    pub fn run(&self, trades: &[Trade], history: Option<&[PricePoint]>) -> Vec<Event> {
        let mut events = self.detect(trades);
        self.evaluate(&mut events, trades, history);
        events
    }

    /// Full pipeline from an untyped JSON payload, normalizing first.
    pub fn run_raw(
        &self,
        payload: &Value,
        history: Option<&[PricePoint]>,
    ) -> Result<Vec<Event>, EngineError> {
        let trades = normalize::normalize(normalize::parse_raw(payload)?);
        Ok(self.run(&trades, history))
    }
}
