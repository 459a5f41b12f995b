//! PolySurge backend library.
//!
//! Batch anomaly detection over Polymarket trade streams with forward-return
//! backtesting. The `detect` module is the pure engine; `scrapers` and
//! `report` are the I/O and presentation collaborators around it.

pub mod config;
pub mod detect;
pub mod models;
pub mod report;
pub mod scrapers;
