pub mod polymarket;

pub use polymarket::{MarketInfo, MarketKind, PolymarketClient};
