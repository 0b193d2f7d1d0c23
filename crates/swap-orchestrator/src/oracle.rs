//! Embedded price oracle capability (§6 `priceGet`). No concrete oracle
//! ships here (§1 Explicitly out of scope) — only the trait the Price
//! Guard's callers (the orchestrators) consume.

use async_trait::async_trait;
use swap_core::price_guard::PriceSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum PriceOracleError {
    #[error("price oracle call failed: {0}")]
    Failed(String),
    #[error("oracle has no price for pair {0}")]
    NoPrice(String),
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// The most recent BTC/USDT median, scaled consistently with the
    /// implied prices the orchestrators compute (§4.7 treats the scale as
    /// opaque — only the ratio between `median` and `implied` matters).
    async fn median_btc_usdt(&self) -> Result<PriceSnapshot, PriceOracleError>;
}
