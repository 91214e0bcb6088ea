//! The price-oracle seam (spec.md section 1): fiat/spot pricing is an
//! external collaborator this crate never implements, only calls through.
//! Shaped the same way [`crate::chain::ChainAdapter`] gives a uniform
//! contract to otherwise-unrelated providers.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::Chain;

/// A spot price: `amount` units of `quote_asset` per one unit of the asset
/// that was priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Price {
    pub amount: Decimal,
}

impl Price {
    pub fn new(amount: Decimal) -> Self {
        Self { amount }
    }
}

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("no price known for {asset} at {timestamp_ms}")]
    NotFound { asset: String, timestamp_ms: i64 },
    #[error("price oracle unavailable: {0}")]
    Unavailable(String),
}

/// `PriceOracle.price(asset, ts) -> Price`: the tax-accounting engine's
/// dependency on fiat/spot prices, consumed but never produced by this
/// crate. `chain` disambiguates assets that share a ticker across chains
/// (e.g. a native currency vs. a wrapped ERC-20 of the same symbol).
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn price(&self, chain: Chain, asset: &str, timestamp_ms: i64) -> Result<Price, PriceError>;
}
