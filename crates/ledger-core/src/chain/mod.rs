//! Component B: external-source adapters (spec.md section 4.B).
//!
//! One adapter per provider, all implementing the same [`ChainAdapter`]
//! contract the way the teacher's `rpc::BitcoinRpc` trait gives a uniform
//! shape to Bitcoin Core's JSON-RPC surface. `transactions` has a default
//! `Unsupported` implementation since some providers (subgraphs,
//! metadata-only sources) never serve a tx stream.

pub mod bch;
pub mod btc;
pub mod evm;
pub mod http;
pub mod mock;

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::AdapterError;
use crate::types::{Address, Interval, RawTransaction};

/// Options for a `transactions` call: the wall-clock window to fetch and an
/// optional resume cursor for block-height-paginated providers.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    pub window: Option<Interval>,
    pub resume_before_block: Option<u64>,
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Stable provider name used in coordinator error messages and
    /// rate-limit quarantine bookkeeping.
    fn name(&self) -> &str;

    async fn balances(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, Decimal>, AdapterError>;

    async fn has_activity(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, (bool, Decimal)>, AdapterError>;

    /// Fetch raw transactions for `addresses` within `options.window`.
    /// Returns the latest block height observed and the transactions
    /// found. Adapters that cannot serve a tx stream (e.g. subgraph
    /// metadata providers, or Bitcoin providers lacking P2PK support)
    /// leave this as `Unsupported`.
    async fn transactions(
        &self,
        _addresses: &[Address],
        _options: QueryOptions,
    ) -> Result<(Option<u64>, Vec<RawTransaction>), AdapterError> {
        Err(AdapterError::Unsupported("transactions".to_string()))
    }
}
