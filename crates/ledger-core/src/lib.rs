//! Core library for the ledger server: ingestion, decoding, and bookkeeping
//! for on-chain transaction history across Bitcoin-family and EVM chains.
//!
//! The crate is transport-agnostic the same way the teacher's RPC
//! abstraction was: chain access goes through the [`chain::ChainAdapter`]
//! trait, so HTTP explorers, subgraphs, or a mock can all back it
//! interchangeably. A [`coordinator::Coordinator`] fails over across
//! multiple adapters per chain; a [`raw_store::RawTxStore`] persists
//! ingested transactions; a [`decoding::DecoderRegistry`] turns them into
//! normalized [`types::HistoryEvent`]s; an [`events::EventStore`] indexes
//! the result for querying.

pub mod cache;
pub mod chain;
pub mod config;
pub mod coordinator;
pub mod decoding;
pub mod error;
pub mod events;
pub mod ignored_actions;
pub mod price;
pub mod ranges;
pub mod raw_store;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use cache::TxCache;
pub use chain::{ChainAdapter, QueryOptions};
pub use config::Config;
pub use coordinator::Coordinator;
pub use decoding::{DecoderRegistry, DecodingContext, DecodingOutput};
pub use error::CoreError;
pub use events::EventStore;
pub use ignored_actions::IgnoredActionsManager;
pub use price::{Price, PriceOracle};
pub use ranges::RangeStore;
pub use raw_store::RawTxStore;
pub use types::{
    Address, Chain, HistoryEvent, HistoryEventSubType, HistoryEventType, QueryRange, RawTransaction,
};
