//! In-memory LRU cache of decoded raw transactions.
//!
//! Sits in front of `raw_store::RawTxStore` the same way the teacher's
//! `Cache` sits in front of RPC calls: an async-friendly
//! `tokio::sync::Mutex<LruCache<_, _>>`, because LRU reads mutate recency
//! tracking and so need mutable access even on a "read".

use std::num::NonZeroUsize;

use lru::LruCache;
use tokio::sync::Mutex;

use crate::types::{Chain, RawTransaction};

/// Default maximum number of cached raw transactions.
const DEFAULT_TX_CAPACITY: usize = 20_000;

/// In-memory LRU cache of raw transactions keyed by `(chain, tx_id)`.
/// Shared across the coordinator and raw store via `Arc<TxCache>`.
pub struct TxCache {
    transactions: Mutex<LruCache<(Chain, String), RawTransaction>>,
}

impl TxCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TX_CAPACITY)
    }

    pub fn with_capacity(tx_cap: usize) -> Self {
        Self {
            transactions: Mutex::new(LruCache::new(
                NonZeroUsize::new(tx_cap).expect("tx capacity must be > 0"),
            )),
        }
    }

    pub async fn get(&self, chain: Chain, tx_id: &str) -> Option<RawTransaction> {
        self.transactions
            .lock()
            .await
            .get(&(chain, tx_id.to_string()))
            .cloned()
    }

    pub async fn insert(&self, tx: RawTransaction) {
        let key = (tx.chain, tx.tx_id.clone());
        self.transactions.lock().await.put(key, tx);
    }
}

impl Default for TxCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::make_btc_tx;

    #[tokio::test]
    async fn cache_returns_none_for_unknown_tx() {
        let cache = TxCache::new();
        assert!(cache.get(Chain::Btc, "deadbeef").await.is_none());
    }

    #[tokio::test]
    async fn cache_returns_inserted_tx() {
        let cache = TxCache::new();
        let tx = make_btc_tx("tx1", vec![], vec![]);
        cache.insert(tx.clone()).await;

        let cached = cache.get(Chain::Btc, "tx1").await.expect("should be cached");
        assert_eq!(cached.tx_id, tx.tx_id);
    }

    #[tokio::test]
    async fn cache_evicts_lru_entry() {
        let cache = TxCache::with_capacity(2);
        cache.insert(make_btc_tx("a", vec![], vec![])).await;
        cache.insert(make_btc_tx("b", vec![], vec![])).await;
        cache.insert(make_btc_tx("c", vec![], vec![])).await;

        assert!(cache.get(Chain::Btc, "a").await.is_none(), "oldest should be evicted");
        assert!(cache.get(Chain::Btc, "b").await.is_some());
        assert!(cache.get(Chain::Btc, "c").await.is_some());
    }
}
