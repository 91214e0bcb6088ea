//! Component D: the raw-transaction store (spec.md section 4.D).
//!
//! Write-behind store keyed by `(chain, tx_id)`. Writing the same tx twice
//! is a no-op; ingestion also maintains `address -> [tx_id]` link rows so
//! "query transactions for address X" can be answered from the local store
//! without re-hitting an adapter.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::types::{Address, Chain, RawTransaction};

#[derive(Default)]
struct Inner {
    by_id: HashMap<(Chain, String), RawTransaction>,
    links: HashMap<(Chain, String), Vec<String>>,
    pending_decode: Vec<(Chain, String)>,
}

/// Result of ingesting one raw transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    AlreadyPresent,
}

#[derive(Default)]
pub struct RawTxStore {
    inner: RwLock<Inner>,
}

impl RawTxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist `tx` and a link row for every tracked address that appears
    /// in it (inputs/outputs for Bitcoin-family, sender/receiver/log
    /// participants for EVM). Idempotent by `(chain, tx_id)`.
    pub async fn ingest(&self, tx: RawTransaction, tracked: &[Address]) -> IngestOutcome {
        let key = (tx.chain, tx.tx_id.clone());
        let mut inner = self.inner.write().await;
        if inner.by_id.contains_key(&key) {
            return IngestOutcome::AlreadyPresent;
        }

        for addr in participants(&tx, tracked) {
            inner
                .links
                .entry((tx.chain, addr))
                .or_default()
                .push(tx.tx_id.clone());
        }
        inner.pending_decode.push(key.clone());
        inner.by_id.insert(key, tx);
        IngestOutcome::Inserted
    }

    pub async fn get(&self, chain: Chain, tx_id: &str) -> Option<RawTransaction> {
        self.inner.read().await.by_id.get(&(chain, tx_id.to_string())).cloned()
    }

    pub async fn for_address(&self, chain: Chain, address: &str) -> Vec<RawTransaction> {
        let inner = self.inner.read().await;
        inner
            .links
            .get(&(chain, address.to_string()))
            .into_iter()
            .flatten()
            .filter_map(|tx_id| inner.by_id.get(&(chain, tx_id.clone())).cloned())
            .collect()
    }

    /// Drain transactions awaiting a decoding pass (`_maybe_decode_pending`
    /// in spec.md section 4.G).
    pub async fn drain_pending_decode(&self) -> Vec<RawTransaction> {
        let mut inner = self.inner.write().await;
        let keys = std::mem::take(&mut inner.pending_decode);
        keys.into_iter()
            .filter_map(|key| inner.by_id.get(&key).cloned())
            .collect()
    }

    /// Removes only the link rows for `address`, preserving the raw
    /// transactions themselves (invariant 6: another address may still
    /// reference them).
    pub async fn unlink_address(&self, chain: Chain, address: &str) {
        self.inner.write().await.links.remove(&(chain, address.to_string()));
    }

    /// Admin "purge all data for chain X" operation (spec.md section 3,
    /// RawTransactions lifecycle).
    pub async fn purge_chain(&self, chain: Chain) {
        let mut inner = self.inner.write().await;
        inner.by_id.retain(|(c, _), _| *c != chain);
        inner.links.retain(|(c, _), _| *c != chain);
        inner.pending_decode.retain(|(c, _)| *c != chain);
    }
}

fn participants(tx: &RawTransaction, tracked: &[Address]) -> Vec<String> {
    let tracked_canonical: std::collections::HashSet<&str> =
        tracked.iter().map(|a| a.canonical.as_str()).collect();

    let mut found = Vec::new();
    for io in tx.inputs.iter().chain(tx.outputs.iter()) {
        if let Some(addr) = &io.address {
            if tracked_canonical.contains(addr.canonical.as_str()) && !found.contains(&addr.canonical) {
                found.push(addr.canonical.clone());
            }
        }
    }
    if let Some(evm) = &tx.evm {
        if tracked_canonical.contains(evm.from.as_str()) && !found.contains(&evm.from) {
            found.push(evm.from.clone());
        }
        if let Some(to) = &evm.to {
            if tracked_canonical.contains(to.as_str()) && !found.contains(to) {
                found.push(to.clone());
            }
        }
    }
    for log in &tx.logs {
        if tracked_canonical.contains(log.address.as_str()) && !found.contains(&log.address) {
            found.push(log.address.clone());
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::make_btc_tx;

    #[tokio::test]
    async fn ingest_is_idempotent() {
        let store = RawTxStore::new();
        let tx = make_btc_tx("tx1", vec![], vec![]);
        assert_eq!(store.ingest(tx.clone(), &[]).await, IngestOutcome::Inserted);
        assert_eq!(store.ingest(tx, &[]).await, IngestOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn for_address_returns_linked_transactions() {
        use crate::types::{IoDirection, ScriptType, TxIo};
        let tracked = Address::new(Chain::Btc, "addr1");
        let tx = RawTransaction {
            outputs: vec![TxIo {
                direction: IoDirection::Out,
                value: rust_decimal::Decimal::ONE,
                script_bytes: vec![],
                script_type: ScriptType::P2wpkh,
                address: Some(tracked.clone()),
            }],
            ..make_btc_tx("tx1", vec![], vec![])
        };
        let store = RawTxStore::new();
        store.ingest(tx, &[tracked.clone()]).await;

        let found = store.for_address(Chain::Btc, "addr1").await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tx_id, "tx1");
    }

    #[tokio::test]
    async fn purge_chain_removes_txs_and_links() {
        let tracked = Address::new(Chain::Btc, "addr1");
        let store = RawTxStore::new();
        store.ingest(make_btc_tx("tx1", vec![], vec![]), &[tracked]).await;
        store.purge_chain(Chain::Btc).await;
        assert!(store.get(Chain::Btc, "tx1").await.is_none());
    }

    #[tokio::test]
    async fn drain_pending_decode_empties_the_queue() {
        let store = RawTxStore::new();
        store.ingest(make_btc_tx("tx1", vec![], vec![]), &[]).await;
        let pending = store.drain_pending_decode().await;
        assert_eq!(pending.len(), 1);
        assert!(store.drain_pending_decode().await.is_empty());
    }
}
