//! Component G: the task manager (spec.md section 4.G).
//!
//! Grounded on `original_source/rotkehlchen/tasks/server.py`'s
//! `running_greenlets` map and `_maybe_kill_running_tx_query_tasks`
//! (kill-by-address), translated from a greenlet-per-task model onto
//! tokio: one `CancellationToken` per in-flight fingerprint instead of a
//! killable greenlet handle, and a `DashMap` guard set instead of Python's
//! plain dict (so unrelated fingerprints never contend on one lock), per
//! `dudukav-eth_analyzer`'s `DashMap` usage for concurrent per-key state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use ledger_core::chain::evm::{LogQueryAdapter, SubgraphAdapter};
use ledger_core::chain::QueryOptions;
use ledger_core::config::{QueryRangesConfig, SchedulerConfig};
use ledger_core::decoding::{btc_normalizer::normalize_btc_tx, evm_normalizer::normalize_evm_tx};
use ledger_core::error::RemoteError;
use ledger_core::events::EventFilter;
use ledger_core::raw_store::IngestOutcome;
use ledger_core::types::{fingerprint, Fingerprint, Interval};
use ledger_core::{Address, Chain, Coordinator, DecoderRegistry, EventStore, HistoryEvent, RangeStore, RawTxStore};

use crate::notify::{Notification, NotificationHub, TransactionStatus};

const TX_KIND: &str = "txs";
const BALANCE_KIND: &str = "balances";
const DECODE_KIND: &str = "decode";
const BALANCE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("no adapter configured for chain {0}")]
    NoAdapterForChain(Chain),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("task cancelled")]
    Cancelled,
}

/// A tracked account: which chain, which address, and whatever
/// caller-supplied metadata `add_accounts` was given (spec.md section 6,
/// `add_accounts(chain, [address], metadata)`).
#[derive(Debug, Clone)]
pub struct Account {
    pub chain: Chain,
    pub address: Address,
    pub metadata: Value,
}

struct CachedBalance {
    amount: Decimal,
    fetched_at: Instant,
}

/// Owns every shared store and per-fingerprint lock, and exposes both the
/// inbound operations of spec.md section 6 and the five periodic jobs of
/// section 4.G.
pub struct TaskManager {
    config: SchedulerConfig,
    query_ranges: QueryRangesConfig,
    coordinators: HashMap<Chain, Arc<Coordinator>>,
    log_adapters: HashMap<Chain, Arc<LogQueryAdapter>>,
    subgraph: Option<Arc<SubgraphAdapter>>,
    ranges: Arc<RangeStore>,
    raw_store: Arc<RawTxStore>,
    events: Arc<EventStore>,
    registry: Arc<DecoderRegistry>,
    notify: Arc<NotificationHub>,
    accounts: DashMap<(Chain, String), Account>,
    running: DashMap<Fingerprint, CancellationToken>,
    balances: DashMap<(Chain, String), CachedBalance>,
    protocol_labels: DashMap<String, String>,
}

impl TaskManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        coordinators: HashMap<Chain, Arc<Coordinator>>,
        log_adapters: HashMap<Chain, Arc<LogQueryAdapter>>,
        subgraph: Option<Arc<SubgraphAdapter>>,
        ranges: Arc<RangeStore>,
        raw_store: Arc<RawTxStore>,
        events: Arc<EventStore>,
        registry: Arc<DecoderRegistry>,
        notify: Arc<NotificationHub>,
        config: SchedulerConfig,
        query_ranges: QueryRangesConfig,
    ) -> Self {
        Self {
            config,
            query_ranges,
            coordinators,
            log_adapters,
            subgraph,
            ranges,
            raw_store,
            events,
            registry,
            notify,
            accounts: DashMap::new(),
            running: DashMap::new(),
            balances: DashMap::new(),
            protocol_labels: DashMap::new(),
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    // ==========================================================================
    // Inbound operations (spec.md section 6)
    // ==========================================================================

    /// `add_accounts(chain, [address], metadata)`. Registration only; the
    /// scheduler's periodic jobs (or an explicit `query_transactions` call)
    /// drive the actual ingestion.
    pub async fn add_accounts(&self, chain: Chain, addresses: Vec<Address>, metadata: Value) {
        for address in addresses {
            // Informational transitions (spec.md section 4.F): undo any
            // earlier STAKING->INFORMATIONAL rewrite now that this address
            // is tracked again.
            self.events.retag_on_retrack(&address.canonical).await;
            let key = (chain, address.canonical.clone());
            self.accounts.insert(
                key,
                Account {
                    chain,
                    address,
                    metadata: metadata.clone(),
                },
            );
        }
    }

    /// `remove_accounts(chain, [address])`: cancels any in-flight task for
    /// the address, drops its query ranges and raw-store link rows
    /// (invariant 6), and stops tracking it.
    pub async fn remove_accounts(&self, chain: Chain, addresses: &[Address]) {
        for address in addresses {
            for kind in [TX_KIND, BALANCE_KIND] {
                let fp = fingerprint(kind, chain, &address.canonical);
                if let Some((_, token)) = self.running.remove(&fp) {
                    token.cancel();
                }
                self.ranges.remove(&fp).await;
            }
            self.raw_store.unlink_address(chain, &address.canonical).await;
            // Informational transitions (spec.md section 4.F): a STAKING
            // event whose only tracked participant is this address becomes
            // INFORMATIONAL rather than being deleted (invariant 6).
            self.events.retag_on_untrack(&address.canonical).await;
            self.balances.remove(&(chain, address.canonical.clone()));
            self.accounts.remove(&(chain, address.canonical.clone()));
        }
    }

    /// `query_transactions({chain?, address?, from_ts?, to_ts?, async})`.
    /// This implementation is always synchronous: it forces a pull for the
    /// requested address (or every tracked address on `chain` if none is
    /// given) and returns the resulting events once ingestion and decoding
    /// complete.
    pub async fn query_transactions(
        &self,
        chain: Chain,
        address: Option<Address>,
        from_ts: Option<i64>,
        to_ts: Option<i64>,
    ) -> Result<Vec<HistoryEvent>, TaskError> {
        let targets: Vec<Address> = match address {
            Some(addr) => vec![addr],
            None => self
                .accounts
                .iter()
                .filter(|entry| entry.key().0 == chain)
                .map(|entry| entry.value().address.clone())
                .collect(),
        };

        for addr in targets {
            self.run_tx_ingestion(chain, addr).await?;
        }

        let filter = EventFilter {
            chain: Some(chain),
            address: None,
            event_type: None,
            from_ts,
            to_ts,
        };
        Ok(self.events.events_in_range(&filter).await)
    }

    /// `get_events(filter)` — read-only against component H.
    pub async fn get_events(&self, filter: EventFilter) -> Vec<HistoryEvent> {
        self.events.events_in_range(&filter).await
    }

    pub fn tracked_accounts(&self) -> Vec<Account> {
        self.accounts.iter().map(|entry| entry.value().clone()).collect()
    }

    // ==========================================================================
    // Per-fingerprint locking
    // ==========================================================================

    /// Enforces "at most one in-flight task per fingerprint; attempts to
    /// schedule a duplicate are dropped (not queued)" (spec.md section
    /// 4.G). Returns `None` if a task for `fp` is already running.
    fn try_start(&self, fp: &str) -> Option<CancellationToken> {
        match self.running.entry(fp.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let token = CancellationToken::new();
                slot.insert(token.clone());
                Some(token)
            }
        }
    }

    fn finish(&self, fp: &str) {
        self.running.remove(fp);
    }

    fn tracked_addresses_for(&self, chain: Chain) -> Vec<Address> {
        self.accounts
            .iter()
            .filter(|entry| entry.key().0 == chain)
            .map(|entry| entry.value().address.clone())
            .collect()
    }

    // ==========================================================================
    // Periodic jobs (spec.md section 4.G)
    // ==========================================================================

    /// `_maybe_query_evm_transactions(address, chain)`.
    pub async fn maybe_query_evm_transactions(&self, chain: Chain, address: Address) -> Result<(), TaskError> {
        debug_assert!(matches!(chain, Chain::Evm(_)));
        self.run_tx_ingestion(chain, address).await
    }

    /// `_maybe_query_bitcoin_transactions(address, chain)`.
    pub async fn maybe_query_bitcoin_transactions(&self, chain: Chain, address: Address) -> Result<(), TaskError> {
        debug_assert!(matches!(chain, Chain::Btc | Chain::Bch));
        self.run_tx_ingestion(chain, address).await
    }

    async fn run_tx_ingestion(&self, chain: Chain, address: Address) -> Result<(), TaskError> {
        let fp = fingerprint(TX_KIND, chain, &address.canonical);
        let Some(token) = self.try_start(&fp) else {
            return Ok(());
        };
        let result = self.run_tx_ingestion_inner(chain, &address, &fp, &token).await;
        self.finish(&fp);
        result
    }

    async fn run_tx_ingestion_inner(
        &self,
        chain: Chain,
        address: &Address,
        fp: &str,
        token: &CancellationToken,
    ) -> Result<(), TaskError> {
        let Some(coordinator) = self.coordinators.get(&chain) else {
            return Err(TaskError::NoAdapterForChain(chain));
        };

        let subtype = tx_subtype(chain);
        self.notify.publish(Notification::TransactionStatus {
            addresses: vec![address.display.clone()],
            chain,
            subtype: subtype.to_string(),
            status: TransactionStatus::QueryingTransactionsStarted,
        });

        let now_ms = now_millis();
        let full_window = Interval::new(0, now_ms);
        let mut missing = self.ranges.missing_ranges(fp, full_window).await;
        let is_first_ever = missing.len() == 1 && missing[0] == full_window;
        if is_first_ever {
            if let Some(lookback_secs) = self.query_ranges.initial_lookback_secs {
                let lookback_start = now_ms.saturating_sub(lookback_secs as i64 * 1000);
                missing = vec![Interval::new(lookback_start, now_ms)];
            }
        }
        let resume_block = self.ranges.last_queried_block(fp).await;

        let mut newly_ingested = Vec::new();
        for window in missing {
            if token.is_cancelled() {
                return Err(TaskError::Cancelled);
            }
            let (last_block, txs) = coordinator
                .transactions(std::slice::from_ref(address), QueryOptions {
                    window: Some(window),
                    resume_before_block: resume_block,
                })
                .await?;

            for mut tx in txs {
                if let Some(log_adapter) = self.log_adapters.get(&tx.chain) {
                    match log_adapter.logs_for_tx(&tx.tx_id).await {
                        Ok(logs) => tx.logs = logs,
                        Err(err) => {
                            tracing::warn!(
                                tx_id = %tx.tx_id,
                                chain = %tx.chain,
                                error = %err,
                                "failed to fetch receipt logs; decoding without them"
                            );
                        }
                    }
                }
                if self.raw_store.ingest(tx.clone(), std::slice::from_ref(address)).await == IngestOutcome::Inserted {
                    newly_ingested.push(tx);
                }
            }
            self.ranges.record(fp, window).await;
            if let Some(block) = last_block {
                self.ranges.set_last_queried_block(fp, block).await;
            }
        }

        self.notify.publish(Notification::TransactionStatus {
            addresses: vec![address.display.clone()],
            chain,
            subtype: subtype.to_string(),
            status: TransactionStatus::QueryingTransactionsFinished,
        });

        if !newly_ingested.is_empty() {
            self.notify.publish(Notification::TransactionStatus {
                addresses: vec![address.display.clone()],
                chain,
                subtype: subtype.to_string(),
                status: TransactionStatus::DecodingTransactionsStarted,
            });

            let tracked = self.tracked_addresses_for(chain);
            for tx in &newly_ingested {
                self.decode_and_store(tx, &tracked).await;
            }

            self.notify.publish(Notification::TransactionStatus {
                addresses: vec![address.display.clone()],
                chain,
                subtype: subtype.to_string(),
                status: TransactionStatus::DecodingTransactionsFinished,
            });
        }

        Ok(())
    }

    async fn decode_and_store(&self, tx: &ledger_core::RawTransaction, tracked: &[Address]) {
        let mut events = match tx.chain {
            Chain::Btc | Chain::Bch => normalize_btc_tx(tx, tracked),
            Chain::Evm(_) => normalize_evm_tx(tx, tracked, &self.registry),
        };
        if matches!(tx.chain, Chain::Evm(_)) {
            self.enrich_with_subgraph_labels(&mut events).await;
        }
        self.events.replace_for_tx(&tx.tx_id, events).await;
    }

    /// Fills in `location_label` for events whose `counterparty` names a
    /// protocol contract the subgraph can resolve to a human-readable
    /// pool/gauge name. Looked up once per distinct counterparty and
    /// cached for the life of the manager, since subgraph metadata for a
    /// given contract address never changes.
    async fn enrich_with_subgraph_labels(&self, events: &mut [HistoryEvent]) {
        let Some(subgraph) = &self.subgraph else { return };
        for event in events.iter_mut() {
            if event.location_label.is_some() {
                continue;
            }
            let Some(counterparty) = event.counterparty.clone() else { continue };
            if let Some(cached) = self.protocol_labels.get(&counterparty) {
                event.location_label = Some(cached.clone());
                continue;
            }
            let query = format!(
                r#"{{ pool(id: "{}") {{ name }} gauge(id: "{}") {{ name }} }}"#,
                counterparty.to_lowercase(),
                counterparty.to_lowercase()
            );
            match subgraph.query(&query).await {
                Ok(data) => {
                    let label = data
                        .get("pool")
                        .or_else(|| data.get("gauge"))
                        .and_then(|node| node.get("name"))
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    if let Some(label) = label {
                        self.protocol_labels.insert(counterparty, label.clone());
                        event.location_label = Some(label);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        counterparty = %counterparty,
                        error = %err,
                        "subgraph lookup failed; leaving location_label unset"
                    );
                }
            }
        }
    }

    /// `_maybe_decode_pending`: rescans the raw store for un-decoded txs
    /// (anything ingested since the last drain) and decodes them.
    pub async fn maybe_decode_pending(&self) -> Result<(), TaskError> {
        let fp = "decode:pending".to_string();
        let Some(_token) = self.try_start(&fp) else {
            return Ok(());
        };
        let pending = self.raw_store.drain_pending_decode().await;
        let mut tracked_by_chain: HashMap<Chain, Vec<Address>> = HashMap::new();
        for tx in &pending {
            let tracked = tracked_by_chain
                .entry(tx.chain)
                .or_insert_with(|| self.tracked_addresses_for(tx.chain));
            let mut events = match tx.chain {
                Chain::Btc | Chain::Bch => normalize_btc_tx(tx, tracked),
                Chain::Evm(_) => normalize_evm_tx(tx, tracked, &self.registry),
            };
            if matches!(tx.chain, Chain::Evm(_)) {
                self.enrich_with_subgraph_labels(&mut events).await;
            }
            self.events.replace_for_tx(&tx.tx_id, events).await;
        }
        self.finish(&fp);
        Ok(())
    }

    /// `_refresh_premium`: refreshes the user's paid-tier credentials.
    /// Premium/paid-tier account management is an external collaborator
    /// this crate never implements (spec.md section 1's out-of-scope
    /// list); the hook exists so the scheduler's job set matches spec.md
    /// section 4.G exactly, and a concrete credentials backend can be
    /// plugged in without touching the scheduling model.
    pub async fn refresh_premium(&self) {
        tracing::debug!("refresh_premium: no premium credentials backend configured");
    }

    /// `_maybe_query_balances`: refreshes on-chain balances with
    /// TTL-cached results.
    pub async fn maybe_query_balances(&self) -> Result<(), TaskError> {
        let now = Instant::now();
        let mut by_chain: HashMap<Chain, Vec<Address>> = HashMap::new();
        for entry in self.accounts.iter() {
            let (chain, canonical) = entry.key().clone();
            let stale = self
                .balances
                .get(&(chain, canonical))
                .map(|cached| now.duration_since(cached.fetched_at) >= BALANCE_TTL)
                .unwrap_or(true);
            if stale {
                by_chain.entry(chain).or_default().push(entry.value().address.clone());
            }
        }

        for (chain, addresses) in by_chain {
            let fp = fingerprint(BALANCE_KIND, chain, "*");
            let Some(_token) = self.try_start(&fp) else { continue };
            if let Some(coordinator) = self.coordinators.get(&chain) {
                match coordinator.balances(&addresses).await {
                    Ok(fetched) => {
                        for (addr, amount) in fetched {
                            self.balances.insert(
                                (chain, addr.canonical.clone()),
                                CachedBalance { amount, fetched_at: now },
                            );
                        }
                    }
                    Err(err) => {
                        tracing::warn!(chain = %chain, error = %err, "balance refresh failed");
                    }
                }
            }
            self.finish(&fp);
        }
        Ok(())
    }

    pub fn cached_balance(&self, chain: Chain, address: &str) -> Option<Decimal> {
        self.balances.get(&(chain, address.to_string())).map(|c| c.amount)
    }
}

fn tx_subtype(chain: Chain) -> &'static str {
    match chain {
        Chain::Evm(_) => "evm_transactions",
        Chain::Btc | Chain::Bch => "bitcoin_transactions",
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::chain::mock::MockAdapter;
    use ledger_core::test_util::make_evm_tx;
    use ledger_core::types::Chain as TestChain;

    fn manager_with(chain: Chain, coordinator: Coordinator) -> TaskManager {
        let mut coordinators = HashMap::new();
        coordinators.insert(chain, Arc::new(coordinator));
        TaskManager::new(
            coordinators,
            HashMap::new(),
            None,
            Arc::new(RangeStore::new()),
            Arc::new(RawTxStore::new()),
            Arc::new(EventStore::new()),
            Arc::new(DecoderRegistry::new()),
            Arc::new(NotificationHub::new()),
            SchedulerConfig::default(),
            QueryRangesConfig::default(),
        )
    }

    #[tokio::test]
    async fn duplicate_fingerprint_schedule_is_dropped_not_queued() {
        let manager = manager_with(TestChain::Evm(1), Coordinator::new(vec![]));
        let fp = fingerprint(TX_KIND, TestChain::Evm(1), "0xabc");
        let first = manager.try_start(&fp);
        assert!(first.is_some());
        let second = manager.try_start(&fp);
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn remove_accounts_cancels_running_task_and_clears_ranges() {
        let manager = manager_with(TestChain::Evm(1), Coordinator::new(vec![]));
        let address = Address::new(TestChain::Evm(1), "0xabc");
        manager.add_accounts(TestChain::Evm(1), vec![address.clone()], Value::Null).await;

        let fp = fingerprint(TX_KIND, TestChain::Evm(1), "0xabc");
        let token = manager.try_start(&fp).expect("should start");
        manager.ranges.record(&fp, Interval::new(0, 100)).await;

        manager.remove_accounts(TestChain::Evm(1), &[address]).await;

        assert!(token.is_cancelled());
        assert!(manager.ranges.missing_ranges(&fp, Interval::new(0, 100)).await.len() == 1);
        assert!(manager.tracked_accounts().is_empty());
    }

    #[tokio::test]
    async fn query_transactions_ingests_and_decodes_then_returns_events() {
        let user = "0xuser0000000000000000000000000000000000";
        let adapter = MockAdapter::builder("explorer")
            .with_tx(make_evm_tx("0xtx1", user, None, Decimal::ONE, vec![]))
            .build();
        let manager = manager_with(TestChain::Evm(1), Coordinator::new(vec![Arc::new(adapter)]));

        let events = manager
            .query_transactions(TestChain::Evm(1), Some(Address::new(TestChain::Evm(1), user)), None, None)
            .await
            .expect("query should succeed");

        assert!(!events.is_empty());
    }
}
