//! Component C: the multi-source coordinator (spec.md section 4.C).
//!
//! Grounded on `original_source/rotkehlchen/chain/bitcoin/manager.py`'s
//! `_query`: try adapters in priority order, catch every adapter error,
//! collect `(provider, reason)` pairs, and raise one combined
//! [`RemoteError`] only if every adapter failed. A successful call
//! short-circuits the chain.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::chain::{ChainAdapter, QueryOptions};
use crate::error::{AdapterError, RemoteError};
use crate::types::{Address, RawTransaction};

/// Providers that 429 twice within this window are quarantined for
/// [`QUARANTINE_DURATION`] (spec.md section 5, Rate limiting subsection).
const QUARANTINE_WINDOW: Duration = Duration::from_secs(60);
const QUARANTINE_DURATION: Duration = Duration::from_secs(5 * 60);
const MAX_RATE_LIMIT_RETRIES: u32 = 1;

#[derive(Default)]
struct ProviderHealth {
    recent_429s: Vec<Instant>,
    quarantined_until: Option<Instant>,
}

/// Tries each configured adapter in order for a chain family, feeding
/// rate-limit observations back into per-provider quarantine state.
pub struct Coordinator {
    adapters: Vec<Arc<dyn ChainAdapter>>,
    health: Mutex<HashMap<String, ProviderHealth>>,
}

impl Coordinator {
    pub fn new(adapters: Vec<Arc<dyn ChainAdapter>>) -> Self {
        Self {
            adapters,
            health: Mutex::new(HashMap::new()),
        }
    }

    async fn is_quarantined(&self, provider: &str) -> bool {
        let health = self.health.lock().await;
        health
            .get(provider)
            .and_then(|h| h.quarantined_until)
            .is_some_and(|until| Instant::now() < until)
    }

    async fn record_rate_limit(&self, provider: &str) {
        let mut health = self.health.lock().await;
        let entry = health.entry(provider.to_string()).or_default();
        let now = Instant::now();
        entry.recent_429s.retain(|t| now.duration_since(*t) < QUARANTINE_WINDOW);
        entry.recent_429s.push(now);
        if entry.recent_429s.len() >= 2 {
            entry.quarantined_until = Some(now + QUARANTINE_DURATION);
        }
    }

    /// Fetch raw transactions for `addresses`, trying adapters in the
    /// configured priority order.
    pub async fn transactions(
        &self,
        addresses: &[Address],
        options: QueryOptions,
    ) -> Result<(Option<u64>, Vec<RawTransaction>), RemoteError> {
        self.try_each(|adapter| {
            let addresses = addresses.to_vec();
            Box::pin(async move { adapter.transactions(&addresses, options).await })
        })
        .await
    }

    pub async fn balances(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, rust_decimal::Decimal>, RemoteError> {
        self.try_each(|adapter| {
            let addresses = addresses.to_vec();
            Box::pin(async move { adapter.balances(&addresses).await })
        })
        .await
    }

    async fn try_each<T, F>(&self, op: F) -> Result<T, RemoteError>
    where
        F: Fn(
            &Arc<dyn ChainAdapter>,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<T, AdapterError>> + Send + '_>,
        >,
    {
        let mut errors = Vec::new();

        for adapter in &self.adapters {
            if self.is_quarantined(adapter.name()).await {
                errors.push((adapter.name().to_string(), "quarantined after repeated rate limits".to_string()));
                continue;
            }

            let mut attempts = 0;
            loop {
                match op(adapter).await {
                    Ok(value) => return Ok(value),
                    Err(AdapterError::RateLimited { retry_after_secs }) => {
                        self.record_rate_limit(adapter.name()).await;
                        attempts += 1;
                        if attempts > MAX_RATE_LIMIT_RETRIES {
                            errors.push((adapter.name().to_string(), "rate limited".to_string()));
                            break;
                        }
                        tokio::time::sleep(Duration::from_secs(retry_after_secs.min(5))).await;
                    }
                    Err(other) => {
                        tracing::warn!(provider = adapter.name(), error = %other, "adapter call failed");
                        errors.push((adapter.name().to_string(), other.to_string()));
                        break;
                    }
                }
            }
        }

        Err(RemoteError(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockAdapter;
    use crate::test_util::make_btc_tx;
    use crate::types::Chain;

    fn addr() -> Address {
        Address::new(Chain::Btc, "addr1")
    }

    #[tokio::test]
    async fn first_successful_adapter_short_circuits() {
        let primary: Arc<dyn ChainAdapter> = Arc::new(
            MockAdapter::builder("primary")
                .with_tx(make_btc_tx("tx1", vec![], vec![]))
                .build(),
        );
        let secondary: Arc<dyn ChainAdapter> = Arc::new(MockAdapter::builder("secondary").build());
        let coordinator = Coordinator::new(vec![primary, secondary]);

        let (_, txs) = coordinator
            .transactions(&[addr()], QueryOptions::default())
            .await
            .expect("primary should succeed");
        assert_eq!(txs.len(), 1);
    }

    #[tokio::test]
    async fn falls_back_to_secondary_on_network_error() {
        let primary: Arc<dyn ChainAdapter> = Arc::new(
            MockAdapter::builder("primary")
                .failing_with(AdapterError::Network("timeout".to_string()))
                .build(),
        );
        let secondary: Arc<dyn ChainAdapter> = Arc::new(
            MockAdapter::builder("secondary")
                .with_tx(make_btc_tx("tx1", vec![], vec![]))
                .build(),
        );
        let coordinator = Coordinator::new(vec![primary, secondary]);

        let (_, txs) = coordinator
            .transactions(&[addr()], QueryOptions::default())
            .await
            .expect("secondary should succeed");
        assert_eq!(txs.len(), 1);
    }

    #[tokio::test]
    async fn all_adapters_failing_combines_every_provider_reason() {
        let primary: Arc<dyn ChainAdapter> = Arc::new(
            MockAdapter::builder("primary")
                .failing_with(AdapterError::Network("timeout".to_string()))
                .build(),
        );
        let secondary: Arc<dyn ChainAdapter> = Arc::new(
            MockAdapter::builder("secondary")
                .failing_with(AdapterError::BadResponse("bad json".to_string()))
                .build(),
        );
        let coordinator = Coordinator::new(vec![primary, secondary]);

        let err = coordinator
            .transactions(&[addr()], QueryOptions::default())
            .await
            .expect_err("both adapters fail");
        let msg = err.to_string();
        assert!(msg.contains("primary"));
        assert!(msg.contains("secondary"));
    }

    #[tokio::test]
    async fn repeated_rate_limit_quarantines_provider() {
        let flaky: Arc<dyn ChainAdapter> = Arc::new(
            MockAdapter::builder("flaky")
                .failing_with(AdapterError::RateLimited { retry_after_secs: 0 })
                .build(),
        );
        let coordinator = Coordinator::new(vec![flaky]);

        // First two calls trigger two 429 observations, hitting quarantine.
        let _ = coordinator.transactions(&[addr()], QueryOptions::default()).await;
        assert!(coordinator.is_quarantined("flaky").await);
    }
}
