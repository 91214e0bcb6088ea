//! The cooperative scheduler (spec.md section 4.G, "Scheduling model").
//!
//! One task per periodic job, woken on a fixed interval the way
//! `original_source/rotkehlchen/tasks/server.py`'s `SCHEDULE` message spins
//! up `Rotkehlchen.main_loop` as a single greenlet driving every job in
//! turn; here each job gets its own `tokio::spawn`ed loop instead, since
//! tokio tasks (unlike gevent greenlets under one loop) are cheap to keep
//! separate and a stuck adapter call in one job's `.await` can't stall the
//! others.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ledger_core::Chain;

use crate::manager::TaskManager;

/// Owns the background loops driving [`TaskManager`]'s periodic jobs.
/// Dropping or cancelling this stops every loop; it does not affect
/// in-flight per-fingerprint tasks already tracked by the manager itself.
pub struct Scheduler {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
    should_schedule: Arc<AtomicBool>,
}

impl Scheduler {
    /// Spawns the five periodic jobs of spec.md section 4.G against every
    /// chain the manager has a coordinator for. `chains` lists which chain
    /// families to poll for transactions (the manager itself holds the
    /// per-chain coordinator map; this just needs to know which to ask).
    pub fn start(manager: Arc<TaskManager>, chains: Vec<Chain>) -> Self {
        let shutdown = CancellationToken::new();
        let should_schedule = Arc::new(AtomicBool::new(true));
        let poll_interval = Duration::from_secs(manager.config().poll_interval_secs);

        let mut handles = Vec::new();

        for chain in chains {
            handles.push(spawn_tx_query_loop(
                manager.clone(),
                chain,
                poll_interval,
                shutdown.clone(),
                should_schedule.clone(),
            ));
        }

        handles.push(spawn_loop(
            "decode_pending",
            poll_interval,
            shutdown.clone(),
            should_schedule.clone(),
            {
                let manager = manager.clone();
                move || {
                    let manager = manager.clone();
                    async move {
                        if let Err(err) = manager.maybe_decode_pending().await {
                            tracing::warn!(error = %err, "decode_pending job failed");
                        }
                    }
                }
            },
        ));

        handles.push(spawn_loop(
            "query_balances",
            poll_interval,
            shutdown.clone(),
            should_schedule.clone(),
            {
                let manager = manager.clone();
                move || {
                    let manager = manager.clone();
                    async move {
                        if let Err(err) = manager.maybe_query_balances().await {
                            tracing::warn!(error = %err, "query_balances job failed");
                        }
                    }
                }
            },
        ));

        handles.push(spawn_loop(
            "refresh_premium",
            poll_interval,
            shutdown.clone(),
            should_schedule.clone(),
            {
                let manager = manager.clone();
                move || {
                    let manager = manager.clone();
                    async move {
                        manager.refresh_premium().await;
                    }
                }
            },
        ));

        Self {
            handles,
            shutdown,
            should_schedule,
        }
    }

    /// Mirrors the source's `should_schedule` toggle (`tasks/server.py`'s
    /// `SchedulerMethod`): pausing scheduling without tearing down the
    /// loops, e.g. while the user's session is locked.
    pub fn set_should_schedule(&self, enabled: bool) {
        self.should_schedule.store(enabled, Ordering::SeqCst);
    }

    /// Stops every loop. In-flight jobs finish their current tick; no new
    /// tick is scheduled afterward.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

fn spawn_tx_query_loop(
    manager: Arc<TaskManager>,
    chain: Chain,
    interval: Duration,
    shutdown: CancellationToken,
    should_schedule: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let label = match chain {
        Chain::Evm(_) => "query_evm_transactions",
        Chain::Btc | Chain::Bch => "query_bitcoin_transactions",
    };
    spawn_loop(label, interval, shutdown, should_schedule, move || {
        let manager = manager.clone();
        async move {
            for account in manager.tracked_accounts() {
                if account.chain != chain {
                    continue;
                }
                let result = match chain {
                    Chain::Evm(_) => manager.maybe_query_evm_transactions(chain, account.address).await,
                    Chain::Btc | Chain::Bch => manager.maybe_query_bitcoin_transactions(chain, account.address).await,
                };
                if let Err(err) = result {
                    tracing::warn!(chain = %chain, error = %err, "transaction query job failed");
                }
            }
        }
    })
}

/// Runs `body` every `interval` until `shutdown` fires, skipping ticks
/// while `should_schedule` is false.
fn spawn_loop<F, Fut>(
    label: &'static str,
    interval: Duration,
    shutdown: CancellationToken,
    should_schedule: Arc<AtomicBool>,
    body: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if !should_schedule.load(Ordering::SeqCst) {
                        continue;
                    }
                    tracing::debug!(job = label, "tick");
                    body().await;
                }
            }
        }
    })
}
