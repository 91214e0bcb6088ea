mod cli;
mod server;

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use eyre::{eyre, Result, WrapErr};

use ledger_core::chain::btc::{BlockchainInfoAdapter, BlockcypherAdapter, BlockstreamAdapter};
use ledger_core::chain::evm::{ExplorerAdapter, LogQueryAdapter, SubgraphAdapter};
use ledger_core::chain::ChainAdapter;
use ledger_core::config::{QueryRangesConfig, SchedulerConfig};
use ledger_core::{Chain, Coordinator, DecoderRegistry, EventStore, IgnoredActionsManager, RangeStore, RawTxStore};
use ledger_tasks::{NotificationHub, Scheduler, TaskManager};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    let mut coordinators: HashMap<Chain, Arc<Coordinator>> = HashMap::new();
    let mut log_adapters: HashMap<Chain, Arc<LogQueryAdapter>> = HashMap::new();
    let mut polled_chains = Vec::new();

    let btc_adapters = build_btc_adapters(&args.btc_providers, args.requests_per_second)?;
    if !btc_adapters.is_empty() {
        coordinators.insert(Chain::Btc, Arc::new(Coordinator::new(btc_adapters)));
        polled_chains.push(Chain::Btc);
        tracing::info!(providers = ?args.btc_providers, "Bitcoin adapters configured");
    }

    if let Some(chain_id) = args.evm_chain_id {
        let base_url = args.evm_explorer_url.clone().ok_or_else(|| {
            eyre!("--evm-explorer-url is required when --evm-chain-id is set")
        })?;
        let adapter: Arc<dyn ChainAdapter> = Arc::new(ExplorerAdapter::new(
            base_url,
            chain_id,
            args.evm_api_key.clone(),
            args.requests_per_second,
        ));
        let chain = Chain::Evm(chain_id);
        coordinators.insert(chain, Arc::new(Coordinator::new(vec![adapter])));
        polled_chains.push(chain);
        tracing::info!(chain_id, "EVM adapter configured");

        if let Some(rpc_url) = args.evm_rpc_url.clone() {
            log_adapters.insert(
                chain,
                Arc::new(LogQueryAdapter::new(rpc_url, args.requests_per_second)),
            );
            tracing::info!(chain_id, "EVM receipt-log adapter configured");
        }
    }

    let subgraph = args.evm_subgraph_url.clone().map(|url| {
        tracing::info!("EVM subgraph adapter configured");
        Arc::new(SubgraphAdapter::new(url))
    });

    if coordinators.is_empty() {
        tracing::warn!("no chain adapters configured — accounts can be tracked but never queried");
    }

    let ranges = Arc::new(RangeStore::new());
    let raw_store = Arc::new(RawTxStore::new());
    let events = Arc::new(EventStore::new());
    let registry = Arc::new(DecoderRegistry::with_builtin_protocols());
    let notify = Arc::new(NotificationHub::new());
    let ignored_actions = Arc::new(IgnoredActionsManager::new());

    let scheduler_config = SchedulerConfig {
        pool_size: args.scheduler_pool_size,
        poll_interval_secs: args.poll_interval_secs,
    };
    let query_ranges_config = QueryRangesConfig {
        initial_lookback_secs: args.initial_lookback_secs,
    };

    let manager = Arc::new(TaskManager::new(
        coordinators,
        log_adapters,
        subgraph,
        ranges,
        raw_store,
        events,
        registry,
        notify.clone(),
        scheduler_config,
        query_ranges_config,
    ));

    let scheduler = Scheduler::start(manager.clone(), polled_chains);

    let state = server::AppState {
        manager,
        ignored_actions,
        notify,
    };

    let bind_addr = format!("{}:{}", args.bind, args.port);
    let origin = format!("http://{}:{}", args.bind, args.port);
    let router = server::build_router(state, &origin);

    if args.bind == "0.0.0.0" {
        tracing::warn!("server is bound to 0.0.0.0 — it is accessible from the network");
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .wrap_err("bind TCP listener")?;

    tracing::info!("listening on {bind_addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("run HTTP server")?;

    scheduler.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to install Ctrl+C handler");
    }
}

fn build_btc_adapters(providers: &[String], requests_per_second: u32) -> Result<Vec<Arc<dyn ChainAdapter>>> {
    providers
        .iter()
        .map(|name| -> Result<Arc<dyn ChainAdapter>> {
            match name.as_str() {
                "blockstream" => Ok(Arc::new(BlockstreamAdapter::blockstream(requests_per_second))),
                "mempool-space" => Ok(Arc::new(BlockstreamAdapter::mempool_space(requests_per_second))),
                "blockchain-info" => Ok(Arc::new(BlockchainInfoAdapter::new(
                    "https://blockchain.info",
                    requests_per_second,
                ))),
                "blockcypher" => Ok(Arc::new(BlockcypherAdapter::new(requests_per_second))),
                other => Err(eyre!("unknown --btc-provider `{other}`")),
            }
        })
        .collect()
}
