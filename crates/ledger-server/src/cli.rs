use clap::Parser;

/// The ledger server — local ingestion and bookkeeping over on-chain
/// transaction history, exposed through a thin HTTP/WS front end.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Address to bind the web server to.
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: String,

    /// Port to listen on.
    #[arg(long, default_value = "3080")]
    pub port: u16,

    /// Bitcoin-family providers to query, tried in the given order
    /// (repeatable). One of `blockstream`, `mempool-space`,
    /// `blockchain-info`, `blockcypher`.
    #[arg(long = "btc-provider", default_values_t = ["blockstream".to_string(), "mempool-space".to_string()])]
    pub btc_providers: Vec<String>,

    /// EVM chain id to poll for transactions, e.g. `1` for Ethereum
    /// mainnet. Omit to run with Bitcoin-family chains only.
    #[arg(long, env = "LEDGER_EVM_CHAIN_ID")]
    pub evm_chain_id: Option<u64>,

    /// Base URL of the Etherscan-shaped explorer for `--evm-chain-id`.
    #[arg(long, env = "LEDGER_EVM_EXPLORER_URL")]
    pub evm_explorer_url: Option<String>,

    /// API key for the EVM explorer, if the provider requires one.
    #[arg(long, env = "LEDGER_EVM_API_KEY")]
    pub evm_api_key: Option<String>,

    /// JSON-RPC URL used to fetch receipt logs (`eth_getTransactionReceipt`)
    /// for ingested EVM transactions, enabling the protocol decoders in
    /// `decoding::protocols`. Omit to decode EVM transactions without
    /// protocol-level events.
    #[arg(long, env = "LEDGER_EVM_RPC_URL")]
    pub evm_rpc_url: Option<String>,

    /// Subgraph GraphQL endpoint used to enrich decoded events with
    /// protocol metadata (pool/gauge info). Optional.
    #[arg(long, env = "LEDGER_EVM_SUBGRAPH_URL")]
    pub evm_subgraph_url: Option<String>,

    /// Requests per second allowed against each outbound provider.
    #[arg(long, default_value = "5")]
    pub requests_per_second: u32,

    /// Max concurrent ingestion tasks (scheduler.pool_size).
    #[arg(long, default_value = "8")]
    pub scheduler_pool_size: usize,

    /// Per-job wake interval, in seconds (scheduler.poll_interval_secs).
    #[arg(long, default_value = "20")]
    pub poll_interval_secs: u64,

    /// Bound on the first backfill for a newly tracked address, in
    /// seconds before "now". Omit for unbounded (back to genesis).
    #[arg(long)]
    pub initial_lookback_secs: Option<u64>,
}
