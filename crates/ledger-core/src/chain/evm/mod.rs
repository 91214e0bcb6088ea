//! EVM-family adapters (spec.md section 4.B): an explorer (normal +
//! internal txs, page-number pagination), a separate log-query endpoint
//! for receipt logs, and a subgraph adapter for read-only protocol
//! metadata (pool/gauge data) that never serves a tx stream.

mod explorer;
mod logs;
mod subgraph;

pub use explorer::ExplorerAdapter;
pub use logs::LogQueryAdapter;
pub use subgraph::SubgraphAdapter;
