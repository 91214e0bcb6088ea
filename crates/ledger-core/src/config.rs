//! Plain configuration structs mirroring spec.md section 6's Configuration
//! table. Each carries the documented default via `Default`, the way the
//! teacher's `cli.rs` hard-codes its flag defaults.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Per-request timeout, in seconds.
    pub timeout_secs: u64,
    /// HTTP connection pool size per provider host.
    pub pool_size_per_host: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            pool_size_per_host: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Max concurrent ingestion tasks.
    pub pool_size: usize,
    /// Per-job wake interval, in seconds.
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            poll_interval_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Bump to force a full re-decode of every stored transaction.
    pub schema_version: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self { schema_version: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRangesConfig {
    /// Bound on the first backfill for a newly tracked address, in seconds
    /// before "now". `None` means unbounded (back to genesis).
    pub initial_lookback_secs: Option<u64>,
}

impl Default for QueryRangesConfig {
    fn default() -> Self {
        Self {
            initial_lookback_secs: None,
        }
    }
}

/// Top-level configuration, composed of the per-component tables above.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,
    pub scheduler: SchedulerConfig,
    pub decoder: DecoderConfig,
    pub query_ranges: QueryRangesConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.rpc.timeout_secs, 30);
        assert_eq!(cfg.rpc.pool_size_per_host, 10);
        assert_eq!(cfg.scheduler.pool_size, 8);
        assert_eq!(cfg.scheduler.poll_interval_secs, 20);
        assert_eq!(cfg.decoder.schema_version, 1);
        assert_eq!(cfg.query_ranges.initial_lookback_secs, None);
    }
}
