//! Receipt-log query adapter: `eth_getLogs`-shaped endpoint. Exposes no
//! balance/tx stream of its own, only `logs_for`, which the coordinator
//! calls directly (outside the `ChainAdapter::transactions` contract) once
//! a raw tx's hash is known, to fill in `RawTransaction::logs`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

use crate::chain::http::{self, DirectRateLimiter};
use crate::chain::{ChainAdapter, QueryOptions};
use crate::error::AdapterError;
use crate::types::{Address, LogRecord, RawTransaction};

pub struct LogQueryAdapter {
    client: reqwest::Client,
    rpc_url: String,
    limiter: Option<DirectRateLimiter>,
}

impl LogQueryAdapter {
    pub fn new(rpc_url: impl Into<String>, requests_per_second: u32) -> Self {
        Self {
            client: http::build_client(32),
            rpc_url: rpc_url.into(),
            limiter: http::build_limiter(requests_per_second),
        }
    }

    pub async fn logs_for_tx(&self, tx_hash: &str) -> Result<Vec<LogRecord>, AdapterError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getTransactionReceipt",
            "params": [tx_hash],
        });
        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;
        if resp.status().as_u16() == 429 {
            return Err(AdapterError::RateLimited { retry_after_secs: 2 });
        }
        let envelope: JsonRpcEnvelope = resp
            .json()
            .await
            .map_err(|e| AdapterError::BadResponse(e.to_string()))?;
        let receipt = envelope
            .result
            .ok_or_else(|| AdapterError::BadResponse("missing receipt".to_string()))?;

        receipt
            .logs
            .into_iter()
            .enumerate()
            .map(|(i, l)| {
                Ok(LogRecord {
                    log_index: l.log_index.unwrap_or(i as u64),
                    address: l.address,
                    topics: l.topics,
                    data: hex_decode(&l.data).map_err(AdapterError::BadResponse)?,
                })
            })
            .collect()
    }
}

fn hex_decode(s: &str) -> Result<Vec<u8>, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.len() % 2 != 0 {
        return Err("odd-length hex data".to_string());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}

#[derive(Debug, Deserialize)]
struct JsonRpcEnvelope {
    result: Option<Receipt>,
}

#[derive(Debug, Deserialize)]
struct Receipt {
    logs: Vec<RawLog>,
}

#[derive(Debug, Deserialize)]
struct RawLog {
    address: String,
    topics: Vec<String>,
    data: String,
    #[serde(rename = "logIndex")]
    log_index: Option<u64>,
}

#[async_trait]
impl ChainAdapter for LogQueryAdapter {
    fn name(&self) -> &str {
        "evm-logs"
    }

    async fn balances(
        &self,
        _addresses: &[Address],
    ) -> Result<HashMap<Address, Decimal>, AdapterError> {
        Err(AdapterError::Unsupported("balances".to_string()))
    }

    async fn has_activity(
        &self,
        _addresses: &[Address],
    ) -> Result<HashMap<Address, (bool, Decimal)>, AdapterError> {
        Err(AdapterError::Unsupported("has_activity".to_string()))
    }

    async fn transactions(
        &self,
        _addresses: &[Address],
        _options: QueryOptions,
    ) -> Result<(Option<u64>, Vec<RawTransaction>), AdapterError> {
        Err(AdapterError::Unsupported("transactions".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_decode_handles_0x_prefix() {
        assert_eq!(hex_decode("0x0a0b").unwrap(), vec![0x0a, 0x0b]);
        assert_eq!(hex_decode("0a0b").unwrap(), vec![0x0a, 0x0b]);
    }

    #[test]
    fn hex_decode_rejects_odd_length() {
        assert!(hex_decode("0x0").is_err());
    }
}
