//! Etherscan-shaped explorer adapter: normal + internal transactions,
//! paginated by page number. Balance/activity come from the same explorer
//! family's `balance`/`txlist` endpoints.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::chain::http::{self, DirectRateLimiter};
use crate::chain::{ChainAdapter, QueryOptions};
use crate::error::AdapterError;
use crate::types::{Address, Chain, EvmTxInfo, RawTransaction, TxStatus};

const PAGE_SIZE: usize = 100;

pub struct ExplorerAdapter {
    client: reqwest::Client,
    base_url: String,
    chain_id: u64,
    api_key: Option<String>,
    limiter: Option<DirectRateLimiter>,
}

impl ExplorerAdapter {
    pub fn new(
        base_url: impl Into<String>,
        chain_id: u64,
        api_key: Option<String>,
        requests_per_second: u32,
    ) -> Self {
        Self {
            client: http::build_client(32),
            base_url: base_url.into(),
            chain_id,
            api_key,
            limiter: http::build_limiter(requests_per_second),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, AdapterError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        let mut url = format!("{}{path}", self.base_url);
        if let Some(key) = &self.api_key {
            url.push_str(&format!("&apikey={key}"));
        }
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;
        if resp.status().as_u16() == 429 {
            return Err(AdapterError::RateLimited { retry_after_secs: 5 });
        }
        if !resp.status().is_success() {
            return Err(AdapterError::BadResponse(format!(
                "unexpected status {}",
                resp.status()
            )));
        }
        let envelope: ExplorerEnvelope<T> = resp
            .json()
            .await
            .map_err(|e| AdapterError::BadResponse(e.to_string()))?;
        // A 200 response carrying a rate-limit notice in the body (rather
        // than HTTP 429) must still decode to `RateLimited` (spec.md
        // section 6, Outbound subsection).
        if envelope.status == "0" && envelope.message.to_lowercase().contains("rate limit") {
            return Err(AdapterError::RateLimited { retry_after_secs: 5 });
        }
        Ok(envelope.result)
    }
}

#[derive(Debug, Deserialize)]
struct ExplorerEnvelope<T> {
    status: String,
    message: String,
    result: T,
}

#[derive(Debug, Deserialize)]
struct BalanceEnvelopeResult(String);

#[derive(Debug, Deserialize)]
struct ExplorerTx {
    hash: String,
    #[serde(rename = "blockNumber")]
    block_number: String,
    #[serde(rename = "timeStamp")]
    timestamp: String,
    from: String,
    to: Option<String>,
    value: String,
    #[serde(rename = "gasUsed")]
    gas_used: String,
    #[serde(rename = "gasPrice")]
    gas_price: String,
    #[serde(rename = "isError", default)]
    is_error: String,
}

#[async_trait]
impl ChainAdapter for ExplorerAdapter {
    fn name(&self) -> &str {
        "evm-explorer"
    }

    async fn balances(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, Decimal>, AdapterError> {
        let mut out = HashMap::new();
        for addr in addresses {
            let path = format!(
                "?module=account&action=balance&address={}",
                addr.canonical
            );
            let result: BalanceEnvelopeResult = self.get_json(&path).await?;
            let wei: Decimal = result
                .0
                .parse()
                .map_err(|_| AdapterError::BadResponse("non-numeric balance".to_string()))?;
            out.insert(addr.clone(), wei / Decimal::from(10u64.pow(18)));
        }
        Ok(out)
    }

    async fn has_activity(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, (bool, Decimal)>, AdapterError> {
        let balances = self.balances(addresses).await?;
        Ok(addresses
            .iter()
            .map(|a| {
                let bal = balances.get(a).copied().unwrap_or(Decimal::ZERO);
                (a.clone(), (bal != Decimal::ZERO, bal))
            })
            .collect())
    }

    async fn transactions(
        &self,
        addresses: &[Address],
        _options: QueryOptions,
    ) -> Result<(Option<u64>, Vec<RawTransaction>), AdapterError> {
        let mut all = Vec::new();
        let mut latest_block = None;

        for addr in addresses {
            let mut page = 1usize;
            loop {
                let path = format!(
                    "?module=account&action=txlist&address={}&page={page}&offset={PAGE_SIZE}&sort=asc",
                    addr.canonical
                );
                let txs: Vec<ExplorerTx> = self.get_json(&path).await?;
                let returned = txs.len();

                for tx in txs {
                    let block = tx.block_number.parse::<u64>().ok();
                    latest_block = latest_block.max(block);
                    let value: Decimal = tx.value.parse().unwrap_or(Decimal::ZERO);
                    let gas_used: u64 = tx.gas_used.parse().unwrap_or(0);
                    let gas_price: Decimal = tx.gas_price.parse().unwrap_or(Decimal::ZERO);
                    all.push(RawTransaction {
                        chain: Chain::Evm(self.chain_id),
                        tx_id: tx.hash,
                        block_height: block,
                        timestamp_ms: tx.timestamp.parse::<i64>().unwrap_or(0) * 1000,
                        fee: Some(gas_price * Decimal::from(gas_used) / Decimal::from(10u64.pow(18))),
                        status: if tx.is_error == "1" {
                            TxStatus::Failed
                        } else {
                            TxStatus::Confirmed
                        },
                        inputs: Vec::new(),
                        outputs: Vec::new(),
                        logs: Vec::new(),
                        multi_io: false,
                        evm: Some(EvmTxInfo {
                            from: tx.from,
                            to: tx.to,
                            value: value / Decimal::from(10u64.pow(18)),
                            gas_used,
                            effective_gas_price: gas_price,
                        }),
                    });
                }
                if returned < PAGE_SIZE {
                    break;
                }
                page += 1;
            }
        }
        Ok((latest_block, all))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_name_is_stable() {
        let adapter = ExplorerAdapter::new("https://api.etherscan.io/api", 1, None, 5);
        assert_eq!(adapter.name(), "evm-explorer");
    }
}
