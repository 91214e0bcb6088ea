//! Bitcoin Cash adapter: one CashAddr-speaking provider.
//!
//! Inputs may arrive prefixed `cashaddr:` or bare; requested addresses are
//! compared against either form (spec.md section 4.B). Canonicalization
//! strips the `cashaddr:` prefix and never mutates the caller-supplied
//! display form — see DESIGN.md Open Question 2 and `types::Address`.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::chain::btc::{classify_script_bytes, decode_hex};
use crate::chain::http::{self, DirectRateLimiter};
use crate::chain::{ChainAdapter, QueryOptions};
use crate::error::AdapterError;
use crate::types::{Address, Chain, IoDirection, RawTransaction, TxIo, TxStatus};

/// Normalize a Bitcoin Cash address to its canonical (un-prefixed) form.
pub fn canonicalize(raw: &str) -> String {
    raw.strip_prefix("cashaddr:").unwrap_or(raw).to_string()
}

/// Build an [`Address`] preserving the caller's original form as `display`.
pub fn make_address(raw: impl Into<String>) -> Address {
    let raw = raw.into();
    let canonical = canonicalize(&raw);
    Address::with_canonical(Chain::Bch, raw, canonical)
}

pub struct CashAddrAdapter {
    client: reqwest::Client,
    base_url: String,
    limiter: Option<DirectRateLimiter>,
}

impl CashAddrAdapter {
    pub fn new(base_url: impl Into<String>, requests_per_second: u32) -> Self {
        Self {
            client: http::build_client(16),
            base_url: base_url.into(),
            limiter: http::build_limiter(requests_per_second),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, AdapterError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;
        if resp.status().as_u16() == 429 {
            return Err(AdapterError::RateLimited { retry_after_secs: 10 });
        }
        if !resp.status().is_success() {
            return Err(AdapterError::BadResponse(format!(
                "unexpected status {}",
                resp.status()
            )));
        }
        resp.json::<T>()
            .await
            .map_err(|e| AdapterError::BadResponse(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance_satoshis: i64,
}

#[derive(Debug, Deserialize)]
struct BchTx {
    txid: String,
    block_height: Option<u64>,
    timestamp: Option<i64>,
    #[serde(default)]
    fee_satoshis: Option<i64>,
    #[serde(default)]
    inputs: Vec<BchIo>,
    #[serde(default)]
    outputs: Vec<BchIo>,
}

#[derive(Debug, Deserialize)]
struct BchIo {
    address: Option<String>,
    value_satoshis: i64,
    #[serde(default)]
    script: String,
}

fn bch_io(direction: IoDirection, entries: &[BchIo]) -> Vec<TxIo> {
    entries
        .iter()
        .map(|entry| {
            let script_bytes = decode_hex(&entry.script);
            TxIo {
                direction,
                value: Decimal::new(entry.value_satoshis, 8),
                script_type: classify_script_bytes(&script_bytes),
                script_bytes,
                address: entry.address.as_ref().map(|a| make_address(a.clone())),
            }
        })
        .collect()
}

#[async_trait]
impl ChainAdapter for CashAddrAdapter {
    fn name(&self) -> &str {
        "cashaddr-provider"
    }

    async fn balances(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, Decimal>, AdapterError> {
        let mut out = HashMap::new();
        for addr in addresses {
            let resp: BalanceResponse = self
                .get_json(&format!("/address/{}/balance", addr.canonical))
                .await?;
            out.insert(addr.clone(), Decimal::new(resp.balance_satoshis, 8));
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
            let txs: Vec<BchTx> = self
                .get_json(&format!("/address/{}/transactions", addr.canonical))
                .await?;
            for tx in txs {
                latest_block = latest_block.max(tx.block_height);
                all.push(RawTransaction {
                    chain: Chain::Bch,
                    tx_id: tx.txid,
                    block_height: tx.block_height,
                    timestamp_ms: tx.timestamp.unwrap_or(0) * 1000,
                    fee: tx.fee_satoshis.map(|sats| Decimal::new(sats, 8)),
                    status: TxStatus::Confirmed,
                    inputs: bch_io(IoDirection::In, &tx.inputs),
                    outputs: bch_io(IoDirection::Out, &tx.outputs),
                    logs: Vec::new(),
                    multi_io: false,
                    evm: None,
                });
            }
        }
        Ok((latest_block, all))
    }
}
