//! blockcypher.com adapter: block-height-paginated, `transactions` only.
//!
//! Grounded on `_query_blockcypher_transactions` in
//! `original_source/rotkehlchen/chain/bitcoin/btc/manager.py`: pages by
//! `before=block_height` until the response's `hasMore` flag is false.
//! Does not expose a reliable activity-only endpoint cheaply, so
//! `balances`/`has_activity` are left `Unsupported` (spec.md section 4.B:
//! "adapter may leave `transactions` unimplemented if it does not support
//! P2PK or similar" — the inverse case applies here, a provider may as
//! well leave balance endpoints unimplemented when its tx endpoint already
//! covers the coordinator's needs).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::DateTime;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{classify_script_bytes, decode_hex};
use crate::chain::http::{self, DirectRateLimiter};
use crate::chain::{ChainAdapter, QueryOptions};
use crate::error::AdapterError;
use crate::types::{Address, Chain, IoDirection, RawTransaction, ScriptType, TxIo, TxStatus};

pub struct BlockcypherAdapter {
    client: reqwest::Client,
    base_url: String,
    limiter: Option<DirectRateLimiter>,
}

impl BlockcypherAdapter {
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            client: http::build_client(16),
            base_url: "https://api.blockcypher.com/v1/btc/main".to_string(),
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
            return Err(AdapterError::RateLimited { retry_after_secs: 60 });
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
struct BlockcypherAddressPage {
    txs: Vec<BlockcypherTx>,
    #[serde(rename = "hasMore", default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct BlockcypherTx {
    hash: String,
    block_height: Option<i64>,
    #[serde(default)]
    confirmed: Option<String>,
    #[serde(default)]
    received: Option<String>,
    #[serde(default)]
    fees: Option<i64>,
    #[serde(default)]
    inputs: Vec<BlockcypherInput>,
    #[serde(default)]
    outputs: Vec<BlockcypherOutput>,
}

#[derive(Debug, Deserialize)]
struct BlockcypherInput {
    #[serde(default)]
    addresses: Vec<String>,
    #[serde(default)]
    output_value: i64,
    #[serde(default)]
    script: String,
    #[serde(default, rename = "script_type")]
    script_type: String,
}

#[derive(Debug, Deserialize)]
struct BlockcypherOutput {
    #[serde(default)]
    addresses: Vec<String>,
    #[serde(default)]
    value: i64,
    #[serde(default)]
    script: String,
    #[serde(default, rename = "script_type")]
    script_type: String,
}

/// BlockCypher's own descriptive `script_type` strings to the internal
/// `ScriptType` classification (spec.md section 3, TxIO). Falls back to
/// byte-pattern classification when the string is missing or unrecognized,
/// since BlockCypher always includes the raw `script` hex alongside it.
fn classify_blockcypher_script(script_type: &str, script_hex: &str) -> ScriptType {
    match script_type {
        "pay-to-pubkey-hash" => ScriptType::P2pkh,
        "pay-to-script-hash" => ScriptType::P2sh,
        "pay-to-witness-pubkey-hash" => ScriptType::P2wpkh,
        "pay-to-witness-script-hash" => ScriptType::P2wsh,
        "pay-to-taproot" => ScriptType::P2tr,
        "pay-to-pubkey" => ScriptType::P2pk,
        "null-data" => ScriptType::OpReturn,
        _ => classify_script_bytes(&decode_hex(script_hex)),
    }
}

fn blockcypher_inputs(inputs: &[BlockcypherInput]) -> Vec<TxIo> {
    inputs
        .iter()
        .map(|entry| TxIo {
            direction: IoDirection::In,
            value: Decimal::new(entry.output_value, 8),
            script_type: classify_blockcypher_script(&entry.script_type, &entry.script),
            script_bytes: decode_hex(&entry.script),
            address: entry.addresses.first().map(|a| Address::new(Chain::Btc, a.clone())),
        })
        .collect()
}

fn blockcypher_outputs(outputs: &[BlockcypherOutput]) -> Vec<TxIo> {
    outputs
        .iter()
        .map(|entry| TxIo {
            direction: IoDirection::Out,
            value: Decimal::new(entry.value, 8),
            script_type: classify_blockcypher_script(&entry.script_type, &entry.script),
            script_bytes: decode_hex(&entry.script),
            address: entry.addresses.first().map(|a| Address::new(Chain::Btc, a.clone())),
        })
        .collect()
}

/// Parses BlockCypher's ISO8601 `confirmed`/`received` timestamp (falling
/// back from the former to the latter) into epoch milliseconds.
fn blockcypher_timestamp_ms(tx: &BlockcypherTx) -> i64 {
    tx.confirmed
        .as_deref()
        .or(tx.received.as_deref())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

#[async_trait]
impl ChainAdapter for BlockcypherAdapter {
    fn name(&self) -> &str {
        "blockcypher.com"
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
        addresses: &[Address],
        options: QueryOptions,
    ) -> Result<(Option<u64>, Vec<RawTransaction>), AdapterError> {
        let mut all = Vec::new();
        let mut latest_block = None;

        for addr in addresses {
            let mut before = options.resume_before_block;
            loop {
                let path = match before {
                    Some(b) => format!("/addrs/{}/full?before={b}", addr.canonical),
                    None => format!("/addrs/{}/full", addr.canonical),
                };
                let page: BlockcypherAddressPage = self.get_json(&path).await?;
                let mut min_height_this_page = None;

                for tx in &page.txs {
                    let height = tx.block_height.filter(|h| *h >= 0).map(|h| h as u64);
                    latest_block = latest_block.max(height);
                    min_height_this_page = Some(match (min_height_this_page, height) {
                        (Some(min), Some(h)) => min.min(h),
                        (None, Some(h)) => h,
                        (other, None) => other.unwrap_or(0),
                    });
                }

                for tx in page.txs {
                    let timestamp_ms = blockcypher_timestamp_ms(&tx);
                    all.push(RawTransaction {
                        chain: Chain::Btc,
                        tx_id: tx.hash,
                        block_height: tx.block_height.filter(|h| *h >= 0).map(|h| h as u64),
                        timestamp_ms,
                        fee: tx.fees.map(|sats| Decimal::new(sats, 8)),
                        status: TxStatus::Confirmed,
                        inputs: blockcypher_inputs(&tx.inputs),
                        outputs: blockcypher_outputs(&tx.outputs),
                        logs: Vec::new(),
                        multi_io: false,
                        evm: None,
                    });
                }

                if !page.has_more {
                    break;
                }
                before = min_height_this_page;
                if before.is_none() {
                    break;
                }
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
        assert_eq!(BlockcypherAdapter::new(1).name(), "blockcypher.com");
    }

    #[test]
    fn classify_blockcypher_script_maps_descriptive_strings() {
        assert_eq!(classify_blockcypher_script("pay-to-pubkey-hash", ""), ScriptType::P2pkh);
        assert_eq!(classify_blockcypher_script("pay-to-witness-pubkey-hash", ""), ScriptType::P2wpkh);
        assert_eq!(classify_blockcypher_script("null-data", ""), ScriptType::OpReturn);
    }

    #[test]
    fn blockcypher_timestamp_parses_confirmed_over_received() {
        let tx = BlockcypherTx {
            hash: "abc".to_string(),
            block_height: Some(100),
            confirmed: Some("2023-06-08T14:27:56Z".to_string()),
            received: Some("2023-06-08T14:20:00Z".to_string()),
            fees: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
        };
        assert_eq!(blockcypher_timestamp_ms(&tx), 1_686_234_476_000);
    }

    #[test]
    fn full_tx_response_parses_into_typed_txio() {
        let body = r#"{"txs": [{
            "hash": "e47f8bc6",
            "block_height": 100,
            "confirmed": "2023-06-08T14:27:56Z",
            "fees": 2492,
            "inputs": [{
                "addresses": ["bc1qsender"],
                "output_value": 3929,
                "script": "0014abc123",
                "script_type": "pay-to-witness-pubkey-hash"
            }],
            "outputs": [{
                "addresses": ["1receiver"],
                "value": 1437,
                "script": "76a914def45600000000000000000000000000000088ac",
                "script_type": "pay-to-pubkey-hash"
            }]
        }]}"#;
        let page: BlockcypherAddressPage = serde_json::from_str(body).unwrap();
        let tx = &page.txs[0];
        let inputs = blockcypher_inputs(&tx.inputs);
        let outputs = blockcypher_outputs(&tx.outputs);
        assert_eq!(inputs[0].value.to_string(), "0.00003929");
        assert_eq!(inputs[0].address.as_ref().unwrap().canonical, "bc1qsender");
        assert_eq!(outputs[0].script_type, ScriptType::P2pkh);
        assert_eq!(tx.fees, Some(2492));
        assert_eq!(blockcypher_timestamp_ms(tx), 1_686_234_476_000);
    }
}
