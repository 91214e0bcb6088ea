//! Subgraph adapter: read-only protocol-level metadata (Balancer pool
//! info, Curve gauges, ...). Never serves a tx stream, so `transactions`
//! stays at its default `Unsupported` implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::chain::http;
use crate::chain::ChainAdapter;
use crate::error::AdapterError;
use crate::types::Address;

pub struct SubgraphAdapter {
    client: reqwest::Client,
    endpoint: String,
}

impl SubgraphAdapter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: http::build_client(8),
            endpoint: endpoint.into(),
        }
    }

    /// Run an arbitrary GraphQL query against the subgraph endpoint.
    /// Metadata shapes vary per protocol, so callers (decoder modules)
    /// supply the query and parse `data` themselves.
    pub async fn query(&self, graphql: &str) -> Result<Value, AdapterError> {
        let body = serde_json::json!({ "query": graphql });
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
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
        let mut json: Value = resp
            .json()
            .await
            .map_err(|e| AdapterError::BadResponse(e.to_string()))?;
        json.get_mut("data")
            .map(Value::take)
            .ok_or_else(|| AdapterError::BadResponse("missing `data` field".to_string()))
    }
}

#[async_trait]
impl ChainAdapter for SubgraphAdapter {
    fn name(&self) -> &str {
        "subgraph"
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_name_is_stable() {
        assert_eq!(SubgraphAdapter::new("https://example/subgraph").name(), "subgraph");
    }
}
