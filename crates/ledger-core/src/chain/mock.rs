//! In-memory mock [`ChainAdapter`] for tests, grounded on the teacher's
//! `rpc::mock::MockRpc` builder pattern.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{ChainAdapter, QueryOptions};
use crate::error::AdapterError;
use crate::types::{Address, RawTransaction};

pub struct MockAdapter {
    name: String,
    balances: HashMap<Address, Decimal>,
    transactions: Vec<RawTransaction>,
    fail_with: Option<AdapterError>,
    calls: Mutex<u32>,
}

pub struct MockAdapterBuilder {
    name: String,
    balances: HashMap<Address, Decimal>,
    transactions: Vec<RawTransaction>,
    fail_with: Option<AdapterError>,
}

impl MockAdapter {
    pub fn builder(name: impl Into<String>) -> MockAdapterBuilder {
        MockAdapterBuilder {
            name: name.into(),
            balances: HashMap::new(),
            transactions: Vec::new(),
            fail_with: None,
        }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().expect("mock adapter mutex poisoned")
    }
}

impl MockAdapterBuilder {
    pub fn with_balance(mut self, addr: Address, balance: Decimal) -> Self {
        self.balances.insert(addr, balance);
        self
    }

    pub fn with_tx(mut self, tx: RawTransaction) -> Self {
        self.transactions.push(tx);
        self
    }

    pub fn failing_with(mut self, err: AdapterError) -> Self {
        self.fail_with = Some(err);
        self
    }

    pub fn build(self) -> MockAdapter {
        MockAdapter {
            name: self.name,
            balances: self.balances,
            transactions: self.transactions,
            fail_with: self.fail_with,
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl ChainAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn balances(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, Decimal>, AdapterError> {
        *self.calls.lock().expect("mock adapter mutex poisoned") += 1;
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        Ok(addresses
            .iter()
            .filter_map(|a| self.balances.get(a).map(|v| (a.clone(), *v)))
            .collect())
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
        _addresses: &[Address],
        _options: QueryOptions,
    ) -> Result<(Option<u64>, Vec<RawTransaction>), AdapterError> {
        *self.calls.lock().expect("mock adapter mutex poisoned") += 1;
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        Ok((None, self.transactions.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::make_btc_tx;
    use crate::types::Chain;

    #[tokio::test]
    async fn mock_returns_configured_transactions() {
        let mock = MockAdapter::builder("mock")
            .with_tx(make_btc_tx("tx1", vec![], vec![]))
            .build();
        let addr = Address::new(Chain::Btc, "addr1");
        let (_, txs) = mock.transactions(&[addr], QueryOptions::default()).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn mock_returns_configured_failure() {
        let mock = MockAdapter::builder("mock")
            .failing_with(AdapterError::Network("boom".to_string()))
            .build();
        let addr = Address::new(Chain::Btc, "addr1");
        let err = mock.balances(&[addr]).await.unwrap_err();
        assert!(matches!(err, AdapterError::Network(_)));
    }
}
