//! Shared test fixtures for `ledger-core` unit tests.
//!
//! Consolidates builder functions for `RawTransaction`/`HistoryEvent` so
//! tests across modules share one source of truth for dummy data.

use rust_decimal::Decimal;

use crate::types::{
    Address, Chain, EvmTxInfo, HistoryEvent, HistoryEventSubType, HistoryEventType, LogRecord,
    RawTransaction, TxStatus,
};

/// Build a minimal confirmed BTC `RawTransaction` with the given inputs and
/// outputs and sane defaults for every other field.
pub fn make_btc_tx(
    tx_id: impl Into<String>,
    inputs: Vec<crate::types::TxIo>,
    outputs: Vec<crate::types::TxIo>,
) -> RawTransaction {
    RawTransaction {
        chain: Chain::Btc,
        tx_id: tx_id.into(),
        block_height: Some(100),
        timestamp_ms: 1_700_000_000_000,
        fee: Some(Decimal::new(1000, 8)),
        status: TxStatus::Confirmed,
        inputs,
        outputs,
        logs: vec![],
        multi_io: false,
        evm: None,
    }
}

/// Build a minimal confirmed EVM `RawTransaction` with the given logs and
/// a `from -> to` native-value transfer.
pub fn make_evm_tx(
    tx_id: impl Into<String>,
    from: impl Into<String>,
    to: Option<String>,
    value: Decimal,
    logs: Vec<LogRecord>,
) -> RawTransaction {
    RawTransaction {
        chain: Chain::Evm(1),
        tx_id: tx_id.into(),
        block_height: Some(1_000_000),
        timestamp_ms: 1_700_000_000_000,
        fee: Some(Decimal::new(21_000, 0) * Decimal::new(20, 9)),
        status: TxStatus::Confirmed,
        inputs: vec![],
        outputs: vec![],
        logs,
        multi_io: false,
        evm: Some(EvmTxInfo {
            from: from.into(),
            to,
            value,
            gas_used: 21_000,
            effective_gas_price: Decimal::new(20, 9),
        }),
    }
}

/// Build a `LogRecord` with the given topics and empty data.
pub fn make_log(log_index: u64, address: impl Into<String>, topics: Vec<String>) -> LogRecord {
    LogRecord {
        log_index,
        address: address.into(),
        topics,
        data: vec![],
    }
}

pub fn make_address(chain: Chain, value: impl Into<String>) -> Address {
    Address::new(chain, value)
}

/// Build a minimal `HistoryEvent` for store-level tests.
pub fn make_event(event_identifier: impl Into<String>, sequence_index: u32, timestamp_ms: i64) -> HistoryEvent {
    HistoryEvent::new(
        event_identifier,
        sequence_index,
        timestamp_ms,
        Chain::Btc,
        HistoryEventType::Spend,
        HistoryEventSubType::None,
        "BTC",
        Decimal::ONE,
    )
}
