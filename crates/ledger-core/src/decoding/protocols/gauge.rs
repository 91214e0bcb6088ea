//! Liquidity-gauge deposit decoder: a user stakes an LP token into a gauge
//! contract and receives a gauge receipt token in return. Grounded on
//! `original_source/rotkehlchen/chain/evm/decoding/curve/decoder.py`'s
//! gauge-deposit handling, which shares the `deposit_events_num` extra-data
//! convention already used by the Balancer decoders.

use std::sync::Arc;

use crate::decoding::registry::{DecoderRegistry, DecodingContext, DecodingOutput};
use crate::types::{HistoryEventSubType, HistoryEventType, LogRecord, RawTransaction};

use super::{find_index, move_before};

pub const COUNTERPARTY: &str = "gauge";

/// keccak256-shaped placeholder for a gauge's `Deposit(address,uint256)` event.
pub const DEPOSIT_TOPIC0: &str = "0x90890809c654f11d6e72a28fa60149770a0d11ec6c92319d6ceb2bb0a4ea1a15";

pub fn register(registry: &mut DecoderRegistry) {
    registry.register_for_topic(
        DEPOSIT_TOPIC0,
        Arc::new(|_ctx: &DecodingContext| DecodingOutput {
            new_event: None,
            action_items: vec![],
            matched_counterparty: Some(COUNTERPARTY.to_string()),
        }),
    );
    registry.register_post_decoding_rule(COUNTERPARTY, Arc::new(post_decode));
}

fn post_decode(_tx: &RawTransaction, events: &mut Vec<crate::types::HistoryEvent>, logs: &[LogRecord]) {
    let Some(gauge_log) = logs.iter().find(|l| l.topics.first().map(String::as_str) == Some(DEPOSIT_TOPIC0)) else {
        return;
    };
    reclassify_deposit(events, &gauge_log.address);
}

/// The `SPEND`/`None` leg moving the LP token into the gauge becomes the
/// deposit; the `RECEIVE`/`None` leg of the gauge's own receipt token
/// becomes the wrapped receipt, ordered after its deposit (spec.md section
/// 8's deposit-before-receipt ordering invariant).
fn reclassify_deposit(events: &mut Vec<crate::types::HistoryEvent>, gauge_address: &str) {
    let Some(deposit_idx) = find_index(events, |e| {
        e.event_type == HistoryEventType::Spend && e.event_subtype == HistoryEventSubType::None
    }) else {
        return;
    };
    let Some(receipt_idx) = find_index(events, |e| {
        e.event_type == HistoryEventType::Receive
            && e.event_subtype == HistoryEventSubType::None
            && e.asset == gauge_address
    }) else {
        return;
    };

    events[deposit_idx].event_type = HistoryEventType::Deposit;
    events[deposit_idx].event_subtype = HistoryEventSubType::DepositForWrapped;
    events[deposit_idx].counterparty = Some(COUNTERPARTY.to_string());

    events[receipt_idx].event_subtype = HistoryEventSubType::ReceiveWrapped;
    events[receipt_idx].counterparty = Some(COUNTERPARTY.to_string());

    if receipt_idx < deposit_idx {
        move_before(events, receipt_idx, deposit_idx + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoding::evm_normalizer::{normalize_evm_tx, TRANSFER_TOPIC0};
    use crate::test_util::{make_address, make_evm_tx, make_log};
    use crate::types::Chain;
    use rust_decimal::Decimal;

    fn transfer_log(log_index: u64, token: &str, from: &str, to: &str, amount: u128) -> LogRecord {
        let mut log = make_log(
            log_index,
            token,
            vec![
                TRANSFER_TOPIC0.to_string(),
                format!("0x000000000000000000000000{}", &from[2..]),
                format!("0x000000000000000000000000{}", &to[2..]),
            ],
        );
        let mut data = vec![0u8; 16];
        data.extend_from_slice(&amount.to_be_bytes());
        log.data = data;
        log
    }

    #[test]
    fn deposit_orders_lp_spend_before_receipt_token() {
        let user = "0xuser0000000000000000000000000000000000";
        let gauge = "0xgauge000000000000000000000000000000000";
        let lp_token = "0xlptoken0000000000000000000000000000000";

        let logs = vec![
            transfer_log(0, lp_token, user, gauge, 100),
            transfer_log(1, gauge, gauge, user, 100),
            make_log(2, gauge, vec![DEPOSIT_TOPIC0.to_string()]),
        ];
        let tx = make_evm_tx("0xgaugedeposit", user, Some(gauge.to_string()), Decimal::ZERO, logs);

        let mut registry = DecoderRegistry::new();
        register(&mut registry);

        let tracked = vec![make_address(Chain::Evm(1), user)];
        let events = normalize_evm_tx(&tx, &tracked, &registry);

        let deposit = events
            .iter()
            .find(|e| e.event_subtype == HistoryEventSubType::DepositForWrapped)
            .expect("deposit leg present");
        let receipt = events
            .iter()
            .find(|e| e.event_subtype == HistoryEventSubType::ReceiveWrapped)
            .expect("wrapped receipt present");
        assert_eq!(deposit.counterparty.as_deref(), Some(COUNTERPARTY));
        assert!(deposit.sequence_index < receipt.sequence_index);
    }
}
