//! Generic Uniswap-style AMM swap decoder (spec.md section 8, "EVM swap"
//! scenario): a router receives one token via an ERC-20 `Transfer` and
//! sends back another, emitting a router-level `Swap` event. Grounded on
//! `original_source/rotkehlchen/chain/evm/decoding/uniswap/decoder.py`'s
//! `_decode_swap`, simplified to the two-leg case the spec's scenario
//! describes.

use std::sync::Arc;

use crate::decoding::registry::{DecoderRegistry, DecodingContext, DecodingOutput};
use crate::types::{HistoryEventSubType, HistoryEventType};

use super::{find_index, move_before};

pub const COUNTERPARTY: &str = "uniswap-like";

/// keccak256-shaped placeholder topic for a generic router `Swap(...)`
/// event; concrete router ABIs vary, callers register their own topic if it
/// differs.
pub const SWAP_TOPIC0: &str = "0x1c411e9a96e071241c2f21f7726b17ae89e3cab4c78be50e062b03a9fffbbad";

pub fn register(registry: &mut DecoderRegistry) {
    registry.register_for_topic(
        SWAP_TOPIC0,
        Arc::new(|_ctx: &DecodingContext| DecodingOutput {
            new_event: None,
            action_items: vec![],
            matched_counterparty: Some(COUNTERPARTY.to_string()),
        }),
    );
    registry.register_post_decoding_rule(COUNTERPARTY, Arc::new(reorder_swap_legs));
}

/// Reclassifies the first preliminary `SPEND`/`None` and `RECEIVE`/`None`
/// events into a `TRADE` pair and ensures the spend leg precedes the
/// receive leg (spec.md section 8, testable property 6).
fn reorder_swap_legs(
    _tx: &crate::types::RawTransaction,
    events: &mut Vec<crate::types::HistoryEvent>,
    _logs: &[crate::types::LogRecord],
) {
    let Some(spend_idx) = find_index(events, |e| {
        e.event_type == HistoryEventType::Spend && e.event_subtype == HistoryEventSubType::None
    }) else {
        return;
    };
    let Some(receive_idx) = find_index(events, |e| {
        e.event_type == HistoryEventType::Receive && e.event_subtype == HistoryEventSubType::None
    }) else {
        return;
    };

    events[spend_idx].event_type = HistoryEventType::Trade;
    events[spend_idx].event_subtype = HistoryEventSubType::Spend;
    events[spend_idx].counterparty = Some(COUNTERPARTY.to_string());
    events[spend_idx].notes = Some(format!(
        "Swap {} {} via {COUNTERPARTY}",
        events[spend_idx].amount, events[spend_idx].asset
    ));

    events[receive_idx].event_type = HistoryEventType::Trade;
    events[receive_idx].event_subtype = HistoryEventSubType::Receive;
    events[receive_idx].counterparty = Some(COUNTERPARTY.to_string());
    events[receive_idx].notes = Some(format!(
        "Receive {} {} as the result of a swap via {COUNTERPARTY}",
        events[receive_idx].amount, events[receive_idx].asset
    ));

    if receive_idx < spend_idx {
        move_before(events, receive_idx, spend_idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoding::evm_normalizer::normalize_evm_tx;
    use crate::test_util::{make_address, make_evm_tx, make_log};
    use crate::types::Chain;
    use rust_decimal::Decimal;

    fn erc20_transfer_log(log_index: u64, token: &str, from: &str, to: &str, amount: u128) -> crate::types::LogRecord {
        let mut log = make_log(
            log_index,
            token,
            vec![
                crate::decoding::evm_normalizer::TRANSFER_TOPIC0.to_string(),
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
    fn swap_produces_ordered_trade_pair() {
        let user = "0xuser0000000000000000000000000000000000";
        let router = "0xrouter00000000000000000000000000000000";
        let token_a = "0xtokena0000000000000000000000000000000";
        let token_b = "0xtokenb0000000000000000000000000000000";

        let logs = vec![
            erc20_transfer_log(0, token_a, user, router, 10),
            erc20_transfer_log(1, token_b, router, user, 7),
            make_log(2, router, vec![SWAP_TOPIC0.to_string()]),
        ];
        let tx = make_evm_tx("0xswap", user, Some(router.to_string()), Decimal::ZERO, logs);

        let mut registry = DecoderRegistry::new();
        register(&mut registry);

        let tracked = vec![make_address(Chain::Evm(1), user)];
        let events = normalize_evm_tx(&tx, &tracked, &registry);

        let spend = events
            .iter()
            .find(|e| e.event_subtype == HistoryEventSubType::Spend)
            .expect("spend leg present");
        let receive = events
            .iter()
            .find(|e| e.event_subtype == HistoryEventSubType::Receive)
            .expect("receive leg present");
        assert_eq!(spend.counterparty.as_deref(), Some(COUNTERPARTY));
        assert!(spend.sequence_index < receive.sequence_index);
    }
}
