//! Component F, Bitcoin-family half (spec.md section 4.F).
//!
//! Turns one Bitcoin-family `RawTransaction` into normalized
//! `HistoryEvent`s: fee allocation, net-flow/self-flow cancellation, and
//! OP_RETURN payload decoding.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;

use crate::types::{
    Address, HistoryEvent, HistoryEventSubType, HistoryEventType, RawTransaction, ScriptType,
};

/// Normalizes one Bitcoin-family transaction against `tracked` (canonical
/// address forms). Returns an empty vec if no tracked address participates
/// (step 2: such transactions are dropped entirely).
pub fn normalize_btc_tx(tx: &RawTransaction, tracked: &[Address]) -> Vec<HistoryEvent> {
    let tracked_canonical: HashSet<&str> = tracked.iter().map(|a| a.canonical.as_str()).collect();

    let mut input_value_by_addr: HashMap<String, Decimal> = HashMap::new();
    let mut output_value_by_addr: HashMap<String, Decimal> = HashMap::new();
    let mut first_output_index: HashMap<String, usize> = HashMap::new();

    for io in &tx.inputs {
        if let Some(addr) = &io.address {
            if tracked_canonical.contains(addr.canonical.as_str()) {
                *input_value_by_addr.entry(addr.canonical.clone()).or_default() += io.value;
            }
        }
    }
    for (idx, io) in tx.outputs.iter().enumerate() {
        if let Some(addr) = &io.address {
            if tracked_canonical.contains(addr.canonical.as_str()) {
                *output_value_by_addr.entry(addr.canonical.clone()).or_default() += io.value;
                first_output_index.entry(addr.canonical.clone()).or_insert(idx);
            }
        }
    }

    if input_value_by_addr.is_empty() && output_value_by_addr.is_empty() {
        return Vec::new();
    }

    let total_input: Decimal = tx.inputs.iter().map(|i| i.value).sum();
    let total_output: Decimal = tx.outputs.iter().map(|o| o.value).sum();
    let fee = tx.fee.unwrap_or_else(|| (total_input - total_output).max(Decimal::ZERO));

    let mut events = Vec::new();
    let mut sequence_index = 0u32;

    // Step 3: fee allocation proportional to contributed input value. Skipped
    // for multi_io transactions: a provider that only returned the I/O
    // entries touching a queried address cannot be assumed to have supplied
    // every input, so attributing a fee share here could overcount.
    if !tx.multi_io && fee > Decimal::ZERO && !input_value_by_addr.is_empty() {
        let total_tracked_input: Decimal = input_value_by_addr.values().sum();
        if total_tracked_input > Decimal::ZERO {
            let mut addrs: Vec<&String> = input_value_by_addr.keys().collect();
            addrs.sort();
            let n = addrs.len();
            let mut allocated = Decimal::ZERO;
            for (i, addr) in addrs.iter().enumerate() {
                let contributed = input_value_by_addr[addr.as_str()];
                let share = if i + 1 == n {
                    fee - allocated // last share absorbs the rounding remainder exactly
                } else {
                    let s = (fee * contributed / total_tracked_input).round_dp(8);
                    allocated += s;
                    s
                };
                let mut event = HistoryEvent::new(
                    tx.tx_id.clone(),
                    sequence_index,
                    tx.timestamp_ms,
                    tx.chain,
                    HistoryEventType::Spend,
                    HistoryEventSubType::Fee,
                    "BTC",
                    share,
                );
                event.address = Some((*addr).clone());
                events.push(event);
                sequence_index += 1;
            }
        }
    }

    // Steps 4 & 8: net flow per tracked address, cancelling self-flows.
    let mut net_in: HashMap<String, Decimal> = HashMap::new();
    let mut net_out: HashMap<String, Decimal> = HashMap::new();
    let mut addrs: HashSet<String> = input_value_by_addr.keys().cloned().collect();
    addrs.extend(output_value_by_addr.keys().cloned());
    for addr in &addrs {
        let in_val = input_value_by_addr.get(addr).copied().unwrap_or_default();
        let out_val = output_value_by_addr.get(addr).copied().unwrap_or_default();
        let self_cancel = in_val.min(out_val);
        let remaining_in = in_val - self_cancel;
        let remaining_out = out_val - self_cancel;
        if remaining_in > Decimal::ZERO {
            net_in.insert(addr.clone(), remaining_in);
        }
        if remaining_out > Decimal::ZERO {
            net_out.insert(addr.clone(), remaining_out);
        }
    }

    // Step 5: split tracked-to-tracked movement (TRANSFER) from movement to
    // or from untracked counterparties (SPEND / RECEIVE). Since a flattened
    // `RawTransaction` doesn't preserve which specific input funded which
    // specific output, internal transfer volume is apportioned pro-rata
    // across tracked senders and receivers (see DESIGN.md).
    let total_net_in: Decimal = net_in.values().sum();
    let total_net_out: Decimal = net_out.values().sum();
    let transferred = total_net_in.min(total_net_out);

    let mut senders: Vec<&String> = net_in.keys().collect();
    senders.sort();
    let mut sender_events = Vec::new();
    if transferred > Decimal::ZERO {
        let n = senders.len();
        let mut allocated = Decimal::ZERO;
        for (i, addr) in senders.iter().enumerate() {
            let in_val = net_in[addr.as_str()];
            let share = if i + 1 == n {
                transferred - allocated
            } else {
                let s = (transferred * in_val / total_net_in).round_dp(8);
                allocated += s;
                s
            };
            if share > Decimal::ZERO {
                let mut event = HistoryEvent::new(
                    tx.tx_id.clone(),
                    0,
                    tx.timestamp_ms,
                    tx.chain,
                    HistoryEventType::Transfer,
                    HistoryEventSubType::None,
                    "BTC",
                    share,
                );
                event.address = Some((*addr).clone());
                let output_index = first_output_index.get(addr.as_str()).copied().unwrap_or(usize::MAX);
                sender_events.push((output_index, event));
            }
        }
    }
    for addr in &senders {
        let in_val = net_in[addr.as_str()];
        let sender_transfer: Decimal = sender_events
            .iter()
            .filter(|(_, e)| e.address.as_deref() == Some(addr.as_str()))
            .map(|(_, e)| e.amount)
            .sum();
        let residual = in_val - sender_transfer;
        if residual > Decimal::ZERO {
            let mut event = HistoryEvent::new(
                tx.tx_id.clone(),
                0,
                tx.timestamp_ms,
                tx.chain,
                HistoryEventType::Spend,
                HistoryEventSubType::None,
                "BTC",
                residual,
            );
            event.address = Some((*addr).clone());
            sender_events.push((usize::MAX, event));
        }
    }

    let mut receivers: Vec<&String> = net_out.keys().collect();
    receivers.sort();
    let mut receiver_allocated: HashMap<String, Decimal> = HashMap::new();
    if transferred > Decimal::ZERO {
        let n = receivers.len();
        let mut allocated = Decimal::ZERO;
        for (i, addr) in receivers.iter().enumerate() {
            let out_val = net_out[addr.as_str()];
            let share = if i + 1 == n {
                transferred - allocated
            } else {
                let s = (transferred * out_val / total_net_out).round_dp(8);
                allocated += s;
                s
            };
            receiver_allocated.insert((*addr).clone(), share);
        }
    }
    let mut receiver_events = Vec::new();
    for addr in &receivers {
        let out_val = net_out[addr.as_str()];
        let covered = receiver_allocated.get(addr.as_str()).copied().unwrap_or_default();
        let residual = out_val - covered;
        if residual > Decimal::ZERO {
            let mut event = HistoryEvent::new(
                tx.tx_id.clone(),
                0,
                tx.timestamp_ms,
                tx.chain,
                HistoryEventType::Receive,
                HistoryEventSubType::None,
                "BTC",
                residual,
            );
            event.address = Some((*addr).clone());
            let output_index = first_output_index.get(addr.as_str()).copied().unwrap_or(usize::MAX);
            receiver_events.push((output_index, event));
        }
    }

    // Step 7: transfers/spends/receives ordered by output position.
    let mut combined: Vec<(usize, HistoryEvent)> = Vec::new();
    combined.extend(sender_events);
    combined.extend(receiver_events);
    combined.sort_by_key(|(idx, _)| *idx);
    for (_, mut event) in combined {
        event.sequence_index = sequence_index;
        sequence_index += 1;
        events.push(event);
    }

    // Step 6: OP_RETURN informational events.
    for output in &tx.outputs {
        if output.script_type == ScriptType::OpReturn {
            let payload = decode_op_return_payload(&output.script_bytes);
            let mut event = HistoryEvent::new(
                tx.tx_id.clone(),
                sequence_index,
                tx.timestamp_ms,
                tx.chain,
                HistoryEventType::Informational,
                HistoryEventSubType::None,
                "BTC",
                Decimal::ZERO,
            );
            event.notes = Some(format!("Store text on the blockchain: {payload}"));
            events.push(event);
            sequence_index += 1;
        }
    }

    events
}

/// Decode an OP_RETURN script's payload: UTF-8 if printable, hex otherwise.
/// Handles the common direct-push encoding (`OP_RETURN <len> <data>`);
/// `OP_PUSHDATA1/2/4` multi-byte length prefixes are not decoded and fall
/// back to a hex dump of the whole script.
fn decode_op_return_payload(script_bytes: &[u8]) -> String {
    let payload = match script_bytes {
        [0x6a, len, rest @ ..] if *len as usize <= rest.len() && *len <= 0x4b => {
            &rest[..*len as usize]
        }
        _ => return format!("0x{}", hex_encode(script_bytes)),
    };
    match std::str::from_utf8(payload) {
        Ok(s) if s.chars().all(|c| !c.is_control() || c == '\n') => s.to_string(),
        _ => format!("0x{}", hex_encode(payload)),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chain, IoDirection, TxIo};

    fn io(direction: IoDirection, value: &str, addr: Option<&str>) -> TxIo {
        TxIo {
            direction,
            value: value.parse().unwrap(),
            script_bytes: vec![],
            script_type: ScriptType::P2wpkh,
            address: addr.map(|a| Address::new(Chain::Btc, a)),
        }
    }

    fn base_tx(inputs: Vec<TxIo>, outputs: Vec<TxIo>, fee: &str) -> RawTransaction {
        RawTransaction {
            chain: Chain::Btc,
            tx_id: "e47f8bc6".to_string(),
            block_height: Some(1),
            timestamp_ms: 1_686_238_076_000,
            fee: Some(fee.parse().unwrap()),
            status: crate::types::TxStatus::Confirmed,
            inputs,
            outputs,
            logs: vec![],
            multi_io: false,
            evm: None,
        }
    }

    #[test]
    fn sender_only_tracked_emits_fee_and_spend() {
        let tx = base_tx(
            vec![io(IoDirection::In, "0.00003929", Some("sender"))],
            vec![io(IoDirection::Out, "0.00001437", Some("receiver"))],
            "0.00002492",
        );
        let tracked = vec![Address::new(Chain::Btc, "sender")];
        let events = normalize_btc_tx(&tx, &tracked);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, HistoryEventType::Spend);
        assert_eq!(events[0].event_subtype, HistoryEventSubType::Fee);
        assert_eq!(events[0].amount.to_string(), "0.00002492");
        assert_eq!(events[1].event_type, HistoryEventType::Spend);
        assert_eq!(events[1].amount.to_string(), "0.00001437");
        assert_eq!(events[1].address.as_deref(), Some("sender"));
    }

    #[test]
    fn receiver_only_tracked_emits_single_receive() {
        let tx = base_tx(
            vec![io(IoDirection::In, "0.00003929", Some("sender"))],
            vec![io(IoDirection::Out, "0.00001437", Some("receiver"))],
            "0.00002492",
        );
        let tracked = vec![Address::new(Chain::Btc, "receiver")];
        let events = normalize_btc_tx(&tx, &tracked);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, HistoryEventType::Receive);
        assert_eq!(events[0].amount.to_string(), "0.00001437");
    }

    #[test]
    fn both_tracked_emits_fee_and_transfer() {
        let tx = base_tx(
            vec![io(IoDirection::In, "0.00003929", Some("sender"))],
            vec![io(IoDirection::Out, "0.00001437", Some("receiver"))],
            "0.00002492",
        );
        let tracked = vec![
            Address::new(Chain::Btc, "sender"),
            Address::new(Chain::Btc, "receiver"),
        ];
        let events = normalize_btc_tx(&tx, &tracked);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_subtype, HistoryEventSubType::Fee);
        assert_eq!(events[1].event_type, HistoryEventType::Transfer);
        assert_eq!(events[1].amount.to_string(), "0.00001437");
    }

    #[test]
    fn two_input_fee_split_sums_exactly_to_total_fee() {
        // spec.md section 8's "BTC 2-input 1-output" scenario: two tracked
        // inputs (1.3 and 0.11848 BTC) funding a single 1.418 BTC output
        // with a 0.00048 BTC fee, pro-rated by contributed input and with
        // the alphabetically-last address absorbing the rounding remainder.
        let tx = RawTransaction {
            chain: Chain::Btc,
            tx_id: "4a36d2f5e8b1c4a7f0d3e6b9c2a5f8e1d4b7a0c3e6f9b2a5d8c1e4f7a0b399b1".to_string(),
            block_height: Some(820_000),
            timestamp_ms: 1_686_238_076_000,
            fee: Some("0.00048".parse().unwrap()),
            status: crate::types::TxStatus::Confirmed,
            inputs: vec![
                io(IoDirection::In, "1.3", Some("addr-a")),
                io(IoDirection::In, "0.11848", Some("addr-b")),
            ],
            outputs: vec![io(IoDirection::Out, "1.418", Some("outsider"))],
            logs: vec![],
            multi_io: false,
            evm: None,
        };
        let tracked = vec![
            Address::new(Chain::Btc, "addr-a"),
            Address::new(Chain::Btc, "addr-b"),
        ];
        let events = normalize_btc_tx(&tx, &tracked);
        let fee_events: Vec<_> = events
            .iter()
            .filter(|e| e.event_subtype == HistoryEventSubType::Fee)
            .collect();
        assert_eq!(fee_events.len(), 2);
        // addr-a sorts before addr-b, so addr-a gets the pro-rata share and
        // addr-b (last) absorbs the exact remainder.
        let addr_a_share = fee_events
            .iter()
            .find(|e| e.address.as_deref() == Some("addr-a"))
            .unwrap();
        let addr_b_share = fee_events
            .iter()
            .find(|e| e.address.as_deref() == Some("addr-b"))
            .unwrap();
        assert_eq!(addr_a_share.amount.to_string(), "0.00043991");
        assert_eq!(addr_b_share.amount.to_string(), "0.00004009");
        let sum: Decimal = fee_events.iter().map(|e| e.amount).sum();
        assert_eq!(sum.to_string(), "0.00048000");
    }

    #[test]
    fn no_tracked_participant_drops_the_tx() {
        let tx = base_tx(
            vec![io(IoDirection::In, "1.0", Some("stranger-a"))],
            vec![io(IoDirection::Out, "0.9", Some("stranger-b"))],
            "0.1",
        );
        assert!(normalize_btc_tx(&tx, &[]).is_empty());
    }

    #[test]
    fn op_return_payload_decodes_to_informational_event() {
        let mut script_bytes = vec![0x6a, 13];
        script_bytes.extend_from_slice(b"#FreeSamourai");
        let tx = base_tx(
            vec![io(IoDirection::In, "0.0001", Some("sender"))],
            vec![TxIo {
                direction: IoDirection::Out,
                value: Decimal::ZERO,
                script_bytes,
                script_type: ScriptType::OpReturn,
                address: None,
            }],
            "0.00005",
        );
        let tracked = vec![Address::new(Chain::Btc, "sender")];
        let events = normalize_btc_tx(&tx, &tracked);
        let info = events
            .iter()
            .find(|e| e.event_type == HistoryEventType::Informational)
            .expect("informational event present");
        assert_eq!(
            info.notes.as_deref(),
            Some("Store text on the blockchain: #FreeSamourai")
        );
        assert_eq!(info.amount, Decimal::ZERO);
    }

    #[test]
    fn self_paying_output_cancels_rather_than_double_counts() {
        // Input and output both belong to the same tracked address; no
        // outside counterparty, so no transfer/spend/receive event, only
        // the fee.
        let tx = base_tx(
            vec![io(IoDirection::In, "1.0", Some("addr-a"))],
            vec![io(IoDirection::Out, "0.999", Some("addr-a"))],
            "0.001",
        );
        let tracked = vec![Address::new(Chain::Btc, "addr-a")];
        let events = normalize_btc_tx(&tx, &tracked);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_subtype, HistoryEventSubType::Fee);
    }
}
