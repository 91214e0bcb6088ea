//! Shared domain types for the ingestion and decoding pipeline.
//!
//! Mirrors the teacher crate's style of plain structs with a handful of
//! small enums and newtypes (`ScriptType`, `BlockHeight`), but generalized
//! from a single Bitcoin-ancestry domain to the chain-agnostic model the
//! ranges/adapters/coordinator/decoder/event-store components share.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ==============================================================================
// Chain & Address
// ==============================================================================

/// One of the supported chain families. EVM chains share structure but are
/// kept distinct by their numeric chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Chain {
    Btc,
    Bch,
    Evm(u64),
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::Btc => write!(f, "btc"),
            Chain::Bch => write!(f, "bch"),
            Chain::Evm(id) => write!(f, "evm:{id}"),
        }
    }
}

/// An on-chain address. EVM addresses have one canonical lowercase-hex
/// form, so `display == canonical` there; Bitcoin Cash addresses may be
/// entered as bare or `cashaddr:`-prefixed and are canonicalized for
/// comparison while the originally entered form is preserved for display.
///
/// See DESIGN.md, Open Question 2: canonicalization never mutates the
/// user's originally entered string, it only changes what gets compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub chain: Chain,
    pub display: String,
    pub canonical: String,
}

impl Address {
    /// Construct an address whose display and canonical forms are the same
    /// (the common case: EVM hex addresses, already-canonical BTC addresses).
    pub fn new(chain: Chain, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            chain,
            canonical: value.clone(),
            display: value,
        }
    }

    /// Construct an address with a distinct display form (e.g. a
    /// `cashaddr:`-prefixed BCH address canonicalized to its bare form).
    pub fn with_canonical(
        chain: Chain,
        display: impl Into<String>,
        canonical: impl Into<String>,
    ) -> Self {
        Self {
            chain,
            display: display.into(),
            canonical: canonical.into(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display)
    }
}

// ==============================================================================
// Script classification (Bitcoin family)
// ==============================================================================

/// Classification of a Bitcoin-family output script. `P2pk` and
/// `OpReturn` get special handling in the normalizer: P2PK has no
/// embedded address (one must be derived from the public key), and
/// OP_RETURN carries no spendable value, only data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptType {
    P2pk,
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
    OpReturn,
    Other,
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScriptType::P2pk => "p2pk",
            ScriptType::P2pkh => "p2pkh",
            ScriptType::P2sh => "p2sh",
            ScriptType::P2wpkh => "p2wpkh",
            ScriptType::P2wsh => "p2wsh",
            ScriptType::P2tr => "p2tr",
            ScriptType::OpReturn => "op_return",
            ScriptType::Other => "other",
        };
        write!(f, "{s}")
    }
}

// ==============================================================================
// Raw transaction (Bitcoin & EVM family)
// ==============================================================================

/// Direction of a Bitcoin-family TxIO entry relative to the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoDirection {
    In,
    Out,
}

/// One input or output of a Bitcoin-family transaction. `address` is
/// absent for P2PK (must be derived from the script) and for OP_RETURN
/// (no address at all, payload only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxIo {
    pub direction: IoDirection,
    pub value: Decimal,
    pub script_bytes: Vec<u8>,
    pub script_type: ScriptType,
    pub address: Option<Address>,
}

/// A single EVM receipt log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub log_index: u64,
    pub address: String,
    pub topics: Vec<String>,
    pub data: Vec<u8>,
}

/// Status of a raw transaction as reported by the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Confirmed,
    Failed,
    Pending,
}

/// Immutable, exact record of an upstream transaction plus its decoded
/// I/O or logs, pre-normalization. `tx_id` is unique within a chain
/// (invariant 1 in spec.md section 3).
///
/// `multi_io` (Bitcoin family only) is set when the upstream provider
/// only returned the I/O entries relevant to a queried address, omitting
/// the rest of the transaction's inputs/outputs. See DESIGN.md and
/// `original_source/rotkehlchen/chain/bitcoin/btc/manager.py`'s
/// `vin_sz`/`vout_sz` mismatch check: when set, the normalizer cannot
/// assume it has seen every input/output and must skip self-flow
/// cancellation (spec.md section 4.F step 8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub chain: Chain,
    pub tx_id: String,
    pub block_height: Option<u64>,
    pub timestamp_ms: i64,
    pub fee: Option<Decimal>,
    pub status: TxStatus,
    pub inputs: Vec<TxIo>,
    pub outputs: Vec<TxIo>,
    pub logs: Vec<LogRecord>,
    pub multi_io: bool,
    /// Top-level native-value transfer, gas used, and effective gas price
    /// for EVM transactions; `None` for Bitcoin-family txs.
    pub evm: Option<EvmTxInfo>,
}

/// EVM-specific fields that don't fit the Bitcoin-family TxIo shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvmTxInfo {
    pub from: String,
    pub to: Option<String>,
    pub value: Decimal,
    pub gas_used: u64,
    pub effective_gas_price: Decimal,
}

// ==============================================================================
// History events
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryEventType {
    Spend,
    Receive,
    Transfer,
    Deposit,
    Withdrawal,
    Trade,
    Staking,
    Informational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryEventSubType {
    None,
    Fee,
    DepositAsset,
    RemoveAsset,
    DepositForWrapped,
    RedeemWrapped,
    ReceiveWrapped,
    ReturnWrapped,
    PaybackDebt,
    GenerateDebt,
    Reward,
    Refund,
    Burn,
    Governance,
    Spend,
    Receive,
}

/// A chain-agnostic, normalized record of one ledger-affecting action.
/// `(event_identifier, sequence_index)` is the primary key (invariant 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub event_identifier: String,
    pub sequence_index: u32,
    pub timestamp_ms: i64,
    pub location: Chain,
    pub event_type: HistoryEventType,
    pub event_subtype: HistoryEventSubType,
    pub asset: String,
    pub amount: Decimal,
    pub location_label: Option<String>,
    pub notes: Option<String>,
    pub counterparty: Option<String>,
    pub address: Option<String>,
    pub extra_data: Option<serde_json::Value>,
}

impl HistoryEvent {
    /// Convenience constructor for the common case of a fee/spend/receive
    /// event with no counterparty or extra data; callers set those fields
    /// afterward when a decoder needs them.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_identifier: impl Into<String>,
        sequence_index: u32,
        timestamp_ms: i64,
        location: Chain,
        event_type: HistoryEventType,
        event_subtype: HistoryEventSubType,
        asset: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            event_identifier: event_identifier.into(),
            sequence_index,
            timestamp_ms,
            location,
            event_type,
            event_subtype,
            asset: asset.into(),
            amount,
            location_label: None,
            notes: None,
            counterparty: None,
            address: None,
            extra_data: None,
        }
    }
}

// ==============================================================================
// Query ranges
// ==============================================================================

/// A half-open wall-clock interval `[start_ts, end_ts)`, milliseconds since
/// epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Interval {
    pub start_ts: i64,
    pub end_ts: i64,
}

impl Interval {
    pub fn new(start_ts: i64, end_ts: i64) -> Self {
        debug_assert!(start_ts <= end_ts, "interval start must not exceed end");
        Self { start_ts, end_ts }
    }

    pub fn overlaps_or_touches(&self, other: &Interval) -> bool {
        self.start_ts <= other.end_ts && other.start_ts <= self.end_ts
    }

    pub fn union(&self, other: &Interval) -> Interval {
        Interval::new(
            self.start_ts.min(other.start_ts),
            self.end_ts.max(other.end_ts),
        )
    }
}

/// A stable string key for a `(address, chain, data-kind)` tuple, e.g.
/// `txs:btc:bc1q...`.
pub type Fingerprint = String;

pub fn fingerprint(data_kind: &str, chain: Chain, address: &str) -> Fingerprint {
    format!("{data_kind}:{chain}:{address}")
}

/// Coalesced list of wall-clock intervals already pulled for a fingerprint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRange {
    pub fingerprint: Fingerprint,
    pub intervals: Vec<Interval>,
}

// ==============================================================================
// Ignored actions
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IgnoredActionKey {
    pub action_type: String,
    pub external_id: String,
}

/// Set of actions the user has marked as "do not include in accounting."
/// Kept as a `BTreeMap` so iteration order (and thus any snapshot taken of
/// it) is deterministic.
#[derive(Debug, Clone, Default)]
pub struct IgnoredActionSet {
    pub(crate) entries: BTreeMap<(String, String), ()>,
}

impl IgnoredActionSet {
    pub fn contains(&self, key: &IgnoredActionKey) -> bool {
        self.entries
            .contains_key(&(key.action_type.clone(), key.external_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_union_of_overlapping_ranges() {
        let a = Interval::new(0, 100);
        let b = Interval::new(50, 200);
        assert!(a.overlaps_or_touches(&b));
        assert_eq!(a.union(&b), Interval::new(0, 200));
    }

    #[test]
    fn interval_touching_at_boundary_counts_as_overlap() {
        let a = Interval::new(0, 100);
        let b = Interval::new(100, 200);
        assert!(a.overlaps_or_touches(&b));
    }

    #[test]
    fn interval_disjoint_ranges_do_not_overlap() {
        let a = Interval::new(0, 100);
        let b = Interval::new(101, 200);
        assert!(!a.overlaps_or_touches(&b));
    }

    #[test]
    fn address_with_distinct_canonical_form_preserves_display() {
        let addr = Address::with_canonical(Chain::Bch, "cashaddr:qpm2q...", "qpm2q...");
        assert_eq!(addr.display, "cashaddr:qpm2q...");
        assert_eq!(addr.canonical, "qpm2q...");
        assert_eq!(addr.to_string(), "cashaddr:qpm2q...");
    }

    #[test]
    fn chain_display_matches_fingerprint_convention() {
        assert_eq!(Chain::Btc.to_string(), "btc");
        assert_eq!(Chain::Evm(1).to_string(), "evm:1");
        assert_eq!(fingerprint("txs", Chain::Btc, "addr1"), "txs:btc:addr1");
    }
}
