//! Component E: the decoder registry (spec.md section 4.E).
//!
//! Maps `contract_address -> [decoder]` and `log_topic0 -> [decoder]`, plus
//! `counterparty_tag -> post_decoding_rule`. Decoders never import each
//! other; each protocol module registers its own decoders with a
//! `DecoderRegistry` built once at startup, which is the registry-seam this
//! crate uses in place of the cyclic accounts/events/decoder imports the
//! original decoding layer relied on.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::types::{HistoryEvent, HistoryEventSubType, HistoryEventType, LogRecord, RawTransaction};

/// Current schema version. Bumping this forces a full re-decode of every
/// stored event (spec.md section 6, `decoder.schema_version`).
pub const SCHEMA_VERSION: u32 = 1;

/// Everything a decoder function needs to inspect one log within its tx.
pub struct DecodingContext<'a> {
    pub tx: &'a RawTransaction,
    pub log: &'a LogRecord,
    pub decoded_so_far: &'a [HistoryEvent],
    pub all_logs: &'a [LogRecord],
    pub tracked_addresses: &'a HashSet<String>,
}

/// A deferred rewrite instruction: "when you later see a transfer matching
/// this shape, rewrite it". Lets a decoder that only sees one log in a
/// multi-log flow (e.g. a vault `Swap` event) pre-declare how the transfer
/// legs emitted from ERC-20 `Transfer` logs elsewhere in the tx should be
/// reclassified.
#[derive(Debug, Clone)]
pub struct ActionItem {
    pub match_event_type: HistoryEventType,
    pub match_subtype: HistoryEventSubType,
    pub match_asset: String,
    pub match_amount: Decimal,
    pub to_type: HistoryEventType,
    pub to_subtype: HistoryEventSubType,
    pub to_counterparty: Option<String>,
    pub to_notes: Option<String>,
}

impl ActionItem {
    pub fn matches(&self, event: &HistoryEvent) -> bool {
        event.event_type == self.match_event_type
            && event.event_subtype == self.match_subtype
            && event.asset == self.match_asset
            && event.amount == self.match_amount
    }

    pub fn apply(&self, event: &mut HistoryEvent) {
        event.event_type = self.to_type;
        event.event_subtype = self.to_subtype;
        if let Some(cp) = &self.to_counterparty {
            event.counterparty = Some(cp.clone());
        }
        if let Some(notes) = &self.to_notes {
            event.notes = Some(notes.clone());
        }
    }
}

/// Output of one decoder invocation on one log.
#[derive(Debug, Clone, Default)]
pub struct DecodingOutput {
    pub new_event: Option<HistoryEvent>,
    pub action_items: Vec<ActionItem>,
    pub matched_counterparty: Option<String>,
}

pub type DecoderFn = Arc<dyn Fn(&DecodingContext) -> DecodingOutput + Send + Sync>;

/// Runs once per tx, after all per-log decoders, for every counterparty a
/// log-level decoder matched. Reorders/reclassifies the tx's events in
/// place (spec.md section 4.F step 4).
pub type PostDecodingRule =
    Arc<dyn Fn(&RawTransaction, &mut Vec<HistoryEvent>, &[LogRecord]) + Send + Sync>;

#[derive(Default, Clone)]
pub struct DecoderRegistry {
    by_address: HashMap<String, Vec<DecoderFn>>,
    by_topic0: HashMap<String, Vec<DecoderFn>>,
    post_decoding_rules: HashMap<String, PostDecodingRule>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the bundled protocol decoders
    /// (uniswap-like routers, Balancer v2/v3, gauges).
    pub fn with_builtin_protocols() -> Self {
        let mut registry = Self::new();
        super::protocols::uniswap_like::register(&mut registry);
        super::protocols::balancer_v2::register(&mut registry);
        super::protocols::balancer_v3::register(&mut registry);
        super::protocols::gauge::register(&mut registry);
        registry
    }

    pub fn register_for_address(&mut self, address: impl Into<String>, decoder: DecoderFn) {
        self.by_address.entry(address.into()).or_default().push(decoder);
    }

    pub fn register_for_topic(&mut self, topic0: impl Into<String>, decoder: DecoderFn) {
        self.by_topic0.entry(topic0.into()).or_default().push(decoder);
    }

    pub fn register_post_decoding_rule(
        &mut self,
        counterparty: impl Into<String>,
        rule: PostDecodingRule,
    ) {
        self.post_decoding_rules.insert(counterparty.into(), rule);
    }

    /// Decoders that apply to `log`: address-scoped first, then
    /// topic0-scoped as a fallback for protocol-wide signatures.
    pub fn decoders_for(&self, log: &LogRecord) -> Vec<DecoderFn> {
        let mut found = Vec::new();
        if let Some(by_addr) = self.by_address.get(&log.address) {
            found.extend(by_addr.iter().cloned());
        }
        if let Some(topic0) = log.topics.first() {
            if let Some(by_topic) = self.by_topic0.get(topic0) {
                found.extend(by_topic.iter().cloned());
            }
        }
        found
    }

    pub fn post_decoding_rule(&self, counterparty: &str) -> Option<PostDecodingRule> {
        self.post_decoding_rules.get(counterparty).cloned()
    }
}
