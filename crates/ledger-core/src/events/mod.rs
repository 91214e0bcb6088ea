//! Component H: the append-only event store (spec.md section 4.H).

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use crate::types::{Chain, HistoryEvent, HistoryEventType};

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub chain: Option<Chain>,
    pub address: Option<String>,
    pub event_type: Option<crate::types::HistoryEventType>,
    pub from_ts: Option<i64>,
    pub to_ts: Option<i64>,
}

impl EventFilter {
    fn matches(&self, event: &HistoryEvent) -> bool {
        if let Some(chain) = self.chain {
            if event.location != chain {
                return false;
            }
        }
        if let Some(address) = &self.address {
            if event.address.as_deref() != Some(address.as_str()) {
                return false;
            }
        }
        if let Some(event_type) = self.event_type {
            if event.event_type != event_type {
                return false;
            }
        }
        if let Some(from) = self.from_ts {
            if event.timestamp_ms < from {
                return false;
            }
        }
        if let Some(to) = self.to_ts {
            if event.timestamp_ms > to {
                return false;
            }
        }
        true
    }
}

/// Append-only table of `HistoryEvent`s, keyed by
/// `(event_identifier, sequence_index)` (invariant 2).
///
/// Internally a `BTreeMap<(timestamp, event_identifier, sequence_index),
/// event>` keeps the primary timestamp-ordered index free; a secondary
/// `event_identifier -> keys` map supports group fetch and delete-by-id.
#[derive(Default)]
pub struct EventStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    by_time: BTreeMap<(i64, String, u32), HistoryEvent>,
    by_identifier: HashMap<String, Vec<(i64, String, u32)>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-or-ignore on `(event_identifier, sequence_index)` (testable
    /// property 2: re-decode idempotence).
    pub async fn insert(&self, event: HistoryEvent) -> bool {
        let key = (
            event.timestamp_ms,
            event.event_identifier.clone(),
            event.sequence_index,
        );
        let mut inner = self.inner.write().await;
        if inner.by_time.contains_key(&key) {
            return false;
        }
        inner
            .by_identifier
            .entry(event.event_identifier.clone())
            .or_default()
            .push(key.clone());
        inner.by_time.insert(key, event);
        true
    }

    /// Replace every event for `event_identifier` with `new_events`,
    /// carrying forward the previous `notes` field of whichever old event
    /// occupied the same `sequence_index` when the new event doesn't set
    /// one explicitly. This is how a decoder-registry re-decode (spec.md
    /// section 3, HistoryEvents lifecycle) preserves user edits — see
    /// DESIGN.md, Open Question 1.
    pub async fn replace_for_tx(&self, event_identifier: &str, mut new_events: Vec<HistoryEvent>) {
        let old_notes: HashMap<u32, Option<String>> = self
            .events_for_identifier(event_identifier)
            .await
            .into_iter()
            .map(|e| (e.sequence_index, e.notes))
            .collect();

        self.delete_for_identifier(event_identifier).await;

        for event in &mut new_events {
            if event.notes.is_none() {
                if let Some(preserved) = old_notes.get(&event.sequence_index) {
                    event.notes = preserved.clone();
                }
            }
        }
        for event in new_events {
            self.insert(event).await;
        }
    }

    pub async fn events_in_range(&self, filter: &EventFilter) -> Vec<HistoryEvent> {
        self.inner
            .read()
            .await
            .by_time
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    pub async fn events_for_identifier(&self, event_identifier: &str) -> Vec<HistoryEvent> {
        let inner = self.inner.read().await;
        let mut events: Vec<HistoryEvent> = inner
            .by_identifier
            .get(event_identifier)
            .into_iter()
            .flatten()
            .filter_map(|k| inner.by_time.get(k).cloned())
            .collect();
        events.sort_by_key(|e| e.sequence_index);
        events
    }

    /// spec.md section 4.F, "Informational transitions": when `address`
    /// stops being tracked, any STAKING event whose only participant is
    /// `address` is rewritten to INFORMATIONAL rather than deleted. The
    /// original type is stashed in `extra_data` so `retag_on_retrack` can
    /// undo the rewrite if the address is tracked again.
    pub async fn retag_on_untrack(&self, address: &str) {
        let mut inner = self.inner.write().await;
        for event in inner.by_time.values_mut() {
            if event.address.as_deref() == Some(address) && event.event_type == HistoryEventType::Staking
            {
                event.extra_data = Some(serde_json::json!({"retagged_from": "staking"}));
                event.event_type = HistoryEventType::Informational;
            }
        }
    }

    /// The inverse of `retag_on_untrack`, run when `address` is tracked
    /// again: any INFORMATIONAL event it stashed reverts to STAKING.
    pub async fn retag_on_retrack(&self, address: &str) {
        let mut inner = self.inner.write().await;
        for event in inner.by_time.values_mut() {
            if event.address.as_deref() != Some(address)
                || event.event_type != HistoryEventType::Informational
            {
                continue;
            }
            let was_staking = event
                .extra_data
                .as_ref()
                .and_then(|v| v.get("retagged_from"))
                .and_then(|v| v.as_str())
                == Some("staking");
            if was_staking {
                event.event_type = HistoryEventType::Staking;
                event.extra_data = None;
            }
        }
    }

    /// Deletes every event for `event_identifier` (used before a re-decode
    /// writes the replacement set).
    pub async fn delete_for_identifier(&self, event_identifier: &str) {
        let mut inner = self.inner.write().await;
        if let Some(keys) = inner.by_identifier.remove(event_identifier) {
            for key in keys {
                inner.by_time.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chain, HistoryEventSubType, HistoryEventType};
    use rust_decimal::Decimal;

    fn event(id: &str, seq: u32, ts: i64) -> HistoryEvent {
        HistoryEvent::new(
            id,
            seq,
            ts,
            Chain::Btc,
            HistoryEventType::Spend,
            HistoryEventSubType::None,
            "BTC",
            Decimal::ONE,
        )
    }

    #[tokio::test]
    async fn insert_is_idempotent_on_identifier_and_sequence() {
        let store = EventStore::new();
        assert!(store.insert(event("tx1", 0, 100)).await);
        assert!(!store.insert(event("tx1", 0, 100)).await);
    }

    #[tokio::test]
    async fn events_for_identifier_sorted_by_sequence() {
        let store = EventStore::new();
        store.insert(event("tx1", 1, 100)).await;
        store.insert(event("tx1", 0, 100)).await;
        let events = store.events_for_identifier("tx1").await;
        assert_eq!(events.iter().map(|e| e.sequence_index).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[tokio::test]
    async fn delete_for_identifier_removes_all_its_events() {
        let store = EventStore::new();
        store.insert(event("tx1", 0, 100)).await;
        store.insert(event("tx1", 1, 100)).await;
        store.delete_for_identifier("tx1").await;
        assert!(store.events_for_identifier("tx1").await.is_empty());
    }

    #[tokio::test]
    async fn untrack_then_retrack_round_trips_staking_event() {
        let store = EventStore::new();
        let mut staking = event("tx1", 0, 100);
        staking.event_type = HistoryEventType::Staking;
        staking.address = Some("gauge-user".to_string());
        store.insert(staking).await;

        store.retag_on_untrack("gauge-user").await;
        let after_untrack = store.events_for_identifier("tx1").await;
        assert_eq!(after_untrack[0].event_type, HistoryEventType::Informational);
        assert!(after_untrack[0].extra_data.is_some());

        store.retag_on_retrack("gauge-user").await;
        let after_retrack = store.events_for_identifier("tx1").await;
        assert_eq!(after_retrack[0].event_type, HistoryEventType::Staking);
        assert!(after_retrack[0].extra_data.is_none());
    }

    #[tokio::test]
    async fn retag_on_untrack_ignores_other_addresses_and_types() {
        let store = EventStore::new();
        let mut other_addr = event("tx1", 0, 100);
        other_addr.event_type = HistoryEventType::Staking;
        other_addr.address = Some("someone-else".to_string());
        store.insert(other_addr).await;

        let mut non_staking = event("tx2", 0, 100);
        non_staking.address = Some("gauge-user".to_string());
        store.insert(non_staking).await;

        store.retag_on_untrack("gauge-user").await;
        let e1 = store.events_for_identifier("tx1").await;
        let e2 = store.events_for_identifier("tx2").await;
        assert_eq!(e1[0].event_type, HistoryEventType::Staking);
        assert_eq!(e2[0].event_type, HistoryEventType::Spend);
    }

    #[tokio::test]
    async fn re_decode_preserves_user_edited_notes() {
        let store = EventStore::new();
        let mut first = event("tx1", 0, 100);
        first.notes = Some("user note".to_string());
        store.replace_for_tx("tx1", vec![first]).await;

        // Re-decode produces a fresh event at the same sequence_index with
        // no notes of its own; replace_for_tx should carry the old note
        // forward rather than dropping it.
        let second = event("tx1", 0, 100);
        store.replace_for_tx("tx1", vec![second]).await;

        let events = store.events_for_identifier("tx1").await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].notes, Some("user note".to_string()));
    }

    #[tokio::test]
    async fn re_decode_does_not_override_decoder_supplied_notes() {
        let store = EventStore::new();
        let mut first = event("tx1", 0, 100);
        first.notes = Some("user note".to_string());
        store.replace_for_tx("tx1", vec![first]).await;

        let mut second = event("tx1", 0, 100);
        second.notes = Some("decoder note".to_string());
        store.replace_for_tx("tx1", vec![second]).await;

        let events = store.events_for_identifier("tx1").await;
        assert_eq!(events[0].notes, Some("decoder note".to_string()));
    }
}
