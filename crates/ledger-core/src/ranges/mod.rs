//! Component A: the fingerprinted-range store (spec.md section 4.A).
//!
//! Records, per fingerprint, which wall-clock intervals have already been
//! pulled from an external data source, so polls stay strictly
//! incremental. Intervals are stored as a sorted `Vec`; `missing_ranges` is
//! a linear scan and `record` is a merge pass — nothing clever, per the
//! spec's own description of the algorithm.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::types::{Fingerprint, Interval};

/// Per-fingerprint interval store plus the block-height side-channel used
/// by block-height-paginated adapters (e.g. blockcypher-shaped ones) to
/// resume pagination without re-deriving a cursor from interval math.
#[derive(Default)]
pub struct RangeStore {
    inner: RwLock<HashMap<Fingerprint, FingerprintState>>,
}

#[derive(Default, Clone)]
struct FingerprintState {
    intervals: Vec<Interval>,
    last_queried_block: Option<u64>,
}

impl RangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the complement of already-known intervals restricted to
    /// `[query.start_ts, query.end_ts]`, in ascending order.
    pub async fn missing_ranges(&self, fingerprint: &str, query: Interval) -> Vec<Interval> {
        let guard = self.inner.read().await;
        let known = guard
            .get(fingerprint)
            .map(|s| s.intervals.as_slice())
            .unwrap_or(&[]);

        let mut missing = Vec::new();
        let mut cursor = query.start_ts;

        for interval in known {
            if interval.end_ts <= cursor {
                continue;
            }
            if interval.start_ts > query.end_ts {
                break;
            }
            if interval.start_ts > cursor {
                missing.push(Interval::new(cursor, interval.start_ts.min(query.end_ts)));
            }
            cursor = cursor.max(interval.end_ts);
            if cursor >= query.end_ts {
                break;
            }
        }
        if cursor < query.end_ts {
            missing.push(Interval::new(cursor, query.end_ts));
        }
        missing.retain(|i| i.start_ts < i.end_ts);
        missing
    }

    /// Adds `interval` to `fingerprint`'s known ranges and coalesces
    /// (invariant 5: adjacent or overlapping intervals merge on insert).
    pub async fn record(&self, fingerprint: &str, interval: Interval) {
        let mut guard = self.inner.write().await;
        let state = guard.entry(fingerprint.to_string()).or_default();
        state.intervals.push(interval);
        state.intervals.sort();

        let mut merged: Vec<Interval> = Vec::with_capacity(state.intervals.len());
        for next in state.intervals.drain(..) {
            match merged.last_mut() {
                Some(last) if last.overlaps_or_touches(&next) => *last = last.union(&next),
                _ => merged.push(next),
            }
        }
        state.intervals = merged;
    }

    pub async fn last_queried_block(&self, fingerprint: &str) -> Option<u64> {
        self.inner
            .read()
            .await
            .get(fingerprint)
            .and_then(|s| s.last_queried_block)
    }

    pub async fn set_last_queried_block(&self, fingerprint: &str, block: u64) {
        let mut guard = self.inner.write().await;
        guard.entry(fingerprint.to_string()).or_default().last_queried_block = Some(block);
    }

    /// Removes every recorded range for `fingerprint` (invariant 6: removing
    /// an address removes its QueryRanges).
    pub async fn remove(&self, fingerprint: &str) {
        self.inner.write().await.remove(fingerprint);
    }
}
