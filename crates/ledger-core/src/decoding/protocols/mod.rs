//! Concrete protocol decoders shipped with this crate (spec.md section 4.E).
//!
//! Each submodule owns one `register(&mut DecoderRegistry)` entry point and
//! never imports another protocol module — decoders only ever talk to the
//! registry, never to each other, which is the registry-seam design note
//! (spec.md section 9) replacing the source's cyclic accounts/events/decoder
//! imports.

pub mod balancer_v2;
pub mod balancer_v3;
pub mod gauge;
pub mod uniswap_like;

use crate::types::HistoryEvent;

/// Moves the event at `from` to sit immediately before the event at `to`
/// (positions are resolved in `events`'s *current* order before the move).
/// Used by post-decoding rules to satisfy the ordering invariants in
/// spec.md section 8 (testable properties 6 and 7) without hand-rolling
/// index arithmetic in every protocol module.
pub(crate) fn move_before(events: &mut Vec<HistoryEvent>, from: usize, to: usize) {
    if from == to || from + 1 == to {
        return;
    }
    let event = events.remove(from);
    let insert_at = if from < to { to - 1 } else { to };
    events.insert(insert_at, event);
}

/// Finds the index of the first event matching `predicate`.
pub(crate) fn find_index(events: &[HistoryEvent], predicate: impl Fn(&HistoryEvent) -> bool) -> Option<usize> {
    events.iter().position(predicate)
}
