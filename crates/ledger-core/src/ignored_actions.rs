//! Ignored-actions bookkeeping (spec.md section 3's `IgnoredActions` type
//! and section 6's `ignore_actions`/`unignore_actions` inbound operations).
//!
//! Same shape as [`crate::ranges::RangeStore`]: a plain in-memory table
//! behind a `tokio::sync::RwLock`, keyed on the `(action_type, external_id)`
//! pair that `types::IgnoredActionSet` already models.

use tokio::sync::RwLock;

use crate::types::IgnoredActionKey;

/// Guards a [`crate::types::IgnoredActionSet`] with the async-safe
/// read/write API the rest of the core's inbound operations expect.
#[derive(Default)]
pub struct IgnoredActionsManager {
    inner: RwLock<crate::types::IgnoredActionSet>,
}

impl IgnoredActionsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ignore_actions({action_type, ids})`: adds every `(action_type, id)`
    /// pair to the set. Idempotent — re-ignoring an already-ignored action
    /// is a no-op.
    pub async fn ignore(&self, action_type: &str, external_ids: &[String]) {
        let mut guard = self.inner.write().await;
        for id in external_ids {
            guard
                .entries
                .insert((action_type.to_string(), id.clone()), ());
        }
    }

    /// `unignore_actions(…)`: removes every `(action_type, id)` pair from
    /// the set. Unignoring an action that was never ignored is a no-op.
    pub async fn unignore(&self, action_type: &str, external_ids: &[String]) {
        let mut guard = self.inner.write().await;
        for id in external_ids {
            guard.entries.remove(&(action_type.to_string(), id.clone()));
        }
    }

    pub async fn is_ignored(&self, key: &IgnoredActionKey) -> bool {
        self.inner.read().await.contains(key)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ignore_then_unignore_round_trips() {
        let manager = IgnoredActionsManager::new();
        let key = IgnoredActionKey {
            action_type: "history_event".to_string(),
            external_id: "tx1-0".to_string(),
        };
        assert!(!manager.is_ignored(&key).await);

        manager
            .ignore("history_event", &["tx1-0".to_string()])
            .await;
        assert!(manager.is_ignored(&key).await);
        assert_eq!(manager.len().await, 1);

        manager
            .unignore("history_event", &["tx1-0".to_string()])
            .await;
        assert!(!manager.is_ignored(&key).await);
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn re_ignoring_is_idempotent() {
        let manager = IgnoredActionsManager::new();
        manager.ignore("history_event", &["a".to_string()]).await;
        manager.ignore("history_event", &["a".to_string()]).await;
        assert_eq!(manager.len().await, 1);
    }
}
