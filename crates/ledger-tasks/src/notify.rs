//! Websocket notification channel (spec.md section 6, "Websocket
//! notification channel" subsection). The scheduler publishes typed
//! messages here; `ledger-server`'s `GET /ws` handler relays whatever this
//! hub broadcasts to connected clients as JSON frames.

use ledger_core::Chain;
use serde::Serialize;
use tokio::sync::broadcast;

/// Default buffer depth for the underlying broadcast channel. A slow or
/// absent subscriber drops the oldest messages rather than blocking
/// publishers; the scheduler never waits on a websocket client.
const CHANNEL_CAPACITY: usize = 256;

/// `status` values for a `transaction_status` message (spec.md section
/// 4.G, Observability subsection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    QueryingTransactionsStarted,
    QueryingTransactionsFinished,
    DecodingTransactionsStarted,
    DecodingTransactionsFinished,
}

/// One JSON frame on the notification channel: `{type, data}` (spec.md
/// section 6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum Notification {
    #[serde(rename = "transaction_status")]
    TransactionStatus {
        addresses: Vec<String>,
        chain: Chain,
        subtype: String,
        status: TransactionStatus,
    },
    #[serde(rename = "missing_api_key")]
    MissingApiKey { service: String },
    #[serde(rename = "progress")]
    Progress {
        task_id: String,
        step: u32,
        total_steps: u32,
    },
}

/// Broadcast hub every scheduler job publishes to. Cheap to clone (an
/// `Arc`-backed sender internally) so every job task can hold its own
/// handle.
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe for a stream of future notifications. Messages published
    /// before this call are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Publish a notification. A message with no subscribers is simply
    /// dropped — the scheduler does not treat that as an error.
    pub fn publish(&self, notification: Notification) {
        let _ = self.sender.send(notification);
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}
