//! Component G: the background task manager driving `ledger-core`'s
//! ingestion pipeline (spec.md section 4.G).
//!
//! Split out from `ledger-core` because it owns runtime-shaped state
//! (cancellation tokens, a broadcast channel, spawned loops) that the pure
//! decoding/storage logic has no business depending on — the same
//! reasoning the teacher uses to keep `cory-core` transport-agnostic and
//! push scheduling/transport concerns into the binary crate.

pub mod jobs;
pub mod manager;
pub mod notify;

pub use jobs::Scheduler;
pub use manager::{Account, TaskError, TaskManager};
pub use notify::{Notification, NotificationHub, TransactionStatus};
