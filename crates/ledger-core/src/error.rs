//! Error taxonomy for ledger-core.
//!
//! Layered the way the teacher's `error.rs` layers `RpcError` into
//! `CoreError`: a handful of concern-specific `thiserror` enums, wrapped by
//! one crate-root enum via `#[from]`/`#[error(transparent)]`.

// ==============================================================================
// Adapter / coordinator errors
// ==============================================================================

/// Errors surfaced by a single chain adapter (spec.md section 4.B).
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("operation unsupported by this adapter: {0}")]
    Unsupported(String),
}

/// Raised by the multi-source coordinator (spec.md section 4.C) when every
/// adapter in priority order has failed. Always carries every provider's
/// reason, grounded on
/// `original_source/rotkehlchen/chain/bitcoin/manager.py::_query`, which
/// joins per-provider error strings into one combined message.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("all providers failed: {}", .0.iter().map(|(p, r)| format!("{p}: {r}")).collect::<Vec<_>>().join("; "))]
pub struct RemoteError(pub Vec<(String, String)>);

impl RemoteError {
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(p, _)| p.as_str())
    }
}

// ==============================================================================
// Decoder errors
// ==============================================================================

/// A decoder function failed. Never aborts the whole transaction (spec.md
/// section 4.E/4.F failure semantics) — the offending log is left as its
/// preliminary generic event and this error is only logged/surfaced as a
/// warning.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("decoder {decoder} failed on tx {tx_id}: {message}")]
pub struct DecoderError {
    pub decoder: String,
    pub tx_id: String,
    pub message: String,
}

// ==============================================================================
// User input / database / cancellation
// ==============================================================================

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum UserInputError {
    #[error("invalid address `{address}` for chain {chain}")]
    InvalidAddress { address: String, chain: String },

    #[error("unknown chain: {0}")]
    UnknownChain(String),

    #[error("address not tracked: {0}")]
    AddressNotTracked(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("store write failed: {0}")]
    Write(String),

    #[error("store read failed: {0}")]
    Read(String),
}

/// A task was asked to stop. Propagation policy (spec.md section 7) treats
/// this like success-with-no-new-data, never as a hard failure.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("task cancelled")]
pub struct Cancelled;

// ==============================================================================
// Crate-root error
// ==============================================================================

/// Top-level error type for ledger-core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    UserInput(#[from] UserInputError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error(transparent)]
    Decoder(#[from] DecoderError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<AdapterError> for CoreError {
    fn from(err: AdapterError) -> Self {
        CoreError::Remote(RemoteError(vec![("adapter".to_string(), err.to_string())]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_message_lists_every_provider() {
        let err = RemoteError(vec![
            ("blockchain.info".to_string(), "timeout".to_string()),
            ("blockstream".to_string(), "429".to_string()),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("blockchain.info: timeout"));
        assert!(msg.contains("blockstream: 429"));
    }

    #[test]
    fn remote_error_providers_iterator_yields_names_in_order() {
        let err = RemoteError(vec![
            ("a".to_string(), "x".to_string()),
            ("b".to_string(), "y".to_string()),
        ]);
        let names: Vec<&str> = err.providers().collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
