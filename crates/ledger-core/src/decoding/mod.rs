//! Components E & F: the decoder registry and the event normalizers
//! (spec.md sections 4.E and 4.F).
//!
//! `registry` is the chain-agnostic seam protocol decoders plug into;
//! `btc_normalizer`/`evm_normalizer` are the two per-family algorithms that
//! turn one `RawTransaction` into `[HistoryEvent]`; `protocols` holds the
//! concrete decoders shipped with this crate.

pub mod btc_normalizer;
pub mod evm_normalizer;
pub mod protocols;
pub mod registry;

pub use registry::{DecoderRegistry, DecodingContext, DecodingOutput, SCHEMA_VERSION};
