//! Core types for the BTC-LN/USDT-SOL atomic swap protocol.
//!
//! This crate provides the wire format, cryptographic envelope, and local
//! trade record shared by every other crate in the workspace. It has no
//! knowledge of transport, storage, or chain RPC — those are layered on top
//! by `swap-core`, `swap-store`, `swap-solana`, and `swap-orchestrator`.
//!
//! # Modules
//!
//! - [`address`] - Base58 Solana address newtype
//! - [`body`] - Per-kind envelope body contracts and decimal-string validation
//! - [`codec`] - Canonical JSON encoding used for both signing and content hashes
//! - [`envelope`] - The signed, versioned [`envelope::Envelope`] and its builder
//! - [`hexbytes`] - Fixed-length hex-encoded byte arrays (keys, signatures, hashes)
//! - [`kind`] - The exhaustive envelope kind tag
//! - [`schema`] - Envelope shape and per-kind body validation, run before any state change
//! - [`signer`] - The externalized [`signer::Signer`] capability and Ed25519 verification
//! - [`timestamp`] - Unix timestamp newtype
//! - [`trade`] - The local per-trade record and role model

pub mod address;
pub mod body;
pub mod codec;
pub mod envelope;
pub mod hexbytes;
pub mod kind;
pub mod schema;
pub mod signer;
pub mod timestamp;
pub mod trade;

pub use address::Address;
pub use envelope::{Envelope, UnsignedEnvelope, PROTOCOL_VERSION};
pub use kind::EnvelopeKind;
pub use schema::SchemaError;
pub use signer::{Ed25519Signer, Signed, Signer, VerifyError};
pub use timestamp::UnixTimestamp;
pub use trade::{Role, Trade, TradeState};
