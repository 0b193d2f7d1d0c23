//! Narrow Solana escrow RPC capability trait and on-chain state types.
//!
//! This crate defines the interface the swap core consumes (§6); it ships
//! no concrete RPC client. Wiring a real `solana-client`-backed
//! implementation is explicitly out of scope (spec.md §1's external
//! collaborators) — that is the job of a deployment, not this crate.
//!
//! # Modules
//!
//! - [`escrow`] - on-chain escrow account state and status
//! - [`rpc`] - the [`rpc::SolanaRpc`] capability trait and its error type

pub mod escrow;
pub mod rpc;

pub use escrow::{EscrowState, EscrowStatus};
pub use rpc::{SolanaRpc, SolanaRpcError};
