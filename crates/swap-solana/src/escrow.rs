//! The on-chain escrow account, as read back from the Solana RPC.
//!
//! The Pre-Pay Verifier (C5, in `swap-core`) treats this readback as
//! authoritative over every envelope-carried field (§4.5 rule 5).

use serde::{Deserialize, Serialize};
use swap_types::address::Address;
use swap_types::hexbytes::PaymentHashHex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    Active,
    Claimed,
    Refunded,
}

/// An on-chain escrow account, mirroring the fields `sol_escrow_created`
/// claims so they can be cross-checked field-by-field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowState {
    pub status: EscrowStatus,
    pub payment_hash: PaymentHashHex,
    pub recipient: Address,
    pub refund: Address,
    pub refund_after: u64,
    pub mint: Address,
    /// Raw token base units (not the decimal-string wire representation
    /// used in envelope bodies).
    pub amount: u64,
    pub vault: Address,
    pub bump: u8,
}
