//! The Solana escrow RPC capability (§6). A caller-provided implementation
//! wraps a real `solana-client`; `swap-core` and `swap-orchestrator` depend
//! only on this trait, never on a concrete client (§9 "Global state ...
//! injected via capabilities").

use async_trait::async_trait;
use swap_types::address::Address;
use swap_types::hexbytes::{HexBytesError, PaymentHashHex, PreimageHex};

use crate::escrow::EscrowState;

#[derive(Debug, thiserror::Error)]
pub enum SolanaRpcError {
    #[error("solana RPC transport error: {0}")]
    Transport(String),
    #[error("transaction simulation or submission failed: {0}")]
    TransactionFailed(String),
    #[error("malformed on-chain account data: {0}")]
    MalformedAccount(String),
    #[error(transparent)]
    Hex(#[from] HexBytesError),
}

/// The outcome of submitting a create-escrow transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateEscrowResult {
    pub tx_sig: String,
    pub escrow_pda: Address,
    pub vault_ata: Address,
}

/// The four on-chain operations the core needs (§6). No other Solana
/// surface is consumed.
#[async_trait]
pub trait SolanaRpc: Send + Sync {
    /// Locks `amount` of `mint` into a fresh escrow account bound to
    /// `payment_hash`, refundable to `refund` after `refund_after_unix`,
    /// claimable by `recipient` given the matching preimage.
    #[allow(clippy::too_many_arguments)]
    async fn build_and_submit_create_escrow(
        &self,
        payer: Address,
        payer_token_account: Address,
        mint: Address,
        payment_hash: PaymentHashHex,
        recipient: Address,
        refund: Address,
        refund_after_unix: u64,
        amount: u64,
    ) -> Result<CreateEscrowResult, SolanaRpcError>;

    /// Claims the escrow for `payment_hash` by revealing `preimage`.
    async fn build_and_submit_claim_escrow(
        &self,
        recipient: Address,
        recipient_token_account: Address,
        mint: Address,
        payment_hash: PaymentHashHex,
        preimage: PreimageHex,
    ) -> Result<String, SolanaRpcError>;

    /// Reads back the current on-chain escrow state for `payment_hash`, if
    /// any escrow has ever been created for it. `None` means no escrow
    /// account exists at the derived PDA.
    async fn get_escrow_state(
        &self,
        payment_hash: PaymentHashHex,
    ) -> Result<Option<EscrowState>, SolanaRpcError>;

    /// Derives (and, if absent, creates) the associated token account for
    /// `owner`/`mint`.
    async fn ensure_associated_token_account(
        &self,
        owner: Address,
        mint: Address,
    ) -> Result<Address, SolanaRpcError>;
}
