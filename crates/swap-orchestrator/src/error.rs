//! Orchestrator-level error taxonomy (§7). Incoming-envelope failures
//! (`Schema`/`Transition`) are never propagated to the caller — the
//! orchestrators log and drop them per §7's "silently dropped for
//! incoming network messages" rule; this enum exists for errors on our
//! own outgoing actions, which §7 says must surface.

use swap_core::prepay::PrePayError;
use swap_core::transition::TransitionError;
use swap_types::SchemaError;

use crate::ln::LnRpcError;
use crate::oracle::PriceOracleError;
use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Ln(#[from] LnRpcError),
    #[error(transparent)]
    Solana(#[from] swap_solana::SolanaRpcError),
    #[error(transparent)]
    Oracle(#[from] PriceOracleError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    PrePay(#[from] PrePayError),
    #[error(transparent)]
    Store(#[from] swap_store::StoreError),
    #[error("price guard rejected the quote: {0}")]
    PriceGuard(#[from] swap_core::price_guard::PriceGuardError),
    #[error("deadline exceeded")]
    Timeout,
    #[error("canceled")]
    Canceled,
}
