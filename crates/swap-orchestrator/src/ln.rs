//! LN node RPC capability (§6). No concrete LN node client ships here
//! (§1 Explicitly out of scope) — only the trait the taker and maker
//! orchestrators consume.

use async_trait::async_trait;
use swap_types::hexbytes::{PaymentHashHex, PreimageHex};

#[derive(Debug, thiserror::Error)]
pub enum LnRpcError {
    #[error("ln rpc call failed: {0}")]
    Failed(String),
    #[error("pay() returned a preimage that was not exactly 32 bytes")]
    MalformedPreimage,
}

#[derive(Debug, Clone)]
pub struct LnInvoiceResult {
    pub bolt11: String,
    pub payment_hash: PaymentHashHex,
    pub expires_at_unix: u64,
}

#[async_trait]
pub trait LnRpc: Send + Sync {
    /// Creates a non-hold invoice for `amount_msat` (§9 Non-goals excludes
    /// hold invoices entirely).
    async fn invoice(
        &self,
        amount_msat: u64,
        label: &str,
        description: &str,
        expiry_sec: u64,
    ) -> Result<LnInvoiceResult, LnRpcError>;

    /// Pays `bolt11` and returns the revealed preimage. Implementations
    /// must return exactly 32 bytes (§6); this trait's contract leaves
    /// validation of that length to the caller via [`PreimageHex`]'s fixed
    /// size, so a non-conforming implementation fails to compile a valid
    /// `Ok` value rather than smuggling a bad length through.
    async fn pay(&self, bolt11: &str) -> Result<PreimageHex, LnRpcError>;
}
