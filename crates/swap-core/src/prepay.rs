//! Pre-Pay Verifier (C5).
//!
//! Hard rule: a taker must never dispatch an LN payment unless this
//! verifier returns `Ok(())`. On-chain readback, fetched through a
//! capability trait, is authoritative over every envelope-carried field
//! (§4.5).

use serde::{Deserialize, Serialize};
use swap_solana::{EscrowStatus, SolanaRpc, SolanaRpcError};
use swap_types::body::{LnInvoice, SolEscrowCreated, Terms};
use swap_types::timestamp::UnixTimestamp;

#[derive(Debug, thiserror::Error)]
pub enum PrePayError {
    #[error("terms or invoice has expired")]
    Expired,
    #[error("cross_field_mismatch: {0}")]
    CrossFieldMismatch(&'static str),
    #[error("refund_after_unix leaves less than the required safety margin")]
    InsufficientRefundMargin,
    #[error("no on-chain escrow found for this payment hash")]
    EscrowNotFound,
    #[error("on_chain_mismatch: {0}")]
    OnChainMismatch(&'static str),
    #[error("on-chain escrow is not active")]
    EscrowNotActive,
    #[error(transparent)]
    Rpc(#[from] SolanaRpcError),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PrePayVerifierConfig {
    /// Minimum time, in seconds, that must remain before
    /// `terms.sol_refund_after_unix` for a payment to be allowed (Open
    /// Question #2; default 1800s / 30 minutes per DESIGN.md).
    pub min_refund_margin_secs: u64,
}

impl Default for PrePayVerifierConfig {
    fn default() -> Self {
        Self {
            min_refund_margin_secs: 1800,
        }
    }
}

/// Runs all five checks from §4.5 in order, short-circuiting on the first
/// failure. `rpc` is consulted last and its answer overrides every
/// envelope-carried field.
pub async fn verify<R: SolanaRpc>(
    terms: &Terms,
    invoice: &LnInvoice,
    escrow: &SolEscrowCreated,
    now: UnixTimestamp,
    rpc: &R,
    config: &PrePayVerifierConfig,
) -> Result<(), PrePayError> {
    if let Some(valid_until) = terms.terms_valid_until_unix {
        if valid_until <= now.as_u64() {
            return Err(PrePayError::Expired);
        }
    }
    if let Some(expires_at) = invoice.expires_at_unix {
        if expires_at <= now.as_u64() {
            return Err(PrePayError::Expired);
        }
    }

    if invoice.payment_hash_hex != escrow.payment_hash_hex {
        return Err(PrePayError::CrossFieldMismatch("payment_hash_hex"));
    }

    if escrow.mint != terms.sol_mint {
        return Err(PrePayError::CrossFieldMismatch("mint"));
    }
    if escrow.amount != terms.usdt_amount {
        return Err(PrePayError::CrossFieldMismatch("amount"));
    }
    if escrow.recipient != terms.sol_recipient {
        return Err(PrePayError::CrossFieldMismatch("recipient"));
    }
    if escrow.refund != terms.sol_refund {
        return Err(PrePayError::CrossFieldMismatch("refund"));
    }
    if escrow.refund_after_unix != terms.sol_refund_after_unix {
        return Err(PrePayError::CrossFieldMismatch("refund_after_unix"));
    }

    let margin = terms
        .sol_refund_after_unix
        .saturating_sub(now.as_u64());
    if margin <= config.min_refund_margin_secs {
        return Err(PrePayError::InsufficientRefundMargin);
    }

    let on_chain = rpc
        .get_escrow_state(escrow.payment_hash_hex)
        .await?
        .ok_or(PrePayError::EscrowNotFound)?;

    if on_chain.status != EscrowStatus::Active {
        return Err(PrePayError::EscrowNotActive);
    }
    if on_chain.payment_hash != escrow.payment_hash_hex {
        return Err(PrePayError::OnChainMismatch("payment_hash"));
    }
    if on_chain.recipient != terms.sol_recipient {
        return Err(PrePayError::OnChainMismatch("recipient"));
    }
    if on_chain.refund != terms.sol_refund {
        return Err(PrePayError::OnChainMismatch("refund"));
    }
    if on_chain.mint != terms.sol_mint {
        return Err(PrePayError::OnChainMismatch("mint"));
    }
    if on_chain.refund_after != terms.sol_refund_after_unix {
        return Err(PrePayError::OnChainMismatch("refund_after"));
    }
    let terms_amount: u64 = terms
        .usdt_amount
        .parse()
        .map_err(|_| PrePayError::OnChainMismatch("amount"))?;
    if on_chain.amount != terms_amount {
        return Err(PrePayError::OnChainMismatch("amount"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use swap_solana::escrow::EscrowState;
    use swap_solana::rpc::CreateEscrowResult;
    use swap_types::address::Address;
    use swap_types::hexbytes::{HexBytes, PaymentHashHex, PreimageHex};

    fn addr() -> Address {
        "11111111111111111111111111111111".parse().unwrap()
    }

    fn terms() -> Terms {
        Terms {
            btc_sats: 50_000,
            usdt_amount: "100000000".to_string(),
            usdt_decimals: 6,
            sol_mint: addr(),
            sol_recipient: addr(),
            sol_refund: addr(),
            sol_refund_after_unix: 1_000_000,
            ln_receiver_peer: swap_types::hexbytes::HexBytes([1u8; 32]),
            ln_payer_peer: swap_types::hexbytes::HexBytes([2u8; 32]),
            terms_valid_until_unix: None,
        }
    }

    fn invoice(payment_hash: PaymentHashHex) -> LnInvoice {
        LnInvoice {
            bolt11: "lnbc1".to_string(),
            payment_hash_hex: payment_hash,
            amount_msat: None,
            expires_at_unix: None,
        }
    }

    fn escrow(t: &Terms, payment_hash: PaymentHashHex) -> SolEscrowCreated {
        SolEscrowCreated {
            payment_hash_hex: payment_hash,
            program_id: addr(),
            escrow_pda: addr(),
            vault_ata: addr(),
            mint: t.sol_mint,
            amount: t.usdt_amount.clone(),
            refund_after_unix: t.sol_refund_after_unix,
            recipient: t.sol_recipient,
            refund: t.sol_refund,
            tx_sig: "sig".to_string(),
        }
    }

    struct FakeRpc {
        state: Option<EscrowState>,
    }

    #[async_trait]
    impl SolanaRpc for FakeRpc {
        async fn build_and_submit_create_escrow(
            &self,
            _payer: Address,
            _payer_token_account: Address,
            _mint: Address,
            _payment_hash: PaymentHashHex,
            _recipient: Address,
            _refund: Address,
            _refund_after_unix: u64,
            _amount: u64,
        ) -> Result<CreateEscrowResult, SolanaRpcError> {
            unimplemented!("not exercised by pre-pay verifier tests")
        }

        async fn build_and_submit_claim_escrow(
            &self,
            _recipient: Address,
            _recipient_token_account: Address,
            _mint: Address,
            _payment_hash: PaymentHashHex,
            _preimage: PreimageHex,
        ) -> Result<String, SolanaRpcError> {
            unimplemented!("not exercised by pre-pay verifier tests")
        }

        async fn get_escrow_state(&self, _payment_hash: PaymentHashHex) -> Result<Option<EscrowState>, SolanaRpcError> {
            Ok(self.state.clone())
        }

        async fn ensure_associated_token_account(&self, _owner: Address, _mint: Address) -> Result<Address, SolanaRpcError> {
            unimplemented!("not exercised by pre-pay verifier tests")
        }
    }

    #[tokio::test]
    async fn passes_when_everything_lines_up() {
        let t = terms();
        let payment_hash = HexBytes([9u8; 32]);
        let inv = invoice(payment_hash);
        let esc = escrow(&t, payment_hash);
        let rpc = FakeRpc {
            state: Some(EscrowState {
                status: EscrowStatus::Active,
                payment_hash,
                recipient: t.sol_recipient,
                refund: t.sol_refund,
                refund_after: t.sol_refund_after_unix,
                mint: t.sol_mint,
                amount: 100_000_000,
                vault: addr(),
                bump: 255,
            }),
        };
        let result = verify(&t, &inv, &esc, UnixTimestamp::from(0), &rpc, &PrePayVerifierConfig::default()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn amount_mismatch_is_rejected_before_touching_chain() {
        let t = terms();
        let payment_hash = HexBytes([9u8; 32]);
        let inv = invoice(payment_hash);
        let mut esc = escrow(&t, payment_hash);
        esc.amount = "99999999".to_string();
        let rpc = FakeRpc { state: None };
        let err = verify(&t, &inv, &esc, UnixTimestamp::from(0), &rpc, &PrePayVerifierConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PrePayError::CrossFieldMismatch("amount")));
    }

    #[tokio::test]
    async fn escrow_absent_on_chain_is_rejected() {
        let t = terms();
        let payment_hash = HexBytes([9u8; 32]);
        let inv = invoice(payment_hash);
        let esc = escrow(&t, payment_hash);
        let rpc = FakeRpc { state: None };
        let err = verify(&t, &inv, &esc, UnixTimestamp::from(0), &rpc, &PrePayVerifierConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PrePayError::EscrowNotFound));
    }

    #[tokio::test]
    async fn on_chain_amount_mismatch_is_rejected() {
        let t = terms();
        let payment_hash = HexBytes([9u8; 32]);
        let inv = invoice(payment_hash);
        let esc = escrow(&t, payment_hash);
        let rpc = FakeRpc {
            state: Some(EscrowState {
                status: EscrowStatus::Active,
                payment_hash,
                recipient: t.sol_recipient,
                refund: t.sol_refund,
                refund_after: t.sol_refund_after_unix,
                mint: t.sol_mint,
                amount: 1,
                vault: addr(),
                bump: 255,
            }),
        };
        let err = verify(&t, &inv, &esc, UnixTimestamp::from(0), &rpc, &PrePayVerifierConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PrePayError::OnChainMismatch("amount")));
    }

    #[tokio::test]
    async fn insufficient_refund_margin_is_rejected() {
        let mut t = terms();
        t.sol_refund_after_unix = 1_000;
        let payment_hash = HexBytes([9u8; 32]);
        let inv = invoice(payment_hash);
        let esc = escrow(&t, payment_hash);
        let rpc = FakeRpc { state: None };
        let err = verify(&t, &inv, &esc, UnixTimestamp::from(900), &rpc, &PrePayVerifierConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PrePayError::InsufficientRefundMargin));
    }
}
