//! The local per-trade record (§3) tracked by each party's Receipt Store
//! (C6) and advanced by the Trade State Machine (C4).
//!
//! [`TradeState`] is the same enumeration the wire-level `swap.status` body
//! reports ([`crate::body::TradeStateTag`]) — there is exactly one notion of
//! "what state is this trade in", re-exported here under the name the state
//! machine and store crates use.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::body::{LnInvoice, SolEscrowCreated, Terms};
use crate::hexbytes::{PaymentHashHex, PreimageHex, PublicKeyHex};
use crate::kind::EnvelopeKind;
use crate::timestamp::UnixTimestamp;

/// Re-exported so callers outside `body` don't need to know the wire body
/// and the local state field happen to share a representation.
pub use crate::body::TradeStateTag as TradeState;

/// Which side of the swap this process is playing for a given trade.
///
/// The maker receives BTC over Lightning and pays out USDT on Solana; the
/// taker pays BTC over Lightning and receives USDT on Solana (§1). This is
/// purely local bookkeeping for the orchestrators — it plays no part in
/// C4's signer authorization, which is derived from `terms` (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Maker,
    Taker,
}

impl Role {
    pub fn counterparty(self) -> Role {
        match self {
            Role::Maker => Role::Taker,
            Role::Taker => Role::Maker,
        }
    }
}

/// `{kind, ts, signer}` of the last envelope applied to this trade (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastEnvelope {
    pub kind: EnvelopeKind,
    pub ts: UnixTimestamp,
    pub signer: PublicKeyHex,
}

/// The full negotiated and observed state of one swap, as tracked locally.
///
/// Only fields that are known at a given [`TradeState`] are populated; the
/// state machine (C4) is responsible for ensuring fields aren't read before
/// the state in which they're guaranteed to be set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub trade_id: String,
    pub role: Role,
    pub state: TradeState,

    pub rfq_id: Option<String>,
    pub quote_id: Option<String>,

    pub terms: Option<Terms>,
    pub terms_hash: Option<String>,

    pub invoice: Option<LnInvoice>,
    pub payment_hash: Option<PaymentHashHex>,
    pub preimage: Option<PreimageHex>,

    pub escrow: Option<SolEscrowCreated>,

    pub claim_tx_sig: Option<String>,
    pub refund_tx_sig: Option<String>,

    pub last: Option<LastEnvelope>,
    pub accepted_at: Option<UnixTimestamp>,
    pub canceled_reason: Option<String>,

    pub created_at: UnixTimestamp,
    pub updated_at: UnixTimestamp,
}

impl Trade {
    /// Starts a new trade record in [`TradeState::Init`]. Signer identities
    /// aren't known yet — they're captured from `terms` once TERMS is
    /// applied (§4.4).
    pub fn new(trade_id: impl Into<String>, role: Role) -> Self {
        let now = UnixTimestamp::now_ms();
        Self {
            trade_id: trade_id.into(),
            role,
            state: TradeState::Init,
            rfq_id: None,
            quote_id: None,
            terms: None,
            terms_hash: None,
            invoice: None,
            payment_hash: None,
            preimage: None,
            escrow: None,
            claim_tx_sig: None,
            refund_tx_sig: None,
            last: None,
            accepted_at: None,
            canceled_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The identity authorized to sign as the LN receiver (maker role):
    /// `terms.ln_receiver_peer`, once terms is known.
    pub fn ln_receiver_peer(&self) -> Option<PublicKeyHex> {
        self.terms.as_ref().map(|t| t.ln_receiver_peer)
    }

    /// The identity authorized to sign as the LN payer (taker role):
    /// `terms.ln_payer_peer`, once terms is known.
    pub fn ln_payer_peer(&self) -> Option<PublicKeyHex> {
        self.terms.as_ref().map(|t| t.ln_payer_peer)
    }

    pub fn sol_recipient(&self) -> Option<Address> {
        self.terms.as_ref().map(|t| t.sol_recipient)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            TradeState::Claimed | TradeState::Refunded | TradeState::Canceled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_trade_has_no_known_signers() {
        let trade = Trade::new("t1", Role::Maker);
        assert_eq!(trade.ln_receiver_peer(), None);
        assert_eq!(trade.ln_payer_peer(), None);
    }

    #[test]
    fn fresh_trade_is_not_terminal() {
        let trade = Trade::new("t1", Role::Taker);
        assert!(!trade.is_terminal());
    }

    #[test]
    fn counterparty_is_involutive() {
        assert_eq!(Role::Maker.counterparty().counterparty(), Role::Maker);
    }
}
