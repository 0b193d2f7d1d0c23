//! Envelope kind tag (§4.3). Modeled as an exhaustive enum so that adding a
//! new kind without updating the schema validator or state machine is a
//! compile error, not a runtime surprise (§9 Design Notes).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    #[serde(rename = "swap.rfq")]
    Rfq,
    #[serde(rename = "swap.quote")]
    Quote,
    #[serde(rename = "swap.quote_accept")]
    QuoteAccept,
    #[serde(rename = "swap.swap_invite")]
    SwapInvite,
    #[serde(rename = "swap.terms")]
    Terms,
    #[serde(rename = "swap.accept")]
    Accept,
    #[serde(rename = "swap.ln_invoice")]
    LnInvoice,
    #[serde(rename = "swap.sol_escrow_created")]
    SolEscrowCreated,
    #[serde(rename = "swap.ln_paid")]
    LnPaid,
    #[serde(rename = "swap.sol_claimed")]
    SolClaimed,
    #[serde(rename = "swap.sol_refunded")]
    SolRefunded,
    #[serde(rename = "swap.cancel")]
    Cancel,
    #[serde(rename = "swap.status")]
    Status,
}

impl EnvelopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeKind::Rfq => "swap.rfq",
            EnvelopeKind::Quote => "swap.quote",
            EnvelopeKind::QuoteAccept => "swap.quote_accept",
            EnvelopeKind::SwapInvite => "swap.swap_invite",
            EnvelopeKind::Terms => "swap.terms",
            EnvelopeKind::Accept => "swap.accept",
            EnvelopeKind::LnInvoice => "swap.ln_invoice",
            EnvelopeKind::SolEscrowCreated => "swap.sol_escrow_created",
            EnvelopeKind::LnPaid => "swap.ln_paid",
            EnvelopeKind::SolClaimed => "swap.sol_claimed",
            EnvelopeKind::SolRefunded => "swap.sol_refunded",
            EnvelopeKind::Cancel => "swap.cancel",
            EnvelopeKind::Status => "swap.status",
        }
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_dotted_string() {
        let json = serde_json::to_string(&EnvelopeKind::Terms).unwrap();
        assert_eq!(json, "\"swap.terms\"");
    }

    #[test]
    fn rejects_unknown_kind() {
        let result: Result<EnvelopeKind, _> = serde_json::from_str("\"swap.unknown\"");
        assert!(result.is_err());
    }
}
