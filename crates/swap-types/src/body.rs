//! Per-kind envelope body contracts (§4.3).
//!
//! Each body type derives `deny_unknown_fields` so that unexpected top-level
//! fields are rejected, matching §6's "conservative parsing" requirement.
//! Decimal amount fields stay `String` on the wire (cross-field checks in
//! §4.4 require byte-for-byte comparison) but are range/format-checked by
//! [`validate_decimal_str`].

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::hexbytes::{PaymentHashHex, PreimageHex, PublicKeyHex};

/// The only supported trading pair/direction in this core (§4.3).
pub const PAIR: &str = "BTC_LN/USDT_SOL";
pub const DIRECTION: &str = "BTC_LN->USDT_SOL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Rfq {
    pub pair: String,
    pub direction: String,
    pub btc_sats: u64,
    pub usdt_amount: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub valid_until_unix: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sol_recipient: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Quote {
    pub rfq_id: String,
    pub btc_sats: u64,
    pub usdt_amount: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub valid_until_unix: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct QuoteAccept {
    pub rfq_id: String,
    pub quote_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SwapInvite {
    pub rfq_id: String,
    pub quote_id: String,
    pub swap_channel: String,
    pub owner_pubkey: String,
    pub invite: serde_json::Value,
    pub welcome: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Terms {
    pub btc_sats: u64,
    pub usdt_amount: String,
    pub usdt_decimals: u8,
    pub sol_mint: Address,
    pub sol_recipient: Address,
    pub sol_refund: Address,
    pub sol_refund_after_unix: u64,
    pub ln_receiver_peer: PublicKeyHex,
    pub ln_payer_peer: PublicKeyHex,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub terms_valid_until_unix: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Accept {
    pub terms_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LnInvoice {
    pub bolt11: String,
    pub payment_hash_hex: PaymentHashHex,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub amount_msat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expires_at_unix: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SolEscrowCreated {
    pub payment_hash_hex: PaymentHashHex,
    pub program_id: Address,
    pub escrow_pda: Address,
    pub vault_ata: Address,
    pub mint: Address,
    pub amount: String,
    pub refund_after_unix: u64,
    pub recipient: Address,
    pub refund: Address,
    pub tx_sig: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LnPaid {
    pub payment_hash_hex: PaymentHashHex,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub preimage_hex: Option<PreimageHex>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SolClaimed {
    pub payment_hash_hex: PaymentHashHex,
    pub escrow_pda: Address,
    pub tx_sig: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SolRefunded {
    pub payment_hash_hex: PaymentHashHex,
    pub escrow_pda: Address,
    pub tx_sig: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Cancel {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradeStateTag {
    Init,
    Terms,
    Accepted,
    Invoice,
    Escrow,
    LnPaid,
    Claimed,
    Refunded,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Status {
    pub state: TradeStateTag,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub note: Option<String>,
}

/// Validates a decimal-string amount field (`usdt_amount`, `amount`):
/// non-negative, parseable, and within a sane range. The wire value stays a
/// plain `String` so later byte-for-byte comparisons (§4.4) are unaffected.
pub fn validate_decimal_str(s: &str) -> Result<(), DecimalFormatError> {
    use rust_decimal::Decimal;
    use std::str::FromStr;

    if s.is_empty() {
        return Err(DecimalFormatError::Empty);
    }
    let parsed = Decimal::from_str(s).map_err(|_| DecimalFormatError::NotANumber)?;
    if parsed.is_sign_negative() {
        return Err(DecimalFormatError::Negative);
    }
    Ok(())
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecimalFormatError {
    #[error("amount string is empty")]
    Empty,
    #[error("amount is not a valid decimal number")]
    NotANumber,
    #[error("amount must not be negative")]
    Negative,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_validation_rejects_negative() {
        assert_eq!(
            validate_decimal_str("-1"),
            Err(DecimalFormatError::Negative)
        );
    }

    #[test]
    fn decimal_validation_accepts_zero_and_integers() {
        assert!(validate_decimal_str("0").is_ok());
        assert!(validate_decimal_str("100000000").is_ok());
    }

    #[test]
    fn terms_rejects_unknown_fields() {
        let json = serde_json::json!({
            "btc_sats": 1,
            "usdt_amount": "1",
            "usdt_decimals": 6,
            "sol_mint": "11111111111111111111111111111111",
            "sol_recipient": "11111111111111111111111111111111",
            "sol_refund": "11111111111111111111111111111111",
            "sol_refund_after_unix": 1,
            "ln_receiver_peer": "aa".repeat(32),
            "ln_payer_peer": "bb".repeat(32),
            "extra_field_not_allowed": true
        });
        let result: Result<Terms, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }
}
