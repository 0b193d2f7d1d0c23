//! Envelope Schema Validator (C3).
//!
//! Runs before any state mutation (§4.4). Checks the envelope shape, then
//! deserializes `body` into the kind-specific struct (§4.3), then applies
//! the value-range/content constraints spec.md lists for that kind.

use crate::body::{self, *};
use crate::envelope::Envelope;
use crate::kind::EnvelopeKind;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("unsupported protocol version (expected 1)")]
    UnsupportedVersion,
    #[error("trade_id must be non-empty")]
    EmptyTradeId,
    #[error("nonce must be non-empty")]
    EmptyNonce,
    #[error("body does not match the shape required for kind {0}")]
    MalformedBody(EnvelopeKind),
    #[error("{field} must be a positive integer")]
    NotPositive { field: &'static str },
    #[error("{0}")]
    Decimal(#[from] body::DecimalFormatError),
    #[error("unexpected pair, expected {}", body::PAIR)]
    WrongPair,
    #[error("unexpected direction, expected {}", body::DIRECTION)]
    WrongDirection,
}

/// Validates envelope shape and per-kind body contracts (C3). Never panics
/// or propagates exceptions on untrusted input — every failure is a typed
/// [`SchemaError`].
pub fn validate(envelope: &Envelope) -> Result<(), SchemaError> {
    validate_shape(envelope)?;
    validate_body(envelope)
}

fn validate_shape(envelope: &Envelope) -> Result<(), SchemaError> {
    if envelope.v != crate::envelope::PROTOCOL_VERSION {
        return Err(SchemaError::UnsupportedVersion);
    }
    if envelope.trade_id.is_empty() {
        return Err(SchemaError::EmptyTradeId);
    }
    if envelope.nonce.is_empty() {
        return Err(SchemaError::EmptyNonce);
    }
    Ok(())
}

fn validate_body(envelope: &Envelope) -> Result<(), SchemaError> {
    let body = envelope.body.clone();
    match envelope.kind {
        EnvelopeKind::Rfq => {
            let rfq: Rfq = serde_json::from_value(body)
                .map_err(|_| SchemaError::MalformedBody(envelope.kind))?;
            if rfq.pair != body::PAIR {
                return Err(SchemaError::WrongPair);
            }
            if rfq.direction != body::DIRECTION {
                return Err(SchemaError::WrongDirection);
            }
            if rfq.btc_sats == 0 {
                return Err(SchemaError::NotPositive { field: "btc_sats" });
            }
            validate_decimal_str(&rfq.usdt_amount)?;
        }
        EnvelopeKind::Quote => {
            let quote: Quote = serde_json::from_value(body)
                .map_err(|_| SchemaError::MalformedBody(envelope.kind))?;
            if quote.btc_sats == 0 {
                return Err(SchemaError::NotPositive { field: "btc_sats" });
            }
            validate_decimal_str(&quote.usdt_amount)?;
        }
        EnvelopeKind::QuoteAccept => {
            let _: QuoteAccept = serde_json::from_value(body)
                .map_err(|_| SchemaError::MalformedBody(envelope.kind))?;
        }
        EnvelopeKind::SwapInvite => {
            let _: SwapInvite = serde_json::from_value(body)
                .map_err(|_| SchemaError::MalformedBody(envelope.kind))?;
        }
        EnvelopeKind::Terms => {
            let terms: Terms = serde_json::from_value(body)
                .map_err(|_| SchemaError::MalformedBody(envelope.kind))?;
            if terms.btc_sats == 0 {
                return Err(SchemaError::NotPositive { field: "btc_sats" });
            }
            if terms.sol_refund_after_unix == 0 {
                return Err(SchemaError::NotPositive {
                    field: "sol_refund_after_unix",
                });
            }
            validate_decimal_str(&terms.usdt_amount)?;
        }
        EnvelopeKind::Accept => {
            let _: Accept = serde_json::from_value(body)
                .map_err(|_| SchemaError::MalformedBody(envelope.kind))?;
        }
        EnvelopeKind::LnInvoice => {
            let invoice: LnInvoice = serde_json::from_value(body)
                .map_err(|_| SchemaError::MalformedBody(envelope.kind))?;
            if invoice.bolt11.is_empty() {
                return Err(SchemaError::MalformedBody(envelope.kind));
            }
        }
        EnvelopeKind::SolEscrowCreated => {
            let escrow: SolEscrowCreated = serde_json::from_value(body)
                .map_err(|_| SchemaError::MalformedBody(envelope.kind))?;
            validate_decimal_str(&escrow.amount)?;
            if escrow.refund_after_unix == 0 {
                return Err(SchemaError::NotPositive {
                    field: "refund_after_unix",
                });
            }
        }
        EnvelopeKind::LnPaid => {
            let _: LnPaid = serde_json::from_value(body)
                .map_err(|_| SchemaError::MalformedBody(envelope.kind))?;
        }
        EnvelopeKind::SolClaimed => {
            let _: SolClaimed = serde_json::from_value(body)
                .map_err(|_| SchemaError::MalformedBody(envelope.kind))?;
        }
        EnvelopeKind::SolRefunded => {
            let _: SolRefunded = serde_json::from_value(body)
                .map_err(|_| SchemaError::MalformedBody(envelope.kind))?;
        }
        EnvelopeKind::Cancel => {
            let _: Cancel = serde_json::from_value(body)
                .map_err(|_| SchemaError::MalformedBody(envelope.kind))?;
        }
        EnvelopeKind::Status => {
            let _: Status = serde_json::from_value(body)
                .map_err(|_| SchemaError::MalformedBody(envelope.kind))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::UnsignedEnvelope;
    use crate::signer::Ed25519Signer;
    use serde_json::json;

    fn signed(kind: EnvelopeKind, body: serde_json::Value) -> Envelope {
        let signer = Ed25519Signer::generate();
        UnsignedEnvelope::new(kind, "trade-1", "nonce-1", body)
            .sign(&signer)
            .unwrap()
    }

    #[test]
    fn valid_rfq_passes() {
        let envelope = signed(
            EnvelopeKind::Rfq,
            json!({
                "pair": PAIR,
                "direction": DIRECTION,
                "btc_sats": 50000,
                "usdt_amount": "100000000",
            }),
        );
        assert!(validate(&envelope).is_ok());
    }

    #[test]
    fn rfq_rejects_zero_sats() {
        let envelope = signed(
            EnvelopeKind::Rfq,
            json!({
                "pair": PAIR,
                "direction": DIRECTION,
                "btc_sats": 0,
                "usdt_amount": "1",
            }),
        );
        assert_eq!(
            validate(&envelope),
            Err(SchemaError::NotPositive { field: "btc_sats" })
        );
    }

    #[test]
    fn rfq_rejects_wrong_pair() {
        let envelope = signed(
            EnvelopeKind::Rfq,
            json!({
                "pair": "ETH/USD",
                "direction": DIRECTION,
                "btc_sats": 1,
                "usdt_amount": "1",
            }),
        );
        assert_eq!(validate(&envelope), Err(SchemaError::WrongPair));
    }

    #[test]
    fn unknown_top_level_field_is_rejected_by_deny_unknown_fields() {
        let envelope = signed(
            EnvelopeKind::QuoteAccept,
            json!({"rfq_id": "a", "quote_id": "b", "sneaky": true}),
        );
        assert!(validate(&envelope).is_err());
    }

    #[test]
    fn terms_requires_32_byte_hex_peers() {
        let envelope = signed(
            EnvelopeKind::Terms,
            json!({
                "btc_sats": 1,
                "usdt_amount": "1",
                "usdt_decimals": 6,
                "sol_mint": "11111111111111111111111111111111",
                "sol_recipient": "11111111111111111111111111111111",
                "sol_refund": "11111111111111111111111111111111",
                "sol_refund_after_unix": 1,
                "ln_receiver_peer": "not-hex",
                "ln_payer_peer": "bb".repeat(32),
            }),
        );
        assert!(matches!(
            validate(&envelope),
            Err(SchemaError::MalformedBody(EnvelopeKind::Terms))
        ));
    }

    #[test]
    fn protocol_version_mismatch_is_rejected() {
        let mut envelope = signed(EnvelopeKind::Cancel, json!({}));
        envelope.v = 2;
        assert_eq!(validate(&envelope), Err(SchemaError::UnsupportedVersion));
    }
}
