//! The versioned, authenticated [`Envelope`] (§3) and its canonical
//! unsigned pre-image, used both for signing (C2) and content hashing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{canonical_bytes, content_hash_hex};
use crate::hexbytes::{PublicKeyHex, SignatureHex};
use crate::kind::EnvelopeKind;
use crate::signer::{self, Signed, Signer, VerifyError};
use crate::timestamp::UnixTimestamp;

pub const PROTOCOL_VERSION: u8 = 1;

/// A signed, versioned envelope as it appears on the wire (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    pub v: u8,
    pub kind: EnvelopeKind,
    pub trade_id: String,
    pub ts: UnixTimestamp,
    pub nonce: String,
    pub body: Value,
    pub signer: PublicKeyHex,
    pub sig: SignatureHex,
}

impl Envelope {
    /// The canonical encoding of `{v, kind, trade_id, ts, nonce, body}`,
    /// i.e. the envelope with `signer` and `sig` stripped (E-1).
    pub fn unsigned_value(&self) -> Value {
        serde_json::json!({
            "v": self.v,
            "kind": self.kind,
            "trade_id": self.trade_id,
            "ts": self.ts,
            "nonce": self.nonce,
            "body": self.body,
        })
    }

    pub fn unsigned_canonical_bytes(&self) -> Vec<u8> {
        canonical_bytes(&self.unsigned_value())
    }

    /// Content hash of the unsigned envelope — used for `rfq_id`, `quote_id`,
    /// and `terms_hash` (§6).
    pub fn content_hash(&self) -> String {
        content_hash_hex(&self.unsigned_value())
    }

    /// Verifies E-1: `sig` validates against `signer` over the canonical
    /// encoding of the unsigned envelope.
    pub fn verify_signature(&self) -> Result<(), VerifyError> {
        signer::verify(&self.signer, &self.sig, &self.unsigned_canonical_bytes())
    }
}

/// Builds and signs a new envelope from its unsigned parts.
pub struct UnsignedEnvelope {
    pub v: u8,
    pub kind: EnvelopeKind,
    pub trade_id: String,
    pub ts: UnixTimestamp,
    pub nonce: String,
    pub body: Value,
}

impl UnsignedEnvelope {
    pub fn new(kind: EnvelopeKind, trade_id: impl Into<String>, nonce: impl Into<String>, body: Value) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            kind,
            trade_id: trade_id.into(),
            ts: UnixTimestamp::now_ms(),
            nonce: nonce.into(),
            body,
        }
    }

    fn value(&self) -> Value {
        serde_json::json!({
            "v": self.v,
            "kind": self.kind,
            "trade_id": self.trade_id,
            "ts": self.ts,
            "nonce": self.nonce,
            "body": self.body,
        })
    }

    pub fn content_hash(&self) -> String {
        content_hash_hex(&self.value())
    }

    pub fn sign<S: Signer>(self, signer: &S) -> Result<Envelope, S::Error> {
        let canonical = canonical_bytes(&self.value());
        let Signed { signer: signer_hex, sig } = signer.sign(&canonical)?;
        Ok(Envelope {
            v: self.v,
            kind: self.kind,
            trade_id: self.trade_id,
            ts: self.ts,
            nonce: self.nonce,
            body: self.body,
            signer: signer_hex,
            sig,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::Ed25519Signer;
    use serde_json::json;

    #[test]
    fn sign_then_verify_roundtrips_for_any_keypair() {
        for _ in 0..8 {
            let signer = Ed25519Signer::generate();
            let unsigned = UnsignedEnvelope::new(
                EnvelopeKind::Rfq,
                "trade-1",
                "nonce-1",
                json!({"btc_sats": 1000}),
            );
            let envelope = unsigned.sign(&signer).unwrap();
            assert!(envelope.verify_signature().is_ok());
        }
    }

    #[test]
    fn content_hash_ignores_signer_and_sig() {
        let signer_a = Ed25519Signer::generate();
        let signer_b = Ed25519Signer::generate();
        let unsigned_a = UnsignedEnvelope::new(EnvelopeKind::Rfq, "t", "n", json!({"x": 1}));
        let hash_before = unsigned_a.content_hash();
        let unsigned_b = UnsignedEnvelope {
            v: unsigned_a.v,
            kind: unsigned_a.kind,
            trade_id: unsigned_a.trade_id.clone(),
            ts: unsigned_a.ts,
            nonce: unsigned_a.nonce.clone(),
            body: unsigned_a.body.clone(),
        };
        let envelope_a = unsigned_a.sign(&signer_a).unwrap();
        let envelope_b = unsigned_b.sign(&signer_b).unwrap();
        assert_eq!(envelope_a.content_hash(), hash_before);
        assert_eq!(envelope_a.content_hash(), envelope_b.content_hash());
    }

    #[test]
    fn tampered_body_fails_verification() {
        let signer = Ed25519Signer::generate();
        let unsigned = UnsignedEnvelope::new(EnvelopeKind::Rfq, "t", "n", json!({"btc_sats": 1}));
        let mut envelope = unsigned.sign(&signer).unwrap();
        envelope.body = json!({"btc_sats": 2});
        assert!(envelope.verify_signature().is_err());
    }
}
