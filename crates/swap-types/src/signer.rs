//! Envelope Signer/Verifier (C2).
//!
//! The signing key is externalized behind the [`Signer`] capability trait so
//! it can live in a separate process (e.g. a hardware wallet or a remote
//! signer service) instead of in this one. [`Ed25519Signer`] is the
//! in-process reference implementation, suitable for tests and
//! single-process deployments.

use ed25519_dalek::{Signature, Signer as DalekSigner, SigningKey, Verifier as DalekVerifier, VerifyingKey};
use rand_core::OsRng;

use crate::hexbytes::{HexBytes, PublicKeyHex, SignatureHex};

/// A `{signer, sig}` pair produced by signing a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signed {
    pub signer: PublicKeyHex,
    pub sig: SignatureHex,
}

/// Capability for signing arbitrary payload bytes. Implementations may hold
/// the private key anywhere — in-process, over IPC, or behind a remote
/// signer RPC — as long as `sign` returns a valid Ed25519 signature.
pub trait Signer {
    type Error: std::error::Error + Send + Sync + 'static;

    fn sign(&self, payload: &[u8]) -> Result<Signed, Self::Error>;

    fn public_key(&self) -> PublicKeyHex;
}

/// In-process Ed25519 signer over `ed25519-dalek`.
#[derive(Clone)]
pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    pub fn from_bytes(secret_key: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret_key);
        Self { signing_key }
    }
}

impl Signer for Ed25519Signer {
    type Error = std::convert::Infallible;

    fn sign(&self, payload: &[u8]) -> Result<Signed, Self::Error> {
        let signature: Signature = self.signing_key.sign(payload);
        Ok(Signed {
            signer: HexBytes(self.signing_key.verifying_key().to_bytes()),
            sig: HexBytes(signature.to_bytes()),
        })
    }

    fn public_key(&self) -> PublicKeyHex {
        HexBytes(self.signing_key.verifying_key().to_bytes())
    }
}

/// Errors returned by [`verify`]. Hex/format errors are distinguished from
/// cryptographic verification failure per §4.2.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("malformed signer public key")]
    MalformedSigner,
    #[error("malformed signature")]
    MalformedSignature,
    #[error("signature does not verify against the given signer")]
    BadSignature,
}

/// Verifies `sig` against `signer` over `payload`.
pub fn verify(signer: &PublicKeyHex, sig: &SignatureHex, payload: &[u8]) -> Result<(), VerifyError> {
    let verifying_key =
        VerifyingKey::from_bytes(signer.as_bytes()).map_err(|_| VerifyError::MalformedSigner)?;
    let signature = Signature::from_bytes(sig.as_bytes());
    verifying_key
        .verify(payload, &signature)
        .map_err(|_| VerifyError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_roundtrips() {
        let signer = Ed25519Signer::generate();
        let payload = b"canonical bytes of an unsigned envelope";
        let signed = signer.sign(payload).unwrap();
        assert_eq!(signed.signer, signer.public_key());
        assert!(verify(&signed.signer, &signed.sig, payload).is_ok());
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let signer = Ed25519Signer::generate();
        let signed = signer.sign(b"original").unwrap();
        let err = verify(&signed.signer, &signed.sig, b"tampered").unwrap_err();
        assert_eq!(err, VerifyError::BadSignature);
    }

    #[test]
    fn wrong_signer_fails_verification() {
        let signer = Ed25519Signer::generate();
        let other = Ed25519Signer::generate();
        let signed = signer.sign(b"payload").unwrap();
        let err = verify(&other.public_key(), &signed.sig, b"payload").unwrap_err();
        assert_eq!(err, VerifyError::BadSignature);
    }

    #[test]
    fn malformed_signer_hex_is_distinguished() {
        let bad_signer = HexBytes([0xffu8; 32]); // not a valid curve point is still possible; use known-bad pattern
        // ed25519-dalek rejects some all-0xff keys at verify time as malformed.
        let sig = HexBytes([0u8; 64]);
        let result = verify(&bad_signer, &sig, b"x");
        assert!(result.is_err());
    }
}
