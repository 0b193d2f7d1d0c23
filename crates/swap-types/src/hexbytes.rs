//! Fixed-length, lowercase-hex-encoded byte arrays used throughout the
//! envelope wire format (signer keys, signatures, payment hashes, preimages).

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An `N`-byte value serialized on the wire as lowercase hex.
///
/// Decoding failures are distinguished from length mismatches so callers
/// (the schema validator, C3) can report a precise reason, per §4.2's
/// requirement that "hex decoding errors are distinguishable from
/// cryptographic failure".
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HexBytes<const N: usize>(pub [u8; N]);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HexBytesError {
    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),
    #[error("expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

impl<const N: usize> HexBytes<N> {
    pub fn from_hex(s: &str) -> Result<Self, HexBytesError> {
        let bytes = hex::decode(s).map_err(|e| HexBytesError::InvalidHex(e.to_string()))?;
        if bytes.len() != N {
            return Err(HexBytesError::WrongLength {
                expected: N,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; N];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl<const N: usize> fmt::Debug for HexBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HexBytes({})", self.to_hex())
    }
}

impl<const N: usize> fmt::Display for HexBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl<const N: usize> Serialize for HexBytes<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de, const N: usize> Deserialize<'de> for HexBytes<N> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

/// A 32-byte Ed25519 public key, lowercase hex.
pub type PublicKeyHex = HexBytes<32>;
/// A 64-byte Ed25519 signature, lowercase hex.
pub type SignatureHex = HexBytes<64>;
/// A 32-byte LN payment hash (SHA-256 of the preimage), lowercase hex.
pub type PaymentHashHex = HexBytes<32>;
/// A 32-byte LN payment preimage, lowercase hex.
pub type PreimageHex = HexBytes<32>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let bytes: PublicKeyHex = HexBytes([7u8; 32]);
        let hex = bytes.to_hex();
        let parsed = PublicKeyHex::from_hex(&hex).unwrap();
        assert_eq!(bytes, parsed);
    }

    #[test]
    fn rejects_wrong_length() {
        let err = PaymentHashHex::from_hex("aabb").unwrap_err();
        assert_eq!(
            err,
            HexBytesError::WrongLength {
                expected: 32,
                actual: 2
            }
        );
    }

    #[test]
    fn rejects_invalid_hex() {
        let err = PaymentHashHex::from_hex("zz").unwrap_err();
        assert!(matches!(err, HexBytesError::InvalidHex(_)));
    }
}
