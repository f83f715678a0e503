//! BLAKE3 digests of payloads and view states.

use crate::error::CoreResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 32-byte BLAKE3 digest, serialized as lowercase hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hash([u8; 32]);

impl Hash {
    /// Digest of raw bytes
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Digest of a value's JSON encoding
    ///
    /// The value goes through `serde_json::Value` first, so object keys are
    /// emitted in one fixed order whatever order the type serializes them in.
    ///
    /// # Errors
    ///
    /// Returns `Encoding` if the value cannot be encoded as JSON
    pub fn of_json<T: Serialize + ?Sized>(value: &T) -> CoreResult<Self> {
        let canonical = serde_json::to_value(value)?;
        Ok(Self::compute(&serde_json::to_vec(&canonical)?))
    }

    /// Whether `data` digests to this hash
    #[must_use]
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute(data) == *self
    }

    /// Lowercase hex form
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Hash {
    type Err = HashError;

    fn from_str(text: &str) -> Result<Self, HashError> {
        let bytes = hex::decode(text).map_err(|_| HashError::InvalidHex)?;
        let len = bytes.len();
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| HashError::InvalidLength(len))
    }
}

impl TryFrom<String> for Hash {
    type Error = HashError;

    fn try_from(text: String) -> Result<Self, HashError> {
        text.parse()
    }
}

impl From<Hash> for String {
    fn from(hash: Hash) -> Self {
        hash.to_hex()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Failure to parse a [`Hash`] from text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    /// Not valid hex
    #[error("Invalid hex encoding")]
    InvalidHex,
    /// Decoded to the wrong number of bytes
    #[error("Invalid hash length: {0} bytes, expected 32")]
    InvalidLength(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hex_round_trip() {
        let hash = Hash::compute(b"deposited");
        assert_eq!(hash.to_hex().len(), 64);
        assert_eq!(hash.to_hex().parse::<Hash>(), Ok(hash));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("zz".parse::<Hash>(), Err(HashError::InvalidHex));
        assert_eq!("abcd".parse::<Hash>(), Err(HashError::InvalidLength(2)));
    }

    #[test]
    fn test_serializes_as_hex_string() {
        let hash = Hash::compute(b"state");
        let encoded = serde_json::to_value(hash).unwrap();
        assert_eq!(encoded, json!(hash.to_hex()));
        let decoded: Hash = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, hash);
    }

    #[test]
    fn test_verify() {
        let hash = Hash::compute(b"payload");
        assert!(hash.verify(b"payload"));
        assert!(!hash.verify(b"other"));
    }

    #[test]
    fn test_of_json_ignores_field_order() {
        let a = Hash::of_json(&json!({"a": 1, "b": [1, 2]})).unwrap();
        let b = Hash::of_json(&json!({"b": [1, 2], "a": 1})).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Hash::of_json(&json!({"a": 2, "b": [1, 2]})).unwrap());
    }
}
