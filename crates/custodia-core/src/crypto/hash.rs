//! Link hashes and the chain hashing primitive.
//!
//! Every ledger entry carries `hash_current = SHA256(hash_prev || canonical
//! content bytes)`. The first entry of a chain uses [`LinkHash::GENESIS`], an
//! all-zero digest, as its previous link. SHA-256 never produces the all-zero
//! output in practice, so the sentinel is operationally reserved for genesis.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::canonical::{EncodingError, Value};

/// Size of a link hash in bytes.
pub const HASH_SIZE: usize = 32;

/// A 256-bit chain link digest.
///
/// Displayed, stored, and compared as fixed-width lowercase hexadecimal.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkHash([u8; HASH_SIZE]);

/// Error from parsing a textual link hash.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid link hash: expected {expected} lowercase hex characters")]
pub struct ParseHashError {
    expected: usize,
}

/// Errors from hashing a canonical value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HashInputError {
    /// The canonical encoder could not represent the content.
    #[error("cannot hash entry content: {0}")]
    Encoding(#[from] EncodingError),
}

impl LinkHash {
    /// The reserved previous-hash value for a chain's first entry.
    pub const GENESIS: Self = Self([0u8; HASH_SIZE]);

    /// Wraps raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Whether this is the genesis sentinel.
    #[must_use]
    pub fn is_genesis(&self) -> bool {
        *self == Self::GENESIS
    }

    /// Returns the lowercase hexadecimal form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LinkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for LinkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkHash({self})")
    }
}

impl FromStr for LinkHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, ParseHashError> {
        let err = ParseHashError {
            expected: HASH_SIZE * 2,
        };
        if s.len() != HASH_SIZE * 2 || !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(err);
        }

        let mut bytes = [0u8; HASH_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = &s[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(pair, 16).map_err(|_| err.clone())?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for LinkHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for LinkHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Computes the link hash over `prev || canonical_bytes`.
///
/// The previous link is fed to the digest in its fixed 32-byte raw form, so
/// the chain binding is unambiguous: there is no framing in which a shifted
/// content prefix could be confused with the previous hash.
#[must_use]
pub fn hash_link(prev: &LinkHash, canonical_bytes: &[u8]) -> LinkHash {
    let mut hasher = Sha256::new();
    hasher.update(prev.as_bytes());
    hasher.update(canonical_bytes);
    LinkHash(hasher.finalize().into())
}

/// Canonically encodes `content` and computes its link hash against `prev`.
///
/// # Errors
///
/// Returns [`HashInputError::Encoding`] if the canonical encoder fails; the
/// hasher itself does not retry.
pub fn hash_value(prev: &LinkHash, content: &Value) -> Result<LinkHash, HashInputError> {
    let bytes = content.canonical_bytes()?;
    Ok(hash_link(prev, &bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic() {
        let content = b"entry content";
        let prev = LinkHash::from_bytes([1u8; HASH_SIZE]);
        assert_eq!(hash_link(&prev, content), hash_link(&prev, content));
    }

    #[test]
    fn different_prev_changes_hash() {
        let content = b"entry content";
        let a = hash_link(&LinkHash::from_bytes([1u8; HASH_SIZE]), content);
        let b = hash_link(&LinkHash::from_bytes([2u8; HASH_SIZE]), content);
        assert_ne!(a, b);
    }

    #[test]
    fn different_content_changes_hash() {
        let prev = LinkHash::GENESIS;
        assert_ne!(hash_link(&prev, b"a"), hash_link(&prev, b"b"));
    }

    #[test]
    fn genesis_is_all_zero_hex() {
        assert_eq!(LinkHash::GENESIS.to_string(), "0".repeat(64));
        assert!(LinkHash::GENESIS.is_genesis());
        assert!(!hash_link(&LinkHash::GENESIS, b"x").is_genesis());
    }

    #[test]
    fn hex_round_trip() {
        let hash = hash_link(&LinkHash::GENESIS, b"round trip");
        let text = hash.to_string();
        assert_eq!(text.len(), 64);
        assert_eq!(text.parse::<LinkHash>().expect("parse"), hash);
    }

    #[test]
    fn rejects_bad_hex() {
        assert!("short".parse::<LinkHash>().is_err());
        // Uppercase is not canonical.
        let upper = "A".repeat(64);
        assert!(upper.parse::<LinkHash>().is_err());
        let bad_char = "g".repeat(64);
        assert!(bad_char.parse::<LinkHash>().is_err());
    }

    #[test]
    fn known_sha256_vector() {
        // SHA256 of 32 zero bytes (the genesis prefix with empty content).
        let hash = hash_link(&LinkHash::GENESIS, b"");
        assert_eq!(
            hash.to_string(),
            "66687aadf862bd776c8fc18b8e9f8e20089714856ee233b3902a591d0d5f2925"
        );
    }

    #[test]
    fn hash_value_composes_canonical_encoding() {
        let a = Value::from_json_str(r#"{"b": 2, "a": 1}"#).expect("parse");
        let b = Value::from_json_str(r#"{"a": 1, "b": 2}"#).expect("parse");
        let prev = LinkHash::GENESIS;
        assert_eq!(
            hash_value(&prev, &a).expect("hash"),
            hash_value(&prev, &b).expect("hash")
        );
    }

    #[test]
    fn serde_round_trip() {
        let hash = hash_link(&LinkHash::GENESIS, b"serde");
        let json = serde_json::to_string(&hash).expect("serialize");
        let back: LinkHash = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, hash);
    }
}
