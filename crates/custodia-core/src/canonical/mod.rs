//! Canonical value model and deterministic byte encoding.
//!
//! Ledger entries carry an arbitrary structured `details` payload. For the
//! hash chain to be replayable, that payload must encode to the exact same
//! bytes every time it is hashed, including after a round trip through
//! storage that does not promise to preserve key order. This module provides
//! a closed algebraic value type, [`Value`], and a canonical compact-JSON
//! encoding of it following the RFC 8785 (JCS) subset:
//!
//! - **Integer-only numbers**: floats are rejected on ingestion. Numbers must
//!   fit the signed 64-bit range.
//! - **Sorted keys**: maps are `BTreeMap`s, so key order is canonical by
//!   construction.
//! - **NFC text**: strings are normalized to Unicode NFC when a `Value` is
//!   built, so logically equal strings encode identically regardless of the
//!   composition form the caller used.
//! - **Minimal escaping**: only `"`, `\`, and control characters U+0000
//!   through U+001F are escaped (short escapes where defined).
//! - **Bounded depth**: values nested deeper than [`MAX_DEPTH`] levels are
//!   rejected.
//!
//! Encoding is a pure function with no locale dependence.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Maximum nesting depth for canonical values.
pub const MAX_DEPTH: usize = 64;

/// Errors raised when a payload cannot be canonically represented.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EncodingError {
    /// A floating-point number was encountered. Floats have no canonical
    /// cross-platform text representation, so the value set excludes them.
    #[error("float not allowed: canonical encoding requires integer-only numbers")]
    FloatNotAllowed,

    /// A number is outside the signed 64-bit integer range.
    #[error("number out of range: {value} is outside the signed 64-bit integer range")]
    NumberOutOfRange {
        /// Text form of the offending number.
        value: String,
    },

    /// The value nests deeper than [`MAX_DEPTH`] levels.
    #[error("max depth exceeded: value nested deeper than {max_depth} levels")]
    MaxDepthExceeded {
        /// The depth limit that was exceeded.
        max_depth: usize,
    },

    /// The input was not valid JSON (ingestion from text only).
    #[error("JSON parse error: {message}")]
    ParseError {
        /// Description of the parse failure.
        message: String,
    },
}

/// A structured payload value in the closed canonical set.
///
/// The variants mirror JSON minus floats: strings, 64-bit integers,
/// booleans, null, sequences, and ordered mappings of the same.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent / null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// NFC-normalized text.
    Text(String),
    /// Ordered sequence.
    Seq(Vec<Value>),
    /// Key-sorted mapping.
    Map(BTreeMap<String, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl Value {
    /// Builds a text value, normalizing to Unicode NFC.
    #[must_use]
    pub fn text(s: impl AsRef<str>) -> Self {
        Self::Text(nfc(s.as_ref()))
    }

    /// Builds an integer value.
    #[must_use]
    pub const fn int(i: i64) -> Self {
        Self::Int(i)
    }

    /// Builds an empty map, the conventional "no details" payload.
    #[must_use]
    pub const fn empty_map() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// Builds a map from key/value pairs. Keys are NFC-normalized; duplicate
    /// keys keep the last value, as `BTreeMap` insertion does.
    #[must_use]
    pub fn map<K, I>(pairs: I) -> Self
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Self)>,
    {
        Self::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (nfc(k.as_ref()), v))
                .collect(),
        )
    }

    /// Parses a JSON string into a canonical value.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError::ParseError`] for malformed JSON, and the
    /// usual canonical-set errors for floats, out-of-range numbers, or
    /// excessive nesting.
    pub fn from_json_str(input: &str) -> Result<Self, EncodingError> {
        let json: serde_json::Value =
            serde_json::from_str(input).map_err(|e| EncodingError::ParseError {
                message: e.to_string(),
            })?;
        Self::try_from(json)
    }

    /// Produces the canonical byte encoding of this value.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError::MaxDepthExceeded`] if the value nests deeper
    /// than [`MAX_DEPTH`] levels. Every other constraint is enforced at
    /// construction, so a `Value` within the depth limit always encodes.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        self.canonical_string().map(String::into_bytes)
    }

    /// Produces the canonical encoding as a JSON string.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::canonical_bytes`].
    pub fn canonical_string(&self) -> Result<String, EncodingError> {
        let mut out = String::new();
        emit_value(self, &mut out, 0)?;
        Ok(out)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = EncodingError;

    fn try_from(json: serde_json::Value) -> Result<Self, EncodingError> {
        from_json(json, 0)
    }
}

fn nfc(s: &str) -> String {
    // Fast path: already-NFC strings (the overwhelming majority) allocate
    // once instead of twice.
    if unicode_normalization::is_nfc(s) {
        s.to_owned()
    } else {
        s.nfc().collect()
    }
}

fn from_json(json: serde_json::Value, depth: usize) -> Result<Value, EncodingError> {
    if depth > MAX_DEPTH {
        return Err(EncodingError::MaxDepthExceeded {
            max_depth: MAX_DEPTH,
        });
    }

    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if n.as_u64().is_some() {
                Err(EncodingError::NumberOutOfRange {
                    value: n.to_string(),
                })
            } else {
                Err(EncodingError::FloatNotAllowed)
            }
        },
        serde_json::Value::String(s) => Ok(Value::text(s)),
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| from_json(item, depth + 1))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Seq),
        serde_json::Value::Object(fields) => fields
            .into_iter()
            .map(|(k, v)| Ok((nfc(&k), from_json(v, depth + 1)?)))
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Value::Map),
    }
}

fn emit_value(value: &Value, out: &mut String, depth: usize) -> Result<(), EncodingError> {
    if depth > MAX_DEPTH {
        return Err(EncodingError::MaxDepthExceeded {
            max_depth: MAX_DEPTH,
        });
    }

    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => {
            let _ = write!(out, "{i}");
        },
        Value::Text(s) => emit_string(s, out),
        Value::Seq(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                emit_value(item, out, depth + 1)?;
            }
            out.push(']');
        },
        Value::Map(fields) => {
            // BTreeMap iterates in sorted key order.
            out.push('{');
            for (i, (key, val)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                emit_string(key, out);
                out.push(':');
                emit_value(val, out, depth + 1)?;
            }
            out.push('}');
        },
    }
    Ok(())
}

/// Emits a string with minimal escaping per RFC 8785 Section 3.2.2.2: only
/// `"`, `\`, and U+0000..U+001F are escaped, short escapes where defined.
fn emit_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if ('\u{0000}'..='\u{001F}').contains(&c) => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            },
            c => out.push(c),
        }
    }
    out.push('"');
}
