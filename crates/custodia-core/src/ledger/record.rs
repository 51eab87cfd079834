//! Ledger record types and canonical content hashing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::canonical::Value;
use crate::crypto::{self, HashInputError, LinkHash};
use crate::identity::ActorId;

/// Which of the two parallel ledgers an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// Per-case action log.
    ActivityLog,
    /// Per-evidence-item custody log.
    ChainOfCustody,
}

impl LedgerKind {
    /// Stable textual identifier, used as the storage discriminator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ActivityLog => "activity_log",
            Self::ChainOfCustody => "chain_of_custody",
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error from parsing a [`LedgerKind`] discriminator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown ledger kind: {value:?}")]
pub struct ParseKindError {
    value: String,
}

impl FromStr for LedgerKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, ParseKindError> {
        match s {
            "activity_log" => Ok(Self::ActivityLog),
            "chain_of_custody" => Ok(Self::ChainOfCustody),
            other => Err(ParseKindError {
                value: other.to_string(),
            }),
        }
    }
}

/// One entry in a chain, as persisted.
///
/// Immutable once written: the store offers no update or delete path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Store-assigned sequence number. Authoritative append order for
    /// verification; wall-clock timestamps are not.
    pub seq_id: u64,
    /// Which ledger this entry belongs to.
    pub kind: LedgerKind,
    /// The case or evidence item this chain is partitioned by.
    pub scope_id: String,
    /// The authenticated principal who performed the action.
    pub actor_id: ActorId,
    /// Short descriptive label, e.g. "Evidence Uploaded".
    pub action: String,
    /// Structured payload; part of the hashed content.
    pub details: Value,
    /// Source address for activity entries, when known.
    pub ip_address: Option<String>,
    /// Append time in nanoseconds since the Unix epoch.
    pub timestamp_ns: i64,
    /// `hash_current` of the previous entry, or [`LinkHash::GENESIS`].
    pub hash_prev: LinkHash,
    /// Digest binding `hash_prev` and this entry's canonical content.
    pub hash_current: LinkHash,
}

impl LedgerRecord {
    /// Borrows the hashed content fields of this record.
    #[must_use]
    pub fn content(&self) -> EntryContent<'_> {
        EntryContent {
            scope_id: &self.scope_id,
            actor_id: self.actor_id.as_str(),
            action: &self.action,
            details: &self.details,
            ip_address: self.ip_address.as_deref(),
            timestamp_ns: self.timestamp_ns,
        }
    }
}

/// The fields of an entry that are bound by its hash.
///
/// `hash_current` is a pure function of `(hash_prev, scope_id, actor_id,
/// action, details, ip_address, timestamp_ns)`: the fields are assembled
/// into a canonical map (keys sorted, `ip_address` omitted when absent) and
/// encoded to bytes by the canonical encoder.
#[derive(Debug, Clone, Copy)]
pub struct EntryContent<'a> {
    /// Chain scope (case or evidence item).
    pub scope_id: &'a str,
    /// Acting principal.
    pub actor_id: &'a str,
    /// Action label.
    pub action: &'a str,
    /// Structured payload.
    pub details: &'a Value,
    /// Optional source address.
    pub ip_address: Option<&'a str>,
    /// Append timestamp.
    pub timestamp_ns: i64,
}

impl EntryContent<'_> {
    /// Assembles the canonical content map.
    #[must_use]
    pub fn to_canonical_value(&self) -> Value {
        let mut fields = vec![
            ("action", Value::text(self.action)),
            ("actor_id", Value::text(self.actor_id)),
            ("details", self.details.clone()),
            ("scope_id", Value::text(self.scope_id)),
            ("timestamp_ns", Value::int(self.timestamp_ns)),
        ];
        if let Some(ip) = self.ip_address {
            fields.push(("ip_address", Value::text(ip)));
        }
        Value::map(fields)
    }

    /// Computes the link hash of this content against `prev`.
    ///
    /// # Errors
    ///
    /// Returns [`HashInputError`] if the canonical encoder rejects the
    /// content (nesting beyond the depth limit).
    pub fn link_hash(&self, prev: &LinkHash) -> Result<LinkHash, HashInputError> {
        crypto::hash_value(prev, &self.to_canonical_value())
    }
}

/// A fully computed entry, ready for a conditional insert.
///
/// Produced by the appender after the tail read and hash computation; the
/// store persists it verbatim or rejects it as a whole.
#[derive(Debug, Clone)]
pub struct NewEntry {
    /// Target ledger.
    pub kind: LedgerKind,
    /// Chain scope.
    pub scope_id: String,
    /// Acting principal.
    pub actor_id: ActorId,
    /// Action label.
    pub action: String,
    /// Structured payload.
    pub details: Value,
    /// Canonical encoding of `details`, persisted as the storage form.
    pub details_json: String,
    /// Optional source address.
    pub ip_address: Option<String>,
    /// Append timestamp.
    pub timestamp_ns: i64,
    /// Tail hash observed at compute time, or genesis.
    pub hash_prev: LinkHash,
    /// Computed entry digest.
    pub hash_current: LinkHash,
}

impl NewEntry {
    /// Converts the accepted entry into its persisted record form.
    #[must_use]
    pub fn into_record(self, seq_id: u64) -> LedgerRecord {
        LedgerRecord {
            seq_id,
            kind: self.kind,
            scope_id: self.scope_id,
            actor_id: self.actor_id,
            action: self.action,
            details: self.details,
            ip_address: self.ip_address,
            timestamp_ns: self.timestamp_ns,
            hash_prev: self.hash_prev,
            hash_current: self.hash_current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content<'a>(details: &'a Value) -> EntryContent<'a> {
        EntryContent {
            scope_id: "case-1",
            actor_id: "analyst-1",
            action: "Case Opened",
            details,
            ip_address: None,
            timestamp_ns: 1_700_000_000_000_000_000,
        }
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [LedgerKind::ActivityLog, LedgerKind::ChainOfCustody] {
            assert_eq!(kind.as_str().parse::<LedgerKind>().expect("parse"), kind);
        }
        assert!("logs".parse::<LedgerKind>().is_err());
    }

    #[test]
    fn canonical_content_has_sorted_keys() {
        let details = Value::empty_map();
        let encoded = content(&details)
            .to_canonical_value()
            .canonical_string()
            .expect("encode");
        assert_eq!(
            encoded,
            r#"{"action":"Case Opened","actor_id":"analyst-1","details":{},"scope_id":"case-1","timestamp_ns":1700000000000000000}"#
        );
    }

    #[test]
    fn ip_address_is_hashed_when_present() {
        let details = Value::empty_map();
        let base = content(&details);
        let with_ip = EntryContent {
            ip_address: Some("10.0.0.8"),
            ..base
        };
        let h1 = base.link_hash(&LinkHash::GENESIS).expect("hash");
        let h2 = with_ip.link_hash(&LinkHash::GENESIS).expect("hash");
        assert_ne!(h1, h2);
    }

    #[test]
    fn single_field_change_changes_hash() {
        let details = Value::map([("filename", Value::text("disk.img"))]);
        let tweaked = Value::map([("filename", Value::text("disk.imh"))]);
        let h1 = content(&details).link_hash(&LinkHash::GENESIS).expect("hash");
        let h2 = content(&tweaked).link_hash(&LinkHash::GENESIS).expect("hash");
        assert_ne!(h1, h2);
    }

    #[test]
    fn hash_is_deterministic() {
        let details = Value::map([("k", Value::int(1))]);
        let c = content(&details);
        assert_eq!(
            c.link_hash(&LinkHash::GENESIS).expect("hash"),
            c.link_hash(&LinkHash::GENESIS).expect("hash")
        );
    }

    #[test]
    fn record_content_recomputes_stored_hash() {
        let details = Value::map([("k", Value::text("v"))]);
        let c = content(&details);
        let hash = c.link_hash(&LinkHash::GENESIS).expect("hash");
        let record = LedgerRecord {
            seq_id: 1,
            kind: LedgerKind::ActivityLog,
            scope_id: "case-1".into(),
            actor_id: ActorId::new("analyst-1"),
            action: "Case Opened".into(),
            details,
            ip_address: None,
            timestamp_ns: 1_700_000_000_000_000_000,
            hash_prev: LinkHash::GENESIS,
            hash_current: hash,
        };
        assert_eq!(
            record.content().link_hash(&record.hash_prev).expect("hash"),
            record.hash_current
        );
    }
}
