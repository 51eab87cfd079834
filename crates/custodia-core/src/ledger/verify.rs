//! Chain replay and integrity verification.
//!
//! Verification is read-only and reports breaks as values, never as errors:
//! the result is meant for an auditor, who needs to know exactly where and
//! why a chain stopped being trustworthy. The walk stops at the first break;
//! it does not attempt to heal or skip.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::record::LedgerRecord;
use crate::crypto::LinkHash;

/// Why a chain failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakReason {
    /// The first entry's `hash_prev` is not the genesis constant.
    GenesisMismatch,
    /// An entry's `hash_prev` does not match the previous entry's
    /// `hash_current` — a removed, inserted, reordered, or forked entry.
    PrevMismatch,
    /// Recomputing an entry's hash from its stored fields does not reproduce
    /// its stored `hash_current` — the content was altered after the fact.
    ContentMismatch,
}

impl fmt::Display for BreakReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::GenesisMismatch => "genesis mismatch",
            Self::PrevMismatch => "previous-hash mismatch",
            Self::ContentMismatch => "content mismatch",
        };
        f.write_str(s)
    }
}

/// Outcome of replaying a chain from genesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationResult {
    /// Every link checked out.
    Valid {
        /// Number of entries verified.
        entries: usize,
    },
    /// The chain broke; entries before `at_index` verified cleanly.
    Broken {
        /// Zero-based position of the first broken entry, in append order.
        at_index: usize,
        /// What broke.
        reason: BreakReason,
    },
}

impl VerificationResult {
    /// Whether the chain verified cleanly.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid { entries } => write!(f, "valid ({entries} entries)"),
            Self::Broken { at_index, reason } => {
                write!(f, "broken at entry {at_index}: {reason}")
            },
        }
    }
}

/// Replays `entries` (in true append order) and checks every link.
///
/// For each entry the walk requires:
/// - entry 0 carries the genesis sentinel as `hash_prev`;
/// - entry i>0 carries entry i-1's `hash_current` as `hash_prev`;
/// - recomputing the entry's digest from its stored fields reproduces its
///   stored `hash_current`.
///
/// An empty chain is trivially valid.
#[must_use]
pub fn verify_entries(entries: &[LedgerRecord]) -> VerificationResult {
    let mut expected_prev = LinkHash::GENESIS;

    for (at_index, entry) in entries.iter().enumerate() {
        if entry.hash_prev != expected_prev {
            let reason = if at_index == 0 {
                BreakReason::GenesisMismatch
            } else {
                BreakReason::PrevMismatch
            };
            warn!(
                kind = %entry.kind,
                scope_id = %entry.scope_id,
                seq_id = entry.seq_id,
                at_index,
                %reason,
                "chain verification failed"
            );
            return VerificationResult::Broken { at_index, reason };
        }

        // An encoding failure means the stored payload cannot even reproduce
        // hash input; treat it as altered content.
        let recomputed = entry.content().link_hash(&entry.hash_prev);
        if recomputed.ok() != Some(entry.hash_current) {
            warn!(
                kind = %entry.kind,
                scope_id = %entry.scope_id,
                seq_id = entry.seq_id,
                at_index,
                "stored hash does not match recomputed content hash"
            );
            return VerificationResult::Broken {
                at_index,
                reason: BreakReason::ContentMismatch,
            };
        }

        expected_prev = entry.hash_current;
    }

    debug!(entries = entries.len(), "chain verified");
    VerificationResult::Valid {
        entries: entries.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::Value;
    use crate::identity::ActorId;
    use crate::ledger::record::{EntryContent, LedgerKind};

    fn build_chain(scope: &str, actions: &[&str]) -> Vec<LedgerRecord> {
        let mut prev = LinkHash::GENESIS;
        actions
            .iter()
            .enumerate()
            .map(|(i, action)| {
                let details = Value::map([("step", Value::int(i as i64))]);
                let timestamp_ns = 1_700_000_000_000_000_000 + i as i64;
                let content = EntryContent {
                    scope_id: scope,
                    actor_id: "analyst-1",
                    action,
                    details: &details,
                    ip_address: None,
                    timestamp_ns,
                };
                let hash_current = content.link_hash(&prev).expect("hash");
                let record = LedgerRecord {
                    seq_id: (i + 1) as u64,
                    kind: LedgerKind::ActivityLog,
                    scope_id: scope.to_string(),
                    actor_id: ActorId::new("analyst-1"),
                    action: (*action).to_string(),
                    details,
                    ip_address: None,
                    timestamp_ns,
                    hash_prev: prev,
                    hash_current,
                };
                prev = hash_current;
                record
            })
            .collect()
    }

    #[test]
    fn empty_chain_is_valid() {
        assert_eq!(verify_entries(&[]), VerificationResult::Valid { entries: 0 });
    }

    #[test]
    fn well_formed_chain_is_valid() {
        let chain = build_chain("case-1", &["a", "b", "c", "d", "e"]);
        assert_eq!(
            verify_entries(&chain),
            VerificationResult::Valid { entries: 5 }
        );
    }

    #[test]
    fn non_genesis_first_entry_is_genesis_mismatch() {
        let mut chain = build_chain("case-1", &["a", "b"]);
        chain.remove(0);
        assert_eq!(
            verify_entries(&chain),
            VerificationResult::Broken {
                at_index: 0,
                reason: BreakReason::GenesisMismatch,
            }
        );
    }

    #[test]
    fn mutated_field_is_content_mismatch_at_that_entry() {
        let mut chain = build_chain("case-1", &["a", "b", "c", "d", "e"]);
        chain[2].action = "tampered".to_string();
        assert_eq!(
            verify_entries(&chain),
            VerificationResult::Broken {
                at_index: 2,
                reason: BreakReason::ContentMismatch,
            }
        );
    }

    #[test]
    fn mutated_details_is_content_mismatch() {
        let mut chain = build_chain("case-1", &["a", "b", "c"]);
        chain[1].details = Value::map([("step", Value::int(99))]);
        assert_eq!(
            verify_entries(&chain),
            VerificationResult::Broken {
                at_index: 1,
                reason: BreakReason::ContentMismatch,
            }
        );
    }

    #[test]
    fn swapped_adjacent_entries_break_with_prev_mismatch() {
        let mut chain = build_chain("case-1", &["a", "b", "c", "d"]);
        chain.swap(1, 2);
        let result = verify_entries(&chain);
        assert_eq!(
            result,
            VerificationResult::Broken {
                at_index: 1,
                reason: BreakReason::PrevMismatch,
            }
        );
    }

    #[test]
    fn fork_is_reported_on_the_second_candidate() {
        let chain = build_chain("case-1", &["a"]);
        let mut fork = build_chain("case-1", &["z"]);
        // Both entries reference genesis: a fork.
        let mut entries = chain;
        entries.append(&mut fork);
        assert_eq!(
            verify_entries(&entries),
            VerificationResult::Broken {
                at_index: 1,
                reason: BreakReason::PrevMismatch,
            }
        );
    }

    #[test]
    fn verification_stops_at_first_break() {
        let mut chain = build_chain("case-1", &["a", "b", "c", "d"]);
        chain[1].action = "tampered".to_string();
        chain[3].action = "also tampered".to_string();
        assert_eq!(
            verify_entries(&chain),
            VerificationResult::Broken {
                at_index: 1,
                reason: BreakReason::ContentMismatch,
            }
        );
    }

    #[test]
    fn display_formats_for_auditors() {
        assert_eq!(
            VerificationResult::Valid { entries: 3 }.to_string(),
            "valid (3 entries)"
        );
        assert_eq!(
            VerificationResult::Broken {
                at_index: 2,
                reason: BreakReason::ContentMismatch,
            }
            .to_string(),
            "broken at entry 2: content mismatch"
        );
    }
}
