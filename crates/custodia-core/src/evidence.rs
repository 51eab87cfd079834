//! Evidence intake.
//!
//! Intake is the one operation that touches both stores at once: the
//! evidence row and its first custody entry are committed in a single
//! transaction, so an evidence record can never exist without a custody
//! chain and a custody genesis can never reference a file that was not
//! persisted. The companion activity-log entry lives in a different chain
//! and is recorded after the commit, best-effort.

use std::io::{self, Read};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::canonical::Value;
use crate::crypto::LinkHash;
use crate::identity::{ActorId, Clock, IdentityProvider};
use crate::ledger::{AppendError, Ledger, LedgerKind, LedgerRecord, LedgerStore};

/// Buffer size for streaming file digests.
const DIGEST_BUF_SIZE: usize = 64 * 1024;

/// An evidence item as persisted alongside its custody chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// Stable identifier; also the custody chain's scope.
    pub evidence_id: String,
    /// Owning case.
    pub case_id: String,
    /// Where the evidence file lives.
    pub file_path: String,
    /// File size at intake.
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the file content at intake.
    pub sha256_hash: String,
    /// Principal who performed the intake.
    pub uploaded_by: ActorId,
    /// Intake time in nanoseconds since the Unix epoch.
    pub uploaded_at_ns: i64,
}

/// Everything the caller supplies for an intake.
///
/// The digest is the caller's responsibility (see [`sha256_hex`]) so that
/// intake itself never does file I/O.
#[derive(Debug, Clone)]
pub struct EvidenceIntake {
    /// Identifier for the new evidence item.
    pub evidence_id: String,
    /// Owning case.
    pub case_id: String,
    /// Path to the stored evidence file.
    pub file_path: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the file content.
    pub sha256_hash: String,
    /// Source address, when known.
    pub ip_address: Option<String>,
}

/// What an accepted intake produced.
#[derive(Debug, Clone)]
pub struct IntakeReceipt {
    /// The persisted evidence record.
    pub evidence: EvidenceRecord,
    /// Genesis entry of the item's custody chain.
    pub custody_entry: LedgerRecord,
    /// Companion activity-log entry, when it could be recorded.
    pub activity_entry: Option<LedgerRecord>,
}

/// Streams `reader` through SHA-256 and returns the lowercase hex digest.
///
/// # Errors
///
/// Propagates any I/O error from the reader.
pub fn sha256_hex<R: Read>(mut reader: R) -> io::Result<String> {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    let mut buf = [0u8; DIGEST_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(LinkHash::from_bytes(hasher.finalize().into()).to_hex())
}

impl<S, I, C> Ledger<S, I, C>
where
    S: LedgerStore,
    I: IdentityProvider,
    C: Clock,
{
    /// Takes an evidence item into custody.
    ///
    /// Persists the evidence record and the custody chain's genesis entry as
    /// one unit of work, then records the matching case activity entry. The
    /// activity entry sits in a separate chain and cannot join the
    /// transaction; if it fails, the failure is logged and the receipt
    /// carries `None` — the custody chain remains the authoritative trail.
    ///
    /// # Errors
    ///
    /// - [`AppendError::Unauthenticated`] if no actor resolves.
    /// - [`AppendError::Store`] if the evidence row or custody entry cannot
    ///   be committed; neither persists in that case.
    pub fn intake_evidence(&self, intake: EvidenceIntake) -> Result<IntakeReceipt, AppendError> {
        let actor_id = self
            .identity()
            .current_actor()
            .ok_or(AppendError::Unauthenticated)?;
        let uploaded_at_ns = self.clock().now_ns();

        let evidence = EvidenceRecord {
            evidence_id: intake.evidence_id,
            case_id: intake.case_id,
            file_path: intake.file_path,
            size_bytes: intake.size_bytes,
            sha256_hash: intake.sha256_hash,
            uploaded_by: actor_id.clone(),
            uploaded_at_ns,
        };

        let details = intake_details(&evidence);
        let entry = self.compute_entry(
            LedgerKind::ChainOfCustody,
            &evidence.evidence_id,
            "Evidence Uploaded",
            details.clone(),
            intake.ip_address.clone(),
            actor_id,
        )?;
        let seq_id = self.store().append_with_evidence(&evidence, &entry)?;
        let custody_entry = entry.into_record(seq_id);

        info!(
            evidence_id = %evidence.evidence_id,
            case_id = %evidence.case_id,
            size_bytes = evidence.size_bytes,
            seq_id,
            "evidence taken into custody"
        );

        let activity_entry = match self.append_entry(
            LedgerKind::ActivityLog,
            &evidence.case_id,
            "Evidence Uploaded",
            details,
            intake.ip_address,
        ) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(
                    evidence_id = %evidence.evidence_id,
                    case_id = %evidence.case_id,
                    error = %err,
                    "custody committed but activity entry failed"
                );
                None
            },
        };

        Ok(IntakeReceipt {
            evidence,
            custody_entry,
            activity_entry,
        })
    }
}

fn intake_details(evidence: &EvidenceRecord) -> Value {
    Value::map([
        ("evidence_id", Value::text(&evidence.evidence_id)),
        ("file_path", Value::text(&evidence.file_path)),
        ("sha256_hash", Value::text(&evidence.sha256_hash)),
        (
            "size_bytes",
            Value::int(i64::try_from(evidence.size_bytes).unwrap_or(i64::MAX)),
        ),
    ])
}
