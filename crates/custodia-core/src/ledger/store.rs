//! Persistent ledger storage.
//!
//! [`SqliteLedgerStore`] keeps both ledgers in a single `SQLite` database in
//! WAL mode. The store is the only shared mutable resource in the core; the
//! encoder and hasher are pure. Appends are conditional: the
//! `UNIQUE (kind, scope_id, hash_prev)` constraint rejects any insert whose
//! observed tail is no longer the tail, which surfaces as
//! [`StoreError::ConcurrentWriteConflict`] and closes the read-compute-write
//! race without a per-scope lock held across the sequence.

// SQLite returns i64 for row IDs and counts, but they're always non-negative.
// Mutex poisoning indicates a panic in another thread, which is unrecoverable.
#![allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::missing_panics_doc
)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use thiserror::Error;
use tracing::warn;

use super::record::{LedgerKind, LedgerRecord, NewEntry};
use crate::canonical::Value;
use crate::crypto::LinkHash;
use crate::evidence::EvidenceRecord;
use crate::identity::ActorId;

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Default bound on how long a blocked store call waits for the database.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from the persistent store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The underlying database failed or is unreachable. Retryable by the
    /// caller with bounded backoff.
    #[error("ledger store unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),

    /// Another appender extended the chain between the tail read and this
    /// write. The caller should re-read the tail and recompute.
    #[error("concurrent append conflict: {kind} chain for scope {scope_id:?} moved past the observed tail")]
    ConcurrentWriteConflict {
        /// Ledger whose chain moved.
        kind: LedgerKind,
        /// Scope whose chain moved.
        scope_id: String,
    },

    /// A stored row could not be decoded back into a [`LedgerRecord`].
    #[error("corrupt ledger row at seq_id={seq_id}: {details}")]
    Corrupt {
        /// Sequence number of the undecodable row.
        seq_id: u64,
        /// What failed to decode.
        details: String,
    },
}

/// Persistence interface the appender and verifier run against.
///
/// Implementations must make `append` atomic (the full entry or nothing) and
/// conditional on `entry.hash_prev` still being the scope's tail, and must
/// return chains in true append order.
pub trait LedgerStore {
    /// `hash_current` of the most recent entry for the chain, by append
    /// sequence. `None` means the chain is empty (genesis).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the store cannot be read.
    fn tail(&self, kind: LedgerKind, scope_id: &str) -> Result<Option<LinkHash>, StoreError>;

    /// Conditionally inserts a computed entry, returning its sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConcurrentWriteConflict`] if the chain moved
    /// past `entry.hash_prev`, or [`StoreError::Unavailable`] on I/O failure.
    fn append(&self, entry: &NewEntry) -> Result<u64, StoreError>;

    /// Inserts an evidence record and its custody entry as one unit of work:
    /// either both persist or neither does.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::append`]; a conflict aborts the evidence
    /// insert as well.
    fn append_with_evidence(
        &self,
        evidence: &EvidenceRecord,
        entry: &NewEntry,
    ) -> Result<u64, StoreError>;

    /// All entries for one chain, in append order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] on I/O failure or
    /// [`StoreError::Corrupt`] if a row cannot be decoded.
    fn list_chain(&self, kind: LedgerKind, scope_id: &str) -> Result<Vec<LedgerRecord>, StoreError>;
}

impl<T: LedgerStore + ?Sized> LedgerStore for &T {
    fn tail(&self, kind: LedgerKind, scope_id: &str) -> Result<Option<LinkHash>, StoreError> {
        (**self).tail(kind, scope_id)
    }

    fn append(&self, entry: &NewEntry) -> Result<u64, StoreError> {
        (**self).append(entry)
    }

    fn append_with_evidence(
        &self,
        evidence: &EvidenceRecord,
        entry: &NewEntry,
    ) -> Result<u64, StoreError> {
        (**self).append_with_evidence(evidence, entry)
    }

    fn list_chain(&self, kind: LedgerKind, scope_id: &str) -> Result<Vec<LedgerRecord>, StoreError> {
        (**self).list_chain(kind, scope_id)
    }
}

/// Statistics about a ledger database.
#[derive(Debug, Clone, Default)]
pub struct LedgerStats {
    /// Total ledger entries across both ledgers.
    pub entry_count: u64,
    /// Distinct (kind, scope) chains.
    pub chain_count: u64,
    /// Evidence records.
    pub evidence_count: u64,
    /// Highest sequence number (0 if empty).
    pub max_seq_id: u64,
    /// Database file size in bytes.
    pub db_size_bytes: u64,
}

/// The append-only ledger store backed by `SQLite`.
///
/// WAL mode allows concurrent readers while a write is in progress. The
/// connection sits behind a mutex; the busy timeout bounds how long a
/// blocked call waits before reporting [`StoreError::Unavailable`].
pub struct SqliteLedgerStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedgerStore {
    /// Opens or creates a ledger database at `path` with the default busy
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens or creates a ledger database with an explicit busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open_with_busy_timeout(
        path: impl AsRef<Path>,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::initialize_connection(&conn, busy_timeout)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory store, for tests and tooling.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_connection(&conn, DEFAULT_BUSY_TIMEOUT)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn initialize_connection(conn: &Connection, busy_timeout: Duration) -> Result<(), StoreError> {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Gathers database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the queries fail.
    pub fn stats(&self) -> Result<LedgerStats, StoreError> {
        let conn = self.conn.lock().unwrap();

        let entry_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM ledger_entries", [], |row| row.get(0))?;
        let chain_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM (SELECT DISTINCT kind, scope_id FROM ledger_entries)",
            [],
            |row| row.get(0),
        )?;
        let evidence_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM evidence", [], |row| row.get(0))?;
        let max_seq_id: Option<i64> =
            conn.query_row("SELECT MAX(seq_id) FROM ledger_entries", [], |row| {
                row.get(0)
            })?;

        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;

        Ok(LedgerStats {
            entry_count: entry_count as u64,
            chain_count: chain_count as u64,
            evidence_count: evidence_count as u64,
            max_seq_id: max_seq_id.unwrap_or(0) as u64,
            db_size_bytes: (page_count * page_size) as u64,
        })
    }

    /// Looks up an evidence record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_evidence(&self, evidence_id: &str) -> Result<Option<EvidenceRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let record = conn
            .query_row(
                "SELECT evidence_id, case_id, file_path, size_bytes, sha256_hash, uploaded_by, uploaded_at_ns
                 FROM evidence
                 WHERE evidence_id = ?1",
                params![evidence_id],
                |row| {
                    Ok(EvidenceRecord {
                        evidence_id: row.get(0)?,
                        case_id: row.get(1)?,
                        file_path: row.get(2)?,
                        size_bytes: row.get::<_, i64>(3)? as u64,
                        sha256_hash: row.get(4)?,
                        uploaded_by: ActorId::new(row.get::<_, String>(5)?),
                        uploaded_at_ns: row.get(6)?,
                    })
                },
            )
            .optional()?;

        Ok(record)
    }

    fn insert_entry(conn: &Connection, entry: &NewEntry) -> Result<u64, StoreError> {
        let result = conn.execute(
            "INSERT INTO ledger_entries
                 (kind, scope_id, actor_id, action, details, ip_address, timestamp_ns, hash_prev, hash_current)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.kind.as_str(),
                entry.scope_id,
                entry.actor_id.as_str(),
                entry.action,
                entry.details_json,
                entry.ip_address,
                entry.timestamp_ns,
                entry.hash_prev.to_hex(),
                entry.hash_current.to_hex(),
            ],
        );

        match result {
            Ok(_) => Ok(conn.last_insert_rowid() as u64),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                warn!(
                    kind = %entry.kind,
                    scope_id = %entry.scope_id,
                    "append lost the tail race, rejecting to prevent a fork"
                );
                Err(StoreError::ConcurrentWriteConflict {
                    kind: entry.kind,
                    scope_id: entry.scope_id.clone(),
                })
            },
            Err(e) => Err(StoreError::Unavailable(e)),
        }
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        Ok(RawRow {
            seq_id: row.get::<_, i64>(0)? as u64,
            kind: row.get(1)?,
            scope_id: row.get(2)?,
            actor_id: row.get(3)?,
            action: row.get(4)?,
            details: row.get(5)?,
            ip_address: row.get(6)?,
            timestamp_ns: row.get(7)?,
            hash_prev: row.get(8)?,
            hash_current: row.get(9)?,
        })
    }
}

/// A row as stored, before hash and payload decoding.
struct RawRow {
    seq_id: u64,
    kind: String,
    scope_id: String,
    actor_id: String,
    action: String,
    details: String,
    ip_address: Option<String>,
    timestamp_ns: i64,
    hash_prev: String,
    hash_current: String,
}

impl RawRow {
    fn decode(self) -> Result<LedgerRecord, StoreError> {
        let corrupt = |details: String| StoreError::Corrupt {
            seq_id: self.seq_id,
            details,
        };

        let kind = self
            .kind
            .parse::<LedgerKind>()
            .map_err(|e| corrupt(e.to_string()))?;
        let hash_prev = self
            .hash_prev
            .parse::<LinkHash>()
            .map_err(|e| corrupt(format!("hash_prev: {e}")))?;
        let hash_current = self
            .hash_current
            .parse::<LinkHash>()
            .map_err(|e| corrupt(format!("hash_current: {e}")))?;
        let details = Value::from_json_str(&self.details)
            .map_err(|e| corrupt(format!("details: {e}")))?;

        Ok(LedgerRecord {
            seq_id: self.seq_id,
            kind,
            scope_id: self.scope_id,
            actor_id: ActorId::new(self.actor_id),
            action: self.action,
            details,
            ip_address: self.ip_address,
            timestamp_ns: self.timestamp_ns,
            hash_prev,
            hash_current,
        })
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn tail(&self, kind: LedgerKind, scope_id: &str) -> Result<Option<LinkHash>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let hex: Option<String> = conn
            .query_row(
                "SELECT hash_current FROM ledger_entries
                 WHERE kind = ?1 AND scope_id = ?2
                 ORDER BY seq_id DESC
                 LIMIT 1",
                params![kind.as_str(), scope_id],
                |row| row.get(0),
            )
            .optional()?;

        hex.map(|h| {
            h.parse::<LinkHash>().map_err(|e| StoreError::Corrupt {
                seq_id: 0,
                details: format!("tail hash for {kind} scope {scope_id:?}: {e}"),
            })
        })
        .transpose()
    }

    fn append(&self, entry: &NewEntry) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::insert_entry(&conn, entry)
    }

    fn append_with_evidence(
        &self,
        evidence: &EvidenceRecord,
        entry: &NewEntry,
    ) -> Result<u64, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO evidence
                 (evidence_id, case_id, file_path, size_bytes, sha256_hash, uploaded_by, uploaded_at_ns)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                evidence.evidence_id,
                evidence.case_id,
                evidence.file_path,
                evidence.size_bytes as i64,
                evidence.sha256_hash,
                evidence.uploaded_by.as_str(),
                evidence.uploaded_at_ns,
            ],
        )?;

        let seq_id = Self::insert_entry(&tx, entry)?;
        tx.commit()?;
        Ok(seq_id)
    }

    fn list_chain(&self, kind: LedgerKind, scope_id: &str) -> Result<Vec<LedgerRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT seq_id, kind, scope_id, actor_id, action, details, ip_address, timestamp_ns, hash_prev, hash_current
             FROM ledger_entries
             WHERE kind = ?1 AND scope_id = ?2
             ORDER BY seq_id ASC",
        )?;

        let rows = stmt
            .query_map(params![kind.as_str(), scope_id], Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawRow::decode).collect()
    }
}
