//! Custodia core: tamper-evident audit and chain-of-custody ledgers.
//!
//! Two parallel ledgers share one design: a per-case **activity log** and a
//! per-evidence-item **chain of custody**. Each is an independent hash chain:
//! every entry binds the previous entry's digest together with its own
//! canonical content, so any retroactive edit, deletion, or reordering of a
//! past entry is detectable by replaying the chain.
//!
//! The crate is organized leaf-first:
//!
//! - [`canonical`]: closed value model and deterministic byte encoding used
//!   as hash input.
//! - [`crypto`]: SHA-256 link hashing and the genesis sentinel.
//! - [`ledger`]: records, the SQLite-backed store, the appender, and the
//!   verifier.
//! - [`identity`]: actor resolution and clock seams.
//! - [`evidence`]: hardened evidence intake (evidence row and custody entry
//!   committed as one unit of work).
//! - [`config`]: TOML configuration for operator tooling.
//!
//! # Example
//!
//! ```rust
//! use custodia_core::canonical::Value;
//! use custodia_core::identity::{StaticIdentity, SystemClock};
//! use custodia_core::ledger::{Ledger, SqliteLedgerStore, VerificationResult};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteLedgerStore::in_memory()?;
//! let ledger = Ledger::new(store, StaticIdentity::new("analyst-7"), SystemClock);
//!
//! ledger.record_activity("case-42", "Case Opened", Value::empty_map())?;
//! let result = ledger.verify_activity_chain("case-42")?;
//! assert!(matches!(result, VerificationResult::Valid { entries: 1 }));
//! # Ok(())
//! # }
//! ```

pub mod canonical;
pub mod config;
pub mod crypto;
pub mod evidence;
pub mod identity;
pub mod ledger;

pub use canonical::{EncodingError, Value};
pub use crypto::{HashInputError, LinkHash};
pub use evidence::{EvidenceIntake, EvidenceRecord, IntakeReceipt};
pub use identity::{ActorId, Clock, IdentityProvider};
pub use ledger::{
    AppendError, BreakReason, Ledger, LedgerKind, LedgerRecord, LedgerStore, SqliteLedgerStore,
    StoreError, VerificationResult,
};
