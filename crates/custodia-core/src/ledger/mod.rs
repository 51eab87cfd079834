//! Hash-chained ledgers: records, persistent store, appender, verifier.
//!
//! Two ledgers share this machinery, distinguished by [`LedgerKind`]:
//!
//! - the **activity log**, partitioned per case;
//! - the **chain of custody**, partitioned per evidence item.
//!
//! Each scope owns exactly one chain. The [`Ledger`] appender extends a
//! chain by one entry (read tail, hash, conditional insert); the verifier
//! replays a chain from genesis and reports the first break, if any, as a
//! value rather than an error.
//!
//! # Example
//!
//! ```rust
//! use custodia_core::canonical::Value;
//! use custodia_core::identity::{StaticIdentity, SystemClock};
//! use custodia_core::ledger::{Ledger, LedgerKind, SqliteLedgerStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteLedgerStore::in_memory()?;
//! let ledger = Ledger::new(store, StaticIdentity::new("admin-1"), SystemClock);
//!
//! let entry = ledger.record_custody_event(
//!     "evidence-17",
//!     "Evidence Sealed",
//!     Value::map([("bag_no", Value::int(204))]),
//! )?;
//! assert!(entry.hash_prev.is_genesis());
//!
//! let result = ledger.verify_chain(LedgerKind::ChainOfCustody, "evidence-17")?;
//! assert!(result.is_valid());
//! # Ok(())
//! # }
//! ```

mod appender;
mod record;
mod store;
mod verify;

pub use appender::{AppendError, Ledger};
pub use record::{EntryContent, LedgerKind, LedgerRecord, NewEntry, ParseKindError};
pub use store::{LedgerStats, LedgerStore, SqliteLedgerStore, StoreError};
pub use verify::{verify_entries, BreakReason, VerificationResult};
