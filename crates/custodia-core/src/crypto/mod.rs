//! SHA-256 link hashing for the ledger chains.

mod hash;

pub use hash::{hash_link, hash_value, HashInputError, LinkHash, ParseHashError, HASH_SIZE};
