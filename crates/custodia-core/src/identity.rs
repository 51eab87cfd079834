//! Actor resolution and clock seams.
//!
//! The ledger never invents an actor: every append resolves the current
//! principal through an [`IdentityProvider`], freshly per call, and fails
//! closed when none is available. Time comes from a [`Clock`] so tests can
//! pin timestamps.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Wraps an identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Resolves the currently authenticated actor.
///
/// Implementations must resolve freshly on every call: principals can log
/// out between operations, and a cached identity would attribute entries to
/// the wrong actor.
pub trait IdentityProvider {
    /// The current actor, or `None` when nobody is authenticated.
    fn current_actor(&self) -> Option<ActorId>;
}

impl<T: IdentityProvider + ?Sized> IdentityProvider for Box<T> {
    fn current_actor(&self) -> Option<ActorId> {
        (**self).current_actor()
    }
}

impl<T: IdentityProvider + ?Sized> IdentityProvider for &T {
    fn current_actor(&self) -> Option<ActorId> {
        (**self).current_actor()
    }
}

/// A fixed identity, for tooling that authenticated out of band and for
/// tests.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    actor: Option<ActorId>,
}

impl StaticIdentity {
    /// An identity that always resolves to `actor`.
    #[must_use]
    pub fn new(actor: impl Into<ActorId>) -> Self {
        Self {
            actor: Some(actor.into()),
        }
    }

    /// An identity that never resolves; appends through it fail closed.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { actor: None }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_actor(&self) -> Option<ActorId> {
        self.actor.clone()
    }
}

/// Resolves the actor from an environment variable, read on every call.
#[derive(Debug, Clone)]
pub struct EnvIdentity {
    var: String,
}

impl EnvIdentity {
    /// Reads the actor id from `var`.
    #[must_use]
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl IdentityProvider for EnvIdentity {
    fn current_actor(&self) -> Option<ActorId> {
        match std::env::var(&self.var) {
            Ok(v) if !v.trim().is_empty() => Some(ActorId::new(v.trim())),
            _ => None,
        }
    }
}

/// Source of append timestamps, in nanoseconds since the Unix epoch.
pub trait Clock {
    /// Current time. Monotonic enough for within-process ordering; the
    /// store-assigned sequence number, not this value, is authoritative for
    /// verification order.
    fn now_ns(&self) -> i64;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ns(&self) -> i64 {
        (**self).now_ns()
    }
}

/// Wall-clock time via `chrono`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> i64 {
        // Overflows in 2262; clamp rather than panic.
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
    }
}

/// A pinned clock for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_ns(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_identity_resolves() {
        assert_eq!(
            StaticIdentity::new("analyst-1").current_actor(),
            Some(ActorId::new("analyst-1"))
        );
        assert_eq!(StaticIdentity::anonymous().current_actor(), None);
    }

    #[test]
    fn env_identity_reads_fresh_per_call() {
        let var = "CUSTODIA_TEST_ACTOR_FRESH";
        let identity = EnvIdentity::new(var);

        std::env::remove_var(var);
        assert_eq!(identity.current_actor(), None);

        std::env::set_var(var, "officer-9");
        assert_eq!(identity.current_actor(), Some(ActorId::new("officer-9")));

        // A logout between appends must be observed.
        std::env::remove_var(var);
        assert_eq!(identity.current_actor(), None);
    }

    #[test]
    fn env_identity_ignores_blank_values() {
        let var = "CUSTODIA_TEST_ACTOR_BLANK";
        std::env::set_var(var, "   ");
        assert_eq!(EnvIdentity::new(var).current_actor(), None);
        std::env::remove_var(var);
    }

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock;
        assert!(clock.now_ns() > 0);
    }

    #[test]
    fn fixed_clock_is_pinned() {
        assert_eq!(FixedClock(42).now_ns(), 42);
    }
}
