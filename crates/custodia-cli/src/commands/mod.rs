//! Command implementations.

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use custodia_core::canonical::Value;
use custodia_core::config::{AppendConfig, CustodiaConfig};
use custodia_core::identity::{EnvIdentity, IdentityProvider, StaticIdentity, SystemClock};
use custodia_core::ledger::{AppendError, Ledger, LedgerKind, SqliteLedgerStore};
use tracing::debug;

pub mod custody;
pub mod intake;
pub mod log;
pub mod show;
pub mod stats;
pub mod verify;

/// Everything a command needs: an opened ledger and the retry policy.
pub struct CliContext {
    pub ledger: Ledger<SqliteLedgerStore, Box<dyn IdentityProvider>, SystemClock>,
    pub append: AppendConfig,
}

impl CliContext {
    /// Opens the store and wires the identity provider.
    ///
    /// `--actor` pins the principal for this invocation; otherwise it is
    /// read from the configured environment variable on every append.
    pub fn open(
        config: &CustodiaConfig,
        db_override: Option<&Path>,
        actor_override: Option<&str>,
    ) -> Result<Self> {
        let db_path = db_override.unwrap_or(&config.store.path);
        let store = SqliteLedgerStore::open_with_busy_timeout(db_path, config.store.busy_timeout())
            .with_context(|| format!("failed to open ledger database {}", db_path.display()))?;

        let identity: Box<dyn IdentityProvider> = match actor_override {
            Some(actor) => Box::new(StaticIdentity::new(actor)),
            None => Box::new(EnvIdentity::new(&config.identity.actor_env)),
        };

        Ok(Self {
            ledger: Ledger::new(store, identity, SystemClock),
            append: config.append.clone(),
        })
    }

    /// Runs `op`, retrying lost tail races with doubling backoff.
    ///
    /// Each retry re-invokes `op` from the top so the appender re-reads the
    /// chain tail.
    pub fn with_retry<T>(
        &self,
        op: impl Fn() -> Result<T, AppendError>,
    ) -> Result<T, AppendError> {
        let mut attempt = 0u32;
        loop {
            match op() {
                Err(err) if err.is_retryable() && attempt < self.append.max_retries => {
                    let shift = attempt.min(10);
                    let backoff =
                        Duration::from_millis(self.append.backoff_ms.saturating_mul(1 << shift));
                    debug!(attempt, ?backoff, error = %err, "append retry");
                    thread::sleep(backoff);
                    attempt += 1;
                },
                other => return other,
            }
        }
    }
}

/// Parses `--details` into the canonical value model.
///
/// Absent details become an empty object so every entry hashes a payload.
pub fn parse_details(details: Option<&str>) -> Result<Value> {
    match details {
        Some(text) => Value::from_json_str(text).context("invalid --details JSON"),
        None => Ok(Value::empty_map()),
    }
}

/// Parses a ledger kind argument.
pub fn parse_kind(kind: &str) -> Result<LedgerKind> {
    kind.parse()
        .context("expected 'activity_log' or 'chain_of_custody'")
}

/// Writes a default configuration file.
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let rendered = CustodiaConfig::default().to_toml()?;
    std::fs::write(path, rendered)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}
