//! Print a chain's entries.

use anyhow::{Context, Result};
use chrono::DateTime;
use custodia_core::ledger::LedgerStore;

use super::{parse_kind, CliContext};

pub fn run(ctx: &CliContext, kind: &str, scope_id: &str, json: bool) -> Result<()> {
    let kind = parse_kind(kind)?;
    let entries = ctx.ledger.store().list_chain(kind, scope_id)?;

    if json {
        for entry in &entries {
            let line = serde_json::to_string(entry).context("failed to render entry")?;
            println!("{line}");
        }
        return Ok(());
    }

    if entries.is_empty() {
        println!("no entries for {kind} {scope_id}");
        return Ok(());
    }
    for entry in &entries {
        let when = DateTime::from_timestamp_nanos(entry.timestamp_ns).to_rfc3339();
        println!(
            "{:>6}  {}  {:<12}  {}",
            entry.seq_id, when, entry.actor_id, entry.action
        );
    }
    Ok(())
}
