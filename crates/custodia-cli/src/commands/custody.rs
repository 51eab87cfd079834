//! Append to an evidence item's chain of custody.

use anyhow::Result;

use super::{parse_details, CliContext};

pub fn run(
    ctx: &CliContext,
    evidence_id: &str,
    action: &str,
    details: Option<&str>,
) -> Result<()> {
    let details = parse_details(details)?;

    let entry = ctx.with_retry(|| {
        ctx.ledger
            .record_custody_event(evidence_id, action, details.clone())
    })?;

    println!(
        "appended custody entry {} for evidence {} ({})",
        entry.seq_id, evidence_id, entry.hash_current
    );
    Ok(())
}
