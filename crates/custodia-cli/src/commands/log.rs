//! Append to a case's activity log.

use anyhow::Result;

use super::{parse_details, CliContext};

pub fn run(
    ctx: &CliContext,
    case_id: &str,
    action: &str,
    details: Option<&str>,
    ip: Option<&str>,
) -> Result<()> {
    let details = parse_details(details)?;

    let entry = ctx.with_retry(|| match ip {
        Some(ip) => ctx
            .ledger
            .record_activity_from(case_id, action, details.clone(), ip),
        None => ctx.ledger.record_activity(case_id, action, details.clone()),
    })?;

    println!(
        "appended activity entry {} to case {} ({})",
        entry.seq_id, case_id, entry.hash_current
    );
    Ok(())
}
