//! Replay a chain and report the first break.

use anyhow::{bail, Result};
use custodia_core::ledger::VerificationResult;

use super::{parse_kind, CliContext};

pub fn run(ctx: &CliContext, kind: &str, scope_id: &str) -> Result<()> {
    let kind = parse_kind(kind)?;
    let result = ctx.ledger.verify_chain(kind, scope_id)?;

    println!("{kind} {scope_id}: {result}");
    if let VerificationResult::Broken { at_index, reason } = result {
        bail!("chain broken at entry {at_index}: {reason}");
    }
    Ok(())
}
