//! Print store statistics.

use anyhow::Result;

use super::CliContext;

pub fn run(ctx: &CliContext) -> Result<()> {
    let stats = ctx.ledger.store().stats()?;
    println!("entries:   {}", stats.entry_count);
    println!("chains:    {}", stats.chain_count);
    println!("evidence:  {}", stats.evidence_count);
    println!("max seq:   {}", stats.max_seq_id);
    println!("db size:   {} bytes", stats.db_size_bytes);
    Ok(())
}
