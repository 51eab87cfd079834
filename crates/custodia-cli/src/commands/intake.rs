//! Take an evidence file into custody.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use custodia_core::evidence::{sha256_hex, EvidenceIntake};
use uuid::Uuid;

use super::CliContext;

pub fn run(
    ctx: &CliContext,
    case_id: &str,
    file: &Path,
    evidence_id: Option<&str>,
    ip: Option<&str>,
) -> Result<()> {
    let handle =
        File::open(file).with_context(|| format!("failed to open {}", file.display()))?;
    let size_bytes = handle
        .metadata()
        .with_context(|| format!("failed to stat {}", file.display()))?
        .len();
    let sha256_hash =
        sha256_hex(&handle).with_context(|| format!("failed to digest {}", file.display()))?;

    let evidence_id = evidence_id.map_or_else(
        || format!("ev-{}", Uuid::new_v4()),
        ToString::to_string,
    );

    let receipt = ctx.with_retry(|| {
        ctx.ledger.intake_evidence(EvidenceIntake {
            evidence_id: evidence_id.clone(),
            case_id: case_id.to_string(),
            file_path: file.display().to_string(),
            size_bytes,
            sha256_hash: sha256_hash.clone(),
            ip_address: ip.map(ToString::to_string),
        })
    })?;

    println!("evidence {} taken into custody", receipt.evidence.evidence_id);
    println!("  case:    {case_id}");
    println!("  sha256:  {}", receipt.evidence.sha256_hash);
    println!("  size:    {size_bytes} bytes");
    println!("  custody: entry {}", receipt.custody_entry.seq_id);
    match receipt.activity_entry {
        Some(entry) => println!("  log:     entry {}", entry.seq_id),
        None => println!("  log:     not recorded (see warnings)"),
    }
    Ok(())
}
