//! custodia - tamper-evident audit and chain-of-custody ledger tool.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use custodia_core::config::CustodiaConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

/// custodia - tamper-evident audit and chain-of-custody ledger tool
#[derive(Parser, Debug)]
#[command(name = "custodia")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "custodia.toml")]
    config: PathBuf,

    /// Database path (overrides the configured path)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Acting principal (otherwise resolved from the environment)
    #[arg(long)]
    actor: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append an entry to a case's activity log
    Log {
        /// Case identifier
        case_id: String,

        /// Action label, e.g. "Case Opened"
        action: String,

        /// Structured details as a JSON object
        #[arg(long)]
        details: Option<String>,

        /// Source address to record with the entry
        #[arg(long)]
        ip: Option<String>,
    },

    /// Append an entry to an evidence item's chain of custody
    Custody {
        /// Evidence identifier
        evidence_id: String,

        /// Action label, e.g. "Evidence Accessed"
        action: String,

        /// Structured details as a JSON object
        #[arg(long)]
        details: Option<String>,
    },

    /// Take an evidence file into custody
    Intake {
        /// Owning case
        case_id: String,

        /// Path to the evidence file
        file: PathBuf,

        /// Evidence identifier (generated if omitted)
        #[arg(long)]
        evidence_id: Option<String>,

        /// Source address to record with the entry
        #[arg(long)]
        ip: Option<String>,
    },

    /// Replay a chain and report the first break, if any
    Verify {
        /// Ledger kind (activity_log or chain_of_custody)
        kind: String,

        /// Case or evidence identifier
        scope_id: String,
    },

    /// Print a chain's entries
    Show {
        /// Ledger kind (activity_log or chain_of_custody)
        kind: String,

        /// Case or evidence identifier
        scope_id: String,

        /// Emit one JSON object per entry
        #[arg(long)]
        json: bool,
    },

    /// Print store statistics
    Stats,

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Commands::InitConfig { force } = &cli.command {
        return commands::init_config(&cli.config, *force);
    }

    let config = if cli.config.exists() {
        CustodiaConfig::from_file(&cli.config)?
    } else {
        CustodiaConfig::default()
    };
    let ctx = commands::CliContext::open(&config, cli.db.as_deref(), cli.actor.as_deref())?;

    match cli.command {
        Commands::Log {
            case_id,
            action,
            details,
            ip,
        } => commands::log::run(&ctx, &case_id, &action, details.as_deref(), ip.as_deref()),
        Commands::Custody {
            evidence_id,
            action,
            details,
        } => commands::custody::run(&ctx, &evidence_id, &action, details.as_deref()),
        Commands::Intake {
            case_id,
            file,
            evidence_id,
            ip,
        } => commands::intake::run(&ctx, &case_id, &file, evidence_id.as_deref(), ip.as_deref()),
        Commands::Verify { kind, scope_id } => commands::verify::run(&ctx, &kind, &scope_id),
        Commands::Show {
            kind,
            scope_id,
            json,
        } => commands::show::run(&ctx, &kind, &scope_id, json),
        Commands::Stats => commands::stats::run(&ctx),
        Commands::InitConfig { .. } => unreachable!("handled before store open"),
    }
}
