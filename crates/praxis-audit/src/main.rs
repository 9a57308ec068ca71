//! Offline audit CLI for praxis ledger chains.
//!
//! The ledger is tamper-evident, not tamper-proof: detection happens by
//! replay. This binary is the on-demand invocation surface for the chain
//! validator, plus a statistics view of the ledger and its outbox.
//!
//! ```text
//! praxis-audit validate --db praxis.db application 7f9c...
//! praxis-audit stats --db praxis.db
//! ```
//!
//! `validate` prints the full per-event report as JSON and exits non-zero if
//! the chain fails verification, so it can gate scheduled compliance jobs.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use praxis_core::ledger::{self, ChainValidator, EntityType};
use praxis_core::store::Database;

#[derive(Parser)]
#[command(name = "praxis-audit", version, about = "Audit praxis ledger chains")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay an entity's event chain and verify its integrity.
    Validate {
        /// Path to the placement database.
        #[arg(long)]
        db: PathBuf,

        /// Entity type tag: opportunity, application, or evidence.
        entity_type: String,

        /// Entity id.
        entity_id: String,
    },

    /// Print ledger and outbox statistics.
    Stats {
        /// Path to the placement database.
        #[arg(long)]
        db: PathBuf,
    },
}

fn open_database(path: &Path) -> anyhow::Result<Database> {
    Database::open(path).with_context(|| format!("failed to open database at {}", path.display()))
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate {
            db,
            entity_type,
            entity_id,
        } => {
            let database = open_database(&db)?;
            let entity_type = EntityType::parse(&entity_type)?;
            let report = ChainValidator::new(database).validate_chain(entity_type, &entity_id)?;

            println!("{}", serde_json::to_string_pretty(&report)?);

            if report.is_valid {
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!(
                    "chain corruption detected: {entity_type} {entity_id} failed verification"
                );
                Ok(ExitCode::FAILURE)
            }
        },
        Command::Stats { db } => {
            let database = open_database(&db)?;
            let stats = ledger::stats(&database)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(ExitCode::SUCCESS)
        },
    }
}
