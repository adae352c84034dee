use std::{fs::File, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use wallet_ledger::{
    ErrorKind, InMemoryStore, LedgerEngine, LedgerStore, SqliteStore,
    bin_utils::{Report, Service},
};

/// Applies a CSV batch of wallet commands and prints the resulting balances.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// CSV file with `command,user,counterparty,amount,description` rows
    input: PathBuf,
    /// Keep wallets and their ledgers in this SQLite database instead of memory
    #[arg(long)]
    database: Option<PathBuf>,
    /// Print the transaction history of this user instead of balances
    #[arg(long)]
    history: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let file = File::open(&args.input)
        .with_context(|| format!("Failed to open `{}`", args.input.display()))?;
    let report = match args.history {
        Some(user_id) => Report::History { user_id },
        None => Report::Balances,
    };

    match &args.database {
        Some(path) => {
            let store = SqliteStore::open(path)
                .with_context(|| format!("Failed to open database `{}`", path.display()))?;
            run(LedgerEngine::new(store), file, report)
        }
        None => run(LedgerEngine::new(InMemoryStore::new()), file, report),
    }
}

fn run<S: LedgerStore>(engine: LedgerEngine<S>, input: File, report: Report) -> Result<()> {
    let service = Service {
        input,
        output: &mut std::io::stdout(),
        engine,
        report,
        error_printer: Box::new(|line, err| match err.kind() {
            ErrorKind::InvalidInput | ErrorKind::Storage => {
                eprintln!("Error at line {line}: {err}")
            }
            // rejected by the ledger rules, not a problem with the input itself
            _ => tracing::warn!(line, %err, "command rejected"),
        }),
    };
    service.run()
}
