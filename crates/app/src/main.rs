use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use costbook_import::Classifier;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod processors;

use config::AppConfig;

/// Landed cost allocation and settlement reconciliation.
#[derive(Parser, Debug)]
#[command(name = "costbook")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML config file (database URL, account classification)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse an Amazon unified transaction report and summarize settlements
    Csv {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Include every parsed row in the output
        #[arg(long)]
        rows: bool,
    },

    /// Turn QBO bills into inventory events and allocate PO costs across SKUs
    Bills {
        /// QBO bill query response (JSON)
        #[arg(long, value_name = "FILE")]
        bills: PathBuf,

        /// QBO account query response (JSON)
        #[arg(long, value_name = "FILE")]
        accounts: PathBuf,

        /// Recorded bill component mappings (JSON array)
        #[arg(long, value_name = "FILE")]
        mappings: Option<PathBuf>,
    },

    /// Split a cent total across KEY=WEIGHT pairs
    Allocate {
        #[arg(allow_negative_numbers = true)]
        total_cents: i64,

        #[arg(value_name = "KEY=WEIGHT", required = true)]
        weights: Vec<String>,
    },

    /// Value removed when UNITS of ON_HAND units leave inventory
    Remove {
        #[arg(long)]
        units: i64,

        #[arg(long)]
        on_hand: i64,

        #[arg(value_name = "COMPONENT=CENTS", required = true)]
        values: Vec<String>,
    },

    /// Load settlements and audit rows (JSON arrays) into the database
    Load {
        #[arg(long, value_name = "FILE")]
        settlements: Option<PathBuf>,

        #[arg(long, value_name = "FILE")]
        audit_rows: Option<PathBuf>,
    },

    /// Match unprocessed settlements to audit invoices and post them
    Autopost {
        /// Directory receiving one journal file per posted settlement.
        /// Without it the run is a dry run and nothing is recorded.
        #[arg(long, value_name = "DIR")]
        outbox: Option<PathBuf>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Csv { file, rows } => print_json(&commands::csv_report(&file, rows)?),
        Command::Bills {
            bills,
            accounts,
            mappings,
        } => {
            let classifier = Classifier::from(&config.classification);
            print_json(&commands::bills_report(
                &bills,
                &accounts,
                mappings.as_deref(),
                &classifier,
            )?)
        }
        Command::Allocate {
            total_cents,
            weights,
        } => print_json(&commands::allocate(total_cents, &weights)?),
        Command::Remove {
            units,
            on_hand,
            values,
        } => print_json(&commands::remove(units, on_hand, &values)?),
        Command::Load {
            settlements,
            audit_rows,
        } => {
            let pool = costbook_storage::connect(&config.database_url)
                .await
                .with_context(|| format!("failed to open {}", config.database_url))?;
            let (settlements, audit_rows) =
                commands::load(&pool, settlements.as_deref(), audit_rows.as_deref()).await?;
            print_json(&serde_json::json!({
                "settlements": settlements,
                "audit_rows": audit_rows,
            }))
        }
        Command::Autopost { outbox } => {
            let pool = costbook_storage::connect(&config.database_url)
                .await
                .with_context(|| format!("failed to open {}", config.database_url))?;
            print_json(&commands::autopost(pool, outbox.as_deref()).await?)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_allocate_with_negative_total() {
        let cli = Cli::try_parse_from(["costbook", "allocate", "-100", "A=1", "B=1"]).unwrap();
        match cli.command {
            Command::Allocate {
                total_cents,
                weights,
            } => {
                assert_eq!(total_cents, -100);
                assert_eq!(weights, vec!["A=1", "B=1"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_config_flag() {
        let cli = Cli::try_parse_from(["costbook", "autopost", "--config", "books.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("books.toml")));
        assert!(matches!(cli.command, Command::Autopost { outbox: None }));
    }
}
