use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pg_access::prelude::*;
use serde_json::Value;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Run one statement against PostgreSQL and print the result as JSON lines.
#[derive(Debug, Parser)]
#[command(name = "pg-access", version)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print each row as a JSON object
    Entries(StatementArgs),
    /// Print each row as a JSON array
    Array(StatementArgs),
    /// Run a statement and print the affected row count
    Exec(StatementArgs),
}

#[derive(Debug, clap::Args)]
struct StatementArgs {
    /// SQL text using `?` placeholders
    sql: String,

    /// Arguments as a JSON array, e.g. '[7, "alice"]'
    #[arg(long, default_value = "[]")]
    args: String,
}

impl StatementArgs {
    fn parse_args(&self) -> Result<Vec<RowValues>, AccessError> {
        let values: Vec<Value> = serde_json::from_str(&self.args)
            .map_err(|e| AccessError::Configuration(format!("--args is not a JSON array: {e}")))?;
        values.into_iter().map(RowValues::from_json).collect()
    }
}

fn run(cli: Cli) -> Result<(), AccessError> {
    let config = PoolConfig::try_from(cli.connection)?;
    let db = BlockingDatabase::connect(config)?;

    match cli.command {
        Command::Entries(stmt) => {
            for row in db.query_entries(&stmt.sql, &stmt.parse_args()?)? {
                println!("{}", to_json(&row)?);
            }
        }
        Command::Array(stmt) => {
            for row in db.query_array(&stmt.sql, &stmt.parse_args()?)? {
                println!("{}", to_json(&row)?);
            }
        }
        Command::Exec(stmt) => {
            let affected = db.execute_count(&stmt.sql, &stmt.parse_args()?)?;
            println!("{}", serde_json::json!({ "rows_affected": affected }));
        }
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AccessError> {
    serde_json::to_string(value).map_err(|e| AccessError::Execution(format!("json encoding: {e}")))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "pg-access failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
