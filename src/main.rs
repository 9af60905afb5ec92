//! pgrecord - Main entry point.
//!
//! Runs one query inside a session and prints the result as JSON on stdout.
//! Logs go to stderr.

use clap::Parser;
use pgrecord::config::{Config, Mode};
use pgrecord::context::create_session;
use pgrecord::{Client, DbResult, Query, Row};
use serde_json::Value as JsonValue;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run_mode(client: &mut Client, mode: Mode, query: Query) -> DbResult<Option<JsonValue>> {
    let output = match mode {
        Mode::Get => {
            let row: Row = client.get(query).await?;
            Some(JsonValue::Object(row))
        }
        Mode::Find => {
            let row: Option<Row> = client.find(query).await?;
            Some(row.map(JsonValue::Object).unwrap_or(JsonValue::Null))
        }
        Mode::Select => {
            let rows: Vec<Row> = client.select(query).await?;
            Some(JsonValue::Array(
                rows.into_iter().map(JsonValue::Object).collect(),
            ))
        }
        Mode::Execute => {
            client.execute(query).await?;
            None
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    let credentials = config.credentials()?;
    info!(
        credentials = ?credentials,
        mode = %config.mode,
        "Starting pgrecord v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut client = Client::new(credentials).with_timeout(config.timeout_duration());
    let mode = config.mode;
    let query = config.query();

    let result = create_session(
        &mut client,
        config.schema.as_deref(),
        async move |client: &mut Client| run_mode(client, mode, query).await,
    )
    .await;

    match result {
        Ok(Some(value)) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Ok(None) => {
            info!("Statement executed");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, sql_state = ?e.sql_state(), "Query failed");
            Err(e.into())
        }
    }
}
