//! sluice - run one SQL statement through a connection pool.
//!
//! Rows are printed to stdout as JSON lines; statements print their
//! status string.

use sluice::config::Config;
use sluice::{DbError, DbResult, Record, create_pool};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays machine readable
    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

/// Print records as JSON lines.
fn print_records(records: &[Record]) -> DbResult<()> {
    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|e| DbError::internal(format!("Failed to encode record: {e}")))?;
        println!("{line}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();
    init_tracing(&config);

    let (dsn, options) = config.resolve_pool()?;
    let params = config.parsed_params();

    info!(
        params = params.len(),
        "Starting sluice v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool = create_pool(&dsn, options).await?;

    let result = if config.execute {
        pool.execute(&config.sql, &params)
            .await
            .map(|status| println!("{status}"))
    } else {
        match pool.fetch(&config.sql, &params).await {
            Ok(records) => print_records(&records)
                .inspect(|_| info!(rows = records.len(), "Query complete")),
            Err(e) => Err(e),
        }
    };

    pool.close().await;

    if let Err(e) = result {
        error!(error = %e, "Statement failed");
        if let Some(suggestion) = e.suggestion() {
            eprintln!("hint: {suggestion}");
        }
        return Err(e.into());
    }
    Ok(())
}
