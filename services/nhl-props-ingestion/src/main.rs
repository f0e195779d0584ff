//! NHL Player Props Ingestion v1.0
//!
//! Batch job: one pass over upcoming NHL events, pulling player prop markets
//! (core + alternates) from The Odds API and appending them to the warehouse.
//!
//! Exit codes: 0 on completion (individual event failures are logged and
//! skipped), 130 on interrupt, non-zero on any fatal error.

use anyhow::{Context, Result};
use nhl_props_ingestion::{pipeline, Config, OddsApiClient, PostgresWarehouse, RowSink, RunReport};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

const INTERRUPTED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    // Local runs may keep credentials in .env; container jobs use secrets
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nhl_props_ingestion=info".parse()?),
        )
        .init();

    info!("NHL player props (core + alternates) -> warehouse (append-only)");

    let run_id = Uuid::new_v4();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tokio::select! {
        result = ingest().instrument(info_span!("run", %run_id)) => {
            match result {
                Ok(report) => {
                    info!(
                        "Run {} complete: {} rows from {} events",
                        run_id, report.rows_uploaded, report.events_loaded
                    );
                    Ok(())
                }
                Err(e) => {
                    error!("Run {} failed: {:?}", run_id, e);
                    Err(e)
                }
            }
        }
        _ = &mut ctrl_c => {
            info!("Interrupted, exiting");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    }
}

async fn ingest() -> Result<RunReport> {
    let config = Config::from_env().context("Failed to load configuration")?;

    let warehouse = PostgresWarehouse::connect(&config).await?;
    warehouse
        .ensure_table()
        .await
        .context("Failed to ensure warehouse table")?;

    let client = OddsApiClient::new(&config)?;

    pipeline::run(&config, &client, &warehouse).await
}
