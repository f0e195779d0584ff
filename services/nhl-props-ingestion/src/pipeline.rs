//! One ingestion pass: seed events, then fetch → flatten → append per event.

use crate::config::Config;
use crate::normalize::flatten_event;
use crate::odds_api::{FetchError, OddsApiClient, RawEvent};
use crate::warehouse::{RowSink, WarehouseError};
use anyhow::{Context, Result};
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

/// An event that was skipped, and why
#[derive(Debug, Clone, PartialEq)]
pub struct EventFailure {
    pub event_id: Option<String>,
    pub reason: String,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub events_seen: usize,
    pub events_loaded: usize,
    pub rows_uploaded: u64,
    pub failures: Vec<EventFailure>,
}

#[derive(Debug, Error)]
enum EventError {
    #[error("event has no id")]
    MissingId,

    #[error("props fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Load(#[from] WarehouseError),
}

/// Process every seeded event in order.
///
/// Per-event fetch problems are recorded in the report and skipped; a seed
/// failure or any warehouse failure ends the run with an error.
pub async fn run(config: &Config, client: &OddsApiClient, sink: &dyn RowSink) -> Result<RunReport> {
    let events = client
        .fetch_seed_events()
        .await
        .context("Failed to seed events")?;
    info!("Events: {}", events.len());

    let markets = config.player_markets();

    let mut report = RunReport {
        events_seen: events.len(),
        ..Default::default()
    };

    for event in events {
        let event_id = event.id.clone();

        let result = ingest_event(config, client, sink, &markets, event).await;

        // API courtesy gap after every event, loaded or not
        tokio::time::sleep(config.event_call_delay).await;

        match result {
            Ok(rows) => {
                report.events_loaded += 1;
                report.rows_uploaded += rows;
            }
            Err(EventError::Load(e)) => {
                return Err(e).with_context(|| {
                    format!(
                        "Warehouse load failed for event {}",
                        event_id.as_deref().unwrap_or("?")
                    )
                });
            }
            Err(e) => {
                warn!(
                    "Skipping event {}: {}",
                    event_id.as_deref().unwrap_or("?"),
                    e
                );
                report.failures.push(EventFailure {
                    event_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        "Done. Rows uploaded: {} ({}/{} events loaded, {} skipped)",
        report.rows_uploaded,
        report.events_loaded,
        report.events_seen,
        report.failures.len()
    );
    for failure in &report.failures {
        warn!(
            "  failed {}: {}",
            failure.event_id.as_deref().unwrap_or("?"),
            failure.reason
        );
    }

    Ok(report)
}

async fn ingest_event(
    config: &Config,
    client: &OddsApiClient,
    sink: &dyn RowSink,
    markets: &[String],
    event: RawEvent,
) -> Result<u64, EventError> {
    let event_id = event
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or(EventError::MissingId)?;

    let props = client.fetch_event_props(&event_id, markets).await?;
    let event = event.with_bookmakers(props.bookmakers);

    let rows = flatten_event(&event, config, Utc::now());
    Ok(sink.append(&rows).await?)
}
