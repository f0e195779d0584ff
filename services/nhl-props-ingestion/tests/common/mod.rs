//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use nhl_props_ingestion::{Config, NormalizedRow, RowSink, WarehouseError};
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;
use wiremock::MockServer;

pub const SEED_PATH: &str = "/sports/icehockey_nhl/odds";

pub fn event_path(event_id: &str) -> String {
    format!("/sports/icehockey_nhl/events/{}/odds", event_id)
}

/// Config pointed at the mock server, with no sleeping between attempts.
pub fn test_config(server: &MockServer) -> Config {
    let mut config = Config::new("test-key", "postgres://unused/odds").expect("valid config");
    config.api_host = server.uri();
    config.retry_backoff_step = Duration::ZERO;
    config.event_call_delay = Duration::ZERO;
    config
}

pub fn seed_event(id: &str) -> Value {
    json!({
        "id": id,
        "sport_key": "icehockey_nhl",
        "sport_title": "NHL",
        "commence_time": "2025-01-16T00:07:00Z",
        "home_team": "Edmonton Oilers",
        "away_team": "Calgary Flames",
        "bookmakers": [{
            "key": "draftkings",
            "title": "DraftKings",
            "last_update": "2025-01-15T15:58:12Z",
            "markets": [{"key": "h2h", "outcomes": [
                {"name": "Edmonton Oilers", "price": -180},
                {"name": "Calgary Flames", "price": 150},
            ]}],
        }],
    })
}

/// Event detail payload: one allowed book with an O/U pair, one unknown book.
pub fn props_payload(id: &str) -> Value {
    json!({
        "id": id,
        "sport_key": "icehockey_nhl",
        "commence_time": "2025-01-16T00:07:00Z",
        "home_team": "Edmonton Oilers",
        "away_team": "Calgary Flames",
        "bookmakers": [
            {
                "key": "fanduel",
                "title": "FanDuel",
                "last_update": "2025-01-15T15:59:01Z",
                "markets": [{
                    "key": "player_shots_on_goal_alternate",
                    "last_update": "2025-01-15T15:59:00Z",
                    "outcomes": [
                        {"name": "Over", "description": "Connor McDavid", "price": -135, "point": 3.5},
                        {"name": "Under", "description": "Connor McDavid", "price": 105, "point": 3.5},
                    ],
                }],
            },
            {
                "key": "mystery",
                "title": "Unknown Book",
                "markets": [{
                    "key": "player_points",
                    "outcomes": [{"name": "Over", "description": "Leon Draisaitl", "price": -120, "point": 1.5}],
                }],
            },
        ],
    })
}

/// In-memory sink that records every appended batch.
#[derive(Default)]
pub struct MemorySink {
    pub batches: Mutex<Vec<Vec<NormalizedRow>>>,
}

impl MemorySink {
    pub fn rows(&self) -> Vec<NormalizedRow> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl RowSink for MemorySink {
    async fn ensure_table(&self) -> Result<(), WarehouseError> {
        Ok(())
    }

    async fn append(&self, rows: &[NormalizedRow]) -> Result<u64, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.batches.lock().unwrap().push(rows.to_vec());
        Ok(rows.len() as u64)
    }
}

/// Sink whose loads always fail.
pub struct FailingSink;

#[async_trait]
impl RowSink for FailingSink {
    async fn ensure_table(&self) -> Result<(), WarehouseError> {
        Ok(())
    }

    async fn append(&self, _rows: &[NormalizedRow]) -> Result<u64, WarehouseError> {
        Err(WarehouseError::Query(sqlx::Error::PoolTimedOut))
    }
}
