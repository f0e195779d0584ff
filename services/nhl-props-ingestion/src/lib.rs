//! NHL player prop odds ingestion.
//!
//! Polls The Odds API for NHL player proposition markets, flattens each
//! event's bookmaker/market/outcome tree into one row per outcome, and appends
//! the rows to a warehouse table for historical tracking.

pub mod config;
pub mod normalize;
pub mod odds_api;
pub mod pipeline;
pub mod warehouse;

pub use config::{Config, ConfigError, TableRef};
pub use normalize::{
    base_market_key, classify_outcome, flatten_event, is_alternate, parse_timestamp,
    resolve_player, NormalizedRow, OutcomeSide,
};
pub use odds_api::{
    Attempt, FailureKind, FetchError, OddsApiClient, RawBookmaker, RawEvent, RawMarket, RawOutcome,
};
pub use pipeline::{run, EventFailure, RunReport};
pub use warehouse::{PostgresWarehouse, RowSink, WarehouseError};
