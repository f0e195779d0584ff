//! The Odds API v4 client.
//!
//! Two read endpoints are used: the bulk sport odds list (to seed event ids)
//! and the per-event odds endpoint (to pull the player markets). Wire types
//! are deserialized leniently so one malformed field never sinks an event.

use crate::config::Config;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const WARN_BODY_CHARS: usize = 300;
const ERROR_BODY_CHARS: usize = 500;

/// Event as returned by either endpoint. The per-event endpoint carries the
/// same envelope with the requested markets under `bookmakers`.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct RawEvent {
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub sport_key: Option<String>,
    /// ISO-8601, normally `Z`-suffixed
    #[serde(default, deserialize_with = "lenient_text")]
    pub commence_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub home_team: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub away_team: Option<String>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub bookmakers: Vec<RawBookmaker>,
}

impl RawEvent {
    /// Replace the seed bookmakers with those from the event detail payload.
    pub fn with_bookmakers(self, bookmakers: Vec<RawBookmaker>) -> Self {
        Self { bookmakers, ..self }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct RawBookmaker {
    #[serde(default, deserialize_with = "lenient_text")]
    pub key: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub last_update: Option<String>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub markets: Vec<RawMarket>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct RawMarket {
    #[serde(default, deserialize_with = "lenient_text")]
    pub key: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub last_update: Option<String>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub outcomes: Vec<RawOutcome>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct RawOutcome {
    /// Over/Under/Yes/No, or the player for goal scorer markets
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub participant: Option<String>,
    /// American odds
    #[serde(default, deserialize_with = "lenient")]
    pub price: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub point: Option<f64>,
}

/// Any value that doesn't fit `T` becomes `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Strings pass through; numbers are rendered as text.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Non-arrays become empty; elements that aren't objects are dropped.
fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Why a single HTTP attempt did not produce a usable body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Status(u16),
    Transport,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Status(code) => write!(f, "HTTP {}", code),
            FailureKind::Transport => write!(f, "transport error"),
        }
    }
}

/// Result of one HTTP attempt.
#[derive(Debug)]
pub enum Attempt {
    Success(String),
    Failure(FailureKind, String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("GET failed after {attempts} attempts ({kind}): {detail}")]
    Exhausted {
        attempts: u32,
        kind: FailureKind,
        detail: String,
    },

    #[error("failed to parse {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Blocking-per-call client for the two odds endpoints. Retries are local to
/// each call and sleep linearly between attempts.
pub struct OddsApiClient {
    http: reqwest::Client,
    api_host: String,
    api_key: String,
    sport_key: String,
    regions: String,
    odds_format: String,
    seed_markets: String,
    max_retries: u32,
    backoff_step: Duration,
}

impl OddsApiClient {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            http,
            api_host: config.api_host.trim_end_matches('/').to_string(),
            api_key: config.odds_api_key.clone(),
            sport_key: config.sport_key.clone(),
            regions: config.regions.clone(),
            odds_format: config.odds_format.clone(),
            seed_markets: config.seed_markets.join(","),
            max_retries: config.max_retries,
            backoff_step: config.retry_backoff_step,
        })
    }

    /// List upcoming events via the bulk endpoint, using the seed markets.
    pub async fn fetch_seed_events(&self) -> Result<Vec<RawEvent>, FetchError> {
        let url = format!("{}/sports/{}/odds", self.api_host, self.sport_key);

        info!("Seeding events via bulk {}", self.seed_markets);
        let body = self.get_with_retry(&url, &self.seed_markets).await?;

        let entries: Vec<Value> = serde_json::from_str(&body)
            .map_err(|source| FetchError::Decode { what: "seed events", source })?;

        let listed = entries.len();
        let events: Vec<RawEvent> = entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();
        if events.len() < listed {
            warn!("Skipped {} malformed seed entries", listed - events.len());
        }

        info!("Fetched {} events from The Odds API", events.len());
        Ok(events)
    }

    /// Fetch one event's odds for an explicit market list.
    pub async fn fetch_event_props(
        &self,
        event_id: &str,
        markets: &[String],
    ) -> Result<RawEvent, FetchError> {
        let url = format!(
            "{}/sports/{}/events/{}/odds",
            self.api_host, self.sport_key, event_id
        );

        let body = self.get_with_retry(&url, &markets.join(",")).await?;

        let event: RawEvent = serde_json::from_str(&body)
            .map_err(|source| FetchError::Decode { what: "event odds", source })?;

        debug!(
            "Event {}: {} bookmakers in props payload",
            event_id,
            event.bookmakers.len()
        );
        Ok(event)
    }

    /// Run attempts until one succeeds or `max_retries + 1` have failed.
    async fn get_with_retry(&self, url: &str, markets: &str) -> Result<String, FetchError> {
        let attempts = self.max_retries + 1;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.attempt(url, markets).await {
                Attempt::Success(body) => return Ok(body),
                Attempt::Failure(kind, detail) => {
                    if attempt >= attempts {
                        return Err(FetchError::Exhausted {
                            attempts,
                            kind,
                            detail: truncate_chars(&detail, ERROR_BODY_CHARS),
                        });
                    }
                    warn!(
                        "{} try {}: {}",
                        kind,
                        attempt,
                        truncate_chars(&detail, WARN_BODY_CHARS)
                    );
                    tokio::time::sleep(self.backoff_step * attempt).await;
                }
            }
        }
    }

    async fn attempt(&self, url: &str, markets: &str) -> Attempt {
        let response = match self
            .http
            .get(url)
            .query(&[
                ("regions", self.regions.as_str()),
                ("markets", markets),
                ("oddsFormat", self.odds_format.as_str()),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await
        {
            Ok(response) => response,
            // The URL carries the API key; keep it out of logs and errors
            Err(e) => return Attempt::Failure(FailureKind::Transport, e.without_url().to_string()),
        };

        // Log API usage from headers
        if let Some(remaining) = response.headers().get("x-requests-remaining") {
            info!(
                "API requests remaining: {}",
                remaining.to_str().unwrap_or("?")
            );
        }

        let status = response.status();
        match response.text().await {
            Ok(body) if status == StatusCode::OK => Attempt::Success(body),
            Ok(body) => Attempt::Failure(FailureKind::Status(status.as_u16()), body),
            Err(e) => Attempt::Failure(FailureKind::Transport, e.without_url().to_string()),
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
