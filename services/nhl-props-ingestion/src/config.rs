//! Run configuration for the NHL player props job.
//!
//! Everything except credentials is fixed for this job. Credentials are read
//! from env vars first and fall back to Docker secret files.

use chrono_tz::Tz;
use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const ODDS_API_HOST: &str = "https://api.the-odds-api.com/v4";
pub const SPORT: &str = "icehockey_nhl";
pub const REGIONS: &str = "us,eu,us_ex";
pub const ODDS_FORMAT: &str = "american";

pub const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const MAX_RETRIES: u32 = 4;
pub const RETRY_BACKOFF_STEP_MS: u64 = 1500;
pub const EVENT_CALL_DELAY_MS: u64 = 180;

pub const DATASET: &str = "betting_odds";
pub const TABLE: &str = "nhl_player_odds_current";

pub const ALLOWED_BOOKMAKERS: [&str; 6] = [
    "BetMGM",
    "BetRivers",
    "DraftKings",
    "Fanatics",
    "FanDuel",
    "Pinnacle",
];

/// Bulk endpoint is only used to discover event ids cheaply
pub const SEED_MARKETS: [&str; 1] = ["h2h"];

pub const CORE_PLAYER_MARKETS: [&str; 10] = [
    "player_points",
    "player_power_play_points",
    "player_assists",
    "player_blocked_shots",
    "player_shots_on_goal",
    "player_goals",
    "player_total_saves",
    "player_goal_scorer_first",
    "player_goal_scorer_last",
    "player_goal_scorer_anytime",
];

pub const ALT_PLAYER_MARKETS: [&str; 7] = [
    "player_points_alternate",
    "player_assists_alternate",
    "player_power_play_points_alternate",
    "player_goals_alternate",
    "player_shots_on_goal_alternate",
    "player_blocked_shots_alternate",
    "player_total_saves_alternate",
];

const ODDS_API_KEY_VAR: &str = "ODDS_API_KEY";
const ODDS_API_KEY_SECRET: &str = "/run/secrets/odds_api_key";
const DATABASE_URL_VAR: &str = "DATABASE_URL";
const DATABASE_URL_SECRET: &str = "/run/secrets/database_url";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is set but empty")]
    Empty(&'static str),

    #[error("{0} appears to be a placeholder value; replace with your real key")]
    Placeholder(&'static str),

    #[error("CRITICAL: {name} not set and secret file not found at {path}")]
    MissingSecret {
        name: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid SQL identifier {0:?}")]
    InvalidIdentifier(String),
}

/// A validated `dataset.table` pair, safe to splice into SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    dataset: String,
    table: String,
}

impl TableRef {
    pub fn new(dataset: &str, table: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            dataset: validate_identifier(dataset)?.to_string(),
            table: validate_identifier(table)?.to_string(),
        })
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Quoted form for use in SQL statements
    pub fn qualified(&self) -> String {
        format!("\"{}\".\"{}\"", self.dataset, self.table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

fn validate_identifier(ident: &str) -> Result<&str, ConfigError> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(ident)
    } else {
        Err(ConfigError::InvalidIdentifier(ident.to_string()))
    }
}

/// Immutable per-run configuration, passed explicitly to the fetch, flatten
/// and load stages.
#[derive(Debug, Clone)]
pub struct Config {
    pub odds_api_key: String,
    pub database_url: String,
    pub api_host: String,
    pub sport_key: String,
    pub regions: String,
    pub odds_format: String,
    pub seed_markets: Vec<String>,
    pub core_player_markets: Vec<String>,
    pub alternate_player_markets: Vec<String>,
    pub allowed_bookmakers: BTreeSet<String>,
    /// Zone used for `commence_time_local`
    pub local_tz: Tz,
    pub request_timeout: Duration,
    /// Retries after the first attempt; total attempts is `max_retries + 1`
    pub max_retries: u32,
    pub retry_backoff_step: Duration,
    /// Pause after each event before the next detail request
    pub event_call_delay: Duration,
    pub table: TableRef,
}

impl Config {
    /// Build the NHL props configuration around the given credentials.
    pub fn new(
        odds_api_key: impl Into<String>,
        database_url: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            odds_api_key: odds_api_key.into(),
            database_url: database_url.into(),
            api_host: ODDS_API_HOST.to_string(),
            sport_key: SPORT.to_string(),
            regions: REGIONS.to_string(),
            odds_format: ODDS_FORMAT.to_string(),
            seed_markets: to_strings(&SEED_MARKETS),
            core_player_markets: to_strings(&CORE_PLAYER_MARKETS),
            alternate_player_markets: to_strings(&ALT_PLAYER_MARKETS),
            allowed_bookmakers: to_strings(&ALLOWED_BOOKMAKERS).into_iter().collect(),
            local_tz: chrono_tz::America::Toronto,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            max_retries: MAX_RETRIES,
            retry_backoff_step: Duration::from_millis(RETRY_BACKOFF_STEP_MS),
            event_call_delay: Duration::from_millis(EVENT_CALL_DELAY_MS),
            table: TableRef::new(DATASET, TABLE)?,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        // Secrets:
        // - Local / compose: env vars (optionally from .env)
        // - Container jobs: /run/secrets/* mounts
        let odds_api_key = read_credential(ODDS_API_KEY_VAR, ODDS_API_KEY_SECRET)?;
        check_api_key(&odds_api_key)?;

        let database_url = read_credential(DATABASE_URL_VAR, DATABASE_URL_SECRET)?;

        Self::new(odds_api_key, database_url)
    }

    /// Core markets followed by alternates, duplicates removed, first-seen order kept.
    pub fn player_markets(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.core_player_markets
            .iter()
            .chain(&self.alternate_player_markets)
            .filter(|m| seen.insert(m.as_str()))
            .cloned()
            .collect()
    }

    pub fn is_allowed_bookmaker(&self, title: &str) -> bool {
        self.allowed_bookmakers.contains(title)
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn read_credential(var: &'static str, secret_path: &'static str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Ok(_) => Err(ConfigError::Empty(var)),
        Err(_) => read_secret_file(var, secret_path),
    }
}

/// Read a secret from a Docker secret file; a blank file counts as empty
fn read_secret_file(name: &'static str, path: &str) -> Result<String, ConfigError> {
    let secret = std::fs::read_to_string(path).map_err(|source| ConfigError::MissingSecret {
        name,
        path: path.to_string(),
        source,
    })?;

    match secret.trim() {
        "" => Err(ConfigError::Empty(name)),
        trimmed => Ok(trimmed.to_string()),
    }
}

/// Reject sample/placeholder keys before burning a run on 401s
fn check_api_key(key: &str) -> Result<(), ConfigError> {
    let key_lower = key.trim().to_lowercase();
    if key_lower.contains("change_me")
        || key_lower.contains("your_")
        || key_lower.starts_with("sample")
    {
        return Err(ConfigError::Placeholder(ODDS_API_KEY_VAR));
    }
    Ok(())
}
