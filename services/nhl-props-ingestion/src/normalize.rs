//! Flattening of nested event/bookmaker/market/outcome payloads into one
//! row per outcome.

use crate::config::Config;
use crate::odds_api::{RawEvent, RawOutcome};
use chrono::{DateTime, FixedOffset, Utc};
use std::fmt;
use tracing::debug;

/// Markets without this prefix are not player props
pub const PLAYER_MARKET_PREFIX: &str = "player_";
/// first/last/anytime goal scorer; outcome name is the player
pub const GOAL_SCORER_PREFIX: &str = "player_goal_scorer";
pub const ALTERNATE_SUFFIX: &str = "_alternate";

const OVER_WORDS: [&str; 2] = ["over", "o"];
const UNDER_WORDS: [&str; 2] = ["under", "u"];
const YES_WORDS: [&str; 2] = ["yes", "y"];
const NO_WORDS: [&str; 2] = ["no", "n"];

/// Canonical side of a betting line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeSide {
    Over,
    Under,
    Yes,
    No,
    Player,
    Unknown,
}

impl OutcomeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeSide::Over => "OVER",
            OutcomeSide::Under => "UNDER",
            OutcomeSide::Yes => "YES",
            OutcomeSide::No => "NO",
            OutcomeSide::Player => "PLAYER",
            OutcomeSide::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for OutcomeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized warehouse row, one per outcome
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub fetch_ts_utc: DateTime<Utc>,
    pub event_id: Option<String>,
    pub sport_key: String,
    pub commence_time_utc: Option<DateTime<Utc>>,
    pub commence_time_local: Option<DateTime<FixedOffset>>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub bookmaker_key: Option<String>,
    pub bookmaker_title: String,
    pub bookmaker_last_update_utc: Option<DateTime<Utc>>,
    /// Exact key from the API
    pub market_key: String,
    /// Family key with any `_alternate` suffix removed
    pub base_market_key: String,
    pub is_alternate: bool,
    pub market_last_update_utc: Option<DateTime<Utc>>,
    pub player: Option<String>,
    pub outcome_name: Option<String>,
    pub outcome_side: OutcomeSide,
    pub price_american: Option<i64>,
    pub point: Option<f64>,
    pub regions_requested: String,
    pub odds_format: String,
}

/// Map a raw outcome label to its side. Exact, case-insensitive token match
/// after trimming; anything unrecognized is taken to be a player name.
///
/// Only an absent or empty label is `Unknown`; the emptiness check happens
/// before trimming, so a whitespace-only label falls through to `Player`.
pub fn classify_outcome(label: Option<&str>) -> OutcomeSide {
    let low = match label {
        Some(s) if !s.is_empty() => s.trim().to_lowercase(),
        _ => return OutcomeSide::Unknown,
    };
    let low = low.as_str();

    if OVER_WORDS.contains(&low) {
        OutcomeSide::Over
    } else if UNDER_WORDS.contains(&low) {
        OutcomeSide::Under
    } else if YES_WORDS.contains(&low) {
        OutcomeSide::Yes
    } else if NO_WORDS.contains(&low) {
        OutcomeSide::No
    } else {
        OutcomeSide::Player
    }
}

/// Best-available player for an outcome.
///
/// Priority:
///   1. `description` (common for O/U props)
///   2. `participant` (some books)
///   3. goal scorer markets: the outcome name, when it isn't an O/U/Y/N token
pub fn resolve_player(outcome: &RawOutcome, market_key: &str) -> Option<String> {
    non_empty(&outcome.description)
        .or_else(|| non_empty(&outcome.participant))
        .or_else(|| goal_scorer_name(outcome, market_key))
        .map(str::to_string)
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

fn goal_scorer_name<'a>(outcome: &'a RawOutcome, market_key: &str) -> Option<&'a str> {
    if !market_key.starts_with(GOAL_SCORER_PREFIX) {
        return None;
    }
    let name = outcome.name.as_deref()?.trim();
    (classify_outcome(Some(name)) == OutcomeSide::Player).then_some(name)
}

/// Family key for a market: the key without its alternate-ladder suffix.
pub fn base_market_key(market_key: &str) -> &str {
    market_key
        .strip_suffix(ALTERNATE_SUFFIX)
        .unwrap_or(market_key)
}

pub fn is_alternate(market_key: &str) -> bool {
    market_key.ends_with(ALTERNATE_SUFFIX)
}

/// Parse an API timestamp into UTC. `Z` and explicit offsets both work;
/// blank or malformed input yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            debug!("Unparseable timestamp {:?}: {}", raw, e);
            None
        }
    }
}

fn parse_optional(raw: &Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref().and_then(parse_timestamp)
}

/// Flatten one event (already carrying its player-market bookmakers) into
/// rows, in bookmaker → market → outcome order.
pub fn flatten_event(
    event: &RawEvent,
    config: &Config,
    fetched_at: DateTime<Utc>,
) -> Vec<NormalizedRow> {
    let mut rows = Vec::new();

    let commence_utc = parse_optional(&event.commence_time);
    let commence_local = commence_utc.map(|t| t.with_timezone(&config.local_tz).fixed_offset());
    let sport_key = event
        .sport_key
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(config.sport_key.as_str());

    for bookmaker in &event.bookmakers {
        let Some(title) = bookmaker
            .title
            .as_deref()
            .filter(|t| config.is_allowed_bookmaker(t))
        else {
            continue;
        };
        let bookmaker_last = parse_optional(&bookmaker.last_update);

        for market in &bookmaker.markets {
            let Some(market_key) = market
                .key
                .as_deref()
                .filter(|k| k.starts_with(PLAYER_MARKET_PREFIX))
            else {
                continue;
            };
            let market_last = parse_optional(&market.last_update);
            let family = base_market_key(market_key);
            let alternate = is_alternate(market_key);

            for outcome in &market.outcomes {
                rows.push(NormalizedRow {
                    fetch_ts_utc: fetched_at,
                    event_id: event.id.clone(),
                    sport_key: sport_key.to_string(),
                    commence_time_utc: commence_utc,
                    commence_time_local: commence_local,
                    home_team: event.home_team.clone(),
                    away_team: event.away_team.clone(),
                    bookmaker_key: bookmaker.key.clone(),
                    bookmaker_title: title.to_string(),
                    bookmaker_last_update_utc: bookmaker_last,
                    market_key: market_key.to_string(),
                    base_market_key: family.to_string(),
                    is_alternate: alternate,
                    market_last_update_utc: market_last,
                    player: resolve_player(outcome, market_key),
                    outcome_name: outcome.name.clone(),
                    outcome_side: classify_outcome(outcome.name.as_deref()),
                    price_american: outcome.price,
                    point: outcome.point,
                    regions_requested: config.regions.clone(),
                    odds_format: config.odds_format.clone(),
                });
            }
        }
    }

    debug!(
        "Flattened event {} into {} rows",
        event.id.as_deref().unwrap_or("?"),
        rows.len()
    );
    rows
}
