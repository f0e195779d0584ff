//! Odds API client tests against a mock server: query parameters, the
//! linear retry loop and error escalation.

mod common;

use common::{event_path, props_payload, seed_event, test_config, SEED_PATH};
use nhl_props_ingestion::{FailureKind, FetchError, OddsApiClient};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn seed_request_carries_fixed_parameters() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEED_PATH))
        .and(query_param("regions", "us,eu,us_ex"))
        .and(query_param("markets", "h2h"))
        .and(query_param("oddsFormat", "american"))
        .and(query_param("apiKey", "test-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-requests-remaining", "480")
                .set_body_json(json!([seed_event("evt-1"), seed_event("evt-2")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = assert_ok!(OddsApiClient::new(&test_config(&server)));
    let events = assert_ok!(client.fetch_seed_events().await);

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id.as_deref(), Some("evt-1"));
    assert_eq!(events[1].home_team.as_deref(), Some("Edmonton Oilers"));
}

#[tokio::test]
async fn event_request_joins_market_list() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(event_path("evt-1")))
        .and(query_param("markets", "player_goals,player_goals_alternate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(props_payload("evt-1")))
        .expect(1)
        .mount(&server)
        .await;

    let client = assert_ok!(OddsApiClient::new(&test_config(&server)));
    let markets = vec!["player_goals".to_string(), "player_goals_alternate".to_string()];
    let event = assert_ok!(client.fetch_event_props("evt-1", &markets).await);

    assert_eq!(event.bookmakers.len(), 2);
    assert_eq!(event.bookmakers[0].title.as_deref(), Some("FanDuel"));
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let server = MockServer::start().await;

    // Mounted first, so it answers until exhausted
    Mock::given(method("GET"))
        .and(path(SEED_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream hiccup"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(SEED_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([seed_event("evt-1")])))
        .expect(1)
        .mount(&server)
        .await;

    let client = assert_ok!(OddsApiClient::new(&test_config(&server)));
    let events = assert_ok!(client.fetch_seed_events().await);
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn exhausted_retries_report_truncated_body() {
    let server = MockServer::start().await;
    let long_body = "x".repeat(2_000);

    Mock::given(method("GET"))
        .and(path(SEED_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string(long_body))
        .expect(5)
        .mount(&server)
        .await;

    let client = assert_ok!(OddsApiClient::new(&test_config(&server)));
    let err = assert_err!(client.fetch_seed_events().await);

    match err {
        FetchError::Exhausted { attempts, kind, detail } => {
            assert_eq!(attempts, 5);
            assert_eq!(kind, FailureKind::Status(503));
            assert_eq!(detail.chars().count(), 500);
        }
        other => panic!("expected Exhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn attempt_budget_follows_config() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(event_path("evt-9")))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.max_retries = 1;
    let client = assert_ok!(OddsApiClient::new(&config));

    let err = assert_err!(client.fetch_event_props("evt-9", &config.player_markets()).await);
    let message = err.to_string();
    assert!(message.contains("after 2 attempts"), "{}", message);
    assert!(message.contains("HTTP 429"), "{}", message);
    assert!(!message.contains("test-key"), "api key leaked: {}", message);
}

#[tokio::test]
async fn malformed_json_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEED_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = assert_ok!(OddsApiClient::new(&test_config(&server)));
    let err = assert_err!(client.fetch_seed_events().await);
    assert!(matches!(err, FetchError::Decode { what: "seed events", .. }));
}

#[tokio::test]
async fn malformed_seed_entries_are_skipped() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEED_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            seed_event("evt-1"),
            "garbage",
            42,
            seed_event("evt-2"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = assert_ok!(OddsApiClient::new(&test_config(&server)));
    let events = assert_ok!(client.fetch_seed_events().await);

    let ids: Vec<_> = events.iter().map(|e| e.id.as_deref()).collect();
    assert_eq!(ids, vec![Some("evt-1"), Some("evt-2")]);
}

#[tokio::test]
async fn non_array_seed_body_is_a_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEED_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "quota"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = assert_ok!(OddsApiClient::new(&test_config(&server)));
    let err = assert_err!(client.fetch_seed_events().await);
    assert!(matches!(err, FetchError::Decode { what: "seed events", .. }));
}
