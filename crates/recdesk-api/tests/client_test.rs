#![allow(clippy::unwrap_used)]
// Integration tests for `ApiClient` against a wiremock backend.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use recdesk_api::{ApiClient, AuthPaths, Error, RequestSpec, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, ApiClient) {
    let server = MockServer::start().await;
    let client = client_for(&server.uri(), TransportConfig::default());
    (server, client)
}

fn client_for(uri: &str, config: TransportConfig) -> ApiClient {
    ApiClient::http(Url::parse(uri).unwrap(), &config, AuthPaths::default()).unwrap()
}

fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_owned())
}

async fn setup_logged_in(token: &str) -> (MockServer, ApiClient) {
    let (server, client) = setup().await;
    client.session().set_token(secret(token));
    (server, client)
}

// ── Bearer attachment ───────────────────────────────────────────────

#[tokio::test]
async fn test_bearer_token_attached() {
    let (server, client) = setup_logged_in("tok-1").await;

    Mock::given(method("GET"))
        .and(path("/assets"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "_id": "a1" }])))
        .expect(1)
        .mount(&server)
        .await;

    let raw = client.execute(&RequestSpec::get("/assets")).await.unwrap();
    assert_eq!(raw.status, 200);
    assert_eq!(raw.body, json!([{ "_id": "a1" }]));
}

// ── Refresh and retry ───────────────────────────────────────────────

#[tokio::test]
async fn test_expired_token_refreshed_and_replayed_once() {
    let (server, client) = setup_logged_in("old").await;

    Mock::given(method("GET"))
        .and(path("/assets"))
        .and(header("authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "message": "jwt expired" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "new" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/assets"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let raw = client.execute(&RequestSpec::get("/assets")).await.unwrap();
    assert_eq!(raw.body, json!([]));
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn test_persistent_403_does_not_loop() {
    let (server, client) = setup_logged_in("old").await;

    Mock::given(method("GET"))
        .and(path("/assets"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "new" })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .execute(&RequestSpec::get("/assets"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn test_refresh_failure_clears_session() {
    let (server, client) = setup_logged_in("old").await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "no session" })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .execute(&RequestSpec::get("/users"))
        .await
        .unwrap_err();

    assert!(
        matches!(err, Error::AuthRefresh { status: Some(401), .. }),
        "expected AuthRefresh, got: {err:?}"
    );
    assert!(err.is_session_lost());
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_refresh_without_token_in_body() {
    let (server, client) = setup_logged_in("old").await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let err = client
        .execute(&RequestSpec::get("/users"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AuthRefresh { .. }));
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_concurrent_expiries_trigger_one_refresh() {
    let (server, client) = setup_logged_in("old").await;

    for route in ["/assets", "/users", "/logs"] {
        Mock::given(method("GET"))
            .and(path(route))
            .and(header("authorization", "Bearer old"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(route))
            .and(header("authorization", "Bearer new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
    }

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "accessToken": "new" }))
                .set_delay(Duration::from_millis(150)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let assets = RequestSpec::get("/assets");
    let users = RequestSpec::get("/users");
    let logs = RequestSpec::get("/logs");
    let (a, u, l) = tokio::join!(
        client.execute(&assets),
        client.execute(&users),
        client.execute(&logs),
    );

    a.unwrap();
    u.unwrap();
    l.unwrap();
}

#[tokio::test]
async fn test_401_is_returned_unchanged() {
    let (server, client) = setup_logged_in("old").await;

    Mock::given(method("GET"))
        .and(path("/assets"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "new" })))
        .expect(0)
        .mount(&server)
        .await;

    let err = client
        .execute(&RequestSpec::get("/assets"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(client.is_authenticated());
}

// ── Response normalization ──────────────────────────────────────────

#[tokio::test]
async fn test_server_message_surfaced() {
    let (server, client) = setup_logged_in("tok").await;

    Mock::given(method("GET"))
        .and(path("/assets/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "message": "Asset not found" })),
        )
        .mount(&server)
        .await;

    let err = client
        .execute(&RequestSpec::get("/assets/missing"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.server_message(), Some("Asset not found"));
}

#[tokio::test]
async fn test_malformed_json_is_transform_error() {
    let (server, client) = setup_logged_in("tok").await;

    Mock::given(method("GET"))
        .and(path("/assets"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let err = client
        .execute(&RequestSpec::get("/assets"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transform { .. }), "got: {err:?}");
}

#[tokio::test]
async fn test_empty_body_is_null() {
    let (server, client) = setup_logged_in("tok").await;

    Mock::given(method("DELETE"))
        .and(path("/assets"))
        .and(body_json(json!({ "id": "a1" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let spec = RequestSpec::delete("/assets").with_body(json!({ "id": "a1" }));
    let raw = client.execute(&spec).await.unwrap();
    assert_eq!(raw.status, 204);
    assert_eq!(raw.body, Value::Null);
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let client = client_for("http://127.0.0.1:1", TransportConfig::default());
    let err = client
        .execute(&RequestSpec::get("/assets"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Network { .. }), "got: {err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let server = MockServer::start().await;
    let client = client_for(
        &server.uri(),
        TransportConfig::default().with_timeout(Duration::from_millis(200)),
    );

    Mock::given(method("GET"))
        .and(path("/assets"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let err = client
        .execute(&RequestSpec::get("/assets"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Timeout { timeout_ms: 200 }),
        "got: {err:?}"
    );
    assert_eq!(err.to_string(), "Request timed out after 200ms");
}

// ── Login / logout ──────────────────────────────────────────────────

#[tokio::test]
async fn test_login_stores_token_and_refresh_cookie() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({ "username": "clerk", "password": "hunter2" })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "refresh=r-1; Path=/; HttpOnly")
                .set_body_json(json!({ "accessToken": "first" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    client.login("clerk", &secret("hunter2")).await.unwrap();
    assert!(client.is_authenticated());

    // The refresh call must carry the cookie set by login.
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(header("cookie", "refresh=r-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "second" })))
        .expect(1)
        .mount(&server)
        .await;

    client.refresh().await.unwrap();
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn test_login_rejected() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "message": "bad credentials" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = client.login("clerk", &secret("wrong")).await;
    match result {
        Err(Error::Authentication { message }) => assert_eq!(message, "bad credentials"),
        other => panic!("expected Authentication error, got: {other:?}"),
    }
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_logout_clears_session_even_on_failure() {
    let (server, client) = setup_logged_in("tok").await;

    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.logout().await;
    assert!(result.is_err());
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_logout_without_session_makes_no_call() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = client.logout().await;
    assert!(matches!(result, Err(Error::NotAuthenticated)));
}
