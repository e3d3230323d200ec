//! End-to-end tests for the data endpoint.
//!
//! The token endpoint and the Sheets API are both served by a local mock
//! server, so these run without network access or real credentials.

use std::io::Write;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sheets_data_api::api::{create_router, AppState};
use sheets_data_api::config::Config;
use sheets_data_api::error::ConfigError;
use sheets_data_api::sheets::SheetsClient;

const PRIVATE_KEY_PEM: &str = include_str!("../fixtures/test_service_account.pem");
const CLIENT_EMAIL: &str = "reader@demo-project.iam.gserviceaccount.com";
const VALUES_PATH: &str = "/v4/spreadsheets/sheet-123/values/Books!A:C";

/// Private key as it appears in an env file: one line, `\n` escaped.
fn escaped_key() -> String {
    PRIVATE_KEY_PEM.replace('\n', "\\n")
}

fn base_vars(server: &MockServer) -> Vec<(String, String)> {
    vec![
        ("SHEET_ID".to_string(), "sheet-123".to_string()),
        ("SHEETS_API_URL".to_string(), server.uri()),
        ("GOOGLE_TOKEN_URL".to_string(), format!("{}/token", server.uri())),
        ("HTTP_TIMEOUT_MS".to_string(), "2000".to_string()),
    ]
}

fn inline_config(server: &MockServer) -> Config {
    let mut vars = base_vars(server);
    vars.push(("GOOGLE_CLIENT_EMAIL".to_string(), CLIENT_EMAIL.to_string()));
    vars.push(("GOOGLE_PRIVATE_KEY".to_string(), escaped_key()));
    Config::from_vars(vars).unwrap()
}

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=urn"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.integration",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_books(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(VALUES_PATH))
        .and(header("authorization", "Bearer ya29.integration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Books!A1:C2",
            "majorDimension": "ROWS",
            "values": [["Title", "Author", "Year"], ["Dune", "Herbert", "1965"]]
        })))
        .mount(server)
        .await;
}

async fn get_data(app: axum::Router) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri("/api/data").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn router_for(config: &Config) -> axum::Router {
    let client = SheetsClient::from_config(config).await.unwrap();
    create_router(AppState::new(Arc::new(client), config.sheet_range.clone()))
}

#[tokio::test]
async fn inline_credentials_serve_range() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_books(&server).await;

    let app = router_for(&inline_config(&server)).await;
    let (status, body) = get_data(app).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        r#"{"students":[["Title","Author","Year"],["Dune","Herbert","1965"]]}"#
    );
}

#[tokio::test]
async fn token_is_reused_across_requests() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_books(&server).await;

    let app = router_for(&inline_config(&server)).await;
    let (first, _) = get_data(app.clone()).await;
    let (second, _) = get_data(app).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    // Mock expectations verify a single token exchange on drop.
}

#[tokio::test]
async fn keyfile_credentials_serve_range() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_books(&server).await;

    let mut keyfile = tempfile::NamedTempFile::new().unwrap();
    let contents = json!({
        "type": "service_account",
        "project_id": "demo-project",
        "private_key_id": "kid-1",
        "private_key": PRIVATE_KEY_PEM,
        "client_email": CLIENT_EMAIL,
        "token_uri": "https://oauth2.googleapis.com/token"
    });
    keyfile.write_all(contents.to_string().as_bytes()).unwrap();

    let mut vars = base_vars(&server);
    vars.push((
        "GOOGLE_KEYFILE_PATH".to_string(),
        keyfile.path().display().to_string(),
    ));
    let config = Config::from_vars(vars).unwrap();

    let (status, body) = get_data(router_for(&config).await).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with(r#"{"students":[["Title""#));
}

#[tokio::test]
async fn rejected_token_returns_generic_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid JWT Signature."
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(VALUES_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = router_for(&inline_config(&server)).await;
    let (status, body) = get_data(app).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, r#"{"error":"failed to load sheet data"}"#);
    assert!(!body.contains(CLIENT_EMAIL));
    assert!(!body.contains("JWT"));
}

#[tokio::test]
async fn upstream_permission_error_returns_generic_error() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path(VALUES_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": 403,
                "message": "The caller does not have permission",
                "status": "PERMISSION_DENIED"
            }
        })))
        .mount(&server)
        .await;

    let app = router_for(&inline_config(&server)).await;
    let (status, body) = get_data(app).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.contains("permission"));
}

#[tokio::test]
async fn missing_sheet_id_fails_at_startup() {
    let server = MockServer::start().await;
    let config = Config::from_vars(vec![
        ("SHEETS_API_URL".to_string(), server.uri()),
        ("GOOGLE_CLIENT_EMAIL".to_string(), CLIENT_EMAIL.to_string()),
        ("GOOGLE_PRIVATE_KEY".to_string(), escaped_key()),
    ])
    .unwrap();

    let err = SheetsClient::from_config(&config).await.unwrap_err();
    assert!(matches!(err, ConfigError::MissingSpreadsheetId));
}

#[tokio::test]
async fn malformed_inline_key_fails_at_startup() {
    let server = MockServer::start().await;
    let mut vars = base_vars(&server);
    vars.push(("GOOGLE_CLIENT_EMAIL".to_string(), CLIENT_EMAIL.to_string()));
    vars.push(("GOOGLE_PRIVATE_KEY".to_string(), "not a pem".to_string()));
    let config = Config::from_vars(vars).unwrap();

    let err = SheetsClient::from_config(&config).await.unwrap_err();
    assert!(matches!(err, ConfigError::MalformedPrivateKey(_)));
}
