//! Integration tests for token retrieval and HTTP upload against a local
//! mock endpoint.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Form, Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use relay_server::transfer::{
    fetch_token, AuthError, ClientCredentials, FileUploader, HttpUploader, TokenSource,
    TransferError,
};

#[derive(Debug, Clone)]
struct ReceivedUpload {
    authorization: Option<String>,
    body: Vec<u8>,
}

#[derive(Clone, Default)]
struct MockState {
    uploads: Arc<Mutex<Vec<ReceivedUpload>>>,
}

async fn token_handler(Form(form): Form<HashMap<String, String>>) -> (StatusCode, Json<serde_json::Value>) {
    let valid = form.get("grant_type").map(String::as_str) == Some("client_credentials")
        && form.get("client_id").map(String::as_str) == Some("relay")
        && form.get("client_secret").map(String::as_str) == Some("s3cret");
    if valid {
        (StatusCode::OK, Json(json!({ "access_token": "tok-123", "token_type": "Bearer" })))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid_client" })))
    }
}

async fn empty_token_handler() -> Json<serde_json::Value> {
    Json(json!({ "token_type": "Bearer" }))
}

async fn upload_handler(
    State(state): State<MockState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.uploads.lock().unwrap().push(ReceivedUpload {
        authorization,
        body: body.to_vec(),
    });
    StatusCode::CREATED
}

async fn failing_upload_handler() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "disk full")
}

/// Helper: start the mock endpoints on a random port.
async fn start_mock_server() -> (String, MockState) {
    let state = MockState::default();
    let app = Router::new()
        .route("/token", post(token_handler))
        .route("/token-empty", post(empty_token_handler))
        .route("/upload", post(upload_handler))
        .route("/upload-fail", post(failing_upload_handler))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

fn creds(secret: &str) -> ClientCredentials {
    ClientCredentials {
        client_id: "relay".to_string(),
        client_secret: secret.to_string(),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[tokio::test]
async fn test_fetch_token_success() {
    let (base, _) = start_mock_server().await;
    let http = reqwest::Client::new();

    let token = fetch_token(&http, &format!("{}/token", base), &creds("s3cret"))
        .await
        .unwrap();
    assert_eq!(token, "tok-123");
}

#[tokio::test]
async fn test_fetch_token_bad_credentials() {
    let (base, _) = start_mock_server().await;
    let http = reqwest::Client::new();

    let err = fetch_token(&http, &format!("{}/token", base), &creds("wrong"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Status { status: 401, .. }));
}

#[tokio::test]
async fn test_fetch_token_missing_field() {
    let (base, _) = start_mock_server().await;
    let http = reqwest::Client::new();

    let err = fetch_token(&http, &format!("{}/token-empty", base), &creds("s3cret"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::MissingAccessToken));
}

#[tokio::test]
async fn test_upload_with_fetched_token() {
    let (base, state) = start_mock_server().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("report.csv");
    std::fs::write(&file, b"a,b\n1,2\n").unwrap();

    let uploader = HttpUploader::new(
        TokenSource::ClientCredentials {
            token_url: format!("{}/token", base),
            credentials: creds("s3cret"),
        },
        Duration::from_secs(5),
    );
    uploader
        .upload_file(&file, &format!("{}/upload", base))
        .await
        .unwrap();

    let uploads = state.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].authorization.as_deref(), Some("Bearer tok-123"));
    assert!(contains(&uploads[0].body, b"a,b\n1,2\n"));
    assert!(contains(&uploads[0].body, b"filename=\"report.csv\""));
}

#[tokio::test]
async fn test_upload_without_token() {
    let (base, state) = start_mock_server().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("blob.bin");
    std::fs::write(&file, b"payload").unwrap();

    let uploader = HttpUploader::new(TokenSource::None, Duration::from_secs(5));
    uploader
        .upload_file(&file, &format!("{}/upload", base))
        .await
        .unwrap();

    let uploads = state.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].authorization.is_none());
}

#[tokio::test]
async fn test_upload_error_status() {
    let (base, _) = start_mock_server().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("blob.bin");
    std::fs::write(&file, b"payload").unwrap();

    let uploader = HttpUploader::new(TokenSource::Static("tok".into()), Duration::from_secs(5));
    let err = uploader
        .upload_file(&file, &format!("{}/upload-fail", base))
        .await
        .unwrap_err();
    match err {
        TransferError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "disk full");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_upload_token_failure_stops_upload() {
    let (base, state) = start_mock_server().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("blob.bin");
    std::fs::write(&file, b"payload").unwrap();

    let uploader = HttpUploader::new(
        TokenSource::ClientCredentials {
            token_url: format!("{}/token", base),
            credentials: creds("wrong"),
        },
        Duration::from_secs(5),
    );
    let err = uploader
        .upload_file(&file, &format!("{}/upload", base))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Auth(AuthError::Status { .. })));
    assert!(state.uploads.lock().unwrap().is_empty());
}
