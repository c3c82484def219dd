//! Helpers for driving the real router in handler tests.

use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::config::Config;
use crate::db;
use crate::uploads::UploadStore;
use crate::AppState;

const BOUNDARY: &str = "streamflow-test-boundary";

/// State backed by an in-memory database and a temporary upload root.
/// Keep the `TempDir` alive for the duration of the test.
pub async fn test_state() -> (Arc<AppState>, TempDir) {
    test_state_with(|_| {}).await
}

/// Like `test_state`, with a hook to adjust the config (rate limiting starts disabled)
pub async fn test_state_with(configure: impl FnOnce(&mut Config)) -> (Arc<AppState>, TempDir) {
    let dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.rate_limit.enabled = false;
    config.uploads.dir = dir.path().join("uploads");
    config.server.data_dir = dir.path().to_path_buf();
    configure(&mut config);

    let pool = db::test_pool().await;
    db::seed_categories(&pool).await.unwrap();

    let uploads = UploadStore::new(&config.uploads.dir, config.uploads.max_file_size);
    uploads.ensure_dirs().await.unwrap();

    (Arc::new(AppState::new(config, pool, uploads)), dir)
}

pub async fn send(state: &Arc<AppState>, request: Request<Body>) -> Response<Body> {
    super::create_router(state.clone())
        .oneshot(request)
        .await
        .unwrap()
}

pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    if body.is_null() {
        builder.body(Body::empty()).unwrap()
    } else {
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}

/// Build a multipart/form-data request. Files are `(field, file name, content type, bytes)`.
pub fn multipart_request(
    uri: &str,
    token: &str,
    fields: &[(&str, &str)],
    files: &[(&str, &str, &str, &[u8])],
) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }

    for (name, file_name, content_type, data) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, name, file_name, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    }
}

/// Register an account and return its token and user id
pub async fn register_user(state: &Arc<AppState>, email: &str, display_name: &str) -> (String, String) {
    let body = json!({ "email": email, "password": "secret1", "displayName": display_name });
    let response = send(state, json_request(Method::POST, "/api/auth/register", None, &body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_str().unwrap().to_string(),
    )
}

/// Names of everything in one upload subdirectory, staging files included
pub fn upload_entries(state: &AppState, dir: &str) -> Vec<String> {
    std::fs::read_dir(state.uploads.root().join(dir))
        .map(|entries| {
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

pub async fn login(state: &Arc<AppState>, email: &str, password: &str) -> String {
    let body = json!({ "email": email, "password": password });
    let response = send(state, json_request(Method::POST, "/api/auth/login", None, &body)).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["token"].as_str().unwrap().to_string()
}
