//! Admin API and public serving tests.
//!
//! Drives the full router in-process: Basic Auth gating, site CRUD,
//! multipart deploys, checkpoint rollback, and Host-routed serving.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use http_body_util::BodyExt;
use pagehost::config::ServerConfig;
use pagehost::server::{AppState, build_router};
use serde_json::{Value, json};
use std::io::Write;
use tempfile::TempDir;
use tower::ServiceExt;

fn test_app(temp: &TempDir) -> Router {
    let config = ServerConfig {
        port: 0,
        log_level: "warn".to_string(),
        data_dir: temp.path().join("data"),
        sites_dir: temp.path().join("data/sites"),
        admin_user: "admin".to_string(),
        admin_pass: "secret".to_string(),
    };
    let state = AppState::new(config, temp.path().join("data/sites-checkpoints"));
    state.resolver.load().unwrap();
    build_router(state)
}

fn auth() -> String {
    format!("Basic {}", BASE64.encode("admin:secret"))
}

fn admin_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, auth())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin_empty(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, auth())
        .body(Body::empty())
        .unwrap()
}

fn public_get(path: &str, host: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(path)
        .header(header::HOST, host)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

fn multipart_deploy(uri: &str, filename: &str, payload: &[u8]) -> Request<Body> {
    let boundary = "pagehost-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, auth())
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

// =============================================================================
// Auth Tests
// =============================================================================

#[tokio::test]
async fn test_admin_requires_basic_auth() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp);

    let req = Request::builder()
        .method("GET")
        .uri("/_api/sites")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_wrong_credentials_rejected() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp);

    let req = Request::builder()
        .method("GET")
        .uri("/_api/sites")
        .header(
            header::AUTHORIZATION,
            format!("Basic {}", BASE64.encode("admin:wrong")),
        )
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, req).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Site CRUD Tests
// =============================================================================

#[tokio::test]
async fn test_create_then_fetch_site() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp);

    let (status, body) = send(
        &app,
        admin_json(
            "POST",
            "/_api/sites",
            json!({"id": "blog", "domain": "blog.localhost"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["username"], json!("default"));
    assert_eq!(body["data"]["index"], json!("index.html"));

    let (status, body) = send(&app, admin_empty("GET", "/_api/sites/default/blog")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["domain"], json!("blog.localhost"));

    let (status, body) = send(&app, admin_empty("GET", "/_api/sites")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], json!(1));
}

#[tokio::test]
async fn test_create_requires_id_and_domain() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp);

    let (status, _) = send(
        &app,
        admin_json("POST", "/_api/sites", json!({"id": "blog"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_domain_conflicts() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp);

    send(
        &app,
        admin_json(
            "POST",
            "/_api/sites",
            json!({"id": "blog", "domain": "shared.localhost"}),
        ),
    )
    .await;
    let (status, _) = send(
        &app,
        admin_json(
            "POST",
            "/_api/sites",
            json!({"id": "docs", "domain": "shared.localhost", "username": "bob"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_get_missing_site() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp);

    let (status, _) = send(&app, admin_empty("GET", "/_api/sites/default/ghost")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_site_removes_everything() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp);

    send(
        &app,
        admin_json(
            "POST",
            "/_api/sites",
            json!({"id": "blog", "domain": "blog.localhost"}),
        ),
    )
    .await;
    let root = temp.path().join("data/sites/default/blog");
    assert!(root.exists(), "create initializes the live root");

    let (status, _) = send(&app, admin_empty("DELETE", "/_api/sites/default/blog")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!root.exists(), "live root is removed with the site");

    let (status, _) = send(&app, admin_empty("GET", "/_api/sites/default/blog")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Public Serving Tests
// =============================================================================

#[tokio::test]
async fn test_serves_placeholder_after_create() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp);

    send(
        &app,
        admin_json(
            "POST",
            "/_api/sites",
            json!({"id": "blog", "domain": "blog.localhost"}),
        ),
    )
    .await;

    let response = app
        .clone()
        .oneshot(public_get("/", "blog.localhost:9999"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/html"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.windows(7).any(|w| w == b"Welcome"));
}

#[tokio::test]
async fn test_unknown_host_is_404() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp);

    let (status, body) = send(&app, public_get("/", "nobody.localhost")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_disabled_site_is_503_until_reenabled() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp);

    send(
        &app,
        admin_json(
            "POST",
            "/_api/sites",
            json!({"id": "blog", "domain": "blog.localhost"}),
        ),
    )
    .await;

    let (status, _) = send(
        &app,
        admin_json("PUT", "/_api/sites/default/blog", json!({"enabled": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, public_get("/", "blog.localhost")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    // Reload must not resurrect a disabled site.
    send(&app, admin_empty("POST", "/_api/reload")).await;
    let (status, _) = send(&app, public_get("/", "blog.localhost")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    // Re-enabling restores serving.
    send(
        &app,
        admin_json("PUT", "/_api/sites/default/blog", json!({"enabled": true})),
    )
    .await;
    let (status, _) = send(&app, public_get("/", "blog.localhost")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_path_traversal_on_public_surface_is_forbidden() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp);

    send(
        &app,
        admin_json(
            "POST",
            "/_api/sites",
            json!({"id": "blog", "domain": "blog.localhost"}),
        ),
    )
    .await;

    let (status, _) = send(
        &app,
        public_get("/../../data/sites.json", "blog.localhost"),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

// =============================================================================
// Deploy and Checkpoint Tests
// =============================================================================

#[tokio::test]
async fn test_deploy_checkpoint_and_rollback_via_api() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp);

    send(
        &app,
        admin_json(
            "POST",
            "/_api/sites",
            json!({"id": "blog", "domain": "blog.localhost"}),
        ),
    )
    .await;

    // Deploy v1: snapshots the placeholder root.
    let v1 = zip_bytes(&[("index.html", b"<h1>v1</h1>")]);
    let (status, body) = send(
        &app,
        multipart_deploy("/_api/sites/default/blog/deploy", "v1.zip", &v1),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    let (status, body) = send(&app, public_get("/", "blog.localhost")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null, "html body is not json");

    // Deploy v2: snapshots v1.
    let v2 = zip_bytes(&[("index.html", b"<h1>v2</h1>")]);
    let (status, body) = send(
        &app,
        multipart_deploy("/_api/sites/default/blog/deploy", "v2.zip", &v2),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let v1_checkpoint = body["data"]["checkpoint"]["id"]
        .as_str()
        .expect("second deploy returns its checkpoint")
        .to_string();

    let (status, body) = send(
        &app,
        admin_empty("GET", "/_api/sites/default/blog/checkpoints"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["current"], json!(v1_checkpoint.clone()));

    // Roll back to the v1 snapshot.
    let (status, _) = send(
        &app,
        admin_empty(
            "POST",
            &format!(
                "/_api/sites/default/blog/checkpoints/{}/checkout",
                v1_checkpoint
            ),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .clone()
        .oneshot(public_get("/", "blog.localhost"))
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"<h1>v1</h1>");
}

#[tokio::test]
async fn test_delete_current_checkpoint_refused_via_api() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp);

    send(
        &app,
        admin_json(
            "POST",
            "/_api/sites",
            json!({"id": "blog", "domain": "blog.localhost"}),
        ),
    )
    .await;
    let v1 = zip_bytes(&[("index.html", b"v1")]);
    let (_, body) = send(
        &app,
        multipart_deploy("/_api/sites/default/blog/deploy", "v1.zip", &v1),
    )
    .await;
    let current = body["data"]["checkpoint"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        admin_empty(
            "DELETE",
            &format!("/_api/sites/default/blog/checkpoints/{}", current),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], json!(false));

    // Metadata is unchanged and the archive is still there.
    let (_, body) = send(
        &app,
        admin_empty("GET", "/_api/sites/default/blog/checkpoints"),
    )
    .await;
    assert_eq!(body["data"]["current"], json!(current));
    assert_eq!(body["data"]["total"], json!(1));
}

#[tokio::test]
async fn test_unsafe_deploy_rejected_via_api() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp);

    send(
        &app,
        admin_json(
            "POST",
            "/_api/sites",
            json!({"id": "blog", "domain": "blog.localhost"}),
        ),
    )
    .await;

    let evil = zip_bytes(&[("../evil.txt", b"escape")]);
    let (status, _) = send(
        &app,
        multipart_deploy("/_api/sites/default/blog/deploy", "evil.zip", &evil),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, public_get("/", "blog.localhost")).await;
    assert_eq!(status, StatusCode::OK, "placeholder still serves after a rejected deploy");
}

#[tokio::test]
async fn test_deploy_without_file_field() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp);

    send(
        &app,
        admin_json(
            "POST",
            "/_api/sites",
            json!({"id": "blog", "domain": "blog.localhost"}),
        ),
    )
    .await;

    let boundary = "pagehost-test-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nx\r\n--{b}--\r\n",
        b = boundary
    );
    let req = Request::builder()
        .method("POST")
        .uri("/_api/sites/default/blog/deploy")
        .header(header::AUTHORIZATION, auth())
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send(&app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// System Tests
// =============================================================================

#[tokio::test]
async fn test_health() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp);

    let (status, body) = send(&app, admin_empty("GET", "/_api/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("healthy"));
    assert_eq!(body["data"]["sites_count"], json!(0));
}

#[tokio::test]
async fn test_reload_publishes_registry_changes() {
    let temp = TempDir::new().unwrap();
    let app = test_app(&temp);

    send(
        &app,
        admin_json(
            "POST",
            "/_api/sites",
            json!({"id": "blog", "domain": "blog.localhost"}),
        ),
    )
    .await;

    let (status, body) = send(&app, admin_empty("POST", "/_api/reload")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["sites_count"], json!(1));
}
