//! HTTP-level tests against the real router.
//!
//! Each test binds an ephemeral port, serves the actual application, and
//! probes it with a plain HTTP client, the same way the container
//! orchestrator and external callers see the service. Tests run in parallel;
//! every test gets its own server and (when needed) its own index directory.

use std::net::SocketAddr;
use std::time::Duration;

use riskqa::config::AppConfig;
use riskqa::routes::create_router;
use riskqa::state::AppState;
use tempfile::TempDir;

/// Orchestrator probe timeout from the deployment artifact.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

async fn spawn_app(config: AppConfig) -> SocketAddr {
    let state = AppState::new(config);
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("server error");
    });
    addr
}

/// Config pointing at a dedicated (initially empty) index directory.
fn config_with_index_dir(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.index.dir = dir.path().to_string_lossy().into_owned();
    config
}

/// Write a tiny two-chunk index into the directory.
fn write_index_fixture(dir: &TempDir) {
    std::fs::write(
        dir.path().join("meta.jsonl"),
        concat!(
            r#"{"text":"HQLA must cover 30-day net outflows.","source":"basel_iii.pdf","page":12}"#,
            "\n",
            r#"{"text":"Operational risk capital follows the SMA.","source":"ops.pdf","page":3}"#,
            "\n",
        ),
    )
    .expect("write meta");
    std::fs::write(
        dir.path().join("vectors.jsonl"),
        "[1.0, 0.0]\n[0.0, 1.0]\n",
    )
    .expect("write vectors");
}

#[tokio::test]
async fn health_returns_ok_within_probe_budget() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_app(config_with_index_dir(&dir)).await;

    let response = tokio::time::timeout(
        PROBE_TIMEOUT,
        reqwest::get(format!("http://{addr}/health")),
    )
    .await
    .expect("probe answered within budget")
    .expect("probe request succeeded");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn health_is_alive_even_when_not_ready() {
    // Liveness must not depend on the index being built yet.
    let dir = TempDir::new().unwrap();
    let addr = spawn_app(config_with_index_dir(&dir)).await;

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn health_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_app(config_with_index_dir(&dir)).await;

    let first: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let second: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn health_serves_concurrent_probes() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_app(config_with_index_dir(&dir)).await;

    let mut probes = Vec::new();
    for _ in 0..10 {
        probes.push(tokio::spawn(reqwest::get(format!("http://{addr}/health"))));
    }
    for probe in probes {
        let response = probe.await.unwrap().unwrap();
        assert_eq!(response.status(), 200);
    }
}

#[tokio::test]
async fn readiness_is_503_without_index() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_app(config_with_index_dir(&dir)).await;

    let response = reqwest::get(format!("http://{addr}/health/ready"))
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["index_ok"], false);
}

#[tokio::test]
async fn readiness_is_200_with_index() {
    let dir = TempDir::new().unwrap();
    write_index_fixture(&dir);
    let addr = spawn_app(config_with_index_dir(&dir)).await;

    let response = reqwest::get(format!("http://{addr}/health/ready"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["index_ok"], true);
    // No key configured in this test setup.
    assert_eq!(body["api_key_present"], false);
}

#[tokio::test]
async fn health_requires_no_authentication() {
    // A bare request with no credentials of any kind must get a status,
    // never a 401/403.
    let dir = TempDir::new().unwrap();
    let addr = spawn_app(config_with_index_dir(&dir)).await;

    for path in ["/health", "/health/ready"] {
        let status = reqwest::get(format!("http://{addr}{path}"))
            .await
            .unwrap()
            .status();
        assert_ne!(status, 401);
        assert_ne!(status, 403);
    }
}

#[tokio::test]
async fn ask_without_credentials_reports_retrieval_error() {
    // Index present but no OpenAI configuration: the query embedding cannot
    // be computed, and the caller sees the original 500 + detail shape.
    let dir = TempDir::new().unwrap();
    write_index_fixture(&dir);
    let addr = spawn_app(config_with_index_dir(&dir)).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/ask"))
        .json(&serde_json::json!({ "question": "What is the LCR?" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("OPENAI_API_KEY missing"), "detail: {detail}");
}

#[tokio::test]
async fn ask_rejects_malformed_body() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_app(config_with_index_dir(&dir)).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/ask"))
        .json(&serde_json::json!({ "not_question": 1 }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn whoami_prefers_forwarded_header() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_app(config_with_index_dir(&dir)).await;

    let client = reqwest::Client::new();
    let body: serde_json::Value = client
        .get(format!("http://{addr}/whoami"))
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["ip"], "203.0.113.9");
}

#[tokio::test]
async fn whoami_falls_back_to_peer_address() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_app(config_with_index_dir(&dir)).await;

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/whoami"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["ip"], "127.0.0.1");
}

#[tokio::test]
async fn responses_are_not_cacheable() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_app(config_with_index_dir(&dir)).await;

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "no-store"
    );
}
