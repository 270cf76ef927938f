//! Router tests for bsdash-server.

use std::fs;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use bsdash_core::documents::{STATUS_FILE, SUBJECTS_FILE};
use bsdash_core::DashboardEngine;
use bsdash_server::state::AppState;
use bsdash_server::{build_router, ServerConfig};

fn write_qc_dir(tmp: &TempDir) {
    fs::write(
        tmp.path().join(SUBJECTS_FILE),
        r#"{"subjects": ["sub-01", "sub-02"]}"#,
    )
    .unwrap();
    fs::write(
        tmp.path().join(STATUS_FILE),
        r#"{"process_states": ["CCCCCCCCCCCCCCC", "CCLQQQQQQQQQQQQ"], "end": false}"#,
    )
    .unwrap();
    fs::create_dir_all(tmp.path().join("sub-01")).unwrap();
    fs::write(tmp.path().join("sub-01").join("bse.png"), b"\x89PNG fake").unwrap();
}

async fn make_app(tmp: &TempDir) -> (Router, DashboardEngine) {
    make_app_with_capacity(tmp, 256).await
}

async fn make_app_with_capacity(tmp: &TempDir, capacity: usize) -> (Router, DashboardEngine) {
    write_qc_dir(tmp);
    let config = ServerConfig {
        qc_dir: tmp.path().to_path_buf(),
        start_paused: true,
        poll_interval: Duration::from_secs(60),
        ..Default::default()
    };
    let engine = DashboardEngine::start(config.engine_config().with_update_capacity(capacity))
        .expect("Failed to start engine");
    engine.poll_now().await.unwrap();
    let app = build_router(AppState::new(engine.clone(), CancellationToken::new()));
    (app, engine)
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_view_reports_each_subject() {
    let tmp = TempDir::new().unwrap();
    let (app, _engine) = make_app(&tmp).await;

    let response = app.oneshot(get("/api/view")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let view: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    let rows = view["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["subject"], "sub-01");
    assert_eq!(
        rows[0]["status"]["summary"][0]["text"],
        "finished all stages."
    );
    assert_eq!(view["header"]["counts"]["running"], 1);
}

#[tokio::test]
async fn test_action_then_html_shows_gallery() {
    let tmp = TempDir::new().unwrap();
    let (app, _engine) = make_app(&tmp).await;

    let response = app
        .clone()
        .oneshot(post_json("/api/actions", r#"{"action": "toggle_expand", "subject": 0}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let html = body_string(app.oneshot(get("/api/view/html")).await.unwrap()).await;
    assert!(html.contains("src=\"/qc/sub-01/bse.png\""), "{}", html);
    assert!(html.contains("data-action=\"{&quot;action&quot;:&quot;toggle_expand&quot;"));
}

#[tokio::test]
async fn test_invalid_action_is_bad_request() {
    let tmp = TempDir::new().unwrap();
    let (app, _engine) = make_app(&tmp).await;

    let response = app
        .oneshot(post_json(
            "/api/actions",
            r#"{"action": "set_visible_columns", "columns": [0, 400]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("out of range"));
}

#[tokio::test]
async fn test_export_is_tsv_attachment() {
    let tmp = TempDir::new().unwrap();
    let (app, _engine) = make_app(&tmp).await;

    app.clone()
        .oneshot(post_json(
            "/api/actions",
            r#"{"action": "set_note", "subject": 1, "note": "redo \"bfc\""}"#,
        ))
        .await
        .unwrap();

    let response = app.oneshot(get("/api/annotations/export")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("BrainSuiteQCExcludeList.tsv"));
    assert_eq!(
        body_string(response).await,
        "participant_id\tExclude\tNote\nsub-01\t0\t\"\"\nsub-02\t0\t\"redo \"\"bfc\"\"\"\n"
    );
}

#[tokio::test]
async fn test_missing_run_parameters_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let (app, _engine) = make_app(&tmp).await;
    let response = app.oneshot(get("/api/run-parameters")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_images_and_frontend_are_served() {
    let tmp = TempDir::new().unwrap();
    let (app, _engine) = make_app(&tmp).await;

    let response = app.clone().oneshot(get("/qc/sub-01/bse.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("dashboard.js"));

    let response = app.oneshot(get("/dashboard.js")).await.unwrap();
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.contains("javascript"), "{}", content_type);
}

#[tokio::test]
async fn test_stylesheet_keeps_hidden_elements_hidden() {
    let tmp = TempDir::new().unwrap();
    let (app, _engine) = make_app(&tmp).await;

    let css = body_string(app.clone().oneshot(get("/dashboard.css")).await.unwrap()).await;
    assert!(css.contains("[hidden] { display: none !important; }"));

    let page = body_string(app.oneshot(get("/")).await.unwrap()).await;
    assert!(page.contains("id=\"connection\" class=\"badge badge-warning\" hidden"));
}

#[tokio::test]
async fn test_closed_engine_is_unavailable() {
    let tmp = TempDir::new().unwrap();
    let (app, engine) = make_app(&tmp).await;
    engine.shutdown().await;

    let response = app.oneshot(get("/api/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

/// Reads server-sent events off a streaming response body.
struct EventReader {
    body: Body,
    buf: String,
}

impl EventReader {
    fn new(response: axum::response::Response) -> Self {
        Self {
            body: response.into_body(),
            buf: String::new(),
        }
    }

    async fn next_event(&mut self) -> (String, serde_json::Value) {
        loop {
            if let Some(end) = self.buf.find("\n\n") {
                let raw: String = self.buf.drain(..end + 2).collect();
                let mut name = None;
                let mut data = String::new();
                for line in raw.lines() {
                    if let Some(value) = line.strip_prefix("event:") {
                        name = Some(value.trim_start().to_string());
                    } else if let Some(value) = line.strip_prefix("data:") {
                        data.push_str(value.trim_start());
                    }
                }
                // keep-alive comments have no event name
                if let Some(name) = name {
                    return (name, serde_json::from_str(&data).unwrap());
                }
                continue;
            }
            let frame = tokio::time::timeout(Duration::from_secs(5), self.body.frame())
                .await
                .expect("Timed out waiting for an event")
                .expect("Stream ended")
                .unwrap();
            if let Ok(data) = frame.into_data() {
                self.buf.push_str(std::str::from_utf8(&data).unwrap());
            }
        }
    }
}

#[tokio::test]
async fn test_stream_starts_with_rebuild_then_patches_rows() {
    let tmp = TempDir::new().unwrap();
    let (app, _engine) = make_app(&tmp).await;

    let response = app.clone().oneshot(get("/api/stream")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut events = EventReader::new(response);

    let (name, patch) = events.next_event().await;
    assert_eq!(name, "rebuild");
    assert_eq!(patch["type"], "rebuild");
    let html = patch["html"].as_str().unwrap();
    assert!(html.contains("id=\"row-1\""));
    assert!(html.contains("id=\"dashboard-controls\""));

    let response = app
        .oneshot(post_json("/api/actions", r#"{"action": "toggle_expand", "subject": 0}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (name, patch) = events.next_event().await;
    assert_eq!(name, "rows");
    let rows = patch["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["index"], 0);
    assert!(rows[0]["gallery"].as_str().unwrap().contains("/qc/sub-01/bse.png"));
}

#[tokio::test]
async fn test_lagging_stream_client_gets_rebuild() {
    let tmp = TempDir::new().unwrap();
    let (app, _engine) = make_app_with_capacity(&tmp, 1).await;

    let response = app.clone().oneshot(get("/api/stream")).await.unwrap();
    let mut events = EventReader::new(response);
    assert_eq!(events.next_event().await.0, "rebuild");

    // Each toggle publishes a header and a visibility patch; the client reads none.
    for enabled in [true, false, true] {
        let body = format!(r#"{{"action": "set_hide_unlaunched", "enabled": {}}}"#, enabled);
        let response = app.clone().oneshot(post_json("/api/actions", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let (name, patch) = events.next_event().await;
    assert_eq!(name, "rebuild");
    assert!(patch["html"].as_str().unwrap().contains("id=\"dashboard-progress\""));
}
