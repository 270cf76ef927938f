//! REST API handlers and SSE streaming for bsdash-server.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{sse::Event, sse::KeepAlive, Html, IntoResponse, Response, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::{stream, Stream, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use bsdash_core::annotations::EXPORT_FILE_NAME;
use bsdash_core::status::ColorScheme;
use bsdash_core::{Action, DashError, ViewUpdate};

use crate::html;
use crate::state::AppState;

// ─── Router ──────────────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/view", get(get_view))
        .route("/view/html", get(get_view_html))
        .route("/stream", get(stream_view))
        .route("/actions", post(post_action))
        .route("/stats", get(get_stats))
        .route("/catalog", get(get_catalog))
        .route("/run-parameters", get(get_run_parameters))
        .route("/annotations/export", get(export_annotations))
        .route("/config", get(get_server_config))
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Map an engine error to a response. A closed engine is a server problem;
/// anything else was a bad request.
fn error_response(e: DashError) -> Response {
    let status = match e {
        DashError::ChannelClosed => StatusCode::SERVICE_UNAVAILABLE,
        DashError::Io(_) | DashError::Json(_) | DashError::Yaml(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

// ─── Handlers ────────────────────────────────────────────────────────────────

async fn get_view(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.snapshot().await {
        Ok(view) => Json(view).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_view_html(State(state): State<AppState>) -> impl IntoResponse {
    let view = match state.engine.snapshot().await {
        Ok(view) => view,
        Err(e) => return error_response(e),
    };
    match state.engine.catalog().await {
        Ok(catalog) => Html(html::render_dashboard(&view, &catalog)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn post_action(State(state): State<AppState>, Json(action): Json<Action>) -> Response {
    debug!(?action, "Action received");
    match state.engine.apply(action).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_catalog(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.catalog().await {
        Ok(catalog) => Json(catalog).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_run_parameters(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.run_parameters().await {
        Ok(Some(params)) => Json(params).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "BrainSuite run parameters unavailable." })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// TSV download of the exclusion list.
async fn export_annotations(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.export_annotations().await {
        Ok(tsv) => Response::builder()
            .header(header::CONTENT_TYPE, "text/tab-separated-values; charset=utf-8")
            .header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME),
            )
            .body(Body::from(tsv))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => error_response(e),
    }
}

async fn get_server_config(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.engine.config();
    Json(serde_json::json!({
        "qc_dir": state.qc_dir.display().to_string(),
        "image_base": config.image_base,
        "poll_interval_ms": config.poll_interval.as_millis() as u64,
        "color_schemes": ColorScheme::preset_names(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ─── Live view ───────────────────────────────────────────────────────────────

fn to_event(update: &ViewUpdate, catalog: &bsdash_core::render::CatalogView) -> Event {
    let data = serde_json::to_string(&html::patch(update, catalog)).unwrap_or_default();
    Event::default().event(update.name()).data(data)
}

/// SSE endpoint: a full rebuild on connect, then every view update as HTML
/// patches. A client that falls behind gets a fresh rebuild.
async fn stream_view(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Response> {
    // Subscribe first so nothing published after the snapshot is missed.
    let receiver = state.engine.subscribe();
    let catalog = Arc::new(state.engine.catalog().await.map_err(error_response)?);
    let initial = state.engine.snapshot().await.map_err(error_response)?;

    let engine = state.engine.clone();
    let updates = BroadcastStream::new(receiver)
        .then(move |item| {
            let engine = engine.clone();
            async move {
                match item {
                    Ok(update) => Some(update),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "Live view client lagged; sending rebuild");
                        engine.snapshot().await.ok().map(ViewUpdate::Rebuild)
                    }
                }
            }
        })
        .filter_map(|update| async move { update });

    let events = stream::iter([ViewUpdate::Rebuild(initial)])
        .chain(updates)
        .map(move |update| Ok(to_event(&update, &catalog)))
        .take_until(state.shutdown.clone().cancelled_owned());

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

// ─── Frontend (embedded) ─────────────────────────────────────────────────────

/// Serve the embedded dashboard page and its script.
pub async fn serve_frontend(uri: axum::http::Uri) -> impl IntoResponse {
    let path = uri.path().trim_start_matches('/');

    let (actual_path, content) = match Assets::get(path) {
        Some(content) => (path, content),
        None => match Assets::get("index.html") {
            Some(content) => ("index.html", content),
            None => return StatusCode::NOT_FOUND.into_response(),
        },
    };

    let mime = mime_guess::from_path(actual_path).first_or_octet_stream();

    Response::builder()
        .header(header::CONTENT_TYPE, mime.as_ref())
        .body(Body::from(content.data.into_owned()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[derive(rust_embed::Embed)]
#[folder = "assets"]
#[include = "*.html"]
#[include = "*.js"]
#[include = "*.css"]
struct Assets;
