//! API REST PIMON - Lecture du cache + quelques actions
//!
//! ROLE:
//! Read side of the observation cache. Every cached route answers the
//! `{data, meta}` snapshot of one key with a `Cache-Control` header derived
//! from that entry's TTLs; no handler ever triggers a poll.
//!
//! ACTIONS:
//! - container start/stop/restart and SMS delete go straight to the sources
//! - forwarder test-send goes through the dongle collector so the result
//!   lands in the cached forwarder status
//!
//! SECURITE:
//! When an API key is configured, `x-api-key` is required on `/api/*`
//! except `/api/health`.

use axum::extract::{Path, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pimon_core::collectors::DongleCollector;
use pimon_core::http_cache::cache_control_for;
use pimon_core::keys::*;
use pimon_core::sources::{ContainerAction, ContainerRuntime};
use pimon_core::{CollectorStatus, EntryMeta, SourceError, StatusBoard, Store};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub board: StatusBoard,
    pub containers: Arc<dyn ContainerRuntime>,
    pub dongle: Arc<DongleCollector>,
    pub api_key: Option<String>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/health", get(get_health))
        .route("/api/metrics/{kind}", get(get_metric))
        .route("/api/usb/devices", get(get_usb))
        .route("/api/docker/containers", get(get_containers))
        .route("/api/docker/containers/{id}/{action}", post(control_container))
        .route("/api/dongle/status", get(get_dongle))
        .route("/api/dongle/sms/{index}/delete", post(delete_sms))
        .route("/api/dongle/sms-forwarder", get(get_forwarder))
        .route("/api/dongle/sms-forwarder/test", post(test_forwarder))
        .route("/api/cache/status", get(get_cache_status))
        .route("/api/collectors", get(get_collectors))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    let path = req.uri().path();
    if !path.starts_with("/api/") || path == "/api/health" {
        return Ok(next.run(req).await);
    }
    let Some(expected) = app.api_key.as_deref().filter(|k| !k.is_empty()) else {
        return Ok(next.run(req).await);
    };

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        warn!("Rejected {} without valid API key", path);
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

/// Snapshot of `key` with its `Cache-Control` header.
fn cached(store: &Store, key: &str) -> Response {
    let snapshot = store.snapshot(key);
    let cache_control = cache_control_for(&snapshot.meta);
    ([(header::CACHE_CONTROL, cache_control)], Json(snapshot)).into_response()
}

fn metric_key(kind: &str) -> Option<&'static str> {
    Some(match kind {
        "cpu" => KEY_CPU,
        "memory" => KEY_MEMORY,
        "temperature" => KEY_TEMP,
        "disk" => KEY_DISK,
        "network" => KEY_NETWORK,
        "summary" => KEY_SUMMARY,
        "history" => KEY_HISTORY,
        _ => return None,
    })
}

/// Source failures behind an action route.
fn source_error(err: SourceError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match err {
        SourceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, Json(json!({ "ok": false, "error": err.to_string() })))
}

// GET /api/health
async fn get_health(State(app): State<AppState>) -> Response {
    cached(&app.store, KEY_HEALTH)
}

// GET /api/metrics/{kind}
async fn get_metric(State(app): State<AppState>, Path(kind): Path<String>) -> Response {
    match metric_key(&kind) {
        Some(key) => cached(&app.store, key),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": format!("unknown metric: {kind}") }))).into_response(),
    }
}

async fn get_usb(State(app): State<AppState>) -> Response {
    cached(&app.store, KEY_USB)
}

async fn get_containers(State(app): State<AppState>) -> Response {
    cached(&app.store, KEY_DOCKER)
}

async fn get_dongle(State(app): State<AppState>) -> Response {
    cached(&app.store, KEY_DONGLE)
}

async fn get_forwarder(State(app): State<AppState>) -> Response {
    cached(&app.store, KEY_SMS_FORWARDER)
}

// GET /api/cache/status (meta de chaque clé)
async fn get_cache_status(State(app): State<AppState>) -> Json<BTreeMap<&'static str, EntryMeta>> {
    let status = ALL_KEYS
        .iter()
        .map(|key| (*key, app.store.snapshot(key).meta))
        .collect();
    Json(status)
}

async fn get_collectors(State(app): State<AppState>) -> Json<BTreeMap<&'static str, CollectorStatus>> {
    Json(app.board.all())
}

// POST /api/docker/containers/{id}/{action}
async fn control_container(
    State(app): State<AppState>,
    Path((id, action)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let Some(action) = ContainerAction::parse(&action) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": format!("unknown action: {action}") })),
        ));
    };
    app.containers.control(&id, action).await.map_err(source_error)?;
    Ok(Json(json!({ "ok": true, "id": id, "action": action })))
}

// POST /api/dongle/sms/{index}/delete
async fn delete_sms(
    State(app): State<AppState>,
    Path(index): Path<u32>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let Some(modem) = app.dongle.modem() else {
        return Err(source_error(SourceError::Unavailable("modem not configured".into())));
    };
    modem.delete_sms(index).await.map_err(source_error)?;
    info!("SMS {} deleted", index);
    Ok(Json(json!({ "ok": true, "index": index })))
}

// POST /api/dongle/sms-forwarder/test
async fn test_forwarder(State(app): State<AppState>) -> Response {
    let status = match app.dongle.test_send(&app.store).await {
        Ok(status) => status,
        Err(err) => return source_error(err).into_response(),
    };
    let code = if !status.configured {
        StatusCode::BAD_REQUEST
    } else if status.last_error.is_some() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    (code, Json(status)).into_response()
}
