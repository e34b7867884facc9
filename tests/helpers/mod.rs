//! Fake image-editing API and shared-folder host for integration tests

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use plate_overlay::models::logo::LogoAsset;
use plate_overlay::services::processing::ClientSettings;
use std::collections::{HashMap, VecDeque};
use std::path::Path as FsPath;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::fixtures::png_bytes;

pub const TEST_TOKEN: &str = "test-token";

/// A canned response: content type plus body.
#[derive(Debug, Clone)]
pub struct Canned {
    pub content_type: String,
    pub body: Vec<u8>,
}

impl Canned {
    pub fn new(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.to_string(),
            body: body.into(),
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::new("application/json", value.to_string())
    }
}

/// Scripted behaviour for the fake API.
#[derive(Debug)]
pub struct FakeApi {
    /// Phases handed out in order; `default_phase` once drained.
    pub phases: Mutex<VecDeque<String>>,
    pub default_phase: String,
    /// The first N status queries answer HTTP 500.
    pub failing_status_calls: usize,
    pub submit_status: StatusCode,
    /// Submissions whose body contains this marker are rejected with 500.
    pub reject_marker: Option<String>,
    /// Served when the request does not ask for JSON.
    pub binary_result: Option<Canned>,
    /// Served when the request asks for JSON.
    pub json_result: Option<Canned>,
    pub listing: Option<String>,

    pub submissions: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub result_calls: AtomicUsize,
    pub last_submission: Mutex<Option<(String, Vec<u8>)>>,
}

impl Default for FakeApi {
    fn default() -> Self {
        let image = png_bytes(4096, 7);
        Self {
            phases: Mutex::new(VecDeque::new()),
            default_phase: "ready".to_string(),
            failing_status_calls: 0,
            submit_status: StatusCode::OK,
            reject_marker: None,
            binary_result: Some(Canned::new("image/png", image.clone())),
            json_result: Some(Canned::new("image/png", image)),
            listing: None,
            submissions: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            result_calls: AtomicUsize::new(0),
            last_submission: Mutex::new(None),
        }
    }
}

impl FakeApi {
    pub fn with_phases(mut self, phases: &[&str], default_phase: &str) -> Self {
        self.phases = Mutex::new(phases.iter().map(|p| p.to_string()).collect());
        self.default_phase = default_phase.to_string();
        self
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn result_calls(&self) -> usize {
        self.result_calls.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

/// Serve `api` on an ephemeral local port and return its base URL.
pub async fn spawn_fake_api(api: FakeApi) -> (String, Arc<FakeApi>) {
    let api = Arc::new(api);
    let app = Router::new()
        .route("/submission", post(submit))
        .route("/status", get(status))
        .route("/result", get(result))
        .route("/drive/folders/{id}", get(listing))
        .with_state(api.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake API");
    let addr = listener.local_addr().expect("Fake API has no address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Fake API crashed");
    });

    (format!("http://{}", addr), api)
}

/// A base URL nothing is listening on.
pub async fn unreachable_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

async fn submit(State(api): State<Arc<FakeApi>>, headers: HeaderMap, body: Bytes) -> StatusCode {
    api.submissions.fetch_add(1, Ordering::SeqCst);

    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    *api.last_submission.lock().unwrap() = Some((auth.clone(), body.to_vec()));

    if auth != format!("Bearer {}", TEST_TOKEN) {
        return StatusCode::UNAUTHORIZED;
    }
    if let Some(marker) = &api.reject_marker {
        if String::from_utf8_lossy(&body).contains(marker.as_str()) {
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    }
    api.submit_status
}

async fn status(
    State(api): State<Arc<FakeApi>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let call = api.status_calls.fetch_add(1, Ordering::SeqCst);
    if call < api.failing_status_calls {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream hiccup").into_response();
    }
    if !params.contains_key("image_url") {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let phase = api
        .phases
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| api.default_phase.clone());

    axum::Json(serde_json::json!({
        "data": { "images": [{ "phase": phase }] }
    }))
    .into_response()
}

async fn result(State(api): State<Arc<FakeApi>>, headers: HeaderMap) -> Response {
    api.result_calls.fetch_add(1, Ordering::SeqCst);

    let wants_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("json"));
    let canned = if wants_json {
        &api.json_result
    } else {
        &api.binary_result
    };

    match canned {
        Some(canned) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, canned.content_type.clone())],
            canned.body.clone(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn listing(State(api): State<Arc<FakeApi>>, Path(_id): Path<String>) -> Response {
    match &api.listing {
        Some(html) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html".to_string())],
            html.clone(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Write a logo into `dir` and resolve it.
pub fn write_logo(dir: &FsPath) -> Arc<LogoAsset> {
    std::fs::write(dir.join("logo.png"), png_bytes(64, 1)).unwrap();
    Arc::new(LogoAsset::discover(dir).unwrap())
}

pub fn settings(base_url: &str, output_dir: &FsPath) -> ClientSettings {
    ClientSettings {
        api_base_url: base_url.to_string(),
        api_token: TEST_TOKEN.to_string(),
        cut_type: "license_plate".to_string(),
        guideline_id: "guideline-42".to_string(),
        poll_interval: Duration::from_millis(20),
        max_poll_attempts: 10,
        output_dir: output_dir.to_path_buf(),
        output_suffix: "_logo".to_string(),
        min_image_bytes: 1000,
        request_timeout: Duration::from_secs(10),
    }
}
