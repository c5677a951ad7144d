//! HTTP surface: the browse and distill endpoints, legacy version routing
//! with its deprecation list, and result encoding.
//!
//! Error bodies are plain text of the form `"<status text>: <detail>"`, so
//! clients of the old API keep seeing the messages they already parse.

use std::collections::HashSet;
use std::sync::Arc;

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use once_cell::sync::Lazy;
use url::Url;

use crate::browser::Driver;
use crate::distill::distill_html;
use crate::models::DistillRequest;
use crate::query::Script;
use crate::registry::Registry;

pub const BROWSE_PATH: &str = "/api/browse/";
pub const NEW_BROWSE_PATH: &str = "/api/decap/v0/browse";
pub const DISTILL_PATH: &str = "/api/decap/v0/distill";
pub const DEFAULT_PORT: u16 = 4531;
pub const MIN_API: &str = "v0.8";
pub const NEXT_API: &str = "v0.9";

static DEPRECATED_APIS: Lazy<HashSet<String>> =
    Lazy::new(|| infer_deprecated_apis().into_iter().collect());

/// Shared handles every request needs: the browser and the session registry.
#[derive(Clone)]
pub struct AppState {
    pub driver: Arc<Driver>,
    pub registry: Registry,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(NEW_BROWSE_PATH, any(browse_entry))
        .route(DISTILL_PATH, any(distill_entry))
        .route("/api/browse", any(legacy_entry))
        .route("/api/browse/", any(legacy_entry))
        .route("/api/browse/{version}", any(legacy_entry))
        .route("/api/browse/{version}/{*rest}", any(legacy_entry))
        .with_state(state)
}

async fn browse_entry(State(state): State<AppState>, req: Request) -> Response {
    if req.method() != Method::POST {
        return http_error(StatusCode::METHOD_NOT_ALLOWED, req.method());
    }
    browse(state, req).await
}

/// Legacy `/api/browse/<version>/…` routing: the two supported versions go
/// to the browse handler, enumerated older versions get 410, everything else
/// 404.
async fn legacy_entry(State(state): State<AppState>, req: Request) -> Response {
    if req.method() != Method::POST {
        return http_error(StatusCode::METHOD_NOT_ALLOWED, req.method());
    }
    let version = match version_from_path(req.uri().path()) {
        Ok(version) => version,
        Err(e) => return http_error(StatusCode::NOT_FOUND, e),
    };
    if DEPRECATED_APIS.contains(&version) {
        return http_error(
            StatusCode::GONE,
            format!("deprecated API version: {}", version),
        );
    }
    if version != MIN_API && version != NEXT_API {
        return http_error(
            StatusCode::NOT_FOUND,
            format!("non-existent API version: \"{}\"", version),
        );
    }
    browse(state, req).await
}

async fn browse(state: AppState, req: Request) -> Response {
    let Some(body) = read_json_body(req).await else {
        return http_error(StatusCode::BAD_REQUEST, "expected application/json");
    };
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            return http_error(
                StatusCode::BAD_REQUEST,
                format!("JSON parsing error: {}", e),
            );
        }
    };

    let request: crate::models::Request = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return http_error(
                StatusCode::BAD_REQUEST,
                format!("JSON parsing error: {}", e),
            );
        }
    };

    let script = match Script::parse(request) {
        Ok(script) => script,
        Err(e) => return http_error(StatusCode::BAD_REQUEST, e),
    };

    let res = match script.execute(&state.driver, &state.registry).await {
        Ok(res) => res,
        Err(e) => return http_error(StatusCode::INTERNAL_SERVER_ERROR, e),
    };

    match res.kind() {
        "pdf" => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/pdf")],
            res.pdf,
        )
            .into_response(),
        "png" => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "image/png")],
            res.img,
        )
            .into_response(),
        _ => match serde_json::to_vec(&res) {
            Ok(buf) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                buf,
            )
                .into_response(),
            Err(_) => http_error(StatusCode::INTERNAL_SERVER_ERROR, "Couldn't encode response"),
        },
    }
}

async fn distill_entry(req: Request) -> Response {
    if req.method() != Method::POST {
        return http_error(StatusCode::METHOD_NOT_ALLOWED, req.method());
    }
    let Some(body) = read_json_body(req).await else {
        return http_error(StatusCode::BAD_REQUEST, "expected application/json");
    };
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            return http_error(
                StatusCode::BAD_REQUEST,
                format!("JSON parsing error: {}", e),
            );
        }
    };

    let request: DistillRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return http_error(
                StatusCode::BAD_REQUEST,
                format!("JSON parsing error: {}", e),
            );
        }
    };

    let base = if request.base_url.is_empty() {
        None
    } else {
        match Url::parse(&request.base_url) {
            Ok(url) => Some(url),
            Err(e) => {
                return http_error(StatusCode::BAD_REQUEST, format!("invalid baseUrl: {}", e));
            }
        }
    };

    // Distillation is CPU-bound; keep it off the request workers.
    let distilled =
        tokio::task::spawn_blocking(move || distill_html(&request.html, base.as_ref())).await;
    match distilled {
        Ok(response) => match serde_json::to_vec(&response) {
            Ok(buf) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                buf,
            )
                .into_response(),
            Err(_) => http_error(StatusCode::INTERNAL_SERVER_ERROR, "Couldn't encode response"),
        },
        Err(e) => http_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("distillation failed: {}", e),
        ),
    }
}

/// Enforce the exact `application/json` content type, then read the body.
/// `None` means the content type was wrong.
async fn read_json_body(req: Request) -> Option<Result<axum::body::Bytes, axum::Error>> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    if content_type != Some("application/json") {
        return None;
    }
    Some(to_bytes(req.into_body(), usize::MAX).await)
}

/// Plain-text error in the legacy `"<status text>: <detail>"` shape.
fn http_error(status: StatusCode, detail: impl std::fmt::Display) -> Response {
    let reason = status.canonical_reason().unwrap_or("Error");
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("{}: {}\n", reason, detail),
    )
        .into_response()
}

/// Extract the version segment from a legacy browse path.
pub fn version_from_path(path: &str) -> Result<String, String> {
    let trimmed = path.strip_prefix(BROWSE_PATH).unwrap_or(path);
    let version = trimmed.split('/').next().unwrap_or("");
    if version.is_empty() {
        return Err(format!("want path format \"{}<version>/...\"", BROWSE_PATH));
    }
    Ok(version.to_string())
}

/// Every version older than the minimum supported one, enumerated so the
/// routing layer can answer 410 for each.
pub fn infer_deprecated_apis() -> Vec<String> {
    let (min_major, min_minor) = parse_api_version(MIN_API).expect("malformed minimum API");
    let mut deprecated = Vec::new();
    for major in 0..min_major {
        for minor in 0..10 {
            deprecated.push(format!("v{}.{}", major, minor));
        }
    }
    for minor in 0..min_minor {
        deprecated.push(format!("v{}.{}", min_major, minor));
    }
    deprecated
}

fn parse_api_version(version: &str) -> Option<(u32, u32)> {
    let rest = version.strip_prefix('v')?;
    let (major, minor) = rest.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Debug-mode port: shift into the 41xx range, differentiated per user so
/// developers on a shared host don't collide.
pub fn debug_port(uid: u32) -> u16 {
    DEFAULT_PORT - DEFAULT_PORT % 1000 + 100 + (uid % 100) as u16
}
