//! HTTP front for the cache worker.
//!
//! Every request is answered by the active worker's fetch strategy, so a
//! browser pointed at this server sees the origin while online and the
//! cached copy while offline. `POST /__worker/message` carries the
//! page → worker message protocol.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::{Error, Result};
use crate::worker::{FetchRequest, WorkerHandle};

/// Path of the message endpoint.
pub const MESSAGE_PATH: &str = "/__worker/message";

/// Path of the health endpoint.
pub const HEALTH_PATH: &str = "/__worker/health";

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: &Error) -> Response {
    (
        status,
        axum::Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

async fn health(State(handle): State<WorkerHandle>) -> impl IntoResponse {
    axum::Json(HealthResponse {
        status: "ok",
        version: handle.controller().map(|w| w.version()),
    })
}

async fn message(State(handle): State<WorkerHandle>, body: String) -> Response {
    match handle.post_json(&body).await {
        Ok(Some(reply)) => axum::Json(reply).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e @ Error::Protocol(_)) => error_response(StatusCode::BAD_REQUEST, &e),
        Err(e @ Error::NoController) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e),
        Err(e) => {
            log::error!("Worker message failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e)
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl axum::http::header::AsHeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Builds the worker request for an incoming HTTP request.
fn to_fetch_request(method: Method, uri: &Uri, headers: &HeaderMap, body: Bytes) -> FetchRequest {
    let path = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());
    let navigate = method == Method::GET
        && (header_str(headers, "sec-fetch-mode") == "navigate"
            || header_str(headers, ACCEPT).contains("text/html"));
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut request = FetchRequest::new(method, path).with_body(content_type, body);
    request.navigate = navigate;
    request.no_cache = header_str(headers, CACHE_CONTROL).contains("no-cache");
    request
}

async fn proxy(
    State(handle): State<WorkerHandle>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = to_fetch_request(method, &uri, &headers, body);
    match handle.fetch(&request).await {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let mut headers = HeaderMap::new();
            if let Some(content_type) = response.content_type.as_deref()
                && let Ok(value) = HeaderValue::from_str(content_type)
            {
                headers.insert(CONTENT_TYPE, value);
            }
            (status, headers, response.body).into_response()
        }
        Err(e @ Error::NoController) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e),
        Err(e) => {
            log::warn!("{} {} failed: {e}", request.method, request.path);
            error_response(StatusCode::BAD_GATEWAY, &e)
        }
    }
}

/// Builds the router: message and health endpoints plus the worker proxy
/// as fallback.
#[must_use]
pub fn router(handle: WorkerHandle) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(MESSAGE_PATH, post(message))
        .route(HEALTH_PATH, get(health))
        .fallback(proxy)
        .layer(cors)
        .with_state(handle)
}

/// Serves the worker on `host:port` until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn serve(
    handle: WorkerHandle,
    host: &str,
    port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    log::info!("Serving on http://{}", listener.local_addr()?);

    axum::serve(listener, router(handle))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    log::info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_detection() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));
        let uri: Uri = "/contacts?tab=2".parse().unwrap();
        let request = to_fetch_request(Method::GET, &uri, &headers, Bytes::new());
        assert!(request.navigate);
        assert_eq!(request.path, "/contacts?tab=2");

        let request = to_fetch_request(Method::GET, &"/app.js".parse().unwrap(), &HeaderMap::new(), Bytes::new());
        assert!(!request.navigate);
        assert!(!request.no_cache);
    }

    #[test]
    fn post_carries_body_and_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        let request = to_fetch_request(
            Method::POST,
            &"/api".parse().unwrap(),
            &headers,
            Bytes::from_static(b"{}"),
        );
        assert!(!request.navigate);
        assert!(request.no_cache);
        assert_eq!(request.content_type.as_deref(), Some("application/json"));
        assert_eq!(request.body, Bytes::from_static(b"{}"));
    }
}
