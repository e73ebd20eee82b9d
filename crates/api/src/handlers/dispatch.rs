//! Dynamic endpoint dispatch.
//!
//! Mounted as the router fallback. Each request resolves `(path, method)`
//! against the artifact registry at request time, runs the matching snippet
//! and records the exchange in the request log.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use snipgate_core::artifact::HttpMethod;
use snipgate_core::execution::RequestContext;
use snipgate_core::request_log::NewRequestLog;

use crate::error::AppError;
use crate::state::AppState;

/// Response header carrying the execution's correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Largest request body read into `request_data.body`.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Fallback handler: serve the artifact registered for this request.
///
/// - success: `200 {"result": value, "stdout": text}`
/// - snippet failure: `500 {"error": stderr, "stdout": text}`
/// - no enabled artifact: `404`
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let started = Instant::now();
    let (parts, body) = request.into_parts();
    let context = request_context(&parts);

    let dispatched = resolve_and_run(&state, &parts, body, &context).await;
    let (status, payload, correlation_id) = match dispatched {
        Ok(outcome) => outcome,
        Err(e) => return e.into_response(),
    };

    let response_body = payload.to_string();
    let entry = NewRequestLog {
        timestamp: Utc::now(),
        method: context.method,
        path: context.path,
        query_params: context.query_params,
        headers: context.headers,
        client_ip: client_ip(&parts),
        status_code: status.as_u16(),
        response_body,
        response_time_ms: started.elapsed().as_millis() as i64,
    };
    if let Err(e) = state.stores.request_logs.append(entry).await {
        tracing::warn!(error = %e, "Failed to write request log entry");
    }

    let mut response = (status, Json(payload)).into_response();
    if let Some(id) = correlation_id {
        if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(CORRELATION_ID_HEADER), value);
        }
    }
    response
}

type Dispatched = (StatusCode, Value, Option<uuid::Uuid>);

async fn resolve_and_run(
    state: &AppState,
    parts: &Parts,
    body: Body,
    context: &RequestContext,
) -> Result<Dispatched, AppError> {
    let path = parts.uri.path();
    let Ok(method) = parts.method.as_str().parse::<HttpMethod>() else {
        return Ok(unmatched(parts));
    };
    let Some(artifact) = state.stores.artifacts.resolve(path, method).await? else {
        return Ok(unmatched(parts));
    };

    let mut context = context.clone();
    if method.carries_body() {
        let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read request body: {e}")))?;
        context.body = serde_json::from_slice(&bytes).ok();
    }

    let (correlation_id, result) = state.runtime.run_artifact(&artifact, &context).await;
    let (status, payload) = if result.success {
        (
            StatusCode::OK,
            json!({"result": result.value, "stdout": result.stdout}),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": result.stderr, "stdout": result.stdout}),
        )
    };
    Ok((status, payload, Some(correlation_id)))
}

fn unmatched(parts: &Parts) -> Dispatched {
    let message = format!("No endpoint serves {} {}", parts.method, parts.uri.path());
    (
        StatusCode::NOT_FOUND,
        json!({"error": message, "code": "NOT_FOUND"}),
        None,
    )
}

fn request_context(parts: &Parts) -> RequestContext {
    let query_params = Query::<BTreeMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(q)| q)
        .unwrap_or_default();
    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    RequestContext {
        path: parts.uri.path().to_string(),
        method: parts.method.as_str().to_string(),
        query_params,
        headers,
        body: None,
    }
}

/// First `x-forwarded-for` hop, else the peer address when known.
fn client_ip(parts: &Parts) -> Option<String> {
    let forwarded = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    forwarded.or_else(|| {
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(uri: &str) -> Parts {
        let (parts, _) = axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("x-forwarded-for", "10.0.0.7, 172.16.0.1")
            .header("x-api-key", "abc")
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn context_captures_query_and_headers() {
        let context = request_context(&parts("/hooks/in?a=1&b=two"));
        assert_eq!(context.path, "/hooks/in");
        assert_eq!(context.method, "POST");
        assert_eq!(context.query_params.get("b").map(String::as_str), Some("two"));
        assert_eq!(context.headers.get("x-api-key").map(String::as_str), Some("abc"));
        assert!(context.body.is_none());
    }

    #[test]
    fn client_ip_prefers_first_forwarded_hop() {
        assert_eq!(client_ip(&parts("/x")).as_deref(), Some("10.0.0.7"));
    }
}
