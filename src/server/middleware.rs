//! Request tracking and session verification.

use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::Instrument;

use crate::observability::{REQUEST_ID_HEADER, RequestContext, scope_request_context};

use super::AppState;
use super::routes;

/// Wraps every request in a span, records metrics and echoes the request id.
pub async fn track(request: Request, next: Next) -> Response {
    let context = RequestContext::from_header(
        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    let request_id = context.request_id().to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let endpoint = if path == "/metrics" {
        "metrics"
    } else if path.starts_with("/v2/security_entitlement") {
        "entitlements"
    } else {
        routes::dispatch(method.as_str(), &path).kind.as_str()
    };

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
        endpoint,
        is_admin = tracing::field::Empty,
    );

    let start = Instant::now();
    let mut response = scope_request_context(context, next.run(request))
        .instrument(span.clone())
        .await;
    let elapsed = start.elapsed();
    let status = response.status().as_u16();

    metrics::counter!(
        "cfsecurity_http_total",
        "endpoint" => endpoint,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("cfsecurity_http_request_duration_seconds", "endpoint" => endpoint)
        .record(elapsed.as_secs_f64());

    span.in_scope(|| {
        tracing::info!(
            status,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "Request completed"
        );
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Verifies the bearer token and makes sure the service credential is fresh.
///
/// The verified [`crate::auth::Session`] is stored in the request extensions.
pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let session = match state.verifier.verify_session(header) {
        Ok(session) => session,
        Err(e) => {
            metrics::counter!("cfsecurity_auth_failures_total").increment(1);
            return e.into_response();
        },
    };
    tracing::Span::current().record("is_admin", session.is_admin);

    if let Err(e) = state.tokens.ensure_fresh_token().await {
        return e.into_response();
    }

    request.extensions_mut().insert(session);
    next.run(request).await
}
