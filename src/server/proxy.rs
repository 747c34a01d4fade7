//! Admin pass-through to the platform API.
//!
//! The request is replayed upstream with the caller's own `Authorization`
//! header, so the platform applies its own admin checks.

use axum::body::{Body, to_bytes};
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName, header};
use axum::response::Response;

use crate::{Error, Result};

/// Largest request body forwarded upstream.
pub const MAX_FORWARD_BODY: usize = 10 * 1024 * 1024;

/// Forwards requests to the platform API.
#[derive(Debug, Clone)]
pub struct Proxy {
    http: reqwest::Client,
    base: String,
}

impl Proxy {
    /// Creates a proxy to `endpoint`.
    #[must_use]
    pub fn new(http: reqwest::Client, endpoint: &str) -> Self {
        Self {
            http,
            base: endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Replays `request` upstream and returns the upstream response as is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the body exceeds
    /// [`MAX_FORWARD_BODY`], or a 502 [`Error::Upstream`] if the platform
    /// cannot be reached.
    pub async fn forward(&self, request: Request) -> Result<Response> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path(), |pq| pq.as_str());
        let url = format!("{}{path_and_query}", self.base);

        let body = to_bytes(body, MAX_FORWARD_BODY)
            .await
            .map_err(|e| Error::InvalidInput(format!("unreadable request body: {e}")))?;

        tracing::debug!(method = %parts.method, url = %url, "Forwarding request upstream");

        let upstream = self
            .http
            .request(parts.method, &url)
            .headers(strip_hop_by_hop(parts.headers))
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Upstream {
                status: 502,
                code: 502,
                title: "Bad Gateway".to_string(),
                detail: format!("platform API unreachable: {e}"),
            })?;

        let status = upstream.status();
        let headers = strip_hop_by_hop(upstream.headers().clone());
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| Error::operation("proxy_read_body", e))?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Drops the headers that describe one hop.
fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    let hop_by_hop: [HeaderName; 9] = [
        header::CONNECTION,
        header::HOST,
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
        header::CONTENT_LENGTH,
    ];
    for name in hop_by_hop {
        headers.remove(name);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Method, StatusCode};
    use wiremock::matchers::{body_string, header as header_is, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_forwards_method_path_query_body_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v3/security_groups/g1"))
            .and(query_param("include", "x"))
            .and(header_is("authorization", "bearer admin-token"))
            .and(body_string(r#"{"name":"new"}"#))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-upstream", "yes")
                    .set_body_string(r#"{"guid":"g1"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let proxy = Proxy::new(reqwest::Client::new(), &server.uri());
        let mut request = Request::builder()
            .method(Method::PATCH)
            .uri("/v3/security_groups/g1?include=x")
            .body(Body::from(r#"{"name":"new"}"#))
            .unwrap();
        request.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("bearer admin-token"),
        );

        let response = proxy.forward(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-upstream"], "yes");
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], br#"{"guid":"g1"}"#);
    }

    #[tokio::test]
    async fn test_upstream_status_passes_through() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .mount(&server)
            .await;

        let proxy = Proxy::new(reqwest::Client::new(), &server.uri());
        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/v3/security_groups/g1")
            .body(Body::empty())
            .unwrap();

        let response = proxy.forward(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unreachable_platform_is_bad_gateway() {
        let proxy = Proxy::new(reqwest::Client::new(), "http://127.0.0.1:9");
        let request = Request::builder()
            .uri("/v3/info")
            .body(Body::empty())
            .unwrap();

        let err = proxy.forward(request).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
