//! Forwarding of admitted requests to the origin.

use async_trait::async_trait;
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::header::{self, HeaderName, HeaderValue};
use http::uri::{Authority, Scheme};
use http::{HeaderMap, Request, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use crate::identity::X_FORWARDED_FOR;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream must be an absolute http:// URI: {0}")]
    InvalidUpstream(String),
    #[error("could not build upstream request: {0}")]
    Request(#[from] http::Error),
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),
}

/// The origin behind the gate.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Forward an admitted request and return the origin's response.
    ///
    /// `client` is the resolved client address. Failures are answered with
    /// `502 Bad Gateway`, an expired deadline with `504 Gateway Timeout`.
    /// Nothing is retried.
    async fn forward(&self, request: Request<Body>, client: &str) -> Response;
}

/// Single-host reverse proxy on top of the hyper client.
#[derive(Clone)]
pub struct HyperUpstream {
    scheme: Scheme,
    authority: Authority,
    base_path: String,
    timeout: Option<Duration>,
    client: Client<HttpConnector, Body>,
}

impl std::fmt::Debug for HyperUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperUpstream")
            .field("scheme", &self.scheme)
            .field("authority", &self.authority)
            .field("base_path", &self.base_path)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HyperUpstream {
    pub fn new(upstream: &str) -> Result<Self, ProxyError> {
        let (scheme, authority, base_path) = parse_upstream(upstream)?;
        let client = Client::builder(TokioExecutor::new()).build_http();
        Ok(Self {
            scheme,
            authority,
            base_path,
            timeout: None,
            client,
        })
    }

    /// Bound the wait for the origin's response head.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_request(
        &self,
        request: Request<Body>,
        client: &str,
    ) -> Result<Request<Body>, ProxyError> {
        let (mut parts, body) = request.into_parts();

        let path = join_paths(&self.base_path, parts.uri.path());
        let path_and_query = match parts.uri.query() {
            Some(q) => format!("{path}?{q}"),
            None => path,
        };
        parts.uri = Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()?;

        strip_hop_by_hop(&mut parts.headers);
        append_forwarded_for(&mut parts.headers, client);

        Ok(Request::from_parts(parts, body))
    }

    async fn round_trip(
        &self,
        request: Request<Body>,
        client: &str,
    ) -> Result<Response, ProxyError> {
        let outbound = self.build_request(request, client)?;
        let pending = self.client.request(outbound);
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| ProxyError::Timeout(limit))??,
            None => pending.await?,
        };
        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

#[async_trait]
impl Upstream for HyperUpstream {
    async fn forward(&self, request: Request<Body>, client: &str) -> Response {
        match self.round_trip(request, client).await {
            Ok(response) => response,
            Err(err @ ProxyError::Timeout(_)) => {
                tracing::warn!(error = %err, client, "upstream timed out");
                (StatusCode::GATEWAY_TIMEOUT, "gateway timeout").into_response()
            }
            Err(err) => {
                tracing::warn!(error = %err, client, "upstream unavailable");
                (StatusCode::BAD_GATEWAY, "bad gateway").into_response()
            }
        }
    }
}

fn parse_upstream(upstream: &str) -> Result<(Scheme, Authority, String), ProxyError> {
    let invalid = || ProxyError::InvalidUpstream(upstream.to_owned());
    let uri: Uri = upstream.parse().map_err(|_| invalid())?;
    let scheme = uri.scheme().cloned().ok_or_else(invalid)?;
    if scheme != Scheme::HTTP {
        return Err(invalid());
    }
    let authority = uri.authority().cloned().ok_or_else(invalid)?;
    let base_path = uri.path().trim_end_matches('/').to_owned();
    Ok((scheme, authority, base_path))
}

/// Checks an upstream URI without building a client.
pub fn validate_upstream(upstream: &str) -> Result<(), ProxyError> {
    parse_upstream(upstream).map(|_| ())
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.is_empty(), path.starts_with('/')) {
        (true, true) => path.to_owned(),
        (true, false) => format!("/{path}"),
        (false, true) => format!("{base}{path}"),
        (false, false) => format!("{base}/{path}"),
    }
}

const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in Connection are hop-by-hop too.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in &named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, client: &str) {
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.is_empty() => format!("{prior}, {client}"),
        _ => client.to_owned(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_must_be_absolute_http() {
        assert!(validate_upstream("http://127.0.0.1:8080").is_ok());
        assert!(validate_upstream("http://origin.internal/app/").is_ok());
        assert!(validate_upstream("https://origin.internal").is_err());
        assert!(validate_upstream("/relative").is_err());
        assert!(validate_upstream("not a uri").is_err());
    }

    #[test]
    fn paths_are_joined_onto_the_base() {
        assert_eq!(join_paths("", "/a/b"), "/a/b");
        assert_eq!(join_paths("/app", "/a"), "/app/a");
        assert_eq!(join_paths("/app", "a"), "/app/a");
        assert_eq!(join_paths("", ""), "/");
    }

    #[tokio::test]
    async fn outbound_request_is_rewritten() {
        let upstream = HyperUpstream::new("http://127.0.0.1:9/app/").unwrap();
        let request = Request::builder()
            .uri("/page?x=1")
            .header(header::HOST, "public.example")
            .header(header::CONNECTION, "keep-alive, x-private")
            .header("x-private", "1")
            .header(header::TE, "trailers")
            .header(X_FORWARDED_FOR, "192.0.2.1")
            .header(header::USER_AGENT, "curl/8.5.0")
            .body(Body::empty())
            .unwrap();

        let outbound = upstream.build_request(request, "198.51.100.7").unwrap();
        assert_eq!(outbound.uri(), "http://127.0.0.1:9/app/page?x=1");
        let headers = outbound.headers();
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get("x-private").is_none());
        assert!(headers.get(header::TE).is_none());
        assert_eq!(headers[header::HOST], "public.example");
        assert_eq!(headers[header::USER_AGENT], "curl/8.5.0");
        assert_eq!(headers[X_FORWARDED_FOR], "192.0.2.1, 198.51.100.7");
    }

    #[tokio::test]
    async fn unreachable_origin_is_bad_gateway() {
        // Port 9 (discard) on loopback is not expected to accept connections.
        let upstream = HyperUpstream::new("http://127.0.0.1:9").unwrap();
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = upstream.forward(request, "127.0.0.1").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn silent_origin_is_gateway_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hold = tokio::spawn(async move {
            // Accept and keep the socket open without ever answering.
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let upstream = HyperUpstream::new(&format!("http://{addr}"))
            .unwrap()
            .with_timeout(Some(Duration::from_millis(100)));
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = upstream.forward(request, "127.0.0.1").await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        hold.abort();
    }
}
