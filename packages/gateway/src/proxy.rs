//! Proxy engine: forwards a matched request to its downstream service.
//!
//! The downstream request carries the original method, stripped path, query,
//! body, and headers minus hop-by-hop and identity headers; the gateway then
//! injects `X-Request-ID` and the verified `X-User-*` pair. Responses stream
//! back verbatim apart from hop-by-hop headers; cacheable responses are
//! buffered so they can be frozen into the coordination store.

use std::collections::HashMap;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;
use base64::Engine;
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use tracing::debug;

use tradeline_contracts::headers as hdr;

use crate::auth::Identity;
use crate::config::{DownstreamConfig, ProxyConfig};
use crate::routes::Downstream;

/// Hop-by-hop headers never copied across the proxy (RFC 7230 §6.1).
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("downstream timed out")]
    Timeout,
    #[error("downstream unreachable: {0}")]
    Connect(String),
    #[error("downstream request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProxyError::Timeout
        } else if e.is_connect() {
            ProxyError::Connect(e.to_string())
        } else {
            ProxyError::Other(e.to_string())
        }
    }
}

/// Downstream response handed back to the pipeline.
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ForwardedBody,
}

pub enum ForwardedBody {
    /// Buffered for cache writes.
    Buffered(Bytes),
    /// Streamed straight through to the client.
    Stream(Body),
}

impl ForwardedResponse {
    pub fn into_response(self) -> Response {
        let mut response = Response::new(match self.body {
            ForwardedBody::Buffered(bytes) => Body::from(bytes),
            ForwardedBody::Stream(body) => body,
        });
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// A frozen cacheable response stored in the coordination store.
#[derive(Debug, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body_b64: String,
}

impl CachedResponse {
    pub fn freeze(status: StatusCode, headers: &HeaderMap, body: &Bytes) -> Self {
        Self {
            status: status.as_u16(),
            content_type: headers
                .get(axum::http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body_b64: base64::engine::general_purpose::STANDARD.encode(body),
        }
    }

    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    pub fn into_response(self) -> Option<Response> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(self.body_b64)
            .ok()?;
        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = StatusCode::from_u16(self.status).ok()?;
        if let Some(ct) = self.content_type.as_deref() {
            if let Ok(value) = HeaderValue::from_str(ct) {
                response
                    .headers_mut()
                    .insert(axum::http::header::CONTENT_TYPE, value);
            }
        }
        Some(response)
    }
}

pub struct ProxyEngine {
    client: reqwest::Client,
    targets: HashMap<Downstream, String>,
}

impl ProxyEngine {
    pub fn new(proxy: &ProxyConfig, downstreams: &DownstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(proxy.timeout_secs))
            .connect_timeout(Duration::from_secs(proxy.connect_timeout_secs))
            .read_timeout(Duration::from_secs(proxy.idle_timeout_secs))
            .build()
            .wrap_err("Failed to build proxy HTTP client")?;

        let targets = HashMap::from([
            (Downstream::User, normalize_base(&downstreams.user_url)),
            (Downstream::Order, normalize_base(&downstreams.order_url)),
            (
                Downstream::Inventory,
                normalize_base(&downstreams.inventory_url),
            ),
        ]);

        Ok(Self { client, targets })
    }

    /// Forward the request and return the downstream's answer.
    #[allow(clippy::too_many_arguments)]
    pub async fn forward(
        &self,
        downstream: Downstream,
        method: Method,
        path_and_query: &str,
        request_headers: &HeaderMap,
        identity: Option<&Identity>,
        request_id: &str,
        body: Bytes,
        buffer_response: bool,
    ) -> Result<ForwardedResponse, ProxyError> {
        let base = self
            .targets
            .get(&downstream)
            .expect("all downstreams registered at startup");
        let url = format!("{base}{path_and_query}");

        let headers = build_downstream_headers(request_headers, identity, request_id);
        debug!(%url, %method, request_id, "Forwarding request");

        let response = self
            .client
            .request(method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let mut headers = HeaderMap::new();
        for (name, value) in response.headers() {
            if !is_hop_by_hop(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        if let Ok(value) = HeaderValue::from_str(request_id) {
            headers.insert(HeaderName::from_static(hdr::X_REQUEST_ID), value);
        }

        let body = if buffer_response {
            ForwardedBody::Buffered(response.bytes().await?)
        } else {
            ForwardedBody::Stream(Body::from_stream(response.bytes_stream()))
        };

        Ok(ForwardedResponse {
            status,
            headers,
            body,
        })
    }
}

fn normalize_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Copy request headers downstream, dropping hop-by-hop, host, and any
/// caller-supplied identity headers, then inject the gateway's own.
fn build_downstream_headers(
    original: &HeaderMap,
    identity: Option<&Identity>,
    request_id: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in original {
        let lowered = name.as_str();
        if is_hop_by_hop(name)
            || lowered == "host"
            || lowered == "content-length"
            || lowered == hdr::X_REQUEST_ID
            || lowered == hdr::X_USER_SUBJECT
            || lowered == hdr::X_USER_ROLE
        {
            continue;
        }
        headers.insert(name.clone(), value.clone());
    }

    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(HeaderName::from_static(hdr::X_REQUEST_ID), value);
    }
    if let Some(identity) = identity {
        if let Ok(value) = HeaderValue::from_str(&identity.subject) {
            headers.insert(HeaderName::from_static(hdr::X_USER_SUBJECT), value);
        }
        if let Ok(value) = HeaderValue::from_str(identity.role.as_str()) {
            headers.insert(HeaderName::from_static(hdr::X_USER_ROLE), value);
        }
    }
    headers
}
