//! The gateway request pipeline.
//!
//! Order per the platform contract: source-address block check before
//! anything else, then route match, authentication and role policy, rate
//! budgeting, breaker admission, proxy, and finally the response hooks
//! (login-failure counting, logout denylisting, cache writes, rate-header
//! re-application).

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use axum::response::Response;
use eyre::Result;
use tracing::{debug, warn};
use uuid::Uuid;

use tradeline_contracts::headers as hdr;
use tradeline_contracts::Role;
use tradeline_coordination::{keys, CoordStore};

use crate::auth::{bearer_from_header, Identity, TokenVerifier};
use crate::breaker::{status_is_success, Admission, BreakerRegistry};
use crate::config::Config;
use crate::error::GatewayError;
use crate::ipblock::IpBlockGuard;
use crate::metrics;
use crate::proxy::{CachedResponse, ForwardedBody, ProxyEngine};
use crate::ratelimit::{apply_headers, RateDecision, RateLimiter};
use crate::routes::{Route, RoutePolicy, RouteTable};

/// Everything a request needs, constructed once at startup and threaded
/// through as an explicit dependency. No process-wide state affects
/// authorization decisions.
pub struct Gateway {
    pub verifier: TokenVerifier,
    pub limiter: RateLimiter,
    pub ipguard: IpBlockGuard,
    pub breakers: BreakerRegistry,
    pub routes: RouteTable,
    pub proxy: ProxyEngine,
    pub store: Arc<dyn CoordStore>,
    pub started_at: Instant,
    max_body_bytes: usize,
}

impl Gateway {
    pub fn new(config: &Config, store: Arc<dyn CoordStore>) -> Result<Self> {
        Ok(Self {
            verifier: TokenVerifier::new(&config.auth.jwt_secret, store.clone()),
            limiter: RateLimiter::new(store.clone(), config.rate.clone()),
            ipguard: IpBlockGuard::new(store.clone(), &config.block),
            breakers: BreakerRegistry::new(
                &crate::routes::Downstream::ALL,
                &config.breaker,
            ),
            routes: RouteTable::standard(),
            proxy: ProxyEngine::new(&config.proxy, &config.downstreams)?,
            store,
            started_at: Instant::now(),
            max_body_bytes: config.proxy.max_body_bytes,
        })
    }
}

/// Fallback handler running the full pipeline.
pub async fn handle(
    State(gateway): State<Arc<Gateway>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    let path = req.uri().path().to_string();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let method = req.method().clone();
    let source_address = client_ip(req.headers(), peer);
    let request_id = request_id(req.headers());

    // Blocked sources are rejected before any other processing
    if gateway.ipguard.is_blocked(&source_address).await {
        metrics::record_ip_blocked(&path);
        return finalize(
            GatewayError::IpBlocked.into_response_for(&path),
            None,
            &request_id,
            "blocked",
        );
    }

    // Route match
    let Some(matched) = gateway.routes.match_route(&method, &path) else {
        return finalize(
            GatewayError::RouteNotFound.into_response_for(&path),
            None,
            &request_id,
            "unmatched",
        );
    };
    let route = matched.route;

    // Token verification and role policy
    let identity = match authorize(&gateway.verifier, req.headers(), route, &matched.params).await {
        Ok(identity) => identity,
        Err(err) => {
            if let GatewayError::Auth(reason) = &err {
                metrics::record_auth_failure(reason.as_str());
            }
            return finalize(err.into_response_for(&path), None, &request_id, route.name);
        }
    };

    // Per-identity fixed-window budget
    let rate_key = identity
        .as_ref()
        .map(|i| i.subject.clone())
        .unwrap_or_else(|| source_address.clone());
    let decision = gateway.limiter.check(&rate_key, route.rate_class).await;
    if !decision.allowed {
        metrics::record_rate_limited(route.rate_class);
        return finalize(
            GatewayError::RateLimited.into_response_for(&path),
            Some(&decision),
            &request_id,
            route.name,
        );
    }

    // Response cache: idempotent GETs may be answered from the frozen store
    // without consulting the breaker (no downstream is involved).
    let cache_key = cacheable(route, &method).then(|| {
        keys::cache(
            method.as_str(),
            &path_and_query,
            identity.as_ref().map(|i| i.subject.as_str()).unwrap_or("anon"),
        )
    });
    if let Some(key) = &cache_key {
        if let Some(response) = cache_lookup(gateway.store.as_ref(), key).await {
            metrics::record_cache_result(route.name, true);
            return finalize(response, Some(&decision), &request_id, route.name);
        }
        metrics::record_cache_result(route.name, false);
    }

    // Buffer the request body (bounded) for forwarding. Done before breaker
    // admission so a rejected body cannot strand a half-open probe slot.
    let headers = req.headers().clone();
    let body = match axum::body::to_bytes(req.into_body(), gateway.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return finalize(
                GatewayError::BodyTooLarge.into_response_for(&path),
                Some(&decision),
                &request_id,
                route.name,
            );
        }
    };

    // Breaker admission. Every admitted request reports its outcome.
    let breaker = route
        .breaker_enabled
        .then(|| gateway.breakers.get(route.downstream.as_str()))
        .flatten();
    let mut probe = false;
    if let Some(breaker) = &breaker {
        match breaker.admit() {
            Admission::Allow => {}
            Admission::Probe => probe = true,
            Admission::Reject { retry_after_secs } => {
                metrics::record_short_circuit(route.downstream.as_str());
                return finalize(
                    GatewayError::BreakerOpen {
                        downstream: route.downstream.as_str(),
                        retry_after_secs,
                    }
                    .into_response_for(&path),
                    Some(&decision),
                    &request_id,
                    route.name,
                );
            }
        }
    }

    // Forward downstream
    let downstream_path = downstream_path_and_query(route, &path, &path_and_query);
    let started = Instant::now();
    let forwarded = gateway
        .proxy
        .forward(
            route.downstream,
            method,
            &downstream_path,
            &headers,
            identity.as_ref(),
            &request_id,
            body,
            cache_key.is_some(),
        )
        .await;
    metrics::record_upstream_latency(
        route.downstream.as_str(),
        started.elapsed().as_secs_f64(),
    );

    let forwarded = match forwarded {
        Ok(forwarded) => forwarded,
        Err(err) => {
            if let Some(breaker) = &breaker {
                breaker.record(false, probe);
            }
            let (kind, gateway_err) = match err {
                crate::proxy::ProxyError::Timeout => (
                    "timeout",
                    GatewayError::UpstreamTimeout {
                        downstream: route.downstream.as_str(),
                    },
                ),
                other => {
                    debug!(error = %other, downstream = %route.downstream.as_str(), "Proxy error");
                    (
                        "connect",
                        GatewayError::UpstreamUnreachable {
                            downstream: route.downstream.as_str(),
                        },
                    )
                }
            };
            metrics::record_proxy_error(route.downstream.as_str(), kind);
            return finalize(
                gateway_err.into_response_for(&path),
                Some(&decision),
                &request_id,
                route.name,
            );
        }
    };

    let status = forwarded.status;
    if let Some(breaker) = &breaker {
        breaker.record(status_is_success(status.as_u16()), probe);
    }

    // Login guard hook: failed logins count against the source address
    if route.login_guard && status.as_u16() == 401 {
        if let Err(e) = gateway.ipguard.record_login_failure(&source_address).await {
            warn!(error = %e, source = %source_address, "Failed to record login failure");
        }
    }

    // Logout hook: a successful logout denylists the presented token
    if route.logout_denylist && status.is_success() {
        if let Some(identity) = &identity {
            if let Err(e) = gateway
                .verifier
                .denylist(&identity.token_fingerprint, identity.remaining_lifetime())
                .await
            {
                warn!(error = %e, "Failed to denylist token on logout");
            }
        }
    }

    // Cache write for frozen 2xx responses
    if let (Some(key), Some(ttl)) = (&cache_key, route.cache_ttl) {
        if status.is_success() {
            if let ForwardedBody::Buffered(bytes) = &forwarded.body {
                let frozen = CachedResponse::freeze(status, &forwarded.headers, bytes);
                if let Some(json) = frozen.to_json() {
                    if let Err(e) = gateway.store.set(key, &json, Some(ttl)).await {
                        warn!(error = %e, "Cache write failed");
                    }
                }
            }
        }
    }

    finalize(
        forwarded.into_response(),
        Some(&decision),
        &request_id,
        route.name,
    )
}

/// Rate headers are re-applied after the downstream header copy so the
/// gateway's values survive; the request id is echoed on every response.
fn finalize(
    mut response: Response,
    decision: Option<&RateDecision>,
    request_id: &str,
    route_name: &str,
) -> Response {
    if let Some(decision) = decision {
        apply_headers(response.headers_mut(), decision);
    }
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(hdr::X_REQUEST_ID), value);
    }
    metrics::record_request(route_name, response.status().as_u16());
    response
}

/// Resolve identity per route policy.
async fn authorize(
    verifier: &TokenVerifier,
    headers: &HeaderMap,
    route: &Route,
    params: &std::collections::HashMap<&'static str, String>,
) -> Result<Option<Identity>, GatewayError> {
    if !route.policy.requires_auth() {
        return Ok(None);
    }

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let bearer = bearer_from_header(auth_header)?;
    let identity = verifier.verify(bearer).await?;

    match route.policy {
        RoutePolicy::Public | RoutePolicy::Authenticated => {}
        RoutePolicy::MinRole(required) => {
            if !identity.role.at_least(required) {
                return Err(GatewayError::Forbidden);
            }
        }
        RoutePolicy::OwnerOrAdmin => {
            let owner = params.get("subject").map(String::as_str).unwrap_or("");
            if identity.subject != owner && identity.role != Role::Admin {
                return Err(GatewayError::Forbidden);
            }
        }
    }

    Ok(Some(identity))
}

async fn cache_lookup(store: &dyn CoordStore, key: &str) -> Option<Response> {
    match store.get(key).await {
        Ok(Some(raw)) => CachedResponse::from_json(&raw).and_then(CachedResponse::into_response),
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "Cache lookup failed");
            None
        }
    }
}

fn cacheable(route: &Route, method: &Method) -> bool {
    route.cache_ttl.is_some() && *method == Method::GET
}

/// Downstream path plus the original query string.
fn downstream_path_and_query(route: &Route, path: &str, path_and_query: &str) -> String {
    let stripped = route.downstream_path(path);
    match path_and_query.split_once('?') {
        Some((_, query)) => format!("{stripped}?{query}"),
        None => stripped,
    }
}

/// Source address: rightmost `X-Forwarded-For` entry, falling back to the
/// peer socket address.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|xff| {
            xff.rsplit(',')
                .next()
                .map(str::trim)
                .and_then(|s| s.parse::<IpAddr>().ok())
        })
        .unwrap_or_else(|| peer.ip())
        .to_string()
}

/// Reuse a caller-supplied request id, generate one otherwise.
fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(hdr::X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
