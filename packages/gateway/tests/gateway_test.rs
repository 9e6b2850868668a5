//! Integration tests for the gateway pipeline.
//!
//! The router is driven in-process with downstream URLs pointing at a closed
//! port, so proxied requests surface as 502s. That is enough to exercise
//! route matching, auth, role policy, rate limiting, IP blocking, breaker
//! state, and the response headers without running the platform.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use tower::ServiceExt;

use gateway::config::{
    AuthConfig, BlockConfig, BreakerConfig, BreakerSettings, Config, DownstreamConfig, ProxyConfig,
    RateConfig,
};
use gateway::pipeline::Gateway;
use gateway::server::build_router;
use tradeline_contracts::TokenClaims;
use tradeline_coordination::{keys, CoordStore, MemoryStore};

const SECRET: &str = "integration-test-secret-key";

/// Nothing listens on port 9; every proxied request fails to connect.
const DEAD_DOWNSTREAM: &str = "http://127.0.0.1:9";

fn test_config() -> Config {
    Config {
        bind: "127.0.0.1:0".to_string(),
        auth: AuthConfig {
            jwt_secret: SECRET.to_string(),
        },
        downstreams: DownstreamConfig {
            user_url: DEAD_DOWNSTREAM.to_string(),
            order_url: DEAD_DOWNSTREAM.to_string(),
            inventory_url: DEAD_DOWNSTREAM.to_string(),
        },
        rate: RateConfig {
            window_secs: 60,
            default_limit: 10_000,
            auth_limit: 10_000,
            trading_limit: 10_000,
            public_read_limit: 10_000,
        },
        block: BlockConfig {
            threshold: 5,
            duration_secs: 86_400,
        },
        breaker: BreakerConfig {
            default: BreakerSettings {
                failure_threshold: 100,
                window_secs: 60,
                cooldown_secs: 60,
                probes: 3,
            },
            per_downstream: std::collections::HashMap::new(),
        },
        proxy: ProxyConfig {
            timeout_secs: 5,
            connect_timeout_secs: 1,
            idle_timeout_secs: 5,
            max_body_bytes: 64 * 1024,
        },
    }
}

struct Harness {
    router: axum::Router,
    store: Arc<MemoryStore>,
    gateway: Arc<Gateway>,
}

fn harness(config: Config) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(Gateway::new(&config, store.clone()).unwrap());
    Harness {
        router: build_router(gateway.clone()),
        store,
        gateway,
    }
}

fn token(sub: &str, role: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = TokenClaims {
        sub: sub.to_string(),
        role: role.to_string(),
        iat: now,
        exp: now + 3600,
        jti: uuid::Uuid::new_v4().to_string(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn request(method: &str, uri: &str) -> Request<Body> {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let peer: SocketAddr = "192.0.2.10:40000".parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(peer));
    req
}

fn with_bearer(mut req: Request<Body>, bearer: &str) -> Request<Body> {
    req.headers_mut().insert(
        axum::http::header::AUTHORIZATION,
        format!("Bearer {bearer}").parse().unwrap(),
    );
    req
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_default()
}

#[tokio::test]
async fn test_health_is_gateway_local() {
    let h = harness(test_config());
    let response = h.router.oneshot(request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_endpoint_serves_prometheus_text() {
    let h = harness(test_config());
    let response = h.router.oneshot(request("GET", "/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("gateway_breaker_state"));
}

#[tokio::test]
async fn test_unknown_route_is_404_problem() {
    let h = harness(test_config());
    let response = h
        .router
        .oneshot(request("GET", "/api/v1/nope"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/problem+json"
    );
    let body = body_json(response).await;
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let h = harness(test_config());
    let response = h
        .router
        .oneshot(request("GET", "/api/v1/balance"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "AUTH_MISSING");
}

#[tokio::test]
async fn test_public_route_bypasses_auth_and_reaches_proxy() {
    let h = harness(test_config());
    let response = h
        .router
        .oneshot(request("GET", "/api/v1/inventory/assets"))
        .await
        .unwrap();
    // Downstream is dead, so the pipeline got all the way to the proxy
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(response.headers().contains_key("x-ratelimit-limit"));
    assert!(response.headers().contains_key("x-request-id"));
    let body = body_json(response).await;
    assert_eq!(body["code"], "UPSTREAM_ERROR");
}

#[tokio::test]
async fn test_insufficient_role_is_403() {
    let h = harness(test_config());
    let response = h
        .router
        .oneshot(with_bearer(
            request("GET", "/api/v1/balance"),
            &token("alice", "public"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["code"], "PERM_FORBIDDEN");
}

#[tokio::test]
async fn test_portfolio_owner_or_admin() {
    let h = harness(test_config());

    // Alice asking for Bob's portfolio: forbidden
    let response = h
        .router
        .clone()
        .oneshot(with_bearer(
            request("GET", "/api/v1/portfolio/bob"),
            &token("alice", "customer"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Alice asking for her own: passes authorization, dies at the proxy
    let response = h
        .router
        .clone()
        .oneshot(with_bearer(
            request("GET", "/api/v1/portfolio/alice"),
            &token("alice", "customer"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    // Admin asking for Bob's: same
    let response = h
        .router
        .oneshot(with_bearer(
            request("GET", "/api/v1/portfolio/bob"),
            &token("root", "admin"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_expired_token_is_401_auth_expired() {
    let h = harness(test_config());
    let now = Utc::now().timestamp();
    let claims = TokenClaims {
        sub: "alice".to_string(),
        role: "customer".to_string(),
        iat: now - 7200,
        exp: now - 3600,
        jti: uuid::Uuid::new_v4().to_string(),
    };
    let expired = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();

    let response = h
        .router
        .oneshot(with_bearer(request("GET", "/api/v1/balance"), &expired))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "AUTH_EXPIRED");
}

#[tokio::test]
async fn test_denylisted_token_is_401_auth_revoked() {
    let h = harness(test_config());
    let bearer = token("alice", "customer");
    let fingerprint = gateway::auth::fingerprint(&bearer);
    h.store
        .set(
            &keys::denylist(&fingerprint),
            "revoked",
            Some(std::time::Duration::from_secs(60)),
        )
        .await
        .unwrap();

    let response = h
        .router
        .oneshot(with_bearer(request("GET", "/api/v1/balance"), &bearer))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "AUTH_REVOKED");
}

#[tokio::test]
async fn test_rate_limit_headers_count_down_then_429() {
    let mut config = test_config();
    config.rate.public_read_limit = 3;
    let h = harness(config);

    let mut remaining = Vec::new();
    for _ in 0..3 {
        let response = h
            .router
            .clone()
            .oneshot(request("GET", "/api/v1/inventory/assets"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        remaining.push(
            response
                .headers()
                .get("x-ratelimit-remaining")
                .unwrap()
                .to_str()
                .unwrap()
                .to_string(),
        );
    }
    assert_eq!(remaining, vec!["2", "1", "0"]);

    let response = h
        .router
        .oneshot(request("GET", "/api/v1/inventory/assets"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get("x-ratelimit-remaining").unwrap(), "0");
    let reset: u64 = response
        .headers()
        .get("x-ratelimit-reset")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&reset));
    let body = body_json(response).await;
    assert_eq!(body["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn test_rate_budgets_are_per_identity() {
    let mut config = test_config();
    config.rate.default_limit = 1;
    let h = harness(config);

    // Alice exhausts her budget
    let response = h
        .router
        .clone()
        .oneshot(with_bearer(
            request("GET", "/api/v1/balance"),
            &token("alice", "customer"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let response = h
        .router
        .clone()
        .oneshot(with_bearer(
            request("GET", "/api/v1/balance"),
            &token("alice", "customer"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Bob still has his own window
    let response = h
        .router
        .oneshot(with_bearer(
            request("GET", "/api/v1/balance"),
            &token("bob", "customer"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_breaker_opens_after_failures_and_short_circuits() {
    let mut config = test_config();
    config.breaker.default.failure_threshold = 2;
    let h = harness(config);

    for _ in 0..2 {
        let response = h
            .router
            .clone()
            .oneshot(request("GET", "/api/v1/inventory/assets"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    let response = h
        .router
        .oneshot(request("GET", "/api/v1/inventory/assets"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key("retry-after"));
    let body = body_json(response).await;
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_breakers_are_per_downstream() {
    let mut config = test_config();
    config.breaker.default.failure_threshold = 1;
    let h = harness(config);

    // Trip the inventory breaker
    let response = h
        .router
        .clone()
        .oneshot(request("GET", "/api/v1/inventory/assets"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let response = h
        .router
        .clone()
        .oneshot(request("GET", "/api/v1/inventory/assets"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // The user downstream still forwards (and fails with 502, not 503)
    let response = h
        .router
        .oneshot(with_bearer(
            request("GET", "/api/v1/balance"),
            &token("alice", "customer"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_blocked_source_rejected_before_everything() {
    let h = harness(test_config());
    for _ in 0..5 {
        h.gateway
            .ipguard
            .record_login_failure("192.0.2.10")
            .await
            .unwrap();
    }

    // Even an unknown path answers 403 for a blocked address
    let response = h
        .router
        .clone()
        .oneshot(request("GET", "/api/v1/anything"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["code"], "IP_BLOCKED");
    assert!(body["type"]
        .as_str()
        .unwrap()
        .ends_with("/authentication-error"));
    assert!(body["detail"].as_str().unwrap().to_lowercase().contains("block"));

    // A different source address is unaffected
    let mut req = Request::builder()
        .method("GET")
        .uri("/api/v1/inventory/assets")
        .body(Body::empty())
        .unwrap();
    let peer: SocketAddr = "192.0.2.99:40000".parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(peer));
    let response = h.router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_block_lifted_after_operator_clear() {
    let h = harness(test_config());
    for _ in 0..5 {
        h.gateway
            .ipguard
            .record_login_failure("192.0.2.10")
            .await
            .unwrap();
    }
    let response = h
        .router
        .clone()
        .oneshot(request("GET", "/api/v1/inventory/assets"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    h.gateway.ipguard.clear("192.0.2.10").await.unwrap();
    let response = h
        .router
        .oneshot(request("GET", "/api/v1/inventory/assets"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_request_id_echoed_and_generated() {
    let h = harness(test_config());

    let mut req = request("GET", "/api/v1/inventory/assets");
    req.headers_mut()
        .insert("x-request-id", "trace-42".parse().unwrap());
    let response = h.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.headers().get("x-request-id").unwrap(), "trace-42");

    let response = h
        .router
        .oneshot(request("GET", "/api/v1/inventory/assets"))
        .await
        .unwrap();
    let generated = response
        .headers()
        .get("x-request-id")
        .unwrap()
        .to_str()
        .unwrap();
    assert_eq!(generated.len(), 36);
}

#[tokio::test]
async fn test_cached_response_serves_without_downstream() {
    let h = harness(test_config());

    // Freeze a response the way the proxy would
    let frozen = gateway::proxy::CachedResponse {
        status: 200,
        content_type: Some("application/json".to_string()),
        body_b64: base64_encode(b"{\"assets\":[]}"),
    };
    let key = keys::cache("GET", "/api/v1/inventory/assets", "anon");
    h.store
        .set(
            &key,
            &frozen.to_json().unwrap(),
            Some(std::time::Duration::from_secs(60)),
        )
        .await
        .unwrap();

    let response = h
        .router
        .oneshot(request("GET", "/api/v1/inventory/assets"))
        .await
        .unwrap();
    // Downstream is dead; only the cache can answer 200
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-ratelimit-limit"));
    let body = body_json(response).await;
    assert_eq!(body["assets"], serde_json::json!([]));
}

fn base64_encode(input: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(input)
}

#[tokio::test]
async fn test_status_reports_breaker_states() {
    let mut config = test_config();
    config.breaker.default.failure_threshold = 1;
    let h = harness(config);

    let response = h.router.clone().oneshot(request("GET", "/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["breakers"]["user"], "closed");
    assert_eq!(body["breakers"]["inventory"], "closed");

    // Trip inventory, status reflects it
    let response = h
        .router
        .clone()
        .oneshot(request("GET", "/api/v1/inventory/assets"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let response = h.router.oneshot(request("GET", "/status")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["breakers"]["inventory"], "open");
    assert_eq!(body["breakers"]["user"], "closed");
}

#[tokio::test]
async fn test_probes_answer() {
    let h = harness(test_config());
    for path in ["/healthz", "/readyz"] {
        let response = h.router.clone().oneshot(request("GET", path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{path}");
    }
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let h = harness(test_config());

    let response = h.router.clone().oneshot(request("GET", "/health")).await.unwrap();
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");

    // Error responses carry them too
    let response = h
        .router
        .oneshot(request("GET", "/api/v1/nope"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
}
