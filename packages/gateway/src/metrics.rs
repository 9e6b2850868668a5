//! Prometheus metrics for the Tradeline gateway
//!
//! Exposed on the gateway's /metrics endpoint for scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Gauge, GaugeVec, HistogramVec,
};

lazy_static! {
    // Request metrics
    pub static ref REQUESTS: CounterVec = register_counter_vec!(
        "gateway_requests_total",
        "Total number of requests handled by the gateway",
        &["route", "status"]
    ).unwrap();

    pub static ref UPSTREAM_LATENCY: HistogramVec = register_histogram_vec!(
        "gateway_upstream_latency_seconds",
        "Time spent waiting on a downstream service",
        &["downstream"],
        vec![0.005, 0.025, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    // Protection metrics
    pub static ref RATE_LIMITED: CounterVec = register_counter_vec!(
        "gateway_rate_limited_total",
        "Requests rejected by the rate limiter",
        &["class"]
    ).unwrap();

    pub static ref IP_BLOCKED: CounterVec = register_counter_vec!(
        "gateway_ip_blocked_total",
        "Requests rejected because the source address is blocked",
        &["route"]
    ).unwrap();

    pub static ref AUTH_FAILURES: CounterVec = register_counter_vec!(
        "gateway_auth_failures_total",
        "Token verification failures",
        &["reason"]
    ).unwrap();

    // Circuit breaker metrics
    pub static ref BREAKER_STATE: GaugeVec = register_gauge_vec!(
        "gateway_breaker_state",
        "Circuit breaker state per downstream (0=closed, 1=open, 2=half-open)",
        &["downstream"]
    ).unwrap();

    pub static ref BREAKER_TRANSITIONS: CounterVec = register_counter_vec!(
        "gateway_breaker_transitions_total",
        "Circuit breaker state transitions",
        &["downstream", "to"]
    ).unwrap();

    pub static ref BREAKER_SHORT_CIRCUITS: CounterVec = register_counter_vec!(
        "gateway_breaker_short_circuits_total",
        "Requests rejected while a breaker was open",
        &["downstream"]
    ).unwrap();

    // Proxy metrics
    pub static ref PROXY_ERRORS: CounterVec = register_counter_vec!(
        "gateway_proxy_errors_total",
        "Proxy-level failures talking to a downstream",
        &["downstream", "kind"]
    ).unwrap();

    pub static ref CACHE_RESULTS: CounterVec = register_counter_vec!(
        "gateway_cache_results_total",
        "Response cache lookups",
        &["route", "result"]
    ).unwrap();

    // Health metrics
    pub static ref UP: Gauge = register_gauge!(
        "gateway_up",
        "Whether the gateway is up and running"
    ).unwrap();
}

/// Record a handled request
pub fn record_request(route: &str, status: u16) {
    REQUESTS
        .with_label_values(&[route, &status.to_string()])
        .inc();
}

/// Record downstream latency
pub fn record_upstream_latency(downstream: &str, seconds: f64) {
    UPSTREAM_LATENCY
        .with_label_values(&[downstream])
        .observe(seconds);
}

/// Record a rate-limited request
pub fn record_rate_limited(class: &str) {
    RATE_LIMITED.with_label_values(&[class]).inc();
}

/// Record a blocked source address rejection
pub fn record_ip_blocked(route: &str) {
    IP_BLOCKED.with_label_values(&[route]).inc();
}

/// Record a token verification failure
pub fn record_auth_failure(reason: &str) {
    AUTH_FAILURES.with_label_values(&[reason]).inc();
}

/// Update the breaker state gauge
pub fn set_breaker_state(downstream: &str, state: f64) {
    BREAKER_STATE.with_label_values(&[downstream]).set(state);
}

/// Record a breaker transition
pub fn record_breaker_transition(downstream: &str, to: &str) {
    BREAKER_TRANSITIONS.with_label_values(&[downstream, to]).inc();
}

/// Record a short-circuited request
pub fn record_short_circuit(downstream: &str) {
    BREAKER_SHORT_CIRCUITS.with_label_values(&[downstream]).inc();
}

/// Record a proxy failure
pub fn record_proxy_error(downstream: &str, kind: &str) {
    PROXY_ERRORS.with_label_values(&[downstream, kind]).inc();
}

/// Record a cache lookup outcome
pub fn record_cache_result(route: &str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    CACHE_RESULTS.with_label_values(&[route, result]).inc();
}
