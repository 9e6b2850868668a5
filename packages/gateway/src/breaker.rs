//! Per-downstream circuit breakers.
//!
//! Closed counts consecutive failures inside a rolling window and opens at
//! the threshold. Open short-circuits until the cooldown elapses, then
//! half-open admits a bounded number of probes; consecutive probe successes
//! close the breaker, any probe failure reopens it and restarts the
//! cooldown. Responses are classified by the caller: 5xx, timeouts, and
//! connect errors are failures, everything else is a success.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::{BreakerConfig, BreakerSettings};
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }

    fn gauge_value(&self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::Open => 1.0,
            BreakerState::HalfOpen => 2.0,
        }
    }
}

/// Admission decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker closed: forward normally.
    Allow,
    /// Breaker half-open: forward as a probe; the outcome must be reported
    /// with `probe = true`.
    Probe,
    /// Breaker open: short-circuit with 503.
    Reject { retry_after_secs: u64 },
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    /// Consecutive failures inside the current window (closed state)
    failure_count: u32,
    window_start: Option<Instant>,
    opened_at: Option<Instant>,
    /// Consecutive probe successes (half-open state)
    probe_successes: u32,
    probes_in_flight: u32,
}

/// Breaker for a single downstream.
pub struct CircuitBreaker {
    downstream: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(downstream: impl Into<String>, settings: BreakerSettings) -> Self {
        let downstream = downstream.into();
        metrics::set_breaker_state(&downstream, BreakerState::Closed.gauge_value());
        Self {
            downstream,
            settings,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                window_start: None,
                opened_at: None,
                probe_successes: 0,
                probes_in_flight: 0,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker mutex poisoned").state
    }

    /// Decide whether this request may go downstream.
    pub fn admit(&self) -> Admission {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            BreakerState::Closed => Admission::Allow,
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                let cooldown = Duration::from_secs(self.settings.cooldown_secs);
                if elapsed >= cooldown {
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    inner.probes_in_flight = 1;
                    Admission::Probe
                } else {
                    Admission::Reject {
                        retry_after_secs: (cooldown - elapsed).as_secs().max(1),
                    }
                }
            }
            BreakerState::HalfOpen => {
                if inner.probes_in_flight < self.settings.probes {
                    inner.probes_in_flight += 1;
                    Admission::Probe
                } else {
                    Admission::Reject { retry_after_secs: 1 }
                }
            }
        }
    }

    /// Report the outcome of an admitted request.
    pub fn record(&self, success: bool, probe: bool) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        if probe {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }

        match (inner.state, success) {
            (BreakerState::Closed, true) => {
                inner.failure_count = 0;
                inner.window_start = None;
            }
            (BreakerState::Closed, false) => {
                let window = Duration::from_secs(self.settings.window_secs);
                let expired = inner
                    .window_start
                    .is_some_and(|start| start.elapsed() > window);
                if expired || inner.window_start.is_none() {
                    inner.window_start = Some(Instant::now());
                    inner.failure_count = 0;
                }
                inner.failure_count += 1;
                if inner.failure_count >= self.settings.failure_threshold {
                    warn!(
                        downstream = %self.downstream,
                        failures = inner.failure_count,
                        "Circuit breaker opened"
                    );
                    self.transition(&mut inner, BreakerState::Open);
                }
            }
            (BreakerState::HalfOpen, true) => {
                // Only probe outcomes count toward recovery; a straggler
                // admitted before the trip carries no signal.
                if probe {
                    inner.probe_successes += 1;
                    if inner.probe_successes >= self.settings.probes {
                        info!(downstream = %self.downstream, "Circuit breaker closed after recovery");
                        self.transition(&mut inner, BreakerState::Closed);
                    }
                }
            }
            (BreakerState::HalfOpen, false) => {
                warn!(downstream = %self.downstream, "Probe failed, circuit breaker reopened");
                self.transition(&mut inner, BreakerState::Open);
            }
            // Late results after a transition carry no signal
            (BreakerState::Open, _) => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState) {
        inner.state = to;
        metrics::set_breaker_state(&self.downstream, to.gauge_value());
        metrics::record_breaker_transition(&self.downstream, to.as_str());
        match to {
            BreakerState::Closed => {
                inner.failure_count = 0;
                inner.window_start = None;
                inner.opened_at = None;
                inner.probe_successes = 0;
                inner.probes_in_flight = 0;
            }
            BreakerState::Open => {
                inner.opened_at = Some(Instant::now());
                inner.probe_successes = 0;
                inner.probes_in_flight = 0;
            }
            BreakerState::HalfOpen => {
                inner.probe_successes = 0;
                inner.probes_in_flight = 0;
            }
        }
    }
}

/// Breakers for the fixed set of downstreams, built at startup.
pub struct BreakerRegistry {
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// One breaker per downstream, each with its own thresholds.
    pub fn new(downstreams: &[&str], config: &BreakerConfig) -> Self {
        let breakers = downstreams
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    Arc::new(CircuitBreaker::new(
                        *name,
                        config.for_downstream(name).clone(),
                    )),
                )
            })
            .collect();
        Self { breakers }
    }

    pub fn get(&self, downstream: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(downstream).cloned()
    }

    /// Current state per downstream, for the status endpoint.
    pub fn states(&self) -> Vec<(String, BreakerState)> {
        let mut states: Vec<_> = self
            .breakers
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}

/// Classify a downstream HTTP status: 5xx is a failure, everything else
/// (including 4xx) counts as the downstream answering.
pub fn status_is_success(status: u16) -> bool {
    status < 500
}
