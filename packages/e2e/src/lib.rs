//! Tradeline E2E test suite.
//!
//! Drives a running deployment (gateway + services) through the platform's
//! end-to-end scenarios: public route bypass, rate-limit headers, IP
//! blocking, token denylisting, concurrent order serialization, and breaker
//! behavior. Destructive scenarios (IP block, breaker trip) only run when
//! explicitly enabled.

pub mod client;
pub mod config;
pub mod tests;

use std::time::Duration;

pub use client::PlatformClient;
pub use config::E2eConfig;

/// Outcome of a single test case
#[derive(Debug, Clone)]
pub enum TestResult {
    Pass {
        name: &'static str,
        duration: Duration,
    },
    Fail {
        name: &'static str,
        reason: String,
        duration: Duration,
    },
    Skip {
        name: &'static str,
        reason: String,
    },
}

impl TestResult {
    pub fn pass(name: &'static str, duration: Duration) -> Self {
        TestResult::Pass { name, duration }
    }

    pub fn fail(name: &'static str, reason: impl Into<String>, duration: Duration) -> Self {
        TestResult::Fail {
            name,
            reason: reason.into(),
            duration,
        }
    }

    pub fn skip(name: &'static str, reason: impl Into<String>) -> Self {
        TestResult::Skip {
            name,
            reason: reason.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TestResult::Pass { name, .. }
            | TestResult::Fail { name, .. }
            | TestResult::Skip { name, .. } => name,
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, TestResult::Pass { .. } | TestResult::Skip { .. })
    }
}

/// Collected results for final reporting
#[derive(Debug, Default)]
pub struct TestSuite {
    pub results: Vec<TestResult>,
}

impl TestSuite {
    pub fn record(&mut self, result: TestResult) {
        match &result {
            TestResult::Pass { name, duration } => {
                tracing::info!(test = name, ?duration, "PASS");
            }
            TestResult::Fail {
                name,
                reason,
                duration,
            } => {
                tracing::error!(test = name, reason = %reason, ?duration, "FAIL");
            }
            TestResult::Skip { name, reason } => {
                tracing::warn!(test = name, reason = %reason, "SKIP");
            }
        }
        self.results.push(result);
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.passed()).count()
    }

    pub fn summary(&self) -> String {
        let passed = self
            .results
            .iter()
            .filter(|r| matches!(r, TestResult::Pass { .. }))
            .count();
        let skipped = self
            .results
            .iter()
            .filter(|r| matches!(r, TestResult::Skip { .. }))
            .count();
        format!(
            "{} passed, {} failed, {} skipped",
            passed,
            self.failed_count(),
            skipped
        )
    }
}
