//! E2E test cases for the Tradeline platform.
//!
//! Each test returns a `TestResult` for reporting. Destructive scenarios
//! (host blocking, breaker tripping) skip themselves unless enabled.

mod trading_reads;

pub use breaker::test_breaker_short_circuits;
pub use connectivity::test_gateway_connectivity;
pub use denylist::test_token_denylist_after_logout;
pub use ip_block::test_ip_block_after_failed_logins;
pub use orders::test_concurrent_buys_serialize;
pub use public_routes::test_public_routes_bypass_auth;
pub use rate_limit::test_rate_limit_headers;
pub use trading_reads::test_order_and_portfolio_reads;

use crate::{PlatformClient, TestSuite};

/// Run the full suite in dependency-safe order: destructive scenarios last
/// so an armed IP block cannot poison the earlier cases.
pub async fn run_all_tests(client: &PlatformClient) -> TestSuite {
    let mut suite = TestSuite::default();
    suite.record(test_gateway_connectivity(client).await);
    suite.record(test_public_routes_bypass_auth(client).await);
    suite.record(test_rate_limit_headers(client).await);
    suite.record(test_token_denylist_after_logout(client).await);
    suite.record(test_concurrent_buys_serialize(client).await);
    suite.record(test_order_and_portfolio_reads(client).await);
    suite.record(test_breaker_short_circuits(client).await);
    suite.record(test_ip_block_after_failed_logins(client).await);
    suite
}

/// Quick mode: connectivity and auth bypass only.
pub async fn run_quick_tests(client: &PlatformClient) -> TestSuite {
    let mut suite = TestSuite::default();
    suite.record(test_gateway_connectivity(client).await);
    suite.record(test_public_routes_bypass_auth(client).await);
    suite
}
