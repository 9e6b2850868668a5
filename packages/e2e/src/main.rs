//! Tradeline E2E Test CLI
//!
//! Drives a running deployment through the platform's end-to-end scenarios.
//!
//! Usage:
//!   GATEWAY_URL=http://localhost:8000 tradeline-e2e run
//!   GATEWAY_URL=http://localhost:8000 tradeline-e2e run --quick
//!   GATEWAY_URL=http://localhost:8000 E2E_DESTRUCTIVE=1 tradeline-e2e run --test ip_block_after_failed_logins

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use tracing_subscriber::EnvFilter;

use tradeline_e2e::{tests, E2eConfig, PlatformClient, TestSuite};

#[derive(Parser)]
#[command(name = "tradeline-e2e")]
#[command(about = "E2E test suite for the Tradeline platform", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run E2E tests against GATEWAY_URL
    Run {
        /// Run only the named test
        #[arg(short, long)]
        test: Option<String>,

        /// Quick mode (connectivity and auth bypass only)
        #[arg(long)]
        quick: bool,
    },

    /// Check that the deployment is reachable
    Status,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let config = E2eConfig::from_env()?;
    let client = PlatformClient::new(config)?;

    match cli.command {
        Commands::Status => {
            let result = tests::test_gateway_connectivity(&client).await;
            if result.passed() {
                println!("deployment reachable");
                Ok(())
            } else {
                Err(eyre!("deployment unreachable"))
            }
        }
        Commands::Run { test, quick } => {
            let suite = match (test, quick) {
                (Some(name), _) => run_single(&client, &name).await?,
                (None, true) => tests::run_quick_tests(&client).await,
                (None, false) => tests::run_all_tests(&client).await,
            };

            println!("{}", suite.summary());
            if suite.failed_count() > 0 {
                Err(eyre!("{} test(s) failed", suite.failed_count()))
            } else {
                Ok(())
            }
        }
    }
}

async fn run_single(client: &PlatformClient, name: &str) -> Result<TestSuite> {
    let mut suite = TestSuite::default();
    let result = match name {
        "gateway_connectivity" => tests::test_gateway_connectivity(client).await,
        "public_routes_bypass_auth" => tests::test_public_routes_bypass_auth(client).await,
        "rate_limit_headers" => tests::test_rate_limit_headers(client).await,
        "token_denylist_after_logout" => tests::test_token_denylist_after_logout(client).await,
        "concurrent_buys_serialize" => tests::test_concurrent_buys_serialize(client).await,
        "order_and_portfolio_reads" => tests::test_order_and_portfolio_reads(client).await,
        "breaker_short_circuits" => tests::test_breaker_short_circuits(client).await,
        "ip_block_after_failed_logins" => tests::test_ip_block_after_failed_logins(client).await,
        other => return Err(eyre!("unknown test: {other}")),
    };
    suite.record(result);
    Ok(suite)
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
