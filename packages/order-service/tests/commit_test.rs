//! Integration tests for the order commit flow
//!
//! Run with: cargo test --test commit_test -- --nocapture
//!
//! Prerequisites:
//! - Postgres reachable via TEST_DATABASE_URL
//!
//! The user and inventory services are replaced by in-process stubs so the
//! tests cover validation, lock serialization, balance calls, holdings
//! movement, and failed-order recording without the full platform.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use order_service::clients::{BalanceClient, InventoryClient};
use order_service::commit::{CommitError, OrderCommitter};
use order_service::config::CommitConfig;
use order_service::db;
use tradeline_contracts::{CreateOrderRequest, OrderSide, OrderStatus, OrderType};
use tradeline_coordination::{LockManager, MemoryStore};

const INTERNAL_TOKEN: &str = "commit-test-internal-token";

/// Stub user-service ledger backed by a single in-memory balance.
#[derive(Clone)]
struct StubLedger {
    balance: Arc<Mutex<BigDecimal>>,
}

async fn stub_debit(State(stub): State<StubLedger>, Json(body): Json<Value>) -> Response {
    let amount: BigDecimal = body["amount"].as_str().unwrap_or("0").parse().unwrap();
    let mut balance = stub.balance.lock().await;
    if *balance < amount {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "type": "https://tradeline.dev/problems/validation-error",
                "title": "Unprocessable Entity",
                "status": 422,
                "detail": "insufficient funds",
                "code": "INSUFFICIENT_FUNDS"
            })),
        )
            .into_response();
    }
    *balance = balance.clone() - amount;
    Json(json!({ "transaction_id": Uuid::new_v4() })).into_response()
}

async fn stub_credit(State(stub): State<StubLedger>, Json(body): Json<Value>) -> Response {
    let amount: BigDecimal = body["amount"].as_str().unwrap_or("0").parse().unwrap();
    let mut balance = stub.balance.lock().await;
    *balance = balance.clone() + amount;
    Json(json!({ "transaction_id": Uuid::new_v4() })).into_response()
}

async fn stub_asset(Path(id): Path<String>) -> Response {
    match id.as_str() {
        "btc" => Json(json!({
            "asset_id": "btc",
            "name": "Bitcoin",
            "category": "crypto",
            "unit_price": "50",
            "available": true
        }))
        .into_response(),
        "delisted" => Json(json!({
            "asset_id": "delisted",
            "name": "Gone",
            "category": "crypto",
            "unit_price": "1",
            "available": false
        }))
        .into_response(),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({ "code": "NOT_FOUND" })),
        )
            .into_response(),
    }
}

async fn spawn_stub(ledger: StubLedger) -> SocketAddr {
    let app = Router::new()
        .route("/internal/balance/debit", post(stub_debit))
        .route("/internal/balance/credit", post(stub_credit))
        .route("/assets/{id}", get(stub_asset))
        .with_state(ledger);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

struct TestRig {
    pool: PgPool,
    committer: Arc<OrderCommitter>,
    balance: Arc<Mutex<BigDecimal>>,
}

async fn setup(initial_balance: i64) -> Option<TestRig> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = db::create_pool(&url).await.ok()?;
    db::run_migrations(&pool).await.ok()?;

    let balance = Arc::new(Mutex::new(BigDecimal::from(initial_balance)));
    let addr = spawn_stub(StubLedger {
        balance: balance.clone(),
    })
    .await;
    let base = format!("http://{addr}");

    let committer = Arc::new(OrderCommitter::new(
        pool.clone(),
        LockManager::new(Arc::new(MemoryStore::new())),
        BalanceClient::new(&base, INTERNAL_TOKEN).unwrap(),
        InventoryClient::new(&base).unwrap(),
        &CommitConfig {
            lock_ttl_secs: 30,
            lock_wait_secs: 2,
            max_total: BigDecimal::from(10_000),
        },
    ));

    Some(TestRig {
        pool,
        committer,
        balance,
    })
}

fn fresh_subject() -> String {
    format!("commit-test-{}", &Uuid::new_v4().to_string()[..8])
}

fn buy(quantity: i64, unit_price: i64) -> CreateOrderRequest {
    CreateOrderRequest {
        asset_id: "btc".to_string(),
        side: OrderSide::Buy,
        order_type: OrderType::Limit,
        quantity: BigDecimal::from(quantity),
        unit_price: Some(BigDecimal::from(unit_price)),
    }
}

#[tokio::test]
async fn test_buy_debits_and_records_completed_order() {
    let Some(rig) = setup(1000).await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let subject = fresh_subject();

    let order = rig
        .committer
        .create_order(&subject, buy(2, 50))
        .await
        .expect("buy should commit");
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.subject, subject);

    // 2 × 50 debited from the stub ledger
    assert_eq!(*rig.balance.lock().await, BigDecimal::from(900));

    // Holdings reflect the purchase
    let holdings = db::list_holdings(&rig.pool, &subject).await.unwrap();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].quantity, BigDecimal::from(2).with_scale(8));
}

#[tokio::test]
async fn test_buy_refunds_debit_when_holdings_write_fails() {
    let Some(rig) = setup(1000).await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let subject = fresh_subject();

    // Saturate the position at the NUMERIC(30, 8) integer maximum so the
    // post-debit holdings upsert overflows and fails
    let max_position: BigDecimal = "9999999999999999999999".parse().unwrap();
    db::add_to_holding(&rig.pool, &subject, "btc", &max_position)
        .await
        .expect("seed holding");

    let err = rig
        .committer
        .create_order(&subject, buy(2, 50))
        .await
        .unwrap_err();
    assert!(matches!(err, CommitError::Db(_)));

    // The 100 debit was credited back and the attempt recorded as failed
    assert_eq!(*rig.balance.lock().await, BigDecimal::from(1000));
    let orders = db::list_orders(&rig.pool, &subject, 10, 0).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Failed);

    // The position itself is untouched
    let holdings = db::list_holdings(&rig.pool, &subject).await.unwrap();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].quantity, max_position.with_scale(8));
}

#[tokio::test]
async fn test_insufficient_funds_records_failed_order() {
    let Some(rig) = setup(10).await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let subject = fresh_subject();

    let err = rig
        .committer
        .create_order(&subject, buy(2, 50))
        .await
        .unwrap_err();
    assert!(matches!(err, CommitError::InsufficientFunds));

    // The attempt is recorded as failed; nothing was debited
    let orders = db::list_orders(&rig.pool, &subject, 10, 0).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Failed);
    assert_eq!(*rig.balance.lock().await, BigDecimal::from(10));
    assert!(db::list_holdings(&rig.pool, &subject).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_and_delisted_assets_fail_validation() {
    let Some(rig) = setup(1000).await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let subject = fresh_subject();

    let mut request = buy(1, 50);
    request.asset_id = "no-such-asset".to_string();
    let err = rig.committer.create_order(&subject, request).await.unwrap_err();
    let CommitError::Validation(issues) = err else {
        panic!("expected validation error");
    };
    assert_eq!(issues[0].field, "asset_id");

    let mut request = buy(1, 50);
    request.asset_id = "delisted".to_string();
    let err = rig.committer.create_order(&subject, request).await.unwrap_err();
    assert!(matches!(err, CommitError::Validation(_)));

    // Validation failures never reach the order log
    assert!(db::list_orders(&rig.pool, &subject, 10, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_order_total_ceiling_enforced() {
    let Some(rig) = setup(1_000_000).await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let subject = fresh_subject();

    // 300 × 50 = 15000 > ceiling of 10000
    let err = rig
        .committer
        .create_order(&subject, buy(300, 50))
        .await
        .unwrap_err();
    assert!(matches!(err, CommitError::Validation(_)));
}

#[tokio::test]
async fn test_market_order_takes_catalog_price() {
    let Some(rig) = setup(1000).await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let subject = fresh_subject();

    let order = rig
        .committer
        .create_order(
            &subject,
            CreateOrderRequest {
                asset_id: "btc".to_string(),
                side: OrderSide::Buy,
                order_type: OrderType::Market,
                quantity: BigDecimal::from(3),
                unit_price: None,
            },
        )
        .await
        .expect("market buy");
    // Stub catalog price is 50
    assert_eq!(order.unit_price, BigDecimal::from(50).with_scale(8));
    assert_eq!(*rig.balance.lock().await, BigDecimal::from(850));
}

#[tokio::test]
async fn test_sell_requires_and_reduces_holdings() {
    let Some(rig) = setup(0).await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let subject = fresh_subject();

    let sell = CreateOrderRequest {
        asset_id: "btc".to_string(),
        side: OrderSide::Sell,
        order_type: OrderType::Limit,
        quantity: BigDecimal::from(2),
        unit_price: Some(BigDecimal::from(40)),
    };

    // No position yet: the sell fails and is recorded as such
    let err = rig
        .committer
        .create_order(&subject, sell.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, CommitError::InsufficientHoldings));

    // Buy first (1000 funds injected via credit), then the sell completes
    *rig.balance.lock().await = BigDecimal::from(1000);
    rig.committer
        .create_order(&subject, buy(5, 50))
        .await
        .expect("buy");

    let order = rig
        .committer
        .create_order(&subject, sell)
        .await
        .expect("sell should commit");
    assert_eq!(order.status, OrderStatus::Completed);

    // 1000 - 250 (buy) + 80 (sell proceeds)
    assert_eq!(*rig.balance.lock().await, BigDecimal::from(830));
    let holdings = db::list_holdings(&rig.pool, &subject).await.unwrap();
    assert_eq!(holdings[0].quantity, BigDecimal::from(3).with_scale(8));
}

#[tokio::test]
async fn test_concurrent_buys_on_one_account_serialize() {
    let Some(rig) = setup(100).await else {
        eprintln!("skipping: TEST_DATABASE_URL not set");
        return;
    };
    let subject = fresh_subject();

    // Two concurrent buys totalling 80 each against a balance of 100
    let mut handles = Vec::new();
    for _ in 0..2 {
        let committer = rig.committer.clone();
        let subject = subject.clone();
        handles.push(tokio::spawn(async move {
            committer.create_order(&subject, buy(2, 40)).await
        }));
    }

    let mut completed = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(order) => {
                assert_eq!(order.status, OrderStatus::Completed);
                completed += 1;
            }
            Err(CommitError::InsufficientFunds) | Err(CommitError::LockContention) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(completed, 1, "exactly one buy must debit");
    assert_eq!(*rig.balance.lock().await, BigDecimal::from(20));

    // A lock-contention loser never reaches the order log, a funds loser
    // lands there as failed; either way exactly one completed order exists.
    let orders = db::list_orders(&rig.pool, &subject, 10, 0).await.unwrap();
    assert!((1..=2).contains(&orders.len()));
    assert_eq!(
        orders
            .iter()
            .filter(|o| o.status == OrderStatus::Completed)
            .count(),
        1
    );
}
