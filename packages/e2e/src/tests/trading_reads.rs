//! Order and portfolio reads after a committed buy.

use std::time::Instant;

use bigdecimal::BigDecimal;

use tradeline_contracts::{CreateOrderRequest, Order, OrderSide, OrderStatus, OrderType};

use crate::{PlatformClient, TestResult};

/// Place a buy, then read it back through the list, detail, and portfolio
/// routes; a foreign portfolio read must be refused.
pub async fn test_order_and_portfolio_reads(client: &PlatformClient) -> TestResult {
    let start = Instant::now();
    let name = "order_and_portfolio_reads";

    let (username, _, token) = match client.register_fresh_user().await {
        Ok(t) => t,
        Err(e) => return TestResult::fail(name, format!("register failed: {e}"), start.elapsed()),
    };
    if let Err(e) = client.deposit(&token, &BigDecimal::from(50)).await {
        return TestResult::fail(name, format!("deposit failed: {e}"), start.elapsed());
    }

    let request = CreateOrderRequest {
        asset_id: "btc".to_string(),
        side: OrderSide::Buy,
        order_type: OrderType::Limit,
        quantity: BigDecimal::from(4),
        unit_price: Some(BigDecimal::from(10)),
    };
    let order = match client.create_order(&token, &request).await {
        Ok((status, Some(order))) if status.as_u16() == 201 => order,
        Ok((status, _)) => {
            return TestResult::fail(name, format!("order returned {status}"), start.elapsed())
        }
        Err(e) => return TestResult::fail(name, format!("order failed: {e}"), start.elapsed()),
    };
    if order.status != OrderStatus::Completed {
        return TestResult::fail(
            name,
            format!("order status {:?} after commit", order.status),
            start.elapsed(),
        );
    }

    // Detail read
    let response = match client
        .get_api(&token, &format!("/orders/{}", order.order_id))
        .await
    {
        Ok(r) => r,
        Err(e) => return TestResult::fail(name, format!("detail read failed: {e}"), start.elapsed()),
    };
    if !response.status().is_success() {
        return TestResult::fail(
            name,
            format!("detail read returned {}", response.status()),
            start.elapsed(),
        );
    }

    // List shows the order
    let response = match client.get_api(&token, "/orders?limit=10").await {
        Ok(r) => r,
        Err(e) => return TestResult::fail(name, format!("list read failed: {e}"), start.elapsed()),
    };
    let orders: Vec<Order> = match response.json().await {
        Ok(o) => o,
        Err(e) => return TestResult::fail(name, format!("list parse failed: {e}"), start.elapsed()),
    };
    if !orders.iter().any(|o| o.order_id == order.order_id) {
        return TestResult::fail(name, "committed order missing from list", start.elapsed());
    }

    // Own portfolio shows the holding
    let response = match client.get_api(&token, &format!("/portfolio/{username}")).await {
        Ok(r) => r,
        Err(e) => return TestResult::fail(name, format!("portfolio failed: {e}"), start.elapsed()),
    };
    if !response.status().is_success() {
        return TestResult::fail(
            name,
            format!("portfolio returned {}", response.status()),
            start.elapsed(),
        );
    }
    let body: serde_json::Value = response.json().await.unwrap_or_default();
    let has_btc = body["holdings"]
        .as_array()
        .is_some_and(|h| h.iter().any(|entry| entry["asset_id"] == "btc"));
    if !has_btc {
        return TestResult::fail(name, "portfolio missing purchased holding", start.elapsed());
    }

    // Someone else's portfolio is refused
    let response = match client.get_api(&token, "/portfolio/someone-else").await {
        Ok(r) => r,
        Err(e) => return TestResult::fail(name, format!("foreign read failed: {e}"), start.elapsed()),
    };
    if response.status().as_u16() != 403 {
        return TestResult::fail(
            name,
            format!("foreign portfolio returned {}", response.status()),
            start.elapsed(),
        );
    }

    TestResult::pass(name, start.elapsed())
}
