use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use tradeline_contracts::{OrderSide, OrderStatus, OrderType};

/// For inserting new orders
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: Uuid,
    pub subject: String,
    pub asset_id: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    pub status: OrderStatus,
}

/// A subject's position in one asset
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Holding {
    pub subject: String,
    pub asset_id: String,
    pub quantity: BigDecimal,
    pub updated_at: DateTime<Utc>,
}
