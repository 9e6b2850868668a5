use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use tradeline_contracts::{TxKind, UserProfile};

/// A platform user account row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub subject: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            subject: self.subject.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
            created_at: self.created_at,
        }
    }
}

/// For inserting new users
#[derive(Debug, Clone)]
pub struct NewUser {
    pub subject: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

/// For inserting new ledger entries
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub transaction_id: Uuid,
    pub subject: String,
    pub kind: TxKind,
    pub amount: bigdecimal::BigDecimal,
    pub linked_order_id: Option<Uuid>,
}
