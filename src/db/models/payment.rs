//! Simulated subscription payments.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::SubscriptionTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub user_id: String,
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub subscription_tier: SubscriptionTier,
    pub subscription_months: i64,
    pub payment_method: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

pub async fn insert_payment(pool: &SqlitePool, payment: &Payment) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO payments (id, user_id, amount, currency, status, subscription_tier,
                              subscription_months, payment_method, created_at, completed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.user_id)
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(payment.status)
    .bind(payment.subscription_tier)
    .bind(payment.subscription_months)
    .bind(&payment.payment_method)
    .bind(&payment.created_at)
    .bind(&payment.completed_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_payment(pool: &SqlitePool, id: &str) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payments WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Mark a pending payment completed; returns 0 when it was not pending
pub async fn complete_payment(pool: &SqlitePool, id: &str, now: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE payments SET status = 'completed', completed_at = ? WHERE id = ? AND status = 'pending'",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn list_payments(pool: &SqlitePool, user_id: &str) -> Result<Vec<Payment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payments WHERE user_id = ? ORDER BY created_at DESC, rowid DESC")
        .bind(user_id)
        .fetch_all(pool)
        .await
}
