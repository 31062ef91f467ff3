//! Simulated subscription purchases.
//!
//! There is no payment gateway: `confirm_payment` plays the role of the
//! provider callback and upgrades the buyer immediately.

use chrono::{Months, Utc};

use super::{EngineError, EngineResult};
use crate::api::metrics::record_payment;
use crate::config::BillingConfig;
use crate::db::{
    complete_payment, find_payment, format_timestamp, insert_payment, list_payments,
    update_user_subscription, Payment, PaymentStatus, Store, SubscriptionTier, User,
};

pub const MIN_MONTHS: i64 = 1;
pub const MAX_MONTHS: i64 = 12;

pub struct SubscriptionFlow {
    store: Store,
    config: BillingConfig,
}

impl SubscriptionFlow {
    pub fn new(store: Store, config: BillingConfig) -> Self {
        Self { store, config }
    }

    pub async fn create_payment(
        &self,
        user: &User,
        tier: SubscriptionTier,
        months: i64,
    ) -> EngineResult<Payment> {
        if tier != SubscriptionTier::Pro {
            return Err(EngineError::Validation(
                "Only the pro tier can be purchased".to_string(),
            ));
        }
        if !(MIN_MONTHS..=MAX_MONTHS).contains(&months) {
            return Err(EngineError::Validation(format!(
                "Months must be between {} and {}",
                MIN_MONTHS, MAX_MONTHS
            )));
        }
        let pool = self.store.pool()?;

        let payment = Payment {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            amount: months * self.config.price_per_month_cents,
            currency: self.config.currency.clone(),
            status: PaymentStatus::Pending,
            subscription_tier: tier,
            subscription_months: months,
            payment_method: Some("simulated".to_string()),
            created_at: format_timestamp(Utc::now()),
            completed_at: None,
        };
        insert_payment(pool, &payment).await?;
        record_payment(PaymentStatus::Pending.as_str());

        tracing::info!(
            payment_id = %payment.id,
            user_id = %user.id,
            months = months,
            amount = payment.amount,
            "Payment created"
        );
        Ok(payment)
    }

    /// Complete a pending payment and upgrade its owner to pro.
    ///
    /// The new expiry is one calendar month from now, whatever the number of
    /// months purchased.
    pub async fn confirm_payment(&self, user: &User, payment_id: &str) -> EngineResult<()> {
        let pool = self.store.pool()?;
        let payment = find_payment(pool, payment_id)
            .await?
            .ok_or(EngineError::NotFound("Payment"))?;
        if payment.user_id != user.id {
            return Err(EngineError::Unauthorized(
                "You do not own this payment".to_string(),
            ));
        }
        if payment.status != PaymentStatus::Pending {
            return Err(EngineError::InvalidState(format!(
                "Payment is already {}",
                payment.status.as_str()
            )));
        }

        let now = Utc::now();
        if complete_payment(pool, payment_id, &format_timestamp(now)).await? == 0 {
            return Err(EngineError::InvalidState(
                "Payment is no longer pending".to_string(),
            ));
        }

        let expiry = now
            .checked_add_months(Months::new(1))
            .unwrap_or(now + chrono::Duration::days(30));
        update_user_subscription(
            pool,
            &user.id,
            SubscriptionTier::Pro,
            Some(&format_timestamp(expiry)),
        )
        .await?;
        record_payment(PaymentStatus::Completed.as_str());

        tracing::info!(
            payment_id = %payment_id,
            user_id = %user.id,
            expiry = %format_timestamp(expiry),
            "Payment confirmed, subscription upgraded"
        );
        Ok(())
    }

    /// The caller's payments, newest first
    pub async fn payments(&self, user: &User) -> EngineResult<Vec<Payment>> {
        let pool = self.store.pool()?;
        Ok(list_payments(pool, &user.id).await?)
    }
}
