// db/subscriptiondb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::subscriptionmodels::*;

const SUBSCRIPTION_COLUMNS: &str = r#"
    id, user_id, plan, status, stripe_subscription_id, stripe_price_id,
    stripe_customer_id, auto_renew, start_date, end_date, created_at, updated_at
"#;

#[async_trait]
pub trait SubscriptionExt {
    /// One subscription row per user; an existing row is overwritten.
    async fn upsert_subscription(&self, upsert: SubscriptionUpsert) -> Result<Subscription, Error>;

    async fn get_user_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>, Error>;

    async fn cancel_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>, Error>;

    /// Returns `None` when the invoice already has a row with the same status.
    async fn create_payment_record(&self, record: NewPaymentRecord) -> Result<Option<PaymentRecord>, Error>;
}

#[async_trait]
impl SubscriptionExt for DBClient {
    async fn upsert_subscription(&self, upsert: SubscriptionUpsert) -> Result<Subscription, Error> {
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            INSERT INTO subscriptions (
                user_id, plan, status, stripe_subscription_id, stripe_price_id,
                stripe_customer_id, auto_renew, start_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                plan = EXCLUDED.plan,
                status = EXCLUDED.status,
                stripe_subscription_id = COALESCE(EXCLUDED.stripe_subscription_id, subscriptions.stripe_subscription_id),
                stripe_price_id = COALESCE(EXCLUDED.stripe_price_id, subscriptions.stripe_price_id),
                stripe_customer_id = COALESCE(EXCLUDED.stripe_customer_id, subscriptions.stripe_customer_id),
                auto_renew = TRUE,
                end_date = NULL,
                updated_at = NOW()
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(upsert.user_id)
        .bind(upsert.plan)
        .bind(upsert.status)
        .bind(upsert.stripe_subscription_id)
        .bind(upsert.stripe_price_id)
        .bind(upsert.stripe_customer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(subscription)
    }

    async fn get_user_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>, Error> {
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM subscriptions WHERE user_id = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subscription)
    }

    async fn cancel_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>, Error> {
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            UPDATE subscriptions
            SET status = 'cancelled', auto_renew = FALSE, end_date = NOW(), updated_at = NOW()
            WHERE user_id = $1
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subscription)
    }

    async fn create_payment_record(&self, record: NewPaymentRecord) -> Result<Option<PaymentRecord>, Error> {
        let payment = sqlx::query_as::<_, PaymentRecord>(
            r#"
            INSERT INTO payment_history (
                user_id, amount, currency, status, payment_method, stripe_invoice_id, description
            )
            VALUES ($1, $2, $3, $4, 'stripe', $5, $6)
            ON CONFLICT (stripe_invoice_id, status) DO NOTHING
            RETURNING id, user_id, amount, currency, status, payment_method,
                      stripe_invoice_id, description, created_at
            "#,
        )
        .bind(record.user_id)
        .bind(record.amount)
        .bind(record.currency)
        .bind(record.status)
        .bind(record.stripe_invoice_id)
        .bind(record.description)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }
}
