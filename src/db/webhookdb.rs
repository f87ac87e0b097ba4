// db/webhookdb.rs
use async_trait::async_trait;
use sqlx::Error;

use super::db::DBClient;

/// A `processing` claim older than this is treated as abandoned.
pub const STALE_CLAIM_MINUTES: i32 = 5;

#[async_trait]
pub trait WebhookEventExt {
    /// Records the event as in flight. Returns `false` when it is already
    /// processed or being processed. A `failed` event, or a `processing`
    /// claim older than [`STALE_CLAIM_MINUTES`], can be claimed again.
    async fn claim_webhook_event(&self, event_id: &str, event_type: &str) -> Result<bool, Error>;

    async fn mark_webhook_event_processed(&self, event_id: &str) -> Result<(), Error>;

    async fn mark_webhook_event_failed(&self, event_id: &str, error_message: &str) -> Result<(), Error>;
}

#[async_trait]
impl WebhookEventExt for DBClient {
    async fn claim_webhook_event(&self, event_id: &str, event_type: &str) -> Result<bool, Error> {
        let claimed: Option<uuid::Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO stripe_webhook_events (stripe_event_id, event_type, status)
            VALUES ($1, $2, 'processing')
            ON CONFLICT (stripe_event_id) DO UPDATE SET
                status = 'processing',
                event_type = EXCLUDED.event_type,
                error_message = NULL,
                received_at = NOW()
            WHERE stripe_webhook_events.status = 'failed'
               OR (stripe_webhook_events.status = 'processing'
                   AND stripe_webhook_events.received_at < NOW() - make_interval(mins => $3))
            RETURNING id
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(STALE_CLAIM_MINUTES)
        .fetch_optional(&self.pool)
        .await?;

        Ok(claimed.is_some())
    }

    async fn mark_webhook_event_processed(&self, event_id: &str) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE stripe_webhook_events
            SET status = 'processed', processed_at = NOW(), error_message = NULL
            WHERE stripe_event_id = $1
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_webhook_event_failed(&self, event_id: &str, error_message: &str) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE stripe_webhook_events
            SET status = 'failed', error_message = $2
            WHERE stripe_event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
