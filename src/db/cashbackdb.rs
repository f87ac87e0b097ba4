// db/cashbackdb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::cashbackmodel::{CashbackRequest, CashbackRequestWithUser, CashbackStatus};

pub(crate) const CASHBACK_COLUMNS: &str = r#"
    id, user_id, points_amount, cash_amount, payment_method, pix_key, bank_details,
    status, admin_notes, processed_by, processed_at, created_at
"#;

#[async_trait]
pub trait CashbackExt {
    async fn get_user_cashback_requests(&self, user_id: Uuid) -> Result<Vec<CashbackRequest>, Error>;

    /// All requests, optionally filtered by status, newest first.
    async fn get_cashback_requests(
        &self,
        status: Option<CashbackStatus>,
    ) -> Result<Vec<CashbackRequestWithUser>, Error>;
}

#[async_trait]
impl CashbackExt for DBClient {
    async fn get_user_cashback_requests(&self, user_id: Uuid) -> Result<Vec<CashbackRequest>, Error> {
        let requests = sqlx::query_as::<_, CashbackRequest>(&format!(
            "SELECT {} FROM cashback_requests WHERE user_id = $1 ORDER BY created_at DESC",
            CASHBACK_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }

    async fn get_cashback_requests(
        &self,
        status: Option<CashbackStatus>,
    ) -> Result<Vec<CashbackRequestWithUser>, Error> {
        let requests = sqlx::query_as::<_, CashbackRequestWithUser>(
            r#"
            SELECT
                c.id, c.user_id, c.points_amount, c.cash_amount, c.payment_method,
                c.pix_key, c.bank_details, c.status, c.admin_notes, c.processed_by,
                c.processed_at, c.created_at,
                u.name AS user_name,
                u.email AS user_email
            FROM cashback_requests c
            LEFT JOIN users u ON u.id = c.user_id
            WHERE ($1::cashback_status IS NULL OR c.status = $1)
            ORDER BY c.created_at DESC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }
}
