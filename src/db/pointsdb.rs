// db/pointsdb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::pointsmodel::{LedgerDiscrepancy, PointsTransaction};

pub(crate) const POINTS_TRANSACTION_COLUMNS: &str = r#"
    id, user_id, amount, transaction_type, description,
    referral_id, cashback_request_id, created_at
"#;

#[async_trait]
pub trait PointsExt {
    /// Newest first.
    async fn get_points_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PointsTransaction>, Error>;

    async fn get_points_total(&self, user_id: Uuid) -> Result<i64, Error>;

    /// Users whose `points_balance` differs from the sum of their transactions.
    async fn find_ledger_discrepancies(&self) -> Result<Vec<LedgerDiscrepancy>, Error>;
}

#[async_trait]
impl PointsExt for DBClient {
    async fn get_points_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PointsTransaction>, Error> {
        let transactions = sqlx::query_as::<_, PointsTransaction>(&format!(
            r#"
            SELECT {} FROM points_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            POINTS_TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    async fn get_points_total(&self, user_id: Uuid) -> Result<i64, Error> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM points_transactions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    async fn find_ledger_discrepancies(&self) -> Result<Vec<LedgerDiscrepancy>, Error> {
        let rows = sqlx::query_as::<_, LedgerDiscrepancy>(
            r#"
            SELECT
                u.id AS user_id,
                u.points_balance,
                COALESCE(SUM(pt.amount), 0)::BIGINT AS transactions_total
            FROM users u
            LEFT JOIN points_transactions pt ON pt.user_id = u.id
            GROUP BY u.id, u.points_balance
            HAVING u.points_balance <> COALESCE(SUM(pt.amount), 0)
            ORDER BY u.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
