// db/referraldb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::referralmodel::{Referral, ReferralWithUser};

pub(crate) const REFERRAL_COLUMNS: &str = r#"
    id, referrer_id, referred_user_id, referral_code, status,
    plan_purchased, points_awarded, created_at, confirmed_at
"#;

#[async_trait]
pub trait ReferralExt {
    async fn get_referrals_by_referrer_id(&self, referrer_id: Uuid) -> Result<Vec<Referral>, Error>;

    async fn get_referrals_with_users(&self, referrer_id: Uuid) -> Result<Vec<ReferralWithUser>, Error>;

    async fn count_confirmed_referrals(&self, referrer_id: Uuid) -> Result<i64, Error>;

    /// Confirmed referrals whose `confirmed_at` falls in `[from, to)`.
    async fn get_monthly_referral_count(
        &self,
        referrer_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, Error>;
}

#[async_trait]
impl ReferralExt for DBClient {
    async fn get_referrals_by_referrer_id(&self, referrer_id: Uuid) -> Result<Vec<Referral>, Error> {
        let referrals = sqlx::query_as::<_, Referral>(&format!(
            "SELECT {} FROM referrals WHERE referrer_id = $1 ORDER BY created_at DESC",
            REFERRAL_COLUMNS
        ))
        .bind(referrer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(referrals)
    }

    async fn get_referrals_with_users(&self, referrer_id: Uuid) -> Result<Vec<ReferralWithUser>, Error> {
        let referrals = sqlx::query_as::<_, ReferralWithUser>(
            r#"
            SELECT
                r.id, r.referrer_id, r.referred_user_id, r.referral_code, r.status,
                r.plan_purchased, r.points_awarded, r.created_at, r.confirmed_at,
                u.name AS referred_user_name,
                u.email AS referred_user_email
            FROM referrals r
            LEFT JOIN users u ON u.id = r.referred_user_id
            WHERE r.referrer_id = $1
            ORDER BY r.created_at DESC
            "#,
        )
        .bind(referrer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(referrals)
    }

    async fn count_confirmed_referrals(&self, referrer_id: Uuid) -> Result<i64, Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM referrals WHERE referrer_id = $1 AND status = 'confirmed'",
        )
        .bind(referrer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn get_monthly_referral_count(
        &self,
        referrer_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM referrals
            WHERE referrer_id = $1
              AND status = 'confirmed'
              AND confirmed_at >= $2
              AND confirmed_at < $3
            "#,
        )
        .bind(referrer_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
