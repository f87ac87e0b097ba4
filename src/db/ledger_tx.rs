// db/ledger_tx.rs
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Error, Postgres, Transaction};
use uuid::Uuid;

use super::{
    cashbackdb::{CashbackExt, CASHBACK_COLUMNS},
    db::DBClient,
    pointsdb::{PointsExt, POINTS_TRANSACTION_COLUMNS},
    referraldb::{ReferralExt, REFERRAL_COLUMNS},
    subscriptiondb::SubscriptionExt,
    userdb::{UserExt, USER_COLUMNS},
    webhookdb::WebhookEventExt,
};
use crate::models::{
    cashbackmodel::{CashbackRequest, CashbackStatus, NewCashbackRequest},
    pointsmodel::{NewPointsTransaction, PointsTransaction},
    referralmodel::{NewReferral, Referral},
    usermodel::{PlanTier, User},
};

/// Unit of work over the ledger tables. Dropping it without `commit`
/// rolls every statement back.
#[async_trait]
pub trait LedgerTx: Send {
    async fn find_user(&mut self, user_id: Uuid) -> Result<Option<User>, Error>;

    /// `SELECT ... FOR UPDATE`; serialises ledger writes for this user.
    async fn lock_user(&mut self, user_id: Uuid) -> Result<Option<User>, Error>;

    async fn set_referred_by(&mut self, user_id: Uuid, referral_code: &str) -> Result<User, Error>;

    async fn find_referral(
        &mut self,
        referrer_id: Uuid,
        referred_user_id: Uuid,
    ) -> Result<Option<Referral>, Error>;

    async fn count_confirmed_referrals(&mut self, referrer_id: Uuid) -> Result<i64, Error>;

    async fn count_confirmed_referrals_between(
        &mut self,
        referrer_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, Error>;

    /// Returns `None` when a row for the pair already exists.
    async fn insert_referral(&mut self, referral: NewReferral) -> Result<Option<Referral>, Error>;

    async fn confirm_referral(
        &mut self,
        referral_id: Uuid,
        plan: PlanTier,
        points_awarded: i64,
        confirmed_at: DateTime<Utc>,
    ) -> Result<Referral, Error>;

    /// Adds `delta` to the balance unless the result would be negative.
    /// Returns the new balance, or `None` when the guard rejected it.
    async fn adjust_points_balance(&mut self, user_id: Uuid, delta: i64) -> Result<Option<i64>, Error>;

    async fn increment_free_months(&mut self, user_id: Uuid) -> Result<i32, Error>;

    /// Inserts the award marker; `false` when it already exists.
    async fn claim_free_month_award(
        &mut self,
        user_id: Uuid,
        period_start: NaiveDate,
        milestone: i64,
    ) -> Result<bool, Error>;

    async fn append_points_transaction(
        &mut self,
        entry: NewPointsTransaction,
    ) -> Result<PointsTransaction, Error>;

    async fn insert_cashback_request(&mut self, request: NewCashbackRequest) -> Result<CashbackRequest, Error>;

    async fn lock_cashback_request(&mut self, request_id: Uuid) -> Result<Option<CashbackRequest>, Error>;

    async fn settle_cashback_request(
        &mut self,
        request_id: Uuid,
        status: CashbackStatus,
        processed_by: Uuid,
        admin_notes: Option<String>,
        processed_at: DateTime<Utc>,
    ) -> Result<CashbackRequest, Error>;

    async fn commit(self: Box<Self>) -> Result<(), Error>;
}

/// Everything the services need from persistence.
#[async_trait]
pub trait LedgerStore:
    UserExt + ReferralExt + PointsExt + CashbackExt + SubscriptionExt + WebhookEventExt + Send + Sync
{
    async fn begin_ledger(&self) -> Result<Box<dyn LedgerTx>, Error>;
}

#[async_trait]
impl LedgerStore for DBClient {
    async fn begin_ledger(&self) -> Result<Box<dyn LedgerTx>, Error> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }
}

pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn find_user(&mut self, user_id: Uuid) -> Result<Option<User>, Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await
    }

    async fn lock_user(&mut self, user_id: Uuid) -> Result<Option<User>, Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await
    }

    async fn set_referred_by(&mut self, user_id: Uuid, referral_code: &str) -> Result<User, Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET referred_by = $2, updated_at = NOW()
            WHERE id = $1 AND referred_by IS NULL
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(referral_code)
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn find_referral(
        &mut self,
        referrer_id: Uuid,
        referred_user_id: Uuid,
    ) -> Result<Option<Referral>, Error> {
        sqlx::query_as::<_, Referral>(&format!(
            r#"
            SELECT {} FROM referrals
            WHERE referrer_id = $1 AND referred_user_id = $2
            FOR UPDATE
            "#,
            REFERRAL_COLUMNS
        ))
        .bind(referrer_id)
        .bind(referred_user_id)
        .fetch_optional(&mut *self.tx)
        .await
    }

    async fn count_confirmed_referrals(&mut self, referrer_id: Uuid) -> Result<i64, Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM referrals WHERE referrer_id = $1 AND status = 'confirmed'",
        )
        .bind(referrer_id)
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn count_confirmed_referrals_between(
        &mut self,
        referrer_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, Error> {
        sqlx::query_scalar(
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
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn insert_referral(&mut self, referral: NewReferral) -> Result<Option<Referral>, Error> {
        sqlx::query_as::<_, Referral>(&format!(
            r#"
            INSERT INTO referrals (
                referrer_id, referred_user_id, referral_code, status,
                plan_purchased, points_awarded, confirmed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (referrer_id, referred_user_id) DO NOTHING
            RETURNING {}
            "#,
            REFERRAL_COLUMNS
        ))
        .bind(referral.referrer_id)
        .bind(referral.referred_user_id)
        .bind(referral.referral_code)
        .bind(referral.status)
        .bind(referral.plan_purchased)
        .bind(referral.points_awarded)
        .bind(referral.confirmed_at)
        .fetch_optional(&mut *self.tx)
        .await
    }

    async fn confirm_referral(
        &mut self,
        referral_id: Uuid,
        plan: PlanTier,
        points_awarded: i64,
        confirmed_at: DateTime<Utc>,
    ) -> Result<Referral, Error> {
        sqlx::query_as::<_, Referral>(&format!(
            r#"
            UPDATE referrals
            SET status = 'confirmed', plan_purchased = $2, points_awarded = $3, confirmed_at = $4
            WHERE id = $1 AND status <> 'confirmed'
            RETURNING {}
            "#,
            REFERRAL_COLUMNS
        ))
        .bind(referral_id)
        .bind(plan)
        .bind(points_awarded)
        .bind(confirmed_at)
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn adjust_points_balance(&mut self, user_id: Uuid, delta: i64) -> Result<Option<i64>, Error> {
        sqlx::query_scalar(
            r#"
            UPDATE users
            SET points_balance = points_balance + $2, updated_at = NOW()
            WHERE id = $1 AND points_balance + $2 >= 0
            RETURNING points_balance
            "#,
        )
        .bind(user_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await
    }

    async fn increment_free_months(&mut self, user_id: Uuid) -> Result<i32, Error> {
        sqlx::query_scalar(
            r#"
            UPDATE users
            SET free_months_remaining = free_months_remaining + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING free_months_remaining
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn claim_free_month_award(
        &mut self,
        user_id: Uuid,
        period_start: NaiveDate,
        milestone: i64,
    ) -> Result<bool, Error> {
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO free_month_awards (user_id, period_start, milestone)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, period_start, milestone) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(period_start)
        .bind(milestone)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(inserted.is_some())
    }

    async fn append_points_transaction(
        &mut self,
        entry: NewPointsTransaction,
    ) -> Result<PointsTransaction, Error> {
        sqlx::query_as::<_, PointsTransaction>(&format!(
            r#"
            INSERT INTO points_transactions (
                user_id, amount, transaction_type, description, referral_id, cashback_request_id
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            POINTS_TRANSACTION_COLUMNS
        ))
        .bind(entry.user_id)
        .bind(entry.amount)
        .bind(entry.transaction_type)
        .bind(entry.description)
        .bind(entry.referral_id)
        .bind(entry.cashback_request_id)
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn insert_cashback_request(&mut self, request: NewCashbackRequest) -> Result<CashbackRequest, Error> {
        sqlx::query_as::<_, CashbackRequest>(&format!(
            r#"
            INSERT INTO cashback_requests (
                user_id, points_amount, cash_amount, payment_method, pix_key, bank_details, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING {}
            "#,
            CASHBACK_COLUMNS
        ))
        .bind(request.user_id)
        .bind(request.points_amount)
        .bind(request.cash_amount)
        .bind(request.payment_method)
        .bind(request.pix_key)
        .bind(request.bank_details)
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn lock_cashback_request(&mut self, request_id: Uuid) -> Result<Option<CashbackRequest>, Error> {
        sqlx::query_as::<_, CashbackRequest>(&format!(
            "SELECT {} FROM cashback_requests WHERE id = $1 FOR UPDATE",
            CASHBACK_COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(&mut *self.tx)
        .await
    }

    async fn settle_cashback_request(
        &mut self,
        request_id: Uuid,
        status: CashbackStatus,
        processed_by: Uuid,
        admin_notes: Option<String>,
        processed_at: DateTime<Utc>,
    ) -> Result<CashbackRequest, Error> {
        sqlx::query_as::<_, CashbackRequest>(&format!(
            r#"
            UPDATE cashback_requests
            SET status = $2, processed_by = $3, admin_notes = $4, processed_at = $5
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            CASHBACK_COLUMNS
        ))
        .bind(request_id)
        .bind(status)
        .bind(processed_by)
        .bind(admin_notes)
        .bind(processed_at)
        .fetch_one(&mut *self.tx)
        .await
    }

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        self.tx.commit().await
    }
}
