// db/userdb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::usermodel::{PlanTier, User};

pub(crate) const USER_COLUMNS: &str = r#"
    id, name, email, role, plan, referral_code, referred_by,
    points_balance, free_months_remaining, created_at, updated_at
"#;

#[async_trait]
pub trait UserExt {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, Error>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error>;

    async fn get_user_by_referral_code(&self, referral_code: &str) -> Result<Option<User>, Error>;

    /// Stores `referral_code` only when the user has none yet.
    /// Returns `None` when a code was already present.
    async fn set_referral_code_if_missing(
        &self,
        user_id: Uuid,
        referral_code: &str,
    ) -> Result<Option<User>, Error>;

    async fn update_user_plan(&self, user_id: Uuid, plan: PlanTier) -> Result<User, Error>;
}

#[async_trait]
impl UserExt for DBClient {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_user_by_referral_code(&self, referral_code: &str) -> Result<Option<User>, Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE referral_code = $1",
            USER_COLUMNS
        ))
        .bind(referral_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn set_referral_code_if_missing(
        &self,
        user_id: Uuid,
        referral_code: &str,
    ) -> Result<Option<User>, Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET referral_code = $2, updated_at = NOW()
            WHERE id = $1 AND referral_code IS NULL
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(referral_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_user_plan(&self, user_id: Uuid, plan: PlanTier) -> Result<User, Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET plan = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(plan)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }
}
