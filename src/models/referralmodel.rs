use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::usermodel::PlanTier;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "referral_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Referral {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referred_user_id: Option<Uuid>,
    pub referral_code: String,
    pub status: ReferralStatus,
    pub plan_purchased: Option<PlanTier>,
    pub points_awarded: i64,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewReferral {
    pub referrer_id: Uuid,
    pub referred_user_id: Uuid,
    pub referral_code: String,
    pub status: ReferralStatus,
    pub plan_purchased: Option<PlanTier>,
    pub points_awarded: i64,
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// A referral joined with the referred user's contact details.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct ReferralWithUser {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub referral: Referral,
    pub referred_user_name: Option<String>,
    pub referred_user_email: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ReferrerInfo {
    pub id: Uuid,
    pub name: Option<String>,
    pub referral_code: String,
}
