use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "cashback_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CashbackStatus {
    Pending,
    Approved,
    Rejected,
}

impl CashbackStatus {
    pub fn to_str(&self) -> &str {
        match self {
            CashbackStatus::Pending => "pending",
            CashbackStatus::Approved => "approved",
            CashbackStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "cashback_payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CashbackPaymentMethod {
    Pix,
    BankTransfer,
    CreditAccount,
}

/// Admin verdict on a pending request.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CashbackDecision {
    Approved,
    Rejected,
}

impl From<CashbackDecision> for CashbackStatus {
    fn from(decision: CashbackDecision) -> Self {
        match decision {
            CashbackDecision::Approved => CashbackStatus::Approved,
            CashbackDecision::Rejected => CashbackStatus::Rejected,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct CashbackRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub points_amount: i64,
    /// Cents.
    pub cash_amount: i64,
    pub payment_method: CashbackPaymentMethod,
    pub pix_key: Option<String>,
    pub bank_details: Option<String>,
    pub status: CashbackStatus,
    pub admin_notes: Option<String>,
    pub processed_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCashbackRequest {
    pub user_id: Uuid,
    pub points_amount: i64,
    pub cash_amount: i64,
    pub payment_method: CashbackPaymentMethod,
    pub pix_key: Option<String>,
    pub bank_details: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct CashbackRequestWithUser {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub request: CashbackRequest,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}
