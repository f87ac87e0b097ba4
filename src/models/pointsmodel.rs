use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "points_transaction_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PointsTransactionType {
    ReferralBonus,
    CashbackRedeemed,
    CashbackRefunded,
    FreeMonthApplied,
}

/// Append-only ledger entry. `amount` is signed.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct PointsTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub transaction_type: PointsTransactionType,
    pub description: String,
    pub referral_id: Option<Uuid>,
    pub cashback_request_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPointsTransaction {
    pub user_id: Uuid,
    pub amount: i64,
    pub transaction_type: PointsTransactionType,
    pub description: String,
    pub referral_id: Option<Uuid>,
    pub cashback_request_id: Option<Uuid>,
}

impl NewPointsTransaction {
    pub fn referral_bonus(user_id: Uuid, amount: i64, referral_id: Uuid, description: String) -> Self {
        Self {
            user_id,
            amount,
            transaction_type: PointsTransactionType::ReferralBonus,
            description,
            referral_id: Some(referral_id),
            cashback_request_id: None,
        }
    }

    pub fn cashback(
        user_id: Uuid,
        amount: i64,
        transaction_type: PointsTransactionType,
        cashback_request_id: Uuid,
        description: String,
    ) -> Self {
        Self {
            user_id,
            amount,
            transaction_type,
            description,
            referral_id: None,
            cashback_request_id: Some(cashback_request_id),
        }
    }

    pub fn free_month(user_id: Uuid, description: String) -> Self {
        Self {
            user_id,
            amount: 0,
            transaction_type: PointsTransactionType::FreeMonthApplied,
            description,
            referral_id: None,
            cashback_request_id: None,
        }
    }
}

/// A user whose cached balance disagrees with the sum of their ledger.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct LedgerDiscrepancy {
    pub user_id: Uuid,
    pub points_balance: i64,
    pub transactions_total: i64,
}
