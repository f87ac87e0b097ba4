// dtos/referraldtos.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    cashbackmodel::{CashbackDecision, CashbackPaymentMethod, CashbackStatus},
    pointsmodel::LedgerDiscrepancy,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ReferralCodeDto {
    pub referral_code: String,
    pub referral_link: String,
    pub is_new: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ReferralStatsDto {
    pub points_balance: i64,
    pub free_months_remaining: i32,
    pub total_referrals: i64,
    pub this_month_referrals: i64,
    pub referrals_to_free_month: i64,
    /// Cents.
    pub cash_value: i64,
    pub cash_value_display: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ReferralCodeValidationDto {
    pub valid: bool,
    pub referrer_name: Option<String>,
    pub referrer_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ValidateReferralCodeQueryDto {
    #[validate(length(min = 1, max = 32, message = "Referral code is required"))]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ApplyReferralCodeDto {
    #[validate(length(min = 1, max = 32, message = "Referral code is required"))]
    pub referral_code: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct PointsHistoryQueryDto {
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<i64>,

    #[validate(range(min = 0, message = "Offset cannot be negative"))]
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CashbackRequestDto {
    #[validate(range(min = 1, message = "Points amount must be positive"))]
    pub points_amount: i64,

    pub payment_method: CashbackPaymentMethod,

    #[validate(length(max = 140, message = "PIX key is too long"))]
    pub pix_key: Option<String>,

    #[validate(length(max = 1000, message = "Bank details are too long"))]
    pub bank_details: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CashbackRequestCreatedDto {
    pub request_id: Uuid,
    pub points_amount: i64,
    pub cash_amount: i64,
    pub cash_amount_display: String,
    pub status: CashbackStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CashbackListQueryDto {
    pub status: Option<CashbackStatus>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ProcessCashbackDto {
    pub status: CashbackDecision,

    #[validate(length(max = 1000, message = "Admin notes must be at most 1000 characters"))]
    pub admin_notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReconciliationReportDto {
    pub consistent: bool,
    pub discrepancies: Vec<LedgerDiscrepancy>,
}
