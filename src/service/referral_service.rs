// service/referral_service.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::ledger_tx::{LedgerStore, LedgerTx},
    dtos::referraldtos::{
        ReconciliationReportDto, ReferralCodeDto, ReferralCodeValidationDto, ReferralStatsDto,
    },
    models::{
        pointsmodel::{NewPointsTransaction, PointsTransaction},
        referralmodel::{NewReferral, Referral, ReferralStatus, ReferralWithUser, ReferrerInfo},
        usermodel::{PlanTier, User},
    },
    service::{
        ensure_admin,
        error::ServiceError,
        referral_code::{generate_referral_code, normalize_referral_code, referral_link},
        rewards::{month_window, RewardPolicy},
    },
    utils::currency::format_cents_as_brl,
};

const CODE_GENERATION_ATTEMPTS: usize = 5;

/// Result of crediting a referrer for a paid subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReferralCredit {
    /// The subscriber was not referred by anyone.
    NoReferrer,
    /// The plan earns no points.
    Skipped { plan: String },
    /// The pair was credited before; nothing changed.
    AlreadyConfirmed { referral_id: Uuid, points_awarded: i64 },
    Credited {
        referral_id: Uuid,
        base_points: i64,
        bonus_points: i64,
        points_awarded: i64,
        free_month_awarded: bool,
    },
}

impl ReferralCredit {
    /// Points added to the referrer's balance by this call.
    pub fn points_credited(&self) -> i64 {
        match self {
            ReferralCredit::Credited { points_awarded, .. } => *points_awarded,
            _ => 0,
        }
    }
}

pub struct ReferralService {
    db_client: Arc<dyn LedgerStore>,
    policy: RewardPolicy,
    app_url: String,
}

impl ReferralService {
    pub fn new(db_client: Arc<dyn LedgerStore>, policy: RewardPolicy, app_url: String) -> Self {
        Self {
            db_client,
            policy,
            app_url,
        }
    }

    async fn require_user(&self, user_id: Uuid) -> Result<User, ServiceError> {
        self.db_client
            .get_user(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound(user_id))
    }

    pub async fn get_or_create_referral_code(&self, user_id: Uuid) -> Result<ReferralCodeDto, ServiceError> {
        let user = self.require_user(user_id).await?;
        if let Some(code) = user.referral_code {
            return Ok(self.code_dto(code, false));
        }

        for attempt in 1..=CODE_GENERATION_ATTEMPTS {
            let code = generate_referral_code();
            match self.db_client.set_referral_code_if_missing(user_id, &code).await {
                Ok(Some(_)) => {
                    tracing::info!(user_id = %user_id, referral_code = %code, "referral code generated");
                    return Ok(self.code_dto(code, true));
                }
                Ok(None) => {
                    // a concurrent request stored one first
                    let user = self.require_user(user_id).await?;
                    let code = user.referral_code.ok_or(ServiceError::UserNotFound(user_id))?;
                    return Ok(self.code_dto(code, false));
                }
                Err(e) if is_unique_violation(&e) => {
                    tracing::warn!(user_id = %user_id, attempt, "referral code collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::Database(sqlx::Error::Protocol(
            "could not allocate a unique referral code".to_string(),
        )))
    }

    fn code_dto(&self, referral_code: String, is_new: bool) -> ReferralCodeDto {
        ReferralCodeDto {
            referral_link: referral_link(&self.app_url, &referral_code),
            referral_code,
            is_new,
        }
    }

    pub async fn get_stats(&self, user_id: Uuid) -> Result<ReferralStatsDto, ServiceError> {
        self.get_stats_at(user_id, Utc::now()).await
    }

    pub async fn get_stats_at(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<ReferralStatsDto, ServiceError> {
        let user = self.require_user(user_id).await?;
        let total_referrals = self.db_client.count_confirmed_referrals(user_id).await?;
        let this_month_referrals = self.monthly_referral_count(user_id, now).await?;
        let cash_value = self.policy.cash_amount_cents(user.points_balance);

        Ok(ReferralStatsDto {
            points_balance: user.points_balance,
            free_months_remaining: user.free_months_remaining,
            total_referrals,
            this_month_referrals,
            referrals_to_free_month: self.policy.referrals_to_next_free_month(this_month_referrals),
            cash_value,
            cash_value_display: format_cents_as_brl(cash_value),
        })
    }

    pub async fn monthly_referral_count(&self, referrer_id: Uuid, now: DateTime<Utc>) -> Result<i64, ServiceError> {
        let (from, to) = month_window(now);
        Ok(self.db_client.get_monthly_referral_count(referrer_id, from, to).await?)
    }

    pub async fn list_referrals(&self, referrer_id: Uuid) -> Result<Vec<ReferralWithUser>, ServiceError> {
        let referrals = self.db_client.get_referrals_with_users(referrer_id).await?;

        Ok(referrals
            .into_iter()
            .map(|mut item| {
                if item.referral.referred_user_id.is_some() {
                    item.referred_user_name.get_or_insert_with(|| "Unknown".to_string());
                    item.referred_user_email.get_or_insert_with(|| "Unknown".to_string());
                }
                item
            })
            .collect())
    }

    pub async fn points_history(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PointsTransaction>, ServiceError> {
        Ok(self.db_client.get_points_transactions(user_id, limit, offset).await?)
    }

    pub async fn validate_referral_code(&self, code: &str) -> Result<ReferralCodeValidationDto, ServiceError> {
        let referrer = match normalize_referral_code(code) {
            Some(code) => self.db_client.get_user_by_referral_code(&code).await?,
            None => None,
        };

        Ok(match referrer {
            Some(user) => ReferralCodeValidationDto {
                valid: true,
                referrer_name: Some(user.display_name().to_string()),
                referrer_id: Some(user.id),
            },
            None => ReferralCodeValidationDto {
                valid: false,
                referrer_name: None,
                referrer_id: None,
            },
        })
    }

    /// Stores the code on the user once and pre-creates a pending referral.
    pub async fn attach_referral_code(&self, user_id: Uuid, code: &str) -> Result<Referral, ServiceError> {
        let code = normalize_referral_code(code)
            .ok_or_else(|| ServiceError::Validation("Invalid referral code".to_string()))?;
        let referrer = self
            .db_client
            .get_user_by_referral_code(&code)
            .await?
            .ok_or_else(|| ServiceError::Validation("Referral code not found".to_string()))?;
        if referrer.id == user_id {
            return Err(ServiceError::Validation("You cannot use your own referral code".to_string()));
        }

        let mut tx = self.db_client.begin_ledger().await?;
        // referrer first, same order as crediting
        tx.lock_user(referrer.id).await?.ok_or(ServiceError::UserNotFound(referrer.id))?;
        let user = tx.lock_user(user_id).await?.ok_or(ServiceError::UserNotFound(user_id))?;
        if user.referred_by.is_some() {
            return Err(ServiceError::Validation(
                "A referral code has already been applied to this account".to_string(),
            ));
        }

        tx.set_referred_by(user_id, &code).await?;
        let referral = tx
            .insert_referral(NewReferral {
                referrer_id: referrer.id,
                referred_user_id: user_id,
                referral_code: code.clone(),
                status: ReferralStatus::Pending,
                plan_purchased: None,
                points_awarded: 0,
                confirmed_at: None,
            })
            .await?
            .ok_or_else(|| ServiceError::Validation("Referral already registered".to_string()))?;
        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            referrer_id = %referrer.id,
            referral_code = %code,
            "referral code applied"
        );
        Ok(referral)
    }

    /// `None` when the user was not referred, the code is stale or the code is their own.
    pub async fn resolve_referrer(&self, user_id: Uuid) -> Result<Option<ReferrerInfo>, ServiceError> {
        let user = self.require_user(user_id).await?;

        let code = match user.referred_by.as_deref().and_then(normalize_referral_code) {
            Some(code) => code,
            None => return Ok(None),
        };

        let referrer = match self.db_client.get_user_by_referral_code(&code).await? {
            Some(referrer) => referrer,
            None => {
                tracing::warn!(user_id = %user_id, referral_code = %code, "referral code does not resolve to a user");
                return Ok(None);
            }
        };

        if referrer.id == user.id {
            tracing::warn!(user_id = %user_id, "user is referred by their own code, ignoring");
            return Ok(None);
        }

        Ok(Some(ReferrerInfo {
            id: referrer.id,
            name: referrer.name,
            referral_code: code,
        }))
    }

    /// Resolver then accrual, for a user whose subscription just became active.
    pub async fn process_referral_on_subscription(
        &self,
        user_id: Uuid,
        plan_name: &str,
    ) -> Result<ReferralCredit, ServiceError> {
        match self.resolve_referrer(user_id).await? {
            Some(referrer) => self.credit_referral_points(referrer.id, user_id, plan_name).await,
            None => Ok(ReferralCredit::NoReferrer),
        }
    }

    pub async fn credit_referral_points(
        &self,
        referrer_id: Uuid,
        referred_user_id: Uuid,
        plan_name: &str,
    ) -> Result<ReferralCredit, ServiceError> {
        self.credit_referral_points_at(referrer_id, referred_user_id, plan_name, Utc::now())
            .await
    }

    pub async fn credit_referral_points_at(
        &self,
        referrer_id: Uuid,
        referred_user_id: Uuid,
        plan_name: &str,
        now: DateTime<Utc>,
    ) -> Result<ReferralCredit, ServiceError> {
        let plan = match PlanTier::from_name(plan_name) {
            Some(plan) if self.policy.base_points(plan) > 0 => plan,
            _ => {
                tracing::debug!(referrer_id = %referrer_id, plan = plan_name, "plan earns no referral points");
                return Ok(ReferralCredit::Skipped { plan: plan_name.to_string() });
            }
        };

        let mut tx = self.db_client.begin_ledger().await?;

        let referrer = tx
            .lock_user(referrer_id)
            .await?
            .ok_or(ServiceError::UserNotFound(referrer_id))?;
        let referred = tx
            .find_user(referred_user_id)
            .await?
            .ok_or(ServiceError::UserNotFound(referred_user_id))?;

        let existing = tx.find_referral(referrer_id, referred_user_id).await?;
        if let Some(referral) = existing.as_ref().filter(|r| r.status == ReferralStatus::Confirmed) {
            tracing::info!(
                referrer_id = %referrer_id,
                referred_user_id = %referred_user_id,
                referral_id = %referral.id,
                "referral already confirmed, not crediting again"
            );
            return Ok(ReferralCredit::AlreadyConfirmed {
                referral_id: referral.id,
                points_awarded: referral.points_awarded,
            });
        }

        let confirmed_before = tx.count_confirmed_referrals(referrer_id).await?;
        let award = match self.policy.referral_award(plan, confirmed_before) {
            Some(award) => award,
            None => return Ok(ReferralCredit::Skipped { plan: plan_name.to_string() }),
        };

        let referral = match existing {
            Some(pending) => {
                tx.confirm_referral(pending.id, plan, award.total_points, now)
                    .await?
            }
            None => {
                let inserted = tx
                    .insert_referral(NewReferral {
                        referrer_id,
                        referred_user_id,
                        referral_code: referred
                            .referred_by
                            .clone()
                            .or_else(|| referrer.referral_code.clone())
                            .unwrap_or_default(),
                        status: ReferralStatus::Confirmed,
                        plan_purchased: Some(plan),
                        points_awarded: award.total_points,
                        confirmed_at: Some(now),
                    })
                    .await?;
                match inserted {
                    Some(referral) => referral,
                    None => {
                        // a pending row was created after the lookup
                        let row = tx
                            .find_referral(referrer_id, referred_user_id)
                            .await?
                            .ok_or(ServiceError::Database(sqlx::Error::RowNotFound))?;
                        if row.status == ReferralStatus::Confirmed {
                            return Ok(ReferralCredit::AlreadyConfirmed {
                                referral_id: row.id,
                                points_awarded: row.points_awarded,
                            });
                        }
                        tx.confirm_referral(row.id, plan, award.total_points, now).await?
                    }
                }
            }
        };

        let balance = tx
            .adjust_points_balance(referrer_id, award.total_points)
            .await?
            .ok_or(ServiceError::UserNotFound(referrer_id))?;

        let mut description = format!(
            "Referral bonus: {} subscribed to the {} plan",
            referred.display_name(),
            plan.display_name()
        );
        if award.bonus_points > 0 {
            description.push_str(&format!(" (+{} bonus)", award.bonus_points));
        }
        tx.append_points_transaction(NewPointsTransaction::referral_bonus(
            referrer_id,
            award.total_points,
            referral.id,
            description,
        ))
        .await?;

        let free_month_awarded = self.award_free_month(tx.as_mut(), referrer_id, now).await?;

        tx.commit().await?;

        tracing::info!(
            referrer_id = %referrer_id,
            referred_user_id = %referred_user_id,
            referral_id = %referral.id,
            plan = plan.to_str(),
            base_points = award.base_points,
            bonus_points = award.bonus_points,
            balance,
            free_month_awarded,
            "referral points credited"
        );

        Ok(ReferralCredit::Credited {
            referral_id: referral.id,
            base_points: award.base_points,
            bonus_points: award.bonus_points,
            points_awarded: award.total_points,
            free_month_awarded,
        })
    }

    pub async fn check_and_award_free_month(&self, referrer_id: Uuid) -> Result<bool, ServiceError> {
        self.check_and_award_free_month_at(referrer_id, Utc::now()).await
    }

    pub async fn check_and_award_free_month_at(
        &self,
        referrer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut tx = self.db_client.begin_ledger().await?;
        tx.lock_user(referrer_id)
            .await?
            .ok_or(ServiceError::UserNotFound(referrer_id))?;

        let awarded = self.award_free_month(tx.as_mut(), referrer_id, now).await?;
        tx.commit().await?;
        Ok(awarded)
    }

    /// Caller must hold the referrer's row lock.
    async fn award_free_month(
        &self,
        tx: &mut dyn LedgerTx,
        referrer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let (from, to) = month_window(now);
        let monthly_count = tx.count_confirmed_referrals_between(referrer_id, from, to).await?;
        if !self.policy.is_free_month_milestone(monthly_count) {
            return Ok(false);
        }

        if !tx
            .claim_free_month_award(referrer_id, from.date_naive(), monthly_count)
            .await?
        {
            tracing::debug!(referrer_id = %referrer_id, monthly_count, "free month already awarded for this milestone");
            return Ok(false);
        }

        let free_months = tx.increment_free_months(referrer_id).await?;
        tx.append_points_transaction(NewPointsTransaction::free_month(
            referrer_id,
            format!(
                "Free month earned: {} referrals confirmed in {}",
                monthly_count,
                from.format("%m/%Y")
            ),
        ))
        .await?;

        tracing::info!(referrer_id = %referrer_id, monthly_count, free_months, "free month awarded");
        Ok(true)
    }

    pub async fn reconcile_ledger(&self, actor: &User) -> Result<ReconciliationReportDto, ServiceError> {
        ensure_admin(actor)?;

        let discrepancies = self.db_client.find_ledger_discrepancies().await?;
        for d in &discrepancies {
            tracing::error!(
                user_id = %d.user_id,
                points_balance = d.points_balance,
                transactions_total = d.transactions_total,
                "points balance does not match ledger"
            );
        }

        Ok(ReconciliationReportDto {
            consistent: discrepancies.is_empty(),
            discrepancies,
        })
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}
