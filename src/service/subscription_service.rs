// service/subscription_service.rs
use std::{collections::HashMap, sync::Arc};

use uuid::Uuid;

use crate::{
    db::ledger_tx::LedgerStore,
    models::{
        subscriptionmodels::{NewPaymentRecord, PaymentStatus, SubscriptionStatus, SubscriptionUpsert},
        usermodel::PlanTier,
    },
    service::{
        error::ServiceError,
        referral_service::{ReferralCredit, ReferralService},
    },
};

/// A paid subscription as reported by a Stripe event.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionActivation {
    pub email: String,
    pub stripe_subscription_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    /// Present for invoice events; a completed payment is recorded only then.
    pub stripe_invoice_id: Option<String>,
    pub amount_paid: Option<i64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    UnknownUser,
    Activated {
        user_id: Uuid,
        plan: PlanTier,
        referral: ReferralCredit,
    },
}

#[derive(Debug, Clone)]
pub struct FailedPayment {
    pub email: String,
    pub stripe_invoice_id: Option<String>,
    pub amount_due: i64,
    pub currency: Option<String>,
}

pub struct SubscriptionService {
    db_client: Arc<dyn LedgerStore>,
    referral_service: Arc<ReferralService>,
    price_plans: HashMap<String, PlanTier>,
}

impl SubscriptionService {
    pub fn new(
        db_client: Arc<dyn LedgerStore>,
        referral_service: Arc<ReferralService>,
        price_plans: HashMap<String, PlanTier>,
    ) -> Self {
        Self {
            db_client,
            referral_service,
            price_plans,
        }
    }

    pub fn plan_for_price(&self, price_id: Option<&str>) -> Option<PlanTier> {
        price_id.and_then(|id| self.price_plans.get(id).copied())
    }

    pub async fn activate_subscription(
        &self,
        activation: SubscriptionActivation,
    ) -> Result<ActivationOutcome, ServiceError> {
        let user = match self.db_client.get_user_by_email(&activation.email).await? {
            Some(user) => user,
            None => {
                tracing::warn!(email = %activation.email, "no user for paid subscription, skipping");
                return Ok(ActivationOutcome::UnknownUser);
            }
        };

        let mapped_plan = self.plan_for_price(activation.stripe_price_id.as_deref());
        let plan = mapped_plan.unwrap_or(PlanTier::Basic);
        if mapped_plan.is_none() {
            tracing::warn!(
                user_id = %user.id,
                price_id = ?activation.stripe_price_id,
                "unknown Stripe price, storing subscription as basic without referral points"
            );
        }

        self.db_client
            .upsert_subscription(SubscriptionUpsert {
                user_id: user.id,
                plan,
                status: SubscriptionStatus::Active,
                stripe_subscription_id: activation.stripe_subscription_id.clone(),
                stripe_price_id: activation.stripe_price_id.clone(),
                stripe_customer_id: activation.stripe_customer_id.clone(),
            })
            .await?;
        self.db_client.update_user_plan(user.id, plan).await?;

        if let Some(invoice_id) = activation.stripe_invoice_id.as_deref() {
            let recorded = self
                .db_client
                .create_payment_record(NewPaymentRecord {
                    user_id: user.id,
                    amount: activation.amount_paid.unwrap_or(0),
                    currency: activation.currency.clone().unwrap_or_else(|| "brl".to_string()),
                    status: PaymentStatus::Completed,
                    stripe_invoice_id: activation.stripe_invoice_id.clone(),
                    description: Some(format!("{} subscription", plan.display_name())),
                })
                .await?;
            if recorded.is_none() {
                tracing::info!(invoice_id = %invoice_id, "payment already recorded for invoice");
            }
        }

        let referral = match mapped_plan {
            Some(plan) => {
                self.referral_service
                    .process_referral_on_subscription(user.id, plan.to_str())
                    .await?
            }
            None => ReferralCredit::Skipped {
                plan: activation.stripe_price_id.unwrap_or_default(),
            },
        };

        tracing::info!(
            user_id = %user.id,
            plan = plan.to_str(),
            points_credited = referral.points_credited(),
            "subscription activated"
        );

        Ok(ActivationOutcome::Activated {
            user_id: user.id,
            plan,
            referral,
        })
    }

    /// Returns `false` when no user matches the email.
    pub async fn cancel_subscription(&self, email: &str) -> Result<bool, ServiceError> {
        let user = match self.db_client.get_user_by_email(email).await? {
            Some(user) => user,
            None => {
                tracing::warn!(email = %email, "no user for cancelled subscription");
                return Ok(false);
            }
        };

        self.db_client.cancel_subscription(user.id).await?;
        self.db_client.update_user_plan(user.id, PlanTier::Free).await?;

        tracing::info!(user_id = %user.id, "subscription cancelled, plan reset to free");
        Ok(true)
    }

    pub async fn record_failed_payment(&self, payment: FailedPayment) -> Result<bool, ServiceError> {
        let user = match self.db_client.get_user_by_email(&payment.email).await? {
            Some(user) => user,
            None => {
                tracing::warn!(email = %payment.email, "no user for failed payment");
                return Ok(false);
            }
        };

        self.db_client
            .create_payment_record(NewPaymentRecord {
                user_id: user.id,
                amount: payment.amount_due,
                currency: payment.currency.unwrap_or_else(|| "brl".to_string()),
                status: PaymentStatus::Failed,
                stripe_invoice_id: payment.stripe_invoice_id,
                description: Some("Subscription payment failed".to_string()),
            })
            .await?;

        tracing::warn!(user_id = %user.id, amount_due = payment.amount_due, "subscription payment failed");
        Ok(true)
    }
}
