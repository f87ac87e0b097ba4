// db/mock_db.rs
//! In-memory ledger store for service and handler tests.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    cashbackdb::CashbackExt,
    ledger_tx::{LedgerStore, LedgerTx},
    pointsdb::PointsExt,
    referraldb::ReferralExt,
    subscriptiondb::SubscriptionExt,
    userdb::UserExt,
    webhookdb::{WebhookEventExt, STALE_CLAIM_MINUTES},
};
use crate::models::{
    cashbackmodel::*,
    pointsmodel::*,
    referralmodel::*,
    subscriptionmodels::*,
    usermodel::{PlanTier, User, UserRole},
};

#[derive(Debug, Clone, Default)]
pub struct MockState {
    pub users: HashMap<Uuid, User>,
    pub referrals: Vec<Referral>,
    pub transactions: Vec<PointsTransaction>,
    pub cashback_requests: Vec<CashbackRequest>,
    pub subscriptions: HashMap<Uuid, Subscription>,
    pub payments: Vec<PaymentRecord>,
    pub webhook_events: HashMap<String, WebhookEventStatus>,
    pub webhook_claimed_at: HashMap<String, DateTime<Utc>>,
    pub free_month_awards: HashSet<(Uuid, NaiveDate, i64)>,
    /// Makes the next `append_points_transaction` fail.
    pub fail_next_points_append: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockDb {
    state: Arc<Mutex<MockState>>,
}

impl MockDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, name: &str, email: &str, role: UserRole) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: Some(name.to_string()),
            email: email.to_string(),
            role,
            plan: PlanTier::Free,
            referral_code: None,
            referred_by: None,
            points_balance: 0,
            free_months_remaining: 0,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.users.insert(user.id, user.clone());
        user
    }

    pub async fn add_user_with_code(&self, name: &str, email: &str, code: &str) -> User {
        let user = self.add_user(name, email, UserRole::User).await;
        self.update_user(user.id, |u| u.referral_code = Some(code.to_string())).await
    }

    pub async fn update_user(&self, user_id: Uuid, change: impl FnOnce(&mut User)) -> User {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&user_id).expect("unknown mock user");
        change(user);
        user.clone()
    }

    pub async fn user(&self, user_id: Uuid) -> User {
        self.state.lock().await.users[&user_id].clone()
    }

    pub async fn transactions_for(&self, user_id: Uuid) -> Vec<PointsTransaction> {
        self.state
            .lock()
            .await
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn referrals_for(&self, referrer_id: Uuid) -> Vec<Referral> {
        self.state
            .lock()
            .await
            .referrals
            .iter()
            .filter(|r| r.referrer_id == referrer_id)
            .cloned()
            .collect()
    }

    pub async fn payments(&self) -> Vec<PaymentRecord> {
        self.state.lock().await.payments.clone()
    }

    pub async fn webhook_status(&self, event_id: &str) -> Option<WebhookEventStatus> {
        self.state.lock().await.webhook_events.get(event_id).copied()
    }

    /// Moves the claim time of an in-flight event into the past.
    pub async fn age_webhook_claim(&self, event_id: &str, by: chrono::Duration) {
        if let Some(claimed_at) = self.state.lock().await.webhook_claimed_at.get_mut(event_id) {
            *claimed_at -= by;
        }
    }

    pub async fn fail_next_points_append(&self) {
        self.state.lock().await.fail_next_points_append = true;
    }

    /// Ledger sum must equal the cached balance for every user.
    pub async fn assert_reconciled(&self) {
        let state = self.state.lock().await;
        for user in state.users.values() {
            let total: i64 = state
                .transactions
                .iter()
                .filter(|t| t.user_id == user.id)
                .map(|t| t.amount)
                .sum();
            assert_eq!(user.points_balance, total, "ledger mismatch for {}", user.email);
        }
    }
}

fn referral_with_user(state: &MockState, referral: &Referral) -> ReferralWithUser {
    let referred = referral.referred_user_id.and_then(|id| state.users.get(&id));
    ReferralWithUser {
        referral: referral.clone(),
        referred_user_name: referred.and_then(|u| u.name.clone()),
        referred_user_email: referred.map(|u| u.email.clone()),
    }
}

fn count_confirmed(state: &MockState, referrer_id: Uuid) -> i64 {
    state
        .referrals
        .iter()
        .filter(|r| r.referrer_id == referrer_id && r.status == ReferralStatus::Confirmed)
        .count() as i64
}

fn count_confirmed_between(state: &MockState, referrer_id: Uuid, from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    state
        .referrals
        .iter()
        .filter(|r| r.referrer_id == referrer_id && r.status == ReferralStatus::Confirmed)
        .filter(|r| r.confirmed_at.map(|at| at >= from && at < to).unwrap_or(false))
        .count() as i64
}

#[async_trait]
impl UserExt for MockDb {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, Error> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
            .cloned())
    }

    async fn get_user_by_referral_code(&self, referral_code: &str) -> Result<Option<User>, Error> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.referral_code.as_deref() == Some(referral_code))
            .cloned())
    }

    async fn set_referral_code_if_missing(
        &self,
        user_id: Uuid,
        referral_code: &str,
    ) -> Result<Option<User>, Error> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&user_id).ok_or(Error::RowNotFound)?;
        if user.referral_code.is_some() {
            return Ok(None);
        }
        user.referral_code = Some(referral_code.to_string());
        Ok(Some(user.clone()))
    }

    async fn update_user_plan(&self, user_id: Uuid, plan: PlanTier) -> Result<User, Error> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&user_id).ok_or(Error::RowNotFound)?;
        user.plan = plan;
        Ok(user.clone())
    }
}

#[async_trait]
impl ReferralExt for MockDb {
    async fn get_referrals_by_referrer_id(&self, referrer_id: Uuid) -> Result<Vec<Referral>, Error> {
        Ok(self.referrals_for(referrer_id).await)
    }

    async fn get_referrals_with_users(&self, referrer_id: Uuid) -> Result<Vec<ReferralWithUser>, Error> {
        let state = self.state.lock().await;
        Ok(state
            .referrals
            .iter()
            .filter(|r| r.referrer_id == referrer_id)
            .map(|r| referral_with_user(&state, r))
            .collect())
    }

    async fn count_confirmed_referrals(&self, referrer_id: Uuid) -> Result<i64, Error> {
        Ok(count_confirmed(&*self.state.lock().await, referrer_id))
    }

    async fn get_monthly_referral_count(
        &self,
        referrer_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, Error> {
        Ok(count_confirmed_between(&*self.state.lock().await, referrer_id, from, to))
    }
}

#[async_trait]
impl PointsExt for MockDb {
    async fn get_points_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PointsTransaction>, Error> {
        let mut transactions = self.transactions_for(user_id).await;
        transactions.reverse();
        Ok(transactions
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn get_points_total(&self, user_id: Uuid) -> Result<i64, Error> {
        Ok(self.transactions_for(user_id).await.iter().map(|t| t.amount).sum())
    }

    async fn find_ledger_discrepancies(&self) -> Result<Vec<LedgerDiscrepancy>, Error> {
        let state = self.state.lock().await;
        let mut discrepancies: Vec<LedgerDiscrepancy> = state
            .users
            .values()
            .map(|user| LedgerDiscrepancy {
                user_id: user.id,
                points_balance: user.points_balance,
                transactions_total: state
                    .transactions
                    .iter()
                    .filter(|t| t.user_id == user.id)
                    .map(|t| t.amount)
                    .sum(),
            })
            .filter(|d| d.points_balance != d.transactions_total)
            .collect();
        discrepancies.sort_by_key(|d| d.user_id);
        Ok(discrepancies)
    }
}

#[async_trait]
impl CashbackExt for MockDb {
    async fn get_user_cashback_requests(&self, user_id: Uuid) -> Result<Vec<CashbackRequest>, Error> {
        let state = self.state.lock().await;
        Ok(state
            .cashback_requests
            .iter()
            .rev()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_cashback_requests(
        &self,
        status: Option<CashbackStatus>,
    ) -> Result<Vec<CashbackRequestWithUser>, Error> {
        let state = self.state.lock().await;
        Ok(state
            .cashback_requests
            .iter()
            .rev()
            .filter(|c| status.map(|s| c.status == s).unwrap_or(true))
            .map(|c| {
                let user = state.users.get(&c.user_id);
                CashbackRequestWithUser {
                    request: c.clone(),
                    user_name: user.and_then(|u| u.name.clone()),
                    user_email: user.map(|u| u.email.clone()),
                }
            })
            .collect())
    }
}

#[async_trait]
impl SubscriptionExt for MockDb {
    async fn upsert_subscription(&self, upsert: SubscriptionUpsert) -> Result<Subscription, Error> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let previous = state.subscriptions.get(&upsert.user_id).cloned();
        let subscription = Subscription {
            id: previous.as_ref().map(|s| s.id).unwrap_or_else(Uuid::new_v4),
            user_id: upsert.user_id,
            plan: upsert.plan,
            status: upsert.status,
            stripe_subscription_id: upsert
                .stripe_subscription_id
                .or_else(|| previous.as_ref().and_then(|s| s.stripe_subscription_id.clone())),
            stripe_price_id: upsert
                .stripe_price_id
                .or_else(|| previous.as_ref().and_then(|s| s.stripe_price_id.clone())),
            stripe_customer_id: upsert
                .stripe_customer_id
                .or_else(|| previous.as_ref().and_then(|s| s.stripe_customer_id.clone())),
            auto_renew: true,
            start_date: previous.as_ref().map(|s| s.start_date).unwrap_or(now),
            end_date: None,
            created_at: previous.as_ref().map(|s| s.created_at).unwrap_or(now),
            updated_at: now,
        };
        state.subscriptions.insert(subscription.user_id, subscription.clone());
        Ok(subscription)
    }

    async fn get_user_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>, Error> {
        Ok(self.state.lock().await.subscriptions.get(&user_id).cloned())
    }

    async fn cancel_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>, Error> {
        let mut state = self.state.lock().await;
        Ok(state.subscriptions.get_mut(&user_id).map(|s| {
            s.status = SubscriptionStatus::Cancelled;
            s.auto_renew = false;
            s.end_date = Some(Utc::now());
            s.clone()
        }))
    }

    async fn create_payment_record(&self, record: NewPaymentRecord) -> Result<Option<PaymentRecord>, Error> {
        let mut state = self.state.lock().await;
        if record.stripe_invoice_id.is_some()
            && state
                .payments
                .iter()
                .any(|p| p.stripe_invoice_id == record.stripe_invoice_id && p.status == record.status)
        {
            return Ok(None);
        }

        let payment = PaymentRecord {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            amount: record.amount,
            currency: record.currency,
            status: record.status,
            payment_method: Some("stripe".to_string()),
            stripe_invoice_id: record.stripe_invoice_id,
            description: record.description,
            created_at: Utc::now(),
        };
        state.payments.push(payment.clone());
        Ok(Some(payment))
    }
}

#[async_trait]
impl WebhookEventExt for MockDb {
    async fn claim_webhook_event(&self, event_id: &str, _event_type: &str) -> Result<bool, Error> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let stale_before = now - chrono::Duration::minutes(i64::from(STALE_CLAIM_MINUTES));
        let claimable = match state.webhook_events.get(event_id) {
            None | Some(WebhookEventStatus::Failed) => true,
            Some(WebhookEventStatus::Processing) => state
                .webhook_claimed_at
                .get(event_id)
                .is_some_and(|claimed_at| *claimed_at < stale_before),
            Some(WebhookEventStatus::Processed) => false,
        };
        if claimable {
            state
                .webhook_events
                .insert(event_id.to_string(), WebhookEventStatus::Processing);
            state.webhook_claimed_at.insert(event_id.to_string(), now);
        }
        Ok(claimable)
    }

    async fn mark_webhook_event_processed(&self, event_id: &str) -> Result<(), Error> {
        self.state
            .lock()
            .await
            .webhook_events
            .insert(event_id.to_string(), WebhookEventStatus::Processed);
        Ok(())
    }

    async fn mark_webhook_event_failed(&self, event_id: &str, _error_message: &str) -> Result<(), Error> {
        self.state
            .lock()
            .await
            .webhook_events
            .insert(event_id.to_string(), WebhookEventStatus::Failed);
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MockDb {
    async fn begin_ledger(&self) -> Result<Box<dyn LedgerTx>, Error> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(MockTx {
            guard,
            snapshot: Some(snapshot),
        }))
    }
}

/// Holds the whole store locked for its lifetime; restores the snapshot
/// on drop unless committed.
pub struct MockTx {
    guard: OwnedMutexGuard<MockState>,
    snapshot: Option<MockState>,
}

impl Drop for MockTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            let fail_next = self.guard.fail_next_points_append;
            *self.guard = snapshot;
            self.guard.fail_next_points_append = fail_next;
        }
    }
}

#[async_trait]
impl LedgerTx for MockTx {
    async fn find_user(&mut self, user_id: Uuid) -> Result<Option<User>, Error> {
        Ok(self.guard.users.get(&user_id).cloned())
    }

    async fn lock_user(&mut self, user_id: Uuid) -> Result<Option<User>, Error> {
        Ok(self.guard.users.get(&user_id).cloned())
    }

    async fn set_referred_by(&mut self, user_id: Uuid, referral_code: &str) -> Result<User, Error> {
        let user = self.guard.users.get_mut(&user_id).ok_or(Error::RowNotFound)?;
        if user.referred_by.is_some() {
            return Err(Error::RowNotFound);
        }
        user.referred_by = Some(referral_code.to_string());
        Ok(user.clone())
    }

    async fn find_referral(
        &mut self,
        referrer_id: Uuid,
        referred_user_id: Uuid,
    ) -> Result<Option<Referral>, Error> {
        Ok(self
            .guard
            .referrals
            .iter()
            .find(|r| r.referrer_id == referrer_id && r.referred_user_id == Some(referred_user_id))
            .cloned())
    }

    async fn count_confirmed_referrals(&mut self, referrer_id: Uuid) -> Result<i64, Error> {
        Ok(count_confirmed(&self.guard, referrer_id))
    }

    async fn count_confirmed_referrals_between(
        &mut self,
        referrer_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, Error> {
        Ok(count_confirmed_between(&self.guard, referrer_id, from, to))
    }

    async fn insert_referral(&mut self, referral: NewReferral) -> Result<Option<Referral>, Error> {
        let exists = self.guard.referrals.iter().any(|r| {
            r.referrer_id == referral.referrer_id && r.referred_user_id == Some(referral.referred_user_id)
        });
        if exists {
            return Ok(None);
        }
        let row = Referral {
            id: Uuid::new_v4(),
            referrer_id: referral.referrer_id,
            referred_user_id: Some(referral.referred_user_id),
            referral_code: referral.referral_code,
            status: referral.status,
            plan_purchased: referral.plan_purchased,
            points_awarded: referral.points_awarded,
            created_at: Utc::now(),
            confirmed_at: referral.confirmed_at,
        };
        self.guard.referrals.push(row.clone());
        Ok(Some(row))
    }

    async fn confirm_referral(
        &mut self,
        referral_id: Uuid,
        plan: PlanTier,
        points_awarded: i64,
        confirmed_at: DateTime<Utc>,
    ) -> Result<Referral, Error> {
        let referral = self
            .guard
            .referrals
            .iter_mut()
            .find(|r| r.id == referral_id && r.status != ReferralStatus::Confirmed)
            .ok_or(Error::RowNotFound)?;
        referral.status = ReferralStatus::Confirmed;
        referral.plan_purchased = Some(plan);
        referral.points_awarded = points_awarded;
        referral.confirmed_at = Some(confirmed_at);
        Ok(referral.clone())
    }

    async fn adjust_points_balance(&mut self, user_id: Uuid, delta: i64) -> Result<Option<i64>, Error> {
        let user = match self.guard.users.get_mut(&user_id) {
            Some(user) => user,
            None => return Ok(None),
        };
        if user.points_balance + delta < 0 {
            return Ok(None);
        }
        user.points_balance += delta;
        Ok(Some(user.points_balance))
    }

    async fn increment_free_months(&mut self, user_id: Uuid) -> Result<i32, Error> {
        let user = self.guard.users.get_mut(&user_id).ok_or(Error::RowNotFound)?;
        user.free_months_remaining += 1;
        Ok(user.free_months_remaining)
    }

    async fn claim_free_month_award(
        &mut self,
        user_id: Uuid,
        period_start: NaiveDate,
        milestone: i64,
    ) -> Result<bool, Error> {
        Ok(self.guard.free_month_awards.insert((user_id, period_start, milestone)))
    }

    async fn append_points_transaction(
        &mut self,
        entry: NewPointsTransaction,
    ) -> Result<PointsTransaction, Error> {
        if std::mem::take(&mut self.guard.fail_next_points_append) {
            return Err(Error::Protocol("injected points_transactions failure".to_string()));
        }
        let row = PointsTransaction {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            amount: entry.amount,
            transaction_type: entry.transaction_type,
            description: entry.description,
            referral_id: entry.referral_id,
            cashback_request_id: entry.cashback_request_id,
            created_at: Utc::now(),
        };
        self.guard.transactions.push(row.clone());
        Ok(row)
    }

    async fn insert_cashback_request(&mut self, request: NewCashbackRequest) -> Result<CashbackRequest, Error> {
        let row = CashbackRequest {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            points_amount: request.points_amount,
            cash_amount: request.cash_amount,
            payment_method: request.payment_method,
            pix_key: request.pix_key,
            bank_details: request.bank_details,
            status: CashbackStatus::Pending,
            admin_notes: None,
            processed_by: None,
            processed_at: None,
            created_at: Utc::now(),
        };
        self.guard.cashback_requests.push(row.clone());
        Ok(row)
    }

    async fn lock_cashback_request(&mut self, request_id: Uuid) -> Result<Option<CashbackRequest>, Error> {
        Ok(self.guard.cashback_requests.iter().find(|c| c.id == request_id).cloned())
    }

    async fn settle_cashback_request(
        &mut self,
        request_id: Uuid,
        status: CashbackStatus,
        processed_by: Uuid,
        admin_notes: Option<String>,
        processed_at: DateTime<Utc>,
    ) -> Result<CashbackRequest, Error> {
        let request = self
            .guard
            .cashback_requests
            .iter_mut()
            .find(|c| c.id == request_id && c.status == CashbackStatus::Pending)
            .ok_or(Error::RowNotFound)?;
        request.status = status;
        request.processed_by = Some(processed_by);
        request.admin_notes = admin_notes;
        request.processed_at = Some(processed_at);
        Ok(request.clone())
    }

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        let mut tx = self;
        tx.snapshot = None;
        Ok(())
    }
}
