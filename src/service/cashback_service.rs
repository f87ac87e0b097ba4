// service/cashback_service.rs
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::ledger_tx::LedgerStore,
    dtos::referraldtos::CashbackRequestDto,
    models::{
        cashbackmodel::*,
        pointsmodel::{NewPointsTransaction, PointsTransactionType},
        usermodel::User,
    },
    service::{ensure_admin, error::ServiceError, rewards::RewardPolicy},
};

#[derive(Debug, Clone)]
pub struct CashbackApplication {
    pub points_amount: i64,
    pub payment_method: CashbackPaymentMethod,
    pub pix_key: Option<String>,
    pub bank_details: Option<String>,
}

impl From<CashbackRequestDto> for CashbackApplication {
    fn from(dto: CashbackRequestDto) -> Self {
        Self {
            points_amount: dto.points_amount,
            payment_method: dto.payment_method,
            pix_key: dto.pix_key,
            bank_details: dto.bank_details,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub struct CashbackService {
    db_client: Arc<dyn LedgerStore>,
    policy: RewardPolicy,
}

impl CashbackService {
    pub fn new(db_client: Arc<dyn LedgerStore>, policy: RewardPolicy) -> Self {
        Self { db_client, policy }
    }

    /// Debits the points up front and leaves the request pending for an admin.
    pub async fn request_cashback(
        &self,
        user_id: Uuid,
        application: CashbackApplication,
    ) -> Result<CashbackRequest, ServiceError> {
        let points_amount = application.points_amount;
        if points_amount < self.policy.cashback_min_points {
            return Err(ServiceError::Validation(format!(
                "Minimum cashback is {} points",
                self.policy.cashback_min_points
            )));
        }

        let (pix_key, bank_details) = match application.payment_method {
            CashbackPaymentMethod::Pix => {
                let pix_key = non_blank(application.pix_key).ok_or_else(|| {
                    ServiceError::Validation("PIX key is required for PIX payment method".to_string())
                })?;
                (Some(pix_key), None)
            }
            CashbackPaymentMethod::BankTransfer => {
                let bank_details = non_blank(application.bank_details).ok_or_else(|| {
                    ServiceError::Validation("Bank details are required for bank transfer".to_string())
                })?;
                (None, Some(bank_details))
            }
            CashbackPaymentMethod::CreditAccount => (None, None),
        };

        let user = self
            .db_client
            .get_user(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound(user_id))?;
        if points_amount > user.points_balance {
            return Err(ServiceError::InsufficientBalance {
                requested: points_amount,
                available: user.points_balance,
            });
        }

        let cash_amount = self.policy.cash_amount_cents(points_amount);

        let mut tx = self.db_client.begin_ledger().await?;
        let locked = tx
            .lock_user(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound(user_id))?;

        let balance = tx
            .adjust_points_balance(user_id, -points_amount)
            .await?
            .ok_or(ServiceError::InsufficientBalance {
                requested: points_amount,
                available: locked.points_balance,
            })?;

        let request = tx
            .insert_cashback_request(NewCashbackRequest {
                user_id,
                points_amount,
                cash_amount,
                payment_method: application.payment_method,
                pix_key,
                bank_details,
            })
            .await?;

        tx.append_points_transaction(NewPointsTransaction::cashback(
            user_id,
            -points_amount,
            PointsTransactionType::CashbackRedeemed,
            request.id,
            format!("Cashback request {} ({:?})", request.id, request.payment_method),
        ))
        .await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            request_id = %request.id,
            points_amount,
            cash_amount,
            balance,
            "cashback requested"
        );
        Ok(request)
    }

    pub async fn process_cashback_request(
        &self,
        actor: &User,
        request_id: Uuid,
        decision: CashbackDecision,
        admin_notes: Option<String>,
    ) -> Result<CashbackRequest, ServiceError> {
        ensure_admin(actor)?;

        let mut tx = self.db_client.begin_ledger().await?;
        let request = tx
            .lock_cashback_request(request_id)
            .await?
            .ok_or(ServiceError::CashbackRequestNotFound(request_id))?;

        if request.status != CashbackStatus::Pending {
            return Err(ServiceError::AlreadyProcessed(request_id, request.status));
        }

        let status = CashbackStatus::from(decision);
        let settled = tx
            .settle_cashback_request(request_id, status, actor.id, non_blank(admin_notes), Utc::now())
            .await?;

        if status == CashbackStatus::Rejected {
            tx.adjust_points_balance(request.user_id, request.points_amount)
                .await?
                .ok_or(ServiceError::UserNotFound(request.user_id))?;
            tx.append_points_transaction(NewPointsTransaction::cashback(
                request.user_id,
                request.points_amount,
                PointsTransactionType::CashbackRefunded,
                request_id,
                format!("Cashback request {} rejected - points refunded", request_id),
            ))
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            request_id = %request_id,
            admin_id = %actor.id,
            user_id = %request.user_id,
            status = status.to_str(),
            points_amount = request.points_amount,
            "cashback request processed"
        );
        Ok(settled)
    }

    pub async fn list_cashback_requests(
        &self,
        actor: &User,
        status: Option<CashbackStatus>,
    ) -> Result<Vec<CashbackRequestWithUser>, ServiceError> {
        ensure_admin(actor)?;

        let requests = self.db_client.get_cashback_requests(status).await?;
        Ok(requests
            .into_iter()
            .map(|mut item| {
                item.user_name.get_or_insert_with(|| "Unknown".to_string());
                item.user_email.get_or_insert_with(|| "Unknown".to_string());
                item
            })
            .collect())
    }

    pub async fn list_my_cashback_requests(&self, user_id: Uuid) -> Result<Vec<CashbackRequest>, ServiceError> {
        Ok(self.db_client.get_user_cashback_requests(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::mock_db::MockDb, models::usermodel::UserRole};

    struct Fixture {
        db: Arc<MockDb>,
        service: CashbackService,
        user: User,
        admin: User,
    }

    async fn fixture(balance: i64) -> Fixture {
        let db = Arc::new(MockDb::new());
        let user = db.add_user("Ana", "ana@example.com", UserRole::User).await;
        let user = seed_balance(&db, user.id, balance).await;
        let admin = db.add_user("Root", "root@example.com", UserRole::Admin).await;
        let service = CashbackService::new(db.clone(), RewardPolicy::default());
        Fixture { db, service, user, admin }
    }

    /// Seeds a balance through a real ledger entry so reconciliation holds.
    async fn seed_balance(db: &Arc<MockDb>, user_id: Uuid, points: i64) -> User {
        if points > 0 {
            let mut tx = db.begin_ledger().await.unwrap();
            tx.adjust_points_balance(user_id, points).await.unwrap();
            tx.append_points_transaction(NewPointsTransaction {
                user_id,
                amount: points,
                transaction_type: PointsTransactionType::ReferralBonus,
                description: "seed".to_string(),
                referral_id: None,
                cashback_request_id: None,
            })
            .await
            .unwrap();
            tx.commit().await.unwrap();
        }
        db.user(user_id).await
    }

    fn pix(points_amount: i64) -> CashbackApplication {
        CashbackApplication {
            points_amount,
            payment_method: CashbackPaymentMethod::Pix,
            pix_key: Some("ana@example.com".to_string()),
            bank_details: None,
        }
    }

    #[tokio::test]
    async fn test_request_debits_balance_and_logs_transaction() {
        let f = fixture(500).await;

        let request = f.service.request_cashback(f.user.id, pix(300)).await.unwrap();

        assert_eq!(request.status, CashbackStatus::Pending);
        assert_eq!(request.cash_amount, 3000);
        assert_eq!(request.pix_key.as_deref(), Some("ana@example.com"));
        assert_eq!(f.db.user(f.user.id).await.points_balance, 200);

        let last = f.db.transactions_for(f.user.id).await.pop().unwrap();
        assert_eq!(last.transaction_type, PointsTransactionType::CashbackRedeemed);
        assert_eq!(last.amount, -300);
        assert_eq!(last.cashback_request_id, Some(request.id));
        f.db.assert_reconciled().await;
    }

    #[tokio::test]
    async fn test_rejection_refunds_points() {
        let f = fixture(500).await;
        let request = f.service.request_cashback(f.user.id, pix(300)).await.unwrap();

        let processed = f
            .service
            .process_cashback_request(&f.admin, request.id, CashbackDecision::Rejected, Some("invalid key".to_string()))
            .await
            .unwrap();

        assert_eq!(processed.status, CashbackStatus::Rejected);
        assert_eq!(processed.processed_by, Some(f.admin.id));
        assert_eq!(processed.admin_notes.as_deref(), Some("invalid key"));
        assert!(processed.processed_at.is_some());
        assert_eq!(f.db.user(f.user.id).await.points_balance, 500);

        let last = f.db.transactions_for(f.user.id).await.pop().unwrap();
        assert_eq!(last.transaction_type, PointsTransactionType::CashbackRefunded);
        assert_eq!(last.amount, 300);
        f.db.assert_reconciled().await;
    }

    #[tokio::test]
    async fn test_approval_keeps_balance_and_second_processing_fails() {
        let f = fixture(500).await;
        let request = f.service.request_cashback(f.user.id, pix(200)).await.unwrap();

        f.service
            .process_cashback_request(&f.admin, request.id, CashbackDecision::Approved, None)
            .await
            .unwrap();
        assert_eq!(f.db.user(f.user.id).await.points_balance, 300);

        let again = f
            .service
            .process_cashback_request(&f.admin, request.id, CashbackDecision::Rejected, None)
            .await;
        assert!(matches!(
            again,
            Err(ServiceError::AlreadyProcessed(id, CashbackStatus::Approved)) if id == request.id
        ));
        assert_eq!(f.db.user(f.user.id).await.points_balance, 300);
        f.db.assert_reconciled().await;
    }

    #[tokio::test]
    async fn test_minimum_points_boundary() {
        let f = fixture(500).await;

        assert!(matches!(
            f.service.request_cashback(f.user.id, pix(99)).await,
            Err(ServiceError::Validation(_))
        ));

        let request = f.service.request_cashback(f.user.id, pix(100)).await.unwrap();
        assert_eq!(request.cash_amount, 1000);
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let f = fixture(150).await;

        let result = f.service.request_cashback(f.user.id, pix(200)).await;
        assert!(matches!(
            result,
            Err(ServiceError::InsufficientBalance { requested: 200, available: 150 })
        ));
        assert_eq!(f.db.user(f.user.id).await.points_balance, 150);
    }

    #[tokio::test]
    async fn test_payment_method_details() {
        let f = fixture(1000).await;

        let missing_pix = CashbackApplication { pix_key: Some("  ".to_string()), ..pix(100) };
        assert!(matches!(
            f.service.request_cashback(f.user.id, missing_pix).await,
            Err(ServiceError::Validation(_))
        ));

        let missing_bank = CashbackApplication {
            payment_method: CashbackPaymentMethod::BankTransfer,
            pix_key: None,
            bank_details: None,
            points_amount: 100,
        };
        assert!(matches!(
            f.service.request_cashback(f.user.id, missing_bank).await,
            Err(ServiceError::Validation(_))
        ));

        let credit = CashbackApplication {
            payment_method: CashbackPaymentMethod::CreditAccount,
            pix_key: Some("ignored".to_string()),
            bank_details: None,
            points_amount: 100,
        };
        let request = f.service.request_cashback(f.user.id, credit).await.unwrap();
        assert_eq!(request.pix_key, None);
        assert_eq!(f.db.user(f.user.id).await.points_balance, 900);
    }

    #[tokio::test]
    async fn test_admin_only_operations() {
        let f = fixture(500).await;
        let request = f.service.request_cashback(f.user.id, pix(100)).await.unwrap();

        assert!(matches!(
            f.service
                .process_cashback_request(&f.user, request.id, CashbackDecision::Approved, None)
                .await,
            Err(ServiceError::Forbidden)
        ));
        assert!(matches!(
            f.service.list_cashback_requests(&f.user, None).await,
            Err(ServiceError::Forbidden)
        ));
        assert!(matches!(
            f.service
                .process_cashback_request(&f.admin, Uuid::new_v4(), CashbackDecision::Approved, None)
                .await,
            Err(ServiceError::CashbackRequestNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_listing_filters_by_status() {
        let f = fixture(1000).await;
        let first = f.service.request_cashback(f.user.id, pix(100)).await.unwrap();
        f.service.request_cashback(f.user.id, pix(200)).await.unwrap();
        f.service
            .process_cashback_request(&f.admin, first.id, CashbackDecision::Approved, None)
            .await
            .unwrap();

        let all = f.service.list_cashback_requests(&f.admin, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].user_name.as_deref(), Some("Ana"));
        assert_eq!(all[0].user_email.as_deref(), Some("ana@example.com"));

        let pending = f
            .service
            .list_cashback_requests(&f.admin, Some(CashbackStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request.points_amount, 200);

        let mine = f.service.list_my_cashback_requests(f.user.id).await.unwrap();
        assert_eq!(mine.len(), 2);
    }
}
