pub mod cashback_service;
pub mod error;
pub mod referral_code;
pub mod referral_service;
pub mod rewards;
pub mod stripe_client;
pub mod subscription_service;

use crate::models::usermodel::User;
use error::ServiceError;

pub fn ensure_admin(actor: &User) -> Result<(), ServiceError> {
    if actor.role.is_admin() {
        Ok(())
    } else {
        tracing::warn!(user_id = %actor.id, role = actor.role.to_str(), "admin operation refused");
        Err(ServiceError::Forbidden)
    }
}
